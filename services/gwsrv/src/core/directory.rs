//! Datapoint Directory
//!
//! Startup-built, read-only mapping between upstream addresses (IOAs), grouped
//! by information-object type, and downstream reference URIs.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{GwError, Result};

/// IEC 60870-5-104 information-object types the gateway maps
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemType {
    MeasuredValueScaled,
    SinglePointInformation,
    DoublePointInformation,
    SinglePointCommand,
    DoublePointCommand,
}

impl ItemType {
    /// Registration order used at startup
    pub const ALL: [ItemType; 5] = [
        ItemType::MeasuredValueScaled,
        ItemType::SinglePointInformation,
        ItemType::DoublePointInformation,
        ItemType::SinglePointCommand,
        ItemType::DoublePointCommand,
    ];

    /// Configuration group name
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemType::MeasuredValueScaled => "measuredvaluescaled",
            ItemType::SinglePointInformation => "singlepointinformation",
            ItemType::DoublePointInformation => "doublepointinformation",
            ItemType::SinglePointCommand => "singlepointcommand",
            ItemType::DoublePointCommand => "doublepointcommand",
        }
    }

    /// Monitoring types are polled; command types only accept commands
    pub fn is_monitoring(&self) -> bool {
        matches!(
            self,
            ItemType::MeasuredValueScaled
                | ItemType::SinglePointInformation
                | ItemType::DoublePointInformation
        )
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One configured point
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datapoint<'a> {
    pub item_type: ItemType,
    pub ioa: u32,
    pub reference: &'a str,
}

#[derive(Debug, Clone, Default)]
pub struct DatapointDirectory {
    groups: BTreeMap<ItemType, BTreeMap<u32, String>>,
}

impl DatapointDirectory {
    /// Build from configuration groups mapping IOA strings to reference URIs
    ///
    /// A non-numeric IOA is a configuration error.
    pub fn build<'a, I>(groups: I) -> Result<Self>
    where
        I: IntoIterator<Item = (ItemType, &'a BTreeMap<String, String>)>,
    {
        let mut directory = Self::default();
        for (item_type, entries) in groups {
            let group = directory.groups.entry(item_type).or_default();
            for (ioa, reference) in entries {
                let ioa: u32 = ioa.trim().parse().map_err(|_| {
                    GwError::config(format!("[{}] IOA '{}' is not a number", item_type, ioa))
                })?;
                group.insert(ioa, reference.trim().to_string());
            }
        }
        Ok(directory)
    }

    /// All points, grouped in registration order, IOAs ascending within a group
    pub fn datapoints(&self) -> impl Iterator<Item = Datapoint<'_>> {
        ItemType::ALL.into_iter().flat_map(move |item_type| {
            self.groups
                .get(&item_type)
                .into_iter()
                .flat_map(move |group| {
                    group.iter().map(move |(ioa, reference)| Datapoint {
                        item_type,
                        ioa: *ioa,
                        reference: reference.as_str(),
                    })
                })
        })
    }

    /// Reference configured for `ioa`; the first group in registration order wins
    pub fn lookup(&self, ioa: u32) -> Option<(ItemType, &str)> {
        ItemType::ALL.into_iter().find_map(|item_type| {
            self.groups
                .get(&item_type)
                .and_then(|g| g.get(&ioa))
                .map(|r| (item_type, r.as_str()))
        })
    }

    /// Upstream address for a downstream key (linear scan)
    pub fn reverse_lookup(&self, key: &str) -> Option<u32> {
        self.datapoints()
            .find(|p| p.reference == key)
            .map(|p| p.ioa)
    }

    pub fn len(&self) -> usize {
        self.groups.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
