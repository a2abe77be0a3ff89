//! Upstream (IEC 60870-5-104) side of the gateway
//!
//! The IEC 104 stack itself is an external collaborator. The gateway pushes
//! values into it through [`UpstreamServer`] and receives commands and
//! general-interrogation reads through an [`UpstreamHandle`], whose requests
//! are served on the scheduler task.

use std::collections::BTreeMap;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use super::directory::ItemType;
use super::value::PointValue;
use crate::error::{GwError, Result, CODE_GENERAL};

/// Interface the gateway drives on the upstream server
pub trait UpstreamServer: Send {
    /// Declare an information object; fails on a duplicate IOA
    fn add_ioa(&mut self, ioa: u32, item_type: ItemType) -> Result<()>;

    /// Publish a new value for an information object
    fn update_ioa(&mut self, ioa: u32, value: &PointValue);
}

// ============================================================================
// In-process point table
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct PointEntry {
    pub item_type: ItemType,
    pub value: Option<PointValue>,
    pub updates: u64,
}

/// In-memory stand-in for the IEC 104 server's information object table
#[derive(Debug, Default)]
pub struct PointTable {
    points: BTreeMap<u32, PointEntry>,
}

impl PointTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, ioa: u32) -> Option<&PointEntry> {
        self.points.get(&ioa)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

impl UpstreamServer for PointTable {
    fn add_ioa(&mut self, ioa: u32, item_type: ItemType) -> Result<()> {
        if self.points.contains_key(&ioa) {
            return Err(GwError::DuplicateIoa(ioa));
        }
        self.points.insert(
            ioa,
            PointEntry {
                item_type,
                value: None,
                updates: 0,
            },
        );
        Ok(())
    }

    fn update_ioa(&mut self, ioa: u32, value: &PointValue) {
        match self.points.get_mut(&ioa) {
            Some(entry) => {
                debug!("IOA {} ({}) = {}", ioa, entry.item_type, value);
                entry.value = Some(value.clone());
                entry.updates += 1;
            },
            None => warn!("Update for undeclared IOA {}", ioa),
        }
    }
}

// ============================================================================
// Requests from the upstream server
// ============================================================================

#[derive(Debug)]
pub enum UpstreamRequest {
    /// Command (or select when `select` is set) on a command IOA
    Command {
        ioa: u32,
        value: i64,
        select: bool,
        reply: oneshot::Sender<i32>,
    },
    /// General-interrogation read
    Read {
        ioa: u32,
        reply: oneshot::Sender<Option<PointValue>>,
    },
}

/// Cloneable handle used by the upstream server's callbacks
#[derive(Debug, Clone)]
pub struct UpstreamHandle {
    tx: mpsc::Sender<UpstreamRequest>,
}

pub type RequestReceiver = mpsc::Receiver<UpstreamRequest>;

impl UpstreamHandle {
    pub fn channel(capacity: usize) -> (Self, RequestReceiver) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// Issue a command; returns the upstream code (`-1` if the gateway is gone)
    pub async fn command(&self, ioa: u32, value: i64, select: bool) -> i32 {
        let (reply, rx) = oneshot::channel();
        let request = UpstreamRequest::Command {
            ioa,
            value,
            select,
            reply,
        };
        if self.tx.send(request).await.is_err() {
            warn!("Command for IOA {} dropped: gateway stopped", ioa);
            return CODE_GENERAL;
        }
        rx.await.unwrap_or(CODE_GENERAL)
    }

    /// General-interrogation read; `None` if unknown, failed, or the gateway is gone
    pub async fn read(&self, ioa: u32) -> Option<PointValue> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(UpstreamRequest::Read { ioa, reply })
            .await
            .ok()?;
        rx.await.ok().flatten()
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_ioa_rejected() {
        let mut table = PointTable::new();
        table.add_ioa(1001, ItemType::MeasuredValueScaled).unwrap();
        assert_eq!(
            table.add_ioa(1001, ItemType::SinglePointCommand),
            Err(GwError::DuplicateIoa(1001))
        );
        assert_eq!(table.get(1001).unwrap().item_type, ItemType::MeasuredValueScaled);
    }

    #[test]
    fn test_update_counts() {
        let mut table = PointTable::new();
        table.add_ioa(1001, ItemType::MeasuredValueScaled).unwrap();
        table.update_ioa(1001, &PointValue::Int(42));
        table.update_ioa(4242, &PointValue::Int(1));

        let entry = table.get(1001).unwrap();
        assert_eq!(entry.value, Some(PointValue::Int(42)));
        assert_eq!(entry.updates, 1);
        assert!(table.get(4242).is_none());
    }

    #[tokio::test]
    async fn test_handle_without_gateway() {
        let (handle, rx) = UpstreamHandle::channel(4);
        drop(rx);
        assert_eq!(handle.command(6002, 1, false).await, CODE_GENERAL);
        assert_eq!(handle.read(1001).await, None);
    }

    #[tokio::test]
    async fn test_handle_round_trip() {
        let (handle, mut rx) = UpstreamHandle::channel(4);
        let server = tokio::spawn(async move {
            while let Some(request) = rx.recv().await {
                match request {
                    UpstreamRequest::Command { reply, .. } => {
                        let _ = reply.send(0);
                    },
                    UpstreamRequest::Read { ioa, reply } => {
                        let _ = reply.send(Some(PointValue::Int(i64::from(ioa))));
                    },
                }
            }
        });

        assert_eq!(handle.command(6002, 2, false).await, 0);
        assert_eq!(handle.read(7).await, Some(PointValue::Int(7)));
        drop(handle);
        server.await.unwrap();
    }
}
