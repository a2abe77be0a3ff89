//! Downstream reference URIs: `scheme://host[:port]/path`
//!
//! References are re-parsed on every access; the URI string itself is the key
//! used in events and in the datapoint directory.

use url::Url;

use crate::error::{GwError, Result};

/// Scheme-independent view of a downstream reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownstreamReference {
    pub scheme: String,
    pub host: String,
    /// Explicit port, if the URI carries one
    pub port: Option<u16>,
    pub path: String,
}

impl DownstreamReference {
    pub fn parse(uri: &str) -> Result<Self> {
        let url = Url::parse(uri).map_err(|e| GwError::invalid_reference(uri, e.to_string()))?;

        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| GwError::invalid_reference(uri, "missing hostname"))?
            .to_string();

        Ok(Self {
            scheme: url.scheme().to_string(),
            host,
            port: url.port(),
            path: url.path().to_string(),
        })
    }

    /// `"host:port"` using `default_port` when none is given
    pub fn host_port(&self, default_port: u16) -> String {
        format!("{}:{}", self.host, self.port.unwrap_or(default_port))
    }
}

/// Extract only the scheme, used by the dispatcher to pick a factory
pub fn scheme_of(uri: &str) -> Result<String> {
    let (scheme, rest) = uri
        .split_once("://")
        .ok_or_else(|| GwError::invalid_reference(uri, "missing scheme"))?;
    if scheme.is_empty() || rest.is_empty() {
        return Err(GwError::invalid_reference(uri, "missing scheme"));
    }
    Ok(scheme.to_ascii_lowercase())
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_reference() {
        let r = DownstreamReference::parse("modbus://10.0.0.3:502/1/30005").unwrap();
        assert_eq!(r.scheme, "modbus");
        assert_eq!(r.host, "10.0.0.3");
        assert_eq!(r.port, Some(502));
        assert_eq!(r.path, "/1/30005");
        assert_eq!(r.host_port(502), "10.0.0.3:502");
    }

    #[test]
    fn test_default_port() {
        let r = DownstreamReference::parse("modbus://plc-7/40001").unwrap();
        assert_eq!(r.port, None);
        assert_eq!(r.host_port(502), "plc-7:502");
    }

    #[test]
    fn test_missing_host() {
        assert!(matches!(
            DownstreamReference::parse("modbus:///1/40001"),
            Err(GwError::InvalidReference { .. })
        ));
        assert!(DownstreamReference::parse("not a uri").is_err());
    }

    #[test]
    fn test_scheme_of() {
        assert_eq!(scheme_of("modbus://10.0.0.3/1/40001").unwrap(), "modbus");
        assert_eq!(scheme_of("IEC61850://ied1/LD0/XCBR1.Pos").unwrap(), "iec61850");
        assert!(scheme_of("10.0.0.3/40001").is_err());
    }
}
