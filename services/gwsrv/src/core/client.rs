//! Downstream client contract
//!
//! One implementation per device protocol. The gateway only ever talks to
//! adapters through this trait, addressing points by their reference URI.

use async_trait::async_trait;

use super::value::PointValue;
use crate::error::{result_code, Result, CODE_OK};

/// Capability contract implemented by every downstream protocol adapter
///
/// @lifecycle created by the registry on first use of its scheme, lives for the process
/// @concurrency driven from the scheduler task only; never called concurrently
#[async_trait]
pub trait DownstreamClient: Send {
    /// URI scheme handled by this adapter
    fn scheme(&self) -> &str;

    /// Subscribe a reference for polling
    async fn register_read_value(&mut self, reference: &str) -> Result<()>;

    /// Immediate write of `value` to `reference`
    async fn register_write_value(&mut self, reference: &str, value: &PointValue) -> Result<()>;

    /// Synchronous read; `None` signals failure
    async fn read_value(&mut self, reference: &str) -> Option<PointValue>;

    /// Execute a command
    async fn operate(&mut self, reference: &str, value: &PointValue) -> Result<()>;

    /// Arm a select-before-operate command
    async fn select(&mut self, reference: &str, value: &PointValue) -> Result<()>;

    /// Disarm a selected command
    async fn cancel(&mut self, reference: &str, value: &PointValue) -> Result<()>;

    /// Read every registered reference and emit value changes
    async fn poll(&mut self);

    /// Human-readable text for a protocol-specific code
    fn error_text(&self, code: i32) -> String;
}

/// Coded outcome of a write or command as seen by the upstream side
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandReply {
    pub code: i32,
    pub message: String,
}

impl CommandReply {
    pub fn from_result(result: &Result<()>, client: &dyn DownstreamClient) -> Self {
        let code = result_code(result);
        let message = match result {
            Ok(()) => client.error_text(CODE_OK),
            Err(e) => format!("{}: {}", client.error_text(code), e),
        };
        Self { code, message }
    }

    pub fn is_success(&self) -> bool {
        self.code == CODE_OK
    }
}
