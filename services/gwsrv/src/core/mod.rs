//! Gateway core: the downstream client contract, scheme dispatch, datapoint
//! directory, value propagation and the poll scheduler.

pub mod client;
pub mod directory;
pub mod events;
pub mod gateway;
pub mod reference;
pub mod registry;
pub mod scheduler;
pub mod upstream;
pub mod value;

#[cfg(test)]
pub(crate) mod testing;

pub use client::{CommandReply, DownstreamClient};
pub use directory::{DatapointDirectory, ItemType};
pub use events::{EventSink, GatewayEvent};
pub use gateway::Gateway;
pub use registry::{ClientFactory, ClientRegistry};
pub use scheduler::Scheduler;
pub use upstream::{PointTable, UpstreamHandle, UpstreamRequest, UpstreamServer};
pub use value::PointValue;
