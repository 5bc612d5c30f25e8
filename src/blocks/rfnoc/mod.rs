//! RFNoC blocks
//!
//! A [`RfnocBlock`] wraps one or more sub-blocks of an RFNoC device and
//! streams samples to and from them. Blocks that share a device share a
//! [`CoordinationGroup`](crate::runtime::CoordinationGroup), which makes sure
//! they set up their streamers together.
mod block;
pub use block::RfnocBlock;
pub use block::WorkResult;

mod block_id;
pub use block_id::make_block_id;
pub use block_id::make_block_id_multi;

mod builder;
pub use builder::RfnocBlockBuilder;

mod endpoint;
pub use endpoint::Signature;
pub use endpoint::StreamEndpoint;

mod port_map;
pub use port_map::PortMapper;
pub use port_map::PortMapping;
