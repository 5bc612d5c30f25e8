//! ## Coordination Runtime
//!
//! Shared services for blocks that stream through one device: the
//! rendezvous barrier, the coordination group, configuration, logging, stream
//! tags, and the [`Mocker`] test harness.
use std::result;
use thiserror::Error;

pub mod barrier;
pub mod config;
pub mod coordination;

#[cfg(not(target_arch = "wasm32"))]
mod logging;

mod mocker;
mod tag;

pub use barrier::Interrupted;
pub use barrier::ReusableBarrier;
pub use coordination::CoordinationGroup;
pub use mocker::Mocker;
pub use tag::EOB_KEY;
pub use tag::ItemTag;
pub use tag::Tag;

use crate::device::Direction;

/// Initialize runtime
///
/// Installs the global logger. Calling it more than once is harmless.
pub fn init() {
    #[cfg(not(target_arch = "wasm32"))]
    logging::init();
}

/// Result type with [`enum@Error`] as default error.
pub type Result<T, E = Error> = result::Result<T, E>;

/// FutureSDR RFNoC Error
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// External port is not backed by any sub-block.
    #[error("No block is mapped to {0} port {1}")]
    UnmappedPort(Direction, usize),
    /// TX and RX stream args disagree on a shared key.
    #[error("Error merging arguments - conflicting values: '{key}': '{first}' != '{key}': '{second}'")]
    ConflictingArgs {
        /// Key present in both argument sets
        key: String,
        /// Value from the first set
        first: String,
        /// Value from the second set
        second: String,
    },
    /// More channels requested than the sub-blocks provide.
    #[error("{direction} stream args request {requested} channels, block only has {available}")]
    ChannelMismatch {
        /// Stream direction
        direction: Direction,
        /// Channels in the stream args
        requested: usize,
        /// Ports provided by the sub-blocks
        available: usize,
    },
    /// Aligned streaming needs one connected port per requested channel.
    #[error("{direction}: aligned streamer serves {channels} channels, but {ports} ports are connected")]
    AlignedChannelMismatch {
        /// Stream direction
        direction: Direction,
        /// Channels in the stream args
        channels: usize,
        /// Connected ports
        ports: usize,
    },
    /// Sub-blocks exist for a direction, but no host format was given.
    #[error("{0}: No cpu_format specified")]
    MissingCpuFormat(Direction),
    /// Host format string is not known.
    #[error("Unknown cpu_format '{0}'")]
    UnknownCpuFormat(String),
    /// Forced vector length contradicts the sub-block's signature.
    #[error("Can't set gr_vlen to {requested} if underlying block already has a vector length of {vlen}")]
    VlenMismatch {
        /// Value of `gr_vlen`
        requested: usize,
        /// Vector length reported by the block
        vlen: usize,
    },
    /// Block id did not match any block on the device.
    #[error("No block found for '{0}'")]
    BlockNotFound(String),
    /// Argument string could not be parsed.
    #[error("Invalid argument string '{0}'")]
    InvalidArgs(String),
    /// Device refused to create a streamer.
    #[error("Can't create {direction} streamer(s) to {block}: {reason}")]
    StreamerCreation {
        /// Stream direction
        direction: Direction,
        /// Sub-block the streamer should connect to
        block: String,
        /// Reason reported by the device
        reason: String,
    },
    /// Error reported by the device.
    #[error("Device error: {0}")]
    Device(String),
    /// A barrier wait was interrupted.
    #[error("Barrier interrupted")]
    Interrupted,
}

impl From<Interrupted> for Error {
    fn from(_: Interrupted) -> Self {
        Error::Interrupted
    }
}
