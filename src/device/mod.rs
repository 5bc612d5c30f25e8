//! Device Abstraction
//!
//! The interface blocks use to talk to an RFNoC device: discover sub-blocks,
//! configure them, and create host-side TX/RX streamers. Implementations wrap
//! a hardware driver; [`mock::MockDevice`] is an in-memory implementation for
//! tests.
use std::fmt;
use std::time::Duration;

use crate::runtime::Result;

mod args;
pub use args::ArgValue;
pub use args::Args;
pub use args::StreamArgs;
pub use args::arg_flag;
pub use args::args_empty;
pub use args::bytes_per_item;
pub use args::cast_arg;
pub use args::get_arg;
pub use args::merge_args;

pub mod mock;

/// Stream direction, seen from the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Host to device, fed by the block's stream inputs.
    Tx,
    /// Device to host, feeding the block's stream outputs.
    Rx,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Tx => write!(f, "TX"),
            Direction::Rx => write!(f, "RX"),
        }
    }
}

/// Capability of a sub-block, determined once when it is discovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    /// Accepts streams from the host.
    Sink,
    /// Produces streams to the host.
    Source,
    /// Accepts and produces streams.
    SinkSource,
    /// Neither, e.g., a pure control block.
    Control,
}

impl BlockKind {
    /// Whether the block supports streaming in `dir`.
    pub fn supports(&self, dir: Direction) -> bool {
        matches!(
            (self, dir),
            (BlockKind::Sink | BlockKind::SinkSource, Direction::Tx)
                | (BlockKind::Source | BlockKind::SinkSource, Direction::Rx)
        )
    }
}

/// Description of a sub-block on the device.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockInfo {
    /// Unique block id, e.g., `0/DDC_0`
    pub id: String,
    /// Capability
    pub kind: BlockKind,
    /// Vector length of the stream signature of every input port
    pub input_vlens: Vec<usize>,
    /// Vector length of the stream signature of every output port
    pub output_vlens: Vec<usize>,
}

impl BlockInfo {
    /// Create a block description with uniform port signatures.
    pub fn new(
        id: impl Into<String>,
        kind: BlockKind,
        n_inputs: usize,
        n_outputs: usize,
        vlen: usize,
    ) -> Self {
        Self {
            id: id.into(),
            kind,
            input_vlens: vec![vlen; n_inputs],
            output_vlens: vec![vlen; n_outputs],
        }
    }

    /// Number of streaming ports in `dir`.
    ///
    /// Zero if the block does not support the direction.
    pub fn ports(&self, dir: Direction) -> usize {
        if !self.kind.supports(dir) {
            return 0;
        }
        match dir {
            Direction::Tx => self.input_vlens.len(),
            Direction::Rx => self.output_vlens.len(),
        }
    }

    /// Vector length of the signature of `port` in `dir`.
    pub fn vlen(&self, dir: Direction, port: usize) -> Option<usize> {
        match dir {
            Direction::Tx => self.input_vlens.get(port).copied(),
            Direction::Rx => self.output_vlens.get(port).copied(),
        }
    }
}

/// Metadata of a TX send call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TxMetadata {
    /// First packet of a burst
    pub start_of_burst: bool,
    /// Last packet of a burst
    pub end_of_burst: bool,
    /// Send at this device time (ns) instead of immediately
    pub time_ns: Option<i64>,
}

/// Condition reported by an RX receive call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RxErrorCode {
    /// Samples received cleanly
    #[default]
    None,
    /// No samples within the timeout
    Timeout,
    /// Samples were dropped
    Overflow,
    /// Any other transport error, with the driver's code
    Other(u32),
}

impl fmt::Display for RxErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RxErrorCode::None => write!(f, "no error"),
            RxErrorCode::Timeout => write!(f, "timeout"),
            RxErrorCode::Overflow => write!(f, "overflow"),
            RxErrorCode::Other(c) => write!(f, "transport error (code: {c:#x})"),
        }
    }
}

/// Metadata filled in by an RX receive call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RxMetadata {
    /// Condition of the call
    pub error_code: RxErrorCode,
    /// The last returned sample ends a burst
    pub end_of_burst: bool,
    /// Device time (ns) of the first returned sample
    pub time_ns: Option<i64>,
}

/// Streaming mode requested by a [`StreamCmd`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamMode {
    /// Stream until told to stop
    StartContinuous,
    /// Stop continuous streaming
    StopContinuous,
}

/// RX stream command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamCmd {
    /// Mode
    pub mode: StreamMode,
    /// Execute at this device time (ns), `None` means now
    pub time_ns: Option<i64>,
}

impl StreamCmd {
    /// Start streaming now.
    pub fn start_now() -> Self {
        Self {
            mode: StreamMode::StartContinuous,
            time_ns: None,
        }
    }

    /// Start streaming at device time `time_ns`.
    pub fn start_at(time_ns: i64) -> Self {
        Self {
            mode: StreamMode::StartContinuous,
            time_ns: Some(time_ns),
        }
    }

    /// Stop streaming.
    pub fn stop() -> Self {
        Self {
            mode: StreamMode::StopContinuous,
            time_ns: None,
        }
    }

    /// Whether the command executes immediately.
    pub fn stream_now(&self) -> bool {
        self.time_ns.is_none()
    }
}

/// Host-to-device streamer.
pub trait TxStreamer: Send {
    /// Number of channels served by the streamer.
    fn num_channels(&self) -> usize;
    /// Maximum number of samples per channel accepted by one send.
    fn max_num_samps(&self) -> usize;
    /// Send `nsamps` samples from each channel buffer.
    ///
    /// Returns the number of samples per channel actually sent.
    fn send(
        &mut self,
        buffs: &[&[u8]],
        nsamps: usize,
        md: &TxMetadata,
        timeout: Duration,
    ) -> Result<usize>;
}

/// Device-to-host streamer.
pub trait RxStreamer: Send {
    /// Number of channels served by the streamer.
    fn num_channels(&self) -> usize;
    /// Maximum number of samples per channel returned by one receive.
    fn max_num_samps(&self) -> usize;
    /// Receive up to `nsamps` samples into each channel buffer.
    ///
    /// Returns the number of samples per channel received. Transport
    /// conditions are reported through `md.error_code`.
    fn recv(
        &mut self,
        buffs: &mut [&mut [u8]],
        nsamps: usize,
        md: &mut RxMetadata,
        timeout: Duration,
    ) -> Result<usize>;
    /// Start or stop streaming.
    fn issue_stream_cmd(&mut self, cmd: &StreamCmd) -> Result<()>;
}

/// RFNoC device
pub trait DeviceTrait: Send + Sync {
    /// TX streamer type
    type TxStreamer: TxStreamer;
    /// RX streamer type
    type RxStreamer: RxStreamer;

    /// Ids of all blocks matching `hint`, e.g., `DDC` or `0/DDC_1`.
    fn find_blocks(&self, hint: &str) -> Vec<String>;
    /// Describe the block with the given id.
    fn block_info(&self, id: &str) -> Result<BlockInfo>;
    /// Apply a set of arguments to a block.
    fn set_args(&self, block: &str, args: &Args) -> Result<()>;
    /// Apply a single argument to a port of a block.
    fn set_arg(&self, block: &str, key: &str, value: &ArgValue, port: usize) -> Result<()>;
    /// Create a TX streamer.
    fn tx_streamer(&self, args: &StreamArgs) -> Result<Self::TxStreamer>;
    /// Create an RX streamer.
    fn rx_streamer(&self, args: &StreamArgs) -> Result<Self::RxStreamer>;
}
