//! In-memory RFNoC device
//!
//! Used for unit tests and examples. Blocks are registered by hand, RX data
//! and transport conditions are queued per channel, and everything the
//! blocks do with the device is recorded as [`MockEvent`]s in one ordered
//! log that is shared by all clones of the device.
use parking_lot::Mutex;
use std::collections::HashMap;
use std::collections::HashSet;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use crate::device::ArgValue;
use crate::device::Args;
use crate::device::BlockInfo;
use crate::device::BlockKind;
use crate::device::DeviceTrait;
use crate::device::Direction;
use crate::device::RxErrorCode;
use crate::device::RxMetadata;
use crate::device::RxStreamer;
use crate::device::StreamArgs;
use crate::device::StreamCmd;
use crate::device::TxMetadata;
use crate::device::TxStreamer;
use crate::device::bytes_per_item;
use crate::runtime::Error;
use crate::runtime::Result;

/// Something a block did with the mocked device.
#[derive(Debug, Clone)]
pub enum MockEvent {
    /// Arguments applied to a block
    SetArgs {
        /// Block id
        block: String,
        /// Arguments
        args: Args,
    },
    /// Single argument applied to a block port
    SetArg {
        /// Block id
        block: String,
        /// Key
        key: String,
        /// Value
        value: ArgValue,
        /// Port
        port: usize,
    },
    /// Streamer created
    StreamerCreated {
        /// Streamer id
        streamer: usize,
        /// Direction
        direction: Direction,
        /// Stream args used to create the streamer
        args: StreamArgs,
    },
    /// TX send call
    Send {
        /// Streamer id
        streamer: usize,
        /// Samples per channel accepted
        nsamps: usize,
        /// Metadata of the call
        md: TxMetadata,
    },
    /// RX stream command
    StreamCmd {
        /// Streamer id
        streamer: usize,
        /// Command
        cmd: StreamCmd,
    },
}

#[derive(Debug)]
enum RxItem {
    Data { bytes: Vec<u8>, eob: bool },
    Condition(RxErrorCode),
}

#[derive(Debug)]
struct State {
    blocks: Vec<BlockInfo>,
    events: Vec<MockEvent>,
    next_streamer: usize,
    max_num_samps: usize,
    failing: HashSet<(Direction, usize)>,
    delays: HashMap<String, Duration>,
    tx_limit: HashMap<usize, usize>,
    tx_data: HashMap<usize, Vec<u8>>,
    rx_queue: HashMap<usize, VecDeque<RxItem>>,
}

/// Mocked RFNoC device
#[derive(Debug, Clone)]
pub struct MockDevice {
    state: Arc<Mutex<State>>,
}

impl MockDevice {
    /// Create a device without blocks.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                blocks: Vec::new(),
                events: Vec::new(),
                next_streamer: 0,
                max_num_samps: 1024,
                failing: HashSet::new(),
                delays: HashMap::new(),
                tx_limit: HashMap::new(),
                tx_data: HashMap::new(),
                rx_queue: HashMap::new(),
            })),
        }
    }

    /// Register a block with uniform port signatures.
    pub fn add_block(
        &self,
        id: &str,
        kind: BlockKind,
        n_inputs: usize,
        n_outputs: usize,
        vlen: usize,
    ) {
        self.add_block_info(BlockInfo::new(id, kind, n_inputs, n_outputs, vlen));
    }

    /// Register a block.
    pub fn add_block_info(&self, info: BlockInfo) {
        self.state.lock().blocks.push(info);
    }

    /// Maximum number of samples per channel moved by one send/receive.
    pub fn set_max_num_samps(&self, n: usize) {
        self.state.lock().max_num_samps = n;
    }

    /// Let the creation of any streamer serving `channel` in `dir` fail.
    pub fn fail_streamer(&self, dir: Direction, channel: usize) {
        self.state.lock().failing.insert((dir, channel));
    }

    /// Let streamer creation succeed again.
    pub fn clear_failures(&self) {
        self.state.lock().failing.clear();
    }

    /// Delay the creation of streamers routed to `block`.
    pub fn set_streamer_delay(&self, block: &str, delay: Duration) {
        self.state.lock().delays.insert(block.to_string(), delay);
    }

    /// Accept at most `n` samples per send on `channel`.
    pub fn set_tx_limit(&self, channel: usize, n: usize) {
        self.state.lock().tx_limit.insert(channel, n);
    }

    /// Queue samples for `channel`, optionally ending a burst.
    pub fn push_rx(&self, channel: usize, bytes: Vec<u8>, eob: bool) {
        self.state
            .lock()
            .rx_queue
            .entry(channel)
            .or_default()
            .push_back(RxItem::Data { bytes, eob });
    }

    /// Queue a transport condition for `channel`.
    pub fn push_rx_condition(&self, channel: usize, code: RxErrorCode) {
        self.state
            .lock()
            .rx_queue
            .entry(channel)
            .or_default()
            .push_back(RxItem::Condition(code));
    }

    /// Number of queued RX entries for `channel`.
    pub fn rx_pending(&self, channel: usize) -> usize {
        self.state
            .lock()
            .rx_queue
            .get(&channel)
            .map(|q| q.len())
            .unwrap_or(0)
    }

    /// Bytes sent on `channel` so far.
    pub fn tx_data(&self, channel: usize) -> Vec<u8> {
        self.state
            .lock()
            .tx_data
            .get(&channel)
            .cloned()
            .unwrap_or_default()
    }

    /// All recorded events, in order.
    pub fn events(&self) -> Vec<MockEvent> {
        self.state.lock().events.clone()
    }

    /// Take all recorded events.
    pub fn take_events(&self) -> Vec<MockEvent> {
        std::mem::take(&mut self.state.lock().events)
    }

    fn create_streamer(&self, dir: Direction, args: &StreamArgs) -> Result<(usize, usize, usize)> {
        let itemsize = bytes_per_item(&args.cpu_format)?;
        let delay = {
            let s = self.state.lock();
            let block = args
                .get("block_id")
                .or_else(|| args.get("block_id0"))
                .unwrap_or_default();
            s.delays.get(&block).copied()
        };
        if let Some(d) = delay {
            std::thread::sleep(d);
        }

        let mut s = self.state.lock();
        if let Some(c) = args.channels.iter().find(|c| s.failing.contains(&(dir, **c))) {
            return Err(Error::Device(format!("no {dir} path to channel {c}")));
        }
        let id = s.next_streamer;
        s.next_streamer += 1;
        s.events.push(MockEvent::StreamerCreated {
            streamer: id,
            direction: dir,
            args: args.clone(),
        });
        Ok((id, itemsize, s.max_num_samps))
    }
}

impl Default for MockDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceTrait for MockDevice {
    type TxStreamer = MockTxStreamer;
    type RxStreamer = MockRxStreamer;

    fn find_blocks(&self, hint: &str) -> Vec<String> {
        self.state
            .lock()
            .blocks
            .iter()
            .filter(|b| matches_hint(&b.id, hint))
            .map(|b| b.id.clone())
            .collect()
    }

    fn block_info(&self, id: &str) -> Result<BlockInfo> {
        self.state
            .lock()
            .blocks
            .iter()
            .find(|b| b.id == id)
            .cloned()
            .ok_or_else(|| Error::BlockNotFound(id.to_string()))
    }

    fn set_args(&self, block: &str, args: &Args) -> Result<()> {
        self.block_info(block)?;
        self.state.lock().events.push(MockEvent::SetArgs {
            block: block.to_string(),
            args: args.clone(),
        });
        Ok(())
    }

    fn set_arg(&self, block: &str, key: &str, value: &ArgValue, port: usize) -> Result<()> {
        self.block_info(block)?;
        self.state.lock().events.push(MockEvent::SetArg {
            block: block.to_string(),
            key: key.to_string(),
            value: value.clone(),
            port,
        });
        Ok(())
    }

    fn tx_streamer(&self, args: &StreamArgs) -> Result<MockTxStreamer> {
        let (id, itemsize, max_num_samps) = self.create_streamer(Direction::Tx, args)?;
        Ok(MockTxStreamer {
            id,
            channels: args.channels.clone(),
            itemsize,
            max_num_samps,
            state: self.state.clone(),
        })
    }

    fn rx_streamer(&self, args: &StreamArgs) -> Result<MockRxStreamer> {
        let (id, itemsize, max_num_samps) = self.create_streamer(Direction::Rx, args)?;
        Ok(MockRxStreamer {
            id,
            channels: args.channels.clone(),
            itemsize,
            max_num_samps,
            state: self.state.clone(),
        })
    }
}

/// TX streamer of the [`MockDevice`]
#[derive(Debug)]
pub struct MockTxStreamer {
    id: usize,
    channels: Vec<usize>,
    itemsize: usize,
    max_num_samps: usize,
    state: Arc<Mutex<State>>,
}

impl TxStreamer for MockTxStreamer {
    fn num_channels(&self) -> usize {
        self.channels.len()
    }

    fn max_num_samps(&self) -> usize {
        self.max_num_samps
    }

    fn send(
        &mut self,
        buffs: &[&[u8]],
        nsamps: usize,
        md: &TxMetadata,
        _timeout: Duration,
    ) -> Result<usize> {
        if buffs.len() != self.channels.len() {
            return Err(Error::Device(format!(
                "send with {} buffers on a {} channel streamer",
                buffs.len(),
                self.channels.len()
            )));
        }
        let mut s = self.state.lock();
        let mut n = nsamps.min(self.max_num_samps);
        for c in self.channels.iter() {
            if let Some(limit) = s.tx_limit.get(c) {
                n = n.min(*limit);
            }
        }
        for (c, b) in self.channels.iter().zip(buffs.iter()) {
            let bytes = n * self.itemsize;
            if b.len() < bytes {
                return Err(Error::Device("send buffer too short".to_string()));
            }
            s.tx_data
                .entry(*c)
                .or_default()
                .extend_from_slice(&b[..bytes]);
        }
        s.events.push(MockEvent::Send {
            streamer: self.id,
            nsamps: n,
            md: *md,
        });
        Ok(n)
    }
}

/// RX streamer of the [`MockDevice`]
#[derive(Debug)]
pub struct MockRxStreamer {
    id: usize,
    channels: Vec<usize>,
    itemsize: usize,
    max_num_samps: usize,
    state: Arc<Mutex<State>>,
}

impl RxStreamer for MockRxStreamer {
    fn num_channels(&self) -> usize {
        self.channels.len()
    }

    fn max_num_samps(&self) -> usize {
        self.max_num_samps
    }

    fn recv(
        &mut self,
        buffs: &mut [&mut [u8]],
        nsamps: usize,
        md: &mut RxMetadata,
        _timeout: Duration,
    ) -> Result<usize> {
        *md = RxMetadata::default();
        let mut s = self.state.lock();
        let capacity = buffs
            .iter()
            .map(|b| b.len() / self.itemsize)
            .min()
            .unwrap_or(0);
        let max = nsamps.min(self.max_num_samps).min(capacity);

        // channels of one streamer move in lockstep, the first one decides
        let Some(first) = self.channels.first() else {
            md.error_code = RxErrorCode::Timeout;
            return Ok(0);
        };
        let n = match s.rx_queue.get(first).and_then(|q| q.front()) {
            None => {
                md.error_code = RxErrorCode::Timeout;
                return Ok(0);
            }
            Some(RxItem::Condition(_)) => 0,
            Some(RxItem::Data { bytes, .. }) => max.min(bytes.len() / self.itemsize),
        };

        for (c, buf) in self.channels.iter().zip(buffs.iter_mut()) {
            let Some(queue) = s.rx_queue.get_mut(c) else {
                continue;
            };
            match queue.front_mut() {
                Some(RxItem::Condition(code)) => {
                    md.error_code = *code;
                    queue.pop_front();
                }
                Some(RxItem::Data { bytes, eob }) => {
                    let len = n * self.itemsize;
                    let take = len.min(bytes.len());
                    buf[..take].copy_from_slice(&bytes[..take]);
                    bytes.drain(..take);
                    if bytes.is_empty() {
                        md.end_of_burst |= *eob;
                        queue.pop_front();
                    }
                }
                None => {}
            }
        }
        Ok(n)
    }

    fn issue_stream_cmd(&mut self, cmd: &StreamCmd) -> Result<()> {
        self.state.lock().events.push(MockEvent::StreamCmd {
            streamer: self.id,
            cmd: *cmd,
        });
        Ok(())
    }
}

// `hint` has to match whole `/` and `_` separated segments of the id
fn matches_hint(id: &str, hint: &str) -> bool {
    let id: Vec<&str> = id.split(['/', '_']).collect();
    let hint: Vec<&str> = hint.split(['/', '_']).collect();
    id.windows(hint.len()).any(|w| w == hint.as_slice())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hints_match_whole_segments() {
        assert!(matches_hint("0/DDC_1", "DDC"));
        assert!(matches_hint("0/DDC_1", "DDC_1"));
        assert!(matches_hint("0/DDC_1", "0/DDC_1"));
        assert!(!matches_hint("0/DDC_10", "0/DDC_1"));
        assert!(!matches_hint("0/DDC_1", "DD"));
        assert!(!matches_hint("10/DDC_1", "0/DDC"));
    }
}
