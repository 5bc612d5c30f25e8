use parking_lot::ReentrantMutex;
use std::cell::RefCell;
use std::sync::Arc;
use std::time::Duration;

use crate::blocks::rfnoc::PortMapper;
use crate::blocks::rfnoc::Signature;
use crate::blocks::rfnoc::StreamEndpoint;
use crate::device::ArgValue;
use crate::device::Args;
use crate::device::BlockInfo;
use crate::device::DeviceTrait;
use crate::device::Direction;
use crate::device::RxErrorCode;
use crate::device::RxMetadata;
use crate::device::RxStreamer;
use crate::device::StreamArgs;
use crate::device::StreamCmd;
use crate::device::TxMetadata;
use crate::device::TxStreamer;
use crate::runtime::CoordinationGroup;
use crate::runtime::ItemTag;
use crate::runtime::Result;
use crate::runtime::Tag;

/// Outcome of one [`RfnocBlock::work`] call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkResult {
    /// Items consumed per input port
    pub consumed: Vec<usize>,
    /// Items produced per output port
    pub produced: Vec<usize>,
    /// Tags added to the output ports, as `(port, tag)`, with the index
    /// relative to the output buffer of the call
    pub tags: Vec<(usize, ItemTag)>,
}

pub(crate) struct Timeouts {
    pub send: Duration,
    pub recv: Duration,
    pub flush: Duration,
    pub flush_bytes: usize,
}

struct State<D: DeviceTrait> {
    tx: StreamEndpoint<D::TxStreamer>,
    rx: StreamEndpoint<D::RxStreamer>,
    tx_md: TxMetadata,
    start_time: Option<i64>,
    started: bool,
}

/// Block wrapping one or more sub-blocks of an RFNoC device.
///
/// Its stream inputs feed the TX streamers, its stream outputs are fed by the
/// RX streamers. Streamers of all blocks in the same [`CoordinationGroup`]
/// are set up and torn down in lockstep. The scheduler drives the block with
/// [`check_topology`](Self::check_topology), [`start`](Self::start),
/// [`work`](Self::work), and [`stop`](Self::stop), which can be called from
/// any thread.
pub struct RfnocBlock<D: DeviceTrait> {
    instance_name: String,
    dev: D,
    group: Arc<CoordinationGroup>,
    blocks: Vec<BlockInfo>,
    mapper: PortMapper,
    merged_args: Args,
    timeouts: Timeouts,
    state: ReentrantMutex<RefCell<State<D>>>,
}

impl<D: DeviceTrait> RfnocBlock<D> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        instance_name: String,
        dev: D,
        group: Arc<CoordinationGroup>,
        blocks: Vec<BlockInfo>,
        mapper: PortMapper,
        merged_args: Args,
        tx: StreamEndpoint<D::TxStreamer>,
        rx: StreamEndpoint<D::RxStreamer>,
        start_time: Option<i64>,
        timeouts: Timeouts,
    ) -> Self {
        Self {
            instance_name,
            dev,
            group,
            blocks,
            mapper,
            merged_args,
            timeouts,
            state: ReentrantMutex::new(RefCell::new(State {
                tx,
                rx,
                tx_md: TxMetadata::default(),
                start_time,
                started: false,
            })),
        }
    }

    /// Register the negotiated port counts with the coordination group.
    ///
    /// Blocks without ports are not waited for at the barriers. Never fails.
    pub fn check_topology(&self, n_inputs: usize, n_outputs: usize) -> bool {
        debug!(
            "{}: check_topology(), inputs {} outputs {}",
            self.instance_name, n_inputs, n_outputs
        );
        self.group.check_topology(&self.instance_name, n_inputs, n_outputs);
        true
    }

    /// Build the streamers and start streaming.
    ///
    /// Blocks until all blocks of the group with streaming ports set up their
    /// TX streamers, and again for the RX streamers. Only then RX streaming
    /// is started. On error, the block keeps no half-built streamer list and
    /// `start` can be retried.
    pub fn start(&self, n_inputs: usize, n_outputs: usize) -> Result<()> {
        let guard = self.state.lock();
        let mut s = guard.borrow_mut();
        debug!(
            "{}: start(), inputs {} outputs {}",
            self.instance_name, n_inputs, n_outputs
        );

        if n_inputs == 0 && n_outputs == 0 {
            return Ok(());
        }

        s.tx.reset_if_stale(n_inputs);
        s.rx.reset_if_stale(n_outputs);

        s.tx.build(n_inputs, |a| self.dev.tx_streamer(a))?;
        s.tx_md = TxMetadata {
            start_of_burst: false,
            end_of_burst: false,
            time_ns: s.start_time,
        };

        self.group.tx_barrier().wait()?;

        s.rx.build(n_outputs, |a| self.dev.rx_streamer(a))?;

        self.group.rx_barrier().wait()?;

        let start_time = s.start_time.take();
        if !s.rx.streamers().is_empty() {
            let cmd = match start_time {
                Some(t) => StreamCmd::start_at(t),
                None => StreamCmd::start_now(),
            };
            for st in s.rx.streamers_mut() {
                st.issue_stream_cmd(&cmd)?;
            }
        }

        s.started = true;
        Ok(())
    }

    /// Stop streaming.
    ///
    /// Sends an end-of-burst on the TX streamers, waits for the group, then
    /// stops and drains the RX streamers. Transport errors are logged.
    pub fn stop(&self, n_inputs: usize, n_outputs: usize) -> Result<()> {
        let guard = self.state.lock();
        let mut s = guard.borrow_mut();
        debug!(
            "{}: stop(), inputs {} outputs {}",
            self.instance_name, n_inputs, n_outputs
        );

        if n_inputs == 0 && n_outputs == 0 {
            return Ok(());
        }
        s.started = false;

        let md = TxMetadata {
            start_of_burst: false,
            end_of_burst: true,
            time_ns: None,
        };
        let timeout = self.timeouts.send;
        for st in s.tx.streamers_mut() {
            let empty: Vec<&[u8]> = vec![&[][..]; st.num_channels()];
            if let Err(e) = st.send(&empty, 0, &md, timeout) {
                warn!("{}: sending end of burst failed: {}", self.instance_name, e);
            }
        }
        s.tx_md = TxMetadata::default();

        self.group.tx_barrier().wait()?;

        let aligned = s.rx.is_aligned();
        let itemsize = s.rx.signature().itemsize.max(1);
        for st in s.rx.streamers_mut() {
            if let Err(e) = st.issue_stream_cmd(&StreamCmd::stop()) {
                warn!("{}: stopping RX stream failed: {}", self.instance_name, e);
            }
            let nchan = if aligned { st.num_channels() } else { 1 };
            self.flush(st, nchan, itemsize);
        }

        Ok(())
    }

    /// Run [`stop`](Self::stop) and [`start`](Self::start) without letting
    /// a `work` call in between.
    pub fn restart(&self, n_inputs: usize, n_outputs: usize) -> Result<()> {
        let _guard = self.state.lock();
        self.stop(n_inputs, n_outputs)?;
        self.start(n_inputs, n_outputs)
    }

    // receive until the streamer reports anything but a clean receive
    fn flush(&self, st: &mut D::RxStreamer, nchan: usize, itemsize: usize) {
        let nbytes = self.timeouts.flush_bytes.max(itemsize);
        let mut buffs = vec![vec![0u8; nbytes]; nchan];
        let mut md = RxMetadata::default();
        let mut drained = 0;
        loop {
            let mut refs: Vec<&mut [u8]> = buffs.iter_mut().map(|b| b.as_mut_slice()).collect();
            match st.recv(&mut refs, nbytes / itemsize, &mut md, self.timeouts.flush) {
                Ok(n) if md.error_code == RxErrorCode::None => drained += n,
                Ok(_) => break,
                Err(e) => {
                    debug!("{}: flush ended with {}", self.instance_name, e);
                    break;
                }
            }
        }
        debug!("{}: flushed {} samples", self.instance_name, drained);
    }

    /// Move samples between the stream ports and the streamers.
    ///
    /// `inputs` are the readable buffers of the input ports, `outputs` the
    /// writable buffers of the output ports, both holding whole items of
    /// [`input_item_bytes`](Self::input_item_bytes) or
    /// [`output_item_bytes`](Self::output_item_bytes).
    pub fn work(&self, inputs: &[&[u8]], outputs: &mut [&mut [u8]]) -> Result<WorkResult> {
        let guard = self.state.lock();
        let mut s = guard.borrow_mut();

        let mut res = WorkResult {
            consumed: vec![0; inputs.len()],
            produced: vec![0; outputs.len()],
            tags: Vec::new(),
        };

        // streamers are kept across stop/start, but stay idle in between
        if !s.started {
            return Ok(res);
        }

        if !inputs.is_empty() && !s.tx.streamers().is_empty() {
            if s.tx.is_aligned() {
                self.work_tx_aligned(&mut s, inputs, &mut res)?;
            } else {
                self.work_tx_unaligned(&mut s, inputs, &mut res)?;
            }
        }

        if !outputs.is_empty() && !s.rx.streamers().is_empty() {
            if s.rx.is_aligned() {
                self.work_rx_aligned(&mut s, outputs, &mut res)?;
            } else {
                self.work_rx_unaligned(&mut s, outputs, &mut res)?;
            }
        }

        Ok(res)
    }

    fn work_tx_aligned(
        &self,
        s: &mut State<D>,
        inputs: &[&[u8]],
        res: &mut WorkResult,
    ) -> Result<()> {
        let sig = s.tx.signature();
        let vlen = sig.vlen.max(1);
        let item_bytes = sig.item_bytes().max(1);
        let available = inputs.iter().map(|i| i.len() / item_bytes).min().unwrap_or(0);
        let md = s.tx_md;
        let Some(st) = s.tx.streamers_mut().first_mut() else {
            return Ok(());
        };

        let n = (st.max_num_samps() / vlen).min(available);
        if n == 0 {
            return Ok(());
        }
        let sent = st.send(inputs, n * vlen, &md, self.timeouts.send)?;
        res.consumed.iter_mut().for_each(|c| *c = sent / vlen);
        s.tx_md.time_ns = None;
        Ok(())
    }

    fn work_tx_unaligned(
        &self,
        s: &mut State<D>,
        inputs: &[&[u8]],
        res: &mut WorkResult,
    ) -> Result<()> {
        let sig = s.tx.signature();
        let vlen = sig.vlen.max(1);
        let item_bytes = sig.item_bytes().max(1);
        let md = s.tx_md;
        let mut sent_any = false;

        for (i, (st, input)) in s.tx.streamers_mut().iter_mut().zip(inputs).enumerate() {
            let n = input.len() / item_bytes;
            if n == 0 {
                continue;
            }
            let sent = st.send(&[*input], n * vlen, &md, self.timeouts.send)?;
            res.consumed[i] = sent / vlen;
            sent_any = true;
        }

        if sent_any {
            s.tx_md.time_ns = None;
        }
        Ok(())
    }

    fn work_rx_aligned(
        &self,
        s: &mut State<D>,
        outputs: &mut [&mut [u8]],
        res: &mut WorkResult,
    ) -> Result<()> {
        let sig = s.rx.signature();
        let vlen = sig.vlen.max(1);
        let item_bytes = sig.item_bytes().max(1);
        let space = outputs.iter().map(|o| o.len() / item_bytes).min().unwrap_or(0);
        let Some(st) = s.rx.streamers_mut().first_mut() else {
            return Ok(());
        };
        if space == 0 {
            return Ok(());
        }

        let mut md = RxMetadata::default();
        let nsamps = st.recv(outputs, space * vlen, &mut md, self.timeouts.recv)?;
        self.log_condition(0, &md);

        let n = nsamps / vlen;
        res.produced.iter_mut().for_each(|p| *p = n);
        if md.end_of_burst {
            for port in 0..outputs.len() {
                self.tag_eob(port, n, res);
            }
        }
        Ok(())
    }

    fn work_rx_unaligned(
        &self,
        s: &mut State<D>,
        outputs: &mut [&mut [u8]],
        res: &mut WorkResult,
    ) -> Result<()> {
        let sig = s.rx.signature();
        let vlen = sig.vlen.max(1);
        let item_bytes = sig.item_bytes().max(1);

        for (i, (st, output)) in s
            .rx
            .streamers_mut()
            .iter_mut()
            .zip(outputs.iter_mut())
            .enumerate()
        {
            let space = output.len() / item_bytes;
            if space == 0 {
                continue;
            }
            let mut md = RxMetadata::default();
            let nsamps = st.recv(&mut [&mut **output], space * vlen, &mut md, self.timeouts.recv)?;
            self.log_condition(i, &md);

            let n = nsamps / vlen;
            res.produced[i] = n;
            if md.end_of_burst {
                self.tag_eob(i, n, res);
            }
        }
        Ok(())
    }

    fn log_condition(&self, chan: usize, md: &RxMetadata) {
        match md.error_code {
            RxErrorCode::None => {}
            RxErrorCode::Timeout => debug!("{}: timeout on chan {}", self.instance_name, chan),
            RxErrorCode::Overflow => warn!("{}: overrun on chan {}", self.instance_name, chan),
            e => error!("{}: RX error on chan {}: {}", self.instance_name, chan, e),
        }
    }

    fn tag_eob(&self, port: usize, produced: usize, res: &mut WorkResult) {
        if produced == 0 {
            debug!(
                "{}: end of burst on port {} without samples",
                self.instance_name, port
            );
            return;
        }
        res.tags.push((
            port,
            ItemTag {
                index: produced - 1,
                tag: Tag::eob(),
            },
        ));
    }

    /// Apply `(key, value)` pairs to port 0 of every sub-block.
    ///
    /// Arguments the device rejects are logged and skipped.
    pub fn handle_msg<K, I>(&self, msg: I)
    where
        K: AsRef<str>,
        I: IntoIterator<Item = (K, ArgValue)>,
    {
        for (key, value) in msg {
            let key = key.as_ref();
            for b in self.blocks.iter() {
                if let Err(e) = self.dev.set_arg(&b.id, key, &value, 0) {
                    error!(
                        "{}: cannot set argument '{}' on {}: {}",
                        self.instance_name, key, b.id, e
                    );
                }
            }
        }
    }

    /// Start streaming at device time `time_ns` on the next [`start`](Self::start).
    pub fn set_start_time(&self, time_ns: i64) {
        let guard = self.state.lock();
        guard.borrow_mut().start_time = Some(time_ns);
    }

    /// Name of the block in its coordination group.
    pub fn instance_name(&self) -> &str {
        &self.instance_name
    }

    /// Sub-blocks, in port order.
    pub fn blocks(&self) -> &[BlockInfo] {
        &self.blocks
    }

    /// Mapping of the stream ports to the sub-blocks.
    pub fn port_mapper(&self) -> &PortMapper {
        &self.mapper
    }

    /// Arguments applied to all sub-blocks at construction.
    pub fn merged_args(&self) -> &Args {
        &self.merged_args
    }

    /// Coordination group of the block.
    pub fn group(&self) -> &Arc<CoordinationGroup> {
        &self.group
    }

    /// Signature of the stream inputs.
    pub fn tx_signature(&self) -> Signature {
        self.state.lock().borrow().tx.signature()
    }

    /// Signature of the stream outputs.
    pub fn rx_signature(&self) -> Signature {
        self.state.lock().borrow().rx.signature()
    }

    /// Stream args of a direction, including the routing arguments.
    pub fn stream_args(&self, dir: Direction) -> StreamArgs {
        let guard = self.state.lock();
        let s = guard.borrow();
        match dir {
            Direction::Tx => s.tx.stream_args().clone(),
            Direction::Rx => s.rx.stream_args().clone(),
        }
    }

    /// Bytes per item of the stream inputs.
    pub fn input_item_bytes(&self) -> usize {
        self.tx_signature().item_bytes()
    }

    /// Bytes per item of the stream outputs.
    pub fn output_item_bytes(&self) -> usize {
        self.rx_signature().item_bytes()
    }

    /// Number of live TX streamers.
    pub fn num_tx_streamers(&self) -> usize {
        self.state.lock().borrow().tx.streamers().len()
    }

    /// Number of live RX streamers.
    pub fn num_rx_streamers(&self) -> usize {
        self.state.lock().borrow().rx.streamers().len()
    }

    /// Whether the block was started and not stopped since.
    pub fn is_started(&self) -> bool {
        self.state.lock().borrow().started
    }
}

impl<D: DeviceTrait> Drop for RfnocBlock<D> {
    fn drop(&mut self) {
        if self.state.get_mut().get_mut().started {
            warn!("{}: dropped while streaming", self.instance_name);
            self.group.interrupt();
        }
    }
}

impl<D: DeviceTrait> std::fmt::Debug for RfnocBlock<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RfnocBlock")
            .field("instance_name", &self.instance_name)
            .field("blocks", &self.blocks)
            .field("merged_args", &self.merged_args)
            .finish()
    }
}
