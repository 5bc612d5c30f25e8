use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use crate::blocks::rfnoc::PortMapper;
use crate::blocks::rfnoc::RfnocBlock;
use crate::blocks::rfnoc::StreamEndpoint;
use crate::blocks::rfnoc::block::Timeouts;
use crate::blocks::rfnoc::make_block_id_multi;
use crate::device::DeviceTrait;
use crate::device::Direction;
use crate::device::StreamArgs;
use crate::device::args_empty;
use crate::device::merge_args;
use crate::runtime::CoordinationGroup;
use crate::runtime::Error;
use crate::runtime::Result;
use crate::runtime::config::config;

static INSTANCE: AtomicUsize = AtomicUsize::new(0);

/// Build an [`RfnocBlock`].
///
/// ```
/// # use std::sync::Arc;
/// # use futuresdr_rfnoc::blocks::rfnoc::RfnocBlockBuilder;
/// # use futuresdr_rfnoc::device::mock::MockDevice;
/// # use futuresdr_rfnoc::device::BlockKind;
/// # use futuresdr_rfnoc::device::StreamArgs;
/// # use futuresdr_rfnoc::runtime::CoordinationGroup;
/// # fn main() -> futuresdr_rfnoc::runtime::Result<()> {
/// let dev = MockDevice::new();
/// dev.add_block("0/DDC_0", BlockKind::SinkSource, 2, 2, 1);
///
/// let blk = RfnocBlockBuilder::new(dev, Arc::new(CoordinationGroup::new()))
///     .block_ids("DDC", &[0], &[0])
///     .tx_args(StreamArgs::new("fc32").channels(vec![0, 1]).align(true))
///     .rx_args(StreamArgs::new("fc32").channels(vec![0, 1]))
///     .build()?;
/// assert_eq!(blk.input_item_bytes(), 8);
/// # Ok(())
/// # }
/// ```
pub struct RfnocBlockBuilder<D: DeviceTrait> {
    dev: D,
    group: Arc<CoordinationGroup>,
    block_id: String,
    instance_name: Option<String>,
    tx_args: StreamArgs,
    rx_args: StreamArgs,
    start_time: Option<i64>,
}

impl<D: DeviceTrait> RfnocBlockBuilder<D> {
    /// Create a builder for a block on `dev`, coordinating with `group`.
    pub fn new(dev: D, group: Arc<CoordinationGroup>) -> Self {
        Self {
            dev,
            group,
            block_id: String::new(),
            instance_name: None,
            tx_args: StreamArgs::default(),
            rx_args: StreamArgs::default(),
            start_time: None,
        }
    }

    /// Comma separated ids of the sub-blocks, e.g., `0/DDC_0,0/FIR_0`.
    pub fn block_id(mut self, id: impl Into<String>) -> Self {
        self.block_id = id.into();
        self
    }

    /// Compose the sub-block ids with [`make_block_id_multi`].
    pub fn block_ids(mut self, names: &str, block_selects: &[i32], device_selects: &[i32]) -> Self {
        self.block_id = make_block_id_multi(names, block_selects, device_selects);
        self
    }

    /// Name in the coordination group. Has to be unique within the group.
    pub fn instance_name(mut self, name: impl Into<String>) -> Self {
        self.instance_name = Some(name.into());
        self
    }

    /// Stream args of the stream inputs.
    pub fn tx_args(mut self, args: StreamArgs) -> Self {
        self.tx_args = args;
        self
    }

    /// Stream args of the stream outputs.
    pub fn rx_args(mut self, args: StreamArgs) -> Self {
        self.rx_args = args;
        self
    }

    /// Start streaming at device time `time_ns` on the first start.
    pub fn start_time(mut self, time_ns: i64) -> Self {
        self.start_time = Some(time_ns);
        self
    }

    /// Resolve the sub-blocks, configure them, and create the block.
    pub fn build(self) -> Result<RfnocBlock<D>> {
        let ids: Vec<&str> = self
            .block_id
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();
        if ids.is_empty() {
            return Err(Error::BlockNotFound(self.block_id.clone()));
        }
        if ids.len() > 1 {
            info!("configuring RFNoC multi block {}", self.block_id);
        }

        let mut blocks = Vec::with_capacity(ids.len());
        for id in ids {
            debug!("finding block for: {}", id);
            let found = self.dev.find_blocks(id);
            let first = found
                .first()
                .ok_or_else(|| Error::BlockNotFound(id.to_string()))?;
            blocks.push(self.dev.block_info(first)?);
        }

        let mapper = PortMapper::new(&blocks);

        let excluded = BTreeSet::from(["align", "gr_vlen"]);
        let merged_args = merge_args(&self.tx_args.args, &self.rx_args.args, &excluded)?;
        if !args_empty(&merged_args) {
            for b in blocks.iter() {
                self.dev.set_args(&b.id, &merged_args)?;
            }
        }

        let tx = StreamEndpoint::new(Direction::Tx, self.tx_args, &blocks, &mapper)?;
        let rx = StreamEndpoint::new(Direction::Rx, self.rx_args, &blocks, &mapper)?;

        let instance_name = self.instance_name.unwrap_or_else(|| {
            format!(
                "{}#{}",
                blocks
                    .iter()
                    .map(|b| b.id.as_str())
                    .collect::<Vec<_>>()
                    .join(","),
                INSTANCE.fetch_add(1, Ordering::Relaxed)
            )
        });

        let c = config();
        let timeouts = Timeouts {
            send: c.send_timeout(),
            recv: c.recv_timeout(),
            flush: c.flush_timeout(),
            flush_bytes: c.flush_bytes,
        };

        Ok(RfnocBlock::new(
            instance_name,
            self.dev,
            self.group,
            blocks,
            mapper,
            merged_args,
            tx,
            rx,
            self.start_time,
            timeouts,
        ))
    }
}
