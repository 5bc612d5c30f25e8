use bytemuck::Pod;
use std::mem::size_of;

use crate::blocks::rfnoc::RfnocBlock;
use crate::blocks::rfnoc::WorkResult;
use crate::device::DeviceTrait;
use crate::device::Direction;
use crate::runtime::ItemTag;
use crate::runtime::Result;

/// Mocker for a block
///
/// A harness to run an [`RfnocBlock`] without a scheduler. Used for unit
/// tests. The block gets one input per TX channel and one output per RX
/// channel of its stream args.
pub struct Mocker<D: DeviceTrait> {
    block: RfnocBlock<D>,
    inputs: Vec<MockReader>,
    outputs: Vec<MockWriter>,
}

impl<D: DeviceTrait> Mocker<D> {
    /// Create mocker
    pub fn new(block: RfnocBlock<D>) -> Self {
        let n_inputs = block.stream_args(Direction::Tx).channels.len();
        let n_outputs = block.stream_args(Direction::Rx).channels.len();
        Mocker {
            block,
            inputs: (0..n_inputs).map(|_| MockReader::default()).collect(),
            outputs: (0..n_outputs).map(|_| MockWriter::default()).collect(),
        }
    }

    /// The wrapped block
    pub fn block(&self) -> &RfnocBlock<D> {
        &self.block
    }

    /// Add data to an input buffer
    ///
    /// `T` is plain old data, e.g., `Complex32` or `u32`.
    pub fn input<T: Pod>(&mut self, id: usize, data: Vec<T>) {
        self.inputs[id]
            .data
            .extend_from_slice(bytemuck::cast_slice(&data));
    }

    /// Initialize output buffer with room for `size` values of `T`
    pub fn init_output<T: Pod>(&mut self, id: usize, size: usize) {
        self.outputs[id] = MockWriter {
            capacity: size * size_of::<T>(),
            ..MockWriter::default()
        };
    }

    /// Register the ports with the coordination group and start the block
    pub fn init(&mut self) -> Result<()> {
        self.block.check_topology(self.inputs.len(), self.outputs.len());
        self.block.start(self.inputs.len(), self.outputs.len())
    }

    /// Stop the block
    pub fn deinit(&mut self) -> Result<()> {
        self.block.stop(self.inputs.len(), self.outputs.len())
    }

    /// Call `work` until the block makes no more progress
    ///
    /// Returns the accumulated items consumed and produced per port.
    pub fn run(&mut self) -> Result<WorkResult> {
        let mut total = WorkResult {
            consumed: vec![0; self.inputs.len()],
            produced: vec![0; self.outputs.len()],
            tags: Vec::new(),
        };

        loop {
            let res = self.work()?;
            let progress =
                res.consumed.iter().any(|c| *c > 0) || res.produced.iter().any(|p| *p > 0);
            for (t, c) in total.consumed.iter_mut().zip(res.consumed) {
                *t += c;
            }
            for (t, p) in total.produced.iter_mut().zip(res.produced) {
                *t += p;
            }
            total.tags.extend(res.tags);
            if !progress {
                break;
            }
        }

        Ok(total)
    }

    fn work(&mut self) -> Result<WorkResult> {
        let in_bytes = self.block.input_item_bytes().max(1);
        let out_bytes = self.block.output_item_bytes().max(1);

        let mut scratch: Vec<Vec<u8>> = self
            .outputs
            .iter()
            .map(|o| vec![0u8; o.space() / out_bytes * out_bytes])
            .collect();
        let res = {
            let inputs: Vec<&[u8]> = self.inputs.iter().map(|i| i.data.as_slice()).collect();
            let mut outputs: Vec<&mut [u8]> =
                scratch.iter_mut().map(|s| s.as_mut_slice()).collect();
            self.block.work(&inputs, &mut outputs)?
        };

        for (r, c) in self.inputs.iter_mut().zip(res.consumed.iter()) {
            r.consume(c * in_bytes);
        }
        for (i, (w, s)) in self.outputs.iter_mut().zip(scratch.iter()).enumerate() {
            let tags = res
                .tags
                .iter()
                .filter(|(port, _)| *port == i)
                .map(|(_, t)| t.clone())
                .collect();
            w.produce(&s[..res.produced[i] * out_bytes], out_bytes, tags);
        }

        Ok(res)
    }

    /// Get data from output buffer
    pub fn output<T: Pod>(&self, id: usize) -> (Vec<T>, Vec<ItemTag>) {
        self.outputs[id].get()
    }

    /// Taking data from output buffer, freeing up the buffer
    pub fn take_output<T: Pod>(&mut self, id: usize) -> (Vec<T>, Vec<ItemTag>) {
        self.outputs[id].take()
    }

    /// Bytes not yet consumed on an input
    pub fn pending_input(&self, id: usize) -> usize {
        self.inputs[id].data.len()
    }
}

#[derive(Debug, Default)]
struct MockReader {
    data: Vec<u8>,
}

impl MockReader {
    fn consume(&mut self, amount: usize) {
        self.data.drain(..amount.min(self.data.len()));
    }
}

#[derive(Debug, Default)]
struct MockWriter {
    data: Vec<u8>,
    capacity: usize,
    items: usize,
    tags: Vec<ItemTag>,
}

impl MockWriter {
    fn space(&self) -> usize {
        self.capacity.saturating_sub(self.data.len())
    }

    fn produce(&mut self, bytes: &[u8], item_bytes: usize, tags: Vec<ItemTag>) {
        let offset = self.items;
        self.data.extend_from_slice(bytes);
        self.items += bytes.len() / item_bytes;
        self.tags.extend(tags.into_iter().map(|mut t| {
            t.index += offset;
            t
        }));
    }

    fn get<T: Pod>(&self) -> (Vec<T>, Vec<ItemTag>) {
        let size = size_of::<T>();
        if size == 0 {
            return (Vec::new(), self.tags.clone());
        }
        let whole = self.data.len() / size * size;
        (
            bytemuck::pod_collect_to_vec(&self.data[..whole]),
            self.tags.clone(),
        )
    }

    fn take<T: Pod>(&mut self) -> (Vec<T>, Vec<ItemTag>) {
        let ret = self.get();
        self.data.clear();
        self.tags.clear();
        self.items = 0;
        ret
    }
}
