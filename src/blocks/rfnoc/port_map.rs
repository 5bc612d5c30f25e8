use crate::device::BlockInfo;
use crate::device::Direction;
use crate::runtime::Error;
use crate::runtime::Result;

/// Sub-block port backing an external port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortMapping {
    /// Index of the sub-block in the order the block was built with
    pub block: usize,
    /// Id of the sub-block
    pub block_id: String,
    /// Port of the sub-block
    pub block_port: usize,
}

/// Maps the flattened ports of a block to the ports of its sub-blocks.
///
/// Ports are assigned in sub-block order, starting at zero for inputs (TX)
/// and outputs (RX) independently. Sub-blocks that do not support a
/// direction contribute no ports to it.
#[derive(Debug, Clone, Default)]
pub struct PortMapper {
    inputs: Vec<PortMapping>,
    outputs: Vec<PortMapping>,
}

impl PortMapper {
    /// Build the maps from the sub-blocks of a block.
    pub fn new(blocks: &[BlockInfo]) -> Self {
        Self {
            inputs: Self::assign(blocks, Direction::Tx),
            outputs: Self::assign(blocks, Direction::Rx),
        }
    }

    fn assign(blocks: &[BlockInfo], dir: Direction) -> Vec<PortMapping> {
        let mut ports = Vec::new();
        for (block, info) in blocks.iter().enumerate() {
            for block_port in 0..info.ports(dir) {
                debug!(
                    "mapped external {} port {} to {}:{}",
                    dir,
                    ports.len(),
                    info.id,
                    block_port
                );
                ports.push(PortMapping {
                    block,
                    block_id: info.id.clone(),
                    block_port,
                });
            }
        }
        ports
    }

    /// Look up the sub-block port behind an external port.
    pub fn map(&self, dir: Direction, port: usize) -> Result<&PortMapping> {
        self.mappings(dir)
            .get(port)
            .ok_or(Error::UnmappedPort(dir, port))
    }

    /// Number of external ports in `dir`.
    pub fn ports(&self, dir: Direction) -> usize {
        self.mappings(dir).len()
    }

    fn mappings(&self, dir: Direction) -> &[PortMapping] {
        match dir {
            Direction::Tx => &self.inputs,
            Direction::Rx => &self.outputs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::BlockKind;

    fn source(id: &str, n: usize) -> BlockInfo {
        BlockInfo::new(id, BlockKind::Source, 0, n, 1)
    }

    #[test]
    fn sequential_outputs() {
        let blocks = vec![source("0/A_0", 2), source("0/B_0", 1), source("0/C_0", 3)];
        let m = PortMapper::new(&blocks);

        assert_eq!(m.ports(Direction::Rx), 6);
        assert_eq!(m.ports(Direction::Tx), 0);

        let expected = [(0, 0), (0, 1), (1, 0), (2, 0), (2, 1), (2, 2)];
        for (port, (block, block_port)) in expected.into_iter().enumerate() {
            let p = m.map(Direction::Rx, port).unwrap();
            assert_eq!(p.block, block);
            assert_eq!(p.block_id, blocks[block].id);
            assert_eq!(p.block_port, block_port);
        }
    }

    #[test]
    fn directions_are_independent() {
        let blocks = vec![
            BlockInfo::new("0/Radio_0", BlockKind::Source, 0, 2, 1),
            BlockInfo::new("0/DUC_0", BlockKind::Sink, 1, 0, 1),
            BlockInfo::new("0/FIR_0", BlockKind::SinkSource, 1, 1, 1),
        ];
        let m = PortMapper::new(&blocks);

        let tx0 = m.map(Direction::Tx, 0).unwrap();
        assert_eq!((tx0.block, tx0.block_port), (1, 0));
        let tx1 = m.map(Direction::Tx, 1).unwrap();
        assert_eq!((tx1.block, tx1.block_port), (2, 0));
        let rx2 = m.map(Direction::Rx, 2).unwrap();
        assert_eq!((rx2.block, rx2.block_port), (2, 0));
    }

    #[test]
    fn unmapped() {
        let m = PortMapper::new(&[source("0/A_0", 1)]);
        assert_eq!(
            m.map(Direction::Rx, 1).unwrap_err(),
            Error::UnmappedPort(Direction::Rx, 1)
        );
        assert!(m.map(Direction::Tx, 0).is_err());
    }

    #[test]
    fn ports_of_unsupported_direction_are_ignored() {
        // declared inputs of a source-only block are not streamable
        let blocks = vec![BlockInfo::new("0/Radio_0", BlockKind::Source, 2, 1, 1)];
        let m = PortMapper::new(&blocks);
        assert_eq!(m.ports(Direction::Tx), 0);
        assert_eq!(m.ports(Direction::Rx), 1);
    }
}
