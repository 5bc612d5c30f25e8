use std::fmt;

use crate::blocks::rfnoc::PortMapper;
use crate::blocks::rfnoc::PortMapping;
use crate::device::BlockInfo;
use crate::device::Direction;
use crate::device::StreamArgs;
use crate::device::bytes_per_item;
use crate::device::cast_arg;
use crate::runtime::Error;
use crate::runtime::Result;

/// Stream signature of one direction of a block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Signature {
    /// Bytes per sample on the host
    pub itemsize: usize,
    /// Number of streaming ports
    pub nchans: usize,
    /// Samples per item
    pub vlen: usize,
}

impl Signature {
    /// Derive the signature from the stream args and the sub-blocks that
    /// support the direction.
    ///
    /// Without sub-blocks, all fields are zero. The vector length is taken
    /// from port 0 of the first sub-block. A `gr_vlen` argument of 1 forces
    /// scalar items, any other value has to agree with the sub-block.
    pub fn derive(dir: Direction, stream_args: &StreamArgs, blocks: &[&BlockInfo]) -> Result<Self> {
        let Some(first) = blocks.first() else {
            return Ok(Self::default());
        };
        if stream_args.cpu_format.is_empty() {
            return Err(Error::MissingCpuFormat(dir));
        }
        let itemsize = bytes_per_item(&stream_args.cpu_format)?;

        let mut nchans = 0;
        for b in blocks.iter() {
            let n = b.ports(dir);
            debug!("{} has {} {} ports", b.id, n, dir);
            nchans += n;
        }

        let mut vlen = match first.vlen(dir, 0).unwrap_or(0) {
            0 => 1,
            v => v,
        };
        let gr_vlen = cast_arg::<i64>(&stream_args.args, "gr_vlen", -1);
        match gr_vlen {
            -1 => {}
            1 => vlen = 1,
            g if g < 1 => return Err(Error::InvalidArgs(format!("gr_vlen={g}"))),
            g => {
                let g = g as usize;
                if vlen != 1 && vlen != g {
                    return Err(Error::VlenMismatch {
                        requested: g,
                        vlen,
                    });
                }
                vlen = g;
            }
        }

        Ok(Self {
            itemsize,
            nchans,
            vlen,
        })
    }

    /// Bytes per item as seen by the flowgraph.
    pub fn item_bytes(&self) -> usize {
        self.itemsize * self.vlen
    }
}

/// Host side of one stream direction of a block.
///
/// Holds the stream configuration and the streamers built from it. The
/// streamer list is either empty or complete: one streamer in aligned mode,
/// one per port otherwise.
pub struct StreamEndpoint<S> {
    direction: Direction,
    stream_args: StreamArgs,
    signature: Signature,
    align: bool,
    routes: Vec<PortMapping>,
    streamers: Vec<S>,
    ports: usize,
}

impl<S> StreamEndpoint<S> {
    /// Set up the endpoint for the sub-blocks of a block.
    ///
    /// Adds `block_id<n>`/`block_port<n>` routing arguments for every
    /// requested channel.
    pub fn new(
        direction: Direction,
        mut stream_args: StreamArgs,
        blocks: &[BlockInfo],
        mapper: &PortMapper,
    ) -> Result<Self> {
        let supported: Vec<&BlockInfo> = blocks
            .iter()
            .filter(|b| b.kind.supports(direction))
            .collect();
        let signature = Signature::derive(direction, &stream_args, &supported)?;

        if stream_args.channels.len() > signature.nchans {
            error!(
                "{} stream args request {} channels, block only has {}",
                direction,
                stream_args.channels.len(),
                signature.nchans
            );
            return Err(Error::ChannelMismatch {
                direction,
                requested: stream_args.channels.len(),
                available: signature.nchans,
            });
        }

        let channels = stream_args.channels.clone();
        let args = &mut stream_args.args;
        for c in channels {
            let route = mapper.map(direction, c)?;
            args.set(format!("block_id{c}"), route.block_id.clone());
            args.set(format!("block_port{c}"), route.block_port.to_string());
            debug!(
                "{}: block_id{} = {}, block_port{} = {}",
                direction, c, route.block_id, c, route.block_port
            );
        }

        let routes = (0..mapper.ports(direction))
            .map(|p| mapper.map(direction, p).cloned())
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            direction,
            align: stream_args.is_aligned(),
            stream_args,
            signature,
            routes,
            streamers: Vec::new(),
            ports: 0,
        })
    }

    /// Build the streamers for `ports` connected ports.
    ///
    /// Does nothing if there are no ports or the streamers already exist. On
    /// error, no streamer is kept.
    pub fn build<F>(&mut self, ports: usize, mut create: F) -> Result<()>
    where
        F: FnMut(&StreamArgs) -> Result<S>,
    {
        if ports == 0 || !self.streamers.is_empty() {
            return Ok(());
        }

        let built = if self.align {
            self.build_aligned(ports, &mut create)
        } else {
            self.build_unaligned(ports, &mut create)
        };

        match built {
            Ok(s) => {
                self.streamers = s;
                self.ports = ports;
                Ok(())
            }
            Err(e) => {
                error!("{}", e);
                self.clear();
                Err(e)
            }
        }
    }

    fn build_aligned<F>(&self, ports: usize, create: &mut F) -> Result<Vec<S>>
    where
        F: FnMut(&StreamArgs) -> Result<S>,
    {
        let channels = self.stream_args.channels.len();
        if ports != channels {
            return Err(Error::AlignedChannelMismatch {
                direction: self.direction,
                channels,
                ports,
            });
        }
        debug!(
            "creating one aligned {} streamer for {} ports (cpu: {} otw: {} args: {})",
            self.direction,
            ports,
            self.stream_args.cpu_format,
            self.stream_args.otw_format,
            self.stream_args.args
        );
        let s = create(&self.stream_args).map_err(|e| self.creation_error(0, e))?;
        Ok(vec![s])
    }

    fn build_unaligned<F>(&self, ports: usize, create: &mut F) -> Result<Vec<S>>
    where
        F: FnMut(&StreamArgs) -> Result<S>,
    {
        let mut streamers = Vec::with_capacity(ports);
        for port in 0..ports {
            let route = self
                .routes
                .get(port)
                .ok_or(Error::UnmappedPort(self.direction, port))?;
            let mut args = self.stream_args.clone();
            args.channels = vec![port];
            args.args.set("block_id", route.block_id.clone());
            args.args.set("block_port", route.block_port.to_string());
            debug!("creating {} streamer with: {}", self.direction, args.args);
            streamers.push(create(&args).map_err(|e| self.creation_error(port, e))?);
        }
        Ok(streamers)
    }

    fn creation_error(&self, port: usize, e: Error) -> Error {
        Error::StreamerCreation {
            direction: self.direction,
            block: self
                .routes
                .get(port)
                .map(|r| r.block_id.clone())
                .unwrap_or_default(),
            reason: e.to_string(),
        }
    }

    /// Drop the streamers if they were built for a different port count.
    ///
    /// Returns `true` if streamers were dropped.
    pub fn reset_if_stale(&mut self, ports: usize) -> bool {
        if !self.streamers.is_empty() && self.ports != ports {
            debug!(
                "{}: topology changed from {} to {} ports, dropping streamers",
                self.direction, self.ports, ports
            );
            self.clear();
            true
        } else {
            false
        }
    }

    /// Drop all streamers.
    pub fn clear(&mut self) {
        self.streamers.clear();
        self.ports = 0;
    }

    /// Stream direction.
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Stream args, including the routing arguments.
    pub fn stream_args(&self) -> &StreamArgs {
        &self.stream_args
    }

    /// Stream signature.
    pub fn signature(&self) -> Signature {
        self.signature
    }

    /// Whether one streamer serves all channels.
    pub fn is_aligned(&self) -> bool {
        self.align
    }

    /// Live streamers.
    pub fn streamers(&self) -> &[S] {
        &self.streamers
    }

    /// Live streamers.
    pub fn streamers_mut(&mut self) -> &mut [S] {
        &mut self.streamers
    }
}

impl<S> fmt::Debug for StreamEndpoint<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamEndpoint")
            .field("direction", &self.direction)
            .field("stream_args", &self.stream_args)
            .field("signature", &self.signature)
            .field("align", &self.align)
            .field("streamers", &self.streamers.len())
            .field("ports", &self.ports)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::BlockKind;
    use crate::device::get_arg;

    fn endpoint(
        dir: Direction,
        args: StreamArgs,
        blocks: &[BlockInfo],
    ) -> Result<StreamEndpoint<usize>> {
        StreamEndpoint::new(dir, args, blocks, &PortMapper::new(blocks))
    }

    #[test]
    fn signature_defaults() {
        let ddc = BlockInfo::new("0/DDC_0", BlockKind::SinkSource, 2, 2, 0);
        let s = Signature::derive(Direction::Rx, &StreamArgs::new("sc16"), &[&ddc]).unwrap();
        assert_eq!(
            s,
            Signature {
                itemsize: 4,
                nchans: 2,
                vlen: 1
            }
        );
        assert_eq!(
            Signature::derive(Direction::Rx, &StreamArgs::default(), &[]).unwrap(),
            Signature::default()
        );
    }

    #[test]
    fn signature_gr_vlen() {
        let fft = BlockInfo::new("0/FFT_0", BlockKind::SinkSource, 1, 1, 256);
        let scalar = BlockInfo::new("0/FIR_0", BlockKind::SinkSource, 1, 1, 1);

        let fc32 = StreamArgs::new("fc32");

        let s = Signature::derive(Direction::Tx, &fc32, &[&fft]).unwrap();
        assert_eq!(s.vlen, 256);
        assert_eq!(s.item_bytes(), 2048);

        let s = Signature::derive(Direction::Tx, &fc32.clone().vlen(1), &[&fft]).unwrap();
        assert_eq!(s.vlen, 1);

        let s = Signature::derive(Direction::Tx, &fc32.clone().vlen(16), &[&scalar]).unwrap();
        assert_eq!(s.vlen, 16);

        let e = Signature::derive(Direction::Tx, &fc32.vlen(16), &[&fft]).unwrap_err();
        assert_eq!(
            e,
            Error::VlenMismatch {
                requested: 16,
                vlen: 256
            }
        );
    }

    #[test]
    fn signature_needs_format() {
        let b = BlockInfo::new("0/DDC_0", BlockKind::SinkSource, 1, 1, 1);
        assert_eq!(
            Signature::derive(Direction::Tx, &StreamArgs::default(), &[&b]).unwrap_err(),
            Error::MissingCpuFormat(Direction::Tx)
        );
        assert!(matches!(
            Signature::derive(Direction::Tx, &StreamArgs::new("fc31"), &[&b]),
            Err(Error::UnknownCpuFormat(_))
        ));
    }

    #[test]
    fn routing_args() {
        let blocks = vec![
            BlockInfo::new("0/DDC_0", BlockKind::Source, 0, 1, 1),
            BlockInfo::new("0/DDC_1", BlockKind::Source, 0, 2, 1),
        ];
        let args = StreamArgs::new("fc32").channels(vec![0, 2]);
        let e = endpoint(Direction::Rx, args, &blocks).unwrap();
        let a = &e.stream_args().args;
        assert_eq!(get_arg(a, "block_id0").as_deref(), Some("0/DDC_0"));
        assert_eq!(get_arg(a, "block_port0").as_deref(), Some("0"));
        assert_eq!(get_arg(a, "block_id2").as_deref(), Some("0/DDC_1"));
        assert_eq!(get_arg(a, "block_port2").as_deref(), Some("1"));
    }

    #[test]
    fn too_many_channels() {
        let blocks = vec![BlockInfo::new("0/DUC_0", BlockKind::Sink, 1, 0, 1)];
        let args = StreamArgs::new("fc32").channels(vec![0, 1]);
        let e = endpoint(Direction::Tx, args, &blocks).unwrap_err();
        assert_eq!(
            e,
            Error::ChannelMismatch {
                direction: Direction::Tx,
                requested: 2,
                available: 1
            }
        );
    }

    #[test]
    fn build_unaligned_keeps_nothing_on_failure() {
        let blocks = vec![BlockInfo::new("0/DDC_0", BlockKind::Source, 0, 3, 1)];
        let args = StreamArgs::new("fc32").channels(vec![0, 1, 2]);
        let mut e = endpoint(Direction::Rx, args, &blocks).unwrap();

        let r = e.build(3, |a| {
            if a.channels == vec![2] {
                Err(Error::Device("busy".to_string()))
            } else {
                Ok(a.channels[0])
            }
        });
        assert!(matches!(r, Err(Error::StreamerCreation { .. })));
        assert!(e.streamers().is_empty());

        e.build(3, |a| {
            assert_eq!(a.get("block_port"), Some(a.channels[0].to_string()));
            Ok(a.channels[0])
        })
        .unwrap();
        assert_eq!(e.streamers(), &[0, 1, 2]);
    }

    #[test]
    fn build_aligned() {
        let blocks = vec![BlockInfo::new("0/DDC_0", BlockKind::Source, 0, 2, 1)];
        let args = StreamArgs::new("fc32").channels(vec![0, 1]).align(true);
        let mut e = endpoint(Direction::Rx, args, &blocks).unwrap();
        assert!(e.is_aligned());

        assert!(matches!(
            e.build(1, |_| Ok(0)),
            Err(Error::AlignedChannelMismatch { .. })
        ));
        e.build(2, |a| Ok(a.channels.len())).unwrap();
        assert_eq!(e.streamers(), &[2]);

        assert!(!e.reset_if_stale(2));
        assert!(e.reset_if_stale(1));
        assert!(e.streamers().is_empty());
    }
}
