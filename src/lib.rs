#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Coordinated streamer setup for FutureSDR blocks that share an RFNoC device.
//!
//! Several independently scheduled blocks can wrap sub-blocks of the same
//! FPGA image. Their host-side streamers have to be created and torn down as
//! one group: nobody may start the shared stream before every sibling has
//! requested its streamers. This crate provides
//! * a re-enterable, interruptible rendezvous [`ReusableBarrier`](runtime::ReusableBarrier),
//! * a [`CoordinationGroup`](runtime::CoordinationGroup) that tracks which
//!   blocks actually stream and sizes the barriers accordingly,
//! * the [`RfnocBlock`](blocks::rfnoc::RfnocBlock) lifecycle
//!   (`check_topology`, `start`, `work`, `stop`) built on top of them.
//!
//! ## Example
//! Two blocks on a mocked device, started from separate threads:
//! ```
//! use std::sync::Arc;
//! use futuresdr_rfnoc::blocks::rfnoc::RfnocBlockBuilder;
//! use futuresdr_rfnoc::device::mock::MockDevice;
//! use futuresdr_rfnoc::device::BlockKind;
//! use futuresdr_rfnoc::device::StreamArgs;
//! use futuresdr_rfnoc::runtime::CoordinationGroup;
//! use futuresdr_rfnoc::runtime::Error;
//!
//! fn main() -> Result<(), Error> {
//!     let dev = MockDevice::new();
//!     dev.add_block("0/DDC_0", BlockKind::SinkSource, 1, 1, 1);
//!     dev.add_block("0/DUC_0", BlockKind::SinkSource, 1, 1, 1);
//!     let group = Arc::new(CoordinationGroup::new());
//!
//!     let mut handles = Vec::new();
//!     for id in ["0/DDC_0", "0/DUC_0"] {
//!         let blk = RfnocBlockBuilder::new(dev.clone(), group.clone())
//!             .block_id(id)
//!             .tx_args(StreamArgs::new("fc32").channels(vec![0]))
//!             .rx_args(StreamArgs::new("fc32").channels(vec![0]))
//!             .build()?;
//!         blk.check_topology(1, 1);
//!         handles.push(std::thread::spawn(move || {
//!             blk.start(1, 1)?;
//!             blk.stop(1, 1)
//!         }));
//!     }
//!     for h in handles {
//!         h.join().expect("participant panicked")?;
//!     }
//!     Ok(())
//! }
//! ```

/// Logging macro
#[macro_use]
pub extern crate tracing;

// re-exports
pub use anyhow;

pub mod blocks;
pub mod device;
pub mod runtime;
