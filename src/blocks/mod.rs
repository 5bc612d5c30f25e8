//! ## Hardware blocks
//! | Block | Usage | WebAssembly? |
//! |---|---|---|
//! | [RfnocBlock](rfnoc::RfnocBlockBuilder) | Stream to and from sub-blocks of an RFNoC device | ❌ |

pub mod rfnoc;
