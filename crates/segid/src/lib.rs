#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg))]

extern crate alloc;

mod chain_id;
mod concurrent;
mod distributor;
mod error;
mod factory;
mod mutex;
mod segment;
mod time;

pub use crate::chain_id::*;
pub use crate::concurrent::*;
pub use crate::distributor::*;
pub use crate::error::*;
pub use crate::factory::*;
pub use crate::segment::*;
pub use crate::time::*;
