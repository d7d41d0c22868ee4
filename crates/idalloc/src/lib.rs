#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg))]

mod allocator;
mod config;
mod error;
mod key;
mod mutex;
mod store;

pub use crate::allocator::*;
pub use crate::config::*;
pub use crate::error::*;
pub use crate::key::*;
pub use crate::store::*;
