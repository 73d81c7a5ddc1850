//! Talking to a Bitcoin Core wallet node.

pub mod client;
pub mod traits;
pub mod types;

#[cfg(any(test, feature = "test-util"))]
pub mod test_utils;

#[cfg(any(test, feature = "test-util"))]
pub mod test_support;

pub use client::{Auth, RpcChainClient};
pub use traits::{ChainClient, ChainResult};
