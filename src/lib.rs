//! Service discovery on a strongly consistent key-value store.
//!
//! - [`Registry`] advertises service instances and keeps watched services
//!   cached in memory, converged with the store through [`Watcher`]s.
//! - [`ConfigSource`] loads configuration values stored under a key or
//!   prefix and re-loads them on change.
//!
//! The store itself is abstracted by [`StoreClient`].

mod config;
mod constants;
mod errors;
mod registry;
mod source;
mod store;

pub use config::*;
pub use errors::*;
pub use registry::*;
pub use source::*;
pub use store::*;

//-----------------------------------------------------------
// Test utils

#[cfg(test)]
pub(crate) mod test_utils;
