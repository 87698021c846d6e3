//! Tally Storage
//!
//! One embedded LMDB environment per named store, a registry that opens each
//! store once, a result cache with per-store invalidation, and the
//! [`AccessBroker`] that serializes access per store name.

pub mod broker;
pub mod cache;
pub mod engine;
pub mod registry;

pub use broker::{AccessBroker, BrokerConfig, Checkout, Served};
pub use cache::{CacheKey, CacheStats, ResultCache};
pub use engine::{EngineError, EngineOptions, StoreHandle};
pub use registry::Registry;
