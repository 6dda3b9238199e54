//! 代理层：供应商、延迟探测与代理池

pub mod pool;
pub mod probe;
pub mod provider;
pub mod record;

pub use pool::ProxyPool;
pub use probe::{HttpLatencyProbe, LatencyProbe};
pub use provider::{
    create_provider_from_config, FileProvider, HttpProvider, ProxyProvider, StaticProvider,
};
pub use record::{ProxyRecord, MIN_SUCCESS_RATE};
