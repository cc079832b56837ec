pub mod app;
pub mod city;
pub mod config;
pub mod event;
pub mod shortcuts;
pub mod transport;
pub mod util;

pub use config::CityConfig;
pub use util::pool::{ObjectPool, PoolConfig, PoolHandle, PoolHooks, ReleasePolicy};
