pub mod pool;

pub use pool::{
    AllocError, FnHooks, ObjectPool, PoolConfig, PoolHandle, PoolHooks, PoolStats, ReleaseError,
    ReleasePolicy,
};
