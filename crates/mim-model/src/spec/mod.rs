mod pool;
pub use pool::PoolSpec;
