mod host_pool;
mod reconnection;
mod sharding;

pub(crate) use self::host_pool::{HostPool, PoolEvent};
pub use self::reconnection::{ConstantReconnection, ExponentialReconnection};
pub use self::sharding::ShardingInfo;
