//! # 桩存储模块
//!
//! 按上游标识保存预置响应（桩），支持文件、Redis 与内存后端，
//! 以及可选的读缓存装饰器。

pub mod cached;
pub mod factory;
pub mod file;
pub mod identity;
pub mod memory;
pub mod redis_store;
pub mod storage;

pub use cached::CachedStubStorage;
pub use factory::StubStorageFactory;
pub use file::FileStubStorage;
pub use identity::UpstreamIdentity;
pub use memory::MemoryStubStorage;
pub use redis_store::RedisStubStorage;
pub use storage::{StubMap, StubRecord, StubStorage};
