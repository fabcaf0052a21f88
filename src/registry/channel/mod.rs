pub mod memory_repository;
pub mod model;
pub mod redis_repository;

pub use memory_repository::MemoryChannelsRepository;
pub use model::*;
pub use redis_repository::RedisChannelsRepository;
