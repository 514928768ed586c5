pub mod blocks;
pub mod cache;
pub mod stats;

pub use blocks::BlockUsage;
pub use cache::{CACHE_TTL, StatsCache};
pub use stats::{BlockProgressView, RecordSource};
