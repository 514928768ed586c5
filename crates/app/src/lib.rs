pub mod api;
pub mod config;
pub mod error;
pub mod repository;
pub mod services;

pub use api::{BlockStatsResponse, PurgeQuery, PurgeResponse, RecordsQuery, StatsQuery};
pub use config::{TrackerConfig, parse_timezone};
pub use error::{ApiError, AppError, Result};
pub use repository::{LocalRepository, RemoteRepository, UsageRepository};
