pub mod agent;
pub mod config;
pub mod feed;
pub mod matcher;
pub mod models;
pub mod observer;
pub mod page;
pub mod parsing;
pub mod proposal;
pub mod relay;
pub mod store;
pub mod utils;
pub mod web;

// Re-export commonly used types
pub use agent::{Agent, PageEvent};
pub use config::AppConfig;
pub use models::{ListingCard, WatchConfig};
pub use page::Page;
pub use store::ConfigStore;
pub use utils::error::AppError;

pub type Result<T> = std::result::Result<T, AppError>;
