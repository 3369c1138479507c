pub mod listing;
pub mod settings;
pub mod system_setting;

// Re-exports for convenience
pub use listing::*;
pub use settings::*;
pub use system_setting::*;
