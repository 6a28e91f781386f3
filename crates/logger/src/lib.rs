//! Tracing setup shared by the uppe binaries.

mod subscriber;

pub use subscriber::init;
pub use tracing::level_filters::LevelFilter;
