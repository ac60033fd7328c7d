pub mod cli;
pub mod config;
pub mod core;
pub mod events;
pub mod watcher;

pub use config::{FwatchConfig, PipelineConfig, Rule};
pub use self::core::*;
pub use events::*;
pub use watcher::*;
