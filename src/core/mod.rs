//! Core routing functionality
//!
//! Contains the rule index, collision resolution, the move engine and the
//! event pipeline that ties them together

pub mod collision;
pub mod mover;
pub mod pipeline;
pub mod rules;

// Re-export main types
pub use collision::{Clock, CollisionResolver, FixedClock, SystemClock};
pub use mover::{copy_and_remove, FileMover, MoveError};
pub use pipeline::{EventPipeline, PipelineError};
pub use rules::RuleIndex;
