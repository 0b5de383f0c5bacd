pub mod agent;
pub mod analyze;
pub mod config;
pub mod literal;
pub mod normalize;
pub mod prompt;
pub mod types;

pub use analyze::{analyze_image, remember_assignments};
pub use types::*;
