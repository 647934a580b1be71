//! CLI command implementations

mod build;
mod info;

pub use build::build;
pub use info::info;
