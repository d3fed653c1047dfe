//! # CLI UI Module
//!
//! Styling and formatting layer for rmerge output.
//!
//! - `color`: color mode selection and terminal width
//! - `style`: message prefixes and colored labels
//! - `format`: truncation and path display helpers
//! - `table`: comfy-table renderers for candidates, analyses and merges
//! - `progress`: spinner while the pipeline runs

pub mod color;
pub mod format;
pub mod progress;
pub mod style;
pub mod table;

pub use color::ColorMode;
pub use progress::{Progress, ProgressMode};
pub use style::{MessageType, Style};
