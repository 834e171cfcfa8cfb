//! Storage module for Overseer
//!
//! - `json`: JSON - general purpose file load/save

mod json;

pub use json::{JsonStore, APP_DIR, PROJECT_DIR};
