//! JSON storage

mod store;

pub use store::{JsonStore, APP_DIR, PROJECT_DIR};
