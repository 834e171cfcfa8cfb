//! Config - settings management
//!
//! - `supervisor.rs` - SupervisorConfig (grace periods, categories, retention)

mod supervisor;

pub use supervisor::{
    CategoryConfig, SupervisorConfig, GENERATION_CATEGORY, SUPERVISOR_CONFIG_FILE,
    TRAINING_CATEGORY,
};
