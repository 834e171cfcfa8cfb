//! # overseer-foundation
//!
//! Foundation layer for Overseer:
//! - Error: shared error type
//! - Storage: JsonStore (global + project JSON files)
//! - Config: SupervisorConfig and per-category job settings

pub mod config;
pub mod error;
pub mod storage;

// ============================================================================
// Error
// ============================================================================
pub use error::{Error, Result};

// ============================================================================
// Storage
// ============================================================================
pub use storage::JsonStore;

// ============================================================================
// Config
// ============================================================================
pub use config::{
    CategoryConfig, SupervisorConfig, GENERATION_CATEGORY, SUPERVISOR_CONFIG_FILE,
    TRAINING_CATEGORY,
};
