//! Error Types
//!
//! This module defines the error types used throughout the engine.
//!
//! # Overview
//!
//! The main error type [`LoomError`] covers the failure modes reported by
//! collaborators and by binding validation:
//! - Pipeline creation failures
//! - Buffer and binding-set allocation failures
//! - Custom resource layout mismatches
//!
//! Problems with a single draw never reach the host: they are logged and the
//! draw is skipped or a safe default is substituted. Only collaborator
//! failures (uploads, pool rebuilds) propagate out of a frame.
//!
//! # Usage
//!
//! ```rust,ignore
//! use loom_core::errors::{LoomError, Result};
//!
//! fn create() -> Result<()> {
//!     Ok(())
//! }
//! ```

use thiserror::Error;

/// The main error type for the Loom engine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoomError {
    // ========================================================================
    // Pipeline Errors
    // ========================================================================
    /// The pipeline factory failed to create a pipeline object.
    #[error("Pipeline creation failed: {0}")]
    PipelineCreationFailed(String),

    // ========================================================================
    // Resource Errors
    // ========================================================================
    /// A buffer could not be created.
    #[error("Buffer creation failed for '{label}' ({size} bytes)")]
    BufferCreationFailed {
        /// Debug label of the buffer
        label: String,
        /// Requested size in bytes
        size: u64,
    },

    /// A handle does not refer to a live resource.
    #[error("Invalid {kind} handle: {index}")]
    InvalidHandle {
        /// Resource family of the handle
        kind: &'static str,
        /// Raw handle index
        index: u32,
    },

    // ========================================================================
    // Binding Errors
    // ========================================================================
    /// A binding set could not be created for the given layout and set index.
    #[error("Binding set creation failed for set {set}: {reason}")]
    BindingSetCreationFailed {
        /// Set index inside the pipeline layout
        set: u32,
        /// Backend supplied reason
        reason: String,
    },

    /// The number of bindings supplied does not match the layout.
    #[error("Binding count mismatch: layout expects {expected}, got {found}")]
    BindingCountMismatch {
        /// Bindings declared by the layout
        expected: usize,
        /// Bindings supplied
        found: usize,
    },

    /// A binding resource does not match the binding type declared by the layout.
    #[error("Binding {binding} is incompatible: layout expects {expected}, got {found}")]
    IncompatibleBinding {
        /// Binding index
        binding: u32,
        /// Expected binding kind
        expected: &'static str,
        /// Supplied binding kind
        found: &'static str,
    },
}

/// Alias for `Result<T, LoomError>`.
pub type Result<T> = std::result::Result<T, LoomError>;
