//! # filterscope Prelude
//!
//! This module provides a convenient prelude for the most commonly used types and traits
//! from the filterscope library. Import this module to get quick access to everything a
//! host needs to guard protected regions with conditional handlers.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all filterscope operations
pub use crate::Error;

/// The result type used throughout filterscope
pub use crate::Result;

/// Coordinator configuration
pub use crate::{FilterConfig, TracingConfig};

// ================================================================================================
// Main Entry Points
// ================================================================================================

/// Per-thread coordinator and the outcome of one evaluation request
pub use crate::exception::{EvaluationOutcome, FilterCoordinator};

/// RAII guard for an entered protected region
pub use crate::exception::FilterScope;

// ================================================================================================
// Filters
// ================================================================================================

/// Filter registrations and the predicate trait behind them
pub use crate::exception::{ExceptionFilter, FilterRc, FilterRegistration};

/// Evaluation results stored on registrations
pub use crate::exception::{FilterResult, Verdict};

// ================================================================================================
// Inspection
// ================================================================================================

/// Episode lifecycle reported by [`FilterCoordinator::episode_state`]
pub use crate::exception::EpisodeState;

/// Trace events recorded when tracing is enabled
pub use crate::trace::FilterTraceEvent;
