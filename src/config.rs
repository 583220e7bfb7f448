//! Coordinator configuration types.
//!
//! - [`FilterConfig`] - Top-level configuration for a [`FilterCoordinator`](crate::FilterCoordinator)
//! - [`TracingConfig`] - Whether and how much to trace
//!
//! # Presets
//!
//! - [`FilterConfig::default()`] - Registration checks on, tracing off
//! - [`FilterConfig::strict()`] - Registration checks and unbounded tracing
//! - [`FilterConfig::minimal()`] - No registration checks, no tracing
//!
//! # Example
//!
//! ```rust
//! use filterscope::{FilterConfig, TracingConfig};
//!
//! let config = FilterConfig {
//!     tracing: TracingConfig::enabled().with_max_entries(256),
//!     ..FilterConfig::default()
//! };
//! assert!(config.check_registration);
//! ```

/// Configuration for a filter coordinator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FilterConfig {
    /// Number of registrations the stack pre-allocates room for.
    pub initial_capacity: usize,

    /// Whether `should_run_handler` verifies that the registration is on the stack.
    ///
    /// A registration that is not on the stack is a caller contract violation and is
    /// reported as [`Error::InvalidArgument`](crate::Error::InvalidArgument). Disabling the
    /// check makes such a query simply read the registration's stale result.
    pub check_registration: bool,

    /// Trace configuration.
    pub tracing: TracingConfig,
}

impl Default for FilterConfig {
    fn default() -> Self {
        FilterConfig {
            initial_capacity: 16,
            check_registration: true,
            tracing: TracingConfig::default(),
        }
    }
}

impl FilterConfig {
    /// Registration checks on and every event traced.
    #[must_use]
    pub fn strict() -> Self {
        FilterConfig {
            check_registration: true,
            tracing: TracingConfig::enabled(),
            ..FilterConfig::default()
        }
    }

    /// No registration checks and no tracing.
    #[must_use]
    pub fn minimal() -> Self {
        FilterConfig {
            initial_capacity: 4,
            check_registration: false,
            tracing: TracingConfig::default(),
        }
    }
}

/// Trace configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TracingConfig {
    /// Record coordinator events.
    pub enabled: bool,

    /// Maximum trace entries to keep in memory (0 = unlimited).
    ///
    /// When exceeded, the oldest entries are discarded.
    pub max_entries: usize,
}

impl TracingConfig {
    /// Tracing on, no entry limit.
    #[must_use]
    pub fn enabled() -> Self {
        TracingConfig {
            enabled: true,
            max_entries: 0,
        }
    }

    /// Sets the maximum number of entries kept.
    #[must_use]
    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets() {
        let default = FilterConfig::default();
        assert!(default.check_registration);
        assert!(!default.tracing.enabled);

        let strict = FilterConfig::strict();
        assert!(strict.check_registration);
        assert!(strict.tracing.enabled);
        assert_eq!(strict.tracing.max_entries, 0);
        assert_eq!(strict.initial_capacity, default.initial_capacity);

        let minimal = FilterConfig::minimal();
        assert!(!minimal.check_registration);
        assert!(!minimal.tracing.enabled);
    }

    #[test]
    fn test_tracing_builder() {
        let tracing = TracingConfig::enabled().with_max_entries(8);
        assert!(tracing.enabled);
        assert_eq!(tracing.max_entries, 8);
    }
}
