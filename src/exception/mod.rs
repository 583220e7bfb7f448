//! Conditional exception handler coordination.
//!
//! This module emulates the first pass of structured exception dispatch for `catch (T) when
//! (predicate)` clauses on hosts that only support unconditional catch. The host registers a
//! filter for each protected region, asks whether a filtered handler should run when an
//! exception reaches it, and deregisters the filter when the region exits.
//!
//! # Components
//!
//! - [`FilterRegistration`] - One active conditional handler: predicate plus last result
//! - [`FilterStack`] - Per-thread stack of registrations mirroring region nesting
//! - [`FilterCoordinator`] - Evaluation walk, episode memo and reset
//! - [`FilterScope`] - RAII guard for an entered protected region
//!
//! # Call Sequence
//!
//! 1. [`FilterCoordinator::push`] (or [`FilterCoordinator::enter`]) before the region
//! 2. [`FilterCoordinator::should_run_handler`] from the unconditional catch that replaces a
//!    filtered one; re-raise if it returns `false`
//! 3. [`FilterCoordinator::pop`] on every exit path of the region
//! 4. [`FilterCoordinator::reset`] once a filtered handler has processed the exception
//!
//! [`FilterCoordinator::protect`] performs all four steps around a closure.
//!
//! # Evaluation Order
//!
//! Predicates of more deeply nested regions run before outer ones, because a native
//! unwinder searches the stack top-down. The first predicate that elects to handle stops
//! the walk; registrations further out keep [`FilterResult::NotEvaluated`].

mod coordinator;
mod memo;
mod scope;
mod stack;
mod types;

pub use coordinator::{EvaluationOutcome, FilterCoordinator};
pub use memo::EpisodeState;
pub use scope::FilterScope;
pub use stack::FilterStack;
pub use types::{ExceptionFilter, FilterRc, FilterRegistration, FilterResult, Verdict};
