// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![deny(unsafe_code)]

//! # filterscope
//!
//! Per-thread coordination of conditional exception handlers (`catch (T) when (predicate)`)
//! for hosts whose exception mechanism only offers unconditional catch.
//!
//! A runtime with native exception filters runs every applicable predicate during a first
//! search pass, innermost first, before any stack unwinding happens. A host that only has
//! unconditional catch sees one catch site at a time while it unwinds, and would run each
//! predicate as it passes by. `filterscope` restores the native semantics: the first time a
//! filtered catch asks whether it should run for an exception, the whole chain of active
//! filters is evaluated at once and the verdicts are memoized for every later catch site
//! the same exception reaches.
//!
//! ## Features
//!
//! - **Innermost-first evaluation** - Predicates of deeper regions run before outer ones
//! - **At-most-once semantics** - Each predicate runs once per exception instance
//! - **Re-entrancy** - Predicates may enter their own protected regions and raise new exceptions
//! - **Strict stack discipline** - Out-of-order exits are reported, never silently repaired
//! - **Event tracing** - Optional in-memory trace of pushes, pops and predicate verdicts
//!
//! ## Quick Start
//!
//! ```rust
//! use filterscope::{FilterCoordinator, FilterRegistration};
//! use std::rc::Rc;
//!
//! let coordinator = FilterCoordinator::<str>::current();
//! let filter = FilterRegistration::<str>::when(|msg| msg.starts_with("timeout"));
//!
//! let outcome = coordinator.protect(
//!     &filter,
//!     || Err(Rc::from("timeout after 30s")),
//!     |exception| Ok(format!("handled: {exception}")),
//! )?;
//! assert_eq!(outcome.as_deref(), Ok("handled: timeout after 30s"));
//! # Ok::<(), filterscope::Error>(())
//! ```
//!
//! ## Manual Protocol
//!
//! Hosts that generate code around their own catch sites drive the coordinator directly:
//!
//! ```rust
//! use filterscope::{FilterCoordinator, FilterRegistration};
//! use std::rc::Rc;
//!
//! let coordinator = FilterCoordinator::<str>::new();
//! let filter = FilterRegistration::<str>::when(|msg| msg == "retry");
//!
//! // entering the protected region
//! coordinator.push(&filter);
//!
//! // the body raised; the unconditional catch asks before running the handler
//! let exception: Rc<str> = Rc::from("retry");
//! let run = coordinator.should_run_handler(&exception, &filter)?;
//!
//! // leaving the protected region, on every path
//! coordinator.pop(&filter)?;
//!
//! if run {
//!     // ... handler body ...
//!     coordinator.reset();
//! }
//! # Ok::<(), filterscope::Error>(())
//! ```
//!
//! ## Error Handling
//!
//! All fallible operations return [`Result<T, Error>`](Result):
//!
//! ```rust
//! use filterscope::{Error, FilterCoordinator, FilterRegistration};
//!
//! let coordinator = FilterCoordinator::<str>::new();
//! let filter = FilterRegistration::<str>::when(|_| true);
//!
//! match coordinator.pop(&filter) {
//!     Ok(()) => println!("popped"),
//!     Err(Error::StackCorruption { message, .. }) => println!("corrupted: {}", message),
//!     Err(e) => println!("other error: {}", e),
//! }
//! ```
//!
//! ## Thread Safety
//!
//! Coordinators are `!Send` and `!Sync`: every thread owns its own filter stack
//! and episode chain, reached through [`FilterCoordinator::current`].

mod config;
#[macro_use]
mod error;

/// Convenient re-exports of the most commonly used types and traits.
///
/// # Example
///
/// ```rust
/// use filterscope::prelude::*;
///
/// let coordinator = FilterCoordinator::<str>::new();
/// let filter = FilterRegistration::<str>::when(|_| true);
/// coordinator.push(&filter);
/// coordinator.pop(&filter)?;
/// # Ok::<(), filterscope::Error>(())
/// ```
pub mod prelude;

/// Filter registrations, the per-thread filter stack and the evaluation coordinator.
pub mod exception;

/// In-memory event tracing for coordinator activity.
pub mod trace;

/// `filterscope` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// `filterscope` Error type
///
/// # Examples
///
/// ```rust
/// use filterscope::{Error, FilterCoordinator, FilterRegistration};
/// use std::rc::Rc;
///
/// let coordinator = FilterCoordinator::<str>::new();
/// let stranger = FilterRegistration::<str>::when(|_| true);
///
/// match coordinator.should_run_handler(&Rc::from("x"), &stranger) {
///     Err(Error::InvalidArgument(reason)) => println!("rejected: {}", reason),
///     other => println!("unexpected: {:?}", other),
/// }
/// ```
pub use error::Error;

/// Coordinator configuration.
///
/// See [`FilterConfig`] for the available presets.
pub use config::{FilterConfig, TracingConfig};

/// Main entry points for coordinating filtered handlers.
///
/// # Example
///
/// ```rust
/// use filterscope::{FilterCoordinator, FilterRegistration, FilterResult, Verdict};
/// use std::rc::Rc;
///
/// let coordinator = FilterCoordinator::<str>::new();
/// let filter = FilterRegistration::<str>::when(|msg| msg.len() > 3);
/// coordinator.push(&filter);
///
/// coordinator.evaluate(&Rc::from("long message"));
/// assert_eq!(filter.result(), FilterResult::Evaluated(Verdict::ExecuteHandler));
/// coordinator.pop(&filter)?;
/// coordinator.reset();
/// # Ok::<(), filterscope::Error>(())
/// ```
pub use exception::{
    EpisodeState, EvaluationOutcome, ExceptionFilter, FilterCoordinator, FilterRc,
    FilterRegistration, FilterResult, FilterScope, FilterStack, Verdict,
};
