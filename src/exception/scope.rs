//! Scoped protected regions.
//!
//! The coordinator's contract with its callers is a call sequence: push before the region,
//! ask before running a filtered handler, pop on every exit path, reset after the handler.
//! [`FilterScope`] is the RAII form of the push/pop half, and
//! [`FilterCoordinator::protect`] runs the whole sequence for hosts that propagate
//! exceptions as `Err(Rc<X>)`.
//!
//! # Multiple clauses
//!
//! One `try` statement can carry several filtered catches. Their predicates run in textual
//! order, so [`FilterCoordinator::enter_clauses`] pushes them last-to-first: the first
//! clause ends up on top of the stack and is evaluated first.
//!
//! ```rust
//! use filterscope::{FilterCoordinator, FilterRegistration};
//! use std::rc::Rc;
//!
//! let coordinator = FilterCoordinator::<str>::new();
//! let scope = coordinator.enter_clauses([
//!     FilterRegistration::<str>::when(|msg| msg.starts_with("io")),
//!     FilterRegistration::<str>::when(|msg| msg.starts_with("net")),
//! ]);
//!
//! let exception: Rc<str> = Rc::from("net: reset by peer");
//! assert_eq!(scope.selected_clause(&exception)?, Some(1));
//! scope.exit()?;
//! coordinator.reset();
//! # Ok::<(), filterscope::Error>(())
//! ```

use std::{rc::Rc, thread};

use crate::{
    exception::{FilterCoordinator, FilterRc},
    Result,
};

/// An entered protected region.
///
/// Dropping the scope without calling [`exit`](Self::exit) pops its registrations, which
/// covers early returns and `?` propagation. A pop that fails in `drop` panics, unless the
/// thread is already panicking.
#[must_use = "dropping the scope immediately exits the protected region"]
pub struct FilterScope<'c, X: ?Sized> {
    coordinator: &'c FilterCoordinator<X>,
    /// Registrations in textual clause order; the first one is on top of the stack.
    clauses: Vec<FilterRc<X>>,
    exited: bool,
}

impl<X: ?Sized> FilterCoordinator<X> {
    /// Enters a protected region guarded by a single filtered catch.
    pub fn enter(&self, registration: &FilterRc<X>) -> FilterScope<'_, X> {
        self.enter_clauses([Rc::clone(registration)])
    }

    /// Enters a protected region guarded by several filtered catches, in textual order.
    ///
    /// # Arguments
    ///
    /// * `clauses` - Registrations of the `when` clauses, first clause first
    pub fn enter_clauses<I>(&self, clauses: I) -> FilterScope<'_, X>
    where
        I: IntoIterator<Item = FilterRc<X>>,
    {
        let clauses: Vec<_> = clauses.into_iter().collect();
        for clause in clauses.iter().rev() {
            self.push(clause);
        }
        FilterScope {
            coordinator: self,
            clauses,
            exited: false,
        }
    }

    /// Runs `body` as a protected region with one filtered catch.
    ///
    /// If `body` raises and the filter chain selects `registration`, the region is exited,
    /// `handler` runs and the coordinator is reset. Otherwise the exception is handed back
    /// unchanged so the caller can keep propagating it.
    ///
    /// The outer `Result` carries coordinator errors, the inner one the host's outcome.
    ///
    /// # Arguments
    ///
    /// * `registration` - The filter of the single `when` clause
    /// * `body` - The protected region; `Err` raises an exception
    /// * `handler` - The catch body, run only when the filter chain selects `registration`
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::StackCorruption`] if `body` left the stack unbalanced, so
    /// that the region's registration is no longer on top when it exits.
    pub fn protect<T, B, H>(
        &self,
        registration: &FilterRc<X>,
        body: B,
        handler: H,
    ) -> Result<std::result::Result<T, Rc<X>>>
    where
        B: FnOnce() -> std::result::Result<T, Rc<X>>,
        H: FnOnce(Rc<X>) -> std::result::Result<T, Rc<X>>,
    {
        let scope = self.enter(registration);

        let exception = match body() {
            Ok(value) => {
                scope.exit()?;
                return Ok(Ok(value));
            }
            Err(exception) => exception,
        };

        let selected = scope.should_run_handler(&exception);
        scope.exit()?;
        if !selected? {
            return Ok(Err(exception));
        }

        let outcome = handler(exception);
        self.reset();
        Ok(outcome)
    }
}

impl<X: ?Sized> FilterScope<'_, X> {
    /// Registrations of this region, in textual clause order.
    pub fn clauses(&self) -> &[FilterRc<X>] {
        &self.clauses
    }

    /// Returns the textual index of the clause whose handler should run, if any.
    ///
    /// # Errors
    ///
    /// Propagates [`FilterCoordinator::should_run_handler`] errors.
    pub fn selected_clause(&self, exception: &Rc<X>) -> Result<Option<usize>> {
        for (index, clause) in self.clauses.iter().enumerate() {
            if self.coordinator.should_run_handler(exception, clause)? {
                return Ok(Some(index));
            }
        }
        Ok(None)
    }

    /// Returns `true` if any clause of this region should handle `exception`.
    ///
    /// # Errors
    ///
    /// Propagates [`FilterCoordinator::should_run_handler`] errors.
    pub fn should_run_handler(&self, exception: &Rc<X>) -> Result<bool> {
        Ok(self.selected_clause(exception)?.is_some())
    }

    /// Exits the region, popping its registrations.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::StackCorruption`] if the region's registrations are not on
    /// top of the stack.
    pub fn exit(mut self) -> Result<()> {
        self.exited = true;
        self.pop_all()
    }

    fn pop_all(&self) -> Result<()> {
        for clause in &self.clauses {
            self.coordinator.pop(clause)?;
        }
        Ok(())
    }
}

impl<X: ?Sized> Drop for FilterScope<'_, X> {
    fn drop(&mut self) {
        if self.exited {
            return;
        }
        self.exited = true;
        if let Err(error) = self.pop_all() {
            if !thread::panicking() {
                panic!("protected region exited out of order: {error}");
            }
        }
    }
}
