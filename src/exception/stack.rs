//! Per-thread stack of active filter registrations.
//!
//! The stack mirrors the lexical nesting of the protected regions currently active on one
//! thread's call stack: the outermost region at index 0, the innermost at the top. Push and
//! pop only touch the top, and a pop that names anything other than the top entry is
//! rejected as corruption instead of being resynchronised.

use std::rc::Rc;

use crate::{
    exception::{FilterRc, FilterResult},
    Result,
};

/// One slot of the stack.
///
/// The serial is unique per push, so a registration that is popped and pushed again at the
/// same depth occupies a different slot.
pub(crate) struct StackEntry<X: ?Sized> {
    pub(crate) registration: FilterRc<X>,
    pub(crate) serial: u64,
}

impl<X: ?Sized> Clone for StackEntry<X> {
    fn clone(&self) -> Self {
        StackEntry {
            registration: Rc::clone(&self.registration),
            serial: self.serial,
        }
    }
}

/// Ordered sequence of active registrations, innermost last.
pub struct FilterStack<X: ?Sized> {
    entries: Vec<StackEntry<X>>,
    next_serial: u64,
}

impl<X: ?Sized> FilterStack<X> {
    /// Creates an empty stack.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Creates an empty stack with room for `capacity` registrations.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        FilterStack {
            entries: Vec::with_capacity(capacity),
            next_serial: 0,
        }
    }

    /// Pushes a registration, clearing its result.
    ///
    /// Pushing always succeeds.
    pub fn push(&mut self, registration: &FilterRc<X>) {
        registration.set_result(FilterResult::NotEvaluated);
        self.entries.push(StackEntry {
            registration: Rc::clone(registration),
            serial: self.next_serial,
        });
        self.next_serial += 1;
    }

    /// Pops `registration`, which must be the top entry.
    ///
    /// # Arguments
    ///
    /// * `registration` - The registration expected on top of the stack
    ///
    /// # Returns
    ///
    /// The handle that was removed.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::StackCorruption`] if the stack is empty or its top entry is a
    /// different registration. The stack is unchanged in that case.
    pub fn pop(&mut self, registration: &FilterRc<X>) -> Result<FilterRc<X>> {
        let Some(top) = self.entries.last() else {
            return Err(corruption_error!(
                "pop of {} from an empty filter stack",
                registration.describe()
            ));
        };

        if !Rc::ptr_eq(&top.registration, registration) {
            return Err(match self.position(registration) {
                Some(index) => corruption_error!(
                    "pop of {} at index {} skips {} newer registration(s), top is {}",
                    registration.describe(),
                    index,
                    self.entries.len() - index - 1,
                    top.registration.describe()
                ),
                None => corruption_error!(
                    "pop of unregistered {}, top is {}",
                    registration.describe(),
                    top.registration.describe()
                ),
            });
        }

        self.entries
            .pop()
            .map(|entry| entry.registration)
            .ok_or_else(|| corruption_error!("filter stack emptied during pop"))
    }

    /// Returns the top (innermost) registration.
    #[must_use]
    pub fn top(&self) -> Option<&FilterRc<X>> {
        self.entries.last().map(|entry| &entry.registration)
    }

    /// Returns the number of active registrations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no registration is active.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the stack index of `registration`, searching from the top.
    #[must_use]
    pub fn position(&self, registration: &FilterRc<X>) -> Option<usize> {
        self.entries
            .iter()
            .rposition(|entry| Rc::ptr_eq(&entry.registration, registration))
    }

    /// Returns `true` if `registration` is on the stack.
    #[must_use]
    pub fn contains(&self, registration: &FilterRc<X>) -> bool {
        self.position(registration).is_some()
    }

    /// Clones the handles at `floor..` so they can be walked while the stack itself stays
    /// free to change.
    ///
    /// Predicates may push and pop their own regions while a walk is in progress.
    pub(crate) fn snapshot_from(&self, floor: usize) -> Vec<StackEntry<X>> {
        self.entries
            .get(floor..)
            .map(<[StackEntry<X>]>::to_vec)
            .unwrap_or_default()
    }

    /// Returns the push serial of the slot at `index`.
    pub(crate) fn serial_at(&self, index: usize) -> Option<u64> {
        self.entries.get(index).map(|entry| entry.serial)
    }

    /// Clears the result of every entry at `floor..`, returning how many were visited.
    pub(crate) fn clear_results_from(&self, floor: usize) -> usize {
        let entries = self.entries.get(floor..).unwrap_or_default();
        for entry in entries {
            entry.registration.set_result(FilterResult::NotEvaluated);
        }
        entries.len()
    }
}

impl<X: ?Sized> Default for FilterStack<X> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        exception::{FilterRegistration, Verdict},
        Error,
    };

    fn filter() -> FilterRc<str> {
        FilterRegistration::<str>::when(|_| false)
    }

    #[test]
    fn test_push_pop_lifo() {
        let mut stack = FilterStack::new();
        let a = filter();
        let b = filter();

        stack.push(&a);
        stack.push(&b);
        assert_eq!(stack.len(), 2);
        assert!(Rc::ptr_eq(stack.top().unwrap(), &b));

        assert!(Rc::ptr_eq(&stack.pop(&b).unwrap(), &b));
        assert!(Rc::ptr_eq(&stack.pop(&a).unwrap(), &a));
        assert!(stack.is_empty());
    }

    #[test]
    fn test_pop_skipping_top_is_corruption() {
        let mut stack = FilterStack::new();
        let a = filter();
        let b = filter();
        stack.push(&a);
        stack.push(&b);

        let err = stack.pop(&a).unwrap_err();
        assert!(matches!(err, Error::StackCorruption { .. }));
        assert!(err.to_string().contains("skips 1 newer"));
        // nothing was removed
        assert_eq!(stack.len(), 2);
    }

    #[test]
    fn test_pop_empty_is_corruption() {
        let mut stack = FilterStack::new();
        let a = filter();
        let err = stack.pop(&a).unwrap_err();
        assert!(err.to_string().contains("empty filter stack"));
    }

    #[test]
    fn test_pop_unregistered_is_corruption() {
        let mut stack = FilterStack::new();
        let a = filter();
        let stranger = FilterRegistration::<str>::labelled("stranger", |_| true);
        stack.push(&a);
        let err = stack.pop(&stranger).unwrap_err();
        assert!(err.to_string().contains("unregistered stranger"));
        assert_eq!(stack.len(), 1);
    }

    #[test]
    fn test_push_clears_result() {
        let mut stack = FilterStack::new();
        let a = filter();
        a.set_result(FilterResult::Evaluated(Verdict::ExecuteHandler));
        stack.push(&a);
        assert_eq!(a.result(), FilterResult::NotEvaluated);
    }

    #[test]
    fn test_same_registration_pushed_twice() {
        let mut stack = FilterStack::new();
        let a = filter();
        stack.push(&a);
        stack.push(&a);
        assert_eq!(stack.position(&a), Some(1));
        assert_ne!(stack.serial_at(0), stack.serial_at(1));
        stack.pop(&a).unwrap();
        stack.pop(&a).unwrap();
        assert!(stack.is_empty());
    }

    #[test]
    fn test_snapshot_and_clear_from_floor() {
        let mut stack = FilterStack::new();
        let a = filter();
        let b = filter();
        let c = filter();
        for f in [&a, &b, &c] {
            stack.push(f);
            f.set_result(FilterResult::Evaluated(Verdict::ContinueSearch));
        }

        let snapshot = stack.snapshot_from(1);
        assert_eq!(snapshot.len(), 2);
        assert!(Rc::ptr_eq(&snapshot[0].registration, &b));
        assert_eq!(snapshot[0].serial + 1, snapshot[1].serial);
        assert!(stack.snapshot_from(5).is_empty());

        assert_eq!(stack.clear_results_from(2), 1);
        assert_eq!(c.result(), FilterResult::NotEvaluated);
        assert_eq!(b.result(), FilterResult::Evaluated(Verdict::ContinueSearch));
        assert_eq!(stack.clear_results_from(10), 0);
    }
}
