//! Filter registration types for conditional exception handlers.
//!
//! A `catch (T) when (predicate)` clause is represented at runtime by a
//! [`FilterRegistration`]: the predicate capability plus the outcome of its most recent
//! evaluation. Registrations are shared as [`FilterRc`] handles and compared by
//! reference identity, never by value. Two registrations built from the same closure are
//! still distinct entries on the [`crate::exception::FilterStack`].
//!
//! # Verdicts
//!
//! A predicate answers with a [`Verdict`]:
//!
//! - [`Verdict::ContinueSearch`] - defer to the next enclosing filter
//! - [`Verdict::ExecuteHandler`] - select this handler and stop searching
//!
//! The answer is stored on the registration as a [`FilterResult`] until the coordinator is
//! reset.

use std::{cell::Cell, fmt, rc::Rc};

use strum::{Display, IntoStaticStr};

/// The outcome of a single predicate evaluation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum Verdict {
    /// The predicate declined the exception; the search continues outward.
    ContinueSearch,
    /// The predicate elected to handle the exception; the search stops here.
    ExecuteHandler,
}

impl Verdict {
    /// Returns `true` for [`Verdict::ExecuteHandler`].
    #[must_use]
    pub fn is_handler(self) -> bool {
        matches!(self, Verdict::ExecuteHandler)
    }
}

impl From<bool> for Verdict {
    fn from(handle: bool) -> Self {
        if handle {
            Verdict::ExecuteHandler
        } else {
            Verdict::ContinueSearch
        }
    }
}

/// The evaluation state of a registration within the current unwind episode.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum FilterResult {
    /// The predicate has not run since the registration was pushed or last reset.
    #[default]
    NotEvaluated,
    /// The predicate ran and produced the contained verdict.
    Evaluated(Verdict),
}

impl FilterResult {
    /// Returns the stored verdict, if the predicate has run.
    #[must_use]
    pub fn verdict(self) -> Option<Verdict> {
        match self {
            FilterResult::NotEvaluated => None,
            FilterResult::Evaluated(verdict) => Some(verdict),
        }
    }

    /// Returns `true` if the predicate ran and elected to handle the exception.
    #[must_use]
    pub fn is_handler(self) -> bool {
        self.verdict().is_some_and(Verdict::is_handler)
    }
}

impl fmt::Display for FilterResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterResult::NotEvaluated => f.write_str("not_evaluated"),
            FilterResult::Evaluated(verdict) => write!(f, "{verdict}"),
        }
    }
}

/// A predicate capability for a conditional handler.
///
/// Any closure `Fn(&X) -> Verdict` implements this trait. Predicates that keep state between
/// invocations use interior mutability, since the coordinator only holds shared references
/// and predicates may re-enter it.
pub trait ExceptionFilter<X: ?Sized> {
    /// Decides whether the associated handler should run for `exception`.
    fn evaluate(&self, exception: &X) -> Verdict;
}

impl<X: ?Sized, F> ExceptionFilter<X> for F
where
    F: Fn(&X) -> Verdict,
{
    fn evaluate(&self, exception: &X) -> Verdict {
        self(exception)
    }
}

/// Shared handle to a [`FilterRegistration`].
pub type FilterRc<X> = Rc<FilterRegistration<X>>;

/// One active conditional handler.
///
/// Created immediately before entering a protected region, pushed onto the owning thread's
/// stack and popped when the region exits. The `result` field is written at most once per
/// unwind episode and cleared by push and reset.
pub struct FilterRegistration<X: ?Sized> {
    predicate: Box<dyn ExceptionFilter<X>>,
    result: Cell<FilterResult>,
    label: Option<String>,
}

impl<X: ?Sized + 'static> FilterRegistration<X> {
    /// Creates a registration from any [`ExceptionFilter`] implementation.
    pub fn new(predicate: impl ExceptionFilter<X> + 'static) -> FilterRc<X> {
        Rc::new(FilterRegistration {
            predicate: Box::new(predicate),
            result: Cell::new(FilterResult::NotEvaluated),
            label: None,
        })
    }

    /// Creates a registration from a boolean predicate, the shape of a `when (expr)` clause.
    pub fn when<F>(predicate: F) -> FilterRc<X>
    where
        F: Fn(&X) -> bool + 'static,
    {
        Self::new(move |exception: &X| Verdict::from(predicate(exception)))
    }

    /// Creates a labelled registration from a boolean predicate.
    ///
    /// The label shows up in trace events and corruption errors.
    pub fn labelled<F>(label: impl Into<String>, predicate: F) -> FilterRc<X>
    where
        F: Fn(&X) -> bool + 'static,
    {
        Rc::new(FilterRegistration {
            predicate: Box::new(move |exception: &X| Verdict::from(predicate(exception))),
            result: Cell::new(FilterResult::NotEvaluated),
            label: Some(label.into()),
        })
    }
}

impl<X: ?Sized> FilterRegistration<X> {
    /// Returns the outcome of the most recent evaluation.
    #[must_use]
    pub fn result(&self) -> FilterResult {
        self.result.get()
    }

    /// Returns the label given at construction, if any.
    #[must_use]
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Label for diagnostics, falling back to the registration's address.
    pub(crate) fn describe(&self) -> String {
        match &self.label {
            Some(label) => label.clone(),
            None => format!("{self:p}"),
        }
    }

    pub(crate) fn set_result(&self, result: FilterResult) {
        self.result.set(result);
    }

    pub(crate) fn invoke(&self, exception: &X) -> Verdict {
        self.predicate.evaluate(exception)
    }
}

impl<X: ?Sized> fmt::Debug for FilterRegistration<X> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterRegistration")
            .field("label", &self.label)
            .field("result", &self.result.get())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verdict_from_bool() {
        assert_eq!(Verdict::from(true), Verdict::ExecuteHandler);
        assert_eq!(Verdict::from(false), Verdict::ContinueSearch);
        assert!(Verdict::ExecuteHandler.is_handler());
        assert!(!Verdict::ContinueSearch.is_handler());
    }

    #[test]
    fn test_verdict_display() {
        assert_eq!(Verdict::ExecuteHandler.to_string(), "execute_handler");
        assert_eq!(Verdict::ContinueSearch.to_string(), "continue_search");
        assert_eq!(
            FilterResult::Evaluated(Verdict::ContinueSearch).to_string(),
            "continue_search"
        );
        assert_eq!(FilterResult::NotEvaluated.to_string(), "not_evaluated");
    }

    #[test]
    fn test_registration_starts_unevaluated() {
        let filter = FilterRegistration::<str>::when(|msg| msg == "boom");
        assert_eq!(filter.result(), FilterResult::NotEvaluated);
        assert!(filter.label().is_none());
        assert!(!filter.result().is_handler());
    }

    #[test]
    fn test_registration_identity() {
        let a = FilterRegistration::<str>::when(|_| true);
        let b = FilterRegistration::<str>::when(|_| true);
        assert!(!Rc::ptr_eq(&a, &b));
        assert!(Rc::ptr_eq(&a, &Rc::clone(&a)));
    }

    #[test]
    fn test_invoke_uses_predicate() {
        let filter = FilterRegistration::<str>::labelled("boom", |msg| msg == "boom");
        assert_eq!(filter.invoke("boom"), Verdict::ExecuteHandler);
        assert_eq!(filter.invoke("other"), Verdict::ContinueSearch);
        // invoking directly never records a result
        assert_eq!(filter.result(), FilterResult::NotEvaluated);
        assert_eq!(filter.describe(), "boom");
    }
}
