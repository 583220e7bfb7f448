//! The filter coordinator.
//!
//! [`FilterCoordinator`] ties together the per-thread [`FilterStack`], the
//! [`UnwindMemo`](super::memo) episode chain and the evaluation walk. It emulates how a
//! native runtime evaluates a chain of `catch (T) when (predicate)` clauses during the
//! first pass of exception dispatch, for hosts that only offer unconditional catch.
//!
//! # Evaluation
//!
//! On the first [`should_run_handler`](FilterCoordinator::should_run_handler) call for an
//! exception, the coordinator:
//!
//! 1. opens an episode for the exception and marks it running before any predicate runs
//! 2. walks the stack from the innermost registration outward
//! 3. stores each verdict on its registration, stopping at the first
//!    [`Verdict::ExecuteHandler`]
//!
//! Every later call for the same exception instance only reads the stored results, so each
//! predicate runs at most once per episode no matter how many filtered catches the host
//! passes while unwinding.
//!
//! # Thread Safety
//!
//! A coordinator holds `Rc` and `RefCell` state and is therefore neither `Send` nor `Sync`.
//! [`FilterCoordinator::current`] hands out the calling thread's own instance.

use std::{
    any::{Any, TypeId},
    cell::RefCell,
    collections::HashMap,
    rc::Rc,
};

use crate::{
    exception::{
        memo::{Begin, EpisodeState, ResetScope, UnwindMemo},
        FilterRc, FilterResult, FilterStack,
    },
    trace::{FilterTraceEvent, TraceBuffer},
    Error, FilterConfig, Result,
};

thread_local! {
    static COORDINATORS: RefCell<HashMap<TypeId, Rc<dyn Any>>> = RefCell::new(HashMap::new());
}

/// Result of one evaluation request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EvaluationOutcome {
    /// The exception already has an episode; no predicate ran.
    Memoized,
    /// The predicate at this stack index elected to handle the exception.
    HandlerSelected {
        /// Stack index of the selected registration.
        index: usize,
    },
    /// No predicate elected to handle; the host keeps searching outward.
    NoHandler,
}

/// Per-thread coordinator for conditional exception handlers.
///
/// `X` is the host's exception type. Exceptions are passed as `Rc<X>` so that the
/// coordinator can tell instances apart by identity.
///
/// # Example
///
/// ```rust
/// use filterscope::{FilterCoordinator, FilterRegistration};
/// use std::rc::Rc;
///
/// let coordinator = FilterCoordinator::<str>::new();
/// let outer = FilterRegistration::<str>::when(|msg| msg == "outer");
/// let inner = FilterRegistration::<str>::when(|msg| msg == "inner");
///
/// coordinator.push(&outer);
/// coordinator.push(&inner);
///
/// let exception: Rc<str> = Rc::from("outer");
/// assert!(!coordinator.should_run_handler(&exception, &inner)?);
/// coordinator.pop(&inner)?;
/// assert!(coordinator.should_run_handler(&exception, &outer)?);
/// coordinator.pop(&outer)?;
/// coordinator.reset();
/// # Ok::<(), filterscope::Error>(())
/// ```
pub struct FilterCoordinator<X: ?Sized> {
    stack: RefCell<FilterStack<X>>,
    memo: RefCell<UnwindMemo<X>>,
    trace: RefCell<Option<TraceBuffer>>,
    config: FilterConfig,
}

impl<X: ?Sized + 'static> FilterCoordinator<X> {
    /// Returns the calling thread's coordinator for exception type `X`.
    ///
    /// The instance is created on first use with [`FilterConfig::default()`] and lives until
    /// the thread exits. Other threads get their own instance.
    pub fn current() -> Rc<Self> {
        COORDINATORS.with(|coordinators| {
            let mut coordinators = coordinators.borrow_mut();
            let key = TypeId::of::<Self>();
            let existing = coordinators
                .get(&key)
                .and_then(|any| Rc::clone(any).downcast::<Self>().ok());
            match existing {
                Some(coordinator) => coordinator,
                None => {
                    let coordinator = Rc::new(Self::new());
                    coordinators.insert(key, Rc::clone(&coordinator) as Rc<dyn Any>);
                    coordinator
                }
            }
        })
    }
}

impl<X: ?Sized> FilterCoordinator<X> {
    /// Creates an independent coordinator with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(FilterConfig::default())
    }

    /// Creates an independent coordinator.
    #[must_use]
    pub fn with_config(config: FilterConfig) -> Self {
        FilterCoordinator {
            stack: RefCell::new(FilterStack::with_capacity(config.initial_capacity)),
            memo: RefCell::new(UnwindMemo::new()),
            trace: RefCell::new(
                config
                    .tracing
                    .enabled
                    .then(|| TraceBuffer::new(config.tracing.max_entries)),
            ),
            config,
        }
    }

    /// Returns the configuration this coordinator was built with.
    pub fn config(&self) -> &FilterConfig {
        &self.config
    }

    /// Registers the filter of a protected region about to be entered.
    ///
    /// Clears the registration's result. Always succeeds.
    ///
    /// # Arguments
    ///
    /// * `registration` - The filter guarding the region; it becomes the innermost entry
    pub fn push(&self, registration: &FilterRc<X>) {
        let depth = {
            let mut stack = self.stack.borrow_mut();
            stack.push(registration);
            stack.len()
        };
        self.record(|| FilterTraceEvent::Push {
            filter: registration.describe(),
            depth,
        });
    }

    /// Deregisters the filter of a protected region being exited.
    ///
    /// # Arguments
    ///
    /// * `registration` - The filter pushed for this region; must be the innermost entry
    ///
    /// # Errors
    ///
    /// Returns [`Error::StackCorruption`] if `registration` is not the innermost active
    /// registration. The stack is left as it was.
    pub fn pop(&self, registration: &FilterRc<X>) -> Result<()> {
        let (result, depth) = {
            let mut stack = self.stack.borrow_mut();
            let result = stack.pop(registration);
            (result, stack.len())
        };

        match result {
            Ok(_) => {
                self.record(|| FilterTraceEvent::Pop {
                    filter: registration.describe(),
                    depth,
                });
                Ok(())
            }
            Err(error) => {
                self.record(|| FilterTraceEvent::Corruption {
                    filter: registration.describe(),
                    depth,
                });
                Err(error)
            }
        }
    }

    /// Decides whether the handler guarded by `registration` should run for `exception`.
    ///
    /// Evaluates the filter chain on the first call for `exception` and reads the memoized
    /// result on every later call within the same episode.
    ///
    /// # Arguments
    ///
    /// * `exception` - The exception being dispatched, compared by reference identity
    /// * `registration` - The filter guarding the catch site that is asking
    ///
    /// # Returns
    ///
    /// `true` if the predicate of `registration` elected to handle `exception`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `registration` is not on this thread's stack
    /// and [`FilterConfig::check_registration`] is enabled.
    pub fn should_run_handler(&self, exception: &Rc<X>, registration: &FilterRc<X>) -> Result<bool> {
        if self.config.check_registration && !self.stack.borrow().contains(registration) {
            return Err(Error::InvalidArgument(format!(
                "filter {} is not registered on this thread",
                registration.describe()
            )));
        }

        self.evaluate(exception);
        Ok(registration.result().is_handler())
    }

    /// Evaluates the filter chain for `exception` unless it was already evaluated.
    ///
    /// Predicates run innermost first, each at most once per episode, and the walk stops at
    /// the first one that elects to handle. A predicate that panics leaves the episode
    /// unfinished; the panic is not caught.
    ///
    /// # Arguments
    ///
    /// * `exception` - The exception being dispatched, compared by reference identity
    ///
    /// # Returns
    ///
    /// Whether the chain was walked and, if so, which stack index selected a handler.
    pub fn evaluate(&self, exception: &Rc<X>) -> EvaluationOutcome {
        let begin = {
            let stack = self.stack.borrow();
            self.memo.borrow_mut().begin(exception, &stack)
        };

        let (episode, floor, nested) = match begin {
            Begin::Memoized { episode } => {
                self.record(|| FilterTraceEvent::EpisodeSkipped { episode });
                return EvaluationOutcome::Memoized;
            }
            Begin::Walk {
                episode,
                floor,
                nested,
            } => (episode, floor, nested),
        };

        // predicates may push and pop their own regions, so walk a copy
        let candidates = self.stack.borrow().snapshot_from(floor);
        self.record(|| FilterTraceEvent::EpisodeBegin {
            nested,
            floor,
            candidates: candidates.len(),
        });

        let mut walk = WalkGuard {
            memo: &self.memo,
            episode,
            current: None,
        };
        let mut outcome = EvaluationOutcome::NoHandler;

        for (offset, entry) in candidates.iter().enumerate().rev() {
            let index = floor + offset;
            walk.current = Some((index, entry.serial));

            let verdict = entry.registration.invoke(exception);

            self.memo.borrow_mut().predicate_returned(episode);
            entry
                .registration
                .set_result(FilterResult::Evaluated(verdict));
            self.record(|| FilterTraceEvent::PredicateInvoked {
                filter: entry.registration.describe(),
                index,
                verdict,
            });

            if verdict.is_handler() {
                outcome = EvaluationOutcome::HandlerSelected { index };
                break;
            }
        }

        walk.current = None;
        self.memo.borrow_mut().complete(episode, exception);

        match outcome {
            EvaluationOutcome::HandlerSelected { index } => {
                self.record(|| FilterTraceEvent::HandlerSelected {
                    filter: candidates[index - floor].registration.describe(),
                    index,
                });
            }
            _ => self.record(|| FilterTraceEvent::NoHandler),
        }

        outcome
    }

    /// Clears evaluation state once a filtered handler has processed its exception.
    ///
    /// Ends the innermost episode and sets the affected registrations back to
    /// [`FilterResult::NotEvaluated`]. When that episode was nested inside a running
    /// predicate, only the registrations pushed by that predicate are cleared and the outer
    /// episode keeps its results.
    pub fn reset(&self) {
        let scope = self.memo.borrow_mut().reset();
        let cleared = match scope {
            ResetScope::All => self.stack.borrow().clear_results_from(0),
            ResetScope::From(floor) => self.stack.borrow().clear_results_from(floor),
        };
        self.record(|| FilterTraceEvent::Reset {
            cleared,
            remaining_episodes: self.memo.borrow().len(),
        });
    }

    /// Returns the number of active registrations.
    pub fn depth(&self) -> usize {
        self.stack.borrow().len()
    }

    /// Returns `true` if no registration is active.
    pub fn is_empty(&self) -> bool {
        self.stack.borrow().is_empty()
    }

    /// Returns `true` if `registration` is on this coordinator's stack.
    pub fn contains(&self, registration: &FilterRc<X>) -> bool {
        self.stack.borrow().contains(registration)
    }

    /// Returns `true` if `exception` has an episode that will suppress re-evaluation.
    pub fn is_evaluated(&self, exception: &Rc<X>) -> bool {
        self.memo.borrow().find(exception).is_some()
    }

    /// Returns the state of the episode for `exception`, if it has one.
    pub fn episode_state(&self, exception: &Rc<X>) -> Option<EpisodeState> {
        let memo = self.memo.borrow();
        memo.find(exception).and_then(|episode| memo.state(episode))
    }

    /// Returns the number of episodes in the chain (nested episodes included).
    pub fn episode_depth(&self) -> usize {
        self.memo.borrow().len()
    }

    /// Drains the recorded trace events. Empty when tracing is disabled.
    pub fn take_trace(&self) -> Vec<FilterTraceEvent> {
        self.trace
            .borrow_mut()
            .as_mut()
            .map(TraceBuffer::take)
            .unwrap_or_default()
    }

    /// Returns the number of trace events recorded so far.
    pub fn trace_event_count(&self) -> u64 {
        self.trace
            .borrow()
            .as_ref()
            .map_or(0, TraceBuffer::event_count)
    }

    fn record(&self, event: impl FnOnce() -> FilterTraceEvent) {
        if let Some(buffer) = self.trace.borrow_mut().as_mut() {
            buffer.record(event());
        }
    }
}

impl<X: ?Sized> Default for FilterCoordinator<X> {
    fn default() -> Self {
        Self::new()
    }
}

impl<X: ?Sized> std::fmt::Debug for FilterCoordinator<X> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterCoordinator")
            .field("depth", &self.depth())
            .field("episodes", &self.episode_depth())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Marks the episode abandoned if a predicate unwinds out of the walk.
struct WalkGuard<'a, X: ?Sized> {
    memo: &'a RefCell<UnwindMemo<X>>,
    episode: usize,
    /// Stack index and serial of the predicate being invoked.
    current: Option<(usize, u64)>,
}

impl<X: ?Sized> Drop for WalkGuard<'_, X> {
    fn drop(&mut self) {
        if let Some((index, serial)) = self.current {
            if let Ok(mut memo) = self.memo.try_borrow_mut() {
                memo.abandon(self.episode, index, serial);
            }
        }
    }
}
