//! Unwind episode bookkeeping.
//!
//! A host unwinder asks "should this handler run" once per filtered catch it passes while
//! searching for a handler. All of those questions concern the same exception, and the
//! predicates behind them may have side effects, so the first question evaluates the whole
//! chain and every later one reads the stored results. [`UnwindMemo`] remembers which
//! exceptions already went through that evaluation.
//!
//! # Episodes
//!
//! Each evaluated exception gets an [`Episode`]. Episodes form a short chain, root first:
//!
//! - A new exception raised while a predicate is running opens a *nested* episode. Its walk
//!   is confined to registrations pushed by that predicate, so the outer chain is neither
//!   re-entered nor overwritten.
//! - A predicate that panics leaves its episode [`EpisodeState::Abandoned`]. Until the
//!   region owning that predicate exits, later exceptions are confined above it as well, so
//!   the secondary unwind cannot recurse into the broken chain.
//! - Any other new exception replaces the whole chain.
//!
//! Identity is reference identity of the `Rc<X>` the host raised. A fresh instance carrying
//! the same error condition is a new exception.
//!
//! Only the chain is remembered, not a history. A distinct exception raised and handled
//! while an evaluated one is still unwinding (typically inside a `finally` block) replaces
//! the chain, and its `reset()` clears every result. When the original exception then
//! reaches the next filtered catch it is evaluated again, so predicates further out run a
//! second time for it.

use std::rc::{Rc, Weak};

use crate::exception::FilterStack;

/// Lifecycle of one episode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EpisodeState {
    /// Predicates of this episode are being invoked.
    Running,
    /// The walk finished, with or without selecting a handler.
    Completed,
    /// A predicate panicked and the walk never finished.
    Abandoned {
        /// Stack index of the registration whose predicate panicked.
        index: usize,
        /// Push serial of that registration's slot.
        serial: u64,
    },
}

/// Evaluation state for one exception instance.
pub(crate) struct Episode<X: ?Sized> {
    subject: Weak<X>,
    state: EpisodeState,
    /// Lowest stack index the walk visits.
    floor: usize,
    /// Stack depth when the walk started.
    walk_top: usize,
}

impl<X: ?Sized> Episode<X> {
    fn is_subject(&self, exception: &Rc<X>) -> bool {
        std::ptr::addr_eq(self.subject.as_ptr(), Rc::as_ptr(exception))
    }

    /// An abandoned episode goes stale once the slot of its broken registration is gone.
    fn is_stale(&self, stack: &FilterStack<X>) -> bool {
        match self.state {
            EpisodeState::Abandoned { index, serial } => stack.serial_at(index) != Some(serial),
            EpisodeState::Running | EpisodeState::Completed => false,
        }
    }

    /// Floor for an episode nested inside this one, if this one confines new exceptions.
    fn confined_floor(&self) -> Option<usize> {
        match self.state {
            EpisodeState::Running => Some(self.walk_top),
            EpisodeState::Abandoned { index, .. } => Some(index + 1),
            EpisodeState::Completed => None,
        }
    }
}

/// What [`UnwindMemo::begin`] decided for an exception.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Begin {
    /// The exception already has an episode at this chain position.
    Memoized { episode: usize },
    /// A new episode was opened; walk the stack from the top down to `floor`.
    Walk {
        episode: usize,
        floor: usize,
        nested: bool,
    },
}

/// Which registrations a reset clears.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ResetScope {
    /// Every registration.
    All,
    /// Registrations at this stack index and above.
    From(usize),
}

/// Chain of unwind episodes for one thread.
pub(crate) struct UnwindMemo<X: ?Sized> {
    episodes: Vec<Episode<X>>,
}

impl<X: ?Sized> UnwindMemo<X> {
    pub(crate) fn new() -> Self {
        UnwindMemo {
            episodes: Vec::new(),
        }
    }

    /// Number of episodes in the chain.
    pub(crate) fn len(&self) -> usize {
        self.episodes.len()
    }

    /// Returns the chain position of the episode for `exception`, if any.
    pub(crate) fn find(&self, exception: &Rc<X>) -> Option<usize> {
        self.episodes
            .iter()
            .position(|episode| episode.is_subject(exception))
    }

    /// Returns the state of the episode at `episode`.
    pub(crate) fn state(&self, episode: usize) -> Option<EpisodeState> {
        self.episodes.get(episode).map(|episode| episode.state)
    }

    /// Starts evaluation of `exception`, or reports that it was already evaluated.
    ///
    /// The new episode is marked [`EpisodeState::Running`] before any predicate runs.
    pub(crate) fn begin(&mut self, exception: &Rc<X>, stack: &FilterStack<X>) -> Begin {
        if let Some(stale) = self
            .episodes
            .iter()
            .position(|episode| episode.is_stale(stack))
        {
            self.episodes.truncate(stale);
        }

        if let Some(episode) = self.find(exception) {
            return Begin::Memoized { episode };
        }

        let confining = self
            .episodes
            .iter()
            .enumerate()
            .rev()
            .find_map(|(position, episode)| Some((position, episode.confined_floor()?)));

        let (floor, nested) = match confining {
            Some((position, floor)) => {
                self.episodes.truncate(position + 1);
                (floor.min(stack.len()), true)
            }
            None => {
                self.episodes.clear();
                (0, false)
            }
        };

        self.episodes.push(Episode {
            subject: Rc::downgrade(exception),
            state: EpisodeState::Running,
            floor,
            walk_top: stack.len(),
        });

        Begin::Walk {
            episode: self.episodes.len() - 1,
            floor,
            nested,
        }
    }

    /// Discards episodes nested inside `episode` once one of its predicates returned.
    pub(crate) fn predicate_returned(&mut self, episode: usize) {
        self.episodes.truncate(episode + 1);
    }

    /// Marks `episode` as completed.
    pub(crate) fn complete(&mut self, episode: usize, exception: &Rc<X>) {
        if let Some(entry) = self.episodes.get_mut(episode) {
            if entry.is_subject(exception) {
                entry.state = EpisodeState::Completed;
            }
        }
    }

    /// Marks `episode` as abandoned by the predicate at stack `index` / `serial`.
    pub(crate) fn abandon(&mut self, episode: usize, index: usize, serial: u64) {
        if let Some(entry) = self.episodes.get_mut(episode) {
            if entry.state == EpisodeState::Running {
                entry.state = EpisodeState::Abandoned { index, serial };
            }
        }
    }

    /// Ends the innermost episode and reports which results must be cleared.
    ///
    /// A running innermost episode is left in place: the reset comes from inside one of its
    /// predicates, and only that predicate's own registrations are cleared.
    pub(crate) fn reset(&mut self) -> ResetScope {
        let Some(innermost) = self.episodes.last() else {
            return ResetScope::All;
        };

        if innermost.state == EpisodeState::Running {
            return ResetScope::From(innermost.walk_top);
        }

        let ended_floor = innermost.floor;
        self.episodes.pop();

        match self.episodes.last() {
            Some(parent) if parent.state == EpisodeState::Running => {
                ResetScope::From(ended_floor)
            }
            _ => {
                self.episodes.clear();
                ResetScope::All
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exception::{FilterRc, FilterRegistration};

    fn stack_of(depth: usize) -> (FilterStack<str>, Vec<FilterRc<str>>) {
        let mut stack = FilterStack::new();
        let filters: Vec<_> = (0..depth)
            .map(|_| FilterRegistration::<str>::when(|_| false))
            .collect();
        for filter in &filters {
            stack.push(filter);
        }
        (stack, filters)
    }

    #[test]
    fn test_begin_root_then_memoized() {
        let (stack, _filters) = stack_of(3);
        let mut memo = UnwindMemo::new();
        let x: Rc<str> = Rc::from("x");

        assert_eq!(
            memo.begin(&x, &stack),
            Begin::Walk {
                episode: 0,
                floor: 0,
                nested: false
            }
        );
        memo.complete(0, &x);
        assert_eq!(memo.state(0), Some(EpisodeState::Completed));
        assert_eq!(memo.begin(&x, &stack), Begin::Memoized { episode: 0 });
    }

    #[test]
    fn test_identity_not_value() {
        let (stack, _filters) = stack_of(1);
        let mut memo = UnwindMemo::new();
        let first: Rc<str> = Rc::from("same");
        let second: Rc<str> = Rc::from("same");

        memo.begin(&first, &stack);
        memo.complete(0, &first);
        assert!(matches!(memo.begin(&second, &stack), Begin::Walk { .. }));
        // the completed root was replaced
        assert_eq!(memo.len(), 1);
        assert_eq!(memo.find(&first), None);
    }

    #[test]
    fn test_nested_inside_running_episode() {
        let (mut stack, _filters) = stack_of(2);
        let mut memo = UnwindMemo::new();
        let x: Rc<str> = Rc::from("x");
        let y: Rc<str> = Rc::from("y");

        memo.begin(&x, &stack);
        // a predicate of x pushes its own region and raises y
        let own = FilterRegistration::<str>::when(|_| false);
        stack.push(&own);
        assert_eq!(
            memo.begin(&y, &stack),
            Begin::Walk {
                episode: 1,
                floor: 2,
                nested: true
            }
        );
        // x is still known while y is evaluated
        assert_eq!(memo.begin(&x, &stack), Begin::Memoized { episode: 0 });

        memo.predicate_returned(0);
        assert_eq!(memo.len(), 1);
    }

    #[test]
    fn test_abandoned_confines_until_region_exits() {
        let (mut stack, filters) = stack_of(3);
        let mut memo = UnwindMemo::new();
        let x: Rc<str> = Rc::from("x");
        let y: Rc<str> = Rc::from("y");

        memo.begin(&x, &stack);
        // predicate at index 1 panicked
        let serial = stack.serial_at(1).unwrap();
        memo.abandon(0, 1, serial);

        // innermost region unwinds, the broken one is still active
        stack.pop(&filters[2]).unwrap();
        assert_eq!(
            memo.begin(&y, &stack),
            Begin::Walk {
                episode: 1,
                floor: 2,
                nested: true
            }
        );

        // once the broken region exits, the abandoned chain is dropped
        stack.pop(&filters[1]).unwrap();
        let z: Rc<str> = Rc::from("z");
        assert_eq!(
            memo.begin(&z, &stack),
            Begin::Walk {
                episode: 0,
                floor: 0,
                nested: false
            }
        );
        assert_eq!(memo.find(&x), None);
    }

    #[test]
    fn test_reset_scopes() {
        let (stack, _filters) = stack_of(2);
        let mut memo = UnwindMemo::new();
        assert_eq!(memo.reset(), ResetScope::All);

        let x: Rc<str> = Rc::from("x");
        let y: Rc<str> = Rc::from("y");
        memo.begin(&x, &stack);
        // reset from inside a running predicate
        assert_eq!(memo.reset(), ResetScope::From(2));
        assert_eq!(memo.len(), 1);

        memo.begin(&y, &stack);
        memo.complete(1, &y);
        assert_eq!(memo.reset(), ResetScope::From(2));
        assert_eq!(memo.len(), 1);

        memo.complete(0, &x);
        assert_eq!(memo.reset(), ResetScope::All);
        assert_eq!(memo.len(), 0);
    }

    #[test]
    fn test_complete_ignores_replaced_episode() {
        let (stack, _filters) = stack_of(1);
        let mut memo = UnwindMemo::new();
        let x: Rc<str> = Rc::from("x");
        let other: Rc<str> = Rc::from("other");
        memo.begin(&x, &stack);
        memo.complete(0, &other);
        assert_eq!(memo.state(0), Some(EpisodeState::Running));
    }
}
