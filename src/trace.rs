//! Filter coordinator tracing for debugging and analysis.
//!
//! When enabled through [`TracingConfig`](crate::TracingConfig), every push, pop, episode
//! transition and predicate invocation is recorded as a [`FilterTraceEvent`] in an in-memory
//! [`TraceBuffer`]. The buffer is owned by a single coordinator and therefore by a single
//! thread, so it needs no locking.
//!
//! # Output Format
//!
//! Events render as one-line JSON objects via [`FilterTraceEvent::to_json`], which makes a
//! drained buffer easy to dump as NDJSON.
//!
//! ```rust
//! use filterscope::{FilterConfig, FilterCoordinator, FilterRegistration, TracingConfig};
//! use std::rc::Rc;
//!
//! let config = FilterConfig {
//!     tracing: TracingConfig::enabled(),
//!     ..FilterConfig::default()
//! };
//! let coordinator = FilterCoordinator::<str>::with_config(config);
//! let filter = FilterRegistration::<str>::labelled("always", |_| true);
//! coordinator.push(&filter);
//! coordinator.should_run_handler(&Rc::from("boom"), &filter)?;
//! coordinator.pop(&filter)?;
//!
//! for event in coordinator.take_trace() {
//!     println!("{}", event.to_json());
//! }
//! # Ok::<(), filterscope::Error>(())
//! ```

use std::{collections::VecDeque, fmt::Write};

use crate::exception::Verdict;

/// A trace event recorded by the coordinator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FilterTraceEvent {
    /// A registration was pushed.
    Push {
        /// Label (or address) of the registration.
        filter: String,
        /// Stack depth after the push.
        depth: usize,
    },

    /// A registration was popped.
    Pop {
        /// Label (or address) of the registration.
        filter: String,
        /// Stack depth after the pop.
        depth: usize,
    },

    /// A pop was rejected because the stack discipline was violated.
    Corruption {
        /// Label (or address) of the registration the caller tried to pop.
        filter: String,
        /// Stack depth at the time of the failed pop.
        depth: usize,
    },

    /// A new unwind episode started for a previously unseen exception.
    EpisodeBegin {
        /// Whether the episode was opened inside a running predicate.
        nested: bool,
        /// Lowest stack index the episode's walk may visit.
        floor: usize,
        /// Number of registrations the walk can visit.
        candidates: usize,
    },

    /// Evaluation was skipped because the exception already has an episode.
    EpisodeSkipped {
        /// Position of the matching episode in the chain (0 = root).
        episode: usize,
    },

    /// A predicate ran.
    PredicateInvoked {
        /// Label (or address) of the registration.
        filter: String,
        /// Stack index of the registration.
        index: usize,
        /// The verdict the predicate returned.
        verdict: Verdict,
    },

    /// A handler was selected and the walk stopped.
    HandlerSelected {
        /// Label (or address) of the selected registration.
        filter: String,
        /// Stack index of the registration.
        index: usize,
    },

    /// The walk finished without any predicate electing to handle.
    NoHandler,

    /// Results and episode state were cleared.
    Reset {
        /// Number of registrations whose result was cleared.
        cleared: usize,
        /// Number of episodes left in the chain afterwards.
        remaining_episodes: usize,
    },
}

impl FilterTraceEvent {
    /// Short event kind used as the JSON `type` field.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            FilterTraceEvent::Push { .. } => "push",
            FilterTraceEvent::Pop { .. } => "pop",
            FilterTraceEvent::Corruption { .. } => "corruption",
            FilterTraceEvent::EpisodeBegin { .. } => "episode_begin",
            FilterTraceEvent::EpisodeSkipped { .. } => "episode_skipped",
            FilterTraceEvent::PredicateInvoked { .. } => "predicate",
            FilterTraceEvent::HandlerSelected { .. } => "handler_selected",
            FilterTraceEvent::NoHandler => "no_handler",
            FilterTraceEvent::Reset { .. } => "reset",
        }
    }

    /// Renders the event as a single-line JSON object.
    #[must_use]
    pub fn to_json(&self) -> String {
        let mut json = String::with_capacity(64);
        let _ = write!(json, "{{\"type\":\"{}\"", self.kind());

        match self {
            FilterTraceEvent::Push { filter, depth }
            | FilterTraceEvent::Pop { filter, depth }
            | FilterTraceEvent::Corruption { filter, depth } => {
                let _ = write!(
                    json,
                    ",\"filter\":\"{}\",\"depth\":{depth}",
                    escape_json(filter)
                );
            }
            FilterTraceEvent::EpisodeBegin {
                nested,
                floor,
                candidates,
            } => {
                let _ = write!(
                    json,
                    ",\"nested\":{nested},\"floor\":{floor},\"candidates\":{candidates}"
                );
            }
            FilterTraceEvent::EpisodeSkipped { episode } => {
                let _ = write!(json, ",\"episode\":{episode}");
            }
            FilterTraceEvent::PredicateInvoked {
                filter,
                index,
                verdict,
            } => {
                let verdict: &'static str = (*verdict).into();
                let _ = write!(
                    json,
                    ",\"filter\":\"{}\",\"index\":{index},\"verdict\":\"{verdict}\"",
                    escape_json(filter)
                );
            }
            FilterTraceEvent::HandlerSelected { filter, index } => {
                let _ = write!(
                    json,
                    ",\"filter\":\"{}\",\"index\":{index}",
                    escape_json(filter)
                );
            }
            FilterTraceEvent::NoHandler => {}
            FilterTraceEvent::Reset {
                cleared,
                remaining_episodes,
            } => {
                let _ = write!(
                    json,
                    ",\"cleared\":{cleared},\"remaining_episodes\":{remaining_episodes}"
                );
            }
        }

        json.push('}');
        json
    }
}

/// Escapes a label for use inside a JSON string literal.
fn escape_json(label: &str) -> String {
    let mut escaped = String::with_capacity(label.len() + 2);
    for c in label.chars() {
        match c {
            '"' | '\\' => {
                escaped.push('\\');
                escaped.push(c);
            }
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            '\t' => escaped.push_str("\\t"),
            c if c.is_control() => {
                let _ = write!(escaped, "\\u{:04X}", u32::from(c));
            }
            c => escaped.push(c),
        }
    }
    escaped
}

/// Bounded in-memory store for trace events.
#[derive(Clone, Debug, Default)]
pub struct TraceBuffer {
    events: VecDeque<FilterTraceEvent>,
    /// Maximum events kept (0 = unlimited).
    max_entries: usize,
    /// Number of events ever recorded, including dropped ones.
    event_count: u64,
}

impl TraceBuffer {
    /// Creates an empty buffer keeping at most `max_entries` events (0 for unlimited).
    #[must_use]
    pub fn new(max_entries: usize) -> Self {
        TraceBuffer {
            events: VecDeque::with_capacity(max_entries.min(1024)),
            max_entries,
            event_count: 0,
        }
    }

    /// Records an event, dropping the oldest one when the buffer is full.
    pub fn record(&mut self, event: FilterTraceEvent) {
        self.event_count += 1;
        if self.max_entries > 0 && self.events.len() >= self.max_entries {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }

    /// Returns the number of events recorded since creation.
    #[must_use]
    pub fn event_count(&self) -> u64 {
        self.event_count
    }

    /// Returns the number of events currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Returns `true` if no events are held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Iterates over the held events, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &FilterTraceEvent> {
        self.events.iter()
    }

    /// Drains the held events, oldest first.
    pub fn take(&mut self) -> Vec<FilterTraceEvent> {
        self.events.drain(..).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trace_event_json() {
        let event = FilterTraceEvent::PredicateInvoked {
            filter: "NestedFilters3".to_string(),
            index: 2,
            verdict: Verdict::ExecuteHandler,
        };

        let json = event.to_json();
        assert_eq!(
            json,
            "{\"type\":\"predicate\",\"filter\":\"NestedFilters3\",\"index\":2,\"verdict\":\"execute_handler\"}"
        );
        assert_eq!(FilterTraceEvent::NoHandler.to_json(), "{\"type\":\"no_handler\"}");
    }

    #[test]
    fn test_trace_event_json_escapes_labels() {
        let event = FilterTraceEvent::Push {
            filter: "say \"hi\"\n".to_string(),
            depth: 1,
        };
        assert!(event.to_json().contains("say \\\"hi\\\"\\n"));
    }

    #[test]
    fn test_trace_buffer_bounded() {
        let mut buffer = TraceBuffer::new(2);
        for depth in 0..5 {
            buffer.record(FilterTraceEvent::Push {
                filter: "f".to_string(),
                depth,
            });
        }

        assert_eq!(buffer.event_count(), 5);
        assert_eq!(buffer.len(), 2);
        let events = buffer.take();
        assert_eq!(
            events[0],
            FilterTraceEvent::Push {
                filter: "f".to_string(),
                depth: 3
            }
        );
        assert!(buffer.is_empty());
        assert_eq!(buffer.event_count(), 5);
    }

    #[test]
    fn test_trace_buffer_unlimited() {
        let mut buffer = TraceBuffer::new(0);
        for _ in 0..100 {
            buffer.record(FilterTraceEvent::NoHandler);
        }
        assert_eq!(buffer.len(), 100);
    }

    #[test]
    fn test_escape_json() {
        assert_eq!(escape_json("hello"), "hello");
        assert_eq!(escape_json("a\\b"), "a\\\\b");
        assert_eq!(escape_json("\u{1}"), "\\u0001");
    }
}
