//! Pending operation slot and submission ledger
//!
//! The coordinator installs one [`PendingOperation`] per outbound command
//! before submitting it. Every accepted submission is also recorded in the
//! [`Ledger`] under a generation number. Incoming events are attributed to
//! the oldest outstanding submission whose tag accepts them, so a reply
//! that arrives after its operation timed out lands on a retired entry.
//! The receiver answers in order, so whatever the current waiter is owed
//! arrives later still; the demultiplexer hands the absorbed event to that
//! waiter at once and retires the waiter's own entry in its place.
//!
//! Frequency-carrying events are matched more precisely: a live submission
//! expecting exactly the reported frequency wins over older retired ones,
//! which the receiver evidently never answered.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use fm_protocol::{EventTag, Frequency, ReceiverEvent};

/// What a waiter was woken with
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Reply {
    /// The confirming event
    Event(ReceiverEvent),
    /// The link detached first
    LinkLost,
}

/// The single in-flight operation
#[derive(Debug)]
pub(crate) struct PendingOperation {
    /// Command name, for logs
    pub kind: &'static str,
    /// Event tag that completes the operation
    pub tag: EventTag,
    /// Ledger generation of the submission
    pub generation: u64,
    /// Time after which the waiter gives up
    pub deadline: Instant,
    /// Filled by the demultiplexer
    pub reply: Option<Reply>,
    /// Off-frequency status absorbed by a retired submission while this
    /// tune waited for its own confirmation
    pub shadowed: Option<ReceiverEvent>,
}

impl PendingOperation {
    pub fn new(kind: &'static str, tag: EventTag, generation: u64, timeout: Duration) -> Self {
        Self {
            kind,
            tag,
            generation,
            deadline: Instant::now() + timeout,
            reply: None,
            shadowed: None,
        }
    }
}

/// Result of attributing an event to a submission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Attribution {
    /// The event answers a live submission
    Live(u64),
    /// The event answers a submission that already timed out
    Retired(u64),
    /// No submission is waiting for this kind of event
    Unsolicited,
}

#[derive(Debug, Clone)]
struct Submission {
    tag: EventTag,
    generation: u64,
    expected: Option<Frequency>,
    retired_at: Option<Instant>,
}

/// FIFO of accepted submissions still owed an event
#[derive(Debug, Default)]
pub(crate) struct Ledger {
    entries: VecDeque<Submission>,
    next_generation: u64,
}

impl Ledger {
    /// Allocate the generation for the next submission
    pub fn next_generation(&mut self) -> u64 {
        self.next_generation += 1;
        self.next_generation
    }

    /// Record a submission expecting an event with `tag`
    pub fn record(&mut self, tag: EventTag, generation: u64, expected: Option<Frequency>) {
        self.entries.push_back(Submission {
            tag,
            generation,
            expected,
            retired_at: None,
        });
    }

    /// Drop a submission the link refused
    pub fn forget(&mut self, generation: u64) {
        self.entries.retain(|s| s.generation != generation);
    }

    /// Mark a submission as timed out; its late reply will be absorbed
    pub fn retire(&mut self, generation: u64, now: Instant) {
        if let Some(entry) = self.entries.iter_mut().find(|s| s.generation == generation) {
            entry.retired_at = Some(now);
        }
    }

    /// Attribute an event to a submission, consuming it
    pub fn attribute(&mut self, event_tag: EventTag, frequency: Option<Frequency>) -> Attribution {
        if let Some(generation) = frequency.and_then(|f| self.live_expecting(event_tag, f)) {
            self.answer_out_of_order(event_tag, generation);
            return Attribution::Live(generation);
        }
        let Some(index) = self.entries.iter().position(|s| s.tag.accepts(event_tag)) else {
            return Attribution::Unsolicited;
        };
        match self.entries.remove(index) {
            Some(Submission {
                generation,
                retired_at: None,
                ..
            }) => Attribution::Live(generation),
            Some(Submission { generation, .. }) => Attribution::Retired(generation),
            None => Attribution::Unsolicited,
        }
    }

    fn live_expecting(&self, event_tag: EventTag, frequency: Frequency) -> Option<u64> {
        self.entries
            .iter()
            .find(|s| {
                s.retired_at.is_none() && s.tag.accepts(event_tag) && s.expected == Some(frequency)
            })
            .map(|s| s.generation)
    }

    // Consume `generation` along with every older retired entry of the same tag
    fn answer_out_of_order(&mut self, event_tag: EventTag, generation: u64) {
        let mut older = true;
        self.entries.retain(|s| {
            if s.generation == generation {
                older = false;
                return false;
            }
            !(older && s.retired_at.is_some() && s.tag.accepts(event_tag))
        });
    }

    /// Forget retired submissions older than `horizon`; the hardware is not
    /// going to answer them
    pub fn purge(&mut self, now: Instant, horizon: Duration) {
        self.entries.retain(|s| match s.retired_at {
            Some(at) => now.saturating_duration_since(at) < horizon,
            None => true,
        });
    }

    /// Whether `generation` waits for one specific frequency
    pub fn expects_frequency(&self, generation: u64) -> bool {
        self.entries
            .iter()
            .any(|s| s.generation == generation && s.expected.is_some())
    }

    /// Drop everything, as on link detach
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn live_submission_attributed() {
        let mut ledger = Ledger::default();
        let generation = ledger.next_generation();
        ledger.record(EventTag::Status, generation, None);
        assert_eq!(
            ledger.attribute(EventTag::Status, None),
            Attribution::Live(generation)
        );
        assert_eq!(ledger.len(), 0);
    }

    #[test]
    fn unmatched_tags_are_unsolicited() {
        let mut ledger = Ledger::default();
        let generation = ledger.next_generation();
        ledger.record(EventTag::SeekComplete, generation, None);
        assert_eq!(
            ledger.attribute(EventTag::AudioMode, None),
            Attribution::Unsolicited
        );
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn late_reply_absorbed_by_retired_entry() {
        let mut ledger = Ledger::default();
        let first = ledger.next_generation();
        ledger.record(EventTag::Status, first, None);
        ledger.retire(first, Instant::now());

        let second = ledger.next_generation();
        ledger.record(EventTag::Status, second, None);

        assert_eq!(ledger.attribute(EventTag::Status, None), Attribution::Retired(first));
        assert_eq!(ledger.attribute(EventTag::Status, None), Attribution::Live(second));
    }

    #[test]
    fn purge_drops_old_retired_entries() {
        let mut ledger = Ledger::default();
        let first = ledger.next_generation();
        ledger.record(EventTag::Status, first, None);
        let retired_at = Instant::now();
        ledger.retire(first, retired_at);

        ledger.purge(retired_at, Duration::from_secs(10));
        assert_eq!(ledger.len(), 1);

        ledger.purge(retired_at + Duration::from_secs(11), Duration::from_secs(10));
        assert_eq!(ledger.len(), 0);
    }

    #[test]
    fn any_entry_accepts_other_tags() {
        let mut ledger = Ledger::default();
        let generation = ledger.next_generation();
        ledger.record(EventTag::Any, generation, None);
        assert_eq!(ledger.attribute(EventTag::RdsData, None), Attribution::Unsolicited);
        assert_eq!(
            ledger.attribute(EventTag::Volume, None),
            Attribution::Live(generation)
        );
    }

    #[test]
    fn expected_frequency_skips_unanswered_retired_entries() {
        let mut ledger = Ledger::default();
        let first = ledger.next_generation();
        ledger.record(EventTag::Status, first, Some(Frequency(9730)));
        ledger.retire(first, Instant::now());

        let second = ledger.next_generation();
        ledger.record(EventTag::Status, second, Some(Frequency(9910)));

        assert_eq!(
            ledger.attribute(EventTag::Status, Some(Frequency(9910))),
            Attribution::Live(second)
        );
        assert_eq!(ledger.len(), 0);
    }

    #[test]
    fn late_reply_with_frequency_still_absorbed() {
        let mut ledger = Ledger::default();
        let first = ledger.next_generation();
        ledger.record(EventTag::Status, first, Some(Frequency(9730)));
        ledger.retire(first, Instant::now());

        let second = ledger.next_generation();
        ledger.record(EventTag::Status, second, Some(Frequency(9910)));

        assert_eq!(
            ledger.attribute(EventTag::Status, Some(Frequency(9730))),
            Attribution::Retired(first)
        );
        assert_eq!(
            ledger.attribute(EventTag::Status, Some(Frequency(9910))),
            Attribution::Live(second)
        );
    }

    #[test]
    fn forget_removes_refused_submission() {
        let mut ledger = Ledger::default();
        let generation = ledger.next_generation();
        ledger.record(EventTag::Status, generation, None);
        ledger.forget(generation);
        assert_eq!(ledger.len(), 0);
    }

    #[test]
    fn only_tune_submissions_expect_a_frequency() {
        let mut ledger = Ledger::default();
        let tune = ledger.next_generation();
        ledger.record(EventTag::Status, tune, Some(Frequency(9730)));
        let status = ledger.next_generation();
        ledger.record(EventTag::Status, status, None);
        assert!(ledger.expects_frequency(tune));
        assert!(!ledger.expects_frequency(status));
    }
}
