//! Operation coordinator
//!
//! Serializes commands to the receiver link. A caller first claims the
//! operation slot with [`Coordinator::session`]; a second caller gets
//! [`ReceiverError::Busy`] instead of queueing. Inside a session each
//! command installs its waiter, submits with the lock released, then blocks
//! on the condition variable until the demultiplexer fills the reply, the
//! link detaches, or the deadline passes.

use std::sync::Arc;
use std::time::{Duration, Instant};

use fm_protocol::{BandConfiguration, Frequency, ReceiverCommand, ReceiverEvent, ReceiverLink};
use tracing::{debug, info, warn};

use crate::demux::{Demultiplexer, Inner, Shared};
use crate::error::{ReceiverError, Result};
use crate::state::ReceiverState;
use crate::waiter::{PendingOperation, Reply};

/// Deadline applied to every command unless configured otherwise
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_millis(5000);

/// Owns the link, the shared state and the operation slot
pub struct Coordinator {
    link: Arc<dyn ReceiverLink>,
    shared: Arc<Shared>,
    timeout: Duration,
}

impl Coordinator {
    /// Create a coordinator for `link`; nothing is submitted until [`attach`](Self::attach)
    pub fn new(link: Arc<dyn ReceiverLink>, band: BandConfiguration, timeout: Duration) -> Self {
        let shared = Arc::new(Shared::new(band));
        Self {
            link,
            shared,
            timeout,
        }
    }

    /// Per-command deadline
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Band used for validation and channel arithmetic
    pub fn band(&self) -> BandConfiguration {
        self.shared.lock().band
    }

    /// Replace the band, e.g. after a region change
    pub fn set_band(&self, band: BandConfiguration) {
        self.shared.lock().band = band;
    }

    /// Attach the link and wait for its `Attached` notification
    pub fn attach(&self) -> Result<()> {
        if self.is_attached() {
            return Ok(());
        }
        let epoch = self.shared.next_epoch();
        let listener = Arc::new(Demultiplexer::new(self.shared.clone(), epoch));
        let code = self.link.attach(listener);
        if !code.is_ok() {
            warn!(%code, "link refused attach");
            return Err(ReceiverError::Rejected(code));
        }

        let deadline = Instant::now() + self.timeout;
        let mut inner = self.shared.lock();
        while !inner.state.link_attached {
            let now = Instant::now();
            if now >= deadline {
                warn!("link did not report attachment in time");
                return Err(ReceiverError::Timeout {
                    waited_ms: millis(self.timeout),
                });
            }
            inner = self.wait(inner, deadline - now);
        }
        Ok(())
    }

    /// Release the link, failing any waiter and clearing state
    pub fn detach(&self) {
        self.link.detach();
        self.shared.handle_detach();
    }

    /// Whether the link has reported attachment
    pub fn is_attached(&self) -> bool {
        self.shared.lock().state.link_attached
    }

    /// Claim the operation slot
    pub fn session(&self) -> Result<Session<'_>> {
        let mut inner = self.shared.lock();
        if !inner.state.link_attached {
            return Err(ReceiverError::NotReady);
        }
        if inner.busy {
            debug!("operation slot taken");
            return Err(ReceiverError::Busy);
        }
        inner.busy = true;
        inner.ledger.purge(Instant::now(), self.timeout * 2);
        Ok(Session { coordinator: self })
    }

    /// Run a single command in its own session
    pub fn execute(&self, command: &ReceiverCommand) -> Result<Option<ReceiverEvent>> {
        self.session()?.execute(command)
    }

    /// Submit without claiming the slot or waiting for a reply.
    ///
    /// Used for `AbortSeek`, whose seek-complete event answers the seek
    /// already in flight.
    pub fn submit_unawaited(&self, command: &ReceiverCommand) -> Result<()> {
        command.validate()?;
        {
            let inner = self.shared.lock();
            if !inner.state.link_attached {
                return Err(ReceiverError::NotReady);
            }
            if command.requires_radio_on() && !inner.state.radio_on {
                return Err(ReceiverError::RadioOff);
            }
        }
        debug!(command = command.name(), "submitting without waiter");
        let code = self.link.submit(command);
        if code.is_ok() {
            Ok(())
        } else {
            warn!(command = command.name(), %code, "command rejected");
            Err(ReceiverError::Rejected(code))
        }
    }

    /// Copy of the current state
    pub fn snapshot(&self) -> ReceiverState {
        self.shared.lock().state.clone()
    }

    /// Run `f` against the state under the lock
    pub fn with_state<R>(&self, f: impl FnOnce(&mut ReceiverState) -> R) -> R {
        f(&mut self.shared.lock().state)
    }

    fn wait<'a>(
        &self,
        guard: std::sync::MutexGuard<'a, Inner>,
        timeout: Duration,
    ) -> std::sync::MutexGuard<'a, Inner> {
        match self.shared.changed.wait_timeout(guard, timeout) {
            Ok((guard, _)) => guard,
            Err(poisoned) => poisoned.into_inner().0,
        }
    }
}

impl Drop for Coordinator {
    fn drop(&mut self) {
        if self.is_attached() {
            self.detach();
        }
    }
}

/// Exclusive right to run commands until dropped
pub struct Session<'a> {
    coordinator: &'a Coordinator,
}

impl Session<'_> {
    /// Submit `command` and wait for the event that confirms it.
    ///
    /// Commands that the link executes silently return `None` once accepted.
    pub fn execute(&mut self, command: &ReceiverCommand) -> Result<Option<ReceiverEvent>> {
        self.run(command, None)
    }

    /// Tune and require the confirming status to report `frequency`
    pub fn tune(&mut self, frequency: Frequency) -> Result<ReceiverEvent> {
        self.run(&ReceiverCommand::Tune { frequency }, Some(frequency))?
            .ok_or_else(|| ReceiverError::Unconfirmed("tune produced no status".into()))
    }

    /// Copy of the current state
    pub fn snapshot(&self) -> ReceiverState {
        self.coordinator.snapshot()
    }

    fn run(
        &mut self,
        command: &ReceiverCommand,
        expected: Option<Frequency>,
    ) -> Result<Option<ReceiverEvent>> {
        command.validate()?;
        let coordinator = self.coordinator;
        let name = command.name();
        let tag = command.awaited_event();

        let generation = {
            let mut inner = coordinator.shared.lock();
            if !inner.state.link_attached {
                return Err(ReceiverError::NotReady);
            }
            if command.requires_radio_on() && !inner.state.radio_on {
                return Err(ReceiverError::RadioOff);
            }
            if inner.pending.is_some() {
                return Err(ReceiverError::Busy);
            }
            let generation = inner.ledger.next_generation();
            if let Some(tag) = tag {
                inner.ledger.record(tag, generation, expected);
                inner.pending = Some(PendingOperation::new(
                    name,
                    tag,
                    generation,
                    coordinator.timeout,
                ));
            }
            generation
        };

        debug!(command = name, generation, "submitting");
        let code = coordinator.link.submit(command);

        let mut inner = coordinator.shared.lock();
        if !code.is_ok() {
            warn!(command = name, %code, "command rejected");
            inner.ledger.forget(generation);
            inner.pending = None;
            return Err(ReceiverError::Rejected(code));
        }
        if tag.is_none() {
            debug!(command = name, "accepted");
            return Ok(None);
        }

        loop {
            let Some(pending) = inner.pending.as_mut() else {
                return Err(ReceiverError::LinkLost);
            };
            if let Some(reply) = pending.reply.take() {
                inner.pending = None;
                return match reply {
                    Reply::Event(event) => confirm(event, expected).map(Some),
                    Reply::LinkLost => Err(ReceiverError::LinkLost),
                };
            }

            let now = Instant::now();
            let deadline = pending.deadline;
            if now >= deadline {
                let shadowed = pending.shadowed.take();
                inner.pending = None;
                if let Some(event) = shadowed {
                    // The retired tune was never answered; the off-frequency
                    // status it absorbed was ours.
                    warn!(command = name, generation, "reclaiming absorbed reply");
                    inner.ledger.forget(generation);
                    return confirm(event, expected).map(Some);
                }
                inner.ledger.retire(generation, now);
                let waited_ms = millis(coordinator.timeout);
                warn!(command = name, generation, waited_ms, "command timed out");
                return Err(ReceiverError::Timeout { waited_ms });
            }
            inner = coordinator.wait(inner, deadline - now);
        }
    }
}

impl Drop for Session<'_> {
    fn drop(&mut self) {
        let mut inner = self.coordinator.shared.lock();
        inner.busy = false;
        inner.pending = None;
    }
}

fn confirm(event: ReceiverEvent, expected: Option<Frequency>) -> Result<ReceiverEvent> {
    match (expected, event.frequency()) {
        (Some(expected), Some(actual)) if expected != actual => {
            info!(%expected, %actual, "tuned to a different frequency");
            Err(ReceiverError::FrequencyMismatch { expected, actual })
        }
        _ => Ok(event),
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
