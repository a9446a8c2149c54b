//! Event demultiplexer
//!
//! Runs on the link's delivery thread. Each notification is folded into the
//! shared [`ReceiverState`] under the coordinator lock, then attributed to
//! at most one outstanding submission through the ledger. Only a live
//! submission that matches the installed waiter wakes it, or a late reply
//! absorbed by a retired submission when the waiter accepts its tag.
//!
//! Every attach gets a fresh listener stamped with a link epoch. Detach
//! advances the epoch, so whatever an old link still flushes afterwards is
//! dropped instead of repopulating the cleared state.

use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::Instant;

use fm_protocol::{BandConfiguration, LinkListener, LinkNotification, ReceiverEvent};
use tracing::{debug, info, trace, warn};

use crate::state::ReceiverState;
use crate::waiter::{Attribution, Ledger, PendingOperation, Reply};

/// Everything guarded by the coordinator lock
#[derive(Debug)]
pub(crate) struct Inner {
    pub state: ReceiverState,
    pub band: BandConfiguration,
    pub pending: Option<PendingOperation>,
    pub ledger: Ledger,
    /// A session holds the operation slot
    pub busy: bool,
    /// Listener generation currently allowed to deliver
    pub epoch: u64,
}

/// Lock and wake-up channel shared by the coordinator and demultiplexer
#[derive(Debug)]
pub(crate) struct Shared {
    inner: Mutex<Inner>,
    pub changed: Condvar,
}

impl Shared {
    pub fn new(band: BandConfiguration) -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: ReceiverState::default(),
                band,
                pending: None,
                ledger: Ledger::default(),
                busy: false,
                epoch: 0,
            }),
            changed: Condvar::new(),
        }
    }

    /// Take the lock. A panic on another thread leaves the state usable, so
    /// poisoning is ignored.
    pub fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Start a new link epoch; only listeners stamped with it are heard
    pub fn next_epoch(&self) -> u64 {
        let mut inner = self.lock();
        inner.epoch += 1;
        inner.epoch
    }

    /// Fail the waiter with `LinkLost` and forget everything the link told us
    pub fn handle_detach(&self) {
        let mut inner = self.lock();
        self.detach_locked(&mut inner);
    }

    fn detach_locked(&self, inner: &mut Inner) {
        inner.epoch += 1;
        if let Some(pending) = inner.pending.as_mut() {
            warn!(kind = pending.kind, "link lost while operation pending");
            pending.reply = Some(Reply::LinkLost);
        }
        inner.ledger.clear();
        inner.state.clear();
        self.changed.notify_all();
    }
}

/// Link listener feeding the coordinator
pub struct Demultiplexer {
    shared: Arc<Shared>,
    epoch: u64,
}

impl Demultiplexer {
    pub(crate) fn new(shared: Arc<Shared>, epoch: u64) -> Self {
        Self { shared, epoch }
    }

    fn dispatch(&self, inner: &mut Inner, event: ReceiverEvent) {
        if !inner.state.link_attached {
            debug!(tag = ?event.tag(), "dropping event from detached link");
            return;
        }
        let band = inner.band;
        inner.state.apply(&event, &band);

        let tag = event.tag();
        match inner.ledger.attribute(tag, event.frequency()) {
            Attribution::Live(generation) => match inner.pending.as_mut() {
                Some(pending) if pending.generation == generation => {
                    debug!(kind = pending.kind, ?tag, generation, "waking waiter");
                    pending.reply = Some(Reply::Event(event));
                    self.shared.changed.notify_all();
                }
                _ => debug!(?tag, generation, "event answers a finished submission"),
            },
            Attribution::Retired(stale) => {
                let Some(pending) = inner.pending.as_mut() else {
                    debug!(?tag, stale, "absorbing late reply to timed-out submission");
                    return;
                };
                if pending.reply.is_some() || !pending.tag.accepts(tag) {
                    debug!(?tag, stale, "absorbing late reply to timed-out submission");
                } else if inner.ledger.expects_frequency(pending.generation) {
                    // A tune still waits for its own frequency; keep this one
                    // in case that never comes.
                    debug!(kind = pending.kind, ?tag, stale, "holding off-frequency reply");
                    pending.shadowed = Some(event);
                } else {
                    let generation = pending.generation;
                    debug!(
                        kind = pending.kind,
                        ?tag,
                        stale,
                        generation,
                        "handing late reply to waiter"
                    );
                    pending.reply = Some(Reply::Event(event));
                    inner.ledger.retire(generation, Instant::now());
                    self.shared.changed.notify_all();
                }
            }
            Attribution::Unsolicited => trace!(?tag, "unsolicited event"),
        }
    }
}

impl LinkListener for Demultiplexer {
    fn notify(&self, notification: LinkNotification) {
        let mut inner = self.shared.lock();
        if inner.epoch != self.epoch {
            trace!(epoch = self.epoch, current = inner.epoch, "ignoring stale link");
            return;
        }
        match notification {
            LinkNotification::Attached => {
                info!("receiver link attached");
                inner.state.link_attached = true;
                self.shared.changed.notify_all();
            }
            LinkNotification::Detached => {
                info!("receiver link detached");
                self.shared.detach_locked(&mut inner);
            }
            LinkNotification::Event(event) => self.dispatch(&mut inner, event),
        }
    }
}
