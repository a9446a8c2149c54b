//! Delivery task for simulated links
//!
//! A simulated link hands notifications to a [`Courier`] together with a
//! delay. A dedicated thread runs a small tokio runtime whose `select!`
//! loop accepts new envelopes and releases queued ones when they fall due,
//! in due-time order with ties kept in submission order. Listeners are
//! therefore always called from one thread, never from the submitter.

use std::collections::BTreeMap;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use fm_protocol::{LinkListener, LinkNotification};
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

const IDLE_WAKE: Duration = Duration::from_secs(3600);

/// Suppresses an envelope if its epoch moved on before delivery
#[derive(Debug, Clone)]
pub(crate) struct CancelGuard {
    epoch: Arc<AtomicU64>,
    expected: u64,
}

impl CancelGuard {
    pub fn new(epoch: Arc<AtomicU64>) -> Self {
        let expected = epoch.load(Ordering::Acquire);
        Self { epoch, expected }
    }

    fn is_current(&self) -> bool {
        self.epoch.load(Ordering::Acquire) == self.expected
    }
}

struct Envelope {
    due: Instant,
    listener: Arc<dyn LinkListener>,
    notification: LinkNotification,
    guard: Option<CancelGuard>,
}

impl Envelope {
    fn deliver(self) {
        if let Some(guard) = &self.guard {
            if !guard.is_current() {
                debug!(notification = ?self.notification, "dropping cancelled notification");
                return;
            }
        }
        trace!(notification = ?self.notification, "delivering");
        self.listener.notify(self.notification);
    }
}

/// Sending half of a delivery thread; the thread drains and exits on drop
pub(crate) struct Courier {
    tx: mpsc::UnboundedSender<Envelope>,
}

impl Courier {
    /// Start the delivery thread
    pub fn spawn(name: &str) -> io::Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        thread::Builder::new()
            .name(name.to_string())
            .spawn(move || run(rx))?;
        Ok(Self { tx })
    }

    /// Deliver `notification` to `listener` after `delay`
    pub fn send(
        &self,
        listener: &Arc<dyn LinkListener>,
        notification: LinkNotification,
        delay: Duration,
    ) {
        self.enqueue(listener, notification, delay, None);
    }

    /// Like [`send`](Self::send), unless `guard` is cancelled first
    pub fn send_guarded(
        &self,
        listener: &Arc<dyn LinkListener>,
        notification: LinkNotification,
        delay: Duration,
        guard: CancelGuard,
    ) {
        self.enqueue(listener, notification, delay, Some(guard));
    }

    fn enqueue(
        &self,
        listener: &Arc<dyn LinkListener>,
        notification: LinkNotification,
        delay: Duration,
        guard: Option<CancelGuard>,
    ) {
        let envelope = Envelope {
            due: Instant::now() + delay,
            listener: listener.clone(),
            notification,
            guard,
        };
        if self.tx.send(envelope).is_err() {
            warn!("delivery thread gone, notification lost");
        }
    }
}

fn run(mut rx: mpsc::UnboundedReceiver<Envelope>) {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            warn!("failed to start delivery runtime: {}", e);
            return;
        }
    };

    runtime.block_on(async move {
        let mut queue: BTreeMap<(Instant, u64), Envelope> = BTreeMap::new();
        let mut sequence = 0u64;

        loop {
            let next_due = queue.keys().next().map(|(due, _)| *due);
            let wake = next_due.unwrap_or_else(|| Instant::now() + IDLE_WAKE);

            tokio::select! {
                received = rx.recv() => match received {
                    Some(envelope) => {
                        sequence += 1;
                        queue.insert((envelope.due, sequence), envelope);
                    }
                    None => break,
                },
                () = tokio::time::sleep_until(wake.into()), if next_due.is_some() => {
                    if let Some((_, envelope)) = queue.pop_first() {
                        envelope.deliver();
                    }
                }
            }
        }

        // Sender dropped: flush what is left on schedule
        for ((due, _), envelope) in std::mem::take(&mut queue) {
            tokio::time::sleep_until(due.into()).await;
            envelope.deliver();
        }
        debug!("delivery thread finished");
    });
}
