//! Scripted receiver link
//!
//! A test double that records every submission, answers with configurable
//! acceptance codes and replays whatever events a responder closure returns.
//! Events can also be injected directly to drive demultiplexer paths that a
//! well-behaved receiver never takes.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

use fm_protocol::{AcceptanceCode, LinkListener, LinkNotification, ReceiverCommand, ReceiverEvent, ReceiverLink};
use tracing::warn;

use crate::courier::Courier;

type Responder = Box<dyn Fn(&ReceiverCommand) -> Vec<ReceiverEvent> + Send + Sync>;

struct Script {
    listener: Option<Arc<dyn LinkListener>>,
    courier: Option<Courier>,
    hold_attach: bool,
    latency: Duration,
    acceptance: HashMap<&'static str, AcceptanceCode>,
    responder: Option<Responder>,
    submissions: Vec<ReceiverCommand>,
}

/// Receiver link driven by a test script
pub struct ScriptedLink {
    script: Mutex<Script>,
}

impl Default for ScriptedLink {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedLink {
    /// Accepts everything, answers nothing, attaches immediately
    pub fn new() -> Self {
        Self {
            script: Mutex::new(Script {
                listener: None,
                courier: None,
                hold_attach: false,
                latency: Duration::ZERO,
                acceptance: HashMap::new(),
                responder: None,
                submissions: Vec::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Do not report `Attached` until [`complete_attach`](Self::complete_attach)
    pub fn hold_attach(&self) {
        self.lock().hold_attach = true;
    }

    /// Report `Attached` now
    pub fn complete_attach(&self) {
        self.lock().deliver(LinkNotification::Attached, Duration::ZERO);
    }

    /// Delay applied to responder events
    pub fn set_latency(&self, latency: Duration) {
        self.lock().latency = latency;
    }

    /// Answer commands named `command` (see [`ReceiverCommand::name`]) with `code`
    pub fn set_acceptance(&self, command: &'static str, code: AcceptanceCode) {
        self.lock().acceptance.insert(command, code);
    }

    /// Events to emit for each accepted command
    pub fn respond_with<F>(&self, responder: F)
    where
        F: Fn(&ReceiverCommand) -> Vec<ReceiverEvent> + Send + Sync + 'static,
    {
        self.lock().responder = Some(Box::new(responder));
    }

    /// Deliver `event` now
    pub fn inject(&self, event: ReceiverEvent) {
        self.inject_after(event, Duration::ZERO);
    }

    /// Deliver `event` after `delay`
    pub fn inject_after(&self, event: ReceiverEvent, delay: Duration) {
        self.lock().deliver(LinkNotification::Event(event), delay);
    }

    /// Simulate the service going away
    pub fn drop_link(&self) {
        self.lock().shut_down();
    }

    /// Commands submitted so far, accepted or not
    pub fn submissions(&self) -> Vec<ReceiverCommand> {
        self.lock().submissions.clone()
    }

    pub fn submission_count(&self) -> usize {
        self.lock().submissions.len()
    }

    /// Block until at least `count` submissions arrived or `timeout` passed
    pub fn wait_for_submissions(&self, count: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.submission_count() < count {
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(1));
        }
        true
    }
}

impl Script {
    fn deliver(&self, notification: LinkNotification, delay: Duration) {
        match (&self.listener, &self.courier) {
            (Some(listener), Some(courier)) => courier.send(listener, notification, delay),
            _ => warn!(?notification, "no listener attached, dropping"),
        }
    }

    fn shut_down(&mut self) {
        if self.listener.is_some() {
            self.deliver(LinkNotification::Detached, Duration::ZERO);
        }
        self.listener = None;
        self.courier = None;
    }
}

impl ReceiverLink for ScriptedLink {
    fn attach(&self, listener: Arc<dyn LinkListener>) -> AcceptanceCode {
        let mut script = self.lock();
        if script.courier.is_none() {
            match Courier::spawn("fm-sim-script") {
                Ok(courier) => script.courier = Some(courier),
                Err(e) => {
                    warn!("could not start delivery thread: {}", e);
                    return AcceptanceCode::ServerFail;
                }
            }
        }
        script.listener = Some(listener);
        if !script.hold_attach {
            script.deliver(LinkNotification::Attached, Duration::ZERO);
        }
        AcceptanceCode::Ok
    }

    fn detach(&self) {
        self.lock().shut_down();
    }

    fn submit(&self, command: &ReceiverCommand) -> AcceptanceCode {
        let mut script = self.lock();
        script.submissions.push(command.clone());
        if script.listener.is_none() {
            return AcceptanceCode::ServerFail;
        }
        let code = script
            .acceptance
            .get(command.name())
            .copied()
            .unwrap_or(AcceptanceCode::Ok);
        if code.is_ok() {
            let events = script
                .responder
                .as_ref()
                .map(|respond| respond(command))
                .unwrap_or_default();
            for event in events {
                script.deliver(LinkNotification::Event(event), script.latency);
            }
        }
        code
    }
}
