//! Receiver link contract
//!
//! A [`ReceiverLink`] is the bidirectional channel to the radio service.
//! Commands go out through [`ReceiverLink::submit`], which only reports
//! whether the command was queued. Everything the hardware says comes back
//! asynchronously as [`LinkNotification`]s delivered to the attached
//! [`LinkListener`], in order, on the link's own delivery thread.

use std::sync::Arc;

use crate::codes::AcceptanceCode;
use crate::command::ReceiverCommand;
use crate::event::ReceiverEvent;

/// Something the link reports to its listener
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkNotification {
    /// The service is reachable and commands may be submitted
    Attached,
    /// The service went away; nothing further will be delivered
    Detached,
    /// A hardware event
    Event(ReceiverEvent),
}

/// Receives link notifications
///
/// Implementations are called from the link's delivery thread and must not
/// block on anything that waits for further notifications.
pub trait LinkListener: Send + Sync {
    /// Handle one notification
    fn notify(&self, notification: LinkNotification);
}

/// Bidirectional channel to the FM receiver service
pub trait ReceiverLink: Send + Sync {
    /// Begin attaching; `Attached` is delivered to `listener` once ready
    fn attach(&self, listener: Arc<dyn LinkListener>) -> AcceptanceCode;

    /// Release the service; `Detached` is delivered to the listener
    fn detach(&self);

    /// Queue a command. Returns once the command is queued, not executed.
    fn submit(&self, command: &ReceiverCommand) -> AcceptanceCode;
}

impl<T: ReceiverLink + ?Sized> ReceiverLink for Arc<T> {
    fn attach(&self, listener: Arc<dyn LinkListener>) -> AcceptanceCode {
        (**self).attach(listener)
    }

    fn detach(&self) {
        (**self).detach()
    }

    fn submit(&self, command: &ReceiverCommand) -> AcceptanceCode {
        (**self).submit(command)
    }
}
