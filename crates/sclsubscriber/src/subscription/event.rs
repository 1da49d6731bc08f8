//! Outbound side of the engine: actions to apply and change notifications.

use crate::scl::{Action, ElementId};
use serde::Serialize;
use tokio::sync::{broadcast, mpsc};
use tracing::{trace, warn};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum SubscriptionEvent {
    SubscriptionChanged {
        control: Option<ElementId>,
        fcda: Option<ElementId>,
    },
    ExtRefSelectionChanged {
        ext_ref: Option<ElementId>,
    },
    FcdaSelected {
        control: Option<ElementId>,
        fcda: Option<ElementId>,
    },
}

/// Receiver of everything the engine emits.
///
/// `dispatch` hands over one action that must be applied as a unit (and
/// undone as a unit). `notify` is fire and forget.
pub trait ActionSink {
    fn dispatch(&mut self, action: Action);
    fn notify(&mut self, event: SubscriptionEvent);
}

/// Keeps everything in emission order.
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub actions: Vec<Action>,
    pub events: Vec<SubscriptionEvent>,
}

impl RecordingSink {
    pub fn new() -> Self {
        RecordingSink::default()
    }

    /// Takes the recorded actions, leaving the sink empty.
    pub fn drain_actions(&mut self) -> Vec<Action> {
        std::mem::take(&mut self.actions)
    }
}

impl ActionSink for RecordingSink {
    fn dispatch(&mut self, action: Action) {
        self.actions.push(action);
    }

    fn notify(&mut self, event: SubscriptionEvent) {
        self.events.push(event);
    }
}

/// Hands actions to an applier task over an unbounded mpsc channel and
/// publishes events on a broadcast channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    action_tx: mpsc::UnboundedSender<Action>,
    event_tx: broadcast::Sender<SubscriptionEvent>,
    dispatched: u64,
}

impl ChannelSink {
    /// Returns the sink and the receiving end the applier task drains.
    pub fn new(event_capacity: usize) -> (Self, mpsc::UnboundedReceiver<Action>) {
        let (action_tx, action_rx) = mpsc::unbounded_channel();
        let (event_tx, _) = broadcast::channel(event_capacity.max(1));
        (
            ChannelSink {
                action_tx,
                event_tx,
                dispatched: 0,
            },
            action_rx,
        )
    }

    /// Actions handed to the channel so far, used to wait for the applier.
    pub fn dispatched(&self) -> u64 {
        self.dispatched
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SubscriptionEvent> {
        self.event_tx.subscribe()
    }
}

impl ActionSink for ChannelSink {
    fn dispatch(&mut self, action: Action) {
        match self.action_tx.send(action) {
            Ok(()) => self.dispatched += 1,
            Err(err) => warn!("action '{}' dropped, applier gone", err.0.title),
        }
    }

    fn notify(&mut self, event: SubscriptionEvent) {
        /* no listener is fine */
        if self.event_tx.send(event).is_err() {
            trace!("event without listener");
        }
    }
}
