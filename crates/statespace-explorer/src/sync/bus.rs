//! Session-scoped publish/subscribe channel.
//!
//! Delivery is fire-and-forget and at most once; a subscriber only sees
//! events published after it registered.

use crossbeam_channel::{unbounded, Receiver, Sender};
use serde::Serialize;
use statespace_core::{NodeId, PaneId, RegistryMsg};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::brush::LinkedSelection;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum BusEvent {
    /// Pane-registry traffic for the overview.
    Registry(RegistryMsg),
    MarksChanged {
        added: Vec<NodeId>,
        removed: Vec<NodeId>,
    },
    /// Panes re-derive their marked decoration from the mark set.
    Propagate,
    LinkedSelection(LinkedSelection),
    Relayout {
        pane: PaneId,
    },
    RecurringUpdated {
        ids: Vec<NodeId>,
        panes: Vec<PaneId>,
    },
    Warning {
        pane: Option<PaneId>,
        message: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    Registry,
    Marks,
    Selection,
    Layout,
    Recurrence,
    Warnings,
}

impl BusEvent {
    pub fn topic(&self) -> Topic {
        match self {
            Self::Registry(_) => Topic::Registry,
            Self::MarksChanged { .. } | Self::Propagate => Topic::Marks,
            Self::LinkedSelection(_) => Topic::Selection,
            Self::Relayout { .. } => Topic::Layout,
            Self::RecurringUpdated { .. } => Topic::Recurrence,
            Self::Warning { .. } => Topic::Warnings,
        }
    }

    pub fn warning(pane: Option<PaneId>, message: impl Into<String>) -> Self {
        Self::Warning {
            pane,
            message: message.into(),
        }
    }
}

struct Subscriber {
    id: u64,
    topics: Vec<Topic>,
    tx: Sender<BusEvent>,
}

impl Subscriber {
    fn wants(&self, topic: Topic) -> bool {
        self.topics.is_empty() || self.topics.contains(&topic)
    }
}

pub struct Subscription {
    pub id: u64,
    pub rx: Receiver<BusEvent>,
}

impl Subscription {
    /// Everything delivered so far, without blocking.
    pub fn drain(&self) -> Vec<BusEvent> {
        self.rx.try_iter().collect()
    }
}

#[derive(Clone, Default)]
pub struct SyncBus {
    subscribers: Arc<Mutex<Vec<Subscriber>>>,
    next_id: Arc<AtomicU64>,
}

impl SyncBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a subscriber for `topics`; an empty list means every topic.
    pub fn subscribe(&self, topics: &[Topic]) -> Subscription {
        let (tx, rx) = unbounded();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut subs) = self.subscribers.lock() {
            subs.push(Subscriber {
                id,
                topics: topics.to_vec(),
                tx,
            });
        }
        Subscription { id, rx }
    }

    pub fn unsubscribe(&self, id: u64) {
        if let Ok(mut subs) = self.subscribers.lock() {
            subs.retain(|s| s.id != id);
        }
    }

    /// Delivers `event` to interested subscribers and prunes dropped ones.
    /// Returns how many received it.
    pub fn publish(&self, event: BusEvent) -> usize {
        let Ok(mut subs) = self.subscribers.lock() else {
            return 0;
        };
        let topic = event.topic();
        let mut delivered = 0;
        subs.retain(|s| {
            if !s.wants(topic) {
                return true;
            }
            match s.tx.send(event.clone()) {
                Ok(()) => {
                    delivered += 1;
                    true
                }
                Err(_) => {
                    tracing::debug!(subscriber = s.id, "dropping disconnected subscriber");
                    false
                }
            }
        });
        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().map(|s| s.len()).unwrap_or(0)
    }

    pub fn clear(&self) {
        if let Ok(mut subs) = self.subscribers.lock() {
            subs.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_filters_route_events() {
        let bus = SyncBus::new();
        let registry = bus.subscribe(&[Topic::Registry]);
        let everything = bus.subscribe(&[]);

        bus.publish(BusEvent::Propagate);
        bus.publish(BusEvent::Registry(RegistryMsg::ResetPaneNodeMarkings));

        assert_eq!(registry.drain(), vec![BusEvent::Registry(RegistryMsg::ResetPaneNodeMarkings)]);
        assert_eq!(everything.drain().len(), 2);
    }

    #[test]
    fn no_replay_for_late_subscribers() {
        let bus = SyncBus::new();
        bus.publish(BusEvent::Propagate);
        let late = bus.subscribe(&[]);
        assert!(late.drain().is_empty());
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let bus = SyncBus::new();
        let keep = bus.subscribe(&[]);
        let gone = bus.subscribe(&[]);
        drop(gone);

        assert_eq!(bus.publish(BusEvent::Propagate), 1);
        assert_eq!(bus.subscriber_count(), 1);
        assert_eq!(keep.drain().len(), 1);

        bus.unsubscribe(keep.id);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn events_serialize_with_kebab_tags() {
        let json = serde_json::to_value(BusEvent::Relayout {
            pane: PaneId::from("pane-1"),
        })
        .expect("encode");
        assert_eq!(json["type"], "relayout");
        assert_eq!(json["data"]["pane"], "pane-1");
    }
}
