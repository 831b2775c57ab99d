//! Model change events
//!
//! Renames and removals are applied to the model's own indexes first
//! (collection keys, reference caches), then handed to subscribed
//! listeners, then appended to a journal the caller can drain.

use serde::Serialize;
use tracing::trace;

use super::{EdmxModel, ObjectId, ObjectKind};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ModelEvent {
    NameChanged {
        object: ObjectId,
        kind: ObjectKind,
        old_name: String,
        new_name: String,
    },
    Removed {
        object: ObjectId,
        kind: ObjectKind,
        name: String,
    },
}

impl ModelEvent {
    pub fn object(&self) -> ObjectId {
        match self {
            Self::NameChanged { object, .. } | Self::Removed { object, .. } => *object,
        }
    }

    pub fn kind(&self) -> ObjectKind {
        match self {
            Self::NameChanged { kind, .. } | Self::Removed { kind, .. } => *kind,
        }
    }
}

/// Handle returned by `subscribe`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Listener = Box<dyn FnMut(&ModelEvent)>;

#[derive(Default)]
pub(crate) struct Listeners {
    next: u64,
    entries: Vec<(SubscriptionId, Listener)>,
}

impl Listeners {
    fn on(&mut self, listener: Listener) -> SubscriptionId {
        self.next += 1;
        let id = SubscriptionId(self.next);
        self.entries.push((id, listener));
        id
    }

    fn remove_listener(&mut self, id: SubscriptionId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(entry, _)| *entry != id);
        self.entries.len() != before
    }

    fn emit(&mut self, event: &ModelEvent) {
        for (_, listener) in self.entries.iter_mut() {
            listener(event);
        }
    }
}

impl EdmxModel {
    /// Call `listener` for every future event
    pub fn subscribe(&mut self, listener: impl FnMut(&ModelEvent) + 'static) -> SubscriptionId {
        self.listeners.on(Box::new(listener))
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.listeners.remove_listener(id)
    }

    /// Events since the last `take_events`
    ///
    /// The journal grows until drained. Long-lived models that only use
    /// listeners can turn it off with `events.journal = false`.
    pub fn events(&self) -> &[ModelEvent] {
        &self.journal
    }

    pub fn take_events(&mut self) -> Vec<ModelEvent> {
        std::mem::take(&mut self.journal)
    }

    pub(crate) fn emit(&mut self, event: ModelEvent) {
        let object = event.object();
        let key = self.record(object).collection;
        match &event {
            ModelEvent::NameChanged { new_name, .. } => {
                // Reference caches hold object identities and survive renames
                if let Some(collection) = self.collections.get_mut(&key) {
                    collection.rekey(object, new_name);
                }
            }
            ModelEvent::Removed { .. } => {
                if let Some(collection) = self.collections.get_mut(&key) {
                    collection.remove(object);
                }
                let cleared = self.refs.invalidate_target(object);
                self.refs.forget_holder(object);
                trace!(object = object.index(), cleared, "Reference caches invalidated");
            }
        }
        self.listeners.emit(&event);
        if self.config.events.journal {
            self.journal.push(event);
        }
    }
}
