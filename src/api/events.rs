//! Typed event delivery over channels

use std::collections::HashMap;
use std::sync::mpsc::{channel, Receiver, Sender};

use crate::api::types::EngineEvent;
use crate::core::ObjectId;

/// Fan-out of engine events to per-object and global subscribers.
///
/// Subscribers whose receiver was dropped are pruned on the next publish.
#[derive(Debug, Default)]
pub struct EventBus {
    by_object: HashMap<ObjectId, Vec<Sender<EngineEvent>>>,
    global: Vec<Sender<EngineEvent>>,
    published: u64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Events concerning one object
    pub fn subscribe(&mut self, object_id: ObjectId) -> Receiver<EngineEvent> {
        let (tx, rx) = channel();
        self.by_object.entry(object_id).or_default().push(tx);
        rx
    }

    /// Every event, including ones that concern no object
    pub fn subscribe_all(&mut self) -> Receiver<EngineEvent> {
        let (tx, rx) = channel();
        self.global.push(tx);
        rx
    }

    pub fn publish(&mut self, event: EngineEvent) {
        self.published += 1;

        if let Some(object_id) = event.object_id() {
            if let Some(senders) = self.by_object.get_mut(object_id) {
                senders.retain(|tx| tx.send(event.clone()).is_ok());
                if senders.is_empty() {
                    let object_id = object_id.clone();
                    self.by_object.remove(&object_id);
                }
            }
        }

        self.global.retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Drop an object's subscribers; their receivers see a disconnect
    pub fn close_object(&mut self, object_id: &ObjectId) {
        self.by_object.remove(object_id);
    }

    pub fn subscriber_count(&self) -> usize {
        self.global.len() + self.by_object.values().map(Vec::len).sum::<usize>()
    }

    pub fn published(&self) -> u64 {
        self.published
    }
}
