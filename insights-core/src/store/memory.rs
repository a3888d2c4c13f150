//! In-memory event queue

use std::sync::{Mutex, MutexGuard, PoisonError};

use super::{EventStore, Seq, Snapshot};
use crate::error::Result;
use crate::event::EventInternal;

#[derive(Default)]
struct Queue {
    next_seq: Seq,
    entries: Vec<(Seq, EventInternal)>,
}

/// Event queue kept in process memory. Nothing survives a restart.
pub struct MemoryEventStore {
    index: String,
    queue: Mutex<Queue>,
}

impl MemoryEventStore {
    pub fn new(index: impl Into<String>) -> Self {
        Self {
            index: index.into(),
            queue: Mutex::new(Queue::default()),
        }
    }

    /// Create a store pre-filled with events, in order
    pub fn with_events(index: impl Into<String>, events: impl IntoIterator<Item = EventInternal>) -> Self {
        let store = Self::new(index);
        {
            let mut queue = store.lock();
            for event in events {
                queue.next_seq += 1;
                let seq = queue.next_seq;
                queue.entries.push((seq, event));
            }
        }
        store
    }

    fn lock(&self) -> MutexGuard<'_, Queue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl EventStore for MemoryEventStore {
    fn index(&self) -> &str {
        &self.index
    }

    fn append(&self, event: &EventInternal) -> Result<()> {
        let mut queue = self.lock();
        queue.next_seq += 1;
        let seq = queue.next_seq;
        queue.entries.push((seq, event.clone()));
        Ok(())
    }

    fn read(&self) -> Result<Snapshot> {
        Ok(Snapshot::new(self.lock().entries.clone(), Vec::new()))
    }

    fn clear(&self, snapshot: &Snapshot) -> Result<usize> {
        let mut seqs: Vec<Seq> = snapshot.sequence_numbers().collect();
        seqs.sort_unstable();

        let mut queue = self.lock();
        let before = queue.entries.len();
        queue
            .entries
            .retain(|(seq, _)| seqs.binary_search(seq).is_err());
        Ok(before - queue.entries.len())
    }

    fn count(&self) -> Result<usize> {
        Ok(self.lock().entries.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{Event, EventObjects};

    fn view(name: &str) -> EventInternal {
        EventInternal::new(
            "products",
            Event::view(name, "user", 7, EventObjects::filters(["brand:apple"]), None).unwrap(),
        )
    }

    #[test]
    fn test_read_is_a_snapshot() {
        let store = MemoryEventStore::new("products");
        store.append(&view("a")).unwrap();

        let snapshot = store.read().unwrap();
        store.append(&view("b")).unwrap();

        assert_eq!(snapshot.to_vec(), vec![view("a")]);
        assert_eq!(store.count().unwrap(), 2);
    }

    #[test]
    fn test_clear_removes_only_snapshot_entries() {
        let store = MemoryEventStore::with_events("products", [view("a"), view("b")]);
        let snapshot = store.read().unwrap();
        store.append(&view("c")).unwrap();

        assert_eq!(store.clear(&snapshot).unwrap(), 2);
        assert_eq!(store.read().unwrap().to_vec(), vec![view("c")]);
    }

    #[test]
    fn test_equal_events_are_distinct_entries() {
        let store = MemoryEventStore::new("products");
        store.append(&view("a")).unwrap();
        let snapshot = store.read().unwrap();
        store.append(&view("a")).unwrap();

        store.clear(&snapshot).unwrap();
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn test_clearing_twice_is_harmless() {
        let store = MemoryEventStore::with_events("products", [view("a")]);
        let snapshot = store.read().unwrap();

        assert_eq!(store.clear(&snapshot).unwrap(), 1);
        assert_eq!(store.clear(&snapshot).unwrap(), 0);
    }
}
