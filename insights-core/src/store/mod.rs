//! Durable per-index event queues
//!
//! Every index owns an ordered, append-only queue of [`EventInternal`]s. The
//! uploader reads a [`Snapshot`], sends it, and on success clears exactly the
//! entries of that snapshot. Appends that race with an in-flight upload land
//! after the snapshot and survive the clear.
//!
//! Two implementations ship with the crate:
//! - [`SqliteEventStore`]: rows in a shared SQLite database, durable across restarts
//! - [`MemoryEventStore`]: a mutex-guarded vector, for tests and ephemeral hosts

mod memory;
pub mod schema;
mod sqlite;

pub use memory::MemoryEventStore;
pub use sqlite::{Database, SqliteEventStore};

use crate::error::Result;
use crate::event::EventInternal;

/// Sequence number assigned by a store on append. Strictly increasing per store.
pub type Seq = i64;

/// Point-in-time read of a queue
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    entries: Vec<(Seq, EventInternal)>,
    poisoned: Vec<Seq>,
}

impl Snapshot {
    /// Build a snapshot from decoded entries (in append order) and the
    /// sequence numbers of records that failed to decode.
    pub fn new(entries: Vec<(Seq, EventInternal)>, poisoned: Vec<Seq>) -> Self {
        Self { entries, poisoned }
    }

    /// Decoded events in append order
    pub fn events(&self) -> impl Iterator<Item = &EventInternal> {
        self.entries.iter().map(|(_, event)| event)
    }

    pub fn to_vec(&self) -> Vec<EventInternal> {
        self.events().cloned().collect()
    }

    /// Number of decoded events
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when there is nothing to send
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of undecodable records seen by the read
    pub fn poisoned_count(&self) -> usize {
        self.poisoned.len()
    }

    /// Every sequence number covered by this snapshot, poisoned records included
    pub fn sequence_numbers(&self) -> impl Iterator<Item = Seq> + '_ {
        self.entries
            .iter()
            .map(|(seq, _)| *seq)
            .chain(self.poisoned.iter().copied())
    }
}

/// Ordered queue of pending events for one index
pub trait EventStore: Send + Sync {
    /// Index this queue belongs to
    fn index(&self) -> &str;

    /// Append an event at the end of the queue.
    ///
    /// The event is durable once this returns.
    fn append(&self, event: &EventInternal) -> Result<()>;

    /// Read every pending event in append order.
    ///
    /// Records that fail to decode are skipped and reported through
    /// [`Snapshot::poisoned_count`].
    fn read(&self) -> Result<Snapshot>;

    /// Remove exactly the entries of `snapshot`, returning how many were removed.
    ///
    /// Entries appended after the snapshot was taken are left in place.
    fn clear(&self, snapshot: &Snapshot) -> Result<usize>;

    /// Number of stored records
    ///
    /// Includes records that no longer decode, so a size threshold can fire
    /// on them. The attempt it triggers finds nothing to send and purges
    /// them.
    fn count(&self) -> Result<usize>;
}
