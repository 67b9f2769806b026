//! Ordered queue keyed by `(epoch, sequence)`.
//!
//! Every buffer in the session is one of these. Entries are owned by the queue
//! until popped or removed; popping hands ownership to the caller. Keys are
//! unique, so the pop order is strictly ascending.

use std::collections::BTreeMap;
use std::fmt;

use crate::types::Sequence;
use crate::Error;

pub struct Queue<T> {
    name: &'static str,
    entries: BTreeMap<Sequence, T>,
}

impl<T> Queue<T> {
    /// Create an empty queue. The name only shows up in logs and Debug output.
    pub fn new(name: &'static str) -> Self {
        Queue {
            name,
            entries: BTreeMap::new(),
        }
    }

    /// Insert `item` at `key`.
    ///
    /// Fails with [`Error::DuplicateKey`] if the key is taken, in which case the
    /// queue is left as it was and `item` is dropped.
    pub fn insert(&mut self, key: Sequence, item: T) -> Result<(), Error> {
        if self.entries.contains_key(&key) {
            warn!("Duplicate key in {}: {}", self.name, key);
            return Err(Error::DuplicateKey(key));
        }
        trace!("Insert into {}: {}", self.name, key);
        self.entries.insert(key, item);
        Ok(())
    }

    /// The entry with the smallest key.
    pub fn peek_min(&self) -> Result<(Sequence, &T), Error> {
        self.entries
            .first_key_value()
            .map(|(k, v)| (*k, v))
            .ok_or(Error::Empty)
    }

    /// Remove and return the entry with the smallest key.
    pub fn pop_min(&mut self) -> Result<(Sequence, T), Error> {
        let popped = self.entries.pop_first().ok_or(Error::Empty)?;
        trace!("Pop from {}: {}", self.name, popped.0);
        Ok(popped)
    }

    /// Remove a specific entry. Absent keys are a no-op.
    pub fn remove(&mut self, key: Sequence) -> Option<T> {
        self.entries.remove(&key)
    }

    pub fn get(&self, key: Sequence) -> Option<&T> {
        self.entries.get(&key)
    }

    pub fn get_mut(&mut self, key: Sequence) -> Option<&mut T> {
        self.entries.get_mut(&key)
    }

    pub fn contains(&self, key: Sequence) -> bool {
        self.entries.contains_key(&key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate in ascending key order without removing anything.
    pub fn iter(&self) -> impl Iterator<Item = (Sequence, &T)> + '_ {
        self.entries.iter().map(|(k, v)| (*k, v))
    }

    /// Pop every entry in ascending key order, handing each to `release`.
    ///
    /// Calling this on an empty queue does nothing.
    pub fn drain_with(&mut self, mut release: impl FnMut(Sequence, T)) {
        while let Some((key, item)) = self.entries.pop_first() {
            release(key, item);
        }
    }
}

impl<T> fmt::Debug for Queue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Queue");
        s.field("name", &self.name).field("len", &self.entries.len());

        if let (Some((min, _)), Some((max, _))) =
            (self.entries.first_key_value(), self.entries.last_key_value())
        {
            s.field(
                "seq_range",
                &format_args!(
                    "{}:{} - {}:{}",
                    min.epoch, min.sequence_number, max.epoch, max.sequence_number
                ),
            );
        }

        s.finish()
    }
}
