//! User-visible status lines.
//!
//! A status is keyed by (device uuid, status id). Posting again with the
//! same key replaces the text and restarts the expiry; an expiry for an older
//! posting is ignored.

use std::collections::HashMap;

/// Status text raised by a device. The runtime adds the device uuid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusMessage {
    pub id: String,
    pub text: String,
}

impl StatusMessage {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StatusKey {
    pub uuid: String,
    pub id: String,
}

#[derive(Debug, Default)]
pub struct StatusBoard {
    entries: HashMap<StatusKey, (String, u64)>,
    next_generation: u64,
}

impl StatusBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a status and return the generation its expiry must carry.
    pub fn post(&mut self, key: StatusKey, text: String) -> u64 {
        self.next_generation += 1;
        self.entries.insert(key, (text, self.next_generation));
        self.next_generation
    }

    /// Drop the status if `generation` is still the current posting.
    pub fn expire(&mut self, key: &StatusKey, generation: u64) -> bool {
        match self.entries.get(key) {
            Some((_, current)) if *current == generation => {
                self.entries.remove(key);
                true
            }
            _ => false,
        }
    }

    pub fn get(&self, key: &StatusKey) -> Option<&str> {
        self.entries.get(key).map(|(text, _)| text.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
