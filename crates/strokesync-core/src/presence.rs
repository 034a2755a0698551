//! Presence entries and the client-side roster of online authors.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::stroke::AuthorId;

/// Online status of an author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceState {
    Online,
    #[default]
    Offline,
}

/// Latest known presence of one author.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceEntry {
    pub author_id: AuthorId,
    pub display_name: String,
    pub state: PresenceState,
}

impl PresenceEntry {
    pub fn online(author_id: AuthorId, display_name: impl Into<String>) -> Self {
        Self {
            author_id,
            display_name: display_name.into(),
            state: PresenceState::Online,
        }
    }

    pub fn offline(author_id: AuthorId, display_name: impl Into<String>) -> Self {
        Self {
            author_id,
            display_name: display_name.into(),
            state: PresenceState::Offline,
        }
    }

    pub fn is_online(&self) -> bool {
        self.state == PresenceState::Online
    }
}

/// What a client knows about everyone's presence. Keyed strictly by author.
#[derive(Debug, Clone, Default)]
pub struct PresenceRoster {
    entries: HashMap<AuthorId, PresenceEntry>,
}

impl PresenceRoster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the entry for `entry.author_id`.
    /// Returns true if the stored state changed.
    pub fn upsert(&mut self, entry: PresenceEntry) -> bool {
        match self.entries.get_mut(&entry.author_id) {
            Some(existing) if *existing == entry => false,
            Some(existing) => {
                *existing = entry;
                true
            }
            None => {
                self.entries.insert(entry.author_id.clone(), entry);
                true
            }
        }
    }

    /// Replace the roster with a snapshot of online authors.
    pub fn seed(&mut self, online: Vec<PresenceEntry>) {
        self.entries.clear();
        for entry in online {
            self.upsert(entry);
        }
    }

    pub fn get(&self, author_id: &AuthorId) -> Option<&PresenceEntry> {
        self.entries.get(author_id)
    }

    pub fn is_online(&self, author_id: &AuthorId) -> bool {
        self.get(author_id).is_some_and(PresenceEntry::is_online)
    }

    /// Online authors, ordered by display name.
    pub fn online(&self) -> Vec<&PresenceEntry> {
        let mut online: Vec<_> = self.entries.values().filter(|e| e.is_online()).collect();
        online.sort_by(|a, b| a.display_name.cmp(&b.display_name));
        online
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
