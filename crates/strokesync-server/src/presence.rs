//! Server-side presence tracking.

use dashmap::DashMap;
use strokesync_core::{AuthorId, PresenceEntry, PresenceState};

use crate::identity::Identity;

#[derive(Debug)]
struct Tracked {
    display_name: String,
    connections: usize,
}

impl Tracked {
    fn entry(&self, author_id: &AuthorId) -> PresenceEntry {
        let state = if self.connections > 0 {
            PresenceState::Online
        } else {
            PresenceState::Offline
        };
        PresenceEntry {
            author_id: author_id.clone(),
            display_name: self.display_name.clone(),
            state,
        }
    }
}

/// Every author ever seen, keyed strictly by author id, with a count of live
/// connections. An author is Online while the count is above zero.
#[derive(Debug, Default)]
pub struct PresenceTracker {
    authors: DashMap<AuthorId, Tracked>,
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new connection. Returns the entry if the author just came
    /// online.
    pub fn connect(&self, identity: &Identity) -> Option<PresenceEntry> {
        let mut tracked = self
            .authors
            .entry(identity.author_id.clone())
            .or_insert_with(|| Tracked {
                display_name: identity.display_name.clone(),
                connections: 0,
            });
        tracked.display_name.clone_from(&identity.display_name);
        tracked.connections += 1;
        (tracked.connections == 1).then(|| tracked.entry(&identity.author_id))
    }

    /// Record a closed connection. Returns the entry if the author just went
    /// offline.
    pub fn disconnect(&self, author_id: &AuthorId) -> Option<PresenceEntry> {
        let mut tracked = self.authors.get_mut(author_id)?;
        if tracked.connections == 0 {
            return None;
        }
        tracked.connections -= 1;
        (tracked.connections == 0).then(|| tracked.entry(author_id))
    }

    pub fn get(&self, author_id: &AuthorId) -> Option<PresenceEntry> {
        self.authors.get(author_id).map(|t| t.entry(author_id))
    }

    /// The presence set: authors currently online, ordered by display name.
    pub fn online(&self) -> Vec<PresenceEntry> {
        let mut online: Vec<_> = self
            .authors
            .iter()
            .filter(|t| t.connections > 0)
            .map(|t| t.entry(t.key()))
            .collect();
        online.sort_by(|a, b| a.display_name.cmp(&b.display_name));
        online
    }

    /// Number of authors ever seen.
    pub fn len(&self) -> usize {
        self.authors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.authors.is_empty()
    }
}
