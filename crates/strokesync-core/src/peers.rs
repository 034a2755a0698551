//! Closed groups known for each remote author.

use crate::stroke::{AuthorId, GroupId, StrokeGroup};

/// Per-author ordered list of stroke groups, as known to one client.
///
/// Authors iterate in the order their first group arrived, so a full repaint
/// stacks strokes the same way every time. An author whose slot empties goes
/// to the back when it reappears.
#[derive(Debug, Clone, Default)]
pub struct PeerDrawingIndex {
    slots: Vec<(AuthorId, Vec<StrokeGroup>)>,
}

impl PeerDrawingIndex {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot_index(&self, author_id: &AuthorId) -> Option<usize> {
        self.slots.iter().position(|(author, _)| author == author_id)
    }

    /// Append a group at its author's slot. A group already present with the
    /// same id is replaced in place.
    pub fn append(&mut self, group: StrokeGroup) {
        let index = match self.slot_index(&group.author_id) {
            Some(index) => index,
            None => {
                self.slots.push((group.author_id.clone(), Vec::new()));
                self.slots.len() - 1
            }
        };
        let slot = &mut self.slots[index].1;
        match slot.iter_mut().find(|g| g.id == group.id) {
            Some(existing) => *existing = group,
            None => slot.push(group),
        }
    }

    /// Remove a group from one author's slot.
    pub fn remove(&mut self, author_id: &AuthorId, group_id: GroupId) -> Option<StrokeGroup> {
        let index = self.slot_index(author_id)?;
        let slot = &mut self.slots[index].1;
        let position = slot.iter().position(|g| g.id == group_id)?;
        let removed = slot.remove(position);
        if slot.is_empty() {
            self.slots.remove(index);
        }
        Some(removed)
    }

    pub fn groups_of(&self, author_id: &AuthorId) -> &[StrokeGroup] {
        self.slot_index(author_id)
            .map(|index| self.slots[index].1.as_slice())
            .unwrap_or(&[])
    }

    /// Every known group, author by author.
    pub fn iter(&self) -> impl Iterator<Item = &StrokeGroup> {
        self.slots.iter().flat_map(|(_, groups)| groups)
    }

    pub fn authors(&self) -> impl Iterator<Item = &AuthorId> {
        self.slots.iter().map(|(author, _)| author)
    }

    /// Total number of groups across all authors.
    pub fn len(&self) -> usize {
        self.slots.iter().map(|(_, groups)| groups.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group(author: &str) -> StrokeGroup {
        StrokeGroup::new(GroupId::new(), AuthorId::from(author))
    }

    #[test]
    fn test_append_and_remove_by_author_slot() {
        let mut index = PeerDrawingIndex::new();
        let g1 = group("bob");
        let g2 = group("bob");
        let g3 = group("cy");
        index.append(g1.clone());
        index.append(g2.clone());
        index.append(g3.clone());
        assert_eq!(index.len(), 3);

        let bob = AuthorId::from("bob");
        // Wrong slot: nothing happens.
        assert!(index.remove(&AuthorId::from("cy"), g1.id).is_none());

        assert_eq!(index.remove(&bob, g1.id).map(|g| g.id), Some(g1.id));
        assert_eq!(index.groups_of(&bob).len(), 1);
        assert_eq!(index.groups_of(&bob)[0].id, g2.id);
    }

    #[test]
    fn test_duplicate_append_replaces() {
        let mut index = PeerDrawingIndex::new();
        let g = group("bob");
        index.append(g.clone());
        index.append(g);
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_empty_slot_is_dropped() {
        let mut index = PeerDrawingIndex::new();
        let g = group("bob");
        index.append(g.clone());
        index.remove(&g.author_id, g.id);
        assert!(index.is_empty());
        assert_eq!(index.authors().count(), 0);
    }

    #[test]
    fn test_iteration_follows_first_arrival() {
        let mut index = PeerDrawingIndex::new();
        let names = ["zed", "bob", "mia", "al", "kit", "bob", "zed"];
        let groups: Vec<_> = names.iter().map(|n| group(n)).collect();
        for g in &groups {
            index.append(g.clone());
        }

        let authors: Vec<_> = index.authors().map(AuthorId::as_str).collect();
        assert_eq!(authors, vec!["zed", "bob", "mia", "al", "kit"]);

        let ids: Vec<_> = index.iter().map(|g| g.id).collect();
        let expected: Vec<_> = [0, 6, 1, 5, 2, 3, 4].iter().map(|&i| groups[i].id).collect();
        assert_eq!(ids, expected);

        // An emptied slot rejoins at the back.
        index.remove(&groups[2].author_id, groups[2].id);
        index.append(group("mia"));
        let authors: Vec<_> = index.authors().map(AuthorId::as_str).collect();
        assert_eq!(authors, vec!["zed", "bob", "al", "kit", "mia"]);
    }
}
