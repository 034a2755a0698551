//! In-memory repository.

use super::{BoxFuture, DrawingRepository, RepositoryError, RepositoryResult, upsert};
use crate::stroke::{GroupId, StrokeGroup};
use std::sync::RwLock;

/// In-memory repository for tests and ephemeral relays.
#[derive(Default)]
pub struct MemoryRepository {
    groups: RwLock<Vec<StrokeGroup>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

fn lock_error(e: impl std::fmt::Display) -> RepositoryError {
    RepositoryError::Other(format!("Lock error: {}", e))
}

impl DrawingRepository for MemoryRepository {
    fn append(&self, group: StrokeGroup) -> BoxFuture<'_, RepositoryResult<GroupId>> {
        Box::pin(async move {
            let mut groups = self.groups.write().map_err(lock_error)?;
            Ok(upsert(&mut groups, group))
        })
    }

    fn get(&self, id: &GroupId) -> BoxFuture<'_, RepositoryResult<StrokeGroup>> {
        let id = *id;
        Box::pin(async move {
            let groups = self.groups.read().map_err(lock_error)?;
            groups
                .iter()
                .find(|g| g.id == id)
                .cloned()
                .ok_or(RepositoryError::NotFound(id))
        })
    }

    fn remove_one(&self, id: &GroupId) -> BoxFuture<'_, RepositoryResult<bool>> {
        let id = *id;
        Box::pin(async move {
            let mut groups = self.groups.write().map_err(lock_error)?;
            let before = groups.len();
            groups.retain(|g| g.id != id);
            Ok(groups.len() != before)
        })
    }

    fn remove_all(&self) -> BoxFuture<'_, RepositoryResult<()>> {
        Box::pin(async move {
            self.groups.write().map_err(lock_error)?.clear();
            Ok(())
        })
    }

    fn list_all(&self) -> BoxFuture<'_, RepositoryResult<Vec<StrokeGroup>>> {
        Box::pin(async move { Ok(self.groups.read().map_err(lock_error)?.clone()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::block_on;
    use crate::stroke::AuthorId;

    fn group(author: &str) -> StrokeGroup {
        StrokeGroup::new(GroupId::new(), AuthorId::from(author))
    }

    #[test]
    fn test_append_and_get() {
        let repo = MemoryRepository::new();
        let g = group("ann");

        let id = block_on(repo.append(g.clone())).unwrap();
        assert_eq!(id, g.id);
        assert_eq!(block_on(repo.get(&id)).unwrap(), g);
    }

    #[test]
    fn test_not_found() {
        let repo = MemoryRepository::new();
        let result = block_on(repo.get(&GroupId::new()));
        assert!(matches!(result, Err(RepositoryError::NotFound(_))));
    }

    #[test]
    fn test_list_keeps_append_order() {
        let repo = MemoryRepository::new();
        let groups = [group("ann"), group("bob"), group("ann")];
        for g in &groups {
            block_on(repo.append(g.clone())).unwrap();
        }
        // Re-appending does not move a group.
        block_on(repo.append(groups[0].clone())).unwrap();

        let ids: Vec<_> = block_on(repo.list_all()).unwrap().iter().map(|g| g.id).collect();
        assert_eq!(ids, groups.iter().map(|g| g.id).collect::<Vec<_>>());
    }

    #[test]
    fn test_remove_one_and_all() {
        let repo = MemoryRepository::new();
        let g1 = group("ann");
        let g2 = group("bob");
        block_on(repo.append(g1.clone())).unwrap();
        block_on(repo.append(g2.clone())).unwrap();

        assert!(block_on(repo.remove_one(&g1.id)).unwrap());
        assert!(!block_on(repo.remove_one(&g1.id)).unwrap());
        assert_eq!(block_on(repo.list_all()).unwrap(), vec![g2]);

        block_on(repo.remove_all()).unwrap();
        assert!(block_on(repo.list_all()).unwrap().is_empty());
    }
}
