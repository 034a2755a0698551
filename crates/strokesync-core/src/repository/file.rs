//! File-backed repository for native platforms.

use super::{BoxFuture, DrawingRepository, RepositoryError, RepositoryResult, upsert};
use crate::stroke::{GroupId, StrokeGroup};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Stores every group in a single JSON file.
///
/// The file is rewritten on each mutation through a temporary file and a
/// rename, so a crash leaves either the old or the new list on disk.
pub struct FileRepository {
    path: PathBuf,
    groups: Mutex<Vec<StrokeGroup>>,
}

impl FileRepository {
    /// Open the repository at `path`, loading it if the file exists.
    ///
    /// Creates the parent directory if it doesn't exist.
    pub fn open(path: PathBuf) -> RepositoryResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| {
                RepositoryError::Io(format!("Failed to create {}: {}", parent.display(), e))
            })?;
        }

        let groups = if path.exists() {
            let json = fs::read_to_string(&path).map_err(|e| {
                RepositoryError::Io(format!("Failed to read {}: {}", path.display(), e))
            })?;
            serde_json::from_str(&json).map_err(|e| {
                RepositoryError::Serialization(format!("Failed to parse {}: {}", path.display(), e))
            })?
        } else {
            Vec::new()
        };

        log::info!("Opened drawing repository {} ({} groups)", path.display(), groups.len());
        Ok(Self {
            path,
            groups: Mutex::new(groups),
        })
    }

    /// Open the repository in the default location.
    ///
    /// On Linux: `~/.local/share/strokesync/drawings.json`
    pub fn default_location() -> RepositoryResult<Self> {
        Self::open(Self::default_path()?)
    }

    pub fn default_path() -> RepositoryResult<PathBuf> {
        let base = dirs::data_local_dir()
            .or_else(dirs::home_dir)
            .ok_or_else(|| RepositoryError::Io("Could not determine home directory".to_string()))?;
        Ok(base.join("strokesync").join("drawings.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Apply `change` to a copy of the list, write it out, then keep it.
    fn mutate<T>(&self, change: impl FnOnce(&mut Vec<StrokeGroup>) -> T) -> RepositoryResult<T> {
        let mut groups = self
            .groups
            .lock()
            .map_err(|e| RepositoryError::Other(format!("Lock error: {}", e)))?;
        let mut next = groups.clone();
        let result = change(&mut next);
        write_atomic(&self.path, &next)?;
        *groups = next;
        Ok(result)
    }

    fn read<T>(&self, view: impl FnOnce(&[StrokeGroup]) -> T) -> RepositoryResult<T> {
        let groups = self
            .groups
            .lock()
            .map_err(|e| RepositoryError::Other(format!("Lock error: {}", e)))?;
        Ok(view(&groups))
    }
}

fn write_atomic(path: &Path, groups: &[StrokeGroup]) -> RepositoryResult<()> {
    let json = serde_json::to_string(groups)
        .map_err(|e| RepositoryError::Serialization(e.to_string()))?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json)
        .map_err(|e| RepositoryError::Io(format!("Failed to write {}: {}", tmp.display(), e)))?;
    fs::rename(&tmp, path)
        .map_err(|e| RepositoryError::Io(format!("Failed to replace {}: {}", path.display(), e)))
}

impl DrawingRepository for FileRepository {
    fn append(&self, group: StrokeGroup) -> BoxFuture<'_, RepositoryResult<GroupId>> {
        Box::pin(async move { self.mutate(|groups| upsert(groups, group)) })
    }

    fn get(&self, id: &GroupId) -> BoxFuture<'_, RepositoryResult<StrokeGroup>> {
        let id = *id;
        Box::pin(async move {
            self.read(|groups| groups.iter().find(|g| g.id == id).cloned())?
                .ok_or(RepositoryError::NotFound(id))
        })
    }

    fn remove_one(&self, id: &GroupId) -> BoxFuture<'_, RepositoryResult<bool>> {
        let id = *id;
        Box::pin(async move {
            if !self.read(|groups| groups.iter().any(|g| g.id == id))? {
                return Ok(false);
            }
            self.mutate(|groups| {
                groups.retain(|g| g.id != id);
                true
            })
        })
    }

    fn remove_all(&self) -> BoxFuture<'_, RepositoryResult<()>> {
        Box::pin(async move { self.mutate(|groups| groups.clear()) })
    }

    fn list_all(&self) -> BoxFuture<'_, RepositoryResult<Vec<StrokeGroup>>> {
        Box::pin(async move { self.read(|groups| groups.to_vec()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::block_on;
    use crate::stroke::{AuthorId, Phase, StrokePoint};
    use kurbo::Point;
    use tempfile::tempdir;

    fn group(author: &str) -> StrokeGroup {
        let author = AuthorId::from(author);
        let mut group = StrokeGroup::new(GroupId::new(), author.clone());
        group.push(StrokePoint::new(Point::new(0.0, 0.0), Phase::Begin, 2.0, "#000", author.clone()));
        group.push(StrokePoint::new(Point::new(4.0, 3.0), Phase::End, 2.0, "#000", author.clone()));
        group.attribute_to(&author);
        group.mark_created();
        group
    }

    #[test]
    fn test_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("drawings.json");

        let g1 = group("ann");
        let g2 = group("bob");
        {
            let repo = FileRepository::open(path.clone()).unwrap();
            block_on(repo.append(g1.clone())).unwrap();
            block_on(repo.append(g2.clone())).unwrap();
        }

        let repo = FileRepository::open(path).unwrap();
        assert_eq!(block_on(repo.list_all()).unwrap(), vec![g1.clone(), g2]);
        assert_eq!(block_on(repo.get(&g1.id)).unwrap().points.len(), 2);
    }

    #[test]
    fn test_remove_is_persisted() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("drawings.json");
        let g1 = group("ann");
        let g2 = group("ann");
        {
            let repo = FileRepository::open(path.clone()).unwrap();
            block_on(repo.append(g1.clone())).unwrap();
            block_on(repo.append(g2.clone())).unwrap();
            assert!(block_on(repo.remove_one(&g1.id)).unwrap());
            assert!(!block_on(repo.remove_one(&GroupId::new())).unwrap());
        }

        let repo = FileRepository::open(path.clone()).unwrap();
        assert_eq!(block_on(repo.list_all()).unwrap(), vec![g2]);

        block_on(repo.remove_all()).unwrap();
        let reopened = FileRepository::open(path).unwrap();
        assert!(block_on(reopened.list_all()).unwrap().is_empty());
    }

    #[test]
    fn test_no_temp_file_left_behind() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("drawings.json");
        let repo = FileRepository::open(path.clone()).unwrap();
        block_on(repo.append(group("ann"))).unwrap();

        assert!(path.exists());
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_corrupt_file_is_a_serialization_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("drawings.json");
        fs::write(&path, "{ not a list").unwrap();

        assert!(matches!(
            FileRepository::open(path),
            Err(RepositoryError::Serialization(_))
        ));
    }

    #[test]
    fn test_get_missing() {
        let dir = tempdir().unwrap();
        let repo = FileRepository::open(dir.path().join("drawings.json")).unwrap();
        assert!(matches!(
            block_on(repo.get(&GroupId::new())),
            Err(RepositoryError::NotFound(_))
        ));
    }
}
