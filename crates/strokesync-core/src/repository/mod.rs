//! Drawing repository abstraction for persisted stroke groups.

mod file;
mod memory;

pub use file::FileRepository;
pub use memory::MemoryRepository;

use crate::stroke::{GroupId, StrokeGroup};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Repository errors.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Stroke group not found: {0}")]
    NotFound(GroupId),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("IO error: {0}")]
    Io(String),
    #[error("Repository error: {0}")]
    Other(String),
}

/// Result type for repository operations.
pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Boxed future for async repository calls.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Append-only store of closed stroke groups with delete-by-identity.
///
/// Each call is atomic on its own; there are no transactions. Groups from
/// different authors are independent records.
pub trait DrawingRepository: Send + Sync {
    /// Store a group. A group with the same id is replaced in place.
    fn append(&self, group: StrokeGroup) -> BoxFuture<'_, RepositoryResult<GroupId>>;

    /// Fetch one group.
    fn get(&self, id: &GroupId) -> BoxFuture<'_, RepositoryResult<StrokeGroup>>;

    /// Delete one group. Returns false if it was not stored.
    fn remove_one(&self, id: &GroupId) -> BoxFuture<'_, RepositoryResult<bool>>;

    /// Delete every group.
    fn remove_all(&self) -> BoxFuture<'_, RepositoryResult<()>>;

    /// Every stored group in append order.
    fn list_all(&self) -> BoxFuture<'_, RepositoryResult<Vec<StrokeGroup>>>;
}

/// Insert or replace by id, keeping first-append position.
fn upsert(groups: &mut Vec<StrokeGroup>, group: StrokeGroup) -> GroupId {
    let id = group.id;
    match groups.iter_mut().find(|g| g.id == id) {
        Some(existing) => *existing = group,
        None => groups.push(group),
    }
    id
}

#[cfg(test)]
pub(crate) fn block_on<F: std::future::Future>(f: F) -> F::Output {
    use std::task::{Context, Poll, RawWaker, RawWakerVTable, Waker};

    fn dummy_raw_waker() -> RawWaker {
        fn no_op(_: *const ()) {}
        fn clone(_: *const ()) -> RawWaker {
            dummy_raw_waker()
        }
        static VTABLE: RawWakerVTable = RawWakerVTable::new(clone, no_op, no_op, no_op);
        RawWaker::new(std::ptr::null(), &VTABLE)
    }

    let waker = unsafe { Waker::from_raw(dummy_raw_waker()) };
    let mut cx = Context::from_waker(&waker);
    let mut f = std::pin::pin!(f);

    loop {
        if let Poll::Ready(result) = f.as_mut().poll(&mut cx) {
            return result;
        }
    }
}
