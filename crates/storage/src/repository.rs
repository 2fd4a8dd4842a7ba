// SPDX-License-Identifier: MIT

//! The `Repository` abstraction (§9 design note): one default
//! WAL-backed, event-sourced implementation for production, and an
//! in-memory implementation for tests that don't need durability.

use crate::state::MaterializedState;
use crate::wal::{Wal, WalError};
use parking_lot::Mutex;
use scaorch_core::Event;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("WAL error: {0}")]
    Wal(#[from] WalError),
}

impl From<RepositoryError> for scaorch_core::SystemError {
    fn from(e: RepositoryError) -> Self {
        scaorch_core::SystemError::WorkspaceIoError(e.to_string())
    }
}

/// Durable append + queryable materialized view over project/run state.
///
/// Implementations must apply events to their materialized state in the
/// same order they are appended, and `snapshot()` must reflect every event
/// `append` has returned successfully for.
pub trait Repository: Send + Sync {
    fn append(&self, event: Event) -> Result<(), RepositoryError>;

    /// A read-only clone of the current materialized state.
    fn snapshot(&self) -> MaterializedState;

    /// Run `f` against the current state under the repository's lock,
    /// without cloning it. Used by read-modify-write sequences that must
    /// not race (e.g. scheduler admission checks).
    fn with_state<R>(&self, f: impl FnOnce(&MaterializedState) -> R) -> R;
}

/// Production `Repository`: every event is appended to a [`Wal`] and
/// immediately folded into an in-memory [`MaterializedState`] for reads.
pub struct WalRepository {
    inner: Mutex<WalRepositoryInner>,
}

struct WalRepositoryInner {
    wal: Wal,
    state: MaterializedState,
}

impl WalRepository {
    /// Open the WAL at `path`, replaying any events written since the last
    /// run to rebuild `MaterializedState` (startup recovery, §9).
    pub fn open(path: &Path) -> Result<Self, RepositoryError> {
        let wal = Wal::open(path, 0)?;
        let replayed = wal.entries_after(0)?;
        let mut state = MaterializedState::default();
        for entry in &replayed {
            state.apply_event(&entry.event);
        }
        Ok(Self {
            inner: Mutex::new(WalRepositoryInner { wal, state }),
        })
    }
}

impl Repository for WalRepository {
    fn append(&self, event: Event) -> Result<(), RepositoryError> {
        let mut inner = self.inner.lock();
        inner.wal.append(&event)?;
        inner.wal.flush()?;
        inner.state.apply_event(&event);
        Ok(())
    }

    fn snapshot(&self) -> MaterializedState {
        self.inner.lock().state.clone()
    }

    fn with_state<R>(&self, f: impl FnOnce(&MaterializedState) -> R) -> R {
        let inner = self.inner.lock();
        f(&inner.state)
    }
}

/// In-memory `Repository` for tests: same event-application semantics,
/// no filesystem durability.
#[derive(Default)]
pub struct InMemoryRepository {
    state: Mutex<MaterializedState>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Repository for InMemoryRepository {
    fn append(&self, event: Event) -> Result<(), RepositoryError> {
        self.state.lock().apply_event(&event);
        Ok(())
    }

    fn snapshot(&self) -> MaterializedState {
        self.state.lock().clone()
    }

    fn with_state<R>(&self, f: impl FnOnce(&MaterializedState) -> R) -> R {
        f(&self.state.lock())
    }
}

/// Shared handle alias used by crates that only need to hold a repository,
/// not choose its implementation.
pub type SharedRepository = Arc<dyn Repository>;
