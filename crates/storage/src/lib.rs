// SPDX-License-Identifier: MIT

//! Storage layer: event-sourced WAL + materialized state + the
//! `Repository` abstraction (§9 design note).

mod repository;
mod state;
mod wal;

pub use repository::{InMemoryRepository, Repository, RepositoryError, SharedRepository, WalRepository};
pub use state::{MaterializedState, ScanEntityCounts};
pub use wal::{Wal, WalEntry, WalError};
