use std::sync::Arc;
use std::sync::atomic::{
  AtomicU64,
  Ordering
};

use parking_lot::RwLock;
use tracing::debug;

use crate::task::Task;

/// Immutable task list as of one fetch.
#[derive(Debug, Default)]
pub struct TaskSnapshot {
  generation: u64,
  tasks:      Vec<Task>
}

impl TaskSnapshot {
  pub fn generation(&self) -> u64 {
    self.generation
  }

  pub fn tasks(&self) -> &[Task] {
    &self.tasks
  }

  pub fn len(&self) -> usize {
    self.tasks.len()
  }

  pub fn is_empty(&self) -> bool {
    self.tasks.is_empty()
  }
}

/// Issued when a fetch starts; orders
/// fetches by start time.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq,
)]
pub struct FetchTicket(u64);

/// A value computed from the snapshot of
/// `generation`.
#[derive(Debug, Clone)]
pub struct Derived<T> {
  generation: u64,
  value:      T
}

impl<T> Derived<T> {
  pub fn generation(&self) -> u64 {
    self.generation
  }
}

#[derive(Debug, Default)]
struct BoardState {
  snapshot:      Arc<TaskSnapshot>,
  installed_seq: u64
}

/// In-memory task list replaced wholesale
/// on every fetch. A result from a fetch
/// that started before the installed one
/// is ignored, and derivations from an
/// older snapshot are discarded.
#[derive(Debug, Default)]
pub struct TaskBoard {
  next_seq: AtomicU64,
  state:    RwLock<BoardState>
}

impl TaskBoard {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn begin_fetch(&self) -> FetchTicket {
    let seq = self
      .next_seq
      .fetch_add(1, Ordering::SeqCst)
      + 1;
    debug!(seq, "fetch started");
    FetchTicket(seq)
  }

  /// Installs `tasks` unless a later
  /// fetch already landed.
  pub fn complete_fetch(
    &self,
    ticket: FetchTicket,
    tasks: Vec<Task>
  ) -> bool {
    let mut state = self.state.write();
    if ticket.0 <= state.installed_seq {
      debug!(
        seq = ticket.0,
        installed = state.installed_seq,
        "superseded fetch ignored"
      );
      return false;
    }

    let generation =
      state.snapshot.generation + 1;
    debug!(
      seq = ticket.0,
      generation,
      tasks = tasks.len(),
      "snapshot installed"
    );
    state.snapshot =
      Arc::new(TaskSnapshot {
        generation,
        tasks
      });
    state.installed_seq = ticket.0;
    true
  }

  pub fn snapshot(
    &self
  ) -> Arc<TaskSnapshot> {
    Arc::clone(&self.state.read().snapshot)
  }

  pub fn generation(&self) -> u64 {
    self.state.read().snapshot.generation
  }

  pub fn derive<T, F>(
    &self,
    f: F
  ) -> Derived<T>
  where
    F: FnOnce(&[Task]) -> T
  {
    let snapshot = self.snapshot();
    Derived {
      generation: snapshot.generation,
      value:      f(snapshot.tasks())
    }
  }

  /// Yields the value only if its
  /// snapshot is still current.
  pub fn accept<T>(
    &self,
    derived: Derived<T>
  ) -> Option<T> {
    let current = self.generation();
    if derived.generation == current {
      Some(derived.value)
    } else {
      debug!(
        stale = derived.generation,
        current,
        "stale derivation discarded"
      );
      None
    }
  }
}
