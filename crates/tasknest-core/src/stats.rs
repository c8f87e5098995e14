use chrono::{
  DateTime,
  Duration,
  Utc
};
use serde::Serialize;

use crate::task::{
  Priority,
  Task
};

pub const RECENT_ACTIVITY_WINDOW_HOURS:
  i64 = 24;

#[derive(
  Debug,
  Clone,
  Copy,
  Default,
  PartialEq,
  Eq,
  Serialize,
)]
pub struct PriorityCounts {
  pub low:    usize,
  pub medium: usize,
  pub high:   usize
}

impl PriorityCounts {
  pub fn get(
    &self,
    priority: Priority
  ) -> usize {
    match priority {
      | Priority::Low => self.low,
      | Priority::Medium => self.medium,
      | Priority::High => self.high
    }
  }

  pub fn total(&self) -> usize {
    self.low + self.medium + self.high
  }

  fn bump(
    &mut self,
    priority: Priority
  ) {
    match priority {
      | Priority::Low => self.low += 1,
      | Priority::Medium => {
        self.medium += 1
      }
      | Priority::High => self.high += 1
    }
  }
}

/// Summary counts over one task
/// snapshot.
#[derive(
  Debug, Clone, PartialEq, Serialize,
)]
pub struct TaskStats<'a> {
  pub total:           usize,
  pub completed:       usize,
  pub pending:         usize,
  pub completion_rate: u8,
  pub by_priority:     PriorityCounts,
  pub recent_activity: Vec<&'a Task>
}

impl<'a> TaskStats<'a> {
  #[tracing::instrument(skip(tasks, now), fields(total = tasks.len()))]
  pub fn compute(
    tasks: &'a [Task],
    now: DateTime<Utc>
  ) -> Self {
    let total = tasks.len();
    let mut completed = 0;
    let mut by_priority =
      PriorityCounts::default();

    for task in tasks {
      if task.completed {
        completed += 1;
      }
      by_priority.bump(task.priority);
    }

    Self {
      total,
      completed,
      pending: total - completed,
      completion_rate: completion_rate(
        completed, total
      ),
      by_priority,
      recent_activity: recent_activity(
        tasks, now
      )
    }
  }

  pub fn is_empty(&self) -> bool {
    self.total == 0
  }
}

/// `round(completed / total * 100)`,
/// halves rounding up; `0` for an empty
/// list.
pub fn completion_rate(
  completed: usize,
  total: usize
) -> u8 {
  if total == 0 {
    return 0;
  }
  let completed = completed.min(total);
  let rate =
    (completed * 200 + total) / (2 * total);
  u8::try_from(rate).unwrap_or(100)
}

/// Tasks created within the trailing
/// window ending at `now`, newest first.
pub fn recent_activity(
  tasks: &[Task],
  now: DateTime<Utc>
) -> Vec<&Task> {
  let window_start = now
    - Duration::hours(
      RECENT_ACTIVITY_WINDOW_HOURS
    );

  let mut recent: Vec<&Task> = tasks
    .iter()
    .filter(|task| {
      task
        .created_at
        .map(|created| {
          created >= window_start
        })
        .unwrap_or(false)
    })
    .collect();

  recent.sort_by(|a, b| {
    b.created_at.cmp(&a.created_at)
  });
  recent
}

#[cfg(test)]
mod tests {
  use chrono::{
    DateTime,
    Duration,
    TimeZone,
    Utc
  };

  use super::{
    TaskStats,
    completion_rate,
    recent_activity
  };
  use crate::task::{
    Priority,
    Task
  };

  fn now() -> DateTime<Utc> {
    Utc
      .with_ymd_and_hms(
        2026, 2, 16, 15, 0, 0
      )
      .unwrap()
  }

  fn task(
    id: &str,
    priority: Priority,
    completed: bool,
    created_at: Option<DateTime<Utc>>
  ) -> Task {
    Task {
      id: id.to_string(),
      title: format!("task {id}"),
      description: String::new(),
      due_date: None,
      priority,
      completed,
      created_at,
      updated_at: None
    }
  }

  #[test]
  fn scenario_counts_and_rate() {
    let tasks = vec![
      task("1", Priority::High, false, None),
      task("2", Priority::Low, false, None),
      task("3", Priority::High, true, None),
    ];
    let stats =
      TaskStats::compute(&tasks, now());

    assert_eq!(stats.total, 3);
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.pending, 2);
    assert_eq!(stats.completion_rate, 33);
    assert_eq!(stats.by_priority.high, 2);
    assert_eq!(stats.by_priority.low, 1);
    assert_eq!(stats.by_priority.medium, 0);
  }

  #[test]
  fn empty_snapshot_is_all_zero() {
    let stats = TaskStats::compute(&[], now());
    assert!(stats.is_empty());
    assert_eq!(stats.completion_rate, 0);
    assert_eq!(stats.pending, 0);
    assert!(stats.recent_activity.is_empty());
  }

  #[test]
  fn counts_are_consistent_with_length() {
    let mut tasks = Vec::new();
    for i in 0..17 {
      let priority = Priority::ALL[i % 3];
      tasks.push(task(
        &i.to_string(),
        priority,
        i % 4 == 0,
        None
      ));
    }
    let stats =
      TaskStats::compute(&tasks, now());

    assert_eq!(
      stats.by_priority.total(),
      tasks.len()
    );
    assert_eq!(
      stats.completed + stats.pending,
      tasks.len()
    );
    assert!(stats.completion_rate <= 100);
  }

  #[test]
  fn rate_rounds_half_up_and_stays_bounded()
   {
    assert_eq!(completion_rate(1, 2), 50);
    assert_eq!(completion_rate(2, 3), 67);
    assert_eq!(completion_rate(1, 8), 13);
    assert_eq!(completion_rate(1, 200), 1);
    assert_eq!(completion_rate(0, 5), 0);
    assert_eq!(completion_rate(5, 5), 100);
    assert_eq!(completion_rate(0, 0), 0);
  }

  #[test]
  fn recent_activity_window_and_order() {
    let tasks = vec![
      task(
        "old",
        Priority::Low,
        false,
        Some(
          now()
            - Duration::hours(24)
            - Duration::seconds(1)
        )
      ),
      task(
        "edge",
        Priority::Low,
        false,
        Some(now() - Duration::hours(24))
      ),
      task(
        "fresh",
        Priority::Low,
        false,
        Some(now() - Duration::minutes(5))
      ),
      task("undated", Priority::Low, false, None),
      task(
        "mid",
        Priority::Low,
        true,
        Some(now() - Duration::hours(3))
      ),
      task(
        "future",
        Priority::High,
        false,
        Some(now() + Duration::hours(1))
      ),
      task(
        "tie-a",
        Priority::Medium,
        false,
        Some(now() - Duration::hours(6))
      ),
      task(
        "tie-b",
        Priority::Medium,
        false,
        Some(now() - Duration::hours(6))
      ),
    ];

    let recent =
      recent_activity(&tasks, now());
    let ids: Vec<&str> = recent
      .iter()
      .map(|t| t.id.as_str())
      .collect();
    assert_eq!(
      ids,
      vec![
        "future", "fresh", "mid", "tie-a",
        "tie-b", "edge"
      ]
    );
    for task in recent {
      let created =
        task.created_at.unwrap();
      assert!(
        now() - created
          <= Duration::hours(24)
      );
    }
  }
}
