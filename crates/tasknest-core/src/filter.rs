use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use chrono::{
  DateTime,
  Days,
  Utc
};
use chrono_tz::Tz;
use tracing::trace;

use crate::datetime::local_date;
use crate::task::{
  Priority,
  Task
};

/// Criterion used to derive the visible
/// subset of a task snapshot.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq,
)]
pub enum SelectionMode {
  All,
  DueToday,
  DueThisWeek,
  PriorityHigh,
  PriorityMedium,
  PriorityLow
}

impl SelectionMode {
  pub const ALL: [SelectionMode; 6] = [
    SelectionMode::All,
    SelectionMode::DueToday,
    SelectionMode::DueThisWeek,
    SelectionMode::PriorityHigh,
    SelectionMode::PriorityMedium,
    SelectionMode::PriorityLow
  ];

  /// Dashboard tab order. Unknown tabs
  /// fall back to `All`.
  pub fn from_tab_index(
    index: usize
  ) -> Self {
    match index {
      | 1 => SelectionMode::DueToday,
      | 2 => SelectionMode::DueThisWeek,
      | 3 => SelectionMode::PriorityHigh,
      | 4 => {
        SelectionMode::PriorityMedium
      }
      | 5 => SelectionMode::PriorityLow,
      | _ => SelectionMode::All
    }
  }

  pub fn label(&self) -> &'static str {
    match self {
      | SelectionMode::All => "all",
      | SelectionMode::DueToday => {
        "today"
      }
      | SelectionMode::DueThisWeek => {
        "week"
      }
      | SelectionMode::PriorityHigh => {
        "high"
      }
      | SelectionMode::PriorityMedium => {
        "medium"
      }
      | SelectionMode::PriorityLow => {
        "low"
      }
    }
  }

  pub fn priority(
    &self
  ) -> Option<Priority> {
    match self {
      | SelectionMode::PriorityHigh => {
        Some(Priority::High)
      }
      | SelectionMode::PriorityMedium => {
        Some(Priority::Medium)
      }
      | SelectionMode::PriorityLow => {
        Some(Priority::Low)
      }
      | _ => None
    }
  }
}

impl fmt::Display for SelectionMode {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    f.write_str(self.label())
  }
}

impl FromStr for SelectionMode {
  type Err = anyhow::Error;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    match s
      .trim()
      .to_ascii_lowercase()
      .as_str()
    {
      | "all" => Ok(SelectionMode::All),
      | "today" | "due-today" => {
        Ok(SelectionMode::DueToday)
      }
      | "week" | "this-week"
      | "due-this-week" => {
        Ok(SelectionMode::DueThisWeek)
      }
      | "high" | "priority-high" => {
        Ok(SelectionMode::PriorityHigh)
      }
      | "medium" | "priority-medium" => {
        Ok(
          SelectionMode::PriorityMedium
        )
      }
      | "low" | "priority-low" => {
        Ok(SelectionMode::PriorityLow)
      }
      | other => {
        Err(anyhow!(
          "unknown selection mode: \
           {other} (expected all, \
           today, week, high, medium \
           or low)"
        ))
      }
    }
  }
}

/// A selection mode bound to the instant
/// it is evaluated against.
#[derive(Debug, Clone)]
pub struct Filter {
  mode:      SelectionMode,
  now:       DateTime<Utc>,
  tz:        Tz,
  today:     chrono::NaiveDate,
  week_ends: DateTime<Utc>
}

impl Filter {
  pub fn new(
    mode: SelectionMode,
    now: DateTime<Utc>,
    tz: Tz
  ) -> Self {
    let local_now = now.with_timezone(&tz);
    let week_ends = local_now
      .checked_add_days(Days::new(7))
      .map(|dt| dt.with_timezone(&Utc))
      .unwrap_or(
        now + chrono::Duration::days(7)
      );

    Self {
      mode,
      now,
      tz,
      today: local_now.date_naive(),
      week_ends
    }
  }

  pub fn mode(&self) -> SelectionMode {
    self.mode
  }

  pub fn now(&self) -> DateTime<Utc> {
    self.now
  }

  pub fn matches(
    &self,
    task: &Task
  ) -> bool {
    let ok = match self.mode {
      | SelectionMode::All => true,
      | SelectionMode::DueToday => {
        task
          .due_date
          .map(|due| {
            local_date(due, &self.tz)
              == self.today
          })
          .unwrap_or(false)
      }
      | SelectionMode::DueThisWeek => {
        task
          .due_date
          .map(|due| {
            due >= self.now
              && due <= self.week_ends
          })
          .unwrap_or(false)
      }
      | SelectionMode::PriorityHigh
      | SelectionMode::PriorityMedium
      | SelectionMode::PriorityLow => {
        self.mode.priority()
          == Some(task.priority)
      }
    };

    trace!(mode = %self.mode, id = %task.id, ok, "filter evaluation");
    ok
  }

  #[tracing::instrument(skip(self, tasks), fields(mode = %self.mode, input = tasks.len()))]
  pub fn apply<'a>(
    &self,
    tasks: &'a [Task]
  ) -> Vec<&'a Task> {
    tasks
      .iter()
      .filter(|task| self.matches(task))
      .collect()
  }
}

/// Captures `now` once and filters the
/// snapshot with it.
pub fn filter_tasks<'a>(
  tasks: &'a [Task],
  mode: SelectionMode,
  now: DateTime<Utc>,
  tz: Tz
) -> Vec<&'a Task> {
  Filter::new(mode, now, tz)
    .apply(tasks)
}

/// Pending / completed pages.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq,
)]
pub enum StatusView {
  Any,
  Pending,
  Completed
}

impl StatusView {
  pub fn matches(
    &self,
    task: &Task
  ) -> bool {
    match self {
      | StatusView::Any => true,
      | StatusView::Pending => {
        !task.completed
      }
      | StatusView::Completed => {
        task.completed
      }
    }
  }
}

impl FromStr for StatusView {
  type Err = anyhow::Error;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    match s
      .trim()
      .to_ascii_lowercase()
      .as_str()
    {
      | "any" | "all" => {
        Ok(StatusView::Any)
      }
      | "pending" | "open" => {
        Ok(StatusView::Pending)
      }
      | "completed" | "done" => {
        Ok(StatusView::Completed)
      }
      | other => {
        Err(anyhow!(
          "unknown status view: \
           {other} (expected any, \
           pending or completed)"
        ))
      }
    }
  }
}

pub fn status_view(
  tasks: &[Task],
  view: StatusView
) -> Vec<&Task> {
  tasks
    .iter()
    .filter(|task| view.matches(task))
    .collect()
}
