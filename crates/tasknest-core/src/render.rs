use std::io::{self, IsTerminal, Write};

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use unicode_width::UnicodeWidthStr;

use crate::config::Config;
use crate::datetime::{format_local_date, format_local_datetime};
use crate::stats::TaskStats;
use crate::task::{Priority, Task, User};

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
    tz: Tz,
}

impl Renderer {
    pub fn new(cfg: &Config, tz: Tz) -> anyhow::Result<Self> {
        let color = cfg.color()? && io::stdout().is_terminal();
        Ok(Self { color, tz })
    }

    pub fn plain(tz: Tz) -> Self {
        Self { color: false, tz }
    }

    #[tracing::instrument(skip(self, tasks, now), fields(rows = tasks.len()))]
    pub fn print_task_table(&self, tasks: &[&Task], now: DateTime<Utc>) -> anyhow::Result<()> {
        let out = io::stdout().lock();
        self.write_task_table(out, tasks, now)
    }

    pub fn write_task_table<W: Write>(
        &self,
        mut out: W,
        tasks: &[&Task],
        now: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        if tasks.is_empty() {
            writeln!(out, "No tasks.")?;
            return Ok(());
        }

        let headers = vec![
            "ID".to_string(),
            "Done".to_string(),
            "Priority".to_string(),
            "Due".to_string(),
            "Title".to_string(),
        ];

        let mut rows = Vec::with_capacity(tasks.len());
        for task in tasks {
            let due = task
                .due_date
                .map(|date| format_local_date(date, &self.tz))
                .unwrap_or_default();
            let due = match task.due_date {
                Some(task_due) if task_due < now && task.is_pending() => self.paint(&due, "31"),
                _ => due,
            };

            let done = if task.completed { "[x]" } else { "[ ]" };

            rows.push(vec![
                self.paint(&task.id, "33"),
                done.to_string(),
                self.paint_priority(task.priority),
                due,
                task.title.clone(),
            ]);
        }

        write_table(&mut out, headers, rows)?;
        writeln!(out, "\n{} task(s)", tasks.len())?;
        Ok(())
    }

    #[tracing::instrument(skip(self, task), fields(id = %task.id))]
    pub fn print_task_info(&self, task: &Task) -> anyhow::Result<()> {
        let out = io::stdout().lock();
        self.write_task_info(out, task)
    }

    pub fn write_task_info<W: Write>(&self, mut out: W, task: &Task) -> anyhow::Result<()> {
        writeln!(out, "id          {}", task.id)?;
        writeln!(out, "title       {}", task.title)?;
        writeln!(out, "description {}", task.description)?;
        writeln!(out, "priority    {}", self.paint_priority(task.priority))?;
        writeln!(
            out,
            "status      {}",
            if task.completed { "completed" } else { "pending" }
        )?;
        if let Some(due) = task.due_date {
            writeln!(out, "due         {}", format_local_datetime(due, &self.tz))?;
        }
        if let Some(created) = task.created_at {
            writeln!(out, "created     {}", format_local_datetime(created, &self.tz))?;
        }
        if let Some(updated) = task.updated_at {
            writeln!(out, "updated     {}", format_local_datetime(updated, &self.tz))?;
        }
        Ok(())
    }

    #[tracing::instrument(skip(self, stats))]
    pub fn print_stats(&self, stats: &TaskStats<'_>) -> anyhow::Result<()> {
        let out = io::stdout().lock();
        self.write_stats(out, stats)
    }

    pub fn write_stats<W: Write>(&self, mut out: W, stats: &TaskStats<'_>) -> anyhow::Result<()> {
        writeln!(out, "Total tasks      {}", stats.total)?;
        writeln!(out, "Completed        {}", stats.completed)?;
        writeln!(out, "Pending          {}", stats.pending)?;
        writeln!(
            out,
            "Completion rate  {}% {}",
            stats.completion_rate,
            progress_bar(stats.completion_rate, 20)
        )?;
        writeln!(
            out,
            "By priority      high {} / medium {} / low {}",
            stats.by_priority.high, stats.by_priority.medium, stats.by_priority.low
        )?;

        writeln!(out, "\nRecent activity (last 24 hours)")?;
        if stats.recent_activity.is_empty() {
            writeln!(out, "No recent tasks.")?;
        }
        for task in &stats.recent_activity {
            let created = task
                .created_at
                .map(|dt| format_local_datetime(dt, &self.tz))
                .unwrap_or_default();
            let done = if task.completed { "[x]" } else { "[ ]" };
            writeln!(out, "  {done} {created}  {}", task.title)?;
        }
        Ok(())
    }

    pub fn print_user(&self, user: &User) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        writeln!(out, "name   {}", user.name)?;
        writeln!(out, "email  {}", user.email)?;
        if let Some(id) = &user.id {
            writeln!(out, "id     {id}")?;
        }
        Ok(())
    }

    pub fn print_message(&self, message: &str) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        writeln!(out, "{}", self.paint(message, "32"))?;
        Ok(())
    }

    fn paint_priority(&self, priority: Priority) -> String {
        let code = match priority {
            Priority::High => "31",
            Priority::Medium => "33",
            Priority::Low => "32",
        };
        self.paint(priority.as_str(), code)
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn progress_bar(percent: u8, width: usize) -> String {
    let filled = usize::from(percent.min(100)) * width / 100;
    format!("[{}{}]", "#".repeat(filled), "-".repeat(width - filled))
}

fn write_table<W: Write>(
    mut writer: W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(UnicodeWidthStr::width(header.as_str()));
    }

    for row in &rows {
        for (idx, cell) in row.iter().enumerate() {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    for idx in 0..column_count {
        write!(writer, "{:width$} ", headers[idx], width = widths[idx])?;
    }
    writeln!(writer)?;

    for idx in 0..column_count {
        write!(writer, "{:-<width$} ", "", width = widths[idx])?;
    }
    writeln!(writer)?;

    for row in rows {
        for idx in 0..column_count {
            let cell = &row[idx];
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = widths[idx].saturating_sub(visible_width);
            write!(writer, "{}{} ", cell, " ".repeat(padding))?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::{Renderer, progress_bar, strip_ansi};
    use crate::stats::TaskStats;
    use crate::task::{Priority, Task};

    fn sample() -> Vec<Task> {
        let now = Utc.with_ymd_and_hms(2026, 2, 16, 15, 0, 0).unwrap();
        vec![
            Task {
                id: "a1".to_string(),
                title: "Plan sprint".to_string(),
                description: String::new(),
                due_date: Some(now + Duration::days(1)),
                priority: Priority::High,
                completed: false,
                created_at: Some(now - Duration::hours(1)),
                updated_at: None,
            },
            Task {
                id: "b2".to_string(),
                title: "Review notes café".to_string(),
                description: String::new(),
                due_date: None,
                priority: Priority::Low,
                completed: true,
                created_at: None,
                updated_at: None,
            },
        ]
    }

    #[test]
    fn table_lists_every_row_with_header() {
        let tasks = sample();
        let refs: Vec<&Task> = tasks.iter().collect();
        let now = Utc.with_ymd_and_hms(2026, 2, 16, 15, 0, 0).unwrap();
        let mut buf = Vec::new();
        Renderer::plain(chrono_tz::UTC)
            .write_task_table(&mut buf, &refs, now)
            .unwrap();
        let text = String::from_utf8(buf).unwrap();

        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[0].starts_with("ID"));
        assert!(lines[2].contains("2026-02-17"));
        assert!(lines[3].contains("[x]"));
        assert!(text.contains("2 task(s)"));
    }

    #[test]
    fn empty_table_says_so() {
        let mut buf = Vec::new();
        Renderer::plain(chrono_tz::UTC)
            .write_task_table(&mut buf, &[], Utc::now())
            .unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "No tasks.\n");
    }

    #[test]
    fn stats_block_reports_rate_and_recent() {
        let tasks = sample();
        let now = Utc.with_ymd_and_hms(2026, 2, 16, 15, 0, 0).unwrap();
        let stats = TaskStats::compute(&tasks, now);
        let mut buf = Vec::new();
        Renderer::plain(chrono_tz::UTC)
            .write_stats(&mut buf, &stats)
            .unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("Completion rate  50%"));
        assert!(text.contains("Plan sprint"));
        assert!(!text.contains("Review notes"));
    }

    #[test]
    fn helpers_handle_ansi_and_bounds() {
        assert_eq!(strip_ansi("\x1b[31mlate\x1b[0m"), "late");
        assert_eq!(progress_bar(50, 10), "[#####-----]");
        assert_eq!(progress_bar(100, 4), "[####]");
        assert_eq!(progress_bar(0, 4), "[----]");
    }
}
