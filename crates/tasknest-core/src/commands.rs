use std::io::{self, BufRead, IsTerminal, Write};

use anyhow::{Context, anyhow};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use clap::Parser;
use tracing::{debug, info, instrument};

use crate::api::{ApiClient, LoginRequest, PasswordChange, ProfileUpdate, RegisterRequest};
use crate::cli::{Command, ShellLine, TOKEN_ENV_VAR, ViewArgs, split_shell_line};
use crate::config::Config;
use crate::datetime::parse_date_expr;
use crate::error::ApiError;
use crate::filter::{Filter, StatusView, status_view};
use crate::render::Renderer;
use crate::session::Session;
use crate::snapshot::TaskBoard;
use crate::stats::TaskStats;
use crate::task::{Task, TaskInput, TaskPatch, User};

/// Everything a command needs for the lifetime of the process.
pub struct App {
    pub client: ApiClient,
    pub board: TaskBoard,
    pub renderer: Renderer,
    pub config: Config,
    pub tz: Tz,
}

impl App {
    pub fn new(client: ApiClient, renderer: Renderer, config: Config, tz: Tz) -> Self {
        Self {
            client,
            board: TaskBoard::new(),
            renderer,
            config,
            tz,
        }
    }
}

pub async fn dispatch(app: &App, command: Command) -> anyhow::Result<()> {
    execute(app, command).await.map_err(|err| {
        let unauthorized = err
            .downcast_ref::<ApiError>()
            .is_some_and(ApiError::is_unauthorized);
        if unauthorized {
            err.context(format!(
                "not signed in or session rejected; run `tasknest login` and export {TOKEN_ENV_VAR}"
            ))
        } else {
            err
        }
    })
}

async fn execute(app: &App, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Login { email, password } => login(app, LoginRequest { email, password }).await,
        Command::Logout => match app.client.logout() {
            Some(session) => app
                .renderer
                .print_message(&format!("Signed out {}.", display_name(session.user()))),
            None => app.renderer.print_message("No active session."),
        },
        Command::Register {
            name,
            email,
            password,
        } => {
            let message = app
                .client
                .register(&RegisterRequest {
                    name,
                    email,
                    password,
                })
                .await?;
            app.renderer.print_message(&message)?;
            match app.client.session().current() {
                Some(session) => print_token(&session),
                None => app
                    .renderer
                    .print_message("Sign in with `tasknest login` to start a session."),
            }
        }
        Command::Whoami => {
            let user = app.client.current_user().await?;
            app.renderer.print_user(&user)
        }
        Command::Profile { name, email } => {
            let update = ProfileUpdate { name, email };
            if update.is_empty() {
                return Err(anyhow!("nothing to update; pass --name or --email"));
            }
            let user = app.client.update_profile(&update).await?;
            app.renderer.print_message("Profile updated.")?;
            app.renderer.print_user(&user)
        }
        Command::Password { current, new } => {
            app.client
                .update_password(&PasswordChange {
                    current_password: current,
                    new_password: new,
                })
                .await?;
            app.renderer.print_message("Password changed.")
        }
        Command::List { view, status } => list(app, &view, status).await,
        Command::Show { id } => {
            let task = app.client.get_task(&id).await?;
            app.renderer.print_task_info(&task)
        }
        Command::Add {
            title,
            description,
            due,
            priority,
            completed,
        } => {
            let input = TaskInput {
                title,
                description: description.unwrap_or_default(),
                due_date: parse_due(app, due.as_deref())?,
                priority,
                completed,
            };
            let task = app.client.create_task(&input).await?;
            app.renderer
                .print_message(&format!("Created task {}.", task.id))?;
            app.renderer.print_task_info(&task)
        }
        Command::Edit {
            id,
            title,
            description,
            due,
            priority,
        } => {
            let patch = TaskPatch {
                title,
                description,
                due_date: parse_due(app, due.as_deref())?,
                priority,
                completed: None,
            };
            let task = app.client.update_task(&id, &patch).await?;
            app.renderer
                .print_message(&format!("Updated task {}.", task.id))?;
            app.renderer.print_task_info(&task)
        }
        Command::Done { id } => set_completed(app, &id, true).await,
        Command::Undone { id } => set_completed(app, &id, false).await,
        Command::Delete { id } => {
            app.client.delete_task(&id).await?;
            app.renderer
                .print_message(&format!("Deleted task {}.", id.trim()))
        }
        Command::Stats => stats(app).await,
        Command::Dashboard { view } => dashboard(app, &view).await,
        Command::Config => show_config(&app.config),
        Command::Shell => Err(anyhow!("already in a shell")),
    }
}

#[instrument(skip(app, request), fields(email = %request.email))]
async fn login(app: &App, request: LoginRequest) -> anyhow::Result<()> {
    let session = app.client.login(&request).await?;
    info!("signed in");
    app.renderer
        .print_message(&format!("Signed in as {}.", display_name(session.user())))?;
    print_token(&session)
}

fn print_token(session: &Session) -> anyhow::Result<()> {
    let mut out = io::stdout().lock();
    writeln!(out, "export {TOKEN_ENV_VAR}={}", session.token())?;
    Ok(())
}

#[instrument(skip(app, view))]
async fn list(app: &App, view: &ViewArgs, status: Option<StatusView>) -> anyhow::Result<()> {
    if status.is_some() && view.is_set() {
        return Err(anyhow!("--status cannot be combined with --mode or --tab"));
    }
    let now = Utc::now();
    let filter = Filter::new(view.selection(), now, app.tz);

    refresh(app).await?;
    let tasks = match status {
        Some(status) => current_view(&app.board, |tasks| owned(status_view(tasks, status))),
        None => current_view(&app.board, |tasks| owned(filter.apply(tasks))),
    };

    let refs: Vec<&Task> = tasks.iter().collect();
    app.renderer.print_task_table(&refs, now)
}

#[instrument(skip(app))]
async fn stats(app: &App) -> anyhow::Result<()> {
    refresh(app).await?;
    let tasks = current_view(&app.board, |tasks| tasks.to_vec());
    app.renderer
        .print_stats(&TaskStats::compute(&tasks, Utc::now()))
}

#[instrument(skip(app, view))]
async fn dashboard(app: &App, view: &ViewArgs) -> anyhow::Result<()> {
    let now = Utc::now();
    let filter = Filter::new(view.selection(), now, app.tz);

    refresh(app).await?;
    let (visible, all) = current_view(&app.board, |tasks| dashboard_view(&filter, tasks));

    let refs: Vec<&Task> = visible.iter().collect();
    app.renderer
        .print_message(&format!("{} ({})", filter.mode().label(), refs.len()))?;
    app.renderer.print_task_table(&refs, now)?;
    println!();
    app.renderer.print_stats(&TaskStats::compute(&all, now))
}

async fn set_completed(app: &App, id: &str, completed: bool) -> anyhow::Result<()> {
    let task = app.client.set_completed(id, completed).await?;
    let state = if task.completed { "completed" } else { "pending" };
    app.renderer
        .print_message(&format!("Task {} is now {state}.", task.id))
}

fn show_config(cfg: &Config) -> anyhow::Result<()> {
    let mut entries: Vec<(&String, &String)> = cfg.iter().collect();
    entries.sort();

    let mut out = io::stdout().lock();
    for file in &cfg.loaded_files {
        writeln!(out, "# loaded {}", file.display())?;
    }
    for (key, value) in entries {
        writeln!(out, "{key} = {value}")?;
    }
    Ok(())
}

/// Reads commands from stdin until EOF or `exit`, sharing one session and
/// one task board across them.
pub async fn shell(app: &App) -> anyhow::Result<()> {
    let stdin = io::stdin();
    let interactive = stdin.is_terminal();
    let mut line = String::new();

    loop {
        if interactive {
            print!("tasknest> ");
            io::stdout().flush()?;
        }

        line.clear();
        let read = stdin
            .lock()
            .read_line(&mut line)
            .context("failed to read command")?;
        if read == 0 {
            break;
        }

        let words = match split_shell_line(&line) {
            Ok(words) => words,
            Err(err) => {
                eprintln!("error: {err}");
                continue;
            }
        };
        match words.first().map(String::as_str) {
            None => continue,
            Some("exit" | "quit") => break,
            Some(_) => {}
        }

        let parsed = match ShellLine::try_parse_from(words) {
            Ok(parsed) => parsed,
            Err(err) => {
                err.print()?;
                continue;
            }
        };
        if let Err(err) = dispatch(app, parsed.command).await {
            eprintln!("error: {err:#}");
        }
    }

    info!("shell closed");
    Ok(())
}

async fn refresh(app: &App) -> anyhow::Result<()> {
    let installed = app.client.refresh_board(&app.board).await?;
    if !installed {
        debug!("newer fetch already installed; showing it");
    }
    Ok(())
}

fn parse_due(app: &App, raw: Option<&str>) -> anyhow::Result<Option<DateTime<Utc>>> {
    raw.map(|raw| {
        parse_date_expr(raw, Utc::now(), &app.tz)
            .with_context(|| format!("invalid due date: {raw}"))
    })
    .transpose()
}

/// Derives from the board until the result matches the installed snapshot.
fn current_view<T, F>(board: &TaskBoard, derive: F) -> T
where
    F: Fn(&[Task]) -> T,
{
    loop {
        if let Some(value) = board.accept(board.derive(&derive)) {
            return value;
        }
    }
}

/// The filtered tab and the full list it was cut from, both from one snapshot.
fn dashboard_view(filter: &Filter, tasks: &[Task]) -> (Vec<Task>, Vec<Task>) {
    (owned(filter.apply(tasks)), tasks.to_vec())
}

fn owned(tasks: Vec<&Task>) -> Vec<Task> {
    tasks.into_iter().cloned().collect()
}

fn display_name(user: &User) -> String {
    match (user.name.trim(), user.email.trim()) {
        ("", "") => "unknown user".to_string(),
        ("", email) => email.to_string(),
        (name, "") => name.to_string(),
        (name, email) => format!("{name} <{email}>"),
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use chrono_tz::UTC;

    use super::{current_view, dashboard_view, display_name, owned};
    use crate::filter::{Filter, SelectionMode, StatusView, status_view};
    use crate::snapshot::TaskBoard;
    use crate::stats::TaskStats;
    use crate::task::{Priority, Task, User};

    fn task(id: &str, completed: bool) -> Task {
        Task {
            id: id.to_string(),
            title: format!("task {id}"),
            description: String::new(),
            due_date: None,
            priority: Priority::Low,
            completed,
            created_at: None,
            updated_at: None,
        }
    }

    #[test]
    fn current_view_reads_the_installed_snapshot() {
        let board = TaskBoard::new();
        let ticket = board.begin_fetch();
        board.complete_fetch(ticket, vec![task("a", true), task("b", false)]);

        let pending = current_view(&board, |tasks| {
            owned(status_view(tasks, StatusView::Pending))
        });
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, "b");
    }

    #[test]
    fn dashboard_tab_and_stats_share_one_snapshot() {
        let board = TaskBoard::new();
        let stale = board.begin_fetch();
        let fresh = board.begin_fetch();
        board.complete_fetch(fresh, vec![task("a", true), task("b", false), task("c", false)]);
        board.complete_fetch(stale, vec![task("old", false)]);

        let now = Utc.with_ymd_and_hms(2026, 2, 16, 12, 0, 0).unwrap();
        let filter = Filter::new(SelectionMode::PriorityLow, now, UTC);
        let (visible, all) = current_view(&board, |tasks| dashboard_view(&filter, tasks));

        let ids: Vec<&str> = visible.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        let stats = TaskStats::compute(&all, now);
        assert_eq!(stats.total, 3);
        assert_eq!(stats.completed, 1);
    }

    #[test]
    fn display_name_prefers_name_and_email() {
        let mut user = User::default();
        assert_eq!(display_name(&user), "unknown user");
        user.email = "ada@example.com".to_string();
        assert_eq!(display_name(&user), "ada@example.com");
        user.name = "Ada".to_string();
        assert_eq!(display_name(&user), "Ada <ada@example.com>");
    }
}
