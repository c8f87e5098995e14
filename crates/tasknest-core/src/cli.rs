use std::ffi::OsString;
use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::anyhow;
use clap::{ArgAction, Args, Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::filter::{SelectionMode, StatusView};
use crate::task::Priority;

pub const TOKEN_ENV_VAR: &str = "TASKNEST_TOKEN";
pub const PASSWORD_ENV_VAR: &str = "TASKNEST_PASSWORD";

#[derive(Debug, Clone)]
pub struct PreprocessedArgs {
    pub cleaned_args: Vec<OsString>,
    pub rc_overrides: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct KeyVal {
    pub key: String,
    pub value: String,
}

impl std::str::FromStr for KeyVal {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (k, v) = s
            .split_once('=')
            .ok_or_else(|| anyhow!("expected KEY=VALUE, got: {s}"))?;
        Ok(Self {
            key: k.trim().to_string(),
            value: v.trim().to_string(),
        })
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "tasknest",
    version,
    about = "TaskNest: command-line client for the TaskNest task service",
    disable_help_subcommand = true
)]
pub struct GlobalCli {
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[arg(short = 'q', long = "quiet", action = ArgAction::Count, global = true)]
    pub quiet: u8,

    #[arg(
        long = "rc",
        value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<KeyVal>()),
        action = ArgAction::Append
    )]
    pub rc_overrides: Vec<KeyVal>,

    #[arg(long = "rcfile")]
    pub rcfile: Option<PathBuf>,

    /// Overrides `api.base_url` from the rc file.
    #[arg(long = "base-url")]
    pub base_url: Option<String>,

    /// Bearer token from an earlier `login`.
    #[arg(long = "token", env = TOKEN_ENV_VAR, hide_env_values = true)]
    pub token: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Authenticate and print the session token.
    Login {
        #[arg(long)]
        email: String,
        #[arg(long, env = PASSWORD_ENV_VAR, hide_env_values = true)]
        password: String,
    },
    /// Drop the current session.
    Logout,
    /// Create an account.
    Register {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long, env = PASSWORD_ENV_VAR, hide_env_values = true)]
        password: String,
    },
    /// Show the signed-in user.
    Whoami,
    /// Change the profile name or email.
    Profile {
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        email: Option<String>,
    },
    /// Change the account password.
    Password {
        #[arg(long)]
        current: String,
        #[arg(long)]
        new: String,
    },
    /// List tasks, optionally narrowed by a selection mode or status.
    List {
        #[command(flatten)]
        view: ViewArgs,
        #[arg(
            long,
            conflicts_with_all = ["mode", "tab"],
            value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<StatusView>())
        )]
        status: Option<StatusView>,
    },
    /// Show one task.
    Show { id: String },
    /// Create a task.
    Add {
        title: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        due: Option<String>,
        #[arg(
            long,
            default_value = "medium",
            value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<Priority>())
        )]
        priority: Priority,
        #[arg(long)]
        completed: bool,
    },
    /// Change fields of a task.
    Edit {
        id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        due: Option<String>,
        #[arg(
            long,
            value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<Priority>())
        )]
        priority: Option<Priority>,
    },
    /// Mark a task completed.
    Done { id: String },
    /// Mark a task pending again.
    Undone { id: String },
    /// Delete a task.
    Delete { id: String },
    /// Completion statistics and recent activity.
    Stats,
    /// Filtered task list followed by the statistics block.
    Dashboard {
        #[command(flatten)]
        view: ViewArgs,
    },
    /// Print the effective configuration.
    Config,
    /// Read commands from stdin, keeping the session between them.
    Shell,
}

#[derive(Args, Debug, Clone, Default)]
pub struct ViewArgs {
    #[arg(
        long,
        conflicts_with = "tab",
        value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<SelectionMode>())
    )]
    pub mode: Option<SelectionMode>,

    /// Dashboard tab index: 0 all, 1 today, 2 week, 3 high, 4 medium, 5 low.
    #[arg(long)]
    pub tab: Option<usize>,
}

impl ViewArgs {
    /// An unknown tab index falls back to the All tab.
    pub fn selection(&self) -> SelectionMode {
        match (self.mode, self.tab) {
            (Some(mode), _) => mode,
            (None, Some(index)) => SelectionMode::from_tab_index(index),
            (None, None) => SelectionMode::All,
        }
    }

    pub fn is_set(&self) -> bool {
        self.mode.is_some() || self.tab.is_some()
    }
}

/// One line typed at the `shell` prompt.
#[derive(Parser, Debug, Clone)]
#[command(name = "tasknest", no_binary_name = true, disable_help_subcommand = true)]
pub struct ShellLine {
    #[command(subcommand)]
    pub command: Command,
}

pub fn init_tracing(verbose: u8, quiet: u8) -> anyhow::Result<()> {
    let default_level = if quiet >= 2 {
        "error"
    } else if quiet == 1 {
        "warn"
    } else if verbose >= 3 {
        "trace"
    } else if verbose == 2 {
        "debug"
    } else if verbose == 1 {
        "info"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| anyhow!("invalid RUST_LOG / log filter: {e}"))?;

    let init_result = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_level(true)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();

    if let Err(err) = init_result {
        debug!(error = %err, "tracing subscriber already set, continuing");
    }

    Ok(())
}

#[tracing::instrument(skip_all)]
pub fn preprocess_args(raw: &[OsString]) -> anyhow::Result<PreprocessedArgs> {
    let mut cleaned = Vec::with_capacity(raw.len());
    let mut overrides: Vec<(String, String)> = Vec::new();

    let mut iter = raw.iter().cloned();
    if let Some(bin) = iter.next() {
        cleaned.push(bin);
    }

    for arg in iter {
        let s = arg.to_string_lossy();
        if let Some(rest) = s.strip_prefix("rc.") {
            let parsed = if let Some((k, v)) = rest.split_once('=') {
                Some((format!("rc.{k}"), v.to_string()))
            } else if let Some((k, v)) = rest.split_once(':') {
                Some((format!("rc.{k}"), v.to_string()))
            } else {
                None
            };

            if let Some((k, v)) = parsed {
                debug!(key = %k, value = %v, "captured positional rc override");
                overrides.push((k, v));
                continue;
            }
        }

        cleaned.push(arg);
    }

    Ok(PreprocessedArgs {
        cleaned_args: cleaned,
        rc_overrides: overrides,
    })
}

/// Splits a shell line on whitespace, honoring single and double quotes.
pub fn split_shell_line(line: &str) -> anyhow::Result<Vec<String>> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut quote: Option<char> = None;

    for ch in line.chars() {
        match quote {
            Some(q) if ch == q => quote = None,
            Some(_) => current.push(ch),
            None if ch == '"' || ch == '\'' => {
                quote = Some(ch);
                in_word = true;
            }
            None if ch.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            None => {
                current.push(ch);
                in_word = true;
            }
        }
    }

    if let Some(q) = quote {
        return Err(anyhow!("unterminated {q} quote"));
    }
    if in_word {
        words.push(current);
    }
    Ok(words)
}

#[cfg(test)]
mod tests {
    use std::ffi::OsString;

    use clap::Parser;

    use super::{Command, GlobalCli, ShellLine, preprocess_args, split_shell_line};
    use crate::filter::{SelectionMode, StatusView};
    use crate::task::Priority;

    fn os(args: &[&str]) -> Vec<OsString> {
        args.iter().map(OsString::from).collect()
    }

    #[test]
    fn positional_rc_overrides_are_lifted_out() {
        let pre = preprocess_args(&os(&["tasknest", "rc.color=off", "list", "rc.timezone:UTC"]))
            .unwrap();
        assert_eq!(pre.cleaned_args, os(&["tasknest", "list"]));
        assert_eq!(
            pre.rc_overrides,
            vec![
                ("rc.color".to_string(), "off".to_string()),
                ("rc.timezone".to_string(), "UTC".to_string()),
            ]
        );
    }

    #[test]
    fn list_accepts_tab_or_mode() {
        let cli = GlobalCli::try_parse_from(["tasknest", "list", "--tab", "3"]).unwrap();
        let Command::List { view, status } = cli.command else {
            panic!("expected list");
        };
        assert_eq!(view.selection(), SelectionMode::PriorityHigh);
        assert_eq!(status, None);

        let cli = GlobalCli::try_parse_from(["tasknest", "list", "--mode", "week"]).unwrap();
        let Command::List { view, .. } = cli.command else {
            panic!("expected list");
        };
        assert_eq!(view.selection(), SelectionMode::DueThisWeek);
    }

    #[test]
    fn status_and_mode_are_mutually_exclusive() {
        assert!(
            GlobalCli::try_parse_from(["tasknest", "list", "--mode", "high", "--status", "done"])
                .is_err()
        );
        let cli = GlobalCli::try_parse_from(["tasknest", "list", "--status", "done"]).unwrap();
        let Command::List { status, .. } = cli.command else {
            panic!("expected list");
        };
        assert_eq!(status, Some(StatusView::Completed));
    }

    #[test]
    fn out_of_range_tab_shows_everything() {
        let cli = GlobalCli::try_parse_from(["tasknest", "dashboard", "--tab", "9"]).unwrap();
        let Command::Dashboard { view } = cli.command else {
            panic!("expected dashboard");
        };
        assert_eq!(view.selection(), SelectionMode::All);
    }

    #[test]
    fn add_defaults_to_medium_priority() {
        let cli = GlobalCli::try_parse_from(["tasknest", "add", "Buy milk"]).unwrap();
        let Command::Add {
            title, priority, ..
        } = cli.command
        else {
            panic!("expected add");
        };
        assert_eq!(title, "Buy milk");
        assert_eq!(priority, Priority::Medium);
    }

    #[test]
    fn shell_lines_split_on_quotes() {
        let words = split_shell_line(r#"add "Plan the sprint" --priority 'high'"#).unwrap();
        assert_eq!(words, vec!["add", "Plan the sprint", "--priority", "high"]);
        assert!(split_shell_line("add \"open").is_err());
        assert!(split_shell_line("   ").unwrap().is_empty());

        let line = ShellLine::try_parse_from(words).unwrap();
        assert!(matches!(line.command, Command::Add { .. }));
    }
}
