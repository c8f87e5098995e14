pub mod api;
pub mod cli;
pub mod commands;
pub mod config;
pub mod datetime;
pub mod error;
pub mod filter;
pub mod render;
pub mod session;
pub mod snapshot;
pub mod stats;
pub mod task;

use std::ffi::OsString;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{
  debug,
  info
};

use crate::cli::Command;
use crate::session::{
  Session,
  SessionStore
};
use crate::task::User;

#[tracing::instrument(skip_all)]
pub fn run(
  raw_args: Vec<OsString>
) -> anyhow::Result<()> {
  let pre =
    cli::preprocess_args(&raw_args)?;
  let cli = cli::GlobalCli::parse_from(
    pre.cleaned_args
  );

  cli::init_tracing(
    cli.verbose,
    cli.quiet
  )?;

  info!(
    verbose = cli.verbose,
    quiet = cli.quiet,
    "starting tasknest CLI"
  );
  debug!(?pre.rc_overrides, "preprocessed rc overrides");

  let mut cfg = config::Config::load(
    cli.rcfile.as_deref()
  )?;
  cfg.apply_overrides(
    pre
      .rc_overrides
      .into_iter()
      .chain(
        cli
          .rc_overrides
          .into_iter()
          .map(|kv| (kv.key, kv.value))
      )
      .chain(cli.base_url.map(|url| {
        (
          config::KEY_BASE_URL
            .to_string(),
          url
        )
      }))
  );

  let tz = cfg
    .timezone()?
    .unwrap_or(
      *datetime::project_timezone()
    );
  let api_config = cfg.api_config()?;

  let session =
    Arc::new(SessionStore::new());
  if let Some(token) = cli
    .token
    .filter(|t| !t.trim().is_empty())
  {
    debug!("using token from command line or environment");
    session.begin(Session::new(
      token.trim(),
      User::default()
    ));
  }

  let client =
    api::ApiClient::with_session(
      &api_config,
      session
    )
    .context(
      "failed to build API client"
    )?;
  let renderer =
    render::Renderer::new(&cfg, tz)?;
  let app = commands::App::new(
    client, renderer, cfg, tz
  );

  let runtime =
    tokio::runtime::Builder::new_current_thread()
      .enable_all()
      .build()
      .context(
        "failed to start async runtime"
      )?;

  runtime.block_on(async {
    match cli.command {
      | Command::Shell => {
        commands::shell(&app).await
      }
      | command => {
        commands::dispatch(&app, command)
          .await
      }
    }
  })?;

  info!("done");
  Ok(())
}
