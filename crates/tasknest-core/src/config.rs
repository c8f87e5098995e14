use std::collections::HashMap;
use std::fs;
use std::path::{
  Path,
  PathBuf
};
use std::time::Duration;

use anyhow::{
  Context,
  anyhow
};
use chrono_tz::Tz;
use tracing::{
  debug,
  info,
  trace,
  warn
};

use crate::api::{
  ApiConfig,
  DEFAULT_BASE_URL,
  DEFAULT_TIMEOUT_SECS
};
use crate::datetime::parse_timezone_id;

const RC_ENV_VAR: &str = "TASKNESTRC";
const RC_FILE_NAME: &str = ".tasknestrc";

pub const KEY_BASE_URL: &str =
  "api.base_url";
pub const KEY_TIMEOUT_SECS: &str =
  "api.timeout_secs";
pub const KEY_TIMEZONE: &str =
  "timezone";
pub const KEY_COLOR: &str = "color";

#[derive(Debug, Clone)]
pub struct Config {
  map: HashMap<String, String>,
  pub loaded_files: Vec<PathBuf>
}

impl Default for Config {
  fn default() -> Self {
    let mut map = HashMap::new();
    map.insert(
      KEY_BASE_URL.to_string(),
      DEFAULT_BASE_URL.to_string()
    );
    map.insert(
      KEY_TIMEOUT_SECS.to_string(),
      DEFAULT_TIMEOUT_SECS.to_string()
    );
    map.insert(
      KEY_COLOR.to_string(),
      "on".to_string()
    );

    Self {
      map,
      loaded_files: vec![]
    }
  }
}

impl Config {
  #[tracing::instrument(skip(
    rc_override
  ))]
  pub fn load(
    rc_override: Option<&Path>
  ) -> anyhow::Result<Self> {
    let mut cfg = Config::default();

    let rc =
      resolve_rc_path(rc_override)?;
    if let Some(path) = rc {
      info!(rc = %path.display(), "loading rc file");
      cfg.load_file(&path)?;
    } else {
      debug!(
        "no rc file found; using \
         defaults"
      );
    }

    Ok(cfg)
  }

  #[tracing::instrument(skip(
    self, overrides
  ))]
  pub fn apply_overrides<I>(
    &mut self,
    overrides: I
  ) where
    I: IntoIterator<
      Item = (String, String)
    >
  {
    for (k, v) in overrides {
      let key = k
        .strip_prefix("rc.")
        .unwrap_or(&k)
        .to_string();
      debug!(key = %key, value = %v, "applying override");
      self.map.insert(key, v);
    }
  }

  pub fn get(
    &self,
    key: &str
  ) -> Option<String> {
    self.map.get(key).cloned()
  }

  pub fn get_bool(
    &self,
    key: &str
  ) -> Option<bool> {
    self
      .map
      .get(key)
      .map(|v| parse_bool(v))
  }

  pub fn iter(
    &self
  ) -> impl Iterator<Item = (&String, &String)>
  {
    self.map.iter()
  }

  pub fn api_config(
    &self
  ) -> anyhow::Result<ApiConfig> {
    let base_url = self
      .get(KEY_BASE_URL)
      .unwrap_or_else(|| {
        DEFAULT_BASE_URL.to_string()
      });
    let timeout_secs = match self
      .get(KEY_TIMEOUT_SECS)
    {
      | Some(raw) => {
        raw.trim().parse::<u64>().with_context(|| {
          format!(
            "invalid {KEY_TIMEOUT_SECS}: \
             {raw}"
          )
        })?
      }
      | None => DEFAULT_TIMEOUT_SECS
    };

    let config = ApiConfig::new(
      &base_url,
      Duration::from_secs(timeout_secs)
    )
    .with_context(|| {
      format!(
        "invalid {KEY_BASE_URL}: \
         {base_url}"
      )
    })?;

    Ok(match self.timezone()? {
      | Some(tz) => config.with_timezone(tz),
      | None => config
    })
  }

  pub fn timezone(
    &self
  ) -> anyhow::Result<Option<Tz>> {
    self
      .get(KEY_TIMEZONE)
      .filter(|raw| !raw.trim().is_empty())
      .map(|raw| parse_timezone_id(&raw))
      .transpose()
  }

  pub fn color(
    &self
  ) -> anyhow::Result<bool> {
    let raw = self
      .get(KEY_COLOR)
      .unwrap_or_else(|| "on".to_string());
    match raw
      .trim()
      .to_ascii_lowercase()
      .as_str()
    {
      | "on" | "yes" | "true" | "1" => {
        Ok(true)
      }
      | "off" | "no" | "false" | "0" => {
        Ok(false)
      }
      | other => {
        Err(anyhow!(
          "invalid color setting: \
           {other}"
        ))
      }
    }
  }

  #[tracing::instrument(skip(self))]
  fn load_file(
    &mut self,
    path: &Path
  ) -> anyhow::Result<()> {
    let path = expand_tilde(path);
    let text =
      fs::read_to_string(&path)
        .with_context(|| {
          format!(
            "failed to read {}",
            path.display()
          )
        })?;

    self
      .loaded_files
      .push(path.clone());

    let base_dir = path
      .parent()
      .map(|p| p.to_path_buf())
      .unwrap_or_else(|| {
        PathBuf::from(".")
      });

    for (line_num, raw_line) in
      text.lines().enumerate()
    {
      let mut line = raw_line.trim();
      if line.is_empty()
        || line.starts_with('#')
      {
        continue;
      }

      if let Some((before, _)) =
        line.split_once('#')
      {
        line = before.trim();
      }

      if line.is_empty() {
        continue;
      }

      if let Some(include_rest) =
        line.strip_prefix("include ")
      {
        let include_path =
          resolve_include_path(
            &base_dir,
            include_rest.trim()
          )?;
        debug!(
            file = %path.display(),
            include = %include_path.display(),
            line = line_num + 1,
            "processing include"
        );

        if self
          .loaded_files
          .contains(&include_path)
        {
          warn!(include = %include_path.display(), "include cycle detected; skipping");
        } else if include_path.exists() {
          self
            .load_file(&include_path)?;
        } else {
          warn!(include = %include_path.display(), "include file does not exist; skipping");
        }
        continue;
      }

      let (k, v) = line
        .split_once('=')
        .ok_or_else(|| {
          anyhow!(
            "invalid config line \
             {}:{}: {}",
            path.display(),
            line_num + 1,
            raw_line
          )
        })?;

      let key = k.trim().to_string();
      let value = v.trim().to_string();
      trace!(key = %key, "loaded config key");
      self.map.insert(key, value);
    }

    Ok(())
  }
}

#[tracing::instrument(skip(
  override_path
))]
fn resolve_rc_path(
  override_path: Option<&Path>
) -> anyhow::Result<Option<PathBuf>> {
  if let Some(path) = override_path {
    return Ok(Some(path.to_path_buf()));
  }

  if let Ok(rc_env) =
    std::env::var(RC_ENV_VAR)
  {
    if rc_env == "/dev/null"
      || rc_env.trim().is_empty()
    {
      return Ok(None);
    }
    return Ok(Some(PathBuf::from(
      rc_env
    )));
  }

  let Some(home) = dirs::home_dir()
  else {
    warn!(
      "cannot determine home \
       directory; skipping rc file"
    );
    return Ok(None);
  };
  let candidate = home.join(RC_FILE_NAME);
  if candidate.exists() {
    return Ok(Some(candidate));
  }

  Ok(None)
}

fn resolve_include_path(
  base_dir: &Path,
  include: &str
) -> anyhow::Result<PathBuf> {
  if include.trim().is_empty() {
    return Err(anyhow!(
      "include path cannot be empty"
    ));
  }

  let raw = PathBuf::from(include);
  let expanded = expand_tilde(&raw);
  if expanded.is_absolute() {
    Ok(expanded)
  } else {
    Ok(base_dir.join(expanded))
  }
}

fn expand_tilde(
  path: &Path
) -> PathBuf {
  let text = path.to_string_lossy();
  if let Some(rest) =
    text.strip_prefix("~/")
    && let Some(home) = dirs::home_dir()
  {
    return home.join(rest);
  }
  path.to_path_buf()
}

fn parse_bool(s: &str) -> bool {
  matches!(
    s.trim()
      .to_ascii_lowercase()
      .as_str(),
    "1" | "y" | "yes" | "on" | "true"
  )
}

#[cfg(test)]
mod tests {
  use std::fs;
  use std::time::Duration;

  use tempfile::tempdir;

  use super::{
    Config,
    KEY_BASE_URL
  };
  use crate::api::DEFAULT_BASE_URL;

  #[test]
  fn defaults_point_at_hosted_backend() {
    let cfg = Config::default();
    let api = cfg.api_config().unwrap();
    assert_eq!(
      api.base_url.as_str(),
      DEFAULT_BASE_URL
    );
    assert_eq!(
      api.timeout,
      Duration::from_secs(30)
    );
    assert!(cfg.color().unwrap());
    assert!(cfg.timezone().unwrap().is_none());
  }

  #[test]
  fn loads_file_with_comments_and_includes()
   {
    let dir = tempdir().unwrap();
    let extra = dir.path().join("extra.rc");
    fs::write(
      &extra,
      "timezone = Europe/Berlin\n"
    )
    .unwrap();
    let rc = dir.path().join("main.rc");
    fs::write(
      &rc,
      "# local backend\n\
       api.base_url = http://localhost:5000/api  # dev\n\
       api.timeout_secs=5\n\
       color = off\n\
       include extra.rc\n"
    )
    .unwrap();

    let cfg =
      Config::load(Some(&rc)).unwrap();
    assert_eq!(cfg.loaded_files.len(), 2);

    let api = cfg.api_config().unwrap();
    assert_eq!(
      api.base_url.as_str(),
      "http://localhost:5000/api"
    );
    assert_eq!(
      api.timeout,
      Duration::from_secs(5)
    );
    assert!(!cfg.color().unwrap());
    assert_eq!(
      cfg.timezone().unwrap(),
      Some(chrono_tz::Europe::Berlin)
    );
    assert_eq!(
      api.timezone,
      chrono_tz::Europe::Berlin
    );
  }

  #[test]
  fn rejects_lines_without_equals() {
    let dir = tempdir().unwrap();
    let rc = dir.path().join("bad.rc");
    fs::write(&rc, "just words\n").unwrap();
    assert!(Config::load(Some(&rc)).is_err());
  }

  #[test]
  fn overrides_strip_rc_prefix() {
    let mut cfg = Config::default();
    cfg.apply_overrides(vec![(
      "rc.api.base_url".to_string(),
      "https://tasks.example.com/api"
        .to_string()
    )]);
    assert_eq!(
      cfg.get(KEY_BASE_URL).as_deref(),
      Some("https://tasks.example.com/api")
    );
  }

  #[test]
  fn invalid_values_are_reported() {
    let mut cfg = Config::default();
    cfg.apply_overrides(vec![
      (
        "api.timeout_secs".to_string(),
        "soon".to_string()
      ),
      (
        "timezone".to_string(),
        "Mars/Olympus".to_string()
      ),
      (
        "color".to_string(),
        "rainbow".to_string()
      ),
    ]);
    assert!(cfg.api_config().is_err());
    assert!(cfg.timezone().is_err());
    assert!(cfg.color().is_err());
    assert_eq!(cfg.get_bool("color"), Some(false));
  }
}
