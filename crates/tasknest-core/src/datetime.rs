use std::fs;
use std::path::PathBuf;
use std::sync::OnceLock;

use anyhow::anyhow;
use chrono::{
  DateTime,
  Datelike,
  Duration,
  LocalResult,
  NaiveDate,
  NaiveDateTime,
  TimeZone,
  Utc,
  Weekday
};
use chrono_tz::Tz;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

const TIMEZONE_CONFIG_FILE: &str =
  "tasknest-time.toml";
const TIMEZONE_ENV_VAR: &str =
  "TASKNEST_TIMEZONE";
const TIMEZONE_CONFIG_ENV_VAR: &str =
  "TASKNEST_TIME_CONFIG";
const DEFAULT_PROJECT_TIMEZONE: &str =
  "UTC";

const NAIVE_DATETIME_FORMATS: [&str; 4] = [
  "%Y-%m-%dT%H:%M:%S%.f",
  "%Y-%m-%dT%H:%M",
  "%Y-%m-%d %H:%M:%S",
  "%Y-%m-%d %H:%M"
];

#[derive(Debug, Deserialize)]
struct TimezoneConfig {
  timezone: Option<String>,
  time:     Option<TimezoneSection>
}

#[derive(Debug, Deserialize)]
struct TimezoneSection {
  timezone: Option<String>
}

/// Timezone used for calendar-date
/// comparisons and for date-only values
/// coming from the API.
pub fn project_timezone() -> &'static Tz
{
  static PROJECT_TZ: OnceLock<Tz> =
    OnceLock::new();
  PROJECT_TZ.get_or_init(
    resolve_project_timezone
  )
}

#[must_use]
pub fn local_date(
  dt: DateTime<Utc>,
  tz: &Tz
) -> NaiveDate {
  dt.with_timezone(tz).date_naive()
}

#[must_use]
pub fn format_local_date(
  dt: DateTime<Utc>,
  tz: &Tz
) -> String {
  dt.with_timezone(tz)
    .format("%Y-%m-%d")
    .to_string()
}

#[must_use]
pub fn format_local_datetime(
  dt: DateTime<Utc>,
  tz: &Tz
) -> String {
  dt.with_timezone(tz)
    .format("%Y-%m-%d %H:%M")
    .to_string()
}

pub fn parse_timezone_id(
  raw: &str
) -> anyhow::Result<Tz> {
  raw.trim().parse::<Tz>().map_err(
    |err| {
      anyhow!(
        "invalid timezone '{}': {err}",
        raw.trim()
      )
    }
  )
}

fn resolve_project_timezone() -> Tz {
  if let Ok(raw) =
    std::env::var(TIMEZONE_ENV_VAR)
    && let Some(tz) =
      parse_timezone(&raw, TIMEZONE_ENV_VAR)
  {
    return tz;
  }

  if let Some(path) =
    timezone_config_path()
    && let Some(tz) =
      load_timezone_from_file(&path)
  {
    return tz;
  }

  parse_timezone(
    DEFAULT_PROJECT_TIMEZONE,
    "DEFAULT_PROJECT_TIMEZONE"
  )
  .unwrap_or(chrono_tz::UTC)
}

fn timezone_config_path()
-> Option<PathBuf> {
  if let Ok(raw) = std::env::var(
    TIMEZONE_CONFIG_ENV_VAR
  ) {
    let trimmed = raw.trim();
    if !trimmed.is_empty() {
      return Some(PathBuf::from(
        trimmed
      ));
    }
  }

  std::env::current_dir().ok().map(
    |dir| {
      dir.join(TIMEZONE_CONFIG_FILE)
    }
  )
}

fn load_timezone_from_file(
  path: &PathBuf
) -> Option<Tz> {
  if !path.exists() {
    tracing::debug!(
      file = %path.display(),
      "timezone config file not found"
    );
    return None;
  }

  let raw = match fs::read_to_string(
    path
  ) {
    | Ok(raw) => raw,
    | Err(err) => {
      tracing::error!(
        file = %path.display(),
        error = %err,
        "failed reading timezone config file"
      );
      return None;
    }
  };

  let parsed = match toml::from_str::<
    TimezoneConfig
  >(&raw)
  {
    | Ok(parsed) => parsed,
    | Err(err) => {
      tracing::error!(
        file = %path.display(),
        error = %err,
        "failed parsing timezone config file"
      );
      return None;
    }
  };

  let timezone =
    parsed.timezone.or_else(|| {
      parsed.time.and_then(|section| {
        section.timezone
      })
    });
  let Some(timezone) = timezone else {
    tracing::warn!(
      file = %path.display(),
      "timezone config had no timezone field"
    );
    return None;
  };

  parse_timezone(
    timezone.as_str(),
    &format!("file:{}", path.display())
  )
}

fn parse_timezone(
  raw: &str,
  source: &str
) -> Option<Tz> {
  if raw.trim().is_empty() {
    tracing::warn!(
      source,
      "timezone source was empty"
    );
    return None;
  }

  match parse_timezone_id(raw) {
    | Ok(tz) => {
      tracing::info!(
        source,
        timezone = %tz,
        "configured project timezone"
      );
      Some(tz)
    }
    | Err(err) => {
      tracing::error!(
        source,
        error = %err,
        "failed to parse timezone id"
      );
      None
    }
  }
}

fn to_utc_from_local(
  local_naive: NaiveDateTime,
  tz: &Tz,
  context: &str
) -> anyhow::Result<DateTime<Utc>> {
  match tz
    .from_local_datetime(&local_naive)
  {
    | LocalResult::Single(local_dt) => {
      Ok(local_dt.with_timezone(&Utc))
    }
    | LocalResult::Ambiguous(
      first,
      second
    ) => {
      tracing::warn!(
        context,
        first = %first,
        second = %second,
        "ambiguous local datetime; using earliest"
      );
      let chosen = if first <= second {
        first
      } else {
        second
      };
      Ok(chosen.with_timezone(&Utc))
    }
    | LocalResult::None => {
      Err(anyhow!(
        "local datetime does not \
         exist in timezone {tz}: \
         {context}"
      ))
    }
  }
}

fn local_midnight(
  date: NaiveDate,
  tz: &Tz,
  context: &str
) -> anyhow::Result<DateTime<Utc>> {
  let midnight = date
    .and_hms_opt(0, 0, 0)
    .ok_or_else(|| {
      anyhow!(
        "failed to construct \
         midnight for {date}"
      )
    })?;
  to_utc_from_local(
    midnight, tz, context
  )
}

/// Parses a date as the API and the
/// browser forms produce them. Returns
/// `None` for anything unrecognised.
pub fn parse_api_date(
  raw: &str,
  tz: &Tz
) -> Option<DateTime<Utc>> {
  let token = raw.trim();
  if token.is_empty() {
    return None;
  }

  if let Ok(dt) =
    DateTime::parse_from_rfc3339(token)
  {
    return Some(dt.with_timezone(&Utc));
  }

  for format in NAIVE_DATETIME_FORMATS {
    if let Ok(naive) =
      NaiveDateTime::parse_from_str(
        token, format
      )
    {
      return to_utc_from_local(
        naive, tz, token
      )
      .ok();
    }
  }

  NaiveDate::parse_from_str(
    token, "%Y-%m-%d"
  )
  .ok()
  .and_then(|date| {
    local_midnight(date, tz, token).ok()
  })
}

/// Reads a date field as it appears in
/// a JSON body: a string goes through
/// [`parse_api_date`], a number is epoch
/// milliseconds, anything else is `None`.
pub fn parse_api_date_value(
  value: &Value,
  tz: &Tz
) -> Option<DateTime<Utc>> {
  let parsed = match value {
    | Value::String(raw) => {
      parse_api_date(raw, tz)
    }
    | Value::Number(num) => {
      num.as_i64().and_then(
        DateTime::<Utc>::from_timestamp_millis
      )
    }
    | _ => None
  };

  if parsed.is_none() && !value.is_null()
  {
    tracing::trace!(raw = %value, "unparseable date value ignored");
  }
  parsed
}

/// Parses a user-entered due date:
/// `now`, `today`, `tomorrow`,
/// `yesterday`, weekday names, a clock
/// time, or an absolute date.
#[tracing::instrument(skip(now, tz), fields(input = input))]
pub fn parse_date_expr(
  input: &str,
  now: DateTime<Utc>,
  tz: &Tz
) -> anyhow::Result<DateTime<Utc>> {
  let token = input.trim();
  let lower =
    token.to_ascii_lowercase();
  let local_today =
    local_date(now, tz);

  match lower.as_str() {
    | "now" => return Ok(now),
    | "today" => {
      return local_midnight(
        local_today,
        tz,
        "today"
      );
    }
    | "tomorrow" => {
      let date = local_today
        .succ_opt()
        .unwrap_or(local_today);
      return local_midnight(
        date, tz, "tomorrow"
      );
    }
    | "yesterday" => {
      let date = local_today
        .pred_opt()
        .unwrap_or(local_today);
      return local_midnight(
        date,
        tz,
        "yesterday"
      );
    }
    | _ => {}
  }

  if let Some(target_weekday) =
    parse_weekday_name(&lower)
  {
    let target_date = next_weekday_date(
      local_today,
      target_weekday
    );
    return local_midnight(
      target_date,
      tz,
      "weekday-name"
    );
  }

  if let Some((hour, minute)) =
    parse_clock_time(token)
  {
    let local_now = now.with_timezone(tz);
    let mut day = local_today;
    let local_candidate = day
      .and_hms_opt(hour, minute, 0)
      .ok_or_else(|| {
        anyhow!(
          "failed to construct clock \
           time candidate"
        )
      })?;
    if local_candidate
      <= local_now.naive_local()
    {
      day = day
        .checked_add_signed(
          Duration::days(1)
        )
        .unwrap_or(day);
    }
    let candidate = day
      .and_hms_opt(hour, minute, 0)
      .ok_or_else(|| {
        anyhow!(
          "failed to construct clock \
           time"
        )
      })?;
    return to_utc_from_local(
      candidate,
      tz,
      "clock-time"
    );
  }

  parse_api_date(token, tz).ok_or_else(
    || {
      anyhow!(
        "unrecognized date \
         expression: {token}"
      )
    }
  )
}

fn parse_weekday_name(
  token: &str
) -> Option<Weekday> {
  match token {
    | "monday" | "mon" => {
      Some(Weekday::Mon)
    }
    | "tuesday" | "tue" | "tues" => {
      Some(Weekday::Tue)
    }
    | "wednesday" | "wed" => {
      Some(Weekday::Wed)
    }
    | "thursday" | "thu" | "thurs" => {
      Some(Weekday::Thu)
    }
    | "friday" | "fri" => {
      Some(Weekday::Fri)
    }
    | "saturday" | "sat" => {
      Some(Weekday::Sat)
    }
    | "sunday" | "sun" => {
      Some(Weekday::Sun)
    }
    | _ => None
  }
}

fn next_weekday_date(
  from: NaiveDate,
  target: Weekday
) -> NaiveDate {
  let from_idx = from
    .weekday()
    .num_days_from_monday()
    as i64;
  let target_idx = target
    .num_days_from_monday()
    as i64;
  let mut delta =
    (7 + target_idx - from_idx) % 7;
  if delta == 0 {
    delta = 7;
  }
  from
    .checked_add_signed(Duration::days(
      delta
    ))
    .unwrap_or(from)
}

fn parse_clock_time(
  token: &str
) -> Option<(u32, u32)> {
  static CLOCK_RE: OnceLock<
    Option<Regex>
  > = OnceLock::new();
  let clock_re = CLOCK_RE
    .get_or_init(|| {
      Regex::new(
        r"(?i)^(?P<hour>\d{1,2}):(?P<minute>\d{2})\s*(?P<ampm>[ap]m)?$",
      )
      .ok()
    })
    .as_ref()?;
  let captures =
    clock_re.captures(token.trim())?;

  let raw_hour = captures
    .name("hour")?
    .as_str()
    .parse::<u32>()
    .ok()?;
  let minute = captures
    .name("minute")?
    .as_str()
    .parse::<u32>()
    .ok()?;
  if minute > 59 {
    return None;
  }

  let hour = if let Some(ampm_match) =
    captures.name("ampm")
  {
    if raw_hour == 0 || raw_hour > 12 {
      return None;
    }
    match ampm_match
      .as_str()
      .to_ascii_lowercase()
      .as_str()
    {
      | "am" => raw_hour % 12,
      | "pm" => raw_hour % 12 + 12,
      | _ => return None
    }
  } else {
    if raw_hour > 23 {
      return None;
    }
    raw_hour
  };

  Some((hour, minute))
}

pub mod api_date_serde {
  use chrono::{
    DateTime,
    SecondsFormat,
    Utc
  };
  use serde::Serializer;

  pub fn serialize<S>(
    dt: &DateTime<Utc>,
    serializer: S
  ) -> Result<S::Ok, S::Error>
  where
    S: Serializer
  {
    serializer.serialize_str(
      &dt.to_rfc3339_opts(
        SecondsFormat::Millis,
        true
      )
    )
  }

  pub mod option {
    use chrono::{
      DateTime,
      Utc
    };
    use serde::Serializer;

    pub fn serialize<S>(
      dt: &Option<DateTime<Utc>>,
      serializer: S
    ) -> Result<S::Ok, S::Error>
    where
      S: Serializer
    {
      match dt {
        | Some(value) => {
          super::serialize(
            value, serializer
          )
        }
        | None => {
          serializer.serialize_none()
        }
      }
    }
  }

  /// Never fails: values that are not a
  /// recognisable date become `None`.
  pub mod lenient {
    use chrono::{
      DateTime,
      Utc
    };
    use serde::{
      Deserialize,
      Deserializer,
      Serializer
    };
    use serde_json::Value;

    use crate::datetime::{
      parse_api_date_value,
      project_timezone
    };

    pub fn serialize<S>(
      dt: &Option<DateTime<Utc>>,
      serializer: S
    ) -> Result<S::Ok, S::Error>
    where
      S: Serializer
    {
      super::option::serialize(
        dt, serializer
      )
    }

    pub fn deserialize<'de, D>(
      deserializer: D
    ) -> Result<
      Option<DateTime<Utc>>,
      D::Error
    >
    where
      D: Deserializer<'de>
    {
      let value =
        Value::deserialize(deserializer)?;
      Ok(parse_api_date_value(
        &value,
        project_timezone()
      ))
    }
  }
}

#[cfg(test)]
mod tests {
  use chrono::{
    TimeZone,
    Utc
  };

  use super::{
    format_local_date,
    parse_api_date,
    parse_date_expr,
    parse_timezone_id
  };

  #[test]
  fn api_dates_accept_rfc3339_and_form_values()
   {
    let tz = chrono_tz::UTC;
    assert_eq!(
      parse_api_date(
        "2026-03-01T10:30:00.000Z",
        &tz
      ),
      Some(
        Utc
          .with_ymd_and_hms(
            2026, 3, 1, 10, 30, 0
          )
          .unwrap()
      )
    );
    assert_eq!(
      parse_api_date(
        "2026-03-01T10:30",
        &tz
      ),
      Some(
        Utc
          .with_ymd_and_hms(
            2026, 3, 1, 10, 30, 0
          )
          .unwrap()
      )
    );
    assert_eq!(
      parse_api_date("garbage", &tz),
      None
    );
    assert_eq!(
      parse_api_date("  ", &tz),
      None
    );
  }

  #[test]
  fn date_only_values_are_local_midnight()
   {
    let tz = parse_timezone_id(
      "America/Mexico_City"
    )
    .unwrap();
    let parsed =
      parse_api_date("2026-03-01", &tz)
        .unwrap();
    assert_eq!(
      parsed,
      Utc
        .with_ymd_and_hms(
          2026, 3, 1, 6, 0, 0
        )
        .unwrap()
    );
    assert_eq!(
      format_local_date(parsed, &tz),
      "2026-03-01"
    );
  }

  #[test]
  fn parses_relative_keywords() {
    let tz = chrono_tz::UTC;
    let now = Utc
      .with_ymd_and_hms(
        2026, 2, 17, 12, 0, 0
      )
      .unwrap();
    let tomorrow = parse_date_expr(
      "tomorrow", now, &tz
    )
    .unwrap();
    assert_eq!(
      format_local_date(tomorrow, &tz),
      "2026-02-18"
    );
    let friday = parse_date_expr(
      "friday", now, &tz
    )
    .unwrap();
    assert_eq!(
      format_local_date(friday, &tz),
      "2026-02-20"
    );
  }

  #[test]
  fn clock_time_rolls_to_next_day() {
    let tz = chrono_tz::UTC;
    let now = Utc
      .with_ymd_and_hms(
        2026, 2, 17, 23, 0, 0
      )
      .unwrap();
    let parsed = parse_date_expr(
      "3:23pm", now, &tz
    )
    .unwrap();
    assert_eq!(
      parsed,
      Utc
        .with_ymd_and_hms(
          2026, 2, 18, 15, 23, 0
        )
        .unwrap()
    );
  }

  #[test]
  fn rejects_unknown_expression() {
    let now = Utc
      .with_ymd_and_hms(
        2026, 2, 17, 12, 0, 0
      )
      .unwrap();
    assert!(
      parse_date_expr(
        "someday",
        now,
        &chrono_tz::UTC
      )
      .is_err()
    );
  }
}
