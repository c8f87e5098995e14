//! Normalizes the API's response shapes into typed values.
//!
//! The backend answers list requests with either a bare array or
//! `{ "tasks": [...] }`, and single-record requests with either the record
//! or `{ "task": {...} }`. Everything past this module sees `Vec<Task>`,
//! `Task` or `User`.

use chrono_tz::Tz;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::datetime::parse_api_date_value;
use crate::error::{ApiError, ApiResult};
use crate::session::Session;
use crate::task::{Task, User};

/// Decodes a task list, dropping individual records that fail validation.
pub fn normalize_task_list(body: Value, tz: &Tz) -> ApiResult<Vec<Task>> {
    let items = match body {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("tasks") {
            Some(Value::Array(items)) => items,
            Some(Value::Null) => Vec::new(),
            Some(other) => {
                return Err(ApiError::InvalidResponse(format!(
                    "`tasks` field is not an array: {other}"
                )));
            }
            None => {
                return Err(ApiError::InvalidResponse(
                    "task list response has neither an array nor a `tasks` field".to_string(),
                ));
            }
        },
        other => {
            return Err(ApiError::InvalidResponse(format!(
                "unexpected task list payload: {other}"
            )));
        }
    };

    let received = items.len();
    let tasks: Vec<Task> = items
        .into_iter()
        .enumerate()
        .filter_map(|(index, item)| match decode_task(item, tz) {
            Ok(task) => Some(task),
            Err(err) => {
                warn!(index, error = %err, "dropping invalid task record");
                None
            }
        })
        .collect();

    debug!(received, kept = tasks.len(), "normalized task list");
    Ok(tasks)
}

/// Decodes one task, unwrapping a `{ "task": ... }` envelope if present.
pub fn normalize_task(body: Value, tz: &Tz) -> ApiResult<Task> {
    let record = unwrap_envelope(body, "task");
    decode_task(record, tz)
}

pub fn normalize_user(body: Value) -> ApiResult<User> {
    let record = unwrap_envelope(body, "user");
    serde_json::from_value(record).map_err(|source| ApiError::Decode {
        context: "user",
        source,
    })
}

/// Reads the optional `message` field the backend attaches to mutations.
pub fn response_message(body: &Value) -> Option<String> {
    body.get("message")
        .and_then(Value::as_str)
        .map(str::to_string)
}

#[derive(Debug, Deserialize)]
struct LoginBody {
    token: String,
    #[serde(default)]
    user: Option<User>,
    #[serde(default, alias = "_id")]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    email: Option<String>,
}

/// Builds a session from a login response. Accepts `{token, user}` as well
/// as the flat `{token, name, email}` variant.
pub fn normalize_login(body: Value) -> ApiResult<Session> {
    let login: LoginBody = serde_json::from_value(body).map_err(|source| ApiError::Decode {
        context: "login response",
        source,
    })?;

    if login.token.trim().is_empty() {
        return Err(ApiError::InvalidResponse(
            "login response carried an empty token".to_string(),
        ));
    }

    let user = login.user.unwrap_or(User {
        id: login.id,
        name: login.name.unwrap_or_default(),
        email: login.email.unwrap_or_default(),
    });
    Ok(Session::new(login.token, user))
}

fn unwrap_envelope(body: Value, key: &str) -> Value {
    match body {
        Value::Object(mut map) if map.get(key).is_some_and(Value::is_object) => {
            map.remove(key).unwrap_or(Value::Null)
        }
        other => other,
    }
}

// Offset-less dates are read in `tz`, the zone the filters compare in.
fn decode_task(record: Value, tz: &Tz) -> ApiResult<Task> {
    let date = |key: &str| {
        record
            .get(key)
            .and_then(|value| parse_api_date_value(value, tz))
    };
    let due_date = date("dueDate");
    let created_at = date("createdAt");
    let updated_at = date("updatedAt");

    let mut task: Task = serde_json::from_value(record)
        .map_err(|err| ApiError::InvalidResponse(format!("invalid task record: {err}")))?;
    task.validate()
        .map_err(|err| ApiError::InvalidResponse(err.to_string()))?;

    task.due_date = due_date;
    task.created_at = created_at;
    task.updated_at = updated_at;
    Ok(task)
}
