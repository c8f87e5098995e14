use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::datetime::api_date_serde;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    pub const ALL: [Priority; 3] = [Priority::Low, Priority::Medium, Priority::High];

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "Low",
            Priority::Medium => "Medium",
            Priority::High => "High",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" | "l" => Ok(Priority::Low),
            "medium" | "med" | "m" => Ok(Priority::Medium),
            "high" | "h" => Ok(Priority::High),
            other => Err(anyhow!("invalid priority: {other}")),
        }
    }
}

impl<'de> Deserialize<'de> for Priority {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    #[serde(default, alias = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    #[serde(alias = "_id")]
    pub id: String,

    pub title: String,

    #[serde(default, deserialize_with = "null_as_empty")]
    pub description: String,

    #[serde(default, with = "api_date_serde::lenient")]
    pub due_date: Option<DateTime<Utc>>,

    pub priority: Priority,

    #[serde(default, deserialize_with = "completed_flag")]
    pub completed: bool,

    #[serde(default, with = "api_date_serde::lenient")]
    pub created_at: Option<DateTime<Utc>>,

    #[serde(default, with = "api_date_serde::lenient")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn is_pending(&self) -> bool {
        !self.completed
    }

    /// Checks the invariants serde cannot express.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.id.trim().is_empty() {
            return Err(anyhow!("task record has an empty id"));
        }
        if self.title.trim().is_empty() {
            return Err(anyhow!("task {} has an empty title", self.id));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TaskInput {
    pub title: String,
    pub description: String,
    #[serde(with = "api_date_serde::option")]
    pub due_date: Option<DateTime<Utc>>,
    pub priority: Priority,
    pub completed: bool,
}

impl TaskInput {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: String::new(),
            due_date: None,
            priority: Priority::Medium,
            completed: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TaskPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        with = "api_date_serde::option"
    )]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
}

impl TaskPatch {
    pub fn completion(completed: bool) -> Self {
        Self {
            completed: Some(completed),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.due_date.is_none()
            && self.priority.is_none()
            && self.completed.is_none()
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

// The old add-task form posted "Yes"/"No" strings instead of booleans.
fn completed_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    match value {
        serde_json::Value::Bool(flag) => Ok(flag),
        serde_json::Value::Null => Ok(false),
        serde_json::Value::String(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "yes" | "true" | "1" | "done" => Ok(true),
            "no" | "false" | "0" | "" => Ok(false),
            other => Err(serde::de::Error::custom(format!(
                "invalid completed flag: {other}"
            ))),
        },
        other => Err(serde::de::Error::custom(format!(
            "invalid completed flag: {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    use super::{Priority, Task, TaskInput, TaskPatch};

    #[test]
    fn decodes_backend_record_shape() {
        let task: Task = serde_json::from_value(json!({
            "_id": "665f1c2e9b1d",
            "title": "Ship release",
            "description": "tag and publish",
            "dueDate": "2026-03-01T10:30:00.000Z",
            "priority": "High",
            "completed": false,
            "createdAt": "2026-02-27T08:00:00Z",
            "__v": 0
        }))
        .expect("decode task");

        assert_eq!(task.id, "665f1c2e9b1d");
        assert_eq!(task.priority, Priority::High);
        assert_eq!(
            task.due_date,
            Some(Utc.with_ymd_and_hms(2026, 3, 1, 10, 30, 0).unwrap())
        );
        assert!(task.is_pending());
        assert!(task.validate().is_ok());
    }

    #[test]
    fn malformed_due_date_decodes_as_none() {
        let task: Task = serde_json::from_value(json!({
            "id": "a1",
            "title": "x",
            "dueDate": "not a date",
            "priority": "low",
            "completed": "Yes",
            "createdAt": null
        }))
        .expect("decode task");

        assert_eq!(task.due_date, None);
        assert_eq!(task.created_at, None);
        assert_eq!(task.priority, Priority::Low);
        assert!(task.completed);
        assert_eq!(task.description, "");
    }

    #[test]
    fn unknown_priority_is_rejected() {
        let result = serde_json::from_value::<Task>(json!({
            "id": "a1",
            "title": "x",
            "priority": "urgent"
        }));
        assert!(result.is_err());
    }

    #[test]
    fn blank_title_fails_validation() {
        let task: Task = serde_json::from_value(json!({
            "id": "a1",
            "title": "   ",
            "priority": "Medium"
        }))
        .expect("decode task");
        assert!(task.validate().is_err());
    }

    #[test]
    fn input_serializes_camel_case_with_defaults() {
        let input = TaskInput::new("Write notes");
        let value = serde_json::to_value(&input).expect("serialize");
        assert_eq!(
            value,
            json!({
                "title": "Write notes",
                "description": "",
                "dueDate": null,
                "priority": "Medium",
                "completed": false
            })
        );
    }

    #[test]
    fn patch_only_sends_present_fields() {
        let value = serde_json::to_value(TaskPatch::completion(true)).expect("serialize");
        assert_eq!(value, json!({ "completed": true }));
        assert!(TaskPatch::default().is_empty());
    }
}
