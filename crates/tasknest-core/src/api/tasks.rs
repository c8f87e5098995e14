use reqwest::Method;
use tracing::{debug, info, instrument};

use super::client::ApiClient;
use super::schema::{normalize_task, normalize_task_list, response_message};
use crate::error::{ApiError, ApiResult};
use crate::snapshot::TaskBoard;
use crate::task::{Task, TaskInput, TaskPatch};

const TASK_COLLECTION: [&str; 2] = ["task", "gp"];

impl ApiClient {
    #[instrument(skip(self))]
    pub async fn list_tasks(&self) -> ApiResult<Vec<Task>> {
        let request = self.request(Method::GET, &TASK_COLLECTION)?;
        let body = self.send_json(request, "task list").await?;
        normalize_task_list(body, self.timezone())
    }

    #[instrument(skip(self, input), fields(title_len = input.title.len(), priority = %input.priority))]
    pub async fn create_task(&self, input: &TaskInput) -> ApiResult<Task> {
        if input.title.trim().is_empty() {
            return Err(ApiError::InvalidInput("task title must not be empty".to_string()));
        }

        let request = self.request(Method::POST, &TASK_COLLECTION)?.json(input);
        let body = self.send_json(request, "created task").await?;
        if let Some(message) = response_message(&body) {
            info!(message = %message, "task created");
        }
        normalize_task(body, self.timezone())
    }

    #[instrument(skip(self))]
    pub async fn get_task(&self, id: &str) -> ApiResult<Task> {
        let request = self.request(Method::GET, &task_path(id)?)?;
        let body = self.send_json(request, "task").await?;
        normalize_task(body, self.timezone())
    }

    #[instrument(skip(self, patch))]
    pub async fn update_task(&self, id: &str, patch: &TaskPatch) -> ApiResult<Task> {
        if patch.is_empty() {
            return Err(ApiError::InvalidInput("update carries no changes".to_string()));
        }
        if patch
            .title
            .as_deref()
            .is_some_and(|title| title.trim().is_empty())
        {
            return Err(ApiError::InvalidInput("task title must not be empty".to_string()));
        }

        let request = self.request(Method::PUT, &task_path(id)?)?.json(patch);
        let body = self.send_json(request, "updated task").await?;
        normalize_task(body, self.timezone())
    }

    /// Toggles completion without touching any other field.
    pub async fn set_completed(&self, id: &str, completed: bool) -> ApiResult<Task> {
        self.update_task(id, &TaskPatch::completion(completed)).await
    }

    #[instrument(skip(self))]
    pub async fn delete_task(&self, id: &str) -> ApiResult<()> {
        let request = self.request(Method::DELETE, &task_path(id)?)?;
        self.send_unit(request, "task deletion").await
    }

    /// Fetches the task list and offers it to the board. Returns whether the
    /// result was installed; a fetch overtaken by a newer one is dropped.
    #[instrument(skip(self, board))]
    pub async fn refresh_board(&self, board: &TaskBoard) -> ApiResult<bool> {
        let ticket = board.begin_fetch();
        let tasks = self.list_tasks().await?;
        let installed = board.complete_fetch(ticket, tasks);
        debug!(installed, "board refresh finished");
        Ok(installed)
    }
}

fn task_path(id: &str) -> ApiResult<[&str; 3]> {
    let id = id.trim();
    if id.is_empty() {
        return Err(ApiError::InvalidInput("task id must not be empty".to_string()));
    }
    Ok(["task", id, "gp"])
}

#[cfg(test)]
mod tests {
    use super::task_path;

    #[test]
    fn task_path_trims_and_rejects_blank_ids() {
        assert_eq!(task_path(" abc ").unwrap(), ["task", "abc", "gp"]);
        assert!(task_path("   ").is_err());
    }
}
