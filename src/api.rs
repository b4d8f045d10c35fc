//! HTTP API: trigger analysis runs and poll their reports.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{RwLock, Semaphore};
use tracing::{error, info};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::{PipelineConfig, RunRequest};
use crate::error::{PipelineError, PipelineResult};
use crate::models::PipelineReport;
use crate::pipeline::Pipeline;

pub struct AppState {
    pub config: PipelineConfig,
    pub tasks: RwLock<HashMap<String, TaskResult>>,
    /// One permit per pipeline run allowed to hold a browser
    pub run_slots: Semaphore,
}

impl AppState {
    pub fn new(config: PipelineConfig) -> Self {
        let run_slots = Semaphore::new(config.max_concurrent_runs.max(1));
        Self {
            config,
            tasks: RwLock::new(HashMap::new()),
            run_slots,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AnalyzeRequest {
    /// Video page to scrape
    pub video_url: String,
    /// Overrides the server's configured API key
    pub api_key: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AnalyzeResponse {
    pub task_id: String,
    pub status: TaskStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TaskResult {
    pub task_id: String,
    pub video_url: String,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub report: Option<PipelineReport>,
    pub error: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TaskSummary {
    pub task_id: String,
    pub video_url: String,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
}

impl From<&TaskResult> for TaskSummary {
    fn from(task: &TaskResult) -> Self {
        Self {
            task_id: task.task_id.clone(),
            video_url: task.video_url.clone(),
            status: task.status,
            created_at: task.created_at,
        }
    }
}

#[utoipa::path(
    post,
    path = "/analyze",
    request_body = AnalyzeRequest,
    responses(
        (status = 200, description = "Analysis queued", body = AnalyzeResponse),
        (status = 400, description = "Missing URL or API key")
    ),
    tag = "analysis"
)]
pub async fn trigger_analysis(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<AnalyzeRequest>,
) -> Result<Json<AnalyzeResponse>, (StatusCode, String)> {
    let api_key = payload
        .api_key
        .filter(|k| !k.trim().is_empty())
        .unwrap_or_else(|| state.config.completion.api_key.clone());
    let request = RunRequest::new(payload.video_url.trim(), api_key);
    request
        .validate()
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;

    let task_id = Uuid::new_v4().to_string();
    state.tasks.write().await.insert(
        task_id.clone(),
        TaskResult {
            task_id: task_id.clone(),
            video_url: request.video_url.clone(),
            status: TaskStatus::Queued,
            created_at: Utc::now(),
            report: None,
            error: None,
        },
    );
    info!("📥 Queued analysis {} for {}", task_id, request.video_url);

    let config = state.config.clone().with_api_key(request.api_key);
    let video_url = request.video_url;
    let job = async move { Pipeline::from_config(config)?.run(&video_url).await };
    tokio::spawn(run_task(state.clone(), task_id.clone(), job));

    Ok(Json(AnalyzeResponse {
        task_id,
        status: TaskStatus::Queued,
    }))
}

/// Waits for a free run slot, then drives `job` to completion on its own task
/// so a panic still ends in `Failed`.
async fn run_task<F>(state: Arc<AppState>, task_id: String, job: F)
where
    F: Future<Output = PipelineResult<PipelineReport>> + Send + 'static,
{
    let _slot = match state.run_slots.acquire().await {
        Ok(permit) => permit,
        Err(_) => {
            let closed = PipelineError::Aborted("run limiter closed".to_string());
            finish_task(&state, &task_id, Err(closed)).await;
            return;
        }
    };
    set_status(&state, &task_id, TaskStatus::Running).await;

    let result = match tokio::spawn(job).await {
        Ok(result) => result,
        Err(e) => {
            error!("💥 Analysis {} crashed: {}", task_id, e);
            Err(PipelineError::Aborted(e.to_string()))
        }
    };
    finish_task(&state, &task_id, result).await;
}

async fn set_status(state: &AppState, task_id: &str, status: TaskStatus) {
    if let Some(task) = state.tasks.write().await.get_mut(task_id) {
        task.status = status;
    }
}

async fn finish_task(state: &AppState, task_id: &str, result: PipelineResult<PipelineReport>) {
    if let Some(task) = state.tasks.write().await.get_mut(task_id) {
        match result {
            Ok(report) => {
                task.status = TaskStatus::Completed;
                task.report = Some(report);
            }
            Err(e) => {
                task.status = TaskStatus::Failed;
                task.error = Some(e.to_string());
            }
        }
    }
}

#[utoipa::path(
    get,
    path = "/analyze/{task_id}",
    params(("task_id" = String, Path, description = "Task id returned by POST /analyze")),
    responses(
        (status = 200, description = "Task state and report", body = TaskResult),
        (status = 404, description = "Unknown task")
    ),
    tag = "analysis"
)]
pub async fn get_analysis_status(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<String>,
) -> Result<Json<TaskResult>, StatusCode> {
    state
        .tasks
        .read()
        .await
        .get(&task_id)
        .cloned()
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

#[utoipa::path(
    get,
    path = "/tasks",
    responses((status = 200, description = "All runs, newest first", body = [TaskSummary])),
    tag = "analysis"
)]
pub async fn list_tasks(State(state): State<Arc<AppState>>) -> Json<Vec<TaskSummary>> {
    let tasks = state.tasks.read().await;
    let mut summaries: Vec<TaskSummary> = tasks.values().map(TaskSummary::from).collect();
    summaries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Json(summaries)
}

#[utoipa::path(get, path = "/health", responses((status = 200, description = "Service is up")), tag = "analysis")]
pub async fn health() -> &'static str {
    "ok"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SentimentCounts;
    use std::time::Duration;

    fn state() -> Arc<AppState> {
        Arc::new(AppState::new(PipelineConfig::default()))
    }

    async fn insert(state: &AppState, id: &str) {
        state.tasks.write().await.insert(
            id.to_string(),
            TaskResult {
                task_id: id.to_string(),
                video_url: "https://youtu.be/x".to_string(),
                status: TaskStatus::Queued,
                created_at: Utc::now(),
                report: None,
                error: None,
            },
        );
    }

    fn empty_report() -> PipelineReport {
        PipelineReport {
            video_url: "https://youtu.be/x".to_string(),
            analyzed_at: Utc::now(),
            extracted: 0,
            translated: 0,
            fully_loaded: true,
            results: vec![],
            counts: SentimentCounts::default(),
            dropped: 0,
        }
    }

    async fn status_of(state: &AppState, id: &str) -> TaskStatus {
        state.tasks.read().await[id].status
    }

    async fn crashing_run() -> PipelineResult<PipelineReport> {
        panic!("chrome went away")
    }

    #[tokio::test]
    async fn test_trigger_rejects_missing_api_key() {
        let result = trigger_analysis(
            State(state()),
            Json(AnalyzeRequest {
                video_url: "https://youtu.be/x".to_string(),
                api_key: Some("   ".to_string()),
            }),
        )
        .await;
        let (status, message) = result.unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(message.contains("API key"));
    }

    #[tokio::test]
    async fn test_unknown_task_is_404() {
        let result = get_analysis_status(State(state()), Path("nope".to_string())).await;
        assert_eq!(result.unwrap_err(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_finish_task_records_outcome() {
        let state = state();
        insert(&state, "ok").await;
        insert(&state, "bad").await;

        finish_task(&state, "ok", Ok(empty_report())).await;
        finish_task(
            &state,
            "bad",
            Err(PipelineError::Analysis(anyhow::anyhow!("No translated comments found"))),
        )
        .await;

        let Json(ok) = get_analysis_status(State(state.clone()), Path("ok".to_string())).await.unwrap();
        assert_eq!(ok.status, TaskStatus::Completed);
        assert!(ok.report.is_some());

        let Json(bad) = get_analysis_status(State(state.clone()), Path("bad".to_string())).await.unwrap();
        assert_eq!(bad.status, TaskStatus::Failed);
        assert_eq!(
            bad.error.as_deref(),
            Some("Error analyzing sentiment: No translated comments found")
        );

        let Json(all) = list_tasks(State(state)).await;
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn test_second_run_stays_queued_while_slot_is_taken() {
        let state = state();
        assert_eq!(state.config.max_concurrent_runs, 1);
        insert(&state, "first").await;
        insert(&state, "second").await;

        let (release, gate) = tokio::sync::oneshot::channel::<()>();
        let first = tokio::spawn(run_task(state.clone(), "first".to_string(), async move {
            let _ = gate.await;
            Ok::<_, PipelineError>(empty_report())
        }));
        tokio::time::sleep(Duration::from_millis(50)).await;
        let second = tokio::spawn(run_task(state.clone(), "second".to_string(), async {
            Ok::<_, PipelineError>(empty_report())
        }));
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(status_of(&state, "first").await, TaskStatus::Running);
        assert_eq!(status_of(&state, "second").await, TaskStatus::Queued);

        release.send(()).unwrap();
        first.await.unwrap();
        second.await.unwrap();
        assert_eq!(status_of(&state, "first").await, TaskStatus::Completed);
        assert_eq!(status_of(&state, "second").await, TaskStatus::Completed);
    }

    #[tokio::test]
    async fn test_panicking_run_is_marked_failed() {
        let state = state();
        insert(&state, "boom").await;

        run_task(state.clone(), "boom".to_string(), crashing_run()).await;

        let Json(task) = get_analysis_status(State(state.clone()), Path("boom".to_string())).await.unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
        assert!(task.error.unwrap().starts_with("Analysis run aborted:"));

        // The slot is released for the next run
        assert_eq!(state.run_slots.available_permits(), 1);
    }
}
