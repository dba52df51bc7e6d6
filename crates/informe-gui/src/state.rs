use std::convert::Infallible;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use axum::response::sse::Event;
use dashmap::DashMap;
use informe_core::{
    PipelineComponents, ReportOutcome, SessionOptions, TokenUsage, pdf_filename, render_pdf,
    run_report_session,
};
use serde::Serialize;
use tokio::sync::{Semaphore, broadcast};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{self as stream, Stream, StreamExt};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::error::AppError;

#[derive(Clone)]
pub struct AppState {
    report_service: Option<Arc<ReportService>>,
    auth_token: Option<Arc<String>>,
}

impl AppState {
    pub fn new(config: &AppConfig) -> Self {
        let report_service = config.pipeline.as_ref().map(|pipeline| {
            Arc::new(ReportService::new(
                PipelineComponents::from_config(pipeline),
                config.max_concurrency,
                pipeline.step_timeout,
            ))
        });

        Self {
            report_service,
            auth_token: config
                .auth_token
                .as_ref()
                .map(|token| Arc::new(token.to_string())),
        }
    }

    /// Build a state around externally supplied pipeline components.
    /// Used by tests to substitute stub model/lookup implementations.
    pub fn with_pipeline(
        config: &AppConfig,
        components: PipelineComponents,
        timeout: Duration,
    ) -> Self {
        Self {
            report_service: Some(Arc::new(ReportService::new(
                components,
                config.max_concurrency,
                timeout,
            ))),
            auth_token: config
                .auth_token
                .as_ref()
                .map(|token| Arc::new(token.to_string())),
        }
    }

    pub fn ready(&self) -> bool {
        self.report_service.is_some()
    }

    pub fn report_service(&self) -> Result<Arc<ReportService>, AppError> {
        self.report_service.clone().ok_or_else(AppError::not_ready)
    }

    pub fn metrics(&self) -> Option<ServiceMetrics> {
        self.report_service.as_ref().map(|service| service.metrics())
    }

    pub fn auth_token(&self) -> Option<Arc<String>> {
        self.auth_token.clone()
    }
}

pub struct ReportService {
    components: PipelineComponents,
    semaphore: Arc<Semaphore>,
    max_concurrency: usize,
    timeout: Duration,
    reports: Arc<DashMap<String, ReportRecord>>,
    streams: Arc<DashMap<String, broadcast::Sender<ReportEvent>>>,
}

impl ReportService {
    pub fn new(components: PipelineComponents, max_concurrency: usize, timeout: Duration) -> Self {
        let max_concurrency = max_concurrency.max(1);
        Self {
            components,
            semaphore: Arc::new(Semaphore::new(max_concurrency)),
            max_concurrency,
            timeout,
            reports: Arc::new(DashMap::new()),
            streams: Arc::new(DashMap::new()),
        }
    }

    /// Spawn one pipeline run and return its session id immediately.
    ///
    /// Concurrent runs are bounded by the semaphore; each run is fully
    /// independent and ends in exactly one of the Completed, Failed or
    /// TimedOut states.
    pub fn start_report(&self, request: ReportRequest) -> String {
        let session_id = request
            .session_id
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let topic = request.topic;

        let sender = self
            .streams
            .entry(session_id.clone())
            .or_insert_with(|| {
                let (tx, _rx) = broadcast::channel(32);
                tx
            })
            .clone();
        let _ = sender.send(ReportEvent::started());
        self.reports.insert(
            session_id.clone(),
            ReportRecord::Running {
                topic: topic.clone(),
            },
        );

        let components = self.components.clone();
        let semaphore = self.semaphore.clone();
        let timeout = self.timeout;
        let reports = self.reports.clone();
        let streams = self.streams.clone();
        let session_id_for_task = session_id.clone();

        tokio::spawn(async move {
            let permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(err) => {
                    record_failure(
                        &reports,
                        &streams,
                        &session_id_for_task,
                        &topic,
                        err.to_string(),
                        false,
                    );
                    return;
                }
            };

            let options = SessionOptions::new(&topic)
                .with_session_id(session_id_for_task.clone())
                .with_timeout(timeout);

            let result = run_report_session(&components, options).await;
            drop(permit);

            match result {
                Ok(outcome) => {
                    info!(session_id = %session_id_for_task, "report completed");
                    let event = ReportEvent::completed(&outcome);
                    reports.insert(
                        session_id_for_task.clone(),
                        ReportRecord::Completed {
                            outcome: Arc::new(outcome),
                            event: event.clone(),
                        },
                    );
                    broadcast(&streams, &session_id_for_task, event);
                }
                Err(err) if err.is_timeout() => {
                    warn!(session_id = %session_id_for_task, error = %err, "report timed out");
                    record_failure(
                        &reports,
                        &streams,
                        &session_id_for_task,
                        &topic,
                        err.to_string(),
                        true,
                    );
                }
                Err(err) => {
                    error!(session_id = %session_id_for_task, error = %err, "report failed");
                    record_failure(
                        &reports,
                        &streams,
                        &session_id_for_task,
                        &topic,
                        err.to_string(),
                        false,
                    );
                }
            }
        });

        session_id
    }

    pub fn status(&self, session_id: &str) -> Option<ReportStatus> {
        self.reports
            .get(session_id)
            .map(|record| record.value().to_status(session_id))
    }

    pub fn outcome(&self, session_id: &str) -> Option<Arc<ReportOutcome>> {
        self.reports
            .get(session_id)
            .and_then(|record| match record.value() {
                ReportRecord::Completed { outcome, .. } => Some(outcome.clone()),
                _ => None,
            })
    }

    /// PDF bytes plus download filename for a completed report.
    pub fn document(&self, session_id: &str) -> Option<(String, Vec<u8>)> {
        self.outcome(session_id)
            .map(|outcome| (pdf_filename(&outcome.topic), render_pdf(&outcome.text)))
    }

    pub fn list_reports(&self) -> Vec<ReportStatus> {
        self.reports
            .iter()
            .map(|entry| entry.value().to_status(entry.key()))
            .collect()
    }

    pub fn metrics(&self) -> ServiceMetrics {
        let running = self
            .reports
            .iter()
            .filter(|entry| matches!(entry.value(), ReportRecord::Running { .. }))
            .count();

        ServiceMetrics {
            max_concurrency: self.max_concurrency,
            available_permits: self.semaphore.available_permits(),
            running_reports: running,
            total_reports: self.reports.len(),
        }
    }

    pub fn event_stream(&self, session_id: &str) -> Option<SseStream> {
        if let Some(record) = self.reports.get(session_id) {
            match record.value() {
                ReportRecord::Completed { event, .. }
                | ReportRecord::Failed { event, .. }
                | ReportRecord::TimedOut { event, .. } => {
                    let event = event.clone().into_sse_event();
                    let stream = stream::iter(vec![Result::<Event, Infallible>::Ok(event)]);
                    return Some(Box::pin(stream));
                }
                ReportRecord::Running { .. } => {}
            }
        }

        self.streams.get(session_id).map(|sender| {
            let rx = sender.subscribe();
            let stream = BroadcastStream::new(rx).filter_map(|event| match event {
                Ok(event) => Some(Result::<Event, Infallible>::Ok(event.into_sse_event())),
                Err(err) => {
                    warn!(error = %err, "report event stream closed");
                    None
                }
            });
            Box::pin(stream) as SseStream
        })
    }
}

fn record_failure(
    reports: &DashMap<String, ReportRecord>,
    streams: &DashMap<String, broadcast::Sender<ReportEvent>>,
    session_id: &str,
    topic: &str,
    message: String,
    timed_out: bool,
) {
    let event = if timed_out {
        ReportEvent::timed_out(&message)
    } else {
        ReportEvent::error(&message)
    };

    let record = if timed_out {
        ReportRecord::TimedOut {
            topic: topic.to_string(),
            error: message,
            event: event.clone(),
        }
    } else {
        ReportRecord::Failed {
            topic: topic.to_string(),
            error: message,
            event: event.clone(),
        }
    };

    reports.insert(session_id.to_string(), record);
    broadcast(streams, session_id, event);
}

fn broadcast(
    streams: &DashMap<String, broadcast::Sender<ReportEvent>>,
    session_id: &str,
    event: ReportEvent,
) {
    if let Some(sender) = streams.get(session_id) {
        let _ = sender.send(event);
    }
    streams.remove(session_id);
}

pub type SseStream = Pin<Box<dyn Stream<Item = Result<Event, Infallible>> + Send>>;

#[derive(Debug)]
pub enum ReportRecord {
    Running {
        topic: String,
    },
    Completed {
        outcome: Arc<ReportOutcome>,
        event: ReportEvent,
    },
    Failed {
        topic: String,
        error: String,
        event: ReportEvent,
    },
    TimedOut {
        topic: String,
        error: String,
        event: ReportEvent,
    },
}

impl ReportRecord {
    fn to_status(&self, session_id: &str) -> ReportStatus {
        match self {
            Self::Running { topic } => ReportStatus {
                session_id: session_id.to_string(),
                topic: topic.clone(),
                state: ReportState::Running,
                text: None,
                usage: None,
                error: None,
            },
            Self::Completed { outcome, .. } => ReportStatus {
                session_id: session_id.to_string(),
                topic: outcome.topic.clone(),
                state: ReportState::Completed,
                text: Some(outcome.text.clone()),
                usage: outcome.usage,
                error: None,
            },
            Self::Failed { topic, error, .. } => ReportStatus {
                session_id: session_id.to_string(),
                topic: topic.clone(),
                state: ReportState::Failed,
                text: None,
                usage: None,
                error: Some(error.clone()),
            },
            Self::TimedOut { topic, error, .. } => ReportStatus {
                session_id: session_id.to_string(),
                topic: topic.clone(),
                state: ReportState::TimedOut,
                text: None,
                usage: None,
                error: Some(error.clone()),
            },
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportState {
    Running,
    Completed,
    Failed,
    TimedOut,
}

#[derive(Clone, Debug, Serialize)]
pub struct ReportStatus {
    pub session_id: String,
    pub topic: String,
    pub state: ReportState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Clone, Copy, Debug, Serialize)]
pub struct ServiceMetrics {
    pub max_concurrency: usize,
    pub available_permits: usize,
    pub running_reports: usize,
    pub total_reports: usize,
}

#[derive(Clone, Debug, Serialize)]
pub struct ReportEvent {
    pub kind: ReportEventKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
}

impl ReportEvent {
    pub fn started() -> Self {
        Self {
            kind: ReportEventKind::Started,
            message: Some("report started".into()),
            text: None,
            usage: None,
        }
    }

    pub fn completed(outcome: &ReportOutcome) -> Self {
        Self {
            kind: ReportEventKind::Completed,
            message: Some("report completed".into()),
            text: Some(outcome.text.clone()),
            usage: outcome.usage,
        }
    }

    pub fn timed_out(error: &str) -> Self {
        Self {
            kind: ReportEventKind::TimedOut,
            message: Some(error.to_string()),
            text: None,
            usage: None,
        }
    }

    pub fn error(error: &str) -> Self {
        Self {
            kind: ReportEventKind::Error,
            message: Some(error.to_string()),
            text: None,
            usage: None,
        }
    }

    pub fn into_sse_event(self) -> Event {
        let data = serde_json::to_string(&self).unwrap_or_else(|_| {
            serde_json::json!({
                "kind": ReportEventKind::Error,
                "message": "failed to serialize report event",
            })
            .to_string()
        });

        Event::default().event(self.kind.as_str()).data(data)
    }
}

#[derive(Clone, Copy, Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportEventKind {
    Started,
    Completed,
    TimedOut,
    Error,
}

impl ReportEventKind {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::Completed => "completed",
            Self::TimedOut => "timed_out",
            Self::Error => "error",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReportRequest {
    pub topic: String,
    pub session_id: Option<String>,
}

impl ReportRequest {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            session_id: None,
        }
    }

    pub fn with_session_id(mut self, session_id: Option<String>) -> Self {
        self.session_id = session_id;
        self
    }
}
