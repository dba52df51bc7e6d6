use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::anyhow;
use graph_flow::{
    ExecutionStatus, FlowRunner, GraphBuilder, InMemorySessionStorage, Session, SessionStorage,
    Task,
};
use tracing::info;

use crate::config::PipelineConfig;
use crate::error::InformeError;
use crate::llm::{CompletionModel, OpenAiModel, TokenUsage};
use crate::lookup::{TopicLookup, WikipediaLookup};
use crate::tasks::{KEY_ERROR, KEY_REPORT, KEY_TOPIC, KEY_USAGE, ResearchTask, WriteTask};

/// The model client and lookup capability a session runs against.
///
/// Built once from the resolved configuration and shared by reference;
/// tests substitute stub implementations through the same seam.
#[derive(Clone)]
pub struct PipelineComponents {
    pub model: Arc<dyn CompletionModel>,
    pub lookup: Arc<dyn TopicLookup>,
}

impl PipelineComponents {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            model: Arc::new(OpenAiModel::new(config)),
            lookup: Arc::new(WikipediaLookup::new(config.summary_sentences)),
        }
    }

    pub fn new(model: Arc<dyn CompletionModel>, lookup: Arc<dyn TopicLookup>) -> Self {
        Self { model, lookup }
    }
}

/// Exposes the pipeline tasks so callers can reference their ids.
#[derive(Clone)]
pub struct BaseGraphTasks {
    pub research: Arc<ResearchTask>,
    pub write: Arc<WriteTask>,
}

impl BaseGraphTasks {
    fn new(components: &PipelineComponents) -> Self {
        Self {
            research: Arc::new(ResearchTask::new(
                components.model.clone(),
                components.lookup.clone(),
            )),
            write: Arc::new(WriteTask::new(components.model.clone())),
        }
    }
}

fn build_graph(components: &PipelineComponents) -> (Arc<graph_flow::Graph>, BaseGraphTasks) {
    let tasks = BaseGraphTasks::new(components);

    let builder = GraphBuilder::new("informe_workflow")
        .add_task(tasks.research.clone())
        .add_task(tasks.write.clone())
        .add_edge(tasks.research.id(), tasks.write.id())
        .set_start_task(tasks.research.id());

    (Arc::new(builder.build()), tasks)
}

fn new_session_id() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    format!("session-{}", nanos)
}

/// Options for one report session.
pub struct SessionOptions {
    pub topic: String,
    pub session_id: Option<String>,
    pub timeout: Duration,
}

impl SessionOptions {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            session_id: None,
            timeout: Duration::from_secs(PipelineConfig::DEFAULT_TIMEOUT_SECS),
        }
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Final result of a completed session.
#[derive(Debug, Clone)]
pub struct ReportOutcome {
    pub session_id: String,
    pub topic: String,
    pub text: String,
    pub usage: Option<TokenUsage>,
}

/// Run the research-then-write pipeline end to end for one topic.
///
/// The researcher always executes before the writer (graph edge order), each
/// run builds fresh tasks and a fresh session, and the whole run sits under
/// a bounded timeout instead of blocking indefinitely on a hung dependency.
pub async fn run_report_session(
    components: &PipelineComponents,
    options: SessionOptions,
) -> Result<ReportOutcome, InformeError> {
    let topic = options.topic.trim().to_string();
    if topic.is_empty() {
        return Err(InformeError::EmptyTopic);
    }

    let timeout_secs = options.timeout.as_secs();
    let session_id = options.session_id.unwrap_or_else(new_session_id);

    info!(%session_id, %topic, "starting report session");

    let run = execute_session(components, &session_id, &topic);
    match tokio::time::timeout(options.timeout, run).await {
        Ok(result) => result,
        Err(_) => Err(InformeError::TimedOut(timeout_secs)),
    }
}

async fn execute_session(
    components: &PipelineComponents,
    session_id: &str,
    topic: &str,
) -> Result<ReportOutcome, InformeError> {
    let (graph, tasks) = build_graph(components);

    let storage = Arc::new(InMemorySessionStorage::new());
    let runner = FlowRunner::new(graph, storage.clone());

    let session = Session::new_from_task(session_id.to_string(), tasks.research.id());
    session.context.set(KEY_TOPIC, topic.to_string()).await;

    storage
        .save(session)
        .await
        .map_err(|err| InformeError::Other(anyhow!("failed to persist session: {err}")))?;

    loop {
        let result = runner
            .run(session_id)
            .await
            .map_err(|err| InformeError::Other(anyhow!("graph execution failure: {err}")))?;

        match result.status {
            ExecutionStatus::Completed => break,
            ExecutionStatus::WaitingForInput => continue,
            ExecutionStatus::Error(message) => return Err(InformeError::Pipeline(message)),
        }
    }

    let session = storage
        .get(session_id)
        .await
        .map_err(|err| InformeError::Other(anyhow!("failed to reload session: {err}")))?
        .ok_or_else(|| InformeError::Other(anyhow!("session missing after execution")))?;

    if let Some(message) = session.context.get::<String>(KEY_ERROR).await {
        return Err(InformeError::Pipeline(message));
    }

    let text: String = session
        .context
        .get(KEY_REPORT)
        .await
        .ok_or_else(|| InformeError::Pipeline("no report text recorded".to_string()))?;

    let usage: Option<TokenUsage> = session.context.get(KEY_USAGE).await;

    Ok(ReportOutcome {
        session_id: session_id.to_string(),
        topic: topic.to_string(),
        text,
        usage,
    })
}
