use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use informe_core::{
    Completion, CompletionModel, InformeError, LookupOutcome, PipelineComponents, SessionOptions,
    TokenUsage, TopicLookup, run_report_session,
};

/// Records every prompt pair and answers with an indexed canned response.
struct RecordingModel {
    calls: Arc<Mutex<Vec<(String, String)>>>,
    usage: Option<TokenUsage>,
}

impl RecordingModel {
    fn new(usage: Option<TokenUsage>) -> (Arc<Self>, Arc<Mutex<Vec<(String, String)>>>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let model = Arc::new(Self {
            calls: calls.clone(),
            usage,
        });
        (model, calls)
    }
}

#[async_trait]
impl CompletionModel for RecordingModel {
    async fn complete(&self, system: &str, user: &str) -> Result<Completion, InformeError> {
        let mut calls = self.calls.lock().expect("calls lock");
        let index = calls.len();
        calls.push((system.to_string(), user.to_string()));
        Ok(Completion {
            content: format!("respuesta-{index}"),
            usage: self.usage,
        })
    }
}

struct FailingModel;

#[async_trait]
impl CompletionModel for FailingModel {
    async fn complete(&self, _system: &str, _user: &str) -> Result<Completion, InformeError> {
        Err(InformeError::Pipeline("model exploded".to_string()))
    }
}

struct SlowModel;

#[async_trait]
impl CompletionModel for SlowModel {
    async fn complete(&self, _system: &str, _user: &str) -> Result<Completion, InformeError> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(Completion {
            content: "demasiado tarde".to_string(),
            usage: None,
        })
    }
}

struct StaticLookup(LookupOutcome);

#[async_trait]
impl TopicLookup for StaticLookup {
    async fn lookup(&self, _query: &str) -> LookupOutcome {
        self.0.clone()
    }
}

fn found_lookup() -> Arc<StaticLookup> {
    Arc::new(StaticLookup(LookupOutcome::Found {
        title: "Roma".to_string(),
        summary: "La ciudad eterna fue fundada según la tradición en 753 a. C.".to_string(),
    }))
}

#[tokio::test]
async fn researcher_runs_before_writer_and_feeds_it() {
    let (model, calls) = RecordingModel::new(None);
    let components = PipelineComponents::new(model, found_lookup());

    let outcome = run_report_session(&components, SessionOptions::new("Historia de Roma"))
        .await
        .expect("session should complete");

    let calls = calls.lock().expect("calls lock");
    assert_eq!(calls.len(), 2, "exactly two sequential model calls expected");
    assert!(calls[0].0.contains("Investigador Senior"));
    assert!(calls[1].0.contains("Redactor Jefe"));

    // the writer consumes exactly the researcher's output as context
    assert!(calls[1].1.contains("respuesta-0"));
    assert_eq!(outcome.text, "respuesta-1");
    assert_eq!(outcome.topic, "Historia de Roma");
}

#[tokio::test]
async fn lookup_summary_reaches_the_researcher_prompt() {
    let (model, calls) = RecordingModel::new(None);
    let components = PipelineComponents::new(model, found_lookup());

    run_report_session(&components, SessionOptions::new("Roma"))
        .await
        .expect("session should complete");

    let calls = calls.lock().expect("calls lock");
    assert!(calls[0].1.contains("Resumen de Wikipedia para \"Roma\""));
    assert!(calls[0].1.contains("753 a. C."));
}

#[tokio::test]
async fn lookup_failure_flows_into_the_writer() {
    let (model, calls) = RecordingModel::new(None);
    let lookup = Arc::new(StaticLookup(LookupOutcome::Failed {
        reason: "sin conexión".to_string(),
    }));
    let components = PipelineComponents::new(model, lookup);

    let outcome = run_report_session(&components, SessionOptions::new("Tema inexistente"))
        .await
        .expect("capability failure must not abort the run");

    let calls = calls.lock().expect("calls lock");
    assert_eq!(calls.len(), 2, "writer still executes after a failed lookup");
    assert!(calls[0].1.contains("Error buscando: sin conexión"));
    assert!(!outcome.text.is_empty());
}

#[tokio::test]
async fn token_usage_is_aggregated_across_both_calls() {
    let (model, _calls) = RecordingModel::new(Some(TokenUsage {
        total: 10,
        prompt: 6,
        completion: 4,
    }));
    let components = PipelineComponents::new(model, found_lookup());

    let outcome = run_report_session(&components, SessionOptions::new("Roma"))
        .await
        .expect("session should complete");

    let usage = outcome.usage.expect("usage should be reported");
    assert_eq!(usage.total, 20);
    assert_eq!(usage.prompt, 12);
    assert_eq!(usage.completion, 8);
}

#[tokio::test]
async fn usage_is_absent_when_the_endpoint_reports_none() {
    let (model, _calls) = RecordingModel::new(None);
    let components = PipelineComponents::new(model, found_lookup());

    let outcome = run_report_session(&components, SessionOptions::new("Roma"))
        .await
        .expect("session should complete");

    assert!(outcome.usage.is_none());
}

#[tokio::test]
async fn empty_topic_never_reaches_the_model() {
    let (model, calls) = RecordingModel::new(None);
    let components = PipelineComponents::new(model, found_lookup());

    let err = run_report_session(&components, SessionOptions::new("   \t "))
        .await
        .expect_err("whitespace topic must be rejected");

    assert!(matches!(err, InformeError::EmptyTopic));
    assert!(calls.lock().expect("calls lock").is_empty());
}

#[tokio::test]
async fn model_failure_propagates_as_one_terminal_error() {
    let components = PipelineComponents::new(Arc::new(FailingModel), found_lookup());

    let err = run_report_session(&components, SessionOptions::new("Roma"))
        .await
        .expect_err("model failure must surface");

    assert!(err.to_string().contains("model exploded"));
}

#[tokio::test]
async fn slow_runs_end_in_timed_out() {
    let components = PipelineComponents::new(Arc::new(SlowModel), found_lookup());

    let options = SessionOptions::new("Roma").with_timeout(Duration::from_millis(50));
    let err = run_report_session(&components, options)
        .await
        .expect_err("bounded timeout must fire");

    assert!(err.is_timeout(), "expected TimedOut, got {err}");
}

#[tokio::test]
async fn explicit_session_id_is_preserved() {
    let (model, _calls) = RecordingModel::new(None);
    let components = PipelineComponents::new(model, found_lookup());

    let options = SessionOptions::new("Roma").with_session_id("informe-test-1");
    let outcome = run_report_session(&components, options)
        .await
        .expect("session should complete");

    assert_eq!(outcome.session_id, "informe-test-1");
}
