use std::sync::Arc;

use async_trait::async_trait;
use graph_flow::{Context, NextAction, Task, TaskResult};
use tracing::{debug, info, instrument, warn};

use crate::llm::{CompletionModel, TokenUsage};
use crate::lookup::TopicLookup;

/// Context keys shared between the tasks and the workflow driver.
pub(crate) const KEY_TOPIC: &str = "topic";
pub(crate) const KEY_FINDINGS: &str = "research.findings";
pub(crate) const KEY_REPORT: &str = "report.text";
pub(crate) const KEY_USAGE: &str = "usage.counters";
pub(crate) const KEY_ERROR: &str = "pipeline.error";

const RESEARCHER_ROLE: &str = "Investigador Senior";
const RESEARCHER_BACKSTORY: &str = "Eres un investigador meticuloso. Odias los resúmenes \
cortos. Buscas cada detalle, fecha y curiosidad disponible.";
const WRITER_ROLE: &str = "Redactor Jefe";
const WRITER_BACKSTORY: &str = "Periodista experto en reportajes de investigación profunda.";

async fn record_usage(context: &Context, usage: Option<TokenUsage>) {
    if let Some(usage) = usage {
        let mut counters: TokenUsage = context.get(KEY_USAGE).await.unwrap_or_default();
        counters.accumulate(usage);
        context.set(KEY_USAGE, &counters).await;
    }
}

/// Researcher: looks the topic up and synthesizes exhaustive findings.
///
/// A failed lookup does not abort the task; the failure text is fed to the
/// model as findings so the downstream writer can acknowledge it.
pub struct ResearchTask {
    model: Arc<dyn CompletionModel>,
    lookup: Arc<dyn TopicLookup>,
}

impl ResearchTask {
    pub fn new(model: Arc<dyn CompletionModel>, lookup: Arc<dyn TopicLookup>) -> Self {
        Self { model, lookup }
    }
}

#[async_trait]
impl Task for ResearchTask {
    fn id(&self) -> &str {
        "researcher"
    }

    #[instrument(name = "task.researcher", skip(self, context))]
    async fn run(&self, context: Context) -> graph_flow::Result<TaskResult> {
        let topic: String = context.get(KEY_TOPIC).await.unwrap_or_default();

        let outcome = self.lookup.lookup(&topic).await;
        if !outcome.is_found() {
            warn!(%topic, "lookup returned no summary; passing failure text downstream");
        }
        let lookup_findings = outcome.into_findings();

        let system = format!(
            "Eres {RESEARCHER_ROLE}. {RESEARCHER_BACKSTORY}\n\
             Tu objetivo: realizar una investigación exhaustiva y profunda sobre: {topic}."
        );
        let user = format!(
            "Investiga a fondo sobre '{topic}'. Extrae toda la información posible: historia \
             completa, fechas, personajes y datos técnicos.\n\n\
             Resultado del BuscadorWikipedia:\n{lookup_findings}\n\n\
             Entrega un documento extenso con todos los datos encontrados."
        );

        let completion = match self.model.complete(&system, &user).await {
            Ok(completion) => completion,
            Err(err) => {
                context.set(KEY_ERROR, err.to_string()).await;
                return Ok(TaskResult::new(Some(err.to_string()), NextAction::End));
            }
        };

        context.set(KEY_FINDINGS, &completion.content).await;
        record_usage(&context, completion.usage).await;

        debug!(
            findings_chars = completion.content.len(),
            "research task populated context"
        );

        Ok(TaskResult::new(
            Some(format!("Research completed for \"{topic}\"")),
            NextAction::ContinueAndExecute,
        ))
    }
}

/// Writer: turns the researcher's findings into the long-form report.
pub struct WriteTask {
    model: Arc<dyn CompletionModel>,
}

impl WriteTask {
    pub fn new(model: Arc<dyn CompletionModel>) -> Self {
        Self { model }
    }
}

#[async_trait]
impl Task for WriteTask {
    fn id(&self) -> &str {
        "writer"
    }

    #[instrument(name = "task.writer", skip(self, context))]
    async fn run(&self, context: Context) -> graph_flow::Result<TaskResult> {
        let findings: String = context.get(KEY_FINDINGS).await.unwrap_or_default();

        let system = format!(
            "Eres {WRITER_ROLE}. {WRITER_BACKSTORY}\n\
             Tu objetivo: escribir un informe detallado, largo y bien estructurado."
        );
        let user = format!(
            "Escribe un INFORME DETALLADO (mínimo 400 palabras) en texto plano. Debe incluir: \
             Introducción completa, Historia detallada, Datos Clave y Conclusión.\n\n\
             Contexto de la investigación:\n{findings}"
        );

        let completion = match self.model.complete(&system, &user).await {
            Ok(completion) => completion,
            Err(err) => {
                context.set(KEY_ERROR, err.to_string()).await;
                return Ok(TaskResult::new(Some(err.to_string()), NextAction::End));
            }
        };

        context.set(KEY_REPORT, &completion.content).await;
        record_usage(&context, completion.usage).await;

        info!(report_chars = completion.content.len(), "writer produced report");

        Ok(TaskResult::new(
            Some("Report drafted".to_string()),
            NextAction::End,
        ))
    }
}
