//! Informe core: a two-agent research-then-write pipeline built on `graph_flow`.
//!
//! This crate provides the configuration, model client, topic lookup
//! capability and report rendering used by the GUI service and the CLI. A
//! session runs a Researcher task (Wikipedia lookup plus model synthesis)
//! followed by a Writer task that turns the findings into a long-form report,
//! which can then be encoded as a downloadable PDF.

mod config;
mod error;
mod llm;
mod lookup;
mod report;
mod tasks;
mod workflow;

pub use config::{PipelineConfig, SecretValue};
pub use error::InformeError;
pub use llm::{Completion, CompletionModel, OpenAiModel, TokenUsage};
pub use lookup::{LookupOutcome, TopicLookup, WikipediaLookup};
pub use report::{pdf_filename, render_pdf};
pub use tasks::{ResearchTask, WriteTask};
pub use workflow::{
    BaseGraphTasks, PipelineComponents, ReportOutcome, SessionOptions, run_report_session,
};
