use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use informe_core::{
    PipelineComponents, PipelineConfig, SessionOptions, render_pdf, run_report_session,
};
use tokio::runtime::Runtime;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "informe-cli", version, about = "Research-to-report pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the research pipeline for one topic and print the report.
    Run(RunArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Topic to research.
    #[arg(long)]
    topic: String,

    /// Optional session ID.
    #[arg(long)]
    session: Option<String>,

    /// Number of Wikipedia summary sentences handed to the researcher.
    #[arg(long)]
    sentences: Option<usize>,

    /// Overall pipeline timeout in seconds.
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Write the report as a PDF to this path.
    #[arg(long)]
    pdf: Option<PathBuf>,
}

fn main() -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,informe_core=info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let rt = Runtime::new()?;
    rt.block_on(async move {
        match cli.command {
            Command::Run(args) => run_command(args).await?,
        }
        Ok::<(), anyhow::Error>(())
    })?;

    Ok(())
}

async fn run_command(args: RunArgs) -> Result<()> {
    let mut config = PipelineConfig::from_env()?;
    if let Some(sentences) = args.sentences {
        config.summary_sentences = sentences;
    }
    if let Some(secs) = args.timeout_secs {
        config.step_timeout = Duration::from_secs(secs);
    }

    info!(topic = %args.topic, model = %config.model, "starting report session");

    let components = PipelineComponents::from_config(&config);

    let mut options = SessionOptions::new(&args.topic).with_timeout(config.step_timeout);
    if let Some(session_id) = args.session {
        options = options.with_session_id(session_id);
    }

    let outcome = run_report_session(&components, options).await?;

    println!("{}", outcome.text);

    if let Some(usage) = outcome.usage {
        info!(
            total = usage.total,
            prompt = usage.prompt,
            completion = usage.completion,
            "token usage"
        );
    }

    if let Some(path) = args.pdf {
        std::fs::write(&path, render_pdf(&outcome.text))?;
        info!(path = %path.display(), "report PDF written");
    }

    Ok(())
}
