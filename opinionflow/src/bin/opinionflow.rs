//! Command-line front end: run one analysis and stream its events.

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use opinionflow::config::{PipelineConfig, ProxyConfig};
use opinionflow::events::JsonLinesEventSink;
use opinionflow::observability::{init_tracing, LogFormat};
use opinionflow::pipeline::{AnalysisPipeline, PipelineEvent};
use opinionflow::proxy::ProxyTransport;

const DIRECT_ENDPOINT: &str = "inproc://proxy/api/chat";

/// Generate a public-opinion report for a topic.
#[derive(Parser, Debug)]
#[command(name = "opinionflow", version, about, long_about = None)]
struct Cli {
    /// Topic to analyse.
    query: String,

    /// JSON configuration file. Falls back to OPINIONFLOW_* variables.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Proxy endpoint, overriding the configuration.
    #[arg(long)]
    endpoint: Option<String>,

    /// Search result cap per pass.
    #[arg(long)]
    top_k: Option<usize>,

    /// Restrict search to a site. Repeatable.
    #[arg(long = "site")]
    sites: Vec<String>,

    /// Call the providers directly using BAIDU_API_KEY and VOLC_API_KEY.
    #[arg(long)]
    direct: bool,

    /// Write the final Markdown report here.
    #[arg(short, long)]
    out: Option<PathBuf>,

    /// Base log level.
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Log format: compact or json.
    #[arg(long, default_value = "compact")]
    log_format: LogFormat,
}

fn load_config(cli: &Cli) -> Result<PipelineConfig> {
    let mut config = match &cli.config {
        Some(path) => PipelineConfig::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => PipelineConfig::from_env()?,
    };
    if let Some(endpoint) = &cli.endpoint {
        config.endpoint.clone_from(endpoint);
    }
    if let Some(top_k) = cli.top_k {
        config.top_k = top_k;
    }
    config.site_filter.extend(cli.sites.iter().cloned());
    if cli.direct && config.endpoint.trim().is_empty() {
        config.endpoint = DIRECT_ENDPOINT.to_string();
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level, cli.log_format);

    let config = load_config(&cli)?;
    let pipeline = if cli.direct {
        let proxy = ProxyTransport::new(ProxyConfig::from_env())?;
        AnalysisPipeline::new(config, Arc::new(proxy))
    } else {
        AnalysisPipeline::with_http(config)?
    };

    let sink = JsonLinesEventSink::stdout();
    match pipeline.run_to_sink(cli.query.as_str(), &sink).await {
        Some(PipelineEvent::Final { detailed_report, .. }) => {
            if let Some(path) = &cli.out {
                tokio::fs::write(path, detailed_report)
                    .await
                    .with_context(|| format!("failed to write report to {}", path.display()))?;
                tracing::info!(path = %path.display(), "Report written");
            }
            Ok(())
        }
        Some(PipelineEvent::Error { message }) => bail!(message),
        _ => bail!("run ended without a terminal event"),
    }
}
