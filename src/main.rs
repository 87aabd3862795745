use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use strum::IntoEnumIterator;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mhc_e2e::{k8s::KubeCluster, Config, ScenarioKind, ScenarioRunner};

/// Run MachineHealthCheck end-to-end scenarios against the current cluster.
#[derive(Parser, Debug)]
#[command(name = "mhc-e2e", version, about, long_about = None)]
struct Cli {
    /// Which scenarios to run.
    #[arg(short, long, default_value = "all")]
    scenario: Selection,

    /// Override the machine API namespace.
    #[arg(short, long)]
    namespace: Option<String>,

    /// Path to a kubeconfig file (defaults to the inferred config).
    #[arg(long)]
    kubeconfig: Option<String>,

    /// Emit logs as JSON.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Selection {
    All,
    Default,
    Custom,
}

impl Selection {
    fn kinds(self) -> Vec<ScenarioKind> {
        match self {
            Selection::All => ScenarioKind::iter().collect(),
            Selection::Default => vec![ScenarioKind::Default],
            Selection::Custom => vec![ScenarioKind::CustomConditions],
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());
    if cli.json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    tracing::info!("Starting MachineHealthCheck e2e runner");

    let mut config = Config::load()?;
    if let Some(namespace) = cli.namespace {
        config.namespace = namespace;
    }
    if cli.kubeconfig.is_some() {
        config.kubeconfig = cli.kubeconfig;
    }
    tracing::info!(namespace = %config.namespace, "Configuration loaded");

    let cluster = KubeCluster::connect(config.kubeconfig.as_deref(), &config.namespace).await?;
    let runner = ScenarioRunner::new(Arc::new(cluster), config);

    let mut failed = 0;
    for kind in cli.scenario.kinds() {
        let report = runner.run(kind).await;
        tracing::info!(
            kind = %report.kind,
            outcome = report.outcome.label(),
            duration_ms = report.duration_ms,
            "Scenario finished"
        );
        println!("{}", serde_json::to_string(&report)?);
        if report.outcome.is_failure() {
            failed += 1;
        }
    }

    if failed > 0 {
        anyhow::bail!("{} scenario(s) failed", failed);
    }

    Ok(())
}
