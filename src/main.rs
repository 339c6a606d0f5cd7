//! reconfy: render configuration templates from the environment and reload on change.

use clap::{Parser, Subcommand, ValueEnum};
use reconfy::core::{
    BaseConfig, DEFAULT_METRICS_PATH, FileModeConfig, InputPaths, MetricsConfig, ReloaderConfig,
    Settings, WebhookConfig,
};
use reconfy::error::Result;
use reconfy::orchestrator::Orchestrator;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "reconfy", version)]
#[command(about = "Expand environment variables in config templates and reload on change", long_about = None)]
#[command(subcommand_negates_reqs = true)]
struct Cli {
    /// Configuration file (YAML, TOML or JSON) describing one or more reloaders.
    #[arg(short, long, env = "RECONFY_CONFIG")]
    config: Option<PathBuf>,

    /// Input template; repeat to concatenate several inputs.
    #[arg(short, long, env = "RECONFY_INPUT", value_delimiter = ',', required_unless_present = "config")]
    input: Vec<PathBuf>,

    /// Rendered output file. Without it only the webhook is called.
    #[arg(short, long, env = "RECONFY_OUTPUT")]
    output: Option<PathBuf>,

    /// Webhook called after every successful render; empty disables it.
    #[arg(long, env = "RECONFY_WEBHOOK", default_value = "http://localhost:8080")]
    webhook: String,

    /// HTTP method of the webhook call.
    #[arg(long, env = "RECONFY_WEBHOOK_METHOD", default_value = "POST")]
    webhook_method: String,

    /// Extra directories whose files trigger a render.
    #[arg(long, env = "RECONFY_WATCHDIRS", value_delimiter = ',')]
    watchdirs: Vec<PathBuf>,

    /// Output permission bits, in octal.
    #[arg(long, env = "RECONFY_FILEMODE", default_value = "0644")]
    filemode: String,

    /// Watch the input files themselves instead of their directories.
    #[arg(long, env = "RECONFY_WATCH_FILE_ONLY")]
    watch_file_only: bool,

    /// Expand unset variables to the empty string.
    #[arg(long, env = "RECONFY_IGNOREMISSING")]
    ignoremissing: bool,

    /// Address to serve metrics on, e.g. `:9090`. Disabled when unset.
    #[arg(long = "metrics.listen", env = "RECONFY_METRICS_LISTEN")]
    metrics_listen: Option<String>,

    /// HTTP path of the metrics endpoint.
    #[arg(long = "metrics.path", env = "RECONFY_METRICS_PATH", default_value = DEFAULT_METRICS_PATH)]
    metrics_path: String,

    /// Log level used when `RUST_LOG` is not set.
    #[arg(long, env = "RECONFY_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Log output format.
    #[arg(long, env = "RECONFY_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print version information
    Version,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

impl Cli {
    fn init_tracing(&self) {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(&self.log_level));
        let json = self.log_format == LogFormat::Json;

        tracing_subscriber::registry()
            .with(filter)
            .with((!json).then(tracing_subscriber::fmt::layer))
            .with(json.then(|| tracing_subscriber::fmt::layer().json()))
            .init();
    }

    fn settings(self) -> Result<Settings> {
        if let Some(path) = &self.config {
            tracing::info!(config = %path.display(), "loading reloaders from file");
            return Settings::from_file(path);
        }

        let webhook = Some(self.webhook)
            .filter(|url| !url.trim().is_empty())
            .map(|url| WebhookConfig::Detailed {
                url,
                method: Some(self.webhook_method),
            });

        let reloader = ReloaderConfig {
            name: String::new(),
            input: InputPaths::Many(self.input),
            output: self.output,
            webhook,
            watchdirs: self.watchdirs,
            filemode: Some(FileModeConfig::Octal(self.filemode)),
            watchfileonly: self.watch_file_only,
        };
        let base = BaseConfig {
            metrics: MetricsConfig {
                path: self.metrics_path,
                listen: self.metrics_listen,
            },
            ignoremissing: self.ignoremissing,
        };

        Settings::single(reloader, base)
    }
}

/// Resolves on Ctrl-C, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

async fn run(cli: Cli) -> Result<()> {
    let settings = cli.settings()?;
    for spec in &settings.reloaders {
        tracing::info!(
            reloader = %spec.label(),
            inputs = ?spec.inputs,
            output = ?spec.output,
            webhook_url = ?spec.webhook.as_ref().map(|w| w.url.as_str()),
            "configured reloader"
        );
    }

    Orchestrator::new(settings)?.run(shutdown_signal()).await
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Some(Commands::Version) = cli.command {
        println!("reconfy {}", env!("CARGO_PKG_VERSION"));
        return ExitCode::SUCCESS;
    }

    cli.init_tracing();
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "reconfy starting");

    match run(cli).await {
        Ok(()) => {
            tracing::info!("shutdown complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "reconfy failed");
            ExitCode::FAILURE
        }
    }
}
