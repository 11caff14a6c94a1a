//! Command-line interface for the OTLP receiver.
//!
//! Run `otlp-receiver` to listen on the default gRPC and HTTP endpoints and
//! log a summary of every batch received.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;

use crate::consumer::{Consumer, LoggingConsumer};
use crate::core::config::default_config_path;
use crate::core::{Arguments, ConfigWatcher, ReceiverError, Result};
use crate::receiver::Receiver;

/// OpenTelemetry protocol receiver for traces, metrics and logs
#[derive(Parser, Debug)]
#[command(name = "otlp-receiver")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Configuration file path (default: ~/.config/otlp-receiver/config.yaml)
    #[arg(short, long, env = "OTLP_RECEIVER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Reload the configuration file when it changes
    #[arg(short, long, env = "OTLP_RECEIVER_WATCH")]
    pub watch: bool,

    /// Validate configuration and exit
    #[arg(long)]
    pub check_config: bool,

    /// Enable debug logging
    #[arg(short, long, env = "OTLP_RECEIVER_DEBUG")]
    pub debug: bool,

    /// Log every span name, not only batch summaries
    #[arg(short, long, env = "OTLP_RECEIVER_VERBOSE")]
    pub verbose: bool,
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Cli::parse()
    }

    /// The configuration file to use, if any.
    ///
    /// An explicit `--config` always wins. Otherwise the default location is
    /// used when a file exists there.
    pub fn config_path(&self) -> Option<PathBuf> {
        if let Some(path) = &self.config {
            return Some(path.clone());
        }
        default_config_path().filter(|path| path.exists())
    }

    /// Load receiver arguments and attach the logging consumer.
    ///
    /// Without a configuration file both protocols run on their default
    /// endpoints.
    pub async fn load_arguments(&self) -> Result<Arguments> {
        let mut args = match self.config_path() {
            Some(path) => {
                let args = Arguments::load(&path).await?;
                tracing::info!("Loaded configuration from: {:?}", path);
                args
            },
            None => {
                tracing::debug!("No config file found, using default protocols");
                Arguments::with_default_protocols()
            },
        };

        let logging: Arc<dyn Consumer> = Arc::new(LoggingConsumer::new(self.verbose));
        args.output.traces.push(Arc::clone(&logging));
        args.output.metrics.push(Arc::clone(&logging));
        args.output.logs.push(logging);
        Ok(args)
    }

    /// Initialize logging.
    pub fn init_logging(&self) -> Result<()> {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

        let env_log_level =
            std::env::var("OTLP_RECEIVER_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let log_level = if self.debug {
            "debug"
        } else {
            env_log_level.as_str()
        };

        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_target(self.debug)
            .with_line_number(self.debug)
            .compact();

        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .try_init()
            .map_err(|e| ReceiverError::config(format!("Failed to initialize logging: {}", e)))?;

        Ok(())
    }
}

/// Execute the receiver until Ctrl-C.
pub async fn execute(cli: Cli) -> Result<()> {
    cli.init_logging()?;

    let args = cli.load_arguments().await?;
    let config = args.convert()?;

    if cli.check_config {
        println!("Configuration is valid!");
        match &config.protocols.grpc {
            Some(grpc) => println!("  gRPC endpoint: {}", grpc.net_addr.endpoint),
            None => println!("  gRPC: disabled"),
        }
        match &config.protocols.http {
            Some(http) => {
                println!("  HTTP endpoint: {}", http.endpoint);
                println!("    traces:  {}", http.traces_url_path);
                println!("    metrics: {}", http.metrics_url_path);
                println!("    logs:    {}", http.logs_url_path);
            },
            None => println!("  HTTP: disabled"),
        }
        println!("  Debug metrics level: {}", args.debug_metrics.level);
        return Ok(());
    }

    let ctx = CancellationToken::new();
    let receiver = Arc::new(Receiver::new());

    if cli.watch {
        match cli.config_path() {
            Some(path) => spawn_reloader(path, &args, &receiver, &ctx),
            None => tracing::warn!("--watch given without a configuration file, ignoring"),
        }
    }

    tokio::spawn({
        let ctx = ctx.clone();
        async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => tracing::info!("Received shutdown signal, stopping..."),
                Err(e) => tracing::error!("Failed to listen for shutdown signal: {}", e),
            }
            ctx.cancel();
        }
    });

    tracing::info!("Starting OTLP receiver...");
    let result = receiver.run(ctx.clone(), args).await;
    ctx.cancel();
    result
}

/// Watch `path` and forward every validated change to `receiver`.
fn spawn_reloader(
    path: PathBuf,
    args: &Arguments,
    receiver: &Arc<Receiver>,
    ctx: &CancellationToken,
) {
    let watcher = ConfigWatcher::new(path, args.clone());
    let mut updates = watcher.subscribe();

    tokio::spawn({
        let ctx = ctx.clone();
        async move {
            if let Err(e) = watcher.watch(ctx).await {
                tracing::error!("Configuration watcher failed: {}", e);
            }
        }
    });

    let receiver = Arc::clone(receiver);
    let ctx = ctx.clone();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = ctx.cancelled() => break,
                changed = updates.changed() => {
                    if changed.is_err() {
                        break;
                    }
                },
            }
            let args = updates.borrow_and_update().clone();
            if let Err(e) = receiver.update(args).await {
                tracing::error!("Failed to apply configuration update: {}", e);
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn cli(config: Option<PathBuf>) -> Cli {
        Cli {
            config,
            watch: false,
            check_config: false,
            debug: false,
            verbose: false,
        }
    }

    #[test]
    fn test_cli_parses_flags() {
        let cli = Cli::try_parse_from(["otlp-receiver", "--config", "/tmp/r.yaml", "--watch", "-d"])
            .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/r.yaml")));
        assert!(cli.watch);
        assert!(cli.debug);
        assert!(!cli.check_config);
    }

    #[tokio::test]
    async fn test_load_arguments_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "http:\n  endpoint: 127.0.0.1:9999").unwrap();

        let args = cli(Some(file.path().to_path_buf()))
            .load_arguments()
            .await
            .unwrap();
        assert!(args.grpc.is_none());
        assert_eq!(args.http.unwrap().endpoint, "127.0.0.1:9999");
        assert_eq!(args.output.traces.len(), 1);
        assert_eq!(args.output.metrics.len(), 1);
        assert_eq!(args.output.logs.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_explicit_config_is_an_error() {
        let err = cli(Some(PathBuf::from("/nonexistent/otlp-receiver.yaml")))
            .load_arguments()
            .await
            .unwrap_err();
        assert_eq!(err.category(), "config");
    }
}
