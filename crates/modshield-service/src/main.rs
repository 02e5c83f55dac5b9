//! modshield
//!
//! Obfuscation-tolerant message moderation. Reads inbound messages as JSON
//! lines and writes one verdict per message.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use modshield_classifiers::{Credential, CredentialPool, FailoverClassifier, GeminiJudge, Normalizer, TermSet};
use modshield_core::StateStore;
use modshield_policy::Mode;
use modshield_service::{process_lines, ConfigOverrides, Moderator, ServiceConfig};
use modshield_telemetry::{describe_metrics, JsonFileStore, ViolationLog};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, BufReader};
use tokio::signal;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "modshield")]
#[command(about = "Obfuscation-tolerant message moderation", long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "MODSHIELD_CONFIG", default_value = "modshield.yaml")]
    config: PathBuf,

    /// State directory
    #[arg(short, long, env = "MODSHIELD_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Term list (JSON object of category to terms)
    #[arg(short, long)]
    terms: Option<PathBuf>,

    /// Moderation mode (strict, calm, relax)
    #[arg(short, long)]
    mode: Option<Mode>,

    /// Severity threshold (1-10)
    #[arg(long)]
    threshold: Option<u8>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Moderate messages from a JSON-lines file or stdin
    Run {
        /// Input file; stdin when omitted
        input: Option<PathBuf>,

        /// Serve Prometheus metrics on this address
        #[arg(long)]
        metrics_addr: Option<SocketAddr>,
    },
    /// Run only the detector over a text
    Scan {
        /// Text to scan
        text: String,
    },
    /// Show a user's violations and sanction
    History {
        /// User id
        user: u64,
    },
    /// Clear a user's escalation history
    Reset {
        /// User id
        user: u64,
    },
    /// Show today's statistics
    Stats,
    /// Manage judgment credentials
    Keys {
        #[command(subcommand)]
        action: Option<KeysAction>,
    },
    /// Check the violation log's hash chain
    VerifyLog,
}

#[derive(Subcommand, Debug)]
enum KeysAction {
    /// List credentials, masked (default)
    List,
    /// Add a credential
    Add {
        /// Secret to add
        secret: String,
    },
    /// Remove a credential by its listed number
    Remove {
        /// 1-based position from `keys list`
        index: usize,
    },
}

impl Command {
    /// Only a moderation run applies `--mode`/`--threshold`; they are
    /// persisted, so inspection and admin commands leave them alone
    fn applies_overrides(&self) -> bool {
        matches!(self, Command::Run { .. })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose, cli.log_json);

    let mut config = ServiceConfig::load(Some(&cli.config))?;
    config.apply(ConfigOverrides {
        data_dir: cli.data_dir.clone(),
        terms_file: cli.terms.clone(),
        mode: cli.mode,
        severity_threshold: cli.threshold,
    });
    let config = config.with_env_credentials();
    config.validate()?;

    let data_dir = config.storage.data_dir();
    let store: Arc<dyn StateStore> = Arc::new(JsonFileStore::open(&data_dir)?);
    info!(data_dir = %data_dir.display(), "State directory ready");

    if matches!(cli.command, Command::VerifyLog) {
        let log = ViolationLog::open(config.storage.violation_log(), config.storage.log_flush_interval)?;
        let intact = log.verify_chain()?;
        println!("{}", if intact { "intact" } else { "broken" });
        return Ok(());
    }

    let pool = Arc::new(
        CredentialPool::from_secrets(config.classifier.credentials.iter()).with_store(store.clone()),
    );
    if pool.is_empty() {
        warn!("No judgment credentials configured; classifier will be unavailable");
    }

    if let Command::Keys { action } = &cli.command {
        match action {
            None | Some(KeysAction::List) => {
                for line in pool.masked() {
                    println!("{}", line);
                }
            }
            Some(KeysAction::Add { secret }) => {
                let added = pool.add(Credential::new(secret.as_str()))?;
                println!("{}", if added { "added" } else { "already present" });
            }
            Some(KeysAction::Remove { index }) => {
                let removed = match index.checked_sub(1) {
                    Some(i) => pool.remove(i)?,
                    None => None,
                };
                match removed {
                    Some(credential) => println!("removed {}", credential.masked()),
                    None => anyhow::bail!("no credential at position {}", index),
                }
            }
        }
        return Ok(());
    }

    let moderator = Arc::new(build_moderator(&config, pool, store)?);

    // Flags override both the file and persisted administrative changes
    if cli.command.applies_overrides() {
        if let Some(mode) = cli.mode {
            moderator.set_mode(mode)?;
        }
        if let Some(threshold) = cli.threshold {
            moderator.set_threshold(threshold)?;
        }
    }

    match cli.command {
        Command::Run { input, metrics_addr } => {
            if let Some(addr) = metrics_addr {
                init_metrics(addr)?;
            }
            let workers = config.workers.max_concurrent;
            info!(mode = %moderator.config().mode, workers, "Starting modshield");

            let reader: Box<dyn AsyncBufRead + Unpin + Send> = match input {
                Some(path) => Box::new(BufReader::new(
                    tokio::fs::File::open(&path)
                        .await
                        .with_context(|| format!("failed to open {}", path.display()))?,
                )),
                None => Box::new(BufReader::new(tokio::io::stdin())),
            };

            tokio::select! {
                summary = process_lines(moderator.clone(), reader, tokio::io::stdout(), workers) => {
                    let summary = summary?;
                    info!(processed = summary.processed, rejected = summary.rejected, "Run complete");
                }
                _ = shutdown_signal() => {
                    warn!("Shutdown signal received, stopping");
                    moderator.persist()?;
                }
            }
        }
        Command::Scan { text } => {
            let report = moderator.scan(&text);
            for found in report.matches() {
                println!("{}\t{}\t{}\t{}", found.term, found.category, found.origin, found.matched);
            }
            if report.is_empty() {
                println!("no terms detected");
            }
        }
        Command::History { user } => {
            let output = serde_json::json!({
                "user": user,
                "history": moderator.history(user),
                "escalation": moderator.escalation(user),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        Command::Reset { user } => {
            let had = moderator.reset_user(user)?;
            println!("{}", if had { "reset" } else { "no history" });
        }
        Command::Stats => {
            let stats = moderator.stats();
            let output = serde_json::json!({
                "date": stats.date,
                "scanned": stats.scanned,
                "flagged": stats.flagged,
                "flag_rate": stats.flag_rate(),
                "unique_users": stats.unique_users(),
                "peak_hour": stats.peak_hour(),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        Command::Keys { .. } | Command::VerifyLog => {}
    }

    Ok(())
}

fn build_moderator(config: &ServiceConfig, pool: Arc<CredentialPool>, store: Arc<dyn StateStore>) -> Result<Moderator> {
    let terms_file = config.storage.terms_file();
    let terms = if terms_file.exists() {
        TermSet::from_file(&terms_file)?
    } else {
        warn!(path = %terms_file.display(), "Term list not found; detector will never match");
        TermSet::empty()
    };

    let judge = GeminiJudge::new(&config.classifier.endpoint, &config.classifier.model)?;
    let classifier = FailoverClassifier::new(pool, Arc::new(judge))
        .with_attempt_timeout(config.classifier.attempt_timeout())
        .with_normalizer(Normalizer::default());

    let log = ViolationLog::open(config.storage.violation_log(), config.storage.log_flush_interval)?;

    let moderator = Moderator::builder(terms, Arc::new(classifier))
        .detector_config(config.detector.clone())
        .config(config.moderation.clone())
        .whitelist(config.whitelist.clone())
        .escalation(config.escalation.clone())
        .violation_log(log)
        .store(store)
        .build()?;
    Ok(moderator)
}

/// Listen for shutdown signals (SIGTERM, SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
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

/// Initialize tracing/logging. Logs go to stderr; stdout carries outcomes.
fn init_tracing(verbose: bool, json: bool) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("modshield=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("modshield=info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| fmt::layer().json().with_writer(std::io::stderr)))
        .with((!json).then(|| fmt::layer().with_writer(std::io::stderr)))
        .init();
}

/// Install the Prometheus exporter
fn init_metrics(addr: SocketAddr) -> Result<()> {
    use metrics_exporter_prometheus::PrometheusBuilder;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("Failed to install metrics: {}", e))?;

    describe_metrics();
    info!(%addr, "Metrics exporter listening");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_only_apply_to_run() {
        let run = Cli::try_parse_from(["modshield", "--mode", "strict", "run"]).unwrap();
        assert!(run.command.applies_overrides());

        for args in [
            vec!["modshield", "--mode", "strict", "stats"],
            vec!["modshield", "--threshold", "3", "history", "5"],
            vec!["modshield", "--mode", "relax", "scan", "text"],
            vec!["modshield", "--mode", "relax", "keys"],
        ] {
            let cli = Cli::try_parse_from(args).unwrap();
            assert!(!cli.command.applies_overrides(), "{:?}", cli.command);
        }
    }

    #[test]
    fn test_keys_subcommands_parse() {
        let cli = Cli::try_parse_from(["modshield", "keys", "add", "AIzaSyNEWKEY0000"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Keys { action: Some(KeysAction::Add { ref secret }) } if secret == "AIzaSyNEWKEY0000"
        ));

        let cli = Cli::try_parse_from(["modshield", "keys", "remove", "2"]).unwrap();
        assert!(matches!(cli.command, Command::Keys { action: Some(KeysAction::Remove { index: 2 }) }));

        let cli = Cli::try_parse_from(["modshield", "keys"]).unwrap();
        assert!(matches!(cli.command, Command::Keys { action: None }));
    }
}
