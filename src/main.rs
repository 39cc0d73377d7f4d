//! PRIMA Live CLI - watches reminder delivery status from the terminal.
//!
//! This is the main binary entry point. See the `prima_live` library for
//! the core functionality.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use prima_live::credentials::CredentialSource;
use prima_live::store::{DeliveryStatus, StatusMap};
use prima_live::{
    Config, DeliveryStore, Locale, NavigationBus, NavigationRequest, PushTransport, StaticToken,
    Toast, ToastStore, TokenStore, Translator,
};
use tokio::sync::broadcast::error::RecvError;

// CLI
#[derive(Parser)]
#[command(name = "prima-live")]
#[command(version)]
#[command(about = "Real-time reminder delivery status for the PRIMA dashboard")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Stream delivery status updates until interrupted
    Watch,
    /// Store the session token used to open the stream
    Login {
        /// Session token issued by the PRIMA server
        #[arg(long)]
        token: String,
    },
    /// Remove the stored session token
    Logout,
    /// Print the effective configuration (token excluded)
    Config,
}

fn main() -> Result<()> {
    init_logging()?;

    let cli = Cli::parse();

    match cli.command {
        Commands::Watch => {
            let config = Config::load()?;
            let runtime = tokio::runtime::Runtime::new().context("failed to start runtime")?;
            runtime.block_on(run_watch(config))?;
        }
        Commands::Login { token } => {
            if token.trim().is_empty() {
                anyhow::bail!("Token must not be empty");
            }
            TokenStore::for_environment()?.set_token(token.trim())?;
            println!("Session token saved.");
        }
        Commands::Logout => {
            TokenStore::for_environment()?.clear()?;
            println!("Session token removed.");
        }
        Commands::Config => {
            let config = Config::load()?;
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}

/// Log to `PRIMA_LOG_FILE` if set, otherwise stderr.
fn init_logging() -> Result<()> {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if let Ok(path) = std::env::var("PRIMA_LOG_FILE") {
        let log_file = std::fs::File::create(&path)
            .with_context(|| format!("Failed to create log file at {path}"))?;
        builder.target(env_logger::Target::Pipe(Box::new(log_file)));
    }
    builder.format_timestamp_secs().init();
    Ok(())
}

fn credentials_for(config: &Config) -> Result<Arc<dyn CredentialSource>> {
    if config.token.is_empty() {
        Ok(Arc::new(TokenStore::for_environment()?))
    } else {
        log::info!("Using session token from PRIMA_TOKEN");
        Ok(Arc::new(StaticToken::new(config.token.clone())))
    }
}

async fn run_watch(config: Config) -> Result<()> {
    let transport = PushTransport::from_config(&config, credentials_for(&config)?)?;
    let navigation = NavigationBus::new();
    let translator = Translator::new(Locale::parse_or_default(&config.locale));
    let store = DeliveryStore::new(
        transport,
        ToastStore::new(config.max_toasts),
        translator,
        navigation.clone(),
        config.toast_duration(),
    );

    let mut connection = store.subscribe_connection_status();
    let mut statuses = store.subscribe_statuses();
    let mut toasts = store.toasts().subscribe();
    let mut requests = navigation.subscribe();
    let mut seen_statuses = store.delivery_statuses();
    let mut last_toast_id = 0;

    println!("Watching {}", config.stream_url());
    store.connect();

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => break,
            Ok(()) = connection.changed() => {
                let status = **connection.borrow_and_update();
                println!("{}", translator.translate(status.label_key(), &[]));
            }
            Ok(()) = statuses.changed() => {
                let snapshot = Arc::clone(&*statuses.borrow_and_update());
                for (reminder_id, status) in changed_statuses(&seen_statuses, &snapshot) {
                    println!("{reminder_id}: {}", status.label(&translator));
                }
                seen_statuses = snapshot;

                let counts = store.filter_counts();
                println!(
                    "{} reminders tracked (pending {}, sent {}, failed {})",
                    seen_statuses.len(),
                    counts.pending,
                    counts.sent,
                    counts.failed
                );
            }
            Ok(()) = toasts.changed() => {
                let current = Arc::clone(&*toasts.borrow_and_update());
                let (fresh, newest) = new_toasts(&current, last_toast_id);
                for toast in fresh {
                    println!("[{}] {}", toast.kind, toast.message);
                }
                last_toast_id = newest;
            }
            request = requests.recv() => match request {
                Ok(NavigationRequest::Patient { patient_id }) => {
                    println!("open patient {patient_id}");
                }
                Err(RecvError::Lagged(n)) => log::warn!("Dropped {} navigation requests", n),
                Err(RecvError::Closed) => break,
            },
        }
    }

    store.disconnect();
    println!("Stopped.");
    Ok(())
}

/// Toasts newer than `last_seen`, and the id to remember for next time.
fn new_toasts(toasts: &[Toast], last_seen: u64) -> (Vec<&Toast>, u64) {
    let fresh: Vec<&Toast> = toasts.iter().filter(|t| t.id > last_seen).collect();
    let newest = fresh.iter().map(|t| t.id).max().unwrap_or(last_seen);
    (fresh, newest)
}

/// Reminders whose status differs from `previous`, sorted by id.
fn changed_statuses<'a>(
    previous: &StatusMap,
    current: &'a StatusMap,
) -> Vec<(&'a str, DeliveryStatus)> {
    let mut changed: Vec<_> = current
        .iter()
        .filter(|(id, record)| {
            previous
                .get(*id)
                .map_or(true, |before| before.status != record.status)
        })
        .map(|(id, record)| (id.as_str(), DeliveryStatus::parse(&record.status)))
        .collect();
    changed.sort_by(|a, b| a.0.cmp(b.0));
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use chrono::Utc;
    use prima_live::store::StatusRecord;
    use prima_live::toast::ToastKind;

    fn toast(id: u64) -> Toast {
        Toast {
            id,
            message: format!("toast {id}"),
            kind: ToastKind::Error,
            action: None,
            duration: Duration::ZERO,
        }
    }

    fn record(status: &str) -> StatusRecord {
        StatusRecord {
            status: status.to_string(),
            source_timestamp: "2025-12-30T10:00:00Z".to_string(),
            observed_at: Utc::now(),
        }
    }

    #[test]
    fn test_new_toasts_advances_past_shown() {
        let toasts = vec![toast(1), toast(2), toast(3)];

        let (fresh, newest) = new_toasts(&toasts, 1);
        assert_eq!(fresh.iter().map(|t| t.id).collect::<Vec<_>>(), vec![2, 3]);
        assert_eq!(newest, 3);

        let (fresh, newest) = new_toasts(&toasts, newest);
        assert!(fresh.is_empty());
        assert_eq!(newest, 3);
    }

    #[test]
    fn test_new_toasts_after_dismissal_keeps_last_seen() {
        let (fresh, newest) = new_toasts(&[], 7);
        assert!(fresh.is_empty());
        assert_eq!(newest, 7);
    }

    #[test]
    fn test_changed_statuses_reports_new_and_updated() {
        let mut previous = StatusMap::new();
        previous.insert("r1".to_string(), record("queued"));
        previous.insert("r2".to_string(), record("sent"));

        let mut current = previous.clone();
        current.insert("r1".to_string(), record("delivered"));
        current.insert("r3".to_string(), record("bounced"));

        assert_eq!(
            changed_statuses(&previous, &current),
            vec![
                ("r1", DeliveryStatus::Delivered),
                ("r3", DeliveryStatus::Other("bounced".to_string())),
            ]
        );
    }
}
