use anyhow::{anyhow, bail, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::time::Duration;
use tcr_core::{
    BatchSource, CheckOutcome, FileBackend, RemoteGenerator, Scheduler, TierConfig, TokenError,
    TokenService, TokenStore,
};
use tcr_network::HttpClient;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;

use config::ClientConfig;

/// Used when `RUST_LOG` is unset; keeps stderr quiet for interactive use.
const DEFAULT_LOG_FILTER: &str = "tcr=warn,tcr_core=warn,tcr_network=warn";

#[derive(Parser, Debug)]
#[command(name = "tcr")]
#[command(about = "Redeem TCR tokens and manage the local token store")]
struct Args {
    /// Store directory (overrides TCR_STORE_PATH)
    #[arg(short, long, global = true)]
    store: Option<String>,

    /// Generation service URL (overrides TCR_GENERATION_URL)
    #[arg(short, long, global = true)]
    url: Option<String>,

    /// Never contact the generation service
    #[arg(long, global = true)]
    offline: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Command {
    /// Run the regeneration check and report the store state
    Init,
    /// Replace the active tokens now, ignoring the 24h window
    Regenerate,
    /// Check a code without redeeming it
    Validate { code: String },
    /// Redeem a code and make its quota the current balance
    Redeem { code: String },
    /// Spend one invocation from the balance
    Use,
    /// Show the remaining invocations
    Balance,
    /// List unredeemed tokens
    Active,
    /// Show the redemption audit log
    Used,
    /// Active, used and total counts
    Stats,
}

fn build_service(config: &ClientConfig) -> Result<TokenService<FileBackend>> {
    let store = TokenStore::new(FileBackend::open(&config.store_path)?);
    let tiers = TierConfig::default();

    let scheduler = match &config.generation_url {
        Some(url) => {
            let client = HttpClient::new(
                tcr_network::Config::default().with_timeout(config.remote_timeout_secs),
            )?;
            Scheduler::new(Some(Box::new(RemoteGenerator::new(client, url.clone()))), tiers)
                .with_remote_timeout(Duration::from_secs(config.remote_timeout_secs))
        }
        None => Scheduler::local_only(tiers),
    };

    Ok(TokenService::new(store, scheduler))
}

fn describe_denial(e: &TokenError) -> String {
    match e {
        TokenError::InvalidFormat(_) => "Invalid token format. Expected TCR-XXXXX-XX".to_string(),
        TokenError::NotFoundOrUsed(_) => "Token is wrong or has already been used".to_string(),
        other => other.to_string(),
    }
}

fn print_outcome(outcome: &CheckOutcome) {
    match outcome {
        CheckOutcome::Regenerated { source, tokens } => {
            let origin = match source {
                BatchSource::Remote => "generation service",
                BatchSource::Local => "local generator",
            };
            println!("{} {} new tokens from the {}", "Regenerated".green(), tokens, origin);
        }
        CheckOutcome::Skipped { next_due } => {
            println!(
                "Tokens are current, next regeneration after {}",
                next_due.format("%Y-%m-%d %H:%M UTC")
            );
        }
    }
}

async fn execute(command: &Command, service: &TokenService<FileBackend>) -> Result<()> {
    match command {
        Command::Init => {
            let stats = service.stats()?;
            println!("Store ready: {} active, {} used", stats.active, stats.used);
        }
        Command::Regenerate => {
            let outcome = service.force_regenerate().await?;
            print_outcome(&outcome);
        }
        Command::Validate { code } => match service.validate(code) {
            Ok(redemption) => println!(
                "{} {} grants {} invocations",
                "VALID".green().bold(),
                redemption.code,
                redemption.quota
            ),
            Err(e) if e.is_denial() => bail!(describe_denial(&e)),
            Err(e) => return Err(e.into()),
        },
        Command::Redeem { code } => match service.redeem(code) {
            Ok(record) => println!(
                "{} {} - you now have {} invocations",
                "Redeemed".green().bold(),
                record.code,
                record.quota
            ),
            Err(e) if e.is_denial() => bail!(describe_denial(&e)),
            Err(e) => return Err(e.into()),
        },
        Command::Use => match service.use_invocation() {
            Ok(remaining) => println!("Invocation recorded, {} left", remaining),
            Err(TokenError::QuotaExhausted) => {
                bail!("{}", "No invocations left. Redeem a new token.".red())
            }
            Err(e) => return Err(e.into()),
        },
        Command::Balance => {
            let balance = service.balance()?;
            if balance == 0 {
                println!("{}", "No invocations left".yellow());
            } else {
                println!("{} invocations left", balance);
            }
        }
        Command::Active => {
            let tokens = service.active_tokens()?;
            for token in &tokens {
                println!("{:<14} {:>4}", token.code, token.quota);
            }
            println!("{} active tokens", tokens.len());
        }
        Command::Used => {
            let log = service.used_tokens()?;
            if log.is_empty() {
                println!("No tokens redeemed yet");
            }
            for record in &log {
                println!(
                    "{:<14} {:>4}  {}",
                    record.code,
                    record.quota,
                    record.used_at.format("%Y-%m-%d %H:%M")
                );
            }
        }
        Command::Stats => {
            let stats = service.stats()?;
            println!("Active: {}", stats.active);
            println!("Used:   {}", stats.used);
            println!("Total:  {}", stats.total);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    dotenvy::dotenv().ok();
    let args = Args::parse();

    let mut config = ClientConfig::from_env();
    if let Some(store) = &args.store {
        config = config.with_store_path(store);
    }
    if let Some(url) = &args.url {
        config = config.with_generation_url(url);
    }
    if args.offline {
        config = config.offline();
    }

    let service = build_service(&config)?;
    let outcome = service
        .initialize()
        .await
        .map_err(|e| anyhow!("Token store unavailable at {}: {}", config.store_path.display(), e))?;
    if matches!(outcome, CheckOutcome::Regenerated { .. }) || args.command == Command::Init {
        print_outcome(&outcome);
    }

    execute(&args.command, &service).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offline_config(dir: &std::path::Path) -> ClientConfig {
        ClientConfig {
            store_path: dir.to_path_buf(),
            generation_url: None,
            remote_timeout_secs: 1,
        }
    }

    #[test]
    fn test_parse_subcommands() {
        let args = Args::try_parse_from(["tcr", "--offline", "redeem", "TCR-AB12Z-05"]).unwrap();
        assert!(args.offline);
        assert_eq!(args.command, Command::Redeem { code: "TCR-AB12Z-05".into() });

        let args = Args::try_parse_from(["tcr", "stats", "--store", "/tmp/x"]).unwrap();
        assert_eq!(args.store.as_deref(), Some("/tmp/x"));
        assert!(Args::try_parse_from(["tcr", "redeem"]).is_err());
    }

    #[test]
    fn test_default_log_filter_is_quiet() {
        assert!(tracing_subscriber::EnvFilter::try_new(DEFAULT_LOG_FILTER).is_ok());
        for target in ["tcr", "tcr_core", "tcr_network"] {
            assert!(DEFAULT_LOG_FILTER.contains(&format!("{}=warn", target)));
        }
        assert!(!DEFAULT_LOG_FILTER.contains("info"));
    }

    #[tokio::test]
    async fn test_redeem_flow_offline() {
        let dir = tempfile::tempdir().unwrap();
        let service = build_service(&offline_config(dir.path())).unwrap();
        service.initialize().await.unwrap();

        let code = service.active_tokens().unwrap()[0].code.to_lowercase();
        execute(&Command::Validate { code: code.clone() }, &service).await.unwrap();
        execute(&Command::Redeem { code: code.clone() }, &service).await.unwrap();
        execute(&Command::Use, &service).await.unwrap();

        let err = execute(&Command::Redeem { code }, &service).await.unwrap_err();
        assert_eq!(err.to_string(), "Token is wrong or has already been used");
        assert_eq!(service.stats().unwrap().used, 1);
    }

    #[tokio::test]
    async fn test_malformed_code_message() {
        let dir = tempfile::tempdir().unwrap();
        let service = build_service(&offline_config(dir.path())).unwrap();
        service.initialize().await.unwrap();

        let err = execute(&Command::Validate { code: "hello".into() }, &service)
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("Invalid token format"));
    }

    #[tokio::test]
    async fn test_use_without_balance_fails() {
        let dir = tempfile::tempdir().unwrap();
        let service = build_service(&offline_config(dir.path())).unwrap();
        service.initialize().await.unwrap();
        assert!(execute(&Command::Use, &service).await.is_err());
        execute(&Command::Balance, &service).await.unwrap();
    }
}
