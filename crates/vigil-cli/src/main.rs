//! vigil - password hashing and job scheduling from the command line.
//!
//! Usage:
//!   vigil salt [--cost N]                   Print a fresh salt
//!   vigil hash <input> [--cost N|--salt S]  Print a digest
//!   vigil compare <input> <digest>          Exit 0 on match, 1 otherwise
//!   vigil cost <digest>                     Print the digest's cost factor
//!   vigil next <cron> [--count N]           Print upcoming fire dates
//!   vigil run                               Run the jobs from the config file

use anyhow::{bail, Context};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use vigil_core::config::{JobConfig, VigilConfig};
use vigil_hash::{extract_cost_factor, Hasher, SaltOrCost};
use vigil_scheduler::{cron, Scheduler, Trigger};

/// vigil - salted password hashing and a calendar job scheduler
#[derive(Parser)]
#[command(name = "vigil")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Config file (defaults to $VIGIL_CONFIG, then ~/.vigil/vigil.toml)
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a salt
    Salt {
        /// Cost factor (log2 of the memory cost)
        #[arg(short, long)]
        cost: Option<u32>,
    },

    /// Hash an input with a new or given salt
    Hash {
        input: String,

        #[arg(short, long, conflicts_with = "salt")]
        cost: Option<u32>,

        /// Reuse an existing salt
        #[arg(short, long)]
        salt: Option<String>,
    },

    /// Check an input against a digest
    Compare { input: String, digest: String },

    /// Print the cost factor encoded in a digest
    Cost { digest: String },

    /// Print the next fire dates of a cron expression
    Next {
        #[arg(value_name = "CRON")]
        expression: String,

        #[arg(short = 'n', long, default_value = "5")]
        count: usize,
    },

    /// Schedule the configured jobs and run until Ctrl-C
    Run,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vigil=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // load config: --config > VIGIL_CONFIG env > ~/.vigil/vigil.toml
    let config_path = cli.config.or_else(|| std::env::var("VIGIL_CONFIG").ok());
    let config = resolve_config(&cli.command, VigilConfig::load(config_path.as_deref()))?;

    let hasher = Hasher::new(&config.hash);

    match cli.command {
        Commands::Salt { cost } => {
            let cost = cost.unwrap_or(hasher.default_cost());
            println!("{}", hasher.generate_salt_async(cost).await?);
        }
        Commands::Hash { input, cost, salt } => {
            let salt = match (salt, cost) {
                (Some(salt), _) => SaltOrCost::Salt(salt),
                (None, cost) => SaltOrCost::Cost(cost.unwrap_or(hasher.default_cost())),
            };
            println!("{}", hasher.hash_async(input, salt).await?);
        }
        Commands::Compare { input, digest } => {
            if hasher.compare_async(input, digest).await? {
                println!("match");
            } else {
                println!("no match");
                std::process::exit(1);
            }
        }
        Commands::Cost { digest } => {
            println!("{}", extract_cost_factor(&digest)?);
        }
        Commands::Next { expression, count } => {
            let rule = cron::parse(&expression)?;
            let mut after = Utc::now();
            for _ in 0..count {
                after = rule.next_after(after, config.scheduler.horizon_years)?;
                println!("{}", after.to_rfc3339());
            }
        }
        Commands::Run => run(&config).await?,
    }
    Ok(())
}

/// `run` needs the configured jobs, so a broken config is fatal there. The
/// one-shot commands only read tunables and fall back to defaults.
fn resolve_config(
    command: &Commands,
    loaded: vigil_core::Result<VigilConfig>,
) -> anyhow::Result<VigilConfig> {
    match (command, loaded) {
        (_, Ok(config)) => Ok(config),
        (Commands::Run, Err(e)) => Err(e).context("loading config"),
        (_, Err(e)) => {
            warn!("Config load failed ({}), using defaults", e);
            Ok(VigilConfig::default())
        }
    }
}

async fn run(config: &VigilConfig) -> anyhow::Result<()> {
    if config.scheduler.jobs.is_empty() {
        bail!("no [[scheduler.jobs]] entries in config");
    }

    let scheduler = Scheduler::new(&config.scheduler);
    for entry in &config.scheduler.jobs {
        let trigger = trigger_for(entry)?;
        let name = entry.name.clone();
        let message = entry.message.clone();
        let job = scheduler
            .schedule_job(Some(&entry.name), trigger, move |fire_date| {
                info!(job = %name, %fire_date, "{message}");
                Ok(())
            })
            .with_context(|| format!("scheduling job `{}`", entry.name))?;
        if let Some(next) = job.next_invocation() {
            info!(job = %job.name(), next = %next.to_rfc3339(), "job registered");
        }
    }

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let engine = tokio::spawn(scheduler.clone().run(shutdown_rx));

    tokio::signal::ctrl_c().await?;
    info!("Ctrl-C received");

    // signal scheduler to stop
    let _ = shutdown_tx.send(true);
    engine.await?;
    scheduler.shutdown_all();
    Ok(())
}

fn trigger_for(entry: &JobConfig) -> anyhow::Result<Trigger> {
    if let Some(ref expression) = entry.cron {
        return Ok(Trigger::from(expression.as_str()));
    }
    if let Some(ref at) = entry.at {
        let at: DateTime<Utc> = DateTime::parse_from_rfc3339(at)
            .with_context(|| format!("job `{}`: bad `at` timestamp", entry.name))?
            .with_timezone(&Utc);
        return Ok(Trigger::from(at));
    }
    bail!("job `{}` needs either `cron` or `at`", entry.name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_core::error::VigilError;

    fn broken() -> vigil_core::Result<VigilConfig> {
        Err(VigilError::Config("scheduler.horizon_years must be at least 1".into()))
    }

    #[test]
    fn run_fails_on_a_broken_config() {
        let err = resolve_config(&Commands::Run, broken()).unwrap_err();
        assert_eq!(err.to_string(), "loading config");
        assert!(format!("{err:#}").contains("horizon_years"));
    }

    #[test]
    fn one_shot_commands_fall_back_to_defaults() {
        let config = resolve_config(&Commands::Salt { cost: None }, broken()).unwrap();
        assert!(config.scheduler.jobs.is_empty());
        assert_eq!(config.hash.default_cost, VigilConfig::default().hash.default_cost);
    }

    #[test]
    fn loaded_config_is_used_as_is() {
        let mut loaded = VigilConfig::default();
        loaded.scheduler.horizon_years = 9;
        let config = resolve_config(&Commands::Run, Ok(loaded)).unwrap();
        assert_eq!(config.scheduler.horizon_years, 9);
    }
}
