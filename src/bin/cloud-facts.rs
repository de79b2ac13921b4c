//! CLI binary for cloud-facts crate.

use std::error::Error;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use cloud_facts::{CloudProvider, Facts, HarvestOptions, HarvestOutcome, Harvester};

#[derive(Parser)]
#[command(name = "cloud-facts")]
#[command(
    author,
    version,
    about = "Harvest cloud instance metadata as host facts"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level used when RUST_LOG is not set
    #[arg(
        long,
        global = true,
        default_value = "warn",
        value_parser = ["off", "error", "warn", "info", "debug", "trace"]
    )]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Check whether the metadata service is reachable
    Probe {
        #[command(flatten)]
        target: Target,
    },

    /// Harvest metadata facts
    Harvest {
        #[command(flatten)]
        target: Target,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,

        /// Run the pass even if it already ran
        #[arg(long)]
        force: bool,
    },
}

#[derive(Args)]
struct Target {
    /// Cloud provider to talk to
    #[arg(short, long, default_value = "gce", value_parser = parse_provider)]
    provider: CloudProvider,

    /// Metadata service base URL (defaults to the provider's link-local address)
    #[arg(long)]
    base_url: Option<String>,

    /// Deadline of each reachability attempt, in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Maximum number of reachability attempts
    #[arg(long)]
    retry_limit: Option<u32>,

    /// Fact to compare against the platform value
    #[arg(long)]
    platform_fact: Option<String>,

    /// Platform value marking the host as a candidate
    #[arg(long)]
    platform_value: Option<String>,

    /// Host fact as NAME=VALUE, e.g. virtual=gce (repeatable)
    #[arg(long = "fact", value_parser = parse_fact)]
    facts: Vec<(String, String)>,
}

impl Target {
    fn options(&self) -> HarvestOptions {
        let mut options = HarvestOptions::default();
        if let Some(timeout_ms) = self.timeout_ms {
            options.timeout_ms = timeout_ms;
        }
        if let Some(retry_limit) = self.retry_limit {
            options.retry_limit = retry_limit;
        }
        if let Some(fact) = &self.platform_fact {
            options.fact = Some(fact.clone());
        }
        if let Some(value) = &self.platform_value {
            options.value = Some(value.clone());
        }
        options
    }

    fn host_facts(&self) -> Facts {
        self.facts
            .iter()
            .fold(Facts::new(), |facts, (name, value)| facts.with(name, value.as_str()))
    }

    fn harvester(&self) -> Result<Harvester, cloud_facts::HarvestError> {
        Harvester::from_options(self.provider, self.base_url.as_deref(), self.options())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("unknown format: {}", s)),
        }
    }
}

fn parse_provider(s: &str) -> Result<CloudProvider, String> {
    match s.to_lowercase().as_str() {
        "ec2" | "aws" => Ok(CloudProvider::Ec2),
        "gce" | "gcp" => Ok(CloudProvider::Gce),
        _ => Err(format!("unknown provider: {} (expected ec2 or gce)", s)),
    }
}

fn parse_fact(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((name, value)) if !name.is_empty() => Ok((name.to_string(), value.to_string())),
        _ => Err(format!("expected NAME=VALUE, got: {}", s)),
    }
}

fn init_logging(level: &str) {
    let env = env_logger::Env::default().filter_or("RUST_LOG", level);
    env_logger::Builder::from_env(env)
        .format_timestamp(None)
        .target(env_logger::Target::Stderr)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    match cli.command {
        Commands::Probe { target } => {
            let harvester = target.harvester()?;
            let reachable = harvester.probe(&target.host_facts()).await?;
            println!(
                "{}: {}",
                harvester.provider(),
                if reachable { "reachable" } else { "unavailable" }
            );
            Ok(())
        }

        Commands::Harvest {
            target,
            format,
            force,
        } => {
            let harvester = target.harvester()?;
            let mut facts = target.host_facts();
            let outcome = harvester.harvest(&mut facts, force).await?;
            if outcome == HarvestOutcome::Unavailable {
                log::info!("No {} metadata service available", harvester.provider());
            }

            let prefix = format!("{}_", harvester.provider().fact_prefix());
            let harvested = facts
                .iter()
                .filter(|(name, _)| name.starts_with(&prefix))
                .fold(Facts::new(), |acc, (name, value)| acc.with(name, value.clone()));

            match format {
                OutputFormat::Text => {
                    for (name, value) in harvested.iter() {
                        println!("{name} => {value}");
                    }
                }
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&harvested)?);
                }
            }
            Ok(())
        }
    }
}
