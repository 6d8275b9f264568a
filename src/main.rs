//! Move Guardian - one-shot pre-signing risk verdict
//!
//! Verifies a proposed Move entry-function call against the chain, runs the
//! pattern engine and evidence sources, and prints the scored verdict.
//!
//! Example:
//!   move_guardian 0x1::coin::transfer --sender 0xcafe \
//!       --type-arg 0x1::aptos_coin::AptosCoin --arg 0xbeef --arg 100

use clap::{Parser, ValueEnum};
use eyre::Result;
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use move_guardian::{AnalysisRequest, FunctionPath, Guardian, GuardianConfig, MemoryStore, Network};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Json,
    Text,
}

#[derive(Debug, Parser)]
#[command(name = "move_guardian", version, about = "Pre-signing risk verdicts for Move entry functions")]
struct Cli {
    /// Function to call, as `address::module::function`
    function: String,

    /// mainnet, testnet or devnet
    #[arg(long, default_value = "mainnet")]
    network: String,

    /// Sender account address
    #[arg(long, default_value = "0x1")]
    sender: String,

    /// Type argument (repeatable)
    #[arg(long = "type-arg")]
    type_args: Vec<String>,

    /// Value argument, parsed as JSON when possible (repeatable)
    #[arg(long = "arg")]
    args: Vec<String>,

    /// Path to a simulation outcome JSON file
    #[arg(long)]
    simulation: Option<String>,

    #[arg(long, value_enum, default_value = "json")]
    format: OutputFormat,
}

fn parse_arg(raw: &str) -> serde_json::Value {
    serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_string()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so stdout stays machine-readable
    FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let network: Network = cli.network.parse()?;
    let function = FunctionPath::parse(&cli.function)?;
    let mut request = AnalysisRequest::new(network, &cli.sender, function)?
        .with_type_arguments(cli.type_args)
        .with_arguments(cli.args.iter().map(|a| parse_arg(a)).collect());
    if let Some(path) = &cli.simulation {
        let raw = std::fs::read_to_string(path)?;
        request = request.with_simulation(serde_json::from_str(&raw)?);
    }

    let guardian = Guardian::from_config(GuardianConfig::from_env(), Arc::new(MemoryStore::new()))?;
    let result = guardian.analyze(&request).await;

    match cli.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
        OutputFormat::Text => println!("{}", result.summary()),
    }

    Ok(())
}
