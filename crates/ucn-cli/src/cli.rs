use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "ucn",
    about = "UCN ledger: hash-chained block store",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Configuration file (defaults to ./ucn.toml when present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Chain to operate on
    #[arg(long, global = true)]
    pub chain: Option<String>,

    /// Directory holding chain logs
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    #[arg(long, global = true)]
    pub backend: Option<BackendArg>,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum BackendArg {
    Memory,
    File,
}

#[derive(Subcommand)]
pub enum Command {
    /// Append a block to the chain
    Append(AppendArgs),
    /// Show a block by hash
    Show(ShowArgs),
    /// Show a block by index (-1 for the tip)
    Get(GetArgs),
    /// Print the number of blocks
    Count,
    /// List blocks, newest first
    Log(LogArgs),
    /// Remove a block and every block above it
    Remove(RemoveArgs),
    /// Remove the block at an index and every block above it
    RemoveIndex(GetArgs),
    /// Verify chain integrity
    Verify(VerifyArgs),
    /// List non-empty chains
    Chains,
    /// Rewrite the chain log without rolled-back entries
    Compact,
}

#[derive(Args)]
pub struct AppendArgs {
    /// Protocol tag describing the payload
    #[arg(short, long)]
    pub protocol: String,
    #[command(flatten)]
    pub payload: PayloadArgs,
    /// Expected tip hash; defaults to the current tip
    #[arg(long)]
    pub previous: Option<String>,
}

#[derive(Args)]
#[group(required = true, multiple = false)]
pub struct PayloadArgs {
    /// Payload as UTF-8 text
    #[arg(long)]
    pub data: Option<String>,
    /// Payload as hex
    #[arg(long)]
    pub data_hex: Option<String>,
    /// Read the payload from a file
    #[arg(long)]
    pub data_file: Option<PathBuf>,
}

#[derive(Args)]
pub struct ShowArgs {
    pub hash: String,
}

#[derive(Args)]
pub struct GetArgs {
    #[arg(allow_negative_numbers = true)]
    pub index: i64,
}

#[derive(Args)]
pub struct LogArgs {
    #[arg(short = 'n', long, default_value = "20")]
    pub limit: usize,
}

#[derive(Args)]
pub struct RemoveArgs {
    pub hash: String,
}

#[derive(Args)]
pub struct VerifyArgs {
    /// Verify every chain in the backend
    #[arg(long)]
    pub all: bool,
}
