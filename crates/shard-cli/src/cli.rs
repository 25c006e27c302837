use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "shard",
    about = "Shardable ledger: epoch-based consolidation over single-document stores",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Snapshot file holding the ledger documents
    #[arg(long, global = true, default_value = "ledger.json")]
    pub db: PathBuf,

    /// TOML file overriding protocol checks
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Start from the permissive preset instead of the defaults
    #[arg(long, global = true)]
    pub permissive: bool,

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

#[derive(Subcommand)]
pub enum Command {
    /// Register a transaction file with the open epoch
    Connect(ConnectArgs),
    /// Add an account to a transaction without advising an amount
    AddParticipant(ParticipantArgs),
    /// Advise a pending amount for an account
    Advise(AdviseArgs),
    /// Close a transaction
    CloseTx(TxArgs),
    /// Close a transaction file
    CloseTxf(FileArgs),
    /// Close an epoch (every registered file must be closed)
    CloseEpoch(EpochArgs),
    /// Consolidate one account's transaction into a closed epoch
    Consolidate(ConsolidateArgs),
    /// Mark a closed epoch as consolidated
    ConsolidateEpoch(EpochArgs),
    /// Settled balance of an account at an epoch
    Balance(BalanceArgs),
    /// Available balance of an account
    Available(AccountArgs),
    /// Show an epoch's files and what blocks it
    Report(EpochArgs),
    /// Print the raw snapshot
    Show,
    /// Run a payer/payee walkthrough on a fresh in-memory ledger
    Demo(DemoArgs),
}

#[derive(Args)]
pub struct ConnectArgs {
    pub file: String,
}

#[derive(Args)]
pub struct ParticipantArgs {
    pub file: String,
    pub tx: String,
    pub account: String,
}

#[derive(Args)]
pub struct AdviseArgs {
    pub file: String,
    pub tx: String,
    pub account: String,
    #[arg(allow_hyphen_values = true)]
    pub amount: i64,
}

#[derive(Args)]
pub struct TxArgs {
    pub file: String,
    pub tx: String,
}

#[derive(Args)]
pub struct FileArgs {
    pub file: String,
}

#[derive(Args)]
pub struct EpochArgs {
    pub epoch: u64,
}

#[derive(Args)]
pub struct ConsolidateArgs {
    pub epoch: u64,
    pub account: String,
    pub tx: String,
}

#[derive(Args)]
pub struct BalanceArgs {
    pub epoch: u64,
    pub account: String,
}

#[derive(Args)]
pub struct AccountArgs {
    pub account: String,
}

#[derive(Args)]
pub struct DemoArgs {
    #[arg(long, default_value = "alice")]
    pub payer: String,
    #[arg(long, default_value = "bob")]
    pub payee: String,
    #[arg(long, default_value_t = 100)]
    pub amount: i64,
}
