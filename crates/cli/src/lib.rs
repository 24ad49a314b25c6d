//! repkv CLI -- execute command scripts against the engine and generate
//! random workloads.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "repkv",
    about = "Replicated key-value store simulator with snapshot-isolated transactions"
)]
pub struct App {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Execute a command script against a fresh cluster
    Run(RunArgs),
    /// Generate random workload scripts
    Generate(GenerateArgs),
}

#[derive(Debug, Parser)]
pub struct RunArgs {
    /// The command script to execute, one command per line
    pub input: PathBuf,
}

#[derive(Debug, Parser)]
pub struct GenerateArgs {
    /// Number of workload scripts to generate
    #[arg(long)]
    pub n_workload: u64,
    /// Transactions per workload
    #[arg(long)]
    pub n_transaction: u64,
    /// Read/write operations per transaction
    #[arg(long)]
    pub n_op: u64,
    /// How many transactions run concurrently
    #[arg(long, default_value_t = 3)]
    pub n_concurrent: u64,
    /// Fail/recover pairs per workload
    #[arg(long, default_value_t = 0)]
    pub n_fault: u64,
    /// Output directory for the generated scripts
    #[arg(long)]
    pub output_dir: PathBuf,
}
