use anyhow::Result;
use clap::{Parser, Subcommand};
use std::process::Command;

#[derive(Parser)]
#[command(name = "xtask", about = "Workspace automation for bendsim")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run all checks: fmt, clippy, tests, doc, then the demo scenario
    Check,
    /// Run cargo fmt --check on all crates
    Fmt,
    /// Run clippy on all crates
    Clippy,
    /// Run all tests
    Test,
    /// Run the collider benchmarks
    Bench,
    /// Build rustdoc for the workspace
    Doc,
    /// Run the demo scenario and the kernel replay check
    Sim {
        #[arg(short, long, default_value = "200")]
        ticks: u64,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Check => {
            run_fmt()?;
            run_clippy()?;
            run_tests()?;
            run_doc()?;
            run_sim(100)?;
        }
        Commands::Fmt => run_fmt()?,
        Commands::Clippy => run_clippy()?,
        Commands::Test => run_tests()?,
        Commands::Bench => run_bench()?,
        Commands::Doc => run_doc()?,
        Commands::Sim { ticks } => run_sim(ticks)?,
    }

    Ok(())
}

fn cargo(what: &str, args: &[&str]) -> Result<()> {
    println!("==> Running {what}");
    let status = Command::new("cargo").args(args).status()?;
    if !status.success() {
        anyhow::bail!("{what} failed");
    }
    Ok(())
}

fn run_fmt() -> Result<()> {
    cargo("cargo fmt --check", &["fmt", "--all", "--", "--check"])
}

fn run_clippy() -> Result<()> {
    cargo(
        "cargo clippy",
        &["clippy", "--workspace", "--all-targets", "--", "-D", "warnings"],
    )
}

fn run_tests() -> Result<()> {
    cargo("cargo test", &["test", "--workspace"])
}

fn run_bench() -> Result<()> {
    cargo(
        "collider benchmarks",
        &["bench", "-p", "bendsim-collider"],
    )
}

fn run_doc() -> Result<()> {
    cargo("cargo doc", &["doc", "--workspace", "--no-deps"])
}

fn run_sim(ticks: u64) -> Result<()> {
    let ticks = ticks.to_string();
    cargo(
        "demo scenario",
        &["run", "-p", "bendsim-cli", "--", "run", "--ticks", &ticks],
    )?;
    cargo(
        "kernel replay check",
        &["run", "-p", "bendsim-cli", "--", "replay", "--ticks", &ticks],
    )
}
