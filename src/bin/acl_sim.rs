//! Backup ACL simulator
//!
//! Loads a scenario (users, groups, clusters, backups, shares) from TOML,
//! replays it against an in-process engine and evaluates access checks.

use anyhow::{bail, Context};
use backup_acl::scenario::Scenario;
use backup_acl::{AccessEngine, BackupRef, EngineConfig};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "acl-sim")]
#[command(about = "Replay a backup sharing scenario and evaluate access checks")]
struct Args {
    /// Scenario file (TOML)
    #[arg(short = 's', long)]
    scenario: PathBuf,

    /// Engine configuration file (TOML)
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Print the effective access and its sources for every check
    #[arg(short = 'v', long)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => EngineConfig::from_file(path)
            .with_context(|| format!("loading config {:?}", path))?,
        None => EngineConfig::default(),
    };
    let scenario = Scenario::from_file(&args.scenario)
        .with_context(|| format!("loading scenario {:?}", args.scenario))?;

    let engine = AccessEngine::builder().config(config).build()?;
    scenario.replay(&engine).context("replaying scenario")?;

    let results = scenario.run_checks(&engine)?;
    let mut failures = 0;
    for result in &results {
        let verdict = if result.passed() { "PASS" } else { "FAIL" };
        println!(
            "{} {} {} {}: expected {:?}, got {:?}",
            verdict,
            result.user,
            result.operation.verb(),
            result.backup,
            result.expected,
            result.actual
        );
        if args.verbose {
            let caller = engine.caller_for(&result.user)?;
            let reference = BackupRef::named(result.backup.as_str());
            if let Ok(explanation) = engine.explain_access(&caller, &reference) {
                println!("    effective: {:?}", explanation.effective);
                for source in &explanation.sources {
                    println!("    via {:?}", source);
                }
            }
        }
        if !result.passed() {
            failures += 1;
        }
    }

    info!(
        "{} checks, {} failed",
        scenario.checks.len(),
        failures
    );
    if failures > 0 {
        bail!("{} of {} checks failed", failures, scenario.checks.len());
    }
    Ok(())
}

