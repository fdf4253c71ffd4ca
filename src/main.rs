//! fwconverge - declarative iptables rule convergence
//!
//! # Usage
//!
//! ```bash
//! fwconverge list                    # List named rule files
//! fwconverge compile web             # Print the compiled iptables arguments
//! fwconverge check web               # Report which rules are already live
//! fwconverge apply web               # Insert/append the missing rules
//! fwconverge apply web --dry-run     # Show what apply would run
//! fwconverge audit -n 20             # Show recent mutations
//! ```
//!
//! `web` resolves to `~/.local/share/fwconverge/rules/web.json`; a path
//! works as well.

use clap::{Parser, Subcommand};
use fwconverge::audit::AuditLog;
use fwconverge::config::{self, AppConfig};
use fwconverge::core::apply::{Applier, ApplyOutcome};
use fwconverge::core::backend::IptablesBackend;
use fwconverge::core::error::{Error, IptablesErrorPattern};
use fwconverge::core::ruleset::{self, RuleFile};
use fwconverge::{compile, utils};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "fwconverge")]
#[command(about = "Converge iptables rules from declarative rule files", long_about = None)]
struct Cli {
    /// Debug logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,
    /// Config file (default: ~/.config/fwconverge/config.json)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List named rule files
    List,
    /// Print the compiled iptables arguments for each rule
    Compile {
        /// Rule file name or path
        file: String,
    },
    /// Report whether each rule is already live
    Check {
        /// Rule file name or path
        file: String,
    },
    /// Apply missing rules
    Apply {
        /// Rule file name or path
        file: String,
        /// Print the commands without running them
        #[arg(long)]
        dry_run: bool,
    },
    /// Show recent audit log entries
    Audit {
        /// Number of entries
        #[arg(short = 'n', long, default_value_t = 10)]
        count: usize,
    },
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = utils::ensure_dirs() {
        warn!("Could not create data directories: {e}");
    }
    let config = config::load_config(cli.config.as_deref());

    match handle_cli(cli.command, &config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            report_error(&e);
            ExitCode::FAILURE
        }
    }
}

fn report_error(error: &Error) {
    eprintln!("Error: {error}");
    if let Error::Mutation {
        message, stderr, ..
    } = error
    {
        let translation = IptablesErrorPattern::match_error(stderr.as_deref().unwrap_or(message));
        eprintln!("  {}", translation.user_message);
        for suggestion in &translation.suggestions {
            eprintln!("  - {suggestion}");
        }
    }
}

fn load(file: &str) -> Result<RuleFile, Error> {
    let path = ruleset::resolve_rule_path(file)?;
    ruleset::load_rule_file(&path)
}

fn build_applier(config: &AppConfig, dry_run: bool) -> Applier<IptablesBackend> {
    let backend = IptablesBackend::from_env_or(config.iptables_command.clone());
    let mut applier = Applier::new(backend)
        .with_detector(config.detection.detector())
        .dry_run(dry_run);

    if config.audit_log && !dry_run {
        match AuditLog::new() {
            Ok(audit) => applier = applier.with_audit(audit),
            Err(e) => warn!("Audit log disabled: {e}"),
        }
    }
    applier
}

fn handle_cli(command: Commands, config: &AppConfig) -> Result<(), Error> {
    match command {
        Commands::List => {
            let names = ruleset::list_rule_files()?;
            if names.is_empty() {
                println!("No rule files found.");
            } else {
                println!("Available rule files:");
                for name in names {
                    println!("  {name}");
                }
            }
        }
        Commands::Compile { file } => {
            for spec in &load(&file)?.rules {
                println!("{}: {}", spec.display_name(), compile(spec)?);
            }
        }
        Commands::Check { file } => {
            let rules = load(&file)?.rules;
            let applier = build_applier(config, true);
            let mut missing = 0;
            for spec in &rules {
                let (compiled, present) = applier.check(spec)?;
                let mark = if present { "✓" } else { "✗" };
                if !present {
                    missing += 1;
                }
                println!("{mark} {}: {compiled}", spec.display_name());
            }
            println!("{} of {} rules live.", rules.len() - missing, rules.len());
        }
        Commands::Apply { file, dry_run } => {
            let rules = load(&file)?.rules;
            let applier = build_applier(config, dry_run);
            let reports = applier.apply_all(&rules)?;

            let mut updated = 0;
            for report in &reports {
                match &report.outcome {
                    ApplyOutcome::Applied { command } => {
                        updated += 1;
                        println!("✓ {}: {command}", report.name);
                    }
                    ApplyOutcome::AlreadyPresent => {
                        println!("  {}: already present", report.name);
                    }
                    ApplyOutcome::WouldApply { command } => {
                        println!("~ {}: would run {command}", report.name);
                    }
                }
            }
            if !dry_run {
                println!("{updated} of {} rules applied.", reports.len());
            }
        }
        Commands::Audit { count } => {
            let audit = AuditLog::new()?;
            for event in audit.read_recent(count)? {
                println!("{}", serde_json::to_string(&event)?);
            }
        }
    }
    Ok(())
}
