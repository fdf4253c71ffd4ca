//! Packet-filter backend: the two external `iptables` invocations
//!
//! [`PacketFilter`] is the seam between the idempotency logic and the
//! kernel rule table. [`IptablesBackend`] shells out to `iptables` through
//! [`elevation`](crate::elevation); tests substitute an in-memory backend.
//!
//! - listing: `iptables -S <CHAIN>`
//! - mutation: `iptables (-I|-A) <compiled rule>`

use crate::core::compiler::CompiledRule;
use crate::core::error::{Error, Result};
use crate::core::rule::Chain;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, error};

/// Environment variable overriding the `iptables` binary
pub const IPTABLES_COMMAND_ENV: &str = "FWCONVERGE_IPTABLES_COMMAND";

/// Whether a rule is inserted at its position or appended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    Insert,
    Append,
}

impl Placement {
    /// `-I` when a position is given, `-A` otherwise
    pub const fn for_position(position: Option<u32>) -> Self {
        match position {
            Some(_) => Placement::Insert,
            None => Placement::Append,
        }
    }

    pub const fn flag(self) -> &'static str {
        match self {
            Placement::Insert => "-I",
            Placement::Append => "-A",
        }
    }
}

impl fmt::Display for Placement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.flag())
    }
}

/// Read and mutate access to the live rule table
pub trait PacketFilter {
    /// Program name shown in command lines and logs
    fn program(&self) -> &str;

    /// Lines of `-S <chain>` output, policy lines included.
    ///
    /// # Errors
    ///
    /// Returns `Error::ListingUnavailable` if the chain cannot be listed.
    fn list_chain(&self, chain: Chain) -> Result<Vec<String>>;

    /// Inserts or appends a compiled rule.
    ///
    /// # Errors
    ///
    /// Returns `Error::Mutation` if the command fails.
    fn mutate(&self, placement: Placement, rule: &CompiledRule) -> Result<()>;
}

/// Splits compiled rule text into arguments.
///
/// Whitespace separates arguments except inside double quotes; the quotes
/// themselves are dropped (`--comment "allow ssh"` → `--comment`, `allow ssh`).
pub fn split_args(text: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut has_token = false;

    for c in text.chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                has_token = true;
            }
            c if c.is_whitespace() && !in_quotes => {
                if has_token {
                    args.push(std::mem::take(&mut current));
                    has_token = false;
                }
            }
            c => {
                current.push(c);
                has_token = true;
            }
        }
    }
    if has_token {
        args.push(current);
    }
    args
}

/// Backend that runs the real `iptables` binary
#[derive(Debug, Clone)]
pub struct IptablesBackend {
    program: PathBuf,
    display: String,
}

impl Default for IptablesBackend {
    fn default() -> Self {
        Self::new("iptables")
    }
}

impl IptablesBackend {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        let program = program.into();
        let display = program.display().to_string();
        Self { program, display }
    }

    /// Uses `FWCONVERGE_IPTABLES_COMMAND` when set, `fallback` otherwise
    pub fn from_env_or(fallback: impl Into<PathBuf>) -> Self {
        match std::env::var_os(IPTABLES_COMMAND_ENV) {
            Some(path) if !path.is_empty() => Self::new(path),
            _ => Self::new(fallback),
        }
    }

    pub fn program_path(&self) -> &Path {
        &self.program
    }

    fn run(&self, args: &[String]) -> Result<std::process::Output> {
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let mut cmd = crate::elevation::create_elevated_command(&self.program, &arg_refs)?;
        cmd.stdin(std::process::Stdio::null());
        Ok(cmd.output()?)
    }
}

impl PacketFilter for IptablesBackend {
    fn program(&self) -> &str {
        &self.display
    }

    fn list_chain(&self, chain: Chain) -> Result<Vec<String>> {
        let args = vec!["-S".to_string(), chain.as_str().to_string()];
        let unavailable = |message: String| Error::ListingUnavailable {
            chain: chain.as_str().to_string(),
            message,
        };

        let output = self.run(&args).map_err(|e| unavailable(e.to_string()))?;

        if output.status.success() {
            let stdout = String::from_utf8_lossy(&output.stdout);
            Ok(stdout.lines().map(str::to_string).collect())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(unavailable(stderr.trim().to_string()))
        }
    }

    fn mutate(&self, placement: Placement, rule: &CompiledRule) -> Result<()> {
        let mut args = vec![placement.flag().to_string()];
        args.extend(split_args(rule.as_str()));

        debug!("Running {} {}", self.display, args.join(" "));

        let output = self.run(&args).map_err(|e| {
            error!("Failed to spawn {}: {e}", self.display);
            Error::Mutation {
                message: e.to_string(),
                stderr: None,
                exit_code: None,
            }
        })?;

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            error!("{} {} failed: {stderr}", self.display, placement);
            Err(Error::Mutation {
                message: stderr.clone(),
                stderr: Some(stderr),
                exit_code: output.status.code(),
            })
        }
    }
}
