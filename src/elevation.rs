//! Privilege elevation for `iptables` invocations
//!
//! Listing and mutating the kernel rule table requires `CAP_NET_ADMIN`.
//! fwconverge runs unprivileged when it can and wraps the packet-filter
//! binary with an elevation helper only when needed.
//!
//! # Elevation Strategy
//!
//! - **Root**: run the program directly
//! - **Preferred**: `run0` when available (systemd v256+, no SUID)
//! - **Terminal fallback**: `sudo`
//! - **Non-terminal fallback**: `pkexec`
//!
//! # Environment Variables
//!
//! - `FWCONVERGE_ELEVATION_METHOD`: force `sudo`, `run0`, or `pkexec`. Useful
//!   with sudoers NOPASSWD rules in convergence runs.
//! - `FWCONVERGE_TEST_NO_ELEVATION`: bypass elevation entirely (tests only).
//!
//! Commands are built with explicit argument vectors, never through a shell.

use std::io;
use std::path::Path;
use std::process::Command;

/// Forces a specific elevation helper
pub const ELEVATION_METHOD_ENV: &str = "FWCONVERGE_ELEVATION_METHOD";

/// Bypasses elevation (tests only)
pub const TEST_NO_ELEVATION_ENV: &str = "FWCONVERGE_TEST_NO_ELEVATION";

/// Error type for privilege elevation operations
#[derive(Debug, thiserror::Error)]
pub enum ElevationError {
    /// pkexec binary not found in PATH
    #[error("pkexec not found - please install PolicyKit or run as root")]
    PkexecNotFound,

    /// Requested elevation method is not available (binary not found)
    #[error("Elevation method '{0}' is not available (binary not found)")]
    MethodNotAvailable(String),

    /// Invalid value for `FWCONVERGE_ELEVATION_METHOD`
    #[error("Invalid FWCONVERGE_ELEVATION_METHOD '{0}'. Valid options: sudo, run0, pkexec")]
    InvalidMethod(String),
}

/// Checks if a binary exists in PATH
fn binary_exists(name: &str) -> bool {
    std::env::var_os("PATH")
        .and_then(|paths| {
            std::env::split_paths(&paths).find_map(|dir| {
                let full_path = dir.join(name);
                if full_path.is_file() {
                    Some(full_path)
                } else {
                    None
                }
            })
        })
        .is_some()
}

fn wrapped(helper: &str, program: &Path, args: &[&str]) -> Command {
    let mut cmd = Command::new(helper);
    cmd.arg(program).args(args);
    cmd
}

fn direct(program: &Path, args: &[&str]) -> Command {
    let mut cmd = Command::new(program);
    cmd.args(args);
    cmd
}

/// Builds a command running `program` with root privileges.
///
/// # Errors
///
/// Returns `Err` if the forced method is unknown or unavailable, or if no
/// elevation helper can be found.
pub fn create_elevated_command(program: &Path, args: &[&str]) -> Result<Command, ElevationError> {
    use std::os::fd::AsFd;

    if std::env::var_os(TEST_NO_ELEVATION_ENV).is_some() {
        return Ok(direct(program, args));
    }

    if nix::unistd::getuid().is_root() {
        return Ok(direct(program, args));
    }

    if let Ok(method) = std::env::var(ELEVATION_METHOD_ENV) {
        let method = method.to_lowercase();
        if !method.is_empty() {
            return match method.as_str() {
                "sudo" | "run0" | "pkexec" => {
                    if binary_exists(&method) {
                        Ok(wrapped(&method, program, args))
                    } else {
                        Err(ElevationError::MethodNotAvailable(method))
                    }
                }
                _ => Err(ElevationError::InvalidMethod(method)),
            };
        }
    }

    if binary_exists("run0") {
        return Ok(wrapped("run0", program, args));
    }

    let is_atty = nix::unistd::isatty(io::stdin().as_fd()).unwrap_or(false);

    if is_atty {
        Ok(wrapped("sudo", program, args))
    } else {
        if !binary_exists("pkexec") {
            return Err(ElevationError::PkexecNotFound);
        }
        Ok(wrapped("pkexec", program, args))
    }
}
