//! Rule files
//!
//! A rule file is a JSON document holding an ordered list of rule specs:
//!
//! ```json
//! {
//!   "rules": [
//!     { "name": "ssh", "action": "allow", "direction": "in",
//!       "protocol": "tcp", "dest_port": 22, "description": "ssh" }
//!   ]
//! }
//! ```
//!
//! Files are addressed either by path or by name; a bare name resolves to
//! `rules/<name>.json` in the data directory.

use crate::core::error::{Error, Result};
use crate::core::rule::FirewallRuleSpec;
use crate::utils::get_data_dir;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Maximum number of rules allowed in a single file
pub const MAX_RULES: usize = 1000;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleFile {
    pub rules: Vec<FirewallRuleSpec>,
}

impl RuleFile {
    /// Parses and validates a rule file body
    ///
    /// # Errors
    ///
    /// Returns `Error::Serialization` for malformed JSON and
    /// `Error::Validation` for an oversized file or an invalid rule.
    pub fn from_json(json: &str) -> Result<Self> {
        let file: RuleFile = serde_json::from_str(json)?;

        if file.rules.len() > MAX_RULES {
            return Err(Error::validation(
                "rules",
                format!("Too many rules ({}, max {MAX_RULES})", file.rules.len()),
            ));
        }

        for (index, spec) in file.rules.iter().enumerate() {
            spec.validate().map_err(|e| match e {
                Error::Validation { field, message } => Error::Validation {
                    field: format!("rules[{index}].{field}"),
                    message,
                },
                other => other,
            })?;
        }

        Ok(file)
    }
}

/// Validates a rule file name for filesystem safety.
///
/// Alphanumeric, underscores and hyphens only, max 64 chars.
pub fn validate_rule_file_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > 64 {
        return Err(Error::validation("name", "Name must be 1-64 characters"));
    }

    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(Error::validation(
            "name",
            "Name contains invalid characters (use only a-z, 0-9, _, -)",
        ));
    }

    Ok(())
}

/// Directory holding named rule files
pub fn rules_dir() -> Option<PathBuf> {
    get_data_dir().map(|dir| dir.join("rules"))
}

/// Resolves a CLI argument to a rule file path.
///
/// An existing path, or anything containing a separator or ending in
/// `.json`, is used as-is. Otherwise the argument is a rule file name.
pub fn resolve_rule_path(arg: &str) -> Result<PathBuf> {
    let path = Path::new(arg);
    if path.exists() || arg.contains(std::path::MAIN_SEPARATOR) || arg.ends_with(".json") {
        return Ok(path.to_path_buf());
    }

    validate_rule_file_name(arg)?;
    let dir = rules_dir().ok_or_else(|| {
        Error::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "Data directory not available",
        ))
    })?;
    Ok(dir.join(format!("{arg}.json")))
}

/// Loads and validates a rule file
///
/// # Errors
///
/// Returns `Error::Io` if the file cannot be read, otherwise as
/// [`RuleFile::from_json`].
pub fn load_rule_file(path: &Path) -> Result<RuleFile> {
    debug!("Loading rules from {}", path.display());
    let json = std::fs::read_to_string(path)?;
    RuleFile::from_json(&json)
}

/// Lists the names of rule files in the data directory
pub fn list_rule_files() -> Result<Vec<String>> {
    let Some(dir) = rules_dir() else {
        return Ok(Vec::new());
    };
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut names = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file()
            && path.extension().and_then(|s| s.to_str()) == Some("json")
            && let Some(name) = path.file_stem().and_then(|s| s.to_str())
        {
            names.push(name.to_string());
        }
    }
    names.sort();
    Ok(names)
}
