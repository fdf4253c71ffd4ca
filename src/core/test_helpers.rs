//! Shared test utilities for core module tests
//!
//! This module is only compiled in test mode.

use crate::core::backend::{PacketFilter, Placement};
use crate::core::compiler::CompiledRule;
use crate::core::error::{Error, Result};
use crate::core::rule::{Action, Chain, Direction, FirewallRuleSpec, PortSpec};
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Mutex;
use strum::IntoEnumIterator;

/// Mutex for tests that need exclusive access to environment variables.
///
/// ```ignore
/// let _guard = ENV_VAR_MUTEX.lock().unwrap();
/// unsafe {
///     std::env::set_var("FWCONVERGE_ELEVATION_METHOD", "sudo");
/// }
/// ```
pub static ENV_VAR_MUTEX: Mutex<()> = Mutex::new(());

/// `{action: allow, direction: in, protocol: tcp, dest_port: 22, description: ssh}`
pub fn ssh_spec() -> FirewallRuleSpec {
    FirewallRuleSpec {
        action: Action::Allow,
        direction: Some(Direction::In),
        protocol: Some("tcp".to_string()),
        dest_port: Some(PortSpec::single(22)),
        description: "ssh".to_string(),
        ..FirewallRuleSpec::default()
    }
}

/// `{action: redirect, direction: pre, protocol: tcp, dest_port: 80, redirect_port: 8080}`
pub fn redirect_spec() -> FirewallRuleSpec {
    FirewallRuleSpec {
        action: Action::Redirect,
        direction: Some(Direction::Pre),
        protocol: Some("tcp".to_string()),
        dest_port: Some(PortSpec::single(80)),
        redirect_port: Some(8080),
        description: "web".to_string(),
        ..FirewallRuleSpec::default()
    }
}

/// In-memory rule table that renders `-S` output like iptables does
///
/// Chains start with an `ACCEPT` policy line. Chains listed in
/// `unavailable` fail to list; `fail_mutations` makes every mutation fail.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    pub rules: RefCell<HashMap<&'static str, Vec<String>>>,
    pub unavailable: Vec<Chain>,
    pub fail_mutations: bool,
    pub mutations: RefCell<Vec<String>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a chain with existing `-A` lines
    pub fn with_rules(self, chain: Chain, lines: &[&str]) -> Self {
        self.rules.borrow_mut().insert(
            chain.as_str(),
            lines.iter().map(|l| (*l).to_string()).collect(),
        );
        self
    }

    pub fn chain_rules(&self, chain: Chain) -> Vec<String> {
        self.rules
            .borrow()
            .get(chain.as_str())
            .cloned()
            .unwrap_or_default()
    }
}

impl PacketFilter for MemoryBackend {
    fn program(&self) -> &str {
        "iptables"
    }

    fn list_chain(&self, chain: Chain) -> Result<Vec<String>> {
        if self.unavailable.contains(&chain) {
            return Err(Error::ListingUnavailable {
                chain: chain.as_str().to_string(),
                message: "iptables: No chain/target/match by that name.".to_string(),
            });
        }
        let mut lines = vec![format!("-P {chain} ACCEPT")];
        lines.extend(self.chain_rules(chain));
        Ok(lines)
    }

    fn mutate(&self, placement: Placement, rule: &CompiledRule) -> Result<()> {
        self.mutations
            .borrow_mut()
            .push(format!("{placement} {rule}"));

        if self.fail_mutations {
            return Err(Error::Mutation {
                message: "iptables: Bad argument".to_string(),
                stderr: Some("iptables: Bad argument".to_string()),
                exit_code: Some(2),
            });
        }

        let text = rule.as_str();
        let (chain_token, rest) = text.split_once(' ').unwrap_or((text, ""));
        let chain = Chain::iter()
            .find(|c| c.as_str() == chain_token)
            .unwrap_or(Chain::Forward);

        let mut table = self.rules.borrow_mut();
        let lines = table.entry(chain.as_str()).or_default();
        match placement {
            Placement::Append => lines.push(format!("-A {chain} {rest}")),
            Placement::Insert => {
                let (pos, body) = rest.split_once(' ').unwrap_or((rest, ""));
                let index = pos.parse::<usize>().unwrap_or(1).saturating_sub(1);
                lines.insert(index.min(lines.len()), format!("-A {chain} {body}"));
            }
        }
        Ok(())
    }
}
