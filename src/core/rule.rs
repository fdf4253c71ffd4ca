//! Rule spec data structures
//!
//! A [`FirewallRuleSpec`] is the declarative description of one desired
//! `iptables` rule. It is deserialized from a rule file (see
//! [`ruleset`](crate::core::ruleset)), validated, and handed to the
//! [`compiler`](crate::core::compiler).
//!
//! # Example
//!
//! ```
//! use fwconverge::core::rule::{Action, Direction, FirewallRuleSpec, PortSpec};
//!
//! let spec = FirewallRuleSpec {
//!     action: Action::Allow,
//!     direction: Some(Direction::In),
//!     protocol: Some("tcp".to_string()),
//!     dest_port: Some(PortSpec::single(22)),
//!     description: "ssh".to_string(),
//!     ..FirewallRuleSpec::default()
//! };
//! assert!(spec.validate().is_ok());
//! ```

use crate::core::error::{Error, Result};
use crate::validators;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Source address that means "any" and is never emitted as `-s`
pub const ANY_SOURCE: &str = "0.0.0.0/0";

/// Desired disposition of matching packets
#[derive(
    Debug,
    Clone,
    Copy,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    Default,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    strum::AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Action {
    #[default]
    Allow,
    Deny,
    Reject,
    Redirect,
    Masquerade,
    Log,
}

impl Action {
    /// Returns the `-j` target for this action
    pub const fn target(self) -> &'static str {
        match self {
            Action::Allow => "ACCEPT",
            Action::Deny => "DROP",
            Action::Reject => "REJECT",
            Action::Masquerade => "MASQUERADE",
            Action::Redirect => "REDIRECT",
            Action::Log => "LOG --log-prefix \"iptables: \" --log-level 7",
        }
    }
}

/// Traffic direction, selects the chain
#[derive(
    Debug,
    Clone,
    Copy,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    strum::AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Direction {
    In,
    Out,
    Pre,
    Post,
}

impl Direction {
    pub const fn chain(self) -> Chain {
        match self {
            Direction::In => Chain::Input,
            Direction::Out => Chain::Output,
            Direction::Pre => Chain::Prerouting,
            Direction::Post => Chain::Postrouting,
        }
    }

    /// PREROUTING/POSTROUTING rules are emitted against the nat table
    pub const fn is_nat(self) -> bool {
        matches!(self, Direction::Pre | Direction::Post)
    }
}

/// Built-in chain a rule lands in
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::EnumIter)]
pub enum Chain {
    Input,
    Output,
    Prerouting,
    Postrouting,
    Forward,
}

impl Chain {
    /// Chain for an optional direction; no direction means FORWARD
    pub const fn for_direction(direction: Option<Direction>) -> Self {
        match direction {
            Some(d) => d.chain(),
            None => Chain::Forward,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Chain::Input => "INPUT",
            Chain::Output => "OUTPUT",
            Chain::Prerouting => "PREROUTING",
            Chain::Postrouting => "POSTROUTING",
            Chain::Forward => "FORWARD",
        }
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One element of a port match
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortEntry {
    Single(u16),
    Range(u16, u16),
}

impl fmt::Display for PortEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortEntry::Single(p) => write!(f, "{p}"),
            PortEntry::Range(start, end) => write!(f, "{start}:{end}"),
        }
    }
}

impl std::str::FromStr for PortEntry {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let parse = |p: &str| {
            p.trim()
                .parse::<u16>()
                .map_err(|_| format!("Invalid port '{}'", p.trim()))
        };
        match s.split_once(':') {
            Some((start, end)) => Ok(PortEntry::Range(parse(start)?, parse(end)?)),
            None => Ok(PortEntry::Single(parse(s)?)),
        }
    }
}

/// A single port, a range or an ordered list of both
///
/// Serialized the way the multiport module expects: `22`, `8000:9000`,
/// `80,443,8000:9000`. Order is preserved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "PortInput", into = "String")]
pub struct PortSpec(Vec<PortEntry>);

impl PortSpec {
    pub fn single(port: u16) -> Self {
        Self(vec![PortEntry::Single(port)])
    }

    pub fn range(start: u16, end: u16) -> Self {
        Self(vec![PortEntry::Range(start, end)])
    }

    pub fn list(entries: Vec<PortEntry>) -> Self {
        Self(entries)
    }

    pub fn entries(&self) -> &[PortEntry] {
        &self.0
    }

    fn validate(&self) -> std::result::Result<(), String> {
        if self.0.is_empty() {
            return Err("Port list must not be empty".to_string());
        }
        // multiport accepts at most 15 ports, a range counting as two
        let slots: usize = self
            .0
            .iter()
            .map(|e| match e {
                PortEntry::Single(_) => 1,
                PortEntry::Range(..) => 2,
            })
            .sum();
        if slots > 15 {
            return Err("Too many ports for multiport (max 15, ranges count twice)".to_string());
        }
        for entry in &self.0 {
            match *entry {
                PortEntry::Single(p) => {
                    validators::validate_port(p)?;
                }
                PortEntry::Range(start, end) => {
                    validators::validate_port_range(start, end)?;
                }
            }
        }
        Ok(())
    }
}

impl fmt::Display for PortSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, entry) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{entry}")?;
        }
        Ok(())
    }
}

impl From<PortSpec> for String {
    fn from(spec: PortSpec) -> Self {
        spec.to_string()
    }
}

/// Accepted input shapes for a port field
#[derive(Deserialize)]
#[serde(untagged)]
enum PortInput {
    Number(u16),
    Range { start: u16, end: u16 },
    Text(String),
    List(Vec<PortInput>),
}

impl PortInput {
    fn flatten_into(self, out: &mut Vec<PortEntry>) -> std::result::Result<(), String> {
        match self {
            PortInput::Number(p) => out.push(PortEntry::Single(p)),
            PortInput::Range { start, end } => out.push(PortEntry::Range(start, end)),
            PortInput::Text(text) => {
                for part in text.split(',') {
                    out.push(part.parse()?);
                }
            }
            PortInput::List(items) => {
                for item in items {
                    item.flatten_into(out)?;
                }
            }
        }
        Ok(())
    }
}

impl TryFrom<PortInput> for PortSpec {
    type Error = String;

    fn try_from(input: PortInput) -> std::result::Result<Self, Self::Error> {
        let mut entries = Vec::new();
        input.flatten_into(&mut entries)?;
        Ok(Self(entries))
    }
}

/// Connection-state match, a single state or an ordered list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Stateful {
    One(String),
    Many(Vec<String>),
}

impl Stateful {
    /// Upper-cased, comma-joined form used by `--state`
    pub fn to_state_list(&self) -> String {
        match self {
            Stateful::One(state) => state.to_uppercase(),
            Stateful::Many(states) => states.join(",").to_uppercase(),
        }
    }

    fn states(&self) -> &[String] {
        match self {
            Stateful::One(state) => std::slice::from_ref(state),
            Stateful::Many(states) => states,
        }
    }
}

/// Declarative description of one iptables rule
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FirewallRuleSpec {
    /// Resource name used in logs; falls back to the description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub action: Action,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<Direction>,
    /// 1-based insert position; absent means append
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_port: Option<PortSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dest_port: Option<PortSpec>,
    /// Alias for `dest_port`, used only when `dest_port` is unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<PortSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interface: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dest_interface: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stateful: Option<Stateful>,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_port: Option<u16>,
    /// Verbatim rule text; overrides every structured field
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
}

impl FirewallRuleSpec {
    /// Name shown in log lines and reports
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.description)
    }

    pub fn chain(&self) -> Chain {
        Chain::for_direction(self.direction)
    }

    /// `dest_port` if set, otherwise `port`
    pub fn effective_dest_port(&self) -> Option<&PortSpec> {
        self.dest_port.as_ref().or(self.port.as_ref())
    }

    /// Checks structured fields before compilation.
    ///
    /// Raw rules are not inspected: they are passed through verbatim.
    ///
    /// # Errors
    ///
    /// Returns `Error::Validation` naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        if self.raw.is_some() {
            return Ok(());
        }

        if let Some(position) = self.position {
            if position == 0 {
                return Err(Error::validation("position", "Position is 1-based"));
            }
            if self.direction.is_none() {
                return Err(Error::validation(
                    "position",
                    "Position requires a direction (FORWARD is append-only)",
                ));
            }
        }

        if let Some(ref source) = self.source
            && source != ANY_SOURCE
        {
            validators::validate_network(source).map_err(|e| Error::validation("source", e))?;
        }
        if let Some(ref destination) = self.destination {
            validators::validate_network(destination)
                .map_err(|e| Error::validation("destination", e))?;
        }
        if let Some(ref protocol) = self.protocol {
            validators::validate_protocol(protocol)
                .map_err(|e| Error::validation("protocol", e))?;
        }
        if let Some(ref ports) = self.source_port {
            ports
                .validate()
                .map_err(|e| Error::validation("source_port", e))?;
        }
        if let Some(ref ports) = self.dest_port {
            ports
                .validate()
                .map_err(|e| Error::validation("dest_port", e))?;
        }
        if let Some(ref ports) = self.port {
            ports.validate().map_err(|e| Error::validation("port", e))?;
        }
        if let Some(ref iface) = self.interface {
            validators::validate_interface(iface)
                .map_err(|e| Error::validation("interface", e))?;
        }
        if let Some(ref iface) = self.dest_interface {
            validators::validate_interface(iface)
                .map_err(|e| Error::validation("dest_interface", e))?;
        }
        if let Some(ref stateful) = self.stateful {
            if stateful.states().is_empty() {
                return Err(Error::validation("stateful", "State list must not be empty"));
            }
            for state in stateful.states() {
                validators::validate_state(state)
                    .map_err(|e| Error::validation("stateful", e))?;
            }
        }
        validators::validate_comment(&self.description)
            .map_err(|e| Error::validation("description", e))?;

        if self.action == Action::Redirect {
            let port = self.redirect_port.ok_or_else(|| {
                Error::validation("redirect_port", "Redirect requires a redirect_port")
            })?;
            validators::validate_port(port).map_err(|e| Error::validation("redirect_port", e))?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ssh_spec() -> FirewallRuleSpec {
        FirewallRuleSpec {
            action: Action::Allow,
            direction: Some(Direction::In),
            protocol: Some("tcp".to_string()),
            dest_port: Some(PortSpec::single(22)),
            description: "ssh".to_string(),
            ..FirewallRuleSpec::default()
        }
    }

    #[test]
    fn test_chain_mapping() {
        assert_eq!(Chain::for_direction(Some(Direction::In)).as_str(), "INPUT");
        assert_eq!(Chain::for_direction(Some(Direction::Out)).as_str(), "OUTPUT");
        assert_eq!(
            Chain::for_direction(Some(Direction::Pre)).as_str(),
            "PREROUTING"
        );
        assert_eq!(
            Chain::for_direction(Some(Direction::Post)).as_str(),
            "POSTROUTING"
        );
        assert_eq!(Chain::for_direction(None).as_str(), "FORWARD");
    }

    #[test]
    fn test_action_targets() {
        assert_eq!(Action::Allow.target(), "ACCEPT");
        assert_eq!(Action::Deny.target(), "DROP");
        assert_eq!(Action::Reject.target(), "REJECT");
        assert_eq!(Action::Masquerade.target(), "MASQUERADE");
        assert_eq!(Action::Redirect.target(), "REDIRECT");
        assert_eq!(
            Action::Log.target(),
            "LOG --log-prefix \"iptables: \" --log-level 7"
        );
    }

    #[test]
    fn test_action_from_str() {
        assert_eq!("masquerade".parse::<Action>().unwrap(), Action::Masquerade);
        assert!("accept".parse::<Action>().is_err());
    }

    #[test]
    fn test_port_spec_display() {
        assert_eq!(PortSpec::single(22).to_string(), "22");
        assert_eq!(PortSpec::range(8000, 9000).to_string(), "8000:9000");
        let list = PortSpec::list(vec![
            PortEntry::Single(80),
            PortEntry::Single(443),
            PortEntry::Range(8000, 8100),
        ]);
        assert_eq!(list.to_string(), "80,443,8000:8100");
    }

    #[test]
    fn test_port_spec_deserialize_shapes() {
        let single: PortSpec = serde_json::from_str("22").unwrap();
        assert_eq!(single, PortSpec::single(22));

        let text: PortSpec = serde_json::from_str("\"80,443\"").unwrap();
        assert_eq!(text.to_string(), "80,443");

        let range: PortSpec = serde_json::from_str("{\"start\": 1000, \"end\": 2000}").unwrap();
        assert_eq!(range, PortSpec::range(1000, 2000));

        let mixed: PortSpec = serde_json::from_str("[53, \"8000:8080\", 443]").unwrap();
        assert_eq!(mixed.to_string(), "53,8000:8080,443");

        assert!(serde_json::from_str::<PortSpec>("\"http\"").is_err());
        assert!(serde_json::from_str::<PortSpec>("70000").is_err());
    }

    #[test]
    fn test_port_spec_serializes_as_string() {
        let json = serde_json::to_string(&PortSpec::range(1, 1024)).unwrap();
        assert_eq!(json, "\"1:1024\"");
    }

    #[test]
    fn test_stateful_state_list() {
        assert_eq!(Stateful::One("new".to_string()).to_state_list(), "NEW");
        assert_eq!(
            Stateful::Many(vec!["established".to_string(), "related".to_string()])
                .to_state_list(),
            "ESTABLISHED,RELATED"
        );
    }

    #[test]
    fn test_effective_dest_port_prefers_dest_port() {
        let mut spec = ssh_spec();
        spec.port = Some(PortSpec::single(2222));
        assert_eq!(spec.effective_dest_port(), Some(&PortSpec::single(22)));

        spec.dest_port = None;
        assert_eq!(spec.effective_dest_port(), Some(&PortSpec::single(2222)));
    }

    #[test]
    fn test_display_name_falls_back_to_description() {
        let mut spec = ssh_spec();
        assert_eq!(spec.display_name(), "ssh");
        spec.name = Some("allow-ssh".to_string());
        assert_eq!(spec.display_name(), "allow-ssh");
    }

    #[test]
    fn test_validate_accepts_ssh() {
        assert!(ssh_spec().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_protocol() {
        let mut spec = ssh_spec();
        spec.protocol = Some("t c p".to_string());
        let err = spec.validate().unwrap_err();
        assert!(matches!(err, Error::Validation { ref field, .. } if field == "protocol"));
    }

    #[test]
    fn test_validate_position_requires_direction() {
        let mut spec = ssh_spec();
        spec.position = Some(1);
        assert!(spec.validate().is_ok());

        spec.direction = None;
        assert!(spec.validate().is_err());

        spec.direction = Some(Direction::In);
        spec.position = Some(0);
        assert!(spec.validate().is_err());
    }

    #[test]
    fn test_validate_redirect_requires_port() {
        let spec = FirewallRuleSpec {
            action: Action::Redirect,
            direction: Some(Direction::Pre),
            description: "web".to_string(),
            ..FirewallRuleSpec::default()
        };
        let err = spec.validate().unwrap_err();
        assert!(matches!(err, Error::Validation { ref field, .. } if field == "redirect_port"));
    }

    #[test]
    fn test_validate_any_source_is_accepted() {
        let mut spec = ssh_spec();
        spec.source = Some(ANY_SOURCE.to_string());
        assert!(spec.validate().is_ok());
        spec.source = Some("not-an-ip".to_string());
        assert!(spec.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_ipv6_addresses() {
        let mut spec = ssh_spec();
        spec.destination = Some("2001:db8::1".to_string());
        let err = spec.validate().unwrap_err();
        assert!(matches!(err, Error::Validation { ref field, .. } if field == "destination"));
    }

    #[test]
    fn test_validate_too_many_ports() {
        let mut spec = ssh_spec();
        spec.dest_port = Some(PortSpec::list(
            (1..=8).map(|p| PortEntry::Range(p * 100, p * 100 + 10)).collect(),
        ));
        assert!(spec.validate().is_err());
    }

    #[test]
    fn test_validate_skips_raw() {
        let spec = FirewallRuleSpec {
            protocol: Some("!!".to_string()),
            raw: Some("INPUT -j ACCEPT".to_string()),
            ..FirewallRuleSpec::default()
        };
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn test_deserialize_rule() {
        let json = r#"{
            "action": "allow",
            "direction": "in",
            "protocol": "tcp",
            "port": [80, 443],
            "stateful": ["new", "established"],
            "description": "web"
        }"#;
        let spec: FirewallRuleSpec = serde_json::from_str(json).unwrap();
        assert_eq!(spec.direction, Some(Direction::In));
        assert_eq!(spec.effective_dest_port().unwrap().to_string(), "80,443");
        assert!(matches!(spec.stateful, Some(Stateful::Many(ref s)) if s.len() == 2));
    }

    #[test]
    fn test_deserialize_rejects_unknown_field() {
        let json = r#"{"action": "allow", "prot": "tcp"}"#;
        assert!(serde_json::from_str::<FirewallRuleSpec>(json).is_err());
    }
}
