//! Rule compiler: [`FirewallRuleSpec`] → `iptables` argument string
//!
//! Compilation builds an ordered list of [`Clause`]s and joins it once. The
//! clause order is part of the detection contract: the existence checker
//! matches the compiled text against `iptables -S` output, so compiler and
//! checker must agree on it.
//!
//! | # | Clause | Emitted when |
//! |---|--------|--------------|
//! | 1 | chain (`INPUT`, ..., `FORWARD`) | always |
//! | 2 | insert position | `position` set |
//! | 3 | `-t nat` | direction is `pre`/`post` |
//! | 4 | `-s` | `source` set and not `0.0.0.0/0` |
//! | 5 | `-p`, then `-m tcp` for tcp | `protocol` set |
//! | 6 | `-m multiport --sports` | `source_port` set |
//! | 7 | `-m multiport --dports` | `dest_port` or `port` set |
//! | 8 | `-i`, `-o` | `interface`, `dest_interface` set |
//! | 9 | `-d` | `destination` set |
//! | 10 | `-m state --state` | `stateful` set |
//! | 11 | `-m comment --comment "..."` | always |
//! | 12 | `-j <target>` | always |
//! | 13 | `--to-ports` | action is redirect |
//!
//! The `-I`/`-A` flag is not part of the compiled rule; the
//! [`Applier`](crate::core::apply::Applier) adds it.

use crate::core::error::Result;
use crate::core::rule::{ANY_SOURCE, Action, Chain, FirewallRuleSpec, PortSpec};
use std::fmt;

/// One argument group of a compiled rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Clause<'a> {
    Chain(Chain),
    Position(u32),
    NatTable,
    Source(&'a str),
    Protocol(&'a str),
    TcpModule,
    SourcePorts(&'a PortSpec),
    DestPorts(&'a PortSpec),
    InInterface(&'a str),
    OutInterface(&'a str),
    Destination(&'a str),
    State(String),
    Comment(&'a str),
    Jump(Action),
    ToPorts(u16),
}

impl fmt::Display for Clause<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Clause::Chain(chain) => write!(f, "{chain}"),
            Clause::Position(pos) => write!(f, "{pos}"),
            Clause::NatTable => f.write_str("-t nat"),
            Clause::Source(addr) => write!(f, "-s {addr}"),
            Clause::Protocol(proto) => write!(f, "-p {proto}"),
            Clause::TcpModule => f.write_str("-m tcp"),
            Clause::SourcePorts(ports) => write!(f, "-m multiport --sports {ports}"),
            Clause::DestPorts(ports) => write!(f, "-m multiport --dports {ports}"),
            Clause::InInterface(iface) => write!(f, "-i {iface}"),
            Clause::OutInterface(iface) => write!(f, "-o {iface}"),
            Clause::Destination(addr) => write!(f, "-d {addr}"),
            Clause::State(states) => write!(f, "-m state --state {states}"),
            Clause::Comment(text) => write!(f, "-m comment --comment \"{text}\""),
            Clause::Jump(action) => write!(f, "-j {}", action.target()),
            Clause::ToPorts(port) => write!(f, "--to-ports {port}"),
        }
    }
}

/// Compiled rule text, without the `-I`/`-A` flag
///
/// Two specs that compile to the same text are the same rule.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CompiledRule(String);

impl CompiledRule {
    /// Wraps already-compiled text, trimming surrounding whitespace
    pub fn new(text: impl AsRef<str>) -> Self {
        Self(text.as_ref().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for CompiledRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Builds the ordered clause list for a structured spec.
///
/// `raw` is ignored here; see [`compile`].
pub fn clauses(spec: &FirewallRuleSpec) -> Vec<Clause<'_>> {
    let mut out = vec![Clause::Chain(spec.chain())];

    if let Some(position) = spec.position {
        out.push(Clause::Position(position));
    }

    if spec.direction.is_some_and(|d| d.is_nat()) {
        out.push(Clause::NatTable);
    }

    if let Some(source) = spec.source.as_deref()
        && source != ANY_SOURCE
    {
        out.push(Clause::Source(source));
    }

    if let Some(protocol) = spec.protocol.as_deref() {
        out.push(Clause::Protocol(protocol));
        // multiport needs an explicit tcp match to resolve the protocol
        if protocol.eq_ignore_ascii_case("tcp") {
            out.push(Clause::TcpModule);
        }
    }

    if let Some(ports) = spec.source_port.as_ref() {
        out.push(Clause::SourcePorts(ports));
    }
    if let Some(ports) = spec.effective_dest_port() {
        out.push(Clause::DestPorts(ports));
    }

    if let Some(iface) = spec.interface.as_deref() {
        out.push(Clause::InInterface(iface));
    }
    if let Some(iface) = spec.dest_interface.as_deref() {
        out.push(Clause::OutInterface(iface));
    }

    if let Some(destination) = spec.destination.as_deref() {
        out.push(Clause::Destination(destination));
    }

    if let Some(stateful) = spec.stateful.as_ref() {
        out.push(Clause::State(stateful.to_state_list()));
    }

    out.push(Clause::Comment(&spec.description));
    out.push(Clause::Jump(spec.action));

    if spec.action == Action::Redirect
        && let Some(port) = spec.redirect_port
    {
        out.push(Clause::ToPorts(port));
    }

    out
}

/// Compiles a rule spec into its `iptables` argument string.
///
/// Deterministic: the same spec always yields byte-identical text. A `raw`
/// spec compiles to its trimmed raw text and nothing else.
///
/// # Errors
///
/// Returns `Error::Validation` if a structured field is malformed.
///
/// # Example
///
/// ```
/// use fwconverge::core::compiler::compile;
/// use fwconverge::core::rule::{Action, Direction, FirewallRuleSpec, PortSpec};
///
/// let spec = FirewallRuleSpec {
///     action: Action::Allow,
///     direction: Some(Direction::In),
///     protocol: Some("tcp".to_string()),
///     dest_port: Some(PortSpec::single(22)),
///     description: "ssh".to_string(),
///     ..FirewallRuleSpec::default()
/// };
/// assert_eq!(
///     compile(&spec).unwrap().as_str(),
///     "INPUT -p tcp -m tcp -m multiport --dports 22 -m comment --comment \"ssh\" -j ACCEPT"
/// );
/// ```
pub fn compile(spec: &FirewallRuleSpec) -> Result<CompiledRule> {
    if let Some(raw) = spec.raw.as_deref() {
        return Ok(CompiledRule::new(raw));
    }

    spec.validate()?;

    let text = clauses(spec)
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" ");

    Ok(CompiledRule::new(text))
}
