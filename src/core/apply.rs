//! Idempotent rule application
//!
//! The [`Applier`] compiles a spec, asks the existence checker whether the
//! rule is already live, and only then runs `iptables -I`/`-A`. Listing and
//! mutating are separate invocations; a concurrent change between the two is
//! not guarded against.

use crate::audit::{AuditLog, EventType};
use crate::core::backend::{PacketFilter, Placement};
use crate::core::checker;
use crate::core::compiler::{self, CompiledRule};
use crate::core::detect::{RegexDetection, RuleDetector};
use crate::core::error::Result;
use crate::core::rule::FirewallRuleSpec;
use tracing::{debug, info};

/// What happened to one rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The mutating command ran
    Applied { command: String },
    /// A matching rule is already live
    AlreadyPresent,
    /// Dry run: the command that would have run
    WouldApply { command: String },
}

impl ApplyOutcome {
    /// True when live state changed
    pub fn updated(&self) -> bool {
        matches!(self, ApplyOutcome::Applied { .. })
    }
}

/// Per-rule report from [`Applier::apply_all`]
#[derive(Debug, Clone)]
pub struct RuleReport {
    pub name: String,
    pub compiled: CompiledRule,
    pub outcome: ApplyOutcome,
}

/// Check-then-mutate driver over a [`PacketFilter`]
pub struct Applier<B: PacketFilter> {
    backend: B,
    detector: Box<dyn RuleDetector>,
    audit: Option<AuditLog>,
    dry_run: bool,
}

impl<B: PacketFilter> Applier<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            detector: Box::new(RegexDetection),
            audit: None,
            dry_run: false,
        }
    }

    pub fn with_detector(mut self, detector: Box<dyn RuleDetector>) -> Self {
        self.detector = detector;
        self
    }

    pub fn with_audit(mut self, audit: AuditLog) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Compiles `spec` and reports whether it is already live, without mutating
    ///
    /// # Errors
    ///
    /// Returns `Error::Validation` for a malformed spec and
    /// `Error::ContractViolation` for an empty compiled rule.
    pub fn check(&self, spec: &FirewallRuleSpec) -> Result<(CompiledRule, bool)> {
        let compiled = compiler::compile(spec)?;
        let present = checker::exists(spec, &compiled, &self.backend, self.detector.as_ref())?;
        Ok((compiled, present))
    }

    /// Applies one rule idempotently.
    ///
    /// # Errors
    ///
    /// Returns `Error::Validation`, `Error::ContractViolation`, or
    /// `Error::Mutation` when the insert/append invocation fails.
    pub fn apply(&self, spec: &FirewallRuleSpec) -> Result<ApplyOutcome> {
        Ok(self.apply_compiled(spec)?.1)
    }

    fn apply_compiled(&self, spec: &FirewallRuleSpec) -> Result<(CompiledRule, ApplyOutcome)> {
        let placement = Placement::for_position(spec.position);
        // TODO: packet/connection counter logging (`-c`) is not emitted
        let (compiled, present) = self.check(spec)?;

        debug!("{}: {compiled}", spec.display_name());

        if present {
            info!(
                "{} {} rule exists... won't apply",
                spec.display_name(),
                spec.action
            );
            return Ok((compiled, ApplyOutcome::AlreadyPresent));
        }

        let command = format!("{} {placement} {compiled}", self.backend.program());

        if self.dry_run {
            info!("{}: would run {command}", spec.display_name());
            return Ok((compiled, ApplyOutcome::WouldApply { command }));
        }

        let result = self.backend.mutate(placement, &compiled);

        if let Some(ref audit) = self.audit {
            let event_type = match placement {
                Placement::Insert => EventType::InsertRule,
                Placement::Append => EventType::AppendRule,
            };
            audit.log_mutation(
                event_type,
                spec.display_name(),
                &command,
                result.as_ref().err().map(ToString::to_string),
            );
        }

        result?;
        info!("firewall_rule[{}] {compiled}", spec.display_name());
        Ok((compiled, ApplyOutcome::Applied { command }))
    }

    /// Applies rules in order, stopping at the first error
    ///
    /// # Errors
    ///
    /// Returns the first error encountered; rules before it stay applied.
    pub fn apply_all(&self, specs: &[FirewallRuleSpec]) -> Result<Vec<RuleReport>> {
        let mut reports = Vec::with_capacity(specs.len());
        for spec in specs {
            let (compiled, outcome) = self.apply_compiled(spec)?;
            reports.push(RuleReport {
                name: spec.display_name().to_string(),
                compiled,
                outcome,
            });
        }
        Ok(reports)
    }
}
