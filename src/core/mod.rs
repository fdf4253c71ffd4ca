//! Rule compilation and idempotent application
//!
//! - [`rule`]: Rule spec data model and validation
//! - [`compiler`]: Spec → `iptables` argument string
//! - [`detect`]: Detection patterns and match strategies
//! - [`checker`]: Existence check against `iptables -S`
//! - [`backend`]: External `iptables` invocations
//! - [`apply`]: Check-then-mutate applier
//! - [`ruleset`]: JSON rule files
//! - [`error`]: Error types

pub mod apply;
pub mod backend;
pub mod checker;
pub mod compiler;
pub mod detect;
pub mod error;
pub mod rule;
pub mod ruleset;

#[cfg(test)]
pub mod test_helpers;
