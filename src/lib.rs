//! fwconverge - declarative iptables rule convergence
//!
//! Compiles structured rule specs into `iptables` arguments and applies them
//! idempotently: a rule is inserted or appended only when `iptables -S` shows
//! it is not already live.
//!
//! # Architecture
//!
//! - [`core`] - Rule model, compiler, existence checker, applier
//! - [`elevation`] - Privilege escalation for `iptables`
//! - [`audit`] - JSON-lines audit log of mutations
//! - [`validators`] - Field validation
//! - [`config`] - Configuration loading
//! - [`utils`] - XDG directories

#![allow(clippy::must_use_candidate)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::missing_errors_doc)]

pub mod audit;
pub mod config;
pub mod core;
pub mod elevation;
pub mod utils;
pub mod validators;

pub use crate::core::apply::{Applier, ApplyOutcome};
pub use crate::core::compiler::{CompiledRule, compile};
pub use crate::core::error::{Error, Result};
pub use crate::core::rule::{Action, Direction, FirewallRuleSpec, PortSpec, Stateful};
