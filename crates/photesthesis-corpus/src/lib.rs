//! Plans, transcripts, and the persisted corpus for the photesthesis
//! testing engine.
//!
//! A [`Plan`] is a concrete choice of parameter values for one test run; a
//! [`Transcript`] is the ordered record of what that run observed; a
//! [`Corpus`] is the set of transcripts kept per test, serialized to a
//! human-readable file that is checked into version control.

use photesthesis_value::{Symbol, Value};
use std::collections::BTreeMap;

pub mod corpus;
pub mod plan;
pub mod transcript;

pub use corpus::{Corpus, CorpusError};
pub use plan::{Plan, PlanHash};
pub use transcript::{Transcript, VarKind};

/// The name of a test parameter.
pub type ParamName = Symbol;
/// The name of a grammar rule.
pub type RuleName = Symbol;
/// The name of a test.
pub type TestName = Symbol;
/// The name of an observed variable.
pub type VarName = Symbol;
/// One comment line attached to a plan.
pub type Comment = String;

/// The rule each parameter of a test is generated from, in name order.
pub type ParamSpecs = BTreeMap<ParamName, RuleName>;
/// Concrete parameter bindings of a plan, in name order.
pub type Params = BTreeMap<ParamName, Value>;
