//! Transcripts: the ordered record of observations from one run of a plan.

use crate::plan::Plan;
use crate::{TestName, VarName};
use photesthesis_value::Value;
use std::fmt;

/// How a variable entered the transcript: `check` records without tracing,
/// `track` also folds the observation into the run's trajectory.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum VarKind {
    Checked,
    Tracked,
}

impl VarKind {
    /// The serialization keyword for this kind.
    pub fn keyword(self) -> &'static str {
        match self {
            VarKind::Checked => "check:",
            VarKind::Tracked => "track:",
        }
    }
}

/// A plan plus the ordered sequence of variables its run recorded.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Transcript {
    plan: Plan,
    vars: Vec<(VarName, Value, VarKind)>,
}

impl Transcript {
    pub fn new(plan: Plan) -> Self {
        Transcript {
            plan,
            vars: Vec::new(),
        }
    }

    pub fn test_name(&self) -> &TestName {
        self.plan.test_name()
    }

    pub fn plan(&self) -> &Plan {
        &self.plan
    }

    pub fn add_checked(&mut self, var: VarName, value: Value) {
        self.vars.push((var, value, VarKind::Checked));
    }

    pub fn add_tracked(&mut self, var: VarName, value: Value) {
        self.vars.push((var, value, VarKind::Tracked));
    }

    pub(crate) fn push_var(&mut self, var: VarName, value: Value, kind: VarKind) {
        self.vars.push((var, value, kind));
    }

    pub fn vars(&self) -> &[(VarName, Value, VarKind)] {
        &self.vars
    }
}

/// One transcript block of the corpus file, every line newline-terminated.
impl fmt::Display for Transcript {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "#### transcript: {} {}",
            self.test_name(),
            self.plan.hash()
        )?;
        write!(f, "{}", self.plan)?;
        for (var, value, kind) in &self.vars {
            writeln!(f, "{} {} = {}", kind.keyword(), var, value)?;
        }
        Ok(())
    }
}
