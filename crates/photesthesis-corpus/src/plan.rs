//! Plans: named parameter bindings for one test run.

use crate::corpus::CorpusError;
use crate::{Comment, ParamName, ParamSpecs, Params, TestName};
use photesthesis_value::{StableHasher, Value};
use std::fmt;
use std::str::FromStr;

/// The 64-bit fingerprint identifying a plan. Stable across runs and
/// processes; persisted in corpus files.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PlanHash(u64);

impl PlanHash {
    pub fn as_u64(self) -> u64 {
        self.0
    }

    pub fn from_u64(v: u64) -> Self {
        PlanHash(v)
    }
}

impl fmt::Debug for PlanHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PlanHash({:#x})", self.0)
    }
}

impl fmt::Display for PlanHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl FromStr for PlanHash {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.strip_prefix("0x").unwrap_or(s);
        u64::from_str_radix(digits, 16).map(PlanHash)
    }
}

/// A concrete choice of values for each parameter of a test, plus optional
/// comment lines that are carried through serialization.
///
/// The derived ordering (test name, then params, then comments) dictates
/// both the reading order of the corpus file and the preference for smaller
/// plans among equal-trajectory transcripts, since `Value` ordering compares
/// lists by length first.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Plan {
    test_name: TestName,
    params: Params,
    comments: Vec<Comment>,
}

impl Plan {
    pub fn new(test_name: TestName) -> Self {
        Plan {
            test_name,
            params: Params::new(),
            comments: Vec::new(),
        }
    }

    pub fn with_params(test_name: TestName, params: Params) -> Self {
        Plan {
            test_name,
            params,
            comments: Vec::new(),
        }
    }

    pub fn test_name(&self) -> &TestName {
        &self.test_name
    }

    pub fn add_param(&mut self, name: ParamName, value: Value) {
        self.params.insert(name, value);
    }

    pub fn param(&self, name: &ParamName) -> Option<&Value> {
        self.params.get(name)
    }

    pub fn has_param(&self, name: &ParamName) -> bool {
        self.params.contains_key(name)
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn add_comment(&mut self, comment: Comment) {
        self.comments.push(comment);
    }

    pub fn comments(&self) -> &[Comment] {
        &self.comments
    }

    /// Recover the parameter specs this plan was generated from: every value
    /// a grammar produces is a list headed by the name of its rule.
    pub fn param_specs(&self) -> Result<ParamSpecs, CorpusError> {
        let mut specs = ParamSpecs::new();
        for (name, value) in &self.params {
            let rule = value.head_symbol().ok_or_else(|| {
                CorpusError::ParamNotRuleApplication {
                    param: name.clone(),
                }
            })?;
            specs.insert(name.clone(), rule);
        }
        Ok(specs)
    }

    /// Fold this plan into `hasher`: the test name, a separator, and each
    /// `name=value` binding in iteration order.
    pub fn add_to_hash(&self, hasher: &mut StableHasher) {
        hasher.add_symbol(&self.test_name);
        hasher.add_str(":");
        for (name, value) in &self.params {
            hasher.add_key_value(name, value);
        }
    }

    /// The plan's 64-bit fingerprint.
    pub fn hash(&self) -> PlanHash {
        let mut hasher = StableHasher::new();
        self.add_to_hash(&mut hasher);
        PlanHash(hasher.finish())
    }
}

/// The comment and `param:` lines of a transcript block, one per line.
impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for comment in &self.comments {
            writeln!(f, "# {}", comment)?;
        }
        for (name, value) in &self.params {
            writeln!(f, "param: {} = {}", name, value)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use photesthesis_value::Symbol;

    fn sym(s: &str) -> Symbol {
        Symbol::new(s).unwrap()
    }

    fn expr_plan(n: i64) -> Plan {
        let mut plan = Plan::new(sym("CalcTest"));
        plan.add_param(
            sym("n"),
            Value::list(vec![Value::Sym(sym("expr")), Value::Int64(n)]),
        );
        plan
    }

    #[test]
    fn test_plan_hash_deterministic() {
        assert_eq!(expr_plan(1).hash(), expr_plan(1).hash());
        assert_ne!(expr_plan(1).hash(), expr_plan(2).hash());
    }

    #[test]
    fn test_plan_hash_ignores_comments() {
        let mut commented = expr_plan(1);
        commented.add_comment("hand-written".to_string());
        assert_eq!(commented.hash(), expr_plan(1).hash());
    }

    #[test]
    fn test_plan_hash_text_form() {
        let hash = expr_plan(1).hash();
        let text = hash.to_string();
        assert!(text.starts_with("0x"));
        assert_eq!(text.parse::<PlanHash>().unwrap(), hash);
    }

    #[test]
    fn test_param_specs_from_head_symbols() {
        let plan = expr_plan(1);
        let specs = plan.param_specs().unwrap();
        assert_eq!(specs.get(&sym("n")), Some(&sym("expr")));

        let mut bad = Plan::new(sym("t"));
        bad.add_param(sym("n"), Value::Int64(1));
        assert!(bad.param_specs().is_err());
    }

    #[test]
    fn test_plan_display() {
        let mut plan = expr_plan(-3);
        plan.add_comment("a note".to_string());
        assert_eq!(plan.to_string(), "# a note\nparam: n = (expr -3)\n");
    }

    #[test]
    fn test_plan_ordering_prefers_shorter_values() {
        let small = expr_plan(9);
        let mut big = Plan::new(sym("CalcTest"));
        big.add_param(
            sym("n"),
            Value::list(vec![Value::Sym(sym("expr")), Value::Int64(1), Value::Int64(1)]),
        );
        assert!(small < big);
    }
}
