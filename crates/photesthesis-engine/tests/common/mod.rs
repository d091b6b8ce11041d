//! Shared test fixture: a miniature calculator with a stack of local
//! symbolic variables, driven through an abstract arithmetic grammar.
#![allow(dead_code)]

use photesthesis_corpus::ParamSpecs;
use photesthesis_engine::{EngineError, Runtime, TestCase};
use photesthesis_grammar::{Atom, Grammar, Production};
use photesthesis_value::{Symbol, Value};
use tracing_subscriber::EnvFilter;

/// Install the test subscriber once, so administration progress from the
/// engine shows up under `cargo test -- --nocapture` when `RUST_LOG` and
/// `PHOTESTHESIS_VERBOSE` are set.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// The symbols of the arithmetic test grammar.
#[derive(Clone)]
pub struct Syms {
    pub expr: Symbol,
    pub add: Symbol,
    pub sub: Symbol,
    pub mul: Symbol,
    pub let_: Symbol,
    pub var: Symbol,
    pub x: Symbol,
    pub n: Symbol,
    pub res: Symbol,
    pub test: Symbol,
}

impl Syms {
    pub fn new() -> Syms {
        let sym = |s| Symbol::new(s).unwrap();
        Syms {
            expr: sym("expr"),
            add: sym("add"),
            sub: sym("sub"),
            mul: sym("mul"),
            let_: sym("let"),
            var: sym("var"),
            x: sym("x"),
            n: sym("n"),
            res: sym("res"),
            test: sym("CalcTest"),
        }
    }
}

/// The abstract arithmetic grammar: `let` introduces `x` as a context
/// symbol, and `var` productions are only active under it.
pub fn expr_grammar(s: &Syms) -> Grammar {
    let mut g = Grammar::new();
    for rule in [&s.add, &s.sub, &s.mul] {
        g.add_rule(
            rule,
            vec![
                Production::new(vec![Atom::int64(0)]),
                Production::new(vec![Atom::ref_to(&s.expr), Atom::ref_to(&s.expr)]),
            ],
        )
        .unwrap();
    }
    g.add_rule(
        &s.let_,
        vec![
            Production::new(vec![Atom::int64(0)]),
            Production::new(vec![
                Atom::sym(&s.x),
                Atom::ref_to(&s.expr),
                Atom::ref_with_ctx(&s.expr, [s.x.clone()]),
            ]),
        ],
    )
    .unwrap();
    g.add_rule(&s.var, vec![Production::new(vec![Atom::sym(&s.x)])])
        .unwrap();
    g.add_rule(
        &s.expr,
        vec![
            Production::new(vec![Atom::int64(1)]),
            Production::new(vec![Atom::int64(2)]),
            Production::new(vec![Atom::int64(3)]),
            Production::new(vec![Atom::ref_to(&s.add)]),
            Production::new(vec![Atom::ref_to(&s.sub)]),
            Production::new(vec![Atom::ref_to(&s.mul)]),
            Production::new(vec![Atom::ref_to(&s.let_)]),
            Production::requiring(vec![Atom::ref_to(&s.var)], [s.x.clone()]),
        ],
    )
    .unwrap();
    g
}

/// The system under test: evaluates abstract expressions with a stack of
/// local variables.
pub struct CalcTest {
    pub syms: Syms,
    vars: Vec<(Symbol, i64)>,
    /// Added to every final result; flipping it models an SUT change.
    pub result_offset: i64,
    pub mismatches: usize,
    pub invariant_failures: usize,
}

impl CalcTest {
    pub fn new(syms: Syms) -> CalcTest {
        CalcTest {
            syms,
            vars: Vec::new(),
            result_offset: 0,
            mismatches: 0,
            invariant_failures: 0,
        }
    }

    fn lookup(&self, name: &Symbol) -> i64 {
        self.vars
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, v)| *v)
            .unwrap_or(0)
    }

    pub fn eval(&mut self, v: &Value) -> i64 {
        if let Some((a,)) = v.match_rule::<(Value,)>(&self.syms.expr) {
            let (add, sub, mul) = (
                self.syms.add.clone(),
                self.syms.sub.clone(),
                self.syms.mul.clone(),
            );
            if let Some((b, c)) = a.match_rule::<(Value, Value)>(&add) {
                return self.eval(&b).wrapping_add(self.eval(&c));
            }
            if let Some((b, c)) = a.match_rule::<(Value, Value)>(&sub) {
                return self.eval(&b).wrapping_sub(self.eval(&c));
            }
            if let Some((b, c)) = a.match_rule::<(Value, Value)>(&mul) {
                return self.eval(&b).wrapping_mul(self.eval(&c));
            }
            let let_ = self.syms.let_.clone();
            if let Some((x, b, c)) = a.match_rule::<(Symbol, Value, Value)>(&let_) {
                let bound = self.eval(&b);
                self.vars.push((x, bound));
                let res = self.eval(&c);
                self.vars.pop();
                return res;
            }
            let var = self.syms.var.clone();
            if let Some((x,)) = a.match_rule::<(Symbol,)>(&var) {
                return self.lookup(&x);
            }
            if let Some(i) = a.extract::<i64>() {
                return i;
            }
        }
        0
    }
}

impl TestCase for CalcTest {
    fn seed_specs(&self) -> Vec<ParamSpecs> {
        let mut spec = ParamSpecs::new();
        spec.insert(self.syms.n.clone(), self.syms.expr.clone());
        vec![spec]
    }

    fn run(&mut self, rt: &mut Runtime) -> Result<(), EngineError> {
        let n = rt.param(&self.syms.n)?;
        let res = self.eval(&n).wrapping_add(self.result_offset);
        rt.track(self.syms.res.clone(), Value::Int64(res));
        Ok(())
    }

    fn on_transcript_mismatch(
        &mut self,
        _expected: &photesthesis_corpus::Transcript,
        _got: &photesthesis_corpus::Transcript,
    ) {
        self.mismatches += 1;
    }

    fn on_invariant_failure(
        &mut self,
        _plan: &photesthesis_corpus::Plan,
        _var: &Symbol,
        _expected: &Value,
        _got: &Value,
    ) {
        self.invariant_failures += 1;
    }
}
