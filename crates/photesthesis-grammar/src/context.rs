//! Expansion contexts for context-sensitive productions.

use photesthesis_corpus::{ParamName, ParamSpecs};
use std::collections::BTreeSet;

/// The set of named flags active at a point of grammar expansion: the
/// global parameter names of the spec being populated, plus a local stack
/// pushed and popped as ref atoms with context extensions are entered and
/// left. Productions guard on the presence of these flags.
pub struct Context<'a> {
    global: &'a ParamSpecs,
    local: Vec<ParamName>,
}

impl<'a> Context<'a> {
    pub fn new(global: &'a ParamSpecs) -> Self {
        Context {
            global,
            local: Vec::new(),
        }
    }

    pub fn push(&mut self, name: ParamName) {
        self.local.push(name);
    }

    pub fn push_all(&mut self, names: &BTreeSet<ParamName>) {
        for name in names {
            self.push(name.clone());
        }
    }

    pub fn pop(&mut self, n: usize) {
        for _ in 0..n {
            self.local.pop();
        }
    }

    pub fn has(&self, name: &ParamName) -> bool {
        self.global.contains_key(name) || self.local.iter().rev().any(|n| n == name)
    }

    pub fn has_all(&self, names: &BTreeSet<ParamName>) -> bool {
        names.iter().all(|n| self.has(n))
    }
}
