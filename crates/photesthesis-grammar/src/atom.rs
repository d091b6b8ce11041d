//! Grammar building blocks: atoms, productions, and rules.

use photesthesis_corpus::{ParamName, RuleName};
use photesthesis_value::Value;
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;

/// Monotonic identity source for atoms. Every occurrence of an atom in a
/// grammar counts as a distinct node when reasoning about k-paths, so two
/// refs to the same rule in different productions never compare equal.
static NEXT_TAG: AtomicU64 = AtomicU64::new(0);

/// What an atom is: a literal value, or a reference to a named rule that may
/// extend the expansion context with parameter names.
#[derive(Debug)]
pub enum AtomKind {
    Lit(Value),
    Ref {
        rule: RuleName,
        ctx_ext: BTreeSet<ParamName>,
    },
}

/// One component of a production. Atoms are shared, and compare and hash by
/// identity tag, not by content.
#[derive(Clone)]
pub struct Atom(Arc<AtomNode>);

#[derive(Debug)]
struct AtomNode {
    tag: u64,
    kind: AtomKind,
}

impl Atom {
    fn alloc(kind: AtomKind) -> Atom {
        let tag = NEXT_TAG.fetch_add(1, AtomicOrdering::Relaxed);
        Atom(Arc::new(AtomNode { tag, kind }))
    }

    /// A literal atom (a.k.a. terminal).
    pub fn lit(value: Value) -> Atom {
        Atom::alloc(AtomKind::Lit(value))
    }

    /// A literal symbol terminal.
    pub fn sym(s: &RuleName) -> Atom {
        Atom::lit(Value::Sym(s.clone()))
    }

    /// A literal integer terminal.
    pub fn int64(n: i64) -> Atom {
        Atom::lit(Value::Int64(n))
    }

    /// A reference to a named rule (a.k.a. nonterminal).
    pub fn ref_to(rule: &RuleName) -> Atom {
        Atom::alloc(AtomKind::Ref {
            rule: rule.clone(),
            ctx_ext: BTreeSet::new(),
        })
    }

    /// A rule reference that extends the context with the given parameter
    /// names while it is being expanded.
    pub fn ref_with_ctx(rule: &RuleName, ctx_ext: impl IntoIterator<Item = ParamName>) -> Atom {
        Atom::alloc(AtomKind::Ref {
            rule: rule.clone(),
            ctx_ext: ctx_ext.into_iter().collect(),
        })
    }

    /// The diagnostic identity tag.
    pub fn tag(&self) -> u64 {
        self.0.tag
    }

    pub fn kind(&self) -> &AtomKind {
        &self.0.kind
    }

    pub fn is_ref(&self) -> bool {
        matches!(self.0.kind, AtomKind::Ref { .. })
    }

    /// The referenced rule name and context extension, for ref atoms.
    pub fn ref_parts(&self) -> Option<(&RuleName, &BTreeSet<ParamName>)> {
        match &self.0.kind {
            AtomKind::Ref { rule, ctx_ext } => Some((rule, ctx_ext)),
            AtomKind::Lit(_) => None,
        }
    }

    /// The contained value, for literal atoms.
    pub fn lit_value(&self) -> Option<&Value> {
        match &self.0.kind {
            AtomKind::Lit(v) => Some(v),
            AtomKind::Ref { .. } => None,
        }
    }
}

impl PartialEq for Atom {
    fn eq(&self, other: &Self) -> bool {
        self.0.tag == other.0.tag
    }
}

impl Eq for Atom {}

impl PartialOrd for Atom {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Atom {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.tag.cmp(&other.0.tag)
    }
}

impl fmt::Debug for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0.kind {
            AtomKind::Lit(v) => write!(f, "Lit({})", v),
            AtomKind::Ref { rule, .. } => write!(f, "Ref({}_{})", rule, self.0.tag),
        }
    }
}

/// Literals print as their value; refs print as `rule_tag` for diagnostics.
impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0.kind {
            AtomKind::Lit(v) => write!(f, "{}", v),
            AtomKind::Ref { rule, .. } => write!(f, "{}_{}", rule, self.0.tag),
        }
    }
}

/// A k-path: a chain of exactly k atoms read downward through a grammar
/// derivation, the first k−1 of which are refs.
pub type KPath = Vec<Atom>;

/// One alternative of a rule: an ordered atom list, plus the parameter names
/// that must be present in the expansion context for the alternative to be
/// active.
#[derive(Debug)]
pub struct Production {
    atoms: Vec<Atom>,
    ctx_req: BTreeSet<ParamName>,
    has_refs: bool,
}

impl Production {
    pub fn new(atoms: Vec<Atom>) -> Production {
        Production::requiring(atoms, [])
    }

    pub fn requiring(
        atoms: Vec<Atom>,
        ctx_req: impl IntoIterator<Item = ParamName>,
    ) -> Production {
        let has_refs = atoms.iter().any(Atom::is_ref);
        Production {
            atoms,
            ctx_req: ctx_req.into_iter().collect(),
            has_refs,
        }
    }

    pub fn atoms(&self) -> &[Atom] {
        &self.atoms
    }

    pub fn ctx_req(&self) -> &BTreeSet<ParamName> {
        &self.ctx_req
    }

    pub fn has_refs(&self) -> bool {
        self.has_refs
    }
}

/// A named set of productions.
#[derive(Debug)]
pub struct Rule {
    productions: Vec<Production>,
}

impl Rule {
    pub fn new(productions: Vec<Production>) -> Rule {
        Rule { productions }
    }

    pub fn productions(&self) -> &[Production] {
        &self.productions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use photesthesis_value::Symbol;

    fn sym(s: &str) -> Symbol {
        Symbol::new(s).unwrap()
    }

    #[test]
    fn test_atoms_compare_by_identity() {
        let a = Atom::int64(1);
        let b = Atom::int64(1);
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
        assert!(a < b, "tags are handed out in construction order");
    }

    #[test]
    fn test_refs_to_same_rule_are_distinct() {
        let expr = sym("expr");
        let r1 = Atom::ref_to(&expr);
        let r2 = Atom::ref_to(&expr);
        assert_ne!(r1, r2);
        assert_eq!(r1.ref_parts().unwrap().0, &expr);
        assert_eq!(r2.ref_parts().unwrap().0, &expr);
    }

    #[test]
    fn test_production_precomputes_has_refs() {
        let expr = sym("expr");
        let with_ref = Production::new(vec![Atom::int64(0), Atom::ref_to(&expr)]);
        let without = Production::new(vec![Atom::int64(0)]);
        assert!(with_ref.has_refs());
        assert!(!without.has_refs());
    }

    #[test]
    fn test_atom_display() {
        let lit = Atom::int64(7);
        assert_eq!(lit.to_string(), "7");
        let r = Atom::ref_to(&sym("expr"));
        assert_eq!(r.to_string(), format!("expr_{}", r.tag()));
    }
}
