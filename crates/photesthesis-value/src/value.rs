//! The recursive value algebra: Nil, pair-lists, symbols, booleans,
//! 64-bit integers, byte blobs, and strings.

use crate::symbol::Symbol;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// An immutable, comparable, s-expression-like value. Grammars expand into
/// values and transcripts record them.
#[derive(Clone, Debug)]
pub enum Value {
    /// The empty list.
    Nil,
    /// A proper list cell. The tail is always another cell chain or the end
    /// of the list, never an improper value.
    Pair(Arc<PairCell>),
    /// An interned symbol.
    Sym(Symbol),
    /// A boolean.
    Bool(bool),
    /// A signed 64-bit integer.
    Int64(i64),
    /// A byte buffer.
    Blob(Vec<u8>),
    /// A UTF-8 string.
    Str(String),
}

/// One cell of a pair-list. Carries its own length so list ordering can
/// compare by length before comparing element-wise.
#[derive(Debug)]
pub struct PairCell {
    head: Value,
    tail: Option<Arc<PairCell>>,
    len: usize,
}

impl PairCell {
    /// The element stored in this cell.
    pub fn head(&self) -> &Value {
        &self.head
    }

    /// The rest of the list, if any.
    pub fn tail(&self) -> Option<&PairCell> {
        self.tail.as_deref()
    }

    /// Number of cells from here to the end of the list.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}

static NIL: Value = Value::Nil;

impl Value {
    /// Build a single list cell in front of `tail`.
    pub fn cons(head: Value, tail: Option<Arc<PairCell>>) -> Value {
        let len = 1 + tail.as_ref().map_or(0, |t| t.len);
        Value::Pair(Arc::new(PairCell { head, tail, len }))
    }

    /// Build a proper list from a sequence of elements by right-fold.
    /// An empty sequence yields `Nil`.
    pub fn list(elements: Vec<Value>) -> Value {
        let mut tail: Option<Arc<PairCell>> = None;
        for head in elements.into_iter().rev() {
            let len = 1 + tail.as_ref().map_or(0, |t| t.len);
            tail = Some(Arc::new(PairCell { head, tail, len }));
        }
        match tail {
            Some(cell) => Value::Pair(cell),
            None => Value::Nil,
        }
    }

    /// Build a list from a sorted set, in set order.
    pub fn from_set(set: &BTreeSet<Value>) -> Value {
        Value::list(set.iter().cloned().collect())
    }

    /// Build a list of two-element `(key value)` lists from a map, in key
    /// order.
    pub fn from_map(map: &BTreeMap<Value, Value>) -> Value {
        Value::list(
            map.iter()
                .map(|(k, v)| Value::list(vec![k.clone(), v.clone()]))
                .collect(),
        )
    }

    /// Return a human-readable type name for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "Nil",
            Value::Pair(_) => "Pair",
            Value::Sym(_) => "Sym",
            Value::Bool(_) => "Bool",
            Value::Int64(_) => "Int64",
            Value::Blob(_) => "Blob",
            Value::Str(_) => "Str",
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    pub fn is_pair(&self) -> bool {
        matches!(self, Value::Pair(_))
    }

    /// Iterate over the elements of a pair-list. Empty for non-lists.
    pub fn list_iter(&self) -> ListIter<'_> {
        match self {
            Value::Pair(cell) => ListIter { cursor: Some(cell) },
            _ => ListIter { cursor: None },
        }
    }

    /// The head symbol of a list value, if it has one. Every value a grammar
    /// produces is a list headed by the name of the rule that produced it.
    pub fn head_symbol(&self) -> Option<Symbol> {
        match self {
            Value::Pair(cell) => match cell.head() {
                Value::Sym(s) => Some(s.clone()),
                _ => None,
            },
            _ => None,
        }
    }

    /// Match this value against a single typed slot.
    pub fn extract<T: FromValue>(&self) -> Option<T> {
        T::from_value(self)
    }

    /// Decompose a pair-list against a tuple of typed slots. Each slot
    /// consumes one cell's head in order; surplus cells after the last slot
    /// are ignored, and once the list runs out remaining slots are matched
    /// against `Nil`.
    pub fn decompose<T: MatchTargets>(&self) -> Option<T> {
        match self {
            Value::Pair(cell) => T::match_cells(Some(cell)),
            _ => None,
        }
    }

    /// Match a rule application `(rule a1 a2 …)`: the head must equal the
    /// given rule symbol, and the arguments decompose against `T` with the
    /// same slot semantics as [`Value::decompose`].
    pub fn match_rule<T: MatchTargets>(&self, rule: &Symbol) -> Option<T> {
        let Value::Pair(cell) = self else {
            return None;
        };
        match cell.head() {
            Value::Sym(s) if s == rule => T::match_cells(cell.tail()),
            _ => None,
        }
    }
}

/// Iterator over the elements of a pair-list.
pub struct ListIter<'a> {
    cursor: Option<&'a PairCell>,
}

impl<'a> Iterator for ListIter<'a> {
    type Item = &'a Value;

    fn next(&mut self) -> Option<&'a Value> {
        let cell = self.cursor?;
        self.cursor = cell.tail();
        Some(cell.head())
    }
}

fn discriminant(v: &Value) -> u8 {
    match v {
        Value::Nil => 0,
        Value::Pair(_) => 1,
        Value::Sym(_) => 2,
        Value::Bool(_) => 3,
        Value::Int64(_) => 4,
        Value::Blob(_) => 5,
        Value::Str(_) => 6,
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match discriminant(self).cmp(&discriminant(other)) {
            Ordering::Equal => {}
            unequal => return unequal,
        }
        match (self, other) {
            (Value::Nil, Value::Nil) => Ordering::Equal,
            (Value::Pair(a), Value::Pair(b)) => {
                match a.len.cmp(&b.len) {
                    Ordering::Equal => {}
                    unequal => return unequal,
                }
                let mut x = Some(a.as_ref());
                let mut y = Some(b.as_ref());
                while let (Some(ca), Some(cb)) = (x, y) {
                    match ca.head.cmp(&cb.head) {
                        Ordering::Equal => {}
                        unequal => return unequal,
                    }
                    x = ca.tail();
                    y = cb.tail();
                }
                Ordering::Equal
            }
            (Value::Sym(a), Value::Sym(b)) => a.cmp(b),
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Int64(a), Value::Int64(b)) => a.cmp(b),
            (Value::Blob(a), Value::Blob(b)) => a.cmp(b),
            (Value::Str(a), Value::Str(b)) => a.cmp(b),
            _ => unreachable!("discriminants should match"),
        }
    }
}

/// Typed extraction from a single value: the slot half of pattern matching.
pub trait FromValue: Sized {
    fn from_value(v: &Value) -> Option<Self>;
}

impl FromValue for Value {
    fn from_value(v: &Value) -> Option<Self> {
        Some(v.clone())
    }
}

impl FromValue for () {
    fn from_value(v: &Value) -> Option<Self> {
        v.is_nil().then_some(())
    }
}

impl FromValue for Symbol {
    fn from_value(v: &Value) -> Option<Self> {
        match v {
            Value::Sym(s) => Some(s.clone()),
            _ => None,
        }
    }
}

impl FromValue for bool {
    fn from_value(v: &Value) -> Option<Self> {
        match v {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl FromValue for i64 {
    fn from_value(v: &Value) -> Option<Self> {
        match v {
            Value::Int64(n) => Some(*n),
            _ => None,
        }
    }
}

impl FromValue for Vec<u8> {
    fn from_value(v: &Value) -> Option<Self> {
        match v {
            Value::Blob(b) => Some(b.clone()),
            _ => None,
        }
    }
}

impl FromValue for String {
    fn from_value(v: &Value) -> Option<Self> {
        match v {
            Value::Str(s) => Some(s.clone()),
            _ => None,
        }
    }
}

/// Tuple-of-slots decomposition of a pair-list. Implemented for tuples of
/// arity 1 through 6 over [`FromValue`] slot types.
pub trait MatchTargets: Sized {
    fn match_cells(cursor: Option<&PairCell>) -> Option<Self>;
}

macro_rules! impl_match_targets {
    ($($slot:ident),+) => {
        impl<$($slot: FromValue),+> MatchTargets for ($($slot,)+) {
            #[allow(unused_assignments)]
            fn match_cells(mut cursor: Option<&PairCell>) -> Option<Self> {
                Some(($(
                    {
                        let slot: &Value = match cursor {
                            Some(cell) => {
                                let head = cell.head();
                                cursor = cell.tail();
                                head
                            }
                            None => &NIL,
                        };
                        $slot::from_value(slot)?
                    },
                )+))
            }
        }
    };
}

impl_match_targets!(A);
impl_match_targets!(A, B);
impl_match_targets!(A, B, C);
impl_match_targets!(A, B, C, D);
impl_match_targets!(A, B, C, D, E);
impl_match_targets!(A, B, C, D, E, F);

#[cfg(test)]
mod tests {
    use super::*;

    fn sym(s: &str) -> Symbol {
        Symbol::new(s).unwrap()
    }

    #[test]
    fn test_list_builds_by_right_fold() {
        let v = Value::list(vec![Value::Int64(1), Value::Int64(2), Value::Int64(3)]);
        let elems: Vec<&Value> = v.list_iter().collect();
        assert_eq!(elems, vec![&Value::Int64(1), &Value::Int64(2), &Value::Int64(3)]);
        assert_eq!(Value::list(vec![]), Value::Nil);
    }

    #[test]
    fn test_equality_is_structural() {
        let a = Value::list(vec![Value::Sym(sym("expr")), Value::Int64(-3)]);
        let b = Value::list(vec![Value::Sym(sym("expr")), Value::Int64(-3)]);
        let c = Value::list(vec![Value::Sym(sym("expr")), Value::Int64(4)]);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_ordering_by_tag_then_payload() {
        // Nil < Pair < Sym < Bool < Int64 < Blob < Str
        let ordered = vec![
            Value::Nil,
            Value::list(vec![Value::Int64(1)]),
            Value::Sym(sym("a")),
            Value::Bool(false),
            Value::Int64(0),
            Value::Blob(vec![0xff]),
            Value::Str("s".to_string()),
        ];
        for w in ordered.windows(2) {
            assert!(w[0] < w[1], "{:?} should precede {:?}", w[0], w[1]);
        }
    }

    #[test]
    fn test_pair_ordering_length_first() {
        let short = Value::list(vec![Value::Int64(9), Value::Int64(9)]);
        let long = Value::list(vec![Value::Int64(0), Value::Int64(0), Value::Int64(0)]);
        assert!(short < long);

        let a = Value::list(vec![Value::Int64(1), Value::Int64(2)]);
        let b = Value::list(vec![Value::Int64(1), Value::Int64(3)]);
        assert!(a < b);
    }

    #[test]
    fn test_extract_single_slot() {
        assert_eq!(Value::Int64(7).extract::<i64>(), Some(7));
        assert_eq!(Value::Bool(true).extract::<i64>(), None);
        assert_eq!(Value::Str("x".into()).extract::<String>(), Some("x".to_string()));
        // A Value slot accepts anything and yields the whole value.
        assert_eq!(Value::Int64(7).extract::<Value>(), Some(Value::Int64(7)));
        assert_eq!(Value::Nil.extract::<()>(), Some(()));
    }

    #[test]
    fn test_match_rule() {
        let add = sym("add");
        let v = Value::list(vec![
            Value::Sym(add.clone()),
            Value::Int64(1),
            Value::Int64(2),
        ]);
        let (a, b) = v.match_rule::<(i64, i64)>(&add).unwrap();
        assert_eq!((a, b), (1, 2));
        assert!(v.match_rule::<(i64, i64)>(&sym("sub")).is_none());
    }

    #[test]
    fn test_match_exhausted_cells_bind_nil() {
        // `(rule)` with a trailing Value slot matches that slot to Nil.
        let rule = sym("rule");
        let v = Value::list(vec![Value::Sym(rule.clone())]);
        let (rest,) = v.match_rule::<(Value,)>(&rule).unwrap();
        assert_eq!(rest, Value::Nil);
        // A typed slot fails instead of yielding garbage.
        assert!(v.match_rule::<(i64,)>(&rule).is_none());
    }

    #[test]
    fn test_match_ignores_surplus_tail() {
        let rule = sym("rule");
        let v = Value::list(vec![
            Value::Sym(rule.clone()),
            Value::Int64(1),
            Value::Int64(2),
            Value::Int64(3),
        ]);
        let (first,) = v.match_rule::<(i64,)>(&rule).unwrap();
        assert_eq!(first, 1);
    }

    #[test]
    fn test_head_symbol() {
        let v = Value::list(vec![Value::Sym(sym("expr")), Value::Int64(1)]);
        assert_eq!(v.head_symbol(), Some(sym("expr")));
        assert_eq!(Value::Int64(1).head_symbol(), None);
        assert_eq!(Value::list(vec![Value::Int64(1)]).head_symbol(), None);
    }

    #[test]
    fn test_from_set_and_map() {
        let mut set = BTreeSet::new();
        set.insert(Value::Int64(2));
        set.insert(Value::Int64(1));
        let v = Value::from_set(&set);
        let elems: Vec<&Value> = v.list_iter().collect();
        assert_eq!(elems, vec![&Value::Int64(1), &Value::Int64(2)]);

        let mut map = BTreeMap::new();
        map.insert(Value::Int64(1), Value::Bool(true));
        let v = Value::from_map(&map);
        let entry = v.list_iter().next().unwrap();
        let pair: Vec<&Value> = entry.list_iter().collect();
        assert_eq!(pair, vec![&Value::Int64(1), &Value::Bool(true)]);
    }
}
