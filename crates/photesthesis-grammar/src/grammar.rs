//! The grammar proper: rule storage, active-production filtering, uniform
//! random expansion, k-path enumeration, and k-path covering synthesis.

use crate::atom::{Atom, AtomKind, KPath, Production, Rule};
use crate::context::Context;
use crate::error::{GrammarError, GrammarResult};
use photesthesis_corpus::{ParamSpecs, Params, Plan, RuleName, TestName};
use photesthesis_value::Value;
use rand::Rng;
use std::collections::{BTreeMap, BTreeSet};

/// A set of named rules plus a canonical root ref per rule, used as the
/// origin for k-path enumeration of that rule.
#[derive(Default)]
pub struct Grammar {
    rules: BTreeMap<RuleName, Rule>,
    root_refs: BTreeMap<RuleName, Atom>,
}

/// Combine two non-empty ordered sets by cyclical zip: iterate both with
/// independent wrap-around cursors, emitting one combined element per step,
/// until each cursor has wrapped at least once. Yields at least
/// `max(|xs|, |ys|)` and at most `|xs| + |ys|` elements, never the full
/// cartesian product.
fn extend_by_cycling<A, B, C, F>(xs: &BTreeSet<A>, ys: &BTreeSet<B>, combine: F) -> BTreeSet<C>
where
    A: Ord,
    B: Ord,
    C: Ord,
    F: Fn(&A, &B) -> C,
{
    debug_assert!(!xs.is_empty() && !ys.is_empty());
    let mut res = BTreeSet::new();
    let mut xi = xs.iter();
    let mut yi = ys.iter();
    let mut cycled_x = false;
    let mut cycled_y = false;
    let mut x = xi.next();
    let mut y = yi.next();
    while let (Some(a), Some(b)) = (x, y) {
        res.insert(combine(a, b));
        x = match xi.next() {
            Some(v) => Some(v),
            None => {
                cycled_x = true;
                xi = xs.iter();
                xi.next()
            }
        };
        y = match yi.next() {
            Some(v) => Some(v),
            None => {
                cycled_y = true;
                yi = ys.iter();
                yi.next()
            }
        };
        if cycled_x && cycled_y {
            break;
        }
    }
    res
}

impl Grammar {
    pub fn new() -> Self {
        Grammar::default()
    }

    /// Add a named rule. Fails if the name was already added.
    pub fn add_rule(
        &mut self,
        name: &RuleName,
        productions: Vec<Production>,
    ) -> GrammarResult<()> {
        if self.rules.contains_key(name) {
            return Err(GrammarError::DuplicateRule { rule: name.clone() });
        }
        self.rules.insert(name.clone(), Rule::new(productions));
        self.root_refs.insert(name.clone(), Atom::ref_to(name));
        Ok(())
    }

    fn productions(&self, rule: &RuleName) -> GrammarResult<&[Production]> {
        let r = self
            .rules
            .get(rule)
            .ok_or_else(|| GrammarError::UnknownRule { rule: rule.clone() })?;
        if r.productions().is_empty() {
            return Err(GrammarError::NoProductions { rule: rule.clone() });
        }
        Ok(r.productions())
    }

    /// The canonical root ref used as the k-path origin for a rule.
    pub fn root_ref(&self, rule: &RuleName) -> GrammarResult<&Atom> {
        self.root_refs
            .get(rule)
            .ok_or_else(|| GrammarError::UnknownRule { rule: rule.clone() })
    }

    /// The productions of `rule` that are usable at the given depth limit
    /// under the given context, in declaration order. At depth 1 a
    /// production containing refs cannot be used, since expanding it could
    /// not terminate.
    fn active_productions(
        &self,
        rule: &RuleName,
        depth_limit: usize,
        ctx: &Context<'_>,
    ) -> GrammarResult<Vec<&Production>> {
        let prods = self.productions(rule)?;
        let mut active = Vec::new();
        let mut skipped_refs = false;
        for prod in prods {
            if depth_limit == 1 && prod.has_refs() {
                skipped_refs = true;
                continue;
            }
            if ctx.has_all(prod.ctx_req()) {
                active.push(prod);
            }
        }
        if active.is_empty() {
            return Err(if skipped_refs {
                GrammarError::NoTerminalProduction { rule: rule.clone() }
            } else {
                GrammarError::NoActiveProductions { rule: rule.clone() }
            });
        }
        Ok(active)
    }

    /// Produce one random value from `rule`: a list headed by the rule name,
    /// whose elements expand one uniformly-chosen active production.
    pub fn random_value(
        &self,
        rule: &RuleName,
        rng: &mut impl Rng,
        depth_limit: usize,
        ctx: &mut Context<'_>,
    ) -> GrammarResult<Value> {
        if depth_limit == 0 {
            return Err(GrammarError::DepthLimitExhausted { rule: rule.clone() });
        }
        let prods = self.active_productions(rule, depth_limit, ctx)?;
        let prod = prods[rng.gen_range(0..prods.len())];
        let mut elements = vec![Value::Sym(rule.clone())];
        for atom in prod.atoms() {
            match atom.kind() {
                AtomKind::Lit(v) => elements.push(v.clone()),
                AtomKind::Ref {
                    rule: subrule,
                    ctx_ext,
                } => {
                    ctx.push_all(ctx_ext);
                    let value = self.random_value(subrule, rng, depth_limit - 1, ctx)?;
                    ctx.pop(ctx_ext.len());
                    elements.push(value);
                }
            }
        }
        Ok(Value::list(elements))
    }

    /// Populate a plan by sampling every parameter of `specs` independently,
    /// each under a fresh context seeded with the full spec.
    pub fn random_plan(
        &self,
        test_name: TestName,
        specs: &ParamSpecs,
        rng: &mut impl Rng,
        depth_limit: usize,
    ) -> GrammarResult<Plan> {
        let mut plan = Plan::new(test_name);
        for (param, rule) in specs {
            let mut ctx = Context::new(specs);
            let value = self.random_value(rule, rng, depth_limit, &mut ctx)?;
            plan.add_param(param.clone(), value);
        }
        Ok(plan)
    }

    /// Enumerate all k-paths reachable from the root ref of `rule`.
    pub fn kpath_set(
        &self,
        k: usize,
        rule: &RuleName,
        specs: &ParamSpecs,
    ) -> GrammarResult<BTreeSet<KPath>> {
        let root = self.root_ref(rule)?.clone();
        let mut path_roots = BTreeSet::from([root.clone()]);
        let mut ctx = Context::new(specs);
        self.expand_kpath_prefix(k, &vec![root], &mut ctx, &mut path_roots)
    }

    /// Expand a k-path prefix: extend through active productions of the
    /// prefix's last ref, and restart a fresh prefix at every ref not yet
    /// used as a path root. `path_roots` only ever grows, which bounds the
    /// enumeration on cyclic grammars.
    fn expand_kpath_prefix(
        &self,
        k: usize,
        prefix: &KPath,
        ctx: &mut Context<'_>,
        path_roots: &mut BTreeSet<Atom>,
    ) -> GrammarResult<BTreeSet<KPath>> {
        debug_assert!(k > 0 && !prefix.is_empty());
        if prefix.len() == k {
            return Ok(BTreeSet::from([prefix.clone()]));
        }
        let anchor = prefix.last().unwrap_or_else(|| {
            unreachable!("k-path prefixes are never empty")
        });
        let Some((rule, _)) = anchor.ref_parts() else {
            unreachable!("k-path prefixes end in refs below length k")
        };
        let prods = self.active_productions(rule, k, ctx)?;
        let mut res = BTreeSet::new();
        for prod in prods {
            for ext in prod.atoms() {
                let ref_parts = ext.ref_parts();
                if let Some((_, ctx_ext)) = ref_parts {
                    ctx.push_all(ctx_ext);
                }
                // Literal extensions are only accepted at the last step of a
                // k-path; earlier steps require refs.
                if ref_parts.is_some() || prefix.len() == k - 1 {
                    let mut extended = prefix.clone();
                    extended.push(ext.clone());
                    res.extend(self.expand_kpath_prefix(k, &extended, ctx, path_roots)?);
                }
                // A ref we have not yet started from also anchors a new
                // family of k-paths.
                if ref_parts.is_some() && !path_roots.contains(ext) {
                    path_roots.insert(ext.clone());
                    let restarted = vec![ext.clone()];
                    res.extend(self.expand_kpath_prefix(k, &restarted, ctx, path_roots)?);
                }
                if let Some((_, ctx_ext)) = ref_parts {
                    ctx.pop(ctx_ext.len());
                }
            }
        }
        Ok(res)
    }

    /// Expand the rule at the end of `path` into a pair of value sets, at
    /// least one of which is non-empty: expansions that cover some
    /// still-uncovered k-path, and (only when the first set is empty) the
    /// single smallest non-covering expansion.
    ///
    /// Per production: each atom is checked for extending the (k−1)-suffix of
    /// `path` to an uncovered k-path, literal atoms expand to themselves, ref
    /// atoms recurse, and the per-atom expansion sets are combined by
    /// cyclical zip rather than cartesian product.
    fn covering_or_minimal(
        &self,
        path: &[Atom],
        depth_limit: usize,
        ctx: &mut Context<'_>,
        k: usize,
        uncovered: &mut BTreeSet<KPath>,
    ) -> GrammarResult<(BTreeSet<Value>, BTreeSet<Value>)> {
        debug_assert!(!path.is_empty() && k > 0);
        let Some((rule, _)) = path.last().and_then(Atom::ref_parts) else {
            unreachable!("covering paths are chains of refs")
        };
        if depth_limit == 0 {
            return Err(GrammarError::DepthLimitExhausted { rule: rule.clone() });
        }

        let mut kpath: KPath = if path.len() >= k - 1 {
            path[path.len() - (k - 1)..].to_vec()
        } else {
            Vec::new()
        };

        let prods = self.active_productions(rule, depth_limit, ctx)?;
        let mut covering = BTreeSet::new();
        let mut non_covering = BTreeSet::new();

        for prod in prods {
            let mut covers = false;
            // Every atom can complete a distinct uncovered k-path; one
            // expansion of this production witnesses all of them at once.
            for atom in prod.atoms() {
                kpath.push(atom.clone());
                if uncovered.remove(&kpath) {
                    covers = true;
                }
                kpath.pop();
            }

            let mut prefixes: BTreeSet<Vec<Value>> =
                BTreeSet::from([vec![Value::Sym(rule.clone())]]);
            for atom in prod.atoms() {
                let expansion: BTreeSet<Value> = match atom.kind() {
                    AtomKind::Lit(v) => BTreeSet::from([v.clone()]),
                    AtomKind::Ref {
                        rule: _,
                        ctx_ext,
                    } => {
                        ctx.push_all(ctx_ext);
                        let mut subpath = path.to_vec();
                        subpath.push(atom.clone());
                        let (sub_covering, sub_minimal) =
                            self.covering_or_minimal(&subpath, depth_limit - 1, ctx, k, uncovered)?;
                        ctx.pop(ctx_ext.len());
                        if !sub_covering.is_empty() {
                            covers = true;
                            sub_covering
                        } else {
                            debug_assert_eq!(sub_minimal.len(), 1);
                            sub_minimal
                        }
                    }
                };
                prefixes = extend_by_cycling(&prefixes, &expansion, |prefix, v| {
                    let mut extended = prefix.clone();
                    extended.push(v.clone());
                    extended
                });
            }

            let target = if covers {
                &mut covering
            } else {
                &mut non_covering
            };
            for prefix in prefixes {
                target.insert(Value::list(prefix));
            }
        }

        if !covering.is_empty() {
            non_covering.clear();
        } else if non_covering.len() > 1 {
            // Keep only the smallest non-covering expansion.
            let smallest = non_covering
                .iter()
                .next()
                .cloned()
                .unwrap_or_else(|| unreachable!("set checked non-empty"));
            non_covering = BTreeSet::from([smallest]);
        }
        debug_assert!(!(covering.is_empty() && non_covering.is_empty()));
        Ok((covering, non_covering))
    }

    /// Generate a set of values whose derivations collectively cover every
    /// k-path of `rule`. The depth limit starts at `k` and is raised by one
    /// each time an iteration fails to produce a covering expansion.
    pub fn kpath_covering(
        &self,
        rule: &RuleName,
        k: usize,
        specs: &ParamSpecs,
    ) -> GrammarResult<BTreeSet<Value>> {
        let mut uncovered = self.kpath_set(k, rule, specs)?;
        let root = self.root_ref(rule)?.clone();
        let mut ctx = Context::new(specs);
        let mut res = BTreeSet::new();
        let mut depth_limit = k;
        while !uncovered.is_empty() {
            let (covering, _) = self.covering_or_minimal(
                std::slice::from_ref(&root),
                depth_limit,
                &mut ctx,
                k,
                &mut uncovered,
            )?;
            if covering.is_empty() {
                depth_limit += 1;
            } else {
                res.extend(covering);
            }
        }
        Ok(res)
    }

    /// Per-parameter k-path coverings combined into whole-`Params` bindings
    /// by cyclical zip, so the result size is the largest per-parameter
    /// covering size.
    pub fn kpath_coverings(
        &self,
        k: usize,
        specs: &ParamSpecs,
    ) -> GrammarResult<BTreeSet<Params>> {
        let mut res: BTreeSet<Params> = BTreeSet::new();
        for (param, rule) in specs {
            let values = self.kpath_covering(rule, k, specs)?;
            if values.is_empty() {
                continue;
            }
            if res.is_empty() {
                for value in &values {
                    let mut params = Params::new();
                    params.insert(param.clone(), value.clone());
                    res.insert(params);
                }
            } else {
                res = extend_by_cycling(&res, &values, |params, value| {
                    let mut extended = params.clone();
                    extended.insert(param.clone(), value.clone());
                    extended
                });
            }
        }
        Ok(res)
    }

    /// Lift each covering `Params` into a plan for `test_name`.
    pub fn plans_from_kpath_coverings(
        &self,
        test_name: TestName,
        specs: &ParamSpecs,
        k: usize,
    ) -> GrammarResult<BTreeSet<Plan>> {
        Ok(self
            .kpath_coverings(k, specs)?
            .into_iter()
            .map(|params| Plan::with_params(test_name.clone(), params))
            .collect())
    }
}
