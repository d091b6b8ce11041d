//! The test administrator: runs plans against the system under test,
//! computes trajectories, and drives the three administration phases
//! (initialize from k-paths, check the corpus, expand randomly).

use crate::coverage::{EdgeCounters, SancovCounters};
use crate::env;
use crate::trajectory::{self, classify, Trajectory};
use photesthesis_corpus::{
    Corpus, CorpusError, ParamName, ParamSpecs, Plan, PlanHash, TestName, Transcript, VarName,
};
use photesthesis_grammar::{Grammar, GrammarError};
use photesthesis_value::{hash_bytes, StableHasher, Value};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, info};

/// Engine-level errors. Invariant failures and transcript mismatches are
/// reported through the [`TestCase`] hooks and the return value of
/// [`Admin::administer`], not through this type.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Grammar(#[from] GrammarError),

    #[error(transparent)]
    Corpus(#[from] CorpusError),

    #[error("user trajectory is unstable on plan {plan}")]
    UnstableUserTrajectory { plan: PlanHash },

    #[error(
        "unable to stabilize path trajectory on plan {plan}; \
         try raising PHOTESTHESIS_STABILITY_RETRIES"
    )]
    UnstablePathTrajectory { plan: PlanHash },

    #[error("missing parameter {param}")]
    MissingParam { param: ParamName },

    #[error("test failure: {message}")]
    Test { message: String },
}

/// Plan hashes of runs that failed an invariant (initialize/expand phases)
/// or mismatched their stored transcript (check phase).
pub type Failures = Vec<PlanHash>;

type Trajectories = BTreeMap<Trajectory, Transcript>;

/// The observation surface handed to [`TestCase::run`] for one plan.
pub struct Runtime {
    plan: Plan,
    transcript: Transcript,
    user_hasher: StableHasher,
    invariant_failures: Vec<(VarName, Value, Value)>,
}

impl Runtime {
    fn new(plan: Plan) -> Self {
        Runtime {
            transcript: Transcript::new(plan.clone()),
            plan,
            user_hasher: StableHasher::new(),
            invariant_failures: Vec::new(),
        }
    }

    /// The value bound to a parameter of the current plan.
    pub fn param(&self, name: &ParamName) -> Result<Value, EngineError> {
        self.plan
            .param(name)
            .cloned()
            .ok_or_else(|| EngineError::MissingParam {
                param: name.clone(),
            })
    }

    /// Report a value expected to be identical across all executions. A
    /// mismatch marks the run failed; it touches neither the transcript nor
    /// the trajectory.
    pub fn invariant(&mut self, name: VarName, expected: Value, got: Value) {
        if expected != got {
            self.invariant_failures.push((name, expected, got));
        }
    }

    /// Fold an observation into the run's user trajectory, in call order.
    /// Mnemonic: TRAced values contribute to TRAjectories.
    pub fn trace(&mut self, name: &VarName, value: &Value) {
        self.user_hasher.add_key_value(name, value);
    }

    /// Record an observation to the transcript without tracing it.
    /// Mnemonic: checks can fail, and failures are reported.
    pub fn check(&mut self, name: VarName, value: Value) {
        self.transcript.add_checked(name, value);
    }

    /// Trace an observation and record it to the transcript.
    /// Mnemonic: TRACK = TRAce + cheCK.
    pub fn track(&mut self, name: VarName, value: Value) {
        self.trace(&name, &value);
        self.transcript.add_tracked(name, value);
    }
}

/// The boundary a test implements around its system under test.
pub trait TestCase {
    /// The parameter specs seeding generation; must be non-empty.
    fn seed_specs(&self) -> Vec<ParamSpecs>;

    /// Run the system under test once: read parameters and report
    /// observations through `rt`.
    fn run(&mut self, rt: &mut Runtime) -> Result<(), EngineError>;

    /// Called when re-checking a stored transcript produced a different one.
    /// The stored transcript is replaced with `got` afterwards.
    fn on_transcript_mismatch(&mut self, _expected: &Transcript, _got: &Transcript) {}

    /// Called once per failed `invariant` observation.
    fn on_invariant_failure(
        &mut self,
        _plan: &Plan,
        _var: &VarName,
        _expected: &Value,
        _got: &Value,
    ) {
    }
}

struct RunRecord {
    transcript: Transcript,
    trajectory: Trajectory,
    user_trajectory: u64,
    path_trajectory: u64,
    failed: bool,
}

/// Administers one test: owns the PRNG and trajectory state, borrows the
/// grammar and corpus for the duration.
pub struct Admin<'a, T: TestCase> {
    grammar: &'a Grammar,
    corpus: &'a mut Corpus,
    test_name: TestName,
    test: T,
    seed_specs: Vec<ParamSpecs>,
    rng: StdRng,
    verbose: u64,
    counters: Box<dyn EdgeCounters>,
    stability_mask: Option<Vec<u8>>,
    last_classified: Vec<u8>,
}

impl<'a, T: TestCase> Admin<'a, T> {
    /// If never seeded explicitly (or via `PHOTESTHESIS_RANDOM_SEED`), the
    /// PRNG starts from zero so administration is reproducible by default.
    pub fn new(grammar: &'a Grammar, corpus: &'a mut Corpus, test_name: TestName, test: T) -> Self {
        let seed_specs = test.seed_specs();
        Admin {
            grammar,
            corpus,
            test_name,
            test,
            seed_specs,
            rng: StdRng::seed_from_u64(0),
            verbose: env::verbose(),
            counters: Box::new(SancovCounters),
            stability_mask: None,
            last_classified: Vec::new(),
        }
    }

    /// Replace the edge-counter source (instrumentation-backed by default).
    pub fn with_counters(mut self, counters: Box<dyn EdgeCounters>) -> Self {
        self.counters = counters;
        self
    }

    /// Seed the PRNG with a specific value.
    pub fn seed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }

    /// Seed the PRNG from operating-system entropy.
    pub fn seed_from_entropy(&mut self) {
        self.rng = StdRng::from_entropy();
    }

    pub fn test_name(&self) -> &TestName {
        &self.test_name
    }

    /// Give back the test case when administration is done.
    pub fn into_test(self) -> T {
        self.test
    }

    /// Check and/or grow the corpus. With no transcripts stored for this
    /// test, the corpus is initialized from k-path coverings; otherwise
    /// every stored transcript is re-checked, and if all of them pass,
    /// `steps` random plans expand the corpus. All three parameters can be
    /// overridden from the environment.
    ///
    /// Returns the plan hashes of failing runs; assert it is empty to get a
    /// useful signal in an outer test harness.
    pub fn administer(
        &mut self,
        expansion_steps: u64,
        kpath_length: u64,
        random_depth: u64,
    ) -> Result<Failures, EngineError> {
        let steps = env::expansion_steps().unwrap_or(expansion_steps);
        let k = env::kpath_length().unwrap_or(kpath_length);
        let depth = env::random_depth().unwrap_or(random_depth);
        if let Some(seed) = env::random_seed() {
            self.seed(seed);
        }

        if !self.corpus.has_transcripts(&self.test_name) {
            self.initialize_from_kpaths(k)
        } else {
            let mut trajectories = Trajectories::new();
            let failures = self.check_corpus(&mut trajectories)?;
            if !failures.is_empty() {
                return Ok(failures);
            }
            self.randomly_expand_corpus(&mut trajectories, steps, depth)
        }
    }

    /// Phase 1: populate an empty corpus from k-path coverings of every
    /// seed spec, ramping the path length from 2 up to (excluding) the
    /// configured k.
    fn initialize_from_kpaths(&mut self, kpath_length: u64) -> Result<Failures, EngineError> {
        let mut trajectories = Trajectories::new();
        let mut failures = Failures::new();
        if self.verbose > 0 {
            info!(test = %self.test_name, k = kpath_length, "generating initial k-path coverings");
        }
        let mut n_plans = 0usize;
        let seed_specs = self.seed_specs.clone();
        for spec in &seed_specs {
            for k in 2..kpath_length {
                let plans = self.grammar.plans_from_kpath_coverings(
                    self.test_name.clone(),
                    spec,
                    k as usize,
                )?;
                if self.verbose > 0 {
                    info!(
                        plans = plans.len(),
                        params = spec.len(),
                        "running covering plans for spec"
                    );
                }
                for plan in plans {
                    n_plans += 1;
                    let (_, failed) = self.run_plan_and_maybe_expand(&plan, &mut trajectories)?;
                    if failed {
                        failures.push(plan.hash());
                    }
                }
            }
        }
        if self.verbose > 0 {
            info!(
                test = %self.test_name,
                plans = n_plans,
                trajectories = trajectories.len(),
                "initialized corpus"
            );
            self.report_failures(&failures);
        }
        Ok(failures)
    }

    /// Phase 2: re-run every stored transcript's plan (optionally limited to
    /// one plan hash from the environment). A differing fresh transcript is
    /// reported and then replaces the stored one, approval-style.
    fn check_corpus(&mut self, trajectories: &mut Trajectories) -> Result<Failures, EngineError> {
        let stored: Vec<Transcript> = self.corpus.transcripts(&self.test_name).cloned().collect();
        if stored.is_empty() {
            return Ok(Failures::new());
        }
        let mut failures = Failures::new();
        if self.verbose > 0 {
            info!(test = %self.test_name, transcripts = stored.len(), "checking corpus");
        }
        let limit_to = env::test_hash();
        for transcript in stored {
            let plan_hash = transcript.plan().hash();
            if limit_to.is_some_and(|h| h != plan_hash) {
                continue;
            }
            let plan = transcript.plan().clone();
            let rec = self.run_plan_stable(&plan)?;
            if rec.transcript != transcript {
                if self.verbose > 0 {
                    info!(plan = %plan_hash, "transcript mismatch, replacing stored transcript");
                }
                self.test.on_transcript_mismatch(&transcript, &rec.transcript);
                self.corpus.update_transcript(rec.transcript.clone())?;
                failures.push(plan_hash);
            }
            if rec.failed && !failures.contains(&plan_hash) {
                failures.push(plan_hash);
            }
            trajectories.insert(rec.trajectory, rec.transcript);
        }
        if self.verbose > 0 {
            info!(
                test = %self.test_name,
                trajectories = trajectories.len(),
                "checked corpus"
            );
            self.report_failures(&failures);
        }
        Ok(failures)
    }

    /// Phase 3: random exploration. Each step picks a spec (from the seed
    /// list, or from the plan of a previously seen trajectory) and runs one
    /// random plan, keeping it when its trajectory and transcript are new.
    fn randomly_expand_corpus(
        &mut self,
        trajectories: &mut Trajectories,
        steps: u64,
        depth: u64,
    ) -> Result<Failures, EngineError> {
        if steps == 0 {
            return Ok(Failures::new());
        }
        let mut failures = Failures::new();
        let mut new_trajectories = 0usize;
        if self.verbose > 0 {
            info!(test = %self.test_name, steps, depth, "expanding corpus");
        }
        for _ in 0..steps {
            let spec: ParamSpecs = if trajectories.is_empty() {
                let idx = self.rng.gen_range(0..self.seed_specs.len());
                self.seed_specs[idx].clone()
            } else {
                let idx = self.rng.gen_range(0..trajectories.len());
                let chosen = trajectories
                    .values()
                    .nth(idx)
                    .unwrap_or_else(|| unreachable!("index drawn below len"));
                chosen.plan().param_specs()?
            };
            let plan = self.grammar.random_plan(
                self.test_name.clone(),
                &spec,
                &mut self.rng,
                depth as usize,
            )?;
            let (novel, failed) = self.run_plan_and_maybe_expand(&plan, trajectories)?;
            if novel {
                new_trajectories += 1;
            }
            if failed {
                failures.push(plan.hash());
            }
        }
        if self.verbose > 0 {
            info!(
                test = %self.test_name,
                steps,
                depth,
                new_trajectories,
                corpus_size = self.corpus.transcript_count(&self.test_name),
                "explored random inputs"
            );
            self.report_failures(&failures);
        }
        Ok(failures)
    }

    /// Run one plan and add its transcript to the corpus when both the
    /// trajectory and the transcript are new. Returns (novel, failed).
    fn run_plan_and_maybe_expand(
        &mut self,
        plan: &Plan,
        trajectories: &mut Trajectories,
    ) -> Result<(bool, bool), EngineError> {
        let rec = self.run_plan_stable(plan)?;
        let novel = !trajectories.contains_key(&rec.trajectory)
            && !self.corpus.contains(&rec.transcript);
        if novel {
            if self.verbose > 1 {
                debug!(plan = %plan.hash(), trajectory = %rec.trajectory, "novel trajectory found");
            }
            trajectories.insert(rec.trajectory, rec.transcript.clone());
            self.corpus.add_transcript(rec.transcript)?;
        }
        Ok((novel, rec.failed))
    }

    /// Run the plan once: zero counters, invoke the test case, classify and
    /// hash the counters, finish the user hasher, combine both halves.
    fn run_plan(&mut self, plan: &Plan) -> Result<RunRecord, EngineError> {
        self.counters.zero();
        let mut rt = Runtime::new(plan.clone());
        self.test.run(&mut rt)?;

        let mut buf = std::mem::take(&mut self.last_classified);
        self.counters.read(&mut buf);
        classify(&mut buf);
        if let Some(mask) = &self.stability_mask {
            for (byte, m) in buf.iter_mut().zip(mask) {
                *byte &= m;
            }
        }
        let path_trajectory = if buf.is_empty() { 0 } else { hash_bytes(&buf) };
        self.last_classified = buf;

        let user_trajectory = rt.user_hasher.finish();
        let trajectory = trajectory::combine(path_trajectory, user_trajectory);

        let invariant_failures = std::mem::take(&mut rt.invariant_failures);
        let failed = !invariant_failures.is_empty();
        for (var, expected, got) in &invariant_failures {
            if self.verbose > 0 {
                info!(
                    test = %self.test_name,
                    plan = %plan.hash(),
                    invariant = %var,
                    expected = %expected,
                    got = %got,
                    "invariant failed"
                );
            }
            self.test.on_invariant_failure(plan, var, expected, got);
        }

        if self.verbose > 1 {
            debug!(plan = %plan.hash(), trajectory = %trajectory, "ran plan");
        }
        Ok(RunRecord {
            transcript: rt.transcript,
            trajectory,
            user_trajectory,
            path_trajectory,
            failed,
        })
    }

    /// Run the plan under the stability protocol. With
    /// `PHOTESTHESIS_STABILITY_RETRIES` unset each plan runs exactly once.
    /// With it set, the plan is re-run: an unstable user trajectory is
    /// fatal, and unstable path edges are masked out of the classified
    /// counters until the path trajectory settles or retries run out.
    fn run_plan_stable(&mut self, plan: &Plan) -> Result<RunRecord, EngineError> {
        let first = self.run_plan(plan)?;
        let retries = env::stability_retries();
        if retries == 0 {
            return Ok(first);
        }

        let saved_user = first.user_trajectory;
        let mut rec = self.run_plan(plan)?;
        if rec.user_trajectory != saved_user {
            return Err(EngineError::UnstableUserTrajectory { plan: plan.hash() });
        }
        if rec.path_trajectory == first.path_trajectory {
            return Ok(rec);
        }

        if self.verbose > 0 {
            info!(plan = %plan.hash(), "path trajectory is unstable, attempting to stabilize");
        }
        if self.stability_mask.is_none() {
            self.stability_mask = Some(vec![0xff; self.counters.len()]);
        }
        for _ in 0..retries {
            // Mask edges until consecutive runs agree byte-for-byte.
            loop {
                let previous = self.last_classified.clone();
                rec = self.run_plan(plan)?;
                let mut newly_masked = 0usize;
                let mut total_masked = 0usize;
                if let Some(mask) = self.stability_mask.as_mut() {
                    for i in 0..mask.len().min(previous.len()).min(self.last_classified.len()) {
                        if mask[i] == 0 {
                            total_masked += 1;
                        } else if previous[i] != self.last_classified[i] {
                            mask[i] = 0;
                            newly_masked += 1;
                        }
                    }
                }
                if self.verbose > 0 {
                    info!(
                        newly_masked,
                        total_masked,
                        edges = self.counters.len(),
                        "masked unstable path edges"
                    );
                }
                if newly_masked == 0 {
                    break;
                }
            }
            // The mask should hold now; confirm with one more run.
            let settled = rec.path_trajectory;
            rec = self.run_plan(plan)?;
            if rec.path_trajectory == settled {
                return Ok(rec);
            }
        }
        Err(EngineError::UnstablePathTrajectory { plan: plan.hash() })
    }

    fn report_failures(&self, failures: &Failures) {
        if !failures.is_empty() {
            let list = failures
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            info!(test = %self.test_name, failures = %list, "failing plan hashes");
        }
    }
}
