//! The epoch controller and its mutation and combination passes.
//!
//! All run state lives on [`Sampler`]: the classified formula, the
//! paired solvers, the seeded RNG, the unsat caches, the deduplication
//! set, the output sink, and the budgets. Termination travels as a
//! [`StopReason`] outcome up the call chain, never as unwinding.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use galago_model::codec::encode;
use galago_model::combine::combine_model;
use galago_model::sorts::{Declaration, Sort};
use galago_model::value::{BvValue, Model, Value};
use galago_smt::ast::bv_literal;
use galago_smt::classify::{self, Classified, VarShape};
use galago_smt::error::SamplerError;
use galago_smt::eval;
use galago_smt::extract::extract_model;
use galago_smt::loader::{self, ArrayInfo};
use galago_smt::solver::{CheckOutcome, SolverPair};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};
use z3::ast::{Ast, Bool, Dynamic, BV};

use crate::config::{SamplerConfig, Strategy};
use crate::output::OutputSink;
use crate::seed;
use crate::stats::Stats;

/// Why the epoch loop ended. None of these are errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The valid-sample budget is exhausted.
    Samples,
    /// The wall-clock budget is exhausted.
    Timeout,
    /// The projected cost of the remaining probes overruns the budget.
    Slow,
    /// A seed call came back unsat.
    SeedUnsat,
    /// A seed call came back unknown.
    SeedUnknown,
}

enum Flow {
    Continue,
    Stop(StopReason),
}

enum Emitted {
    Valid,
    Invalid,
    Stop(StopReason),
}

enum Checked {
    Sat(z3::Model),
    Unsat,
    Unknown,
    Stop(StopReason),
}

struct Budget {
    start: Instant,
    max_time: Duration,
}

impl Budget {
    fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    fn exhausted(&self) -> bool {
        self.elapsed() >= self.max_time
    }
}

/// One flip probe: the equality pinning an atomic position to its seed
/// value, and the unsat-cache key for the position, when it has one.
struct Probe {
    constraint: Bool,
    key: Option<ProbeKey>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum ProbeKey {
    Indicator { var: usize, bit: u32 },
    Internal(usize),
}

pub struct Sampler {
    cfg: SamplerConfig,
    classified: Classified,
    decls: Vec<Declaration>,
    /// Positions of the variables sampling diversity is measured over.
    indicators: Vec<usize>,
    formula: Bool,
    solvers: SolverPair,
    rng: StdRng,
    unsat_ind: HashSet<(usize, u32)>,
    unsat_internal: HashSet<usize>,
    all_mutations: HashSet<Vec<u8>>,
    sink: OutputSink,
    stats: Stats,
    budget: Budget,
    array_map: HashMap<String, ArrayInfo>,
}

impl Sampler {
    /// Load, classify, and check the input once. A formula that is
    /// unsat or undecidable never reaches the epoch loop.
    pub fn new(cfg: SamplerConfig) -> Result<Self, SamplerError> {
        let budget = Budget {
            start: Instant::now(),
            max_time: cfg.max_time,
        };
        let input_seed = (cfg.seed != 0).then_some(cfg.seed);
        let final_seed = match cfg.seed {
            0 => SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(1),
            seed => seed,
        };
        let mut rng = StdRng::seed_from_u64(final_seed);
        info!(final_seed, "sampler starting");

        // global solver parameters, set before the context first runs:
        // ground select-over-store chains must fold during direct
        // evaluation, every call gets an internal timeout seeded from
        // the budget, and the solver RNGs draw from the run seed
        z3::set_global_param("rewriter.expand_select_store", "true");
        let millis = cfg.max_time.as_millis().min(u128::from(u32::MAX)).to_string();
        z3::set_global_param("timeout", &millis);
        let solver_seed = rng.gen::<u32>().to_string();
        z3::set_global_param("sat.random_seed", &solver_seed);
        z3::set_global_param("smt.random_seed", &solver_seed);

        let array_map = match &cfg.array_map_path {
            Some(path) => loader::load_array_map(path)?,
            None => HashMap::new(),
        };
        let mut formula = loader::load_formula(&cfg.formula_path)?;
        let mut convert_time = Duration::ZERO;
        if cfg.strategy == Strategy::Sat {
            let started = Instant::now();
            formula = loader::bit_blast(&formula)?;
            convert_time = started.elapsed();
        }
        let mut classified = classify::classify(&formula)?;

        // mapped cells are worth probing even when φ never selects them
        let hints: Vec<(String, u32, usize)> = classified
            .variables
            .iter()
            .filter_map(|var| {
                let info = array_map.get(&var.decl.name)?;
                match var.decl.sort {
                    Sort::Array { index, .. } => {
                        Some((var.decl.name.clone(), index, info.length))
                    }
                    _ => None,
                }
            })
            .collect();
        for (name, index_width, length) in hints {
            let cells: Vec<Dynamic> = (0..length)
                .map(|cell| Dynamic::from(bv_literal(&BvValue::from_u64(index_width, cell as u64))))
                .collect();
            classified.note_array_indices(&name, cells);
        }

        let decls = classified.declarations();
        let indicators: Vec<usize> = match cfg.strategy {
            Strategy::Sat => (0..decls.len())
                .filter(|&pos| classify::user_meaningful(&decls[pos].name))
                .collect(),
            _ => (0..decls.len()).collect(),
        };

        let solvers = SolverPair::new(&formula, cfg.max_time, rng.gen());
        let mut stats = Stats {
            final_seed,
            input_seed,
            convert_time,
            ..Stats::default()
        };

        let started = Instant::now();
        let outcome = solvers.check();
        stats.solver_calls += 1;
        stats.solver_time += started.elapsed();
        match outcome {
            CheckOutcome::Sat(_) => {}
            CheckOutcome::Unsat => return Err(SamplerError::UnsatisfiableFormula),
            CheckOutcome::Unknown => return Err(SamplerError::UnableToSolve),
        }

        let sink = OutputSink::create(&cfg.output_path)?;
        Ok(Self {
            cfg,
            classified,
            decls,
            indicators,
            formula,
            solvers,
            rng,
            unsat_ind: HashSet::new(),
            unsat_internal: HashSet::new(),
            all_mutations: HashSet::new(),
            sink,
            stats,
            budget,
            array_map,
        })
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    pub fn declarations(&self) -> &[Declaration] {
        &self.decls
    }

    pub fn elapsed(&self) -> Duration {
        self.budget.elapsed()
    }

    /// Drive epochs until a budget runs out or the solver stops
    /// producing seeds.
    pub fn run(&mut self) -> Result<StopReason, SamplerError> {
        let outcome = self.run_epochs();
        self.sink.flush()?;
        outcome
    }

    fn run_epochs(&mut self) -> Result<StopReason, SamplerError> {
        loop {
            match self.epoch()? {
                Flow::Continue => {}
                Flow::Stop(reason) => {
                    info!(?reason, "stopping");
                    return Ok(reason);
                }
            }
        }
    }

    fn epoch(&mut self) -> Result<Flow, SamplerError> {
        self.stats.epochs += 1;
        info!(epoch = self.stats.epochs, "starting epoch");

        // the random objective lives only for the seed check
        self.solvers.push();
        seed::assert_objective(
            &self.solvers,
            &self.classified,
            &self.indicators,
            &self.array_map,
            self.cfg.soft_array_ratio,
            &mut self.rng,
        );
        let outcome = timed_check(
            &self.solvers,
            &mut self.stats,
            &self.budget,
            self.cfg.max_samples,
        );
        self.solvers.pop();

        let seed_z3 = match outcome {
            Checked::Sat(model) => model,
            Checked::Unsat => return Ok(Flow::Stop(StopReason::SeedUnsat)),
            Checked::Unknown => return Ok(Flow::Stop(StopReason::SeedUnknown)),
            Checked::Stop(reason) => return Ok(Flow::Stop(reason)),
        };
        let seed_model = extract_model(&seed_z3, &self.classified)?;
        let seed_buf = encode(&seed_model);
        if let Emitted::Stop(reason) = self.emit(&seed_model, seed_buf, 0)? {
            return Ok(Flow::Stop(reason));
        }

        // one scope for the epoch's soft bank and every flip probe;
        // popped before the next epoch on every path
        self.solvers.push();
        let flow = self.mutate_and_combine(&seed_z3, &seed_model);
        self.solvers.pop();
        flow
    }

    fn mutate_and_combine(
        &mut self,
        seed_z3: &z3::Model,
        seed: &Model,
    ) -> Result<Flow, SamplerError> {
        let mut epoch_set: HashSet<Vec<u8>> = HashSet::new();
        let probes = self.build_probes(seed_z3, seed);
        let (sigma, stopped) = self.run_probes(probes, &mut epoch_set)?;
        if let Some(reason) = stopped {
            return Ok(Flow::Stop(reason));
        }
        self.combine_pass(seed, sigma, &mut epoch_set)
    }

    /// Build the constraint stream for one seed: an equality per atomic
    /// position, asserting the soft bank at the epoch scope as it goes.
    fn build_probes(&mut self, seed_z3: &z3::Model, seed: &Model) -> Vec<Probe> {
        let mut probes = Vec::new();
        self.stats.all_ind_bits = 0;
        if self.cfg.flip_internal {
            for (index, term) in self.classified.internal.iter().enumerate() {
                let Some(valued) = seed_z3.eval::<Dynamic>(term, true) else {
                    continue;
                };
                let Some(constraint) = pin_equal(term, &valued) else {
                    continue;
                };
                probes.push(Probe {
                    constraint,
                    key: Some(ProbeKey::Internal(index)),
                });
            }
        }
        for &pos in &self.indicators {
            let var = &self.classified.variables[pos];
            let value = &seed.values[pos];
            match (&var.decl.sort, &var.shape, value) {
                (Sort::Bool, VarShape::Const(term), Value::Bool(b)) => {
                    let v = term.as_bool().expect("classified as Bool");
                    let constraint = v.eq(&Bool::from_bool(*b));
                    self.solvers.assert_soft(&constraint);
                    self.stats.all_ind_bits += 1;
                    probes.push(Probe {
                        constraint,
                        key: Some(ProbeKey::Indicator { var: pos, bit: 0 }),
                    });
                }
                (Sort::Bv(width), VarShape::Const(term), Value::Bv(bits)) => {
                    let v = term.as_bv().expect("classified as a bit-vector");
                    for bit in 0..*width {
                        let target = BV::from_u64(u64::from(bits.bit(bit)), 1);
                        let constraint = v.extract(bit, bit).eq(&target);
                        if self.cfg.strategy == Strategy::SmtBit {
                            self.solvers.assert_soft(&constraint);
                        }
                        self.stats.all_ind_bits += 1;
                        probes.push(Probe {
                            constraint,
                            key: Some(ProbeKey::Indicator { var: pos, bit }),
                        });
                    }
                    if self.cfg.strategy == Strategy::SmtBv {
                        self.solvers.assert_soft(&v.eq(&bv_literal(bits)));
                    }
                }
                (Sort::Array { .. }, VarShape::Const(term), Value::Array { entries, .. }) => {
                    let array = term.as_array().expect("classified as an array");
                    for (arg, val) in entries {
                        let cell = array.select(&bv_literal(arg));
                        let cell = cell.as_bv().expect("array over bit-vectors");
                        push_entry_probes(
                            &mut probes,
                            &self.solvers,
                            self.cfg.strategy,
                            &cell,
                            val,
                        );
                    }
                }
                (Sort::Func { range, .. }, VarShape::Func(decl), Value::Func { entries, .. }) => {
                    for (args, val) in entries {
                        let arg_terms: Vec<BV> = args.iter().map(bv_literal).collect();
                        let refs: Vec<&dyn Ast> =
                            arg_terms.iter().map(|term| term as &dyn Ast).collect();
                        let applied = decl.apply(&refs);
                        match (range.as_ref(), val) {
                            (Sort::Bool, Value::Bool(b)) => {
                                let constraint = applied
                                    .as_bool()
                                    .expect("classified range is Bool")
                                    .eq(&Bool::from_bool(*b));
                                self.solvers.assert_soft(&constraint);
                                probes.push(Probe {
                                    constraint,
                                    key: None,
                                });
                            }
                            (Sort::Bv(_), Value::Bv(bits)) => {
                                let cell = applied.as_bv().expect("classified range is a bit-vector");
                                push_entry_probes(
                                    &mut probes,
                                    &self.solvers,
                                    self.cfg.strategy,
                                    &cell,
                                    bits,
                                );
                            }
                            _ => {}
                        }
                    }
                }
                _ => {}
            }
        }
        debug!(probes = probes.len(), "constraint stream built");
        probes
    }

    /// Probe every flip against the solver, collecting the surviving
    /// models Σ₁.
    fn run_probes(
        &mut self,
        probes: Vec<Probe>,
        epoch_set: &mut HashSet<Vec<u8>>,
    ) -> Result<(Vec<Model>, Option<StopReason>), SamplerError> {
        let mut sigma: Vec<Model> = Vec::new();
        let total = probes.len();
        let epoch_started = self.budget.elapsed();
        let mut calls: u32 = 0;
        for (index, probe) in probes.into_iter().enumerate() {
            match probe.key {
                Some(ProbeKey::Indicator { var, bit }) if self.unsat_ind.contains(&(var, bit)) => {
                    continue
                }
                Some(ProbeKey::Internal(i)) if self.unsat_internal.contains(&i) => continue,
                _ => {}
            }

            // adaptive throttling: the epoch may spend a third of the
            // total budget; past that, skip probes with probability
            // proportional to the projected overrun
            let elapsed = self.budget.elapsed();
            let spent = elapsed.saturating_sub(epoch_started);
            let projected = if calls == 0 {
                Duration::ZERO
            } else {
                spent / calls * (total - index) as u32
            };
            let slow_threshold = self.cfg.max_time / 3 + epoch_started;
            if slow_threshold > self.cfg.max_time && elapsed + projected > self.cfg.max_time {
                return Ok((sigma, Some(StopReason::Slow)));
            }
            let credit = slow_threshold.as_secs_f64() - elapsed.as_secs_f64();
            if projected.as_secs_f64() * self.rng.gen::<f64>() > credit {
                continue;
            }

            let outcome = {
                let _scope = self.solvers.scope();
                self.solvers.assert(&probe.constraint.not());
                timed_check(
                    &self.solvers,
                    &mut self.stats,
                    &self.budget,
                    self.cfg.max_samples,
                )
            };
            if !matches!(outcome, Checked::Stop(_)) {
                calls += 1;
            }
            match outcome {
                Checked::Stop(reason) => return Ok((sigma, Some(reason))),
                Checked::Sat(model) => {
                    let mutated = extract_model(&model, &self.classified)?;
                    let buf = encode(&mutated);
                    if epoch_set.insert(buf.clone()) {
                        match self.emit(&mutated, buf, 1)? {
                            Emitted::Stop(reason) => return Ok((sigma, Some(reason))),
                            Emitted::Valid => {
                                self.stats.flips += 1;
                                sigma.push(mutated);
                            }
                            Emitted::Invalid => {}
                        }
                    }
                }
                Checked::Unsat => match probe.key {
                    Some(ProbeKey::Indicator { var, bit }) => {
                        if self.unsat_ind.insert((var, bit)) {
                            self.stats.unsat_ind_bits += 1;
                        }
                    }
                    Some(ProbeKey::Internal(i)) => {
                        if self.unsat_internal.insert(i) {
                            self.stats.unsat_internal += 1;
                        }
                    }
                    None => {}
                },
                Checked::Unknown => {}
            }
        }
        debug!(mutations = sigma.len(), "mutation pass finished");
        Ok((sigma, None))
    }

    /// Combine the seed with pairs from Σₖ₋₁ × Σ₁ level by level,
    /// validating candidates by direct evaluation only.
    fn combine_pass(
        &mut self,
        seed: &Model,
        initial: Vec<Model>,
        epoch_set: &mut HashSet<Vec<u8>>,
    ) -> Result<Flow, SamplerError> {
        let mut sigma = initial.clone();
        for level in 2..=6u32 {
            let mut new_sigma: Vec<Model> = Vec::new();
            let mut candidates = 0u64;
            let mut valid = 0u64;
            for b in &sigma {
                for c in &initial {
                    let candidate = combine_model(seed, b, c);
                    let buffer = encode(&candidate);
                    if !epoch_set.insert(buffer.clone()) {
                        continue;
                    }
                    candidates += 1;
                    match self.emit(&candidate, buffer, level)? {
                        Emitted::Valid => {
                            valid += 1;
                            new_sigma.push(candidate);
                        }
                        Emitted::Invalid => {}
                        Emitted::Stop(reason) => return Ok(Flow::Stop(reason)),
                    }
                }
            }
            info!(level, valid, candidates, "combination level finished");
            if candidates == 0 || (valid as f64) < 0.1 * (candidates as f64) {
                break;
            }
            sigma = new_sigma;
        }
        Ok(Flow::Continue)
    }

    /// Validate one candidate and stream it out if it is new. At
    /// levels 0 and 1 the model came from the solver: evaluating to
    /// false there is a solver defect and fatal, while an indeterminate
    /// evaluation defers to the solver's word. Combination candidates
    /// are heuristic and just get discarded.
    fn emit(&mut self, model: &Model, buffer: Vec<u8>, level: u32) -> Result<Emitted, SamplerError> {
        if self.stats.valid_samples >= self.cfg.max_samples {
            return Ok(Emitted::Stop(StopReason::Samples));
        }
        if self.budget.exhausted() {
            return Ok(Emitted::Stop(StopReason::Timeout));
        }
        self.stats.samples += 1;
        let started = Instant::now();
        let verdict = eval::holds(&self.formula, &self.classified, model)?;
        self.stats.check_time += started.elapsed();
        match verdict {
            eval::Verdict::True => {}
            eval::Verdict::Unknown if level <= 1 => {}
            eval::Verdict::False if level <= 1 => {
                return Err(SamplerError::SolutionCheckFailure(level));
            }
            eval::Verdict::False | eval::Verdict::Unknown => {
                return Ok(Emitted::Invalid);
            }
        }
        self.stats.valid_samples += 1;
        if !self.all_mutations.contains(&buffer) {
            self.sink.write_sample(level, &self.decls, &buffer)?;
            self.all_mutations.insert(buffer);
            self.stats.unique_valid = self.all_mutations.len() as u64;
        }
        Ok(Emitted::Valid)
    }
}

fn push_entry_probes(
    probes: &mut Vec<Probe>,
    pair: &SolverPair,
    strategy: Strategy,
    cell: &BV,
    value: &BvValue,
) {
    for bit in 0..value.width() {
        let target = BV::from_u64(u64::from(value.bit(bit)), 1);
        let constraint = cell.extract(bit, bit).eq(&target);
        if strategy == Strategy::SmtBit {
            pair.assert_soft(&constraint);
        }
        probes.push(Probe {
            constraint,
            key: None,
        });
    }
    if strategy == Strategy::SmtBv {
        pair.assert_soft(&cell.eq(&bv_literal(value)));
    }
}

fn pin_equal(term: &Dynamic, value: &Dynamic) -> Option<Bool> {
    if let (Some(a), Some(b)) = (term.as_bool(), value.as_bool()) {
        return Some(a.eq(&b));
    }
    if let (Some(a), Some(b)) = (term.as_bv(), value.as_bv()) {
        return Some(a.eq(&b));
    }
    None
}

/// One budget-guarded solver call. Budgets are enforced between calls;
/// once a budget is exhausted no further call is made.
fn timed_check(
    pair: &SolverPair,
    stats: &mut Stats,
    budget: &Budget,
    max_samples: u64,
) -> Checked {
    if stats.valid_samples >= max_samples {
        return Checked::Stop(StopReason::Samples);
    }
    if budget.exhausted() {
        return Checked::Stop(StopReason::Timeout);
    }
    let started = Instant::now();
    let outcome = pair.check();
    stats.solver_calls += 1;
    stats.solver_time += started.elapsed();
    match outcome {
        CheckOutcome::Sat(model) => Checked::Sat(model),
        CheckOutcome::Unsat => Checked::Unsat,
        CheckOutcome::Unknown => Checked::Unknown,
    }
}
