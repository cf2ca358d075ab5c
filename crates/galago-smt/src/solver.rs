//! The paired MaxSMT/plain solver with scoped push/pop.
//!
//! The optimizer carries the soft-constraint objective used for
//! seeding and for keeping mutations local; the plain solver mirrors
//! every hard assertion and serves as the fallback when MaxSMT cannot
//! decide within its timeout.

use std::time::Duration;

use tracing::debug;
use z3::ast::Bool;
use z3::{Model, Optimize, Params, SatResult, Solver};

/// Outcome of one satisfiability call.
#[derive(Debug)]
pub enum CheckOutcome {
    Sat(Model),
    Unsat,
    Unknown,
}

pub struct SolverPair {
    opt: Optimize,
    solver: Solver,
}

impl SolverPair {
    /// Load φ into both solvers. The solver-internal timeout and random
    /// seed are fixed here so each call is bounded and reproducible.
    pub fn new(formula: &Bool, timeout: Duration, random_seed: u32) -> Self {
        let opt = Optimize::new();
        let solver = Solver::new();
        let mut params = Params::new();
        let millis = timeout.as_millis().min(u128::from(u32::MAX)) as u32;
        params.set_u32("timeout", millis);
        params.set_u32("random_seed", random_seed);
        solver.set_params(&params);
        opt.assert(formula);
        solver.assert(formula);
        Self { opt, solver }
    }

    /// Assert a hard constraint on both solvers.
    pub fn assert(&self, constraint: &Bool) {
        self.opt.assert(constraint);
        self.solver.assert(constraint);
    }

    /// Assert a unit-weight soft constraint on the optimizer.
    pub fn assert_soft(&self, constraint: &Bool) {
        self.opt.assert_soft(constraint, 1u64, None);
    }

    pub fn push(&self) {
        self.opt.push();
        self.solver.push();
    }

    pub fn pop(&self) {
        self.opt.pop();
        self.solver.pop(1);
    }

    /// Open a scope that pops itself when dropped.
    pub fn scope(&self) -> Scope<'_> {
        self.push();
        Scope { pair: self }
    }

    /// MaxSMT check, falling back to the plain solver at the same scope
    /// when the optimizer cannot decide.
    pub fn check(&self) -> CheckOutcome {
        match self.opt.check(&[]) {
            SatResult::Sat => match self.opt.get_model() {
                Some(model) => CheckOutcome::Sat(model),
                None => CheckOutcome::Unknown,
            },
            SatResult::Unsat => CheckOutcome::Unsat,
            SatResult::Unknown => {
                debug!("MaxSMT could not decide, falling back to plain check");
                match self.solver.check() {
                    SatResult::Sat => match self.solver.get_model() {
                        Some(model) => CheckOutcome::Sat(model),
                        None => CheckOutcome::Unknown,
                    },
                    SatResult::Unsat => CheckOutcome::Unsat,
                    SatResult::Unknown => CheckOutcome::Unknown,
                }
            }
        }
    }
}

/// Scope guard over a [`SolverPair`]; the matching pop runs on drop, on
/// every exit path.
pub struct Scope<'a> {
    pair: &'a SolverPair,
}

impl Drop for Scope<'_> {
    fn drop(&mut self) {
        self.pair.pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::parse_smt2;

    fn pair(text: &str) -> SolverPair {
        let formula = parse_smt2(text).unwrap();
        SolverPair::new(&formula, Duration::from_secs(10), 7)
    }

    #[test]
    fn sat_formula_yields_a_model() {
        let pair = pair("(declare-const x (_ BitVec 4))\n(assert (bvult x #x4))");
        assert!(matches!(pair.check(), CheckOutcome::Sat(_)));
    }

    #[test]
    fn unsat_formula_reports_unsat() {
        let pair = pair("(declare-const a Bool)\n(assert (and a (not a)))");
        assert!(matches!(pair.check(), CheckOutcome::Unsat));
    }

    #[test]
    fn scopes_restore_satisfiability() {
        let formula = parse_smt2("(declare-const a Bool)\n(assert a)").unwrap();
        let pair = SolverPair::new(&formula, Duration::from_secs(10), 7);
        {
            let _scope = pair.scope();
            let contradiction = parse_smt2("(declare-const a Bool)\n(assert (not a))").unwrap();
            pair.assert(&contradiction);
            assert!(matches!(pair.check(), CheckOutcome::Unsat));
        }
        assert!(matches!(pair.check(), CheckOutcome::Sat(_)));
    }

    #[test]
    fn soft_constraints_steer_the_model() {
        let formula = parse_smt2("(declare-const x (_ BitVec 4))\n(assert (bvult x #x8))").unwrap();
        let pair = SolverPair::new(&formula, Duration::from_secs(10), 7);
        let five = parse_smt2("(declare-const x (_ BitVec 4))\n(assert (= x #x5))").unwrap();
        pair.assert_soft(&five);
        match pair.check() {
            CheckOutcome::Sat(model) => {
                let x = z3::ast::BV::new_const("x", 4);
                let value = model.eval::<z3::ast::BV>(&x, true).unwrap();
                assert_eq!(value.as_u64(), Some(5));
            }
            other => panic!("expected sat, got {other:?}"),
        }
    }
}
