//! Input loading: formula files, the array-size map, and the optional
//! bit-blasting pipeline.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use tracing::info;
use z3::ast::Bool;
use z3::{Goal, Solver, Tactic};

use crate::error::SamplerError;

/// Array length metadata from the `-a` map file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArrayInfo {
    pub length: usize,
    pub is_input: bool,
}

/// Parse the array-size map: whitespace-separated
/// `<name> <length> <is_input:0|1>` rows. Unreferenced entries are
/// tolerated; short or malformed rows are skipped.
pub fn load_array_map(path: &Path) -> Result<HashMap<String, ArrayInfo>, SamplerError> {
    let text = fs::read_to_string(path)?;
    let mut map = HashMap::new();
    for line in text.lines() {
        let mut fields = line.split_whitespace();
        let (Some(name), Some(length), Some(is_input)) =
            (fields.next(), fields.next(), fields.next())
        else {
            continue;
        };
        let (Ok(length), Ok(is_input)) = (length.parse::<usize>(), is_input.parse::<u8>()) else {
            continue;
        };
        map.insert(
            name.to_string(),
            ArrayInfo {
                length,
                is_input: is_input != 0,
            },
        );
    }
    Ok(map)
}

/// Read and parse the input formula. `.cnf` and `.dimacs` files go
/// through the DIMACS clause reader; everything else through the
/// SMT-LIB parser.
pub fn load_formula(path: &Path) -> Result<Bool, SamplerError> {
    let text = fs::read_to_string(path)?;
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default();
    if extension.eq_ignore_ascii_case("cnf") || extension.eq_ignore_ascii_case("dimacs") {
        parse_dimacs(&text)
    } else {
        parse_smt2(&text)
    }
}

fn conjoin(clauses: &[Bool]) -> Option<Bool> {
    match clauses {
        [] => None,
        [one] => Some(one.clone()),
        many => {
            let refs: Vec<&Bool> = many.iter().collect();
            Some(Bool::and(&refs))
        }
    }
}

/// Parse SMT-LIB text into a single conjoined formula.
pub fn parse_smt2(text: &str) -> Result<Bool, SamplerError> {
    let solver = Solver::new();
    solver.from_string(text);
    conjoin(&solver.get_assertions()).ok_or(SamplerError::InvalidInputFormula)
}

/// Parse DIMACS clause lines into a formula over Boolean variables
/// named by their DIMACS index. `c` and `p` lines are ignored.
pub fn parse_dimacs(text: &str) -> Result<Bool, SamplerError> {
    let mut clauses: Vec<Bool> = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('c') || line.starts_with('p') {
            continue;
        }
        let mut literals: Vec<Bool> = Vec::new();
        for field in line.split_whitespace() {
            let Ok(v) = field.parse::<i64>() else {
                continue;
            };
            if v == 0 {
                break;
            }
            let var = Bool::new_const(v.unsigned_abs().to_string());
            literals.push(if v > 0 { var } else { var.not() });
        }
        if let Some(clause) = conjoin_or(&literals) {
            clauses.push(clause);
        }
    }
    conjoin(&clauses).ok_or(SamplerError::InvalidInputFormula)
}

fn conjoin_or(literals: &[Bool]) -> Option<Bool> {
    match literals {
        [] => None,
        [one] => Some(one.clone()),
        many => {
            let refs: Vec<&Bool> = many.iter().collect();
            Some(Bool::or(&refs))
        }
    }
}

/// Apply the `simplify · ackermannize_bv · bit-blast` pipeline and
/// return the converted goal as one formula over the blasted signature.
pub fn bit_blast(formula: &Bool) -> Result<Bool, SamplerError> {
    let goal = Goal::new(false, false, false);
    goal.assert(formula);
    let pipeline = Tactic::new("simplify")
        .and_then(&Tactic::new("ackermannize_bv"))
        .and_then(&Tactic::new("bit-blast"));
    let applied = pipeline
        .apply(&goal, None)
        .map_err(|_| SamplerError::UnableToSolve)?;
    let subgoal = applied
        .list_subgoals()
        .next()
        .ok_or(SamplerError::UnableToSolve)?;
    let formulas = subgoal.get_formulas::<Bool>();
    info!(clauses = formulas.len(), "bit-blasted goal");
    Ok(conjoin(&formulas).unwrap_or_else(|| Bool::from_bool(true)))
}
