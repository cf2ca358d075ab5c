//! Direct evaluation of φ against a candidate model, without a solver
//! call.
//!
//! The formula is rebuilt bottom-up: every indicator leaf is replaced
//! by its literal value, every application of an uninterpreted function
//! is resolved against the candidate's interpretation, and every
//! rebuilt node is reduced by the rewriter on the way up. A candidate
//! holds exactly when the root reduces to the `true` literal; a root
//! the rewriter cannot ground comes back as [`Verdict::Unknown`] and
//! the caller decides whether the solver's word stands in for it.

use std::collections::HashMap;

use galago_model::sorts::Sort;
use galago_model::value::{Model, Value};
use z3::ast::{Ast, Bool, Dynamic};
use z3::DeclKind;

use crate::ast::{array_literal, scalar_literal};
use crate::classify::Classified;
use crate::error::SamplerError;
use crate::extract::bv_value;

/// Three-way evaluation verdict. `Unknown` marks a rebuilt formula the
/// rewriter could not reduce to a Boolean literal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    True,
    False,
    Unknown,
}

/// Evaluate φ under a candidate model.
pub fn holds(
    formula: &Bool,
    classified: &Classified,
    model: &Model,
) -> Result<Verdict, SamplerError> {
    let by_name: HashMap<&str, usize> = classified
        .variables
        .iter()
        .enumerate()
        .map(|(pos, var)| (var.decl.name.as_str(), pos))
        .collect();
    let root: Dynamic = formula.clone().into();
    let rebuilt = rebuild(&root, classified, model, &by_name)?;
    Ok(match rebuilt.as_bool().and_then(|b| b.as_bool()) {
        Some(true) => Verdict::True,
        Some(false) => Verdict::False,
        None => Verdict::Unknown,
    })
}

/// Iterative post-order rebuild with memoisation over shared
/// sub-expressions.
fn rebuild(
    root: &Dynamic,
    classified: &Classified,
    model: &Model,
    by_name: &HashMap<&str, usize>,
) -> Result<Dynamic, SamplerError> {
    let mut done: HashMap<Dynamic, Dynamic> = HashMap::new();
    let mut stack: Vec<Dynamic> = vec![root.clone()];
    while let Some(node) = stack.last().cloned() {
        if done.contains_key(&node) {
            stack.pop();
            continue;
        }
        if !node.is_app() {
            return Err(SamplerError::InvalidInputFormula);
        }
        let children = node.children();
        let pending: Vec<Dynamic> = children
            .iter()
            .filter(|child| !done.contains_key(*child))
            .cloned()
            .collect();
        if !pending.is_empty() {
            stack.extend(pending);
            continue;
        }
        let rebuilt_children: Vec<Dynamic> = children
            .iter()
            .map(|child| done.get(child).cloned().expect("child rebuilt"))
            .collect();
        let rebuilt = rebuild_node(&node, &rebuilt_children, classified, model, by_name)?;
        done.insert(node.clone(), rebuilt);
        stack.pop();
    }
    done.remove(root).ok_or(SamplerError::InvalidInputFormula)
}

fn rebuild_node(
    node: &Dynamic,
    children: &[Dynamic],
    classified: &Classified,
    model: &Model,
    by_name: &HashMap<&str, usize>,
) -> Result<Dynamic, SamplerError> {
    let decl = node.decl();
    if decl.kind() == DeclKind::UNINTERPRETED {
        if let Some(&pos) = by_name.get(decl.name().as_str()) {
            let value = &model.values[pos];
            let sort = &classified.variables[pos].decl.sort;
            return if children.is_empty() {
                Ok(leaf_literal(value, sort))
            } else {
                Ok(apply_interp(&decl, value, children))
            };
        }
    }
    let refs: Vec<&dyn Ast> = children.iter().map(|child| child as &dyn Ast).collect();
    Ok(decl.apply(&refs).simplify())
}

fn leaf_literal(value: &Value, sort: &Sort) -> Dynamic {
    match (value, sort) {
        (Value::Array { default, entries }, Sort::Array { index, .. }) => {
            array_literal(*index, default, entries.iter()).into()
        }
        _ => scalar_literal(value),
    }
}

/// Resolve an application of an uninterpreted function against the
/// candidate's interpretation. Rebuilt argument terms are ground by
/// construction; an argument the rewriter could not reduce to a
/// numeral leaves the application in place, which the caller then
/// rejects.
fn apply_interp(decl: &z3::FuncDecl, value: &Value, children: &[Dynamic]) -> Dynamic {
    let args: Option<Vec<_>> = children.iter().map(bv_value).collect();
    if let (Some(args), Value::Func { .. }) = (args, value) {
        if let Some(out) = value.apply(&args) {
            return scalar_literal(out);
        }
    }
    let refs: Vec<&dyn Ast> = children.iter().map(|child| child as &dyn Ast).collect();
    decl.apply(&refs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::classify;
    use crate::extract::extract_model;
    use crate::loader::parse_smt2;
    use crate::solver::{CheckOutcome, SolverPair};
    use galago_model::value::BvValue;
    use std::time::Duration;

    fn fixture(text: &str) -> (Bool, Classified, Model) {
        let formula = parse_smt2(text).unwrap();
        let classified = classify(&formula).unwrap();
        let pair = SolverPair::new(&formula, Duration::from_secs(10), 7);
        let CheckOutcome::Sat(z3_model) = pair.check() else {
            panic!("fixture formula should be satisfiable");
        };
        let model = extract_model(&z3_model, &classified).unwrap();
        (formula, classified, model)
    }

    #[test]
    fn solver_models_evaluate_to_true() {
        let (formula, classified, model) = fixture(
            "(declare-const x (_ BitVec 8))\n\
             (declare-const b Bool)\n\
             (assert (and b (bvult x #x10) (bvugt x #x02)))",
        );
        assert_eq!(holds(&formula, &classified, &model).unwrap(), Verdict::True);
    }

    #[test]
    fn tampered_scalars_evaluate_to_false() {
        let (formula, classified, mut model) = fixture(
            "(declare-const x (_ BitVec 8))\n(assert (= x #x2a))",
        );
        assert_eq!(holds(&formula, &classified, &model).unwrap(), Verdict::True);
        model.values[0] = Value::Bv(BvValue::from_u64(8, 0x2b));
        assert_eq!(holds(&formula, &classified, &model).unwrap(), Verdict::False);
    }

    #[test]
    fn array_candidates_fold_through_select_chains() {
        let (formula, classified, model) = fixture(
            "(declare-const a (Array (_ BitVec 2) (_ BitVec 4)))\n\
             (assert (and (= (select a #b00) #xf) (= (select a #b01) #x1)))",
        );
        assert_eq!(holds(&formula, &classified, &model).unwrap(), Verdict::True);
    }

    #[test]
    fn tampered_array_cells_evaluate_to_false() {
        let (formula, classified, mut model) = fixture(
            "(declare-const a (Array (_ BitVec 2) (_ BitVec 4)))\n\
             (assert (= (select a #b00) #xf))",
        );
        let Value::Array { entries, .. } = &mut model.values[0] else {
            panic!("array expected");
        };
        entries.insert(BvValue::from_u64(2, 0), BvValue::from_u64(4, 0));
        assert_eq!(holds(&formula, &classified, &model).unwrap(), Verdict::False);
    }

    #[test]
    fn function_candidates_resolve_through_the_interpretation() {
        let (formula, classified, model) = fixture(
            "(declare-fun f ((_ BitVec 2)) (_ BitVec 2))\n\
             (assert (= (f #b00) #b01))",
        );
        assert_eq!(holds(&formula, &classified, &model).unwrap(), Verdict::True);
    }

    #[test]
    fn tampered_function_entries_evaluate_to_false() {
        let (formula, classified, mut model) = fixture(
            "(declare-fun f ((_ BitVec 2)) (_ BitVec 2))\n\
             (assert (= (f #b00) #b01))",
        );
        let pos = classified
            .variables
            .iter()
            .position(|v| v.decl.name == "f")
            .unwrap();
        model.values[pos] = Value::Func {
            default: Box::new(Value::Bv(BvValue::from_u64(2, 0))),
            entries: indexmap::IndexMap::new(),
        };
        assert_eq!(holds(&formula, &classified, &model).unwrap(), Verdict::False);
    }
}
