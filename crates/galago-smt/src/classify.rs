//! The start-up walk over φ: discovery and classification of declared
//! symbols, the internal sub-expression set, and the select indices
//! each array variable is read at.

use std::collections::{HashMap, HashSet};

use galago_model::sorts::{Declaration, Sort};
use tracing::{debug, info};
use z3::ast::{Ast, Bool, Dynamic};
use z3::{DeclKind, FuncDecl};

use crate::error::SamplerError;

/// A classified sampling variable: its declaration plus the Z3 handle
/// needed to constrain and evaluate it.
#[derive(Debug, Clone)]
pub struct Variable {
    pub decl: Declaration,
    pub shape: VarShape,
}

#[derive(Debug, Clone)]
pub enum VarShape {
    /// 0-ary constant (Bool, bit-vector, or array), with its occurrence
    /// term.
    Const(Dynamic),
    /// Uninterpreted function of arity > 0.
    Func(FuncDecl),
}

/// Node and declaration counts from the walk, reported once at start-up.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WalkCounts {
    pub nodes: usize,
    pub internal: usize,
    pub arrays: usize,
    pub bit_vectors: usize,
    pub bools: usize,
    pub bits: u64,
    pub functions: usize,
}

/// Result of the start-up walk.
#[derive(Debug, Clone)]
pub struct Classified {
    pub variables: Vec<Variable>,
    /// Every Bool/BV sub-expression, in visit order. Only consulted
    /// when internal flipping is enabled.
    pub internal: Vec<Dynamic>,
    /// Index terms φ selects each array variable at, keyed by variable
    /// position. Used when an array interpretation has to be probed
    /// cell-wise.
    pub select_indices: HashMap<usize, Vec<Dynamic>>,
    pub counts: WalkCounts,
}

impl Classified {
    pub fn declarations(&self) -> Vec<Declaration> {
        self.variables.iter().map(|v| v.decl.clone()).collect()
    }

    /// Record extra cell indices worth probing for a named array
    /// variable (the array map's cells).
    pub fn note_array_indices(&mut self, name: &str, indices: impl IntoIterator<Item = Dynamic>) {
        if let Some(pos) = self.variables.iter().position(|v| v.decl.name == name) {
            self.select_indices.entry(pos).or_default().extend(indices);
        }
    }
}

/// True when a discovered name is user-meaningful rather than
/// solver-synthesised (bit-blasting introduces `k!<n>` and numeric
/// symbols).
pub fn user_meaningful(name: &str) -> bool {
    !name.starts_with("k!") && !name.chars().all(|c| c.is_ascii_digit())
}

fn sort_of(node: &Dynamic) -> Result<Sort, SamplerError> {
    let text = node.get_sort().to_string();
    Sort::parse_smt2(&text).ok_or(SamplerError::InvalidSort(text))
}

fn bv_width_of(node: &Dynamic) -> Result<u32, SamplerError> {
    match sort_of(node)? {
        Sort::Bv(width) => Ok(width),
        other => Err(SamplerError::InvalidSort(other.to_string())),
    }
}

/// Walk φ once, depth-first and deduplicated, visiting sub-expressions
/// in deterministic left-to-right order.
pub fn classify(formula: &Bool) -> Result<Classified, SamplerError> {
    let root: Dynamic = formula.clone().into();
    let mut visited: HashSet<Dynamic> = HashSet::new();
    let mut stack = vec![root];
    // builtin tokens that are never user declarations
    let mut names: HashSet<String> = ["bv", "true", "false"]
        .into_iter()
        .map(String::from)
        .collect();
    let mut variables: Vec<Variable> = Vec::new();
    let mut internal: Vec<Dynamic> = Vec::new();
    let mut selects: Vec<(String, Dynamic)> = Vec::new();
    let mut counts = WalkCounts::default();

    while let Some(node) = stack.pop() {
        if !visited.insert(node.clone()) {
            continue;
        }
        if !node.is_app() {
            return Err(SamplerError::InvalidInputFormula);
        }
        counts.nodes += 1;
        let decl = node.decl();
        let kind = decl.kind();
        let children = node.children();

        if kind == DeclKind::UNINTERPRETED {
            let name = decl.name();
            if children.is_empty() {
                if names.insert(name.clone()) {
                    let sort = sort_of(&node)?;
                    match &sort {
                        Sort::Bool => {
                            counts.bools += 1;
                            counts.bits += 1;
                        }
                        Sort::Bv(width) => {
                            counts.bit_vectors += 1;
                            counts.bits += u64::from(*width);
                        }
                        Sort::Array { .. } => counts.arrays += 1,
                        Sort::Func { .. } => {}
                    }
                    debug!(%name, %sort, "declaration");
                    variables.push(Variable {
                        decl: Declaration::new(name, sort),
                        shape: VarShape::Const(node.clone()),
                    });
                }
            } else if names.insert(name.clone()) {
                let domain = children
                    .iter()
                    .map(bv_width_of)
                    .collect::<Result<Vec<u32>, _>>()?;
                let range = match sort_of(&node)? {
                    sort @ (Sort::Bool | Sort::Bv(_)) => sort,
                    other => return Err(SamplerError::InvalidSort(other.to_string())),
                };
                counts.functions += 1;
                debug!(%name, arity = domain.len(), "function declaration");
                variables.push(Variable {
                    decl: Declaration::new(
                        name,
                        Sort::Func {
                            domain,
                            range: Box::new(range),
                        },
                    ),
                    shape: VarShape::Func(decl),
                });
            }
        }

        if kind == DeclKind::SELECT && children.len() == 2 {
            let array = &children[0];
            if array.is_app() && array.decl().kind() == DeclKind::UNINTERPRETED {
                selects.push((array.decl().name(), children[1].clone()));
            }
        }

        if matches!(sort_of(&node), Ok(Sort::Bool | Sort::Bv(_))) {
            counts.internal += 1;
            internal.push(node.clone());
        }

        for child in children.into_iter().rev() {
            stack.push(child);
        }
    }

    let position: HashMap<&str, usize> = variables
        .iter()
        .enumerate()
        .map(|(i, v)| (v.decl.name.as_str(), i))
        .collect();
    let mut select_indices: HashMap<usize, Vec<Dynamic>> = HashMap::new();
    for (name, index) in selects {
        if let Some(&pos) = position.get(name.as_str()) {
            select_indices.entry(pos).or_default().push(index);
        }
    }

    info!(
        nodes = counts.nodes,
        internal = counts.internal,
        arrays = counts.arrays,
        bit_vectors = counts.bit_vectors,
        bools = counts.bools,
        bits = counts.bits,
        functions = counts.functions,
        "classified formula"
    );

    Ok(Classified {
        variables,
        internal,
        select_indices,
        counts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader;

    fn classify_text(text: &str) -> Classified {
        let formula = loader::parse_smt2(text).unwrap();
        classify(&formula).unwrap()
    }

    #[test]
    fn discovers_scalars_in_deterministic_order() {
        let classified = classify_text(
            "(declare-const x (_ BitVec 4))\n\
             (declare-const b Bool)\n\
             (assert (and b (bvult x #x9)))",
        );
        let names: Vec<&str> = classified
            .variables
            .iter()
            .map(|v| v.decl.name.as_str())
            .collect();
        assert_eq!(names, vec!["b", "x"]);
        assert_eq!(classified.counts.bools, 1);
        assert_eq!(classified.counts.bit_vectors, 1);
        assert_eq!(classified.counts.bits, 5);
    }

    #[test]
    fn discovers_arrays_and_their_select_indices() {
        let classified = classify_text(
            "(declare-const a (Array (_ BitVec 2) (_ BitVec 4)))\n\
             (assert (= (select a #b01) #xf))",
        );
        assert_eq!(classified.counts.arrays, 1);
        let sort = &classified.variables[0].decl.sort;
        assert_eq!(sort, &Sort::Array { index: 2, elem: 4 });
        assert_eq!(classified.select_indices.get(&0).map(Vec::len), Some(1));
    }

    #[test]
    fn discovers_uninterpreted_functions() {
        let classified = classify_text(
            "(declare-fun f ((_ BitVec 2)) (_ BitVec 2))\n\
             (assert (= (f #b00) #b01))",
        );
        assert_eq!(classified.counts.functions, 1);
        assert_eq!(
            classified.variables[0].decl.sort,
            Sort::Func {
                domain: vec![2],
                range: Box::new(Sort::Bv(2)),
            }
        );
    }

    #[test]
    fn rejects_unsupported_sorts() {
        let formula = loader::parse_smt2(
            "(declare-const n Int)\n(assert (= n 3))",
        )
        .unwrap();
        assert!(matches!(
            classify(&formula),
            Err(SamplerError::InvalidSort(_))
        ));
    }

    #[test]
    fn synthetic_names_are_filtered() {
        assert!(user_meaningful("x"));
        assert!(user_meaningful("k0"));
        assert!(!user_meaningful("k!12"));
        assert!(!user_meaningful("42"));
    }
}
