//! Extraction of canonical models from solver models.

use std::collections::HashSet;

use galago_model::sorts::Sort;
use galago_model::value::{BvValue, Model, Value};
use indexmap::IndexMap;
use num_bigint::BigUint;
use z3::ast::{Ast, Dynamic};
use z3::{DeclKind, FuncDecl, Model as Z3Model};

use crate::ast::bv_literal;
use crate::classify::{Classified, VarShape, Variable};
use crate::error::SamplerError;

/// Read the canonical value of every discovered variable out of a
/// solver model, in declaration order.
pub fn extract_model(model: &Z3Model, classified: &Classified) -> Result<Model, SamplerError> {
    let mut values = Vec::with_capacity(classified.variables.len());
    for (pos, var) in classified.variables.iter().enumerate() {
        values.push(extract_value(model, classified, pos, var)?);
    }
    Ok(Model::new(values))
}

fn extract_value(
    model: &Z3Model,
    classified: &Classified,
    pos: usize,
    var: &Variable,
) -> Result<Value, SamplerError> {
    match (&var.decl.sort, &var.shape) {
        (Sort::Bool, VarShape::Const(term)) => {
            let value = model
                .eval::<Dynamic>(term, true)
                .and_then(|d| d.as_bool())
                .and_then(|b| b.as_bool())
                .unwrap_or(false);
            Ok(Value::Bool(value))
        }
        (Sort::Bv(width), VarShape::Const(term)) => {
            let value = model
                .eval::<Dynamic>(term, true)
                .as_ref()
                .and_then(bv_value)
                .unwrap_or_else(|| BvValue::zero(*width));
            Ok(Value::Bv(value))
        }
        (Sort::Array { index, elem }, VarShape::Const(term)) => {
            extract_array(model, classified, pos, term, *index, *elem)
        }
        (Sort::Func { domain, range }, VarShape::Func(decl)) => {
            extract_func(model, decl, domain, range)
        }
        _ => Err(SamplerError::InvalidSort(var.decl.name.clone())),
    }
}

/// Parse a ground bit-vector term into its canonical value. Values
/// beyond 64 bits come back through the numeral rendering.
pub(crate) fn bv_value(term: &Dynamic) -> Option<BvValue> {
    let bv = term.as_bv()?;
    let width = bv.get_size();
    if let Some(value) = bv.as_u64() {
        return Some(BvValue::from_u64(width, value));
    }
    let text = bv.to_string();
    if let Some(hex) = text.strip_prefix("#x") {
        BigUint::parse_bytes(hex.as_bytes(), 16).map(|bits| BvValue::new(width, bits))
    } else if let Some(bin) = text.strip_prefix("#b") {
        BigUint::parse_bytes(bin.as_bytes(), 2).map(|bits| BvValue::new(width, bits))
    } else {
        None
    }
}

fn scalar_value(term: &Dynamic, range: &Sort) -> Option<Value> {
    match range {
        Sort::Bool => term
            .as_bool()
            .and_then(|b| b.as_bool())
            .map(Value::Bool),
        Sort::Bv(width) => bv_value(term).filter(|v| v.width() == *width).map(Value::Bv),
        Sort::Array { .. } | Sort::Func { .. } => None,
    }
}

/// Extract an array interpretation. The evaluated array value is
/// usually a store chain over a constant array; when the solver hands
/// back some other shape, the cells the formula and the array map can
/// reach are probed one select at a time.
fn extract_array(
    model: &Z3Model,
    classified: &Classified,
    pos: usize,
    term: &Dynamic,
    index_width: u32,
    elem_width: u32,
) -> Result<Value, SamplerError> {
    let interp = match model.eval::<Dynamic>(term, true) {
        Some(interp) => interp,
        None => {
            return Ok(Value::Array {
                default: BvValue::zero(elem_width),
                entries: IndexMap::new(),
            })
        }
    };
    if let Some(value) = store_chain(&interp) {
        return Ok(value);
    }
    probe_cells(model, classified, pos, term, index_width, elem_width)
}

/// Walk a `(store (store ... (const default) ...) arg val)` chain.
/// Duplicate keys are dropped from the outermost write inward; the kept
/// entries are then reversed so the deepest write is emitted first.
fn store_chain(interp: &Dynamic) -> Option<Value> {
    let mut node = interp.clone();
    let mut seen: HashSet<BvValue> = HashSet::new();
    let mut entries: Vec<(BvValue, BvValue)> = Vec::new();
    loop {
        if !node.is_app() {
            return None;
        }
        match node.decl().kind() {
            DeclKind::STORE => {
                let children = node.children();
                if children.len() != 3 {
                    return None;
                }
                let arg = bv_value(&children[1])?;
                let val = bv_value(&children[2])?;
                if seen.insert(arg.clone()) {
                    entries.push((arg, val));
                }
                node = children[0].clone();
            }
            DeclKind::CONST_ARRAY => {
                let default = bv_value(node.children().first()?)?;
                entries.reverse();
                return Some(Value::Array {
                    default,
                    entries: entries.into_iter().collect(),
                });
            }
            _ => return None,
        }
    }
}

fn probe_cells(
    model: &Z3Model,
    classified: &Classified,
    pos: usize,
    term: &Dynamic,
    index_width: u32,
    elem_width: u32,
) -> Result<Value, SamplerError> {
    let array = term
        .as_array()
        .ok_or_else(|| SamplerError::InvalidSort("array variable expected".into()))?;
    let mut entries: IndexMap<BvValue, BvValue> = IndexMap::new();
    for index_term in classified.select_indices.get(&pos).into_iter().flatten() {
        let Some(index) = model
            .eval::<Dynamic>(index_term, true)
            .as_ref()
            .and_then(bv_value)
        else {
            continue;
        };
        if entries.contains_key(&index) {
            continue;
        }
        let cell = model
            .eval::<Dynamic>(&array.select(&bv_literal(&index)), true)
            .as_ref()
            .and_then(bv_value)
            .unwrap_or_else(|| BvValue::zero(elem_width));
        entries.insert(index, cell);
    }
    // read the default off the first untouched cell, if the domain has one
    let mut default = BvValue::zero(elem_width);
    if index_width >= 64 || (entries.len() as u64) < (1u64 << index_width) {
        let mut candidate = 0u64;
        while entries.contains_key(&BvValue::from_u64(index_width, candidate)) {
            candidate += 1;
        }
        let index = BvValue::from_u64(index_width, candidate);
        if let Some(cell) = model
            .eval::<Dynamic>(&array.select(&bv_literal(&index)), true)
            .as_ref()
            .and_then(bv_value)
        {
            default = cell;
        }
    }
    Ok(Value::Array { default, entries })
}

/// Extract a function interpretation; a function the model leaves
/// uninterpreted encodes as a zero default with no entries.
fn extract_func(
    model: &Z3Model,
    decl: &FuncDecl,
    domain: &[u32],
    range: &Sort,
) -> Result<Value, SamplerError> {
    let Some(interp) = model.get_func_interp(decl) else {
        return Ok(Value::Func {
            default: Box::new(Value::zero_of(range)),
            entries: IndexMap::new(),
        });
    };
    let default = scalar_value(&interp.get_else(), range).unwrap_or_else(|| Value::zero_of(range));
    let mut entries: IndexMap<Vec<BvValue>, Value> = IndexMap::new();
    for entry in interp.get_entries() {
        let args: Option<Vec<BvValue>> = entry.get_args().iter().map(bv_value).collect();
        let Some(args) = args else {
            continue;
        };
        if args.len() != domain.len() {
            continue;
        }
        let Some(value) = scalar_value(&entry.get_value(), range) else {
            continue;
        };
        entries.insert(args, value);
    }
    Ok(Value::Func {
        default: Box::new(default),
        entries,
    })
}
