//! The per-epoch MaxSMT seed objective: random soft constraints that
//! push the solver towards a fresh region of the model space.

use std::collections::HashMap;

use galago_model::sorts::Sort;
use galago_model::value::BvValue;
use galago_smt::ast::bv_literal;
use galago_smt::classify::{Classified, VarShape};
use galago_smt::loader::ArrayInfo;
use galago_smt::solver::SolverPair;
use num_bigint::BigUint;
use rand::rngs::StdRng;
use rand::{Rng, RngCore};
use z3::ast::{Ast, BV};

pub(crate) fn random_bv(rng: &mut StdRng, width: u32) -> BvValue {
    let mut bytes = vec![0u8; ((width as usize) + 7) / 8];
    rng.fill_bytes(&mut bytes);
    BvValue::new(width, BigUint::from_bytes_le(&bytes))
}

/// Assert the epoch's random soft objective at the current scope.
///
/// Booleans get a random polarity; scalar bit-vectors get one random
/// target per bit (always per-bit here, whatever the strategy: the
/// strategy only shapes the mutation pass's soft bank); mapped input
/// arrays get per-cell random targets, optionally thinned by the
/// selection ratio; functions get nothing, their diversity comes from
/// mutation and combination.
pub(crate) fn assert_objective(
    pair: &SolverPair,
    classified: &Classified,
    indicators: &[usize],
    array_map: &HashMap<String, ArrayInfo>,
    soft_array_ratio: u32,
    rng: &mut StdRng,
) {
    for &pos in indicators {
        let var = &classified.variables[pos];
        match (&var.decl.sort, &var.shape) {
            (Sort::Bool, VarShape::Const(term)) => {
                let v = term.as_bool().expect("classified as Bool");
                if rng.gen::<bool>() {
                    pair.assert_soft(&v);
                } else {
                    pair.assert_soft(&v.not());
                }
            }
            (Sort::Bv(width), VarShape::Const(term)) => {
                let v = term.as_bv().expect("classified as a bit-vector");
                for bit in 0..*width {
                    let target = BV::from_u64(u64::from(rng.gen::<bool>()), 1);
                    pair.assert_soft(&v.extract(bit, bit).eq(&target));
                }
            }
            (Sort::Array { index, elem }, VarShape::Const(term)) => {
                let Some(info) = array_map.get(&var.decl.name) else {
                    continue;
                };
                if !info.is_input {
                    continue;
                }
                let array = term.as_array().expect("classified as an array");
                let mut selection = 0u32;
                for cell in 0..info.length {
                    if soft_array_ratio == 0 || soft_array_ratio > selection % 100 {
                        let cell_index = bv_literal(&BvValue::from_u64(*index, cell as u64));
                        let target = bv_literal(&random_bv(rng, *elem));
                        let selected = array.select(&cell_index);
                        let cell_value = selected.as_bv().expect("array over bit-vectors");
                        pair.assert_soft(&cell_value.eq(&target));
                    }
                    selection += 1;
                }
            }
            (Sort::Func { .. }, _) => {}
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn random_bv_is_masked_and_deterministic() {
        let mut a = StdRng::seed_from_u64(9);
        let mut b = StdRng::seed_from_u64(9);
        for width in [1u32, 5, 8, 64, 100] {
            let va = random_bv(&mut a, width);
            let vb = random_bv(&mut b, width);
            assert_eq!(va, vb);
            assert!(va.bits().bits() <= u64::from(width));
        }
    }
}
