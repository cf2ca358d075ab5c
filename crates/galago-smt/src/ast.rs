//! Construction of Z3 terms from canonical values.

use galago_model::value::{BvValue, Value};
use z3::ast::{Array, Bool, Dynamic, BV};
use z3::Sort as Z3Sort;

/// Build a bit-vector literal of arbitrary width, assembling 64-bit
/// limbs for widths the `u64` constructor cannot reach.
pub fn bv_literal(value: &BvValue) -> BV {
    let width = value.width();
    if width <= 64 {
        let low = value.bits().iter_u64_digits().next().unwrap_or(0);
        return BV::from_u64(low, width);
    }
    let limb_count = ((width + 63) / 64) as usize;
    let mut limbs: Vec<u64> = value.bits().iter_u64_digits().collect();
    limbs.resize(limb_count, 0);
    let top_width = width - 64 * (limb_count as u32 - 1);
    let mut rest = limbs.iter().rev();
    let top = *rest.next().expect("width > 64 has at least two limbs");
    let mut out = BV::from_u64(top, top_width);
    for &limb in rest {
        out = out.concat(&BV::from_u64(limb, 64));
    }
    out
}

/// Scalar canonical value to its literal term.
pub fn scalar_literal(value: &Value) -> Dynamic {
    match value {
        Value::Bool(b) => Bool::from_bool(*b).into(),
        Value::Bv(v) => bv_literal(v).into(),
        Value::Array { .. } | Value::Func { .. } => {
            unreachable!("scalar literal requested for an interpretation value")
        }
    }
}

/// An array interpretation as a store chain over a constant array.
/// Entry keys are unique, so the store order does not matter.
pub fn array_literal<'a>(
    index_width: u32,
    default: &BvValue,
    entries: impl IntoIterator<Item = (&'a BvValue, &'a BvValue)>,
) -> Array {
    let domain = Z3Sort::bitvector(index_width);
    let mut array = Array::const_array(&domain, &bv_literal(default));
    for (arg, val) in entries {
        array = array.store(&bv_literal(arg), &bv_literal(val));
    }
    array
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_bigint::BigUint;
    use z3::ast::Ast;

    #[test]
    fn small_literals_render_as_numerals() {
        let v = BvValue::from_u64(8, 0xa5);
        let ast = bv_literal(&v);
        assert_eq!(ast.get_size(), 8);
        assert_eq!(ast.as_u64(), Some(0xa5));
    }

    #[test]
    fn wide_literals_keep_their_width_and_value() {
        let bits = (BigUint::from(0xdead_beefu32) << 80u32) + 0x1234u32;
        let v = BvValue::new(100, bits.clone());
        let ast = bv_literal(&v).simplify();
        assert_eq!(ast.get_size(), 100);
        // the low limb survives the concat assembly
        assert_eq!(ast.extract(63, 0).simplify().as_u64(), Some(0x1234));
        assert_eq!(
            ast.extract(99, 80).simplify().as_u64(),
            Some((0xdead_beefu64) & 0xf_ffff)
        );
    }
}
