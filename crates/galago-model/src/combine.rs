//! The bitwise majority-vs-seed combination law.
//!
//! Given the seed value `a` and two mutated parents `b` and `c`, the
//! candidate is `a ^ ((a ^ b) | (a ^ c))` per bit: a seed bit flips
//! exactly when both parents flipped it in the same direction. The law
//! runs on fixed-width integers; hex only appears at the codec
//! boundary.

use indexmap::IndexMap;

use crate::value::{BvValue, Model, Value};

pub fn combine_bv(a: &BvValue, b: &BvValue, c: &BvValue) -> BvValue {
    debug_assert_eq!(a.width(), b.width());
    debug_assert_eq!(a.width(), c.width());
    let ab = a.bits() ^ b.bits();
    let ac = a.bits() ^ c.bits();
    BvValue::new(a.width(), a.bits() ^ (ab | ac))
}

pub fn combine_value(a: &Value, b: &Value, c: &Value) -> Value {
    match (a, b, c) {
        (Value::Bool(a), Value::Bool(b), Value::Bool(c)) => {
            Value::Bool(a ^ ((a ^ b) | (a ^ c)))
        }
        (Value::Bv(a), Value::Bv(b), Value::Bv(c)) => Value::Bv(combine_bv(a, b, c)),
        (
            Value::Array {
                default: da,
                entries: ea,
            },
            Value::Array {
                default: db,
                entries: eb,
            },
            Value::Array {
                default: dc,
                entries: ec,
            },
        ) => {
            let mut entries = IndexMap::new();
            for key in ea.keys().chain(eb.keys()).chain(ec.keys()) {
                if entries.contains_key(key) {
                    continue;
                }
                // a parent without this key contributes its default
                let va = ea.get(key).unwrap_or(da);
                let vb = eb.get(key).unwrap_or(db);
                let vc = ec.get(key).unwrap_or(dc);
                entries.insert(key.clone(), combine_bv(va, vb, vc));
            }
            Value::Array {
                default: combine_bv(da, db, dc),
                entries,
            }
        }
        (
            Value::Func {
                default: da,
                entries: ea,
            },
            Value::Func {
                default: db,
                entries: eb,
            },
            Value::Func {
                default: dc,
                entries: ec,
            },
        ) => {
            let (da, db, dc) = (da.as_ref(), db.as_ref(), dc.as_ref());
            let mut entries = IndexMap::new();
            for key in ea.keys().chain(eb.keys()).chain(ec.keys()) {
                if entries.contains_key(key) {
                    continue;
                }
                let va = ea.get(key).unwrap_or(da);
                let vb = eb.get(key).unwrap_or(db);
                let vc = ec.get(key).unwrap_or(dc);
                entries.insert(key.clone(), combine_value(va, vb, vc));
            }
            Value::Func {
                default: Box::new(combine_value(da, db, dc)),
                entries,
            }
        }
        _ => unreachable!("combined values share the declaration list"),
    }
}

/// Combine three models over the same declaration list, value-wise in
/// lockstep.
pub fn combine_model(a: &Model, b: &Model, c: &Model) -> Model {
    debug_assert_eq!(a.values.len(), b.values.len());
    debug_assert_eq!(a.values.len(), c.values.len());
    let values = a
        .values
        .iter()
        .zip(&b.values)
        .zip(&c.values)
        .map(|((a, b), c)| combine_value(a, b, c))
        .collect();
    Model::new(values)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bv(value: u64) -> BvValue {
        BvValue::from_u64(8, value)
    }

    #[test]
    fn law_on_nybbles() {
        // per-bit: keep a unless b and c both flipped it
        let a = bv(0b1010_0101);
        let b = bv(0b1010_0110);
        let c = bv(0b1010_0011);
        let r = combine_bv(&a, &b, &c);
        // bit 0: a = c, take b; bit 1: both parents flipped, flip; bit 2: a = b, take c
        assert_eq!(r, bv(0b1010_0010));
    }

    #[test]
    fn tie_cases() {
        let a = bv(0x3c);
        let b = bv(0xa5);
        let c = bv(0x5a);
        assert_eq!(combine_bv(&a, &a, &c), c);
        assert_eq!(combine_bv(&a, &b, &a), b);
        assert_eq!(combine_bv(&a, &b, &b), b);
    }

    #[test]
    fn bool_reduction() {
        for a in [false, true] {
            for b in [false, true] {
                for c in [false, true] {
                    let got = combine_value(&Value::Bool(a), &Value::Bool(b), &Value::Bool(c));
                    let want = if a == c {
                        b
                    } else if a == b {
                        c
                    } else {
                        a
                    };
                    assert_eq!(got, Value::Bool(want));
                }
            }
        }
    }

    #[test]
    fn array_union_takes_parent_defaults_for_missing_keys() {
        let a = Value::Array {
            default: bv(0),
            entries: [(BvValue::from_u64(2, 0), bv(1))].into_iter().collect(),
        };
        let b = Value::Array {
            default: bv(0),
            entries: [(BvValue::from_u64(2, 1), bv(2))].into_iter().collect(),
        };
        let c = Value::Array {
            default: bv(0),
            entries: [(BvValue::from_u64(2, 1), bv(2))].into_iter().collect(),
        };
        let combined = combine_value(&a, &b, &c);
        // key 0: only in a, b and c agree on default 0 -> both flipped -> 0
        assert_eq!(combined.select(&BvValue::from_u64(2, 0)), Some(&bv(0)));
        // key 1: b and c agree on 2, a has default 0 -> 2
        assert_eq!(combined.select(&BvValue::from_u64(2, 1)), Some(&bv(2)));
    }

    #[test]
    fn union_order_is_seed_then_parents() {
        let entries = |keys: &[u64]| {
            keys.iter()
                .map(|&k| (BvValue::from_u64(4, k), bv(k)))
                .collect::<IndexMap<_, _>>()
        };
        let a = Value::Array {
            default: bv(0),
            entries: entries(&[3]),
        };
        let b = Value::Array {
            default: bv(0),
            entries: entries(&[1]),
        };
        let c = Value::Array {
            default: bv(0),
            entries: entries(&[2]),
        };
        let Value::Array { entries, .. } = combine_value(&a, &b, &c) else {
            panic!("array expected");
        };
        let order: Vec<u64> = entries.keys().map(|k| k.as_u64().unwrap()).collect();
        assert_eq!(order, vec![3, 1, 2]);
    }
}
