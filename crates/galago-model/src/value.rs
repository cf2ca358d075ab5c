use indexmap::IndexMap;
use num_bigint::BigUint;
use num_traits::Zero;

use crate::error::ModelError;
use crate::sorts::Sort;

/// A fixed-width bit-vector constant. The value is always masked to its
/// width, so two equal values render to identical hex tokens.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BvValue {
    width: u32,
    bits: BigUint,
}

impl BvValue {
    pub fn new(width: u32, bits: BigUint) -> Self {
        Self {
            width,
            bits: bits & mask(width),
        }
    }

    pub fn zero(width: u32) -> Self {
        Self {
            width,
            bits: BigUint::zero(),
        }
    }

    pub fn from_u64(width: u32, value: u64) -> Self {
        Self::new(width, BigUint::from(value))
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn bits(&self) -> &BigUint {
        &self.bits
    }

    pub fn bit(&self, index: u32) -> bool {
        let shifted: BigUint = &self.bits >> index;
        let low = shifted & BigUint::from(1u8);
        !low.is_zero()
    }

    pub fn as_u64(&self) -> Option<u64> {
        if self.width > 64 {
            return None;
        }
        Some(self.bits.iter_u64_digits().next().unwrap_or(0))
    }

    /// Lowercase big-endian hex, exactly ⌈width/4⌉ nybbles.
    pub fn to_hex(&self) -> String {
        let nybbles = (self.width as usize + 3) / 4;
        let digits = self.bits.to_str_radix(16);
        let mut out = String::with_capacity(nybbles);
        for _ in digits.len()..nybbles {
            out.push('0');
        }
        out.push_str(&digits);
        out
    }

    /// Strict inverse of [`BvValue::to_hex`]: the token must be exactly
    /// ⌈width/4⌉ lowercase nybbles and must not set bits beyond the
    /// width.
    pub fn from_hex(width: u32, token: &str) -> Result<Self, ModelError> {
        let nybbles = (width as usize + 3) / 4;
        if token.len() != nybbles {
            return Err(ModelError::Malformed("value token width mismatch"));
        }
        for ch in token.chars() {
            if !matches!(ch, '0'..='9' | 'a'..='f') {
                return Err(ModelError::InvalidHex(ch));
            }
        }
        let bits = BigUint::parse_bytes(token.as_bytes(), 16)
            .ok_or(ModelError::Malformed("empty value token"))?;
        if bits.bits() > u64::from(width) {
            return Err(ModelError::Malformed("value exceeds sort width"));
        }
        Ok(Self { width, bits })
    }
}

fn mask(width: u32) -> BigUint {
    (BigUint::from(1u8) << width) - 1u8
}

/// One variable's assignment. Array and function interpretations are
/// total: `default` covers every argument outside `entries`. Entries
/// are an ordered map so encoding is deterministic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Bool(bool),
    Bv(BvValue),
    Array {
        default: BvValue,
        entries: IndexMap<BvValue, BvValue>,
    },
    Func {
        default: Box<Value>,
        entries: IndexMap<Vec<BvValue>, Value>,
    },
}

impl Value {
    /// The all-zero value of a sort, used where the solver model leaves
    /// an interpretation open.
    pub fn zero_of(sort: &Sort) -> Value {
        match sort {
            Sort::Bool => Value::Bool(false),
            Sort::Bv(width) => Value::Bv(BvValue::zero(*width)),
            Sort::Array { elem, .. } => Value::Array {
                default: BvValue::zero(*elem),
                entries: IndexMap::new(),
            },
            Sort::Func { range, .. } => Value::Func {
                default: Box::new(Value::zero_of(range)),
                entries: IndexMap::new(),
            },
        }
    }

    /// The value a function interpretation takes on `args`.
    pub fn apply(&self, args: &[BvValue]) -> Option<&Value> {
        match self {
            Value::Func { default, entries } => {
                Some(entries.get(args).unwrap_or(default.as_ref()))
            }
            _ => None,
        }
    }

    /// The cell value of an array interpretation at `index`.
    pub fn select(&self, index: &BvValue) -> Option<&BvValue> {
        match self {
            Value::Array { default, entries } => Some(entries.get(index).unwrap_or(default)),
            _ => None,
        }
    }
}

/// A total assignment over the variable enumeration, positionally
/// aligned with the declaration order fixed by the classifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Model {
    pub values: Vec<Value>,
}

impl Model {
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masks_to_width() {
        let v = BvValue::from_u64(4, 0xff);
        assert_eq!(v.as_u64(), Some(0xf));
        assert_eq!(v.to_hex(), "f");
    }

    #[test]
    fn hex_width_is_ceil_of_quarter_width() {
        assert_eq!(BvValue::from_u64(1, 1).to_hex(), "1");
        assert_eq!(BvValue::from_u64(6, 0x2a).to_hex(), "2a");
        assert_eq!(BvValue::from_u64(8, 5).to_hex(), "05");
        assert_eq!(BvValue::from_u64(16, 0).to_hex(), "0000");
    }

    #[test]
    fn hex_round_trip() {
        for width in [1u32, 3, 4, 7, 8, 16, 65, 130] {
            let v = BvValue::new(width, BigUint::from(0x1234_5678_9abc_def0u64));
            assert_eq!(BvValue::from_hex(width, &v.to_hex()), Ok(v));
        }
    }

    #[test]
    fn from_hex_rejects_bad_tokens() {
        assert_eq!(
            BvValue::from_hex(8, "0g"),
            Err(ModelError::InvalidHex('g'))
        );
        assert_eq!(
            BvValue::from_hex(8, "0F"),
            Err(ModelError::InvalidHex('F'))
        );
        assert!(BvValue::from_hex(8, "123").is_err());
        // high nybble sets a bit beyond width 6
        assert!(BvValue::from_hex(6, "ff").is_err());
    }

    #[test]
    fn bit_indexing_is_lsb_first() {
        let v = BvValue::from_u64(4, 0b0110);
        assert!(!v.bit(0));
        assert!(v.bit(1));
        assert!(v.bit(2));
        assert!(!v.bit(3));
    }

    #[test]
    fn function_application_falls_back_to_default() {
        let f = Value::Func {
            default: Box::new(Value::Bv(BvValue::from_u64(2, 0))),
            entries: [(
                vec![BvValue::from_u64(2, 0)],
                Value::Bv(BvValue::from_u64(2, 1)),
            )]
            .into_iter()
            .collect(),
        };
        let hit = f.apply(&[BvValue::from_u64(2, 0)]).unwrap();
        let miss = f.apply(&[BvValue::from_u64(2, 3)]).unwrap();
        assert_eq!(hit, &Value::Bv(BvValue::from_u64(2, 1)));
        assert_eq!(miss, &Value::Bv(BvValue::from_u64(2, 0)));
    }
}
