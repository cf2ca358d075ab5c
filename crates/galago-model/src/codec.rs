//! The canonical NUL-delimited byte encoding of a model.
//!
//! Per variable, in declaration order:
//!
//! - scalar BV(w): `<hex>\0`, lowercase big-endian, ⌈w/4⌉ nybbles
//! - Bool: `0\0` or `1\0`
//! - array: `[` `<n>\0` `<default>\0` (`<arg>\0` `<value>\0`)ⁿ `]`
//! - function: `(` `<n>\0` `<default>\0` (`<arg₁>\0`…`<argₖ>\0` `<value>\0`)ⁿ `)`
//!
//! Two models are equal iff their buffers are equal; the deduplication
//! sets rely on that.

use indexmap::IndexMap;

use crate::error::ModelError;
use crate::sorts::{Declaration, Sort};
use crate::value::{BvValue, Model, Value};

/// Encode a model into its canonical buffer. Values are
/// self-describing, so no declaration list is needed on this side.
pub fn encode(model: &Model) -> Vec<u8> {
    let mut buf = Vec::new();
    for value in &model.values {
        encode_value(&mut buf, value);
    }
    buf
}

/// Decode a canonical buffer against the fixed declaration order.
pub fn decode(buf: &[u8], decls: &[Declaration]) -> Result<Model, ModelError> {
    let mut reader = Reader { buf, pos: 0 };
    let mut values = Vec::with_capacity(decls.len());
    for decl in decls {
        values.push(decode_value(&mut reader, &decl.sort)?);
    }
    if !reader.at_end() {
        return Err(ModelError::Malformed("trailing bytes"));
    }
    Ok(Model::new(values))
}

fn push_token(buf: &mut Vec<u8>, token: &str) {
    buf.extend_from_slice(token.as_bytes());
    buf.push(0);
}

fn scalar_token(value: &Value) -> String {
    match value {
        Value::Bool(b) => if *b { "1" } else { "0" }.to_string(),
        Value::Bv(v) => v.to_hex(),
        Value::Array { .. } | Value::Func { .. } => {
            unreachable!("interpretation entries hold scalar values only")
        }
    }
}

fn encode_value(buf: &mut Vec<u8>, value: &Value) {
    match value {
        Value::Bool(_) | Value::Bv(_) => push_token(buf, &scalar_token(value)),
        Value::Array { default, entries } => {
            buf.push(b'[');
            push_token(buf, &entries.len().to_string());
            push_token(buf, &default.to_hex());
            for (arg, val) in entries {
                push_token(buf, &arg.to_hex());
                push_token(buf, &val.to_hex());
            }
            buf.push(b']');
        }
        Value::Func { default, entries } => {
            buf.push(b'(');
            push_token(buf, &entries.len().to_string());
            push_token(buf, &scalar_token(default));
            for (args, val) in entries {
                for arg in args {
                    push_token(buf, &arg.to_hex());
                }
                push_token(buf, &scalar_token(val));
            }
            buf.push(b')');
        }
    }
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn token(&mut self) -> Result<&'a str, ModelError> {
        let rest = &self.buf[self.pos..];
        let len = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or(ModelError::Malformed("unterminated token"))?;
        self.pos += len + 1;
        std::str::from_utf8(&rest[..len]).map_err(|_| ModelError::Malformed("non-ascii token"))
    }

    fn expect(&mut self, byte: u8) -> Result<(), ModelError> {
        if self.buf.get(self.pos) == Some(&byte) {
            self.pos += 1;
            Ok(())
        } else {
            Err(ModelError::Malformed("missing structural byte"))
        }
    }

    fn at_end(&self) -> bool {
        self.pos == self.buf.len()
    }
}

fn decode_scalar(reader: &mut Reader<'_>, sort: &Sort) -> Result<Value, ModelError> {
    match sort {
        Sort::Bool => match reader.token()? {
            "0" => Ok(Value::Bool(false)),
            "1" => Ok(Value::Bool(true)),
            _ => Err(ModelError::Malformed("boolean token")),
        },
        Sort::Bv(width) => Ok(Value::Bv(BvValue::from_hex(*width, reader.token()?)?)),
        Sort::Array { .. } | Sort::Func { .. } => {
            Err(ModelError::Malformed("nested interpretation"))
        }
    }
}

fn decode_count(reader: &mut Reader<'_>) -> Result<usize, ModelError> {
    reader
        .token()?
        .parse()
        .map_err(|_| ModelError::Malformed("entry count"))
}

fn decode_value(reader: &mut Reader<'_>, sort: &Sort) -> Result<Value, ModelError> {
    match sort {
        Sort::Bool | Sort::Bv(_) => decode_scalar(reader, sort),
        Sort::Array { index, elem } => {
            reader.expect(b'[')?;
            let count = decode_count(reader)?;
            let default = BvValue::from_hex(*elem, reader.token()?)?;
            let mut entries = IndexMap::with_capacity(count);
            for _ in 0..count {
                let arg = BvValue::from_hex(*index, reader.token()?)?;
                let val = BvValue::from_hex(*elem, reader.token()?)?;
                // later writes override earlier ones
                entries.insert(arg, val);
            }
            reader.expect(b']')?;
            Ok(Value::Array { default, entries })
        }
        Sort::Func { domain, range } => {
            reader.expect(b'(')?;
            let count = decode_count(reader)?;
            let default = decode_scalar(reader, range)?;
            let mut entries = IndexMap::with_capacity(count);
            for _ in 0..count {
                let mut args = Vec::with_capacity(domain.len());
                for width in domain {
                    args.push(BvValue::from_hex(*width, reader.token()?)?);
                }
                let val = decode_scalar(reader, range)?;
                entries.insert(args, val);
            }
            reader.expect(b')')?;
            Ok(Value::Func {
                default: Box::new(default),
                entries,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bv(width: u32, value: u64) -> BvValue {
        BvValue::from_u64(width, value)
    }

    fn decls() -> Vec<Declaration> {
        vec![
            Declaration::new("x", Sort::Bv(6)),
            Declaration::new("flag", Sort::Bool),
            Declaration::new("mem", Sort::Array { index: 2, elem: 8 }),
            Declaration::new(
                "f",
                Sort::Func {
                    domain: vec![2, 2],
                    range: Box::new(Sort::Bv(4)),
                },
            ),
        ]
    }

    fn sample_model() -> Model {
        Model::new(vec![
            Value::Bv(bv(6, 0x2a)),
            Value::Bool(true),
            Value::Array {
                default: bv(8, 0),
                entries: [(bv(2, 1), bv(8, 0xff)), (bv(2, 3), bv(8, 0x10))]
                    .into_iter()
                    .collect(),
            },
            Value::Func {
                default: Box::new(Value::Bv(bv(4, 0))),
                entries: [(vec![bv(2, 0), bv(2, 1)], Value::Bv(bv(4, 9)))]
                    .into_iter()
                    .collect(),
            },
        ])
    }

    #[test]
    fn round_trip() {
        let model = sample_model();
        let buf = encode(&model);
        let decoded = decode(&buf, &decls()).unwrap();
        assert_eq!(decoded, model);
        assert_eq!(encode(&decoded), buf);
    }

    #[test]
    fn scalar_buffer_layout() {
        let model = Model::new(vec![Value::Bv(bv(6, 0x2a)), Value::Bool(true)]);
        let buf = encode(&model);
        assert_eq!(buf, b"2a\x001\x00");
    }

    #[test]
    fn empty_array_still_carries_a_default() {
        let model = Model::new(vec![Value::Array {
            default: bv(8, 0x7f),
            entries: IndexMap::new(),
        }]);
        let buf = encode(&model);
        assert_eq!(buf, b"[0\x007f\x00]");
        let decls = vec![Declaration::new("a", Sort::Array { index: 2, elem: 8 })];
        assert_eq!(decode(&buf, &decls).unwrap(), model);
    }

    #[test]
    fn duplicate_keys_decode_with_later_write_winning() {
        let buf = b"[2\x0000\x0001\x0011\x0001\x00ff\x00]";
        let decls = vec![Declaration::new("a", Sort::Array { index: 2, elem: 8 })];
        let decoded = decode(buf, &decls).unwrap();
        assert_eq!(
            decoded.values[0].select(&bv(2, 1)),
            Some(&bv(8, 0xff))
        );
    }

    #[test]
    fn truncated_buffers_are_rejected() {
        let model = sample_model();
        let buf = encode(&model);
        assert!(decode(&buf[..buf.len() - 1], &decls()).is_err());
        assert!(decode(&buf[..3], &decls()).is_err());
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        let model = Model::new(vec![Value::Bool(false)]);
        let mut buf = encode(&model);
        buf.push(b'x');
        let decls = vec![Declaration::new("b", Sort::Bool)];
        assert!(decode(&buf, &decls).is_err());
    }

    #[test]
    fn non_hex_nybbles_are_flagged() {
        let decls = vec![Declaration::new("x", Sort::Bv(8))];
        assert_eq!(
            decode(b"zz\x00", &decls),
            Err(ModelError::InvalidHex('z'))
        );
    }
}
