use chrono::{DateTime, Utc};
use crate::core::error::{Error, Result};
use crate::propset::model::Value;
use crate::schema::types::ValueType;

const INT_SIGN: u32 = 0x8000_0000;
const LONG_SIGN: u64 = 0x8000_0000_0000_0000;

/// Order-preserving encodings between typed values and index representations.
///
/// Two forms exist for every scalar:
/// - the *search* form, a string whose lexicographic order equals value order
///   (fixed-width hex for numbers and dates), used for indexed terms;
/// - the *stored* form, compact bytes that round-trip exactly.
///
/// Dates and timestamps are truncated to whole seconds before encoding.
pub struct ValueCodec;

impl ValueCodec {
    pub const INT_WIDTH: usize = 8;
    pub const LONG_WIDTH: usize = 16;

    /// Sign bit flipped so unsigned order equals signed order
    pub fn encode_int(value: i32) -> String {
        format!("{:08x}", (value as u32) ^ INT_SIGN)
    }

    pub fn decode_int(encoded: &str) -> Result<i32> {
        let raw = Self::parse_hex(encoded, Self::INT_WIDTH)?;
        Ok(((raw as u32) ^ INT_SIGN) as i32)
    }

    pub fn encode_long(value: i64) -> String {
        format!("{:016x}", (value as u64) ^ LONG_SIGN)
    }

    pub fn decode_long(encoded: &str) -> Result<i64> {
        let raw = Self::parse_hex(encoded, Self::LONG_WIDTH)?;
        Ok((raw ^ LONG_SIGN) as i64)
    }

    fn parse_hex(encoded: &str, width: usize) -> Result<u64> {
        if encoded.len() != width {
            return Err(Error::mapping(format!(
                "Encoded number '{}' must be {} hex digits",
                encoded, width
            )));
        }
        u64::from_str_radix(encoded, 16)
            .map_err(|e| Error::mapping(format!("Encoded number '{}': {}", encoded, e)))
    }

    /// Milliseconds since epoch, rounded down to the second
    pub fn truncated_millis(value: &DateTime<Utc>) -> i64 {
        let millis = value.timestamp_millis();
        millis - millis.rem_euclid(1000)
    }

    pub fn truncate_to_second(value: &DateTime<Utc>) -> DateTime<Utc> {
        Self::datetime_from_millis(Self::truncated_millis(value)).unwrap_or(*value)
    }

    fn datetime_from_millis(millis: i64) -> Result<DateTime<Utc>> {
        DateTime::from_timestamp_millis(millis)
            .ok_or_else(|| Error::mapping(format!("Timestamp {} out of range", millis)))
    }

    pub fn encode_date(value: &DateTime<Utc>) -> String {
        Self::encode_long(Self::truncated_millis(value))
    }

    pub fn decode_date(encoded: &str) -> Result<DateTime<Utc>> {
        Self::datetime_from_millis(Self::decode_long(encoded)?)
    }

    /// Search (indexed term) form. Binary values have no search form.
    pub fn encode_search(value: &Value, lowercase: bool) -> Result<String> {
        Ok(match value {
            Value::Boolean(b) => b.to_string(),
            Value::Int(v) => Self::encode_int(*v),
            Value::Long(v) => Self::encode_long(*v),
            Value::Date(d) | Value::Timestamp(d) => Self::encode_date(d),
            Value::String(s) if lowercase => s.to_lowercase(),
            Value::String(s) => s.clone(),
            Value::Binary(_) => {
                return Err(Error::invalid_argument("Binary values are never indexed"));
            }
        })
    }

    pub fn decode_search(encoded: &str, value_type: ValueType) -> Result<Value> {
        Ok(match value_type {
            ValueType::Boolean => match encoded {
                "true" => Value::Boolean(true),
                "false" => Value::Boolean(false),
                other => return Err(Error::mapping(format!("Bad boolean term '{}'", other))),
            },
            ValueType::Int => Value::Int(Self::decode_int(encoded)?),
            ValueType::Long => Value::Long(Self::decode_long(encoded)?),
            ValueType::Date => Value::Date(Self::decode_date(encoded)?),
            ValueType::Timestamp => Value::Timestamp(Self::decode_date(encoded)?),
            ValueType::Binary => {
                return Err(Error::invalid_argument("Binary values are never indexed"));
            }
            _ => Value::String(encoded.to_string()),
        })
    }

    /// Stored form: fixed-width big-endian for numbers, raw UTF-8 for strings
    pub fn encode_stored(value: &Value) -> Vec<u8> {
        match value {
            Value::Boolean(b) => vec![u8::from(*b)],
            Value::Int(v) => ((*v as u32) ^ INT_SIGN).to_be_bytes().to_vec(),
            Value::Long(v) => ((*v as u64) ^ LONG_SIGN).to_be_bytes().to_vec(),
            Value::Date(d) | Value::Timestamp(d) => {
                ((Self::truncated_millis(d) as u64) ^ LONG_SIGN).to_be_bytes().to_vec()
            }
            Value::String(s) => s.as_bytes().to_vec(),
            Value::Binary(b) => b.clone(),
        }
    }

    /// Wrong lengths are fatal mapping errors: the index is corrupt or the
    /// schema changed since it was built.
    pub fn decode_stored(bytes: &[u8], value_type: ValueType) -> Result<Value> {
        Ok(match value_type {
            ValueType::Boolean => match Self::fixed::<1>(bytes, value_type)? {
                [0] => Value::Boolean(false),
                [1] => Value::Boolean(true),
                [other] => return Err(Error::mapping(format!("Bad stored boolean byte {}", other))),
            },
            ValueType::Int => {
                let raw = u32::from_be_bytes(Self::fixed::<4>(bytes, value_type)?);
                Value::Int((raw ^ INT_SIGN) as i32)
            }
            ValueType::Long => Value::Long(Self::stored_long(bytes, value_type)?),
            ValueType::Date => Value::Date(Self::datetime_from_millis(Self::stored_long(bytes, value_type)?)?),
            ValueType::Timestamp => {
                Value::Timestamp(Self::datetime_from_millis(Self::stored_long(bytes, value_type)?)?)
            }
            ValueType::Binary => Value::Binary(bytes.to_vec()),
            _ => Value::String(
                String::from_utf8(bytes.to_vec())
                    .map_err(|e| Error::mapping(format!("Stored string is not UTF-8: {}", e)))?,
            ),
        })
    }

    fn stored_long(bytes: &[u8], value_type: ValueType) -> Result<i64> {
        let raw = u64::from_be_bytes(Self::fixed::<8>(bytes, value_type)?);
        Ok((raw ^ LONG_SIGN) as i64)
    }

    fn fixed<const N: usize>(bytes: &[u8], value_type: ValueType) -> Result<[u8; N]> {
        bytes.try_into().map_err(|_| {
            Error::mapping(format!(
                "Stored {:?} must be {} bytes, found {}",
                value_type,
                N,
                bytes.len()
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ErrorKind;
    use chrono::TimeZone;
    use proptest::prelude::*;

    #[test]
    fn test_int_encoding_examples() {
        assert_eq!(ValueCodec::encode_int(0), "80000000");
        assert_eq!(ValueCodec::encode_int(-1), "7fffffff");
        assert_eq!(ValueCodec::encode_int(i32::MIN), "00000000");
        assert_eq!(ValueCodec::encode_int(i32::MAX), "ffffffff");
        assert_eq!(ValueCodec::encode_long(0).len(), ValueCodec::LONG_WIDTH);
    }

    #[test]
    fn test_dates_lose_sub_second_precision() {
        let precise = Utc.timestamp_millis_opt(1_700_000_000_789).unwrap();
        let stored = ValueCodec::encode_stored(&Value::Timestamp(precise));
        let decoded = ValueCodec::decode_stored(&stored, ValueType::Timestamp).unwrap();
        assert_eq!(decoded, Value::Timestamp(Utc.timestamp_millis_opt(1_700_000_000_000).unwrap()));

        // Before the epoch truncation still rounds down
        let negative = Utc.timestamp_millis_opt(-1_500).unwrap();
        assert_eq!(ValueCodec::truncated_millis(&negative), -2_000);
    }

    #[test]
    fn test_wrong_width_is_mapping_error() {
        let err = ValueCodec::decode_stored(&[0, 1, 2], ValueType::Int).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Mapping);
        assert_eq!(ValueCodec::decode_int("abc").unwrap_err().kind, ErrorKind::Mapping);
        assert!(ValueCodec::decode_stored(&[2], ValueType::Boolean).is_err());
    }

    #[test]
    fn test_search_form_lowercases_strings_on_request() {
        let value = Value::String("Hello World".into());
        assert_eq!(ValueCodec::encode_search(&value, false).unwrap(), "Hello World");
        assert_eq!(ValueCodec::encode_search(&value, true).unwrap(), "hello world");
        assert!(ValueCodec::encode_search(&Value::Binary(vec![1]), false).is_err());
        assert_eq!(ValueCodec::encode_search(&Value::Boolean(true), false).unwrap(), "true");
    }

    fn whole_second_datetime() -> impl Strategy<Value = DateTime<Utc>> {
        (-8_000_000_000i64..8_000_000_000i64).prop_map(|secs| Utc.timestamp_opt(secs, 0).unwrap())
    }

    fn arb_value() -> impl Strategy<Value = (Value, ValueType)> {
        prop_oneof![
            any::<bool>().prop_map(|b| (Value::Boolean(b), ValueType::Boolean)),
            any::<i32>().prop_map(|v| (Value::Int(v), ValueType::Int)),
            any::<i64>().prop_map(|v| (Value::Long(v), ValueType::Long)),
            whole_second_datetime().prop_map(|d| (Value::Date(d), ValueType::Date)),
            whole_second_datetime().prop_map(|d| (Value::Timestamp(d), ValueType::Timestamp)),
            ".*".prop_map(|s| (Value::String(s), ValueType::String)),
            ".*".prop_map(|s| (Value::String(s), ValueType::Html)),
        ]
    }

    proptest! {
        #[test]
        fn stored_roundtrip((value, value_type) in arb_value()) {
            let encoded = ValueCodec::encode_stored(&value);
            prop_assert_eq!(ValueCodec::decode_stored(&encoded, value_type).unwrap(), value);
        }

        #[test]
        fn search_roundtrip((value, value_type) in arb_value()) {
            let encoded = ValueCodec::encode_search(&value, false).unwrap();
            prop_assert_eq!(ValueCodec::decode_search(&encoded, value_type).unwrap(), value);
        }

        #[test]
        fn int_order_preserved(a in any::<i32>(), b in any::<i32>()) {
            prop_assert_eq!(a.cmp(&b), ValueCodec::encode_int(a).cmp(&ValueCodec::encode_int(b)));
            let (sa, sb) = (ValueCodec::encode_stored(&Value::Int(a)), ValueCodec::encode_stored(&Value::Int(b)));
            prop_assert_eq!(a.cmp(&b), sa.cmp(&sb));
        }

        #[test]
        fn long_order_preserved(a in any::<i64>(), b in any::<i64>()) {
            prop_assert_eq!(a.cmp(&b), ValueCodec::encode_long(a).cmp(&ValueCodec::encode_long(b)));
        }

        #[test]
        fn date_order_preserved(a in whole_second_datetime(), b in whole_second_datetime()) {
            prop_assert_eq!(a.cmp(&b), ValueCodec::encode_date(&a).cmp(&ValueCodec::encode_date(&b)));
        }
    }
}
