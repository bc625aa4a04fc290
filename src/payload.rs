//! JSON payloads: the inventory record received on `/topic/qos*` and the
//! status report published on `/topic/test3`.

use core::fmt;

use heapless::String;
use serde::{Deserialize, Serialize};

/// Capacity of the text fields of an [`ItemRecord`].
pub const MAX_TEXT_LEN: usize = 32;

/// A decoded inventory record: `{"Item": .., "Qty": .., "Type": ..}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemRecord {
    pub item: String<MAX_TEXT_LEN>,
    pub qty: i32,
    pub kind: String<MAX_TEXT_LEN>,
}

/// Wire shape of the record. Every field may be absent or null and is
/// checked explicitly after parsing.
#[derive(Deserialize)]
struct RawItemRecord {
    #[serde(rename = "Item", default)]
    item: Option<String<MAX_TEXT_LEN>>,
    #[serde(rename = "Qty", default)]
    qty: Option<i32>,
    #[serde(rename = "Type", default)]
    kind: Option<String<MAX_TEXT_LEN>>,
}

#[derive(Debug, PartialEq)]
pub enum DecodeError {
    /// Not a JSON object, or a field of the wrong type.
    Json(serde_json_core::de::Error),
    /// A required field is absent or null.
    MissingField(&'static str),
}

impl DecodeError {
    pub fn describe(&self) -> &'static str {
        match self {
            DecodeError::Json(_) => "invalid json",
            DecodeError::MissingField(field) => field,
        }
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::Json(e) => write!(f, "invalid json: {}", e),
            DecodeError::MissingField(field) => write!(f, "missing field {}", field),
        }
    }
}

impl From<serde_json_core::de::Error> for DecodeError {
    fn from(err: serde_json_core::de::Error) -> Self {
        DecodeError::Json(err)
    }
}

/// Parses an inventory record from a message payload.
pub fn decode_item(payload: &[u8]) -> Result<ItemRecord, DecodeError> {
    let (raw, _) = serde_json_core::from_slice::<RawItemRecord>(payload)?;
    Ok(ItemRecord {
        item: raw.item.ok_or(DecodeError::MissingField("Item"))?,
        qty: raw.qty.ok_or(DecodeError::MissingField("Qty"))?,
        kind: raw.kind.ok_or(DecodeError::MissingField("Type"))?,
    })
}

/// Periodic status report.
#[derive(Debug, Serialize)]
pub struct StatusReport<'a> {
    pub name: &'a str,
    pub uptime_s: u64,
}

pub type EncodeError = serde_json_core::ser::Error;

/// Serializes `report` into `buf` and returns the number of bytes written.
pub fn encode_status(report: &StatusReport<'_>, buf: &mut [u8]) -> Result<usize, EncodeError> {
    serde_json_core::to_slice(report, buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_complete_record() {
        let record = decode_item(br#"{"Item":"Bolt","Qty":5,"Type":"Hardware"}"#).unwrap();
        assert_eq!(record.item.as_str(), "Bolt");
        assert_eq!(record.qty, 5);
        assert_eq!(record.kind.as_str(), "Hardware");
    }

    #[test]
    fn field_order_does_not_matter() {
        let record = decode_item(br#"{ "Type": "Food", "Qty": -2, "Item": "Apple" }"#).unwrap();
        assert_eq!(record.item.as_str(), "Apple");
        assert_eq!(record.qty, -2);
        assert_eq!(record.kind.as_str(), "Food");
    }

    #[test]
    fn rejects_non_json() {
        assert!(matches!(decode_item(b"not json"), Err(DecodeError::Json(_))));
        assert!(matches!(decode_item(b""), Err(DecodeError::Json(_))));
    }

    #[test]
    fn reports_first_missing_field() {
        assert_eq!(
            decode_item(br#"{"Item":"Bolt"}"#),
            Err(DecodeError::MissingField("Qty"))
        );
        assert_eq!(
            decode_item(br#"{"Qty":1,"Type":"x"}"#),
            Err(DecodeError::MissingField("Item"))
        );
    }

    #[test]
    fn null_counts_as_missing() {
        assert_eq!(
            decode_item(br#"{"Item":"Bolt","Qty":5,"Type":null}"#),
            Err(DecodeError::MissingField("Type"))
        );
    }

    #[test]
    fn wrong_field_type_is_a_json_error() {
        assert!(matches!(
            decode_item(br#"{"Item":"Bolt","Qty":"five","Type":"Hardware"}"#),
            Err(DecodeError::Json(_))
        ));
    }

    #[test]
    fn encodes_status_report() {
        let mut buf = [0u8; 64];
        let len = encode_status(
            &StatusReport {
                name: "node",
                uptime_s: 42,
            },
            &mut buf,
        )
        .unwrap();
        assert_eq!(&buf[..len], br#"{"name":"node","uptime_s":42}"#);
    }

    #[test]
    fn status_report_needs_room() {
        let mut buf = [0u8; 8];
        let report = StatusReport {
            name: "node",
            uptime_s: 1,
        };
        assert!(encode_status(&report, &mut buf).is_err());
    }
}
