pub mod client;
pub mod codec;

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Largest valid BACnet object instance number (22 bits).
pub const MAX_INSTANCE: u32 = (1 << 22) - 1;

/// BACnet object types the bridge can sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ObjectKind {
    AnalogInput,
    AnalogOutput,
    AnalogValue,
    BinaryInput,
    BinaryOutput,
    BinaryValue,
    MultiStateValue,
}

impl ObjectKind {
    /// BACnet object type number (ASHRAE 135 clause 21).
    pub fn type_number(self) -> u32 {
        match self {
            ObjectKind::AnalogInput => 0,
            ObjectKind::AnalogOutput => 1,
            ObjectKind::AnalogValue => 2,
            ObjectKind::BinaryInput => 3,
            ObjectKind::BinaryOutput => 4,
            ObjectKind::BinaryValue => 5,
            ObjectKind::MultiStateValue => 19,
        }
    }

    /// Short prefix used to build payload field names ("av", "bv", ...).
    pub fn abbreviation(self) -> &'static str {
        match self {
            ObjectKind::AnalogInput => "ai",
            ObjectKind::AnalogOutput => "ao",
            ObjectKind::AnalogValue => "av",
            ObjectKind::BinaryInput => "bi",
            ObjectKind::BinaryOutput => "bo",
            ObjectKind::BinaryValue => "bv",
            ObjectKind::MultiStateValue => "msv",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ObjectKind::AnalogInput => "analogInput",
            ObjectKind::AnalogOutput => "analogOutput",
            ObjectKind::AnalogValue => "analogValue",
            ObjectKind::BinaryInput => "binaryInput",
            ObjectKind::BinaryOutput => "binaryOutput",
            ObjectKind::BinaryValue => "binaryValue",
            ObjectKind::MultiStateValue => "multiStateValue",
        }
    }

    /// Binary objects report present-value as Enumerated inactive/active.
    pub fn is_binary(self) -> bool {
        matches!(
            self,
            ObjectKind::BinaryInput | ObjectKind::BinaryOutput | ObjectKind::BinaryValue
        )
    }
}

/// One monitorable point on the device: object kind plus instance number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointId {
    pub kind: ObjectKind,
    pub index: u32,
}

impl PointId {
    pub fn new(kind: ObjectKind, index: u32) -> Self {
        Self { kind, index }
    }

    /// Field name for this point in the published payload ("av0", "bv1", ...).
    pub fn output_key(&self) -> String {
        format!("{}{}", self.kind.abbreviation(), self.index)
    }
}

impl fmt::Display for PointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.kind.name(), self.index)
    }
}

/// A present-value scalar as it appears in the published payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PointValue {
    Bool(bool),
    Unsigned(u64),
    Signed(i64),
    Real(f64),
    Text(String),
    Null,
}

/// Failure to read a single point. Never fatal to the cycle.
#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("transport error: {0}")]
    Io(#[from] std::io::Error),
    #[error("device returned error class {class}, code {code}")]
    ErrorResponse { class: u64, code: u64 },
    #[error("request rejected by device (reason {0})")]
    Rejected(u8),
    #[error("request aborted by device (reason {0})")]
    Aborted(u8),
    #[error("malformed reply: {0}")]
    Malformed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_keys_follow_kind_abbreviation() {
        assert_eq!(PointId::new(ObjectKind::AnalogValue, 0).output_key(), "av0");
        assert_eq!(PointId::new(ObjectKind::AnalogInput, 1).output_key(), "ai1");
        assert_eq!(PointId::new(ObjectKind::BinaryValue, 25).output_key(), "bv25");
        assert_eq!(
            PointId::new(ObjectKind::MultiStateValue, 4).output_key(),
            "msv4"
        );
    }

    #[test]
    fn display_uses_full_kind_name() {
        let point = PointId::new(ObjectKind::AnalogValue, 3);
        assert_eq!(point.to_string(), "analogValue-3");
    }

    #[test]
    fn kind_parses_from_camel_case() {
        let kind: ObjectKind = serde_json::from_str("\"analogValue\"").unwrap();
        assert_eq!(kind, ObjectKind::AnalogValue);
        let kind: ObjectKind = serde_json::from_str("\"multiStateValue\"").unwrap();
        assert_eq!(kind, ObjectKind::MultiStateValue);
    }

    #[test]
    fn values_serialize_as_bare_scalars() {
        assert_eq!(
            serde_json::to_string(&PointValue::Real(21.5)).unwrap(),
            "21.5"
        );
        assert_eq!(
            serde_json::to_string(&PointValue::Bool(true)).unwrap(),
            "true"
        );
        assert_eq!(serde_json::to_string(&PointValue::Null).unwrap(), "null");
        assert_eq!(
            serde_json::to_string(&PointValue::Unsigned(3)).unwrap(),
            "3"
        );
    }

    #[test]
    fn binary_kinds_are_flagged() {
        assert!(ObjectKind::BinaryValue.is_binary());
        assert!(ObjectKind::BinaryInput.is_binary());
        assert!(!ObjectKind::AnalogValue.is_binary());
        assert!(!ObjectKind::MultiStateValue.is_binary());
    }
}
