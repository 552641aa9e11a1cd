use serde::Deserialize;
use std::collections::HashSet;
use std::env;
use std::net::IpAddr;
use std::time::Duration;

use crate::bacnet::{MAX_INSTANCE, ObjectKind, PointId};
use crate::poll::PublishMode;

#[derive(Debug, Clone)]
pub struct Config {
    pub mqtt: MqttConfig,
    pub bacnet: BacnetConfig,
    pub poll: PollConfig,
    pub points: Vec<PointId>,
}

#[derive(Debug, Clone)]
pub struct MqttConfig {
    pub broker_host: String,
    pub broker_port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub topic: String,
    pub client_id: String,
    /// None keeps the single-connection behavior: a dropped broker
    /// connection stays down until restart.
    pub reconnect: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct BacnetConfig {
    pub device_ip: IpAddr,
    pub device_port: u16,
    pub local_port: u16,
    pub read_timeout_ms: u64,
}

#[derive(Debug, Clone)]
pub struct PollConfig {
    pub interval_secs: u64,
    pub mode: PublishMode,
}

// Serde struct for one entry of the points file
#[derive(Deserialize)]
struct RawPoint {
    kind: ObjectKind,
    #[serde(default)]
    index: Option<u32>,
    #[serde(default)]
    range: Option<(u32, u32)>,
}

fn env_required(key: &str) -> Result<String, String> {
    env::var(key).map_err(|_| format!("{key} environment variable is required"))
}

fn env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_or_default<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        let points_file = env_or_default("POINTS_FILE", "points.json".to_string());
        let points = load_points(&points_file)?;

        let mode = match env_or_default("PUBLISH_MODE", "batched".to_string()).as_str() {
            "batched" => PublishMode::Batched,
            "per-point" => PublishMode::PerPoint,
            other => {
                return Err(format!(
                    "PUBLISH_MODE must be 'batched' or 'per-point', got '{other}'"
                ));
            }
        };

        let reconnect = env_optional("MQTT_RECONNECT_SECS")
            .map(|v| {
                v.parse()
                    .map(Duration::from_secs)
                    .map_err(|_| format!("MQTT_RECONNECT_SECS must be an integer, got '{v}'"))
            })
            .transpose()?;

        let config = Self {
            mqtt: MqttConfig {
                broker_host: env_required("MQTT_BROKER_HOST")?,
                broker_port: env_or_default("MQTT_BROKER_PORT", 1883),
                username: env_optional("MQTT_USERNAME"),
                password: env_optional("MQTT_PASSWORD"),
                topic: env_required("MQTT_TOPIC")?,
                client_id: env_or_default("MQTT_CLIENT_ID", "bacnet-to-mqtt".to_string()),
                reconnect,
            },
            bacnet: BacnetConfig {
                device_ip: env_required("BACNET_DEVICE_IP")?
                    .parse()
                    .map_err(|e| format!("BACNET_DEVICE_IP invalid: {e}"))?,
                device_port: env_or_default("BACNET_DEVICE_PORT", 47808),
                local_port: env_or_default("BACNET_LOCAL_PORT", 47809),
                read_timeout_ms: env_or_default("BACNET_READ_TIMEOUT_MS", 3000),
            },
            poll: PollConfig {
                interval_secs: env_or_default("POLL_INTERVAL_SECS", 60),
                mode,
            },
            points,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), String> {
        if self.mqtt.broker_host.is_empty() {
            return Err("MQTT_BROKER_HOST must not be empty".into());
        }
        if self.mqtt.topic.is_empty() {
            return Err("MQTT_TOPIC must not be empty".into());
        }
        if self.points.is_empty() {
            return Err("No points found in points file".into());
        }
        if self.poll.interval_secs == 0 {
            return Err("POLL_INTERVAL_SECS must be > 0".into());
        }
        if self.bacnet.read_timeout_ms == 0 {
            return Err("BACNET_READ_TIMEOUT_MS must be > 0".into());
        }
        Ok(())
    }
}

fn load_points(path: &str) -> Result<Vec<PointId>, String> {
    let content =
        std::fs::read_to_string(path).map_err(|e| format!("Failed to read {path}: {e}"))?;

    let raw: Vec<RawPoint> =
        serde_json::from_str(&content).map_err(|e| format!("Failed to parse {path}: {e}"))?;

    expand_points(&raw)
}

/// Expand single indices and inclusive ranges into the ordered point list.
/// Disjoint ranges for one kind are expressed as separate entries.
fn expand_points(raw: &[RawPoint]) -> Result<Vec<PointId>, String> {
    let mut points = Vec::new();

    for (i, entry) in raw.iter().enumerate() {
        let (lo, hi) = match (entry.index, entry.range) {
            (Some(index), None) => (index, index),
            (None, Some((lo, hi))) => {
                if lo > hi {
                    return Err(format!("Point entry {i}: range [{lo}, {hi}] is inverted"));
                }
                (lo, hi)
            }
            _ => {
                return Err(format!(
                    "Point entry {i}: exactly one of 'index' or 'range' is required"
                ));
            }
        };

        for index in lo..=hi {
            if index > MAX_INSTANCE {
                return Err(format!(
                    "Point entry {i}: instance {index} exceeds the 22-bit BACnet limit"
                ));
            }
            points.push(PointId::new(entry.kind, index));
        }
    }

    let mut seen = HashSet::new();
    for point in &points {
        if !seen.insert(point.output_key()) {
            return Err(format!("Duplicate point {point} in points file"));
        }
    }

    Ok(points)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> Result<Vec<PointId>, String> {
        let raw: Vec<RawPoint> = serde_json::from_str(json).map_err(|e| e.to_string())?;
        expand_points(&raw)
    }

    #[test]
    fn expands_disjoint_ranges_in_file_order() {
        let points = parse(
            r#"[
                { "kind": "analogValue", "range": [0, 16] },
                { "kind": "analogValue", "range": [19, 25] },
                { "kind": "binaryValue", "range": [0, 1] }
            ]"#,
        )
        .unwrap();

        assert_eq!(points.len(), 17 + 7 + 2);
        assert_eq!(points[0], PointId::new(ObjectKind::AnalogValue, 0));
        assert_eq!(points[16], PointId::new(ObjectKind::AnalogValue, 16));
        assert_eq!(points[17], PointId::new(ObjectKind::AnalogValue, 19));
        assert_eq!(points[24], PointId::new(ObjectKind::BinaryValue, 0));
        assert_eq!(points[25], PointId::new(ObjectKind::BinaryValue, 1));
    }

    #[test]
    fn accepts_single_index_entries() {
        let points = parse(r#"[{ "kind": "analogInput", "index": 1 }]"#).unwrap();
        assert_eq!(points, vec![PointId::new(ObjectKind::AnalogInput, 1)]);
    }

    #[test]
    fn rejects_overlapping_ranges() {
        let err = parse(
            r#"[
                { "kind": "analogValue", "range": [0, 5] },
                { "kind": "analogValue", "range": [5, 8] }
            ]"#,
        )
        .unwrap_err();
        assert!(err.contains("Duplicate point analogValue-5"));
    }

    #[test]
    fn rejects_entry_with_both_index_and_range() {
        let err = parse(r#"[{ "kind": "analogValue", "index": 1, "range": [0, 2] }]"#).unwrap_err();
        assert!(err.contains("exactly one of 'index' or 'range'"));
    }

    #[test]
    fn rejects_entry_with_neither_index_nor_range() {
        let err = parse(r#"[{ "kind": "analogValue" }]"#).unwrap_err();
        assert!(err.contains("exactly one of 'index' or 'range'"));
    }

    #[test]
    fn rejects_inverted_range() {
        let err = parse(r#"[{ "kind": "binaryValue", "range": [3, 1] }]"#).unwrap_err();
        assert!(err.contains("inverted"));
    }

    #[test]
    fn rejects_instance_over_22_bits() {
        let err = parse(r#"[{ "kind": "analogValue", "index": 4194304 }]"#).unwrap_err();
        assert!(err.contains("22-bit"));
    }

    #[test]
    fn rejects_unknown_kind() {
        assert!(parse(r#"[{ "kind": "loopObject", "index": 0 }]"#).is_err());
    }
}
