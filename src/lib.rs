//! BACnet to MQTT polling bridge.
//!
//! Polls present-values from a single BACnet/IP device on a fixed interval
//! and republishes each cycle's readings as one JSON message on an MQTT
//! topic. A point that fails to read is logged and skipped; the publish
//! cadence stays regular even when the whole panel is unreachable.

pub mod bacnet;
pub mod config;
pub mod mqtt;
pub mod poll;
