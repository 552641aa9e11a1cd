//! The poll-aggregate-publish cycle.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::bacnet::{PointId, PointValue, ReadError};

/// One cycle's aggregated readings, keyed by output field name. Empty is a
/// valid, publishable outcome.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ReadingSet(BTreeMap<String, PointValue>);

impl ReadingSet {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn insert(&mut self, key: String, value: PointValue) {
        self.0.insert(key, value);
    }

    pub fn get(&self, key: &str) -> Option<&PointValue> {
        self.0.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// When readings are handed to the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishMode {
    /// One message per cycle with all successful points merged.
    Batched,
    /// One message per successful point, sent as soon as it is read.
    PerPoint,
}

/// Failure to deliver one message to the broker. Reported, never retried;
/// the message is dropped.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("failed to encode payload: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("broker client error: {0}")]
    Client(String),
}

/// Read one point's present value.
#[allow(async_fn_in_trait)]
pub trait PointReader {
    async fn read(&mut self, point: &PointId) -> Result<PointValue, ReadError>;
}

/// Deliver one reading set to the message bus.
#[allow(async_fn_in_trait)]
pub trait Publisher {
    async fn publish(&mut self, topic: &str, readings: &ReadingSet) -> Result<(), PublishError>;
}

/// Drives the cycle: read every configured point in order, then hand the
/// readings to the publisher.
pub struct Poller<'a, R, P> {
    reader: R,
    publisher: &'a mut P,
    points: Vec<PointId>,
    topic: String,
    mode: PublishMode,
    interval: Duration,
}

impl<'a, R: PointReader, P: Publisher> Poller<'a, R, P> {
    pub fn new(
        reader: R,
        publisher: &'a mut P,
        points: Vec<PointId>,
        topic: impl Into<String>,
        mode: PublishMode,
        interval: Duration,
    ) -> Self {
        Self {
            reader,
            publisher,
            points,
            topic: topic.into(),
            mode,
            interval,
        }
    }

    /// One complete pass over the point list followed by the publish.
    ///
    /// A failed point is logged and skipped; it never prevents the remaining
    /// reads or the publish. In batched mode the publish happens exactly
    /// once per call, even when every read failed.
    pub async fn run_once(&mut self) -> ReadingSet {
        let Self {
            reader,
            publisher,
            points,
            topic,
            mode,
            ..
        } = self;

        let mut readings = ReadingSet::new();

        for point in points.iter() {
            match reader.read(point).await {
                Ok(value) => {
                    let key = point.output_key();
                    if *mode == PublishMode::PerPoint {
                        let mut single = ReadingSet::new();
                        single.insert(key.clone(), value.clone());
                        if let Err(e) = publisher.publish(topic, &single).await {
                            warn!("Failed to publish {}: {}", key, e);
                        }
                    }
                    readings.insert(key, value);
                }
                Err(e) => {
                    warn!("Error reading {}: {}", point, e);
                }
            }
        }

        if *mode == PublishMode::Batched {
            if let Err(e) = publisher.publish(topic, &readings).await {
                warn!("Failed to publish {} readings: {}", readings.len(), e);
            }
        }

        readings
    }

    /// Run cycles forever at the configured interval. Cycles never overlap;
    /// a slow cycle delays the next one. Cancelled externally.
    pub async fn run(&mut self) {
        info!(
            "Polling {} points every {:?}",
            self.points.len(),
            self.interval
        );

        loop {
            let readings = self.run_once().await;
            debug!(
                "Cycle complete: {} of {} points read",
                readings.len(),
                self.points.len()
            );
            tokio::time::sleep(self.interval).await;
        }
    }
}
