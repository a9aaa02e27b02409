//! Shared helpers for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use prw_output::error::WriteError;
use prw_output::remote::{self, WriteClient, WriteRequest};
use prw_output::types::{Metric, Sample};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Write client that keeps every decoded request in memory
#[derive(Default)]
pub struct RecordingClient {
    requests: Mutex<Vec<WriteRequest>>,
    calls: AtomicUsize,
    fail: AtomicBool,
    delay: Mutex<Option<Duration>>,
}

impl RecordingClient {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Client that rejects every payload
    pub fn failing() -> Arc<Self> {
        let client = Self::default();
        client.fail.store(true, Ordering::SeqCst);
        Arc::new(client)
    }

    /// Client that sleeps before answering
    pub fn slow(delay: Duration) -> Arc<Self> {
        let client = Self::default();
        *client.delay.lock() = Some(delay);
        Arc::new(client)
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Number of `store` calls, successful or not
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Successfully stored requests
    pub fn requests(&self) -> Vec<WriteRequest> {
        self.requests.lock().clone()
    }

    pub fn last_request(&self) -> Option<WriteRequest> {
        self.requests.lock().last().cloned()
    }
}

#[async_trait]
impl WriteClient for RecordingClient {
    async fn store(&self, payload: Vec<u8>) -> Result<(), WriteError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.fail.load(Ordering::SeqCst) {
            return Err(WriteError::Status {
                status: 503,
                body: "unavailable".to_string(),
            });
        }

        let request = remote::decode(&payload).expect("payload must decode");
        self.requests.lock().push(request);
        Ok(())
    }

    fn name(&self) -> &str {
        "recording"
    }

    fn endpoint(&self) -> &str {
        "memory://recording"
    }
}

/// Build a tag map from pairs
pub fn tags(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Build a sample at a fixed timestamp
pub fn sample(metric: &Arc<Metric>, pairs: &[(&str, &str)], value: f64, ts: i64) -> Sample {
    Sample::at(Arc::clone(metric), tags(pairs), value, ts)
}
