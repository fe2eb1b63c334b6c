//! Forwarding payloads to the chain-execution service.
//!
//! The service assigns transaction nonces per sender, so calls originating
//! from one batch must reach it strictly one at a time. [`SequentialBatch`]
//! enforces this structurally: it is advanced by `&mut self` and each step
//! awaits the backend call before returning.
//!
//! A failing item never aborts the batch. Every attempt produces an
//! [`ExecutionResult`] carrying its 1-based index and the batch total so
//! progress can be reported as the batch runs.

use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::intent::MAX_REPEAT;

/// Boxed future returned by [`ChainExecutor`] methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Name of the payload field carrying a repeat count.
pub const TIMES_FIELD: &str = "times";

/// Raw backend reply: HTTP status plus the decoded body.
///
/// `data` is the parsed JSON body, or `{"raw": "<text>"}` when the body is
/// not JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainResponse {
    /// HTTP status returned by the backend.
    pub status: u16,
    /// Response body.
    pub data: Value,
}

impl ChainResponse {
    /// Whether the backend answered with a 2xx status.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }
}

/// The backend could not be reached or its reply could not be read.
#[derive(Debug, thiserror::Error)]
#[error("chain backend unavailable: {0}")]
pub struct ExecutionError(#[source] pub Box<dyn std::error::Error + Send + Sync>);

impl ExecutionError {
    /// Wraps any error as an execution error.
    pub fn new(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self(Box::new(err))
    }
}

/// Something that executes one payload against the chain backend.
///
/// Implemented over HTTP by `omrelay-http`; tests use in-memory fakes.
pub trait ChainExecutor: Send + Sync {
    /// Executes a single payload and returns the backend's reply.
    ///
    /// Non-2xx replies are returned as `Ok`; only transport-level failures
    /// are errors.
    fn execute<'a>(&'a self, payload: &'a Value) -> BoxFuture<'a, Result<ChainResponse, ExecutionError>>;
}

impl<T: ChainExecutor + ?Sized> ChainExecutor for std::sync::Arc<T> {
    fn execute<'a>(&'a self, payload: &'a Value) -> BoxFuture<'a, Result<ChainResponse, ExecutionError>> {
        (**self).execute(payload)
    }
}

impl<T: ChainExecutor + ?Sized> ChainExecutor for &T {
    fn execute<'a>(&'a self, payload: &'a Value) -> BoxFuture<'a, Result<ChainResponse, ExecutionError>> {
        (**self).execute(payload)
    }
}

/// Outcome of one batch item.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionResult {
    /// 1-based position within the batch.
    pub index: u32,
    /// Number of items in the batch.
    pub total: u32,
    /// Backend HTTP status, absent when the backend was unreachable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    /// Backend body, `null` when the backend was unreachable.
    pub data: Value,
    /// Transport error description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExecutionResult {
    /// Whether the backend accepted this item.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_some_and(|s| (200..300).contains(&s))
    }
}

/// Summary of a finished batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchReport {
    /// Items sent to the backend.
    pub attempted: u32,
    /// Items the backend answered with 2xx.
    pub succeeded: u32,
    /// Per-item results, in execution order.
    pub results: Vec<ExecutionResult>,
}

/// Clamps a requested repeat count into `1..=MAX_REPEAT`.
#[must_use]
pub fn clamp_times(times: u64) -> u32 {
    u32::try_from(times.clamp(1, u64::from(MAX_REPEAT))).unwrap_or(1)
}

/// Removes the `times` field from an object payload and returns it.
///
/// Accepts integers and integer strings; negatives and junk count as absent.
pub fn take_times(payload: &mut Map<String, Value>) -> Option<u64> {
    let raw = payload.remove(TIMES_FIELD)?;
    match raw {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// A fixed-size run of the same payload, executed one item at a time.
#[derive(Debug, Clone)]
pub struct SequentialBatch {
    payload: Value,
    total: u32,
    next: u32,
    results: Vec<ExecutionResult>,
}

impl SequentialBatch {
    /// Builds a batch from a payload, reading and stripping its `times`
    /// field. `fallback_times` applies when the field is missing.
    #[must_use]
    pub fn from_payload(payload: Value, fallback_times: u64) -> Self {
        let mut payload = payload;
        let times = payload
            .as_object_mut()
            .and_then(take_times)
            .unwrap_or(fallback_times);
        Self::new(payload, times)
    }

    /// Builds a batch that sends `payload` `times` times (clamped).
    #[must_use]
    pub fn new(payload: Value, times: u64) -> Self {
        let total = clamp_times(times);
        Self {
            payload,
            total,
            next: 1,
            results: Vec::with_capacity(total as usize),
        }
    }

    /// Number of items this batch will execute.
    #[must_use]
    pub const fn total(&self) -> u32 {
        self.total
    }

    /// The payload forwarded to the backend for every item.
    #[must_use]
    pub const fn payload(&self) -> &Value {
        &self.payload
    }

    /// Index of the item the next [`step`](Self::step) will execute.
    #[must_use]
    pub const fn next_index(&self) -> Option<u32> {
        if self.next <= self.total {
            Some(self.next)
        } else {
            None
        }
    }

    /// Executes the next item and waits for it to finish.
    ///
    /// Returns `None` once every item has run.
    pub async fn step<E: ChainExecutor + ?Sized>(&mut self, executor: &E) -> Option<ExecutionResult> {
        let index = self.next_index()?;
        let result = match executor.execute(&self.payload).await {
            Ok(response) => ExecutionResult {
                index,
                total: self.total,
                status: Some(response.status),
                data: response.data,
                error: None,
            },
            Err(err) => ExecutionResult {
                index,
                total: self.total,
                status: None,
                data: Value::Null,
                error: Some(err.to_string()),
            },
        };
        #[cfg(feature = "telemetry")]
        {
            if result.is_success() {
                tracing::debug!(index, total = self.total, status = ?result.status, "batch item executed");
            } else {
                tracing::warn!(
                    index,
                    total = self.total,
                    status = ?result.status,
                    error = ?result.error,
                    "batch item failed"
                );
            }
        }
        self.next += 1;
        self.results.push(result.clone());
        Some(result)
    }

    /// Runs every remaining item in order.
    pub async fn run<E: ChainExecutor + ?Sized>(mut self, executor: &E) -> BatchReport {
        while self.step(executor).await.is_some() {}
        self.into_report()
    }

    /// Summarizes the items executed so far.
    #[must_use]
    pub fn into_report(self) -> BatchReport {
        let succeeded = self.results.iter().filter(|r| r.is_success()).count();
        BatchReport {
            attempted: u32::try_from(self.results.len()).unwrap_or(u32::MAX),
            succeeded: u32::try_from(succeeded).unwrap_or(u32::MAX),
            results: self.results,
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory executors shared by the crate's tests.

    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Records every payload and fails the items whose 1-based call number is
    /// listed in `fail_on`.
    #[derive(Debug, Default)]
    pub(crate) struct RecordingExecutor {
        pub calls: Mutex<Vec<Value>>,
        pub in_flight: AtomicUsize,
        pub max_in_flight: AtomicUsize,
        pub fail_on: Vec<usize>,
        pub unreachable_on: Vec<usize>,
    }

    impl RecordingExecutor {
        pub(crate) fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[derive(Debug, thiserror::Error)]
    #[error("connection refused")]
    struct Refused;

    impl ChainExecutor for RecordingExecutor {
        fn execute<'a>(
            &'a self,
            payload: &'a Value,
        ) -> BoxFuture<'a, Result<ChainResponse, ExecutionError>> {
            Box::pin(async move {
                let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                self.max_in_flight.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(1)).await;
                let n = {
                    let mut calls = self.calls.lock().unwrap();
                    calls.push(payload.clone());
                    calls.len()
                };
                self.in_flight.fetch_sub(1, Ordering::SeqCst);
                if self.unreachable_on.contains(&n) {
                    return Err(ExecutionError::new(Refused));
                }
                let status = if self.fail_on.contains(&n) { 500 } else { 200 };
                Ok(ChainResponse {
                    status,
                    data: serde_json::json!({ "call": n }),
                })
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::RecordingExecutor;
    use super::*;
    use serde_json::json;
    use std::sync::atomic::Ordering;

    #[test]
    fn test_clamp_times() {
        assert_eq!(clamp_times(0), 1);
        assert_eq!(clamp_times(1), 1);
        assert_eq!(clamp_times(50), 50);
        assert_eq!(clamp_times(100), 50);
        assert_eq!(clamp_times(u64::MAX), 50);
    }

    #[test]
    fn test_times_stripped_from_payload() {
        let batch = SequentialBatch::from_payload(json!({"to": "0xabc", "times": 3}), 1);
        assert_eq!(batch.total(), 3);
        assert_eq!(batch.payload(), &json!({"to": "0xabc"}));

        let batch = SequentialBatch::from_payload(json!({"times": "7"}), 1);
        assert_eq!(batch.total(), 7);

        let batch = SequentialBatch::from_payload(json!({"times": -2}), 4);
        assert_eq!(batch.total(), 4);
        assert_eq!(batch.payload(), &json!({}));

        let batch = SequentialBatch::from_payload(json!({"a": 1}), 2);
        assert_eq!(batch.total(), 2);
    }

    #[tokio::test]
    async fn test_batch_capped_and_sequential() {
        let executor = RecordingExecutor::default();
        let mut batch = SequentialBatch::from_payload(json!({"times": 100}), 1);
        assert_eq!(batch.total(), 50);

        let mut indices = Vec::new();
        while let Some(expected) = batch.next_index() {
            let result = batch.step(&executor).await.unwrap();
            assert_eq!(result.index, expected);
            assert_eq!(result.total, 50);
            indices.push(result.index);
        }
        assert_eq!(indices, (1..=50).collect::<Vec<_>>());
        assert_eq!(executor.call_count(), 50);
        assert_eq!(executor.max_in_flight.load(Ordering::SeqCst), 1);
        assert!(batch.step(&executor).await.is_none());
    }

    #[tokio::test]
    async fn test_failures_do_not_abort() {
        let executor = RecordingExecutor {
            fail_on: vec![2],
            unreachable_on: vec![3],
            ..Default::default()
        };
        let report = SequentialBatch::new(json!({"op": "x"}), 4).run(&executor).await;
        assert_eq!(report.attempted, 4);
        assert_eq!(report.succeeded, 2);
        assert_eq!(report.results[1].status, Some(500));
        assert_eq!(report.results[2].status, None);
        assert_eq!(
            report.results[2].error.as_deref(),
            Some("chain backend unavailable: connection refused")
        );
        assert!(report.results[3].is_success());
    }

    #[test]
    fn test_response_success_range() {
        let ok = ChainResponse { status: 204, data: Value::Null };
        let bad = ChainResponse { status: 302, data: Value::Null };
        assert!(ok.is_success());
        assert!(!bad.is_success());
    }
}
