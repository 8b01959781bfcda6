//! Execution backend doubles

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

use sigil_core::{BackendError, CircuitBatch, ExecutionEffects, OutcomeCounts};

/// Backend that replays a scripted sequence of responses
///
/// Each submission pops the next scripted response and records the batch
/// and shot count it was asked for. A drained script answers with the
/// configured exhaustion error, so an over-eager caller fails loudly
/// instead of hanging a test.
pub struct ScriptedBackend {
    responses: Mutex<VecDeque<Result<Vec<OutcomeCounts>, BackendError>>>,
    exhausted: BackendError,
    submissions: Mutex<Vec<(CircuitBatch, u32)>>,
}

impl ScriptedBackend {
    /// Script an exact response sequence
    pub fn new(responses: Vec<Result<Vec<OutcomeCounts>, BackendError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            exhausted: BackendError::Fault {
                reason: "scripted backend exhausted".to_string(),
            },
            submissions: Mutex::new(Vec::new()),
        }
    }

    /// Answer every submission with transient unavailability
    pub fn always_unavailable(reason: &str) -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            exhausted: BackendError::Unavailable {
                reason: reason.to_string(),
            },
            submissions: Mutex::new(Vec::new()),
        }
    }

    /// Every submission observed so far, in order
    pub fn submissions(&self) -> Vec<(CircuitBatch, u32)> {
        self.submissions.lock().clone()
    }
}

#[async_trait]
impl ExecutionEffects for ScriptedBackend {
    async fn submit(
        &self,
        batch: &CircuitBatch,
        shots: u32,
    ) -> Result<Vec<OutcomeCounts>, BackendError> {
        self.submissions.lock().push((batch.clone(), shots));
        self.responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(self.exhausted.clone()))
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// Backend that fails every submission with a fixed error
pub struct FailingBackend {
    error: BackendError,
}

impl FailingBackend {
    /// Fail with transient unavailability
    pub fn unavailable(reason: &str) -> Self {
        Self {
            error: BackendError::Unavailable {
                reason: reason.to_string(),
            },
        }
    }

    /// Fail with a fatal fault
    pub fn fault(reason: &str) -> Self {
        Self {
            error: BackendError::Fault {
                reason: reason.to_string(),
            },
        }
    }
}

#[async_trait]
impl ExecutionEffects for FailingBackend {
    async fn submit(
        &self,
        _batch: &CircuitBatch,
        _shots: u32,
    ) -> Result<Vec<OutcomeCounts>, BackendError> {
        Err(self.error.clone())
    }

    fn name(&self) -> &'static str {
        "failing"
    }
}

/// Backend that is unavailable a fixed number of times, then delegates
pub struct FlakyBackend {
    inner: Arc<dyn ExecutionEffects>,
    remaining_failures: Mutex<u32>,
}

impl FlakyBackend {
    /// Fail the first `failures` submissions, then behave like `inner`
    pub fn new(inner: Arc<dyn ExecutionEffects>, failures: u32) -> Self {
        Self {
            inner,
            remaining_failures: Mutex::new(failures),
        }
    }
}

#[async_trait]
impl ExecutionEffects for FlakyBackend {
    async fn submit(
        &self,
        batch: &CircuitBatch,
        shots: u32,
    ) -> Result<Vec<OutcomeCounts>, BackendError> {
        {
            let mut remaining = self.remaining_failures.lock();
            if *remaining > 0 {
                *remaining -= 1;
                return Err(BackendError::Unavailable {
                    reason: "transient outage".to_string(),
                });
            }
        }
        self.inner.submit(batch, shots).await
    }

    fn name(&self) -> &'static str {
        "flaky"
    }
}

/// Backend whose submissions never complete
///
/// Exists to exercise caller-side timeouts; pair it with a paused tokio
/// clock so the timeout fires without real waiting.
#[derive(Default)]
pub struct HangingBackend;

impl HangingBackend {
    /// Backend that hangs forever
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ExecutionEffects for HangingBackend {
    async fn submit(
        &self,
        _batch: &CircuitBatch,
        _shots: u32,
    ) -> Result<Vec<OutcomeCounts>, BackendError> {
        std::future::pending::<()>().await;
        unreachable!("pending future resolved")
    }

    fn name(&self) -> &'static str {
        "hanging"
    }
}
