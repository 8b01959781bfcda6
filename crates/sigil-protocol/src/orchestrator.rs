//! Session orchestration
//!
//! The orchestrator owns phase sequencing: it resolves the device identity,
//! runs authentication, key distribution, and the tamper check in order, and
//! drives the [`Session`] state machine to exactly one terminal phase. The
//! phase engines stay pure; everything effectful (identity lookup, circuit
//! submission, retries, timeouts) lives here, behind the effect traits.
//!
//! Every run produces a [`SessionRecord`], including rejected and aborted
//! runs. Statistical rejections are verdicts, not errors: `run` returns
//! `Err` only when an internal invariant breaks.

use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use sigil_core::{
    BackendError, CircuitBatch, DeviceId, DeviceIdentity, ExecutionEffects, IdentityEffects,
    IdentityError, OutcomeCounts, ProtocolConfig, Result, SigilError,
};

use crate::auth::{AuthenticationEngine, AuthenticationVerdict};
use crate::bb84::{KeyDistributionEngine, KeyMaterial, QberReport, QkdVerdict};
use crate::record::{PhaseTimings, SessionRecord};
use crate::session::{AbortReason, CompletionStatus, Session, SessionPhase};
use crate::tamper::{TamperEngine, TamperVerdict};

/// Everything one orchestrated session produced
#[derive(Debug)]
pub struct SessionOutcome {
    /// Audit record, produced on every path
    pub record: SessionRecord,
    /// Delivered key, present only on secure completion
    pub key: Option<KeyMaterial>,
}

/// Drives the three protocol phases against injected backends
pub struct Orchestrator {
    config: ProtocolConfig,
    backend: Arc<dyn ExecutionEffects>,
    identity: Arc<dyn IdentityEffects>,
}

impl Orchestrator {
    /// Build an orchestrator over validated configuration
    pub fn new(
        config: ProtocolConfig,
        backend: Arc<dyn ExecutionEffects>,
        identity: Arc<dyn IdentityEffects>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            backend,
            identity,
        })
    }

    /// Run one full session for a device
    ///
    /// The session seed comes from configuration when set, otherwise it is
    /// drawn fresh; either way the record carries it, so any run can be
    /// replayed.
    pub async fn run(&self, device: DeviceId) -> Result<SessionOutcome> {
        let seed = match self.config.execution.seed {
            Some(seed) => seed,
            None => rand::thread_rng().next_u64(),
        };
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut session = Session::new(device);
        let mut draft = Draft::new(self.backend.name(), seed);
        info!(
            session = %session.id(),
            device = %device,
            mode = %self.config.execution.mode,
            seed,
            "session opened"
        );

        let identity = match self.identity.lookup(device).await {
            Ok(identity) => identity,
            Err(IdentityError::NotFound { .. }) => {
                warn!(device = %device, "device is not registered");
                session.advance(SessionPhase::Aborted(AbortReason::UnknownDevice))?;
                return draft.finish(&self.config, &session, None);
            }
            Err(error) => {
                draft.abort_detail = Some(error.to_string());
                session.advance(SessionPhase::Aborted(AbortReason::BackendError))?;
                return draft.finish(&self.config, &session, None);
            }
        };
        draft.label = Some(identity.label.clone());
        draft.fingerprint = Some(identity.fingerprint());
        draft.challenge_counter = Some(identity.challenge_counter);

        session.advance(SessionPhase::Authenticating)?;
        let phase_started = Instant::now();
        let auth = match self.authentication_phase(&identity).await {
            Ok(verdict) => verdict,
            Err(error) => return self.abort(session, draft, error),
        };
        draft.timings.authentication_ms = Some(elapsed_ms(phase_started));
        let authenticated = auth.verdict.is_accepted();
        draft.authentication = Some(auth);
        if !authenticated {
            warn!(session = %session.id(), "challenge-response agreement below the acceptance bound");
            session.advance(SessionPhase::Aborted(AbortReason::AuthFailed))?;
            return draft.finish(&self.config, &session, None);
        }

        session.advance(SessionPhase::KeyDistributing)?;
        let phase_started = Instant::now();
        let qkd = match self.key_distribution_phase(&mut rng).await {
            Ok(verdict) => verdict,
            Err(error) => return self.abort(session, draft, error),
        };
        draft.timings.key_distribution_ms = Some(elapsed_ms(phase_started));
        draft.key_distribution = Some(qkd.report.clone());
        if !qkd.verdict.is_accepted() {
            warn!(
                session = %session.id(),
                qber = qkd.report.qber,
                threshold = qkd.report.threshold,
                "QBER at or above threshold"
            );
            session.advance(SessionPhase::Aborted(AbortReason::ChannelInsecure))?;
            return draft.finish(&self.config, &session, None);
        }
        let key = qkd
            .key
            .ok_or_else(|| SigilError::internal("accepted key distribution delivered no key"))?;

        session.advance(SessionPhase::TamperChecking)?;
        let phase_started = Instant::now();
        let tamper = match self.tamper_phase(&mut rng).await {
            Ok(verdict) => verdict,
            Err(error) => return self.abort(session, draft, error),
        };
        draft.timings.tamper_check_ms = Some(elapsed_ms(phase_started));
        let secure = tamper.verdict.is_accepted();
        draft.tamper = Some(tamper);
        let status = if secure {
            CompletionStatus::Secure
        } else {
            CompletionStatus::Rejected
        };
        session.advance(SessionPhase::Complete(status))?;
        draft.finish(&self.config, &session, secure.then_some(key))
    }

    async fn authentication_phase(&self, identity: &DeviceIdentity) -> Result<AuthenticationVerdict> {
        let engine = AuthenticationEngine::new(&self.config);
        let plan = engine.plan(identity)?;
        let outcomes = self
            .submit_with_retry(&plan.batch, self.config.authentication.shots)
            .await?;
        engine.evaluate(identity, &outcomes)
    }

    async fn key_distribution_phase(&self, rng: &mut ChaCha8Rng) -> Result<QkdVerdict> {
        let engine = KeyDistributionEngine::new(&self.config);
        let plan = engine.plan(rng);
        let outcomes = self
            .submit_with_retry(&plan.batch, self.config.bb84.shots)
            .await?;
        engine.evaluate(&plan, &outcomes, rng)
    }

    async fn tamper_phase(&self, rng: &mut ChaCha8Rng) -> Result<TamperVerdict> {
        let engine = TamperEngine::new(&self.config);
        let plan = engine.plan();
        let outcomes = self
            .submit_with_retry(&plan.batch, self.config.entanglement.shots)
            .await?;
        engine.evaluate(&plan, &outcomes, rng)
    }

    /// Submit a batch in jobs of at most `max_job_circuits` circuits
    async fn submit_with_retry(
        &self,
        batch: &CircuitBatch,
        shots: u32,
    ) -> Result<Vec<OutcomeCounts>> {
        let mut results = Vec::with_capacity(batch.len());
        for chunk in batch.circuits.chunks(self.config.execution.max_job_circuits) {
            let job = CircuitBatch::new(chunk.to_vec());
            let outcomes = self.submit_job(&job, shots).await?;
            if outcomes.len() != job.len() {
                return Err(SigilError::backend_fault(format!(
                    "backend returned {} histograms for a {}-circuit job",
                    outcomes.len(),
                    job.len()
                )));
            }
            results.extend(outcomes);
        }
        Ok(results)
    }

    /// Submit one job, retrying transient unavailability with backoff
    ///
    /// Timeouts and faults are fatal on first occurrence; only
    /// [`BackendError::Unavailable`] is retried, up to `max_retries` times.
    async fn submit_job(&self, job: &CircuitBatch, shots: u32) -> Result<Vec<OutcomeCounts>> {
        let timeout = Duration::from_millis(self.config.execution.timeout_ms);
        let mut attempt = 0u32;
        loop {
            match tokio::time::timeout(timeout, self.backend.submit(job, shots)).await {
                Err(_) => {
                    return Err(SigilError::backend_fault(format!(
                        "backend call exceeded {} ms",
                        self.config.execution.timeout_ms
                    )));
                }
                Ok(Ok(outcomes)) => {
                    debug!(circuits = job.len(), shots, "job executed");
                    return Ok(outcomes);
                }
                Ok(Err(BackendError::Unavailable { reason }))
                    if attempt < self.config.execution.max_retries =>
                {
                    let delay = Duration::from_millis(
                        self.config
                            .execution
                            .retry_base_ms
                            .saturating_mul(1u64 << attempt.min(20)),
                    );
                    warn!(
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        reason = %reason,
                        "backend unavailable; backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Ok(Err(error)) => return Err(error.into()),
            }
        }
    }

    fn abort(
        &self,
        mut session: Session,
        mut draft: Draft,
        error: SigilError,
    ) -> Result<SessionOutcome> {
        warn!(session = %session.id(), error = %error, "aborting session");
        draft.abort_detail = Some(error.to_string());
        session.advance(SessionPhase::Aborted(AbortReason::BackendError))?;
        draft.finish(&self.config, &session, None)
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

/// Record fields accumulated while the session runs
struct Draft {
    label: Option<String>,
    fingerprint: Option<String>,
    challenge_counter: Option<u64>,
    backend: String,
    seed: u64,
    timings: PhaseTimings,
    authentication: Option<AuthenticationVerdict>,
    key_distribution: Option<QberReport>,
    tamper: Option<TamperVerdict>,
    abort_detail: Option<String>,
}

impl Draft {
    fn new(backend: &str, seed: u64) -> Self {
        Self {
            label: None,
            fingerprint: None,
            challenge_counter: None,
            backend: backend.to_string(),
            seed,
            timings: PhaseTimings::default(),
            authentication: None,
            key_distribution: None,
            tamper: None,
            abort_detail: None,
        }
    }

    /// Seal the draft into the final record; the session must be terminal
    fn finish(
        mut self,
        config: &ProtocolConfig,
        session: &Session,
        key: Option<KeyMaterial>,
    ) -> Result<SessionOutcome> {
        let verdict = session
            .verdict()
            .ok_or_else(|| SigilError::internal("finishing a session that is not terminal"))?;
        let finished_at = session
            .finished_at()
            .ok_or_else(|| SigilError::internal("terminal session has no finish timestamp"))?;
        self.timings.total_ms =
            (finished_at - session.started_at()).num_milliseconds().max(0) as u64;
        let record = SessionRecord {
            session: session.id(),
            device: session.device(),
            label: self.label,
            fingerprint: self.fingerprint,
            challenge_counter: self.challenge_counter,
            mode: config.execution.mode,
            backend: self.backend,
            seed: self.seed,
            started_at: session.started_at(),
            finished_at,
            verdict,
            timings: self.timings,
            authentication: self.authentication,
            key_distribution: self.key_distribution,
            final_key_bits: key.as_ref().map(KeyMaterial::len),
            tamper: self.tamper,
            abort_detail: self.abort_detail,
        };
        info!(
            session = %record.session,
            verdict = %record.verdict,
            total_ms = record.timings.total_ms,
            "session finished"
        );
        Ok(SessionOutcome { record, key })
    }
}
