//! End-to-end protocol sessions against the analytic simulator
//!
//! Every scenario runs the full orchestrated pipeline: identity lookup,
//! challenge-response authentication, BB84 key distribution, and the CHSH
//! tamper check, with seeded randomness throughout so each run is exact.

use std::sync::Arc;

use sigil_backend::{
    backend_for_mode, EntanglementBreakAttack, InterceptResendAttack, MemoryIdentityStore,
    SimulatorBackend,
};
use sigil_core::{DeviceId, ExecutionEffects, ExecutionMode, ProtocolConfig};
use sigil_protocol::{AbortReason, Orchestrator, SecurityVerdict, SessionOutcome, Verdict};
use sigil_testkit::demo_identities;

const ROUNDS: usize = 64;

fn scenario_config(seed: u64) -> ProtocolConfig {
    let mut config = ProtocolConfig::default();
    config.execution.seed = Some(seed);
    // Trimmed sample sizes keep the suite quick; every margin stays wide.
    config.authentication.rounds = ROUNDS;
    config.bb84.key_length = 64;
    config.entanglement.trials = 20;
    config.entanglement.shots = 1024;
    config
}

fn registry() -> Arc<MemoryIdentityStore> {
    Arc::new(MemoryIdentityStore::with_devices(demo_identities(ROUNDS)))
}

fn device() -> DeviceId {
    DeviceId::from_label("Device01")
}

async fn run_with(config: ProtocolConfig, backend: Arc<dyn ExecutionEffects>) -> SessionOutcome {
    let orchestrator = Orchestrator::new(config, backend, registry()).unwrap();
    orchestrator.run(device()).await.unwrap()
}

#[tokio::test]
async fn test_honest_simulator_session_is_secure() {
    let config = scenario_config(9);
    let backend = Arc::new(SimulatorBackend::ideal_seeded(9));
    let outcome = run_with(config, backend).await;

    assert_eq!(outcome.record.verdict, SecurityVerdict::Secure);
    let key = outcome.key.expect("secure session delivers a key");
    assert_eq!(key.len(), 64);
    assert_eq!(outcome.record.final_key_bits, Some(64));

    let auth = outcome.record.authentication.expect("auth phase ran");
    assert_eq!(auth.verdict, Verdict::Accepted);
    assert!((auth.report.agreement - 1.0).abs() < 1e-12);

    let qber = outcome.record.key_distribution.expect("qkd phase ran");
    assert!(qber.within_threshold);
    assert!((qber.qber - 0.0).abs() < 1e-12);

    let tamper = outcome.record.tamper.expect("tamper phase ran");
    assert_eq!(tamper.verdict, Verdict::Accepted);
    let chsh = tamper.chsh.expect("chsh statistic computed");
    assert!(chsh.s > 2.7, "S = {}", chsh.s);
    assert!(chsh.interval.expect("bootstrap ran").lower > 2.0);
    let fidelity = tamper.fidelity.expect("fidelity computed");
    assert!(fidelity.average > 0.99);

    assert_eq!(outcome.record.label.as_deref(), Some("Device01"));
    assert_eq!(outcome.record.challenge_counter, Some(1));
    assert_eq!(outcome.record.backend, "simulator");
    assert_eq!(outcome.record.seed, 9);
    assert!(outcome.record.timings.authentication_ms.is_some());
    assert!(outcome.record.timings.key_distribution_ms.is_some());
    assert!(outcome.record.timings.tamper_check_ms.is_some());
    assert!(outcome.record.abort_detail.is_none());
}

#[tokio::test]
async fn test_noisy_mode_still_completes_secure() {
    let mut config = scenario_config(17);
    config.execution.mode = ExecutionMode::Noisy;
    let backend = backend_for_mode(&config.execution).unwrap();
    let outcome = run_with(config, backend).await;

    assert_eq!(outcome.record.verdict, SecurityVerdict::Secure);
    assert_eq!(outcome.record.mode, ExecutionMode::Noisy);
    assert_eq!(outcome.record.backend, "noisy-simulator");

    // Depolarizing 0.03 and readout 0.01 shave the statistic but leave the
    // decision margins intact.
    let tamper = outcome.record.tamper.unwrap();
    let chsh = tamper.chsh.unwrap();
    assert!(chsh.s > 2.4 && chsh.s < 2.83, "S = {}", chsh.s);
    let fidelity = tamper.fidelity.unwrap();
    assert!(fidelity.average > 0.9 && fidelity.average < 1.0);

    let qber = outcome.record.key_distribution.unwrap();
    assert!(qber.qber < 0.11);
}

#[tokio::test]
async fn test_full_interception_fails_authentication() {
    let config = scenario_config(11);
    let inner = Arc::new(SimulatorBackend::ideal_seeded(11));
    let backend = Arc::new(InterceptResendAttack::new(inner, 12));
    let outcome = run_with(config, backend).await;

    assert_eq!(
        outcome.record.verdict,
        SecurityVerdict::Aborted(AbortReason::AuthFailed)
    );
    assert!(outcome.key.is_none());
    assert!(outcome.record.final_key_bits.is_none());

    // Eve's wrong-basis interceptions randomize a quarter of the rounds.
    let auth = outcome.record.authentication.expect("auth phase ran");
    assert_eq!(auth.verdict, Verdict::Rejected);
    assert!(auth.report.agreement < 0.95, "agreement {}", auth.report.agreement);
    assert!(auth.report.agreement > 0.5);

    // Later phases never ran.
    assert!(outcome.record.key_distribution.is_none());
    assert!(outcome.record.tamper.is_none());
    assert_eq!(outcome.record.backend, "intercept-resend");
}

#[tokio::test]
async fn test_late_eavesdropper_is_caught_by_the_qber() {
    let config = scenario_config(13);
    let inner = Arc::new(SimulatorBackend::ideal_seeded(13));
    // Eve joins after the challenge rounds, so authentication sees a clean
    // channel and the error surfaces in key distribution.
    let backend = Arc::new(InterceptResendAttack::new(inner, 14).skipping(ROUNDS));
    let outcome = run_with(config, backend).await;

    assert_eq!(
        outcome.record.verdict,
        SecurityVerdict::Aborted(AbortReason::ChannelInsecure)
    );
    let auth = outcome.record.authentication.expect("auth phase ran");
    assert_eq!(auth.verdict, Verdict::Accepted);

    let qber = outcome.record.key_distribution.expect("qkd phase ran");
    assert!(!qber.within_threshold);
    assert!(qber.qber > 0.13, "QBER {}", qber.qber);
    assert!(outcome.key.is_none());
    assert!(outcome.record.tamper.is_none());
}

#[tokio::test]
async fn test_entanglement_break_is_rejected_at_completion() {
    let config = scenario_config(19);
    let inner = Arc::new(SimulatorBackend::ideal_seeded(19));
    let backend = Arc::new(EntanglementBreakAttack::new(inner, 20));
    let outcome = run_with(config, backend).await;

    // The attack leaves transmissions alone, so the session runs to
    // completion and the verdict, not an abort, withholds the key.
    assert_eq!(outcome.record.verdict, SecurityVerdict::Rejected);
    assert!(outcome.key.is_none());
    assert!(outcome.record.final_key_bits.is_none());

    assert_eq!(
        outcome.record.authentication.unwrap().verdict,
        Verdict::Accepted
    );
    assert!(outcome.record.key_distribution.unwrap().within_threshold);

    let tamper = outcome.record.tamper.expect("tamper phase ran");
    assert_eq!(tamper.verdict, Verdict::Rejected);
    let chsh = tamper.chsh.expect("chsh statistic computed");
    assert!(chsh.s < 2.0, "S = {}", chsh.s);
    assert!((chsh.s - std::f64::consts::SQRT_2).abs() < 0.1);
    assert!(!chsh.violates_classical_bound);
    let fidelity = tamper.fidelity.expect("fidelity computed");
    assert!((fidelity.average - 0.75).abs() < 0.03);
    assert!(!fidelity.meets_threshold);
}

#[tokio::test]
async fn test_unknown_device_aborts_before_any_phase() {
    let config = scenario_config(23);
    let backend = Arc::new(SimulatorBackend::ideal_seeded(23));
    let orchestrator =
        Orchestrator::new(config, backend, Arc::new(MemoryIdentityStore::new())).unwrap();
    let outcome = orchestrator
        .run(DeviceId::from_label("not-registered"))
        .await
        .unwrap();

    assert_eq!(
        outcome.record.verdict,
        SecurityVerdict::Aborted(AbortReason::UnknownDevice)
    );
    assert!(outcome.record.label.is_none());
    assert!(outcome.record.authentication.is_none());
    assert!(outcome.record.key_distribution.is_none());
    assert!(outcome.record.tamper.is_none());
    assert!(outcome.record.timings.authentication_ms.is_none());
    assert!(outcome.key.is_none());
}

#[tokio::test]
async fn test_seeded_sessions_replay_identically() {
    let first = run_with(
        scenario_config(31),
        Arc::new(SimulatorBackend::ideal_seeded(31)),
    )
    .await;
    let second = run_with(
        scenario_config(31),
        Arc::new(SimulatorBackend::ideal_seeded(31)),
    )
    .await;

    assert_eq!(first.record.verdict, SecurityVerdict::Secure);
    assert_eq!(first.key, second.key);
    assert_eq!(
        first.record.key_distribution.unwrap(),
        second.record.key_distribution.unwrap()
    );
    assert_eq!(
        first.record.tamper.unwrap().chsh.unwrap().s,
        second.record.tamper.unwrap().chsh.unwrap().s
    );
}
