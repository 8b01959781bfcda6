//! `sigil monitor`: repeated tamper sweeps over a standing channel
//!
//! Runs the CHSH check on its own, without authentication or key
//! distribution, for watching an already-established channel degrade.

use anyhow::Result;
use clap::Args;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use sigil_backend::{backend_for_mode, Adversary};
use sigil_core::{ExecutionEffects, ExecutionMode};
use sigil_protocol::{TamperEngine, TamperVerdict};

use crate::config::FileConfig;

/// Arguments for `sigil monitor`
#[derive(Args)]
pub struct MonitorArgs {
    /// Number of sweeps to run
    #[arg(short, long, default_value = "10")]
    rounds: usize,

    /// Execution mode override: simulator, noisy, or hardware
    #[arg(short, long)]
    mode: Option<ExecutionMode>,

    /// Wrap the channel in an adversary: eavesdrop or tamper
    #[arg(short, long)]
    attack: Option<Adversary>,

    /// Base seed; sweep `i` uses `seed + i` for its bootstrap
    #[arg(short, long)]
    seed: Option<u64>,

    /// Emit one JSON line per sweep
    #[arg(long)]
    json: bool,
}

pub async fn handle(args: MonitorArgs, mut config: FileConfig) -> Result<()> {
    if let Some(mode) = args.mode {
        config.protocol.execution.mode = mode;
    }
    if let Some(seed) = args.seed {
        config.protocol.execution.seed = Some(seed);
    }
    let base_seed = config
        .protocol
        .execution
        .seed
        .unwrap_or_else(rand::random);

    let mut backend = backend_for_mode(&config.protocol.execution)?;
    if let Some(adversary) = args.attack {
        backend = adversary.wrap(backend, base_seed.wrapping_add(1));
    }

    let engine = TamperEngine::new(&config.protocol);
    let shots = config.protocol.entanglement.shots;
    for sweep in 0..args.rounds {
        let mut rng = ChaCha8Rng::seed_from_u64(base_seed.wrapping_add(sweep as u64));
        let plan = engine.plan();
        let outcomes = backend.submit(&plan.batch, shots).await?;
        let verdict = engine.evaluate(&plan, &outcomes, &mut rng)?;
        report(sweep, &verdict, args.json)?;
    }
    Ok(())
}

fn report(sweep: usize, verdict: &TamperVerdict, json: bool) -> Result<()> {
    if json {
        let line = serde_json::json!({
            "sweep": sweep,
            "verdict": verdict.verdict,
            "s": verdict.chsh.as_ref().map(|chsh| chsh.s),
            "fidelity": verdict.fidelity.as_ref().map(|fidelity| fidelity.average),
        });
        println!("{line}");
        return Ok(());
    }

    let s = verdict
        .chsh
        .as_ref()
        .map_or_else(|| "n/a".to_string(), |chsh| format!("{:.3}", chsh.s));
    let fidelity = verdict.fidelity.as_ref().map_or_else(
        || "n/a".to_string(),
        |fidelity| format!("{:.4}", fidelity.average),
    );
    println!(
        "sweep {sweep}: S = {s}, fidelity {fidelity} ({:?})",
        verdict.verdict
    );
    Ok(())
}
