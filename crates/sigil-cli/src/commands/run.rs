//! `sigil run`: one full protocol session

use std::sync::Arc;

use anyhow::Result;
use clap::Args;
use sigil_backend::{backend_for_mode, Adversary, MemoryIdentityStore};
use sigil_core::{DeviceId, ExecutionMode};
use sigil_protocol::{Orchestrator, SessionRecord};
use tracing::info;

use crate::config::FileConfig;

/// Arguments for `sigil run`
#[derive(Args)]
pub struct RunArgs {
    /// Device label to authenticate
    #[arg(short, long, default_value = "Device01")]
    device: String,

    /// Execution mode override: simulator, noisy, or hardware
    #[arg(short, long)]
    mode: Option<ExecutionMode>,

    /// Wrap the channel in an adversary: eavesdrop or tamper
    #[arg(short, long)]
    attack: Option<Adversary>,

    /// Session seed for exact replay
    #[arg(short, long)]
    seed: Option<u64>,

    /// Print the full session record as one JSON line
    #[arg(long)]
    json: bool,
}

pub async fn handle(args: RunArgs, mut config: FileConfig) -> Result<()> {
    if let Some(mode) = args.mode {
        config.protocol.execution.mode = mode;
    }
    if let Some(seed) = args.seed {
        config.protocol.execution.seed = Some(seed);
    }

    let store = Arc::new(MemoryIdentityStore::with_devices(config.identities()));
    let mut backend = backend_for_mode(&config.protocol.execution)?;
    if let Some(adversary) = args.attack {
        let adversary_seed = match config.protocol.execution.seed {
            Some(seed) => seed.wrapping_add(1),
            None => rand::random(),
        };
        info!(%adversary, "wrapping channel in adversary");
        backend = adversary.wrap(backend, adversary_seed);
    }

    let orchestrator = Orchestrator::new(config.protocol, backend, store)?;
    let outcome = orchestrator.run(DeviceId::from_label(&args.device)).await?;

    if args.json {
        println!("{}", serde_json::to_string(&outcome.record)?);
    } else {
        print_summary(&outcome.record);
        if let Some(key) = &outcome.key {
            println!("established key: {} bits", key.len());
        }
    }
    Ok(())
}

/// Human-readable phase-by-phase summary; key bits never appear here
fn print_summary(record: &SessionRecord) {
    println!(
        "session {} for {}: {}",
        record.session, record.device, record.verdict
    );
    if let Some(auth) = &record.authentication {
        println!(
            "  authentication: agreement {:.4} over {} rounds ({:?})",
            auth.report.agreement, auth.report.rounds, auth.verdict
        );
    }
    if let Some(qber) = &record.key_distribution {
        println!(
            "  key distribution: QBER {:.4} on {} test bits (threshold {})",
            qber.qber, qber.test_size, qber.threshold
        );
    }
    if let Some(tamper) = &record.tamper {
        if let Some(chsh) = &tamper.chsh {
            println!(
                "  tamper check: S = {:.3} against classical bound {:.1} ({:?})",
                chsh.s, chsh.threshold, tamper.verdict
            );
        }
        if let Some(fidelity) = &tamper.fidelity {
            println!(
                "  fidelity: average {:.4} (threshold {})",
                fidelity.average, fidelity.threshold
            );
        }
    }
    if let Some(detail) = &record.abort_detail {
        println!("  abort detail: {detail}");
    }
    println!("  seed {} for replay", record.seed);
}
