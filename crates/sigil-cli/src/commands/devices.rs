//! `sigil devices`: print the device registry

use anyhow::Result;

use crate::config::FileConfig;

pub fn handle(config: &FileConfig) -> Result<()> {
    for identity in config.identities() {
        println!(
            "{:<12} serial {:<16} fingerprint {}",
            identity.label,
            identity.serial,
            identity.fingerprint()
        );
    }
    Ok(())
}
