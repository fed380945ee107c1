//! Revoke command

use anyhow::Result;
use camino::Utf8Path;
use keyferry_cloud::Identity;
use keyferry_handoff::{steps, Stage};

use super::{load_settings, session_factory};
use crate::cli::RevokeArgs;
use crate::output;

pub async fn run(args: RevokeArgs, config: Option<&Utf8Path>) -> Result<()> {
    let settings = load_settings(config, &args.resources.overrides())?;
    let key = settings.crypto_key()?;
    let target = settings.target_principal()?;
    let factory = session_factory(&settings)?;

    let session = steps::connect(
        factory.as_ref(),
        &Identity::Ambient,
        Stage::ConnectInitial,
        Stage::ConnectInitial,
    )
    .await?;

    if steps::revoke_decrypter(&session, &key, &target.member()).await? {
        output::success(&format!("Revoked decrypt on {} for {}", key, target));
    } else {
        output::info(&format!("{} had no decrypter binding on {}", target, key));
    }

    Ok(())
}
