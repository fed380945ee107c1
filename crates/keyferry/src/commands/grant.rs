//! Grant command: add the decrypter binding without the rest of the handoff

use anyhow::Result;
use camino::Utf8Path;
use keyferry_cloud::Identity;
use keyferry_handoff::steps;
use keyferry_handoff::{GrantMode, GrantResult, Journal, Stage};

use super::{load_settings, session_factory};
use crate::cli::GrantArgs;
use crate::output;

pub async fn run(args: GrantArgs, config: Option<&Utf8Path>) -> Result<()> {
    let settings = load_settings(config, &args.overrides())?;
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

    let mut journal = Journal::new();
    let grant = steps::grant_decrypter(
        &session,
        &key,
        &target.member(),
        GrantMode::from_dedupe(settings.grant.dedupe),
        &mut journal,
    )
    .await?;

    match grant.result {
        GrantResult::Appended => output::success(&format!(
            "Granted {} decrypt on {} ({} bindings)",
            target,
            key,
            grant.bindings
        )),
        GrantResult::AlreadyPresent => {
            output::info(&format!("{} can already decrypt with {}", target, key))
        }
    }

    Ok(())
}
