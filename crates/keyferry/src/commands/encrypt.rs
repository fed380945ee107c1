//! Encrypt command: stages 1, 2, 6 and 7 without touching the key policy

use anyhow::Result;
use camino::Utf8Path;
use keyferry_cloud::Identity;
use keyferry_handoff::{steps, Journal, Stage};
use tracing::info;

use super::{load_settings, session_factory};
use crate::cli::EncryptArgs;
use crate::output;

pub async fn run(args: EncryptArgs, config: Option<&Utf8Path>) -> Result<()> {
    let settings = load_settings(config, &args.resources.overrides())?;
    let key = settings.crypto_key()?;
    let location = settings.object_location()?;
    let factory = session_factory(&settings)?;

    let secret = steps::read_secret(&settings.secret_file).await?;
    let session = steps::connect(
        factory.as_ref(),
        &Identity::Ambient,
        Stage::ConnectInitial,
        Stage::ConnectInitial,
    )
    .await?;

    let ciphertext = steps::encrypt_secret(&session, &key, &secret).await?;
    drop(secret);

    let mut journal = Journal::new();
    steps::store_ciphertext(&session, &location, &ciphertext, &mut journal).await?;

    info!("Ciphertext: {}", ciphertext.as_str());
    output::success(&format!(
        "Encrypted {} with {} into gs://{}",
        settings.secret_file, key, location
    ));

    Ok(())
}
