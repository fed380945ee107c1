//! Decrypt command: stages 10 to 12 as any identity

use anyhow::{Context, Result};
use camino::Utf8Path;
use keyferry_cloud::Identity;
use keyferry_handoff::{steps, Stage};
use tracing::info;

use super::{load_settings, session_factory};
use crate::cli::DecryptArgs;
use crate::output;

pub async fn run(args: DecryptArgs, config: Option<&Utf8Path>) -> Result<()> {
    let settings = load_settings(config, &args.overrides())?;
    let key = settings.crypto_key()?;
    let location = settings.object_location()?;
    let factory = session_factory(&settings)?;

    let identity = match (&args.key_file, args.as_target) {
        (Some(path), _) => Identity::ServiceAccountKey(path.clone().into_std_path_buf()),
        (None, true) => {
            Identity::ServiceAccountKey(settings.target.key_file.clone().into_std_path_buf())
        }
        (None, false) => Identity::Ambient,
    };
    let (connect_stage, auth_stage) = match identity {
        Identity::Ambient => (Stage::ConnectInitial, Stage::ConnectInitial),
        Identity::ServiceAccountKey(_) => (Stage::SwitchIdentity, Stage::ConnectTarget),
    };

    let session = steps::connect(factory.as_ref(), &identity, connect_stage, auth_stage).await?;
    let ciphertext = steps::fetch_ciphertext(&session, &location).await?;
    let recovered =
        steps::decrypt_secret(&session, &key, &ciphertext, &settings.propagation).await?;

    match &args.output {
        Some(path) => {
            tokio::fs::write(path, recovered.secret.expose())
                .await
                .with_context(|| format!("Failed to write plaintext to {}", path))?;
            output::success(&format!(
                "Wrote {} bytes to {}",
                recovered.secret.len(),
                path
            ));
        }
        None => {
            match recovered.secret.as_text() {
                Some(text) => info!("Plaintext: {}", text),
                None => info!("Plaintext: {} bytes of binary data", recovered.secret.len()),
            }
            output::success(&format!(
                "{} decrypted gs://{}",
                session.principal(),
                location
            ));
        }
    }

    Ok(())
}
