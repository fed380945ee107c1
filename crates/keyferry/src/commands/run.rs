//! Run command: the full handoff

use anyhow::{Context, Result};
use camino::Utf8Path;
use keyferry_handoff::{GrantResult, HandoffRequest, HandoffWorkflow};
use tracing::info;

use super::{load_settings, session_factory};
use crate::cli::RunArgs;
use crate::output;

pub async fn run(args: RunArgs, config: Option<&Utf8Path>) -> Result<()> {
    let settings = load_settings(config, &args.overrides())?;
    let request = HandoffRequest::from_settings(&settings)?;
    let workflow = HandoffWorkflow::new(session_factory(&settings)?);

    let spinner = output::spinner("Handing off secret...");
    let result = workflow.run(&request).await;
    spinner.finish_and_clear();

    let outcome = match result {
        Ok(outcome) => outcome,
        Err(e) => {
            if e.is_recoverable() {
                output::warning(
                    "The grant may still be propagating; try `keyferry decrypt --as-target` shortly",
                );
            }
            return Err(e).context("Handoff failed");
        }
    };

    info!("Ciphertext: {}", outcome.ciphertext.as_str());
    match outcome.recovered.as_text() {
        Some(text) => info!("Plaintext: {}", text),
        None => info!("Plaintext: {} bytes of binary data", outcome.recovered.len()),
    }

    output::header("Handoff complete");
    output::kv("Key", &outcome.key.to_string());
    output::kv("Object", &format!("gs://{}", outcome.location));
    output::kv("Granted by", &outcome.initial_principal);
    output::kv("Decrypted by", &outcome.target_principal);
    output::kv(
        "Binding",
        match outcome.grant {
            GrantResult::Appended => "appended",
            GrantResult::AlreadyPresent => "already present",
        },
    );
    output::kv("Policy bindings", &outcome.policy_bindings.to_string());
    if outcome.propagation_attempts > 1 {
        output::kv(
            "Decrypt attempts",
            &outcome.propagation_attempts.to_string(),
        );
    }
    output::success(&format!(
        "{} bytes handed to {}",
        outcome.recovered.len(),
        outcome.target_principal
    ));

    Ok(())
}
