//! CLI argument parsing with clap

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use keyferry_core::ConfigOverrides;

/// keyferry - hand a KMS-encrypted secret to a service account
#[derive(Parser, Debug)]
#[command(name = "keyferry")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only print errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to keyferry.yaml config file
    #[arg(short, long, global = true, env = "KEYFERRY_CONFIG")]
    pub config: Option<Utf8PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Encrypt, grant, store, then decrypt as the target service account
    Run(RunArgs),

    /// Add the decrypter binding for the target service account
    Grant(GrantArgs),

    /// Remove the target service account's decrypter binding
    Revoke(RevokeArgs),

    /// Encrypt the secret file and store the ciphertext
    Encrypt(EncryptArgs),

    /// Fetch the stored ciphertext and decrypt it
    Decrypt(DecryptArgs),

    /// Configuration management
    #[command(subcommand)]
    Config(ConfigCommands),
}

/// Resource names shared by every workflow command
#[derive(Args, Debug, Default, Clone)]
pub struct ResourceArgs {
    /// Project owning the key ring
    #[arg(long, env = "KEYFERRY_PROJECT_ID")]
    pub project_id: Option<String>,

    /// Location of the key ring
    #[arg(long, env = "KEYFERRY_LOCATION_ID")]
    pub location_id: Option<String>,

    #[arg(long, env = "KEYFERRY_KEY_RING_ID")]
    pub key_ring_id: Option<String>,

    #[arg(long, env = "KEYFERRY_CRYPTO_KEY_ID")]
    pub crypto_key_id: Option<String>,

    /// Bucket holding the ciphertext
    #[arg(long, env = "KEYFERRY_BUCKET")]
    pub bucket: Option<String>,

    /// Object name of the ciphertext
    #[arg(long, env = "KEYFERRY_OBJECT")]
    pub object: Option<String>,

    /// Local file holding the plaintext secret
    #[arg(long, env = "KEYFERRY_SECRET_FILE")]
    pub secret_file: Option<Utf8PathBuf>,

    /// Service account granted the decrypter role
    #[arg(long, env = "KEYFERRY_TARGET_SERVICE_ACCOUNT")]
    pub target_service_account: Option<String>,

    /// Key file used to act as the target service account
    #[arg(long, env = "KEYFERRY_TARGET_KEY_FILE")]
    pub target_key_file: Option<Utf8PathBuf>,

    /// Cloud KMS endpoint (for emulators)
    #[arg(long, env = "KEYFERRY_KMS_ENDPOINT", hide_short_help = true)]
    pub kms_endpoint: Option<String>,

    /// Cloud Storage endpoint (for emulators)
    #[arg(long, env = "KEYFERRY_STORAGE_ENDPOINT", hide_short_help = true)]
    pub storage_endpoint: Option<String>,
}

impl ResourceArgs {
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            project_id: self.project_id.clone(),
            location_id: self.location_id.clone(),
            key_ring_id: self.key_ring_id.clone(),
            crypto_key_id: self.crypto_key_id.clone(),
            bucket: self.bucket.clone(),
            object: self.object.clone(),
            secret_file: self.secret_file.clone(),
            target_service_account: self.target_service_account.clone(),
            target_key_file: self.target_key_file.clone(),
            kms_endpoint: self.kms_endpoint.clone(),
            storage_endpoint: self.storage_endpoint.clone(),
            ..Default::default()
        }
    }
}

#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub resources: ResourceArgs,

    /// Skip the binding when the target already holds the decrypter role
    #[arg(long)]
    pub dedupe_binding: bool,

    /// Remove the binding and delete the object if a later stage fails
    #[arg(long)]
    pub compensate_on_failure: bool,

    /// Decrypt attempts while waiting for the grant to take effect
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    pub propagation_attempts: Option<u32>,
}

impl RunArgs {
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            propagation_attempts: self.propagation_attempts,
            dedupe_binding: self.dedupe_binding,
            compensate_on_failure: self.compensate_on_failure,
            ..self.resources.overrides()
        }
    }
}

#[derive(Args, Debug)]
pub struct GrantArgs {
    #[command(flatten)]
    pub resources: ResourceArgs,

    /// Skip the binding when the target already holds the decrypter role
    #[arg(long)]
    pub dedupe_binding: bool,
}

impl GrantArgs {
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            dedupe_binding: self.dedupe_binding,
            ..self.resources.overrides()
        }
    }
}

#[derive(Args, Debug)]
pub struct RevokeArgs {
    #[command(flatten)]
    pub resources: ResourceArgs,
}

#[derive(Args, Debug)]
pub struct EncryptArgs {
    #[command(flatten)]
    pub resources: ResourceArgs,
}

#[derive(Args, Debug)]
pub struct DecryptArgs {
    #[command(flatten)]
    pub resources: ResourceArgs,

    /// Act as this service-account key file instead of ambient credentials
    #[arg(long)]
    pub key_file: Option<Utf8PathBuf>,

    /// Act as the configured target service account
    #[arg(long, conflicts_with = "key_file")]
    pub as_target: bool,

    /// Decrypt attempts while waiting for a grant to take effect
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    pub propagation_attempts: Option<u32>,

    /// Write the plaintext to a file instead of the log
    #[arg(short, long)]
    pub output: Option<Utf8PathBuf>,
}

impl DecryptArgs {
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            propagation_attempts: self.propagation_attempts,
            ..self.resources.overrides()
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Write a keyferry.yaml with the built-in defaults
    Init(ConfigInitArgs),

    /// Show the resolved configuration
    Show(ConfigShowArgs),
}

#[derive(Args, Debug)]
pub struct ConfigInitArgs {
    /// Output file
    #[arg(short, long, default_value = "keyferry.yaml")]
    pub output: Utf8PathBuf,

    /// Overwrite an existing file
    #[arg(short, long)]
    pub force: bool,
}

#[derive(Args, Debug)]
pub struct ConfigShowArgs {
    #[command(flatten)]
    pub resources: ResourceArgs,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8Path;
    use clap::CommandFactory;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).unwrap()
    }

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_flags_map_to_overrides() {
        let cli = parse(&[
            "keyferry",
            "run",
            "--project-id",
            "p",
            "--crypto-key-id",
            "k1",
            "--bucket",
            "b1",
            "--target-key-file",
            "target.json",
            "--dedupe-binding",
            "--propagation-attempts",
            "3",
        ]);

        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        let overrides = args.overrides();
        assert_eq!(overrides.project_id.as_deref(), Some("p"));
        assert_eq!(overrides.crypto_key_id.as_deref(), Some("k1"));
        assert_eq!(overrides.bucket.as_deref(), Some("b1"));
        assert_eq!(overrides.target_key_file.as_deref(), Some(Utf8Path::new("target.json")));
        assert_eq!(overrides.propagation_attempts, Some(3));
        assert!(overrides.dedupe_binding);
        assert!(!overrides.compensate_on_failure);
        assert!(overrides.location_id.is_none());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = parse(&["keyferry", "grant", "-vv", "-c", "other.yaml"]);
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.config.as_deref(), Some(Utf8Path::new("other.yaml")));
        assert!(matches!(cli.command, Commands::Grant(_)));
    }

    #[test]
    fn test_zero_propagation_attempts_rejected() {
        assert!(Cli::try_parse_from(["keyferry", "run", "--propagation-attempts", "0"]).is_err());
    }

    #[test]
    fn test_decrypt_identity_flags_conflict() {
        assert!(Cli::try_parse_from([
            "keyferry",
            "decrypt",
            "--key-file",
            "a.json",
            "--as-target"
        ])
        .is_err());

        let cli = parse(&["keyferry", "decrypt", "--key-file", "a.json", "-o", "out.txt"]);
        let Commands::Decrypt(args) = cli.command else {
            panic!("expected decrypt");
        };
        assert_eq!(args.key_file.as_deref(), Some(Utf8Path::new("a.json")));
        assert_eq!(args.output.as_deref(), Some(Utf8Path::new("out.txt")));
    }

    #[test]
    fn test_config_init_defaults() {
        let cli = parse(&["keyferry", "config", "init"]);
        let Commands::Config(ConfigCommands::Init(args)) = cli.command else {
            panic!("expected config init");
        };
        assert_eq!(args.output, "keyferry.yaml");
        assert!(!args.force);
    }
}
