//! AdES Signer CLI
//!
//! Command-line interface for validating signed documents and extending their
//! signatures to higher baseline levels, with configuration support.

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use miette::{Context, IntoDiagnostic, Result};
use std::path::{Path, PathBuf};

use ades_signer::{
    domain::verification::{ConstraintStatus, TokenReport},
    infra::config::{load_policy, ConfigFormat, ConfigManager, ExtensionConfiguration},
    services::FieldLockRule,
    ExtendWorkflow, ExtensionMode, SignatureLevel, SignedDocument, ValidateWorkflow,
    ValidationPolicy, VerificationReport,
};

#[derive(Parser)]
#[command(name = "ades-signer")]
#[command(about = "Baseline level extension and validation of CAdES / XAdES signatures")]
#[command(long_about = "
AdES Signer - raise signatures to B-T, B-LT and B-LTA and validate them

Documents are exchanged as JSON (the output of the container decoder).

EXAMPLES:
    # Validate a document now
    ades-signer validate contract.json

    # Validate as of a past instant with a custom policy
    ades-signer validate contract.json --at 2020-01-01T00:00:00Z --policy policy.toml

    # Add a signature timestamp
    ades-signer extend contract.json --target t -o contract-t.json

    # Go straight to LTA, producing every intermediate level
    ades-signer extend contract.json --target lta --cascade --sources chain.json

LEVELS:
    b   = signature only
    t   = signature timestamp
    lt  = + certificate and revocation values
    lta = + archive timestamp

ENVIRONMENT VARIABLES:
    RUST_LOG        Logging level (debug, info, warn, error)
")]
#[command(version)]
struct Cli {
    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate every signature and timestamp of a document
    Validate {
        /// Signed document (JSON)
        #[arg(value_name = "INPUT_FILE")]
        input_file: PathBuf,

        /// Validation policy file (TOML or JSON), overrides config
        #[arg(short, long)]
        policy: Option<PathBuf>,

        /// Validation data consulted for missing revocation information
        #[arg(short, long)]
        sources: Option<PathBuf>,

        /// Field locks and the fields modified after each signature (JSON list)
        #[arg(long)]
        field_locks: Option<PathBuf>,

        /// Evaluation instant (RFC 3339), defaults to now
        #[arg(long, value_parser = parse_instant)]
        at: Option<DateTime<Utc>>,

        /// Print the full report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Extend signatures to a target baseline level
    Extend {
        /// Signed document (JSON)
        #[arg(value_name = "INPUT_FILE")]
        input_file: PathBuf,

        /// Target level
        #[arg(short, long, value_enum)]
        target: LevelArg,

        /// Output file (defaults to overwriting input file)
        #[arg(short, long, value_name = "OUTPUT_FILE")]
        output: Option<PathBuf>,

        /// Produce every missing intermediate level
        #[arg(long)]
        cascade: bool,

        /// Re-produce the target level even when already reached
        #[arg(long)]
        refresh: bool,

        /// Only extend these signatures (repeatable)
        #[arg(long = "signature", value_name = "ID")]
        signatures: Vec<String>,

        /// Certificates and revocation data for LT/LTA (JSON)
        #[arg(short, long)]
        sources: Option<PathBuf>,

        /// Use the local timestamp source instead of the configured TSAs
        #[arg(long)]
        offline_tsa: bool,

        /// Timestamp server URL (overrides config)
        #[arg(long, value_name = "URL")]
        timestamp_url: Option<String>,

        /// Dry run - extend but do not write the result
        #[arg(long)]
        dry_run: bool,
    },

    /// Configuration management
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show current configuration
    Show,

    /// Create default configuration file
    Init,

    /// Set a configuration value
    Set {
        /// Configuration key
        key: String,
        /// Configuration value
        value: String,
    },

    /// Export configuration
    Export {
        /// Export format
        #[arg(short, long, value_enum, default_value = "toml")]
        format: ExportFormatArg,
        /// Output file (defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(ValueEnum, Clone, Copy)]
enum LevelArg {
    B,
    T,
    Lt,
    Lta,
}

impl From<LevelArg> for SignatureLevel {
    fn from(arg: LevelArg) -> Self {
        match arg {
            LevelArg::B => SignatureLevel::B,
            LevelArg::T => SignatureLevel::T,
            LevelArg::Lt => SignatureLevel::Lt,
            LevelArg::Lta => SignatureLevel::Lta,
        }
    }
}

#[derive(ValueEnum, Clone)]
enum ExportFormatArg {
    Toml,
    Json,
}

impl From<ExportFormatArg> for ConfigFormat {
    fn from(arg: ExportFormatArg) -> Self {
        match arg {
            ExportFormatArg::Toml => ConfigFormat::Toml,
            ExportFormatArg::Json => ConfigFormat::Json,
        }
    }
}

/// Parameters for the extend command
struct ExtendCommandArgs {
    input_file: PathBuf,
    target: LevelArg,
    output: Option<PathBuf>,
    cascade: bool,
    refresh: bool,
    signatures: Vec<String>,
    sources: Option<PathBuf>,
    offline_tsa: bool,
    timestamp_url: Option<String>,
    dry_run: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    match cli.command {
        Commands::Validate {
            input_file,
            policy,
            sources,
            field_locks,
            at,
            json,
        } => handle_validate_command(&input_file, policy, sources, field_locks, at, json),

        Commands::Extend {
            input_file,
            target,
            output,
            cascade,
            refresh,
            signatures,
            sources,
            offline_tsa,
            timestamp_url,
            dry_run,
        } => handle_extend_command(ExtendCommandArgs {
            input_file,
            target,
            output,
            cascade,
            refresh,
            signatures,
            sources,
            offline_tsa,
            timestamp_url,
            dry_run,
        }),

        Commands::Config(config_cmd) => handle_config_command(config_cmd),
    }
}

fn parse_instant(value: &str) -> std::result::Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| format!("expected an RFC 3339 instant: {e}"))
}

fn read_document(path: &Path) -> Result<SignedDocument> {
    let json = std::fs::read_to_string(path)
        .into_diagnostic()
        .with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(SignedDocument::from_json(&json)?)
}

/// Stored configuration when present, defaults otherwise.
fn current_configuration() -> Result<ExtensionConfiguration> {
    let manager = ConfigManager::new()?;
    if manager.config_path().exists() {
        Ok(manager.load()?)
    } else {
        Ok(ExtensionConfiguration::default())
    }
}

fn resolve_policy(
    explicit: Option<PathBuf>,
    config: &ExtensionConfiguration,
) -> Result<ValidationPolicy> {
    match explicit {
        Some(path) => Ok(load_policy(&path)?),
        None => Ok(config.policy()?),
    }
}

fn handle_validate_command(
    input_file: &Path,
    policy: Option<PathBuf>,
    sources: Option<PathBuf>,
    field_locks: Option<PathBuf>,
    at: Option<DateTime<Utc>>,
    json: bool,
) -> Result<()> {
    let document = read_document(input_file)?;
    let config = current_configuration()?;
    let mut workflow = ValidateWorkflow::new(resolve_policy(policy, &config)?);
    if let Some(path) = sources {
        workflow = workflow.with_sources_file(&path)?;
    }
    if let Some(path) = field_locks {
        let content = std::fs::read_to_string(&path)
            .into_diagnostic()
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let rules: Vec<FieldLockRule> = serde_json::from_str(&content)
            .into_diagnostic()
            .context("Invalid field lock list")?;
        workflow = workflow.with_field_locks(rules);
    }

    let report = workflow.run(&document, at)?;
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).into_diagnostic()?
        );
    } else {
        print_report(&report);
    }

    if report.success() {
        Ok(())
    } else {
        Err(miette::miette!(
            "Validation of '{}' failed",
            report.document
        ))
    }
}

fn print_report(report: &VerificationReport) {
    println!(
        "📄 {} (evaluated at {})",
        report.document,
        report.evaluated_at.to_rfc3339()
    );
    for signature in &report.signatures {
        let mark = if signature.is_ok() { "✅" } else { "❌" };
        println!(
            "{mark} {} [{}] {:?}",
            signature.signature_id, signature.profile, signature.acceptance.chain.indication
        );
        print_failures("   ", &signature.acceptance);
        for timestamp in &signature.timestamps {
            println!(
                "   🕒 {} {:?}",
                timestamp.token_id, timestamp.chain.indication
            );
            print_failures("      ", timestamp);
        }
        for check in &signature.certificates {
            if check.status != ConstraintStatus::Ok {
                println!(
                    "   ⚠️  {}: {}",
                    check.name,
                    check.message.as_deref().unwrap_or("no detail")
                );
            }
        }
    }
}

fn print_failures(indent: &str, token: &TokenReport) {
    for result in token
        .chain
        .results
        .iter()
        .filter(|r| r.status != ConstraintStatus::Ok)
    {
        println!(
            "{indent}{} {}: {}",
            result.status,
            result.name,
            result.message.as_deref().unwrap_or("no detail")
        );
    }
}

fn handle_extend_command(args: ExtendCommandArgs) -> Result<()> {
    let document = read_document(&args.input_file)?;

    let mut config = current_configuration()?;
    if let Some(url) = &args.timestamp_url {
        config.primary_timestamp_server = url.clone();
    }

    let mut params = config.to_parameters(args.target.into())?;
    if args.cascade {
        params = params.with_mode(ExtensionMode::Cascade);
    }
    if args.refresh {
        params = params.refreshing();
    }
    if !args.signatures.is_empty() {
        params = params.only(args.signatures.clone());
    }

    let mut workflow = if args.offline_tsa {
        ExtendWorkflow::offline(config.policy()?, None)
    } else {
        ExtendWorkflow::from_config(&config)?
    };
    if let Some(path) = &args.sources {
        workflow = workflow.with_sources_file(path)?;
    }

    let extended = workflow.run(&document, &params)?;
    for signature in &extended.signatures {
        println!(
            "✍️  {} is now {}",
            signature.id,
            signature.form.profile_name(signature.level())
        );
    }

    if args.dry_run {
        println!("🔍 Dry run - result not written");
        return Ok(());
    }

    let output_path = args.output.unwrap_or(args.input_file);
    std::fs::write(&output_path, extended.to_json()?)
        .into_diagnostic()
        .with_context(|| format!("Failed to write {}", output_path.display()))?;
    println!("💾 Written to {}", output_path.display());
    Ok(())
}

fn handle_config_command(config_cmd: ConfigCommands) -> Result<()> {
    let config_manager = ConfigManager::new()?;

    match config_cmd {
        ConfigCommands::Show => match config_manager.load() {
            Ok(config) => {
                println!("📋 Current Configuration:");
                println!(
                    "  Signature timestamp digest: {}",
                    config.signature_timestamp_digest
                );
                println!(
                    "  Archive timestamp digest: {}",
                    config.archive_timestamp_digest
                );
                println!(
                    "  Primary timestamp server: {}",
                    config.primary_timestamp_server
                );
                println!(
                    "  Fallback servers: {}",
                    config.fallback_timestamp_servers.len()
                );
                println!("  Extension mode: {:?}", config.extension_mode);
                if let Some(policy) = &config.policy_file {
                    println!("  Policy file: {}", policy.display());
                }
                println!(
                    "  Configuration file: {}",
                    config_manager.config_path().display()
                );
            }
            Err(_) => {
                println!("📋 No configuration file found. Use 'config init' to create one.");
            }
        },

        ConfigCommands::Init => {
            config_manager.save(&ExtensionConfiguration::default())?;
            println!(
                "✅ Default configuration written to {}",
                config_manager.config_path().display()
            );
        }

        ConfigCommands::Set { key, value } => {
            config_manager.update_value(&key, &value)?;
            println!("✅ {key} updated");
        }

        ConfigCommands::Export { format, output } => {
            let exported = config_manager.export_config(format.into())?;
            match output {
                Some(path) => {
                    std::fs::write(&path, exported)
                        .into_diagnostic()
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    println!("✅ Configuration exported to {}", path.display());
                }
                None => println!("{exported}"),
            }
        }
    }

    Ok(())
}
