//! SiteSentry: malware scanning and remediation for web installations.
//!
//! This is the main entry point for the CLI application.

use sitesentry::core::config::Config;
use sitesentry::core::error::Result;
use sitesentry::core::types::ScanStatus;
use sitesentry::integrity::{CoreIntegrityChecker, HttpManifestSource, ManifestSource};
use sitesentry::quarantine::QuarantineVault;
use sitesentry::scanner::{CoreRepairContext, RemediationOrchestrator};
use sitesentry::store::Store;
use sitesentry::ui::cli::{Cli, Commands, ConfigAction, OutputFormat, QuarantineAction};
use sitesentry::utils::logging::{init_logging, LogConfig};
use std::path::PathBuf;
use std::process::ExitCode;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse_args();

    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::load_or_default(),
    };
    config.validate()?;

    let log_config = if cli.verbose {
        LogConfig::verbose()
    } else {
        LogConfig::from_config(&config)
    };
    init_logging(log_config)?;

    log::debug!("sitesentry v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Some(Commands::Scan {
            path,
            resume,
            no_action,
        }) => run_scan(config, path, resume, no_action, cli.format),
        Some(Commands::Quarantine { action }) => run_quarantine(&config, action, cli.format),
        Some(Commands::Verify { repair, version }) => run_verify(&config, repair, version),
        Some(Commands::History { limit }) => run_history(limit, cli.format),
        Some(Commands::Config { action }) => run_config(action, &mut config),
        None => {
            println!("SiteSentry - Malware Scanning and Remediation");
            println!();
            println!("Use --help for usage information");
            println!();
            println!("Quick start:");
            println!("  sitesentry scan              Scan the configured roots");
            println!("  sitesentry scan --resume     Continue a paused run");
            println!("  sitesentry quarantine list   View quarantined files");
            println!("  sitesentry verify            Check core file integrity");
            Ok(())
        }
    }
}

fn open_store() -> Result<Store> {
    Store::open(&Config::data_dir().join("sitesentry.db"))
}

/// Load the core manifest for the configured version, if reachable.
/// Scans proceed without repair capability when the network is down.
fn core_repair_context(config: &Config, store: &Store) -> Option<CoreRepairContext> {
    let version = config.integrity.platform_version.as_str();
    if version.is_empty() {
        log::debug!("no platform_version configured, core repair disabled");
        return None;
    }
    let cache_key = format!("core_manifest:{}", version);

    let source: Box<dyn ManifestSource> = Box::new(HttpManifestSource::new(&config.integrity));
    let checker = CoreIntegrityChecker::new(source);

    let manifest = match store.get(&cache_key) {
        Ok(Some(manifest)) => manifest,
        _ => match checker.load_manifest(version) {
            Ok(manifest) => {
                if let Err(e) = store.set(&cache_key, &manifest) {
                    log::debug!("manifest cache write failed: {}", e);
                }
                manifest
            }
            Err(e) => {
                log::warn!("core manifest unavailable, repair disabled: {}", e);
                return None;
            }
        },
    };

    Some(CoreRepairContext { checker, manifest })
}

fn run_scan(
    mut config: Config,
    path: Option<Vec<PathBuf>>,
    resume: bool,
    no_action: bool,
    format: OutputFormat,
) -> Result<()> {
    if let Some(paths) = path {
        config.scan.roots = paths;
    }
    if no_action {
        config.scan.quarantine_on_detect = false;
    }

    let store = open_store()?;
    let vault = QuarantineVault::open(&config.quarantine)?;
    let core = core_repair_context(&config, &store);

    let mut orchestrator = RemediationOrchestrator::new(config, vault, store);
    if let Some(core) = core {
        orchestrator = orchestrator.with_core_repair(core);
    }

    let run = if resume {
        orchestrator.resume()?
    } else {
        orchestrator.run()?
    };

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&run)?),
        OutputFormat::Text => {
            println!("Run {} {}", run.id, run.status);
            println!("  files checked:  {}", run.summary.files_checked);
            println!("  files skipped:  {}", run.summary.files_skipped);
            println!("  bytes scanned:  {}", run.summary.bytes_scanned);
            println!("  threats found:  {}", run.summary.threats_found);
            println!("  quarantined:    {}", run.summary.quarantined_count);
            println!("  errors:         {}", run.summary.errors);
            if run.status == ScanStatus::Paused {
                println!();
                println!("Run paused on a resource budget; rerun with --resume.");
            }
        }
    }
    Ok(())
}

fn run_quarantine(config: &Config, action: QuarantineAction, format: OutputFormat) -> Result<()> {
    let vault = QuarantineVault::open(&config.quarantine)?;

    match action {
        QuarantineAction::List => {
            let records = vault.list()?;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&records)?),
                OutputFormat::Text => {
                    if records.is_empty() {
                        println!("No quarantined files.");
                    }
                    for record in records {
                        println!(
                            "{}  {}  {}  {}",
                            record.id,
                            record.quarantined_at.format("%Y-%m-%d %H:%M"),
                            record.threat_type,
                            record.original_path.display()
                        );
                    }
                }
            }
        }
        QuarantineAction::Restore { id } => {
            let record = vault.restore(&id)?;
            println!("Restored {} to {}", id, record.original_path.display());
        }
        QuarantineAction::Delete { id } => {
            vault.delete(&id)?;
            println!("Deleted quarantine record {}", id);
        }
        QuarantineAction::Stats => {
            let stats = vault.stats()?;
            println!("Quarantined files: {}", stats.record_count);
            println!("Vault size:        {} bytes", stats.total_size);
        }
        QuarantineAction::Prune => {
            let removed = vault.cleanup_expired()?;
            println!("Removed {} expired record(s)", removed);
        }
    }
    Ok(())
}

fn run_verify(config: &Config, repair: bool, version: Option<String>) -> Result<()> {
    use sitesentry::core::error::Error;

    let version = version
        .or_else(|| {
            Some(config.integrity.platform_version.clone()).filter(|v| !v.is_empty())
        })
        .ok_or_else(|| Error::ConfigInvalid {
            field: "integrity.platform_version".to_string(),
            message: "not configured; pass --version".to_string(),
        })?;

    let source: Box<dyn ManifestSource> = Box::new(HttpManifestSource::new(&config.integrity));
    let checker = CoreIntegrityChecker::new(source);
    let manifest = checker.load_manifest(&version)?;
    println!(
        "Verifying {} core file(s) for version {}",
        manifest.len(),
        version
    );

    let mut total = 0usize;
    for root in &config.scan.roots {
        let findings = checker.verify(&manifest, root)?;
        for finding in &findings {
            println!(
                "{}  {}  {}",
                finding.finding_type,
                finding.file_path.display(),
                finding.evidence
            );
        }
        if repair {
            for finding in &findings {
                if let Ok(rel) = finding.file_path.strip_prefix(root) {
                    let rel = rel.to_string_lossy().replace('\\', "/");
                    if manifest.contains(&rel) {
                        checker.repair(&manifest, root, &rel)?;
                        println!("repaired {}", finding.file_path.display());
                    }
                }
            }
        }
        total += findings.len();
    }

    if total == 0 {
        println!("All core files match the manifest.");
    }
    Ok(())
}

fn run_history(limit: usize, format: OutputFormat) -> Result<()> {
    let store = open_store()?;
    let runs = store.list_runs(limit)?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&runs)?),
        OutputFormat::Text => {
            if runs.is_empty() {
                println!("No scan runs recorded.");
            }
            for run in runs {
                println!(
                    "{}  {}  {}  checked {}  threats {}",
                    run.id,
                    run.started_at.format("%Y-%m-%d %H:%M"),
                    run.status,
                    run.summary.files_checked,
                    run.summary.threats_found
                );
            }
        }
    }
    Ok(())
}

fn run_config(action: ConfigAction, config: &mut Config) -> Result<()> {
    match action {
        ConfigAction::Show => {
            println!("{}", serde_json::to_string_pretty(config)?);
        }
        ConfigAction::Init => {
            let path = Config::default_config_path();
            Config::default().save(&path)?;
            println!("Wrote default configuration to {}", path.display());
        }
        ConfigAction::Path => {
            println!("{}", Config::default_config_path().display());
        }
    }
    Ok(())
}
