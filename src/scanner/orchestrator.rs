//! Batch-stepped scan and remediation driver.
//!
//! One orchestrator invocation owns the installation-wide run lock and
//! advances a run batch by batch: walk, analyze, remediate, persist,
//! then consult the governor. When a budget is exceeded the run pauses
//! with a cursor instead of failing, and a later invocation resumes it
//! with fresh budgets.

use crate::core::config::Config;
use crate::core::error::Result;
use crate::core::types::{Finding, FindingType, ScanRun, Severity};
use crate::detection::{ContentAnalyzer, PatternLibrary};
use crate::governor::{BudgetStatus, ResourceGovernor, ResourceUsage};
use crate::integrity::{CoreIntegrityChecker, CoreManifest, ManifestSource};
use crate::quarantine::{QuarantineRecord, QuarantineVault};
use crate::scanner::walker::FileWalker;
use crate::store::Store;
use chrono::Duration as ChronoDuration;
use std::path::Path;
use std::time::Instant;

use crate::detection::analyzer::AnalysisOutcome;

/// Observable engine state, updated as the current invocation moves
/// through its batch loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnginePhase {
    Idle,
    Walking,
    Analyzing,
    Remediating,
}

/// Receives engine events as they happen. The default sink logs.
pub trait NotificationSink {
    fn on_finding(&self, finding: &Finding) {
        log::warn!(
            "{}: {} ({}) {}",
            finding.file_path.display(),
            finding.finding_type,
            finding.severity,
            finding.evidence
        );
    }

    fn on_quarantined(&self, record: &QuarantineRecord) {
        log::info!(
            "quarantined {} as {}",
            record.original_path.display(),
            record.id
        );
    }

    fn on_run_finished(&self, run: &ScanRun) {
        log::info!(
            "run {} {}: {} checked, {} threats, {} quarantined",
            run.id,
            run.status,
            run.summary.files_checked,
            run.summary.threats_found,
            run.summary.quarantined_count
        );
    }
}

/// Sink that only logs, via the trait defaults.
pub struct LogSink;

impl NotificationSink for LogSink {}

/// Core repair capability handed to the orchestrator: the checker plus
/// the already-loaded manifest for the installed version.
pub struct CoreRepairContext {
    pub checker: CoreIntegrityChecker<Box<dyn ManifestSource>>,
    pub manifest: CoreManifest,
}

/// Drives scan runs to completion or pause.
pub struct RemediationOrchestrator {
    config: Config,
    walker: FileWalker,
    analyzer: ContentAnalyzer,
    governor: ResourceGovernor,
    vault: QuarantineVault,
    store: Store,
    core: Option<CoreRepairContext>,
    sink: Box<dyn NotificationSink>,
    holder: String,
    phase: EnginePhase,
}

impl RemediationOrchestrator {
    pub fn new(config: Config, vault: QuarantineVault, store: Store) -> Self {
        let walker = FileWalker::new(&config.scan);
        let governor = ResourceGovernor::new(config.budget.clone());
        let analyzer = ContentAnalyzer::new(
            PatternLibrary::builtin().with_entropy_threshold(config.detection.entropy_threshold),
            config.budget.max_file_size_bytes,
            &config.detection,
        );
        Self {
            config,
            walker,
            analyzer,
            governor,
            vault,
            store,
            core: None,
            sink: Box::new(LogSink),
            holder: uuid::Uuid::new_v4().to_string(),
            phase: EnginePhase::Idle,
        }
    }

    /// Enable core-file repair during remediation.
    pub fn with_core_repair(mut self, core: CoreRepairContext) -> Self {
        self.core = Some(core);
        self
    }

    /// Replace the default logging sink.
    pub fn with_sink(mut self, sink: Box<dyn NotificationSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn phase(&self) -> EnginePhase {
        self.phase
    }

    fn lock_ttl(&self) -> ChronoDuration {
        // A holder that has not renewed within two full time budgets is
        // dead; its lock may be reclaimed.
        ChronoDuration::seconds((self.config.budget.time_ceiling_secs as i64 * 2).max(300))
    }

    /// Start a new run. Fails if another invocation holds a live lock.
    pub fn run(&mut self) -> Result<ScanRun> {
        self.store.acquire_run_lock(&self.holder, self.lock_ttl())?;
        let mut run = ScanRun::new(
            self.config.scan.roots.clone(),
            self.config.scan.extensions.clone(),
        );
        log::info!("starting scan run {}", run.id);
        self.store.save_run(&run)?;
        self.execute(&mut run)
    }

    /// Resume the most recent resumable run, if any; otherwise start
    /// anew. Holding the lock means no live invocation exists, so a
    /// run still marked running was stranded by a crash and is picked
    /// up from its persisted cursor rather than restarted.
    pub fn resume(&mut self) -> Result<ScanRun> {
        self.store.acquire_run_lock(&self.holder, self.lock_ttl())?;
        match self.store.latest_resumable_run()? {
            Some(mut run) => {
                if run.status == crate::core::types::ScanStatus::Running {
                    log::warn!("run {} was stranded mid-invocation, resuming it", run.id);
                }
                log::info!(
                    "resuming run {} after {}",
                    run.id,
                    run.cursor.as_deref().unwrap_or("<start>")
                );
                run.resume();
                self.store.save_run(&run)?;
                self.execute(&mut run)
            }
            None => {
                self.store.release_run_lock(&self.holder)?;
                self.run()
            }
        }
    }

    /// Drive the batch loop, then settle the run. Budgets are per
    /// invocation: a resumed run gets fresh time, memory, and file
    /// allowances. Any batch error marks the run Failed and releases
    /// the lock before propagating.
    fn execute(&mut self, run: &mut ScanRun) -> Result<ScanRun> {
        let outcome = match self.drive(run) {
            Ok(outcome) => outcome,
            Err(e) => {
                self.phase = EnginePhase::Idle;
                log::error!("run {} failed: {}", run.id, e);
                run.fail();
                if let Err(save_err) = self.store.save_run(run) {
                    log::error!("could not persist failed run: {}", save_err);
                }
                if let Err(lock_err) = self.store.release_run_lock(&self.holder) {
                    log::error!("could not release run lock: {}", lock_err);
                }
                self.sink.on_run_finished(run);
                return Err(e);
            }
        };

        self.phase = EnginePhase::Idle;
        match outcome {
            Done => {
                run.complete();
            }
            Pause(kind) => {
                log::warn!("{} budget exceeded, pausing run {}", kind, run.id);
                let cursor = run.cursor.clone().unwrap_or_default();
                run.pause(cursor);
            }
        }
        self.store.save_run(run)?;
        self.store.release_run_lock(&self.holder)?;
        self.sink.on_run_finished(run);
        Ok(run.clone())
    }

    fn drive(&mut self, run: &mut ScanRun) -> Result<LoopOutcome> {
        let started = Instant::now();
        let mut invocation_files: u64 = 0;

        loop {
            let usage = ResourceUsage::sample(started.elapsed(), invocation_files);
            match self.governor.check_budget(&usage) {
                BudgetStatus::Exceeded(kind) => {
                    return Ok(Pause(kind));
                }
                BudgetStatus::Warning(kind) => {
                    log::info!("approaching {} budget, continuing", kind);
                }
                BudgetStatus::Ok => {}
            }

            let headroom = self
                .config
                .budget
                .max_files_per_run
                .saturating_sub(invocation_files) as usize;
            let batch_size = self.governor.optimal_batch_size(&usage).min(headroom.max(1));

            self.phase = EnginePhase::Walking;
            let batch = self
                .walker
                .next_batch(run.cursor.as_deref(), batch_size)?;

            if batch.files.is_empty() {
                return Ok(Done);
            }

            self.process_batch(run, &batch.files)?;
            invocation_files += batch.files.len() as u64;
            run.cursor = batch
                .files
                .last()
                .map(|p| p.to_string_lossy().to_string());

            self.store.save_run(run)?;
            self.store.renew_run_lock(&self.holder)?;

            if batch.exhausted {
                return Ok(Done);
            }
        }
    }

    fn process_batch(&mut self, run: &mut ScanRun, files: &[std::path::PathBuf]) -> Result<()> {
        self.phase = EnginePhase::Analyzing;
        let mut batch_findings: Vec<Finding> = Vec::new();

        for path in files {
            let size = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);

            match self.analyzer.analyze(path) {
                Ok(AnalysisOutcome::Findings(findings)) => {
                    run.summary.files_checked += 1;
                    run.summary.bytes_scanned += size;
                    for finding in &findings {
                        self.sink.on_finding(finding);
                        if finding.finding_type != FindingType::AnalysisError {
                            run.summary.threats_found += 1;
                        }
                    }
                    batch_findings.extend(findings);
                }
                Ok(AnalysisOutcome::Skipped(reason)) => {
                    log::debug!("skipped {}: {}", path.display(), reason);
                    run.summary.files_skipped += 1;
                }
                Err(e) => {
                    log::warn!("analysis failed for {}: {}", path.display(), e);
                    run.summary.errors += 1;
                    let finding = Finding::new(
                        path,
                        FindingType::AnalysisError,
                        Severity::Low,
                        e.to_string(),
                    );
                    self.sink.on_finding(&finding);
                    batch_findings.push(finding);
                }
            }
        }

        self.phase = EnginePhase::Remediating;
        if self.config.scan.quarantine_on_detect {
            self.remediate(run, &batch_findings);
        }

        self.store.add_findings(&run.id, &batch_findings)?;
        Ok(())
    }

    /// Quarantine files with actionable findings; core files are
    /// repaired in place instead of being removed.
    fn remediate(&mut self, run: &mut ScanRun, findings: &[Finding]) {
        let mut handled: Vec<&Path> = Vec::new();

        for finding in findings.iter().filter(|f| f.is_actionable()) {
            let path = finding.file_path.as_path();
            if handled.contains(&path) {
                continue;
            }
            handled.push(path);

            if let Some(rel) = self.core_rel_path(path) {
                self.repair_core(run, path, &rel);
                continue;
            }

            match self.vault.quarantine(path, finding.finding_type.as_str()) {
                Ok(record) => {
                    run.summary.quarantined_count += 1;
                    self.sink.on_quarantined(&record);
                }
                Err(e) => {
                    log::error!("quarantine failed for {}: {}", path.display(), e);
                    run.summary.errors += 1;
                }
            }
        }
    }

    fn core_rel_path(&self, path: &Path) -> Option<String> {
        let core = self.core.as_ref()?;
        for root in &self.config.scan.roots {
            if let Ok(rel) = path.strip_prefix(root) {
                let rel = rel.to_string_lossy().replace('\\', "/");
                if core.manifest.contains(&rel) {
                    return Some(rel);
                }
            }
        }
        None
    }

    fn repair_core(&mut self, run: &mut ScanRun, path: &Path, rel: &str) {
        let core = match self.core.as_ref() {
            Some(c) => c,
            None => return,
        };
        let root = match self.config.scan.roots.iter().find(|r| path.starts_with(r)) {
            Some(r) => r.clone(),
            None => return,
        };
        match core.checker.repair(&core.manifest, &root, rel) {
            Ok(()) => {
                log::info!("repaired infected core file {}", path.display());
            }
            Err(e) => {
                log::error!("core repair failed for {}: {}", path.display(), e);
                run.summary.errors += 1;
            }
        }
    }
}

// Loop outcome marker, local to execute().
enum LoopOutcome {
    Done,
    Pause(crate::core::error::ResourceKind),
}
use LoopOutcome::{Done, Pause};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::{BudgetConfig, Config};
    use crate::core::error::Error;
    use crate::utils::hash::ContentHasher;
    use std::collections::BTreeMap;
    use std::fs;
    use std::path::PathBuf;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    const CLEAN_PHP: &[u8] = b"<?php\nfunction greet($name) {\n    return \"Hello, $name\";\n}\n";
    const INFECTED_PHP: &[u8] = b"<?php eval(base64_decode($_POST['payload'])); ?>";

    fn test_config(site: &Path, vault: &Path) -> Config {
        let mut config = Config::default();
        config.scan.roots = vec![site.to_path_buf()];
        config.scan.exclude_paths = vec![];
        config.quarantine.vault_path = Some(vault.to_path_buf());
        config.budget = BudgetConfig {
            memory_ceiling_bytes: u64::MAX,
            time_ceiling_secs: 3600,
            max_files_per_run: 10_000,
            max_file_size_bytes: 5 * 1024 * 1024,
            warning_fraction: 0.8,
        };
        config
    }

    fn build(config: &Config) -> RemediationOrchestrator {
        let vault = QuarantineVault::open(&config.quarantine).unwrap();
        let store = Store::in_memory().unwrap();
        RemediationOrchestrator::new(config.clone(), vault, store)
    }

    fn seed_site(site: &Path, clean: usize, infected: &[&str]) {
        for i in 0..clean {
            fs::write(site.join(format!("clean{:02}.php", i)), CLEAN_PHP).unwrap();
        }
        for name in infected {
            fs::write(site.join(name), INFECTED_PHP).unwrap();
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        findings: Arc<Mutex<Vec<PathBuf>>>,
    }

    impl NotificationSink for RecordingSink {
        fn on_finding(&self, finding: &Finding) {
            self.findings.lock().unwrap().push(finding.file_path.clone());
        }
    }

    #[test]
    fn test_full_run_quarantines_infections() {
        let site = TempDir::new().unwrap();
        let vault_dir = TempDir::new().unwrap();
        // Ten files: one backdoor, one zero-byte dropper remnant, eight clean.
        seed_site(site.path(), 8, &["bad.php"]);
        fs::write(site.path().join("empty.php"), b"").unwrap();

        let config = test_config(site.path(), vault_dir.path());
        let mut orchestrator = build(&config);

        let run = orchestrator.run().unwrap();
        assert_eq!(run.status, crate::core::types::ScanStatus::Completed);
        assert_eq!(run.summary.files_checked, 10);
        assert_eq!(run.summary.quarantined_count, 2);
        assert_eq!(run.summary.threats_found, 2);

        // Originals removed, vault holds both.
        assert!(!site.path().join("bad.php").exists());
        assert!(!site.path().join("empty.php").exists());
        assert_eq!(orchestrator.vault.list().unwrap().len(), 2);

        // Findings persisted under the run.
        let stored = orchestrator.store.findings_for_run(&run.id).unwrap();
        assert!(!stored.is_empty());
    }

    #[test]
    fn test_time_budget_pause_persists_cursor() {
        let site = TempDir::new().unwrap();
        let vault_dir = TempDir::new().unwrap();
        seed_site(site.path(), 3, &[]);

        let mut config = test_config(site.path(), vault_dir.path());
        config.budget.time_ceiling_secs = 0;
        let mut orchestrator = build(&config);

        let run = orchestrator.run().unwrap();
        assert_eq!(run.status, crate::core::types::ScanStatus::Paused);
        assert_eq!(run.summary.files_checked, 0);

        // The paused run is on record with its cursor for the next tick.
        let stored = orchestrator.store.latest_paused_run().unwrap().unwrap();
        assert_eq!(stored.id, run.id);
        assert!(stored.cursor.is_some());
    }

    #[test]
    fn test_clean_site_completes_without_remediation() {
        let site = TempDir::new().unwrap();
        let vault_dir = TempDir::new().unwrap();
        seed_site(site.path(), 5, &[]);

        let config = test_config(site.path(), vault_dir.path());
        let mut orchestrator = build(&config);

        let run = orchestrator.run().unwrap();
        assert_eq!(run.status, crate::core::types::ScanStatus::Completed);
        assert_eq!(run.summary.files_checked, 5);
        assert_eq!(run.summary.threats_found, 0);
        assert_eq!(run.summary.quarantined_count, 0);
        assert!(orchestrator.vault.list().unwrap().is_empty());
    }

    #[test]
    fn test_file_budget_pauses_then_resume_completes() {
        let site = TempDir::new().unwrap();
        let vault_dir = TempDir::new().unwrap();
        seed_site(site.path(), 10, &[]);

        let mut config = test_config(site.path(), vault_dir.path());
        config.budget.max_files_per_run = 4;
        let mut orchestrator = build(&config);

        let run = orchestrator.run().unwrap();
        assert_eq!(run.status, crate::core::types::ScanStatus::Paused);
        assert_eq!(run.summary.files_checked, 4);
        assert!(run.cursor.is_some());

        // Fresh invocation budgets let the resumed run continue.
        let resumed = orchestrator.resume().unwrap();
        assert_eq!(resumed.id, run.id);
        assert_eq!(resumed.summary.files_checked, 8);

        let finished = orchestrator.resume().unwrap();
        assert_eq!(finished.id, run.id);
        assert_eq!(finished.status, crate::core::types::ScanStatus::Completed);
        assert_eq!(finished.summary.files_checked, 10);
    }

    #[test]
    fn test_crash_stranded_run_resumes_from_cursor() {
        let site = TempDir::new().unwrap();
        let vault_dir = TempDir::new().unwrap();
        seed_site(site.path(), 10, &[]);

        let mut config = test_config(site.path(), vault_dir.path());
        config.budget.max_files_per_run = 4;
        let mut orchestrator = build(&config);

        let run = orchestrator.run().unwrap();
        assert_eq!(run.status, crate::core::types::ScanStatus::Paused);

        // A crashed invocation leaves the run marked running with its
        // cursor persisted and no live lock.
        let mut stranded = orchestrator.store.get_run(&run.id).unwrap().unwrap();
        stranded.resume();
        orchestrator.store.save_run(&stranded).unwrap();

        let resumed = orchestrator.resume().unwrap();
        assert_eq!(resumed.id, run.id);
        // Continued past the cursor instead of restarting from zero.
        assert_eq!(resumed.summary.files_checked, 8);
    }

    #[test]
    fn test_resume_does_not_revisit_files() {
        let site = TempDir::new().unwrap();
        let vault_dir = TempDir::new().unwrap();
        // Infected files produce findings we can count per path.
        seed_site(site.path(), 0, &["a.php", "b.php", "c.php"]);

        let mut config = test_config(site.path(), vault_dir.path());
        config.budget.max_files_per_run = 2;
        config.scan.quarantine_on_detect = false;

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = RecordingSink {
            findings: Arc::clone(&seen),
        };
        let vault = QuarantineVault::open(&config.quarantine).unwrap();
        let store = Store::in_memory().unwrap();
        let mut orchestrator =
            RemediationOrchestrator::new(config.clone(), vault, store).with_sink(Box::new(sink));

        let run = orchestrator.run().unwrap();
        assert_eq!(run.status, crate::core::types::ScanStatus::Paused);
        let finished = orchestrator.resume().unwrap();
        assert_eq!(finished.status, crate::core::types::ScanStatus::Completed);

        let mut paths = seen.lock().unwrap().clone();
        paths.sort();
        let before = paths.len();
        paths.dedup();
        assert_eq!(paths.len(), before);
    }

    #[test]
    fn test_run_lock_blocks_concurrent_run() {
        let site = TempDir::new().unwrap();
        let vault_dir = TempDir::new().unwrap();
        seed_site(site.path(), 1, &[]);

        let config = test_config(site.path(), vault_dir.path());
        let mut orchestrator = build(&config);

        orchestrator
            .store
            .acquire_run_lock("someone-else", ChronoDuration::minutes(5))
            .unwrap();
        assert!(matches!(orchestrator.run(), Err(Error::RunLock { .. })));
    }

    #[test]
    fn test_infected_core_file_is_repaired_not_quarantined() {
        let site = TempDir::new().unwrap();
        let vault_dir = TempDir::new().unwrap();
        let canonical = b"<?php // login\n".to_vec();
        fs::write(site.path().join("wp-login.php"), INFECTED_PHP).unwrap();

        let mut checksums = BTreeMap::new();
        checksums.insert(
            "wp-login.php".to_string(),
            ContentHasher::sha256_bytes(&canonical),
        );
        let manifest = CoreManifest {
            version: "6.4.2".to_string(),
            checksums,
        };

        struct OneFileSource(Vec<u8>);
        impl ManifestSource for OneFileSource {
            fn fetch_manifest(&self, _v: &str) -> crate::core::error::Result<CoreManifest> {
                Err(Error::ManifestUnavailable("unused".into()))
            }
            fn fetch_file(&self, _v: &str, _p: &str) -> crate::core::error::Result<Vec<u8>> {
                Ok(self.0.clone())
            }
        }

        let source: Box<dyn ManifestSource> = Box::new(OneFileSource(canonical.clone()));
        let core = CoreRepairContext {
            checker: CoreIntegrityChecker::new(source),
            manifest,
        };

        let config = test_config(site.path(), vault_dir.path());
        let vault = QuarantineVault::open(&config.quarantine).unwrap();
        let store = Store::in_memory().unwrap();
        let mut orchestrator =
            RemediationOrchestrator::new(config, vault, store).with_core_repair(core);

        let run = orchestrator.run().unwrap();
        assert_eq!(run.status, crate::core::types::ScanStatus::Completed);
        assert_eq!(run.summary.quarantined_count, 0);

        // The core file stays in place with canonical contents.
        let contents = fs::read(site.path().join("wp-login.php")).unwrap();
        assert_eq!(contents, b"<?php // login\n");
        assert!(orchestrator.vault.list().unwrap().is_empty());
    }

    #[test]
    fn test_quarantine_disabled_leaves_files() {
        let site = TempDir::new().unwrap();
        let vault_dir = TempDir::new().unwrap();
        seed_site(site.path(), 0, &["bad.php"]);

        let mut config = test_config(site.path(), vault_dir.path());
        config.scan.quarantine_on_detect = false;
        let mut orchestrator = build(&config);

        let run = orchestrator.run().unwrap();
        assert!(run.summary.threats_found >= 1);
        assert_eq!(run.summary.quarantined_count, 0);
        assert!(site.path().join("bad.php").exists());
    }
}
