//! The rebuild loop
//!
//! One cycle walks `Polling -> HasChanges -> Compiling -> Transpiling ->
//! Bundling -> Committed`. Any stage failure abandons the cycle and the
//! watermark stays where it was. The failed sources are rebuilt together
//! with whatever the user saves next, not on every poll.

use crate::bundle::{BundlePlan, FreshnessToken, PersistentInputStore};
use crate::config::{Config, FreshnessPolicy, OverlayPolicy};
use crate::error::{DevloopError, DevloopResult};
use crate::pipeline::cycle::{BuildState, CycleOutcome, CycleReport, CycleStage, StageTimings};
use crate::pipeline::layout::{BuildLayout, ScratchDir};
use crate::pipeline::materializer::MaterializeReport;
use crate::source::{ChangeDetector, Classifier, OverlayCollector, RootedFile, SourceKind};
use crate::toolchain::{with_timeout, CompileRequest, Severity, Toolchain, TranspileRequest};
use std::future::Future;
use std::path::PathBuf;
use std::time::{Duration, Instant, SystemTime};
use tracing::{debug, error, info, warn};

/// Why a cycle stopped early
struct StageFailure {
    stage: CycleStage,
    reason: String,
}

impl StageFailure {
    fn new(stage: CycleStage, reason: impl Into<String>) -> Self {
        Self {
            stage,
            reason: reason.into(),
        }
    }

    fn from_error(stage: CycleStage) -> impl FnOnce(DevloopError) -> Self {
        move |e| Self::new(stage, e.to_string())
    }
}

/// Settings read once from the config
#[derive(Debug, Clone)]
struct CycleSettings {
    classpath: Vec<PathBuf>,
    overlays: OverlayPolicy,
    freshness: FreshnessPolicy,
    declare_legacy_namespaces: bool,
    stage_timeout: Option<Duration>,
    poll_interval: Duration,
}

pub struct Orchestrator {
    layout: BuildLayout,
    toolchain: Toolchain,
    classifier: Classifier,
    detector: ChangeDetector,
    collector: OverlayCollector,
    store: PersistentInputStore,
    plan: BundlePlan,
    settings: CycleSettings,
    /// Last reported scan failure, to avoid repeating it every poll
    last_scan_failure: Option<String>,
}

impl Orchestrator {
    /// Set up the loop and register the prebuilt archives.
    ///
    /// `layout` must come from [`BuildLayout::prepare`].
    pub fn new(config: &Config, layout: BuildLayout, toolchain: Toolchain) -> DevloopResult<Self> {
        let classifier = Classifier::new()?;
        let roots = config.project.sources.clone();
        let plan = BundlePlan::new(
            &config.bundle,
            &config.project.entry_points,
            &layout.output_file,
            &layout.scripts_dir,
        );

        let mut orchestrator = Self {
            detector: ChangeDetector::new(roots.clone(), classifier.clone()),
            collector: OverlayCollector::new(roots, classifier.clone()),
            classifier,
            store: PersistentInputStore::new(),
            plan,
            settings: CycleSettings {
                classpath: layout.bytecode_classpath(config),
                overlays: config.watch.overlays,
                freshness: config.watch.freshness,
                declare_legacy_namespaces: config.transpile.declare_legacy_namespaces,
                stage_timeout: config.watch.stage_timeout(),
                poll_interval: config.watch.poll_interval(),
            },
            layout,
            toolchain,
            last_scan_failure: None,
        };

        for archive in &config.project.js_classpath {
            let token = FreshnessToken::for_file(archive, FreshnessPolicy::Digest)?;
            orchestrator.add_archive(archive.clone(), token);
        }
        Ok(orchestrator)
    }

    /// Feed materialized dependencies to the bundler
    pub fn add_dependencies(&mut self, report: &MaterializeReport) {
        let artifacts: Vec<_> = report.artifacts().cloned().collect();
        for artifact in artifacts {
            self.add_archive(artifact.path, FreshnessToken::Digest(artifact.fingerprint));
        }
    }

    fn add_archive(&mut self, path: PathBuf, token: FreshnessToken) {
        self.plan.add_archive(&path);
        self.store.register(path.to_string_lossy(), token);
    }

    pub fn store(&self) -> &PersistentInputStore {
        &self.store
    }

    pub fn plan(&self) -> &BundlePlan {
        &self.plan
    }

    pub fn layout(&self) -> &BuildLayout {
        &self.layout
    }

    /// Run one cycle from `state`.
    ///
    /// The returned state has the candidate watermark (captured before the
    /// scan) only if every stage succeeded. Any attempt past polling records
    /// the candidate as `last_attempt`.
    pub async fn run_cycle(&mut self, mut state: BuildState) -> (BuildState, CycleOutcome) {
        let candidate = SystemTime::now();
        let started = Instant::now();

        let outcome = match self.attempt(&state).await {
            Ok(None) => CycleOutcome::Idle,
            Ok(Some(mut report)) => {
                report.timings.total = started.elapsed();
                state.watermark = candidate;
                state.last_attempt = candidate;
                state.committed += 1;
                info!("Build #{} committed ({})", state.committed, report.timings);
                CycleOutcome::Committed(report)
            }
            Err(failure) => {
                state.abandoned += 1;
                if failure.stage != CycleStage::Polling {
                    state.last_attempt = candidate;
                    error!("Build abandoned while {}: {}", failure.stage, failure.reason);
                }
                CycleOutcome::Abandoned {
                    stage: failure.stage,
                    reason: failure.reason,
                }
            }
        };
        (state, outcome)
    }

    /// Poll and rebuild until `shutdown` resolves.
    ///
    /// `on_outcome` sees every cycle that built or failed to build.
    pub async fn watch<F>(
        &mut self,
        mut state: BuildState,
        shutdown: F,
        on_outcome: &(dyn Fn(&BuildState, &CycleOutcome) + Send + Sync),
    ) -> BuildState
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        loop {
            let (next, outcome) = tokio::select! {
                _ = &mut shutdown => break,
                cycle = self.run_cycle(state) => cycle,
            };
            state = next;

            // Scan failures are already logged once per distinct failure
            let quiet = matches!(
                outcome,
                CycleOutcome::Idle
                    | CycleOutcome::Abandoned {
                        stage: CycleStage::Polling,
                        ..
                    }
            );
            if !quiet {
                on_outcome(&state, &outcome);
            }
            if outcome.is_committed() {
                continue;
            }
            tokio::select! {
                _ = &mut shutdown => break,
                _ = tokio::time::sleep(self.settings.poll_interval) => {}
            }
        }
        info!(
            "Stopped after {} committed and {} abandoned builds",
            state.committed, state.abandoned
        );
        state
    }

    async fn attempt(&mut self, state: &BuildState) -> Result<Option<CycleReport>, StageFailure> {
        let mut timings = StageTimings::default();

        // POLLING
        let poll_started = Instant::now();
        let scan = self.detector.scan(state.watermark);
        if !scan.is_clean() {
            let summary = scan
                .failures
                .iter()
                .map(|f| format!("{}: {}", f.root.display(), f.reason))
                .collect::<Vec<_>>()
                .join("; ");
            if self.last_scan_failure.as_deref() == Some(summary.as_str()) {
                debug!("Source scan still failing: {}", summary);
            } else {
                warn!("Source scan failed, build deferred: {}", summary);
                self.last_scan_failure = Some(summary.clone());
            }
            return Err(StageFailure::new(CycleStage::Polling, summary));
        }
        self.last_scan_failure = None;
        timings.poll = poll_started.elapsed();
        if scan.modified.is_empty() {
            return Ok(None);
        }
        // Rebuild everything since the last success, but only after a new save
        if !scan.modified.iter().any(|f| f.modified > state.last_attempt) {
            debug!(
                "{} sources still failing, waiting for a change",
                scan.modified.len()
            );
            return Ok(None);
        }

        // HAS_CHANGES
        let modified: Vec<PathBuf> = scan.modified.iter().map(|f| f.path.clone()).collect();
        info!("{} updated source files", modified.len());
        let overlays = self
            .collector
            .collect(self.settings.overlays, &scan.modified)
            .map_err(StageFailure::from_error(CycleStage::HasChanges))?;

        // COMPILING
        let compile_started = Instant::now();
        let request = CompileRequest {
            sources: modified.clone(),
            classpath: self.settings.classpath.clone(),
            classes_dir: self.layout.classes_dir.clone(),
            generated_dir: self.layout.generated_dir.clone(),
        };
        let outcome = with_timeout(
            "compiler",
            self.settings.stage_timeout,
            self.toolchain.compiler.compile(&request),
        )
        .await
        .map_err(StageFailure::from_error(CycleStage::Compiling))?;
        if !outcome.success {
            return Err(StageFailure::new(
                CycleStage::Compiling,
                format!("compiler reported errors\n{}", outcome.tail()),
            ));
        }
        let generated = self
            .classifier
            .files_in(&self.layout.generated_dir, |k| k == SourceKind::FirstPartySource)
            .map_err(StageFailure::from_error(CycleStage::Compiling))?;
        timings.compile = compile_started.elapsed();

        // TRANSPILING
        let transpile_started = Instant::now();
        let assets = self
            .transpile(&modified, &generated, overlays.clone())
            .await
            .map_err(|reason| StageFailure::new(CycleStage::Transpiling, reason))?;
        timings.transpile = transpile_started.elapsed();

        // BUNDLING
        let bundle_started = Instant::now();
        self.bundle()
            .await
            .map_err(|reason| StageFailure::new(CycleStage::Bundling, reason))?;
        timings.bundle = bundle_started.elapsed();

        Ok(Some(CycleReport {
            sources: modified.len(),
            generated: generated.len(),
            overlays: overlays.len(),
            assets,
            timings,
        }))
    }

    /// Preprocess and transpile, then copy plain assets next to the output.
    ///
    /// Returns the number of assets copied.
    async fn transpile(
        &self,
        modified: &[PathBuf],
        generated: &[PathBuf],
        overlays: Vec<RootedFile>,
    ) -> Result<usize, String> {
        let failed = |e: DevloopError| e.to_string();
        let scratch = ScratchDir::create(&self.layout.scratch_root).map_err(failed)?;

        let inputs: Vec<PathBuf> = modified.iter().chain(generated).cloned().collect();
        let preprocessed = scratch.join("preprocessed");
        let outcome = with_timeout(
            "preprocessor",
            self.settings.stage_timeout,
            self.toolchain.preprocessor.preprocess(&inputs, &preprocessed),
        )
        .await
        .map_err(failed)?;
        if !outcome.success {
            return Err(format!("preprocessor reported errors\n{}", outcome.tail()));
        }

        let sources = self
            .classifier
            .files_in(&preprocessed, |k| k == SourceKind::FirstPartySource)
            .map_err(failed)?;
        if sources.is_empty() {
            debug!("Every updated source was removed by preprocessing");
        } else {
            self.toolchain.transpiler.reset().await.map_err(failed)?;
            let request = TranspileRequest {
                sources,
                overlays,
                classpath: self.settings.classpath.clone(),
                output_dir: self.layout.scripts_dir.clone(),
                scratch_dir: scratch.path().to_path_buf(),
                declare_legacy_namespaces: self.settings.declare_legacy_namespaces,
            };
            let outcome = with_timeout(
                "transpiler",
                self.settings.stage_timeout,
                self.toolchain.transpiler.transpile(&request),
            )
            .await
            .map_err(failed)?;

            for problem in &outcome.problems {
                match problem.severity {
                    Severity::Warning => warn!("{}", problem.message),
                    Severity::Error => error!("{}", problem.message),
                }
            }
            if !outcome.success() {
                return Err(format!(
                    "transpiler exited with {} ({} errors)",
                    outcome.exit_code,
                    outcome.errors().count()
                ));
            }
        }

        self.collector
            .copy_plain_assets(&self.layout.scripts_dir)
            .map_err(failed)
    }

    /// Register the transpiled scripts and run the bundler
    async fn bundle(&mut self) -> Result<(), String> {
        let scripts = self
            .classifier
            .files_in(&self.layout.scripts_dir, |k| {
                matches!(k, SourceKind::PlainAsset | SourceKind::NativeOverlay)
            })
            .map_err(|e| e.to_string())?;

        let mut changed = 0;
        for script in &scripts {
            if self
                .store
                .register_file(script, self.settings.freshness)
                .map_err(|e| e.to_string())?
            {
                changed += 1;
            }
        }
        debug!("{} of {} scripts changed since last bundle", changed, scripts.len());

        let request = self.plan.request();
        let outcome = with_timeout(
            "bundler",
            self.settings.stage_timeout,
            self.toolchain.bundler.bundle(&request, &self.store),
        )
        .await
        .map_err(|e| e.to_string())?;
        if !outcome.success {
            return Err(format!("bundler reported errors\n{}", outcome.tail()));
        }
        Ok(())
    }
}
