//! Build commands - watch, build and test
//!
//! All three share one startup path: validate the project, materialize the
//! dependency classpath, then hand the orchestrator to either the watch loop
//! or a single cycle.

use crate::cache::ArtifactCache;
use crate::cli::args::{BuildArgs, TestArgs};
use crate::config::Config;
use crate::error::{DevloopError, DevloopResult};
use crate::pipeline::{
    BuildLayout, BuildState, CycleOutcome, MaterializeOptions, Materializer, Orchestrator,
};
use crate::source::Classifier;
use crate::toolchain::create_toolchain;
use crate::ui::{self, MaterializeProgress, TaskSpinner, UiContext};
use tracing::{debug, info};

/// Rebuild on every change until Ctrl-C
pub async fn watch(args: BuildArgs, config: &Config) -> DevloopResult<()> {
    let config = apply_overrides(args, config);
    let ctx = super::ui_context(&config);

    ui::intro(&ctx, "devloop watch");
    let mut orchestrator = start(&config, &ctx).await?;
    ui::remark(&ctx, "Watching for changes, press Ctrl-C to stop");

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            debug!("Ctrl-C handler unavailable: {}", e);
            std::future::pending::<()>().await;
        }
    };
    let state = orchestrator
        .watch(BuildState::new(), shutdown, &|state, outcome| {
            print_outcome(&ctx, state, outcome)
        })
        .await;

    ui::outro_success(
        &ctx,
        &format!(
            "Stopped after {} builds ({} abandoned)",
            state.committed, state.abandoned
        ),
    );
    Ok(())
}

/// Build every source once
pub async fn build(args: BuildArgs, config: &Config) -> DevloopResult<()> {
    let config = apply_overrides(args, config);
    build_once(&config, "devloop build").await
}

/// Build the adapter suites of the given test classes once
pub async fn test(args: TestArgs, config: &Config) -> DevloopResult<()> {
    let mut config = apply_overrides(args.build, config);
    config.project.entry_points = args.tests.iter().map(|t| adapter_suite(t)).collect();
    build_once(&config, "devloop test").await
}

/// Entry point generated for a test class
pub fn adapter_suite(test_class: &str) -> String {
    format!("javatests.{}_AdapterSuite", test_class)
}

async fn build_once(config: &Config, title: &str) -> DevloopResult<()> {
    let ctx = super::ui_context(config);
    ui::intro(&ctx, title);
    let mut orchestrator = start(config, &ctx).await?;

    let mut spinner = TaskSpinner::new(&ctx);
    spinner.start("Building...");
    let (_, outcome) = orchestrator.run_cycle(BuildState::new()).await;

    match outcome {
        CycleOutcome::Committed(report) => {
            spinner.stop(&format!(
                "Built {} sources in {}ms",
                report.sources + report.generated,
                report.timings.total.as_millis()
            ));
            ui::outro_success(
                &ctx,
                &format!("Wrote {}", orchestrator.layout().output_file.display()),
            );
            Ok(())
        }
        CycleOutcome::Idle => {
            spinner.stop_error("Nothing to build");
            Err(DevloopError::User(
                "No Java sources found under the source roots".to_string(),
            ))
        }
        CycleOutcome::Abandoned { stage, reason } => {
            spinner.stop_error(&format!("Build failed while {}", stage));
            Err(DevloopError::BuildFailed {
                stage: stage.to_string(),
                reason,
            })
        }
    }
}

/// Validate, materialize dependencies and set up the orchestrator
async fn start(config: &Config, ctx: &UiContext) -> DevloopResult<Orchestrator> {
    let layout = BuildLayout::prepare(config)?;

    let cache = ArtifactCache::open(&layout.cache_dir)?;
    let swept = cache.sweep_temp();
    if swept > 0 {
        debug!("Removed {} abandoned cache temp files", swept);
    }

    let toolchain = create_toolchain(&config.toolchain, layout.store_file.clone());
    let materializer = Materializer::new(
        cache,
        toolchain.clone(),
        Classifier::new()?,
        materialize_options(config, &layout),
    );

    let entries = &config.project.classpath;
    let progress = MaterializeProgress::new(ctx, entries.len());
    let report = materializer
        .materialize_all(entries, &|result| progress.on_result(result))
        .await;
    progress.finish();
    let report = report?;

    if !entries.is_empty() {
        ui::step_ok_detail(
            ctx,
            "Dependencies ready",
            &format!(
                "{} cached, {} materialized, {} skipped",
                report.hits(),
                report.materialized(),
                report.skipped()
            ),
        );
    }
    if report.failed() > 0 {
        ui::step_warn_hint(
            ctx,
            &format!("{} dependencies failed to materialize", report.failed()),
            "their classes will be missing from the bundle",
        );
    }

    let mut orchestrator = Orchestrator::new(config, layout, toolchain)?;
    orchestrator.add_dependencies(&report);
    info!(
        "Bundling {} archives into {}",
        orchestrator.plan().archives().len(),
        orchestrator.layout().output_file.display()
    );
    Ok(orchestrator)
}

/// Dependencies are transpiled against the same classpath as first-party code
fn materialize_options(config: &Config, layout: &BuildLayout) -> MaterializeOptions {
    MaterializeOptions {
        classpath: layout.bytecode_classpath(config),
        declare_legacy_namespaces: config.transpile.declare_legacy_namespaces,
        scratch_root: layout.scratch_root.clone(),
        jobs: config.watch.materialize_jobs,
        stage_timeout: config.watch.stage_timeout(),
    }
}

fn print_outcome(ctx: &UiContext, state: &BuildState, outcome: &CycleOutcome) {
    match outcome {
        CycleOutcome::Committed(report) => ui::step_ok_detail(
            ctx,
            &format!("Build #{}", state.committed),
            &format!(
                "{} sources, {}ms",
                report.sources + report.generated,
                report.timings.total.as_millis()
            ),
        ),
        CycleOutcome::Abandoned { stage, reason } => {
            ui::step_error(ctx, &format!("Build failed while {}", stage));
            ui::remark(ctx, reason);
        }
        CycleOutcome::Idle => {}
    }
}

/// Layer command line overrides over the loaded config
fn apply_overrides(args: BuildArgs, config: &Config) -> Config {
    let mut config = config.clone();
    let project = &mut config.project;

    if !args.sources.is_empty() {
        project.sources = args.sources;
    }
    if !args.classpath.is_empty() {
        project.classpath = args.classpath;
    }
    if !args.js_classpath.is_empty() {
        project.js_classpath = args.js_classpath;
    }
    if let Some(out) = args.out {
        project.output_dir = out;
    }
    if !args.entry_points.is_empty() {
        project.entry_points = args.entry_points;
    }
    if let Some(cache_dir) = args.cache_dir {
        project.cache_dir = Some(cache_dir);
    }

    let bundle = &mut config.bundle;
    bundle.defines.extend(args.defines);
    bundle.externs.extend(args.externs);
    if let Some(level) = args.compilation_level {
        bundle.compilation_level = level;
    }
    config
}
