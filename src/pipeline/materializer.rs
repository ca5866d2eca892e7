//! Dependency materialization
//!
//! Each classpath archive is transpiled once per fingerprint and stored in
//! the [`ArtifactCache`]. Entries run in parallel; a failure in one never
//! affects the others and is never cached.

use crate::archive::{ArchiveReader, ArchiveWriter};
use crate::cache::{ArtifactCache, CachedArtifact, Fingerprint, FlightGroup};
use crate::error::{DevloopError, DevloopResult};
use crate::pipeline::layout::ScratchDir;
use crate::source::{Classifier, RootedFile, SourceKind};
use crate::toolchain::{with_timeout, Toolchain, TranspileRequest};
use futures_util::stream::{self, StreamExt};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Tunables for a [`Materializer`]
#[derive(Debug, Clone)]
pub struct MaterializeOptions {
    /// Classpath handed to the transpiler
    pub classpath: Vec<PathBuf>,
    pub declare_legacy_namespaces: bool,
    pub scratch_root: PathBuf,
    pub jobs: usize,
    pub stage_timeout: Option<Duration>,
}

#[derive(Debug, Clone)]
pub enum MaterializeStatus {
    CacheHit(CachedArtifact),
    Materialized(CachedArtifact),
    Skipped(String),
    Failed(String),
}

impl MaterializeStatus {
    pub fn artifact(&self) -> Option<&CachedArtifact> {
        match self {
            Self::CacheHit(a) | Self::Materialized(a) => Some(a),
            Self::Skipped(_) | Self::Failed(_) => None,
        }
    }
}

impl fmt::Display for MaterializeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CacheHit(a) => write!(f, "cache hit ({})", a.fingerprint.short()),
            Self::Materialized(a) => write!(f, "materialized ({})", a.fingerprint.short()),
            Self::Skipped(reason) => write!(f, "skipped: {}", reason),
            Self::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MaterializeResult {
    pub entry: PathBuf,
    pub status: MaterializeStatus,
}

/// Per-entry results, in classpath order
#[derive(Debug, Clone, Default)]
pub struct MaterializeReport {
    pub results: Vec<MaterializeResult>,
}

impl MaterializeReport {
    /// Artifacts to feed the bundler, in classpath order
    pub fn artifacts(&self) -> impl Iterator<Item = &CachedArtifact> {
        self.results.iter().filter_map(|r| r.status.artifact())
    }

    pub fn hits(&self) -> usize {
        self.count(|s| matches!(s, MaterializeStatus::CacheHit(_)))
    }

    pub fn materialized(&self) -> usize {
        self.count(|s| matches!(s, MaterializeStatus::Materialized(_)))
    }

    pub fn skipped(&self) -> usize {
        self.count(|s| matches!(s, MaterializeStatus::Skipped(_)))
    }

    pub fn failed(&self) -> usize {
        self.count(|s| matches!(s, MaterializeStatus::Failed(_)))
    }

    fn count(&self, pred: impl Fn(&MaterializeStatus) -> bool) -> usize {
        self.results.iter().filter(|r| pred(&r.status)).count()
    }
}

/// Archive members sorted by role
struct Members {
    sources: Vec<PathBuf>,
    overlays: Vec<RootedFile>,
    passthrough: Vec<String>,
}

pub struct Materializer {
    cache: ArtifactCache,
    toolchain: Toolchain,
    classifier: Classifier,
    options: MaterializeOptions,
    flights: FlightGroup,
}

impl Materializer {
    pub fn new(
        cache: ArtifactCache,
        toolchain: Toolchain,
        classifier: Classifier,
        options: MaterializeOptions,
    ) -> Self {
        Self {
            cache,
            toolchain,
            classifier,
            options,
            flights: FlightGroup::new(),
        }
    }

    /// Materialize every classpath entry.
    ///
    /// Missing entries are a fatal error reported before any work starts.
    /// `on_result` is called once per entry as it completes.
    pub async fn materialize_all(
        &self,
        entries: &[PathBuf],
        on_result: &(dyn Fn(&MaterializeResult) + Send + Sync),
    ) -> DevloopResult<MaterializeReport> {
        if let Some(missing) = entries.iter().find(|e| !e.exists()) {
            return Err(DevloopError::ClasspathEntryNotFound(missing.clone()));
        }

        let results: Vec<MaterializeResult> = stream::iter(entries)
            .map(|entry| async move {
                MaterializeResult {
                    entry: entry.clone(),
                    status: self.materialize(entry).await,
                }
            })
            .buffered(self.options.jobs.max(1))
            .inspect(|result| on_result(result))
            .collect()
            .await;

        let report = MaterializeReport { results };
        info!(
            "Dependencies: {} cached, {} materialized, {} skipped, {} failed",
            report.hits(),
            report.materialized(),
            report.skipped(),
            report.failed()
        );
        Ok(report)
    }

    /// Materialize one entry, turning every error into a status
    pub async fn materialize(&self, entry: &Path) -> MaterializeStatus {
        if entry.is_dir() {
            return MaterializeStatus::Skipped("directory".to_string());
        }
        let Some(name) = entry.file_name().map(|n| n.to_string_lossy().into_owned()) else {
            return MaterializeStatus::Skipped("no file name".to_string());
        };

        let fingerprint = match fingerprint_of(entry).await {
            Ok(fp) => fp,
            Err(e) => return MaterializeStatus::Failed(e.to_string()),
        };

        if let Some(artifact) = self.cache.lookup(&fingerprint, &name) {
            debug!("Cache hit for {} ({})", name, fingerprint.short());
            return MaterializeStatus::CacheHit(artifact);
        }

        // Identical archives on the classpath are built once
        let _guard = self.flights.acquire(fingerprint.as_str()).await;
        if let Some(artifact) = self.cache.lookup(&fingerprint, &name) {
            return MaterializeStatus::CacheHit(artifact);
        }

        match self.build(entry, &fingerprint, &name).await {
            Ok(MaterializeStatus::Failed(reason)) => {
                warn!(
                    "Failed to materialize {}: {}. A manually built artifact can be placed at {}",
                    entry.display(),
                    reason,
                    self.cache.entry_path(&fingerprint, &name).display()
                );
                MaterializeStatus::Failed(reason)
            }
            Ok(MaterializeStatus::Skipped(reason)) => {
                info!("Skipping {}: {}", name, reason);
                MaterializeStatus::Skipped(reason)
            }
            Ok(status) => {
                info!("Materialized {} ({})", name, fingerprint.short());
                status
            }
            Err(e) => {
                warn!("Failed to materialize {}: {}", entry.display(), e);
                MaterializeStatus::Failed(e.to_string())
            }
        }
    }

    async fn build(
        &self,
        entry: &Path,
        fingerprint: &Fingerprint,
        name: &str,
    ) -> DevloopResult<MaterializeStatus> {
        let scratch = ScratchDir::create(&self.options.scratch_root)?;
        let mut reader = ArchiveReader::open(entry)?;
        let members = self.extract_members(&mut reader, &scratch)?;

        if members.sources.is_empty() {
            return Ok(MaterializeStatus::Skipped("no sources".to_string()));
        }

        let preprocessed = scratch.join("preprocessed");
        let outcome = with_timeout(
            "preprocessor",
            self.options.stage_timeout,
            self.toolchain
                .preprocessor
                .preprocess(&members.sources, &preprocessed),
        )
        .await?;
        if !outcome.success {
            return Ok(MaterializeStatus::Failed(format!(
                "preprocessor failed\n{}",
                outcome.tail()
            )));
        }

        let sources = self
            .classifier
            .files_in(&preprocessed, |k| k == SourceKind::FirstPartySource)?;
        if sources.is_empty() {
            return Ok(MaterializeStatus::Skipped(
                "no sources left after preprocessing".to_string(),
            ));
        }

        self.toolchain.transpiler.reset().await?;
        let output_dir = scratch.join("out");
        fs::create_dir_all(&output_dir)
            .map_err(|e| DevloopError::io(format!("creating {}", output_dir.display()), e))?;
        let request = TranspileRequest {
            sources,
            overlays: members.overlays,
            classpath: self.options.classpath.clone(),
            output_dir: output_dir.clone(),
            scratch_dir: scratch.path().to_path_buf(),
            declare_legacy_namespaces: self.options.declare_legacy_namespaces,
        };
        let outcome = with_timeout(
            "transpiler",
            self.options.stage_timeout,
            self.toolchain.transpiler.transpile(&request),
        )
        .await?;
        if !outcome.success() {
            let errors: Vec<String> = outcome.errors().map(ToString::to_string).collect();
            return Ok(MaterializeStatus::Failed(format!(
                "transpiler exited with {}\n{}",
                outcome.exit_code,
                errors.join("\n")
            )));
        }

        // Pass-through scripts win over transpiler output of the same name
        let pending = self.cache.begin(fingerprint, name);
        let mut writer = ArchiveWriter::create(pending.temp_path())?;
        for member in &members.passthrough {
            let bytes = reader.read(member)?;
            writer.add_bytes(member, &bytes)?;
        }
        writer.add_dir(&output_dir)?;
        writer.finish()?;

        Ok(MaterializeStatus::Materialized(pending.publish()?))
    }

    fn extract_members(
        &self,
        reader: &mut ArchiveReader,
        scratch: &ScratchDir,
    ) -> DevloopResult<Members> {
        let sources_dir = scratch.join("src");
        let overlays_dir = scratch.join("native");
        let mut members = Members {
            sources: Vec::new(),
            overlays: Vec::new(),
            passthrough: Vec::new(),
        };

        for name in reader.file_names() {
            match self.classifier.classify(Path::new(&name)) {
                Some(SourceKind::FirstPartySource) => {
                    members.sources.push(reader.extract(&name, &sources_dir)?);
                }
                Some(SourceKind::NativeOverlay) => {
                    let path = reader.extract(&name, &overlays_dir)?;
                    members.overlays.push(RootedFile {
                        path,
                        relative: PathBuf::from(&name),
                    });
                }
                Some(SourceKind::PlainAsset) => members.passthrough.push(name),
                Some(SourceKind::DependencyArchive) | None => {}
            }
        }
        Ok(members)
    }
}

async fn fingerprint_of(path: &Path) -> DevloopResult<Fingerprint> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || Fingerprint::of_file(&path))
        .await
        .map_err(|e| DevloopError::Internal(format!("fingerprint task failed: {}", e)))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::testing::{FakeTools, STRIPPED, TRANSPILE_ERROR};
    use std::sync::atomic::Ordering;
    use std::sync::Mutex;
    use tempfile::TempDir;

    struct Fixture {
        dir: TempDir,
        tools: std::sync::Arc<FakeTools>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                dir: TempDir::new().unwrap(),
                tools: FakeTools::new(),
            }
        }

        fn materializer(&self) -> Materializer {
            let cache = ArtifactCache::open(&self.dir.path().join("cache")).unwrap();
            Materializer::new(
                cache,
                self.tools.toolchain(),
                Classifier::new().unwrap(),
                MaterializeOptions {
                    classpath: Vec::new(),
                    declare_legacy_namespaces: false,
                    scratch_root: self.dir.path().join("scratch"),
                    jobs: 4,
                    stage_timeout: Some(Duration::from_secs(30)),
                },
            )
        }

        fn jar(&self, name: &str, members: &[(&str, &str)]) -> PathBuf {
            let path = self.dir.path().join(name);
            let mut writer = ArchiveWriter::create(&path).unwrap();
            for (member, body) in members {
                writer.add_bytes(member, body.as_bytes()).unwrap();
            }
            writer.finish().unwrap();
            path
        }
    }

    async fn run(m: &Materializer, entries: &[PathBuf]) -> MaterializeReport {
        m.materialize_all(entries, &|_| {}).await.unwrap()
    }

    #[tokio::test]
    async fn second_run_is_all_cache_hits() {
        let fx = Fixture::new();
        let jar = fx.jar("lib.jar", &[("com/lib/Lib.java", "class Lib {}")]);

        let first = run(&fx.materializer(), &[jar.clone()]).await;
        assert_eq!(first.materialized(), 1);
        assert_eq!(fx.tools.transpile_count(), 1);
        assert_eq!(fx.tools.resets.load(Ordering::SeqCst), 1);

        // A new materializer over the same cache behaves like a warm restart
        let second = run(&fx.materializer(), &[jar]).await;
        assert_eq!(second.hits(), 1);
        assert_eq!(fx.tools.transpile_count(), 1);
        assert_eq!(fx.tools.preprocess_count(), 1);
        assert_eq!(fx.tools.resets.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn changed_byte_gives_new_artifact() {
        let fx = Fixture::new();
        let jar = fx.jar("lib.jar", &[("Lib.java", "class Lib {}")]);
        let first = run(&fx.materializer(), &[jar]).await;

        let jar = fx.jar("lib.jar", &[("Lib.java", "class Lib { }")]);
        let second = run(&fx.materializer(), &[jar]).await;

        let a = first.artifacts().next().unwrap();
        let b = second.artifacts().next().unwrap();
        assert_ne!(a.fingerprint, b.fingerprint);
        assert_ne!(a.path, b.path);
        assert_eq!(second.materialized(), 1);
        assert_eq!(fx.tools.transpile_count(), 2);
    }

    #[tokio::test]
    async fn failure_is_isolated_and_not_cached() {
        let fx = Fixture::new();
        let jars = vec![
            fx.jar("a.jar", &[("A.java", "class A {}")]),
            fx.jar("b.jar", &[("B.java", TRANSPILE_ERROR)]),
            fx.jar("c.jar", &[("C.java", "class C {}")]),
        ];

        let report = run(&fx.materializer(), &jars).await;
        assert!(matches!(report.results[0].status, MaterializeStatus::Materialized(_)));
        assert!(matches!(report.results[1].status, MaterializeStatus::Failed(_)));
        assert!(matches!(report.results[2].status, MaterializeStatus::Materialized(_)));
        assert_eq!(report.artifacts().count(), 2);

        // The failed entry is retried, the others are hits
        let again = run(&fx.materializer(), &jars).await;
        assert_eq!(again.hits(), 2);
        assert_eq!(again.failed(), 1);
        assert_eq!(fx.tools.transpile_count(), 4);
        assert!(fs::read_dir(fx.dir.path().join("cache/.tmp"))
            .unwrap()
            .next()
            .is_none());
    }

    #[tokio::test]
    async fn artifact_holds_output_and_passthrough_but_not_overlays() {
        let fx = Fixture::new();
        let jar = fx.jar(
            "lib.jar",
            &[
                ("com/lib/Lib.java", "class Lib {}"),
                ("com/lib/Lib.native.js", "// native"),
                ("com/lib/helper.js", "var helper = 1;"),
                ("META-INF/MANIFEST.MF", "Manifest-Version: 1.0"),
            ],
        );

        let report = run(&fx.materializer(), &[jar]).await;
        let artifact = report.artifacts().next().unwrap();

        let overlays = fx.tools.last_overlays.lock().unwrap().clone();
        assert_eq!(overlays.len(), 1);
        assert_eq!(overlays[0].relative, PathBuf::from("com/lib/Lib.native.js"));

        let mut reader = ArchiveReader::open(&artifact.path).unwrap();
        let mut names = reader.file_names();
        names.sort();
        assert_eq!(names, vec!["Lib.java.js", "com/lib/helper.js"]);
        assert_eq!(reader.read("com/lib/helper.js").unwrap(), b"var helper = 1;");
    }

    #[tokio::test]
    async fn bytecode_only_and_fully_stripped_entries_are_skipped() {
        let fx = Fixture::new();
        let jars = vec![
            fx.jar("classes.jar", &[("Foo.class", "cafebabe")]),
            fx.jar("server.jar", &[("Server.java", STRIPPED)]),
            fx.dir.path().join("classes"),
        ];
        fs::create_dir_all(&jars[2]).unwrap();

        let report = run(&fx.materializer(), &jars).await;
        assert_eq!(report.skipped(), 3);
        assert_eq!(fx.tools.transpile_count(), 0);
        assert!(ArtifactCache::open(&fx.dir.path().join("cache"))
            .unwrap()
            .list()
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn identical_archives_materialize_once() {
        let fx = Fixture::new();
        let original = fx.jar("same.jar", &[("Same.java", "class Same {}")]);
        let jars: Vec<PathBuf> = (0..4)
            .map(|i| {
                let dir = fx.dir.path().join(format!("copy{}", i));
                fs::create_dir_all(&dir).unwrap();
                let path = dir.join("same.jar");
                fs::copy(&original, &path).unwrap();
                path
            })
            .collect();

        let report = run(&fx.materializer(), &jars).await;
        assert_eq!(report.artifacts().count(), 4);
        assert_eq!(report.materialized(), 1);
        assert_eq!(report.hits(), 3);
        assert_eq!(fx.tools.transpiles.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn missing_entry_is_fatal() {
        let fx = Fixture::new();
        let err = fx
            .materializer()
            .materialize_all(&[fx.dir.path().join("gone.jar")], &|_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, DevloopError::ClasspathEntryNotFound(_)));
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn progress_callback_sees_every_entry() {
        let fx = Fixture::new();
        let jars = vec![
            fx.jar("a.jar", &[("A.java", "class A {}")]),
            fx.jar("b.jar", &[("B.class", "x")]),
        ];
        let seen = Mutex::new(Vec::new());

        fx.materializer()
            .materialize_all(&jars, &|r| seen.lock().unwrap().push(r.entry.clone()))
            .await
            .unwrap();

        assert_eq!(seen.into_inner().unwrap(), jars);
    }
}
