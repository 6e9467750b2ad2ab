//! Integration tests for the pipeline orchestrator.
//!
//! External tools are replaced by recording doubles that write the artifacts
//! a real reduction job would, so the full stage1 -> stage2 -> merge -> copy
//! -> cleanup path runs against a temporary directory.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use event_stager::execution::{CommandSpec, LaunchError, ProcessLauncher, ProcessOutput};
use event_stager::pipeline::{
    CommandTemplate, ConfigError, EventCounter, JobTemplates, Merger, PipelineConfig,
    PipelineOrchestrator, PipelineState, ProcessCatalog, RunMode,
};
use event_stager::scheduler::EventRange;
use event_stager::PipelineError;

/// Writes the output named in the command and fails on request.
#[derive(Default)]
struct RecordingLauncher {
    launched: Mutex<Vec<CommandSpec>>,
    fail_stage1: bool,
    /// Stage2 jobs whose start event is listed here exit with status 1.
    failing_starts: Vec<u64>,
}

impl RecordingLauncher {
    fn launched(&self, program: &str) -> Vec<CommandSpec> {
        self.launched
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.program == program)
            .cloned()
            .collect()
    }

    fn total(&self) -> usize {
        self.launched.lock().unwrap().len()
    }
}

#[async_trait]
impl ProcessLauncher for RecordingLauncher {
    async fn launch(&self, spec: &CommandSpec) -> Result<ProcessOutput, LaunchError> {
        self.launched.lock().unwrap().push(spec.clone());
        tokio::task::yield_now().await;

        let mut stdout = String::new();
        let exit_code = match (spec.program.as_str(), spec.args.first().map(String::as_str)) {
            ("reduce1", _) if self.fail_stage1 => 2,
            ("reduce1", _) => {
                std::fs::write(&spec.args[0], b"stage1").unwrap();
                0
            }
            ("reduce2", _) => {
                let start: u64 = spec.args[2].parse().unwrap();
                if self.failing_starts.contains(&start) {
                    1
                } else {
                    std::fs::write(&spec.args[1], format!("{}-{}\n", spec.args[2], spec.args[3]))
                        .unwrap();
                    0
                }
            }
            // Default ROOT count query: `python -c <query> <file>`.
            ("python", Some("-c")) => {
                stdout = "Info in <TFile::Open>: opened\n12\n".to_string();
                0
            }
            // Default stage2 job: `python stage2.py <in> <out> <start> <end>`.
            ("python", Some("stage2.py")) => {
                std::fs::write(&spec.args[2], format!("{}-{}\n", spec.args[3], spec.args[4]))
                    .unwrap();
                0
            }
            _ => 127,
        };

        Ok(ProcessOutput::new(
            exit_code,
            stdout,
            if exit_code == 0 { String::new() } else { "boom".to_string() },
            Duration::from_millis(1),
        ))
    }
}

/// Reports a fixed event count for any existing artifact.
struct FixedCounter {
    events: u64,
    calls: AtomicUsize,
}

impl FixedCounter {
    fn new(events: u64) -> Self {
        Self {
            events,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl EventCounter for FixedCounter {
    async fn count(&self, artifact: &Path) -> Result<u64, PipelineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !artifact.is_file() {
            return Err(PipelineError::ArtifactUnreadable {
                path: artifact.to_path_buf(),
                reason: "file does not exist".to_string(),
            });
        }
        Ok(self.events)
    }
}

/// Concatenates text partitions and records every call.
#[derive(Default)]
struct CountingMerger {
    calls: Mutex<Vec<Vec<PathBuf>>>,
}

#[async_trait]
impl Merger for CountingMerger {
    async fn merge(&self, inputs: &[PathBuf], output: &Path) -> Result<(), PipelineError> {
        self.calls.lock().unwrap().push(inputs.to_vec());
        let mut merged = String::new();
        for input in inputs {
            merged.push_str(&std::fs::read_to_string(input)?);
        }
        std::fs::write(output, merged)?;
        Ok(())
    }
}

struct Fixture {
    _dir: tempfile::TempDir,
    work: PathBuf,
    out: PathBuf,
    config: PipelineConfig,
}

fn fixture(workers: usize, mode: RunMode) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let work = dir.path().join("tmp");
    let out = dir.path().join("output");
    let templates = JobTemplates {
        stage1: CommandTemplate::new("reduce1", ["{output}", "{files}", "{workers}"]),
        stage2: CommandTemplate::new("reduce2", ["{input}", "{output}", "{start}", "{end}"]),
        merge: CommandTemplate::new("merge", ["{output}", "{inputs}"]),
        count: None,
    };
    let config = PipelineConfig::new()
        .with_input_dir(dir.path().join("events"))
        .with_output_dir(&out)
        .with_work_dir(&work)
        .with_workers(workers)
        .with_mode(mode)
        .with_job_templates(templates);

    Fixture {
        _dir: dir,
        work,
        out,
        config,
    }
}

fn orchestrator(
    config: PipelineConfig,
    launcher: Arc<RecordingLauncher>,
    counter: Arc<FixedCounter>,
    merger: Arc<CountingMerger>,
) -> PipelineOrchestrator {
    PipelineOrchestrator::new(config, Arc::new(ProcessCatalog::default()))
        .unwrap()
        .with_launcher(launcher)
        .with_counter(counter)
        .with_merger(merger)
}

#[tokio::test]
async fn test_unknown_sample_fails_before_any_launch() {
    let fx = fixture(4, RunMode::Both);
    let launcher = Arc::new(RecordingLauncher::default());
    let counter = Arc::new(FixedCounter::new(40));
    let orch = orchestrator(
        fx.config.clone(),
        launcher.clone(),
        counter.clone(),
        Arc::default(),
    );

    let err = orch.run("wzp6_ee_Unknown_ecm125").await.unwrap_err();

    assert!(matches!(err, PipelineError::ConfigError(_)));
    assert_eq!(launcher.total(), 0);
    assert_eq!(counter.calls.load(Ordering::SeqCst), 0);
    assert!(!fx.work.exists());
    assert_eq!(orch.state(), PipelineState::Failed);
}

#[tokio::test]
async fn test_full_run_merges_copies_and_cleans_up() {
    let fx = fixture(4, RunMode::Both);
    std::fs::create_dir_all(&fx.work).unwrap();
    let straggler = fx.work.join("stage2_Hbb_99.root");
    std::fs::write(&straggler, b"left over from a crashed run").unwrap();

    let launcher = Arc::new(RecordingLauncher::default());
    let merger = Arc::new(CountingMerger::default());
    let orch = orchestrator(
        fx.config.clone(),
        launcher.clone(),
        Arc::new(FixedCounter::new(10)),
        merger.clone(),
    );

    let report = orch.run("wzp6_ee_Hbb_ecm125").await.unwrap();

    let stage1 = launcher.launched("reduce1");
    assert_eq!(stage1.len(), 1);
    assert_eq!(stage1[0].args[0], fx.work.join("stage1_Hbb.root").display().to_string());
    assert!(stage1[0].args[1].ends_with("wzp6_ee_Hbb_ecm125/*.root"));
    assert_eq!(stage1[0].args[2], "4");

    assert_eq!(launcher.launched("reduce2").len(), 4);
    assert_eq!(
        report.ranges,
        vec![
            EventRange::new(0, 2),
            EventRange::new(2, 4),
            EventRange::new(4, 6),
            EventRange::new(6, 8)
        ]
    );

    let calls = merger.calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].len(), 4);
    assert!(!calls[0].contains(&straggler));
    drop(calls);

    let merged = fx.out.join("stage2_Hbb.root");
    assert_eq!(report.merged_output.as_deref(), Some(merged.as_path()));
    let mut lines: Vec<String> = std::fs::read_to_string(&merged)
        .unwrap()
        .lines()
        .map(String::from)
        .collect();
    lines.sort();
    assert_eq!(lines, vec!["0-2", "2-4", "4-6", "6-8"]);

    let leftovers: Vec<_> = std::fs::read_dir(&fx.work).unwrap().collect();
    assert!(leftovers.is_empty(), "work dir not cleaned: {:?}", leftovers);

    assert_eq!(
        report.states,
        vec![
            PipelineState::Idle,
            PipelineState::Stage1Running,
            PipelineState::Stage1Done,
            PipelineState::Partitioning,
            PipelineState::WorkersRunning,
            PipelineState::Merging,
            PipelineState::CopyingOutput,
            PipelineState::CleaningUp,
            PipelineState::Done,
        ]
    );
    assert_eq!(report.process.as_deref(), Some("Hbb"));
    assert!(report.finished_at.is_some());
    assert!(report.summary_line().unwrap().contains("8 of 10 events across 4 partitions"));
}

#[tokio::test]
async fn test_one_failing_partition_drains_pool_and_skips_merge() {
    let fx = fixture(4, RunMode::Both);
    let launcher = Arc::new(RecordingLauncher {
        failing_starts: vec![10],
        ..Default::default()
    });
    let merger = Arc::new(CountingMerger::default());
    let orch = orchestrator(
        fx.config.clone(),
        launcher.clone(),
        Arc::new(FixedCounter::new(40)),
        merger.clone(),
    );

    let err = orch.run("wzp6_ee_Hbb_ecm125").await.unwrap_err();

    match err {
        PipelineError::WorkerJobFailure { failed, total } => {
            assert_eq!(failed, vec!["stage2-Hbb-1".to_string()]);
            assert_eq!(total, 4);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(launcher.launched("reduce2").len(), 4);
    assert!(merger.calls.lock().unwrap().is_empty());
    assert_eq!(orch.state(), PipelineState::Failed);

    // No cleanup on failure.
    assert!(fx.work.join("stage1_Hbb.root").exists());
    assert!(fx.work.join("stage2_Hbb_0.root").exists());
}

#[tokio::test]
async fn test_stage1_failure_short_circuits() {
    let fx = fixture(4, RunMode::Both);
    let launcher = Arc::new(RecordingLauncher {
        fail_stage1: true,
        ..Default::default()
    });
    let counter = Arc::new(FixedCounter::new(40));
    let orch = orchestrator(
        fx.config.clone(),
        launcher.clone(),
        counter.clone(),
        Arc::default(),
    );

    let err = orch.run("wzp6_ee_Hbb_ecm125").await.unwrap_err();

    match err {
        PipelineError::ExternalJobFailure {
            stage,
            job_id,
            reason,
        } => {
            assert_eq!(stage, 1);
            assert_eq!(job_id, "stage1-Hbb");
            assert!(reason.contains("status 2"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(launcher.launched("reduce2").is_empty());
    assert_eq!(counter.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_stage2_without_stage1_artifact() {
    let fx = fixture(4, RunMode::Stage2);
    let launcher = Arc::new(RecordingLauncher::default());
    let orch = orchestrator(
        fx.config.clone(),
        launcher.clone(),
        Arc::new(FixedCounter::new(40)),
        Arc::default(),
    );

    let err = orch.run("wzp6_ee_Hbb_ecm125").await.unwrap_err();

    assert!(matches!(err, PipelineError::ArtifactUnreadable { .. }));
    assert_eq!(err.stage(), Some(2));
    assert_eq!(launcher.total(), 0);
}

#[tokio::test]
async fn test_fewer_events_than_workers() {
    let fx = fixture(4, RunMode::Stage2);
    std::fs::create_dir_all(&fx.work).unwrap();
    std::fs::write(fx.work.join("stage1_Hbb.root"), b"stage1").unwrap();

    let launcher = Arc::new(RecordingLauncher::default());
    let merger = Arc::new(CountingMerger::default());
    let orch = orchestrator(
        fx.config.clone(),
        launcher.clone(),
        Arc::new(FixedCounter::new(3)),
        merger.clone(),
    );

    let err = orch.run("wzp6_ee_Hbb_ecm125").await.unwrap_err();

    assert!(matches!(
        err,
        PipelineError::MergeFailure {
            expected: 0,
            found: 0,
            ..
        }
    ));
    assert_eq!(launcher.total(), 0);
    assert!(merger.calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_stage2_only_drops_remainder() {
    let fx = fixture(3, RunMode::Stage2);
    std::fs::create_dir_all(&fx.work).unwrap();
    std::fs::write(fx.work.join("stage1_Hbb.root"), b"stage1").unwrap();

    let launcher = Arc::new(RecordingLauncher::default());
    let orch = orchestrator(
        fx.config.clone(),
        launcher.clone(),
        Arc::new(FixedCounter::new(10)),
        Arc::new(CountingMerger::default()),
    );

    let report = orch.run("wzp6_ee_Hbb_ecm125").await.unwrap();

    assert!(launcher.launched("reduce1").is_empty());
    let mut starts: Vec<String> = launcher
        .launched("reduce2")
        .iter()
        .map(|s| format!("{}-{}", s.args[2], s.args[3]))
        .collect();
    starts.sort();
    assert_eq!(starts, vec!["0-3", "3-6", "6-9"]);
    assert_eq!(report.assigned_events(), 9);
    assert!(!fx.work.join("stage1_Hbb.root").exists());
}

#[tokio::test]
async fn test_default_templates_count_stage1_with_root_query() {
    let fx = fixture(4, RunMode::Stage2);
    std::fs::create_dir_all(&fx.work).unwrap();
    let stage1 = fx.work.join("stage1_Hbb.root");
    std::fs::write(&stage1, b"not a parquet file").unwrap();

    let config = fx.config.clone().with_job_templates(JobTemplates::default());
    let launcher = Arc::new(RecordingLauncher::default());
    let merger = Arc::new(CountingMerger::default());
    let orch = PipelineOrchestrator::new(config, Arc::new(ProcessCatalog::default()))
        .unwrap()
        .with_launcher(launcher.clone())
        .with_merger(merger.clone());

    let report = orch.run("wzp6_ee_Hbb_ecm125").await.unwrap();

    let python = launcher.launched("python");
    let queries: Vec<_> = python.iter().filter(|s| s.args[0] == "-c").collect();
    assert_eq!(queries.len(), 1);
    assert!(queries[0].args[1].contains("GetEntries()"));
    assert_eq!(queries[0].args[2], stage1.display().to_string());

    assert_eq!(report.events, Some(12));
    assert_eq!(python.iter().filter(|s| s.args[0] == "stage2.py").count(), 4);
    assert_eq!(merger.calls.lock().unwrap()[0].len(), 4);
    assert!(fx.out.join("stage2_Hbb.root").exists());
}

#[tokio::test]
async fn test_aliased_output_dir_rejected_before_launch() {
    let fx = fixture(4, RunMode::Both);
    let aliased = fx.work.join("..").join("tmp");
    let config = fx.config.clone().with_output_dir(&aliased);

    let result = PipelineOrchestrator::new(config, Arc::new(ProcessCatalog::default()));

    assert!(matches!(
        result,
        Err(PipelineError::ConfigError(ConfigError::ValidationFailed(_)))
    ));
}

#[cfg(unix)]
#[tokio::test]
async fn test_output_symlinked_to_work_dir_keeps_merged_artifact() {
    let fx = fixture(4, RunMode::Stage2);
    std::fs::create_dir_all(&fx.work).unwrap();
    std::fs::write(fx.work.join("stage1_Hbb.root"), b"stage1").unwrap();

    let launcher = Arc::new(RecordingLauncher::default());
    let orch = orchestrator(
        fx.config.clone(),
        launcher.clone(),
        Arc::new(FixedCounter::new(8)),
        Arc::new(CountingMerger::default()),
    );
    // The alias appears after construction, so only the copy-time check sees it.
    std::os::unix::fs::symlink(&fx.work, &fx.out).unwrap();

    let err = orch.run("wzp6_ee_Hbb_ecm125").await.unwrap_err();

    assert!(matches!(err, PipelineError::ConfigError(_)));
    assert!(fx.work.join("stage2_Hbb.root").exists());
    assert_eq!(orch.state(), PipelineState::Failed);
}
