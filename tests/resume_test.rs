use shardflow::collaborator::{Consolidator, Extractor, Phase};
use shardflow::error::{CollaboratorError, ExtractError};
use shardflow::{PipelineConfig, PipelineError, Scope, WorkerPipeline, record};
use std::cell::{Cell, RefCell};
use std::fs;
use std::path::Path;

/// Emits one record per line. Reports the engine as down when it reaches
/// `fail_on` while `armed` is set.
struct FlakyExtractor {
    fail_on: &'static str,
    armed: Cell<bool>,
    calls: RefCell<Vec<String>>,
}

impl FlakyExtractor {
    fn new(fail_on: &'static str, armed: bool) -> Self {
        Self {
            fail_on,
            armed: Cell::new(armed),
            calls: RefCell::new(Vec::new()),
        }
    }
}

impl Extractor<String> for FlakyExtractor {
    fn extract(&self, path: &Path) -> Result<Vec<String>, ExtractError> {
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        self.calls.borrow_mut().push(name.clone());
        if self.armed.get() && name == self.fail_on {
            return Err(ExtractError::EngineUnavailable("engine pool is down".into()));
        }
        let text = fs::read_to_string(path).unwrap();
        Ok(text.lines().map(|l| format!("{name}:{l}")).collect())
    }
}

/// Sorts in preassembly; can be told to crash there once. Records the input
/// size of every grounding call.
struct CountingConsolidator {
    crash_preassembly: Cell<bool>,
    grounding_inputs: RefCell<Vec<usize>>,
}

impl CountingConsolidator {
    fn new(crash_preassembly: bool) -> Self {
        Self {
            crash_preassembly: Cell::new(crash_preassembly),
            grounding_inputs: RefCell::new(Vec::new()),
        }
    }
}

impl Consolidator<String> for CountingConsolidator {
    fn ground(&self, records: Vec<String>) -> Result<Vec<String>, CollaboratorError> {
        self.grounding_inputs.borrow_mut().push(records.len());
        Ok(records.into_iter().map(|r| r.to_uppercase()).collect())
    }

    fn map_sequence(&self, records: Vec<String>) -> Result<Vec<String>, CollaboratorError> {
        Ok(records)
    }

    fn preassemble(&self, mut records: Vec<String>) -> Result<Vec<String>, CollaboratorError> {
        if self.crash_preassembly.replace(false) {
            return Err("preassembly worker crashed".into());
        }
        records.sort();
        Ok(records)
    }
}

fn write_inputs(base: &Path) {
    let input = base.join("input");
    fs::create_dir_all(&input).unwrap();
    for (i, name) in ["a.xml", "b.xml", "c.xml", "d.xml", "e.xml"].iter().enumerate() {
        let body = (0..=i).map(|n| format!("line{n}")).collect::<Vec<_>>().join("\n");
        fs::write(input.join(name), body).unwrap();
    }
}

fn local_output(config: &PipelineConfig) -> Vec<String> {
    record::read_records(&config.output_path(config.scope(), &Phase::Local.output_file())).unwrap()
}

fn baseline_output() -> Vec<String> {
    let base = tempfile::tempdir().unwrap();
    write_inputs(base.path());
    let config = PipelineConfig::under_base(0, 1, base.path()).with_checkpoint_every(2);
    WorkerPipeline::new(&config, FlakyExtractor::new("", false), CountingConsolidator::new(false))
        .run()
        .unwrap();
    local_output(&config)
}

#[test]
fn test_resume_after_engine_failure_matches_uninterrupted_run() {
    let base = tempfile::tempdir().unwrap();
    write_inputs(base.path());
    let config = PipelineConfig::under_base(0, 1, base.path()).with_checkpoint_every(2);

    // d.xml is index 3: a, b flushed at 2, c processed but never flushed.
    let extractor = FlakyExtractor::new("d.xml", true);
    let first = WorkerPipeline::new(&config, &extractor, CountingConsolidator::new(false)).run();
    assert!(matches!(first, Err(PipelineError::EngineUnavailable { .. })));
    assert_eq!(*extractor.calls.borrow(), vec!["a.xml", "b.xml", "c.xml", "d.xml"]);
    assert!(!config.worker_stats_path(0).exists());

    extractor.armed.set(false);
    extractor.calls.borrow_mut().clear();
    let summary = WorkerPipeline::new(&config, &extractor, CountingConsolidator::new(false))
        .run()
        .unwrap();

    assert_eq!(*extractor.calls.borrow(), vec!["c.xml", "d.xml", "e.xml"]);
    assert_eq!(summary.resumed_from, Some(2));
    assert_eq!(summary.output_records, 15);
    assert_eq!(local_output(&config), baseline_output());
    assert!(summary.aggregate.is_some());
}

#[test]
fn test_crash_during_consolidation_reuses_finished_work() {
    let base = tempfile::tempdir().unwrap();
    write_inputs(base.path());
    let config = PipelineConfig::under_base(0, 1, base.path()).with_checkpoint_every(2);

    let extractor = FlakyExtractor::new("", false);
    let consolidator = CountingConsolidator::new(true);
    let first = WorkerPipeline::new(&config, &extractor, &consolidator).run();
    match first {
        Err(PipelineError::Stage { stage, .. }) => assert_eq!(stage, "local_consolidation_preassembly"),
        other => panic!("expected a stage failure, got {other:?}"),
    }
    assert_eq!(*consolidator.grounding_inputs.borrow(), vec![15]);
    let local_grounding = config.checkpoint_path(config.scope(), "local_consolidation_grounding.bin");
    let grounded_before = fs::read(&local_grounding).unwrap();

    extractor.calls.borrow_mut().clear();
    let summary = WorkerPipeline::new(&config, &extractor, &consolidator).run().unwrap();

    assert!(extractor.calls.borrow().is_empty(), "extraction was fully checkpointed");
    assert_eq!(summary.resumed_from, Some(5));
    // Local grounding is restored; the only new call is the master's final pass.
    assert_eq!(*consolidator.grounding_inputs.borrow(), vec![15, 15]);
    assert_eq!(fs::read(&local_grounding).unwrap(), grounded_before);
    assert!(config.checkpoint_path(Scope::Master, "final_consolidation_grounding.bin").exists());
    assert_eq!(summary.aggregate.unwrap().final_records, 15);
    assert_eq!(local_output(&config), baseline_output());
}
