//! Pipeline sequencing with stand-in compilers and launchers.
//!
//! These tests do not need a C compiler: `true`/`false` play the compiler and
//! small shell scripts play the loader stub.

use std::time::{Duration, Instant};

use ccell_lib::pipeline::Stage;
use ccell_lib::stub::LoaderStub;
use ccell_lib::{CapturedOutput, CellOutcome, OutputKind, Pipeline, PipelineConfig, PipelineError, PipelineState};
use tempfile::TempDir;

use crate::common::{SpyRunner, config_in, files_in, write_script};

fn with_compiler(dir: &TempDir, compiler: &str) -> PipelineConfig {
  PipelineConfig {
    compiler: compiler.to_string(),
    ..config_in(dir)
  }
}

#[tokio::test]
async fn compile_failure_never_spawns_run_step() {
  let work = TempDir::new().unwrap();
  let bin = TempDir::new().unwrap();
  let launcher = write_script(bin.path(), "launcher", "echo should-not-run");

  let runner = SpyRunner::default();
  let pipeline = Pipeline::new(
    with_compiler(&work, "false"),
    runner,
    LoaderStub::prebuilt(&launcher).unwrap(),
  )
  .unwrap();

  let mut sink = CapturedOutput::new();
  let outcome = pipeline.run_cell("int run(void) { return 0 }\n", &mut sink).await.unwrap();

  assert!(matches!(outcome, CellOutcome::CompileFailed { .. }));
  assert_eq!(outcome.state(), PipelineState::CompileFailed);
  assert_eq!(outcome.exit_code(), 1);

  let calls = pipeline.runner().calls();
  assert_eq!(calls.len(), 1, "only the compiler may be spawned");
  assert_eq!(calls[0].program(), "false");

  let status = sink.text_of(OutputKind::Status);
  assert!(status.contains("Compiling..."));
  assert!(status.contains("Compilation failed (exit code 1)"));
  assert!(!status.contains("Running..."));
  assert!(!sink.text().contains("should-not-run"));
}

#[tokio::test]
async fn compile_command_carries_directives() {
  let work = TempDir::new().unwrap();
  let bin = TempDir::new().unwrap();
  let launcher = write_script(bin.path(), "launcher", "exit 0");

  let pipeline = Pipeline::new(
    with_compiler(&work, "true"),
    SpyRunner::default(),
    LoaderStub::prebuilt(&launcher).unwrap(),
  )
  .unwrap();

  let source = "//%cflags: -O2 -Wall\n//%ldflags: -lm\n//%args: a \"b c\" d\nint run(void) { return 0; }\n";
  pipeline.run_cell(source, &mut CapturedOutput::new()).await.unwrap();

  let calls = pipeline.runner().calls();
  assert_eq!(calls.len(), 2);

  let compile = calls[0].to_vec_lossy();
  assert_eq!(compile[0], "true");
  assert_eq!(&compile[2..6], ["-std=c11", "-fPIC", "-shared", "-rdynamic"]);
  assert_eq!(&compile[6..9], ["-O2", "-Wall", "-o"]);
  assert_eq!(compile.last().unwrap(), "-lm");
  assert!(compile[1].ends_with(".c"));
  assert!(compile[9].ends_with(".so"));

  let run = calls[1].to_vec_lossy();
  assert_eq!(run[0], launcher.to_string_lossy());
  assert_eq!(run[1], compile[9]);
  assert_eq!(&run[2..], ["a", "b c", "d"]);
}

#[tokio::test]
async fn run_output_and_exit_code_are_reported() {
  let work = TempDir::new().unwrap();
  let bin = TempDir::new().unwrap();
  let launcher = write_script(bin.path(), "launcher", "echo out; echo err >&2; exit 42");

  let pipeline = Pipeline::new(
    with_compiler(&work, "true"),
    SpyRunner::default(),
    LoaderStub::prebuilt(&launcher).unwrap(),
  )
  .unwrap();

  let mut sink = CapturedOutput::new();
  let outcome = pipeline.run_cell("int run(void) { return 42; }", &mut sink).await.unwrap();

  assert_eq!(outcome.state(), PipelineState::Done);
  assert_eq!(outcome.exit_code(), 42);
  let run = outcome.run().unwrap();
  assert_eq!(run.stdout(), "out\n");
  assert_eq!(run.stderr(), "err\n");

  assert_eq!(sink.text_of(OutputKind::Stdout), "out\n");
  assert_eq!(sink.text_of(OutputKind::Stderr), "err\n");
  let status = sink.text_of(OutputKind::Status);
  assert!(status.starts_with("Compiling...\nRunning...\n"));
  assert!(status.contains("Process exited with code 42"));
}

#[tokio::test]
async fn artifacts_are_removed_after_each_cell() {
  let work = TempDir::new().unwrap();
  let bin = TempDir::new().unwrap();
  let launcher = write_script(bin.path(), "launcher", "test -f \"$1\" && echo unit-present");

  let pipeline = Pipeline::new(
    with_compiler(&work, "true"),
    SpyRunner::default(),
    LoaderStub::prebuilt(&launcher).unwrap(),
  )
  .unwrap();

  let mut sink = CapturedOutput::new();
  pipeline.run_cell("int run(void) { return 0; }", &mut sink).await.unwrap();
  // The unit existed while the launcher ran.
  assert_eq!(sink.text_of(OutputKind::Stdout), "unit-present\n");
  assert!(files_in(work.path()).is_empty());

  let failing = Pipeline::new(
    with_compiler(&work, "false"),
    SpyRunner::default(),
    LoaderStub::prebuilt(&launcher).unwrap(),
  )
  .unwrap();
  failing.run_cell("broken", &mut CapturedOutput::new()).await.unwrap();
  assert!(files_in(work.path()).is_empty());
}

#[tokio::test]
async fn output_is_forwarded_before_the_process_exits() {
  let work = TempDir::new().unwrap();
  let bin = TempDir::new().unwrap();
  let launcher = write_script(bin.path(), "launcher", "echo first; sleep 1; echo second");

  let pipeline = Pipeline::new(
    with_compiler(&work, "true"),
    SpyRunner::default(),
    LoaderStub::prebuilt(&launcher).unwrap(),
  )
  .unwrap();

  let start = Instant::now();
  let mut stdout = Vec::new();
  let mut sink = |kind: OutputKind, text: &str| {
    if kind == OutputKind::Stdout {
      stdout.push((text.to_string(), start.elapsed()));
    }
  };
  let outcome = pipeline.run_cell("int run(void) { return 0; }", &mut sink).await.unwrap();
  let finished = start.elapsed();

  assert!(outcome.success());
  assert_eq!(stdout.len(), 2);
  assert_eq!(stdout[0].0, "first\n");
  assert_eq!(stdout[1].0, "second\n");
  // The first line arrived well before the process finished.
  assert!(finished - stdout[0].1 >= Duration::from_millis(500));
}

#[tokio::test]
async fn missing_compiler_is_a_startup_failure() {
  let work = TempDir::new().unwrap();
  let bin = TempDir::new().unwrap();
  let launcher = write_script(bin.path(), "launcher", "exit 0");

  let pipeline = Pipeline::new(
    with_compiler(&work, "/nonexistent/ccell-cc"),
    SpyRunner::default(),
    LoaderStub::prebuilt(&launcher).unwrap(),
  )
  .unwrap();

  let mut sink = CapturedOutput::new();
  let result = pipeline.run_cell("int run(void) { return 0; }", &mut sink).await;

  assert!(matches!(result, Err(PipelineError::CompileStartup(_))));
  assert!(sink.text_of(OutputKind::Status).contains("Failed to start compiler"));
  assert!(files_in(work.path()).is_empty());
}

#[tokio::test]
async fn missing_launcher_is_a_startup_failure() {
  let work = TempDir::new().unwrap();
  let bin = TempDir::new().unwrap();
  let launcher = write_script(bin.path(), "launcher", "exit 0");

  let pipeline = Pipeline::new(
    with_compiler(&work, "true"),
    SpyRunner::default(),
    LoaderStub::prebuilt(&launcher).unwrap(),
  )
  .unwrap();
  std::fs::remove_file(&launcher).unwrap();

  let mut sink = CapturedOutput::new();
  let result = pipeline.run_cell("int run(void) { return 0; }", &mut sink).await;

  assert!(matches!(result, Err(PipelineError::RunStartup(_))));
  assert!(sink.text_of(OutputKind::Status).contains("Failed to start loader stub"));
  assert!(files_in(work.path()).is_empty());
}

#[tokio::test]
async fn timeout_stops_a_long_running_cell() {
  let work = TempDir::new().unwrap();
  let bin = TempDir::new().unwrap();
  let launcher = write_script(bin.path(), "launcher", "echo started; exec sleep 10");

  let config = PipelineConfig {
    timeout: Some("300ms".to_string()),
    ..with_compiler(&work, "true")
  };
  let pipeline = Pipeline::new(config, SpyRunner::default(), LoaderStub::prebuilt(&launcher).unwrap()).unwrap();

  let mut sink = CapturedOutput::new();
  let start = Instant::now();
  let result = pipeline.run_cell("int run(void) { for (;;); }", &mut sink).await;

  assert!(matches!(result, Err(PipelineError::TimedOut { stage: Stage::Run, .. })));
  assert!(start.elapsed() < Duration::from_secs(5));
  assert!(sink.text_of(OutputKind::Status).contains("Timed out"));
  assert!(files_in(work.path()).is_empty());
}

#[tokio::test]
async fn invalid_timeout_is_rejected_at_construction() {
  let work = TempDir::new().unwrap();
  let bin = TempDir::new().unwrap();
  let launcher = write_script(bin.path(), "launcher", "exit 0");

  let config = PipelineConfig {
    timeout: Some("whenever".to_string()),
    ..config_in(&work)
  };
  let result = Pipeline::new(config, SpyRunner::default(), LoaderStub::prebuilt(&launcher).unwrap());
  assert!(matches!(result, Err(PipelineError::Config(_))));
}

#[tokio::test]
async fn background_child_does_not_delay_the_cell() {
  let work = TempDir::new().unwrap();
  let bin = TempDir::new().unwrap();
  let launcher = write_script(bin.path(), "launcher", "echo hi; (sleep 4 &); exit 0");

  let pipeline = Pipeline::new(
    with_compiler(&work, "true"),
    SpyRunner::default(),
    LoaderStub::prebuilt(&launcher).unwrap(),
  )
  .unwrap();

  let mut sink = CapturedOutput::new();
  let start = Instant::now();
  let outcome = pipeline.run_cell("int run(void) { return 0; }", &mut sink).await.unwrap();

  assert!(start.elapsed() < Duration::from_secs(2));
  assert!(outcome.success());
  assert_eq!(sink.text_of(OutputKind::Stdout), "hi\n");
}

#[tokio::test]
async fn clean_exit_with_background_child_is_not_a_timeout() {
  let work = TempDir::new().unwrap();
  let bin = TempDir::new().unwrap();
  let launcher = write_script(bin.path(), "launcher", "echo hi; (sleep 4 &); exit 0");

  let config = PipelineConfig {
    timeout: Some("1s".to_string()),
    ..with_compiler(&work, "true")
  };
  let pipeline = Pipeline::new(config, SpyRunner::default(), LoaderStub::prebuilt(&launcher).unwrap()).unwrap();

  let mut sink = CapturedOutput::new();
  let outcome = pipeline.run_cell("int run(void) { return 0; }", &mut sink).await.unwrap();

  assert_eq!(outcome.state(), PipelineState::Done);
  assert_eq!(outcome.exit_code(), 0);
  assert!(!sink.text_of(OutputKind::Status).contains("Timed out"));
}

#[tokio::test]
async fn unusable_work_dir_is_reported_to_the_sink() {
  let bin = TempDir::new().unwrap();
  let launcher = write_script(bin.path(), "launcher", "exit 0");
  let not_a_dir = bin.path().join("plain-file");
  std::fs::write(&not_a_dir, b"").unwrap();

  let config = PipelineConfig {
    compiler: "true".to_string(),
    work_dir: Some(not_a_dir),
    ..Default::default()
  };
  let pipeline = Pipeline::new(config, SpyRunner::default(), LoaderStub::prebuilt(&launcher).unwrap()).unwrap();

  let mut sink = CapturedOutput::new();
  let result = pipeline.run_cell("int run(void) { return 0; }", &mut sink).await;

  assert!(matches!(result, Err(PipelineError::Io(_))));
  assert!(sink.text_of(OutputKind::Status).contains("Failed to create temporary artifact"));
  assert!(pipeline.runner().calls().is_empty());
}
