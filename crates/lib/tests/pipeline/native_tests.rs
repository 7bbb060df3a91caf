//! End-to-end cells with the system C compiler and the native loader stub.

use ccell_lib::{CapturedOutput, CellOutcome, OutputKind, Pipeline};
use tempfile::TempDir;

use crate::common::{config_in, files_in, require_cc};

#[tokio::test]
async fn run_return_value_is_the_exit_code() {
  require_cc!();
  let work = TempDir::new().unwrap();
  let pipeline = Pipeline::init(config_in(&work)).await.unwrap();

  let mut sink = CapturedOutput::new();
  let outcome = pipeline
    .run_cell("int run(void) { return 42; }\n", &mut sink)
    .await
    .unwrap();

  assert!(matches!(outcome, CellOutcome::Completed { .. }));
  assert_eq!(outcome.exit_code(), 42);
  pipeline.teardown();
}

#[tokio::test]
async fn program_output_is_streamed() {
  require_cc!();
  let work = TempDir::new().unwrap();
  let pipeline = Pipeline::init(config_in(&work)).await.unwrap();

  let source = r#"
#include <stdio.h>

int run(void) {
  printf("hello from C\n");
  fprintf(stderr, "to stderr\n");
  return 0;
}
"#;
  let mut sink = CapturedOutput::new();
  let outcome = pipeline.run_cell(source, &mut sink).await.unwrap();

  assert!(outcome.success());
  assert_eq!(sink.text_of(OutputKind::Stdout), "hello from C\n");
  assert_eq!(sink.text_of(OutputKind::Stderr), "to stderr\n");
  pipeline.teardown();
}

#[tokio::test]
async fn missing_run_symbol_exits_1_with_diagnostic() {
  require_cc!();
  let work = TempDir::new().unwrap();
  let pipeline = Pipeline::init(config_in(&work)).await.unwrap();

  let mut sink = CapturedOutput::new();
  let outcome = pipeline
    .run_cell("int not_run(void) { return 0; }\n", &mut sink)
    .await
    .unwrap();

  assert_eq!(outcome.state(), ccell_lib::PipelineState::Done);
  assert_eq!(outcome.exit_code(), 1);
  let stderr = outcome.run().unwrap().stderr();
  assert!(stderr.contains("run") || stderr.contains("symbol"), "stderr: {stderr}");
  pipeline.teardown();
}

#[tokio::test]
async fn syntax_error_is_a_compile_failure() {
  require_cc!();
  let work = TempDir::new().unwrap();
  let pipeline = Pipeline::init(config_in(&work)).await.unwrap();

  let mut sink = CapturedOutput::new();
  let outcome = pipeline
    .run_cell("int run(void) { return 0 }\n", &mut sink)
    .await
    .unwrap();

  assert!(matches!(outcome, CellOutcome::CompileFailed { .. }));
  assert_ne!(outcome.exit_code(), 0);
  assert!(!outcome.compile().stderr().is_empty());
  assert!(!sink.text_of(OutputKind::Stderr).is_empty());
  assert!(!sink.text_of(OutputKind::Status).contains("Running..."));
  pipeline.teardown();
}

#[tokio::test]
async fn directives_reach_the_compiler_and_linker() {
  require_cc!();
  let work = TempDir::new().unwrap();
  let pipeline = Pipeline::init(config_in(&work)).await.unwrap();

  let source = r#"//%cflags: -DVALUE=7
//%ldflags: -lm
#include <math.h>

int run(void) {
  volatile double x = 49.0;
  return (int)sqrt(x) + VALUE;
}
"#;
  let outcome = pipeline.run_cell(source, &mut CapturedOutput::new()).await.unwrap();

  assert_eq!(outcome.exit_code(), 14);
  pipeline.teardown();
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn program_args_are_passed_to_the_launcher() {
  require_cc!();
  let work = TempDir::new().unwrap();
  let pipeline = Pipeline::init(config_in(&work)).await.unwrap();

  // `run` takes no parameters; the arguments are visible in the process argv.
  let source = r#"//%args: alpha "beta gamma"
#include <stdio.h>

int run(void) {
  FILE *f = fopen("/proc/self/cmdline", "rb");
  if (!f) return 2;
  char buf[4096];
  size_t n = fread(buf, 1, sizeof(buf), f);
  fclose(f);
  int field = 0;
  for (size_t i = 0; i < n; i++) {
    if (buf[i] == '\0') { field++; if (field >= 2) putchar('\n'); continue; }
    if (field >= 2) putchar(buf[i]);
  }
  return 0;
}
"#;
  let mut sink = CapturedOutput::new();
  let outcome = pipeline.run_cell(source, &mut sink).await.unwrap();

  assert!(outcome.success());
  assert_eq!(sink.text_of(OutputKind::Stdout), "alpha\nbeta gamma\n");
  pipeline.teardown();
}

#[tokio::test]
async fn stub_is_built_once_and_removed_on_teardown() {
  require_cc!();
  let work = TempDir::new().unwrap();
  let pipeline = Pipeline::init(config_in(&work)).await.unwrap();
  let stub = pipeline.stub().path().to_path_buf();

  // Only the stub lives in the work dir between cells.
  assert_eq!(files_in(work.path()), [stub.clone()]);

  let first = pipeline
    .run_cell("int run(void) { return 3; }\n", &mut CapturedOutput::new())
    .await
    .unwrap();
  assert_eq!(first.exit_code(), 3);
  assert_eq!(files_in(work.path()), [stub.clone()]);

  let second = pipeline
    .run_cell("int run(void) { return 0 }\n", &mut CapturedOutput::new())
    .await
    .unwrap();
  assert!(matches!(second, CellOutcome::CompileFailed { .. }));
  assert_eq!(files_in(work.path()), [stub.clone()]);

  let third = pipeline
    .run_cell("int run(void) { return 5; }\n", &mut CapturedOutput::new())
    .await
    .unwrap();
  assert_eq!(third.exit_code(), 5);
  assert_eq!(pipeline.stub().path(), stub);

  pipeline.teardown();
  assert!(files_in(work.path()).is_empty());
}
