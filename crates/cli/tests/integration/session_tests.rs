//! Tests for `ccell session`.

use predicates::prelude::*;

use super::common::{TestEnv, require_cc};

const SESSION: &str = r#"#include <stdio.h>
int run(void) { printf("one\n"); return 0; }
//%% second cell
//%cflags: -DVALUE=2
#include <stdio.h>
int run(void) { printf("%d\n", VALUE); return 0; }
//%%
int run(void) { return 5; }
"#;

#[test]
fn session_runs_cells_in_order() {
  require_cc!();
  let env = TestEnv::new();
  let session = env.write_file("session.c", SESSION);

  env
    .ccell()
    .arg("session")
    .arg(&session)
    .assert()
    .code(5)
    .stdout("one\n2\n")
    .stderr(predicate::str::contains("[cell 1/3]"))
    .stderr(predicate::str::contains("[cell 3/3]"));

  // The stub is removed after the last cell.
  assert!(env.leftovers().is_empty());
}

#[test]
fn session_stops_at_first_failure() {
  require_cc!();
  let env = TestEnv::new();
  let session = env.write_file(
    "stop.c",
    "int run(void) { return 0 }\n//%%\n#include <stdio.h>\nint run(void) { printf(\"later\\n\"); return 0; }\n",
  );

  env
    .ccell()
    .arg("session")
    .arg(&session)
    .assert()
    .code(1)
    .stdout(predicate::str::contains("later").not())
    .stderr(predicate::str::contains("[cell 2/2]").not());
}

#[test]
fn keep_going_runs_remaining_cells() {
  require_cc!();
  let env = TestEnv::new();
  let session = env.write_file(
    "keep.c",
    "int run(void) { return 0 }\n//%%\n#include <stdio.h>\nint run(void) { printf(\"later\\n\"); return 0; }\n",
  );

  env
    .ccell()
    .args(["session", "--keep-going"])
    .arg(&session)
    .assert()
    .success()
    .stdout("later\n");
}
