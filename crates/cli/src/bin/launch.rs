//! `ccell-launch <unit> [args...]`
//!
//! Loads a compiled cell and exits with the value its `run` function returns.
//! A drop-in replacement for the native C loader stub (`ccell --launcher`).

use std::ffi::OsString;

use ccell_lib::loader::{DlLoader, launch};

fn main() {
  let argv: Vec<OsString> = std::env::args_os().collect();
  let code = launch(&DlLoader, &argv, &mut std::io::stderr());
  // `exit` flushes C stdio buffers the unit may have written to.
  std::process::exit(code);
}
