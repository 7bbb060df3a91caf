//! Dynamic loading of compiled units.
//!
//! A compiled unit is a shared object exporting `int run(void)`. The
//! [`Loader`] trait is the capability needed to call it: load a library,
//! resolve the entry point, unload. [`DlLoader`] implements it over the
//! platform's dynamic loader, and [`launch`] implements the launcher
//! contract shared with the native C stub:
//!
//! ```text
//! launcher <unit.so> [args...]
//! ```
//!
//! Usage, load and symbol failures print a diagnostic and yield exit code 1;
//! otherwise the exit code is whatever `run` returned.

use std::ffi::OsString;
use std::io::Write;
use std::os::raw::c_int;
use std::path::Path;

use thiserror::Error;

use crate::consts::{ENTRY_SYMBOL, LAUNCH_FAILURE};

/// Signature of the unit entry point.
pub type EntryPoint = unsafe extern "C" fn() -> c_int;

/// Errors reported by a [`Loader`].
#[derive(Debug, Error)]
pub enum LoadError {
  #[error("{path}: {message}")]
  Open { path: String, message: String },

  #[error("{name}: {message}")]
  Symbol { name: String, message: String },

  #[error("{message}")]
  Close { message: String },
}

/// Load, resolve and unload shared objects.
pub trait Loader {
  type Handle;

  fn load(&self, path: &Path) -> Result<Self::Handle, LoadError>;

  /// Resolve `name` to an entry point. The pointer is valid until `handle`
  /// is unloaded.
  fn resolve(&self, handle: &Self::Handle, name: &str) -> Result<EntryPoint, LoadError>;

  fn unload(&self, handle: Self::Handle) -> Result<(), LoadError>;
}

/// [`Loader`] backed by `libloading` (`dlopen` with `RTLD_NOW` on Unix).
#[derive(Debug, Clone, Copy, Default)]
pub struct DlLoader;

impl Loader for DlLoader {
  type Handle = libloading::Library;

  fn load(&self, path: &Path) -> Result<Self::Handle, LoadError> {
    let open_error = |e: libloading::Error| LoadError::Open {
      path: path.display().to_string(),
      message: e.to_string(),
    };

    // SAFETY: loading a unit runs its initializers. Units are user code the
    // caller asked to execute, so running them is the point.
    #[cfg(unix)]
    let library = unsafe { libloading::os::unix::Library::open(Some(path), libloading::os::unix::RTLD_NOW) }
      .map(libloading::Library::from)
      .map_err(open_error)?;

    #[cfg(not(unix))]
    let library = unsafe { libloading::Library::new(path) }.map_err(open_error)?;

    Ok(library)
  }

  fn resolve(&self, handle: &Self::Handle, name: &str) -> Result<EntryPoint, LoadError> {
    // SAFETY: the symbol contract for units is `int run(void)`.
    let symbol = unsafe { handle.get::<EntryPoint>(name.as_bytes()) }.map_err(|e| LoadError::Symbol {
      name: name.to_string(),
      message: e.to_string(),
    })?;
    Ok(*symbol)
  }

  fn unload(&self, handle: Self::Handle) -> Result<(), LoadError> {
    handle.close().map_err(|e| LoadError::Close { message: e.to_string() })
  }
}

/// Run the launcher contract for `argv` and return the process exit code.
///
/// `argv[0]` is the launcher name, `argv[1]` the unit path. Any further
/// arguments stay in the process argv only; `run` takes no parameters.
/// Diagnostics are written to `stderr`.
pub fn launch<L, W>(loader: &L, argv: &[OsString], stderr: &mut W) -> i32
where
  L: Loader,
  W: Write,
{
  if argv.len() < 2 {
    let name = argv
      .first()
      .map(|s| s.to_string_lossy().into_owned())
      .unwrap_or_else(|| "ccell-launch".to_string());
    let _ = writeln!(stderr, "Usage: {name} <shared_object> [args...]");
    return LAUNCH_FAILURE;
  }

  let handle = match loader.load(Path::new(&argv[1])) {
    Ok(handle) => handle,
    Err(e) => {
      let _ = writeln!(stderr, "Error loading shared object: {e}");
      return LAUNCH_FAILURE;
    }
  };

  let entry = match loader.resolve(&handle, ENTRY_SYMBOL) {
    Ok(entry) => entry,
    Err(e) => {
      let _ = writeln!(stderr, "Error finding symbol '{ENTRY_SYMBOL}': {e}");
      let _ = loader.unload(handle);
      return LAUNCH_FAILURE;
    }
  };

  // SAFETY: `entry` was resolved from `handle`, which stays loaded until
  // after the call returns.
  let code = unsafe { entry() };

  if let Err(e) = loader.unload(handle) {
    let _ = writeln!(stderr, "Error unloading shared object: {e}");
  }

  code
}
