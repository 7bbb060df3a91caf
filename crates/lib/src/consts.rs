/// Application name, used for config directories and temp file prefixes.
pub const APP_NAME: &str = "ccell";

/// Prefix every line must start with to be read as a build directive.
pub const DIRECTIVE_MARKER: &str = "//%";

/// Line prefix separating cells in a session file.
pub const CELL_SEPARATOR: &str = "//%%";

/// Symbol every compiled unit must export: `int run(void)`.
pub const ENTRY_SYMBOL: &str = "run";

/// Size of each read issued by the stream reader tasks.
pub const CHUNK_SIZE: usize = 4096;

/// Exit code the launchers use for usage, load and symbol failures.
pub const LAUNCH_FAILURE: i32 = 1;

/// How long output may keep arriving after a process has exited. Pipes held
/// open by background children are abandoned after this.
pub const OUTPUT_GRACE: std::time::Duration = std::time::Duration::from_millis(200);
