//! User-facing terminal messages
//!
//! Plain colored messages on stderr, separate from `log` output so that
//! results on stdout stay machine-readable.

use owo_colors::OwoColorize;

/// Display a warning message to the user in yellow with padding
///
/// # Example
/// ```ignore
/// output::warn("src/scripts/seed.ts belongs to no module.");
/// ```
pub fn warn(message: &str) {
    eprintln!("\n{}\n", message.yellow());
}

/// Display an error message to the user in red with padding
pub fn error(message: &str) {
    eprintln!("\n{}\n", message.red());
}

/// Display an informational message to the user in default color with padding
pub fn info(message: &str) {
    eprintln!("\n{}\n", message);
}
