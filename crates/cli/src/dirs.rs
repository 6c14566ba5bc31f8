//! Platform-specific directory utilities

use std::path::PathBuf;

/// Get the platform-specific entity store directory
///
/// Follows platform conventions:
/// - macOS: `~/Library/Application Support/sheet/entities`
/// - Linux: `~/.local/share/sheet/entities` (or `$XDG_DATA_HOME/sheet/entities`)
/// - Windows: `%APPDATA%\sheet\entities`
/// - Fallback: `./sheet_data/entities`
pub fn store_dir() -> PathBuf {
    directories::ProjectDirs::from("", "", "sheet")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("./sheet_data"))
        .join("entities")
}
