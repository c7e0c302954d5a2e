//! Format detection and deserialization for layout and config files.
//!
//! Files are RON, TOML, or JSON; the format is picked from the extension.

use std::path::{Path, PathBuf};

use robosim_core::error::ConfigurationError;
use serde::de::DeserializeOwned;

// ===========================================================================
// Errors
// ===========================================================================

/// Errors that can occur while loading a layout or config.
#[derive(Debug, thiserror::Error)]
pub enum DataLoadError {
    /// The file has an extension we don't support.
    #[error("unsupported format for file: {file}")]
    UnsupportedFormat { file: PathBuf },

    /// A deserialization error occurred.
    #[error("parse error in {file}: {detail}")]
    Parse { file: PathBuf, detail: String },

    /// A robot target names no component of the layout.
    #[error("robot '{robot}' targets unknown component '{target}'")]
    UnresolvedTarget { robot: String, target: String },

    /// The factory rejected a layout entry.
    #[error("invalid layout: {0}")]
    Configuration(#[from] ConfigurationError),

    /// An I/O error occurred.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

// ===========================================================================
// Format detection
// ===========================================================================

/// Supported data file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Ron,
    Toml,
    Json,
}

/// Detect the format of a file based on its extension.
pub fn detect_format(path: &Path) -> Result<Format, DataLoadError> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("ron") => Ok(Format::Ron),
        Some("toml") => Ok(Format::Toml),
        Some("json") => Ok(Format::Json),
        _ => Err(DataLoadError::UnsupportedFormat {
            file: path.to_path_buf(),
        }),
    }
}

// ===========================================================================
// Deserialization
// ===========================================================================

/// Deserialize `content` in the given format. `path` is only used for error
/// reporting.
pub fn deserialize_str<T: DeserializeOwned>(
    content: &str,
    format: Format,
    path: &Path,
) -> Result<T, DataLoadError> {
    let parse_error = |detail: String| DataLoadError::Parse {
        file: path.to_path_buf(),
        detail,
    };
    match format {
        Format::Ron => ron::from_str(content).map_err(|e| parse_error(e.to_string())),
        Format::Json => serde_json::from_str(content).map_err(|e| parse_error(e.to_string())),
        Format::Toml => toml::from_str(content).map_err(|e| parse_error(e.to_string())),
    }
}

/// Read a file and deserialize it according to its format (detected from extension).
pub fn deserialize_file<T: DeserializeOwned>(path: &Path) -> Result<T, DataLoadError> {
    let format = detect_format(path)?;
    let content = std::fs::read_to_string(path)?;
    deserialize_str(&content, format, path)
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use robosim_core::config::SimulationConfig;
    use std::fs;

    /// Create a temporary directory with a unique name for test isolation.
    fn make_test_dir(suffix: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "robosim_data_test_{suffix}_{}",
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn cleanup(dir: &Path) {
        let _ = fs::remove_dir_all(dir);
    }

    // -----------------------------------------------------------------------
    // detect_format
    // -----------------------------------------------------------------------

    #[test]
    fn detect_format_by_extension() {
        assert_eq!(detect_format(Path::new("floor.ron")).unwrap(), Format::Ron);
        assert_eq!(detect_format(Path::new("floor.toml")).unwrap(), Format::Toml);
        assert_eq!(detect_format(Path::new("floor.json")).unwrap(), Format::Json);
    }

    #[test]
    fn detect_format_unsupported() {
        for name in ["floor.yaml", "floor"] {
            assert!(matches!(
                detect_format(Path::new(name)),
                Err(DataLoadError::UnsupportedFormat { .. })
            ));
        }
    }

    // -----------------------------------------------------------------------
    // deserialize_file
    // -----------------------------------------------------------------------

    #[test]
    fn config_reads_in_every_format() {
        let dir = make_test_dir("config_formats");
        fs::write(dir.join("a.toml"), "tick_interval_ms = 20\n").unwrap();
        fs::write(dir.join("b.json"), r#"{"grid_step": 10}"#).unwrap();
        fs::write(dir.join("c.ron"), "(robot_speed: 3)").unwrap();

        let a: SimulationConfig = deserialize_file(&dir.join("a.toml")).unwrap();
        let b: SimulationConfig = deserialize_file(&dir.join("b.json")).unwrap();
        let c: SimulationConfig = deserialize_file(&dir.join("c.ron")).unwrap();
        assert_eq!(a.tick_interval_ms, 20);
        assert_eq!(a.grid_step, 5);
        assert_eq!(b.grid_step, 10);
        assert_eq!(c.robot_speed, 3);

        cleanup(&dir);
    }

    #[test]
    fn parse_errors_name_the_file() {
        let dir = make_test_dir("parse_error");
        let path = dir.join("broken.json");
        fs::write(&path, "{ not json").unwrap();

        let err = deserialize_file::<SimulationConfig>(&path).unwrap_err();
        assert!(matches!(&err, DataLoadError::Parse { file, .. } if *file == path));

        cleanup(&dir);
    }

    #[test]
    fn missing_file_is_io_error() {
        let result = deserialize_file::<SimulationConfig>(Path::new("/nonexistent/robosim.toml"));
        assert!(matches!(result, Err(DataLoadError::Io(_))));
    }
}
