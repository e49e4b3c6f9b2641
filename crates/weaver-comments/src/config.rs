//! Engine configuration.
//!
//! Every field has a default, so a config file only needs the values it
//! changes. Files are read by extension: `.json` or `.toml`.

use std::path::{Path, PathBuf};

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use crate::document::COMMENT_MARK;
use crate::layout::LayoutConfig;
use crate::schedule::ScheduleConfig;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommentsConfig {
    /// Name of the mark type carrying threads.
    pub mark_name: SmolStr,
    pub layout: LayoutConfig,
    pub schedule: ScheduleConfig,
}

impl Default for CommentsConfig {
    fn default() -> Self {
        Self {
            mark_name: SmolStr::new_static(COMMENT_MARK),
            layout: LayoutConfig::default(),
            schedule: ScheduleConfig::default(),
        }
    }
}

#[derive(thiserror::Error, Debug, Diagnostic)]
pub enum ConfigError {
    #[error("failed to read {}", path.display())]
    #[diagnostic(code(weaver::comments::config::io))]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON config")]
    #[diagnostic(code(weaver::comments::config::json))]
    Json(#[from] serde_json::Error),

    #[error("invalid TOML config")]
    #[diagnostic(code(weaver::comments::config::toml))]
    Toml(#[from] toml::de::Error),

    #[error("failed to write TOML config")]
    #[diagnostic(code(weaver::comments::config::toml))]
    TomlWrite(#[from] toml::ser::Error),

    #[error("unsupported config format: {}", path.display())]
    #[diagnostic(
        code(weaver::comments::config::format),
        help("use a .json or .toml file")
    )]
    UnsupportedFormat { path: PathBuf },
}

enum Format {
    Json,
    Toml,
}

fn format_of(path: &Path) -> Result<Format, ConfigError> {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => Ok(Format::Json),
        Some("toml") => Ok(Format::Toml),
        _ => Err(ConfigError::UnsupportedFormat {
            path: path.to_path_buf(),
        }),
    }
}

impl CommentsConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let format = format_of(path)?;
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = match format {
            Format::Json => serde_json::from_str(&text)?,
            Format::Toml => toml::from_str(&text)?,
        };
        tracing::debug!(target: "weaver::comments", path = %path.display(), "loaded config");
        Ok(config)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let text = match format_of(path)? {
            Format::Json => serde_json::to_string_pretty(self)?,
            Format::Toml => toml::to_string_pretty(self)?,
        };
        std::fs::write(path, text).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("weaver-comments-{}-{name}", std::process::id()))
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: CommentsConfig = toml::from_str(
            r#"
            mark_name = "annotation"

            [layout]
            spacing = 12.0
            "#,
        )
        .unwrap();
        assert_eq!(config.mark_name, "annotation");
        assert_eq!(config.layout.spacing, 12.0);
        assert_eq!(config.layout.top_offset, LayoutConfig::default().top_offset);
        assert_eq!(config.schedule.delay_ms, 20);
    }

    #[test]
    fn test_json_defaults() {
        let config: CommentsConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, CommentsConfig::default());
        assert_eq!(config.mark_name, COMMENT_MARK);
    }

    #[test]
    fn test_save_and_load_by_extension() {
        let mut config = CommentsConfig::default();
        config.layout.small_screen_width = 800.0;
        for ext in ["json", "toml"] {
            let path = temp_path(&format!("config.{ext}"));
            config.save(&path).unwrap();
            assert_eq!(CommentsConfig::load(&path).unwrap(), config);
            std::fs::remove_file(&path).unwrap();
        }
    }

    #[test]
    fn test_unsupported_and_missing() {
        assert!(matches!(
            CommentsConfig::load("config.yaml"),
            Err(ConfigError::UnsupportedFormat { .. })
        ));
        assert!(matches!(
            CommentsConfig::load(temp_path("missing.toml")),
            Err(ConfigError::Io { .. })
        ));
    }
}
