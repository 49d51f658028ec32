// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Parsed project manifest data shapes.
//!
//! The manifest-file *syntax* is out of scope (spec §1 Non-goals) — real
//! deployments are expected to bring their own front-end parser that
//! produces these shapes. This module's `toml` loader exists only so the
//! fixtures used by `anvil-build`/`anvil-engine` tests and the end-to-end
//! specs are self-contained; it is deliberately not a venue for flag-table
//! or platform-specific logic, which belongs to `anvil-build`'s
//! `PlatformSpec` implementations.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

/// A reference to a third-party library dependency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibRef {
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
}

/// A named build configuration: platform, board, flags, and libraries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    pub platform: String,
    pub board: String,
    pub framework: String,
    #[serde(default)]
    pub libraries: Vec<LibRef>,
    #[serde(default)]
    pub build_flags: Vec<String>,
    #[serde(default)]
    pub upload_port: Option<String>,
}

/// A parsed project manifest: one or more named environments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectManifest {
    pub environments: BTreeMap<String, Environment>,
}

impl ProjectManifest {
    pub fn environment(&self, name: &str) -> Result<&Environment, ManifestError> {
        self.environments
            .get(name)
            .ok_or_else(|| ManifestError::UnknownEnvironment { name: name.to_string() })
    }

    pub fn from_toml_str(s: &str) -> Result<Self, ManifestError> {
        toml::from_str(s).map_err(ManifestError::Parse)
    }

    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|source| ManifestError::Read { path: path.to_path_buf(), source })?;
        Self::from_toml_str(&contents)
    }
}

/// Errors raised while loading or validating a manifest.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read manifest at {path}: {source}")]
    Read { path: std::path::PathBuf, source: std::io::Error },
    #[error("failed to parse manifest: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("unknown environment '{name}'")]
    UnknownEnvironment { name: String },
    #[error("manifest is missing required field '{field}'")]
    MissingField { field: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        [environments.uno]
        platform = "atmelavr"
        board = "uno"
        framework = "arduino"
        build_flags = ["-DDEBUG"]

        [[environments.uno.libraries]]
        name = "Adafruit NeoPixel"
        version = "1.11.0"

        [environments.esp32c6]
        platform = "espressif32"
        board = "esp32-c6-devkitm-1"
        framework = "arduino"
        upload_port = "/dev/ttyACM0"
    "#;

    #[test]
    fn parses_multiple_environments() {
        let manifest = ProjectManifest::from_toml_str(SAMPLE).unwrap();
        assert_eq!(manifest.environments.len(), 2);
        let uno = manifest.environment("uno").unwrap();
        assert_eq!(uno.platform, "atmelavr");
        assert_eq!(uno.libraries.len(), 1);
        assert_eq!(uno.libraries[0].name, "Adafruit NeoPixel");
    }

    #[test]
    fn unknown_environment_is_an_error() {
        let manifest = ProjectManifest::from_toml_str(SAMPLE).unwrap();
        let err = manifest.environment("missing").unwrap_err();
        assert!(matches!(err, ManifestError::UnknownEnvironment { .. }));
    }

    #[test]
    fn upload_port_defaults_to_none() {
        let manifest = ProjectManifest::from_toml_str(SAMPLE).unwrap();
        assert_eq!(manifest.environment("uno").unwrap().upload_port, None);
        assert_eq!(
            manifest.environment("esp32c6").unwrap().upload_port.as_deref(),
            Some("/dev/ttyACM0")
        );
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        let err = ProjectManifest::from_toml_str("not valid [[[ toml").unwrap_err();
        assert!(matches!(err, ManifestError::Parse(_)));
    }
}
