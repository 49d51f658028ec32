// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-profile artifact layout (spec §4.9 step 7): distinct build
//! profiles (e.g. `release`, `quick`) never invalidate each other's
//! object cache because each gets its own subdirectory under the
//! environment's build root.

use std::path::{Path, PathBuf};

/// A named build profile, e.g. `"release"` or `"quick"`. Opaque beyond
/// its directory-safe name; profile-specific flags are the caller's
/// concern (folded into `extra_flags` passed to `plan_translation_units`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile(String);

impl Profile {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl Default for Profile {
    fn default() -> Self {
        Self::new("release")
    }
}

/// Directory layout rooted at `build_root` (typically
/// `<project>/.anvil/build/<environment-name>`), one subtree per profile:
///
/// ```text
/// <build_root>/<profile>/obj/...      (mirrors source tree, *.o)
/// <build_root>/<profile>/firmware.elf (linked image)
/// <build_root>/<profile>/<artifact>   (post-processed deployable)
/// ```
#[derive(Debug, Clone)]
pub struct ArtifactLayout {
    root: PathBuf,
}

impl ArtifactLayout {
    pub fn new(build_root: &Path, environment_name: &str, profile: &Profile) -> Self {
        Self { root: build_root.join(environment_name).join(profile.name()) }
    }

    pub fn object_dir(&self) -> PathBuf {
        self.root.join("obj")
    }

    pub fn image_path(&self) -> PathBuf {
        self.root.join("firmware.elf")
    }

    pub fn artifact_path(&self, file_name: &str) -> PathBuf {
        self.root.join(file_name)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}
