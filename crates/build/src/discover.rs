// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Source discovery and translation-unit planning (spec §4.9 steps 1-2).

use std::path::{Path, PathBuf};

use anvil_core::{CompilationJob, Environment};
use walkdir::WalkDir;

const SOURCE_EXTENSIONS: &[&str] = &["c", "cc", "cpp", "cxx", "s", "S"];

/// Recursively find every source file under `source_root`, in a stable
/// (sorted) order so a rebuild's translation-unit plan is deterministic
/// even when the filesystem walk order is not.
pub fn discover_sources(source_root: &Path) -> Vec<PathBuf> {
    let mut found: Vec<PathBuf> = WalkDir::new(source_root)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| has_source_extension(entry.path()))
        .map(|entry| entry.path().to_path_buf())
        .collect();
    found.sort();
    found
}

fn has_source_extension(path: &Path) -> bool {
    path.extension().and_then(|ext| ext.to_str()).is_some_and(|ext| SOURCE_EXTENSIONS.contains(&ext))
}

/// Compute one [`CompilationJob`] per discovered source file, deriving
/// each object path by mirroring the source's path under `object_dir`
/// and appending `.o`. Flags are the environment's `build_flags` plus any
/// manifest-level override passed by the caller (spec §4.9 step 2:
/// "per-file argument vectors derived from environment plus manifest
/// overrides").
pub fn plan_translation_units(
    sources: &[PathBuf],
    source_root: &Path,
    object_dir: &Path,
    env: &Environment,
    extra_flags: &[String],
) -> Vec<CompilationJob> {
    sources
        .iter()
        .map(|source| {
            let relative = source.strip_prefix(source_root).unwrap_or(source);
            let mut object = object_dir.join(relative);
            let mut file_name = object.file_name().map(|n| n.to_os_string()).unwrap_or_default();
            file_name.push(".o");
            object.set_file_name(file_name);

            let mut flags = env.build_flags.clone();
            flags.extend(extra_flags.iter().cloned());
            CompilationJob::new(source.clone(), object, flags)
        })
        .collect()
}

#[cfg(test)]
#[path = "discover_tests.rs"]
mod tests;
