// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-platform specialization (spec §4.9): one uniform trait, one
//! impl per target platform, dispatched through a name-keyed registry so
//! the orchestrator never branches on platform.
//!
//! Grounded on the `RunLifecycle` shape — a single trait exposing the
//! data/behavior an otherwise-generic driver needs, implemented once per
//! concrete kind rather than matched on an enum.

use std::path::Path;

use anvil_adapters::Invocation;
use anvil_core::Environment;

/// Compiler flags and command templates for one target platform.
///
/// Every method is synchronous and pure given its inputs — the
/// orchestrator owns actually spawning the resulting [`Invocation`]s.
pub trait PlatformSpec: Send + Sync {
    /// The platform name this spec answers for (e.g. `"espressif32"`),
    /// matched against [`Environment::platform`].
    fn name(&self) -> &'static str;

    /// Build the invocation that compiles one translation unit.
    fn compile_invocation(&self, env: &Environment, source: &Path, object: &Path, project_dir: &Path) -> Invocation;

    /// Build the invocation that links the compiled objects into one image.
    fn link_invocation(&self, env: &Environment, objects: &[&Path], image: &Path, project_dir: &Path) -> Invocation;

    /// Build the invocation that converts the linked image into this
    /// platform's deployable binary format (e.g. `.bin`, `.hex`,
    /// `.uf2`). Returns `None` if the linked image already is the
    /// deployable artifact.
    fn post_process_invocation(&self, env: &Environment, image: &Path, artifact: &Path, project_dir: &Path) -> Option<Invocation>;

    /// The deployable artifact's file name, relative to the per-profile
    /// output directory (spec §4.9 step 7).
    fn artifact_file_name(&self, env: &Environment) -> String;

    /// Build the invocation that flashes `artifact` to the device attached
    /// at `port` (spec §4.8 upload watchdog). The device coordinator spawns
    /// this invocation and races it against the dual timeout; it never
    /// inspects the command itself.
    fn upload_invocation(&self, env: &Environment, artifact: &Path, port: &str, project_dir: &Path) -> Invocation;
}

/// A name-keyed lookup of every platform this build supports.
pub struct PlatformRegistry {
    specs: Vec<Box<dyn PlatformSpec>>,
}

impl PlatformRegistry {
    pub fn new(specs: Vec<Box<dyn PlatformSpec>>) -> Self {
        Self { specs }
    }

    pub fn lookup(&self, platform: &str) -> Option<&dyn PlatformSpec> {
        self.specs.iter().find(|s| s.name() == platform).map(|s| s.as_ref())
    }

    #[cfg(any(test, feature = "test-support"))]
    pub fn all(&self) -> impl Iterator<Item = &dyn PlatformSpec> {
        self.specs.iter().map(|s| s.as_ref())
    }
}

/// The espressif32 (ESP-IDF / Arduino-ESP32) toolchain: GCC-style
/// compiler, GCC linker, `esptool.py` for the image-to-bin conversion.
pub struct Espressif32;

impl PlatformSpec for Espressif32 {
    fn name(&self) -> &'static str {
        "espressif32"
    }

    fn compile_invocation(&self, env: &Environment, source: &Path, object: &Path, project_dir: &Path) -> Invocation {
        Invocation::new("xtensa-esp32-elf-g++", project_dir)
            .arg("-c")
            .args(env.build_flags.clone())
            .arg(source.to_string_lossy().into_owned())
            .arg("-o")
            .arg(object.to_string_lossy().into_owned())
    }

    fn link_invocation(&self, _env: &Environment, objects: &[&Path], image: &Path, project_dir: &Path) -> Invocation {
        Invocation::new("xtensa-esp32-elf-g++", project_dir)
            .args(objects.iter().map(|p| p.to_string_lossy().into_owned()))
            .arg("-o")
            .arg(image.to_string_lossy().into_owned())
    }

    fn post_process_invocation(&self, _env: &Environment, image: &Path, artifact: &Path, project_dir: &Path) -> Option<Invocation> {
        Some(
            Invocation::new("esptool.py", project_dir)
                .arg("--chip")
                .arg("esp32")
                .arg("elf2image")
                .arg("-o")
                .arg(artifact.to_string_lossy().into_owned())
                .arg(image.to_string_lossy().into_owned()),
        )
    }

    fn artifact_file_name(&self, _env: &Environment) -> String {
        "firmware.bin".to_string()
    }

    fn upload_invocation(&self, _env: &Environment, artifact: &Path, port: &str, project_dir: &Path) -> Invocation {
        Invocation::new("esptool.py", project_dir)
            .arg("--chip")
            .arg("esp32")
            .arg("--port")
            .arg(port.to_string())
            .arg("write_flash")
            .arg("0x10000")
            .arg(artifact.to_string_lossy().into_owned())
    }
}

/// The atmelavr (classic AVR Arduino) toolchain: `avr-gcc`, no separate
/// post-process step — the linked ELF is flashed directly.
pub struct AtmelAvr;

impl PlatformSpec for AtmelAvr {
    fn name(&self) -> &'static str {
        "atmelavr"
    }

    fn compile_invocation(&self, env: &Environment, source: &Path, object: &Path, project_dir: &Path) -> Invocation {
        Invocation::new("avr-gcc", project_dir)
            .arg("-c")
            .args(env.build_flags.clone())
            .arg(source.to_string_lossy().into_owned())
            .arg("-o")
            .arg(object.to_string_lossy().into_owned())
    }

    fn link_invocation(&self, _env: &Environment, objects: &[&Path], image: &Path, project_dir: &Path) -> Invocation {
        Invocation::new("avr-gcc", project_dir)
            .args(objects.iter().map(|p| p.to_string_lossy().into_owned()))
            .arg("-o")
            .arg(image.to_string_lossy().into_owned())
    }

    fn post_process_invocation(&self, _env: &Environment, _image: &Path, _artifact: &Path, _project_dir: &Path) -> Option<Invocation> {
        None
    }

    fn artifact_file_name(&self, _env: &Environment) -> String {
        "firmware.elf".to_string()
    }

    fn upload_invocation(&self, _env: &Environment, artifact: &Path, port: &str, project_dir: &Path) -> Invocation {
        Invocation::new("avrdude", project_dir)
            .arg("-c")
            .arg("arduino")
            .arg("-p")
            .arg("atmega328p")
            .arg("-P")
            .arg(port.to_string())
            .arg("-U")
            .arg(format!("flash:w:{}:e", artifact.to_string_lossy()))
    }
}

#[cfg(test)]
#[path = "platform_tests.rs"]
mod tests;
