use super::*;
use anvil_core::Environment;
use std::path::Path;

fn sample_env(platform: &str) -> Environment {
    Environment {
        platform: platform.to_string(),
        board: "generic".to_string(),
        framework: "arduino".to_string(),
        libraries: vec![],
        build_flags: vec!["-Wall".to_string()],
        upload_port: None,
    }
}

fn registry() -> PlatformRegistry {
    PlatformRegistry::new(vec![Box::new(Espressif32), Box::new(AtmelAvr)])
}

/// The per-platform "linting check" the spec calls for (§4.9, §8): every
/// registered spec must answer every trait method without panicking and
/// produce a well-formed [`Invocation`] (non-empty program, cwd set),
/// exercised through the exact same call sequence regardless of which
/// concrete platform backs it.
#[test]
fn every_registered_platform_conforms_to_the_uniform_signature() {
    let registry = registry();
    let project_dir = Path::new("/project");
    let source = Path::new("/project/src/main.cpp");
    let object = Path::new("/project/.build/uno/release/main.cpp.o");
    let image = Path::new("/project/.build/uno/release/firmware.elf");

    for spec in registry.all() {
        let env = sample_env(spec.name());

        let compile = spec.compile_invocation(&env, source, object, project_dir);
        assert!(!compile.program.is_empty(), "{}: compile invocation has no program", spec.name());
        assert_eq!(compile.cwd, project_dir);

        let link = spec.link_invocation(&env, &[object], image, project_dir);
        assert!(!link.program.is_empty(), "{}: link invocation has no program", spec.name());

        let artifact = project_dir.join(".build/uno/release").join(spec.artifact_file_name(&env));
        if let Some(post) = spec.post_process_invocation(&env, image, &artifact, project_dir) {
            assert!(!post.program.is_empty(), "{}: post-process invocation has no program", spec.name());
        }

        assert!(!spec.artifact_file_name(&env).is_empty());

        let upload = spec.upload_invocation(&env, &artifact, "/dev/ttyUSB0", project_dir);
        assert!(!upload.program.is_empty(), "{}: upload invocation has no program", spec.name());
        assert_eq!(upload.cwd, project_dir);
    }
}

#[test]
fn lookup_finds_a_registered_platform_by_name() {
    let registry = registry();
    assert!(registry.lookup("espressif32").is_some());
    assert!(registry.lookup("atmelavr").is_some());
    assert!(registry.lookup("not-a-real-platform").is_none());
}

#[test]
fn atmelavr_has_no_post_process_step() {
    let spec = AtmelAvr;
    let env = sample_env("atmelavr");
    let result = spec.post_process_invocation(
        &env,
        Path::new("/project/.build/uno/release/firmware.elf"),
        Path::new("/project/.build/uno/release/firmware.elf"),
        Path::new("/project"),
    );
    assert!(result.is_none());
}

#[test]
fn espressif32_post_processes_through_esptool() {
    let spec = Espressif32;
    let env = sample_env("espressif32");
    let invocation = spec
        .post_process_invocation(
            &env,
            Path::new("/project/.build/esp32/release/firmware.elf"),
            Path::new("/project/.build/esp32/release/firmware.bin"),
            Path::new("/project"),
        )
        .unwrap();
    assert_eq!(invocation.program, "esptool.py");
}

#[test]
fn espressif32_uploads_through_esptool_write_flash() {
    let spec = Espressif32;
    let env = sample_env("espressif32");
    let invocation = spec.upload_invocation(
        &env,
        Path::new("/project/.build/esp32/release/firmware.bin"),
        "/dev/ttyUSB0",
        Path::new("/project"),
    );
    assert_eq!(invocation.program, "esptool.py");
    assert!(invocation.args.contains(&"write_flash".to_string()));
    assert!(invocation.args.contains(&"/dev/ttyUSB0".to_string()));
}

#[test]
fn atmelavr_uploads_through_avrdude() {
    let spec = AtmelAvr;
    let env = sample_env("atmelavr");
    let invocation = spec.upload_invocation(
        &env,
        Path::new("/project/.build/uno/release/firmware.elf"),
        "/dev/ttyACM0",
        Path::new("/project"),
    );
    assert_eq!(invocation.program, "avrdude");
    assert!(invocation.args.contains(&"/dev/ttyACM0".to_string()));
    assert!(invocation.args.iter().any(|a| a.starts_with("flash:w:")));
}
