use super::*;
use std::io::Write;

fn make_tar_gz(path: &Path, files: &[(&str, &[u8])]) {
    let file = File::create(path).unwrap();
    let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for (name, contents) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, name, *contents).unwrap();
    }
    builder.finish().unwrap();
}

fn make_zip(path: &Path, files: &[(&str, &[u8])]) {
    let file = File::create(path).unwrap();
    let mut writer = zip::ZipWriter::new(file);
    let options: zip::write::FileOptions<()> = zip::write::FileOptions::default();
    for (name, contents) in files {
        writer.start_file(*name, options).unwrap();
        writer.write_all(contents).unwrap();
    }
    writer.finish().unwrap();
}

#[test]
fn format_is_detected_from_extension() {
    assert_eq!(ArchiveFormat::detect(Path::new("pkg.tar.gz")).unwrap(), ArchiveFormat::TarGz);
    assert_eq!(ArchiveFormat::detect(Path::new("pkg.tgz")).unwrap(), ArchiveFormat::TarGz);
    assert_eq!(ArchiveFormat::detect(Path::new("pkg.zip")).unwrap(), ArchiveFormat::Zip);
    assert!(ArchiveFormat::detect(Path::new("pkg.rar")).is_err());
}

#[test]
fn unpack_tar_gz_extracts_files() {
    let dir = tempfile::tempdir().unwrap();
    let archive_path = dir.path().join("pkg.tar.gz");
    make_tar_gz(&archive_path, &[("bin/tool", b"binary-content"), ("readme.txt", b"hello")]);

    let dest = dir.path().join("staging");
    let count = unpack(&archive_path, &dest).unwrap();

    assert_eq!(count, 2);
    assert_eq!(std::fs::read(dest.join("bin/tool")).unwrap(), b"binary-content");
    assert_eq!(std::fs::read(dest.join("readme.txt")).unwrap(), b"hello");
}

#[test]
fn unpack_zip_extracts_files_and_directories() {
    let dir = tempfile::tempdir().unwrap();
    let archive_path = dir.path().join("pkg.zip");
    make_zip(&archive_path, &[("lib/core.a", b"archive-bytes"), ("pkg.json", b"{}")]);

    let dest = dir.path().join("staging");
    let count = unpack(&archive_path, &dest).unwrap();

    assert_eq!(count, 2);
    assert_eq!(std::fs::read(dest.join("lib/core.a")).unwrap(), b"archive-bytes");
    assert_eq!(std::fs::read(dest.join("pkg.json")).unwrap(), b"{}");
}

#[test]
fn unknown_extension_is_rejected_before_touching_disk() {
    let dir = tempfile::tempdir().unwrap();
    let archive_path = dir.path().join("pkg.bin");
    std::fs::write(&archive_path, b"not an archive").unwrap();

    let err = unpack(&archive_path, &dir.path().join("staging")).unwrap_err();
    assert!(matches!(err, ArchiveError::UnknownFormat { .. }));
}
