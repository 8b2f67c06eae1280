//! Boundary contracts: directory actions, credentials, counters.

use std::fs;

use anyhow::Result;
use camino::Utf8PathBuf;
use tempfile::tempdir;
use veilfs::archive::ARCHIVE_NAME;
use veilfs::error::GatewayError;
use veilfs::gateway::{Credentials, DirectoryAction};
use veilfs::vfs::{Context, OpenFlags, StorageClass, TransparentFs, VfsFile};

fn gateway_root(dir: &tempfile::TempDir) -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf8 temp dir")
}

#[test]
fn compress_action_archives_directory() -> Result<()> {
    let temp = tempdir()?;
    let root = gateway_root(&temp);
    fs::create_dir(root.join("d").as_std_path())?;
    fs::write(root.join("d/a.txt").as_std_path(), b"alpha")?;
    let fs = TransparentFs::new(root.clone());

    for action in DirectoryAction::from_query("POST", [("compress", "true")]) {
        action.apply(&fs, &Context::new(), "/d")?;
    }
    assert!(root.join("d").join(ARCHIVE_NAME).as_std_path().is_file());

    for action in DirectoryAction::from_query("POST", [("compress", "false")]) {
        action.apply(&fs, &Context::new(), "/d")?;
    }
    assert!(!root.join("d").join(ARCHIVE_NAME).as_std_path().exists());
    assert_eq!(fs::read(root.join("d/a.txt").as_std_path())?, b"alpha");
    Ok(())
}

#[test]
fn encrypt_action_uses_credential_key() -> Result<()> {
    let temp = tempdir()?;
    let root = gateway_root(&temp);
    fs::create_dir(root.join("e").as_std_path())?;
    fs::write(root.join("e/s.txt").as_std_path(), b"hush")?;
    let fs = TransparentFs::new(root.clone());

    let creds = Credentials::from_basic("admin", "hunter2:sesame")?;
    let ctx = creds.context();
    for action in
        DirectoryAction::from_query("POST", [("encrypt", "true"), ("recursive", "false")])
    {
        action.apply(&fs, &ctx, "/e")?;
    }
    assert!(root.join("e/s.txt.pgp").as_std_path().exists());

    for action in
        DirectoryAction::from_query("POST", [("encrypt", "false"), ("recursive", "false")])
    {
        action.apply(&fs, &ctx, "/e")?;
    }
    assert_eq!(fs::read(root.join("e/s.txt").as_std_path())?, b"hush");
    Ok(())
}

#[test]
fn encrypt_action_without_key_fails() -> Result<()> {
    let temp = tempdir()?;
    let root = gateway_root(&temp);
    fs::create_dir(root.join("e").as_std_path())?;
    let fs = TransparentFs::new(root);

    let creds = Credentials::from_basic("admin", "hunter2")?;
    let actions = DirectoryAction::from_query("POST", [("encrypt", "true")]);
    assert_eq!(actions.len(), 1);
    let err = actions[0]
        .apply(&fs, &creds.context(), "/e")
        .expect_err("missing key");
    assert!(matches!(err, GatewayError::MissingKey));
    Ok(())
}

#[test]
fn actions_on_missing_or_file_targets_fail() -> Result<()> {
    let temp = tempdir()?;
    let root = gateway_root(&temp);
    fs::write(root.join("file.txt").as_std_path(), b"flat")?;
    let fs = TransparentFs::new(root);

    let err = fs.archive_directory("/missing").expect_err("no target");
    assert!(matches!(err, GatewayError::NotFound(_)));
    let err = fs.archive_directory("/file.txt").expect_err("not a dir");
    assert!(matches!(err, GatewayError::NotDirectory(_)));
    Ok(())
}

#[test]
fn unresolvable_names_are_rejected() -> Result<()> {
    let temp = tempdir()?;
    let fs = TransparentFs::new(gateway_root(&temp));

    let err = fs
        .open(&Context::new(), "bad\0name", OpenFlags::read_only())
        .expect_err("NUL byte");
    assert!(matches!(err, GatewayError::Unresolved(_)));
    Ok(())
}

#[test]
fn mkdir_and_remove_roundtrip() -> Result<()> {
    let temp = tempdir()?;
    let root = gateway_root(&temp);
    let fs = TransparentFs::new(root.clone());

    fs.mkdir("/fresh", 0o755)?;
    assert!(root.join("fresh").as_std_path().is_dir());
    assert_eq!(fs.storage_class("/fresh")?, StorageClass::PlainDir);

    fs.remove("/fresh")?;
    assert!(!root.join("fresh").as_std_path().exists());
    let err = fs.remove("/fresh").expect_err("already gone");
    assert!(matches!(err, GatewayError::NotFound(_)));
    Ok(())
}

#[test]
fn remove_encrypted_file_targets_ciphertext() -> Result<()> {
    let temp = tempdir()?;
    let root = gateway_root(&temp);
    fs::write(root.join("note.txt.pgp").as_std_path(), b"sealed")?;
    let fs = TransparentFs::new(root.clone());

    fs.remove("/note.txt")?;
    assert!(!root.join("note.txt.pgp").as_std_path().exists());
    Ok(())
}

#[test]
fn counters_track_gateway_activity() -> Result<()> {
    let temp = tempdir()?;
    let root = gateway_root(&temp);
    fs::write(root.join("a.txt").as_std_path(), b"abc")?;
    let fs = TransparentFs::new(root);
    let ctx = Context::new();

    fs.mkdir("/sub", 0o755)?;
    let mut handle = fs.open(&ctx, "/a.txt", OpenFlags::read_only())?;
    let mut buffer = [0_u8; 8];
    let read = handle.read(&mut buffer)?;
    handle.close()?;
    fs.remove("/a.txt")?;

    let snapshot = fs.stats().snapshot();
    assert_eq!(read, 3);
    assert_eq!(snapshot.directories_created, 1);
    assert_eq!(snapshot.files_opened, 1);
    assert_eq!(snapshot.files_removed, 1);
    assert_eq!(snapshot.bytes_read, 3);

    let drained = fs.stats().drain();
    assert_eq!(drained.files_opened, 1);
    assert_eq!(fs.stats().snapshot().files_opened, 0);
    Ok(())
}

#[test]
fn storage_classes_cover_the_tree() -> Result<()> {
    let temp = tempdir()?;
    let root = gateway_root(&temp);
    fs::create_dir(root.join("plain").as_std_path())?;
    fs::create_dir(root.join("zipped").as_std_path())?;
    fs::write(root.join("zipped/in.txt").as_std_path(), b"in")?;
    fs::write(root.join("file.txt").as_std_path(), b"f")?;
    fs::write(root.join("cipher.txt.pgp").as_std_path(), b"c")?;
    let fs = TransparentFs::new(root);
    fs.archive_directory("/zipped")?;

    assert_eq!(fs.storage_class("/plain")?, StorageClass::PlainDir);
    assert_eq!(fs.storage_class("/zipped")?, StorageClass::ArchivedDir);
    assert_eq!(fs.storage_class("/zipped/in.txt")?, StorageClass::ArchivedFile);
    assert_eq!(fs.storage_class("/file.txt")?, StorageClass::PlainFile);
    assert_eq!(fs.storage_class("/cipher.txt")?, StorageClass::EncryptedFile);
    assert_eq!(fs.storage_class("/nowhere")?, StorageClass::Absent);
    Ok(())
}
