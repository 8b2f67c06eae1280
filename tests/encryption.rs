//! Transparent-encryption behaviour through the facade.

use std::fs;
use std::io::SeekFrom;

use anyhow::Result;
use camino::Utf8PathBuf;
use sequoia_openpgp::crypto::Password;
use tempfile::tempdir;
use veilfs::crypto::{self, ENCRYPTED_SUFFIX};
use veilfs::error::GatewayError;
use veilfs::vfs::{Context, Handle, OpenFlags, StorageClass, TransparentFs, VfsFile};

fn gateway_root(dir: &tempfile::TempDir) -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf8 temp dir")
}

fn read_all(handle: &mut Handle) -> Result<Vec<u8>> {
    let mut data = Vec::new();
    let mut buffer = [0_u8; 8192];
    loop {
        let read = handle.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        data.extend_from_slice(&buffer[..read]);
    }
    Ok(data)
}

fn encrypted_fixture(root: &Utf8PathBuf) -> Result<TransparentFs> {
    fs::create_dir(root.join("e").as_std_path())?;
    fs::write(root.join("e/secret.txt").as_std_path(), b"hush")?;
    let fs = TransparentFs::new(root.clone());
    fs.encrypt_directory("/e", &Password::from("K"), false)?;
    Ok(fs)
}

#[test]
fn encrypt_directory_swaps_plain_for_encrypted() -> Result<()> {
    let temp = tempdir()?;
    let root = gateway_root(&temp);
    let fs = encrypted_fixture(&root)?;

    assert!(!root.join("e/secret.txt").as_std_path().exists());
    assert!(root.join("e/secret.txt.pgp").as_std_path().exists());
    assert_eq!(fs.storage_class("/e/secret.txt")?, StorageClass::EncryptedFile);
    Ok(())
}

#[test]
fn stat_and_read_with_key_see_plaintext() -> Result<()> {
    let temp = tempdir()?;
    let root = gateway_root(&temp);
    let fs = encrypted_fixture(&root)?;
    let ctx = Context::with_key("K");

    let info = fs.stat(&ctx, "/e/secret.txt")?;
    assert_eq!(info.name, "secret.txt");
    assert_eq!(info.size, 4);

    let mut handle = fs.open(&ctx, "/e/secret.txt", OpenFlags::read_only())?;
    assert_eq!(read_all(&mut handle)?, b"hush");
    handle.close()?;
    Ok(())
}

#[test]
fn stat_after_partial_read_keeps_position() -> Result<()> {
    let temp = tempdir()?;
    let root = gateway_root(&temp);
    let fs = encrypted_fixture(&root)?;
    let ctx = Context::with_key("K");

    let mut handle = fs.open(&ctx, "/e/secret.txt", OpenFlags::read_only())?;
    let mut prefix = [0_u8; 2];
    assert_eq!(handle.read(&mut prefix)?, 2);
    assert_eq!(&prefix, b"hu");

    // The size pass drains the stream, then restores the read position.
    let info = handle.stat()?;
    assert_eq!(info.size, 4);
    assert_eq!(read_all(&mut handle)?, b"sh");
    handle.close()?;
    Ok(())
}

#[test]
fn read_without_key_is_refused_but_listing_shows_plain_name() -> Result<()> {
    let temp = tempdir()?;
    let root = gateway_root(&temp);
    let fs = encrypted_fixture(&root)?;
    let ctx = Context::new();

    let err = fs
        .open(&ctx, "/e/secret.txt", OpenFlags::read_only())
        .expect_err("key required");
    assert!(matches!(err, GatewayError::MissingKey));

    let mut dir = fs.open(&ctx, "/e", OpenFlags::read_only())?;
    let listing = dir.readdir(0)?;
    dir.close()?;
    assert_eq!(listing.len(), 1);
    assert_eq!(listing[0].name, "secret.txt");
    assert!(!listing[0].name.ends_with(ENCRYPTED_SUFFIX));
    Ok(())
}

#[test]
fn decrypt_directory_restores_plaintext() -> Result<()> {
    let temp = tempdir()?;
    let root = gateway_root(&temp);
    let fs = encrypted_fixture(&root)?;

    fs.decrypt_directory("/e", &Password::from("K"), false)?;
    assert_eq!(fs::read(root.join("e/secret.txt").as_std_path())?, b"hush");
    assert!(!root.join("e/secret.txt.pgp").as_std_path().exists());
    Ok(())
}

#[test]
fn recursive_passes_walk_subdirectories() -> Result<()> {
    let temp = tempdir()?;
    let root = gateway_root(&temp);
    fs::create_dir_all(root.join("e/deep").as_std_path())?;
    fs::write(root.join("e/top.txt").as_std_path(), b"top")?;
    fs::write(root.join("e/deep/nested.txt").as_std_path(), b"nested")?;
    let fs = TransparentFs::new(root.clone());

    fs.encrypt_directory("/e", &Password::from("K"), true)?;
    assert!(root.join("e/top.txt.pgp").as_std_path().exists());
    assert!(root.join("e/deep/nested.txt.pgp").as_std_path().exists());

    fs.decrypt_directory("/e", &Password::from("K"), true)?;
    assert_eq!(fs::read(root.join("e/deep/nested.txt").as_std_path())?, b"nested");
    Ok(())
}

#[test]
fn wrong_key_fails_bad_key() -> Result<()> {
    let temp = tempdir()?;
    let root = gateway_root(&temp);
    let fs = encrypted_fixture(&root)?;
    let ctx = Context::with_key("not-K");

    let mut handle = fs.open(&ctx, "/e/secret.txt", OpenFlags::read_only())?;
    let mut buffer = [0_u8; 16];
    let err = handle.read(&mut buffer).expect_err("wrong key must surface");
    assert!(matches!(err, GatewayError::BadKey));
    handle.close()?;
    Ok(())
}

#[test]
fn decrypting_a_plain_file_fails_not_encrypted() -> Result<()> {
    let temp = tempdir()?;
    let root = gateway_root(&temp);
    fs::write(root.join("plain.txt.pgp").as_std_path(), b"not a pgp message")?;

    let source = fs::File::open(root.join("plain.txt.pgp").as_std_path())?;
    let err = crypto::decrypt_stream(source, &Password::from("K")).expect_err("not encrypted");
    assert!(matches!(err, GatewayError::NotEncrypted(_)));
    Ok(())
}

#[test]
fn file_level_roundtrip_is_identity() -> Result<()> {
    let temp = tempdir()?;
    let root = gateway_root(&temp);
    let payload: Vec<u8> = (0..=255).cycle().take(70_000).collect();
    fs::write(root.join("blob.bin").as_std_path(), &payload)?;
    let key = Password::from("roundtrip");

    crypto::encrypt_file(&root.join("blob.bin"), &key)?;
    assert!(!root.join("blob.bin").as_std_path().exists());
    crypto::decrypt_file(&root.join("blob.bin.pgp"), &key)?;
    assert_eq!(fs::read(root.join("blob.bin").as_std_path())?, payload);
    Ok(())
}

#[test]
fn encrypt_file_skips_suffixed_paths_and_directories() -> Result<()> {
    let temp = tempdir()?;
    let root = gateway_root(&temp);
    fs::write(root.join("done.pgp").as_std_path(), b"already")?;
    fs::create_dir(root.join("sub").as_std_path())?;
    let key = Password::from("K");

    crypto::encrypt_file(&root.join("done.pgp"), &key)?;
    assert_eq!(fs::read(root.join("done.pgp").as_std_path())?, b"already");
    crypto::encrypt_file(&root.join("sub"), &key)?;
    assert!(root.join("sub").as_std_path().is_dir());
    Ok(())
}

#[test]
fn encrypted_writer_rewrites_ciphertext() -> Result<()> {
    let temp = tempdir()?;
    let root = gateway_root(&temp);
    let fs = encrypted_fixture(&root)?;
    let ctx = Context::with_key("K");

    let mut handle = fs.open(&ctx, "/e/secret.txt", OpenFlags::write_create())?;
    let err = handle.seek(SeekFrom::Start(1)).expect_err("append only");
    assert!(matches!(err, GatewayError::SeekUnsupported));
    handle.write(b"whisper")?;
    let info = handle.stat()?;
    assert_eq!(info.name, "secret.txt");
    assert_eq!(info.size, 7);
    handle.close()?;

    // The staging file is gone and the new plaintext reads back.
    assert!(!root.join("e/secret.txt.pgp.tmp").as_std_path().exists());
    let mut reread = fs.open(&ctx, "/e/secret.txt", OpenFlags::read_only())?;
    assert_eq!(read_all(&mut reread)?, b"whisper");
    reread.close()?;
    Ok(())
}

#[test]
fn write_without_key_falls_through_to_plain() -> Result<()> {
    let temp = tempdir()?;
    let root = gateway_root(&temp);
    let fs = encrypted_fixture(&root)?;
    let ctx = Context::new();

    let mut handle = fs.open(&ctx, "/e/secret.txt", OpenFlags::write_create())?;
    handle.write(b"exposed")?;
    handle.close()?;

    // The ciphertext sibling still exists; the plain path was written.
    assert_eq!(fs::read(root.join("e/secret.txt").as_std_path())?, b"exposed");
    assert!(root.join("e/secret.txt.pgp").as_std_path().exists());
    Ok(())
}

#[test]
fn empty_ciphertext_file_reads_as_empty() -> Result<()> {
    let temp = tempdir()?;
    let root = gateway_root(&temp);
    fs::create_dir(root.join("e").as_std_path())?;
    fs::write(root.join("e/hollow.txt.pgp").as_std_path(), b"")?;
    let fs = TransparentFs::new(root.clone());
    let ctx = Context::with_key("K");

    let info = fs.stat(&ctx, "/e/hollow.txt")?;
    assert_eq!(info.size, 0);
    let mut handle = fs.open(&ctx, "/e/hollow.txt", OpenFlags::read_only())?;
    assert_eq!(read_all(&mut handle)?, b"");
    handle.close()?;
    Ok(())
}

#[test]
fn encrypted_reader_refuses_writes() -> Result<()> {
    let temp = tempdir()?;
    let root = gateway_root(&temp);
    let fs = encrypted_fixture(&root)?;
    let ctx = Context::with_key("K");

    let mut handle = fs.open(&ctx, "/e/secret.txt", OpenFlags::read_only())?;
    let err = handle.write(b"nope").expect_err("read-only");
    assert!(matches!(err, GatewayError::WriteUnsupported));
    handle.close()?;
    Ok(())
}

#[test]
fn rename_of_encrypted_file_moves_ciphertext() -> Result<()> {
    let temp = tempdir()?;
    let root = gateway_root(&temp);
    let fs = encrypted_fixture(&root)?;
    let ctx = Context::new();

    fs.rename(&ctx, "/e/secret.txt", "/e/moved.txt")?;
    assert!(root.join("e/moved.txt.pgp").as_std_path().exists());
    assert!(!root.join("e/secret.txt.pgp").as_std_path().exists());

    let keyed = Context::with_key("K");
    let mut handle = fs.open(&keyed, "/e/moved.txt", OpenFlags::read_only())?;
    assert_eq!(read_all(&mut handle)?, b"hush");
    handle.close()?;
    Ok(())
}

#[test]
fn rename_encrypted_into_archive_decrypts_with_key() -> Result<()> {
    let temp = tempdir()?;
    let root = gateway_root(&temp);
    let fs = encrypted_fixture(&root)?;
    fs::create_dir(root.join("d").as_std_path())?;
    fs::write(root.join("d/a.txt").as_std_path(), b"alpha")?;
    fs.archive_directory("/d")?;

    let err = fs
        .rename(&Context::new(), "/e/secret.txt", "/d/secret.txt")
        .expect_err("key required");
    assert!(matches!(err, GatewayError::MissingKey));

    fs.rename(&Context::with_key("K"), "/e/secret.txt", "/d/secret.txt")?;
    assert!(!root.join("e/secret.txt.pgp").as_std_path().exists());

    let ctx = Context::new();
    let mut handle = fs.open(&ctx, "/d/secret.txt", OpenFlags::read_only())?;
    assert_eq!(read_all(&mut handle)?, b"hush");
    handle.close()?;
    Ok(())
}
