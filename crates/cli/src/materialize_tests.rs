// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::os::unix::fs::PermissionsExt;

use super::*;

fn credential(cert: Option<&str>) -> anyhow::Result<BrokeredCredential> {
    BrokeredCredential::new("PRIVATE", cert.map(str::to_owned), "node")
        .ok_or_else(|| anyhow::anyhow!("credential rejected"))
}

fn mode(path: &Path) -> anyhow::Result<u32> {
    Ok(std::fs::metadata(path)?.permissions().mode() & 0o777)
}

#[test]
fn cert_name_follows_key_name() {
    assert_eq!(
        cert_path_for(Path::new("/tmp/x/id_ed25519")),
        PathBuf::from("/tmp/x/id_ed25519-cert.pub")
    );
}

#[test]
fn writes_key_and_certificate_with_modes() -> anyhow::Result<()> {
    let parent = tempfile::tempdir()?;
    let key = SecretMaterializer::in_dir(parent.path()).materialize(credential(Some("CERT"))?)?;

    assert_eq!(key.key_path().file_name().and_then(|n| n.to_str()), Some(KEY_FILE_NAME));
    assert_eq!(std::fs::read_to_string(key.key_path())?, "PRIVATE\n");
    assert_eq!(mode(key.key_path())?, 0o600);

    let cert = key.cert_path().map(Path::to_path_buf);
    assert_eq!(cert, Some(cert_path_for(key.key_path())));
    if let Some(cert) = cert {
        assert_eq!(std::fs::read_to_string(&cert)?, "CERT\n");
        assert_eq!(mode(&cert)?, 0o644);
    }
    assert_eq!(key.username(), "node");
    Ok(())
}

#[test]
fn no_certificate_file_without_certificate() -> anyhow::Result<()> {
    let parent = tempfile::tempdir()?;
    let key = SecretMaterializer::in_dir(parent.path()).materialize(credential(None)?)?;
    assert!(key.cert_path().is_none());
    assert!(!cert_path_for(key.key_path()).exists());
    Ok(())
}

#[test]
fn existing_newline_is_not_doubled() -> anyhow::Result<()> {
    let parent = tempfile::tempdir()?;
    let cred = BrokeredCredential::new("PRIVATE\n", None, "node")
        .ok_or_else(|| anyhow::anyhow!("credential rejected"))?;
    let key = SecretMaterializer::in_dir(parent.path()).materialize(cred)?;
    assert_eq!(std::fs::read_to_string(key.key_path())?, "PRIVATE\n");
    Ok(())
}

#[test]
fn directory_removed_on_cleanup_and_drop() -> anyhow::Result<()> {
    let parent = tempfile::tempdir()?;
    let materializer = SecretMaterializer::in_dir(parent.path());

    let key = materializer.materialize(credential(Some("CERT"))?)?;
    let dir = key.dir().to_path_buf();
    key.cleanup()?;
    assert!(!dir.exists());

    let key = materializer.materialize(credential(None)?)?;
    let dir = key.dir().to_path_buf();
    drop(key);
    assert!(!dir.exists());
    Ok(())
}

#[test]
fn unwritable_parent_is_materialize_failed() -> anyhow::Result<()> {
    let parent = tempfile::tempdir()?;
    let blocker = parent.path().join("file");
    std::fs::write(&blocker, b"x")?;
    let err = SecretMaterializer::in_dir(&blocker).materialize(credential(None)?).err();
    assert_eq!(err.map(|e| e.kind), Some(FailureKind::MaterializeFailed));
    Ok(())
}
