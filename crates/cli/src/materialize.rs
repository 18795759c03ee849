// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Writes brokered key material to a scoped temporary directory.
//!
//! The directory lives exactly as long as the returned [`MaterializedKey`];
//! dropping it (or calling [`MaterializedKey::cleanup`]) removes everything.

use std::fs::{OpenOptions, Permissions};
use std::io::Write;
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};

use anyhow::Context;
use tempfile::TempDir;
use tracing::debug;

use crate::broker::BrokeredCredential;
use crate::error::{FailureKind, FlowError};

pub const KEY_FILE_NAME: &str = "id_ed25519";

/// SSH discovers `<key>-cert.pub` next to `-i <key>` on its own.
pub const CERT_SUFFIX: &str = "-cert.pub";

const KEY_MODE: u32 = 0o600;
const CERT_MODE: u32 = 0o644;

pub fn cert_path_for(key_path: &Path) -> PathBuf {
    let mut path = key_path.as_os_str().to_owned();
    path.push(CERT_SUFFIX);
    PathBuf::from(path)
}

/// Key files on disk. Removed on drop.
#[derive(Debug)]
pub struct MaterializedKey {
    dir: TempDir,
    key_path: PathBuf,
    cert_path: Option<PathBuf>,
    username: String,
}

impl MaterializedKey {
    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    pub fn key_path(&self) -> &Path {
        &self.key_path
    }

    /// Present only when the credential carried a certificate.
    pub fn cert_path(&self) -> Option<&Path> {
        self.cert_path.as_deref()
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// Remove the directory now, reporting failures instead of ignoring them.
    pub fn cleanup(self) -> std::io::Result<()> {
        self.dir.close()
    }
}

#[derive(Debug, Default, Clone)]
pub struct SecretMaterializer {
    parent: Option<PathBuf>,
}

impl SecretMaterializer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create scoped directories under `parent` instead of the system temp dir.
    pub fn in_dir(parent: impl Into<PathBuf>) -> Self {
        Self { parent: Some(parent.into()) }
    }

    /// Consume `credential` and write it out.
    pub fn materialize(&self, credential: BrokeredCredential) -> Result<MaterializedKey, FlowError> {
        self.write(&credential)
            .map_err(|e| FlowError::new(FailureKind::MaterializeFailed, format!("{e:#}")))
    }

    fn write(&self, credential: &BrokeredCredential) -> anyhow::Result<MaterializedKey> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("brokerflow-");
        let dir = match &self.parent {
            Some(parent) => builder.tempdir_in(parent),
            None => builder.tempdir(),
        }
        .context("failed to create key directory")?;

        let key_path = dir.path().join(KEY_FILE_NAME);
        write_secret(&key_path, credential.private_key(), KEY_MODE)
            .context("failed to write private key")?;

        let cert_path = match credential.certificate() {
            Some(cert) => {
                let path = cert_path_for(&key_path);
                write_secret(&path, cert, CERT_MODE).context("failed to write certificate")?;
                Some(path)
            }
            None => None,
        };

        debug!(dir = %dir.path().display(), certificate = cert_path.is_some(), "key material written");
        Ok(MaterializedKey { dir, key_path, cert_path, username: credential.username().to_owned() })
    }
}

/// Create `path` with `mode`, write `contents` newline-terminated, then pin
/// the mode so the process umask cannot widen or narrow it.
fn write_secret(path: &Path, contents: &str, mode: u32) -> anyhow::Result<()> {
    let mut file = OpenOptions::new().write(true).create_new(true).mode(mode).open(path)?;
    file.write_all(contents.as_bytes())?;
    if !contents.ends_with('\n') {
        file.write_all(b"\n")?;
    }
    file.sync_all()?;
    std::fs::set_permissions(path, Permissions::from_mode(mode))?;
    Ok(())
}

#[cfg(test)]
#[path = "materialize_tests.rs"]
mod tests;
