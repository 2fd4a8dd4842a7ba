// SPDX-License-Identifier: MIT

//! Container image pulling for `docker://` input URIs (§4.3 item 2).
//!
//! Shells out to `skopeo copy`, which handles multi-arch manifest lists,
//! auth, and registry protocol negotiation itself. When a reference names
//! a manifest list, `skopeo` is asked for `--override-os linux
//! --override-arch amd64` so image selection is deterministic rather than
//! dependent on the host the daemon happens to run on.

use crate::subprocess::{check_status, run_with_timeout};
use async_trait::async_trait;
use scaorch_core::SystemError;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;

pub const IMAGE_PULL_TIMEOUT: Duration = Duration::from_secs(600);

/// Credential for a `skopeo`-mediated registry pull.
#[derive(Debug, Clone)]
pub struct RegistryCredential {
    pub user: String,
    pub password: String,
}

/// Pulls a container image reference down to a local tar archive.
#[async_trait]
pub trait ImagePuller: Send + Sync {
    /// Pull `reference` (e.g. `docker://ghcr.io/org/app:1.2.3`) into
    /// `dest_dir`, returning the path to the resulting `docker-archive`
    /// tarball.
    async fn pull(
        &self,
        reference: &str,
        dest_dir: &Path,
        credential: Option<&RegistryCredential>,
    ) -> Result<PathBuf, SystemError>;
}

pub struct SkopeoImagePuller;

#[async_trait]
impl ImagePuller for SkopeoImagePuller {
    async fn pull(
        &self,
        reference: &str,
        dest_dir: &Path,
        credential: Option<&RegistryCredential>,
    ) -> Result<PathBuf, SystemError> {
        std::fs::create_dir_all(dest_dir)?;
        let source = reference
            .strip_prefix("docker://")
            .unwrap_or(reference);
        let tar_path = dest_dir.join("image.tar");

        let mut cmd = Command::new("skopeo");
        cmd.arg("copy")
            .arg("--override-os")
            .arg("linux")
            .arg("--override-arch")
            .arg("amd64");
        if let Some(credential) = credential {
            cmd.arg("--src-creds")
                .arg(format!("{}:{}", credential.user, credential.password));
        }
        cmd.arg(format!("docker://{source}"))
            .arg(format!("docker-archive:{}", tar_path.display()));

        let output = run_with_timeout(cmd, IMAGE_PULL_TIMEOUT, "skopeo copy").await?;
        check_status(&output, "skopeo copy")?;
        Ok(tar_path)
    }
}

#[cfg(any(test, feature = "test-support"))]
pub struct FakeImagePuller {
    pub fail: bool,
}

#[cfg(any(test, feature = "test-support"))]
#[async_trait]
impl ImagePuller for FakeImagePuller {
    async fn pull(
        &self,
        _reference: &str,
        dest_dir: &Path,
        _credential: Option<&RegistryCredential>,
    ) -> Result<PathBuf, SystemError> {
        if self.fail {
            return Err(SystemError::InputFetchFailed {
                cause: scaorch_core::InputFetchCause::NotFound,
                detail: "fake pull failure".to_string(),
            });
        }
        std::fs::create_dir_all(dest_dir)?;
        let tar_path = dest_dir.join("image.tar");
        std::fs::write(&tar_path, b"fake image tar")?;
        Ok(tar_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fake_puller_writes_a_tar_file() {
        let dir = tempfile::tempdir().unwrap();
        let puller = FakeImagePuller { fail: false };
        let tar_path = puller
            .pull("docker://example.com/app:1.0", dir.path(), None)
            .await
            .unwrap();
        assert!(tar_path.exists());
        assert_eq!(tar_path.file_name().unwrap(), "image.tar");
    }

    #[tokio::test]
    async fn fake_puller_can_simulate_failure() {
        let dir = tempfile::tempdir().unwrap();
        let puller = FakeImagePuller { fail: true };
        assert!(puller
            .pull("docker://example.com/app:1.0", dir.path(), None)
            .await
            .is_err());
    }
}
