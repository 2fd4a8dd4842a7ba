// SPDX-License-Identifier: MIT

//! Shallow `git` clone for `.git`-suffixed input URIs (§4.3 item 3).

use crate::subprocess::{check_status, run_with_timeout};
use async_trait::async_trait;
use scaorch_core::SystemError;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;

pub const GIT_CLONE_TIMEOUT: Duration = Duration::from_secs(300);

/// Clones a git repository into a directory under the workspace.
#[async_trait]
pub trait GitCloner: Send + Sync {
    /// Shallow-clone `repo_url` at `reference` (branch, tag, or commit-ish;
    /// `None` uses the remote's default branch) into `dest_dir`, returning
    /// the path to the checkout.
    async fn clone_shallow(
        &self,
        repo_url: &str,
        reference: Option<&str>,
        dest_dir: &Path,
    ) -> Result<PathBuf, SystemError>;
}

/// Shells out to the system `git` binary.
pub struct SystemGitCloner;

#[async_trait]
impl GitCloner for SystemGitCloner {
    async fn clone_shallow(
        &self,
        repo_url: &str,
        reference: Option<&str>,
        dest_dir: &Path,
    ) -> Result<PathBuf, SystemError> {
        std::fs::create_dir_all(dest_dir)?;

        let mut cmd = Command::new("git");
        cmd.arg("clone").arg("--depth").arg("1");
        if let Some(reference) = reference {
            cmd.arg("--branch").arg(reference);
        }
        cmd.arg(repo_url).arg(dest_dir);

        let output = run_with_timeout(cmd, GIT_CLONE_TIMEOUT, "git clone").await?;
        check_status(&output, "git clone")?;
        Ok(dest_dir.to_path_buf())
    }
}

#[cfg(any(test, feature = "test-support"))]
pub struct FakeGitCloner {
    pub fail: bool,
}

#[cfg(any(test, feature = "test-support"))]
#[async_trait]
impl GitCloner for FakeGitCloner {
    async fn clone_shallow(
        &self,
        _repo_url: &str,
        _reference: Option<&str>,
        dest_dir: &Path,
    ) -> Result<PathBuf, SystemError> {
        if self.fail {
            return Err(SystemError::InputFetchFailed {
                cause: scaorch_core::InputFetchCause::NotFound,
                detail: "fake clone failure".to_string(),
            });
        }
        std::fs::create_dir_all(dest_dir)?;
        std::fs::write(dest_dir.join(".git-marker"), b"fake clone")?;
        Ok(dest_dir.to_path_buf())
    }
}
