// SPDX-License-Identifier: MIT

//! Workspace layout value type (§3 WorkspaceLocation, §6).
//!
//! Not persisted — derived from a root path and a project on demand.

use crate::error::SystemError;
use crate::project::Project;
use std::path::{Path, PathBuf};

/// The four fixed subdirectories of a project's workspace (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkspaceSubdir {
    Input,
    Codebase,
    Output,
    Tmp,
}

impl WorkspaceSubdir {
    pub fn dirname(self) -> &'static str {
        match self {
            WorkspaceSubdir::Input => "input",
            WorkspaceSubdir::Codebase => "codebase",
            WorkspaceSubdir::Output => "output",
            WorkspaceSubdir::Tmp => "tmp",
        }
    }

    pub const ALL: [WorkspaceSubdir; 4] = [
        WorkspaceSubdir::Input,
        WorkspaceSubdir::Codebase,
        WorkspaceSubdir::Output,
        WorkspaceSubdir::Tmp,
    ];
}

/// Value type describing where a project's workspace lives on disk.
///
/// `workspace_location/projects/<slug>-<short-uuid>/{input,codebase,output,tmp}`
#[derive(Debug, Clone)]
pub struct WorkspaceLayout {
    pub root: PathBuf,
}

impl WorkspaceLayout {
    pub fn new(workspace_location: &Path, project: &Project) -> Self {
        Self {
            root: workspace_location
                .join("projects")
                .join(project.workspace_dir_name()),
        }
    }

    pub fn subdir(&self, which: WorkspaceSubdir) -> PathBuf {
        self.root.join(which.dirname())
    }

    /// Validate and resolve a scoped child path under `which`, rejecting
    /// path separators and `..` segments (§4.2 `UnsafePath`).
    pub fn scoped_path(&self, which: WorkspaceSubdir, name: &str) -> Result<PathBuf, SystemError> {
        if name.is_empty() {
            return Err(SystemError::UnsafePath(
                "file name must not be empty".to_string(),
            ));
        }
        if name.contains('/') || name.contains('\\') || name.split('/').any(|seg| seg == "..") {
            return Err(SystemError::UnsafePath(name.to_string()));
        }
        if name == ".." || name == "." {
            return Err(SystemError::UnsafePath(name.to_string()));
        }
        Ok(self.subdir(which).join(name))
    }

    /// `<stem>-<YYYY-MM-DD-HH-MM-SS>.<ext>` under `output/` (§6).
    pub fn output_file_path(&self, stem: &str, ext: &str, timestamp: &str) -> PathBuf {
        self.subdir(WorkspaceSubdir::Output)
            .join(format!("{stem}-{timestamp}.{ext}"))
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use crate::id::ProjectId;
    use proptest::prelude::*;

    fn layout() -> WorkspaceLayout {
        let project = Project::new(ProjectId::new("abcdefabcdef"), "scan-1", 0).unwrap();
        WorkspaceLayout::new(Path::new("/var/scaorch"), &project)
    }

    proptest! {
        /// Any name free of path separators and `..` segments resolves
        /// strictly inside the target subdirectory (§8 "filename safety").
        #[test]
        fn safe_names_stay_inside_subdir(name in "[A-Za-z0-9][A-Za-z0-9._-]{0,63}") {
            let l = layout();
            let resolved = l.scoped_path(WorkspaceSubdir::Input, &name).unwrap();
            prop_assert!(resolved.starts_with(l.subdir(WorkspaceSubdir::Input)));
            prop_assert_eq!(resolved.file_name().unwrap().to_str().unwrap(), name.as_str());
        }

        /// Any name containing a `/` is rejected outright, regardless of
        /// what else it contains.
        #[test]
        fn names_with_separators_are_always_rejected(
            prefix in "[A-Za-z0-9]{0,8}",
            suffix in "[A-Za-z0-9]{0,8}",
        ) {
            let l = layout();
            let name = format!("{prefix}/{suffix}");
            prop_assert!(l.scoped_path(WorkspaceSubdir::Input, &name).is_err());
        }
    }
}
