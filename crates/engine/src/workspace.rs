// SPDX-License-Identifier: MIT

//! Workspace Manager (C1, §4.2): filesystem operations scoped to a single
//! project's workspace directory tree.

use scaorch_core::workspace::WorkspaceSubdir;
use scaorch_core::{Project, SystemError, WorkspaceLayout};
use std::path::{Path, PathBuf};

/// Create the project's workspace root and its four fixed subdirectories.
/// A no-op if the directories already exist (§4.2 "safe on repeated
/// calls").
pub fn create_workspace(layout: &WorkspaceLayout) -> Result<(), SystemError> {
    for subdir in WorkspaceSubdir::ALL {
        std::fs::create_dir_all(layout.subdir(subdir))?;
    }
    Ok(())
}

/// Resolve `name` under `which`, rejecting unsafe path components.
pub fn path_of(
    layout: &WorkspaceLayout,
    which: WorkspaceSubdir,
    name: &str,
) -> Result<PathBuf, SystemError> {
    layout.scoped_path(which, name)
}

/// Copy `src` into `input/<dst_name>`, tagging nothing itself — the
/// caller records the returned path's `(filename, tag, size)` as an
/// `InputSource` (§4.3). On any failure mid-copy the partial destination
/// file is removed so a later retry never observes a truncated input.
pub fn copy_file_to_input(
    layout: &WorkspaceLayout,
    src: &Path,
    dst_name: &str,
) -> Result<PathBuf, SystemError> {
    let dest = layout.scoped_path(WorkspaceSubdir::Input, dst_name)?;
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)?;
    }
    if let Err(e) = std::fs::copy(src, &dest) {
        let _ = std::fs::remove_file(&dest);
        return Err(e.into());
    }
    Ok(dest)
}

/// Recursively copy `src` into the project's `codebase/` subdirectory.
/// Any error mid-tree-copy removes what was written so far.
pub fn copy_tree_to_codebase(layout: &WorkspaceLayout, src: &Path) -> Result<PathBuf, SystemError> {
    let dest = layout.subdir(WorkspaceSubdir::Codebase);
    std::fs::create_dir_all(&dest)?;
    if let Err(e) = copy_tree(src, &dest) {
        let _ = remove_dir_contents(&dest);
        return Err(e);
    }
    Ok(dest)
}

fn copy_tree(src: &Path, dest: &Path) -> Result<(), SystemError> {
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        let target = dest.join(entry.file_name());
        if file_type.is_dir() {
            std::fs::create_dir_all(&target)?;
            copy_tree(&entry.path(), &target)?;
        } else if file_type.is_file() {
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

fn remove_dir_contents(dir: &Path) -> Result<(), SystemError> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            std::fs::remove_dir_all(entry.path())?;
        } else {
            std::fs::remove_file(entry.path())?;
        }
    }
    Ok(())
}

/// Remove a subdirectory's contents. A no-op if the subdirectory does not
/// exist (§4.2 "safe on repeated calls").
pub fn remove_subdir(layout: &WorkspaceLayout, which: WorkspaceSubdir) -> Result<(), SystemError> {
    let dir = layout.subdir(which);
    match std::fs::remove_dir_all(&dir) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Remove the project's entire workspace root, including all four
/// subdirectories (used by `DeleteProject`, §4.1). A no-op if absent.
pub fn remove_workspace(layout: &WorkspaceLayout) -> Result<(), SystemError> {
    match std::fs::remove_dir_all(&layout.root) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// `<basename>-<timestamp>.<ext>` under `output/`, unique per call.
pub fn get_output_file_path(
    layout: &WorkspaceLayout,
    basename: &str,
    ext: &str,
    timestamp: &str,
) -> PathBuf {
    layout.output_file_path(basename, ext, timestamp)
}

/// Convenience: build the layout for a project under the configured
/// workspace root.
pub fn layout_for(workspace_location: &Path, project: &Project) -> WorkspaceLayout {
    WorkspaceLayout::new(workspace_location, project)
}

#[cfg(test)]
mod tests {
    use super::*;
    use scaorch_core::id::ProjectId;

    fn test_layout(root: &Path) -> (WorkspaceLayout, Project) {
        let project = Project::new(ProjectId::new("abcdefabcdef"), "scan-1", 0).unwrap();
        (WorkspaceLayout::new(root, &project), project)
    }

    #[test]
    fn create_workspace_makes_all_four_subdirs() {
        let dir = tempfile::tempdir().unwrap();
        let (layout, _project) = test_layout(dir.path());
        create_workspace(&layout).unwrap();
        for subdir in WorkspaceSubdir::ALL {
            assert!(layout.subdir(subdir).is_dir());
        }
    }

    #[test]
    fn create_workspace_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let (layout, _project) = test_layout(dir.path());
        create_workspace(&layout).unwrap();
        create_workspace(&layout).unwrap();
    }

    #[test]
    fn copy_file_to_input_writes_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let (layout, _project) = test_layout(dir.path());
        create_workspace(&layout).unwrap();
        let src = dir.path().join("source.txt");
        std::fs::write(&src, b"hello").unwrap();
        let dest = copy_file_to_input(&layout, &src, "archive.txt").unwrap();
        assert_eq!(std::fs::read(&dest).unwrap(), b"hello");
    }

    #[test]
    fn copy_file_to_input_rejects_unsafe_names() {
        let dir = tempfile::tempdir().unwrap();
        let (layout, _project) = test_layout(dir.path());
        create_workspace(&layout).unwrap();
        let src = dir.path().join("source.txt");
        std::fs::write(&src, b"hello").unwrap();
        assert!(copy_file_to_input(&layout, &src, "../escape.txt").is_err());
    }

    #[test]
    fn copy_tree_to_codebase_recurses_into_subdirectories() {
        let dir = tempfile::tempdir().unwrap();
        let (layout, _project) = test_layout(dir.path());
        create_workspace(&layout).unwrap();
        let src = dir.path().join("src-tree");
        std::fs::create_dir_all(src.join("nested")).unwrap();
        std::fs::write(src.join("a.txt"), b"a").unwrap();
        std::fs::write(src.join("nested/b.txt"), b"b").unwrap();

        let dest = copy_tree_to_codebase(&layout, &src).unwrap();
        assert!(dest.join("a.txt").exists());
        assert!(dest.join("nested/b.txt").exists());
    }

    #[test]
    fn remove_subdir_on_an_absent_directory_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let (layout, _project) = test_layout(dir.path());
        remove_subdir(&layout, WorkspaceSubdir::Tmp).unwrap();
    }

    #[test]
    fn get_output_file_path_is_unique_per_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        let (layout, _project) = test_layout(dir.path());
        let a = get_output_file_path(&layout, "scan-1", "json", "2026-07-28-10-00-00");
        let b = get_output_file_path(&layout, "scan-1", "json", "2026-07-28-10-00-01");
        assert_ne!(a, b);
    }
}
