//! Infrastructure implementation of the `ModuleWorkspace` port.
//!
//! Copies a module into a fresh temporary directory so concurrent cases never
//! share `.terraform/` or state files.

use std::any::Any;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::application::ports::ModuleWorkspace;

/// Entries never copied into the scratch directory.
fn is_engine_state(name: &str) -> bool {
    name == ".terraform" || name.contains(".tfstate")
}

/// `ModuleWorkspace` backed by `tempfile::TempDir`.
#[derive(Debug, Default)]
pub struct TempDirWorkspace;

impl ModuleWorkspace for TempDirWorkspace {
    fn isolate(&self, source: &Path) -> Result<(PathBuf, Box<dyn Any>)> {
        if !source.is_dir() {
            anyhow::bail!("module directory {} does not exist", source.display());
        }
        let scratch = tempfile::Builder::new()
            .prefix("infracheck-")
            .tempdir()
            .context("cannot create scratch directory")?;
        let name = source
            .file_name()
            .map_or_else(|| "module".into(), |n| n.to_os_string());
        let target = scratch.path().join(name);
        copy_tree(source, &target)?;
        Ok((target, Box::new(scratch)))
    }
}

fn copy_tree(from: &Path, to: &Path) -> Result<()> {
    std::fs::create_dir_all(to).with_context(|| format!("cannot create {}", to.display()))?;
    for entry in std::fs::read_dir(from).with_context(|| format!("cannot read {}", from.display()))? {
        let entry = entry.with_context(|| format!("cannot read {}", from.display()))?;
        let name = entry.file_name();
        if is_engine_state(&name.to_string_lossy()) {
            continue;
        }
        let src = entry.path();
        let dst = to.join(&name);
        let file_type = entry
            .file_type()
            .with_context(|| format!("cannot stat {}", src.display()))?;
        if file_type.is_dir() {
            copy_tree(&src, &dst)?;
        } else {
            // Symlinks are followed.
            std::fs::copy(&src, &dst)
                .with_context(|| format!("cannot copy {} to {}", src.display(), dst.display()))?;
        }
    }
    Ok(())
}
