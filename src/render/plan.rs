//! Write-plan computation and application.
//!
//! The plan is computed for the whole file tree before any byte is written:
//! absent files become `Create`, present files become `Merge` with only the
//! managed payload replaced, and files whose merged content equals what is
//! already on disk become `Unchanged`. Application is atomic per file
//! (write to a temp file, then rename); an I/O failure aborts the rest of
//! the plan and already-written files stay.

use std::fs;
use std::path::{Path, PathBuf};

use crate::errors::RenderError;
use crate::render::region::ManagedFile;
use crate::render::RenderedFile;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteAction {
    Create,
    Merge,
    Unchanged,
}

/// One entry of the write plan: the full future content of a file.
#[derive(Debug, Clone)]
pub struct PlannedWrite {
    pub rel_path: PathBuf,
    pub action: WriteAction,
    pub content: String,
}

/// Computes the full plan against the current state of `out_dir` without
/// writing anything.
pub fn plan_writes(
    out_dir: &Path,
    rendered: &[RenderedFile],
) -> Result<Vec<PlannedWrite>, RenderError> {
    let mut plan = Vec::with_capacity(rendered.len());

    for file in rendered {
        let target = out_dir.join(&file.rel_path);
        let planned = if target.is_file() {
            let existing = fs::read_to_string(&target).map_err(|e| RenderError::Io {
                file: target.clone(),
                source: e,
            })?;
            let merged = ManagedFile::split(&target, &existing)?
                .with_payload(file.payload.clone())
                .compose();
            PlannedWrite {
                rel_path: file.rel_path.clone(),
                action: if merged == existing {
                    WriteAction::Unchanged
                } else {
                    WriteAction::Merge
                },
                content: merged,
            }
        } else {
            PlannedWrite {
                rel_path: file.rel_path.clone(),
                action: WriteAction::Create,
                content: ManagedFile::fresh(file.payload.clone()).compose(),
            }
        };
        plan.push(planned);
    }

    Ok(plan)
}

/// Applies the plan. `Unchanged` entries are skipped so a no-change run
/// leaves file timestamps alone too.
pub fn apply_writes(out_dir: &Path, plan: &[PlannedWrite]) -> Result<(), RenderError> {
    for write in plan {
        if write.action == WriteAction::Unchanged {
            continue;
        }
        let target = out_dir.join(&write.rel_path);
        write_atomic(&target, &write.content)?;
    }
    Ok(())
}

fn write_atomic(target: &Path, content: &str) -> Result<(), RenderError> {
    let io_err = |e: std::io::Error| RenderError::Io {
        file: target.to_path_buf(),
        source: e,
    };

    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(io_err)?;
    }

    let mut temp = target.as_os_str().to_owned();
    temp.push(".tmp");
    let temp = PathBuf::from(temp);

    fs::write(&temp, content).map_err(io_err)?;
    fs::rename(&temp, target).map_err(io_err)?;
    Ok(())
}
