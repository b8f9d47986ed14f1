use padrelay_common::{digest, tracing, MacroId};
use std::collections::HashMap;
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::compiler::{self, CompileError, MacroSequence};

/// Errors raised while building the macro table
#[derive(Debug, Error)]
pub enum TableError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Compile(#[from] CompileError),
}

/// Process-wide mapping from macro identifier to compiled sequence.
///
/// Playback takes the read lock for each lookup; a reload builds the new map
/// first and only takes the write lock for the swap.
#[derive(Debug, Default)]
pub struct MacroTable {
    macros: RwLock<HashMap<MacroId, Arc<MacroSequence>>>,
}

impl MacroTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile every regular file directly under `directory`.
    ///
    /// A missing directory yields an empty table. Any file that fails to
    /// compile fails the whole load.
    pub async fn load<P: AsRef<Path>>(directory: P) -> Result<Self, TableError> {
        let macros = compile_directory(directory.as_ref()).await?;
        Ok(Self {
            macros: RwLock::new(macros),
        })
    }

    /// Recompile `directory` and atomically replace the current mapping.
    ///
    /// On error the existing mapping is left untouched.
    pub async fn reload<P: AsRef<Path>>(&self, directory: P) -> Result<usize, TableError> {
        let fresh = compile_directory(directory.as_ref()).await?;
        let count = fresh.len();
        *self.macros.write().await = fresh;
        info!("Reloaded {} macros", count);
        Ok(count)
    }

    /// Look up a compiled sequence under the shared lock
    pub async fn lookup(&self, id: &MacroId) -> Option<Arc<MacroSequence>> {
        self.macros.read().await.get(id).cloned()
    }

    /// Register (or replace) a single sequence
    #[cfg(test)]
    pub async fn insert(&self, id: MacroId, sequence: MacroSequence) {
        self.macros.write().await.insert(id, Arc::new(sequence));
    }

    pub async fn len(&self) -> usize {
        self.macros.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.macros.read().await.is_empty()
    }
}

async fn compile_directory(directory: &Path) -> Result<HashMap<MacroId, Arc<MacroSequence>>, TableError> {
    let mut macros = HashMap::new();

    let is_dir = fs::metadata(directory)
        .await
        .map(|meta| meta.is_dir())
        .unwrap_or(false);
    if !is_dir {
        warn!(
            "Macro directory '{}' does not exist or is not a directory, no macros loaded",
            directory.display()
        );
        return Ok(macros);
    }

    let mut entries = fs::read_dir(directory).await.map_err(io_error(directory))?;
    while let Some(entry) = entries.next_entry().await.map_err(io_error(directory))? {
        let path = entry.path();

        // Follows symlinks, so a link to a regular file counts as one
        let is_file = fs::metadata(&path)
            .await
            .map(|meta| meta.is_file())
            .unwrap_or(false);
        if !is_file {
            debug!("Skipping non-file entry {}", path.display());
            continue;
        }

        let file_name = entry.file_name();
        let id = digest(file_name.as_bytes());
        let display_name = file_name.to_string_lossy();

        let document = fs::read_to_string(&path).await.map_err(io_error(&path))?;
        let sequence = compiler::compile(&display_name, &document)?;

        info!("Loaded macro: {} with hash '{}'", display_name, id);
        macros.insert(id, Arc::new(sequence));
    }

    Ok(macros)
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> TableError {
    let path = path.to_path_buf();
    move |source| TableError::Io { path, source }
}
