//! Work-item file naming for the external-tool pipeline.
//!
//! Every issuance gets one random base name; its key, CSR, extension, signed
//! certificate and bundle files live under per-artifact directories of the
//! configured work dir. Concurrent issuances therefore never share a path.

use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::errors::{Error, Result};

pub const KEY_DIR: &str = "key_files";
pub const CSR_DIR: &str = "csr_files";
pub const EXT_DIR: &str = "ext_files";
pub const CRT_DIR: &str = "crt_files";
pub const PEM_DIR: &str = "pem_files";

/// Allocates unique [`WorkItemFileSet`]s under a work directory.
#[derive(Debug, Clone)]
pub struct WorkItemNamer {
    root: PathBuf,
    prefix: String,
}

impl WorkItemNamer {
    pub fn new(root: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            prefix: prefix.into(),
        }
    }

    /// Create the artifact directories if missing.
    pub async fn ensure_dirs(&self) -> Result<()> {
        for dir in [KEY_DIR, CSR_DIR, EXT_DIR, CRT_DIR, PEM_DIR] {
            let path = self.root.join(dir);
            tokio::fs::create_dir_all(&path).await.map_err(|e| {
                Error::io(e, format!("Failed to create work directory {}", path.display()))
            })?;
        }
        Ok(())
    }

    /// `<prefix><uuid-v4>` plus the five derived paths.
    pub fn allocate(&self) -> WorkItemFileSet {
        let base_name = format!("{}{}", self.prefix, Uuid::new_v4());

        WorkItemFileSet {
            key: self.root.join(KEY_DIR).join(format!("{base_name}.key")),
            csr: self.root.join(CSR_DIR).join(format!("{base_name}.csr")),
            ext: self.root.join(EXT_DIR).join(format!("{base_name}.v3.ext")),
            crt: self.root.join(CRT_DIR).join(format!("{base_name}.crt")),
            pem: self.root.join(PEM_DIR).join(format!("{base_name}.pem")),
            base_name,
        }
    }
}

/// Paths of every intermediate artifact of one issuance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItemFileSet {
    pub base_name: String,
    pub key: PathBuf,
    pub csr: PathBuf,
    pub ext: PathBuf,
    pub crt: PathBuf,
    pub pem: PathBuf,
}

impl WorkItemFileSet {
    pub fn paths(&self) -> [&Path; 5] {
        [&self.key, &self.csr, &self.ext, &self.crt, &self.pem]
    }
}
