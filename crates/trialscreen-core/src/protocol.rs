//! Trial protocol storage: one markdown file per protocol.
//!
//! Protocols are saved under a sanitized name (Unicode alphanumerics, `_` and
//! `-`). Hand-placed `.md` files whose stems fall outside that set are still
//! listed and loaded under their stem. The criteria text is opaque and handed
//! to the prompt verbatim.

use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File extension for stored protocols.
pub const PROTOCOL_EXTENSION: &str = "md";

/// Errors from the protocol library.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Protocol I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid protocol name: {0:?} (allowed: letters, digits, '_' and '-')")]
    InvalidName(String),

    #[error("Protocol not found: {0}")]
    NotFound(String),
}

/// A named trial's criteria text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Protocol {
    pub name: String,
    pub criteria: String,
}

/// Keep alphanumerics, `_` and `-`; drop everything else.
pub fn sanitize_name(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '-')
        .collect()
}

/// Directory-backed protocol store.
#[derive(Debug, Clone)]
pub struct ProtocolLibrary {
    root: PathBuf,
}

impl ProtocolLibrary {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path a protocol would be stored at. Fails if the name sanitizes to
    /// nothing.
    pub fn path_for(&self, name: &str) -> Result<PathBuf, ProtocolError> {
        let safe = sanitize_name(name);
        if safe.is_empty() {
            return Err(ProtocolError::InvalidName(name.to_string()));
        }
        Ok(self.root.join(format!("{safe}.{PROTOCOL_EXTENSION}")))
    }

    /// `(stem, path)` for every `.md` file in the directory, sorted by stem.
    /// A missing directory is empty.
    fn entries(&self) -> Result<Vec<(String, PathBuf)>, ProtocolError> {
        let dir = match fs::read_dir(&self.root) {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut entries = Vec::new();
        for entry in dir {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            if path.extension().and_then(|e| e.to_str()) != Some(PROTOCOL_EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                entries.push((stem.to_string(), path.clone()));
            }
        }
        entries.sort();
        Ok(entries)
    }

    /// Sorted names of all stored protocols.
    pub fn list(&self) -> Result<Vec<String>, ProtocolError> {
        Ok(self.entries()?.into_iter().map(|(name, _)| name).collect())
    }

    /// Load one protocol by name.
    ///
    /// The sanitized name is tried first; a name that only matches a stored
    /// file's stem exactly (as printed by [`list`](Self::list)) loads that file.
    pub fn load(&self, name: &str) -> Result<Protocol, ProtocolError> {
        let path = self.path_for(name)?;
        match read_protocol(sanitize_name(name), &path) {
            Err(ProtocolError::NotFound(_)) => {}
            found => return found,
        }

        match self.entries()?.into_iter().find(|(stem, _)| stem == name) {
            Some((stem, path)) => read_protocol(stem, &path),
            None => Err(ProtocolError::NotFound(name.to_string())),
        }
    }

    /// Load every stored protocol, in name order.
    pub fn load_all(&self) -> Result<Vec<Protocol>, ProtocolError> {
        self.entries()?
            .into_iter()
            .map(|(name, path)| read_protocol(name, &path))
            .collect()
    }

    /// Write a protocol, replacing any existing one with the same sanitized
    /// name. Returns the name it was stored under.
    pub fn save(&self, name: &str, criteria: &str) -> Result<String, ProtocolError> {
        let path = self.path_for(name)?;
        fs::create_dir_all(&self.root)?;
        fs::write(&path, criteria)?;

        let stored = sanitize_name(name);
        tracing::info!(protocol = %stored, path = %path.display(), "Saved protocol");
        Ok(stored)
    }
}

fn read_protocol(name: String, path: &Path) -> Result<Protocol, ProtocolError> {
    match fs::read_to_string(path) {
        Ok(criteria) => Ok(Protocol { name, criteria }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(ProtocolError::NotFound(name)),
        Err(e) => Err(e.into()),
    }
}
