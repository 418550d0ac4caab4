//! File-backed state: module order and recovery marker.
//!
//! The order file is line oriented, one `identifier=position` entry per
//! line, and is rewritten in full on every change:
//!
//! ```text
//! # splice module order
//! better-chat=0
//! deck-tracker=1
//! ```
//!
//! The position is everything after the last `=`, so identifiers may contain
//! `=`. Bare identifier lines are accepted on read and placed after every
//! positioned entry, in file order. Blank lines and `#` comments are skipped.

use crate::host::InstalledModule;
use splice_core::{OrderStore, PersistenceError, RecoveryMarker};
use std::{
    collections::HashSet,
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
};

const HEADER: &str = "# splice module order";

/// Stores the module order in a text file.
#[derive(Debug, Clone)]
pub struct FileOrderStore {
    path: PathBuf,
}

impl FileOrderStore {
    /// A store backed by `path`. The file is created on first save.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl OrderStore for FileOrderStore {
    fn load(&self) -> Result<Vec<String>, PersistenceError> {
        match fs::read_to_string(&self.path) {
            Ok(content) => parse_order(&content),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(err) => Err(err.into()),
        }
    }

    fn save(&self, order: &[String]) -> Result<(), PersistenceError> {
        if let Some(id) = order.iter().find(|id| !is_storable_id(id)) {
            return Err(PersistenceError::InvalidId(id.clone()));
        }
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("tmp");
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(render_order(order).as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

/// Returns `true` if `id` reads back unchanged from the order file.
///
/// Rejects empty identifiers, surrounding whitespace, a leading `#` and
/// line breaks.
pub fn is_storable_id(id: &str) -> bool {
    !id.is_empty()
        && id.trim() == id
        && !id.starts_with('#')
        && !id.contains(['\n', '\r'])
}

/// Parse the order file format.
pub fn parse_order(content: &str) -> Result<Vec<String>, PersistenceError> {
    let mut positioned: Vec<(usize, String)> = Vec::new();
    let mut bare: Vec<String> = Vec::new();

    for (index, raw) in content.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match line.rsplit_once('=') {
            Some((id, position)) => {
                let id = id.trim();
                let position = position.trim().parse::<usize>().ok();
                match position {
                    Some(position) if !id.is_empty() => positioned.push((position, id.to_string())),
                    _ => {
                        return Err(PersistenceError::Malformed {
                            line: index + 1,
                            content: raw.to_string(),
                        });
                    }
                }
            }
            None => bare.push(line.to_string()),
        }
    }

    // Stable: equal positions keep file order.
    positioned.sort_by_key(|(position, _)| *position);

    let mut seen = HashSet::new();
    Ok(positioned
        .into_iter()
        .map(|(_, id)| id)
        .chain(bare)
        .filter(|id| seen.insert(id.clone()))
        .collect())
}

/// Render an order in the file format.
pub fn render_order(order: &[String]) -> String {
    let mut out = String::from(HEADER);
    out.push('\n');
    for (position, id) in order.iter().enumerate() {
        out.push_str(&format!("{id}={position}\n"));
    }
    out
}

/// Reconcile a persisted order with the installed modules.
///
/// Listed identifiers without an installed, enabled module are dropped.
/// Enabled modules missing from the list are appended in installation order.
pub fn reconcile(persisted: Vec<String>, installed: &[InstalledModule]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut order: Vec<String> = persisted
        .into_iter()
        .filter(|id| installed.iter().any(|m| m.enabled && &m.id == id))
        .filter(|id| seen.insert(id.clone()))
        .collect();

    for module in installed {
        if module.enabled && !order.contains(&module.id) {
            order.push(module.id.clone());
        }
    }
    order
}

/// A recovery marker stored as an empty file.
#[derive(Debug, Clone)]
pub struct FileMarker {
    path: PathBuf,
}

impl FileMarker {
    /// A marker at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The marker file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RecoveryMarker for FileMarker {
    fn is_present(&self) -> bool {
        self.path.exists()
    }

    fn set(&self) -> Result<(), PersistenceError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::File::create(&self.path)?;
        Ok(())
    }

    fn clear(&self) -> Result<(), PersistenceError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}
