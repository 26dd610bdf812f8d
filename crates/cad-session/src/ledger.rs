use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use cad_mesh::MeshSummary;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::PersistenceError;
use crate::lock::LedgerLock;
use crate::store::ArtifactStore;

pub const LEDGER_VERSION: u32 = 1;

/// Time-ordered turn identifier (UUID v7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TurnId(Uuid);

impl TurnId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Eight hex digits from the random part of the id.
    pub fn short(&self) -> String {
        let hex = self.0.simple().to_string();
        hex[20..28].to_string()
    }
}

impl Default for TurnId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TurnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for TurnId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnStatus {
    Committed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub file_name: String,
    pub path: PathBuf,
    pub size_bytes: u64,
    pub summary: MeshSummary,
}

/// One committed step of a session. Never mutated once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub id: TurnId,
    pub prompt: String,
    pub code: String,
    pub artifact: ArtifactRef,
    pub parent_id: Option<TurnId>,
    pub created_at: DateTime<Utc>,
    pub status: TurnStatus,
}

#[derive(Serialize)]
struct LedgerFileRef<'a> {
    version: u32,
    turns: &'a [Turn],
}

#[derive(Deserialize)]
struct LedgerFile {
    version: u32,
    #[serde(default)]
    turns: Vec<Turn>,
}

/// Append-only turn history mirrored to `history.json`.
#[derive(Debug)]
pub struct HistoryLedger {
    path: PathBuf,
    lock_path: PathBuf,
    turns: Vec<Turn>,
    #[cfg(test)]
    pub(crate) fail_next_flush: bool,
}

impl HistoryLedger {
    /// Loads the ledger at `path`. A missing file is an empty history.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, PersistenceError> {
        let path = path.into();
        let lock_path = path.with_extension("lock");
        let turns = read_durable(&path)?;
        info!(path = %path.display(), turns = turns.len(), "history loaded");
        Ok(Self {
            path,
            lock_path,
            turns,
            #[cfg(test)]
            fail_next_flush: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    pub fn get(&self, id: &TurnId) -> Option<&Turn> {
        self.turns.iter().find(|turn| turn.id == *id)
    }

    /// Matches a full id, or a prefix of at least four characters that names one turn.
    pub fn resolve(&self, text: &str) -> Option<TurnId> {
        let text = text.trim();
        if let Ok(id) = text.parse::<TurnId>() {
            return self.get(&id).map(|turn| turn.id);
        }
        if text.len() < 4 {
            return None;
        }
        let mut matches = self
            .turns
            .iter()
            .filter(|turn| turn.id.to_string().starts_with(text));
        match (matches.next(), matches.next()) {
            (Some(turn), None) => Some(turn.id),
            _ => None,
        }
    }

    /// Appends `turn` and flushes the whole history before returning.
    ///
    /// `created_at` is clamped to the previous turn's timestamp. If the flush
    /// fails the turn is dropped again and memory matches the durable file.
    pub fn append(&mut self, mut turn: Turn) -> Result<&Turn, PersistenceError> {
        let _lock = LedgerLock::acquire(&self.lock_path)?;
        self.adopt_durable()?;

        if self.get(&turn.id).is_some() {
            return Err(self.inconsistent(format!("turn {} already exists", turn.id)));
        }
        if let Some(parent) = turn.parent_id
            && self.get(&parent).is_none()
        {
            return Err(self.inconsistent(format!("parent turn {parent} is not in history")));
        }
        if let Some(last) = self.turns.last()
            && turn.created_at < last.created_at
        {
            turn.created_at = last.created_at;
        }

        self.turns.push(turn);
        if let Err(err) = self.flush() {
            self.turns.pop();
            warn!(error = %err, "history flush failed, append rolled back");
            return Err(err);
        }

        let turn = &self.turns[self.turns.len() - 1];
        info!(turn = %turn.id, file = %turn.artifact.file_name, "turn committed");
        Ok(turn)
    }

    /// Empties the durable file, then memory, then the artifact files of the
    /// cleared turns. Returns how many turns were removed.
    pub fn clear(&mut self, store: &ArtifactStore) -> Result<usize, PersistenceError> {
        let _lock = LedgerLock::acquire(&self.lock_path)?;
        self.adopt_durable()?;

        write_durable(&self.path, &[])?;
        let cleared = std::mem::take(&mut self.turns);

        for turn in &cleared {
            if let Err(err) = store.remove(&turn.artifact.file_name) {
                warn!(
                    file = %turn.artifact.file_name,
                    error = %err,
                    "failed to remove artifact of cleared turn"
                );
            }
        }
        info!(turns = cleared.len(), "history cleared");
        Ok(cleared.len())
    }

    /// Picks up turns written or cleared by another session sharing the file.
    /// Returns whether memory changed.
    pub fn refresh(&mut self) -> Result<bool, PersistenceError> {
        self.adopt_durable()
    }

    /// Replaces memory with the durable history if another session changed it.
    fn adopt_durable(&mut self) -> Result<bool, PersistenceError> {
        let durable = read_durable(&self.path)?;
        if durable == self.turns {
            return Ok(false);
        }
        info!(
            in_memory = self.turns.len(),
            durable = durable.len(),
            "history changed on disk, adopting durable copy"
        );
        self.turns = durable;
        Ok(true)
    }

    fn flush(&mut self) -> Result<(), PersistenceError> {
        #[cfg(test)]
        if std::mem::take(&mut self.fail_next_flush) {
            return Err(PersistenceError::Io {
                path: self.path.clone(),
                source: io::Error::other("injected flush failure"),
            });
        }
        write_durable(&self.path, &self.turns)
    }

    fn inconsistent(&self, reason: String) -> PersistenceError {
        PersistenceError::Inconsistent {
            path: self.path.clone(),
            reason,
        }
    }
}

fn read_durable(path: &Path) -> Result<Vec<Turn>, PersistenceError> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(PersistenceError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    let file: LedgerFile =
        serde_json::from_str(&text).map_err(|source| PersistenceError::Corrupt {
            path: path.to_path_buf(),
            source,
        })?;
    if file.version != LEDGER_VERSION {
        return Err(PersistenceError::UnsupportedVersion {
            path: path.to_path_buf(),
            version: file.version,
        });
    }
    check_consistency(&file.turns).map_err(|reason| PersistenceError::Inconsistent {
        path: path.to_path_buf(),
        reason,
    })?;
    Ok(file.turns)
}

fn check_consistency(turns: &[Turn]) -> Result<(), String> {
    let mut seen = HashSet::with_capacity(turns.len());
    let mut previous: Option<&DateTime<Utc>> = None;

    for (index, turn) in turns.iter().enumerate() {
        if let Some(parent) = turn.parent_id
            && !seen.contains(&parent)
        {
            return Err(format!(
                "turn {index} refers to parent {parent} which is not an earlier turn"
            ));
        }
        if !seen.insert(turn.id) {
            return Err(format!("turn id {} appears more than once", turn.id));
        }
        if previous.is_some_and(|prev| turn.created_at < *prev) {
            return Err(format!("turn {index} is older than the turn before it"));
        }
        previous = Some(&turn.created_at);
    }
    Ok(())
}

/// Temp file in the same directory, fsync, rename over the target.
fn write_durable(path: &Path, turns: &[Turn]) -> Result<(), PersistenceError> {
    let io_err = |source: io::Error| PersistenceError::Io {
        path: path.to_path_buf(),
        source,
    };
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir).map_err(io_err)?;

    let mut temp = NamedTempFile::new_in(dir).map_err(io_err)?;
    {
        let mut writer = BufWriter::new(temp.as_file_mut());
        serde_json::to_writer_pretty(
            &mut writer,
            &LedgerFileRef {
                version: LEDGER_VERSION,
                turns,
            },
        )
        .map_err(|err| io_err(io::Error::other(err)))?;
        writer.write_all(b"\n").map_err(io_err)?;
        writer.flush().map_err(io_err)?;
    }
    temp.as_file().sync_all().map_err(io_err)?;
    temp.persist(path).map_err(|err| io_err(err.error))?;
    Ok(())
}
