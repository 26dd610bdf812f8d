use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use cad_mesh::{MeshFormat, MeshSummary, MeshingConfig, analyze, export, is_watertight, mesh_solid};
use cad_script::Artifact;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::ExportError;
use crate::ledger::{ArtifactRef, TurnId};
use crate::slug::slugify;

/// Exported artifact as written to disk.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredArtifact {
    pub file_name: String,
    pub path: PathBuf,
    pub bytes: Vec<u8>,
    pub summary: MeshSummary,
}

impl StoredArtifact {
    pub fn to_ref(&self) -> ArtifactRef {
        ArtifactRef {
            file_name: self.file_name.clone(),
            path: self.path.clone(),
            size_bytes: self.bytes.len() as u64,
            summary: self.summary.clone(),
        }
    }
}

/// Directory of exported mesh files, one per committed turn.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
    format: MeshFormat,
    meshing: MeshingConfig,
}

impl ArtifactStore {
    /// Creates `dir` if needed and resolves it to an absolute path.
    pub fn open(
        dir: impl AsRef<Path>,
        format: MeshFormat,
        meshing: MeshingConfig,
    ) -> Result<Self, ExportError> {
        let dir = dir.as_ref();
        let io_err = |source: io::Error| ExportError::Io {
            path: dir.to_path_buf(),
            source,
        };
        fs::create_dir_all(dir).map_err(io_err)?;
        let dir = fs::canonicalize(dir).map_err(io_err)?;
        Ok(Self {
            dir,
            format,
            meshing,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn format(&self) -> MeshFormat {
        self.format
    }

    /// Meshes, checks and writes `artifact` under a name derived from `desired_name`.
    ///
    /// When `<slug>.stl` is taken the file becomes `<slug>_<short id>.stl`; an
    /// existing file is never replaced.
    pub fn persist(
        &self,
        artifact: &Artifact,
        desired_name: &str,
        turn_id: &TurnId,
    ) -> Result<StoredArtifact, ExportError> {
        let mesh = mesh_solid(&artifact.solid, &self.meshing)?;
        if mesh.is_empty() {
            return Err(ExportError::EmptySolid);
        }
        if !is_watertight(&mesh) {
            return Err(ExportError::NotWatertight {
                triangles: mesh.triangle_count(),
            });
        }

        let summary = analyze(&mesh);
        let slug = slugify(desired_name);
        let bytes = export(&mesh, self.format, &slug);
        let extension = self.format.extension();

        let mut temp = NamedTempFile::new_in(&self.dir).map_err(|source| self.io_err(source))?;
        temp.write_all(&bytes)
            .and_then(|()| temp.as_file().sync_all())
            .map_err(|source| self.io_err(source))?;

        let primary = format!("{slug}.{extension}");
        let file_name = match temp.persist_noclobber(self.dir.join(&primary)) {
            Ok(_) => primary,
            Err(err) if err.error.kind() == io::ErrorKind::AlreadyExists => {
                let fallback = format!("{slug}_{}.{extension}", turn_id.short());
                debug!(taken = %primary, file = %fallback, "artifact name in use");
                err.file
                    .persist_noclobber(self.dir.join(&fallback))
                    .map_err(|err| self.io_err(err.error))?;
                fallback
            }
            Err(err) => return Err(self.io_err(err.error)),
        };

        debug!(
            file = %file_name,
            bytes = bytes.len(),
            triangles = summary.triangle_count,
            "artifact written"
        );
        Ok(StoredArtifact {
            path: self.dir.join(&file_name),
            file_name,
            bytes,
            summary,
        })
    }

    pub fn read(&self, file_name: &str) -> Result<Vec<u8>, ExportError> {
        let path = self.path_of(file_name)?;
        fs::read(&path).map_err(|source| match source.kind() {
            io::ErrorKind::NotFound => ExportError::NotFound(file_name.to_string()),
            _ => ExportError::Io { path, source },
        })
    }

    /// Deletes an artifact file. A file that is already gone is not an error.
    pub fn remove(&self, file_name: &str) -> Result<(), ExportError> {
        let path = self.path_of(file_name)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(ExportError::Io { path, source }),
        }
    }

    /// Path inside the store for a bare file name; anything that could escape is refused.
    pub fn path_of(&self, file_name: &str) -> Result<PathBuf, ExportError> {
        let escapes = file_name.is_empty()
            || file_name.starts_with('.')
            || file_name.contains(['/', '\\', '\0'])
            || file_name.contains("..");
        if escapes {
            return Err(ExportError::InvalidFileName(file_name.to_string()));
        }
        Ok(self.dir.join(file_name))
    }

    fn io_err(&self, source: io::Error) -> ExportError {
        ExportError::Io {
            path: self.dir.clone(),
            source,
        }
    }
}
