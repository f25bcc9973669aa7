//! Persists rendered artifacts under the report tree.
//!
//! Layout, relative to the root folder:
//!
//! ```text
//! <root>/
//!   env.adoc, docinfo.html          written once, kept across runs
//!   <run folder>/
//!     README.adoc, charts.adoc, timeline.adoc
//!     plays/<play>/README.adoc, all.adoc, charts.adoc
//!     plays/<play>/<task>/README.adoc, <host>.json
//! ```

use std::fs;
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};

use chrono::Local;
use tracing::{debug, trace};

use crate::error::{Error, Result};

/// Writes artifacts for one run.
#[derive(Debug, Clone)]
pub struct ArtifactWriter {
    root: PathBuf,
    run_dir: PathBuf,
}

impl ArtifactWriter {
    /// Creates a writer for `root/run_folder`. Nothing is touched on disk yet.
    pub fn new(root: impl AsRef<Path>, run_folder: &str) -> Self {
        let root = root.as_ref().to_path_buf();
        let run_dir = root.join(run_folder);
        Self { root, run_dir }
    }

    /// Creates a writer whose run folder is the local time in `format`,
    /// e.g. `20240115-103000` for `%Y%m%d-%H%M%S`.
    pub fn with_timestamp(root: impl AsRef<Path>, format: &str) -> Self {
        let folder = Local::now().format(format).to_string();
        Self::new(root, &folder)
    }

    /// The root folder shared by every run.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The folder of this run.
    #[must_use]
    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    /// Writes `content` to `run_dir/relative/file_name`, creating
    /// directories as needed and replacing any existing file.
    pub fn write_artifact(&self, relative: &str, file_name: &str, content: &str) -> Result<PathBuf> {
        let dir = self.run_dir.join(checked_relative(relative)?);
        let path = dir.join(checked_relative(file_name)?);
        fs::create_dir_all(&dir).map_err(|e| Error::artifact_write(&dir, e))?;
        write_replace(&path, content.as_bytes())?;
        trace!("Wrote artifact {}", path.display());
        Ok(path)
    }

    /// Writes a shared asset at the root folder unless it already exists.
    /// Returns whether the file was written.
    pub fn write_static_once(&self, file_name: &str, content: &str) -> Result<bool> {
        let path = self.root.join(checked_relative(file_name)?);
        if path.exists() {
            return Ok(false);
        }
        fs::create_dir_all(&self.root).map_err(|e| Error::artifact_write(&self.root, e))?;
        // another recorder sharing the root may create it concurrently
        let mut file = match fs::OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => return Ok(false),
            Err(e) => return Err(Error::artifact_write(&path, e)),
        };
        file.write_all(content.as_bytes())
            .map_err(|e| Error::artifact_write(&path, e))?;
        debug!("Wrote shared asset {}", path.display());
        Ok(true)
    }
}

/// Path from a directory `relative` (inside the run folder) back to the root
/// folder, where the shared assets live.
pub fn env_rel_path(relative: &str) -> String {
    let depth = Path::new(relative)
        .components()
        .filter(|c| matches!(c, Component::Normal(_)))
        .count();
    vec![".."; depth + 1].join("/")
}

fn checked_relative(relative: &str) -> Result<&Path> {
    let path = Path::new(relative);
    let escapes = path
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if escapes {
        return Err(Error::artifact_write(
            path,
            io::Error::new(io::ErrorKind::InvalidInput, "path leaves the report tree"),
        ));
    }
    Ok(path)
}

/// Writes through a sibling temp file and renames it into place.
fn write_replace(path: &Path, bytes: &[u8]) -> Result<()> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = path.with_file_name(format!(".{file_name}.tmp"));
    fs::write(&tmp, bytes).map_err(|e| Error::artifact_write(&tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| Error::artifact_write(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_creates_parents_and_overwrites() {
        let temp = TempDir::new().unwrap();
        let writer = ArtifactWriter::new(temp.path(), "run");

        let path = writer.write_artifact("plays/site/task", "README.adoc", "one").unwrap();
        assert_eq!(path, temp.path().join("run/plays/site/task/README.adoc"));
        writer.write_artifact("plays/site/task", "README.adoc", "two").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "two");
        assert!(!temp.path().join("run/plays/site/task/.README.adoc.tmp").exists());
    }

    #[test]
    fn test_empty_relative_is_run_dir() {
        let temp = TempDir::new().unwrap();
        let writer = ArtifactWriter::new(temp.path(), "run");
        let path = writer.write_artifact("", "README.adoc", "x").unwrap();
        assert_eq!(path, writer.run_dir().join("README.adoc"));
    }

    #[test]
    fn test_static_assets_written_once() {
        let temp = TempDir::new().unwrap();
        let writer = ArtifactWriter::new(temp.path(), "run");
        assert!(writer.write_static_once("env.adoc", "first").unwrap());
        assert!(!writer.write_static_once("env.adoc", "second").unwrap());
        assert_eq!(fs::read_to_string(temp.path().join("env.adoc")).unwrap(), "first");
    }

    #[test]
    fn test_escaping_paths_are_rejected() {
        let temp = TempDir::new().unwrap();
        let writer = ArtifactWriter::new(temp.path(), "run");
        let err = writer.write_artifact("../outside", "x", "y").unwrap_err();
        assert!(matches!(err, Error::ArtifactWrite { .. }));
        assert!(writer.write_artifact("", "/etc/passwd", "y").is_err());
    }

    #[test]
    fn test_env_rel_path() {
        assert_eq!(env_rel_path(""), "..");
        assert_eq!(env_rel_path("plays/site"), "../../..");
        assert_eq!(env_rel_path("plays/site/task"), "../../../..");
    }

    #[test]
    fn test_timestamped_folder() {
        let temp = TempDir::new().unwrap();
        let writer = ArtifactWriter::with_timestamp(temp.path(), "%Y");
        let name = writer.run_dir().file_name().unwrap().to_string_lossy().into_owned();
        assert_eq!(name.len(), 4);
    }
}
