use glob::Pattern;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

use super::{Freshness, SourceProvider, SourceText};
use crate::error::DocumentError;

/// Directory-backed source provider
///
/// Layout:
/// - document names are paths relative to `root`, always `/`-separated
/// - the tag is the file extension (empty when there is none)
/// - freshness is the file's modification time
///
/// Names that would escape the root (absolute paths, `..` components) are
/// reported as not found.
pub struct FilesystemSource {
    root: PathBuf,
    exclude: Vec<Pattern>,
}

impl FilesystemSource {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            exclude: Vec::new(),
        }
    }

    /// Exclude names matching any of the glob patterns from enumeration
    pub fn with_exclude(mut self, patterns: &[String]) -> Result<Self, glob::PatternError> {
        for pattern in patterns {
            self.exclude.push(Pattern::new(pattern)?);
        }
        Ok(self)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn is_excluded(&self, name: &str) -> bool {
        self.exclude.iter().any(|pattern| pattern.matches(name))
    }

    fn path_for(&self, name: &str) -> Option<PathBuf> {
        let relative = Path::new(name);
        let contained = relative
            .components()
            .all(|component| matches!(component, Component::Normal(_) | Component::CurDir));
        if name.is_empty() || !contained {
            return None;
        }
        Some(self.root.join(relative))
    }

    fn name_for(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let parts: Vec<&str> = relative
            .components()
            .map(|component| component.as_os_str().to_str())
            .collect::<Option<_>>()?;
        Some(parts.join("/"))
    }
}

fn tag_of(name: &str) -> String {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or_default()
        .to_string()
}

impl SourceProvider for FilesystemSource {
    fn list_names(&self) -> Result<Vec<String>, DocumentError> {
        let mut names = Vec::new();

        for entry in WalkDir::new(&self.root).follow_links(true) {
            let entry = entry.map_err(|e| {
                let display = self.root.display().to_string();
                DocumentError::source_unavailable(&display, io::Error::other(e.to_string()))
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            if let Some(name) = self.name_for(entry.path()) {
                if !self.is_excluded(&name) {
                    names.push(name);
                }
            }
        }

        names.sort();
        debug!(root = %self.root.display(), count = names.len(), "enumerated documents");
        Ok(names)
    }

    fn read_source(&self, name: &str) -> Result<SourceText, DocumentError> {
        let path = self
            .path_for(name)
            .ok_or_else(|| DocumentError::not_found(name))?;

        let metadata = match fs::metadata(&path) {
            Ok(metadata) if metadata.is_file() => metadata,
            Ok(_) => return Err(DocumentError::not_found(name)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(DocumentError::not_found(name))
            }
            Err(e) => return Err(DocumentError::source_unavailable(name, e)),
        };
        let modified = metadata
            .modified()
            .map_err(|e| DocumentError::source_unavailable(name, e))?;

        let text = fs::read_to_string(&path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => DocumentError::not_found(name),
            _ => DocumentError::source_unavailable(name, e),
        })?;

        Ok(SourceText {
            text,
            tag: tag_of(name),
            freshness: Freshness::from_system_time(modified),
        })
    }

    fn freshness(&self, name: &str) -> Result<Option<Freshness>, DocumentError> {
        let Some(path) = self.path_for(name) else {
            return Ok(None);
        };
        match fs::metadata(&path) {
            Ok(metadata) if metadata.is_file() => {
                let modified = metadata
                    .modified()
                    .map_err(|e| DocumentError::source_unavailable(name, e))?;
                Ok(Some(Freshness::from_system_time(modified)))
            }
            Ok(_) => Ok(None),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(DocumentError::source_unavailable(name, e)),
        }
    }
}
