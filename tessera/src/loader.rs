//! Where templates and tag libraries come from when they aren't registered on the
//! environment directly.
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::errors::{Error, TesseraResult};
use crate::library::Library;
use crate::template::Template;
use crate::HashMap;

/// Where a template came from. Error reports use the name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Origin {
    pub name: String,
    /// The file the source was read from, if any
    pub path: Option<PathBuf>,
}

impl Origin {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: None,
        }
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.path {
            Some(ref p) => write!(f, "{} ({})", self.name, p.display()),
            None => f.write_str(&self.name),
        }
    }
}

/// What a loader found for a name: either source text to compile or a template that is
/// ready to render.
#[derive(Debug, Clone)]
pub enum LoadedTemplate {
    Source(String),
    Compiled(Arc<Template>),
}

/// Looks templates and tag libraries up by name.
///
/// `Ok(None)` means the name is unknown to this loader; the environment turns that into
/// a [`TemplateNotFound`](crate::ErrorKind::TemplateNotFound) error.
pub trait Loader: Send + Sync {
    fn load_template_source(&self, name: &str) -> TesseraResult<Option<(LoadedTemplate, Origin)>>;

    /// Libraries `{% load %}` can find beyond the ones registered on the environment.
    fn load_library(&self, _name: &str) -> TesseraResult<Option<Library>> {
        Ok(None)
    }
}

/// Templates kept in memory, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct MemoryLoader {
    templates: HashMap<String, String>,
    libraries: HashMap<String, Library>,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, source: impl Into<String>) {
        self.templates.insert(name.into(), source.into());
    }

    pub fn insert_library(&mut self, name: impl Into<String>, library: Library) {
        self.libraries.insert(name.into(), library);
    }
}

impl<N: Into<String>, S: Into<String>> FromIterator<(N, S)> for MemoryLoader {
    fn from_iter<I: IntoIterator<Item = (N, S)>>(iter: I) -> Self {
        let mut loader = MemoryLoader::new();
        for (name, source) in iter {
            loader.insert(name, source);
        }
        loader
    }
}

impl Loader for MemoryLoader {
    fn load_template_source(&self, name: &str) -> TesseraResult<Option<(LoadedTemplate, Origin)>> {
        Ok(self
            .templates
            .get(name)
            .map(|source| (LoadedTemplate::Source(source.clone()), Origin::new(name))))
    }

    fn load_library(&self, name: &str) -> TesseraResult<Option<Library>> {
        Ok(self.libraries.get(name).cloned())
    }
}

/// Every file matching a glob, named by its path relative to the part of the glob
/// before the first `*`, with forward slashes.
#[cfg(feature = "glob_fs")]
#[derive(Debug, Clone)]
pub struct GlobLoader {
    glob: String,
    files: HashMap<String, PathBuf>,
}

#[cfg(feature = "glob_fs")]
impl GlobLoader {
    pub fn new(glob: &str) -> TesseraResult<Self> {
        let mut loader = Self {
            glob: glob.to_string(),
            files: HashMap::new(),
        };
        loader.reload()?;
        Ok(loader)
    }

    /// Walks the filesystem again, picking up added and removed files.
    pub fn reload(&mut self) -> TesseraResult<()> {
        use globset::GlobBuilder;
        use walkdir::WalkDir;

        let Some(idx) = self.glob.find('*') else {
            return Err(Error::message(format!(
                "Not a valid glob: no `*` were found in `{}`",
                self.glob
            )));
        };
        let (root, pattern) = self.glob.split_at(idx);
        // A directory that doesn't exist just matches nothing
        let root = std::fs::canonicalize(root).unwrap_or_else(|_| PathBuf::from(root));
        let full_pattern = root.join(pattern).to_string_lossy().to_string();
        let matcher = GlobBuilder::new(&full_pattern)
            .literal_separator(true)
            .build()
            .map_err(|e| Error::chain(format!("Glob `{}` is invalid", self.glob), e))?
            .compile_matcher();

        self.files.clear();
        for entry in WalkDir::new(&root)
            .follow_links(true)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let path = entry.path();
            if path.is_dir() || !matcher.is_match(path) {
                continue;
            }
            let Ok(relative) = path.strip_prefix(&root) else {
                continue;
            };
            let name = relative.to_string_lossy().replace('\\', "/");
            self.files.insert(name, path.to_path_buf());
        }
        tracing::debug!(glob = %self.glob, found = self.files.len(), "loaded templates from glob");
        Ok(())
    }

    /// The names of every template found, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.files.keys().map(|k| k.as_str()).collect();
        names.sort_unstable();
        names
    }
}

#[cfg(feature = "glob_fs")]
impl Loader for GlobLoader {
    fn load_template_source(&self, name: &str) -> TesseraResult<Option<(LoadedTemplate, Origin)>> {
        let Some(path) = self.files.get(name) else {
            return Ok(None);
        };
        let source = std::fs::read_to_string(path)
            .map_err(|e| Error::chain(format!("Couldn't read template '{}'", path.display()), e))?;
        Ok(Some((
            LoadedTemplate::Source(source),
            Origin::new(name).with_path(path),
        )))
    }
}
