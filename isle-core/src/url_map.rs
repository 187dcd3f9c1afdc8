use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::{BuildError, SsrError};

const PAGE_EXTENSION: &str = "html";

/// Maps request paths to the page modules that serve them.
///
/// Every page is reachable under one canonical key ending in a file
/// extension (`/about/index.html`) and one or more aliases (`/about`,
/// `/about/`) pointing at the same module.
#[derive(Debug, Clone, Default)]
pub struct UrlMap {
    pub static_pages: BTreeMap<String, PathBuf>,
}

impl UrlMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Walk `pages_dir` and register every routable page module.
    ///
    /// Files starting with `_` or `.` are partials and never routed.
    pub fn scan<P: AsRef<Path>>(pages_dir: P) -> Result<Self, BuildError> {
        let pages_dir = pages_dir.as_ref();
        let mut map = UrlMap::new();

        for entry in WalkDir::new(pages_dir).sort_by_file_name() {
            let entry = entry?;
            let path = entry.path();
            if !entry.file_type().is_file() || !is_page_module(path) {
                continue;
            }

            let Ok(relative) = path.strip_prefix(pages_dir) else {
                continue;
            };
            map.insert_page(relative, path.to_path_buf())?;
        }

        Ok(map)
    }

    /// Register a page under its canonical key and its aliases.
    /// `relative` is the page's path inside the pages directory.
    ///
    /// `about.html` and `about/index.html` share a route, so registering
    /// both is an error.
    pub fn insert_page(&mut self, relative: &Path, location: PathBuf) -> Result<(), BuildError> {
        let route = route_for(relative);
        let (canonical, aliases) = if route.is_empty() {
            ("/index.html".to_string(), vec!["/".to_string()])
        } else {
            (
                format!("/{route}/index.html"),
                vec![format!("/{route}"), format!("/{route}/")],
            )
        };

        if let Some(first) = self.static_pages.get(&canonical)
            && *first != location
        {
            return Err(BuildError::DuplicateRoute {
                url: canonical,
                first: first.clone(),
                second: location,
            });
        }

        for alias in aliases {
            self.static_pages.insert(alias, location.clone());
        }
        self.static_pages.insert(canonical, location);
        Ok(())
    }

    pub fn insert(&mut self, url: impl Into<String>, location: impl Into<PathBuf>) {
        self.static_pages.insert(url.into(), location.into());
    }

    pub fn resolve(&self, url: &str) -> Result<&Path, SsrError> {
        self.static_pages
            .get(url)
            .map(PathBuf::as_path)
            .ok_or_else(|| SsrError::UnresolvedUrl(url.to_string()))
    }

    /// Keys that name a concrete file. Aliases are skipped so that each
    /// page is built exactly once.
    pub fn canonical_entries(&self) -> impl Iterator<Item = (&str, &Path)> {
        self.static_pages
            .iter()
            .filter(|(url, _)| has_file_extension(url))
            .map(|(url, location)| (url.as_str(), location.as_path()))
    }

    pub fn len(&self) -> usize {
        self.static_pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.static_pages.is_empty()
    }
}

/// True when the last path segment carries an extension, e.g. `/a/b.html`.
pub fn has_file_extension(url: &str) -> bool {
    let last = url.rsplit('/').next().unwrap_or_default();
    match last.rsplit_once('.') {
        Some((stem, ext)) => !stem.is_empty() && !ext.is_empty(),
        None => false,
    }
}

fn is_page_module(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    if name.starts_with('_') || name.starts_with('.') {
        return false;
    }
    path.extension().map(|ext| ext == PAGE_EXTENSION).unwrap_or(false)
}

/// `index.html` -> "", `blog/index.html` -> "blog", `blog/post.html` -> "blog/post"
fn route_for(relative: &Path) -> String {
    let without_ext = relative.with_extension("");
    let mut segments: Vec<String> = without_ext
        .components()
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .collect();

    if segments.last().map(|s| s == "index").unwrap_or(false) {
        segments.pop();
    }

    segments.join("/")
}
