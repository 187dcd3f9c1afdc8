use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use walkdir::WalkDir;

use crate::error::SsrError;
use crate::front_matter;
use crate::host::LoadedModule;
use crate::markdown::render_markdown;

/// The page being rendered when a collection is requested.
#[derive(Debug, Clone)]
pub struct CollectionContext<'a> {
    pub url: &'a str,
    pub location: &'a Path,
}

#[derive(Debug, Clone, Default)]
pub struct CollectionResult {
    pub props: Map<String, Value>,
}

/// Supplies props to pages that declare a collection.
#[async_trait]
pub trait CollectionLoader: Send + Sync {
    async fn load(
        &self,
        module: &LoadedModule,
        ctx: CollectionContext<'_>,
    ) -> Result<CollectionResult, SsrError>;
}

#[derive(Debug, Clone, Serialize)]
pub struct CollectionEntry {
    pub slug: String,
    pub title: String,
    pub body: String,
    pub data: toml::Table,
}

/// Loads collections from `<dir>/<name>/**/*.md`, one entry per file in
/// path order. Props are exposed to the page as `collection`.
#[derive(Debug, Clone)]
pub struct DirectoryCollectionLoader {
    dir: PathBuf,
}

impl DirectoryCollectionLoader {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    async fn read_entry(&self, name: &str, root: &Path, path: &Path) -> Result<CollectionEntry, SsrError> {
        let source = tokio::fs::read_to_string(path).await?;
        let (fm, body) = front_matter::split(&source).map_err(|e| SsrError::Collection {
            name: name.to_string(),
            reason: format!("{}: {}", path.display(), e),
        })?;

        let slug = path
            .strip_prefix(root)
            .unwrap_or(path)
            .with_extension("")
            .components()
            .map(|c| c.as_os_str().to_string_lossy().to_string())
            .collect::<Vec<_>>()
            .join("/");

        let rendered = render_markdown(body);
        let title = fm.title.or(rendered.title).unwrap_or_else(|| slug.clone());

        Ok(CollectionEntry {
            slug,
            title,
            body: rendered.html,
            data: fm.data,
        })
    }
}

#[async_trait]
impl CollectionLoader for DirectoryCollectionLoader {
    async fn load(
        &self,
        module: &LoadedModule,
        ctx: CollectionContext<'_>,
    ) -> Result<CollectionResult, SsrError> {
        let Some(name) = module.collection.as_deref() else {
            return Ok(CollectionResult::default());
        };

        let root = self.dir.join(name);
        if !root.is_dir() {
            return Err(SsrError::Collection {
                name: name.to_string(),
                reason: format!("directory not found: {}", root.display()),
            });
        }

        tracing::debug!(collection = name, url = ctx.url, page = %ctx.location.display(), "loading collection");

        let files: Vec<PathBuf> = WalkDir::new(&root)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.file_type().is_file()
                    && e.path().extension().map(|ext| ext == "md").unwrap_or(false)
            })
            .map(|e| e.into_path())
            .collect();

        let mut entries = Vec::with_capacity(files.len());
        for path in &files {
            entries.push(self.read_entry(name, &root, path).await?);
        }

        let entries = serde_json::to_value(entries).map_err(|e| SsrError::Collection {
            name: name.to_string(),
            reason: e.to_string(),
        })?;

        let mut props = Map::new();
        props.insert("collection".to_string(), entries);
        Ok(CollectionResult { props })
    }
}
