//! The module execution capability the SSR pipeline renders through.
//!
//! A host owns module loading, the live module graph and document
//! post-processing. The pipeline only ever reads from it, so a single host
//! is shared by every concurrent page render of a build.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::SsrError;

/// Everything a page's render function receives.
#[derive(Debug, Clone, Serialize)]
pub struct RenderRequest {
    /// Full request URL, origin included.
    pub url: String,
    pub canonical_url: String,
    pub children: Vec<String>,
    pub props: Map<String, Value>,
    pub css: Vec<String>,
}

/// A page's render function.
pub trait PageRender: Send + Sync {
    fn render(&self, request: &RenderRequest) -> Result<String, SsrError>;
}

impl<F> PageRender for F
where
    F: Fn(&RenderRequest) -> Result<String, SsrError> + Send + Sync,
{
    fn render(&self, request: &RenderRequest) -> Result<String, SsrError> {
        self(request)
    }
}

/// An executed page module.
#[derive(Clone)]
pub struct LoadedModule {
    /// Module identifier in the host's graph.
    pub id: String,
    pub render: Arc<dyn PageRender>,
    /// Stylesheets the module declares directly.
    pub css: Vec<String>,
    /// Name of the collection feeding this page, if any.
    pub collection: Option<String>,
}

impl fmt::Debug for LoadedModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedModule")
            .field("id", &self.id)
            .field("css", &self.css)
            .field("collection", &self.collection)
            .finish_non_exhaustive()
    }
}

#[async_trait]
pub trait ModuleHost: Send + Sync {
    /// Identifier of the module stored at `location`.
    fn module_id(&self, location: &Path) -> String;

    /// Load and execute the module at `location`, analysing its imports.
    async fn load_module(&self, location: &Path) -> Result<LoadedModule, SsrError>;

    /// Recorded dependencies of `id`, or `None` if the module has not been
    /// analysed.
    async fn module_dependencies(&self, id: &str) -> Option<Vec<String>>;

    /// Post-process a rendered document before it is written.
    async fn transform_document(&self, url: &str, html: &str) -> Result<String, SsrError>;
}
