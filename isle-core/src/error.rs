use std::path::PathBuf;

use thiserror::Error;

use crate::bundle::BundleError;

/// Failures raised while rendering a single page.
#[derive(Debug, Error)]
pub enum SsrError {
    #[error("No page is registered for URL `{0}`")]
    UnresolvedUrl(String),

    #[error("Module load error in `{id}`: {reason}")]
    ModuleLoad { id: String, reason: String },

    #[error("Collection error in `{name}`: {reason}")]
    Collection { name: String, reason: String },

    #[error("Render error in `{id}`: {reason}")]
    Render { id: String, reason: String },

    #[error("Template transform error for `{url}`: {reason}")]
    TemplateTransform { url: String, reason: String },

    #[error("Invalid URL `{url}`: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SsrError {
    pub fn module_load(id: impl Into<String>, reason: impl ToString) -> Self {
        SsrError::ModuleLoad {
            id: id.into(),
            reason: reason.to_string(),
        }
    }

    pub fn render(id: impl Into<String>, reason: impl ToString) -> Self {
        SsrError::Render {
            id: id.into(),
            reason: reason.to_string(),
        }
    }
}

/// Failures that abort a whole build rather than a single page.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("A module host is required to render pages")]
    MissingHost,

    #[error("Pages directory does not exist: {}", .0.display())]
    MissingPagesDir(PathBuf),

    #[error("Invalid site origin `{site}`: {source}")]
    InvalidOrigin {
        site: String,
        #[source]
        source: url::ParseError,
    },

    #[error("Scan error: {0}")]
    Scan(#[from] walkdir::Error),

    #[error("`{}` and `{}` both route to `{url}`", .first.display(), .second.display())]
    DuplicateRoute {
        url: String,
        first: PathBuf,
        second: PathBuf,
    },

    #[error("Template error: {0}")]
    Template(#[from] tera::Error),

    #[error("Bundle error: {0}")]
    Bundle(#[from] BundleError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
