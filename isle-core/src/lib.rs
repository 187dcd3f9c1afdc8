pub mod assemble;
pub mod builder;
pub mod bundle;
pub mod canonical;
pub mod collection;
pub mod config;
pub mod error;
pub mod front_matter;
pub mod graph;
pub mod host;
pub mod hydration;
pub mod imports;
pub mod markdown;
pub mod report;
pub mod ssr;
pub mod template_host;
pub mod url_map;

// Re-export main types
pub use builder::{BuildOverrides, BuildSummary, Site, SiteBuilder, build_site};
pub use bundle::{AssetBundler, BundleOptions, Bundler};
pub use collection::{CollectionLoader, DirectoryCollectionLoader};
pub use config::Config;
pub use error::{BuildError, SsrError};
pub use host::{LoadedModule, ModuleHost, PageRender, RenderRequest};
pub use report::BuildReport;
pub use ssr::{SsrRequest, render_page};
pub use template_host::TemplateHost;
pub use url_map::UrlMap;
