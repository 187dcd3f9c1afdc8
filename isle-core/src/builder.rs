use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use futures::future::join_all;
use serde::Serialize;
use url::Url;

use crate::bundle::{AssetBundler, BundleOptions, BundleOutput, BundlePlan, Bundler};
use crate::collection::{
    CollectionContext, CollectionLoader, CollectionResult, DirectoryCollectionLoader,
};
use crate::config::Config;
use crate::error::{BuildError, SsrError};
use crate::host::{LoadedModule, ModuleHost};
use crate::report::{BuildReport, Diagnostic};
use crate::ssr::{SsrRequest, render_page};
use crate::template_host::TemplateHost;
use crate::url_map::UrlMap;

const ROOT_ENTRY: &str = "index";
const INDEX_FILE: &str = "/index.html";

/// Stable bundler entry id for a page URL.
///
/// `/index.html` -> `index`, `/blog/index.html` -> `blog`,
/// `/about.html` -> `about.html`
pub fn entry_id(url: &str) -> String {
    if url == INDEX_FILE {
        return ROOT_ENTRY.to_string();
    }
    let trimmed = url.trim_start_matches('/');
    trimmed
        .strip_suffix(INDEX_FILE)
        .unwrap_or(trimmed)
        .to_string()
}

#[derive(Debug, Clone, Serialize)]
pub struct WrittenPage {
    pub url: String,
    pub entry: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize)]
pub struct PageFailure {
    pub url: String,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BuildSummary {
    pub pages: Vec<WrittenPage>,
    pub failures: Vec<PageFailure>,
    pub entries: BTreeMap<String, PathBuf>,
    pub bundle: Option<BundleOutput>,
    pub diagnostics: Vec<Diagnostic>,
}

impl BuildSummary {
    /// Process exit status: 0 when every page was built.
    pub fn status_code(&self) -> i32 {
        if self.failures.is_empty() { 0 } else { 1 }
    }
}

/// Used when a site has no collection source configured.
struct NoCollections;

#[async_trait::async_trait]
impl CollectionLoader for NoCollections {
    async fn load(
        &self,
        module: &LoadedModule,
        _ctx: CollectionContext<'_>,
    ) -> Result<CollectionResult, SsrError> {
        Err(SsrError::Collection {
            name: module.collection.clone().unwrap_or_default(),
            reason: "no collection loader configured".to_string(),
        })
    }
}

pub struct SiteBuilder {
    url_map: UrlMap,
    output_dir: PathBuf,
    origin: Option<Url>,
    host: Option<Arc<dyn ModuleHost>>,
    collections: Arc<dyn CollectionLoader>,
    bundler: Option<Arc<dyn Bundler>>,
    bundle_options: BundleOptions,
}

impl Default for SiteBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SiteBuilder {
    pub fn new() -> Self {
        Self {
            url_map: UrlMap::new(),
            output_dir: PathBuf::from("./dist"),
            origin: None,
            host: None,
            collections: Arc::new(NoCollections),
            bundler: None,
            bundle_options: BundleOptions::default(),
        }
    }

    pub fn url_map(mut self, url_map: UrlMap) -> Self {
        self.url_map = url_map;
        self
    }

    pub fn output_dir<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.output_dir = path.as_ref().to_path_buf();
        self
    }

    pub fn origin(mut self, origin: Url) -> Self {
        self.origin = Some(origin);
        self
    }

    // Required
    pub fn host(mut self, host: Arc<dyn ModuleHost>) -> Self {
        self.host = Some(host);
        self
    }

    pub fn collections(mut self, loader: Arc<dyn CollectionLoader>) -> Self {
        self.collections = loader;
        self
    }

    // Without a bundler, pages are written but no asset pass runs
    pub fn bundler(mut self, bundler: Arc<dyn Bundler>) -> Self {
        self.bundler = Some(bundler);
        self
    }

    pub fn bundle_options(mut self, options: BundleOptions) -> Self {
        self.bundle_options = options;
        self
    }

    pub fn build(self) -> Result<Site, BuildError> {
        let host = self.host.ok_or(BuildError::MissingHost)?;
        let origin = match self.origin {
            Some(origin) => origin,
            None => default_origin(3000)?,
        };

        Ok(Site {
            url_map: self.url_map,
            output_dir: std::path::absolute(&self.output_dir)?,
            origin,
            host,
            collections: self.collections,
            bundler: self.bundler,
            bundle_options: self.bundle_options,
        })
    }
}

pub fn default_origin(port: u16) -> Result<Url, BuildError> {
    let site = format!("http://localhost:{port}");
    Url::parse(&site).map_err(|source| BuildError::InvalidOrigin { site, source })
}

pub struct Site {
    url_map: UrlMap,
    output_dir: PathBuf,
    origin: Url,
    host: Arc<dyn ModuleHost>,
    collections: Arc<dyn CollectionLoader>,
    bundler: Option<Arc<dyn Bundler>>,
    bundle_options: BundleOptions,
}

impl Site {
    pub fn url_map(&self) -> &UrlMap {
        &self.url_map
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Render one page, write it under the output directory and register
    /// it in `entries`.
    async fn build_page(
        &self,
        url: &str,
        entries: &DashMap<String, PathBuf>,
    ) -> Result<WrittenPage, SsrError> {
        let html = render_page(SsrRequest {
            url,
            origin: &self.origin,
            url_map: &self.url_map,
            host: self.host.as_ref(),
            collections: self.collections.as_ref(),
        })
        .await?;

        let path = self.output_dir.join(url.trim_start_matches('/'));
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, html).await?;

        let entry = entry_id(url);
        entries.insert(entry.clone(), path.clone());
        tracing::debug!(url, path = %path.display(), "wrote page");

        Ok(WrittenPage {
            url: url.to_string(),
            entry,
            path,
        })
    }

    /// Build every canonical page concurrently, then run the bundler over
    /// the pages that were written. A failing page is reported and does not
    /// stop the others.
    pub async fn render_all(&self, report: &BuildReport) -> Result<BuildSummary, BuildError> {
        tokio::fs::create_dir_all(&self.output_dir).await?;

        let urls: Vec<&str> = self.url_map.canonical_entries().map(|(url, _)| url).collect();
        report.info("build", format!("rendering {} pages", urls.len()));

        // Scoped to this run so a page that fails now is never bundled
        let written = DashMap::new();
        let results = join_all(urls.iter().map(|url| self.build_page(url, &written))).await;

        let mut pages = Vec::new();
        let mut failures = Vec::new();
        for (url, result) in urls.iter().zip(results) {
            match result {
                Ok(page) => pages.push(page),
                Err(e) => {
                    report.error("page", format!("{url}: {e}"));
                    failures.push(PageFailure {
                        url: url.to_string(),
                        error: e.to_string(),
                    });
                }
            }
        }

        let entries: BTreeMap<String, PathBuf> = written.into_iter().collect();

        let bundle = match &self.bundler {
            Some(bundler) if !entries.is_empty() => {
                report.info("bundle", format!("bundling {} entries", entries.len()));
                let plan = BundlePlan {
                    entries: entries.clone(),
                    out_dir: self.output_dir.clone(),
                    options: self.bundle_options.clone(),
                };
                Some(bundler.bundle(&plan).await?)
            }
            _ => None,
        };

        report.info(
            "build",
            format!("{} pages written, {} failed", pages.len(), failures.len()),
        );

        Ok(BuildSummary {
            pages,
            failures,
            entries,
            bundle,
            diagnostics: report.diagnostics(),
        })
    }
}

/// Per-invocation settings layered over the site config.
#[derive(Debug, Clone, Default)]
pub struct BuildOverrides {
    /// Replaces `build_options.site` when set.
    pub site: Option<String>,
}

/// Origin every page URL is resolved against. Only scheme, host and port of
/// the configured site are kept.
pub fn resolve_origin(
    config: &Config,
    overrides: &BuildOverrides,
    report: &BuildReport,
) -> Result<Url, BuildError> {
    let site = overrides
        .site
        .as_ref()
        .or(config.build_options.site.as_ref());

    let Some(site) = site else {
        report.warn(
            "config",
            "Set `build_options.site` to generate correct canonical URLs",
        );
        return default_origin(config.dev_options.port);
    };

    let parsed = Url::parse(site).map_err(|source| BuildError::InvalidOrigin {
        site: site.clone(),
        source,
    })?;
    let origin = parsed.origin().ascii_serialization();
    Url::parse(&origin).map_err(|source| BuildError::InvalidOrigin { site: origin, source })
}

/// Build the site described by `config` with the template host, directory
/// collections and the asset bundler.
pub async fn build_site(
    config: &Config,
    overrides: &BuildOverrides,
    report: &BuildReport,
) -> Result<BuildSummary, BuildError> {
    let pages_dir = config.pages_dir();
    if !pages_dir.is_dir() {
        return Err(BuildError::MissingPagesDir(pages_dir));
    }

    let origin = resolve_origin(config, overrides, report)?;
    let url_map = UrlMap::scan(&pages_dir)?;
    report.info(
        "build",
        format!("found {} pages in {}", url_map.canonical_entries().count(), pages_dir.display()),
    );

    let host = TemplateHost::new(config)?;
    let site = SiteBuilder::new()
        .url_map(url_map)
        .output_dir(config.dist_dir())
        .origin(origin)
        .host(Arc::new(host))
        .collections(Arc::new(DirectoryCollectionLoader::new(config.collections_dir())))
        .bundler(Arc::new(AssetBundler::new(config.root(), config.public_dir())))
        .bundle_options(BundleOptions {
            base: config.build_options.base.clone(),
            ..BundleOptions::default()
        })
        .build()?;

    site.render_all(report).await
}
