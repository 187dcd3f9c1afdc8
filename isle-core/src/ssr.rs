use serde_json::Map;
use url::Url;

use crate::assemble::assemble;
use crate::canonical::canonical_url;
use crate::collection::{CollectionContext, CollectionLoader};
use crate::error::SsrError;
use crate::graph::collect_deep_imports;
use crate::host::{ModuleHost, RenderRequest};
use crate::hydration::extract_hydration;
use crate::url_map::UrlMap;

/// One page render. Borrowed inputs are shared read-only between
/// concurrent renders.
pub struct SsrRequest<'a> {
    pub url: &'a str,
    pub origin: &'a Url,
    pub url_map: &'a UrlMap,
    pub host: &'a dyn ModuleHost,
    pub collections: &'a dyn CollectionLoader,
}

/// Render `request.url` into a finished HTML document.
pub async fn render_page(request: SsrRequest<'_>) -> Result<String, SsrError> {
    let SsrRequest {
        url,
        origin,
        url_map,
        host,
        collections,
    } = request;

    let full_url = origin.join(url).map_err(|source| SsrError::InvalidUrl {
        url: url.to_string(),
        source,
    })?;
    let location = url_map.resolve(url)?;
    let module = host.load_module(location).await?;
    tracing::debug!(url, module = %module.id, "loaded page module");

    let props = match module.collection.as_deref() {
        Some(name) => {
            tracing::debug!(url, collection = name, "loading page props");
            collections
                .load(&module, CollectionContext { url, location })
                .await?
                .props
        }
        None => Map::new(),
    };

    let roots = host.module_dependencies(&module.id).await.unwrap_or_default();
    let deep_imports = collect_deep_imports(host, &roots).await;
    let css = deep_imports.css();
    tracing::debug!(url, modules = deep_imports.len(), css = css.len(), "collected deep imports");

    let canonical = canonical_url(full_url.path(), origin).map_err(|source| SsrError::InvalidUrl {
        url: url.to_string(),
        source,
    })?;

    let rendered = module.render.render(&RenderRequest {
        url: full_url.to_string(),
        canonical_url: canonical.to_string(),
        children: Vec::new(),
        props,
        css: module.css.clone(),
    })?;

    let extracted = extract_hydration(&rendered);
    let html = host.transform_document(url, &extracted.static_html).await?;

    Ok(assemble(&html, &extracted.hydration_code, &css))
}
