//! A [`ModuleHost`] that executes pages written as tera templates.
//!
//! Module identifiers are URLs relative to the project root
//! (`/src/pages/index.html`); files outside the root are addressed as
//! `/@fs/<absolute path>`. Loading a page analyses its whole import graph
//! and records it, so later dependency queries are answered from memory.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use dashmap::DashMap;
use regex::Regex;
use serde_json::Value;
use tera::{Context, Tera};
use walkdir::WalkDir;

use crate::config::Config;
use crate::error::{BuildError, SsrError};
use crate::front_matter::{self, FrontMatter};
use crate::host::{LoadedModule, ModuleHost, PageRender, RenderRequest};
use crate::hydration::{HYDRATION_BEGIN, HYDRATION_END, INTERNAL_MODULE_PREFIX};
use crate::imports::{self, SourceKind, normalize_path};

const FS_PREFIX: &str = "/@fs";

static ROOT_RELATIVE_ATTR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?P<attr>\s(?:src|href)=["'])/(?P<rest>[^/])"#).expect("valid regex")
});

enum Specifier {
    Local(PathBuf),
    Bare(String),
}

pub struct TemplateHost {
    root: PathBuf,
    base: String,
    templates: Tera,
    graph: DashMap<String, Vec<String>>,
}

impl TemplateHost {
    /// Create a host rooted at the project root, registering every
    /// component template so pages can include them.
    pub fn new(config: &Config) -> Result<Self, BuildError> {
        let root = config.root();
        let mut host = Self {
            root,
            base: normalize_base(&config.build_options.base),
            templates: Tera::default(),
            graph: DashMap::new(),
        };
        host.register_components(&config.components_dir())?;
        Ok(host)
    }

    fn register_components(&mut self, dir: &Path) -> Result<(), BuildError> {
        if !dir.is_dir() {
            return Ok(());
        }

        let mut templates = Vec::new();
        for entry in WalkDir::new(dir).sort_by_file_name() {
            let entry = entry?;
            let path = entry.path();
            if !entry.file_type().is_file() || path.extension().map(|e| e != "html").unwrap_or(true) {
                continue;
            }

            let source = std::fs::read_to_string(path)?;
            let name = template_name(&self.module_id(path));
            let body = match front_matter::split(&source) {
                Ok((_, body)) => body.to_string(),
                Err(e) => {
                    return Err(BuildError::Template(tera::Error::msg(format!(
                        "invalid front matter in {}: {}",
                        path.display(),
                        e
                    ))));
                }
            };
            templates.push((name, body));
        }

        tracing::debug!(count = templates.len(), dir = %dir.display(), "registered components");
        self.templates.add_raw_templates(templates)?;
        Ok(())
    }

    fn location_for(&self, id: &str) -> PathBuf {
        match id.strip_prefix(FS_PREFIX) {
            Some(absolute) => PathBuf::from(absolute),
            None => self.root.join(id.trim_start_matches('/')),
        }
    }

    fn resolve(&self, importer: &Path, specifier: &str) -> Specifier {
        if specifier.starts_with("./") || specifier.starts_with("../") {
            let dir = importer.parent().unwrap_or(Path::new("/"));
            Specifier::Local(normalize_path(&dir.join(specifier)))
        } else if specifier.starts_with(FS_PREFIX) {
            Specifier::Local(self.location_for(specifier))
        } else if specifier.starts_with('/') && !specifier.starts_with("//") {
            Specifier::Local(normalize_path(&self.root.join(&specifier[1..])))
        } else {
            Specifier::Bare(specifier.to_string())
        }
    }

    /// Record the import graph reachable from `entry`. Modules already in
    /// the graph are not read again.
    async fn analyze(&self, entry: &Path) -> Result<(), SsrError> {
        let mut pending = vec![entry.to_path_buf()];

        while let Some(location) = pending.pop() {
            let id = self.module_id(&location);
            if self.graph.contains_key(&id) {
                continue;
            }

            let source = tokio::fs::read_to_string(&location)
                .await
                .map_err(|e| SsrError::module_load(&id, e))?;

            let mut deps = Vec::new();
            for specifier in import_specifiers(&location, &source).map_err(|e| SsrError::module_load(&id, e))? {
                match self.resolve(&location, &specifier) {
                    Specifier::Local(path) => {
                        deps.push(self.module_id(&path));
                        pending.push(path);
                    }
                    Specifier::Bare(name) => deps.push(name),
                }
            }

            tracing::trace!(module = %id, deps = deps.len(), "analysed module");
            self.graph.insert(id, deps);
        }

        Ok(())
    }
}

#[async_trait]
impl ModuleHost for TemplateHost {
    fn module_id(&self, location: &Path) -> String {
        match location.strip_prefix(&self.root) {
            Ok(relative) => format!("/{}", path_to_url(relative)),
            Err(_) => format!("{FS_PREFIX}/{}", path_to_url(location)),
        }
    }

    async fn load_module(&self, location: &Path) -> Result<LoadedModule, SsrError> {
        let id = self.module_id(location);
        let source = tokio::fs::read_to_string(location)
            .await
            .map_err(|e| SsrError::module_load(&id, e))?;
        let (fm, body) = front_matter::split(&source).map_err(|e| SsrError::module_load(&id, e))?;

        self.analyze(location).await?;

        let name = template_name(&id);
        let mut tera = self.templates.clone();
        tera.add_raw_template(&name, body)
            .map_err(|e| SsrError::module_load(&id, describe_tera_error(&e)))?;

        let FrontMatter {
            title,
            css,
            collection,
            data,
            ..
        } = fm;

        let render = TemplateRender {
            id: id.clone(),
            name,
            tera,
            title,
            data,
        };

        Ok(LoadedModule {
            id,
            render: Arc::new(render),
            css,
            collection,
        })
    }

    async fn module_dependencies(&self, id: &str) -> Option<Vec<String>> {
        self.graph.get(id).map(|deps| deps.value().clone())
    }

    async fn transform_document(&self, _url: &str, html: &str) -> Result<String, SsrError> {
        if self.base == "/" {
            return Ok(html.to_string());
        }
        let replacement = format!("${{attr}}{}/${{rest}}", self.base);
        Ok(ROOT_RELATIVE_ATTR.replace_all(html, replacement.as_str()).into_owned())
    }
}

struct TemplateRender {
    id: String,
    name: String,
    tera: Tera,
    title: Option<String>,
    data: toml::Table,
}

impl PageRender for TemplateRender {
    fn render(&self, request: &RenderRequest) -> Result<String, SsrError> {
        let mut tera = self.tera.clone();
        tera.register_function("island", Island::default());

        let mut context = Context::new();
        for (key, value) in &request.props {
            context.insert(key.as_str(), value);
        }
        context.insert("url", &request.url);
        context.insert("canonical_url", &request.canonical_url);
        context.insert("children", &request.children);
        context.insert("props", &request.props);
        context.insert("css", &request.css);
        context.insert("title", &self.title);
        context.insert("page", &self.data);

        tera.render(&self.name, &context)
            .map_err(|e| SsrError::render(&self.id, describe_tera_error(&e)))
    }
}

/// `island(src, props={}, when="load")`: mount a client component.
///
/// Emits a placeholder element followed by a hydration block that the
/// pipeline moves to the end of the body.
#[derive(Default)]
struct Island {
    next_id: AtomicUsize,
}

impl tera::Function for Island {
    fn call(&self, args: &HashMap<String, Value>) -> tera::Result<Value> {
        let src = args
            .get("src")
            .and_then(Value::as_str)
            .ok_or_else(|| tera::Error::msg("island() requires a string `src` argument"))?;
        let when = args.get("when").and_then(Value::as_str).unwrap_or("load");
        if !matches!(when, "load" | "idle" | "visible") {
            return Err(tera::Error::msg(format!(
                "island() `when` must be load, idle or visible, got `{when}`"
            )));
        }
        let props = args
            .get("props")
            .cloned()
            .unwrap_or_else(|| Value::Object(Default::default()));
        let props = serde_json::to_string(&props)
            .map_err(|e| tera::Error::msg(e.to_string()))?
            .replace('<', "\\u003c");

        let id = format!("island-{}", self.next_id.fetch_add(1, Ordering::Relaxed));
        let src = html_escape::encode_double_quoted_attribute(src);

        Ok(Value::String(format!(
            "<div data-island=\"{id}\"></div>\n\
             {HYDRATION_BEGIN}\n\
             <script type=\"module\">\n\
             import hydrate from \"{INTERNAL_MODULE_PREFIX}hydrate/{when}.js\";\n\
             import Component from \"{src}\";\n\
             hydrate(Component, {props}, \"{id}\");\n\
             </script>\n\
             {HYDRATION_END}\n"
        )))
    }

    fn is_safe(&self) -> bool {
        true
    }
}

fn import_specifiers(location: &Path, source: &str) -> Result<Vec<String>, toml::de::Error> {
    if location.extension().map(|e| e == "html").unwrap_or(false) {
        return Ok(front_matter::split(source)?.0.imports);
    }
    Ok(imports::scan(SourceKind::of(location), source))
}

fn describe_tera_error(err: &tera::Error) -> String {
    let mut message = err.to_string();
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = std::error::Error::source(cause);
    }
    message
}

fn template_name(id: &str) -> String {
    id.trim_start_matches('/').to_string()
}

fn path_to_url(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().to_string()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn normalize_base(base: &str) -> String {
    let trimmed = base.trim_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        format!("/{trimmed}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;
    use std::fs;
    use tempfile::{TempDir, tempdir};

    fn project() -> (TempDir, Config) {
        let dir = tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("src/pages")).unwrap();
        fs::create_dir_all(root.join("src/components")).unwrap();
        fs::create_dir_all(root.join("src/styles")).unwrap();

        fs::write(
            root.join("src/components/Counter.html"),
            "---\nimports = [\"./Counter.js\", \"../styles/counter.css\"]\n---\n<button>{{ count }}</button>\n",
        )
        .unwrap();
        fs::write(
            root.join("src/components/Counter.js"),
            "import { h } from 'preact';\nimport './shared.js';\nexport default function Counter() {}\n",
        )
        .unwrap();
        fs::write(
            root.join("src/components/shared.js"),
            "import './Counter.js';\n",
        )
        .unwrap();
        fs::write(
            root.join("src/styles/counter.css"),
            "@import \"./base.css\";\nbutton { color: red; }\n",
        )
        .unwrap();
        fs::write(root.join("src/styles/base.css"), "body { margin: 0; }\n").unwrap();

        let config = Config {
            project_root: root.to_path_buf(),
            ..Config::default()
        };
        (dir, config)
    }

    fn request(props: Map<String, Value>) -> RenderRequest {
        RenderRequest {
            url: "https://example.com/index.html".to_string(),
            canonical_url: "https://example.com/".to_string(),
            children: vec![],
            props,
            css: vec!["/src/styles/page.css".to_string()],
        }
    }

    #[tokio::test]
    async fn test_load_records_import_graph() {
        let (dir, config) = project();
        let page = dir.path().join("src/pages/index.html");
        fs::write(
            &page,
            "---\ntitle = \"Home\"\nimports = [\"../components/Counter.html\"]\ncss = [\"/src/styles/page.css\"]\n---\n<h1>{{ title }}</h1>\n",
        )
        .unwrap();

        let host = TemplateHost::new(&config).unwrap();
        let module = host.load_module(&page).await.unwrap();

        assert_eq!(module.id, "/src/pages/index.html");
        assert_eq!(module.css, vec!["/src/styles/page.css".to_string()]);
        assert_eq!(
            host.module_dependencies("/src/pages/index.html").await,
            Some(vec!["/src/components/Counter.html".to_string()])
        );
        assert_eq!(
            host.module_dependencies("/src/components/Counter.html").await,
            Some(vec![
                "/src/components/Counter.js".to_string(),
                "/src/styles/counter.css".to_string()
            ])
        );
        assert_eq!(
            host.module_dependencies("/src/components/Counter.js").await,
            Some(vec!["preact".to_string(), "/src/components/shared.js".to_string()])
        );
        assert_eq!(
            host.module_dependencies("/src/styles/counter.css").await,
            Some(vec!["/src/styles/base.css".to_string()])
        );
        assert_eq!(host.module_dependencies("preact").await, None);
    }

    #[tokio::test]
    async fn test_missing_import_fails_load() {
        let (dir, config) = project();
        let page = dir.path().join("src/pages/broken.html");
        fs::write(&page, "---\nimports = [\"./nope.css\"]\n---\n<p></p>\n").unwrap();

        let host = TemplateHost::new(&config).unwrap();
        let err = host.load_module(&page).await.unwrap_err();

        assert!(matches!(err, SsrError::ModuleLoad { id, .. } if id == "/src/pages/nope.css"));
    }

    #[tokio::test]
    async fn test_render_with_components_and_islands() {
        let (dir, config) = project();
        let page = dir.path().join("src/pages/index.html");
        fs::write(
            &page,
            "---\ntitle = \"Home\"\n---\n<html><head><title>{{ title }}</title></head><body>\n{% include \"src/components/Counter.html\" %}\n{{ island(src=\"/src/components/Counter.js\", props=props) }}\n</body></html>\n",
        )
        .unwrap();

        let host = TemplateHost::new(&config).unwrap();
        let module = host.load_module(&page).await.unwrap();

        let mut props = Map::new();
        props.insert("count".to_string(), Value::from(3));
        let html = module.render.render(&request(props)).unwrap();

        assert!(html.contains("<title>Home</title>"));
        assert!(html.contains("<button>3</button>"));
        assert!(html.contains("<div data-island=\"island-0\"></div>\n<!-- @astro/hydration begin -->\n"));
        assert!(html.contains("import hydrate from \"astro_core:hydrate/load.js\";"));
        assert!(html.contains("hydrate(Component, {\"count\":3}, \"island-0\");"));
        assert!(html.contains("<!-- @astro/hydration end -->\n"));
    }

    #[tokio::test]
    async fn test_render_error_names_module() {
        let (dir, config) = project();
        let page = dir.path().join("src/pages/index.html");
        fs::write(&page, "{{ island(when=\"never\") }}").unwrap();

        let host = TemplateHost::new(&config).unwrap();
        let module = host.load_module(&page).await.unwrap();
        let err = module.render.render(&request(Map::new())).unwrap_err();

        assert!(matches!(err, SsrError::Render { id, .. } if id == "/src/pages/index.html"));
    }

    #[tokio::test]
    async fn test_transform_prefixes_base() {
        let (_dir, mut config) = project();
        config.build_options.base = "/blog/".to_string();
        let host = TemplateHost::new(&config).unwrap();

        let html = host
            .transform_document(
                "/index.html",
                "<link href=\"/style.css\"><a href=\"//cdn.example.com/x\"></a><img src=\"logo.png\">",
            )
            .await
            .unwrap();

        assert_eq!(
            html,
            "<link href=\"/blog/style.css\"><a href=\"//cdn.example.com/x\"></a><img src=\"logo.png\">"
        );
    }

    #[test]
    fn test_module_ids() {
        let (dir, config) = project();
        let host = TemplateHost::new(&config).unwrap();

        assert_eq!(
            host.module_id(&dir.path().join("src/pages/a.html")),
            "/src/pages/a.html"
        );
        assert_eq!(host.module_id(Path::new("/elsewhere/lib.js")), "/@fs/elsewhere/lib.js");
        assert_eq!(host.location_for("/@fs/elsewhere/lib.js"), PathBuf::from("/elsewhere/lib.js"));
    }
}
