use std::fs;
use std::path::Path;
use std::sync::Arc;

use isle_core::report::DiagnosticLevel;
use isle_core::{
    BuildError, BuildOverrides, BuildReport, Config, DirectoryCollectionLoader, SiteBuilder,
    TemplateHost, UrlMap, build_site,
};
use pretty_assertions::assert_eq;
use tempfile::{TempDir, tempdir};
use url::Url;

fn write(root: &Path, relative: &str, contents: &str) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}

fn project() -> (TempDir, Config) {
    let dir = tempdir().unwrap();
    let root = dir.path();

    write(
        root,
        "src/pages/index.html",
        r#"---
title = "Home"
imports = ["../components/Counter.html"]
start = 1
---
<html><head><title>{{ title }}</title><link rel="canonical" href="{{ canonical_url }}"></head><body>
{% include "src/components/Counter.html" %}
{{ island(src="/src/components/Counter.js", props=page) }}
</body></html>
"#,
    );
    write(
        root,
        "src/pages/blog/index.html",
        r#"---
collection = "posts"
---
<html><head></head><body>
{% for post in collection %}<article id="{{ post.slug }}">{{ post.body | safe }}</article>
{% endfor %}</body></html>
"#,
    );
    write(root, "src/pages/_partial.html", "<p>never routed</p>");
    write(
        root,
        "src/components/Counter.html",
        "---\nimports = [\"./Counter.js\", \"../styles/counter.css\"]\n---\n<button>0</button>\n",
    );
    write(
        root,
        "src/components/Counter.js",
        "import { h } from 'preact';\nexport default function Counter() {}\n",
    );
    write(
        root,
        "src/styles/counter.css",
        "@import \"./base.css\";\nbutton { color: red; }\n",
    );
    write(root, "src/styles/base.css", "body { margin: 0; }\n");
    write(root, "src/collections/posts/hello.md", "# Hello\n\nFirst post.\n");
    write(root, "src/collections/posts/world.md", "---\ntitle = \"World\"\n---\nSecond post.\n");
    write(root, "public/robots.txt", "User-agent: *\n");

    let mut config = Config {
        project_root: root.to_path_buf(),
        ..Config::default()
    };
    config.build_options.site = Some("https://example.com".to_string());
    (dir, config)
}

#[tokio::test]
async fn test_render_all_writes_each_page_once() {
    let (dir, config) = project();
    let root = dir.path();
    let url_map = UrlMap::scan(config.pages_dir()).unwrap();
    assert_eq!(url_map.len(), 5);

    let site = SiteBuilder::new()
        .url_map(url_map)
        .output_dir(root.join("out"))
        .origin(Url::parse("https://example.com").unwrap())
        .host(Arc::new(TemplateHost::new(&config).unwrap()))
        .collections(Arc::new(DirectoryCollectionLoader::new(config.collections_dir())))
        .build()
        .unwrap();

    let report = BuildReport::new();
    let summary = site.render_all(&report).await.unwrap();

    assert_eq!(summary.status_code(), 0);
    assert_eq!(summary.pages.len(), 2);
    assert!(summary.bundle.is_none());
    assert_eq!(
        summary.entries.keys().cloned().collect::<Vec<_>>(),
        vec!["blog".to_string(), "index".to_string()]
    );

    let mut written: Vec<String> = walkdir::WalkDir::new(root.join("out"))
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            e.path()
                .strip_prefix(root.join("out"))
                .unwrap()
                .to_string_lossy()
                .to_string()
        })
        .collect();
    written.sort();
    assert_eq!(written, vec!["blog/index.html", "index.html"]);

    let index = fs::read_to_string(root.join("out/index.html")).unwrap();
    let head_close = index.find("</head>").unwrap();
    let counter_css = index
        .find("<script type=\"module\" src=\"/src/styles/counter.css\"></script>")
        .unwrap();
    let base_css = index
        .find("<script type=\"module\" src=\"/src/styles/base.css\"></script>")
        .unwrap();
    assert!(counter_css < base_css && base_css < head_close);
    assert!(index.contains("<link rel=\"canonical\" href=\"https://example.com/\">"));

    let body_close = index.find("</body>").unwrap();
    let island = index.find("<!-- @astro/hydration begin -->").unwrap();
    assert!(index.find("<button>0</button>").unwrap() < island);
    assert!(island < body_close);
    assert!(index.contains("import hydrate from \"/@id/astro_core:hydrate/load.js\";"));
    assert!(index.contains("hydrate(Component, {\"start\":1}, \"island-0\");"));

    let blog = fs::read_to_string(root.join("out/blog/index.html")).unwrap();
    assert!(blog.contains("<article id=\"hello\"><h1>Hello</h1>\n<p>First post.</p>\n</article>"));
    assert!(blog.contains("<article id=\"world\"><p>Second post.</p>\n</article>"));
}

#[tokio::test]
async fn test_failed_page_does_not_stop_build() {
    let (dir, config) = project();
    let root = dir.path();
    write(
        root,
        "src/pages/broken/index.html",
        "---\ncollection = \"missing\"\n---\n<p></p>\n",
    );

    let report = BuildReport::new();
    let summary = build_site(&config, &BuildOverrides::default(), &report)
        .await
        .unwrap();

    assert_eq!(summary.status_code(), 1);
    assert_eq!(summary.failures.len(), 1);
    assert_eq!(summary.failures[0].url, "/broken/index.html");
    assert!(root.join("dist/index.html").is_file());
    assert!(root.join("dist/blog/index.html").is_file());
    assert!(!root.join("dist/broken").exists());

    let errors: Vec<_> = report
        .diagnostics()
        .into_iter()
        .filter(|d| d.level == DiagnosticLevel::Error)
        .collect();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].message.starts_with("/broken/index.html: "));
}

#[tokio::test]
async fn test_build_site_bundles_assets() {
    let (dir, config) = project();
    let root = dir.path();

    let report = BuildReport::new();
    let summary = build_site(&config, &BuildOverrides::default(), &report)
        .await
        .unwrap();
    assert_eq!(summary.status_code(), 0);
    assert!(report.warnings().is_empty());

    let bundle = summary.bundle.expect("bundle output");
    let counter_css = &bundle.emitted["/src/styles/counter.css"];
    let base_css = &bundle.emitted["/src/styles/base.css"];
    let counter_js = &bundle.emitted["/src/components/Counter.js"];
    assert!(counter_css.starts_with("assets/counter-"));
    assert!(counter_js.starts_with("chunks/Counter-"));

    let index = fs::read_to_string(root.join("dist/index.html")).unwrap();
    assert!(index.contains(&format!("<link rel=\"stylesheet\" href=\"/{counter_css}\">")));
    assert!(index.contains(&format!("import Component from \"/{counter_js}\";")));
    assert!(!index.contains("/src/"));

    let css = fs::read_to_string(root.join("dist").join(counter_css)).unwrap();
    assert!(css.contains(&format!("@import \"/{base_css}\";")));

    assert!(root.join("dist/robots.txt").is_file());
    assert!(root.join("dist/manifest.json").is_file());
}

#[tokio::test]
async fn test_missing_site_falls_back_to_localhost() {
    let (dir, mut config) = project();
    config.build_options.site = None;

    let report = BuildReport::new();
    build_site(&config, &BuildOverrides::default(), &report)
        .await
        .unwrap();

    let warnings = report.warnings();
    assert_eq!(warnings.len(), 1);
    assert_eq!(
        warnings[0].message,
        "Set `build_options.site` to generate correct canonical URLs"
    );

    let index = fs::read_to_string(dir.path().join("dist/index.html")).unwrap();
    assert!(index.contains("<link rel=\"canonical\" href=\"http://localhost:3000/\">"));
}

#[tokio::test]
async fn test_missing_pages_dir() {
    let dir = tempdir().unwrap();
    let config = Config {
        project_root: dir.path().to_path_buf(),
        ..Config::default()
    };

    let result = build_site(&config, &BuildOverrides::default(), &BuildReport::new()).await;
    assert!(matches!(result, Err(BuildError::MissingPagesDir(_))));
}

#[tokio::test]
async fn test_entries_only_cover_the_current_run() {
    let (dir, config) = project();
    let root = dir.path();
    let site = SiteBuilder::new()
        .url_map(UrlMap::scan(config.pages_dir()).unwrap())
        .output_dir(root.join("out"))
        .origin(Url::parse("https://example.com").unwrap())
        .host(Arc::new(TemplateHost::new(&config).unwrap()))
        .collections(Arc::new(DirectoryCollectionLoader::new(config.collections_dir())))
        .build()
        .unwrap();

    let first = site.render_all(&BuildReport::new()).await.unwrap();
    assert_eq!(first.entries.len(), 2);

    fs::remove_dir_all(root.join("src/collections/posts")).unwrap();
    let second = site.render_all(&BuildReport::new()).await.unwrap();

    assert_eq!(second.failures.len(), 1);
    assert_eq!(second.failures[0].url, "/blog/index.html");
    assert_eq!(
        second.entries.keys().cloned().collect::<Vec<_>>(),
        vec!["index".to_string()]
    );
}
