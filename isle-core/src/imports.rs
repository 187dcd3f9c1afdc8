//! Import specifiers in scripts and stylesheets.

use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

static SCRIPT_IMPORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?:\bfrom|\bimport)\s*\(?\s*['"]([^'"]+)['"]"#).expect("valid regex")
});

static CSS_IMPORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"@import\s+(?:url\(\s*)?['"]?([^'")\s;]+)"#).expect("valid regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Script,
    Stylesheet,
    Other,
}

impl SourceKind {
    pub fn of(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()).unwrap_or_default() {
            "js" | "mjs" | "ts" => SourceKind::Script,
            "css" => SourceKind::Stylesheet,
            _ => SourceKind::Other,
        }
    }

    fn pattern(self) -> Option<&'static Regex> {
        match self {
            SourceKind::Script => Some(LazyLock::force(&SCRIPT_IMPORT)),
            SourceKind::Stylesheet => Some(LazyLock::force(&CSS_IMPORT)),
            SourceKind::Other => None,
        }
    }
}

/// Specifiers imported by `source`, in source order.
pub fn scan(kind: SourceKind, source: &str) -> Vec<String> {
    let Some(pattern) = kind.pattern() else {
        return Vec::new();
    };
    pattern
        .captures_iter(source)
        .map(|caps| caps[1].to_string())
        .collect()
}

/// Replace every specifier for which `map` returns a new value.
pub fn rewrite<F>(kind: SourceKind, source: &str, mut map: F) -> String
where
    F: FnMut(&str) -> Option<String>,
{
    let Some(pattern) = kind.pattern() else {
        return source.to_string();
    };

    let mut out = String::with_capacity(source.len());
    let mut last = 0;
    for caps in pattern.captures_iter(source) {
        let Some(specifier) = caps.get(1) else {
            continue;
        };
        if let Some(replacement) = map(specifier.as_str()) {
            out.push_str(&source[last..specifier.start()]);
            out.push_str(&replacement);
            last = specifier.end();
        }
    }
    out.push_str(&source[last..]);
    out
}

/// Resolve `.` and `..` lexically; the file may not exist yet.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
