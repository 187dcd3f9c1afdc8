//! Production asset pass over the pages a build has written.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::{Captures, Regex};
use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;
use walkdir::WalkDir;

use crate::imports::{self, SourceKind, normalize_path};

const HASH_LENGTH: usize = 8;
pub const MANIFEST_FILE: &str = "manifest.json";

static SCRIPT_SRC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<script\b[^>]*?\bsrc="(?P<url>[^"]+)"[^>]*>\s*</script>"#).expect("valid regex")
});

static STYLESHEET_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<link\b[^>]*?\brel="stylesheet"[^>]*?\bhref="(?P<url>[^"]+)"[^>]*>"#)
        .expect("valid regex")
});

static INLINE_MODULE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)(?P<open><script type="module">)(?P<body>.*?)(?P<close></script>)"#)
        .expect("valid regex")
});

#[derive(Debug, Error)]
pub enum BundleError {
    #[error("Asset `{url}` referenced by entry `{entry}` does not exist")]
    UnresolvedAsset { entry: String, url: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Scan error: {0}")]
    Scan(#[from] walkdir::Error),

    #[error("`{}` and `{}` would both be written to `{file}`", .first.display(), .second.display())]
    NameCollision {
        file: String,
        first: PathBuf,
        second: PathBuf,
    },

    #[error("Bundler task failed: {0}")]
    Task(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OutputFormat {
    Esm,
}

/// Describes HOW to bundle.
#[derive(Debug, Clone, Serialize)]
pub struct BundleOptions {
    pub asset_file_names: String,
    pub chunk_file_names: String,
    pub entry_file_names: String,
    pub format: OutputFormat,
    pub inline_dynamic_imports: bool,
    pub ssr: bool,
    pub target: String,
    /// Path prefix for emitted URLs.
    pub base: String,
}

impl Default for BundleOptions {
    fn default() -> Self {
        Self {
            asset_file_names: "assets/[name]-[hash][extname]".to_string(),
            chunk_file_names: "chunks/[name]-[hash].js".to_string(),
            entry_file_names: "[name].js".to_string(),
            format: OutputFormat::Esm,
            inline_dynamic_imports: true,
            ssr: true,
            target: "es2018".to_string(),
            base: "/".to_string(),
        }
    }
}

/// Describes WHAT to bundle.
#[derive(Debug, Clone)]
pub struct BundlePlan {
    /// Entry id -> written HTML file.
    pub entries: BTreeMap<String, PathBuf>,
    pub out_dir: PathBuf,
    pub options: BundleOptions,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BundleOutput {
    /// Source URL -> emitted file name, relative to the output directory.
    pub emitted: BTreeMap<String, String>,
    /// Entry id -> emitted files it references.
    pub entries: BTreeMap<String, Vec<String>>,
    pub manifest: PathBuf,
}

#[async_trait]
pub trait Bundler: Send + Sync {
    async fn bundle(&self, plan: &BundlePlan) -> Result<BundleOutput, BundleError>;
}

/// Fill a naming pattern such as `assets/[name]-[hash][extname]`.
pub fn file_name(pattern: &str, name: &str, hash: &str, extname: &str) -> String {
    pattern
        .replace("[name]", name)
        .replace("[hash]", hash)
        .replace("[extname]", extname)
}

pub fn content_hash(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    hex[..HASH_LENGTH].to_string()
}

/// Copies the public directory into the output and content-hashes every
/// local script and stylesheet the entry pages reference, rewriting the
/// pages to point at the emitted files.
///
/// Scripts referenced straight from a page are entries and keep their
/// name; scripts reached through imports become hashed chunks.
/// Stylesheets referenced through module script tags are emitted as
/// `<link rel="stylesheet">`.
#[derive(Debug, Clone)]
pub struct AssetBundler {
    root: PathBuf,
    public_dir: PathBuf,
}

impl AssetBundler {
    pub fn new<P: AsRef<Path>, Q: AsRef<Path>>(root: P, public_dir: Q) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            public_dir: public_dir.as_ref().to_path_buf(),
        }
    }

    fn run(&self, plan: &BundlePlan) -> Result<BundleOutput, BundleError> {
        std::fs::create_dir_all(&plan.out_dir)?;
        self.copy_public(&plan.out_dir)?;

        let mut emitter = Emitter {
            bundler: self,
            plan,
            base: emitted_base(&plan.options.base),
            emitted: HashMap::new(),
            in_progress: HashMap::new(),
            pinned: HashSet::new(),
            owners: HashMap::new(),
            output: BundleOutput::default(),
        };

        for (entry, html_path) in &plan.entries {
            let html = std::fs::read_to_string(html_path)?;
            let mut referenced = Vec::new();
            let html = emitter.rewrite_page(entry, &html, &mut referenced)?;
            std::fs::write(html_path, html)?;
            tracing::debug!(entry = %entry, assets = referenced.len(), "bundled entry");
            emitter.output.entries.insert(entry.clone(), referenced);
        }

        let mut output = emitter.output;
        output.manifest = plan.out_dir.join(MANIFEST_FILE);
        std::fs::write(&output.manifest, serde_json::to_string_pretty(&output)?)?;
        Ok(output)
    }

    fn copy_public(&self, out_dir: &Path) -> Result<(), BundleError> {
        if !self.public_dir.is_dir() {
            return Ok(());
        }
        for entry in WalkDir::new(&self.public_dir) {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(&self.public_dir) else {
                continue;
            };
            let target = out_dir.join(relative);
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::copy(entry.path(), target)?;
        }
        Ok(())
    }

    fn is_public(&self, relative: &str) -> bool {
        self.public_dir.join(relative).is_file()
    }
}

#[async_trait]
impl Bundler for AssetBundler {
    async fn bundle(&self, plan: &BundlePlan) -> Result<BundleOutput, BundleError> {
        let bundler = self.clone();
        let plan = plan.clone();
        tokio::task::spawn_blocking(move || bundler.run(&plan))
            .await
            .map_err(|e| BundleError::Task(e.to_string()))?
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Entry,
    Chunk,
    Asset,
}

struct Emitter<'a> {
    bundler: &'a AssetBundler,
    plan: &'a BundlePlan,
    base: String,
    /// Source path -> emitted file name.
    emitted: HashMap<PathBuf, String>,
    /// Modules whose imports are being rewritten, with their provisional name.
    in_progress: HashMap<PathBuf, String>,
    /// In-progress modules that were imported from inside their own cycle.
    pinned: HashSet<PathBuf>,
    /// Emitted file name -> source it was written for.
    owners: HashMap<String, PathBuf>,
    output: BundleOutput,
}

impl Emitter<'_> {
    fn rewrite_page(
        &mut self,
        entry: &str,
        html: &str,
        referenced: &mut Vec<String>,
    ) -> Result<String, BundleError> {
        let mut failure = None;

        // Links first: the script pass emits new stylesheet links.
        let html = STYLESHEET_LINK.replace_all(html, |caps: &Captures| {
            let url = &caps["url"];
            match self.emit_reference(entry, url, Role::Asset, referenced) {
                Ok(Some(file)) => caps[0].replacen(url, &format!("{}{}", self.base, file), 1),
                Ok(None) => caps[0].to_string(),
                Err(e) => {
                    failure.get_or_insert(e);
                    caps[0].to_string()
                }
            }
        });

        let html = SCRIPT_SRC.replace_all(&html, |caps: &Captures| {
            let url = &caps["url"];
            match self.emit_reference(entry, url, Role::Entry, referenced) {
                Ok(Some(file)) if is_css(url) => {
                    format!("<link rel=\"stylesheet\" href=\"{}{}\">", self.base, file)
                }
                Ok(Some(file)) => caps[0].replacen(url, &format!("{}{}", self.base, file), 1),
                Ok(None) => caps[0].to_string(),
                Err(e) => {
                    failure.get_or_insert(e);
                    caps[0].to_string()
                }
            }
        });

        let html = INLINE_MODULE.replace_all(&html, |caps: &Captures| {
            let body = imports::rewrite(SourceKind::Script, &caps["body"], |specifier| {
                match self.emit_reference(entry, specifier, Role::Chunk, referenced) {
                    Ok(Some(file)) => Some(format!("{}{}", self.base, file)),
                    Ok(None) => None,
                    Err(e) => {
                        failure.get_or_insert(e);
                        None
                    }
                }
            });
            format!("{}{}{}", &caps["open"], body, &caps["close"])
        });

        match failure {
            Some(e) => Err(e),
            None => Ok(html.into_owned()),
        }
    }

    /// Emit the file behind a root-relative `url`. External, public and
    /// runtime URLs are left alone and yield `None`.
    fn emit_reference(
        &mut self,
        entry: &str,
        url: &str,
        role: Role,
        referenced: &mut Vec<String>,
    ) -> Result<Option<String>, BundleError> {
        let Some(relative) = self.local_path(url) else {
            return Ok(None);
        };
        if self.bundler.is_public(&relative) {
            return Ok(None);
        }

        let source = self.bundler.root.join(&relative);
        if !source.is_file() {
            return Err(BundleError::UnresolvedAsset {
                entry: entry.to_string(),
                url: url.to_string(),
            });
        }

        let role = match SourceKind::of(&source) {
            SourceKind::Script => role,
            _ => Role::Asset,
        };
        let file = self.emit(&source, role)?;
        if !referenced.contains(&file) {
            referenced.push(file.clone());
        }
        Ok(Some(file))
    }

    fn local_path(&self, url: &str) -> Option<String> {
        if !url.starts_with('/') || url.starts_with("//") || url.starts_with("/@") {
            return None;
        }
        let url = url.split(['?', '#']).next().unwrap_or(url);
        let url = url.strip_prefix(self.base.as_str()).unwrap_or(url);
        Some(url.trim_start_matches('/').to_string())
    }

    fn emit(&mut self, source: &Path, role: Role) -> Result<String, BundleError> {
        if let Some(file) = self.emitted.get(source) {
            return Ok(file.clone());
        }
        // Imported from inside its own import cycle: the module keeps the
        // name it was given before its imports were rewritten.
        if let Some(file) = self.in_progress.get(source) {
            let file = file.clone();
            self.pinned.insert(source.to_path_buf());
            return Ok(file);
        }

        let kind = SourceKind::of(source);
        let mut bytes = std::fs::read(source)?;
        let mut pinned_name = None;
        if kind != SourceKind::Other {
            let provisional = self.output_name(source, role, &bytes);
            self.in_progress.insert(source.to_path_buf(), provisional);

            let text = String::from_utf8_lossy(&bytes).into_owned();
            let dir = source.parent().unwrap_or(Path::new("/")).to_path_buf();
            let mut failure = None;
            let rewritten = imports::rewrite(kind, &text, |specifier| {
                let target = if specifier.starts_with("./") || specifier.starts_with("../") {
                    normalize_path(&dir.join(specifier))
                } else if let Some(relative) = self.local_path(specifier) {
                    self.bundler.root.join(relative)
                } else {
                    return None;
                };
                if !target.is_file() {
                    return None;
                }
                let dep_role = if kind == SourceKind::Script { Role::Chunk } else { Role::Asset };
                match self.emit(&target, dep_role) {
                    Ok(file) => Some(format!("{}{}", self.base, file)),
                    Err(e) => {
                        failure.get_or_insert(e);
                        None
                    }
                }
            });

            let provisional = self.in_progress.remove(source);
            if let Some(e) = failure {
                return Err(e);
            }
            if self.pinned.remove(source) {
                pinned_name = provisional;
            }
            bytes = rewritten.into_bytes();
        }

        let file = match pinned_name {
            Some(file) => file,
            None => self.output_name(source, role, &bytes),
        };
        if let Some(owner) = self.owners.get(&file)
            && owner != source
        {
            return Err(BundleError::NameCollision {
                file,
                first: owner.clone(),
                second: source.to_path_buf(),
            });
        }

        let target = self.plan.out_dir.join(&file);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&target, &bytes)?;

        let source_url = self.source_url(source);
        self.output.emitted.insert(source_url, file.clone());
        self.owners.insert(file.clone(), source.to_path_buf());
        self.emitted.insert(source.to_path_buf(), file.clone());
        Ok(file)
    }

    /// Output file for `source` holding `bytes`. Entries are named after
    /// their path under the project root so two `main.js` never meet.
    fn output_name(&self, source: &Path, role: Role, bytes: &[u8]) -> String {
        let extname = source
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();
        let hash = content_hash(bytes);
        let options = &self.plan.options;
        match role {
            Role::Entry => {
                let name = self.source_url(&source.with_extension(""));
                let name = name.trim_start_matches('/');
                file_name(&options.entry_file_names, name, &hash, &extname)
            }
            Role::Chunk | Role::Asset => {
                let name = source
                    .file_stem()
                    .map(|s| s.to_string_lossy().to_string())
                    .unwrap_or_default();
                let pattern = if role == Role::Chunk {
                    &options.chunk_file_names
                } else {
                    &options.asset_file_names
                };
                file_name(pattern, &name, &hash, &extname)
            }
        }
    }

    fn source_url(&self, source: &Path) -> String {
        source
            .strip_prefix(&self.bundler.root)
            .map(|p| format!("/{}", p.to_string_lossy().replace('\\', "/")))
            .unwrap_or_else(|_| source.display().to_string())
    }
}

fn is_css(url: &str) -> bool {
    url.split(['?', '#']).next().unwrap_or(url).ends_with(".css")
}

fn emitted_base(base: &str) -> String {
    let trimmed = base.trim_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        format!("/{trimmed}/")
    }
}
