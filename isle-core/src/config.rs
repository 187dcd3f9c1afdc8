use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Site configuration. Directory fields are relative to `project_root`
/// unless absolute.
#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(default)]
pub struct Config {
    pub project_root: PathBuf,
    pub pages: PathBuf,
    pub components: PathBuf,
    pub collections: PathBuf,
    pub public: PathBuf,
    pub dist: PathBuf,
    pub build_options: BuildOptions,
    pub dev_options: DevOptions,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            project_root: PathBuf::from("."),
            pages: PathBuf::from("./src/pages"),
            components: PathBuf::from("./src/components"),
            collections: PathBuf::from("./src/collections"),
            public: PathBuf::from("./public"),
            dist: PathBuf::from("./dist"),
            build_options: BuildOptions::default(),
            dev_options: DevOptions::default(),
        }
    }
}

impl Config {
    /// Absolute project root.
    pub fn root(&self) -> PathBuf {
        std::path::absolute(&self.project_root).unwrap_or_else(|_| self.project_root.clone())
    }

    pub fn pages_dir(&self) -> PathBuf {
        self.root().join(&self.pages)
    }

    pub fn components_dir(&self) -> PathBuf {
        self.root().join(&self.components)
    }

    pub fn collections_dir(&self) -> PathBuf {
        self.root().join(&self.collections)
    }

    pub fn public_dir(&self) -> PathBuf {
        self.root().join(&self.public)
    }

    pub fn dist_dir(&self) -> PathBuf {
        self.root().join(&self.dist)
    }
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(default)]
pub struct BuildOptions {
    /// Public origin of the deployed site, e.g. `https://example.com`.
    pub site: Option<String>,
    /// Path prefix the site is served under.
    pub base: String,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            site: None,
            base: "/".to_string(),
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(default)]
pub struct DevOptions {
    pub port: u16,
}

impl Default for DevOptions {
    fn default() -> Self {
        Self { port: 3000 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
            project_root = "/srv/site"
            [build_options]
            site = "https://example.com"
            "#,
        )
        .unwrap();

        assert_eq!(config.build_options.site.as_deref(), Some("https://example.com"));
        assert_eq!(config.build_options.base, "/");
        assert_eq!(config.dev_options.port, 3000);
        assert_eq!(config.pages_dir(), PathBuf::from("/srv/site/./src/pages"));
    }
}
