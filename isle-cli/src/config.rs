use anyhow::Result;
use clap::ArgMatches;
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use isle_core::BuildOverrides;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

const CONFIG_FILE: &str = "isle.toml";

/// Complete configuration that merges CLI args, env vars, config files, and defaults
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct IsleConfig {
    /// Per-invocation settings
    #[serde(default)]
    pub build: BuildConfig,
    /// Site configuration (from isle-core)
    #[serde(flatten)]
    pub site: isle_core::Config,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct BuildConfig {
    /// Configuration file that was read, if any
    pub config: Option<String>,
    /// Origin override for this build only
    pub site: Option<String>,
}

impl IsleConfig {
    /// Load configuration with cascading precedence:
    /// 1. CLI arguments (highest priority)
    /// 2. Environment variables (ISLE_*)
    /// 3. Configuration file
    /// 4. Defaults (lowest priority)
    pub fn load(args: &ArgMatches) -> Result<Self> {
        let root = args.get_one::<String>("root").map(PathBuf::from);
        let config_file = match args.get_one::<String>("config") {
            Some(path) => PathBuf::from(path),
            None => root.clone().unwrap_or_else(|| PathBuf::from(".")).join(CONFIG_FILE),
        };

        let mut builder = ConfigBuilder::builder();

        // 1. Start with defaults
        let defaults = Self::default();
        builder = builder.add_source(ConfigBuilder::try_from(&defaults)?);

        // 2. Add configuration file if it exists
        let found = Path::new(&config_file).is_file();
        if found {
            builder = builder.add_source(File::from(config_file.as_path()).format(FileFormat::Toml));
        }

        // 3. Add environment variables with ISLE_ prefix
        builder = builder.add_source(
            Environment::with_prefix("ISLE")
                .prefix_separator("_")
                .separator("__") // Use double underscore for nested keys
                .try_parsing(true),
        );

        // 4. Override with CLI arguments (highest priority)
        let mut cli_overrides = HashMap::new();

        if let Some(root) = &root {
            cli_overrides.insert("project_root".to_string(), root.display().to_string());
        }
        if found {
            cli_overrides.insert("build.config".to_string(), config_file.display().to_string());
        }
        if let Some(site) = args.try_get_one::<String>("site").unwrap_or(None) {
            cli_overrides.insert("build.site".to_string(), site.clone());
        }

        if !cli_overrides.is_empty() {
            builder = builder.add_source(ConfigBuilder::try_from(&cli_overrides)?);
        }

        // Build and deserialize
        let config = builder.build()?;
        let isle_config: IsleConfig = config.try_deserialize()?;

        Ok(isle_config)
    }

    /// Get just the site configuration for passing to isle-core
    pub fn site_config(&self) -> &isle_core::Config {
        &self.site
    }

    pub fn overrides(&self) -> BuildOverrides {
        BuildOverrides {
            site: self.build.site.clone(),
        }
    }
}

/// Load configuration specifically for build commands
pub fn load_build_config(args: &ArgMatches) -> Result<IsleConfig> {
    IsleConfig::load(args)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmd::build::make_subcommand;
    use std::fs;

    fn matches(args: &[&str]) -> ArgMatches {
        let mut argv = vec!["build"];
        argv.extend_from_slice(args);
        make_subcommand().try_get_matches_from(argv).unwrap()
    }

    #[test]
    fn test_default_config() {
        let config = IsleConfig::default();
        assert_eq!(config.site.pages, PathBuf::from("./src/pages"));
        assert_eq!(config.site.dist, PathBuf::from("./dist"));
        assert_eq!(config.site.dev_options.port, 3000);
        assert!(config.build.site.is_none());
    }

    #[test]
    fn test_file_and_cli_args() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("isle.toml"),
            "dist = \"./public_html\"\n\n[build_options]\nsite = \"https://example.com\"\n",
        )
        .unwrap();
        let root = dir.path().display().to_string();

        let config = IsleConfig::load(&matches(&["--root", &root])).unwrap();
        assert_eq!(config.site.project_root, dir.path());
        assert_eq!(config.site.dist, PathBuf::from("./public_html"));
        assert_eq!(config.site.build_options.site.as_deref(), Some("https://example.com"));
        assert!(config.build.config.is_some());
        // Should still have defaults for non-overridden values
        assert_eq!(config.site.pages, PathBuf::from("./src/pages"));

        let config =
            IsleConfig::load(&matches(&["--root", &root, "--site", "https://preview.example.com"]))
                .unwrap();
        assert_eq!(
            config.overrides().site.as_deref(),
            Some("https://preview.example.com")
        );
    }

    #[test]
    fn test_missing_config_file_is_fine() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().display().to_string();

        let config = IsleConfig::load(&matches(&["--root", &root])).unwrap();
        assert!(config.build.config.is_none());
        assert_eq!(config.site.build_options.base, "/");
    }
}
