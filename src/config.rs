use clap::ValueEnum;
use serde::{Deserialize, Deserializer};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Config file looked up in the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = ".pr-review-export.toml";

pub const DEFAULT_POSTSCRIPT_PREFIX: &str = "(追記)";
pub const DEFAULT_DELIMITER: &str = "~~";
pub const DEFAULT_REVIEW_ITERATION: &str = "1";
pub const DEFAULT_PAGE_SIZE: u32 = 100;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Set the {0}.")]
    Missing(&'static str),

    #[error("Set the access token (--access-token, or the {0} environment variable).")]
    MissingToken(&'static str),

    #[error("The {0} must be a number: {1}")]
    InvalidPull(&'static str, String),

    #[error("The page size must be between 1 and 100: {0}")]
    InvalidPageSize(u32),
}

/// Hosting service to export from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Target {
    Github,
    Gitlab,
    Gitbucket,
}

impl Target {
    fn token_env(self) -> &'static str {
        match self {
            Self::Github => "GITHUB_TOKEN",
            Self::Gitlab => "GITLAB_TOKEN",
            Self::Gitbucket => "GITBUCKET_TOKEN",
        }
    }

    fn default_endpoint(self) -> Option<&'static str> {
        match self {
            Self::Github => Some("https://api.github.com/graphql"),
            Self::Gitlab => Some("https://gitlab.com/api/v4"),
            Self::Gitbucket => None,
        }
    }

    /// What the service calls the number being exported.
    fn pull_label(self) -> &'static str {
        match self {
            Self::Gitlab => "merge request number",
            Self::Github | Self::Gitbucket => "pull request number",
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Github => "github",
            Self::Gitlab => "gitlab",
            Self::Gitbucket => "gitbucket",
        };
        f.write_str(name)
    }
}

/// Settings as read from `.pr-review-export.toml` or the command line.
///
/// All fields are optional; [`Config::resolve`] fills in defaults and
/// rejects incomplete settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub target: Option<Target>,
    pub endpoint: Option<String>,
    /// GitBucket expects `user:password`
    pub access_token: Option<String>,
    pub org: Option<String>,
    /// Repository name, or the project id/path on GitLab
    pub repo: Option<String>,
    #[serde(deserialize_with = "string_or_number")]
    pub pull: Option<String>,
    pub postscript_prefix: Option<String>,
    pub delimiter: Option<String>,
    #[serde(deserialize_with = "string_or_number")]
    pub review_iteration: Option<String>,
    pub csv_file: Option<PathBuf>,
    pub proxy: Option<String>,
    pub page_size: Option<u32>,
}

/// Validated settings for one export run.
#[derive(Debug, Clone)]
pub struct Settings {
    pub target: Target,
    /// Without trailing slash
    pub endpoint: String,
    pub access_token: String,
    pub org: String,
    pub repo: String,
    pub pull: u64,
    pub postscript_prefix: String,
    pub delimiter: String,
    pub review_iteration: String,
    pub csv_file: Option<PathBuf>,
    pub proxy: Option<String>,
    pub page_size: u8,
}

fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(u64),
    }

    Ok(Option::<Raw>::deserialize(deserializer)?.map(|raw| match raw {
        Raw::Text(text) => text,
        Raw::Number(number) => number.to_string(),
    }))
}

/// Treat empty strings like absent values.
fn present(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.is_empty())
}

impl Config {
    /// Load `path`, or `.pr-review-export.toml` in the current directory.
    /// A missing default file yields an empty config; a missing explicit
    /// path is an error.
    pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
        match path {
            Some(path) => Self::load_from(path),
            None => {
                let path = Path::new(DEFAULT_CONFIG_FILE);
                if path.exists() {
                    Self::load_from(path)
                } else {
                    Ok(Config::default())
                }
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<Config, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Values set in `overrides` win over values in `self`.
    pub fn merge(self, overrides: Config) -> Config {
        Config {
            target: overrides.target.or(self.target),
            endpoint: overrides.endpoint.or(self.endpoint),
            access_token: overrides.access_token.or(self.access_token),
            org: overrides.org.or(self.org),
            repo: overrides.repo.or(self.repo),
            pull: overrides.pull.or(self.pull),
            postscript_prefix: overrides.postscript_prefix.or(self.postscript_prefix),
            delimiter: overrides.delimiter.or(self.delimiter),
            review_iteration: overrides.review_iteration.or(self.review_iteration),
            csv_file: overrides.csv_file.or(self.csv_file),
            proxy: overrides.proxy.or(self.proxy),
            page_size: overrides.page_size.or(self.page_size),
        }
    }

    /// Validate and apply defaults, reading the token fallback from the process environment.
    pub fn resolve(self) -> Result<Settings, ConfigError> {
        self.resolve_with(|key| std::env::var(key).ok())
    }

    /// Validate and apply defaults with `env` as the environment lookup.
    pub fn resolve_with(self, env: impl Fn(&str) -> Option<String>) -> Result<Settings, ConfigError> {
        let target = self.target.ok_or(ConfigError::Missing("target (github, gitlab or gitbucket)"))?;

        let endpoint = present(self.endpoint)
            .or_else(|| target.default_endpoint().map(str::to_string))
            .ok_or(ConfigError::Missing("endpoint"))?;

        let access_token = present(self.access_token)
            .or_else(|| present(env(target.token_env())))
            .ok_or(ConfigError::MissingToken(target.token_env()))?;

        let org = present(self.org).unwrap_or_default();
        if org.is_empty() && target != Target::Gitlab {
            return Err(ConfigError::Missing("organization"));
        }

        let repo = present(self.repo).ok_or(match target {
            Target::Gitlab => ConfigError::Missing("project id"),
            Target::Github | Target::Gitbucket => ConfigError::Missing("repository name"),
        })?;

        let pull = present(self.pull).ok_or(ConfigError::Missing(target.pull_label()))?;
        let pull = pull
            .trim()
            .parse::<u64>()
            .map_err(|_| ConfigError::InvalidPull(target.pull_label(), pull.clone()))?;

        let delimiter = self.delimiter.unwrap_or_else(|| DEFAULT_DELIMITER.to_string());
        if delimiter.is_empty() && target != Target::Gitlab {
            return Err(ConfigError::Missing("delimiter"));
        }

        let review_iteration = self
            .review_iteration
            .unwrap_or_else(|| DEFAULT_REVIEW_ITERATION.to_string());
        if review_iteration.is_empty() {
            return Err(ConfigError::Missing("review iteration"));
        }

        let page_size = self.page_size.unwrap_or(DEFAULT_PAGE_SIZE);
        if !(1..=100).contains(&page_size) {
            return Err(ConfigError::InvalidPageSize(page_size));
        }

        Ok(Settings {
            target,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            access_token,
            org,
            repo,
            pull,
            postscript_prefix: self
                .postscript_prefix
                .unwrap_or_else(|| DEFAULT_POSTSCRIPT_PREFIX.to_string()),
            delimiter,
            review_iteration,
            csv_file: self.csv_file.filter(|path| !path.as_os_str().is_empty()),
            proxy: present(self.proxy),
            page_size: page_size as u8,
        })
    }
}
