use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const CONFIG_FILE_NAME: &str = "north.toml";
static OVERRIDE_FILE_NAME: &str = "north.override.toml";

/// Settings that change how scripts are split and run.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct RunnerConfig {
    /// Keywords that force a script outside of an implicit transaction, for
    /// example `CONCURRENTLY`. Empty disables the check.
    #[serde(default)]
    pub non_transactional_keywords: Vec<String>,

    /// Whether `DISCARD ALL` is sent after every successful script.
    #[serde(default = "default_discard_on_completion")]
    pub discard_on_completion: bool,
}

fn default_discard_on_completion() -> bool {
    true
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            non_transactional_keywords: Vec::new(),
            discard_on_completion: default_discard_on_completion(),
        }
    }
}

impl RunnerConfig {
    pub fn with_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.non_transactional_keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_discard_on_completion(mut self, discard: bool) -> Self {
        self.discard_on_completion = discard;
        self
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct DatabaseConfig {
    /// Command (and arguments) used to reach the database. SQL is written to
    /// its stdin.
    #[serde(default = "default_psql_command")]
    pub psql_command: Vec<String>,
}

fn default_psql_command() -> Vec<String> {
    vec!["psql".to_string(), "--no-psqlrc".to_string()]
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            psql_command: default_psql_command(),
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct Config {
    #[serde(default)]
    pub runner: RunnerConfig,

    #[serde(default)]
    pub database: DatabaseConfig,
}

impl Config {
    /// Loads `path`, then the local override file, then `NORTH_*` variables.
    /// Missing files are skipped so the defaults apply.
    pub fn load(path: &str) -> Result<Config> {
        let settings: Config = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            // Used to override the version in a repo with your own custom local overrides.
            .add_source(config::File::with_name(OVERRIDE_FILE_NAME).required(false))
            // Eg. `NORTH_RUNNER__DISCARD_ON_COMPLETION=false north apply ...`
            .add_source(
                config::Environment::with_prefix("NORTH")
                    .prefix_separator("_")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("runner.non_transactional_keywords")
                    .try_parsing(true),
            )
            .build()
            .context("could not build configuration")?
            .try_deserialize()
            .context("could not deserialise config struct")?;

        Ok(settings)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("could not convert config to toml")
    }
}
