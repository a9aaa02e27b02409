//! Configuration management for the remote-write output
//!
//! Settings are consolidated from several sources, each overriding the
//! previous one:
//!
//! 1. Built-in defaults
//! 2. A JSON or TOML document (file or raw JSON)
//! 3. `K6_PROMETHEUS_RW_*` environment variables
//! 4. A `key=value,key=value` argument string
//!
//! The environment is passed in as a map rather than read from the process,
//! so callers decide what it contains.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;

/// Prefix shared by every environment variable the output reads
pub const ENV_PREFIX: &str = "K6_PROMETHEUS_RW_";

const ENV_HEADERS_PREFIX: &str = "K6_PROMETHEUS_RW_HEADERS_";

/// Output configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// Remote-write endpoint
    pub url: String,

    /// Extra HTTP headers sent with every request
    pub headers: BTreeMap<String, String>,

    /// Skip TLS certificate verification
    #[serde(rename = "insecureSkipTLSVerify")]
    pub insecure_skip_tls_verify: bool,

    /// Basic auth user
    pub username: Option<String>,

    /// Basic auth password
    pub password: Option<String>,

    /// Token sent as `Authorization: Bearer`
    pub bearer_token: Option<String>,

    /// PEM client certificate path
    pub client_certificate: Option<PathBuf>,

    /// PEM client key path
    pub client_certificate_key: Option<PathBuf>,

    /// Time between flushes
    #[serde(with = "duration_serde")]
    pub push_interval: Duration,

    /// HTTP request timeout
    #[serde(with = "duration_serde")]
    pub timeout: Duration,

    /// Prefix prepended to every metric name
    pub metric_prefix: String,

    /// Emit tags as labels
    pub keep_tags: bool,

    /// Emit the `name` tag
    pub keep_name_tag: bool,

    /// Emit the `url` tag
    #[serde(rename = "keepURLTag")]
    pub keep_url_tag: bool,

    /// Default log filter for the replay binary
    pub log_level: String,
}

fn default_url() -> String { "http://localhost:9090/api/v1/write".to_string() }
fn default_push_interval() -> Duration { Duration::from_secs(5) }
fn default_timeout() -> Duration { Duration::from_secs(5) }
fn default_metric_prefix() -> String { "k6_".to_string() }
fn default_log_level() -> String { "info".to_string() }

impl Default for Config {
    fn default() -> Self {
        Self {
            url: default_url(),
            headers: BTreeMap::new(),
            insecure_skip_tls_verify: false,
            username: None,
            password: None,
            bearer_token: None,
            client_certificate: None,
            client_certificate_key: None,
            push_interval: default_push_interval(),
            timeout: default_timeout(),
            metric_prefix: default_metric_prefix(),
            keep_tags: true,
            keep_name_tag: false,
            keep_url_tag: true,
            log_level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    ///
    /// Files ending in `.toml` are parsed as TOML, anything else as JSON.
    /// Missing fields take their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Ok(toml::from_str(&contents)?),
            _ => Self::from_json(&contents),
        }
    }

    /// Parse a raw JSON document
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Consolidate every source into a validated configuration
    pub fn consolidate(
        json: Option<&str>,
        env: &HashMap<String, String>,
        arg: Option<&str>,
    ) -> Result<Self, ConfigError> {
        let mut config = match json {
            Some(raw) if !raw.trim().is_empty() => Self::from_json(raw)?,
            _ => Self::default(),
        };
        config.apply_env_overrides(env)?;
        if let Some(arg) = arg {
            config.apply_arg(arg)?;
        }
        config.validate()?;
        Ok(config)
    }

    /// Apply `K6_PROMETHEUS_RW_*` overrides from `env`
    pub fn apply_env_overrides(&mut self, env: &HashMap<String, String>) -> Result<(), ConfigError> {
        if let Some(url) = env_var(env, "SERVER_URL") {
            self.url = url.to_string();
        }
        if let Some(b) = env_bool(env, "INSECURE_SKIP_TLS_VERIFY")? {
            self.insecure_skip_tls_verify = b;
        }
        if let Some(user) = env_var(env, "USERNAME") {
            self.username = Some(user.to_string());
        }
        if let Some(password) = env_var(env, "PASSWORD") {
            self.password = Some(password.to_string());
        }
        if let Some(token) = env_var(env, "BEARER_TOKEN") {
            self.bearer_token = Some(token.to_string());
        }
        if let Some(cert) = env_var(env, "CLIENT_CERTIFICATE") {
            self.client_certificate = Some(PathBuf::from(cert));
        }
        if let Some(key) = env_var(env, "CLIENT_CERTIFICATE_KEY") {
            self.client_certificate_key = Some(PathBuf::from(key));
        }
        if let Some(d) = env_duration(env, "PUSH_INTERVAL")? {
            self.push_interval = d;
        }
        if let Some(d) = env_duration(env, "TIMEOUT")? {
            self.timeout = d;
        }
        if let Some(prefix) = env_var(env, "METRIC_PREFIX") {
            self.metric_prefix = prefix.to_string();
        }
        if let Some(b) = env_bool(env, "KEEP_TAGS")? {
            self.keep_tags = b;
        }
        if let Some(b) = env_bool(env, "KEEP_NAME_TAG")? {
            self.keep_name_tag = b;
        }
        if let Some(b) = env_bool(env, "KEEP_URL_TAG")? {
            self.keep_url_tag = b;
        }
        if let Some(level) = env_var(env, "LOG_LEVEL") {
            self.log_level = level.to_string();
        }

        for (name, value) in env {
            if let Some(header) = name.strip_prefix(ENV_HEADERS_PREFIX) {
                if !header.is_empty() {
                    self.headers.insert(header.to_string(), value.clone());
                }
            }
        }

        if let Some(headers) = env_var(env, "HTTP_HEADERS") {
            for pair in headers.split(',') {
                let parts: Vec<&str> = pair.split(':').collect();
                if parts.len() != 2 {
                    return Err(ConfigError::InvalidEnv {
                        name: format!("{}HTTP_HEADERS", ENV_PREFIX),
                        message: format!(
                            "header ({}) does not match the format <header key>:<value>",
                            pair
                        ),
                    });
                }
                self.headers
                    .insert(parts[0].to_string(), parts[1].to_string());
            }
        }

        Ok(())
    }

    /// Apply a `key=value,key=value` argument string
    ///
    /// Keys use the JSON names; `headers.<name>=<value>` adds a header.
    pub fn apply_arg(&mut self, text: &str) -> Result<(), ConfigError> {
        for opt in text.split(',').filter(|opt| !opt.is_empty()) {
            let (key, value) = opt.split_once('=').ok_or_else(|| ConfigError::Invalid {
                field: "argument",
                message: format!("couldn't parse {:?} as an option", opt),
            })?;

            match key {
                "url" => self.url = value.to_string(),
                "insecureSkipTLSVerify" => {
                    self.insecure_skip_tls_verify = parse_bool(value).ok_or_else(|| {
                        ConfigError::Invalid {
                            field: "insecureSkipTLSVerify",
                            message: format!("value must be true or false, not {:?}", value),
                        }
                    })?
                },
                "username" => self.username = Some(value.to_string()),
                "password" => self.password = Some(value.to_string()),
                "bearerToken" => self.bearer_token = Some(value.to_string()),
                "clientCertificate" => self.client_certificate = Some(PathBuf::from(value)),
                "clientCertificateKey" => {
                    self.client_certificate_key = Some(PathBuf::from(value))
                },
                "pushInterval" => {
                    self.push_interval =
                        humantime::parse_duration(value).map_err(|e| ConfigError::Invalid {
                            field: "pushInterval",
                            message: e.to_string(),
                        })?
                },
                "metricPrefix" => self.metric_prefix = value.to_string(),
                _ => match key.strip_prefix("headers.") {
                    Some(header) => {
                        self.headers.insert(header.to_string(), value.to_string());
                    },
                    None => {
                        return Err(ConfigError::Invalid {
                            field: "argument",
                            message: format!("{:?} is an unknown option's key", key),
                        })
                    },
                },
            }
        }
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.push_interval.is_zero() {
            return Err(ConfigError::Invalid {
                field: "pushInterval",
                message: "must be greater than zero".to_string(),
            });
        }

        if self.timeout.is_zero() {
            return Err(ConfigError::Invalid {
                field: "timeout",
                message: "must be greater than zero".to_string(),
            });
        }

        if self.metric_prefix.is_empty() {
            return Err(ConfigError::Invalid {
                field: "metricPrefix",
                message: "cannot be empty".to_string(),
            });
        }

        let lower = self.url.to_ascii_lowercase();
        let rest = lower
            .strip_prefix("http://")
            .or_else(|| lower.strip_prefix("https://"));
        match rest {
            Some(host) if !host.is_empty() && !host.starts_with('/') => {},
            _ => {
                return Err(ConfigError::Invalid {
                    field: "url",
                    message: format!("{:?} is not an absolute http(s) URL", self.url),
                })
            },
        }

        if self.client_certificate.is_some() != self.client_certificate_key.is_some() {
            return Err(ConfigError::Invalid {
                field: "clientCertificate",
                message: "certificate and key must be configured together".to_string(),
            });
        }

        Ok(())
    }

    /// Serialize to a TOML document
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Invalid {
            field: "config",
            message: e.to_string(),
        })
    }
}

fn env_var<'a>(env: &'a HashMap<String, String>, suffix: &str) -> Option<&'a str> {
    env.get(&format!("{}{}", ENV_PREFIX, suffix))
        .map(String::as_str)
}

fn env_bool(env: &HashMap<String, String>, suffix: &str) -> Result<Option<bool>, ConfigError> {
    match env_var(env, suffix) {
        None => Ok(None),
        Some(raw) => parse_bool(raw).map(Some).ok_or_else(|| ConfigError::InvalidEnv {
            name: format!("{}{}", ENV_PREFIX, suffix),
            message: format!("expected a boolean, got {:?}", raw),
        }),
    }
}

fn env_duration(
    env: &HashMap<String, String>,
    suffix: &str,
) -> Result<Option<Duration>, ConfigError> {
    match env_var(env, suffix) {
        None => Ok(None),
        Some(raw) => humantime::parse_duration(raw)
            .map(Some)
            .map_err(|e| ConfigError::InvalidEnv {
                name: format!("{}{}", ENV_PREFIX, suffix),
                message: e.to_string(),
            }),
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Some(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Some(false),
        _ => None,
    }
}

/// Durations as humantime strings ("5s", "1m30s") or integer milliseconds
mod duration_serde {
    use serde::{de, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Millis(u64),
    }

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*value).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        match Raw::deserialize(deserializer)? {
            Raw::Text(text) => humantime::parse_duration(&text).map_err(de::Error::custom),
            Raw::Millis(ms) => Ok(Duration::from_millis(ms)),
        }
    }
}
