use crate::error::{Error, Result};
use std::collections::HashMap;
use std::time::Duration;

pub use nats::ClientConfig;

const ENV_NODE_ID: &str = "PROCESSING_STATUS_NODE_ID";
const ENV_BUCKET: &str = "PROCESSING_STATUS_BUCKET";
const ENV_PERSIST_INTERVAL_MS: &str = "PROCESSING_STATUS_PERSIST_INTERVAL_MS";
const ENV_UPDATE_THRESHOLD_MS: &str = "PROCESSING_STATUS_UPDATE_THRESHOLD_MS";
const ENV_JOURNAL_WRITE_RATE_THRESHOLD: &str = "PROCESSING_STATUS_JOURNAL_WRITE_RATE_THRESHOLD";
const ENV_STORE_TIMEOUT_MS: &str = "PROCESSING_STATUS_STORE_TIMEOUT_MS";

const DEFAULT_BUCKET: &str = "processing_status";
const DEFAULT_PERSIST_INTERVAL_MS: u64 = 1000;
const DEFAULT_UPDATE_THRESHOLD_MS: u64 = 60_000;
const DEFAULT_JOURNAL_WRITE_RATE_THRESHOLD: f64 = 1.0;
const DEFAULT_STORE_TIMEOUT_MS: u64 = 5000;

/// Settings of the processing status publisher and watermark reader.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusConfig {
    /// Id under which the local node publishes its record.
    pub node_id: String,
    /// Key-value bucket holding one record per node.
    pub bucket: String,
    /// Period of the publish cycle.
    pub persist_interval: Duration,
    /// Records older than this are stale and ignored by the watermark.
    pub update_threshold: Duration,
    /// Nodes writing fewer messages per minute to their journal are ignored by the watermark.
    pub journal_write_rate_threshold: f64,
    /// Upper bound for a single store call.
    pub store_timeout: Duration,
    pub jetstream: ClientConfig,
}

impl StatusConfig {
    pub fn load(env_vars: HashMap<String, String>) -> Result<Self> {
        let node_id = env_vars
            .get(ENV_NODE_ID)
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .ok_or_else(|| Error::Config(format!("Environment variable {ENV_NODE_ID} is not set")))?;

        let bucket = env_vars
            .get(ENV_BUCKET)
            .cloned()
            .unwrap_or_else(|| DEFAULT_BUCKET.to_string());
        if bucket.is_empty() {
            return Err(Error::Config(format!("{ENV_BUCKET} must not be empty")));
        }

        let journal_write_rate_threshold = match env_vars.get(ENV_JOURNAL_WRITE_RATE_THRESHOLD) {
            Some(raw) => raw.parse::<f64>().map_err(|e| {
                Error::Config(format!(
                    "Invalid {ENV_JOURNAL_WRITE_RATE_THRESHOLD} value {raw}: {e}"
                ))
            })?,
            None => DEFAULT_JOURNAL_WRITE_RATE_THRESHOLD,
        };
        if !journal_write_rate_threshold.is_finite() || journal_write_rate_threshold < 0.0 {
            return Err(Error::Config(format!(
                "{ENV_JOURNAL_WRITE_RATE_THRESHOLD} must be a non-negative number, got {journal_write_rate_threshold}"
            )));
        }

        Ok(Self {
            node_id,
            bucket,
            persist_interval: positive_millis(
                &env_vars,
                ENV_PERSIST_INTERVAL_MS,
                DEFAULT_PERSIST_INTERVAL_MS,
            )?,
            update_threshold: positive_millis(
                &env_vars,
                ENV_UPDATE_THRESHOLD_MS,
                DEFAULT_UPDATE_THRESHOLD_MS,
            )?,
            journal_write_rate_threshold,
            store_timeout: positive_millis(&env_vars, ENV_STORE_TIMEOUT_MS, DEFAULT_STORE_TIMEOUT_MS)?,
            jetstream: ClientConfig::load(env_vars)?,
        })
    }
}

fn positive_millis(env_vars: &HashMap<String, String>, var: &str, default: u64) -> Result<Duration> {
    let millis = match env_vars.get(var) {
        Some(raw) => raw
            .parse::<u64>()
            .map_err(|e| Error::Config(format!("Invalid {var} value {raw}: {e}")))?,
        None => default,
    };
    if millis == 0 {
        return Err(Error::Config(format!("{var} must be greater than zero")));
    }
    Ok(Duration::from_millis(millis))
}

pub mod nats {
    use crate::error::Result;
    use std::collections::HashMap;

    const DEFAULT_URL: &str = "localhost:4222";

    const ENV_JETSTREAM_URL: &str = "PROCESSING_STATUS_JETSTREAM_URL";
    const ENV_JETSTREAM_USER: &str = "PROCESSING_STATUS_JETSTREAM_USER";
    const ENV_JETSTREAM_PASSWORD: &str = "PROCESSING_STATUS_JETSTREAM_PASSWORD";

    #[derive(Debug, Clone, PartialEq)]
    pub struct ClientConfig {
        pub url: String,
        pub user: Option<String>,
        pub password: Option<String>,
    }

    impl Default for ClientConfig {
        fn default() -> Self {
            ClientConfig {
                url: DEFAULT_URL.to_string(),
                user: None,
                password: None,
            }
        }
    }

    impl ClientConfig {
        pub fn load(
            env_vars: impl IntoIterator<Item = (impl Into<String>, impl Into<String>)>,
        ) -> Result<Self> {
            let env_vars: HashMap<String, String> = env_vars
                .into_iter()
                .map(|(key, val)| (key.into(), val.into()))
                .filter(|(key, _val)| {
                    [ENV_JETSTREAM_URL, ENV_JETSTREAM_USER, ENV_JETSTREAM_PASSWORD]
                        .contains(&key.as_str())
                })
                .collect();

            let get_var = |var: &str| env_vars.get(var).filter(|v| !v.is_empty()).cloned();

            Ok(Self {
                url: get_var(ENV_JETSTREAM_URL).unwrap_or_else(|| DEFAULT_URL.to_string()),
                user: get_var(ENV_JETSTREAM_USER),
                password: get_var(ENV_JETSTREAM_PASSWORD),
            })
        }
    }

}
