//! Configuration for the remote task controller.
//!
//! Loaded with `config` + `serde`, the same way `tasker-shared::config`
//! layers defaults, a config file, and environment overrides.

use std::time::Duration;

use serde::{Deserialize, Serialize};

fn default_status_refresh_max_wait() -> Duration {
    Duration::from_secs(2)
}

fn default_info_update_interval() -> Duration {
    Duration::from_millis(200)
}

fn default_task_info_refresh_max_wait() -> Duration {
    Duration::from_secs(2)
}

fn default_max_error_duration() -> Duration {
    Duration::from_secs(5 * 60)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteTaskConfig {
    /// Long-poll timeout the controller asks the worker to honor on
    /// `GET /{taskId}/status`.
    #[serde(with = "humantime_serde", default = "default_status_refresh_max_wait")]
    pub status_refresh_max_wait: Duration,

    /// Minimum spacing between `GET /{taskId}` info fetches while a task
    /// is running.
    #[serde(with = "humantime_serde", default = "default_info_update_interval")]
    pub info_update_interval: Duration,

    /// Long-poll timeout for the info fetch itself.
    #[serde(with = "humantime_serde", default = "default_task_info_refresh_max_wait")]
    pub task_info_refresh_max_wait: Duration,

    /// Total wall-clock time a fetcher/sender may spend retrying a single
    /// task before giving up and failing it with `REMOTE_TASK_ERROR`.
    #[serde(with = "humantime_serde", default = "default_max_error_duration")]
    pub max_error_duration: Duration,

    /// Log full request/response bodies at debug level.
    #[serde(default)]
    pub trace_http: bool,
}

impl Default for RemoteTaskConfig {
    fn default() -> Self {
        Self {
            status_refresh_max_wait: default_status_refresh_max_wait(),
            info_update_interval: default_info_update_interval(),
            task_info_refresh_max_wait: default_task_info_refresh_max_wait(),
            max_error_duration: default_max_error_duration(),
            trace_http: false,
        }
    }
}

impl RemoteTaskConfig {
    /// Load configuration layering defaults, an optional config file, and
    /// `RTC_`-prefixed environment overrides — the same precedence order
    /// `tasker-shared::config` uses.
    pub fn load(config_path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder()
            .add_source(config::Config::try_from(&RemoteTaskConfig::default())?);

        if let Some(path) = config_path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        builder = builder.add_source(config::Environment::with_prefix("RTC").separator("__"));

        builder.build()?.try_deserialize()
    }
}
