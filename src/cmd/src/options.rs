// Copyright 2023 Greptime Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use common_telemetry::LoggingOptions;
use serde::{Deserialize, Serialize};
use servers::http::HttpOptions;
use snafu::ResultExt;
use storage::clickhouse::ClickHouseOptions;

use crate::error::{ParseConfigSnafu, ReadConfigSnafu, Result};

/// Which storage engine backs the gateway.
pub const STORAGE_CLICKHOUSE: &str = "clickhouse";
pub const STORAGE_MEMORY: &str = "memory";
pub const STORAGE_BLACKHOLE: &str = "blackhole";

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PromStoreOptions {
    pub storage: StorageType,
    pub http: HttpOptions,
    pub clickhouse: ClickHouseOptions,
    pub logging: LoggingOptions,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StorageType(pub String);

impl Default for StorageType {
    fn default() -> Self {
        Self(STORAGE_CLICKHOUSE.to_string())
    }
}

impl PromStoreOptions {
    /// Loads options from an optional TOML file; missing sections fall back
    /// to defaults.
    pub fn load(config_file: Option<&str>) -> Result<Self> {
        match config_file {
            Some(path) => {
                let content = std::fs::read_to_string(path).context(ReadConfigSnafu { path })?;
                Self::from_toml(&content).context(ParseConfigSnafu { path })
            }
            None => Ok(Self::default()),
        }
    }

    fn from_toml(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let opts = PromStoreOptions::load(None).unwrap();
        assert_eq!(STORAGE_CLICKHOUSE, opts.storage.0);
        assert_eq!("127.0.0.1:7781", opts.http.addr);
        assert_eq!(75, opts.clickhouse.max_open_conns);
        assert_eq!(50, opts.clickhouse.max_time_series_in_query);
    }

    #[test]
    fn test_partial_toml() {
        let opts = PromStoreOptions::from_toml(
            r#"
            storage = "memory"

            [http]
            addr = "0.0.0.0:9201"
            timeout = "10s"

            [clickhouse]
            dsn = "tcp://ch:9000/?database=metrics"
            drop_database = true
            reload_interval = "1s"

            [logging]
            level = "debug"
            "#,
        )
        .unwrap();

        assert_eq!(STORAGE_MEMORY, opts.storage.0);
        assert_eq!("0.0.0.0:9201", opts.http.addr);
        assert_eq!(std::time::Duration::from_secs(10), opts.http.timeout);
        assert!(opts.clickhouse.drop_database);
        assert_eq!(
            std::time::Duration::from_secs(1),
            opts.clickhouse.reload_interval
        );
        // Untouched sections keep their defaults.
        assert_eq!(75, opts.clickhouse.max_open_conns);
        assert_eq!(Some("debug".to_string()), opts.logging.level);
    }

    #[test]
    fn test_bad_toml() {
        assert!(PromStoreOptions::from_toml("storage = [").is_err());
    }
}
