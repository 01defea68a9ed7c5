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

use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("Failed to read config file {}, source: {}", path, source))]
    ReadConfig {
        path: String,
        source: std::io::Error,
    },

    #[snafu(display("Failed to parse config file {}, source: {}", path, source))]
    ParseConfig {
        path: String,
        source: toml::de::Error,
    },

    #[snafu(display("Illegal config: {}", msg))]
    IllegalConfig { msg: String },

    #[snafu(display("Failed to build storage, source: {}", source))]
    BuildStorage { source: storage::error::Error },

    #[snafu(display("Failed to stop storage, source: {}", source))]
    StopStorage { source: storage::error::Error },

    #[snafu(display("Failed to start server, source: {}", source))]
    StartServer { source: servers::error::Error },

    #[snafu(display("Failed to shutdown server, source: {}", source))]
    ShutdownServer { source: servers::error::Error },
}

pub type Result<T> = std::result::Result<T, Error>;
