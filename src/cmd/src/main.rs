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

mod error;
mod options;

use std::sync::Arc;

use clap::Parser;
use common_telemetry::{error, info};
use servers::http::HttpServer;
use snafu::ResultExt;
use storage::blackhole::BlackholeStorage;
use storage::clickhouse::ClickHouseStorage;
use storage::memory::MemoryStorage;
use storage::StorageRef;

use crate::error::{
    BuildStorageSnafu, IllegalConfigSnafu, Result, ShutdownServerSnafu, StartServerSnafu,
    StopStorageSnafu,
};
use crate::options::{
    PromStoreOptions, STORAGE_BLACKHOLE, STORAGE_CLICKHOUSE, STORAGE_MEMORY,
};

#[derive(Debug, Parser)]
#[command(name = "promstore", version, about = "Prometheus remote storage on ClickHouse")]
struct Command {
    /// Path to a TOML config file.
    #[arg(short = 'c', long, value_name = "FILE")]
    config_file: Option<String>,

    /// Remote API server listen address.
    #[arg(long, value_name = "ADDR")]
    http_addr: Option<String>,

    /// Storage engine: clickhouse, memory or blackhole.
    #[arg(long, value_name = "TYPE")]
    storage: Option<String>,

    /// ClickHouse DSN, e.g. tcp://127.0.0.1:9000/?database=promstore.
    #[arg(long, value_name = "DSN")]
    db_dsn: Option<String>,

    /// Drop the existing database schema at startup.
    #[arg(long)]
    db_drop_database: bool,

    /// Maximum number of open connections to the database.
    #[arg(long, value_name = "N")]
    db_max_open_conns: Option<u32>,

    #[arg(long, value_name = "LOG_DIR")]
    log_dir: Option<String>,

    #[arg(long, value_name = "LOG_LEVEL")]
    log_level: Option<String>,
}

impl Command {
    /// File options first, flags override.
    fn load_options(&self) -> Result<PromStoreOptions> {
        let mut opts = PromStoreOptions::load(self.config_file.as_deref())?;

        if let Some(addr) = &self.http_addr {
            opts.http.addr = addr.clone();
        }
        if let Some(storage) = &self.storage {
            opts.storage.0 = storage.clone();
        }
        if let Some(dsn) = &self.db_dsn {
            opts.clickhouse.dsn = dsn.clone();
        }
        if self.db_drop_database {
            opts.clickhouse.drop_database = true;
        }
        if let Some(conns) = self.db_max_open_conns {
            opts.clickhouse.max_open_conns = conns;
        }
        if let Some(dir) = &self.log_dir {
            opts.logging.dir = dir.clone();
        }
        if let Some(level) = &self.log_level {
            opts.logging.level = Some(level.clone());
        }

        Ok(opts)
    }
}

async fn build_storage(opts: &PromStoreOptions) -> Result<StorageRef> {
    let storage: StorageRef = match opts.storage.0.as_str() {
        STORAGE_CLICKHOUSE => Arc::new(
            ClickHouseStorage::new(&opts.clickhouse)
                .await
                .context(BuildStorageSnafu)?,
        ),
        STORAGE_MEMORY => Arc::new(MemoryStorage::new()),
        STORAGE_BLACKHOLE => Arc::new(BlackholeStorage::new()),
        other => {
            return IllegalConfigSnafu {
                msg: format!("unhandled storage type {other:?}"),
            }
            .fail()
        }
    };
    Ok(storage)
}

async fn run(cmd: Command) -> Result<()> {
    let opts = cmd.load_options()?;
    let _guards = common_telemetry::init_global_logging("promstore", &opts.logging);

    info!(
        "promstore {} starting with {} storage",
        env!("CARGO_PKG_VERSION"),
        opts.storage.0
    );

    let storage = build_storage(&opts).await?;
    let server = HttpServer::new(storage.clone(), opts.http.clone());
    let addr = server.start().await.context(StartServerSnafu)?;
    info!("Prometheus remote API server started at http://{addr}/");

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for ctrl-c signal: {e}");
    }
    info!("Got termination signal, shutting down...");

    // A second signal forces exit.
    tokio::spawn(async {
        let _ = tokio::signal::ctrl_c().await;
        error!("Got second termination signal, exiting!");
        std::process::exit(1);
    });

    server.shutdown().await.context(ShutdownServerSnafu)?;
    storage.stop().await.context(StopStorageSnafu)?;
    info!("Done.");
    Ok(())
}

#[tokio::main]
async fn main() {
    let cmd = Command::parse();
    if let Err(e) = run(cmd).await {
        // Logging may not be initialized yet; write to stderr as well.
        eprintln!("promstore: {e}");
        error!("promstore failed: {e}");
        std::process::exit(1);
    }
}
