// Copyright 2026 bgpr Authors
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

use bgpr::config::Config;
use bgpr::log::{set_level, LogLevel};
use bgpr::server::BgpServer;
use bgpr::{error, info};
use clap::Parser;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "bgprd")]
#[command(about = "BGP-4 speaker daemon", version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let config = match Config::from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!("failed to load config", "path" => &args.config, "error" => e.to_string());
            return ExitCode::FAILURE;
        }
    };

    match LogLevel::from_str(&config.log_level) {
        Ok(level) => set_level(level),
        Err(e) => {
            error!("invalid log level", "error" => e);
            return ExitCode::FAILURE;
        }
    }

    info!("starting bgprd",
        "listen_addr" => &config.listen_addr,
        "asn" => config.asn,
        "router_id" => config.router_id.to_string(),
        "peers" => config.peers.len());

    let server = match BgpServer::new(config) {
        Ok(server) => server,
        Err(e) => {
            error!("failed to initialize server", "error" => e.to_string());
            return ExitCode::FAILURE;
        }
    };

    let shutdown = server.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received");
            shutdown.shutdown();
        }
    });

    match server.run().await {
        Ok(()) => {
            info!("stopped");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("server error", "error" => e.to_string());
            ExitCode::FAILURE
        }
    }
}
