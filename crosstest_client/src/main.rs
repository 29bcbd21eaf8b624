//
// Copyright 2026 The Project Oak Authors
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

use std::{io::BufRead, process::ExitCode, time::Duration};

use anyhow::Context;
use clap::{Parser, ValueEnum};
use crosstest::{
    client::{ClientConfig, TestClient},
    fixtures::{Sizes, UNRESOLVABLE_HOST},
    harness::{self, HarnessConfig, Selection, Summary},
    reporter::ConsoleReporter,
    scenarios::{catalogue, Capabilities, Category, SoakConfig},
    server_metadata::{Protocol, ServerMetadata},
};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Format {
    Text,
    Json,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum SizeTable {
    Classic,
    Extended,
}

impl From<SizeTable> for Sizes {
    fn from(table: SizeTable) -> Self {
        match table {
            SizeTable::Classic => Sizes::CLASSIC,
            SizeTable::Extended => Sizes::EXTENDED,
        }
    }
}

#[derive(Parser, Debug)]
struct Args {
    #[arg(long, default_value = "localhost")]
    host: String,
    #[arg(long, default_value_t = 8080)]
    port: u16,
    /// Read the server address from a `ServerMetadata` line on stdin and
    /// report plain lines on stdout.
    #[arg(long)]
    cross: bool,
    /// Scenario to run; may be repeated. Runs everything when neither this
    /// nor `--category` is given.
    #[arg(long = "scenario")]
    scenarios: Vec<String>,
    #[arg(long = "category")]
    categories: Vec<Category>,
    /// Print the catalogue and exit.
    #[arg(long)]
    list: bool,
    #[arg(long, value_enum, default_value_t = Format::Text)]
    format: Format,
    #[arg(long, value_enum, default_value_t = SizeTable::Extended)]
    sizes: SizeTable,
    #[arg(long)]
    gzip: bool,
    /// Skip scenarios that interleave sending and receiving on one call.
    #[arg(long)]
    half_duplex_only: bool,
    #[arg(long)]
    soak_reset_channel: bool,
    #[arg(long, default_value_t = 10)]
    soak_iterations: u32,
    #[arg(long, default_value_t = 0)]
    soak_max_failures: u32,
    #[arg(long, default_value_t = 1000)]
    soak_per_iteration_max_latency_ms: u64,
    #[arg(long, default_value_t = 10)]
    soak_overall_timeout_seconds: u64,
    #[arg(long, default_value = UNRESOLVABLE_HOST)]
    unresolvable_host: String,
}

impl Args {
    fn harness_config(&self) -> HarnessConfig {
        HarnessConfig {
            selection: Selection {
                names: self.scenarios.clone(),
                categories: self.categories.clone(),
            },
            capabilities: Capabilities { full_duplex: !self.half_duplex_only, trailers: true },
            sizes: self.sizes.into(),
            soak: SoakConfig {
                reset_channel: self.soak_reset_channel,
                iterations: self.soak_iterations,
                max_failures: self.soak_max_failures,
                per_iteration_max_latency: Duration::from_millis(
                    self.soak_per_iteration_max_latency_ms,
                ),
                overall_timeout: Duration::from_secs(self.soak_overall_timeout_seconds),
            },
            unresolvable: ClientConfig::new(self.unresolvable_host.clone(), 80),
        }
    }

    fn client_config(&self) -> anyhow::Result<ClientConfig> {
        let mut config = if self.cross {
            let mut line = String::new();
            std::io::stdin().lock().read_line(&mut line).context("couldn't read server metadata")?;
            let metadata =
                ServerMetadata::from_json_line(&line).context("couldn't parse server metadata")?;
            let port = metadata
                .port_for(Protocol::Grpc)
                .context("server metadata lists no gRPC port")?;
            ClientConfig::new(metadata.host, port)
        } else {
            ClientConfig::new(self.host.clone(), self.port)
        };
        config.compression = self.gzip;
        Ok(config)
    }
}

async fn run(args: Args) -> anyhow::Result<Summary> {
    let config = args.harness_config();
    let scenarios = harness::select(&catalogue(), &config.selection, config.capabilities)?;
    if args.list {
        println!("{}", harness::list(&scenarios));
        return Ok(Summary::default());
    }

    let client_config = args.client_config()?;
    let client = TestClient::connect(&client_config).await?;
    let mut context = config.context(client);
    let mut reporter = if args.cross { ConsoleReporter::cross() } else { ConsoleReporter::cli() };
    log::info!("running {} scenarios against {}", scenarios.len(), client_config.uri());

    let summary = harness::run(&mut reporter, &mut context, &scenarios).await;
    match args.format {
        Format::Json => println!("{}", summary.to_json().context("couldn't render summary")?),
        Format::Text if !args.cross => println!("{summary}"),
        Format::Text => {}
    }
    Ok(summary)
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match run(args).await {
        Ok(summary) if summary.passed() => ExitCode::SUCCESS,
        Ok(_) => ExitCode::from(1),
        Err(err) => {
            log::error!("crosstest_client: {err:#}");
            ExitCode::from(2)
        }
    }
}
