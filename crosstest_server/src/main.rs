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

use std::net::SocketAddr;

use anyhow::Context;
use clap::Parser;
use crosstest::server_metadata::ServerMetadata;
use crosstest_server::{serve, TestServer};
use tokio::net::TcpListener;

#[derive(Parser, Debug)]
struct Args {
    /// Address to listen on.
    #[arg(long, default_value = "127.0.0.1")]
    host: String,
    /// Port to listen on; 0 picks a free one.
    #[arg(long, default_value_t = 0)]
    port: u16,
    /// Value returned in `server_id` when a request asks for it.
    #[arg(long, default_value = "crosstest-server")]
    server_id: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let addr: SocketAddr = format!("{}:{}", args.host, args.port)
        .parse()
        .with_context(|| format!("invalid listen address {}:{}", args.host, args.port))?;
    let listener = TcpListener::bind(addr).await.context("couldn't bind listener")?;
    let local_addr = listener.local_addr().context("couldn't get listener address")?;

    // The only line on stdout; the cross-runner reads it to find the server.
    let metadata = ServerMetadata::grpc(local_addr.ip().to_string(), local_addr.port());
    println!("{}", metadata.to_json_line().context("couldn't render server metadata")?);

    serve(listener, TestServer::new(args.server_id)).await
}
