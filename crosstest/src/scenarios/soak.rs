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

//! Repeated large unary calls inside an overall deadline, with per-iteration
//! latency bookkeeping.

use std::time::Duration;

use tokio::time::Instant;

use super::{unary::large_unary_once, Context};
use crate::{
    check,
    histogram::Histogram,
    report_fatal, report_success,
    reporter::{Fatal, Reporter},
    scope::CallScope,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SoakConfig {
    /// Build a fresh client for every iteration.
    pub reset_channel: bool,
    pub iterations: u32,
    pub max_failures: u32,
    pub per_iteration_max_latency: Duration,
    pub overall_timeout: Duration,
}

impl Default for SoakConfig {
    fn default() -> Self {
        Self {
            reset_channel: false,
            iterations: 10,
            max_failures: 0,
            per_iteration_max_latency: Duration::from_millis(1000),
            overall_timeout: Duration::from_secs(10),
        }
    }
}

pub(super) async fn soak(t: &mut dyn Reporter, ctx: &mut Context) -> Result<(), Fatal> {
    let config = ctx.soak.clone();
    let sizes = ctx.sizes;
    let overall_deadline = Instant::now() + config.overall_timeout;
    let mut histogram = Histogram::linear(20, 1, 0);
    let mut done = 0u32;
    let mut failures = 0u32;

    while done < config.iterations && Instant::now() < overall_deadline {
        let mut client = if config.reset_channel {
            match ctx.client.reconnect().await {
                Ok(client) => client,
                Err(err) => return Err(report_fatal!(t, "couldn't create a new channel: {err:#}")),
            }
        } else {
            ctx.client.clone()
        };

        let start = Instant::now();
        let result =
            large_unary_once(&mut client, sizes, CallScope::with_deadline(overall_deadline)).await;
        let elapsed = start.elapsed();
        let elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        histogram.add(elapsed_ms);

        match result {
            Err(err) => {
                failures += 1;
                log::info!("soak iteration: {done} elapsed_ms: {elapsed_ms} failed: {err:#}");
            }
            Ok(()) if elapsed > config.per_iteration_max_latency => {
                failures += 1;
                log::info!(
                    "soak iteration: {done} elapsed_ms: {elapsed_ms} exceeds max acceptable latency: {}",
                    config.per_iteration_max_latency.as_millis()
                );
            }
            Ok(()) => log::info!("soak iteration: {done} elapsed_ms: {elapsed_ms} succeeded"),
        }
        done += 1;
    }

    log::info!(
        "soak test ran: {done} / {} iterations. total failures: {failures}. max failures threshold: {}. See histogram below for details.\n{histogram}",
        config.iterations,
        config.max_failures
    );
    check!(
        t,
        done >= config.iterations,
        "soak test consumed all {}s of time and quit early, only ran {done} of {} iterations",
        config.overall_timeout.as_secs(),
        config.iterations
    );
    check!(
        t,
        failures <= config.max_failures,
        "soak test total failures: {failures} exceeds max failures threshold: {}",
        config.max_failures
    );
    report_success!(t, "successful soak");
    Ok(())
}
