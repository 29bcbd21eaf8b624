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

//! The conformance catalogue: named client-side procedures that each drive
//! the test service and decide pass or fail through a [`Reporter`].

mod cancellation;
mod errors;
mod metadata;
pub mod soak;
mod status;
mod streaming;
mod unary;
mod unimplemented;

use std::{fmt, str::FromStr};

use crosstest_proto::grpc::testing::{
    Payload, PayloadType, ResponseParameters, StreamingOutputCallRequest,
};
use futures::future::{BoxFuture, FutureExt};
use serde::Serialize;
use tonic::Status;

pub use self::soak::SoakConfig;
use crate::{
    client::{ClientConfig, TestClient},
    fixtures::{self, PayloadError, Sizes},
    reporter::{Fatal, Reporter},
};

/// Everything a scenario may use besides the reporter.
#[derive(Clone)]
pub struct Context {
    pub client: TestClient,
    pub sizes: Sizes,
    pub soak: SoakConfig,
    /// Address used by the unresolvable-host scenario.
    pub unresolvable: ClientConfig,
}

impl Context {
    pub fn new(client: TestClient) -> Self {
        Self {
            client,
            sizes: Sizes::default(),
            soak: SoakConfig::default(),
            unresolvable: ClientConfig::new(fixtures::UNRESOLVABLE_HOST, 80),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    Unary,
    Streaming,
    Cancellation,
    Metadata,
    Status,
    Unimplemented,
    Errors,
    Diagnostic,
}

impl Category {
    pub const ALL: [Category; 8] = [
        Category::Unary,
        Category::Streaming,
        Category::Cancellation,
        Category::Metadata,
        Category::Status,
        Category::Unimplemented,
        Category::Errors,
        Category::Diagnostic,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Unary => "unary",
            Category::Streaming => "streaming",
            Category::Cancellation => "cancellation",
            Category::Metadata => "metadata",
            Category::Status => "status",
            Category::Unimplemented => "unimplemented",
            Category::Errors => "errors",
            Category::Diagnostic => "diagnostic",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|category| category.as_str() == value)
            .ok_or_else(|| format!("unknown category: {value}"))
    }
}

/// Transport features a scenario cannot run without.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Requirement {
    /// Interleaved sending and receiving on one call.
    FullDuplex,
    /// Trailing metadata after a successful response.
    Trailers,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Capabilities {
    pub full_duplex: bool,
    pub trailers: bool,
}

impl Capabilities {
    pub fn supports(&self, requirement: Requirement) -> bool {
        match requirement {
            Requirement::FullDuplex => self.full_duplex,
            Requirement::Trailers => self.trailers,
        }
    }
}

impl Default for Capabilities {
    fn default() -> Self {
        Self { full_duplex: true, trailers: true }
    }
}

pub type ScenarioFn =
    for<'a> fn(&'a mut dyn Reporter, &'a mut Context) -> BoxFuture<'a, Result<(), Fatal>>;

#[derive(Clone, Copy)]
pub struct Scenario {
    pub name: &'static str,
    pub category: Category,
    pub requires: &'static [Requirement],
    pub run: ScenarioFn,
}

impl fmt::Debug for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scenario")
            .field("name", &self.name)
            .field("category", &self.category)
            .field("requires", &self.requires)
            .finish_non_exhaustive()
    }
}

macro_rules! scenario {
    ($name:literal, $category:ident, [$($requirement:ident),*], $run:path) => {
        Scenario {
            name: $name,
            category: Category::$category,
            requires: &[$(Requirement::$requirement),*],
            run: |reporter, context| $run(reporter, context).boxed(),
        }
    };
}

/// Every scenario, in the order the drivers run them.
pub fn catalogue() -> Vec<Scenario> {
    vec![
        scenario!("empty-unary", Unary, [], unary::empty_unary),
        scenario!("large-unary", Unary, [], unary::large_unary),
        scenario!("cacheable-unary", Unary, [], unary::cacheable_unary),
        scenario!("client-streaming", Streaming, [], streaming::client_streaming),
        scenario!("server-streaming", Streaming, [], streaming::server_streaming),
        scenario!("ping-pong", Streaming, [FullDuplex], streaming::ping_pong),
        scenario!("empty-stream", Streaming, [FullDuplex], streaming::empty_stream),
        scenario!("half-duplex", Streaming, [], streaming::half_duplex),
        scenario!(
            "timeout-on-sleeping-server",
            Cancellation,
            [FullDuplex],
            cancellation::timeout_on_sleeping_server
        ),
        scenario!("cancel-after-begin", Cancellation, [], cancellation::cancel_after_begin),
        scenario!(
            "cancel-after-first-response",
            Cancellation,
            [FullDuplex],
            cancellation::cancel_after_first_response
        ),
        scenario!("custom-metadata-unary", Metadata, [Trailers], metadata::custom_metadata_unary),
        scenario!(
            "custom-metadata-server-streaming",
            Metadata,
            [Trailers],
            metadata::custom_metadata_server_streaming
        ),
        scenario!(
            "custom-metadata-full-duplex",
            Metadata,
            [FullDuplex, Trailers],
            metadata::custom_metadata_full_duplex
        ),
        scenario!(
            "duplicated-custom-metadata-unary",
            Metadata,
            [Trailers],
            metadata::duplicated_custom_metadata_unary
        ),
        scenario!(
            "duplicated-custom-metadata-server-streaming",
            Metadata,
            [Trailers],
            metadata::duplicated_custom_metadata_server_streaming
        ),
        scenario!(
            "duplicated-custom-metadata-full-duplex",
            Metadata,
            [FullDuplex, Trailers],
            metadata::duplicated_custom_metadata_full_duplex
        ),
        scenario!(
            "status-code-and-message-unary",
            Status,
            [],
            status::status_code_and_message_unary
        ),
        scenario!(
            "status-code-and-message-full-duplex",
            Status,
            [FullDuplex],
            status::status_code_and_message_full_duplex
        ),
        scenario!("special-status-message", Status, [], status::special_status_message),
        scenario!(
            "unimplemented-method",
            Unimplemented,
            [],
            unimplemented::unimplemented_method
        ),
        scenario!(
            "unimplemented-server-streaming-method",
            Unimplemented,
            [],
            unimplemented::unimplemented_server_streaming_method
        ),
        scenario!(
            "unimplemented-service",
            Unimplemented,
            [],
            unimplemented::unimplemented_service
        ),
        scenario!(
            "unimplemented-server-streaming-service",
            Unimplemented,
            [],
            unimplemented::unimplemented_server_streaming_service
        ),
        scenario!("fail-with-non-ascii-error", Errors, [], errors::fail_with_non_ascii_error),
        scenario!(
            "fail-server-streaming-with-non-ascii-error",
            Errors,
            [],
            errors::fail_server_streaming_with_non_ascii_error
        ),
        scenario!(
            "fail-server-streaming-after-response",
            Errors,
            [],
            errors::fail_server_streaming_after_response
        ),
        scenario!("unresolvable-host", Diagnostic, [], unary::unresolvable_host),
        scenario!("pick-first-unary", Diagnostic, [], unary::pick_first_unary),
        scenario!("soak", Diagnostic, [], soak::soak),
    ]
}

fn payload_len(payload: &Option<Payload>) -> usize {
    payload.as_ref().map_or(0, |payload| payload.body.len())
}

/// A streaming-output request asking for one response per entry of `sizes`.
fn streaming_output_request(
    sizes: &[i32],
    payload_size: Option<i32>,
) -> Result<StreamingOutputCallRequest, PayloadError> {
    Ok(StreamingOutputCallRequest {
        response_type: PayloadType::Compressable.into(),
        response_parameters: sizes
            .iter()
            .map(|size| ResponseParameters { size: *size, interval_us: 0 })
            .collect(),
        payload: payload_size.map(fixtures::compressable_payload).transpose()?,
        ..Default::default()
    })
}

fn describe<T>(received: &Result<Option<T>, Status>) -> String {
    match received {
        Ok(Some(_)) => "a response message".to_string(),
        Ok(None) => "end of stream".to_string(),
        Err(status) => format!("{:?}: {}", status.code(), status.message()),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn names_are_unique() {
        let catalogue = catalogue();
        let names: HashSet<&str> = catalogue.iter().map(|scenario| scenario.name).collect();
        assert_eq!(names.len(), catalogue.len());
    }

    #[test]
    fn every_category_is_used() {
        let catalogue = catalogue();
        for category in Category::ALL {
            assert!(catalogue.iter().any(|scenario| scenario.category == category), "{category}");
        }
    }

    #[test]
    fn categories_parse_from_their_names() {
        for category in Category::ALL {
            assert_eq!(category.as_str().parse::<Category>(), Ok(category));
        }
        assert!("bogus".parse::<Category>().is_err());
    }

    #[test]
    fn streaming_output_request_follows_sizes() {
        let request = streaming_output_request(&Sizes::CLASSIC.response, Some(8)).unwrap();
        let sizes: Vec<i32> = request.response_parameters.iter().map(|p| p.size).collect();
        assert_eq!(sizes, Sizes::CLASSIC.response);
        assert_eq!(payload_len(&request.payload), 8);
        assert!(streaming_output_request(&[1], Some(-1)).is_err());
    }
}
