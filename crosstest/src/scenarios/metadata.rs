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

//! Echo of leading and trailing metadata across every call shape.

use crosstest_proto::grpc::testing::{PayloadType, SimpleRequest};
use tonic::metadata::MetadataMap;

use super::{describe, payload_len, streaming_output_request, Context};
use crate::{
    check_eq,
    client::{decode_binary, CallOptions, InvalidAsciiValue},
    fixtures::{
        self, duplicated_leading_value, duplicated_trailing_value, LEADING_METADATA_KEY,
        LEADING_METADATA_VALUE, TRAILING_METADATA_KEY, TRAILING_METADATA_VALUE,
    },
    report_error, report_fatal, report_success,
    reporter::{Fatal, Reporter},
    require_ok,
};

/// The values a scenario sends under each echoed key.
struct EchoedValues {
    leading: Vec<String>,
    trailing: Vec<Vec<u8>>,
}

impl EchoedValues {
    fn single() -> Self {
        Self {
            leading: vec![LEADING_METADATA_VALUE.to_string()],
            trailing: vec![TRAILING_METADATA_VALUE.to_vec()],
        }
    }

    fn duplicated() -> Self {
        Self {
            leading: vec![LEADING_METADATA_VALUE.to_string(), duplicated_leading_value()],
            trailing: vec![TRAILING_METADATA_VALUE.to_vec(), duplicated_trailing_value()],
        }
    }

    fn options(&self) -> Result<CallOptions, InvalidAsciiValue> {
        let mut options = CallOptions::new();
        for value in &self.leading {
            options = options.with_ascii(LEADING_METADATA_KEY, value)?;
        }
        for value in &self.trailing {
            options = options.with_binary(TRAILING_METADATA_KEY, value);
        }
        Ok(options)
    }

    // The order of repeated values may change across a proxy, their number
    // may not.
    fn check(&self, t: &mut dyn Reporter, headers: &MetadataMap, trailers: &MetadataMap) {
        let mut leading: Vec<String> = headers
            .get_all(LEADING_METADATA_KEY)
            .iter()
            .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
            .collect();
        let mut trailing = Vec::new();
        for value in trailers.get_all_bin(TRAILING_METADATA_KEY).iter() {
            match decode_binary(value) {
                Ok(bytes) => trailing.push(bytes.to_vec()),
                Err(err) => report_error!(t, "couldn't decode {TRAILING_METADATA_KEY}: {err}"),
            }
        }
        let mut expected_leading = self.leading.clone();
        let mut expected_trailing = self.trailing.clone();
        leading.sort();
        expected_leading.sort();
        trailing.sort();
        expected_trailing.sort();
        check_eq!(t, leading, expected_leading, "values of {LEADING_METADATA_KEY}");
        check_eq!(t, trailing, expected_trailing, "values of {TRAILING_METADATA_KEY}");
    }
}

async fn echo_unary(
    t: &mut dyn Reporter,
    ctx: &mut Context,
    values: EchoedValues,
) -> Result<(), Fatal> {
    let options = require_ok!(t, values.options(), "couldn't build request metadata");
    let request = SimpleRequest {
        response_type: PayloadType::Compressable.into(),
        response_size: 1,
        payload: Some(require_ok!(t, fixtures::compressable_payload(1), "couldn't build payload")),
        ..Default::default()
    };
    let response =
        require_ok!(t, ctx.client.unary_call(request, options).await, "UnaryCall failed");
    check_eq!(t, payload_len(&response.message.payload), 1, "response payload length");
    values.check(t, &response.headers, &response.trailers);
    report_success!(t, "successful custom metadata unary");
    Ok(())
}

async fn echo_server_streaming(
    t: &mut dyn Reporter,
    ctx: &mut Context,
    values: EchoedValues,
) -> Result<(), Fatal> {
    let options = require_ok!(t, values.options(), "couldn't build request metadata");
    let request = require_ok!(t, streaming_output_request(&[1], Some(1)), "couldn't build request");
    let mut stream = require_ok!(
        t,
        ctx.client.streaming_output_call(request, options).await,
        "couldn't open StreamingOutputCall"
    );
    match stream.receive().await {
        Ok(Some(response)) => {
            check_eq!(t, payload_len(&response.payload), 1, "response payload length")
        }
        other => return Err(report_fatal!(t, "expected a response, got {}", describe(&other))),
    }
    match stream.receive().await {
        Ok(None) => {}
        other => report_error!(t, "expected end of stream, got {}", describe(&other)),
    }
    values.check(t, stream.headers(), stream.trailers());
    report_success!(t, "successful custom metadata server streaming");
    Ok(())
}

async fn echo_full_duplex(
    t: &mut dyn Reporter,
    ctx: &mut Context,
    values: EchoedValues,
) -> Result<(), Fatal> {
    let options = require_ok!(t, values.options(), "couldn't build request metadata");
    let mut stream =
        require_ok!(t, ctx.client.full_duplex_call(options).await, "couldn't open FullDuplexCall");
    let request = require_ok!(t, streaming_output_request(&[1], Some(1)), "couldn't build request");
    require_ok!(t, stream.send(request).await, "couldn't send request");
    match stream.receive().await {
        Ok(Some(response)) => {
            check_eq!(t, payload_len(&response.payload), 1, "response payload length")
        }
        other => return Err(report_fatal!(t, "expected a response, got {}", describe(&other))),
    }
    stream.close_send();
    match stream.receive().await {
        Ok(None) => {}
        other => report_error!(t, "expected end of stream, got {}", describe(&other)),
    }
    values.check(t, stream.headers(), stream.trailers());
    report_success!(t, "successful custom metadata full duplex");
    Ok(())
}

pub(super) async fn custom_metadata_unary(
    t: &mut dyn Reporter,
    ctx: &mut Context,
) -> Result<(), Fatal> {
    echo_unary(t, ctx, EchoedValues::single()).await
}

pub(super) async fn custom_metadata_server_streaming(
    t: &mut dyn Reporter,
    ctx: &mut Context,
) -> Result<(), Fatal> {
    echo_server_streaming(t, ctx, EchoedValues::single()).await
}

pub(super) async fn custom_metadata_full_duplex(
    t: &mut dyn Reporter,
    ctx: &mut Context,
) -> Result<(), Fatal> {
    echo_full_duplex(t, ctx, EchoedValues::single()).await
}

pub(super) async fn duplicated_custom_metadata_unary(
    t: &mut dyn Reporter,
    ctx: &mut Context,
) -> Result<(), Fatal> {
    echo_unary(t, ctx, EchoedValues::duplicated()).await
}

pub(super) async fn duplicated_custom_metadata_server_streaming(
    t: &mut dyn Reporter,
    ctx: &mut Context,
) -> Result<(), Fatal> {
    echo_server_streaming(t, ctx, EchoedValues::duplicated()).await
}

pub(super) async fn duplicated_custom_metadata_full_duplex(
    t: &mut dyn Reporter,
    ctx: &mut Context,
) -> Result<(), Fatal> {
    echo_full_duplex(t, ctx, EchoedValues::duplicated()).await
}
