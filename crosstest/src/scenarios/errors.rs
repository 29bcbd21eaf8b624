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

//! The `Fail*` methods, whose errors carry a non-ASCII message and a typed
//! detail.

use crosstest_proto::grpc::testing::{PayloadType, SimpleRequest, ERROR_DETAIL_TYPE_URL};
use tonic::{Code, Status};

use super::{describe, payload_len, streaming_output_request, Context};
use crate::{
    check_eq,
    client::{code_of, CallOptions},
    fixtures::{decode_error_detail, error_detail, error_details, NON_ASCII_ERROR_MESSAGE},
    report_error, report_fatal, report_success,
    reporter::{Fatal, Reporter},
    require_ok,
};

// Responses requested before FailStreamingOutputCall fails.
const RESPONSES_BEFORE_FAILURE: usize = 4;

fn check_fail_status(t: &mut dyn Reporter, status: &Status) {
    check_eq!(t, code_of(status), Code::ResourceExhausted, "status code");
    check_eq!(t, status.message(), NON_ASCII_ERROR_MESSAGE, "status message");
    let details = match error_details(status) {
        Ok(details) => details,
        Err(err) => {
            report_error!(t, "couldn't decode error details: {err}");
            return;
        }
    };
    check_eq!(t, details.len(), 1, "number of error details");
    if let Some(any) = details.first() {
        check_eq!(t, any.type_url.as_str(), ERROR_DETAIL_TYPE_URL, "error detail type");
        match decode_error_detail(any) {
            Ok(detail) => check_eq!(t, detail, error_detail(), "error detail"),
            Err(err) => report_error!(t, "couldn't decode error detail: {err}"),
        }
    }
}

pub(super) async fn fail_with_non_ascii_error(
    t: &mut dyn Reporter,
    ctx: &mut Context,
) -> Result<(), Fatal> {
    let request =
        SimpleRequest { response_type: PayloadType::Compressable.into(), ..Default::default() };
    match ctx.client.fail_unary_call(request, CallOptions::new()).await {
        Ok(_) => report_error!(t, "FailUnaryCall succeeded"),
        Err(status) => check_fail_status(t, &status),
    }
    report_success!(t, "successful fail call with non-ASCII error");
    Ok(())
}

pub(super) async fn fail_server_streaming_with_non_ascii_error(
    t: &mut dyn Reporter,
    ctx: &mut Context,
) -> Result<(), Fatal> {
    let request = require_ok!(t, streaming_output_request(&[], None), "couldn't build request");
    match ctx.client.fail_streaming_output_call(request, CallOptions::new()).await {
        // Servers may fail before or after sending response headers.
        Err(status) => check_fail_status(t, &status),
        Ok(mut stream) => loop {
            match stream.receive().await {
                Ok(Some(_)) => continue,
                Err(status) => {
                    check_fail_status(t, &status);
                    break;
                }
                Ok(None) => {
                    report_error!(t, "FailStreamingOutputCall ended without an error");
                    break;
                }
            }
        },
    }
    report_success!(t, "successful fail server streaming with non-ASCII error");
    Ok(())
}

pub(super) async fn fail_server_streaming_after_response(
    t: &mut dyn Reporter,
    ctx: &mut Context,
) -> Result<(), Fatal> {
    let sizes = ctx.sizes.response;
    let request = require_ok!(
        t,
        streaming_output_request(&sizes[..RESPONSES_BEFORE_FAILURE], None),
        "couldn't build request"
    );
    let mut stream = require_ok!(
        t,
        ctx.client.fail_streaming_output_call(request, CallOptions::new()).await,
        "couldn't open FailStreamingOutputCall"
    );
    for (index, size) in sizes.iter().take(RESPONSES_BEFORE_FAILURE).enumerate() {
        match stream.receive().await {
            Ok(Some(response)) => check_eq!(
                t,
                payload_len(&response.payload),
                *size as usize,
                "length of response {index}"
            ),
            other => {
                return Err(report_fatal!(
                    t,
                    "expected response {index}, got {}",
                    describe(&other)
                ));
            }
        }
    }
    match stream.receive().await {
        Err(status) => check_fail_status(t, &status),
        other => report_error!(t, "expected the call to fail, got {}", describe(&other)),
    }
    report_success!(t, "successful fail server streaming after response");
    Ok(())
}
