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

use crosstest_proto::grpc::testing::StreamingInputCallRequest;

use super::{describe, payload_len, streaming_output_request, Context};
use crate::{
    check_eq,
    client::CallOptions,
    fixtures, report_error, report_fatal, report_success,
    reporter::{Fatal, Reporter},
    require_ok,
};

pub(super) async fn client_streaming(t: &mut dyn Reporter, ctx: &mut Context) -> Result<(), Fatal> {
    let sizes = ctx.sizes;
    let mut stream = require_ok!(
        t,
        ctx.client.streaming_input_call(CallOptions::new()).await,
        "couldn't open StreamingInputCall"
    );
    let mut sum = 0;
    for size in sizes.request {
        let payload =
            require_ok!(t, fixtures::compressable_payload(size), "couldn't build payload");
        require_ok!(
            t,
            stream.send(StreamingInputCallRequest { payload: Some(payload) }).await,
            "couldn't send a {size} byte payload"
        );
        sum += size;
    }
    let response = require_ok!(t, stream.close_and_receive().await, "StreamingInputCall failed");
    check_eq!(t, response.message.aggregated_payload_size, sum, "aggregated payload size");
    report_success!(t, "successful client streaming");
    Ok(())
}

pub(super) async fn server_streaming(t: &mut dyn Reporter, ctx: &mut Context) -> Result<(), Fatal> {
    let expected = ctx.sizes.response;
    let request =
        require_ok!(t, streaming_output_request(&expected, None), "couldn't build request");
    let mut stream = require_ok!(
        t,
        ctx.client.streaming_output_call(request, CallOptions::new()).await,
        "couldn't open StreamingOutputCall"
    );
    let mut received = 0;
    loop {
        match stream.receive().await {
            Ok(Some(response)) => {
                if let Some(size) = expected.get(received) {
                    check_eq!(
                        t,
                        payload_len(&response.payload),
                        *size as usize,
                        "length of response {received}"
                    );
                }
                received += 1;
            }
            Ok(None) => break,
            Err(status) => {
                return Err(report_fatal!(
                    t,
                    "StreamingOutputCall failed after {received} responses: {status}"
                ));
            }
        }
    }
    check_eq!(t, received, expected.len(), "number of responses");
    report_success!(t, "successful server streaming");
    Ok(())
}

pub(super) async fn ping_pong(t: &mut dyn Reporter, ctx: &mut Context) -> Result<(), Fatal> {
    let sizes = ctx.sizes;
    let mut stream = require_ok!(
        t,
        ctx.client.full_duplex_call(CallOptions::new()).await,
        "couldn't open FullDuplexCall"
    );
    for (index, (request_size, response_size)) in
        sizes.request.into_iter().zip(sizes.response).enumerate()
    {
        let request = require_ok!(
            t,
            streaming_output_request(&[response_size], Some(request_size)),
            "couldn't build request {index}"
        );
        require_ok!(t, stream.send(request).await, "couldn't send request {index}");
        let response = match stream.receive().await {
            Ok(Some(response)) => response,
            other => {
                return Err(report_fatal!(
                    t,
                    "expected response {index}, got {}",
                    describe(&other)
                ));
            }
        };
        check_eq!(
            t,
            payload_len(&response.payload),
            response_size as usize,
            "length of response {index}"
        );
    }
    stream.close_send();
    match stream.receive().await {
        Ok(None) => {}
        other => report_error!(t, "expected end of stream, got {}", describe(&other)),
    }
    report_success!(t, "successful ping pong");
    Ok(())
}

pub(super) async fn empty_stream(t: &mut dyn Reporter, ctx: &mut Context) -> Result<(), Fatal> {
    let mut stream = require_ok!(
        t,
        ctx.client.full_duplex_call(CallOptions::new()).await,
        "couldn't open FullDuplexCall"
    );
    stream.close_send();
    match stream.receive().await {
        Ok(None) => {}
        other => report_error!(t, "expected end of stream, got {}", describe(&other)),
    }
    report_success!(t, "successful empty stream");
    Ok(())
}

pub(super) async fn half_duplex(t: &mut dyn Reporter, ctx: &mut Context) -> Result<(), Fatal> {
    let sizes = ctx.sizes;
    let mut stream = require_ok!(
        t,
        ctx.client.half_duplex_call(CallOptions::new()).await,
        "couldn't open HalfDuplexCall"
    );
    for (index, (request_size, response_size)) in
        sizes.request.into_iter().zip(sizes.response).enumerate()
    {
        let request = require_ok!(
            t,
            streaming_output_request(&[response_size], Some(request_size)),
            "couldn't build request {index}"
        );
        require_ok!(t, stream.send(request).await, "couldn't send request {index}");
    }
    stream.close_send();
    for (index, response_size) in sizes.response.into_iter().enumerate() {
        match stream.receive().await {
            Ok(Some(response)) => check_eq!(
                t,
                payload_len(&response.payload),
                response_size as usize,
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
        Ok(None) => {}
        other => report_error!(t, "expected end of stream, got {}", describe(&other)),
    }
    report_success!(t, "successful half duplex");
    Ok(())
}
