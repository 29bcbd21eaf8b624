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

use crosstest_proto::grpc::testing::{Empty, PayloadType, SimpleRequest};
use tonic::Code;

use super::{payload_len, Context};
use crate::{
    check_eq,
    client::{code_of, CallOptions, TestClient},
    fixtures::{self, Sizes},
    report_error, report_success,
    reporter::{Fatal, Reporter},
    require, require_ok,
    scope::CallScope,
};

const PICK_FIRST_CALLS: usize = 100;

pub(super) async fn empty_unary(t: &mut dyn Reporter, ctx: &mut Context) -> Result<(), Fatal> {
    let response =
        require_ok!(t, ctx.client.empty_call(CallOptions::new()).await, "EmptyCall failed");
    check_eq!(t, response.message, Empty {}, "EmptyCall response");
    report_success!(t, "successful empty unary");
    Ok(())
}

fn large_unary_request(sizes: Sizes) -> Result<SimpleRequest, fixtures::PayloadError> {
    Ok(SimpleRequest {
        response_type: PayloadType::Compressable.into(),
        response_size: sizes.large_response,
        payload: Some(fixtures::compressable_payload(sizes.large_request)?),
        ..Default::default()
    })
}

pub(super) async fn large_unary(t: &mut dyn Reporter, ctx: &mut Context) -> Result<(), Fatal> {
    let sizes = ctx.sizes;
    let request = require_ok!(t, large_unary_request(sizes), "couldn't build the request payload");
    let response = require_ok!(
        t,
        ctx.client.unary_call(request, CallOptions::new()).await,
        "UnaryCall failed"
    );
    let payload = response.message.payload.unwrap_or_default();
    check_eq!(t, payload.r#type, i32::from(PayloadType::Compressable), "response payload type");
    check_eq!(t, payload.body.len(), sizes.large_response as usize, "response payload length");
    report_success!(t, "successful large unary");
    Ok(())
}

/// One large unary call, with failures returned rather than reported.
pub(super) async fn large_unary_once(
    client: &mut TestClient,
    sizes: Sizes,
    scope: CallScope,
) -> anyhow::Result<()> {
    let request = large_unary_request(sizes)?;
    let response = client.unary_call(request, CallOptions::new().with_scope(scope)).await?;
    let received = payload_len(&response.message.payload);
    anyhow::ensure!(
        received == sizes.large_response as usize,
        "response payload length: got {received}, want {}",
        sizes.large_response
    );
    Ok(())
}

pub(super) async fn cacheable_unary(t: &mut dyn Reporter, ctx: &mut Context) -> Result<(), Fatal> {
    let request = SimpleRequest {
        response_type: PayloadType::Compressable.into(),
        response_size: 1,
        payload: Some(require_ok!(t, fixtures::compressable_payload(1), "couldn't build payload")),
        fill_server_id: true,
        ..Default::default()
    };
    let cacheable = require_ok!(
        t,
        ctx.client.cacheable_unary_call(request.clone(), CallOptions::new()).await,
        "CacheableUnaryCall failed"
    );
    let plain = require_ok!(
        t,
        ctx.client.unary_call(request, CallOptions::new()).await,
        "UnaryCall failed"
    );
    check_eq!(t, cacheable.message, plain.message, "CacheableUnaryCall response");
    report_success!(t, "successful cacheable unary");
    Ok(())
}

pub(super) async fn pick_first_unary(t: &mut dyn Reporter, ctx: &mut Context) -> Result<(), Fatal> {
    let request = SimpleRequest {
        response_type: PayloadType::Compressable.into(),
        response_size: 1,
        payload: Some(require_ok!(t, fixtures::compressable_payload(1), "couldn't build payload")),
        fill_server_id: true,
        ..Default::default()
    };
    let mut server_id: Option<String> = None;
    for call in 0..PICK_FIRST_CALLS {
        let response = require_ok!(
            t,
            ctx.client.unary_call(request.clone(), CallOptions::new()).await,
            "UnaryCall {call} failed"
        );
        let received = response.message.server_id;
        match &server_id {
            None => {
                require!(t, !received.is_empty(), "UnaryCall {call} returned an empty server id");
                server_id = Some(received);
            }
            Some(first) => check_eq!(t, &received, first, "server id of UnaryCall {call}"),
        }
    }
    report_success!(t, "all {PICK_FIRST_CALLS} calls reached the same server");
    Ok(())
}

pub(super) async fn unresolvable_host(
    t: &mut dyn Reporter,
    ctx: &mut Context,
) -> Result<(), Fatal> {
    let mut client = require_ok!(
        t,
        TestClient::connect_lazy(&ctx.unresolvable),
        "couldn't create a client for {}",
        ctx.unresolvable.uri()
    );
    match client.empty_call(CallOptions::new()).await {
        Ok(_) => report_error!(t, "EmptyCall to {} succeeded", ctx.unresolvable.uri()),
        Err(status) => {
            check_eq!(t, code_of(&status), Code::Unavailable, "EmptyCall to an unresolvable host")
        }
    }
    report_success!(t, "unresolvable host failed with UNAVAILABLE");
    Ok(())
}
