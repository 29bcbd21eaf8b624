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

use std::time::Duration;

use tonic::Code;

use super::{describe, streaming_output_request, Context};
use crate::{
    check_eq,
    client::{code_of, CallOptions, SendError},
    report_error, report_fatal, report_success,
    reporter::{Fatal, Reporter},
    require_ok,
    scope::CallScope,
};

const SLEEPING_SERVER_TIMEOUT: Duration = Duration::from_secs(1);
const SLEEPING_SERVER_PAYLOAD_SIZE: i32 = 27182;
const FIRST_RESPONSE_SIZE: i32 = 31415;
const FIRST_REQUEST_SIZE: i32 = 27182;

pub(super) async fn timeout_on_sleeping_server(
    t: &mut dyn Reporter,
    ctx: &mut Context,
) -> Result<(), Fatal> {
    let scope = CallScope::with_timeout(SLEEPING_SERVER_TIMEOUT);
    let mut stream = match ctx.client.full_duplex_call(CallOptions::new().with_scope(scope)).await
    {
        Ok(stream) => stream,
        Err(status) if code_of(&status) == Code::DeadlineExceeded => {
            report_success!(t, "deadline expired while opening the stream");
            return Ok(());
        }
        Err(status) => return Err(report_fatal!(t, "couldn't open FullDuplexCall: {status}")),
    };
    let request = require_ok!(
        t,
        streaming_output_request(&[], Some(SLEEPING_SERVER_PAYLOAD_SIZE)),
        "couldn't build request"
    );
    match stream.send(request).await {
        Ok(()) => {}
        Err(SendError::EndOfStream) => {
            report_success!(t, "deadline expired before the request was sent");
            return Ok(());
        }
        Err(err) => return Err(report_fatal!(t, "couldn't send request: {err}")),
    }
    match stream.receive().await {
        Err(status) => {
            check_eq!(t, code_of(&status), Code::DeadlineExceeded, "status of the sleeping call")
        }
        other => report_error!(t, "expected DEADLINE_EXCEEDED, got {}", describe(&other)),
    }
    report_success!(t, "successful timeout on sleeping server");
    Ok(())
}

pub(super) async fn cancel_after_begin(
    t: &mut dyn Reporter,
    ctx: &mut Context,
) -> Result<(), Fatal> {
    let scope = CallScope::new();
    let stream = require_ok!(
        t,
        ctx.client.streaming_input_call(CallOptions::new().with_scope(scope.clone())).await,
        "couldn't open StreamingInputCall"
    );
    scope.cancel();
    match stream.close_and_receive().await {
        Ok(_) => report_error!(t, "StreamingInputCall succeeded after cancellation"),
        Err(status) => check_eq!(t, code_of(&status), Code::Cancelled, "status after cancel"),
    }
    report_success!(t, "successful cancel after begin");
    Ok(())
}

pub(super) async fn cancel_after_first_response(
    t: &mut dyn Reporter,
    ctx: &mut Context,
) -> Result<(), Fatal> {
    let scope = CallScope::new();
    let mut stream = require_ok!(
        t,
        ctx.client.full_duplex_call(CallOptions::new().with_scope(scope.clone())).await,
        "couldn't open FullDuplexCall"
    );
    let request = require_ok!(
        t,
        streaming_output_request(&[FIRST_RESPONSE_SIZE], Some(FIRST_REQUEST_SIZE)),
        "couldn't build request"
    );
    require_ok!(t, stream.send(request).await, "couldn't send request");
    match stream.receive().await {
        Ok(Some(_)) => {}
        other => {
            return Err(report_fatal!(t, "expected a first response, got {}", describe(&other)));
        }
    }
    scope.cancel();
    match stream.receive().await {
        Err(status) => check_eq!(t, code_of(&status), Code::Cancelled, "status after cancel"),
        other => report_error!(t, "expected CANCELLED, got {}", describe(&other)),
    }
    report_success!(t, "successful cancel after first response");
    Ok(())
}
