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

use crosstest_proto::grpc::testing::{EchoStatus, PayloadType, SimpleRequest};
use tonic::{Code, Status};

use super::{describe, streaming_output_request, Context};
use crate::{
    check_eq,
    client::{code_of, CallOptions},
    fixtures::{SPECIAL_STATUS_MESSAGE, STATUS_MESSAGE},
    report_error, report_success,
    reporter::{Fatal, Reporter},
    require_ok,
};

fn echo_status(message: &str) -> EchoStatus {
    EchoStatus { code: Code::Unknown.into(), message: message.to_string() }
}

fn check_status(t: &mut dyn Reporter, status: &Status, message: &str) {
    check_eq!(t, code_of(status), Code::Unknown, "status code");
    check_eq!(t, status.message(), message, "status message");
}

async fn unary_with_status(
    t: &mut dyn Reporter,
    ctx: &mut Context,
    message: &str,
) -> Result<(), Fatal> {
    let request = SimpleRequest {
        response_type: PayloadType::Compressable.into(),
        response_size: 1,
        response_status: Some(echo_status(message)),
        ..Default::default()
    };
    match ctx.client.unary_call(request, CallOptions::new()).await {
        Ok(_) => report_error!(t, "UnaryCall succeeded despite the requested status"),
        Err(status) => check_status(t, &status, message),
    }
    Ok(())
}

pub(super) async fn status_code_and_message_unary(
    t: &mut dyn Reporter,
    ctx: &mut Context,
) -> Result<(), Fatal> {
    unary_with_status(t, ctx, STATUS_MESSAGE).await?;
    report_success!(t, "successful status code and message unary");
    Ok(())
}

pub(super) async fn status_code_and_message_full_duplex(
    t: &mut dyn Reporter,
    ctx: &mut Context,
) -> Result<(), Fatal> {
    let mut stream = require_ok!(
        t,
        ctx.client.full_duplex_call(CallOptions::new()).await,
        "couldn't open FullDuplexCall"
    );
    let mut request =
        require_ok!(t, streaming_output_request(&[1], None), "couldn't build request");
    request.response_status = Some(echo_status(STATUS_MESSAGE));
    require_ok!(t, stream.send(request).await, "couldn't send request");
    stream.close_send();
    // Responses produced before the status are allowed; the status must follow.
    loop {
        match stream.receive().await {
            Ok(Some(_)) => continue,
            Err(status) => {
                check_status(t, &status, STATUS_MESSAGE);
                break;
            }
            other => {
                report_error!(t, "expected the requested status, got {}", describe(&other));
                break;
            }
        }
    }
    report_success!(t, "successful status code and message full duplex");
    Ok(())
}

pub(super) async fn special_status_message(
    t: &mut dyn Reporter,
    ctx: &mut Context,
) -> Result<(), Fatal> {
    unary_with_status(t, ctx, SPECIAL_STATUS_MESSAGE).await?;
    report_success!(t, "successful special status message");
    Ok(())
}
