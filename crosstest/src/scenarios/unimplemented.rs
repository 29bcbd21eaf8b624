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

use tonic::{Code, Status};

use super::{describe, Context};
use crate::{
    check_eq,
    client::{code_of, CallOptions, Service},
    report_error, report_success,
    reporter::{Fatal, Reporter},
};

fn check_unimplemented(t: &mut dyn Reporter, result: Result<(), Status>, what: &str) {
    match result {
        Ok(()) => report_error!(t, "{what} succeeded"),
        Err(status) => check_eq!(t, code_of(&status), Code::Unimplemented, "{what} status code"),
    }
}

async fn unary(ctx: &mut Context, service: Service) -> Result<(), Status> {
    ctx.client.unimplemented_call(service, CallOptions::new()).await.map(|_| ())
}

// The status may arrive when the call opens or with the first receive.
async fn server_streaming(ctx: &mut Context, service: Service) -> Result<(), Status> {
    let mut stream =
        ctx.client.unimplemented_streaming_output_call(service, CallOptions::new()).await?;
    match stream.receive().await {
        Err(status) => Err(status),
        other => Err(Status::internal(format!("expected an error, got {}", describe(&other)))),
    }
}

pub(super) async fn unimplemented_method(
    t: &mut dyn Reporter,
    ctx: &mut Context,
) -> Result<(), Fatal> {
    check_unimplemented(t, unary(ctx, Service::Test).await, "UnimplementedCall");
    report_success!(t, "successful unimplemented method");
    Ok(())
}

pub(super) async fn unimplemented_server_streaming_method(
    t: &mut dyn Reporter,
    ctx: &mut Context,
) -> Result<(), Fatal> {
    check_unimplemented(
        t,
        server_streaming(ctx, Service::Test).await,
        "UnimplementedStreamingOutputCall",
    );
    report_success!(t, "successful unimplemented server streaming method");
    Ok(())
}

pub(super) async fn unimplemented_service(
    t: &mut dyn Reporter,
    ctx: &mut Context,
) -> Result<(), Fatal> {
    check_unimplemented(
        t,
        unary(ctx, Service::Unimplemented).await,
        "UnimplementedService.UnimplementedCall",
    );
    report_success!(t, "successful unimplemented service");
    Ok(())
}

pub(super) async fn unimplemented_server_streaming_service(
    t: &mut dyn Reporter,
    ctx: &mut Context,
) -> Result<(), Fatal> {
    check_unimplemented(
        t,
        server_streaming(ctx, Service::Unimplemented).await,
        "UnimplementedService.UnimplementedStreamingOutputCall",
    );
    report_success!(t, "successful unimplemented server streaming service");
    Ok(())
}
