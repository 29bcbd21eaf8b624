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

//! A conforming implementation of `grpc.testing.TestService`.

pub mod echo_trailers;

use std::{pin::Pin, time::Duration};

use anyhow::Context;
use crosstest::{
    fixtures::{
        error_detail, new_payload, status_with_detail, PayloadError, LEADING_METADATA_KEY,
        NON_ASCII_ERROR_MESSAGE, TRAILING_METADATA_KEY,
    },
    scope::CallScope,
};
use crosstest_proto::grpc::testing::{
    test_service_server::{TestService, TestServiceServer},
    EchoStatus, Empty, ResponseParameters, SimpleRequest, SimpleResponse,
    StreamingInputCallRequest, StreamingInputCallResponse, StreamingOutputCallRequest,
    StreamingOutputCallResponse, TEST_SERVICE,
};
use tokio::net::TcpListener;
use tokio_stream::{wrappers::TcpListenerStream, Stream};
use tonic::{
    codec::CompressionEncoding,
    metadata::{Ascii, Binary, MetadataMap, MetadataValue},
    Code, Request, Response, Status, Streaming,
};

use crate::echo_trailers::{EchoTrailersLayer, PendingTrailers};

type ResponseStream<T> = Pin<Box<dyn Stream<Item = Result<T, Status>> + Send + 'static>>;

pub struct TestServer {
    server_id: String,
    hostname: String,
}

impl TestServer {
    pub fn new(server_id: impl Into<String>) -> Self {
        let hostname = std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string());
        Self { server_id: server_id.into(), hostname }
    }

    fn simple_response(&self, request: &SimpleRequest) -> Result<SimpleResponse, Status> {
        let payload = new_payload(request.response_type, request.response_size)?;
        let mut response = SimpleResponse { payload: Some(payload), ..Default::default() };
        if request.fill_server_id {
            response.server_id = self.server_id.clone();
            response.hostname = self.hostname.clone();
        }
        Ok(response)
    }
}

/// The echo metadata found on a request, to be returned on its response.
struct Echo {
    leading: Vec<MetadataValue<Ascii>>,
    trailing: Vec<MetadataValue<Binary>>,
}

impl Echo {
    fn from_metadata(metadata: &MetadataMap) -> Self {
        Self {
            leading: metadata.get_all(LEADING_METADATA_KEY).iter().cloned().collect(),
            // Decoded and encoded again rather than forwarded verbatim.
            trailing: metadata
                .get_all_bin(TRAILING_METADATA_KEY)
                .iter()
                .filter_map(|value| value.to_bytes().ok())
                .map(|bytes| MetadataValue::from_bytes(&bytes))
                .collect(),
        }
    }

    fn append_leading(&self, metadata: &mut MetadataMap) {
        for value in &self.leading {
            metadata.append(LEADING_METADATA_KEY, value.clone());
        }
    }

    fn append_trailing(&self, metadata: &mut MetadataMap) {
        for value in &self.trailing {
            metadata.append_bin(TRAILING_METADATA_KEY, value.clone());
        }
    }

    fn respond<T>(&self, message: T) -> Response<T> {
        let mut response = Response::new(message);
        self.append_leading(response.metadata_mut());
        if !self.trailing.is_empty() {
            let mut trailers = MetadataMap::new();
            self.append_trailing(&mut trailers);
            response.extensions_mut().insert(PendingTrailers(trailers.into_headers()));
        }
        response
    }

    /// Attaches the echoes to a status that ends the call before any
    /// response.
    fn fail(&self, mut status: Status) -> Status {
        self.append_leading(status.metadata_mut());
        self.append_trailing(status.metadata_mut());
        status
    }
}

fn echo_status(status: Option<&EchoStatus>) -> Option<Status> {
    status
        .filter(|status| status.code != 0)
        .map(|status| Status::new(Code::from_i32(status.code), status.message.clone()))
}

fn fail_status() -> Status {
    status_with_detail(Code::ResourceExhausted, NON_ASCII_ERROR_MESSAGE, &error_detail())
        .unwrap_or_else(|err| Status::internal(format!("couldn't attach error detail: {err}")))
}

// Rejects requests that could not be answered in full, before anything is
// sent.
fn check_parameters(response_type: i32, parameters: &[ResponseParameters]) -> Result<(), Status> {
    new_payload(response_type, 0)?;
    for parameter in parameters {
        if parameter.size < 0 {
            return Err(PayloadError::NegativeSize(parameter.size).into());
        }
        if parameter.interval_us < 0 {
            return Err(Status::invalid_argument(format!(
                "requested a negative interval: {}",
                parameter.interval_us
            )));
        }
    }
    Ok(())
}

fn interval(parameter: &ResponseParameters) -> Duration {
    Duration::from_micros(u64::try_from(parameter.interval_us).unwrap_or_default())
}

/// One response per parameter, in order, then `then` if it is set.
fn output_stream(
    scope: CallScope,
    response_type: i32,
    parameters: Vec<ResponseParameters>,
    then: Option<Status>,
) -> ResponseStream<StreamingOutputCallResponse> {
    Box::pin(async_stream::try_stream! {
        check_parameters(response_type, &parameters)?;
        for parameter in parameters {
            scope.sleep(interval(&parameter)).await?;
            let payload = new_payload(response_type, parameter.size)?;
            yield StreamingOutputCallResponse { payload: Some(payload) };
        }
        if let Some(status) = then {
            Err::<(), _>(status)?;
        }
    })
}

fn output_stream_for(
    scope: &CallScope,
    request: StreamingOutputCallRequest,
) -> ResponseStream<StreamingOutputCallResponse> {
    let then = echo_status(request.response_status.as_ref());
    output_stream(scope.clone(), request.response_type, request.response_parameters, then)
}

#[tonic::async_trait]
impl TestService for TestServer {
    type StreamingOutputCallStream = ResponseStream<StreamingOutputCallResponse>;
    type FailStreamingOutputCallStream = ResponseStream<StreamingOutputCallResponse>;
    type FullDuplexCallStream = ResponseStream<StreamingOutputCallResponse>;
    type HalfDuplexCallStream = ResponseStream<StreamingOutputCallResponse>;
    type UnimplementedStreamingOutputCallStream = ResponseStream<Empty>;

    async fn empty_call(&self, _request: Request<Empty>) -> Result<Response<Empty>, Status> {
        Ok(Response::new(Empty {}))
    }

    async fn unary_call(
        &self,
        request: Request<SimpleRequest>,
    ) -> Result<Response<SimpleResponse>, Status> {
        let echo = Echo::from_metadata(request.metadata());
        let request = request.into_inner();
        if let Some(status) = echo_status(request.response_status.as_ref()) {
            return Err(echo.fail(status));
        }
        let response = self.simple_response(&request).map_err(|status| echo.fail(status))?;
        Ok(echo.respond(response))
    }

    async fn fail_unary_call(
        &self,
        _request: Request<SimpleRequest>,
    ) -> Result<Response<SimpleResponse>, Status> {
        Err(fail_status())
    }

    async fn cacheable_unary_call(
        &self,
        request: Request<SimpleRequest>,
    ) -> Result<Response<SimpleResponse>, Status> {
        self.unary_call(request).await
    }

    async fn streaming_output_call(
        &self,
        request: Request<StreamingOutputCallRequest>,
    ) -> Result<Response<Self::StreamingOutputCallStream>, Status> {
        let scope = CallScope::from_metadata(request.metadata());
        let echo = Echo::from_metadata(request.metadata());
        let request = request.into_inner();
        check_parameters(request.response_type, &request.response_parameters)
            .map_err(|status| echo.fail(status))?;
        Ok(echo.respond(output_stream_for(&scope, request)))
    }

    async fn fail_streaming_output_call(
        &self,
        request: Request<StreamingOutputCallRequest>,
    ) -> Result<Response<Self::FailStreamingOutputCallStream>, Status> {
        let scope = CallScope::from_metadata(request.metadata());
        let request = request.into_inner();
        check_parameters(request.response_type, &request.response_parameters)?;
        Ok(Response::new(output_stream(
            scope,
            request.response_type,
            request.response_parameters,
            Some(fail_status()),
        )))
    }

    async fn streaming_input_call(
        &self,
        request: Request<Streaming<StreamingInputCallRequest>>,
    ) -> Result<Response<StreamingInputCallResponse>, Status> {
        let scope = CallScope::from_metadata(request.metadata());
        let mut requests = request.into_inner();
        let mut total = 0usize;
        while let Some(request) = scope.guard(requests.message()).await? {
            total += request.payload.map_or(0, |payload| payload.body.len());
        }
        let aggregated_payload_size = i32::try_from(total)
            .map_err(|_| Status::invalid_argument(format!("aggregated size {total} overflows")))?;
        Ok(Response::new(StreamingInputCallResponse { aggregated_payload_size }))
    }

    async fn full_duplex_call(
        &self,
        request: Request<Streaming<StreamingOutputCallRequest>>,
    ) -> Result<Response<Self::FullDuplexCallStream>, Status> {
        let scope = CallScope::from_metadata(request.metadata());
        let echo = Echo::from_metadata(request.metadata());
        let mut requests = request.into_inner();
        let responses = async_stream::try_stream! {
            while let Some(request) = scope.guard(requests.message()).await? {
                for await response in output_stream_for(&scope, request) {
                    yield response?;
                }
            }
        };
        Ok(echo.respond(Box::pin(responses) as Self::FullDuplexCallStream))
    }

    async fn half_duplex_call(
        &self,
        request: Request<Streaming<StreamingOutputCallRequest>>,
    ) -> Result<Response<Self::HalfDuplexCallStream>, Status> {
        let scope = CallScope::from_metadata(request.metadata());
        let echo = Echo::from_metadata(request.metadata());
        let mut requests = request.into_inner();
        let responses = async_stream::try_stream! {
            let mut buffered = Vec::new();
            while let Some(request) = scope.guard(requests.message()).await? {
                buffered.push(request);
            }
            log::debug!("half duplex call buffered {} requests", buffered.len());
            for request in buffered {
                for await response in output_stream_for(&scope, request) {
                    yield response?;
                }
            }
        };
        Ok(echo.respond(Box::pin(responses) as Self::HalfDuplexCallStream))
    }

    async fn unimplemented_call(
        &self,
        _request: Request<Empty>,
    ) -> Result<Response<Empty>, Status> {
        Err(Status::unimplemented("UnimplementedCall is not implemented"))
    }

    async fn unimplemented_streaming_output_call(
        &self,
        _request: Request<Empty>,
    ) -> Result<Response<Self::UnimplementedStreamingOutputCallStream>, Status> {
        Err(Status::unimplemented("UnimplementedStreamingOutputCall is not implemented"))
    }
}

/// Serves `server` on `listener` until the listener fails. Only the test
/// service is registered, so calls to any other service are unimplemented.
pub async fn serve(listener: TcpListener, server: TestServer) -> anyhow::Result<()> {
    log::info!("serving {TEST_SERVICE} on {:?}", listener.local_addr());
    tonic::transport::Server::builder()
        .layer(EchoTrailersLayer)
        .add_service(
            TestServiceServer::new(server)
                .accept_compressed(CompressionEncoding::Gzip)
                .send_compressed(CompressionEncoding::Gzip),
        )
        .serve_with_incoming(TcpListenerStream::new(listener))
        .await
        .context("failed to serve the test service")
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use crosstest::fixtures;
    use crosstest_proto::grpc::testing::PayloadType;

    use super::*;

    fn parameters(sizes: &[i32]) -> Vec<ResponseParameters> {
        sizes.iter().map(|size| ResponseParameters { size: *size, interval_us: 0 }).collect()
    }

    #[test]
    fn zero_echo_status_is_no_instruction() {
        assert!(echo_status(None).is_none());
        assert!(echo_status(Some(&EchoStatus { code: 0, message: "ignored".into() })).is_none());
        let status = echo_status(Some(&EchoStatus { code: 2, message: "boom".into() })).unwrap();
        assert_eq!(status.code(), Code::Unknown);
        assert_eq!(status.message(), "boom");
    }

    #[test]
    fn invalid_parameters_are_rejected() {
        let compressable = PayloadType::Compressable.into();
        assert!(check_parameters(compressable, &parameters(&[1, 0, 5])).is_ok());
        assert_matches!(
            check_parameters(compressable, &parameters(&[1, -1])),
            Err(status) if status.code() == Code::InvalidArgument
        );
        assert_matches!(
            check_parameters(42, &parameters(&[1])),
            Err(status) if status.code() == Code::InvalidArgument
        );
    }

    #[test]
    fn fail_status_carries_one_error_detail() {
        let status = fail_status();
        assert_eq!(status.code(), Code::ResourceExhausted);
        assert_eq!(status.message(), NON_ASCII_ERROR_MESSAGE);
        let details = fixtures::error_details(&status).unwrap();
        assert_eq!(details.len(), 1);
        assert_eq!(fixtures::decode_error_detail(&details[0]).unwrap(), error_detail());
    }

    #[test]
    fn echoes_are_read_from_request_metadata() {
        let mut metadata = MetadataMap::new();
        metadata.append(LEADING_METADATA_KEY, MetadataValue::from_static("a"));
        metadata.append(LEADING_METADATA_KEY, MetadataValue::from_static("b"));
        metadata.append_bin(TRAILING_METADATA_KEY, MetadataValue::from_bytes(&[1, 2, 3]));
        let echo = Echo::from_metadata(&metadata);

        let response = echo.respond(());

        let leading: Vec<_> = response.metadata().get_all(LEADING_METADATA_KEY).iter().collect();
        assert_eq!(leading, vec!["a", "b"]);
        let trailers = &response.extensions().get::<PendingTrailers>().unwrap().0;
        assert_eq!(trailers.get(TRAILING_METADATA_KEY).unwrap(), "AQID");
    }

    #[tokio::test]
    async fn output_stream_ends_with_the_requested_status() {
        use tokio_stream::StreamExt;

        let mut stream = output_stream(
            CallScope::new(),
            PayloadType::Compressable.into(),
            parameters(&[3, 0]),
            Some(Status::aborted("done")),
        );
        assert_eq!(stream.next().await.unwrap().unwrap().payload.unwrap().body.len(), 3);
        assert_eq!(stream.next().await.unwrap().unwrap().payload.unwrap().body.len(), 0);
        assert_matches!(stream.next().await, Some(Err(status)) if status.code() == Code::Aborted);
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn output_stream_stops_once_the_scope_is_cancelled() {
        use tokio_stream::StreamExt;

        let scope = CallScope::new();
        let mut stream = output_stream(
            scope.clone(),
            PayloadType::Compressable.into(),
            parameters(&[1, 1]),
            None,
        );
        assert!(stream.next().await.unwrap().is_ok());
        scope.cancel();
        assert_matches!(stream.next().await, Some(Err(status)) if status.code() == Code::Cancelled);
    }
}
