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

//! The RPC facade the scenario catalogue is written against.
//!
//! Every method of the test service is addressed by its path through a
//! generic [`tonic::client::Grpc`], which keeps response headers and trailers
//! apart for every call shape and lets the same code reach the unimplemented
//! service. Streaming results are wrapped so that each blocking operation
//! honors the [`CallScope`] attached to the call.

use std::{error::Error as _, fmt, time::Duration};

use anyhow::Context;
use bytes::Bytes;
use crosstest_proto::grpc::testing::{
    Empty, SimpleRequest, SimpleResponse, StreamingInputCallRequest, StreamingInputCallResponse,
    StreamingOutputCallRequest, StreamingOutputCallResponse, TEST_SERVICE, UNIMPLEMENTED_SERVICE,
};
use http::uri::PathAndQuery;
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_stream::wrappers::ReceiverStream;
use tonic::{
    codec::{CompressionEncoding, ProstCodec, Streaming},
    metadata::{
        errors::{InvalidMetadataValue, InvalidMetadataValueBytes},
        AsciiMetadataValue, BinaryMetadataValue, MetadataMap, MetadataValue,
    },
    transport::{Channel, Endpoint},
    Code, Extensions, Request, Response, Status,
};

use crate::scope::{encode_grpc_timeout, CallScope, GRPC_TIMEOUT_HEADER};

// Outbound messages buffered per stream before `send` waits for the transport.
const STREAM_BUFFER: usize = 16;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    /// Compresses requests with gzip and accepts gzip responses.
    pub compression: bool,
    pub connect_timeout: Duration,
}

impl ClientConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self { host: host.into(), port, ..Default::default() }
    }

    pub fn uri(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 8080,
            compression: false,
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// The two services a scenario can address.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Service {
    Test,
    Unimplemented,
}

impl Service {
    fn name(self) -> &'static str {
        match self {
            Service::Test => TEST_SERVICE,
            Service::Unimplemented => UNIMPLEMENTED_SERVICE,
        }
    }
}

/// Per-call request metadata and scope.
#[derive(Clone, Debug, Default)]
pub struct CallOptions {
    metadata: MetadataMap,
    scope: CallScope,
}

impl CallOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_scope(mut self, scope: CallScope) -> Self {
        self.scope = scope;
        self
    }

    /// Appends an ASCII value; repeated keys keep every value in order.
    pub fn with_ascii(mut self, key: &'static str, value: &str) -> Result<Self, InvalidAsciiValue> {
        if !value.is_ascii() {
            return Err(InvalidAsciiValue::NonAscii);
        }
        let value = AsciiMetadataValue::try_from(value).map_err(InvalidAsciiValue::Invalid)?;
        self.metadata.append(key, value);
        Ok(self)
    }

    /// Appends a binary value under a key ending in `-bin`.
    pub fn with_binary(mut self, key: &'static str, value: &[u8]) -> Self {
        self.metadata.append_bin(key, encode_binary(value));
        self
    }

    fn into_request<T>(self, message: T) -> Result<(Request<T>, CallScope), Status> {
        let CallOptions { mut metadata, scope } = self;
        if let Some(remaining) = scope.remaining() {
            let timeout = encode_grpc_timeout(remaining)
                .parse()
                .map_err(|_| Status::internal("couldn't encode grpc-timeout"))?;
            metadata.insert(GRPC_TIMEOUT_HEADER, timeout);
        }
        Ok((Request::from_parts(metadata, Extensions::default(), message), scope))
    }
}

pub fn encode_binary(bytes: &[u8]) -> BinaryMetadataValue {
    MetadataValue::from_bytes(bytes)
}

pub fn decode_binary(value: &BinaryMetadataValue) -> Result<Bytes, InvalidMetadataValueBytes> {
    value.to_bytes()
}

pub fn code_of(status: &Status) -> Code {
    status.code()
}

/// The result of a call with a single response message.
#[derive(Debug)]
pub struct UnaryResponse<T> {
    pub message: T,
    pub headers: MetadataMap,
    pub trailers: MetadataMap,
}

/// Returned by [`CallOptions::with_ascii`] for values that cannot travel as
/// ASCII metadata.
#[derive(Debug)]
pub enum InvalidAsciiValue {
    /// The value has bytes outside the ASCII range.
    NonAscii,
    /// The value has ASCII control characters.
    Invalid(InvalidMetadataValue),
}

impl fmt::Display for InvalidAsciiValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvalidAsciiValue::NonAscii => f.write_str("metadata value is not ASCII"),
            InvalidAsciiValue::Invalid(err) => write!(f, "invalid metadata value: {err}"),
        }
    }
}

impl std::error::Error for InvalidAsciiValue {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            InvalidAsciiValue::NonAscii => None,
            InvalidAsciiValue::Invalid(err) => Some(err),
        }
    }
}

/// Returned by `send` once the call can no longer accept messages. The status
/// of the call is observed by the next receive.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SendError {
    /// The call has ended, or its scope was triggered.
    EndOfStream,
    /// The sending side was already closed by the caller.
    Closed,
}

impl fmt::Display for SendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SendError::EndOfStream => f.write_str("end of stream"),
            SendError::Closed => f.write_str("send side already closed"),
        }
    }
}

impl std::error::Error for SendError {}

enum StreamState<T> {
    Open(Streaming<T>),
    Finished,
    Failed(Status),
}

/// The response half shared by server streams and bidi streams.
struct Responses<T> {
    headers: MetadataMap,
    trailers: MetadataMap,
    state: StreamState<T>,
}

impl<T> Responses<T> {
    fn new(response: Response<Streaming<T>>) -> Self {
        let (headers, stream, _) = response.into_parts();
        Self { headers, trailers: MetadataMap::new(), state: StreamState::Open(stream) }
    }

    async fn receive(&mut self, scope: &CallScope) -> Result<Option<T>, Status> {
        let stream = match &mut self.state {
            StreamState::Open(stream) => stream,
            StreamState::Finished => return Ok(None),
            StreamState::Failed(status) => return Err(status.clone()),
        };
        let received = scope.guard(async { stream.message().await.map_err(normalize) }).await;
        match received {
            Ok(Some(message)) => Ok(Some(message)),
            Ok(None) => {
                let trailers =
                    scope.guard(async { stream.trailers().await.map_err(normalize) }).await;
                match trailers {
                    Ok(trailers) => {
                        self.trailers = trailers.unwrap_or_default();
                        self.state = StreamState::Finished;
                        Ok(None)
                    }
                    Err(status) => Err(self.fail(status)),
                }
            }
            Err(status) => Err(self.fail(status)),
        }
    }

    // Dropping the open stream resets it, which is how the server learns
    // about a client-side cancellation or deadline.
    fn fail(&mut self, status: Status) -> Status {
        self.state = StreamState::Failed(status.clone());
        status
    }
}

pub struct ServerStream<T> {
    responses: Responses<T>,
    scope: CallScope,
}

impl<T> ServerStream<T> {
    pub fn headers(&self) -> &MetadataMap {
        &self.responses.headers
    }

    /// Trailers of the call; empty until the stream has ended.
    pub fn trailers(&self) -> &MetadataMap {
        &self.responses.trailers
    }

    /// Returns the next message, or `None` at the end of the stream.
    pub async fn receive(&mut self) -> Result<Option<T>, Status> {
        self.responses.receive(&self.scope).await
    }
}

pub struct BidiStream<Req, Resp> {
    sender: Option<mpsc::Sender<Req>>,
    responses: Responses<Resp>,
    scope: CallScope,
}

impl<Req, Resp> BidiStream<Req, Resp> {
    pub async fn send(&mut self, message: Req) -> Result<(), SendError> {
        let sender = self.sender.as_ref().ok_or(SendError::Closed)?;
        match self.scope.guard(async { Ok(sender.send(message).await.is_ok()) }).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(SendError::EndOfStream),
            Err(status) => {
                self.sender = None;
                self.responses.fail(status);
                Err(SendError::EndOfStream)
            }
        }
    }

    /// Half-closes the call; the server observes the end of its input.
    pub fn close_send(&mut self) {
        self.sender = None;
    }

    pub async fn receive(&mut self) -> Result<Option<Resp>, Status> {
        self.responses.receive(&self.scope).await
    }

    pub fn headers(&self) -> &MetadataMap {
        &self.responses.headers
    }

    pub fn trailers(&self) -> &MetadataMap {
        &self.responses.trailers
    }
}

pub struct ClientStream<Req, Resp> {
    sender: Option<mpsc::Sender<Req>>,
    call: JoinHandle<Result<UnaryResponse<Resp>, Status>>,
    scope: CallScope,
}

impl<Req, Resp> ClientStream<Req, Resp> {
    pub async fn send(&mut self, message: Req) -> Result<(), SendError> {
        let sender = self.sender.as_ref().ok_or(SendError::Closed)?;
        match self.scope.guard(async { Ok(sender.send(message).await.is_ok()) }).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(SendError::EndOfStream),
            Err(_) => {
                self.sender = None;
                self.call.abort();
                Err(SendError::EndOfStream)
            }
        }
    }

    /// Closes the sending side and waits for the single response.
    pub async fn close_and_receive(mut self) -> Result<UnaryResponse<Resp>, Status> {
        self.sender = None;
        let call = &mut self.call;
        self.scope
            .guard(async {
                call.await
                    .map_err(|err| Status::internal(format!("client stream task failed: {err}")))?
            })
            .await
    }
}

impl<Req, Resp> Drop for ClientStream<Req, Resp> {
    fn drop(&mut self) {
        self.call.abort();
    }
}

/// A handle on one server, safe to reuse across scenarios once its previous
/// call has completed.
#[derive(Clone)]
pub struct TestClient {
    grpc: tonic::client::Grpc<Channel>,
    endpoint: Endpoint,
    compression: bool,
}

impl TestClient {
    pub async fn connect(config: &ClientConfig) -> anyhow::Result<Self> {
        let endpoint = endpoint(config)?;
        let channel = endpoint
            .connect()
            .await
            .with_context(|| format!("couldn't connect to {}", config.uri()))?;
        Ok(Self::from_channel(channel, endpoint, config.compression))
    }

    /// Creates a client that connects on first use, so that connection
    /// failures surface as call failures.
    pub fn connect_lazy(config: &ClientConfig) -> anyhow::Result<Self> {
        let endpoint = endpoint(config)?;
        let channel = endpoint.connect_lazy();
        Ok(Self::from_channel(channel, endpoint, config.compression))
    }

    /// Creates a client with a fresh connection to the same server.
    pub async fn reconnect(&self) -> anyhow::Result<Self> {
        let channel = self.endpoint.connect().await.context("couldn't reconnect")?;
        Ok(Self::from_channel(channel, self.endpoint.clone(), self.compression))
    }

    fn from_channel(channel: Channel, endpoint: Endpoint, compression: bool) -> Self {
        let mut grpc = tonic::client::Grpc::new(channel);
        if compression {
            grpc = grpc
                .send_compressed(CompressionEncoding::Gzip)
                .accept_compressed(CompressionEncoding::Gzip);
        }
        Self { grpc, endpoint, compression }
    }

    pub async fn empty_call(
        &mut self,
        options: CallOptions,
    ) -> Result<UnaryResponse<Empty>, Status> {
        self.unary(Service::Test, "EmptyCall", Empty {}, options).await
    }

    pub async fn unary_call(
        &mut self,
        request: SimpleRequest,
        options: CallOptions,
    ) -> Result<UnaryResponse<SimpleResponse>, Status> {
        self.unary(Service::Test, "UnaryCall", request, options).await
    }

    pub async fn fail_unary_call(
        &mut self,
        request: SimpleRequest,
        options: CallOptions,
    ) -> Result<UnaryResponse<SimpleResponse>, Status> {
        self.unary(Service::Test, "FailUnaryCall", request, options).await
    }

    pub async fn cacheable_unary_call(
        &mut self,
        request: SimpleRequest,
        options: CallOptions,
    ) -> Result<UnaryResponse<SimpleResponse>, Status> {
        self.unary(Service::Test, "CacheableUnaryCall", request, options).await
    }

    pub async fn streaming_output_call(
        &mut self,
        request: StreamingOutputCallRequest,
        options: CallOptions,
    ) -> Result<ServerStream<StreamingOutputCallResponse>, Status> {
        self.server_streaming(Service::Test, "StreamingOutputCall", request, options).await
    }

    pub async fn fail_streaming_output_call(
        &mut self,
        request: StreamingOutputCallRequest,
        options: CallOptions,
    ) -> Result<ServerStream<StreamingOutputCallResponse>, Status> {
        self.server_streaming(Service::Test, "FailStreamingOutputCall", request, options).await
    }

    pub async fn streaming_input_call(
        &mut self,
        options: CallOptions,
    ) -> Result<ClientStream<StreamingInputCallRequest, StreamingInputCallResponse>, Status> {
        self.client_streaming(Service::Test, "StreamingInputCall", options)
    }

    pub async fn full_duplex_call(
        &mut self,
        options: CallOptions,
    ) -> Result<BidiStream<StreamingOutputCallRequest, StreamingOutputCallResponse>, Status> {
        self.bidi_streaming(Service::Test, "FullDuplexCall", options).await
    }

    pub async fn half_duplex_call(
        &mut self,
        options: CallOptions,
    ) -> Result<BidiStream<StreamingOutputCallRequest, StreamingOutputCallResponse>, Status> {
        self.bidi_streaming(Service::Test, "HalfDuplexCall", options).await
    }

    pub async fn unimplemented_call(
        &mut self,
        service: Service,
        options: CallOptions,
    ) -> Result<UnaryResponse<Empty>, Status> {
        self.unary(service, "UnimplementedCall", Empty {}, options).await
    }

    pub async fn unimplemented_streaming_output_call(
        &mut self,
        service: Service,
        options: CallOptions,
    ) -> Result<ServerStream<Empty>, Status> {
        self.server_streaming(service, "UnimplementedStreamingOutputCall", Empty {}, options).await
    }

    // Unary calls travel as server streams, which is identical on the wire
    // and keeps the trailers separate from the headers.
    async fn unary<Req, Resp>(
        &mut self,
        service: Service,
        method: &str,
        message: Req,
        options: CallOptions,
    ) -> Result<UnaryResponse<Resp>, Status>
    where
        Req: prost::Message + Send + Sync + 'static,
        Resp: prost::Message + Default + Send + Sync + 'static,
    {
        let path = method_path(service, method)?;
        let (request, scope) = options.into_request(message)?;
        let mut grpc = self.grpc.clone();
        scope
            .guard(async move {
                ready(&mut grpc).await?;
                let response = grpc
                    .server_streaming(request, path, ProstCodec::default())
                    .await
                    .map_err(normalize)?;
                single_response(response).await
            })
            .await
    }

    async fn server_streaming<Req, Resp>(
        &mut self,
        service: Service,
        method: &str,
        message: Req,
        options: CallOptions,
    ) -> Result<ServerStream<Resp>, Status>
    where
        Req: prost::Message + Send + Sync + 'static,
        Resp: prost::Message + Default + Send + Sync + 'static,
    {
        let path = method_path(service, method)?;
        let (request, scope) = options.into_request(message)?;
        let mut grpc = self.grpc.clone();
        let response = scope
            .guard(async move {
                ready(&mut grpc).await?;
                grpc.server_streaming(request, path, ProstCodec::default()).await.map_err(normalize)
            })
            .await?;
        Ok(ServerStream { responses: Responses::new(response), scope })
    }

    // The server only answers a client stream once its input has ended, so
    // the call runs on its own task while the caller keeps sending.
    fn client_streaming<Req, Resp>(
        &mut self,
        service: Service,
        method: &str,
        options: CallOptions,
    ) -> Result<ClientStream<Req, Resp>, Status>
    where
        Req: prost::Message + Send + Sync + 'static,
        Resp: prost::Message + Default + Send + Sync + 'static,
    {
        let path = method_path(service, method)?;
        let (sender, receiver) = mpsc::channel(STREAM_BUFFER);
        let (request, scope) = options.into_request(ReceiverStream::new(receiver))?;
        let mut grpc = self.grpc.clone();
        let call = tokio::spawn(async move {
            ready(&mut grpc).await?;
            let response =
                grpc.streaming(request, path, ProstCodec::default()).await.map_err(normalize)?;
            single_response(response).await
        });
        Ok(ClientStream { sender: Some(sender), call, scope })
    }

    async fn bidi_streaming<Req, Resp>(
        &mut self,
        service: Service,
        method: &str,
        options: CallOptions,
    ) -> Result<BidiStream<Req, Resp>, Status>
    where
        Req: prost::Message + Send + Sync + 'static,
        Resp: prost::Message + Default + Send + Sync + 'static,
    {
        let path = method_path(service, method)?;
        let (sender, receiver) = mpsc::channel(STREAM_BUFFER);
        let (request, scope) = options.into_request(ReceiverStream::new(receiver))?;
        let mut grpc = self.grpc.clone();
        let response = scope
            .guard(async move {
                ready(&mut grpc).await?;
                grpc.streaming(request, path, ProstCodec::default()).await.map_err(normalize)
            })
            .await?;
        Ok(BidiStream { sender: Some(sender), responses: Responses::new(response), scope })
    }
}

fn endpoint(config: &ClientConfig) -> anyhow::Result<Endpoint> {
    Ok(Endpoint::from_shared(config.uri())
        .with_context(|| format!("invalid server address {}", config.uri()))?
        .connect_timeout(config.connect_timeout))
}

fn method_path(service: Service, method: &str) -> Result<PathAndQuery, Status> {
    PathAndQuery::try_from(format!("/{}/{}", service.name(), method))
        .map_err(|err| Status::internal(format!("invalid method path: {err}")))
}

async fn ready(grpc: &mut tonic::client::Grpc<Channel>) -> Result<(), Status> {
    grpc.ready().await.map_err(|err| Status::unavailable(format!("service was not ready: {err}")))
}

async fn single_response<T>(response: Response<Streaming<T>>) -> Result<UnaryResponse<T>, Status> {
    let (headers, mut stream, _) = response.into_parts();
    let message = stream
        .message()
        .await
        .map_err(normalize)?
        .ok_or_else(|| Status::internal("call ended without a response message"))?;
    if stream.message().await.map_err(normalize)?.is_some() {
        return Err(Status::internal("call returned more than one response message"));
    }
    let trailers = stream.trailers().await.map_err(normalize)?.unwrap_or_default();
    Ok(UnaryResponse { message, headers, trailers })
}

/// Reports connection failures as UNAVAILABLE even when the transport
/// surfaced them as UNKNOWN.
fn normalize(status: Status) -> Status {
    if status.code() != Code::Unknown {
        return status;
    }
    let mut source = status.source();
    while let Some(err) = source {
        if err.is::<tonic::transport::Error>() || err.is::<std::io::Error>() {
            return Status::unavailable(status.message().to_string());
        }
        source = err.source();
    }
    status
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binary_metadata_round_trips() {
        for value in [&b""[..], b"\x0a\x0b\x0a\x0b\x0a\x0b", b"\x00\xff\xfe", b"plain"] {
            assert_eq!(
                decode_binary(&encode_binary(value)).unwrap(),
                Bytes::copy_from_slice(value)
            );
        }
    }

    #[test]
    fn repeated_keys_keep_every_value() {
        let options = CallOptions::new()
            .with_ascii("x-grpc-test-echo-initial", "first")
            .unwrap()
            .with_ascii("x-grpc-test-echo-initial", "second")
            .unwrap()
            .with_binary("x-grpc-test-echo-trailing-bin", b"\x01");
        let values: Vec<&str> = options
            .metadata
            .get_all("x-grpc-test-echo-initial")
            .iter()
            .map(|value| value.to_str().unwrap())
            .collect();
        assert_eq!(values, vec!["first", "second"]);
        assert_eq!(options.metadata.get_all_bin("x-grpc-test-echo-trailing-bin").iter().count(), 1);
    }

    #[test]
    fn non_ascii_header_values_are_rejected() {
        let result = CallOptions::new().with_ascii("x-grpc-test-echo-initial", "soirée");
        assert!(matches!(result, Err(InvalidAsciiValue::NonAscii)));
        let result = CallOptions::new().with_ascii("x-grpc-test-echo-initial", "line\nbreak");
        assert!(matches!(result, Err(InvalidAsciiValue::Invalid(_))));
    }

    #[tokio::test]
    async fn scoped_requests_carry_a_timeout() {
        let options =
            CallOptions::new().with_scope(CallScope::with_timeout(Duration::from_secs(1)));
        let (request, _) = options.into_request(Empty {}).unwrap();
        let timeout = request.metadata().get(GRPC_TIMEOUT_HEADER).unwrap().to_str().unwrap();
        let timeout = crate::scope::parse_grpc_timeout(timeout).unwrap();
        assert!(timeout <= Duration::from_secs(1) && timeout > Duration::from_millis(900));
    }

    #[test]
    fn method_paths_name_the_service() {
        assert_eq!(
            method_path(Service::Unimplemented, "UnimplementedCall").unwrap().as_str(),
            "/grpc.testing.UnimplementedService/UnimplementedCall"
        );
    }

    #[test]
    fn transport_failures_become_unavailable() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let status = Status::from_error(Box::new(io));
        assert_eq!(normalize(status).code(), Code::Unavailable);
        assert_eq!(normalize(Status::unknown("application error")).code(), Code::Unknown);
    }

    #[tokio::test]
    async fn unresolvable_hosts_are_unavailable() {
        let config = ClientConfig::new(crate::fixtures::UNRESOLVABLE_HOST, 80);
        let mut client = TestClient::connect_lazy(&config).unwrap();
        let status = client.empty_call(CallOptions::new()).await.unwrap_err();
        assert_eq!(status.code(), Code::Unavailable, "{status:?}");
    }
}
