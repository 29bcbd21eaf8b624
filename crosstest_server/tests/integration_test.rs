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

use std::{sync::Once, time::Duration};

use assert_matches::assert_matches;
use crosstest::{
    client::{decode_binary, CallOptions, ClientConfig, SendError, Service, TestClient},
    fixtures::{
        self, compressable_payload, error_detail, Sizes, LEADING_METADATA_KEY,
        LEADING_METADATA_VALUE, NON_ASCII_ERROR_MESSAGE, SPECIAL_STATUS_MESSAGE,
        TRAILING_METADATA_KEY, TRAILING_METADATA_VALUE,
    },
    harness::{self, HarnessConfig, Selection, Summary},
    reporter::{EventKind, InProcessReporter},
    scenarios::{catalogue, SoakConfig},
    scope::CallScope,
};
use crosstest_proto::grpc::testing::{
    EchoStatus, Payload, PayloadType, ResponseParameters, SimpleRequest, StreamingInputCallRequest,
    StreamingOutputCallRequest,
};
use crosstest_server::{serve, TestServer};
use tokio::{net::TcpListener, task::JoinHandle};
use tonic::Code;

static INIT_LOGGING: Once = Once::new();

fn init_logging() {
    INIT_LOGGING.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}

struct TestServerHandle {
    config: ClientConfig,
    handle: JoinHandle<anyhow::Result<()>>,
}

impl TestServerHandle {
    async fn start() -> Self {
        init_logging();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(serve(listener, TestServer::new("integration-test")));
        Self { config: ClientConfig::new(addr.ip().to_string(), addr.port()), handle }
    }

    async fn client(&self) -> TestClient {
        TestClient::connect(&self.config).await.expect("couldn't connect to the test server")
    }
}

impl Drop for TestServerHandle {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn output_request(response_sizes: &[i32], payload_size: Option<i32>) -> StreamingOutputCallRequest {
    StreamingOutputCallRequest {
        response_type: PayloadType::Compressable.into(),
        response_parameters: response_sizes
            .iter()
            .map(|size| ResponseParameters { size: *size, interval_us: 0 })
            .collect(),
        payload: payload_size.map(|size| compressable_payload(size).unwrap()),
        ..Default::default()
    }
}

fn body_len(payload: &Option<Payload>) -> usize {
    payload.as_ref().map_or(0, |payload| payload.body.len())
}

#[tokio::test]
async fn large_unary_returns_the_requested_payload() {
    let server = TestServerHandle::start().await;
    let mut client = server.client().await;

    let response = client
        .unary_call(
            SimpleRequest {
                response_type: PayloadType::Compressable.into(),
                response_size: 314159,
                payload: Some(compressable_payload(271828).unwrap()),
                ..Default::default()
            },
            CallOptions::new(),
        )
        .await
        .unwrap();

    let payload = response.message.payload.unwrap();
    assert_eq!(payload.r#type, i32::from(PayloadType::Compressable));
    assert_eq!(payload.body.len(), 314159);
}

#[tokio::test]
async fn ping_pong_answers_each_request_in_turn() {
    let server = TestServerHandle::start().await;
    let mut client = server.client().await;
    let sizes = Sizes::CLASSIC;

    let mut stream = client.full_duplex_call(CallOptions::new()).await.unwrap();
    for (request_size, response_size) in sizes.request.iter().zip(sizes.response) {
        stream.send(output_request(&[response_size], Some(*request_size))).await.unwrap();
        let response = stream.receive().await.unwrap().unwrap();
        assert_eq!(response.payload.unwrap().body.len(), response_size as usize);
    }
    stream.close_send();

    assert_matches!(stream.receive().await, Ok(None));
}

#[tokio::test]
async fn special_status_message_round_trips() {
    let server = TestServerHandle::start().await;
    let mut client = server.client().await;

    let status = client
        .unary_call(
            SimpleRequest {
                response_type: PayloadType::Compressable.into(),
                response_status: Some(EchoStatus {
                    code: Code::Unknown.into(),
                    message: SPECIAL_STATUS_MESSAGE.to_string(),
                }),
                ..Default::default()
            },
            CallOptions::new(),
        )
        .await
        .unwrap_err();

    assert_eq!(status.code(), Code::Unknown);
    assert_eq!(status.message(), "\t\ntest with whitespace\r\nand Unicode BMP ☺ and non-BMP 😈\t\n");
}

#[tokio::test]
async fn fail_unary_call_carries_the_error_detail() {
    let server = TestServerHandle::start().await;
    let mut client = server.client().await;

    let status = client
        .fail_unary_call(
            SimpleRequest { response_type: PayloadType::Compressable.into(), ..Default::default() },
            CallOptions::new(),
        )
        .await
        .unwrap_err();

    assert_eq!(status.code(), Code::ResourceExhausted);
    assert_eq!(status.message(), NON_ASCII_ERROR_MESSAGE);
    let details = fixtures::error_details(&status).unwrap();
    assert_eq!(details.len(), 1);
    assert_eq!(fixtures::decode_error_detail(&details[0]).unwrap(), error_detail());
    assert_eq!(error_detail().domain, "connect-crosstest");
}

#[tokio::test]
async fn full_duplex_echoes_custom_metadata_once() {
    let server = TestServerHandle::start().await;
    let mut client = server.client().await;
    let options = CallOptions::new()
        .with_ascii(LEADING_METADATA_KEY, LEADING_METADATA_VALUE)
        .unwrap()
        .with_binary(TRAILING_METADATA_KEY, TRAILING_METADATA_VALUE);

    let mut stream = client.full_duplex_call(options).await.unwrap();
    stream.send(output_request(&[1], None)).await.unwrap();
    let response = stream.receive().await.unwrap().unwrap();
    assert_eq!(response.payload.unwrap().body.len(), 1);
    stream.close_send();
    assert_matches!(stream.receive().await, Ok(None));

    let leading: Vec<_> = stream.headers().get_all(LEADING_METADATA_KEY).iter().collect();
    assert_eq!(leading, vec!["test_initial_metadata_value"]);
    let trailing: Vec<Vec<u8>> = stream
        .trailers()
        .get_all_bin(TRAILING_METADATA_KEY)
        .iter()
        .map(|value| decode_binary(value).unwrap().to_vec())
        .collect();
    assert_eq!(trailing, vec![vec![0x0a, 0x0b, 0x0a, 0x0b, 0x0a, 0x0b]]);
}

#[tokio::test]
async fn sleeping_server_call_exceeds_its_deadline() {
    let server = TestServerHandle::start().await;
    let mut client = server.client().await;
    let scope = CallScope::with_timeout(Duration::from_secs(1));

    let mut stream = client.full_duplex_call(CallOptions::new().with_scope(scope)).await.unwrap();
    match stream.send(output_request(&[], Some(27182))).await {
        Err(SendError::EndOfStream) => {}
        Ok(()) => {
            assert_matches!(
                stream.receive().await,
                Err(status) if status.code() == Code::DeadlineExceeded
            );
        }
        Err(err) => panic!("unexpected send failure: {err}"),
    }
}

#[tokio::test]
async fn zero_response_parameters_close_the_stream_immediately() {
    let server = TestServerHandle::start().await;
    let mut client = server.client().await;

    let mut stream =
        client.streaming_output_call(output_request(&[], None), CallOptions::new()).await.unwrap();

    assert_matches!(stream.receive().await, Ok(None));
}

#[tokio::test]
async fn negative_sizes_fail_before_any_response() {
    let server = TestServerHandle::start().await;
    let mut client = server.client().await;

    let result = match client
        .streaming_output_call(output_request(&[5, -1], None), CallOptions::new())
        .await
    {
        Ok(mut stream) => stream.receive().await.map(|response| response.is_some()),
        Err(status) => Err(status),
    };
    assert_matches!(result, Err(status) if status.code() == Code::InvalidArgument);

    let status = client
        .unary_call(
            SimpleRequest {
                response_type: PayloadType::Compressable.into(),
                response_size: -3,
                ..Default::default()
            },
            CallOptions::new(),
        )
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::InvalidArgument);
}

#[tokio::test]
async fn unknown_payload_types_are_invalid() {
    let server = TestServerHandle::start().await;
    let mut client = server.client().await;

    let status = client
        .unary_call(
            SimpleRequest { response_type: 7, response_size: 1, ..Default::default() },
            CallOptions::new(),
        )
        .await
        .unwrap_err();

    assert_eq!(status.code(), Code::InvalidArgument);
}

#[tokio::test]
async fn client_streams_sum_their_payloads() {
    let server = TestServerHandle::start().await;
    let mut client = server.client().await;

    let empty = client.streaming_input_call(CallOptions::new()).await.unwrap();
    assert_eq!(empty.close_and_receive().await.unwrap().message.aggregated_payload_size, 0);

    let mut stream = client.streaming_input_call(CallOptions::new()).await.unwrap();
    for size in [0, 8, 1828] {
        stream
            .send(StreamingInputCallRequest {
                payload: Some(compressable_payload(size).unwrap()),
                ..Default::default()
            })
            .await
            .unwrap();
    }
    assert_eq!(stream.close_and_receive().await.unwrap().message.aggregated_payload_size, 1836);
}

#[tokio::test]
async fn cacheable_unary_matches_unary() {
    let server = TestServerHandle::start().await;
    let mut client = server.client().await;
    let request = SimpleRequest {
        response_type: PayloadType::Compressable.into(),
        response_size: 10,
        fill_server_id: true,
        ..Default::default()
    };

    let cacheable = client.cacheable_unary_call(request.clone(), CallOptions::new()).await.unwrap();
    let plain = client.unary_call(request, CallOptions::new()).await.unwrap();

    assert_eq!(cacheable.message, plain.message);
    assert_eq!(plain.message.server_id, "integration-test");
}

#[tokio::test]
async fn half_duplex_answers_after_the_input_ends() {
    let server = TestServerHandle::start().await;
    let mut client = server.client().await;

    let mut stream = client.half_duplex_call(CallOptions::new()).await.unwrap();
    stream.send(output_request(&[3, 1], None)).await.unwrap();
    stream.send(output_request(&[2], None)).await.unwrap();
    stream.close_send();

    let mut lengths = Vec::new();
    while let Some(response) = stream.receive().await.unwrap() {
        lengths.push(body_len(&response.payload));
    }
    assert_eq!(lengths, vec![3, 1, 2]);
}

#[tokio::test]
async fn unregistered_services_are_unimplemented() {
    let server = TestServerHandle::start().await;
    let mut client = server.client().await;

    for service in [Service::Test, Service::Unimplemented] {
        let status = client.unimplemented_call(service, CallOptions::new()).await.unwrap_err();
        assert_eq!(status.code(), Code::Unimplemented, "{service:?}");
    }
}

#[tokio::test]
async fn gzip_clients_are_served() {
    let server = TestServerHandle::start().await;
    let mut config = server.config.clone();
    config.compression = true;
    let mut client = TestClient::connect(&config).await.unwrap();

    let response = client
        .unary_call(
            SimpleRequest {
                response_type: PayloadType::Compressable.into(),
                response_size: 2653,
                payload: Some(compressable_payload(1828).unwrap()),
                ..Default::default()
            },
            CallOptions::new(),
        )
        .await
        .unwrap();

    assert_eq!(response.message.payload.unwrap().body.len(), 2653);
}

async fn run_catalogue(server: &TestServerHandle) -> Summary {
    let config = HarnessConfig {
        soak: SoakConfig { iterations: 3, ..Default::default() },
        // A closed local port fails without depending on DNS.
        unresolvable: ClientConfig::new("127.0.0.1", 1),
        ..Default::default()
    };
    let mut context = config.context(server.client().await);
    let mut reporter = InProcessReporter::new();
    let scenarios = harness::select(&catalogue(), &config.selection, config.capabilities).unwrap();

    let summary = harness::run(&mut reporter, &mut context, &scenarios).await;

    let failures: Vec<_> = reporter.failures().collect();
    assert!(failures.is_empty(), "{failures:#?}");
    summary
}

async fn run_soak(server: &TestServerHandle, soak: SoakConfig) -> (Summary, InProcessReporter) {
    let config = HarnessConfig {
        selection: Selection { names: vec!["soak".to_string()], ..Default::default() },
        soak,
        ..Default::default()
    };
    let mut context = config.context(server.client().await);
    let mut reporter = InProcessReporter::new();
    let scenarios = harness::select(&catalogue(), &config.selection, config.capabilities).unwrap();

    let summary = harness::run(&mut reporter, &mut context, &scenarios).await;
    (summary, reporter)
}

fn errors(reporter: &InProcessReporter) -> Vec<&str> {
    reporter
        .events()
        .iter()
        .filter(|event| event.kind == EventKind::Error)
        .map(|event| event.message.as_str())
        .collect()
}

fn slow_soak() -> SoakConfig {
    SoakConfig {
        reset_channel: true,
        iterations: 3,
        per_iteration_max_latency: Duration::from_nanos(1),
        ..Default::default()
    }
}

#[tokio::test]
async fn slow_soak_iterations_count_as_failures() {
    let server = TestServerHandle::start().await;

    let (summary, reporter) = run_soak(&server, slow_soak()).await;

    assert!(!summary.passed(), "{summary}");
    assert_matches!(
        errors(&reporter).as_slice(),
        [message] if message.contains("total failures: 3 exceeds")
    );
    assert_matches!(reporter.events().last().map(|event| event.kind), Some(EventKind::Failure));
}

#[tokio::test]
async fn soak_tolerates_failures_up_to_the_threshold() {
    let server = TestServerHandle::start().await;

    let (summary, reporter) =
        run_soak(&server, SoakConfig { max_failures: 3, ..slow_soak() }).await;

    assert!(summary.passed(), "{summary}");
    assert!(errors(&reporter).is_empty());
}

#[tokio::test]
async fn soak_without_time_quits_early() {
    let server = TestServerHandle::start().await;

    let (summary, reporter) = run_soak(
        &server,
        SoakConfig { iterations: 3, overall_timeout: Duration::ZERO, ..Default::default() },
    )
    .await;

    assert!(!summary.passed(), "{summary}");
    assert_matches!(
        errors(&reporter).as_slice(),
        [message] if message.contains("quit early") && message.contains("only ran 0 of 3")
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn whole_catalogue_passes_twice() {
    let server = TestServerHandle::start().await;

    let first = run_catalogue(&server).await;
    let second = run_catalogue(&server).await;

    assert!(first.passed(), "{first}");
    assert_eq!(first.outcomes.len(), catalogue().len());
    let verdicts = |summary: &Summary| {
        summary.outcomes.iter().map(|outcome| (outcome.name, outcome.passed)).collect::<Vec<_>>()
    };
    assert_eq!(verdicts(&first), verdicts(&second));
}
