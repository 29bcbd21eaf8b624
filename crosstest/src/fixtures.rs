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

//! Constants and message builders shared by the test service and the
//! scenario catalogue.

use std::fmt;

use crosstest_proto::grpc::testing::{
    ErrorDetail, ErrorStatus, Payload, PayloadType, ERROR_DETAIL_TYPE_URL,
};
use prost::Message;
use tonic::{Code, Status};

/// Leading metadata key echoed back as a response header.
pub const LEADING_METADATA_KEY: &str = "x-grpc-test-echo-initial";
/// Binary metadata key echoed back as a response trailer.
pub const TRAILING_METADATA_KEY: &str = "x-grpc-test-echo-trailing-bin";
pub const LEADING_METADATA_VALUE: &str = "test_initial_metadata_value";
pub const TRAILING_METADATA_VALUE: &[u8] = &[0x0a, 0x0b, 0x0a, 0x0b, 0x0a, 0x0b];

/// Message of every error returned by the `Fail*` methods.
pub const NON_ASCII_ERROR_MESSAGE: &str = "soirée 🎉";
pub const ERROR_DETAIL_DOMAIN: &str = "connect-crosstest";

pub const STATUS_MESSAGE: &str = "test status message";
pub const SPECIAL_STATUS_MESSAGE: &str =
    "\t\ntest with whitespace\r\nand Unicode BMP ☺ and non-BMP 😈\t\n";

pub const UNRESOLVABLE_HOST: &str = "unresolvable-host.some.domain";

/// Second leading value sent by the duplicated-metadata scenarios.
pub fn duplicated_leading_value() -> String {
    format!("{LEADING_METADATA_VALUE},more_stuff")
}

/// Second trailing value sent by the duplicated-metadata scenarios.
pub fn duplicated_trailing_value() -> Vec<u8> {
    [TRAILING_METADATA_VALUE, b"\x0a"].concat()
}

/// Payload sizes used by the size-sensitive scenarios.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Sizes {
    pub request: [i32; 4],
    pub response: [i32; 4],
    pub large_request: i32,
    pub large_response: i32,
}

const ONE_KIB: i32 = 1024;
// Not a typo: peers built from the extended table use this exact value.
const TWO_KIB: i32 = 2028;
const THIRTY_TWO_KIB: i32 = 32768;
const SIXTY_FOUR_KIB: i32 = 65536;
const TWO_FIFTY_KIB: i32 = 256000;
const FIVE_HUNDRED_KIB: i32 = 512000;

impl Sizes {
    /// The sizes of the classic gRPC interop test descriptions.
    pub const CLASSIC: Sizes = Sizes {
        request: [27182, 8, 1828, 45904],
        response: [31415, 9, 2653, 58979],
        large_request: 271828,
        large_response: 314159,
    };

    /// Larger sizes closer to what production traffic looks like.
    pub const EXTENDED: Sizes = Sizes {
        request: [TWO_FIFTY_KIB, 8, ONE_KIB, THIRTY_TWO_KIB],
        response: [FIVE_HUNDRED_KIB, 16, TWO_KIB, SIXTY_FOUR_KIB],
        large_request: TWO_FIFTY_KIB,
        large_response: FIVE_HUNDRED_KIB,
    };
}

impl Default for Sizes {
    fn default() -> Self {
        Self::EXTENDED
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PayloadError {
    NegativeSize(i32),
    UnsupportedType(i32),
}

impl fmt::Display for PayloadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PayloadError::NegativeSize(size) => {
                write!(f, "requested a negative payload size: {size}")
            }
            PayloadError::UnsupportedType(payload_type) => {
                write!(f, "unsupported payload type: {payload_type}")
            }
        }
    }
}

impl std::error::Error for PayloadError {}

impl From<PayloadError> for Status {
    fn from(err: PayloadError) -> Self {
        Status::invalid_argument(err.to_string())
    }
}

/// Builds a payload of `size` zero bytes tagged with `payload_type`.
pub fn new_payload(payload_type: i32, size: i32) -> Result<Payload, PayloadError> {
    let len = usize::try_from(size).map_err(|_| PayloadError::NegativeSize(size))?;
    match PayloadType::try_from(payload_type) {
        Ok(PayloadType::Compressable) => {
            Ok(Payload { r#type: PayloadType::Compressable.into(), body: vec![0; len] })
        }
        Err(_) => Err(PayloadError::UnsupportedType(payload_type)),
    }
}

pub fn compressable_payload(size: i32) -> Result<Payload, PayloadError> {
    new_payload(PayloadType::Compressable.into(), size)
}

pub fn error_detail() -> ErrorDetail {
    ErrorDetail {
        reason: NON_ASCII_ERROR_MESSAGE.to_string(),
        domain: ERROR_DETAIL_DOMAIN.to_string(),
    }
}

/// Creates a status carrying `detail` in its `grpc-status-details-bin` payload.
pub fn status_with_detail(
    code: Code,
    message: &str,
    detail: &ErrorDetail,
) -> Result<Status, prost::EncodeError> {
    let mut value = Vec::with_capacity(detail.encoded_len());
    detail.encode(&mut value)?;
    let status = ErrorStatus {
        code: code.into(),
        message: message.to_string(),
        details: vec![prost_types::Any { type_url: ERROR_DETAIL_TYPE_URL.to_string(), value }],
    };
    let mut details = Vec::with_capacity(status.encoded_len());
    status.encode(&mut details)?;
    Ok(Status::with_details(code, message, details.into()))
}

/// Returns the typed details attached to `status`, in order.
pub fn error_details(status: &Status) -> Result<Vec<prost_types::Any>, prost::DecodeError> {
    if status.details().is_empty() {
        return Ok(Vec::new());
    }
    Ok(ErrorStatus::decode(status.details())?.details)
}

pub fn decode_error_detail(any: &prost_types::Any) -> Result<ErrorDetail, prost::DecodeError> {
    ErrorDetail::decode(any.value.as_slice())
}
