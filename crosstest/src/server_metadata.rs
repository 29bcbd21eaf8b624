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

//! The one-line descriptor a test server prints on startup so that a cross
//! driver knows where and how to reach it.

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerMetadata {
    pub host: String,
    #[serde(default)]
    pub protocols: Vec<ProtocolSupport>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolSupport {
    pub protocol: Protocol,
    #[serde(default)]
    pub http_versions: Vec<HttpVersion>,
    pub port: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Protocol {
    #[serde(rename = "PROTOCOL_UNSPECIFIED")]
    Unspecified,
    #[serde(rename = "PROTOCOL_CONNECT")]
    Connect,
    #[serde(rename = "PROTOCOL_GRPC")]
    Grpc,
    #[serde(rename = "PROTOCOL_GRPC_WEB")]
    GrpcWeb,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpVersion {
    pub major: i32,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub minor: i32,
}

fn is_zero(value: &i32) -> bool {
    *value == 0
}

impl HttpVersion {
    pub const HTTP_2: HttpVersion = HttpVersion { major: 2, minor: 0 };
}

impl ServerMetadata {
    /// Describes a plaintext gRPC server speaking HTTP/2.
    pub fn grpc(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            protocols: vec![ProtocolSupport {
                protocol: Protocol::Grpc,
                http_versions: vec![HttpVersion::HTTP_2],
                port: port.to_string(),
            }],
        }
    }

    /// Renders the descriptor as a single line of JSON.
    pub fn to_json_line(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json_line(line: &str) -> serde_json::Result<Self> {
        serde_json::from_str(line.trim())
    }

    /// Port of the first protocol entry for `protocol`.
    pub fn port_for(&self, protocol: Protocol) -> Option<u16> {
        self.protocols
            .iter()
            .find(|support| support.protocol == protocol)
            .and_then(|support| support.port.parse().ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grpc_descriptor_renders_camel_case_json() {
        let line = ServerMetadata::grpc("127.0.0.1", 8080).to_json_line().unwrap();
        assert_eq!(
            line,
            r#"{"host":"127.0.0.1","protocols":[{"protocol":"PROTOCOL_GRPC","httpVersions":[{"major":2}],"port":"8080"}]}"#
        );
    }

    #[test]
    fn parses_descriptors_with_missing_minor_versions() {
        let metadata = ServerMetadata::from_json_line(
            "{\"host\":\"localhost\",\"protocols\":[{\"protocol\":\"PROTOCOL_GRPC_WEB\",\"httpVersions\":[{\"major\":1,\"minor\":1}],\"port\":\"9090\"},{\"protocol\":\"PROTOCOL_GRPC\",\"httpVersions\":[{\"major\":2}],\"port\":\"9091\"}]}\n",
        )
        .unwrap();
        assert_eq!(metadata.protocols[0].http_versions, vec![HttpVersion { major: 1, minor: 1 }]);
        assert_eq!(metadata.port_for(Protocol::Grpc), Some(9091));
        assert_eq!(metadata.port_for(Protocol::Connect), None);
    }

    #[test]
    fn rejects_unknown_protocols() {
        assert!(ServerMetadata::from_json_line(
            r#"{"host":"h","protocols":[{"protocol":"PROTOCOL_CARRIER_PIGEON","port":"1"}]}"#
        )
        .is_err());
    }
}
