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

//! Generated message types and service stubs for the `grpc.testing` package.

pub mod grpc {
    pub mod testing {
        // Do not lint generated code.
        #![allow(clippy::all, clippy::pedantic, clippy::nursery)]

        tonic::include_proto!("grpc.testing");

        /// Fully qualified name of the implemented test service.
        pub const TEST_SERVICE: &str = "grpc.testing.TestService";

        /// Fully qualified name of the service that no server implements.
        pub const UNIMPLEMENTED_SERVICE: &str = "grpc.testing.UnimplementedService";

        /// Type URL under which [`ErrorDetail`] values travel inside
        /// `google.protobuf.Any`.
        pub const ERROR_DETAIL_TYPE_URL: &str = "type.googleapis.com/grpc.testing.ErrorDetail";
    }
}
