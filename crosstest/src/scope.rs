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

//! The deadline and cancellation signal attached to a single call.
//!
//! Both sides of a call use [`CallScope`]: the client to bound its blocking
//! operations, and the server to notice an expired deadline between
//! responses.

use std::{future::Future, time::Duration};

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tonic::{metadata::MetadataMap, Status};

pub const GRPC_TIMEOUT_HEADER: &str = "grpc-timeout";

// The gRPC wire format limits timeout values to eight digits.
const MAX_TIMEOUT_VALUE: u128 = 99_999_999;

const CANCELLED_MESSAGE: &str = "call cancelled";
const DEADLINE_EXCEEDED_MESSAGE: &str = "deadline exceeded";

#[derive(Clone, Debug, Default)]
pub struct CallScope {
    deadline: Option<Instant>,
    token: CancellationToken,
}

impl CallScope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self { deadline: Some(deadline), token: CancellationToken::new() }
    }

    /// Builds the scope of an incoming call from its `grpc-timeout` header.
    /// Malformed values are ignored.
    pub fn from_metadata(metadata: &MetadataMap) -> Self {
        match metadata
            .get(GRPC_TIMEOUT_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(parse_grpc_timeout)
        {
            Some(timeout) => Self::with_timeout(timeout),
            None => Self::new(),
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn remaining(&self) -> Option<Duration> {
        self.deadline.map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Cancels every operation sharing this scope, including clones.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn is_expired(&self) -> bool {
        self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }

    /// Fails with CANCELLED or DEADLINE_EXCEEDED once the scope has been
    /// triggered.
    pub fn check(&self) -> Result<(), Status> {
        if self.is_cancelled() {
            return Err(Status::cancelled(CANCELLED_MESSAGE));
        }
        if self.is_expired() {
            return Err(Status::deadline_exceeded(DEADLINE_EXCEEDED_MESSAGE));
        }
        Ok(())
    }

    /// Runs `operation` until it completes or the scope is triggered,
    /// whichever happens first.
    ///
    /// A failure observed after the scope was triggered is reported as the
    /// scope's own failure, so that a peer reacting to the same deadline
    /// cannot change the code the caller sees.
    pub async fn guard<T, F>(&self, operation: F) -> Result<T, Status>
    where
        F: Future<Output = Result<T, Status>>,
    {
        self.check()?;
        let result = tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(Status::cancelled(CANCELLED_MESSAGE)),
            _ = expiry(self.deadline) => Err(Status::deadline_exceeded(DEADLINE_EXCEEDED_MESSAGE)),
            result = operation => result,
        };
        result.map_err(|status| match self.check() {
            Err(triggered) if triggered.code() != status.code() => triggered,
            _ => status,
        })
    }

    /// Sleeps for `duration`, then checks the scope again. A zero duration
    /// still performs the check.
    pub async fn sleep(&self, duration: Duration) -> Result<(), Status> {
        self.guard(async {
            tokio::time::sleep(duration).await;
            Ok(())
        })
        .await?;
        self.check()
    }
}

async fn expiry(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Parses a `grpc-timeout` header value such as `100m` or `5S`.
pub fn parse_grpc_timeout(value: &str) -> Option<Duration> {
    if !value.is_ascii() || value.len() < 2 {
        return None;
    }
    let (digits, unit) = value.split_at(value.len() - 1);
    if digits.len() > 8 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let amount: u64 = digits.parse().ok()?;
    let timeout = match unit {
        "H" => Duration::from_secs(amount * 60 * 60),
        "M" => Duration::from_secs(amount * 60),
        "S" => Duration::from_secs(amount),
        "m" => Duration::from_millis(amount),
        "u" => Duration::from_micros(amount),
        "n" => Duration::from_nanos(amount),
        _ => return None,
    };
    Some(timeout)
}

/// Encodes `timeout` with the finest unit that fits the eight digit limit.
pub fn encode_grpc_timeout(timeout: Duration) -> String {
    let units: [(u128, &str); 6] = [
        (timeout.as_nanos(), "n"),
        (timeout.as_micros(), "u"),
        (timeout.as_millis(), "m"),
        (u128::from(timeout.as_secs()), "S"),
        (u128::from(timeout.as_secs() / 60), "M"),
        (u128::from(timeout.as_secs() / (60 * 60)), "H"),
    ];
    for (value, unit) in units {
        if value <= MAX_TIMEOUT_VALUE {
            return format!("{value}{unit}");
        }
    }
    format!("{MAX_TIMEOUT_VALUE}H")
}

#[cfg(test)]
mod tests {
    use tonic::Code;

    use super::*;

    #[test]
    fn parses_every_unit() {
        assert_eq!(parse_grpc_timeout("2H"), Some(Duration::from_secs(7200)));
        assert_eq!(parse_grpc_timeout("3M"), Some(Duration::from_secs(180)));
        assert_eq!(parse_grpc_timeout("1S"), Some(Duration::from_secs(1)));
        assert_eq!(parse_grpc_timeout("100m"), Some(Duration::from_millis(100)));
        assert_eq!(parse_grpc_timeout("250u"), Some(Duration::from_micros(250)));
        assert_eq!(parse_grpc_timeout("99999999n"), Some(Duration::from_nanos(99_999_999)));
    }

    #[test]
    fn rejects_malformed_timeouts() {
        for value in ["", "S", "10", "10x", "123456789S", "-1S", "1.5S", "é1S"] {
            assert_eq!(parse_grpc_timeout(value), None, "{value:?}");
        }
    }

    #[test]
    fn encodes_with_the_finest_fitting_unit() {
        assert_eq!(encode_grpc_timeout(Duration::from_millis(1)), "1000000n");
        assert_eq!(encode_grpc_timeout(Duration::from_secs(1)), "1000000u");
        assert_eq!(encode_grpc_timeout(Duration::from_secs(1000)), "1000000m");
        let encoded = encode_grpc_timeout(Duration::from_millis(1500));
        assert_eq!(parse_grpc_timeout(&encoded), Some(Duration::from_millis(1500)));
    }

    #[test]
    fn scope_without_timeout_header_has_no_deadline() {
        assert!(CallScope::from_metadata(&MetadataMap::new()).deadline().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn scope_from_timeout_header_expires() {
        let mut metadata = MetadataMap::new();
        metadata.insert(GRPC_TIMEOUT_HEADER, "50m".parse().unwrap());
        let scope = CallScope::from_metadata(&metadata);
        assert!(scope.check().is_ok());

        tokio::time::advance(Duration::from_millis(60)).await;
        assert_eq!(scope.check().unwrap_err().code(), Code::DeadlineExceeded);
    }

    #[tokio::test]
    async fn cancellation_is_shared_between_clones() {
        let scope = CallScope::new();
        let clone = scope.clone();
        clone.cancel();
        assert!(scope.is_cancelled());
        let status = scope.guard(async { Ok::<_, Status>(()) }).await.unwrap_err();
        assert_eq!(status.code(), Code::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn guard_times_out_pending_operations() {
        let scope = CallScope::with_timeout(Duration::from_secs(1));
        let status = scope
            .guard(std::future::pending::<Result<(), Status>>())
            .await
            .unwrap_err();
        assert_eq!(status.code(), Code::DeadlineExceeded);
    }

    #[tokio::test]
    async fn failures_after_cancellation_report_cancelled() {
        let scope = CallScope::new();
        let inner = scope.clone();
        let status = scope
            .guard(async move {
                inner.cancel();
                Err::<(), _>(Status::unavailable("connection reset"))
            })
            .await
            .unwrap_err();
        assert_eq!(status.code(), Code::Cancelled);
    }

    #[tokio::test]
    async fn zero_sleep_still_observes_cancellation() {
        let scope = CallScope::new();
        assert!(scope.sleep(Duration::ZERO).await.is_ok());
        scope.cancel();
        assert_eq!(scope.sleep(Duration::ZERO).await.unwrap_err().code(), Code::Cancelled);
    }
}
