//! Tests for the testing harness itself

#![allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect

use composable_fetch_core::{normalize, FetchError, RequestDescriptor, RequestInput, TransportError};
use composable_fetch_runtime::{DriverConfig, SourceReplay};
use composable_fetch_testing::helpers::{collect_within, failing_requests, sorted_ok};
use composable_fetch_testing::properties::{request_input, scope};
use composable_fetch_testing::{DriverTest, MockTransport};
use proptest::prelude::*;

#[tokio::test]
async fn harness_groups_outcomes_by_key() {
    let transport = MockTransport::new().with_failure("/bad", TransportError::Timeout);

    let transport = DriverTest::new(transport)
        .given_config(DriverConfig::new("harness").with_source_replay(SourceReplay::Latest))
        .when_requests(vec![
            "/a".into(),
            RequestInput::from(RequestDescriptor::default()),
            "/bad".into(),
            "/a".into(),
        ])
        .then_channels(|channels| assert_eq!(channels.len(), 2))
        .then_responses(|responses| {
            assert_eq!(responses.len(), 2);
            assert_eq!(responses["/a"].len(), 2);
            assert_eq!(responses["/bad"], vec![Err(FetchError::Transport(TransportError::Timeout))]);
        })
        .run()
        .await;

    // The invalid descriptor never reached the transport.
    assert_eq!(transport.resources(), vec!["/a", "/bad", "/a"]);
}

#[tokio::test]
async fn failing_requests_end_with_the_error() {
    let items = collect_within(failing_requests(vec!["/a".into()], "boom")).await;
    assert_eq!(items, vec![Ok(RequestInput::from("/a")), Err("boom")]);
}

#[test]
fn sorted_ok_orders_values() {
    assert_eq!(sorted_ok(vec![Ok(3), Ok(1), Ok(2)]), vec![1, 2, 3]);
}

proptest! {
    #[test]
    fn generated_inputs_always_normalize(input in request_input(), tag in scope()) {
        let record = normalize(input.clone().with_scope(tag.clone())).unwrap();
        prop_assert!(!record.key().as_str().is_empty());
        prop_assert!(record.namespace().contains(&tag));
        prop_assert_eq!(Some(record.resource()), input.resource());
    }
}
