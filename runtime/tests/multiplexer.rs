//! Integration tests for the keyed multiplexer
//!
//! Drives requests through a `FetchDriver` backed by the test transports and
//! checks channel creation, replay, ordering and failure propagation.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use composable_fetch_core::{FetchError, RequestDescriptor, RequestInput, RequestOptions, TransportError};
use composable_fetch_runtime::{ChannelState, DriverConfig, FetchDriver, SourceReplay};
use composable_fetch_testing::helpers::{
    collect_keys, collect_within, failing_requests, init_test_tracing, next_channel, next_item, within_timeout,
};
use composable_fetch_testing::{test_clock, DriverTest, ManualTransport, MockResponse, MockTransport};
use futures::stream::{self, StreamExt};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// Test Fixtures
// ============================================================================

fn keyed(key: &str, url: &str) -> RequestInput {
    RequestDescriptor::new(url).with_key(key).into()
}

fn data(outcome: &Result<MockResponse, FetchError>) -> &str {
    &outcome.as_ref().unwrap().data
}

// ============================================================================
// Routing
// ============================================================================

#[tokio::test]
async fn single_string_request_makes_one_call_and_one_channel() {
    init_test_tracing();
    let transport = MockTransport::new();
    let driver = FetchDriver::new(transport.clone());
    let source = driver.drive(stream::iter(vec![RequestInput::from("http://api.test/resource")]));

    let channels: Vec<_> = collect_within(source.subscribe()).await;
    assert_eq!(channels.len(), 1);
    let channel = channels[0].as_ref().unwrap();
    assert_eq!(channel.key(), "http://api.test/resource");

    let responses: Vec<_> = collect_within(channel.responses()).await;
    assert_eq!(responses.len(), 1);
    assert_eq!(data(&responses[0]), "resource");

    let calls = transport.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].resource, "http://api.test/resource");
    assert_eq!(calls[0].options, None);
}

#[tokio::test]
async fn repeated_keys_share_one_channel_in_request_order() {
    let transport = DriverTest::new(MockTransport::new())
        .when_requests(vec![keyed("r1", "/u1"), keyed("r2", "/u2"), keyed("r1", "/u1")])
        .then_channels(|channels| {
            let keys: Vec<&str> = channels.iter().map(|c| c.key().as_str()).collect();
            assert_eq!(keys, vec!["r1", "r2"]);
            assert_eq!(channels[0].handle_count(), 2);
            assert_eq!(channels[1].handle_count(), 1);
        })
        .then_responses(|responses| {
            assert_eq!(responses["r1"].len(), 2);
            assert_eq!(responses["r2"].len(), 1);
            assert_eq!(data(&responses["r2"][0]), "u2");
        })
        .run()
        .await;

    assert_eq!(transport.call_count(), 3);
}

#[tokio::test]
async fn by_url_selects_only_the_matching_channel() {
    let driver = FetchDriver::new(MockTransport::new());
    let source = driver.drive(stream::iter(vec![
        keyed("r1", "/u1"),
        keyed("r2", "/u2"),
        keyed("r1", "/u1"),
    ]));

    assert_eq!(collect_keys(source.by_url("/u2")).await, vec!["r2"]);
    assert_eq!(collect_keys(source.by_key("r1")).await, vec!["r1"]);
    // Keys and resources are different namespaces.
    assert!(collect_keys(source.by_url("r1")).await.is_empty());
    assert!(collect_keys(source.by_key("/u2")).await.is_empty());
}

#[tokio::test]
async fn by_url_matches_nested_requests() {
    let driver = FetchDriver::new(MockTransport::new());
    let (sink, source) = driver.open();

    sink.send_value(json!({ "input": { "url": "/nested" }, "key": "custom" })).unwrap();
    sink.send_value(json!({ "url": "/plain" })).unwrap();
    sink.close();

    assert_eq!(collect_keys(source.by_url("/nested")).await, vec!["custom"]);
    assert_eq!(collect_keys(source.by_url("/plain")).await, vec!["/plain"]);
}

#[tokio::test]
async fn by_url_sees_later_requests_that_reuse_a_key() {
    let driver = FetchDriver::new(MockTransport::new());
    let source = driver.drive(stream::iter(vec![keyed("r1", "/u1"), keyed("r1", "/u2")]));

    assert_eq!(collect_keys(source.by_url("/u2")).await, vec!["r1"]);
    assert_eq!(collect_keys(source.by_url("/u1")).await, vec!["r1"]);

    // The view is anchored on the matching request and only shows its handles.
    let channel = next_channel(&mut source.by_url("/u2")).await;
    assert_eq!(channel.key(), "r1");
    assert_eq!(channel.request().resource(), "/u2");
    let responses = collect_within(channel.responses()).await;
    assert_eq!(responses.len(), 1);
    assert_eq!(data(&responses[0]), "u2");

    // The unfiltered channel still replays the latest handle for the key.
    let full = source.channel("r1").unwrap();
    assert_eq!(full.request().resource(), "/u1");
    assert_eq!(full.latest().unwrap().request().resource(), "/u2");
}

#[tokio::test]
async fn options_reach_the_transport_untouched() {
    let transport = MockTransport::new();
    let driver = FetchDriver::new(transport.clone());
    let options = RequestOptions::new(json!({ "method": "POST", "body": "x" }));
    let source = driver.drive(stream::iter(vec![RequestInput::from(
        RequestDescriptor::new("/submit").with_options(options.clone()),
    )]));

    collect_within(source.merge_all()).await;
    assert_eq!(transport.calls()[0].options, Some(options));
}

#[tokio::test]
async fn invalid_stream_inputs_are_skipped() {
    let transport = MockTransport::new();
    let driver = FetchDriver::new(transport.clone());
    let source = driver.drive(stream::iter(vec![
        RequestInput::from(RequestDescriptor::default()),
        RequestInput::from(""),
        RequestInput::from("/ok"),
    ]));

    assert_eq!(collect_keys(source.subscribe()).await, vec!["/ok"]);
    assert_eq!(transport.resources(), vec!["/ok"]);
}

#[tokio::test]
async fn sink_reports_invalid_shapes_to_the_producer() {
    let transport = MockTransport::new();
    let driver = FetchDriver::new(transport.clone());
    let (sink, _source) = driver.open();

    for value in [json!(null), json!(3), json!([1, 2]), json!({ "key": "k" })] {
        let error = sink.send_value(value).unwrap_err();
        assert!(matches!(error, FetchError::InvalidRequestShape(_)), "{error:?}");
    }
    assert_eq!(transport.call_count(), 0);
}

// ============================================================================
// Replay
// ============================================================================

#[tokio::test]
async fn late_subscribers_get_the_cached_response_without_a_new_call() {
    let transport = MockTransport::new();
    let driver = FetchDriver::new(transport.clone());
    let (sink, source) = driver.open();

    sink.send("/users").unwrap();
    let mut channels = source.by_key("/users");
    let channel = next_channel(&mut channels).await;
    let first = next_item(&mut channel.subscribe()).await.unwrap().unwrap();
    assert_eq!(first.response().await.unwrap().data, "users");

    // Subscribe again long after the call settled.
    tokio::time::sleep(Duration::from_millis(10)).await;
    let mut late = channel.subscribe();
    let replayed = next_item(&mut late).await.unwrap().unwrap();
    assert!(replayed.is_settled());
    assert_eq!(replayed.response().await.unwrap().data, "users");

    let mut again = source.by_url("/users");
    let same = next_channel(&mut again).await;
    assert_eq!(same.handle_count(), 1);
    assert_eq!(transport.call_count(), 1);
}

#[tokio::test]
async fn replay_starts_at_the_latest_handle() {
    let transport = ManualTransport::<MockResponse>::new();
    let driver = FetchDriver::new(transport.clone());
    let (sink, source) = driver.open();

    sink.send(keyed("k", "/first")).unwrap();
    let channel = next_channel(&mut source.by_key("k")).await;
    sink.send(keyed("k", "/second")).unwrap();
    within_timeout(async {
        while channel.handle_count() < 2 {
            tokio::task::yield_now().await;
        }
    })
    .await;

    let mut late = channel.subscribe();
    let replayed = next_item(&mut late).await.unwrap().unwrap();
    assert_eq!(replayed.request().resource(), "/second");

    sink.send(keyed("k", "/third")).unwrap();
    let live = next_item(&mut late).await.unwrap().unwrap();
    assert_eq!(live.request().resource(), "/third");
}

#[tokio::test]
async fn concurrent_subscribers_see_the_same_handles() {
    let transport = MockTransport::new();
    let driver = FetchDriver::new(transport.clone());
    let (sink, source) = driver.open();

    sink.send("/shared").unwrap();
    let channel = next_channel(&mut source.subscribe()).await;
    let mut a = channel.subscribe();
    let mut b = channel.subscribe();
    sink.send("/shared").unwrap();

    for _ in 0..2 {
        let from_a = next_item(&mut a).await.unwrap().unwrap();
        let from_b = next_item(&mut b).await.unwrap().unwrap();
        assert_eq!(from_a.issued_at(), from_b.issued_at());
        assert_eq!(from_a.response().await, from_b.response().await);
    }
    assert_eq!(transport.call_count(), 2);
}

#[tokio::test]
async fn latest_source_replay_only_shows_the_newest_channel() {
    let driver = FetchDriver::new(MockTransport::new())
        .with_config(DriverConfig::new("latest").with_source_replay(SourceReplay::Latest));
    let source = driver.drive(stream::iter(vec![RequestInput::from("/a"), RequestInput::from("/b")]));

    within_timeout(async {
        while !source.state().is_terminated() {
            tokio::task::yield_now().await;
        }
    })
    .await;
    assert_eq!(collect_keys(source.subscribe()).await, vec!["/b"]);
}

#[tokio::test]
async fn handles_are_stamped_by_the_injected_clock() {
    let clock = test_clock();
    let expected = composable_fetch_core::environment::Clock::now(&clock);
    let driver = FetchDriver::new(MockTransport::new()).with_clock(Arc::new(clock));
    let (sink, source) = driver.open();

    sink.send("/t").unwrap();
    let channel = next_channel(&mut source.subscribe()).await;
    let handle = next_item(&mut channel.subscribe()).await.unwrap().unwrap();
    assert_eq!(handle.issued_at(), expected);
}

// ============================================================================
// Ordering
// ============================================================================

#[tokio::test]
async fn handles_keep_request_order_regardless_of_settle_order() {
    let transport = ManualTransport::<MockResponse>::new();
    let driver = FetchDriver::new(transport.clone());
    let (sink, source) = driver.open();

    sink.send(keyed("k", "/slow")).unwrap();
    let channel = next_channel(&mut source.by_key("k")).await;
    let mut handles = channel.subscribe();
    sink.send(keyed("k", "/fast")).unwrap();

    let slow = next_item(&mut handles).await.unwrap().unwrap();
    let fast = next_item(&mut handles).await.unwrap().unwrap();
    assert_eq!(slow.request().resource(), "/slow");
    assert_eq!(fast.request().resource(), "/fast");

    assert!(transport.resolve_echo("/fast"));
    assert_eq!(fast.response().await.unwrap().data, "fast");
    assert!(!slow.is_settled());

    assert!(transport.resolve_echo("/slow"));
    assert_eq!(slow.response().await.unwrap().data, "slow");
}

#[tokio::test]
async fn flattened_responses_arrive_in_settle_order() {
    let transport = ManualTransport::<MockResponse>::new();
    let driver = FetchDriver::new(transport.clone());
    let (sink, source) = driver.open();
    let mut responses = source.merge_all();

    sink.send("/a").unwrap();
    sink.send("/b").unwrap();
    within_timeout(async {
        while transport.pending().len() < 2 {
            tokio::task::yield_now().await;
        }
    })
    .await;

    transport.resolve_echo("/b");
    assert_eq!(data(&next_item(&mut responses).await.unwrap()), "b");
    transport.resolve_echo("/a");
    assert_eq!(data(&next_item(&mut responses).await.unwrap()), "a");

    sink.close();
    assert!(next_item(&mut responses).await.is_none());
}

// ============================================================================
// Termination and failures
// ============================================================================

#[tokio::test]
async fn completion_leaves_pending_handles_settleable() {
    let transport = ManualTransport::<MockResponse>::new();
    let driver = FetchDriver::new(transport.clone());
    let (sink, source) = driver.open();

    sink.send("/pending").unwrap();
    let channel = next_channel(&mut source.subscribe()).await;
    let responses = channel.responses();
    sink.close();

    within_timeout(async {
        while !source.state().is_terminated() {
            tokio::task::yield_now().await;
        }
    })
    .await;
    assert_eq!(source.state(), ChannelState::Completed);
    assert_eq!(channel.state(), ChannelState::Completed);
    assert_eq!(sink.send("/late"), Err(FetchError::SourceClosed));

    assert!(transport.resolve_echo("/pending"));
    let outcomes = collect_within(responses).await;
    assert_eq!(outcomes.len(), 1);
    assert_eq!(data(&outcomes[0]), "pending");
}

#[tokio::test]
async fn transport_failures_stay_local_to_their_handle() {
    let transport = MockTransport::new().with_failure("/down", TransportError::Timeout);
    let driver = FetchDriver::new(transport.clone());
    let source = driver.drive(stream::iter(vec![RequestInput::from("/down"), RequestInput::from("/up")]));

    let down = next_channel(&mut source.by_url("/down")).await;
    let down_outcomes = collect_within(down.responses()).await;
    assert_eq!(down_outcomes, vec![Err(FetchError::Transport(TransportError::Timeout))]);

    let up = next_channel(&mut source.by_url("/up")).await;
    let up_outcomes = collect_within(up.responses()).await;
    assert_eq!(data(&up_outcomes[0]), "up");

    // The source and the other channel completed normally.
    let keys = collect_keys(source.subscribe()).await;
    assert_eq!(keys, vec!["/down", "/up"]);
    assert_eq!(source.state(), ChannelState::Completed);
}

#[tokio::test]
async fn failed_handles_replay_their_failure() {
    let transport = MockTransport::new().with_failure("/down", TransportError::RequestFailed("refused".into()));
    let driver = FetchDriver::new(transport.clone());
    let (sink, source) = driver.open();

    sink.send("/down").unwrap();
    let channel = next_channel(&mut source.subscribe()).await;
    let handle = next_item(&mut channel.subscribe()).await.unwrap().unwrap();
    let expected = Err(FetchError::Transport(TransportError::RequestFailed("refused".into())));
    assert_eq!(handle.response().await, expected);

    let late = next_item(&mut channel.subscribe()).await.unwrap().unwrap();
    assert_eq!(late.response().await, expected);
    assert_eq!(transport.call_count(), 1);
}

#[tokio::test]
async fn upstream_failure_fails_the_source_and_every_channel() {
    let driver = FetchDriver::new(MockTransport::new());
    let source = driver.drive_fallible(failing_requests(vec!["/a".into(), "/b".into()], "boom"));

    let items = collect_within(source.subscribe()).await;
    assert_eq!(items.len(), 3);
    assert_eq!(items[2].as_ref().unwrap_err(), &FetchError::upstream("boom"));

    for item in items.iter().take(2) {
        let channel = item.as_ref().unwrap();
        assert_eq!(channel.state(), ChannelState::Failed(FetchError::upstream("boom")));
        let outcomes = collect_within(channel.responses()).await;
        assert!(outcomes.contains(&Err(FetchError::upstream("boom"))));
    }
}

#[tokio::test]
async fn sink_failure_is_an_upstream_failure() {
    let driver = FetchDriver::new(MockTransport::new());
    let (sink, source) = driver.open();

    sink.send("/a").unwrap();
    sink.fail("producer crashed").unwrap();

    let items = collect_within(source.subscribe()).await;
    assert_eq!(items.last().unwrap().as_ref().unwrap_err(), &FetchError::upstream("producer crashed"));
    assert_eq!(sink.send("/b"), Err(FetchError::SourceClosed));
    assert_eq!(sink.fail("again"), Err(FetchError::SourceClosed));
}
