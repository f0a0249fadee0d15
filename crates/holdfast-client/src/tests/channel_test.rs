use std::time::Duration;

use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::{sleep, timeout};

use crate::client::LongPollClient;
use crate::error::SessionError;
use crate::session::SessionEvent;

use super::mock::{MockTransport, Script, test_config};

async fn next_event(events: &mut UnboundedReceiver<SessionEvent>) -> SessionEvent {
    timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("timed out waiting for a session event")
        .expect("event stream closed")
}

async fn expect_started(events: &mut UnboundedReceiver<SessionEvent>, expected: u64) {
    match next_event(events).await {
        SessionEvent::Started { session } => assert_eq!(session.value(), expected),
        other => panic!("expected Started, got {other:?}"),
    }
}

#[tokio::test]
async fn create_success_stores_the_session_and_issues_one_poll() {
    let transport = MockTransport::new();
    transport.script("lpcreate", Script::respond(200, "req\r\nsession-id: 42"));
    let client = LongPollClient::with_transport(test_config(), transport.clone());

    let mut events = client.start().unwrap();
    expect_started(&mut events, 42).await;

    transport.wait_for_calls("lp", 1).await;
    assert_eq!(transport.calls_to("lpcreate"), vec![""]);
    assert_eq!(transport.calls_to("lp"), vec!["session-id: 42\r\n"]);

    // The poll is held open server-side; exactly one stays in flight.
    sleep(Duration::from_millis(150)).await;
    assert_eq!(transport.call_count("lp"), 1);
    assert_eq!(transport.call_count("lpcreate"), 1);
}

#[tokio::test]
async fn each_successful_poll_issues_exactly_one_more() {
    let transport = MockTransport::new();
    transport.script("lpcreate", Script::respond(200, "req\r\nsession-id: 42"));
    transport.script("lp", Script::respond(200, "req\r\n{\"volume\":5}"));
    let client = LongPollClient::with_transport(test_config(), transport.clone());

    let mut events = client.start().unwrap();
    expect_started(&mut events, 42).await;
    match next_event(&mut events).await {
        SessionEvent::Update { payload } => assert_eq!(payload, "{\"volume\":5}"),
        other => panic!("expected Update, got {other:?}"),
    }

    transport.wait_for_calls("lp", 2).await;
    sleep(Duration::from_millis(150)).await;
    assert_eq!(transport.call_count("lp"), 2);
}

#[tokio::test]
async fn empty_poll_payload_is_delivered_not_treated_as_an_error() {
    let transport = MockTransport::new();
    transport.script("lpcreate", Script::respond(200, "req\r\nsession-id: 7"));
    transport.script("lp", Script::respond(200, "req\r\n"));
    let client = LongPollClient::with_transport(test_config(), transport.clone());

    let mut events = client.start().unwrap();
    expect_started(&mut events, 7).await;
    match next_event(&mut events).await {
        SessionEvent::Update { payload } => assert_eq!(payload, ""),
        other => panic!("expected Update, got {other:?}"),
    }

    // Polling continues: "no new data" is not a failure.
    transport.wait_for_calls("lp", 2).await;
    assert_eq!(transport.call_count("lpcreate"), 1);
}

#[tokio::test]
async fn network_failure_resets_and_recreates_after_the_retry_delay() {
    let transport = MockTransport::new();
    transport.script("lpcreate", Script::respond(200, "req\r\nsession-id: 42"));
    transport.script("lp", Script::fail(SessionError::Network("connection reset".into())));
    let client = LongPollClient::with_transport(test_config(), transport.clone());

    let mut events = client.start().unwrap();
    expect_started(&mut events, 42).await;
    match next_event(&mut events).await {
        SessionEvent::ChannelLost { error } => {
            assert!(matches!(error, SessionError::Network(_)))
        }
        other => panic!("expected ChannelLost, got {other:?}"),
    }

    // The recreate waits out the retry delay instead of firing immediately.
    sleep(Duration::from_millis(20)).await;
    assert_eq!(transport.call_count("lpcreate"), 1);
    transport.wait_for_calls("lpcreate", 2).await;
}

#[tokio::test]
async fn a_dispatch_failure_feeds_the_same_recovery_path() {
    let transport = MockTransport::new();
    transport.script("lpcreate", Script::respond(200, "req\r\nsession-id: 42"));
    transport.script(
        "lp",
        Script::fail(SessionError::Dispatch("no route to host".into())),
    );
    let client = LongPollClient::with_transport(test_config(), transport.clone());

    let mut events = client.start().unwrap();
    expect_started(&mut events, 42).await;
    match next_event(&mut events).await {
        SessionEvent::ChannelLost { error } => {
            assert!(matches!(error, SessionError::Dispatch(_)))
        }
        other => panic!("expected ChannelLost, got {other:?}"),
    }
    transport.wait_for_calls("lpcreate", 2).await;
}

#[tokio::test]
async fn malformed_poll_payload_is_a_channel_failure() {
    let transport = MockTransport::new();
    transport.script("lpcreate", Script::respond(200, "req\r\nsession-id: 42"));
    transport.script("lp", Script::respond(200, "req\r\nnot json"));
    let client = LongPollClient::with_transport(test_config(), transport.clone());

    let mut events = client.start().unwrap();
    expect_started(&mut events, 42).await;
    match next_event(&mut events).await {
        SessionEvent::ChannelLost { error } => {
            assert!(matches!(error, SessionError::Protocol(_)))
        }
        other => panic!("expected ChannelLost, got {other:?}"),
    }
    transport.wait_for_calls("lpcreate", 2).await;
}

#[tokio::test]
async fn non_success_create_status_schedules_a_recreate() {
    let transport = MockTransport::new();
    transport.script("lpcreate", Script::respond(503, ""));
    let client = LongPollClient::with_transport(test_config(), transport.clone());

    let mut events = client.start().unwrap();
    match next_event(&mut events).await {
        SessionEvent::ChannelLost { error } => {
            assert!(matches!(error, SessionError::HttpStatus(_)))
        }
        other => panic!("expected ChannelLost, got {other:?}"),
    }
    transport.wait_for_calls("lpcreate", 2).await;
}

#[tokio::test]
async fn restart_abandons_the_poll_and_recreates() {
    let transport = MockTransport::new();
    transport.script("lpcreate", Script::respond(200, "req\r\nsession-id: 42"));
    let client = LongPollClient::with_transport(test_config(), transport.clone());

    let mut events = client.start().unwrap();
    expect_started(&mut events, 42).await;
    transport.wait_for_calls("lp", 1).await;

    client.restart().unwrap();
    transport.wait_for_calls("lpcreate", 2).await;

    // A forced restart is not a failure; the abandoned poll stays dead.
    sleep(Duration::from_millis(50)).await;
    assert!(events.try_recv().is_err());
    assert_eq!(transport.call_count("lp"), 1);
}
