//! Log to relay to consumer over a real loopback socket.

mod support;

use std::sync::Arc;
use std::time::Duration;

use pkgstream::adapter::inbound::http::router;
use pkgstream::adapter::outbound::sse::HttpPushTransport;
use pkgstream::application::consumer::{ConnectionState, ConsumerHandle, ConsumerSnapshot};
use pkgstream::testkit::config::consumer;
use pkgstream::testkit::domain::{npm, package_entry, tail_body};
use pkgstream::testkit::log::{ScriptedLogClient, ScriptedRead};
use support::relay::{configured_state, relay_config, unconfigured_state, STREAM_PATH};

async fn transport_for(state: pkgstream::adapter::inbound::http::RelayState) -> HttpPushTransport {
    let addr = support::server::spawn(router(state, &relay_config())).await;
    HttpPushTransport::new(&format!("http://{addr}{STREAM_PATH}")).unwrap()
}

async fn wait_for<F>(handle: &ConsumerHandle, predicate: F) -> ConsumerSnapshot
where
    F: Fn(&ConsumerSnapshot) -> bool,
{
    let mut status = handle.watch();
    let snapshot = tokio::time::timeout(Duration::from_secs(5), status.wait_for(|s| predicate(s)))
        .await
        .expect("consumer state in time")
        .expect("consumer running")
        .clone();
    snapshot
}

#[tokio::test]
async fn consumer_receives_relayed_packages_without_duplicates() {
    let client = Arc::new(ScriptedLogClient::new());
    client.push_tail(Ok(tail_body(100)));
    client.push_read(ScriptedRead::Open(vec![
        package_entry(90, &npm("left-pad", "1.0.0")),
        package_entry(91, &npm("left-pad", "1.0.0")),
        package_entry(92, &npm("is-odd", "3.0.1")),
    ]));
    let transport = transport_for(configured_state(&client)).await;

    let handle = ConsumerHandle::spawn(Arc::new(transport), consumer());
    let snapshot = wait_for(&handle, |s| s.last_sequence == Some(92)).await;

    assert_eq!(snapshot.state, ConnectionState::Open);
    assert_eq!(snapshot.packages_received, 2);
    assert_eq!(snapshot.duplicates_filtered, 1);

    let items = handle.items().await.unwrap();
    let names: Vec<&str> = items.iter().map(|i| i.event.package.name.as_str()).collect();
    assert_eq!(names, vec!["left-pad", "is-odd"]);

    handle.close().await;
}

#[tokio::test]
async fn consumer_resumes_after_given_sequence() {
    let client = Arc::new(ScriptedLogClient::new());
    client.push_read(ScriptedRead::Open(vec![package_entry(
        92,
        &npm("is-odd", "3.0.1"),
    )]));
    let transport = transport_for(configured_state(&client)).await;

    let handle = ConsumerHandle::spawn_from(Arc::new(transport), consumer(), Some(91));
    wait_for(&handle, |s| s.last_sequence == Some(92)).await;

    assert_eq!(client.tail_count(), 0);
    assert_eq!(client.requests()[0].seq_num, Some(92));

    handle.close().await;
}

#[tokio::test]
async fn relay_error_leads_to_scheduled_reconnect() {
    let transport = transport_for(unconfigured_state()).await;

    let handle = ConsumerHandle::spawn(Arc::new(transport), consumer());
    let snapshot = wait_for(&handle, |s| s.state == ConnectionState::Reconnecting).await;

    let message = snapshot.status_message.unwrap_or_default();
    assert!(message.contains("attempt 1/5"), "unexpected status: {message}");
    assert_eq!(snapshot.packages_received, 0);

    handle.close().await;
}

#[tokio::test]
async fn serve_returns_after_shutdown_signal() {
    let mut config = relay_config();
    config.bind = "127.0.0.1:0".to_string();
    let (stop, stopped) = tokio::sync::oneshot::channel::<()>();

    let server = tokio::spawn(async move {
        pkgstream::adapter::inbound::http::serve(unconfigured_state(), &config, async {
            let _ = stopped.await;
        })
        .await
    });

    stop.send(()).unwrap();
    let result = tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .expect("server stops in time")
        .expect("server task");
    assert!(result.is_ok());
}

#[tokio::test]
async fn serve_rejects_invalid_bind() {
    let mut config = relay_config();
    config.bind = "not-an-address".to_string();

    let result = pkgstream::adapter::inbound::http::serve(unconfigured_state(), &config, async {}).await;
    assert!(result.is_err());
}
