//! Wire-level proxying: two mailbox clients talking through the
//! arbiter, with manual control of the replying side.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::collections::BTreeMap;
use std::time::Duration;

use pulsar_rt::arbiter::{Arbiter, ArbiterHandle};
use pulsar_rt::command;
use pulsar_rt::mailbox::MailboxClient;
use pulsar_rt::message::Value;
use pulsar_rt::system::RuntimeConfig;
use pulsar_rt::util::ActorId;

fn test_config() -> RuntimeConfig {
    RuntimeConfig::builder()
        .with_heartbeat_interval(Duration::from_millis(500))
        .with_handshake_timeout(Duration::from_secs(5))
        .with_heartbeat_timeout(Duration::from_secs(30))
        .with_graceful_timeout(Duration::from_secs(5))
        .build()
        .unwrap()
}

async fn start_runtime() -> (tokio::task::JoinHandle<()>, ArbiterHandle) {
    let (arbiter, handle) = Arbiter::bind(test_config()).await.unwrap();
    let serving = tokio::spawn(async move {
        let _ = arbiter.serve().await;
    });
    (serving, handle)
}

async fn connected_client(
    handle: &ArbiterHandle,
) -> (
    MailboxClient,
    tokio::sync::mpsc::UnboundedReceiver<pulsar_rt::message::Request>,
    ActorId,
) {
    let aid = ActorId::new();
    let (client, inbound) = MailboxClient::connect(
        handle.mailbox_addr(),
        aid,
        handle.aid(),
        test_config().max_frame_size,
    )
    .await
    .unwrap();
    client
        .handshake(Value::map(), Duration::from_secs(5))
        .await
        .unwrap();
    (client, inbound, aid)
}

#[tokio::test]
async fn proxied_request_reaches_target_and_reply_returns() {
    let (serving, handle) = start_runtime().await;
    let (sender, _sender_inbound, _sender_aid) = connected_client(&handle).await;
    let (receiver, mut receiver_inbound, receiver_aid) = connected_client(&handle).await;

    // Drive the receiving side by hand: answer the one echo.
    let responder = tokio::spawn(async move {
        let request = receiver_inbound.recv().await.unwrap();
        assert_eq!(request.command, command::ECHO);
        let payload = request.args.first().cloned().unwrap();
        receiver.reply_ok(request.id, payload).unwrap();
        receiver
    });

    let reply = tokio::time::timeout(
        Duration::from_secs(5),
        sender.send(
            receiver_aid,
            command::ECHO,
            vec![Value::from("across the proxy")],
            BTreeMap::new(),
        ),
    )
    .await
    .expect("proxied echo timed out")
    .unwrap();

    assert_eq!(reply, Value::from("across the proxy"));
    let receiver = responder.await.unwrap();

    receiver.close();
    sender.close();
    handle.stop().await.unwrap();
    let _ = serving.await;
}

#[tokio::test]
async fn out_of_order_replies_correlate_by_id() {
    let (serving, handle) = start_runtime().await;
    let (sender, _sender_inbound, _sender_aid) = connected_client(&handle).await;
    let (receiver, mut receiver_inbound, receiver_aid) = connected_client(&handle).await;

    // Collect both requests, then answer them in reverse order.
    let responder = tokio::spawn(async move {
        let first = receiver_inbound.recv().await.unwrap();
        let second = receiver_inbound.recv().await.unwrap();
        receiver
            .reply_ok(second.id, second.args.first().cloned().unwrap())
            .unwrap();
        receiver
            .reply_ok(first.id, first.args.first().cloned().unwrap())
            .unwrap();
        receiver
    });

    let one = sender.send(
        receiver_aid,
        command::ECHO,
        vec![Value::from("one")],
        BTreeMap::new(),
    );
    let two = sender.send(
        receiver_aid,
        command::ECHO,
        vec![Value::from("two")],
        BTreeMap::new(),
    );
    let (one, two) = tokio::time::timeout(
        Duration::from_secs(5),
        futures::future::join(one, two),
    )
    .await
    .expect("replies timed out");

    // Replies arrived out of order; each future still got its own.
    assert_eq!(one.unwrap(), Value::from("one"));
    assert_eq!(two.unwrap(), Value::from("two"));
    let receiver = responder.await.unwrap();

    receiver.close();
    sender.close();
    handle.stop().await.unwrap();
    let _ = serving.await;
}

#[tokio::test]
async fn unknown_target_is_rejected_at_the_proxy() {
    let (serving, handle) = start_runtime().await;
    let (sender, _inbound, _aid) = connected_client(&handle).await;

    let result = tokio::time::timeout(
        Duration::from_secs(5),
        sender.send(
            ActorId::new(),
            command::PING,
            Vec::new(),
            BTreeMap::new(),
        ),
    )
    .await
    .expect("rejection timed out");

    assert!(result.is_err());
    sender.close();
    handle.stop().await.unwrap();
    let _ = serving.await;
}

#[tokio::test]
async fn target_disconnect_fails_inflight_proxied_request() {
    let (serving, handle) = start_runtime().await;
    let (sender, _sender_inbound, _sender_aid) = connected_client(&handle).await;
    let (receiver, mut receiver_inbound, receiver_aid) = connected_client(&handle).await;

    // The receiver reads the request and hangs up without answering.
    let responder = tokio::spawn(async move {
        let _request = receiver_inbound.recv().await.unwrap();
        drop(receiver);
    });

    let result = tokio::time::timeout(
        Duration::from_secs(5),
        sender.send(
            receiver_aid,
            command::ECHO,
            vec![Value::from("never answered")],
            BTreeMap::new(),
        ),
    )
    .await
    .expect("failure did not propagate");

    assert!(result.is_err());
    responder.await.unwrap();

    sender.close();
    handle.stop().await.unwrap();
    let _ = serving.await;
}

#[tokio::test]
async fn arbiter_answers_ping_over_the_wire() {
    let (serving, handle) = start_runtime().await;
    let (client, _inbound, _aid) = connected_client(&handle).await;

    let reply = client
        .send(handle.aid(), command::PING, Vec::new(), BTreeMap::new())
        .await
        .unwrap();
    assert_eq!(reply, Value::from("pong"));

    client.close();
    handle.stop().await.unwrap();
    let _ = serving.await;
}
