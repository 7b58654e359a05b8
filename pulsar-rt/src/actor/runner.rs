//! The per-actor event loop.
//!
//! Everything an actor does happens here, on one thread: connect the
//! mailbox, handshake, run the start hook, then loop over inbound
//! commands and the periodic heartbeat until a stop is requested or the
//! connection is lost. Commands are dispatched strictly in arrival
//! order, so a `stop` takes effect only after the commands before it.

// Layer 1: Standard library imports
use std::collections::BTreeMap;
use std::sync::Arc;

// Layer 2: Third-party crate imports
use parking_lot::Mutex;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

// Layer 3: Internal module imports
use super::context::{ActorContext, START_EVENT, STOP_EVENT};
use super::error::ActorError;
use super::lifecycle::{ActorLifecycle, ActorState};
use super::spawn::SpawnParams;
use super::traits::Actor;
use crate::command::{self, CommandRequest, CommandTarget};
use crate::mailbox::{InboundRequest, MailboxClient, MailboxError};
use crate::message::Value;
use crate::protocol::TimeTracker;

/// Host an actor on a fresh single-threaded runtime, blocking the
/// calling thread until the actor terminates.
///
/// This is the whole life of a worker process or worker thread.
pub fn run_actor_blocking(actor: Box<dyn Actor>, params: SpawnParams) -> Result<(), ActorError> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(run_actor(actor, params))
}

/// Run an actor to termination on the current runtime.
pub async fn run_actor(
    mut actor: Box<dyn Actor>,
    params: SpawnParams,
) -> Result<(), ActorError> {
    let lifecycle = Arc::new(Mutex::new(ActorLifecycle::new()));
    lifecycle.lock().transition_to(ActorState::Starting);
    info!(aid = %params.aid, name = %params.name, mode = %params.mode, "actor starting");

    let time = TimeTracker::start();
    let (mailbox, mut inbound) = match MailboxClient::connect(
        params.mailbox_addr,
        params.aid,
        params.supervisor,
        params.max_frame_size,
    )
    .await
    {
        Ok(connected) => connected,
        Err(error) => {
            error!(%error, addr = %params.mailbox_addr, "mailbox connect failed");
            lifecycle.lock().transition_to(ActorState::Terminated);
            return Err(error.into());
        }
    };

    let ctx = Arc::new(ActorContext::new(
        params.aid,
        params.name.clone(),
        params.mode,
        Arc::clone(&lifecycle),
        mailbox.clone(),
        time,
    ));

    let info = CommandTarget::info(ctx.as_ref());
    if let Err(error) = mailbox.handshake(info, params.handshake_timeout).await {
        error!(%error, "handshake failed");
        lifecycle.lock().transition_to(ActorState::Terminated);
        return Err(error.into());
    }
    ctx.record_notified();
    lifecycle.lock().transition_to(ActorState::Running);
    ctx.events().fire(START_EVENT, None, None);

    let mut exit_err: Option<ActorError> = None;
    if let Err(error) = actor.on_start(&ctx).await {
        error!(%error, "start hook failed");
        exit_err = Some(error);
        ctx.request_stop();
    }

    if exit_err.is_none() {
        let mut heartbeat = tokio::time::interval(params.heartbeat_interval);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; the handshake already
        // carried a notify, so skip it.
        heartbeat.tick().await;

        let mut stop_signal = ctx.stop_signal();
        loop {
            tokio::select! {
                _ = stop_signal.changed() => break,
                maybe = inbound.recv() => match maybe {
                    Some(request) => {
                        dispatch_request(&ctx, &mailbox, request).await;
                        if ctx.stop_requested() {
                            break;
                        }
                    }
                    None => {
                        warn!(aid = %ctx.aid(), "mailbox connection lost");
                        exit_err = Some(MailboxError::ConnectionLost.into());
                        break;
                    }
                },
                _ = heartbeat.tick() => {
                    if let Err(error) = send_notify(&ctx, &mailbox, &params).await {
                        warn!(%error, "heartbeat failed, stopping");
                        exit_err = Some(error.into());
                        break;
                    }
                }
            }
        }
    }

    // Graceful shutdown: servers first, then the mailbox, then the hook's
    // cleanup has happened and the record can be dropped.
    lifecycle.lock().transition_to(ActorState::Stopping);
    ctx.events().fire(STOP_EVENT, None, None);
    actor.on_stop(&ctx).await;
    ctx.close_servers().await;
    mailbox.flush().await;
    mailbox.close();
    lifecycle.lock().transition_to(ActorState::Terminated);
    info!(aid = %ctx.aid(), "actor terminated");

    match exit_err {
        None => Ok(()),
        Some(error) => Err(error),
    }
}

/// Look an inbound command up and run its handler on this loop,
/// answering with the result when the sender asked for a reply.
async fn dispatch_request(
    ctx: &Arc<ActorContext>,
    mailbox: &MailboxClient,
    request: InboundRequest,
) {
    ctx.record_request();
    debug!(
        verb = %request.command,
        caller = %request.sender,
        id = request.id,
        "command received"
    );

    let target: Arc<dyn CommandTarget> = Arc::clone(ctx) as Arc<dyn CommandTarget>;
    let command_request = CommandRequest::new(target, &request);
    let result = command::global()
        .dispatch(&request.command, command_request)
        .await;

    if request.ack {
        let written = match result {
            Ok(value) => mailbox.reply_ok(request.id, value),
            Err(error) => mailbox.reply_err(request.id, error.to_string()),
        };
        if written.is_err() {
            warn!(id = request.id, "could not write reply");
        }
    } else if let Err(error) = result {
        warn!(verb = %request.command, %error, "fire-and-forget command failed");
    }
}

/// The periodic heartbeat: `notify` with this actor's current snapshot.
async fn send_notify(
    ctx: &Arc<ActorContext>,
    mailbox: &MailboxClient,
    params: &SpawnParams,
) -> Result<(), MailboxError> {
    let mut kwargs = BTreeMap::new();
    kwargs.insert("aid".to_owned(), Value::from(ctx.aid().to_string()));
    kwargs.insert(
        "last_notified".to_owned(),
        match ctx.last_notified() {
            Some(at) => Value::Float(at.timestamp_millis() as f64 / 1000.0),
            None => Value::Null,
        },
    );
    kwargs.insert("info".to_owned(), CommandTarget::info(ctx.as_ref()));

    mailbox
        .send_timeout(
            mailbox.supervisor(),
            command::NOTIFY,
            Vec::new(),
            kwargs,
            params.handshake_timeout,
        )
        .await?;
    ctx.record_notified();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::spawn::ConcurrencyMode;
    use crate::actor::traits::NullActor;
    use crate::message::{MailboxMessage, MessageCodec, Reply, Request};
    use crate::util::ActorId;
    use futures::{SinkExt, StreamExt};
    use std::time::Duration;
    use tokio::net::{TcpListener, TcpStream};
    use tokio_util::codec::Framed;

    const MAX_FRAME: usize = 1 << 20;

    fn params_for(addr: std::net::SocketAddr, supervisor: ActorId) -> SpawnParams {
        SpawnParams {
            aid: ActorId::new(),
            name: "test-actor".to_owned(),
            kind: "null".to_owned(),
            mode: ConcurrencyMode::Thread,
            mailbox_addr: addr,
            supervisor,
            handshake_timeout: Duration::from_secs(5),
            heartbeat_interval: Duration::from_secs(60),
            max_frame_size: MAX_FRAME,
        }
    }

    async fn accept_and_handshake(
        listener: &TcpListener,
    ) -> (Framed<TcpStream, MessageCodec>, Request) {
        let (stream, _) = listener.accept().await.unwrap();
        let mut framed = Framed::new(stream, MessageCodec::new(MAX_FRAME));
        let handshake = match framed.next().await {
            Some(Ok(MailboxMessage::Request(request))) => request,
            other => panic!("expected handshake, got {other:?}"),
        };
        assert_eq!(handshake.command, command::NOTIFY);
        framed
            .send(MailboxMessage::Reply(Reply::ok(handshake.id, Value::Null)))
            .await
            .unwrap();
        (framed, handshake)
    }

    #[tokio::test]
    async fn test_actor_handshakes_and_answers_commands() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let supervisor = ActorId::new();
        let params = params_for(addr, supervisor);
        let actor_aid = params.aid;

        let actor_task = tokio::spawn(run_actor(Box::new(NullActor), params));

        let (mut framed, handshake) = accept_and_handshake(&listener).await;
        assert_eq!(handshake.sender, actor_aid);
        assert_eq!(handshake.target, supervisor);
        let info = handshake.kwargs.get("info").unwrap().as_map().unwrap();
        assert_eq!(info.get("name"), Some(&Value::from("test-actor")));

        // Ping the actor through its own connection.
        framed
            .send(MailboxMessage::Request(Request {
                id: 100,
                command: command::PING.to_owned(),
                sender: supervisor,
                target: actor_aid,
                ack: true,
                args: Vec::new(),
                kwargs: BTreeMap::new(),
            }))
            .await
            .unwrap();
        match framed.next().await {
            Some(Ok(MailboxMessage::Reply(reply))) => {
                assert_eq!(reply.id, 100);
                assert_eq!(reply.result, Ok(Value::from("pong")));
            }
            other => panic!("expected pong reply, got {other:?}"),
        }

        // Stop: the actor acks, then closes its connection and exits.
        framed
            .send(MailboxMessage::Request(Request {
                id: 101,
                command: command::STOP.to_owned(),
                sender: supervisor,
                target: actor_aid,
                ack: true,
                args: Vec::new(),
                kwargs: BTreeMap::new(),
            }))
            .await
            .unwrap();
        match framed.next().await {
            Some(Ok(MailboxMessage::Reply(reply))) => assert_eq!(reply.id, 101),
            other => panic!("expected stop ack, got {other:?}"),
        }

        assert!(actor_task.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_unknown_command_gets_error_reply() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let supervisor = ActorId::new();
        let params = params_for(addr, supervisor);
        let actor_aid = params.aid;

        let actor_task = tokio::spawn(run_actor(Box::new(NullActor), params));
        let (mut framed, _) = accept_and_handshake(&listener).await;

        framed
            .send(MailboxMessage::Request(Request {
                id: 7,
                command: "definitely-not-a-verb".to_owned(),
                sender: supervisor,
                target: actor_aid,
                ack: true,
                args: Vec::new(),
                kwargs: BTreeMap::new(),
            }))
            .await
            .unwrap();

        match framed.next().await {
            Some(Ok(MailboxMessage::Reply(reply))) => {
                assert_eq!(reply.id, 7);
                assert!(reply.result.unwrap_err().contains("not found"));
            }
            other => panic!("expected error reply, got {other:?}"),
        }

        drop(framed);
        // Losing the connection terminates the actor with an error.
        assert!(actor_task.await.unwrap().is_err());
    }

    #[tokio::test]
    async fn test_silent_mailbox_times_out_handshake() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        // Accept the connection but never answer the notify.
        tokio::spawn(async move {
            let (_stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(60)).await;
        });

        let mut params = params_for(addr, ActorId::new());
        params.handshake_timeout = Duration::from_millis(100);
        let started = tokio::time::Instant::now();

        let result = run_actor(Box::new(NullActor), params).await;

        assert!(matches!(
            result,
            Err(ActorError::Mailbox(MailboxError::HandshakeTimeout(_)))
        ));
        // The worker gives up promptly; its process entry maps this to
        // exit code 1.
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_connect_refused_exits_with_error() {
        // A port with nothing listening.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = run_actor(Box::new(NullActor), params_for(addr, ActorId::new())).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_requests_dispatched_in_arrival_order() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let supervisor = ActorId::new();
        let params = params_for(addr, supervisor);
        let actor_aid = params.aid;

        let _actor_task = tokio::spawn(run_actor(Box::new(NullActor), params));
        let (mut framed, _) = accept_and_handshake(&listener).await;

        for (id, payload) in [(1u32, "1"), (2, "2"), (3, "3")] {
            framed
                .send(MailboxMessage::Request(Request {
                    id,
                    command: command::ECHO.to_owned(),
                    sender: supervisor,
                    target: actor_aid,
                    ack: true,
                    args: vec![Value::from(payload)],
                    kwargs: BTreeMap::new(),
                }))
                .await
                .unwrap();
        }

        // Sequential dispatch: replies come back in request order here
        // because there is a single loop and a single connection.
        let mut seen = Vec::new();
        for _ in 0..3 {
            match framed.next().await {
                Some(Ok(MailboxMessage::Reply(reply))) => {
                    seen.push(reply.result.unwrap().as_str().unwrap().to_owned());
                }
                other => panic!("expected reply, got {other:?}"),
            }
        }
        assert_eq!(seen, vec!["1", "2", "3"]);
    }
}
