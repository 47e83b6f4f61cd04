use std::io::{self, IsTerminal};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use transport::commands::{Backtrace, Frame, SetBreakpoint};
use transport::testing::{MemoryTransport, RemoteEnd};
use transport::{
    Address, Connection, ConnectionEvent, ConnectionState, EventSource, TransportError,
};

// test suite "constructor"
#[ctor::ctor]
fn init() {
    let in_ci = std::env::var("CI")
        .map(|val| val == "true")
        .unwrap_or(false);

    if std::io::stderr().is_terminal() || in_ci {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .try_init();
    } else {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .json()
            .try_init();
    }

    // error traces
    let _ = color_eyre::install();
}

fn address() -> Address {
    Address::new("127.0.0.1", 4711)
}

async fn next_event(events: &mut EventSource) -> ConnectionEvent {
    match tokio::time::timeout(Duration::from_secs(5), events.recv()).await {
        Ok(Some(event)) => event,
        Ok(None) => panic!("event stream ended"),
        Err(_) => panic!("no event after 5 seconds"),
    }
}

/// Skip lifecycle events until the next complete frame.
async fn next_frame(events: &mut EventSource) -> transport::ResponseFrame {
    loop {
        if let ConnectionEvent::Received(frame) = next_event(events).await {
            return frame;
        }
    }
}

fn connected() -> (Connection, EventSource, RemoteEnd) {
    let (transport, remote) = MemoryTransport::pair();
    let (connection, events) = Connection::from_transport(transport, address());
    (connection, events, remote)
}

#[tokio::test]
async fn lifecycle_events_start_with_the_initial_frame() -> eyre::Result<()> {
    let (connection, mut events, remote) = connected();
    remote.send_chunk("Connected.\n");
    remote.greet();

    assert!(matches!(
        next_event(&mut events).await,
        ConnectionEvent::Created { id, address: a } if id == connection.id() && a == address()
    ));
    assert!(matches!(
        next_event(&mut events).await,
        ConnectionEvent::Connected { id } if id == connection.id()
    ));

    let banner = match next_event(&mut events).await {
        ConnectionEvent::Received(frame) => frame,
        other => panic!("expected the banner, got {other:?}"),
    };
    assert!(banner.is_initial());
    assert_eq!(banner.body(), "Connected.\n");
    assert_eq!(connection.state(), ConnectionState::Connected);
    Ok(())
}

#[tokio::test]
async fn responses_follow_command_order() -> eyre::Result<()> {
    let (connection, mut events, mut remote) = connected();
    remote.greet();
    assert!(next_frame(&mut events).await.is_initial());

    let script = tokio::spawn(async move {
        let mut seen = Vec::new();
        for i in 0..5 {
            // split the body across chunks to exercise accumulation
            let command = remote.next_command().await.expect("command");
            remote.send_chunk("response ");
            remote.send_chunk(format!("{i}\n"));
            remote.send_chunk("PROMPT (byebug) ");
            seen.push(command);
        }
        seen
    });

    for i in 0..5 {
        let frame = connection.commander().send(&format!("eval {i}")).await?;
        assert!(!frame.is_initial());
        assert_eq!(frame.body(), format!("response {i}\n"));
    }

    let seen = script.await?;
    let expected: Vec<_> = (0..5).map(|i| format!("eval {i}")).collect();
    assert_eq!(seen, expected);
    Ok(())
}

#[tokio::test]
async fn typed_commands_decode_their_frames() -> eyre::Result<()> {
    let (connection, mut events, mut remote) = connected();
    remote.greet();
    next_frame(&mut events).await;

    let script = tokio::spawn(async move {
        remote.answer("#0 Object#run at app.rb:10\n").await;
        remote.answer("Created breakpoint 1 at foo.rb:42\n").await;
        remote
    });

    let frames = connection.commander().execute(&Backtrace).await?;
    assert_eq!(
        frames,
        vec![Frame {
            position: 0,
            call: "Object#run".to_string(),
            file: "app.rb".to_string(),
            line: 10,
        }]
    );

    let breakpoint = SetBreakpoint {
        file: "foo.rb".to_string(),
        line: 42,
    };
    let confirmation = connection.commander().execute(&breakpoint).await?;
    assert_eq!(confirmation.and_then(|c| c.line), Some(42));

    let _remote = script.await?;
    Ok(())
}

#[tokio::test]
async fn second_command_while_pending_is_busy() -> eyre::Result<()> {
    let (connection, mut events, mut remote) = connected();
    remote.greet();
    next_frame(&mut events).await;

    let commander = connection.commander().clone();
    let first = tokio::spawn(async move { commander.send("backtrace").await });
    assert_eq!(remote.next_command().await.as_deref(), Some("backtrace"));

    let second = connection.commander().send("var all").await;
    assert!(matches!(second, Err(TransportError::Busy)));

    remote.respond("#0 Object#run at app.rb:10\n");
    let frame = first.await??;
    assert_eq!(frame.body(), "#0 Object#run at app.rb:10\n");

    // the refused command never reached the wire
    let follow_up = tokio::spawn({
        let commander = connection.commander().clone();
        async move { commander.send("step").await }
    });
    assert_eq!(remote.next_command().await.as_deref(), Some("step"));
    remote.respond("");
    follow_up.await??;
    Ok(())
}

#[tokio::test]
async fn close_while_pending_fails_the_command() -> eyre::Result<()> {
    let (connection, mut events, mut remote) = connected();
    remote.greet();
    next_frame(&mut events).await;

    let commander = connection.commander().clone();
    let pending = tokio::spawn(async move { commander.send("continue").await });
    assert_eq!(remote.next_command().await.as_deref(), Some("continue"));

    remote.send_chunk("partial output");
    remote.close();

    let result = pending.await?;
    assert!(matches!(result, Err(TransportError::ConnectionLost)));

    assert!(matches!(
        next_event(&mut events).await,
        ConnectionEvent::Closed { had_error: false }
    ));
    assert_eq!(connection.state(), ConnectionState::Closed);
    Ok(())
}

#[tokio::test]
async fn send_after_close_is_a_write_error() -> eyre::Result<()> {
    let (connection, mut events, mut remote) = connected();
    remote.greet();
    next_frame(&mut events).await;

    remote.close();
    while !matches!(next_event(&mut events).await, ConnectionEvent::Closed { .. }) {}

    let result = connection.commander().send("step").await;
    assert!(matches!(result, Err(TransportError::Write(_))));
    Ok(())
}

#[tokio::test]
async fn socket_failure_reports_an_error_then_closes() -> eyre::Result<()> {
    let (connection, mut events, mut remote) = connected();
    remote.greet();
    next_frame(&mut events).await;

    remote.fail(io::ErrorKind::ConnectionReset);

    assert!(matches!(
        next_event(&mut events).await,
        ConnectionEvent::Error { .. }
    ));
    assert!(matches!(
        next_event(&mut events).await,
        ConnectionEvent::Closed { had_error: true }
    ));
    assert_eq!(connection.state(), ConnectionState::Failed);
    Ok(())
}

#[tokio::test]
async fn unsolicited_frame_is_only_published() -> eyre::Result<()> {
    let (connection, mut events, mut remote) = connected();
    remote.greet();
    next_frame(&mut events).await;

    remote.respond("Stopped by breakpoint 1\n");
    let frame = next_frame(&mut events).await;
    assert!(!frame.is_initial());
    assert_eq!(frame.body(), "Stopped by breakpoint 1\n");

    // the connection is still usable afterwards
    let script = tokio::spawn(async move {
        remote.answer("a = 1\n").await;
        remote
    });
    let frame = connection.commander().send("var all").await?;
    assert_eq!(frame.body(), "a = 1\n");
    let _remote = script.await?;
    Ok(())
}

#[tokio::test]
async fn graceful_close_waits_for_the_remote() -> eyre::Result<()> {
    let (connection, mut events, mut remote) = connected();
    remote.greet();
    next_frame(&mut events).await;

    let remote_side = async {
        // the write half is shut down first
        assert_eq!(remote.next_command().await, None);
        remote.close();
    };
    tokio::join!(connection.close(), remote_side);

    assert_eq!(connection.state(), ConnectionState::Closed);
    Ok(())
}

#[tokio::test]
async fn dropping_the_connection_fails_pending_commands() -> eyre::Result<()> {
    let (connection, mut events, mut remote) = connected();
    remote.greet();
    next_frame(&mut events).await;

    let commander = connection.commander().clone();
    let pending = tokio::spawn(async move { commander.send("continue").await });
    assert_eq!(remote.next_command().await.as_deref(), Some("continue"));

    drop(connection);

    let result = pending.await?;
    assert!(matches!(result, Err(TransportError::ConnectionLost)));
    Ok(())
}

#[tokio::test]
async fn tcp_round_trip() -> eyre::Result<()> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let port = listener.local_addr()?.port();

    let server = tokio::spawn(async move {
        let (socket, _) = listener.accept().await?;
        socket.set_nodelay(true)?;
        let (read, mut write) = socket.into_split();
        let mut lines = BufReader::new(read).lines();

        write.write_all(b"PROMPT (byebug) ").await?;
        let command = lines.next_line().await?;

        write.write_all(b"#0 Object#run at app.rb:10\n").await?;
        // the prompt must arrive as its own read
        tokio::time::sleep(Duration::from_millis(100)).await;
        write.write_all(b"PROMPT (byebug) ").await?;

        // wait for the client to hang up
        let _ = lines.next_line().await?;
        Ok::<_, io::Error>(command)
    });

    let (connection, mut events) =
        Connection::connect(Address::new("127.0.0.1", port), Duration::from_secs(5)).await?;
    assert!(next_frame(&mut events).await.is_initial());

    let frames = connection.commander().execute(&Backtrace).await?;
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].file, "app.rb");

    connection.close().await;
    assert_eq!(server.await??.as_deref(), Some("backtrace"));
    Ok(())
}
