//! Serving debug sessions to IDE clients.

use std::net::SocketAddr;
use std::sync::Arc;

use dap_codec::{DapReader, Message, Request};
use eyre::WrapErr;
use futures::{Stream, StreamExt, future};
use session::{DebugSession, TraceSink};
use tokio::io::AsyncRead;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::Instrument;
use transport::{Connector, TcpConnector, Transport};

/// Serve one IDE client over `transport` until it disconnects.
pub async fn serve<T: Transport>(transport: T, trace: Arc<dyn TraceSink>) -> eyre::Result<()> {
    serve_with(transport, TcpConnector, trace).await
}

/// Serve one IDE client, reaching remote debuggers through `connector`.
pub async fn serve_with<T, C>(
    transport: T,
    connector: C,
    trace: Arc<dyn TraceSink>,
) -> eyre::Result<()>
where
    T: Transport,
    C: Connector,
{
    let (reader, mut writer) = dap_codec::split(transport);
    let (outbox_tx, mut outbox) = mpsc::unbounded_channel();

    let writer_task = tokio::spawn(async move {
        while let Some(message) = outbox.recv().await {
            writer.send(message).await?;
        }
        Ok::<_, dap_codec::CodecError>(())
    });

    DebugSession::with_connector(connector, outbox_tx)
        .with_trace_sink(trace)
        .run(requests(reader))
        .await;

    writer_task
        .await
        .wrap_err("client writer task failed")?
        .wrap_err("writing to the client")?;
    Ok(())
}

/// Accept IDE clients on `address`, each with its own session.
pub async fn listen(address: SocketAddr, trace: Arc<dyn TraceSink>) -> eyre::Result<()> {
    let listener = TcpListener::bind(address)
        .await
        .wrap_err_with(|| format!("binding {address}"))?;
    tracing::info!(address = %listener.local_addr()?, "listening for DAP clients");

    loop {
        let (stream, peer) = listener
            .accept()
            .await
            .wrap_err("accepting a DAP client")?;
        tracing::info!(%peer, "client connected");

        let trace = Arc::clone(&trace);
        let span = tracing::info_span!("client", %peer);
        tokio::spawn(
            async move {
                match serve(stream, trace).await {
                    Ok(()) => tracing::info!("client finished"),
                    Err(e) => tracing::warn!(error = ?e, "client session failed"),
                }
            }
            .instrument(span),
        );
    }
}

/// Requests from the client. Other messages are skipped; a framing error
/// ends the stream.
fn requests<R>(reader: DapReader<R>) -> impl Stream<Item = Request> + Unpin
where
    R: AsyncRead + Unpin,
{
    reader
        .take_while(|message| {
            if let Err(e) = message {
                tracing::error!(error = %e, "could not read from the client");
            }
            future::ready(message.is_ok())
        })
        .filter_map(|message| {
            future::ready(match message {
                Ok(Message::Request(request)) => Some(request),
                Ok(other) => {
                    tracing::debug!(?other, "ignoring message from the client");
                    None
                }
                Err(_) => None,
            })
        })
}
