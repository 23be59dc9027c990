//! Mirrors formatted log lines to websocket subscribers on `/logs`.

use axum::{
    extract::{ws::Message, WebSocketUpgrade},
    response::IntoResponse,
};
use once_cell::sync::Lazy;
use std::io;
use tokio::sync::broadcast;
use tracing_subscriber::fmt::MakeWriter;

// lines are dropped for subscribers that fall this far behind
const LOG_BACKLOG: usize = 1000;

static LOG_LINES: Lazy<broadcast::Sender<String>> = Lazy::new(|| broadcast::channel(LOG_BACKLOG).0);

/// A tracing writer that publishes every line it is given.
pub(crate) struct LogBroadcast;

impl io::Write for LogBroadcast {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        // no receivers is not an error
        let _ = LOG_LINES.send(String::from_utf8_lossy(buf).into_owned());
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl MakeWriter<'_> for LogBroadcast {
    type Writer = LogBroadcast;

    fn make_writer(&self) -> Self::Writer {
        LogBroadcast
    }
}

pub(crate) async fn stream_logs(ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(|mut socket| async move {
        let mut lines = LOG_LINES.subscribe();
        loop {
            let line = match lines.recv().await {
                Ok(line) => line,
                Err(broadcast::error::RecvError::Lagged(skipped)) => format!("... {skipped} log lines skipped\n"),
                Err(broadcast::error::RecvError::Closed) => break,
            };
            if socket.send(Message::Text(line)).await.is_err() {
                break;
            }
        }
    })
}
