//! WebSocket terminal.
//!
//! | Direction | Frame | Content |
//! |---|---|---|
//! | Client → Server | Text | `{"type":"input","data":"ls\r"}` |
//! | Client → Server | Text | `{"type":"resize","cols":120,"rows":40}` |
//! | Client → Server | Binary | raw keystrokes |
//! | Server → Client | Binary | raw terminal output |
//!
//! The socket is closed when the shell exits; the shell is killed when the
//! socket closes.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use futures_util::{SinkExt, StreamExt};
use hostctl_runtime::{TerminalOptions, TerminalSession};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::error::HttpError;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct TerminalQuery {
    pub cols: Option<u16>,
    pub rows: Option<u16>,
}

/// Control frames sent by the browser as text.
#[derive(Debug, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientFrame {
    Input { data: String },
    Resize { cols: u16, rows: u16 },
}

/// `GET /api/terminal?cols=&rows=`
///
/// The shell is started before the upgrade so a failure is reported as a
/// plain HTTP error.
pub async fn connect(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<TerminalQuery>,
) -> Result<Response, HttpError> {
    let session = state.sessions.open_terminal(TerminalOptions {
        cols: query.cols,
        rows: query.rows,
        ..TerminalOptions::default()
    })?;
    Ok(ws
        .on_upgrade(move |socket| run_terminal(socket, session))
        .into_response())
}

async fn run_terminal(socket: WebSocket, session: TerminalSession) {
    let Some(mut output) = session.output() else {
        warn!(session = %session.id(), "Terminal output already taken");
        return;
    };
    let session = Arc::new(session);
    info!(session = %session.id(), pid = ?session.pid(), "Terminal attached");

    let (mut ws_sender, mut ws_receiver) = socket.split();

    // Shell output → browser. Ends when the shell exits.
    let mut egress = tokio::spawn(async move {
        while let Some(chunk) = output.recv().await {
            if ws_sender.send(Message::Binary(chunk.data)).await.is_err() {
                return;
            }
        }
        let _ = ws_sender.send(Message::Close(None)).await;
    });

    // Browser → shell.
    let input_session = Arc::clone(&session);
    let mut ingest = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_receiver.next().await {
            let result = match msg {
                Message::Binary(data) => input_session.write(data).await,
                Message::Text(text) => match serde_json::from_str::<ClientFrame>(text.as_str()) {
                    Ok(ClientFrame::Input { data }) => input_session.write(data).await,
                    Ok(ClientFrame::Resize { cols, rows }) => input_session.resize(cols, rows),
                    Err(e) => {
                        debug!(error = %e, "Ignoring malformed terminal frame");
                        Ok(())
                    }
                },
                Message::Close(_) => break,
                Message::Ping(_) | Message::Pong(_) => Ok(()),
            };
            if let Err(e) = result {
                debug!(error = %e, "Terminal input rejected");
                break;
            }
        }
    });

    tokio::select! {
        _ = &mut ingest => { egress.abort(); }
        _ = &mut egress => { ingest.abort(); }
    }

    session.close();
    info!(session = %session.id(), state = ?session.state(), "Terminal detached");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_client_frames() {
        assert_eq!(
            serde_json::from_str::<ClientFrame>(r#"{"type":"input","data":"ls\r"}"#).unwrap(),
            ClientFrame::Input { data: "ls\r".into() }
        );
        assert_eq!(
            serde_json::from_str::<ClientFrame>(r#"{"type":"resize","cols":120,"rows":40}"#)
                .unwrap(),
            ClientFrame::Resize { cols: 120, rows: 40 }
        );
        assert!(serde_json::from_str::<ClientFrame>(r#"{"type":"bogus"}"#).is_err());
    }
}
