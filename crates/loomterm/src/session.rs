use crate::buffer::ScreenBuffer;
use crate::parser::EscapeSequenceParser;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Running,
    Exited(i32),
    Error(String),
}

/// Callback to resize the transport underneath the session (PTY, SSH
/// channel, telnet NAWS, ...).
type ResizeFn = Box<dyn Fn(u16, u16) + Send>;

/// One terminal connection. The session owns the screen model and the
/// decoding thread; the byte transport stays with the caller and is wired
/// up through channels.
pub struct TerminalSession {
    pub id: Uuid,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub state: SessionState,
    pub buffer: Arc<Mutex<ScreenBuffer>>,
    input_tx: mpsc::UnboundedSender<Vec<u8>>,
    resize_fn: Option<ResizeFn>,
}

impl TerminalSession {
    /// Create a session and the channel endpoints the caller wires to its
    /// transport:
    ///
    /// - `data_tx` (`UnboundedSender<Vec<u8>>`): the caller pushes raw
    ///   output bytes into this sender; a background thread drains it
    ///   through the escape-sequence parser into the screen buffer.
    /// - `input_rx` (`UnboundedReceiver<Vec<u8>>`): the caller reads
    ///   keyboard input (and engine replies, such as device-attribute
    ///   reports) from this receiver and forwards it to the transport.
    pub fn spawn(
        title: String,
        width: u16,
        height: u16,
    ) -> crate::Result<(
        Self,
        mpsc::UnboundedSender<Vec<u8>>,
        mpsc::UnboundedReceiver<Vec<u8>>,
    )> {
        let buffer = Arc::new(Mutex::new(ScreenBuffer::new(
            width as usize,
            height as usize,
        )));
        let (input_tx, input_rx) = mpsc::unbounded_channel::<Vec<u8>>();
        let (data_tx, mut data_rx) = mpsc::unbounded_channel::<Vec<u8>>();

        // Replies (device attributes and the like) flow from the buffer
        // back towards the transport's input side.
        let (response_tx, response_rx) = std::sync::mpsc::channel::<Vec<u8>>();
        buffer.lock().set_response_tx(response_tx);

        let buffer_clone = buffer.clone();
        let response_input_tx = input_tx.clone();

        // Reader thread: decodes transport output into actions and applies
        // them to the buffer, forwarding any queued replies.
        std::thread::Builder::new()
            .name("terminal-reader".into())
            .spawn(move || {
                let mut parser = EscapeSequenceParser::new();
                while let Some(data) = data_rx.blocking_recv() {
                    let actions = parser.feed(&data);
                    {
                        let mut buffer = buffer_clone.lock();
                        for action in &actions {
                            action.apply(&mut *buffer);
                        }
                    }
                    while let Ok(response) = response_rx.try_recv() {
                        let _ = response_input_tx.send(response);
                    }
                }
                tracing::debug!("terminal reader thread exiting");
            })
            .map_err(|e| {
                crate::TerminalError::Session(format!("Failed to spawn reader thread: {}", e))
            })?;

        let session = Self {
            id: Uuid::new_v4(),
            title,
            created_at: Utc::now(),
            state: SessionState::Running,
            buffer,
            input_tx,
            resize_fn: None,
        };

        Ok((session, data_tx, input_rx))
    }

    /// Send input data to the terminal (e.g., keyboard input).
    pub fn write_input(&self, data: &[u8]) -> crate::Result<()> {
        self.input_tx
            .send(data.to_vec())
            .map_err(|_| crate::TerminalError::SessionClosed)
    }

    /// Resize the screen buffer and the underlying transport.
    pub fn resize(&self, width: u16, height: u16) {
        self.buffer.lock().resize(width as usize, height as usize);
        if let Some(ref resize_fn) = self.resize_fn {
            resize_fn(width, height);
        }
    }

    /// Set the resize callback (for transports where the resize channel is
    /// set up after session creation).
    pub fn set_resize_fn(&mut self, f: ResizeFn) {
        self.resize_fn = Some(f);
    }

    /// Check if the session is still running.
    pub fn is_running(&self) -> bool {
        self.state == SessionState::Running
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_session_feeds_buffer_through_parser() {
        let (session, data_tx, _input_rx) = TerminalSession::spawn("test".into(), 80, 24).unwrap();
        data_tx.send(b"hello\x1b[31m!".to_vec()).unwrap();
        // The reader thread applies actions asynchronously.
        for _ in 0..50 {
            if session.buffer.lock().line(0).map(|l| l.get_string()) == Some("hello!".into()) {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        let buffer = session.buffer.lock();
        assert_eq!(buffer.line(0).unwrap().get_string(), "hello!");
        assert_eq!(
            buffer.line(0).unwrap().style_at(5).foreground(),
            Some(crate::style::Color::Red)
        );
    }

    #[tokio::test]
    async fn test_device_attributes_reply_reaches_input_side() {
        let (_session, data_tx, mut input_rx) =
            TerminalSession::spawn("test".into(), 80, 24).unwrap();
        data_tx.send(b"\x1b[c".to_vec()).unwrap();
        let reply = input_rx.recv().await.unwrap();
        assert_eq!(reply, b"\x1b[?1;0c".to_vec());
    }

    #[test]
    fn test_resize_updates_buffer() {
        let (session, _data_tx, _input_rx) = TerminalSession::spawn("test".into(), 80, 24).unwrap();
        session.resize(40, 10);
        let buffer = session.buffer.lock();
        assert_eq!(buffer.width(), 40);
        assert_eq!(buffer.height(), 10);
    }

    #[test]
    fn test_write_input_fails_after_channel_drop() {
        let (session, _data_tx, input_rx) = TerminalSession::spawn("test".into(), 80, 24).unwrap();
        drop(input_rx);
        assert!(session.write_input(b"x").is_err());
    }
}
