//! Debugging channel transport.

use crate::debugger::Error;
use crate::muted_error;
use std::io::ErrorKind;
use std::net::TcpStream;
use std::time::Duration;
use tungstenite::{Message, WebSocket};

/// Bidirectional message channel with a remote client.
pub trait Channel: Send {
    /// Wait for the next text message no longer than the channel read timeout.
    /// Return `None` if nothing arrived.
    fn read_text(&mut self) -> Result<Option<String>, Error>;

    fn send_text(&mut self, text: String) -> Result<(), Error>;

    fn send_binary(&mut self, data: Vec<u8>) -> Result<(), Error>;

    /// Close channel, errors are ignored.
    fn close(&mut self) {}
}

/// WebSocket based channel.
pub struct WsChannel {
    socket: WebSocket<TcpStream>,
}

impl WsChannel {
    /// Perform a server side handshake over a fresh connection.
    ///
    /// # Arguments
    ///
    /// * `stream`: accepted connection, HTTP upgrade request must not be consumed yet
    /// * `read_timeout`: how long [`Channel::read_text`] waits for a message
    pub fn accept(stream: TcpStream, read_timeout: Duration) -> Result<Self, Error> {
        stream.set_nodelay(true)?;
        let socket = tungstenite::accept(stream).map_err(|e| Error::Handshake(e.to_string()))?;
        socket.get_ref().set_read_timeout(Some(read_timeout))?;
        Ok(Self { socket })
    }
}

fn map_ws_error(err: tungstenite::Error) -> Error {
    match err {
        tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
            Error::ChannelClosed
        }
        e => Error::WebSocket(e),
    }
}

impl Channel for WsChannel {
    fn read_text(&mut self) -> Result<Option<String>, Error> {
        match self.socket.read() {
            Ok(Message::Text(text)) => Ok(Some(text)),
            Ok(Message::Close(_)) => Err(Error::ChannelClosed),
            // pings are answered by the socket itself
            Ok(_) => Ok(None),
            Err(tungstenite::Error::Io(e))
                if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) =>
            {
                Ok(None)
            }
            Err(e) => Err(map_ws_error(e)),
        }
    }

    fn send_text(&mut self, text: String) -> Result<(), Error> {
        self.socket.send(Message::Text(text)).map_err(map_ws_error)
    }

    fn send_binary(&mut self, data: Vec<u8>) -> Result<(), Error> {
        self.socket.send(Message::Binary(data)).map_err(map_ws_error)
    }

    fn close(&mut self) {
        muted_error!(self.socket.close(None));
        muted_error!(self.socket.flush());
    }
}
