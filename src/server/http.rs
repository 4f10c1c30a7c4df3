//! Plain HTTP part of the server: static UI resources and the channel upgrade route.

use crate::debugger::Error;
use crate::server::resources::Resource;
use crate::server::target::DebugTarget;
use std::io::{Read, Write};
use std::net::TcpStream;
use std::thread;
use std::time::{Duration, Instant};

/// Path of the WebSocket upgrade endpoint.
pub const CHANNEL_PATH: &str = "/channel";

const MAX_HEAD_SIZE: usize = 4096;
const MAX_HEADERS: usize = 32;
const HEAD_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Debugging channel upgrade.
    Channel,
    Resource(Resource),
    NotFound(String),
}

/// Outcome of parsing a request head.
enum Head {
    Complete { route: Route, len: usize },
    Partial,
}

fn parse_head(data: &[u8]) -> Result<Head, Error> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut request = httparse::Request::new(&mut headers);

    let len = match request.parse(data)? {
        httparse::Status::Complete(len) => len,
        httparse::Status::Partial => return Ok(Head::Partial),
    };

    let path = request.path.unwrap_or("/");
    let path = path.split_once('?').map_or(path, |(path, _)| path);
    let route = match (request.method, path) {
        (Some("GET"), CHANNEL_PATH) => Route::Channel,
        (Some("GET"), path) => match Resource::from_path(path) {
            Some(resource) => Route::Resource(resource),
            None => Route::NotFound(path.to_string()),
        },
        (_, path) => Route::NotFound(path.to_string()),
    };
    Ok(Head::Complete { route, len })
}

/// Decide where a fresh connection goes. Request bytes are only peeked, so the
/// stream can still be handed over to the WebSocket handshake.
pub fn route(stream: &TcpStream) -> Result<Route, Error> {
    stream.set_read_timeout(Some(HEAD_TIMEOUT))?;
    let deadline = Instant::now() + HEAD_TIMEOUT;
    let mut buf = [0u8; MAX_HEAD_SIZE];

    loop {
        let n = stream.peek(&mut buf)?;
        if n == 0 {
            return Err(Error::HttpIncomplete);
        }
        match parse_head(&buf[..n])? {
            Head::Complete { route, .. } => return Ok(route),
            Head::Partial if n == buf.len() || Instant::now() >= deadline => {
                return Err(Error::HttpIncomplete)
            }
            Head::Partial => thread::sleep(Duration::from_millis(1)),
        }
    }
}

/// Answer a plain HTTP request and close the connection.
pub fn respond(mut stream: TcpStream, route: &Route, target: &dyn DebugTarget) -> Result<(), Error> {
    // consume the request head
    let mut buf = [0u8; MAX_HEAD_SIZE];
    let n = stream.peek(&mut buf)?;
    if let Head::Complete { len, .. } = parse_head(&buf[..n])? {
        stream.read_exact(&mut buf[..len])?;
    }

    match route {
        Route::Resource(resource) => {
            let body = target.resource(*resource);
            write!(
                stream,
                "HTTP/1.1 200 OK\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                resource.content_type(),
                body.len()
            )?;
            stream.write_all(body.as_bytes())?;
        }
        Route::Channel | Route::NotFound(_) => {
            stream.write_all(
                b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
            )?;
        }
    }
    stream.flush()?;
    Ok(())
}
