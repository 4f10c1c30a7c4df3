//! Protocol server.
//!
//! Network executor: a single thread that owns the listener, the debugging channel, the
//! breakpoint registry and the memory segment cache. It never waits for the machine to
//! stop, blocking controls are handed over to the [`runner::ActionRunner`]. New
//! connections are routed and answered on short-lived connection threads.

pub mod http;
pub mod memory;
pub mod protocol;
pub mod resources;
pub mod runner;
pub mod scheduler;
pub mod snapshot;
pub mod target;
pub mod transport;

use crate::config::ServerConfig;
use crate::debugger::breakpoint::BreakpointRegistry;
use crate::debugger::trap::ADDRESS_SPACE;
use crate::debugger::Error;
use crate::server::http::Route;
use crate::server::memory::MemorySegmentCache;
use crate::server::protocol::Action;
use crate::server::runner::ActionRunner;
use crate::server::scheduler::{RunFlags, UpdateScheduler};
use crate::server::snapshot::Snapshot;
use crate::server::target::DebugTarget;
use crate::server::transport::{Channel, WsChannel};
use crate::{weak_error, xr_debug, xr_info, xr_warn};
use std::io::ErrorKind;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Limit for a single write to a client.
const WRITE_TIMEOUT: Duration = Duration::from_secs(1);

/// Stops the server when dropped.
#[derive(Default)]
pub struct Handle {
    flag: Arc<AtomicBool>,
}

impl Drop for Handle {
    fn drop(&mut self) {
        self.flag.store(true, Ordering::SeqCst)
    }
}

pub struct Server {
    listener: TcpListener,
    target: Arc<dyn DebugTarget>,
    runner: ActionRunner,
    flags: Arc<RunFlags>,
    registry: BreakpointRegistry,
    memory: MemorySegmentCache,
    scheduler: UpdateScheduler,
    channel: Option<Box<dyn Channel>>,
    /// Channels that finished the handshake on a connection thread.
    handshakes: Receiver<WsChannel>,
    handshake_sender: Sender<WsChannel>,
    poll_interval: Duration,
}

impl Server {
    /// Bind a listener and start the action runner.
    pub fn bind(config: &ServerConfig, target: Arc<dyn DebugTarget>) -> Result<Self, Error> {
        let addr = config.listen_addr()?;
        let listener = TcpListener::bind(addr)?;
        listener.set_nonblocking(true)?;

        let flags = Arc::new(RunFlags::default());
        let runner = ActionRunner::spawn(target.clone(), flags.clone())?;
        let (handshake_sender, handshakes) = mpsc::channel();

        xr_info!(target: "server", "Listening on {}", listener.local_addr()?);
        Ok(Self {
            listener,
            target,
            runner,
            flags,
            registry: BreakpointRegistry::default(),
            memory: MemorySegmentCache::default(),
            scheduler: UpdateScheduler::new(config.push_interval()),
            channel: None,
            handshakes,
            handshake_sender,
            poll_interval: config.poll_interval(),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, Error> {
        Ok(self.listener.local_addr()?)
    }

    pub fn registry(&self) -> &BreakpointRegistry {
        &self.registry
    }

    pub fn is_connected(&self) -> bool {
        self.channel.is_some()
    }

    /// Run the poll loop in a new thread.
    pub fn spawn(self) -> Result<(Handle, JoinHandle<()>), Error> {
        let handle = Handle::default();
        let stop = handle.flag.clone();
        let thread = thread::Builder::new()
            .name("xray-server".to_string())
            .spawn(move || self.run(&stop))?;
        Ok((handle, thread))
    }

    /// Run the poll loop until `stop` is set. A running blocking control is paused.
    pub fn run(mut self, stop: &AtomicBool) {
        while !stop.load(Ordering::SeqCst) {
            self.tick();
        }
        if let Some(mut channel) = self.channel.take() {
            channel.close();
        }
        self.runner.shutdown(self.target.as_ref());
        xr_info!(target: "server", "Server stopped");
    }

    /// Single poll loop iteration: accept connections, serve one inbound message,
    /// push scheduled updates. Takes about one poll interval.
    pub fn tick(&mut self) {
        let tick_start = Instant::now();
        self.accept_connections();

        match self.channel.as_mut().map(|channel| channel.read_text()) {
            Some(Ok(Some(text))) => self.dispatch(&text),
            Some(Ok(None)) => {}
            Some(Err(e)) => self.drop_channel(e),
            None => {
                let timeout = self
                    .poll_interval
                    .checked_sub(tick_start.elapsed())
                    .unwrap_or_else(|| Duration::from_secs(0));
                thread::sleep(timeout);
            }
        }

        if self.scheduler.poll(&self.flags, Instant::now()) {
            self.memory.invalidate();
            self.push_snapshot();
            self.push_memory(0, ADDRESS_SPACE as u32, true);
        }
    }

    /// Replace current debugging channel, last connected client wins.
    pub fn attach(&mut self, channel: Box<dyn Channel>) {
        if let Some(mut previous) = self.channel.replace(channel) {
            xr_info!(target: "server", "New client connected, previous channel is closed");
            previous.close();
        }
        self.memory.invalidate();
    }

    fn drop_channel(&mut self, reason: Error) {
        match reason {
            Error::ChannelClosed => xr_info!(target: "server", "Client disconnected"),
            e => xr_warn!(target: "server", "Channel dropped: {e}"),
        }
        self.channel = None;
    }

    /// Hand new connections over to connection threads, attach channels whose handshake
    /// is complete.
    fn accept_connections(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    xr_debug!(target: "server", "Connection from {peer}");
                    let target = self.target.clone();
                    let handshakes = self.handshake_sender.clone();
                    let read_timeout = self.poll_interval;
                    let spawned = thread::Builder::new()
                        .name("xray-connection".to_string())
                        .spawn(move || {
                            let handled = handle_connection(
                                stream,
                                target.as_ref(),
                                read_timeout,
                                &handshakes,
                            );
                            weak_error!(handled, "connection:");
                        });
                    weak_error!(spawned.map_err(Error::from), "connection:");
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) => {
                    xr_warn!(target: "server", "accept failed: {e}");
                    break;
                }
            }
        }

        while let Ok(channel) = self.handshakes.try_recv() {
            self.attach(Box::new(channel));
        }
    }

    /// Execute a channel message.
    pub fn dispatch(&mut self, text: &str) {
        let Some(action) = weak_error!(Action::parse(text)) else {
            return;
        };
        xr_debug!(target: "server", "Action: {action:?}");

        match action {
            Action::Refresh => self.push_snapshot(),
            Action::Control(control) if control.is_blocking() => {
                weak_error!(self.runner.submit(control));
                self.push_snapshot();
            }
            Action::Control(control) => {
                weak_error!(self.target.control(control));
                self.memory.invalidate();
                self.push_snapshot();
            }
            Action::GetMemory {
                start,
                length,
                force,
            } => self.push_memory(start, length, force),
            Action::AddBreakpoint { kind, address } => {
                let target = &self.target;
                let added = self
                    .registry
                    .add(address, kind, |address, kind| target.set_trap(address, kind));
                if let Some(record) = weak_error!(added) {
                    xr_info!(target: "server", "{record} added");
                }
                self.push_snapshot();
            }
            Action::RemoveBreakpoint(id) => {
                let target = &self.target;
                let removed = self.registry.remove(id, |trap| target.clear_trap(trap));
                if let Some(record) = weak_error!(removed) {
                    xr_info!(target: "server", "{record} removed");
                }
                self.push_snapshot();
            }
        }
    }

    fn push_snapshot(&mut self) {
        if self.channel.is_none() {
            return;
        }
        let Some(registers) = weak_error!(self.target.state(), "snapshot:") else {
            return;
        };
        let snapshot = Snapshot::new(
            self.target.context(),
            &registers,
            &self.registry,
            self.flags.is_running(),
        );
        if let Some(json) = weak_error!(snapshot.to_json()) {
            self.send(|channel| channel.send_text(json));
        }
    }

    fn push_memory(&mut self, start: u32, length: u32, force: bool) {
        if self.channel.is_none() {
            return;
        }
        let segment = self
            .memory
            .segment(self.target.as_ref(), start, length, force);
        if let Some(frame) = weak_error!(segment, "memory:") {
            self.send(|channel| channel.send_binary(frame));
        }
    }

    fn send(&mut self, f: impl FnOnce(&mut dyn Channel) -> Result<(), Error>) {
        let Some(channel) = self.channel.as_mut() else {
            return;
        };
        if let Err(e) = f(channel.as_mut()) {
            self.drop_channel(e);
        }
    }
}

/// Route a fresh connection: answer a plain request or complete the channel handshake.
fn handle_connection(
    stream: TcpStream,
    target: &dyn DebugTarget,
    read_timeout: Duration,
    handshakes: &Sender<WsChannel>,
) -> Result<(), Error> {
    stream.set_nonblocking(false)?;
    stream.set_write_timeout(Some(WRITE_TIMEOUT))?;
    match http::route(&stream)? {
        Route::Channel => {
            let channel = WsChannel::accept(stream, read_timeout)?;
            // server is gone if the receiver is dropped
            _ = handshakes.send(channel);
        }
        route => {
            if let Route::NotFound(path) = &route {
                xr_debug!(target: "server", "Not found: {path}");
            }
            http::respond(stream, &route, target)?;
        }
    }
    Ok(())
}
