use anyhow::{anyhow, Context};
use clap::Parser;
use log::{error, info};
use std::path::PathBuf;
use std::fs;
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};
use xray::config::{self, Config, ServerConfig};
use xray::debugger::session::{self, SessionHandle};
use xray::debugger::{Debugger, NopHook};
use xray::demo::DemoMachine;
use xray::server::target::{Control, DebugTarget};
use xray::server::{Handle, Server};

/// Counter loop used when no memory image is given:
///
/// ```text
/// 0000  ld a,00h
/// 0002  inc a
/// 0003  ld (4000h),a
/// 0006  call 0010h
/// 0009  jp 0002h
/// 0010  ld hl,4000h
/// 0013  ld de,4001h
/// 0016  ld bc,000fh
/// 0019  ldir
/// 001b  ret
/// ```
const DEMO_PROGRAM: &[u8] = &[
    0x3E, 0x00, 0x3C, 0x32, 0x00, 0x40, 0xCD, 0x10, 0x00, 0xC3, 0x02, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x21, 0x00, 0x40, 0x11, 0x01, 0x40, 0x01, 0x0F, 0x00, 0xED, 0xB0, 0xC9,
];

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to listen on (default: 0.0.0.0:8080)
    #[clap(long)]
    listen: Option<String>,

    /// Config file (default: ~/.config/xray/config.toml)
    #[clap(long)]
    config: Option<PathBuf>,

    /// Raw memory image, a small demo program is used if not set
    #[clap(long)]
    image: Option<PathBuf>,

    /// Image load address, execution starts here (decimal or 0x-prefixed hex)
    #[clap(long, default_value = "0", value_parser = parse_address)]
    load_address: u16,

    /// Optional log file (no log output to stderr)
    #[clap(long)]
    log_file: Option<PathBuf>,

    /// Start with instruction trace display enabled
    #[clap(long)]
    trace: bool,

    /// Silence debugger and server logs, startup and shutdown messages are kept
    #[clap(long)]
    quiet: bool,
}

fn parse_address(s: &str) -> Result<u16, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid address `{s}`: {e}"))
}

/// Start the debugging server. Without it the emulator still runs, just headless.
fn start_server(
    config: &ServerConfig,
    session: &SessionHandle,
) -> anyhow::Result<Option<(Handle, JoinHandle<()>)>> {
    match Server::bind(config, Arc::new(session.clone())) {
        Ok(server) => Ok(Some(server.spawn()?)),
        Err(err) if err.is_fatal() => {
            session.shutdown();
            Err(err.into())
        }
        Err(err) => {
            error!(target: "server", "debugging server is not available: {err:#}");
            let session = session.clone();
            thread::spawn(move || session.control(Control::Continue));
            Ok(None)
        }
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    xray::log::init(args.log_file.as_deref()).context("open log file")?;
    if args.quiet {
        xray::log::disable();
    }

    let mut config = Config::from_file(args.config.as_deref()).unwrap_or_default();
    if let Some(listen) = args.listen {
        config.server.listen = listen;
    }
    config::set(config);
    let config = config::current();

    let program = match &args.image {
        Some(path) => fs::read(path).with_context(|| format!("read image {}", path.display()))?,
        None => DEMO_PROGRAM.to_vec(),
    };
    let machine = DemoMachine::with_program(args.load_address, &program);
    let mut debugger = Debugger::new(machine, NopHook::default());
    debugger.set_trace(args.trace);

    let (session, emulation) = session::spawn(debugger, config.server.request_timeout())?;

    let server = start_server(&config.server, &session)?;

    let (stop_tx, stop_rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        _ = stop_tx.send(());
    })?;
    stop_rx.recv()?;
    info!(target: "debugger", "Shutting down");

    if let Some((handle, server_thread)) = server {
        drop(handle);
        server_thread
            .join()
            .map_err(|_| anyhow!("server thread panicked"))?;
    }
    session.shutdown();
    emulation
        .join()
        .map_err(|_| anyhow!("emulation thread panicked"))?;
    Ok(())
}
