use crate::debugger::trap::TrapId;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    // --------------------------------- generic errors --------------------------------------------
    #[error(transparent)]
    IO(#[from] std::io::Error),

    // --------------------------------- trap table errors -----------------------------------------
    #[error("cannot set more than {0} traps")]
    TrapTableFull(usize),
    #[error("[{0}] is not a valid trap")]
    TrapNotFound(TrapId),

    // --------------------------------- breakpoint registry errors --------------------------------
    #[error("cannot set more than {0} breakpoints")]
    BreakpointLimitReached(usize),
    #[error("breakpoint id {0} too large")]
    BreakpointIdOutOfRange(usize),
    #[error("breakpoint {0} is not enabled")]
    BreakpointNotEnabled(usize),

    // --------------------------------- emulation executor errors ---------------------------------
    #[error("emulation executor is gone")]
    ExecutorGone,
    #[error("emulation executor did not answer in {0:?}")]
    ExecutorTimeout(std::time::Duration),
    #[error("action runner is busy, `{0}` dropped")]
    RunnerBusy(&'static str),

    // --------------------------------- protocol errors -------------------------------------------
    #[error("malformed command: {0}")]
    MalformedCommand(String),
    #[error("memory range {start}+{length} is outside of the address space")]
    InvalidMemoryRange { start: u32, length: u32 },

    // --------------------------------- transport errors ------------------------------------------
    #[error("http request parsing error: {0}")]
    HttpParsing(#[from] httparse::Error),
    #[error("http request is incomplete")]
    HttpIncomplete,
    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),
    #[error("websocket handshake failed: {0}")]
    Handshake(String),
    #[error("channel closed by peer")]
    ChannelClosed,
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    // --------------------------------- configuration errors --------------------------------------
    #[error("config file parsing error: {0}")]
    Config(#[from] toml::de::Error),
    #[error("invalid listen address `{0}`")]
    ListenAddress(String),
}

impl Error {
    /// Return a hint to an interface - continue serving after error or drop the debugging subsystem.
    pub fn is_fatal(&self) -> bool {
        match self {
            Error::IO(_) => false,
            Error::TrapTableFull(_) => false,
            Error::TrapNotFound(_) => false,
            Error::BreakpointLimitReached(_) => false,
            Error::BreakpointIdOutOfRange(_) => false,
            Error::BreakpointNotEnabled(_) => false,
            Error::ExecutorTimeout(_) => false,
            Error::RunnerBusy(_) => false,
            Error::MalformedCommand(_) => false,
            Error::InvalidMemoryRange { .. } => false,
            Error::HttpParsing(_) => false,
            Error::HttpIncomplete => false,
            Error::WebSocket(_) => false,
            Error::Handshake(_) => false,
            Error::ChannelClosed => false,
            Error::Json(_) => false,
            Error::Config(_) => false,
            // server is not started, emulation goes on without it
            Error::ListenAddress(_) => false,

            // currently fatal errors
            Error::ExecutorGone => true,
        }
    }
}

#[macro_export]
macro_rules! _error {
    ($log_fn: path, $res: expr) => {
        match $res {
            Ok(value) => Some(value),
            Err(e) => {
                $log_fn!(target: "debugger", "{:#}", e);
                None
            }
        }
    };
    ($log_fn: path, $res: expr, $msg: tt) => {
        match $res {
            Ok(value) => Some(value),
            Err(e) => {
                $log_fn!(target: "debugger", concat!($msg, " {:#}"), e);
                None
            }
        }
    };
}

/// Transforms `Result` into `Option` and logs an error if it occurs.
#[macro_export]
macro_rules! weak_error {
    ($res: expr) => {
        $crate::_error!(log::warn, $res)
    };
    ($res: expr, $msg: tt) => {
        $crate::_error!(log::warn, $res, $msg)
    };
}

/// Transforms `Result` into `Option` and put error into debug logs if it occurs.
#[macro_export]
macro_rules! muted_error {
    ($res: expr) => {
        $crate::_error!(log::debug, $res)
    };
    ($res: expr, $msg: tt) => {
        $crate::_error!(log::debug, $res, $msg)
    };
}
