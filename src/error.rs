//! The error taxonomy from the error-handling design: every failure is
//! classified by how far it is allowed to propagate.

use std::fmt;

pub type Result<T> = std::result::Result<T, Error>;

/// How far an error is allowed to propagate before it must be caught,
/// logged and counted instead of unwinding further.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// WantRead/WantWrite, partial accept, no-progress read: retry at the
    /// next readiness event.
    Transient,
    /// TLS handshake failure, malformed HTTP, malformed WS frame, stalled
    /// broadcast: close the session, keep the process running.
    SessionFatal,
    /// FrameSource/Encoder setup failure: log, stay IDLE, retry on the
    /// next viewer.
    SubsystemFatal,
    /// Bind/listen failure, TLS context creation failure at startup: log
    /// and exit non-zero.
    ProcessFatal,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TLS handshake failed: {0}")]
    TlsHandshake(String),

    #[error("malformed HTTP request")]
    MalformedHttp,

    #[error("malformed WebSocket frame: {0}")]
    MalformedFrame(&'static str),

    #[error("peer sent an unmasked client frame")]
    UnmaskedClientFrame,

    #[error("unsupported codec {0:?}")]
    UnsupportedCodec(String),

    #[error("encoder configuration failed: {0}")]
    EncoderConfigure(String),

    #[error("frame source initialization failed: {0}")]
    FrameSourceInit(String),

    #[error("failed to bind {0}: {1}")]
    Bind(String, #[source] std::io::Error),

    #[error("failed to build TLS server context: {0}")]
    TlsContext(String),

    #[error("malformed control message: {0}")]
    MalformedControlMessage(#[from] prost::DecodeError),

    #[error("broadcast stalled, closing session")]
    BroadcastStalled,

    #[error("peer disconnected")]
    Disconnected,
}

impl Error {
    pub fn severity(&self) -> Severity {
        use Error::*;
        match self {
            Io(_) => Severity::Transient,
            TlsHandshake(_) | MalformedHttp | MalformedFrame(_) | UnmaskedClientFrame
            | MalformedControlMessage(_) | BroadcastStalled | Disconnected => {
                Severity::SessionFatal
            }
            UnsupportedCodec(_) | EncoderConfigure(_) | FrameSourceInit(_) => {
                Severity::SubsystemFatal
            }
            Bind(..) | TlsContext(_) => Severity::ProcessFatal,
        }
    }
}

/// Bounded counters for errors that are logged-and-swallowed rather than
/// propagated, one per severity. Plain atomics: cheap to bump from any
/// thread, no lock contention on the hot broadcast path.
#[derive(Default)]
pub struct ErrorCounters {
    transient: std::sync::atomic::AtomicU64,
    session_fatal: std::sync::atomic::AtomicU64,
    subsystem_fatal: std::sync::atomic::AtomicU64,
}

impl ErrorCounters {
    pub fn record(&self, severity: Severity) {
        use std::sync::atomic::Ordering::Relaxed;
        match severity {
            Severity::Transient => self.transient.fetch_add(1, Relaxed),
            Severity::SessionFatal => self.session_fatal.fetch_add(1, Relaxed),
            Severity::SubsystemFatal => self.subsystem_fatal.fetch_add(1, Relaxed),
            Severity::ProcessFatal => unreachable!("process-fatal errors are not counted, they exit"),
        };
    }

    pub fn transient(&self) -> u64 {
        self.transient.load(std::sync::atomic::Ordering::Relaxed)
    }

    pub fn session_fatal(&self) -> u64 {
        self.session_fatal.load(std::sync::atomic::Ordering::Relaxed)
    }

    pub fn subsystem_fatal(&self) -> u64 {
        self.subsystem_fatal.load(std::sync::atomic::Ordering::Relaxed)
    }
}

impl fmt::Debug for ErrorCounters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorCounters")
            .field("transient", &self.transient())
            .field("session_fatal", &self.session_fatal())
            .field("subsystem_fatal", &self.subsystem_fatal())
            .finish()
    }
}
