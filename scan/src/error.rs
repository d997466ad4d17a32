use std::{collections::TryReserveError, error::Error, fmt, io};

use crate::verify::Mismatch;

/// The scan module's result type.
pub type Result<T> = std::result::Result<T, ScanErr>;

/// Every way a run can fail. None of them is recoverable: a run either
/// completes every trial on every worker or it is aborted as a whole.
#[derive(Debug)]
pub enum ScanErr {
    /// Invalid run parameters, caught before any computation.
    Config(String),
    /// A worker could not allocate its buffers.
    Alloc {
        rank: usize,
        elems: usize,
        source: TryReserveError,
    },
    /// A chain link failed to send or receive.
    Comm {
        rank: usize,
        peer: usize,
        source: io::Error,
    },
    /// A chain link delivered something the protocol does not allow here.
    UnexpectedMessage {
        rank: usize,
        peer: usize,
        expected: &'static str,
        got: String,
    },
    /// A neighbour reported its own failure before leaving the chain.
    PeerFailed {
        rank: usize,
        peer: usize,
        detail: String,
    },
    /// The parallel result diverged from the sequential baseline.
    Mismatch(Mismatch),
    /// A worker task or thread pool could not be run or joined.
    Worker(String),
}

impl ScanErr {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Whether this error is the echo of a failure that started elsewhere
    /// in the chain rather than its cause.
    pub fn is_cascade(&self) -> bool {
        match self {
            Self::PeerFailed { .. } => true,
            Self::Comm { source, .. } => matches!(
                source.kind(),
                io::ErrorKind::UnexpectedEof
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
            ),
            _ => false,
        }
    }

    /// Whether this error belongs to the communication class.
    pub fn is_communication(&self) -> bool {
        matches!(
            self,
            Self::Comm { .. } | Self::UnexpectedMessage { .. } | Self::PeerFailed { .. }
        )
    }

    /// Process exit code a binary should report for this error.
    ///
    /// Usage 1, allocation 2, communication 4, verification 5. Code 3 is
    /// left for I/O failures outside the engine, such as the stats file.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Config(_) => 1,
            Self::Alloc { .. } => 2,
            Self::Comm { .. }
            | Self::UnexpectedMessage { .. }
            | Self::PeerFailed { .. }
            | Self::Worker(_) => 4,
            Self::Mismatch(_) => 5,
        }
    }
}

impl fmt::Display for ScanErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "invalid config: {msg}"),
            Self::Alloc {
                rank,
                elems,
                source,
            } => write!(f, "rank {rank} failed to allocate {elems} elements: {source}"),
            Self::Comm { rank, peer, source } => {
                write!(f, "rank {rank} lost its link to rank {peer}: {source}")
            }
            Self::UnexpectedMessage {
                rank,
                peer,
                expected,
                got,
            } => write!(
                f,
                "rank {rank} expected {expected} from rank {peer}, got {got}"
            ),
            Self::PeerFailed { rank, peer, detail } => {
                write!(f, "rank {rank} was told rank {peer} failed: {detail}")
            }
            Self::Mismatch(mismatch) => write!(f, "wrong parallel result: {mismatch}"),
            Self::Worker(msg) => write!(f, "worker error: {msg}"),
        }
    }
}

impl Error for ScanErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Alloc { source, .. } => Some(source),
            Self::Comm { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<Mismatch> for ScanErr {
    fn from(value: Mismatch) -> Self {
        Self::Mismatch(value)
    }
}

/// Process exit code for an error chain, outermost error first.
///
/// The first [`ScanErr`] in the chain decides the code, including one
/// carried inside an `io::Error`. Any other I/O failure is 3 and anything
/// else is a usage error.
pub fn exit_code_of<'a>(chain: impl IntoIterator<Item = &'a (dyn Error + 'static)>) -> u8 {
    let mut io_failed = false;

    for err in chain {
        if let Some(e) = err.downcast_ref::<ScanErr>() {
            return e.exit_code();
        }

        if let Some(e) = err.downcast_ref::<io::Error>() {
            if let Some(inner) = e.get_ref().and_then(|inner| inner.downcast_ref::<ScanErr>()) {
                return inner.exit_code();
            }
            io_failed = true;
        }
    }

    if io_failed { 3 } else { 1 }
}

/// Boundary conversion for binaries / I/O APIs.
impl From<ScanErr> for io::Error {
    fn from(value: ScanErr) -> Self {
        match value {
            ScanErr::Comm { source, .. } => source,
            other => io::Error::other(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::iter;

    use super::*;

    #[derive(Debug)]
    struct Context(ScanErr);

    impl fmt::Display for Context {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("while running")
        }
    }

    impl Error for Context {
        fn source(&self) -> Option<&(dyn Error + 'static)> {
            Some(&self.0)
        }
    }

    fn code_of(err: &(dyn Error + 'static)) -> u8 {
        exit_code_of(iter::successors(Some(err), |&e| e.source()))
    }

    #[test]
    fn exit_codes_by_class() {
        assert_eq!(code_of(&ScanErr::config("bad")), 1);
        assert_eq!(code_of(&io::Error::other("disk full")), 3);
        assert_eq!(code_of(&fmt::Error), 1);

        let lost = ScanErr::Comm {
            rank: 1,
            peer: 0,
            source: io::ErrorKind::BrokenPipe.into(),
        };
        assert_eq!(code_of(&lost), 4);
    }

    #[test]
    fn exit_code_looks_through_wrappers() {
        let failed = ScanErr::PeerFailed {
            rank: 0,
            peer: 1,
            detail: "out of memory".to_string(),
        };
        assert_eq!(code_of(&Context(failed)), 4);

        let io: io::Error = ScanErr::config("bad").into();
        assert_eq!(code_of(&io), 1);
    }
}
