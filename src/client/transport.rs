use std::error::Error as StdError;
use std::io::ErrorKind;

use super::error::ChatError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TransportFailure {
    Timeout,
    Connection,
    Other,
}

impl TransportFailure {
    pub(crate) fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout | Self::Connection)
    }
}

fn chain_matches(
    err: &(dyn StdError + 'static),
    kinds: &[ErrorKind],
    markers: &[&str],
) -> bool {
    let mut current: Option<&(dyn StdError + 'static)> = Some(err);
    while let Some(source) = current {
        if let Some(io_err) = source.downcast_ref::<std::io::Error>()
            && kinds.contains(&io_err.kind())
        {
            return true;
        }

        let text = source.to_string().to_ascii_lowercase();
        if markers.iter().any(|marker| text.contains(marker)) {
            return true;
        }

        current = source.source();
    }

    false
}

fn chain_has_timeout(err: &(dyn StdError + 'static)) -> bool {
    chain_matches(err, &[ErrorKind::TimedOut], &["timed out"])
}

fn chain_has_broken_connection(err: &(dyn StdError + 'static)) -> bool {
    chain_matches(
        err,
        &[
            ErrorKind::ConnectionRefused,
            ErrorKind::ConnectionReset,
            ErrorKind::ConnectionAborted,
            ErrorKind::BrokenPipe,
            ErrorKind::NotConnected,
            ErrorKind::UnexpectedEof,
        ],
        &[
            "connection refused",
            "connection reset",
            "connection closed",
            "dns error",
            "unexpected eof",
        ],
    )
}

pub(crate) fn classify(err: &reqwest::Error) -> TransportFailure {
    if err.is_timeout() || chain_has_timeout(err) {
        return TransportFailure::Timeout;
    }

    if err.is_connect() || chain_has_broken_connection(err) {
        return TransportFailure::Connection;
    }

    TransportFailure::Other
}

pub(crate) fn into_chat_error(err: reqwest::Error) -> ChatError {
    match classify(&err) {
        TransportFailure::Timeout => ChatError::Timeout { source: err },
        TransportFailure::Connection => ChatError::ConnectionFailure { source: err },
        TransportFailure::Other => ChatError::unexpected(err),
    }
}
