//! Classification of Bollard errors.
//!
//! Connection failures are mapped onto semantic `ContainerError` variants, and
//! daemon responses that teardown treats as benign (`404`, `304`) are
//! recognised here so the rest of the crate never matches on status codes.

use std::io::ErrorKind;
use std::path::Path;

use bollard::errors::Error as BollardError;

use crate::error::ContainerError;

const NOT_FOUND: u16 = 404;
const NOT_MODIFIED: u16 = 304;

/// Whether the daemon reported that the addressed object does not exist.
pub(crate) fn is_not_found(error: &BollardError) -> bool {
    matches!(
        error,
        BollardError::DockerResponseServerError {
            status_code: NOT_FOUND,
            ..
        }
    )
}

/// Whether a stop request hit a container that was not running.
pub(crate) fn is_already_stopped(error: &BollardError) -> bool {
    matches!(
        error,
        BollardError::DockerResponseServerError {
            status_code: NOT_MODIFIED,
            ..
        }
    )
}

/// Strip `unix://` or `npipe://` to get the socket's filesystem path.
fn socket_path(socket_uri: &str) -> Option<&Path> {
    socket_uri
        .strip_prefix("unix://")
        .or_else(|| socket_uri.strip_prefix("npipe://"))
        .map(Path::new)
}

fn classify_io_kind(kind: ErrorKind, path: Option<&Path>, message: String) -> ContainerError {
    match (kind, path) {
        (ErrorKind::PermissionDenied, Some(socket)) => ContainerError::PermissionDenied {
            path: socket.to_path_buf(),
        },
        (ErrorKind::NotFound, Some(socket)) => ContainerError::SocketNotFound {
            path: socket.to_path_buf(),
        },
        _ => ContainerError::ConnectionFailed { message },
    }
}

/// Map a Bollard connection error onto the most specific `ContainerError`.
pub(super) fn classify_connection_error(error: &BollardError, socket_uri: &str) -> ContainerError {
    let path = socket_path(socket_uri);
    let message = error.to_string();

    if let (BollardError::SocketNotFoundError(_), Some(socket)) = (error, path) {
        return ContainerError::SocketNotFound {
            path: socket.to_path_buf(),
        };
    }

    let io_kind = match error {
        BollardError::IOError { err } => Some(io_kind_in_chain(err).unwrap_or_else(|| err.kind())),
        other => io_kind_in_chain(other),
    };

    match io_kind {
        Some(kind) => classify_io_kind(kind, path, message),
        None => ContainerError::ConnectionFailed { message },
    }
}

/// Walk the source chain looking for an `io::Error`.
fn io_kind_in_chain(error: &dyn std::error::Error) -> Option<ErrorKind> {
    let mut current = error.source();
    while let Some(cause) = current {
        if let Some(io_error) = cause.downcast_ref::<std::io::Error>() {
            return Some(io_error.kind());
        }
        current = cause.source();
    }
    None
}
