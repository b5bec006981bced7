//! Host port allocation.

use std::net::{Ipv4Addr, TcpListener};

use crate::error::{ContainerError, FixtainerError};

/// Ask the OS for a TCP port that is currently free on the local host.
///
/// The listener is closed before the port is handed to the container engine,
/// so another process can claim the port in between. That race is inherent to
/// probing for a port and then binding it elsewhere; callers that lose it see
/// the container fail to start.
///
/// # Errors
///
/// Returns `ContainerError::PortAllocationFailed` if no ephemeral port can be
/// bound.
pub fn allocate_port() -> Result<u16, FixtainerError> {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).map_err(|error| port_error(&error))?;
    let address = listener.local_addr().map_err(|error| port_error(&error))?;
    Ok(address.port())
}

fn port_error(error: &std::io::Error) -> FixtainerError {
    FixtainerError::from(ContainerError::PortAllocationFailed {
        message: error.to_string(),
    })
}
