//! Free-port discovery by transient bind.

use std::net::{IpAddr, Ipv4Addr, SocketAddr, TcpListener};

use super::error::PortError;

/// First port tried when no configuration is given.
pub const DEFAULT_START_PORT: u16 = 3100;

/// Number of consecutive ports scanned by default.
pub const DEFAULT_SCAN_WIDTH: u16 = 100;

/// Finds free TCP ports by binding a listener and releasing it immediately.
///
/// The allocator holds no state between calls. A port reported as free can
/// still be taken by another process before the preview process binds it;
/// that case surfaces later as a port-in-use failure.
#[derive(Debug, Clone, Copy)]
pub struct PortAllocator {
    host: IpAddr,
}

impl Default for PortAllocator {
    fn default() -> Self {
        Self::new(IpAddr::V4(Ipv4Addr::LOCALHOST))
    }
}

impl PortAllocator {
    /// Create an allocator that probes on the given host address.
    #[must_use]
    pub fn new(host: IpAddr) -> Self {
        Self { host }
    }

    /// Address probes bind to.
    #[must_use]
    pub fn host(&self) -> IpAddr {
        self.host
    }

    /// Check whether `port` can currently be bound.
    #[must_use]
    pub fn probe(&self, port: u16) -> bool {
        match TcpListener::bind(SocketAddr::new(self.host, port)) {
            Ok(listener) => {
                drop(listener);
                true
            }
            Err(e) => {
                tracing::trace!(port, error = %e, "Port unavailable");
                false
            }
        }
    }

    /// Return the first bindable port in `[start, start + width)`.
    ///
    /// The range is clipped at 65535.
    ///
    /// # Errors
    ///
    /// Returns `PortError::Exhausted` if no port in the range is free and
    /// `PortError::EmptyRange` if `width` is zero.
    pub fn find_available(&self, start: u16, width: u16) -> Result<u16, PortError> {
        if width == 0 {
            return Err(PortError::EmptyRange);
        }

        let end = (u32::from(start) + u32::from(width)).min(u32::from(u16::MAX) + 1);
        for candidate in u32::from(start)..end {
            let Ok(port) = u16::try_from(candidate) else {
                break;
            };
            if self.probe(port) {
                tracing::debug!(port, "Allocated port");
                return Ok(port);
            }
        }

        tracing::warn!(start, end, "Port range exhausted");
        Err(PortError::Exhausted { start, end })
    }
}
