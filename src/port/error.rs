//! Port allocation error types.

/// Errors that can occur while allocating a port.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PortError {
    /// Every port in the scanned range is taken.
    #[error("No free port in range {start}..{end}")]
    Exhausted { start: u16, end: u32 },

    /// The scan width was zero.
    #[error("Port scan width must be greater than zero")]
    EmptyRange,
}
