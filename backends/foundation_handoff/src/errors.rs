/// Failures a waiting `put`/`take` can surface to its caller.
///
/// None of these are retried inside a store; the calling task decides
/// whether to retry, log or wind down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandoffError {
    /// The caller's [`crate::CancelToken`] fired while it was blocked.
    Cancelled,

    /// A bounded wait elapsed before the store could serve the call.
    Timeout,

    /// The store reached end-of-stream: nothing more will be put.
    Closed,

    /// Stores need room for at least one item.
    ZeroCapacity,
}

impl HandoffError {
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, HandoffError::Cancelled)
    }

    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, HandoffError::Timeout)
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        matches!(self, HandoffError::Closed)
    }
}

impl core::error::Error for HandoffError {}

impl core::fmt::Display for HandoffError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            HandoffError::Cancelled => write!(f, "HandoffError::Cancelled"),
            HandoffError::Timeout => write!(f, "HandoffError::Timeout"),
            HandoffError::Closed => write!(f, "HandoffError::Closed"),
            HandoffError::ZeroCapacity => {
                write!(f, "HandoffError::ZeroCapacity(capacity must be >= 1)")
            }
        }
    }
}

pub type HandoffResult<T> = core::result::Result<T, HandoffError>;
