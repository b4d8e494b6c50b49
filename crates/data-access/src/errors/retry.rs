/// Classification for retry policy.
///
/// Used by the retry executor to decide whether another attempt can
/// possibly succeed.
///
/// | Class | Retried? | Consumes retry budget? |
/// |-------|----------|------------------------|
/// | `Never` | No | No |
/// | `WithBackoff` | Yes, up to `max_retries` | Yes |
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RetryClass {
    /// Never retry - bad key, authorization failure, undecodable payload.
    /// The request is fundamentally invalid and retrying only burns quota.
    Never,

    /// Retry after an exponential, jittered delay.
    ///
    /// Used for timeouts, dropped connections, 5xx responses and explicit
    /// throttling signals from the provider.
    WithBackoff,
}
