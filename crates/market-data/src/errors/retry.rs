/// Classification for retry policy.
///
/// Used by the orchestrator to decide what happens after a provider call
/// fails for one (candidate, provider) pair.
///
/// # Behavior Summary
///
/// | Class | Retry same pair? | Try other pairs? |
/// |-------|------------------|------------------|
/// | `Never` | No | No (whole plan aborted) |
/// | `WithBackoff` | Yes, after backoff | After the attempt budget is spent |
/// | `Throttled` | Only when no other provider remains for the candidate | Yes |
/// | `NextCandidate` | No | Yes |
/// | `Skip` | No | Yes |
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RetryClass {
    /// Never retry - bad API key, bad request, or terminal failure.
    /// Retrying anything else in the plan cannot succeed either.
    Never,

    /// Transient upstream failure (timeout, 5xx, malformed payload).
    WithBackoff,

    /// Our own rate limiter or the upstream refused the call for now.
    Throttled,

    /// The provider does not know this symbol.
    NextCandidate,

    /// The provider cannot serve this request shape at all.
    Skip,
}
