use super::Teardown;

/// How the request ended, forwarded to every teardown so cleanup can react
/// to failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeardownOutcome {
    /// The response was produced normally.
    Success,
    /// The request failed after the resource was acquired.
    Failure,
    /// The request task was cancelled before the scope closed.
    Cancelled,
}

/// Per-request scoped-resource stack.
///
/// Resolvers that acquire a resource register its teardown here; the stack
/// unwinds in reverse acquisition order exactly once per request. If the
/// request task is cancelled before [`RequestScope::close`] runs, `Drop`
/// spawns the outstanding teardowns so an acquired resource is never leaked
/// without a teardown attempt.
#[derive(Default)]
pub struct RequestScope {
    teardowns: Vec<Teardown>,
}

impl RequestScope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, teardown: Teardown) {
        self.teardowns.push(teardown);
    }

    pub fn len(&self) -> usize {
        self.teardowns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.teardowns.is_empty()
    }

    /// Unwind the stack, running teardowns in reverse acquisition order.
    pub async fn close(&mut self, outcome: TeardownOutcome) {
        for teardown in self.teardowns.drain(..).rev() {
            teardown(outcome).await;
        }
    }
}

impl Drop for RequestScope {
    fn drop(&mut self) {
        if self.teardowns.is_empty() {
            return;
        }
        tracing::warn!(
            pending = self.teardowns.len(),
            "request scope dropped before closing; spawning teardowns"
        );
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            for teardown in self.teardowns.drain(..).rev() {
                handle.spawn(teardown(TeardownOutcome::Cancelled));
            }
        }
    }
}
