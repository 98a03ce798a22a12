use std::time::Duration;

use tracing::trace;

use super::{Completion, Transport};

/// Advances `transport` until it is quiescent or a handle is ready.
///
/// Non-blocking progress is repeated while it advances anything. Once no more
/// immediate progress is possible and nothing has completed yet, waits up to
/// `readiness_wait` for a handle to become ready and goes around again. When
/// there is nothing to wait for, or `readiness_wait` is `None`, the call
/// yields to the runtime once instead so that callers looping on it do not
/// starve the connection tasks.
///
/// Returns every handle that completed during the call.
pub async fn advance<T>(transport: &mut T, readiness_wait: Option<Duration>) -> Vec<Completion>
where
    T: Transport + ?Sized,
{
    let mut completed = Vec::new();

    loop {
        while transport.perform() {}
        completed.extend(transport.take_completed());

        if !completed.is_empty() {
            break;
        }

        match readiness_wait {
            Some(timeout) if transport.in_flight() > 0 => {
                if transport.wait(timeout).await {
                    continue;
                }
                trace!(
                    wait_ms = timeout.as_millis(),
                    "no handle became ready within wait"
                );
                break;
            }
            _ => {
                tokio::task::yield_now().await;
                break;
            }
        }
    }

    completed
}
