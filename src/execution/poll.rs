use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

/// Result of a single polling step
#[derive(Debug, Clone, PartialEq)]
pub enum Step<T> {
    Ready(T),
    Pending,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollPolicy {
    pub interval: Duration,
    /// Give up once this much time has passed since the first step
    pub deadline: Option<Duration>,
}

impl PollPolicy {
    pub fn every(interval: Duration) -> Self {
        Self {
            interval,
            deadline: None,
        }
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

#[derive(Debug, PartialEq)]
pub enum PollError<E> {
    DeadlineElapsed { steps: u32 },
    Cancelled,
    Step(E),
}

/// Run `step` until it is ready, fails, the deadline passes, or shutdown is
/// signalled.
///
/// Shutdown is only observed before a step and while sleeping between steps,
/// never while a step is running. A dropped shutdown sender means the loop can
/// no longer be cancelled.
pub async fn poll_until<T, E, F, Fut>(
    policy: PollPolicy,
    shutdown: &mut watch::Receiver<bool>,
    mut step: F,
) -> Result<T, PollError<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Step<T>, E>>,
{
    let started = Instant::now();
    let mut steps = 0u32;

    loop {
        if *shutdown.borrow() {
            return Err(PollError::Cancelled);
        }
        if let Some(deadline) = policy.deadline {
            if started.elapsed() >= deadline {
                return Err(PollError::DeadlineElapsed { steps });
            }
        }

        steps += 1;
        match step(steps).await {
            Ok(Step::Ready(value)) => return Ok(value),
            Ok(Step::Pending) => {}
            Err(e) => return Err(PollError::Step(e)),
        }

        let sleep = tokio::time::sleep(policy.interval);
        tokio::pin!(sleep);
        tokio::select! {
            _ = &mut sleep => {}
            cancelled = shutdown_signalled(shutdown) => {
                if cancelled {
                    return Err(PollError::Cancelled);
                }
                sleep.await;
            }
        }
    }
}

/// Resolves true once shutdown is signalled, false if the sender is gone
pub async fn shutdown_signalled(shutdown: &mut watch::Receiver<bool>) -> bool {
    shutdown.wait_for(|stop| *stop).await.is_ok()
}
