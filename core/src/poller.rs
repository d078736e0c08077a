//! Wait primitives for eventually consistent control planes.

use std::future::Future;
use std::time::Duration;

use http::StatusCode;
use log::debug;
use tokio::time::{sleep, Instant};

use crate::{Error, Result};

/// Longest pause between two attempts of [`wait_for`].
const MAX_INTERVAL: Duration = Duration::from_secs(40);

/// Per-wait bookkeeping: the deadline and the pause before the next
/// attempt. One lives for exactly one wait call; how the pause grows is up
/// to the caller.
#[derive(Debug)]
struct RetryState {
    started: Instant,
    timeout: Duration,
    interval: Duration,
}

impl RetryState {
    fn new(timeout: Duration, initial_interval: Duration) -> Self {
        Self {
            started: Instant::now(),
            timeout,
            interval: initial_interval,
        }
    }

    fn expired(&self) -> bool {
        self.started.elapsed() >= self.timeout
    }

    fn elapsed_secs(&self) -> u64 {
        self.started.elapsed().as_secs()
    }
}

/// Poll `check` until it reports true or the timeout passes.
///
/// The first attempt runs immediately; afterwards the pause starts at one
/// second and doubles per failed attempt, capped at forty seconds. An error
/// from `check` ends the wait at once. Passing the deadline stops further
/// attempts, it cancels nothing in flight.
pub async fn wait_for<F, Fut>(mut check: F, timeout: Duration) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool>>,
{
    let mut state = RetryState::new(timeout, Duration::from_secs(1));

    loop {
        if check().await? {
            return Ok(());
        }

        debug!("condition not met, retrying in {:?}", state.interval);
        sleep(state.interval).await;
        state.interval = (state.interval * 2).min(MAX_INTERVAL);

        if state.expired() {
            return Err(Error::timeout(format!(
                "condition not met after {}s",
                state.elapsed_secs()
            )));
        }
    }
}

/// Poll `check` until the resource it looks up is gone.
///
/// An `Http` error with status 404 means the resource is deleted and ends
/// the wait successfully; any other error is fatal immediately. A check
/// that answers normally means the resource is still there, so polling
/// continues with a pause growing by one second per attempt, starting
/// at zero.
pub async fn wait_for_resource_deleted<F, Fut, T>(mut check: F, timeout: Duration) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut state = RetryState::new(timeout, Duration::ZERO);

    loop {
        sleep(state.interval).await;
        state.interval += Duration::from_secs(1);

        if state.expired() {
            return Err(Error::timeout(format!(
                "resource still present after {}s",
                state.elapsed_secs()
            )));
        }

        match check().await {
            Ok(_) => debug!(
                "resource still present, polling again in {:?}",
                state.interval
            ),
            Err(err) if err.is_status(StatusCode::NOT_FOUND) => return Ok(()),
            Err(err) => return Err(err),
        }
    }
}
