//! Change-driven condition waits

use std::convert::Infallible;
use std::fmt;
use std::time::Duration;

use roamdeck_event_bus::{ChangeFilter, WatchTarget};
use tokio::time::{sleep, timeout};
use tracing::{debug, trace};

use crate::errors::WaitError;

/// Resolves once a predicate over a watched surface produces a value.
///
/// The predicate is evaluated once up front; only when that first read comes
/// back empty is a subscription opened, and from then on the predicate is
/// re-run after every notification that passes the filter. The subscription
/// is dropped as soon as the wait resolves, fails, times out or is cancelled.
pub struct ConditionWait<'a> {
    target: &'a dyn WatchTarget,
    filter: ChangeFilter,
    timeout: Option<Duration>,
    label: Option<String>,
}

impl<'a> ConditionWait<'a> {
    pub fn new(target: &'a dyn WatchTarget, filter: ChangeFilter) -> Self {
        Self {
            target,
            filter,
            timeout: None,
            label: None,
        }
    }

    pub fn timeout(mut self, limit: Duration) -> Self {
        self.timeout = Some(limit);
        self
    }

    pub fn timeout_opt(mut self, limit: Option<Duration>) -> Self {
        self.timeout = limit;
        self
    }

    /// Diagnostic label carried by timeout and detach errors.
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub async fn until_some<T, E, F>(self, mut accept: F) -> Result<T, WaitError>
    where
        F: FnMut() -> Result<Option<T>, E>,
        E: fmt::Display,
    {
        if let Some(value) = accept().map_err(predicate_failed)? {
            trace!(label = ?self.label, "condition already satisfied");
            return Ok(value);
        }

        let mut subscription = self.target.subscribe(self.filter);
        // Covers a change landing between the first read and the subscription.
        if let Some(value) = accept().map_err(predicate_failed)? {
            return Ok(value);
        }
        debug!(label = ?self.label, filter = ?self.filter, timeout = ?self.timeout, "waiting for condition");

        let label = &self.label;
        let watch = async {
            while subscription.changed().await.is_some() {
                match accept() {
                    Ok(Some(value)) => return Ok(value),
                    Ok(None) => {}
                    Err(err) => return Err(predicate_failed(err)),
                }
            }
            Err::<T, WaitError>(WaitError::Detached {
                label: label.clone(),
            })
        };

        match self.timeout {
            Some(limit) => match timeout(limit, watch).await {
                Ok(result) => result,
                Err(_) => {
                    debug!(label = ?label, limit_ms = limit.as_millis() as u64, "condition wait timed out");
                    Err(WaitError::Timeout {
                        after: limit,
                        label: label.clone(),
                    })
                }
            },
            None => watch.await,
        }
    }

    /// Boolean form of [`ConditionWait::until_some`].
    pub async fn until<E, F>(self, mut accept: F) -> Result<(), WaitError>
    where
        F: FnMut() -> Result<bool, E>,
        E: fmt::Display,
    {
        self.until_some(|| accept().map(|ok| ok.then_some(())))
            .await
    }
}

fn predicate_failed<E: fmt::Display>(err: E) -> WaitError {
    WaitError::Predicate(err.to_string())
}

/// A watch target whose direct children can be listed.
pub trait ChildContainer: WatchTarget {
    type Child;

    fn children(&self) -> Vec<Self::Child>;
}

/// Wait until `container` has at least `n` direct children and return them.
pub async fn wait_children<C>(
    container: &C,
    n: usize,
    limit: Option<Duration>,
) -> Result<Vec<C::Child>, WaitError>
where
    C: ChildContainer,
{
    ConditionWait::new(container, ChangeFilter::children())
        .timeout_opt(limit)
        .label(format!("at least {n} children"))
        .until_some(|| {
            let children = container.children();
            Ok::<_, Infallible>((children.len() >= n).then_some(children))
        })
        .await
}

/// Fixed pause that lets the page finish its own asynchronous updates.
pub async fn settle(delay: Duration) {
    if delay.is_zero() {
        return;
    }
    trace!(delay_ms = delay.as_millis() as u64, "settling");
    sleep(delay).await;
}
