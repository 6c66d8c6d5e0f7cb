//! Change notifications for watched surfaces of the live page.
//!
//! A [`WatchTarget`] is anything that can hand out a [`Subscription`] scoped
//! by a [`ChangeFilter`]. The console never looks inside a target; it only
//! waits for notifications and re-reads state through its own ports.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::trace;

/// What changed on a watched surface.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum MutationKind {
    ChildList,
    Attributes,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Mutation {
    pub kind: MutationKind,
    /// `true` when the change happened on the surface itself or its direct
    /// children, `false` when it happened deeper in the subtree.
    pub direct: bool,
}

impl Mutation {
    pub const fn child_list() -> Self {
        Self {
            kind: MutationKind::ChildList,
            direct: true,
        }
    }

    pub const fn attributes() -> Self {
        Self {
            kind: MutationKind::Attributes,
            direct: true,
        }
    }

    pub const fn nested(kind: MutationKind) -> Self {
        Self {
            kind,
            direct: false,
        }
    }
}

/// Scope of the notifications a subscription is interested in.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct ChangeFilter {
    pub child_list: bool,
    pub subtree: bool,
    pub attributes: bool,
}

impl ChangeFilter {
    /// Direct child additions and removals only.
    pub const fn children() -> Self {
        Self {
            child_list: true,
            subtree: false,
            attributes: false,
        }
    }

    /// Child list changes anywhere below the surface.
    pub const fn subtree() -> Self {
        Self {
            child_list: true,
            subtree: true,
            attributes: false,
        }
    }

    /// Attribute changes on the surface itself.
    pub const fn attributes() -> Self {
        Self {
            child_list: false,
            subtree: false,
            attributes: true,
        }
    }

    pub fn accepts(&self, mutation: &Mutation) -> bool {
        if !mutation.direct && !self.subtree {
            return false;
        }
        match mutation.kind {
            MutationKind::ChildList => self.child_list,
            MutationKind::Attributes => self.attributes,
        }
    }
}

/// A live registration on a [`WatchTarget`]. Dropping it unsubscribes.
pub struct Subscription {
    rx: mpsc::UnboundedReceiver<Mutation>,
    release: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    pub fn new(
        rx: mpsc::UnboundedReceiver<Mutation>,
        release: impl FnOnce() + Send + Sync + 'static,
    ) -> Self {
        Self {
            rx,
            release: Some(Box::new(release)),
        }
    }

    /// Wait for the next notification. `None` means the target went away
    /// and no further notifications will arrive.
    pub async fn changed(&mut self) -> Option<Mutation> {
        self.rx.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.release.is_some())
            .finish()
    }
}

pub trait WatchTarget: Send + Sync {
    fn subscribe(&self, filter: ChangeFilter) -> Subscription;
}

impl<T> WatchTarget for Arc<T>
where
    T: WatchTarget + ?Sized,
{
    fn subscribe(&self, filter: ChangeFilter) -> Subscription {
        (**self).subscribe(filter)
    }
}

struct Subscriber {
    id: u64,
    filter: ChangeFilter,
    tx: mpsc::UnboundedSender<Mutation>,
}

#[derive(Default)]
struct HubInner {
    subscribers: Mutex<Vec<Subscriber>>,
    next_id: AtomicU64,
}

/// In-memory watch target. Whoever owns the watched state calls
/// [`MutationHub::notify`] after every change.
#[derive(Clone, Default)]
pub struct MutationHub {
    inner: Arc<HubInner>,
}

impl MutationHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fan a mutation out to every subscription whose filter accepts it.
    /// Returns the number of subscriptions notified.
    pub fn notify(&self, mutation: Mutation) -> usize {
        let mut subscribers = self.inner.subscribers.lock();
        subscribers.retain(|sub| !sub.tx.is_closed());
        let mut delivered = 0;
        for sub in subscribers.iter().filter(|sub| sub.filter.accepts(&mutation)) {
            if sub.tx.send(mutation).is_ok() {
                delivered += 1;
            }
        }
        trace!(?mutation, delivered, "mutation dispatched");
        delivered
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.lock().len()
    }

    /// Drop every subscription's sender so pending waits observe a detached target.
    pub fn close(&self) {
        self.inner.subscribers.lock().clear();
    }

    fn unsubscribe(inner: &Weak<HubInner>, id: u64) {
        if let Some(inner) = inner.upgrade() {
            inner.subscribers.lock().retain(|sub| sub.id != id);
            trace!(id, "subscription released");
        }
    }
}

impl WatchTarget for MutationHub {
    fn subscribe(&self, filter: ChangeFilter) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .subscribers
            .lock()
            .push(Subscriber { id, filter, tx });
        trace!(id, ?filter, "subscription registered");
        let weak = Arc::downgrade(&self.inner);
        Subscription::new(rx, move || MutationHub::unsubscribe(&weak, id))
    }
}

impl fmt::Debug for MutationHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutationHub")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
