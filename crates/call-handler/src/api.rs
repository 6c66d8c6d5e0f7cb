use std::sync::Arc;

use action_primitives::Lock;
use chrono::Utc;
use roamdeck_core_types::ActionId;
use roamdeck_event_bus::ChangeFilter;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::controls::await_landmark;
use crate::errors::CallError;
use crate::metrics::NoopMetrics;
use crate::model::{ActionReport, CallerRef, QueuedAction};
use crate::policy::CallPolicy;
use crate::ports::{Landmark, MetricsPort, StagePort, Surface};
use crate::precheck;
use crate::roster::{spawn_watcher, CallbackId, Roster};
use crate::runner::{execute, RuntimeDeps};
use crate::signals::DialogBusy;

pub struct CallHandlerBuilder {
    policy: CallPolicy,
    stage: Option<Arc<dyn StagePort>>,
    metrics: Option<Arc<dyn MetricsPort>>,
}

impl CallHandlerBuilder {
    pub fn new(policy: CallPolicy) -> Self {
        Self {
            policy,
            stage: None,
            metrics: None,
        }
    }

    pub fn with_stage(mut self, port: Arc<dyn StagePort>) -> Self {
        self.stage = Some(port);
        self
    }

    pub fn with_metrics(mut self, port: Arc<dyn MetricsPort>) -> Self {
        self.metrics = Some(port);
        self
    }

    pub fn build(self) -> Result<CallHandler, CallError> {
        let stage = self.stage.ok_or(CallError::MissingPort("stage"))?;
        Ok(CallHandler {
            inner: Arc::new(HandlerInner {
                policy: self.policy,
                stage,
                metrics: self.metrics.unwrap_or_else(|| Arc::new(NoopMetrics)),
                lock: Lock::new(1),
                roster: Roster::default(),
            }),
        })
    }
}

/// Serializes connect/disconnect requests against the live page and keeps
/// roster observers up to date.
///
/// Cloning is cheap; all clones share the same lock and observers.
#[derive(Clone)]
pub struct CallHandler {
    inner: Arc<HandlerInner>,
}

pub(crate) struct HandlerInner {
    policy: CallPolicy,
    stage: Arc<dyn StagePort>,
    metrics: Arc<dyn MetricsPort>,
    lock: Lock,
    pub(crate) roster: Roster,
}

impl HandlerInner {
    pub(crate) fn callers(&self) -> Vec<CallerRef> {
        precheck::read_callers(self.stage.as_ref())
    }
}

impl CallHandler {
    /// Wait for the hosts panel and the call dialog to exist, then build a
    /// handler over them.
    pub async fn attach(
        stage: Arc<dyn StagePort>,
        policy: CallPolicy,
        metrics: Option<Arc<dyn MetricsPort>>,
    ) -> Result<Self, CallError> {
        let limit = policy.timeouts.attach();
        let (hosts, dialog) = tokio::try_join!(
            await_landmark(stage.as_ref(), Landmark::HostsContainer, limit),
            await_landmark(stage.as_ref(), Landmark::CallDialog, limit),
        )?;
        debug!(%hosts, %dialog, "call handler attached");

        let mut builder = CallHandlerBuilder::new(policy).with_stage(stage);
        if let Some(metrics) = metrics {
            builder = builder.with_metrics(metrics);
        }
        builder.build()
    }

    pub fn policy(&self) -> &CallPolicy {
        &self.inner.policy
    }

    /// Fresh snapshot of every active caller.
    pub fn callers(&self) -> Vec<CallerRef> {
        self.inner.callers()
    }

    /// Run one action to completion. Waits its turn behind earlier actions,
    /// and always reports instead of failing: errors end up in the report
    /// and the log.
    pub async fn process(&self, action: QueuedAction) -> ActionReport {
        let inner = self.inner.as_ref();
        let action_id = ActionId::new();

        let _slot = inner.lock.acquire_guard().await;
        let _busy = DialogBusy::raise(inner.stage.as_ref());
        let started_at = Utc::now();
        let start = Instant::now();
        info!(
            action = %action_id,
            caller = %action.caller,
            control = %action.control.label,
            "processing call action"
        );

        let limit = inner.policy.timeouts.action();
        let deps = RuntimeDeps {
            stage: inner.stage.as_ref(),
            policy: &inner.policy,
        };
        let result = match timeout(limit, execute(&action, deps)).await {
            Ok(result) => result,
            Err(_) => Err(CallError::ActionTimeout(limit)),
        };

        let latency_ms = start.elapsed().as_millis() as u64;
        match &result {
            Ok(()) => {
                inner.metrics.record_ok(latency_ms);
                info!(action = %action_id, latency_ms, "call action completed");
            }
            Err(err) => {
                inner.metrics.record_fail(err.kind());
                error!(
                    action = %action_id,
                    caller = %action.caller,
                    kind = err.kind(),
                    %err,
                    "call action failed"
                );
            }
        }

        ActionReport {
            action_id,
            action,
            ok: result.is_ok(),
            error: result.err(),
            started_at,
            latency_ms,
        }
    }

    /// Queue a connect for a caller who is currently calling.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn connect(&self, caller: &CallerRef) -> Result<JoinHandle<ActionReport>, CallError> {
        let action = QueuedAction::connect(caller, &self.inner.policy)?;
        Ok(self.spawn(action))
    }

    /// Queue a disconnect. Connected callers go through the confirmation box.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn disconnect(&self, caller: &CallerRef) -> JoinHandle<ActionReport> {
        let action = QueuedAction::disconnect(caller, &self.inner.policy);
        self.spawn(action)
    }

    fn spawn(&self, action: QueuedAction) -> JoinHandle<ActionReport> {
        let handler = self.clone();
        tokio::spawn(async move { handler.process(action).await })
    }

    /// Register an observer of the caller list. The hosts panel is watched
    /// only while at least one observer is registered.
    ///
    /// # Panics
    ///
    /// The first registration starts the watcher task, so it panics when
    /// called outside a Tokio runtime.
    pub fn add_callback<F>(&self, callback: F) -> CallbackId
    where
        F: Fn(&[CallerRef]) + Send + Sync + 'static,
    {
        let inner = &self.inner;
        inner.roster.register(Arc::new(callback), || {
            let subscription = inner
                .stage
                .surface(Surface::Hosts)
                .subscribe(ChangeFilter::children());
            let token = CancellationToken::new();
            spawn_watcher(Arc::downgrade(inner), subscription, token.clone());
            debug!("roster watcher started");
            token
        })
    }

    pub fn remove_callback(&self, id: CallbackId) -> Result<(), CallError> {
        self.inner.roster.unregister(id)
    }

    /// Whether the hosts panel is currently being watched for observers.
    pub fn is_observing(&self) -> bool {
        self.inner.roster.is_watching()
    }
}
