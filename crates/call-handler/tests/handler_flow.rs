use std::sync::Arc;
use std::time::Duration;

use call_handler::{
    ActionCounters, CallError, CallHandler, CallPolicy, CallState, CallerRef, ControlSpec,
    MetricsPort, QueuedAction, RowStatus, SimConfig, SimulatedStage, StagePort,
};
use parking_lot::Mutex;
use tokio::time::sleep;

fn port(stage: &SimulatedStage) -> Arc<dyn StagePort> {
    Arc::new(stage.clone())
}

async fn handler_for(stage: &SimulatedStage) -> CallHandler {
    CallHandler::attach(port(stage), CallPolicy::default(), None)
        .await
        .expect("attach to mounted stage")
}

fn caller_named(handler: &CallHandler, name: &str) -> CallerRef {
    handler
        .callers()
        .into_iter()
        .find(|caller| caller.name() == name)
        .unwrap_or_else(|| panic!("{name} is not an active caller"))
}

fn assert_alternating(log: &[bool]) {
    assert!(!log.is_empty());
    assert_eq!(log.len() % 2, 0, "busy signal left raised: {log:?}");
    for (index, hidden) in log.iter().enumerate() {
        assert_eq!(*hidden, index % 2 == 0, "busy signal overlapped: {log:?}");
    }
}

#[tokio::test(start_paused = true)]
async fn connect_moves_caller_to_stage() {
    let stage = SimulatedStage::new(SimConfig::default());
    let row = stage.dial_in("Ada", Some(4411));
    let handler = handler_for(&stage).await;

    let ada = caller_named(&handler, "Ada");
    assert_eq!(ada.state, CallState::Calling);
    let report = handler.connect(&ada).unwrap().await.unwrap();

    assert!(report.ok, "{}", report.summary());
    assert_eq!(stage.status_of(row), Some(RowStatus::InProgress));
    assert_eq!(caller_named(&handler, "Ada").state, CallState::Active);
    assert!(!stage.dialog_displayed());
    assert_eq!(stage.busy_log(), vec![true, false]);
}

#[tokio::test(start_paused = true)]
async fn disconnect_connected_caller_goes_through_confirmation() {
    let stage = SimulatedStage::new(SimConfig::default());
    let row = stage.dial_in("Ada", Some(1));
    stage.set_status(row, RowStatus::Speaking);
    let handler = handler_for(&stage).await;

    let ada = caller_named(&handler, "Ada");
    let report = handler.disconnect(&ada).await.unwrap();

    assert!(report.ok, "{}", report.summary());
    assert!(report.action.needs_confirmation);
    assert_eq!(stage.row_count(), 0);
    assert!(!stage.confirmation_present());
    assert_eq!(stage.confirmation_veils(), vec![true, false]);
    assert!(!stage.dialog_hidden());
}

#[tokio::test(start_paused = true)]
async fn declining_a_queued_caller_skips_confirmation() {
    let stage = SimulatedStage::new(SimConfig::default());
    stage.dial_in("Grace", None);
    let handler = handler_for(&stage).await;

    let grace = caller_named(&handler, "Grace");
    let report = handler.disconnect(&grace).await.unwrap();

    assert!(report.ok, "{}", report.summary());
    assert!(!report.action.needs_confirmation);
    assert_eq!(stage.row_count(), 0);
    assert!(stage.confirmation_veils().is_empty());
}

#[tokio::test(start_paused = true)]
async fn concurrent_actions_run_one_at_a_time() {
    let stage = SimulatedStage::new(SimConfig::default());
    let rows: Vec<u64> = ["Ada", "Grace", "Linus", "Barbara"]
        .iter()
        .zip(1..)
        .map(|(name, id)| stage.dial_in(*name, Some(id)))
        .collect();
    let handler = handler_for(&stage).await;

    let pending: Vec<_> = handler
        .callers()
        .iter()
        .map(|caller| handler.connect(caller).unwrap())
        .collect();
    for task in pending {
        let report = task.await.unwrap();
        assert!(report.ok, "{}", report.summary());
    }

    for row in rows {
        assert_eq!(stage.status_of(row), Some(RowStatus::InProgress));
    }
    let log = stage.busy_log();
    assert_eq!(log.len(), 8);
    assert_alternating(&log);
}

#[tokio::test(start_paused = true)]
async fn state_drift_fails_without_touching_the_page() {
    let stage = SimulatedStage::new(SimConfig::default());
    let row = stage.dial_in("Ada", Some(7));
    let handler = handler_for(&stage).await;

    let ada = caller_named(&handler, "Ada");
    let queued = QueuedAction::connect(&ada, handler.policy()).unwrap();
    stage.set_status(row, RowStatus::InProgress);

    let report = handler.process(queued).await;
    assert!(!report.ok);
    assert!(matches!(
        report.error,
        Some(CallError::StateMismatch {
            expected: CallState::Calling,
            actual: CallState::Active,
            ..
        })
    ));
    assert!(!stage.dialog_displayed());
    assert_eq!(stage.busy_log(), vec![true, false]);

    // The lock was released: a fresh action still runs.
    let ada = caller_named(&handler, "Ada");
    let report = handler.disconnect(&ada).await.unwrap();
    assert!(report.ok, "{}", report.summary());
}

#[tokio::test(start_paused = true)]
async fn departed_caller_is_stale() {
    let stage = SimulatedStage::new(SimConfig::default());
    let row = stage.dial_in("Ada", Some(7));
    let handler = handler_for(&stage).await;

    let ada = caller_named(&handler, "Ada");
    stage.hang_up(row);
    let report = handler.connect(&ada).unwrap().await.unwrap();

    assert_eq!(report.error, Some(CallError::StaleCaller(ada.key.clone())));
    assert!(handler.callers().is_empty());
}

#[tokio::test(start_paused = true)]
async fn connect_rejects_connected_callers_up_front() {
    let stage = SimulatedStage::new(SimConfig::default());
    let row = stage.dial_in("Ada", Some(7));
    stage.set_status(row, RowStatus::InProgress);
    let handler = handler_for(&stage).await;

    let ada = caller_named(&handler, "Ada");
    assert!(matches!(
        handler.connect(&ada),
        Err(CallError::NotCalling(_))
    ));
    assert!(stage.busy_log().is_empty());
}

#[tokio::test(start_paused = true)]
async fn unexpected_dialog_layout_is_reported() {
    let stage = SimulatedStage::new(SimConfig::default());
    stage.dial_in("Ada", Some(7));
    let policy = CallPolicy {
        connect: ControlSpec::new(3, "Accept"),
        ..CallPolicy::default()
    };
    let handler = CallHandler::attach(port(&stage), policy, None).await.unwrap();

    let ada = caller_named(&handler, "Ada");
    let report = handler.connect(&ada).unwrap().await.unwrap();
    assert!(matches!(report.error, Some(CallError::LayoutMismatch(_))));
    assert_eq!(caller_named(&handler, "Ada").state, CallState::Calling);
    assert_eq!(stage.busy_log(), vec![true, false]);
}

#[tokio::test(start_paused = true)]
async fn stuck_confirmation_times_out_and_frees_the_handler() {
    let stage = SimulatedStage::new(SimConfig {
        confirmation_responds: false,
        ..SimConfig::default()
    });
    let stuck = stage.dial_in("Ada", Some(1));
    stage.set_status(stuck, RowStatus::InProgress);
    stage.dial_in("Grace", Some(2));
    let counters = Arc::new(ActionCounters::default());
    let handler = CallHandler::attach(
        port(&stage),
        CallPolicy::default(),
        Some(counters.clone() as Arc<dyn MetricsPort>),
    )
    .await
    .unwrap();

    let ada = caller_named(&handler, "Ada");
    let grace = caller_named(&handler, "Grace");
    let first = handler.disconnect(&ada);
    let second = handler.connect(&grace).unwrap();

    let first = first.await.unwrap();
    assert_eq!(
        first.error,
        Some(CallError::ActionTimeout(Duration::from_millis(1000)))
    );
    assert!(first.latency_ms >= 1000);
    let second = second.await.unwrap();
    assert!(second.ok, "{}", second.summary());

    assert_eq!(stage.status_of(stuck), Some(RowStatus::InProgress));
    assert_alternating(&stage.busy_log());

    let snapshot = counters.snapshot();
    assert_eq!(snapshot.ok, 1);
    assert_eq!(snapshot.failures["action_timeout"], 1);
}

#[tokio::test(start_paused = true)]
async fn deadline_during_confirmation_restores_the_box() {
    let stage = SimulatedStage::new(SimConfig {
        confirmation_delay: Duration::from_secs(5),
        ..SimConfig::default()
    });
    let slow = stage.dial_in("Ada", Some(1));
    stage.set_status(slow, RowStatus::Speaking);
    let next = stage.dial_in("Grace", Some(2));
    let handler = handler_for(&stage).await;

    let ada = caller_named(&handler, "Ada");
    let grace = caller_named(&handler, "Grace");
    let first = handler.disconnect(&ada);
    let second = handler.connect(&grace).unwrap();

    let first = first.await.unwrap();
    assert_eq!(
        first.error,
        Some(CallError::ActionTimeout(Duration::from_millis(1000)))
    );
    assert_eq!(stage.confirmation_veils(), vec![true, false]);

    let second = second.await.unwrap();
    assert!(second.ok, "{}", second.summary());
    assert_eq!(stage.status_of(next), Some(RowStatus::InProgress));
    assert_eq!(stage.status_of(slow), Some(RowStatus::Speaking));
    assert_eq!(stage.subscriber_count(), 0);
    assert_alternating(&stage.busy_log());
}

#[tokio::test(start_paused = true)]
async fn attach_waits_for_landmarks() {
    let stage = SimulatedStage::unmounted(SimConfig::default());
    let attaching = tokio::spawn(CallHandler::attach(port(&stage), CallPolicy::default(), None));

    sleep(Duration::from_millis(500)).await;
    assert!(!attaching.is_finished());
    stage.mount();
    assert!(attaching.await.unwrap().is_ok());
    assert_eq!(stage.subscriber_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn attach_gives_up_on_a_missing_page() {
    let stage = SimulatedStage::unmounted(SimConfig::default());
    let mut policy = CallPolicy::default();
    policy.timeouts.attach_ms = 200;

    let err = CallHandler::attach(port(&stage), policy, None)
        .await
        .err()
        .expect("attach should time out");
    match err {
        CallError::Wait(wait) => assert!(wait.is_timeout()),
        other => panic!("unexpected error: {other:?}"),
    }
}

async fn drain(stage: &SimulatedStage) {
    for _ in 0..20 {
        if stage.hosts_hub().subscriber_count() == 0 {
            return;
        }
        tokio::task::yield_now().await;
    }
}

#[tokio::test(start_paused = true)]
async fn roster_observers_share_one_watcher() {
    let stage = SimulatedStage::new(SimConfig::default());
    let handler = handler_for(&stage).await;
    assert!(!handler.is_observing());
    assert_eq!(stage.hosts_hub().subscriber_count(), 0);

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let first = handler.add_callback(move |callers| sink.lock().push(callers.len()));
    let second = handler.add_callback(|_| {});
    assert!(handler.is_observing());
    assert_eq!(stage.hosts_hub().subscriber_count(), 1);

    stage.dial_in("Ada", Some(1));
    sleep(Duration::from_millis(1)).await;
    stage.dial_in("Grace", Some(2));
    sleep(Duration::from_millis(1)).await;
    assert_eq!(*seen.lock(), vec![1, 2]);

    handler.remove_callback(first).unwrap();
    assert!(handler.is_observing());
    handler.remove_callback(second).unwrap();
    assert!(!handler.is_observing());
    drain(&stage).await;
    assert_eq!(stage.hosts_hub().subscriber_count(), 0);

    stage.dial_in("Linus", Some(3));
    sleep(Duration::from_millis(1)).await;
    assert_eq!(seen.lock().len(), 2);

    assert_eq!(
        handler.remove_callback(first),
        Err(CallError::UnknownCallback(first))
    );
}

#[tokio::test(start_paused = true)]
async fn roster_watcher_restarts_after_going_idle() {
    let stage = SimulatedStage::new(SimConfig::default());
    let handler = handler_for(&stage).await;

    let id = handler.add_callback(|_| {});
    handler.remove_callback(id).unwrap();
    drain(&stage).await;

    let count = Arc::new(Mutex::new(0usize));
    let sink = count.clone();
    handler.add_callback(move |_| *sink.lock() += 1);
    assert_eq!(stage.hosts_hub().subscriber_count(), 1);
    stage.dial_in("Ada", None);
    sleep(Duration::from_millis(1)).await;
    assert_eq!(*count.lock(), 1);
}

#[test]
#[should_panic(expected = "Tokio 1.x runtime")]
fn observing_outside_a_runtime_panics() {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    let stage = SimulatedStage::new(SimConfig::default());
    let handler = runtime.block_on(handler_for(&stage));

    handler.add_callback(|_| {});
}
