//! Roam session controller
//!
//! Runs a sequence of statements over a live room. While a statement runs,
//! calls are open and every roster change is folded into a participation
//! ledger used to pick who gets on stage next.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use call_handler::{
    About, ActionReport, AllowCalls, CallError, CallHandler, CallPolicy, CallState, CallbackId,
    CallerKey, CallerRef, Messenger, MetricsPort, StagePort,
};
use parking_lot::Mutex;
use rand::Rng;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, instrument};

use crate::config::SessionSettings;
use crate::errors::SessionError;

pub const NEW_STATEMENT: &str = "[click to edit statement]";

/// Participation record for one caller across statements.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct UserLog {
    pub name: String,
    pub avatar: String,
    pub participated: BTreeSet<usize>,
    pub called: BTreeSet<usize>,
}

impl UserLog {
    fn new(caller: &CallerRef) -> Self {
        Self {
            name: caller.name().to_string(),
            avatar: caller.avatar.clone(),
            participated: BTreeSet::new(),
            called: BTreeSet::new(),
        }
    }

    /// Callers who asked often but rarely got on stage rank first.
    pub fn priority(&self) -> i64 {
        self.called.len() as i64 - self.participated.len() as i64
    }
}

#[derive(Debug)]
struct Ledger {
    max_roamers: usize,
    running: bool,
    started_at: Instant,
    statement: Option<usize>,
    statements: Vec<String>,
    ran: BTreeSet<usize>,
    can_add: bool,
    logs: BTreeMap<CallerKey, UserLog>,
}

impl Ledger {
    fn new(max_roamers: usize) -> Self {
        Self {
            max_roamers,
            running: false,
            started_at: Instant::now(),
            statement: None,
            statements: Vec::new(),
            ran: BTreeSet::new(),
            can_add: false,
            logs: BTreeMap::new(),
        }
    }

    /// Fold a roster snapshot into the ledger. Returns whether any log changed.
    fn observe(&mut self, callers: &[CallerRef]) -> bool {
        let Some(statement) = self.statement.filter(|_| self.running) else {
            return false;
        };

        let mut changed = false;
        for caller in callers {
            let log = self
                .logs
                .entry(caller.key.clone())
                .or_insert_with(|| UserLog::new(caller));
            changed |= match caller.state {
                CallState::Calling => log.called.insert(statement),
                CallState::Active | CallState::Speaking => log.participated.insert(statement),
            };
        }

        let calling = callers
            .iter()
            .filter(|caller| caller.state == CallState::Calling)
            .count();
        let active = callers.len() - calling;
        self.can_add = calling > 0 && active < self.max_roamers;
        changed
    }
}

/// Controller for one roam. Owns the page controls and the call handler.
pub struct RoamSession {
    settings: SessionSettings,
    handler: CallHandler,
    allow_calls: AllowCalls,
    messenger: Messenger,
    about: About,
    ledger: Arc<Mutex<Ledger>>,
    observer: Mutex<Option<CallbackId>>,
}

impl RoamSession {
    pub fn new(
        settings: SessionSettings,
        handler: CallHandler,
        allow_calls: AllowCalls,
        messenger: Messenger,
        about: About,
    ) -> Self {
        let ledger = Arc::new(Mutex::new(Ledger::new(settings.max_roamers)));
        Self {
            settings,
            handler,
            allow_calls,
            messenger,
            about,
            ledger,
            observer: Mutex::new(None),
        }
    }

    /// Wait for every control the session needs, close calls until the first
    /// statement starts, and start following the roster.
    pub async fn attach(
        stage: Arc<dyn StagePort>,
        policy: CallPolicy,
        settings: SessionSettings,
        metrics: Option<Arc<dyn MetricsPort>>,
    ) -> Result<Self, CallError> {
        let limit = policy.timeouts.attach();
        let (handler, allow_calls, messenger, about) = tokio::try_join!(
            CallHandler::attach(stage.clone(), policy, metrics),
            AllowCalls::attach(stage.clone(), limit),
            Messenger::attach(stage.clone(), limit),
            About::attach(stage.clone(), limit),
        )?;
        allow_calls.disable_calls().await?;

        let session = Self::new(settings, handler, allow_calls, messenger, about);
        session.follow_roster();
        Ok(session)
    }

    pub fn handler(&self) -> &CallHandler {
        &self.handler
    }

    /// Register the ledger as a roster observer. Idempotent.
    pub fn follow_roster(&self) {
        let mut observer = self.observer.lock();
        if observer.is_some() {
            return;
        }
        let ledger = self.ledger.clone();
        *observer = Some(self.handler.add_callback(move |callers| {
            if ledger.lock().observe(callers) {
                debug!(callers = callers.len(), "participation ledger updated");
            }
        }));
    }

    pub fn unfollow_roster(&self) -> Result<(), CallError> {
        match self.observer.lock().take() {
            Some(id) => self.handler.remove_callback(id),
            None => Ok(()),
        }
    }

    pub fn add_statement(&self, statement: impl Into<String>) -> usize {
        let mut ledger = self.ledger.lock();
        ledger.statements.push(statement.into());
        ledger.statements.len() - 1
    }

    pub fn update_statement(&self, index: usize, statement: impl Into<String>) -> Result<(), SessionError> {
        let mut ledger = self.ledger.lock();
        let slot = ledger
            .statements
            .get_mut(index)
            .ok_or(SessionError::UnknownStatement(index))?;
        *slot = statement.into();
        Ok(())
    }

    pub fn statements(&self) -> Vec<String> {
        self.ledger.lock().statements.clone()
    }

    pub fn has_run(&self, index: usize) -> bool {
        self.ledger.lock().ran.contains(&index)
    }

    #[instrument(skip(self))]
    pub async fn start_statement(&self, index: usize) -> Result<(), SessionError> {
        let statement = self
            .ledger
            .lock()
            .statements
            .get(index)
            .cloned()
            .ok_or(SessionError::UnknownStatement(index))?;

        self.allow_calls.enable_calls().await?;
        self.messenger
            .send_message(&format!("Starting Statement: {statement}"))
            .await?;
        self.about
            .set_about(&format!("Current Statement: {statement}"))
            .await?;

        {
            let mut ledger = self.ledger.lock();
            ledger.running = true;
            ledger.started_at = Instant::now();
            ledger.statement = Some(index);
            ledger.ran.insert(index);
        }
        let callers = self.handler.callers();
        self.ledger.lock().observe(&callers);
        info!(index, statement = %abbrev(&statement, 12), "statement started");
        Ok(())
    }

    /// Close calls and hang up on everyone. The returned handles resolve as
    /// each disconnect finishes.
    #[instrument(skip(self))]
    pub async fn end_statement(&self) -> Result<Vec<JoinHandle<ActionReport>>, SessionError> {
        if !self.ledger.lock().running {
            return Err(SessionError::NotRunning);
        }
        self.allow_calls.disable_calls().await?;
        let pending: Vec<_> = self
            .handler
            .callers()
            .iter()
            .map(|caller| self.handler.disconnect(caller))
            .collect();
        self.ledger.lock().running = false;
        info!(disconnecting = pending.len(), "statement ended");
        Ok(pending)
    }

    pub fn auto_add(&self) -> Result<Vec<JoinHandle<ActionReport>>, SessionError> {
        self.auto_add_with(&mut rand::thread_rng())
    }

    /// Fill the free stage slots with randomly chosen callers and decline the
    /// rest of the queue.
    pub fn auto_add_with<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
    ) -> Result<Vec<JoinHandle<ActionReport>>, SessionError> {
        {
            let ledger = self.ledger.lock();
            if !ledger.running {
                return Err(SessionError::NotRunning);
            }
            if !ledger.can_add {
                return Err(SessionError::CannotAdd);
            }
        }

        let callers = self.handler.callers();
        let existing = callers
            .iter()
            .filter(|caller| caller.state.is_connected())
            .count();
        let eligible: Vec<&CallerRef> = callers
            .iter()
            .filter(|caller| caller.state == CallState::Calling)
            .collect();
        let (accepted, rejected) = pick(
            eligible,
            self.settings.max_roamers.saturating_sub(existing),
            rng,
        );
        info!(
            accepted = accepted.len(),
            rejected = rejected.len(),
            "adding participants"
        );

        let mut pending = Vec::with_capacity(accepted.len() + rejected.len());
        for caller in accepted {
            pending.push(self.handler.connect(caller)?);
        }
        for caller in rejected {
            pending.push(self.handler.disconnect(caller));
        }
        Ok(pending)
    }

    pub fn is_running(&self) -> bool {
        self.ledger.lock().running
    }

    pub fn can_add(&self) -> bool {
        let ledger = self.ledger.lock();
        ledger.running && ledger.can_add
    }

    /// Seconds until the running statement is over; negative once overdue,
    /// zero when nothing runs.
    pub fn seconds_left(&self) -> i64 {
        let ledger = self.ledger.lock();
        if !ledger.running {
            return 0;
        }
        let elapsed = ledger.started_at.elapsed().as_secs_f64().round() as i64;
        self.settings.question_length_secs() - elapsed
    }

    /// Every caller seen so far, highest priority first.
    pub fn leaderboard(&self) -> Vec<UserLog> {
        let mut logs: Vec<UserLog> = self.ledger.lock().logs.values().cloned().collect();
        logs.sort_by_key(|log| std::cmp::Reverse(log.priority()));
        logs
    }

    pub fn status_line(&self) -> String {
        let (running, statement) = {
            let ledger = self.ledger.lock();
            let statement = ledger
                .statement
                .and_then(|index| ledger.statements.get(index).cloned());
            (ledger.running, statement)
        };
        match statement {
            None => "New roam".to_string(),
            Some(statement) if running => format!(
                "{} left in statement: {}",
                format_time_left(self.seconds_left()),
                abbrev(&statement, 12)
            ),
            Some(statement) => format!("Finished statement: {}", abbrev(&statement, 12)),
        }
    }
}

impl Drop for RoamSession {
    fn drop(&mut self) {
        if let Some(id) = self.observer.get_mut().take() {
            let _ = self.handler.remove_callback(id);
        }
    }
}

/// Split `items` into `k` randomly chosen ones and the rest. When there are
/// no more than `k` items, all are chosen.
pub fn pick<T, R: Rng + ?Sized>(mut items: Vec<T>, k: usize, rng: &mut R) -> (Vec<T>, Vec<T>) {
    if items.len() <= k {
        return (items, Vec::new());
    }
    for i in 0..k {
        let swap = rng.gen_range(i..items.len());
        items.swap(i, swap);
    }
    let rest = items.split_off(k);
    (items, rest)
}

/// `m:ss`, with a leading `-` once overdue.
pub fn format_time_left(total_seconds: i64) -> String {
    let sign = if total_seconds < 0 { "-" } else { "" };
    let total = total_seconds.unsigned_abs();
    format!("{sign}{}:{:02}", total / 60, total % 60)
}

pub fn abbrev(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use call_handler::{CallerId, SimConfig, SimulatedStage};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use roamdeck_core_types::ElementRef;

    fn caller(name: &str, state: CallState) -> CallerRef {
        CallerRef {
            key: CallerKey::new(CallerId::Anonymous, name),
            avatar: format!("https://cdn.example.com/avatars/u/default/{name}.jpg"),
            state,
            click_target: ElementRef::new(name),
        }
    }

    #[test]
    fn time_left_formatting() {
        assert_eq!(format_time_left(450), "7:30");
        assert_eq!(format_time_left(59), "0:59");
        assert_eq!(format_time_left(0), "0:00");
        assert_eq!(format_time_left(-5), "-0:05");
        assert_eq!(format_time_left(-125), "-2:05");
    }

    #[test]
    fn abbrev_truncates_long_text() {
        assert_eq!(abbrev("short", 12), "short");
        assert_eq!(abbrev("exactly12chr", 12), "exactly12chr");
        assert_eq!(abbrev("a considerably longer statement", 12), "a considerab...");
        assert_eq!(
            abbrev(&"é".repeat(13), 12),
            format!("{}...", "é".repeat(12))
        );
    }

    #[test]
    fn pick_splits_without_losing_items() {
        let mut rng = StdRng::seed_from_u64(7);
        let (chosen, rest) = pick((0..10).collect::<Vec<_>>(), 4, &mut rng);
        assert_eq!(chosen.len(), 4);
        assert_eq!(rest.len(), 6);
        let mut all: Vec<_> = chosen.into_iter().chain(rest).collect();
        all.sort_unstable();
        assert_eq!(all, (0..10).collect::<Vec<_>>());

        let (chosen, rest) = pick(vec!['a', 'b'], 5, &mut rng);
        assert_eq!(chosen, vec!['a', 'b']);
        assert!(rest.is_empty());

        let (chosen, rest) = pick(vec!['a', 'b'], 0, &mut rng);
        assert!(chosen.is_empty());
        assert_eq!(rest.len(), 2);
    }

    #[test]
    fn ledger_ignores_rosters_while_idle() {
        let mut ledger = Ledger::new(2);
        assert!(!ledger.observe(&[caller("Ada", CallState::Calling)]));
        assert!(ledger.logs.is_empty());
    }

    #[test]
    fn ledger_tracks_calls_and_participation_per_statement() {
        let mut ledger = Ledger::new(2);
        ledger.running = true;
        ledger.statement = Some(0);

        assert!(ledger.observe(&[caller("Ada", CallState::Calling)]));
        assert!(!ledger.observe(&[caller("Ada", CallState::Calling)]));
        assert!(ledger.can_add);

        assert!(ledger.observe(&[caller("Ada", CallState::Speaking)]));
        ledger.statement = Some(1);
        ledger.observe(&[caller("Ada", CallState::Calling)]);

        let log = &ledger.logs[&CallerKey::new(CallerId::Anonymous, "Ada")];
        assert_eq!(log.called, BTreeSet::from([0, 1]));
        assert_eq!(log.participated, BTreeSet::from([0]));
        assert_eq!(log.priority(), 1);
    }

    #[test]
    fn can_add_needs_a_caller_and_a_free_slot() {
        let mut ledger = Ledger::new(2);
        ledger.running = true;
        ledger.statement = Some(0);

        ledger.observe(&[caller("Ada", CallState::Active)]);
        assert!(!ledger.can_add);

        ledger.observe(&[
            caller("Ada", CallState::Active),
            caller("Grace", CallState::Active),
            caller("Linus", CallState::Calling),
        ]);
        assert!(!ledger.can_add);

        ledger.observe(&[
            caller("Ada", CallState::Active),
            caller("Linus", CallState::Calling),
        ]);
        assert!(ledger.can_add);
    }

    async fn session(stage: &SimulatedStage, settings: SessionSettings) -> RoamSession {
        RoamSession::attach(
            Arc::new(stage.clone()),
            CallPolicy::default(),
            settings,
            None,
        )
        .await
        .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn statement_lifecycle_drives_the_page() {
        let stage = SimulatedStage::new(SimConfig::default());
        let roam = session(&stage, SessionSettings::default()).await;
        assert_eq!(roam.status_line(), "New roam");
        assert!(!stage.calls_allowed());

        let index = roam.add_statement(NEW_STATEMENT);
        roam.update_statement(index, "Pineapple belongs on pizza")
            .unwrap();
        assert!(matches!(
            roam.update_statement(9, "nope"),
            Err(SessionError::UnknownStatement(9))
        ));

        roam.start_statement(index).await.unwrap();
        assert!(stage.calls_allowed());
        assert!(roam.has_run(index));
        assert_eq!(
            stage.messages(),
            vec!["Starting Statement: Pineapple belongs on pizza".to_string()]
        );
        assert_eq!(stage.about(), "Current Statement: Pineapple belongs on pizza");
        assert_eq!(roam.status_line(), "7:30 left in statement: Pineapple be...");

        tokio::time::advance(std::time::Duration::from_secs(451)).await;
        assert_eq!(roam.seconds_left(), -1);

        let row = stage.dial_in("Ada", Some(3));
        stage.set_status(row, call_handler::RowStatus::InProgress);
        stage.dial_in("Grace", None);
        tokio::time::sleep(std::time::Duration::from_millis(1)).await;

        let pending = roam.end_statement().await.unwrap();
        assert_eq!(pending.len(), 2);
        for task in pending {
            let report = task.await.unwrap();
            assert!(report.ok, "{}", report.summary());
        }
        assert!(!stage.calls_allowed());
        assert_eq!(stage.row_count(), 0);
        assert_eq!(roam.seconds_left(), 0);
        assert_eq!(roam.status_line(), "Finished statement: Pineapple be...");
        assert!(matches!(
            roam.end_statement().await,
            Err(SessionError::NotRunning)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn auto_add_fills_free_slots_and_declines_the_rest() {
        let stage = SimulatedStage::new(SimConfig::default());
        let settings = SessionSettings {
            max_roamers: 2,
            ..SessionSettings::default()
        };
        let roam = session(&stage, settings).await;
        assert!(matches!(roam.auto_add(), Err(SessionError::NotRunning)));

        let seated = stage.dial_in("Ada", Some(1));
        stage.set_status(seated, call_handler::RowStatus::InProgress);
        for (name, id) in [("Grace", 2), ("Linus", 3), ("Barbara", 4)] {
            stage.dial_in(name, Some(id));
        }
        let index = roam.add_statement("Tabs over spaces");
        roam.start_statement(index).await.unwrap();
        assert!(roam.can_add());

        let mut rng = StdRng::seed_from_u64(42);
        let pending = roam.auto_add_with(&mut rng).unwrap();
        assert_eq!(pending.len(), 3);
        for task in pending {
            let report = task.await.unwrap();
            assert!(report.ok, "{}", report.summary());
        }

        let callers = roam.handler().callers();
        assert_eq!(callers.len(), 2);
        assert!(callers.iter().all(|caller| caller.state.is_connected()));
        assert!(!roam.can_add());
        assert!(matches!(roam.auto_add(), Err(SessionError::CannotAdd)));

        let board = roam.leaderboard();
        assert_eq!(board.len(), 4);
        assert_eq!(board.last().map(|log| log.name.as_str()), Some("Ada"));
    }
}
