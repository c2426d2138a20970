//! Turn orchestration façade.
//!
//! Every client-facing endpoint funnels through [`TurnOrchestrator::handle`]:
//! it drives retry → completion service → validation → history append for one
//! turn, and guarantees that any failure past the upstream call leaves the
//! session's durable log exactly as it was before the turn began.

use crate::history::HistoryManager;
use compass_core::catalog::CaseStudyCatalog;
use compass_core::error::{CompassError, Result};
use compass_core::session::{
    ConversationMessage, GoalState, HistoryStore, Session, SessionRepository,
};
use compass_core::turn::{Turn, TurnKind, TurnStage};
use compass_core::validation::{self, TurnPayload};
use compass_interaction::{CircuitBreaker, CompletionAgent, CompletionRequest, RetryPolicy};
use compass_interaction::codec::decode_completion;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};

const DEFAULT_UPSTREAM_TIMEOUT: Duration = Duration::from_secs(30);

/// Successful outcome of one turn.
#[derive(Debug, Clone)]
pub struct TurnResult {
    pub turn_id: String,
    /// Kind-specific validated payload.
    pub payload: TurnPayload,
    /// The messages committed to the session log by this turn.
    pub messages: Vec<ConversationMessage>,
    /// Goal state after the turn.
    pub goal_state: GoalState,
}

/// Notices when the caller's future is dropped mid-turn.
struct CallerGuard {
    cancelled: Arc<AtomicBool>,
}

impl Drop for CallerGuard {
    fn drop(&mut self) {
        self.cancelled.store(true, Ordering::Release);
    }
}

/// Drives a turn through `received → calling-upstream → validating →
/// persisting → done`, rolling back on any failure in the middle stages.
///
/// All dependencies are injected (`Arc`), including the circuit breaker: it
/// is the one mutable resource shared across sessions, and owning it here
/// rather than in a global lets tests build isolated instances.
///
/// # Concurrency
///
/// Sessions proceed independently. Within one session, turns are serialized
/// by a per-session lock held for the whole turn; a concurrent second turn is
/// rejected with a `turn_in_progress` state conflict rather than queued.
#[derive(Clone)]
pub struct TurnOrchestrator {
    completion: Arc<dyn CompletionAgent>,
    sessions: Arc<dyn SessionRepository>,
    history: HistoryManager,
    catalog: Arc<dyn CaseStudyCatalog>,
    breaker: Arc<CircuitBreaker>,
    retry: RetryPolicy,
    upstream_timeout: Duration,
    turn_locks: Arc<RwLock<HashMap<String, Arc<Mutex<()>>>>>,
}

impl TurnOrchestrator {
    pub fn new(
        completion: Arc<dyn CompletionAgent>,
        sessions: Arc<dyn SessionRepository>,
        store: Arc<dyn HistoryStore>,
        catalog: Arc<dyn CaseStudyCatalog>,
        breaker: Arc<CircuitBreaker>,
    ) -> Self {
        Self {
            completion,
            sessions,
            history: HistoryManager::new(store),
            catalog,
            breaker,
            retry: RetryPolicy::default(),
            upstream_timeout: DEFAULT_UPSTREAM_TIMEOUT,
            turn_locks: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Overrides the retry policy for completion calls.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Overrides the per-call upstream timeout.
    pub fn with_upstream_timeout(mut self, timeout: Duration) -> Self {
        self.upstream_timeout = timeout;
        self
    }

    /// Runs one turn for the session.
    ///
    /// On success the returned messages are durably appended; on failure the
    /// session log is untouched and the error carries machine-readable retry
    /// guidance. The turn body runs on a spawned task, so a caller that
    /// disconnects mid-turn cannot skip the rollback: once the in-flight
    /// upstream call resolves, the task rolls back and releases the session
    /// lock on its own.
    pub async fn handle(
        &self,
        session_id: &str,
        kind: TurnKind,
        input: &str,
    ) -> Result<TurnResult> {
        validation::ensure_input(kind, input)?;

        let lock = self.lock_for(session_id).await;
        let guard = lock.try_lock_owned().map_err(|_| {
            CompassError::state_conflict(
                "turn_in_progress",
                format!("Session '{session_id}' already has a turn in flight"),
            )
        })?;

        let session = self.load_or_create_session(session_id).await?;
        validation::ensure_turn_allowed(kind, session.goal_state)?;

        let turn = Turn::new(kind, input);
        tracing::info!(
            session_id,
            turn_id = %turn.id,
            kind = %kind,
            stage = %TurnStage::Received,
            "turn received"
        );

        let cancelled = Arc::new(AtomicBool::new(false));
        let caller_guard = CallerGuard {
            cancelled: cancelled.clone(),
        };

        let this = self.clone();
        let task = tokio::spawn(async move {
            let result = this.run_turn(&session, &turn, &cancelled).await;
            drop(guard);
            result
        });

        let result = task
            .await
            .map_err(|err| CompassError::internal(format!("turn task failed: {err}")))?;
        drop(caller_guard);
        result
    }

    /// Returns the session together with its committed message log.
    pub async fn session_snapshot(
        &self,
        session_id: &str,
    ) -> Result<(Session, Vec<ConversationMessage>)> {
        let session = self
            .sessions
            .find_by_id(session_id)
            .await?
            .ok_or_else(|| CompassError::not_found("session", session_id))?;
        let messages = self.history.list(session_id).await?;
        Ok((session, messages))
    }

    async fn lock_for(&self, session_id: &str) -> Arc<Mutex<()>> {
        {
            let locks = self.turn_locks.read().await;
            if let Some(lock) = locks.get(session_id) {
                return lock.clone();
            }
        }
        let mut locks = self.turn_locks.write().await;
        locks
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn load_or_create_session(&self, session_id: &str) -> Result<Session> {
        if let Some(session) = self.sessions.find_by_id(session_id).await? {
            return Ok(session);
        }
        let session = Session::new(session_id);
        self.sessions.save(&session).await?;
        tracing::debug!(session_id, "session created");
        Ok(session)
    }

    async fn run_turn(
        &self,
        session: &Session,
        turn: &Turn,
        cancelled: &AtomicBool,
    ) -> Result<TurnResult> {
        match self.execute_stages(session, turn).await {
            Ok(result) => {
                if cancelled.load(Ordering::Acquire) {
                    // The caller is gone and nobody will see this response;
                    // remove the committed messages instead of leaving a
                    // stale turn for a later append to paper over.
                    let cause =
                        CompassError::internal("caller disconnected before the turn completed");
                    self.history
                        .rollback(&session.id, &turn.id, TurnStage::Persisting, &cause)
                        .await;
                    // Restore the pre-turn session record as well; the turn
                    // still holds the session lock, so this cannot race a
                    // newer turn's state.
                    if let Err(err) = self.sessions.save(session).await {
                        tracing::error!(
                            session_id = %session.id,
                            turn_id = %turn.id,
                            error = %err,
                            "failed to restore session state after cancelled turn"
                        );
                    }
                    return Err(cause);
                }
                tracing::info!(
                    session_id = %session.id,
                    turn_id = %turn.id,
                    stage = %TurnStage::Done,
                    "turn committed"
                );
                Ok(result)
            }
            Err((stage, err)) => {
                self.history
                    .rollback(&session.id, &turn.id, stage, &err)
                    .await;
                Err(err)
            }
        }
    }

    async fn execute_stages(
        &self,
        session: &Session,
        turn: &Turn,
    ) -> std::result::Result<TurnResult, (TurnStage, CompassError)> {
        // Stage: calling upstream
        let stage = TurnStage::CallingUpstream;
        let context = self
            .history
            .list(&session.id)
            .await
            .map_err(|err| (stage, err))?;

        let request = CompletionRequest {
            kind: turn.kind,
            session_id: session.id.clone(),
            input: turn.input.clone(),
            history: context,
            timeout: self.upstream_timeout,
        };

        let operation = format!("completion.{}", turn.kind);
        let agent = Arc::clone(&self.completion);
        let raw = self
            .retry
            .run(&operation, &self.breaker, || {
                let agent = Arc::clone(&agent);
                let request = request.clone();
                async move { agent.complete(request).await }
            })
            .await
            .map_err(|err| (stage, err))?;

        // Stage: validating
        let stage = TurnStage::Validating;
        let mut value = decode_completion(turn.kind, &raw).map_err(|err| (stage, err))?;
        validation::validate_payload(turn.kind, &value).map_err(|err| (stage, err))?;

        let refs = validation::case_study_refs(&value);
        if !refs.is_empty() {
            let studies = self
                .catalog
                .get_by_ids(&refs)
                .await
                .map_err(|err| (stage, err))?;
            validation::attach_case_studies(&mut value, &studies).map_err(|err| (stage, err))?;
        }

        let payload = TurnPayload::decode(turn.kind, value).map_err(|err| (stage, err))?;

        // Stage: persisting
        let stage = TurnStage::Persisting;
        let messages = vec![
            ConversationMessage::user(turn.input.as_str(), turn.id.as_str()),
            ConversationMessage::assistant(raw.as_str(), turn.id.as_str()),
        ];
        self.history
            .append(&session.id, &turn.id, &messages)
            .await
            .map_err(|err| (stage, err))?;

        let mut updated = session.clone();
        updated.goal_state = match turn.kind {
            TurnKind::Goal => GoalState::Draft,
            TurnKind::Clarify => GoalState::Clarified,
            TurnKind::Chat => updated.goal_state,
        };
        updated.touch();
        self.sessions
            .save(&updated)
            .await
            .map_err(|err| (stage, err))?;

        Ok(TurnResult {
            turn_id: turn.id.clone(),
            payload,
            messages,
            goal_state: updated.goal_state,
        })
    }
}
