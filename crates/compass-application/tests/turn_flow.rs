//! End-to-end turn orchestration tests with scripted upstream agents.

use async_trait::async_trait;
use compass_application::endpoints::{self, ChatRequest, ClarifyRequest, GoalRequest};
use compass_application::{InMemoryHistoryStore, InMemorySessionRepository, TurnOrchestrator};
use compass_core::auth::Authenticator;
use compass_core::catalog::{CaseStudy, CaseStudyCatalog, InMemoryCaseStudyCatalog};
use compass_core::error::{CompassError, Result, RetryAction};
use compass_core::session::{ConversationMessage, GoalState, HistoryStore, MessageRole};
use compass_core::turn::TurnKind;
use compass_core::validation::TurnPayload;
use compass_interaction::agent::{CompletionAgent, CompletionError, CompletionRequest};
use compass_interaction::resilience::{BreakerConfig, CircuitBreaker, RetryPolicy};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

const GOAL_OUTPUT: &str = r#"```json
{
  "headline": "AI Agent for Restaurants: Increase Table Turnover",
  "clarificationQuestion": "What is your primary objective?",
  "missions": [
    {"id": "defineMetrics", "title": "Define Success Metrics", "points": 15},
    {"id": "sketchFlow", "title": "Sketch User Flow", "points": 15}
  ],
  "caseStudies": ["cs1", "made-up-reference"]
}
```"#;

const CLARIFY_OUTPUT: &str = r#"```json
{
  "hero": {"title": "AI Agent for Restaurants", "description": "Contextual suggestions for diners"},
  "process": [{"name": "Define Success Metrics", "description": "Pick the numbers that matter"}],
  "goal": "Build an AI agent for restaurants",
  "missions": [{"id": "defineMetrics", "title": "Define Success Metrics", "points": 15}],
  "caseStudies": ["cs2"],
  "why": "Closest matches for restaurant operations"
}
```"#;

const CHAT_OUTPUT: &str =
    r#"{"reply": "Great - next, sketch the agent's decision flow.", "followUpMissions": [{"id": "sketchFlow", "title": "Sketch User Flow", "points": 15}]}"#;

/// Upstream agent that replays a fixed script of outcomes.
struct ScriptedAgent {
    script: Mutex<VecDeque<std::result::Result<String, CompletionError>>>,
    calls: AtomicU32,
    delay: Duration,
}

impl ScriptedAgent {
    fn new(
        script: impl IntoIterator<Item = std::result::Result<String, CompletionError>>,
    ) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            calls: AtomicU32::new(0),
            delay: Duration::ZERO,
        }
    }

    fn succeeding_with(output: &str) -> Self {
        Self::new([Ok(output.to_string())])
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CompletionAgent for ScriptedAgent {
    async fn complete(
        &self,
        _request: CompletionRequest,
    ) -> std::result::Result<String, CompletionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let mut script = self.script.lock().unwrap();
        match script.pop_front() {
            // The last scripted outcome keeps repeating.
            Some(outcome) => {
                if script.is_empty() {
                    script.push_back(outcome.clone());
                }
                outcome
            }
            None => Err(CompletionError::Terminal {
                status_code: None,
                message: "script exhausted".to_string(),
            }),
        }
    }
}

/// History store that persists the first message of an append, then fails.
///
/// Models a storage backend dying halfway through a write, which is exactly
/// the case rollback has to clean up.
struct FailingHistoryStore {
    inner: InMemoryHistoryStore,
    armed: AtomicBool,
}

impl FailingHistoryStore {
    fn new() -> Self {
        Self {
            inner: InMemoryHistoryStore::new(),
            armed: AtomicBool::new(false),
        }
    }

    fn arm(&self) {
        self.armed.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl HistoryStore for FailingHistoryStore {
    async fn append(
        &self,
        session_id: &str,
        turn_id: &str,
        messages: &[ConversationMessage],
    ) -> Result<()> {
        if self.armed.load(Ordering::SeqCst) {
            if let Some(first) = messages.first() {
                self.inner
                    .append(session_id, turn_id, std::slice::from_ref(first))
                    .await?;
            }
            return Err(CompassError::persistence("message store connection lost"));
        }
        self.inner.append(session_id, turn_id, messages).await
    }

    async fn rollback(&self, session_id: &str, turn_id: &str) -> Result<usize> {
        self.inner.rollback(session_id, turn_id).await
    }

    async fn list(&self, session_id: &str) -> Result<Vec<ConversationMessage>> {
        self.inner.list(session_id).await
    }
}

fn catalog() -> Arc<dyn CaseStudyCatalog> {
    Arc::new(InMemoryCaseStudyCatalog::new([
        CaseStudy {
            id: "cs1".to_string(),
            title: "Booking Optimizer".to_string(),
            summary: "Reduced booking latency by 80%".to_string(),
        },
        CaseStudy {
            id: "cs2".to_string(),
            title: "Menu Intelligence".to_string(),
            summary: "Increased revenue 30%".to_string(),
        },
    ]))
}

fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(8),
        jitter_fraction: 0.0,
    }
}

struct Harness {
    orchestrator: TurnOrchestrator,
    store: Arc<dyn HistoryStore>,
}

fn harness(agent: Arc<dyn CompletionAgent>, store: Arc<dyn HistoryStore>) -> Harness {
    harness_with_breaker(agent, store, Arc::new(CircuitBreaker::default()))
}

fn harness_with_breaker(
    agent: Arc<dyn CompletionAgent>,
    store: Arc<dyn HistoryStore>,
    breaker: Arc<CircuitBreaker>,
) -> Harness {
    let orchestrator = TurnOrchestrator::new(
        agent,
        Arc::new(InMemorySessionRepository::new()),
        store.clone(),
        catalog(),
        breaker,
    )
    .with_retry_policy(fast_retry())
    .with_upstream_timeout(Duration::from_secs(5));
    Harness {
        orchestrator,
        store,
    }
}

async fn seed_goal(harness: &Harness, session_id: &str) {
    harness
        .orchestrator
        .handle(session_id, TurnKind::Goal, "I want to build an AI agent for restaurants")
        .await
        .expect("seeding goal turn should succeed");
}

#[tokio::test]
async fn scenario_a_goal_first_try_commits_two_messages() {
    init_tracing();
    let agent = Arc::new(ScriptedAgent::succeeding_with(GOAL_OUTPUT));
    let h = harness(agent.clone(), Arc::new(InMemoryHistoryStore::new()));

    let result = h
        .orchestrator
        .handle("s-1", TurnKind::Goal, "I want to build an AI agent for restaurants")
        .await
        .unwrap();

    assert_eq!(agent.calls(), 1);
    assert_eq!(result.goal_state, GoalState::Draft);

    let TurnPayload::Goal(goal) = &result.payload else {
        panic!("expected goal payload");
    };
    assert_eq!(goal.headline, "AI Agent for Restaurants: Increase Table Turnover");
    assert_eq!(goal.missions.len(), 2);
    // Known reference resolved, hallucinated one dropped.
    assert_eq!(goal.case_studies.len(), 1);
    assert_eq!(goal.case_studies[0].id, "cs1");

    let log = h.store.list("s-1").await.unwrap();
    assert_eq!(log.len(), 2);
    assert_eq!(log[0].role, MessageRole::User);
    assert_eq!(log[0].content, "I want to build an AI agent for restaurants");
    assert_eq!(log[1].role, MessageRole::Assistant);
    assert_eq!(log[0].turn_id, result.turn_id);
    assert_eq!(log[1].turn_id, result.turn_id);
}

#[tokio::test]
async fn scenario_b_two_timeouts_then_success_commits_one_turn() {
    let agent = Arc::new(ScriptedAgent::new([
        Err(CompletionError::Timeout {
            timeout: Duration::from_secs(30),
        }),
        Err(CompletionError::Timeout {
            timeout: Duration::from_secs(30),
        }),
        Ok(GOAL_OUTPUT.to_string()),
    ]));
    let h = harness(agent.clone(), Arc::new(InMemoryHistoryStore::new()));

    let result = h
        .orchestrator
        .handle("s-1", TurnKind::Goal, "I want to build an AI agent for restaurants")
        .await;

    // Retries are invisible to the caller.
    assert!(result.is_ok());
    assert_eq!(agent.calls(), 3);

    let log = h.store.list("s-1").await.unwrap();
    assert_eq!(log.len(), 2, "one committed turn, not three");
}

#[tokio::test]
async fn scenario_c_clarify_without_goal_is_a_state_conflict() {
    let agent = Arc::new(ScriptedAgent::succeeding_with(CLARIFY_OUTPUT));
    let h = harness(agent.clone(), Arc::new(InMemoryHistoryStore::new()));

    let err = h
        .orchestrator
        .handle("s-1", TurnKind::Clarify, "Focus on customer satisfaction")
        .await
        .unwrap_err();

    assert!(err.is_state_conflict());
    assert_eq!(err.error_code(), "clarify_no_goal");
    assert_eq!(err.http_status(), 403);
    // Distinct from validation errors both in code and status.
    assert_ne!(err.http_status(), 400);

    assert_eq!(agent.calls(), 0, "upstream must not be touched");
    assert!(h.store.list("s-1").await.unwrap().is_empty());
}

#[tokio::test]
async fn scenario_d_persistence_failure_rolls_back_the_user_message_too() {
    init_tracing();
    let store = Arc::new(FailingHistoryStore::new());
    let agent = Arc::new(ScriptedAgent::new([
        Ok(GOAL_OUTPUT.to_string()),
        Ok(CHAT_OUTPUT.to_string()),
    ]));
    let h = harness(agent.clone(), store.clone());

    seed_goal(&h, "s-1").await;
    let before = h.store.list("s-1").await.unwrap();
    assert_eq!(before.len(), 2);

    store.arm();
    let err = h
        .orchestrator
        .handle("s-1", TurnKind::Chat, "Which mission should I tackle next?")
        .await
        .unwrap_err();

    assert!(matches!(err, CompassError::Persistence { .. }));
    assert_eq!(err.retry_action(), RetryAction::Retry);

    let after = h.store.list("s-1").await.unwrap();
    assert_eq!(after, before, "log must be exactly as before the turn");
}

#[tokio::test]
async fn validation_failure_leaves_the_log_unchanged() {
    let agent = Arc::new(ScriptedAgent::new([
        Ok(GOAL_OUTPUT.to_string()),
        // Reply is required for chat turns.
        Ok(r#"{"navigate": {"page": "missions", "section": "m-1"}}"#.to_string()),
    ]));
    let h = harness(agent, Arc::new(InMemoryHistoryStore::new()));

    seed_goal(&h, "s-1").await;
    let before = h.store.list("s-1").await.unwrap();

    let err = h
        .orchestrator
        .handle("s-1", TurnKind::Chat, "hello")
        .await
        .unwrap_err();

    assert_eq!(err.error_code(), "chat_missing_reply");
    assert_eq!(err.http_status(), 400);
    assert_eq!(h.store.list("s-1").await.unwrap(), before);
}

#[tokio::test]
async fn garbage_output_is_reported_as_retryable_validation() {
    let agent = Arc::new(ScriptedAgent::succeeding_with("the model refused to emit JSON"));
    let h = harness(agent, Arc::new(InMemoryHistoryStore::new()));

    let err = h
        .orchestrator
        .handle("s-1", TurnKind::Goal, "build something")
        .await
        .unwrap_err();

    assert_eq!(err.error_code(), "goal_malformed_output");
    assert_eq!(err.retry_action(), RetryAction::Retry);
    assert!(h.store.list("s-1").await.unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn at_most_one_turn_in_flight_per_session() {
    let agent = Arc::new(
        ScriptedAgent::succeeding_with(GOAL_OUTPUT).with_delay(Duration::from_millis(100)),
    );
    let h = harness(agent, Arc::new(InMemoryHistoryStore::new()));

    let (first, second) = tokio::join!(
        h.orchestrator
            .handle("s-1", TurnKind::Goal, "first concurrent goal"),
        h.orchestrator
            .handle("s-1", TurnKind::Goal, "second concurrent goal"),
    );

    let outcomes = [first, second];
    let done = outcomes.iter().filter(|r| r.is_ok()).count();
    assert_eq!(done, 1, "exactly one turn completes");

    let conflict = outcomes
        .iter()
        .find_map(|r| r.as_ref().err())
        .expect("one turn is rejected");
    assert_eq!(conflict.error_code(), "turn_in_progress");
    assert!(conflict.is_state_conflict());

    let log = h.store.list("s-1").await.unwrap();
    assert_eq!(log.len(), 2, "no interleaved messages");
    assert_eq!(log[0].turn_id, log[1].turn_id);
}

#[tokio::test]
async fn sessions_proceed_independently() {
    let agent = Arc::new(
        ScriptedAgent::succeeding_with(GOAL_OUTPUT).with_delay(Duration::from_millis(30)),
    );
    let h = harness(agent, Arc::new(InMemoryHistoryStore::new()));

    let (a, b) = tokio::join!(
        h.orchestrator.handle("s-a", TurnKind::Goal, "goal for a"),
        h.orchestrator.handle("s-b", TurnKind::Goal, "goal for b"),
    );

    assert!(a.is_ok());
    assert!(b.is_ok());
    assert_eq!(h.store.list("s-a").await.unwrap().len(), 2);
    assert_eq!(h.store.list("s-b").await.unwrap().len(), 2);
}

#[tokio::test]
async fn open_breaker_short_circuits_without_reaching_upstream() {
    let agent = Arc::new(ScriptedAgent::new([Err(CompletionError::Transient {
        status_code: Some(503),
        message: "upstream down".to_string(),
        retry_after: None,
    })]));
    let breaker = Arc::new(CircuitBreaker::new(BreakerConfig {
        failure_threshold: 2,
        recovery_time: Duration::from_secs(60),
    }));
    let h = harness_with_breaker(agent.clone(), Arc::new(InMemoryHistoryStore::new()), breaker);
    let single_attempt = RetryPolicy {
        max_attempts: 1,
        ..fast_retry()
    };
    let orchestrator = h.orchestrator.clone().with_retry_policy(single_attempt);

    for _ in 0..2 {
        let err = orchestrator
            .handle("s-1", TurnKind::Goal, "goal")
            .await
            .unwrap_err();
        assert!(matches!(err, CompassError::UpstreamTransient { .. }));
    }
    assert_eq!(agent.calls(), 2);

    let err = orchestrator
        .handle("s-1", TurnKind::Goal, "goal")
        .await
        .unwrap_err();
    assert!(matches!(err, CompassError::UpstreamUnavailable { .. }));
    assert_eq!(err.http_status(), 503);
    assert_eq!(agent.calls(), 2, "rejected without reaching upstream");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancelled_turn_still_rolls_back_and_releases_the_session() {
    init_tracing();
    let agent = Arc::new(
        ScriptedAgent::succeeding_with(GOAL_OUTPUT).with_delay(Duration::from_millis(80)),
    );
    let h = harness(agent, Arc::new(InMemoryHistoryStore::new()));

    // Caller disconnects while the upstream call is in flight.
    let cancelled = tokio::time::timeout(
        Duration::from_millis(10),
        h.orchestrator.handle("s-1", TurnKind::Goal, "abandoned goal"),
    )
    .await;
    assert!(cancelled.is_err(), "caller gave up before the turn finished");

    // The spawned turn body keeps running; give it time to resolve and roll back.
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(
        h.store.list("s-1").await.unwrap().is_empty(),
        "no stale turn survives a disconnect"
    );

    // Session lock was released by the background task.
    let result = h
        .orchestrator
        .handle("s-1", TurnKind::Goal, "I want to build an AI agent for restaurants")
        .await;
    assert!(result.is_ok());
}

#[tokio::test]
async fn goal_then_clarify_then_repeat_clarify_conflicts() {
    let agent = Arc::new(ScriptedAgent::new([
        Ok(GOAL_OUTPUT.to_string()),
        Ok(CLARIFY_OUTPUT.to_string()),
    ]));
    let h = harness(agent, Arc::new(InMemoryHistoryStore::new()));

    seed_goal(&h, "s-1").await;

    let clarified = h
        .orchestrator
        .handle("s-1", TurnKind::Clarify, "Focus on reducing wait times")
        .await
        .unwrap();
    assert_eq!(clarified.goal_state, GoalState::Clarified);
    match &clarified.payload {
        TurnPayload::Clarify(payload) => {
            assert_eq!(payload.hero.title, "AI Agent for Restaurants");
            assert_eq!(payload.case_studies.len(), 1);
            assert_eq!(payload.case_studies[0].id, "cs2");
        }
        other => panic!("expected clarify payload, got {other:?}"),
    }

    let err = h
        .orchestrator
        .handle("s-1", TurnKind::Clarify, "and also delivery")
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "clarify_already_clarified");
    assert_eq!(h.store.list("s-1").await.unwrap().len(), 4);
}

// ---------------------------------------------------------------------------
// Endpoint adapters
// ---------------------------------------------------------------------------

struct StaticAuthenticator {
    token: String,
    session_id: String,
}

#[async_trait]
impl Authenticator for StaticAuthenticator {
    async fn resolve_session(&self, credential: &str) -> Result<String> {
        if credential == self.token {
            Ok(self.session_id.clone())
        } else {
            Err(CompassError::authentication("Invalid or expired token"))
        }
    }
}

fn auth() -> StaticAuthenticator {
    StaticAuthenticator {
        token: "good-token".to_string(),
        session_id: "s-1".to_string(),
    }
}

#[tokio::test]
async fn goal_endpoint_shapes_the_response() {
    let agent = Arc::new(ScriptedAgent::succeeding_with(GOAL_OUTPUT));
    let h = harness(agent, Arc::new(InMemoryHistoryStore::new()));

    let response = endpoints::submit_goal(
        &auth(),
        &h.orchestrator,
        "good-token",
        GoalRequest {
            input: "I want to build an AI agent for restaurants".to_string(),
        },
    )
    .await
    .unwrap();

    assert_eq!(response.history.len(), 2);
    assert_eq!(response.history[0].role, "user");
    assert_eq!(response.assistant_message.role, "assistant");

    let body = serde_json::to_value(&response).unwrap();
    assert_eq!(
        body["headline"],
        "AI Agent for Restaurants: Increase Table Turnover"
    );
    assert_eq!(body["clarificationQuestion"], "What is your primary objective?");
    assert!(body["assistantMessage"]["datetime"].is_string());
}

#[tokio::test]
async fn bad_token_maps_to_401_envelope() {
    let agent = Arc::new(ScriptedAgent::succeeding_with(GOAL_OUTPUT));
    let h = harness(agent, Arc::new(InMemoryHistoryStore::new()));

    let err = endpoints::submit_goal(
        &auth(),
        &h.orchestrator,
        "stolen-token",
        GoalRequest {
            input: "goal".to_string(),
        },
    )
    .await
    .unwrap_err();

    assert_eq!(err.http_status(), 401);
    let envelope = serde_json::to_value(err.to_envelope()).unwrap();
    assert_eq!(envelope["error"], serde_json::json!(true));
    assert_eq!(envelope["error_code"], "auth_failed");
    assert_eq!(envelope["retry_action"], "none");
}

#[tokio::test]
async fn empty_input_is_rejected_before_upstream() {
    let agent = Arc::new(ScriptedAgent::succeeding_with(GOAL_OUTPUT));
    let h = harness(agent.clone(), Arc::new(InMemoryHistoryStore::new()));

    let err = endpoints::submit_goal(
        &auth(),
        &h.orchestrator,
        "good-token",
        GoalRequest {
            input: "   ".to_string(),
        },
    )
    .await
    .unwrap_err();

    assert_eq!(err.http_status(), 400);
    assert_eq!(err.error_code(), "goal_empty_input");
    assert_eq!(agent.calls(), 0);
}

#[tokio::test]
async fn chat_endpoint_returns_reply_and_full_history() {
    let agent = Arc::new(ScriptedAgent::new([
        Ok(GOAL_OUTPUT.to_string()),
        Ok(CHAT_OUTPUT.to_string()),
    ]));
    let h = harness(agent, Arc::new(InMemoryHistoryStore::new()));
    seed_goal(&h, "s-1").await;

    let response = endpoints::chat(
        &auth(),
        &h.orchestrator,
        "good-token",
        ChatRequest {
            message: "Which mission should I tackle next?".to_string(),
            context: None,
        },
    )
    .await
    .unwrap();

    assert_eq!(
        response.payload.reply,
        "Great - next, sketch the agent's decision flow."
    );
    assert_eq!(response.history.len(), 4);
}

#[tokio::test]
async fn clarify_endpoint_rejects_fresh_sessions() {
    let agent = Arc::new(ScriptedAgent::succeeding_with(CLARIFY_OUTPUT));
    let h = harness(agent, Arc::new(InMemoryHistoryStore::new()));

    let err = endpoints::clarify_goal(
        &auth(),
        &h.orchestrator,
        "good-token",
        ClarifyRequest {
            clarification: "Focus on customer satisfaction".to_string(),
        },
    )
    .await
    .unwrap_err();

    assert_eq!(err.http_status(), 403);
    assert_eq!(err.error_code(), "clarify_no_goal");
}

#[tokio::test]
async fn snapshot_of_unknown_session_is_404() {
    let agent = Arc::new(ScriptedAgent::succeeding_with(GOAL_OUTPUT));
    let h = harness(agent, Arc::new(InMemoryHistoryStore::new()));

    let err = endpoints::session_snapshot(&auth(), &h.orchestrator, "good-token")
        .await
        .unwrap_err();
    assert_eq!(err.http_status(), 404);
    assert_eq!(err.error_code(), "session_not_found");
}

#[tokio::test]
async fn snapshot_reflects_goal_state_and_log() {
    let agent = Arc::new(ScriptedAgent::succeeding_with(GOAL_OUTPUT));
    let h = harness(agent, Arc::new(InMemoryHistoryStore::new()));
    seed_goal(&h, "s-1").await;

    let snapshot = endpoints::session_snapshot(&auth(), &h.orchestrator, "good-token")
        .await
        .unwrap();
    assert_eq!(snapshot.goal_state, GoalState::Draft);
    assert_eq!(snapshot.messages.len(), 2);
}
