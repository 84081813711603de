//! Client-side counterpart of the boundary: picks the credential for the active variant,
//! keeps chat turns sequential, and threads the conversation id through the session registry.

use crate::error::ClientError;
use crate::transport::Transport;
use std::sync::Arc;
use std::time::Duration;
use switchboard_core::{
    normalize, ApiRequest, BackendVariant, CredentialPair, CredentialStore, DispatchError, DownstreamError, KvPort,
    LogicalAction, RequestEnvelope, ResponseEnvelope, SessionRegistry,
};
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// How often the watch task checks credential expiry.
pub const DEFAULT_EXPIRY_CHECK: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReauthReason {
    /// The proactive expiry check found the stored credentials expired.
    Expired,
    /// A call was rejected with this status.
    Rejected { status: u16 },
}

/// Broadcast to every subscriber when credentials have been cleared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthSignal {
    ReauthRequired { reason: ReauthReason },
}

/// Outcome of one fanned-out search action; each part succeeds or fails on its own.
#[derive(Debug)]
pub struct SearchAll {
    pub search: Result<ResponseEnvelope, ClientError>,
    pub answer: Result<ResponseEnvelope, ClientError>,
    pub passages: Result<ResponseEnvelope, ClientError>,
}

pub struct SearchClient {
    base_url: String,
    transport: Transport,
    credentials: CredentialStore,
    sessions: SessionRegistry,
    chat_turn: Mutex<()>,
    signals: broadcast::Sender<AuthSignal>,
}

impl SearchClient {
    /// Client for the boundary at `base_url`, restoring state persisted in `port`.
    pub fn new(base_url: impl Into<String>, port: Arc<dyn KvPort>, transport: Transport) -> Result<Self, ClientError> {
        let sessions = SessionRegistry::restore(port.clone())?;
        let (signals, _) = broadcast::channel(16);
        Ok(Self {
            base_url: base_url.into(),
            transport,
            credentials: CredentialStore::new(port),
            sessions,
            chat_turn: Mutex::new(()),
            signals,
        })
    }

    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AuthSignal> {
        self.signals.subscribe()
    }

    /// Stores the pair obtained at login. A different actor than last time drops every session.
    pub fn login(&self, pair: &CredentialPair, actor: &str) -> Result<(), ClientError> {
        self.credentials.set_credentials(pair)?;
        self.sessions.set_actor(Some(actor))?;
        tracing::info!(target: "switchboard::client", actor = %actor, "logged in");
        Ok(())
    }

    /// Clears both credentials and every conversation id.
    pub fn logout(&self) -> Result<(), ClientError> {
        self.credentials.clear()?;
        self.sessions.clear()?;
        tracing::info!(target: "switchboard::client", "logged out");
        Ok(())
    }

    pub fn variant(&self) -> Result<BackendVariant, ClientError> {
        Ok(self.sessions.active_variant()?)
    }

    /// Selects the variant for subsequent calls; a change resets the conversation.
    pub fn set_variant(&self, variant: BackendVariant) -> Result<bool, ClientError> {
        Ok(self.sessions.switch_variant(variant)?)
    }

    pub fn end_session(&self) -> Result<(), ClientError> {
        Ok(self.sessions.end_session()?)
    }

    /// Clears expired credentials and signals re-authentication. Returns whether it did.
    pub fn check_expiry(&self) -> Result<bool, ClientError> {
        if !self.credentials.clear_if_expired()? {
            return Ok(false);
        }
        let _ = self.signals.send(AuthSignal::ReauthRequired {
            reason: ReauthReason::Expired,
        });
        Ok(true)
    }

    /// Runs [`check_expiry`](Self::check_expiry) every `period` until the client is dropped.
    pub fn spawn_expiry_watch(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(client) = weak.upgrade() else {
                    break;
                };
                if let Err(e) = client.check_expiry() {
                    tracing::warn!(target: "switchboard::auth", error = %e, "expiry check failed");
                }
            }
        })
    }

    pub async fn search(&self, env: RequestEnvelope) -> Result<ResponseEnvelope, ClientError> {
        self.call(LogicalAction::Search, self.variant()?, env).await
    }

    pub async fn passages(&self, env: RequestEnvelope) -> Result<ResponseEnvelope, ClientError> {
        self.call(LogicalAction::Passages, self.variant()?, env).await
    }

    /// Single-turn answer; never touches the conversation id.
    pub async fn answer(&self, env: RequestEnvelope) -> Result<ResponseEnvelope, ClientError> {
        let env = RequestEnvelope { session_id: None, ..env };
        self.call(LogicalAction::Answer, self.variant()?, env).await
    }

    pub async fn suggest(&self, prefix: &str) -> Result<ResponseEnvelope, ClientError> {
        self.call(LogicalAction::Suggest, self.variant()?, RequestEnvelope::new(prefix))
            .await
    }

    /// Content preview of one document. A blank identifier fails without a network call.
    pub async fn content(&self, unique_id: &str, query: &str) -> Result<ResponseEnvelope, ClientError> {
        if unique_id.trim().is_empty() {
            return Err(DispatchError::MissingField { field: "uniqueId" }.into());
        }
        let env = RequestEnvelope::new(query).with_unique_id(unique_id);
        self.call(LogicalAction::Content, self.variant()?, env).await
    }

    /// Search, answer and passages for one query, issued concurrently.
    pub async fn search_all(&self, env: RequestEnvelope) -> SearchAll {
        let (search, answer, passages) = tokio::join!(
            self.search(env.clone()),
            self.answer(env.clone()),
            self.passages(env),
        );
        SearchAll {
            search,
            answer,
            passages,
        }
    }

    /// One chat turn. Turns are strictly sequential; the session id is written only after a
    /// successful reply, adopting the id the downstream returned when it rotated it.
    pub async fn chat(&self, message: &str) -> Result<ResponseEnvelope, ClientError> {
        let _turn = self.chat_turn.lock().await;
        let variant = self.variant()?;
        let ticket = self.sessions.resolve(variant)?;
        let env = RequestEnvelope::new(message).with_session(ticket.id.clone());

        let mut reply = self.call(LogicalAction::Chat, variant, env).await?;
        let id = reply
            .session_id
            .clone()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| ticket.id.clone());
        let recorded = self.sessions.confirm(&ticket, &id)?.is_some();
        tracing::debug!(target: "switchboard::client", variant = %variant, session_id = %id, fresh = ticket.fresh, recorded, "chat turn completed");
        reply.session_id = Some(id);
        Ok(reply)
    }

    async fn call(
        &self,
        action: LogicalAction,
        variant: BackendVariant,
        mut env: RequestEnvelope,
    ) -> Result<ResponseEnvelope, ClientError> {
        env.backend_mode = Some(variant.wire_name().to_string());
        if env.actor.is_none() {
            env.actor = self.sessions.actor()?;
        }
        let bearer = self.credentials.get_credential(variant)?;
        if bearer.is_none() {
            tracing::debug!(target: "switchboard::client", action = %action, variant = %variant, "no credential stored; calling without Authorization");
        }

        let url = format!("{}/api/{}", self.base_url.trim_end_matches('/'), action.boundary_path());
        let body = serde_json::to_value(ApiRequest::from_envelope(action, &env))
            .map_err(|e| DownstreamError::Decode(e.to_string()))?;
        let attempts = self.transport.retry().attempts_for(action);

        let outcome = self
            .transport
            .post_json(&url, &body, bearer.as_deref(), attempts)
            .await
            .and_then(|raw| decode(action, variant, raw).map_err(DownstreamError::from));
        match outcome {
            Ok(reply) => {
                tracing::info!(target: "switchboard::client", action = %action, variant = %variant, "call succeeded");
                Ok(reply)
            }
            Err(e) => {
                tracing::warn!(target: "switchboard::client", action = %action, variant = %variant, error = %e, "call failed");
                if let DownstreamError::Unauthorized { status, .. } = &e {
                    self.on_unauthorized(*status);
                }
                Err(e.into())
            }
        }
    }

    fn on_unauthorized(&self, status: u16) {
        if let Err(e) = self.credentials.clear() {
            tracing::error!(target: "switchboard::auth", error = %e, "failed to clear rejected credentials");
        }
        let _ = self.signals.send(AuthSignal::ReauthRequired {
            reason: ReauthReason::Rejected { status },
        });
    }
}

/// The boundary replies with a `ResponseEnvelope`; anything else goes through the normalizer.
fn decode(
    action: LogicalAction,
    variant: BackendVariant,
    raw: serde_json::Value,
) -> Result<ResponseEnvelope, switchboard_core::NormalizeError> {
    if raw.get("text").map(|t| t.is_string()).unwrap_or(false) {
        if let Ok(env) = serde_json::from_value::<ResponseEnvelope>(raw.clone()) {
            return Ok(env);
        }
    }
    normalize(action, variant.wire_name(), raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::RetryPolicy;
    use crate::transport::tests::serve;
    use axum::extract::{Path, State};
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
    use switchboard_core::{now_ms, MemoryKv, SledKv};

    #[derive(Debug, Clone)]
    struct Captured {
        action: String,
        auth: Option<String>,
        body: Value,
    }

    #[derive(Clone, Default)]
    struct MockBoundary {
        calls: Arc<std::sync::Mutex<Vec<Captured>>>,
        reject: Arc<AtomicBool>,
        fail_chat: Arc<AtomicBool>,
        wrap_unauthorized: Arc<AtomicBool>,
        rotate_to: Arc<std::sync::Mutex<Option<String>>>,
        chat_delay_ms: Arc<AtomicU64>,
        chats_in_flight: Arc<AtomicUsize>,
        max_chats_in_flight: Arc<AtomicUsize>,
    }

    impl MockBoundary {
        fn calls(&self, action: &str) -> Vec<Captured> {
            self.calls.lock().unwrap().iter().filter(|c| c.action == action).cloned().collect()
        }
    }

    async fn api(
        State(mock): State<MockBoundary>,
        Path(action): Path<String>,
        headers: HeaderMap,
        Json(body): Json<Value>,
    ) -> (StatusCode, Json<Value>) {
        let auth = headers.get("authorization").and_then(|v| v.to_str().ok()).map(str::to_string);
        mock.calls.lock().unwrap().push(Captured {
            action: action.clone(),
            auth,
            body: body.clone(),
        });
        if mock.reject.load(Ordering::SeqCst) {
            return (StatusCode::UNAUTHORIZED, Json(json!({"error": "Unauthorized"})));
        }
        if mock.wrap_unauthorized.load(Ordering::SeqCst) {
            return (
                StatusCode::OK,
                Json(json!({"statusCode": 401, "body": "{\"error\":\"Unauthorized\",\"details\":\"token expired\"}"})),
            );
        }
        if action == "chat" {
            let now = mock.chats_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            mock.max_chats_in_flight.fetch_max(now, Ordering::SeqCst);
            let delay = mock.chat_delay_ms.load(Ordering::SeqCst);
            if delay > 0 {
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
            mock.chats_in_flight.fetch_sub(1, Ordering::SeqCst);
        }
        match action.as_str() {
            "answer" => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "Internal server error", "status": 502, "details": "answer failed"})),
            ),
            "chat" if mock.fail_chat.load(Ordering::SeqCst) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "Internal server error", "timeout": true})),
            ),
            "chat" => {
                let rotated = mock.rotate_to.lock().unwrap().clone();
                let sid = rotated.or_else(|| body["sessionId"].as_str().map(str::to_string));
                (StatusCode::OK, Json(json!({"text": "reply", "citations": [], "sessionId": sid})))
            }
            "search" => (
                StatusCode::OK,
                Json(json!({"text": "", "citations": [], "resultList": [{"title": "T"}], "totalCount": 1})),
            ),
            _ => (StatusCode::OK, Json(json!({"text": "ok", "citations": []}))),
        }
    }

    async fn client() -> (MockBoundary, SearchClient) {
        let mock = MockBoundary::default();
        let app = Router::new().route("/api/:action", post(api)).with_state(mock.clone());
        let base = serve(app).await;
        let transport = Transport::new(Duration::from_secs(5)).unwrap().with_retry(RetryPolicy {
            max_attempts: 2,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        });
        let client = SearchClient::new(base, Arc::new(MemoryKv::new()), transport).unwrap();
        (mock, client)
    }

    fn pair() -> CredentialPair {
        CredentialPair::new("id-token", "access-token")
    }

    #[tokio::test]
    async fn credential_follows_the_active_variant() {
        let (mock, client) = client().await;
        client.login(&pair(), "alice").unwrap();
        client.search(RequestEnvelope::new("s3")).await.unwrap();
        client.set_variant(BackendVariant::Gateway).unwrap();
        client.search(RequestEnvelope::new("s3")).await.unwrap();
        client.set_variant(BackendVariant::Agent).unwrap();
        client.search(RequestEnvelope::new("s3")).await.unwrap();

        let auths: Vec<_> = mock.calls("search").into_iter().map(|c| c.auth).collect();
        assert_eq!(
            auths,
            vec![
                Some("Bearer id-token".to_string()),
                Some("Bearer access-token".to_string()),
                Some("Bearer id-token".to_string())
            ]
        );
    }

    #[tokio::test]
    async fn missing_credential_still_calls_without_header() {
        let (mock, client) = client().await;
        client.search(RequestEnvelope::new("s3")).await.unwrap();
        assert_eq!(mock.calls("search")[0].auth, None);
    }

    #[tokio::test]
    async fn rejection_clears_credentials_and_signals() {
        let (mock, client) = client().await;
        client.login(&pair(), "alice").unwrap();
        let mut rx = client.subscribe();
        mock.reject.store(true, Ordering::SeqCst);

        let err = client.search(RequestEnvelope::new("s3")).await.unwrap_err();
        assert!(err.is_unauthorized());
        assert_eq!(client.credentials().current().unwrap(), None);
        assert_eq!(
            rx.try_recv().unwrap(),
            AuthSignal::ReauthRequired { reason: ReauthReason::Rejected { status: 401 } }
        );
        assert_eq!(mock.calls("search").len(), 1);
    }

    #[tokio::test]
    async fn chat_reuses_then_adopts_rotated_session() {
        let (mock, client) = client().await;
        client.set_variant(BackendVariant::Gateway).unwrap();
        let first = client.chat("hi").await.unwrap();
        let id = first.session_id.clone().unwrap();
        let second = client.chat("more").await.unwrap();
        assert_eq!(second.session_id.as_deref(), Some(id.as_str()));

        *mock.rotate_to.lock().unwrap() = Some("rotated".into());
        let third = client.chat("again").await.unwrap();
        assert_eq!(third.session_id.as_deref(), Some("rotated"));
        assert_eq!(client.sessions().active().unwrap().unwrap().id, "rotated");

        let sent: Vec<_> = mock.calls("chat").into_iter().map(|c| c.body["sessionId"].clone()).collect();
        assert_eq!(sent, vec![json!(id), json!(id), json!(id)]);
    }

    #[tokio::test]
    async fn failed_turn_leaves_session_untouched() {
        let (mock, client) = client().await;
        client.set_variant(BackendVariant::Agent).unwrap();
        mock.fail_chat.store(true, Ordering::SeqCst);
        assert!(client.chat("hi").await.is_err());
        assert_eq!(client.sessions().active().unwrap(), None);

        mock.fail_chat.store(false, Ordering::SeqCst);
        let id = client.chat("hi").await.unwrap().session_id.unwrap();
        mock.fail_chat.store(true, Ordering::SeqCst);
        assert!(client.chat("again").await.is_err());
        assert_eq!(client.sessions().active().unwrap().unwrap().id, id);
        // Chat is attempted once even though the retry policy allows two.
        assert_eq!(mock.calls("chat").len(), 3);
    }

    #[tokio::test]
    async fn variant_switch_never_leaks_prior_session() {
        let (mock, client) = client().await;
        client.set_variant(BackendVariant::Gateway).unwrap();
        let old = client.chat("hi").await.unwrap().session_id.unwrap();
        client.set_variant(BackendVariant::Agent).unwrap();
        let new = client.chat("hi").await.unwrap().session_id.unwrap();
        assert_ne!(old, new);

        let last = mock.calls("chat").pop().unwrap();
        assert_eq!(last.body["backendMode"], "bedrockAgent");
        assert_eq!(last.body["sessionId"], json!(new));
    }

    #[tokio::test]
    async fn search_all_isolates_answer_failure() {
        let (_mock, client) = client().await;
        let all = client.search_all(RequestEnvelope::new("vpc")).await;
        assert_eq!(all.search.unwrap().total_count, Some(1));
        assert!(all.answer.is_err());
        assert_eq!(all.passages.unwrap().text, "ok");
    }

    #[tokio::test]
    async fn content_without_identifier_never_calls_out() {
        let (mock, client) = client().await;
        let err = client.content(" ", "q").await.unwrap_err();
        assert!(matches!(err, ClientError::Invalid(DispatchError::MissingField { field: "uniqueId" })));
        assert!(mock.calls("html").is_empty());
    }

    #[tokio::test]
    async fn expiry_check_clears_and_signals() {
        let (_mock, client) = client().await;
        let mut rx = client.subscribe();
        client.login(&pair().with_expiry(now_ms() + 3_600_000), "alice").unwrap();
        assert!(!client.check_expiry().unwrap());
        client.login(&pair().with_expiry(1), "alice").unwrap();
        assert!(client.check_expiry().unwrap());
        assert_eq!(client.credentials().current().unwrap(), None);
        assert_eq!(rx.try_recv().unwrap(), AuthSignal::ReauthRequired { reason: ReauthReason::Expired });
    }

    #[tokio::test]
    async fn logout_clears_sessions_and_credentials() {
        let (_mock, client) = client().await;
        client.login(&pair(), "alice").unwrap();
        client.set_variant(BackendVariant::Gateway).unwrap();
        client.chat("hi").await.unwrap();
        client.logout().unwrap();
        assert_eq!(client.sessions().active().unwrap(), None);
        assert_eq!(client.credentials().current().unwrap(), None);
    }

    #[tokio::test]
    async fn gateway_session_survives_client_restart() {
        let mock = MockBoundary::default();
        let base = serve(Router::new().route("/api/:action", post(api)).with_state(mock.clone())).await;
        let dir = tempfile::tempdir().unwrap();
        let kv: Arc<dyn KvPort> = Arc::new(SledKv::open_path(dir.path().join("client.db")).unwrap());

        let id = {
            let client = SearchClient::new(base.clone(), kv.clone(), Transport::new(Duration::from_secs(5)).unwrap()).unwrap();
            client.login(&pair(), "alice").unwrap();
            client.set_variant(BackendVariant::Gateway).unwrap();
            client.chat("hi").await.unwrap().session_id.unwrap()
        };

        let client = SearchClient::new(base, kv, Transport::new(Duration::from_secs(5)).unwrap()).unwrap();
        assert_eq!(client.variant().unwrap(), BackendVariant::Gateway);
        client.chat("again").await.unwrap();
        assert_eq!(mock.calls("chat")[1].body["sessionId"], json!(id));
    }

    #[tokio::test]
    async fn reply_arriving_after_end_session_starts_fresh_next_turn() {
        let (mock, client) = client().await;
        client.set_variant(BackendVariant::Gateway).unwrap();
        let first = client.chat("hi").await.unwrap().session_id.unwrap();

        mock.chat_delay_ms.store(300, Ordering::SeqCst);
        let (late, ended) = tokio::join!(client.chat("more"), async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            client.end_session()
        });
        ended.unwrap();
        assert_eq!(late.unwrap().session_id.as_deref(), Some(first.as_str()));
        assert_eq!(client.sessions().active().unwrap(), None);

        mock.chat_delay_ms.store(0, Ordering::SeqCst);
        let next = client.chat("again").await.unwrap().session_id.unwrap();
        assert_ne!(next, first);
        assert_eq!(mock.calls("chat").pop().unwrap().body["sessionId"], json!(next));
    }

    #[tokio::test]
    async fn concurrent_chat_turns_run_one_at_a_time() {
        let (mock, client) = client().await;
        client.set_variant(BackendVariant::Agent).unwrap();
        mock.chat_delay_ms.store(100, Ordering::SeqCst);

        let (a, b) = tokio::join!(client.chat("one"), client.chat("two"));
        let (a, b) = (a.unwrap(), b.unwrap());
        assert_eq!(mock.max_chats_in_flight.load(Ordering::SeqCst), 1);

        let sent: Vec<_> = mock.calls("chat").into_iter().map(|c| c.body["sessionId"].clone()).collect();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1], sent[0]);
        assert_eq!(a.session_id, b.session_id);
        assert_eq!(sent[1], json!(a.session_id.unwrap()));
    }

    #[tokio::test]
    async fn wrapped_auth_failure_clears_credentials_and_signals() {
        let (mock, client) = client().await;
        client.login(&pair(), "alice").unwrap();
        let mut rx = client.subscribe();
        mock.wrap_unauthorized.store(true, Ordering::SeqCst);

        let err = client.search(RequestEnvelope::new("s3")).await.unwrap_err();
        assert!(err.is_unauthorized());
        assert_eq!(client.credentials().current().unwrap(), None);
        assert_eq!(
            rx.try_recv().unwrap(),
            AuthSignal::ReauthRequired { reason: ReauthReason::Rejected { status: 401 } }
        );
    }
}
