//! RPC method handlers organized by domain.

use std::sync::Arc;

use quill_core::{MessageRole, Roster, SessionKey};
use quill_engine::{ExerciseEngine, ExerciseError, PartnerRequest};
use quill_store::Database;
use quill_telemetry::{LogQuery, TelemetryGuard};
use serde::Serialize;

use crate::compat;
use crate::rpc::{self, RpcResponse};

/// Shared state available to all RPC handlers.
pub struct HandlerState {
    pub engine: Arc<ExerciseEngine>,
    pub db: Option<Database>,
    pub telemetry: Option<Arc<TelemetryGuard>>,
}

impl HandlerState {
    pub fn new(engine: Arc<ExerciseEngine>) -> Self {
        Self {
            engine,
            db: None,
            telemetry: None,
        }
    }

    pub fn with_database(mut self, db: Database) -> Self {
        self.db = Some(db);
        self
    }

    pub fn with_telemetry(mut self, telemetry: Arc<TelemetryGuard>) -> Self {
        self.telemetry = Some(telemetry);
        self
    }
}

/// Dispatch an RPC method to the appropriate handler.
///
/// Normalizes camelCase params to snake_case before routing, so all
/// handlers receive consistent snake_case keys.
pub async fn dispatch(
    state: &Arc<HandlerState>,
    method: &str,
    params: &serde_json::Value,
    id: Option<serde_json::Value>,
) -> RpcResponse {
    let params = compat::normalize_params(params);

    match method {
        // Session
        "session.start" => session_start(state, &params, id).await,
        "session.get" | "session.state" => session_get(state, &params, id).await,
        "session.list" => session_list(state, id).await,
        "session.delete" => session_delete(state, &params, id).await,

        // Writing
        "writing.prewriting" => writing(state, &params, id, Artifact::Prewriting).await,
        "writing.draft" => writing(state, &params, id, Artifact::Draft).await,
        "writing.notes" => writing(state, &params, id, Artifact::Notes).await,
        "writing.final" => writing(state, &params, id, Artifact::Final).await,

        // Stage
        "stage.advance" => stage_move(state, &params, id, StageMove::Advance).await,
        "stage.advanceFinal" => stage_move(state, &params, id, StageMove::Final).await,
        "stage.regress" => stage_move(state, &params, id, StageMove::Regress).await,
        "stage.jump" => stage_jump(state, &params, id).await,

        // Partner
        "partner.set" => partner_set(state, &params, id).await,
        "partner.clear" => partner_clear(state, &params, id).await,

        // Presence
        "presence.touch" => presence_touch(state, &params, id).await,
        "presence.leave" => presence_leave(state, &params, id).await,

        // Chat
        "chat.send" => chat_send(state, &params, id).await,
        "chat.messages" => chat_messages(state, &params, id).await,
        "chat.history" => chat_history(state, &params, id).await,

        // Roster
        "roster.students" => roster_students(state, &params, id, false).await,
        "roster.reload" => roster_students(state, &params, id, true).await,
        "roster.replace" => roster_replace(state, &params, id).await,

        // System
        "server.diag" => server_diag(state, id).await,
        "logs.query" => logs_query(state, &params, id),
        "system.ping" | "health" => health(state, id),

        _ => RpcResponse::method_not_found(id, method),
    }
}

// ── Response helpers ──

fn error_code(e: &ExerciseError) -> i32 {
    match e {
        ExerciseError::Validation(_) => rpc::VALIDATION_ERROR,
        ExerciseError::Permission(_) => rpc::PERMISSION_DENIED,
        ExerciseError::NotFound(_) => rpc::NOT_FOUND,
        ExerciseError::Config(_) => rpc::CONFIG_ERROR,
        e if e.is_conflict() => rpc::CONFLICT,
        ExerciseError::Store(_) => rpc::INTERNAL_ERROR,
    }
}

fn engine_error(id: Option<serde_json::Value>, e: ExerciseError) -> RpcResponse {
    if e.is_client_error() {
        tracing::debug!(kind = e.error_kind(), error = %e, "request rejected");
    } else {
        tracing::warn!(kind = e.error_kind(), error = %e, "request failed");
    }
    RpcResponse::error(id, error_code(&e), e.to_string())
}

fn to_json<T: Serialize>(id: Option<serde_json::Value>, key: &str, value: &T) -> RpcResponse {
    match serde_json::to_value(value) {
        Ok(v) => {
            let mut result = serde_json::Map::new();
            result.insert(key.to_string(), v);
            RpcResponse::success(id, serde_json::Value::Object(result))
        }
        Err(e) => RpcResponse::internal_error(id, e.to_string()),
    }
}

fn respond<T: Serialize>(
    id: Option<serde_json::Value>,
    key: &str,
    result: Result<T, ExerciseError>,
) -> RpcResponse {
    match result {
        Ok(value) => to_json(id, key, &value),
        Err(e) => engine_error(id, e),
    }
}

fn session_key(params: &serde_json::Value) -> Result<SessionKey, String> {
    rpc::require_str(params, "session_key").map(SessionKey::from_raw)
}

// ── Session handlers ──

async fn session_start(
    state: &Arc<HandlerState>,
    params: &serde_json::Value,
    id: Option<serde_json::Value>,
) -> RpcResponse {
    let group = rpc::optional_str(params, "group").unwrap_or_default();
    let student_id = rpc::optional_str(params, "student_id").unwrap_or_default();
    let student_name = rpc::optional_str(params, "student_name").unwrap_or_default();

    let result = state
        .engine
        .start_session(group, student_id, student_name)
        .await;
    respond(id, "session", result)
}

async fn session_get(
    state: &Arc<HandlerState>,
    params: &serde_json::Value,
    id: Option<serde_json::Value>,
) -> RpcResponse {
    let key = match session_key(params) {
        Ok(k) => k,
        Err(e) => return RpcResponse::invalid_params(id, e),
    };
    respond(id, "session", state.engine.session_state(&key).await)
}

async fn session_list(state: &Arc<HandlerState>, id: Option<serde_json::Value>) -> RpcResponse {
    match state.engine.list_sessions().await {
        Ok(sessions) => {
            let count = sessions.len();
            match serde_json::to_value(&sessions) {
                Ok(sessions) => RpcResponse::success(
                    id,
                    serde_json::json!({
                        "sessions": sessions,
                        "totalCount": count,
                    }),
                ),
                Err(e) => RpcResponse::internal_error(id, e.to_string()),
            }
        }
        Err(e) => engine_error(id, e),
    }
}

async fn session_delete(
    state: &Arc<HandlerState>,
    params: &serde_json::Value,
    id: Option<serde_json::Value>,
) -> RpcResponse {
    let key = match session_key(params) {
        Ok(k) => k,
        Err(e) => return RpcResponse::invalid_params(id, e),
    };
    match state.engine.delete_session(&key).await {
        Ok(()) => RpcResponse::success(id, serde_json::json!({"deleted": true})),
        Err(e) => engine_error(id, e),
    }
}

// ── Writing and stage handlers ──

#[derive(Clone, Copy)]
enum Artifact {
    Prewriting,
    Draft,
    Notes,
    Final,
}

async fn writing(
    state: &Arc<HandlerState>,
    params: &serde_json::Value,
    id: Option<serde_json::Value>,
    artifact: Artifact,
) -> RpcResponse {
    let key = match session_key(params) {
        Ok(k) => k,
        Err(e) => return RpcResponse::invalid_params(id, e),
    };
    let text = rpc::optional_str(params, "text").unwrap_or_default();

    let engine = &state.engine;
    let result = match artifact {
        Artifact::Prewriting => engine.submit_prewriting(&key, text).await,
        Artifact::Draft => engine.save_draft(&key, text).await,
        Artifact::Notes => engine.save_peer_notes(&key, text).await,
        Artifact::Final => engine.submit_final_writing(&key, text).await,
    };
    respond(id, "session", result)
}

#[derive(Clone, Copy)]
enum StageMove {
    Advance,
    Final,
    Regress,
}

async fn stage_move(
    state: &Arc<HandlerState>,
    params: &serde_json::Value,
    id: Option<serde_json::Value>,
    step: StageMove,
) -> RpcResponse {
    let key = match session_key(params) {
        Ok(k) => k,
        Err(e) => return RpcResponse::invalid_params(id, e),
    };
    let engine = &state.engine;
    let result = match step {
        StageMove::Advance => engine.advance_to_peer_stage(&key).await,
        StageMove::Final => engine.advance_to_final_stage(&key).await,
        StageMove::Regress => engine.regress_stage(&key).await,
    };
    respond(id, "session", result)
}

async fn stage_jump(
    state: &Arc<HandlerState>,
    params: &serde_json::Value,
    id: Option<serde_json::Value>,
) -> RpcResponse {
    let key = match session_key(params) {
        Ok(k) => k,
        Err(e) => return RpcResponse::invalid_params(id, e),
    };
    let Some(target) = rpc::optional_i64(params, "stage") else {
        return RpcResponse::invalid_params(id, "Missing required parameter: stage");
    };
    respond(id, "session", state.engine.jump_to_stage(&key, target).await)
}

// ── Partner and presence handlers ──

async fn partner_set(
    state: &Arc<HandlerState>,
    params: &serde_json::Value,
    id: Option<serde_json::Value>,
) -> RpcResponse {
    let key = match session_key(params) {
        Ok(k) => k,
        Err(e) => return RpcResponse::invalid_params(id, e),
    };
    let request = PartnerRequest {
        partner_session_key: rpc::optional_str(params, "partner_session_key")
            .map(SessionKey::from_raw),
        partner_id: rpc::optional_str(params, "partner_id").map(str::to_string),
        partner_name: rpc::optional_str(params, "partner_name").map(str::to_string),
    };
    respond(id, "session", state.engine.set_partner(&key, request).await)
}

async fn partner_clear(
    state: &Arc<HandlerState>,
    params: &serde_json::Value,
    id: Option<serde_json::Value>,
) -> RpcResponse {
    let key = match session_key(params) {
        Ok(k) => k,
        Err(e) => return RpcResponse::invalid_params(id, e),
    };
    respond(id, "session", state.engine.clear_partner(&key).await)
}

async fn presence_touch(
    state: &Arc<HandlerState>,
    params: &serde_json::Value,
    id: Option<serde_json::Value>,
) -> RpcResponse {
    let key = match session_key(params) {
        Ok(k) => k,
        Err(e) => return RpcResponse::invalid_params(id, e),
    };
    match state.engine.touch_presence(&key).await {
        Ok(record) => to_json(id, "presence", &record.presence),
        Err(e) => engine_error(id, e),
    }
}

async fn presence_leave(
    state: &Arc<HandlerState>,
    params: &serde_json::Value,
    id: Option<serde_json::Value>,
) -> RpcResponse {
    let key = match session_key(params) {
        Ok(k) => k,
        Err(e) => return RpcResponse::invalid_params(id, e),
    };
    let user_id = rpc::optional_str(params, "user_id").map(str::to_string);
    let user_name = rpc::optional_str(params, "user_name").map(str::to_string);
    match state.engine.leave_presence(&key, user_id, user_name).await {
        Ok(record) => to_json(id, "presence", &record.presence),
        Err(e) => engine_error(id, e),
    }
}

// ── Chat handlers ──

async fn chat_send(
    state: &Arc<HandlerState>,
    params: &serde_json::Value,
    id: Option<serde_json::Value>,
) -> RpcResponse {
    let key = match session_key(params) {
        Ok(k) => k,
        Err(e) => return RpcResponse::invalid_params(id, e),
    };
    let role = match rpc::optional_str(params, "role").map(str::parse::<MessageRole>) {
        None => MessageRole::User,
        Some(Ok(role)) => role,
        Some(Err(e)) => return RpcResponse::invalid_params(id, e),
    };
    let text = rpc::optional_str(params, "text").unwrap_or_default();
    let channel = compat::channel_param(params);

    respond(
        id,
        "message",
        state.engine.post_chat(&key, channel, role, text).await,
    )
}

async fn chat_messages(
    state: &Arc<HandlerState>,
    params: &serde_json::Value,
    id: Option<serde_json::Value>,
) -> RpcResponse {
    let key = match session_key(params) {
        Ok(k) => k,
        Err(e) => return RpcResponse::invalid_params(id, e),
    };
    let since = rpc::optional_i64(params, "since").unwrap_or(0);
    let channel = compat::channel_param(params);
    respond(
        id,
        "messages",
        state.engine.chat_messages(&key, channel, since).await,
    )
}

async fn chat_history(
    state: &Arc<HandlerState>,
    params: &serde_json::Value,
    id: Option<serde_json::Value>,
) -> RpcResponse {
    let key = match session_key(params) {
        Ok(k) => k,
        Err(e) => return RpcResponse::invalid_params(id, e),
    };
    let channel = compat::channel_param(params);
    respond(id, "messages", state.engine.chat_history(&key, channel).await)
}

// ── Roster handlers ──

async fn roster_students(
    state: &Arc<HandlerState>,
    params: &serde_json::Value,
    id: Option<serde_json::Value>,
    force: bool,
) -> RpcResponse {
    let force = force || rpc::optional_bool(params, "force").unwrap_or(false);
    match state.engine.roster_students(force).await {
        Ok(roster) => match serde_json::to_value(roster.as_ref()) {
            Ok(v) => RpcResponse::success(id, v),
            Err(e) => RpcResponse::internal_error(id, e.to_string()),
        },
        Err(e) => engine_error(id, e),
    }
}

async fn roster_replace(
    state: &Arc<HandlerState>,
    params: &serde_json::Value,
    id: Option<serde_json::Value>,
) -> RpcResponse {
    let raw = params.get("roster").unwrap_or(params);
    let roster: Roster = match serde_json::from_value(raw.clone()) {
        Ok(r) => r,
        Err(e) => return RpcResponse::invalid_params(id, format!("Invalid roster: {e}")),
    };
    respond(id, "report", state.engine.replace_roster(roster).await)
}

// ── System handlers ──

async fn server_diag(state: &Arc<HandlerState>, id: Option<serde_json::Value>) -> RpcResponse {
    match state.engine.diagnostics().await {
        Ok(diag) => match serde_json::to_value(&diag) {
            Ok(v) => RpcResponse::success(id, v),
            Err(e) => RpcResponse::internal_error(id, e.to_string()),
        },
        Err(e) => engine_error(id, e),
    }
}

fn logs_query(
    state: &Arc<HandlerState>,
    params: &serde_json::Value,
    id: Option<serde_json::Value>,
) -> RpcResponse {
    let Some(log_sink) = state.telemetry.as_ref().and_then(|t| t.logs()) else {
        return RpcResponse::success(
            id,
            serde_json::json!({
                "logs": [],
                "totalCount": 0,
                "enabled": false,
            }),
        );
    };

    let query = LogQuery {
        level: rpc::optional_str(params, "level").map(str::to_string),
        target: rpc::optional_str(params, "target").map(str::to_string),
        session_key: rpc::optional_str(params, "session_key").map(str::to_string),
        student_id: rpc::optional_str(params, "student_id").map(str::to_string),
        since: rpc::optional_str(params, "since").map(str::to_string),
        limit: rpc::optional_i64(params, "limit").map(|v| v.clamp(1, 1000) as u32),
    };

    match log_sink.query(&query) {
        Ok(records) => {
            let count = records.len();
            RpcResponse::success(
                id,
                serde_json::json!({
                    "logs": records,
                    "totalCount": count,
                    "enabled": true,
                }),
            )
        }
        Err(e) => RpcResponse::internal_error(id, format!("Failed to query logs: {e}")),
    }
}

fn health(state: &Arc<HandlerState>, id: Option<serde_json::Value>) -> RpcResponse {
    let database = match &state.db {
        Some(db) if db.ping() => "ok",
        Some(_) => "error",
        None => "not_configured",
    };

    RpcResponse::success(
        id,
        serde_json::json!({
            "status": if database == "error" { "degraded" } else { "healthy" },
            "components": {
                "database": database,
            },
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_core::{PairingMember, RosterPairing, Student};
    use quill_engine::EngineConfig;
    use quill_store::{SqliteChatLog, SqliteSessionStore, StaticRoster};
    use quill_telemetry::SqliteLogSink;
    use serde_json::json;

    fn roster() -> Roster {
        Roster {
            students: vec![Student::new("A1", "Alice"), Student::new("A2", "Bob")],
            pairings: vec![RosterPairing::new(
                PairingMember {
                    id: "A1".into(),
                    name: "Alice".into(),
                },
                PairingMember {
                    id: "A2".into(),
                    name: "Bob".into(),
                },
            )],
        }
    }

    fn setup() -> Arc<HandlerState> {
        let db = Database::in_memory().unwrap();
        let engine = ExerciseEngine::new(
            Arc::new(SqliteSessionStore::new(db.clone())),
            Arc::new(SqliteChatLog::new(db.clone())),
            Arc::new(StaticRoster::new(roster())),
            EngineConfig::default(),
        );
        Arc::new(HandlerState::new(Arc::new(engine)).with_database(db))
    }

    async fn call(
        state: &Arc<HandlerState>,
        method: &str,
        params: serde_json::Value,
    ) -> RpcResponse {
        dispatch(state, method, &params, Some(json!(1))).await
    }

    async fn start(state: &Arc<HandlerState>, id: &str, name: &str) -> String {
        let resp = call(
            state,
            "session.start",
            json!({"group": "A", "studentId": id, "studentName": name}),
        )
        .await;
        assert!(resp.success, "{:?}", resp.error);
        resp.result.unwrap()["session"]["sessionKey"]
            .as_str()
            .unwrap()
            .to_string()
    }

    fn error_code_of(resp: &RpcResponse) -> &str {
        resp.error.as_ref().map(|e| e.code.as_str()).unwrap_or("")
    }

    #[tokio::test]
    async fn dispatch_unknown_method() {
        let state = setup();
        let resp = call(&state, "foo.bar", json!({})).await;
        assert_eq!(error_code_of(&resp), "METHOD_NOT_FOUND");
    }

    #[tokio::test]
    async fn session_start_returns_record_shape() {
        let state = setup();
        let resp = call(
            &state,
            "session.start",
            json!({"group": "a", "studentId": "A1", "studentName": "Alice"}),
        )
        .await;
        let session = &resp.result.unwrap()["session"];
        assert!(session["sessionKey"].as_str().unwrap().starts_with("sess_"));
        assert_eq!(session["group"], "A");
        assert_eq!(session["stage"], 1);
        assert_eq!(session["partner"]["id"], "A2");
        assert!(session["presence"]["self"]["online"].as_bool().unwrap());
    }

    #[tokio::test]
    async fn engine_errors_map_to_codes() {
        let state = setup();
        let resp = call(
            &state,
            "session.start",
            json!({"group": "A", "studentId": "UNKNOWN", "studentName": "Name"}),
        )
        .await;
        assert_eq!(error_code_of(&resp), "PERMISSION_DENIED");

        let resp = call(
            &state,
            "session.start",
            json!({"group": "Z", "studentId": "A1", "studentName": "Alice"}),
        )
        .await;
        assert_eq!(error_code_of(&resp), "VALIDATION_ERROR");

        let resp = call(&state, "session.get", json!({"sessionKey": "sess_nope"})).await;
        assert_eq!(error_code_of(&resp), "NOT_FOUND");

        let resp = call(&state, "session.get", json!({})).await;
        assert_eq!(error_code_of(&resp), "INVALID_PARAMS");
    }

    #[tokio::test]
    async fn writing_and_stage_flow() {
        let state = setup();
        let key = start(&state, "A1", "Alice").await;

        let resp = call(
            &state,
            "writing.prewriting",
            json!({"sessionKey": key, "text": "  plan "}),
        )
        .await;
        let session = &resp.result.unwrap()["session"];
        assert_eq!(session["stage"], 2);
        assert_eq!(session["writing"]["prewriting"]["text"], "plan");

        let resp = call(&state, "writing.draft", json!({"sessionKey": key, "text": ""})).await;
        assert_eq!(error_code_of(&resp), "VALIDATION_ERROR");

        let resp = call(&state, "stage.advance", json!({"sessionKey": key})).await;
        assert_eq!(resp.result.unwrap()["session"]["stage"], 3);

        let resp = call(&state, "stage.jump", json!({"sessionKey": key, "stage": 9})).await;
        assert_eq!(error_code_of(&resp), "VALIDATION_ERROR");

        let resp = call(&state, "stage.regress", json!({"sessionKey": key})).await;
        assert_eq!(resp.result.unwrap()["session"]["stage"], 2);

        let resp = call(&state, "writing.final", json!({"sessionKey": key, "text": "done"})).await;
        assert_eq!(resp.result.unwrap()["session"]["stage"], 4);
    }

    #[tokio::test]
    async fn pairing_presence_and_peer_chat() {
        let state = setup();
        let alice = start(&state, "A1", "Alice").await;
        let bob = start(&state, "A2", "Bob").await;

        let resp = call(
            &state,
            "chat.send",
            json!({"sessionKey": bob, "channel": "peer-chat", "text": "hello"}),
        )
        .await;
        assert_eq!(resp.result.unwrap()["message"]["senderId"], "A2");

        let resp =
            call(&state, "chat.history", json!({"sessionKey": alice, "channel": "peer"})).await;
        let messages = resp.result.unwrap()["messages"].clone();
        assert_eq!(messages.as_array().unwrap().len(), 1);

        let resp = call(
            &state,
            "presence.leave",
            json!({"sessionKey": bob, "userId": "A2", "userName": "Bob"}),
        )
        .await;
        assert_eq!(resp.result.unwrap()["presence"]["self"]["online"], false);

        let resp = call(&state, "session.get", json!({"sessionKey": alice})).await;
        let session = resp.result.unwrap()["session"].clone();
        assert_eq!(session["partner"]["sessionKey"], json!(bob));

        let resp = call(&state, "partner.clear", json!({"sessionKey": alice})).await;
        assert!(resp.result.unwrap()["session"]["partner"].is_null());
    }

    #[tokio::test]
    async fn chat_send_rejects_unknown_role() {
        let state = setup();
        let key = start(&state, "A1", "Alice").await;
        let resp = call(
            &state,
            "chat.send",
            json!({"sessionKey": key, "text": "hi", "role": "robot"}),
        )
        .await;
        assert_eq!(error_code_of(&resp), "INVALID_PARAMS");
    }

    #[tokio::test]
    async fn roster_methods() {
        let state = setup();
        let resp = call(&state, "roster.students", json!({})).await;
        assert_eq!(resp.result.unwrap()["students"].as_array().unwrap().len(), 2);

        let resp = call(
            &state,
            "roster.replace",
            json!({"roster": {"students": [{"id": "Z1", "name": "Zed"}], "pairings": []}}),
        )
        .await;
        assert!(resp.success, "{:?}", resp.error);

        let resp = call(&state, "roster.reload", json!({})).await;
        assert_eq!(resp.result.unwrap()["students"][0]["id"], "Z1");

        let resp = call(&state, "roster.replace", json!({"students": "nope"})).await;
        assert_eq!(error_code_of(&resp), "INVALID_PARAMS");
    }

    #[tokio::test]
    async fn session_list_and_delete() {
        let state = setup();
        let key = start(&state, "A1", "Alice").await;

        let resp = call(&state, "session.list", json!({})).await;
        let result = resp.result.unwrap();
        assert_eq!(result["totalCount"], 1);
        assert_eq!(result["sessions"][0]["sessionKey"], json!(key));

        let resp = call(&state, "session.delete", json!({"sessionKey": key})).await;
        assert_eq!(resp.result.unwrap()["deleted"], true);

        let resp = call(&state, "session.delete", json!({"sessionKey": key})).await;
        assert_eq!(error_code_of(&resp), "NOT_FOUND");
    }

    #[tokio::test]
    async fn diag_and_health() {
        let state = setup();
        start(&state, "A1", "Alice").await;

        let resp = call(&state, "server.diag", json!({})).await;
        let diag = resp.result.unwrap();
        assert_eq!(diag["sessions"], 1);
        assert_eq!(diag["storageMode"], "sqlite");
        assert_eq!(diag["rosterStudents"], 2);

        let resp = call(&state, "health", json!({})).await;
        let health = resp.result.unwrap();
        assert_eq!(health["status"], "healthy");
        assert_eq!(health["components"]["database"], "ok");
    }

    #[tokio::test]
    async fn logs_query_reports_disabled_without_sink() {
        let state = setup();
        let resp = call(&state, "logs.query", json!({})).await;
        assert_eq!(resp.result.unwrap()["enabled"], false);
    }

    #[tokio::test]
    async fn logs_query_reads_sink() {
        let sink = Arc::new(SqliteLogSink::in_memory().unwrap());
        let base = setup();
        let state = Arc::new(HandlerState {
            engine: base.engine.clone(),
            db: None,
            telemetry: Some(Arc::new(TelemetryGuard::from_sink(sink))),
        });
        let resp = call(&state, "logs.query", json!({"level": "warn", "limit": 10})).await;
        let result = resp.result.unwrap();
        assert_eq!(result["enabled"], true);
        assert_eq!(result["totalCount"], 0);
    }
}
