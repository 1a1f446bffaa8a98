use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use slotmachine_core::{
    Address, AggregateStats, GameConfigSnapshot, InMemoryLedger, Outcome, PlayerStats,
    ProvablyFairEntropy, SlotError, SlotMachine, SymbolId, SymbolTable, TokenLedger,
};
use slotmachine_shared::{
    ApiError, ApproveRequest, BalanceResponse, ErrorBody, HistoryLengthResponse, HistoryQuery,
    HistoryRangeResponse, MintRequest, PlayRequest, PlayResponse, SetGameConfigRequest,
    SetHistoryCapacityRequest, SetSymbolRequest, SetTokenRequest, VerifyResponse, WithdrawRequest,
    WithdrawResponse,
};
use sqlx::SqlitePool;
use std::sync::{Arc, Mutex, MutexGuard};
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};

use crate::{
    config::ServerConfig,
    store::{self, StoredParams},
};

pub type Machine = SlotMachine<InMemoryLedger, ProvablyFairEntropy>;

/// One lock over the whole machine: plays and admin calls are serialized, and
/// the guard is never held across an await.
pub struct AppState {
    pub db: SqlitePool,
    pub api_key: String,
    pub machine: Mutex<Machine>,
}

impl AppState {
    fn machine(&self) -> Result<MutexGuard<'_, Machine>, AppError> {
        self.machine.lock().map_err(|_| {
            error!("machine lock poisoned");
            AppError(ApiError::Internal)
        })
    }

    /// The operator identity behind a valid bearer token. A missing header is
    /// treated like a wrong one.
    fn authorize(&self, auth: AdminAuth) -> Result<Address, AppError> {
        match auth {
            Some(TypedHeader(Authorization(bearer))) if bearer.token() == self.api_key => {
                Ok(self.machine()?.operator())
            }
            _ => Err(AppError(ApiError::Unauthorized)),
        }
    }
}

/// Builds the machine and replays the settlement log into it, so player
/// accounts and aggregate stats survive restarts. The simulated ledger starts
/// fresh with the configured reserve.
pub async fn build_state(
    db: SqlitePool,
    config: &ServerConfig,
    params: StoredParams,
) -> anyhow::Result<AppState> {
    let mut ledger = InMemoryLedger::new();
    if config.initial_reserve > 0 {
        ledger.mint(&config.game.token, &config.house, config.initial_reserve)?;
    }
    let entropy = ProvablyFairEntropy::new(params.server_seed, params.sequence.max(0) as u64);
    let mut machine = SlotMachine::new(
        config.house,
        config.operator,
        config.game.clone(),
        SymbolTable::default(),
        ledger,
        entropy,
    )?;
    let logged = store::load_settlements(&db).await?;
    let restored = logged.len();
    for entry in logged {
        machine.replay_settlement(entry.player, entry.nonce, entry.outcome)?;
    }
    info!(restored, "settlement log replayed");
    Ok(AppState {
        db,
        api_key: config.api_key.clone(),
        machine: Mutex::new(machine),
    })
}

pub struct AppError(ApiError);

impl From<SlotError> for AppError {
    fn from(err: SlotError) -> Self {
        Self(ApiError::Slot(err))
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        error!(?err, "storage failure");
        Self(ApiError::Internal)
    }
}

fn status_of(err: &ApiError) -> StatusCode {
    match err {
        ApiError::Slot(slot) => match slot {
            SlotError::InvalidWager { .. }
            | SlotError::EmptySeed
            | SlotError::InvalidSymbolId { .. }
            | SlotError::InvalidWagerBounds { .. }
            | SlotError::ZeroAddress
            | SlotError::ZeroValue
            | SlotError::InvalidPercentage { .. } => StatusCode::BAD_REQUEST,
            SlotError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            SlotError::InsufficientAuthorization { .. } => StatusCode::PAYMENT_REQUIRED,
            SlotError::IndexOutOfRange { .. } => StatusCode::NOT_FOUND,
            SlotError::Paused => StatusCode::CONFLICT,
            SlotError::InsufficientReserve { .. } => StatusCode::SERVICE_UNAVAILABLE,
            SlotError::Overflow | SlotError::Ledger(_) => StatusCode::INTERNAL_SERVER_ERROR,
        },
        ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
        ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = status_of(&self.0);
        (
            status,
            Json(ErrorBody {
                error: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

type AdminAuth = Option<TypedHeader<Authorization<Bearer>>>;

async fn route_verify(State(state): State<Arc<AppState>>) -> Result<Json<VerifyResponse>, AppError> {
    let machine = state.machine()?;
    Ok(Json(VerifyResponse {
        server_seed_hash: machine.entropy().server_seed_hash_hex(),
        sequence: machine.entropy().sequence(),
    }))
}

async fn route_play(
    State(state): State<Arc<AppState>>,
    Json(req): Json<PlayRequest>,
) -> Result<Json<PlayResponse>, AppError> {
    let (result, server_seed_hash, sequence) = {
        let mut machine = state.machine()?;
        let result = machine.play(req.player, req.wager, &req.seed);
        (
            result,
            machine.entropy().server_seed_hash_hex(),
            machine.entropy().sequence(),
        )
    };
    // persist the entropy sequence even for rejected plays so values are never reused
    if let Err(err) = store::set_sequence(&state.db, sequence).await {
        error!(?err, sequence, "entropy sequence not persisted");
    }

    let settlement = result.map_err(|err| {
        warn!(player = %req.player, %err, "play rejected");
        err
    })?;
    // the play is already settled on the ledger; a logging failure must not hide it
    match store::record_spin(&state.db, &settlement, &server_seed_hash, sequence).await {
        Ok(id) => info!(id, player = %settlement.player, payout = settlement.payout, "spin logged"),
        Err(err) => error!(
            ?err,
            player = %settlement.player,
            nonce = settlement.nonce,
            "settled spin missing from the audit log"
        ),
    }
    Ok(Json(PlayResponse::from_settlement(settlement, server_seed_hash)))
}

async fn route_config(State(state): State<Arc<AppState>>) -> Result<Json<GameConfigSnapshot>, AppError> {
    Ok(Json(state.machine()?.game_config()))
}

async fn route_symbols(State(state): State<Arc<AppState>>) -> Result<Json<SymbolTable>, AppError> {
    Ok(Json(state.machine()?.symbols().clone()))
}

async fn route_stats(State(state): State<Arc<AppState>>) -> Result<Json<AggregateStats>, AppError> {
    Ok(Json(state.machine()?.aggregate_stats()))
}

async fn route_player_stats(
    State(state): State<Arc<AppState>>,
    Path(player): Path<Address>,
) -> Result<Json<PlayerStats>, AppError> {
    Ok(Json(state.machine()?.player_stats(&player)))
}

/// Without `start` this reports the history length; with it, a range.
async fn route_history(
    State(state): State<Arc<AppState>>,
    Path(player): Path<Address>,
    Query(query): Query<HistoryQuery>,
) -> Result<Response, AppError> {
    let machine = state.machine()?;
    match query.start {
        None => Ok(Json(HistoryLengthResponse {
            length: machine.history_length(&player),
        })
        .into_response()),
        Some(start) => {
            let entries = machine.history_range(&player, start, query.count.unwrap_or(u64::MAX))?;
            Ok(Json(HistoryRangeResponse { start, entries }).into_response())
        }
    }
}

async fn route_history_entry(
    State(state): State<Arc<AppState>>,
    Path((player, index)): Path<(Address, u64)>,
) -> Result<Json<Outcome>, AppError> {
    Ok(Json(state.machine()?.history_entry(&player, index)?))
}

/// Simulated on-chain approval on the owner's behalf, so operator-only.
async fn route_approve(
    State(state): State<Arc<AppState>>,
    auth: AdminAuth,
    Json(req): Json<ApproveRequest>,
) -> Result<StatusCode, AppError> {
    state.authorize(auth)?;
    let mut machine = state.machine()?;
    let token = machine.game_config().config.token;
    let house = machine.house();
    machine
        .ledger_mut()
        .approve(&token, &req.owner, &house, req.amount);
    Ok(StatusCode::NO_CONTENT)
}

async fn route_balance(
    State(state): State<Arc<AppState>>,
    Path(holder): Path<Address>,
) -> Result<Json<BalanceResponse>, AppError> {
    let machine = state.machine()?;
    let token = machine.game_config().config.token;
    Ok(Json(BalanceResponse {
        holder,
        token,
        balance: machine.ledger().balance_of(&token, &holder),
    }))
}

async fn route_admin_mint(
    State(state): State<Arc<AppState>>,
    auth: AdminAuth,
    Json(req): Json<MintRequest>,
) -> Result<StatusCode, AppError> {
    state.authorize(auth)?;
    let mut machine = state.machine()?;
    let token = machine.game_config().config.token;
    machine
        .ledger_mut()
        .mint(&token, &req.to, req.amount)
        .map_err(SlotError::from)?;
    info!(to = %req.to, amount = req.amount, "minted");
    Ok(StatusCode::NO_CONTENT)
}

async fn route_admin_set_symbol(
    State(state): State<Arc<AppState>>,
    auth: AdminAuth,
    Path(id): Path<SymbolId>,
    Json(req): Json<SetSymbolRequest>,
) -> Result<StatusCode, AppError> {
    let operator = state.authorize(auth)?;
    state
        .machine()?
        .set_symbol_config(&operator, id, req.name, req.weight, req.payout_multiplier)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn route_admin_game_config(
    State(state): State<Arc<AppState>>,
    auth: AdminAuth,
    Json(req): Json<SetGameConfigRequest>,
) -> Result<StatusCode, AppError> {
    let operator = state.authorize(auth)?;
    state
        .machine()?
        .set_game_config(&operator, req.min_wager, req.max_wager, req.house_edge_bps)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn route_admin_token(
    State(state): State<Arc<AppState>>,
    auth: AdminAuth,
    Json(req): Json<SetTokenRequest>,
) -> Result<StatusCode, AppError> {
    let operator = state.authorize(auth)?;
    state.machine()?.set_token(&operator, req.token)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn route_admin_withdraw(
    State(state): State<Arc<AppState>>,
    auth: AdminAuth,
    Json(req): Json<WithdrawRequest>,
) -> Result<Json<WithdrawResponse>, AppError> {
    let operator = state.authorize(auth)?;
    let withdrawn = state.machine()?.withdraw_reserve(&operator, req.amount)?;
    Ok(Json(WithdrawResponse { withdrawn }))
}

async fn route_admin_history_capacity(
    State(state): State<Arc<AppState>>,
    auth: AdminAuth,
    Json(req): Json<SetHistoryCapacityRequest>,
) -> Result<StatusCode, AppError> {
    let operator = state.authorize(auth)?;
    state
        .machine()?
        .set_history_capacity(&operator, req.capacity)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn route_admin_pause(
    State(state): State<Arc<AppState>>,
    auth: AdminAuth,
) -> Result<StatusCode, AppError> {
    let operator = state.authorize(auth)?;
    state.machine()?.pause(&operator)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn route_admin_unpause(
    State(state): State<Arc<AppState>>,
    auth: AdminAuth,
) -> Result<StatusCode, AppError> {
    let operator = state.authorize(auth)?;
    state.machine()?.unpause(&operator)?;
    Ok(StatusCode::NO_CONTENT)
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/verify", get(route_verify))
        .route("/play", post(route_play))
        .route("/config", get(route_config))
        .route("/symbols", get(route_symbols))
        .route("/stats", get(route_stats))
        .route("/players/:player/stats", get(route_player_stats))
        .route("/players/:player/history", get(route_history))
        .route("/players/:player/history/:index", get(route_history_entry))
        .route("/ledger/approve", post(route_approve))
        .route("/ledger/balance/:holder", get(route_balance))
        .route("/admin/mint", post(route_admin_mint))
        .route("/admin/symbols/:id", post(route_admin_set_symbol))
        .route("/admin/game-config", post(route_admin_game_config))
        .route("/admin/token", post(route_admin_token))
        .route("/admin/withdraw", post(route_admin_withdraw))
        .route("/admin/history-capacity", post(route_admin_history_capacity))
        .route("/admin/pause", post(route_admin_pause))
        .route("/admin/unpause", post(route_admin_unpause))
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::{to_bytes, Body},
        http::{header, Request},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    const ALICE: &str = "0x00000000000000000000000000000000000000a1";
    const ONE: &str = "1000000000000000000";

    async fn test_app() -> (Router, Arc<AppState>) {
        let db = store::connect("sqlite::memory:", 1).await.unwrap();
        let params = store::init_db(&db).await.unwrap();
        let config = ServerConfig::from_lookup(|_| None).unwrap();
        let state = Arc::new(build_state(db, &config, params).await.unwrap());
        (router(state.clone()), state)
    }

    fn post(uri: &str, body: Value, bearer: Option<&str>) -> Request<Body> {
        let mut builder = Request::post(uri).header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = bearer {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn get_req(uri: &str) -> Request<Body> {
        Request::get(uri).body(Body::empty()).unwrap()
    }

    async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
        let res = app.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn fund_alice(app: &Router) {
        let (status, _) = send(
            app,
            post(
                "/admin/mint",
                json!({ "to": ALICE, "amount": "50000000000000000000" }),
                Some("dev-key"),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = send(
            app,
            post(
                "/ledger/approve",
                json!({ "owner": ALICE, "amount": "50000000000000000000" }),
                Some("dev-key"),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn play_settles_and_is_logged() {
        let (app, state) = test_app().await;
        fund_alice(&app).await;

        let (status, body) = send(
            &app,
            post("/play", json!({ "player": ALICE, "wager": ONE, "seed": "first" }), None),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["nonce"], 1);
        assert_eq!(body["grid"].as_array().unwrap().len(), 3);
        assert_eq!(body["wager"], ONE);

        let (_, stats) = send(&app, get_req("/stats")).await;
        assert_eq!(stats["total_spins"], 1);
        assert_eq!(stats["total_wagered"], ONE);

        let (_, length) = send(&app, get_req(&format!("/players/{ALICE}/history"))).await;
        assert_eq!(length["length"], 1);

        let (_, range) = send(
            &app,
            get_req(&format!("/players/{ALICE}/history?start=0&count=10")),
        )
        .await;
        assert_eq!(range["entries"].as_array().unwrap().len(), 1);
        assert_eq!(range["entries"][0]["caller_seed"], "first");

        let (status, _) = send(&app, get_req(&format!("/players/{ALICE}/history/1"))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let logged: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM spins")
            .fetch_one(&state.db)
            .await
            .unwrap();
        assert_eq!(logged, 1);
        let params = store::get_params(&state.db).await.unwrap();
        assert_eq!(params.sequence, 1);
    }

    #[tokio::test]
    async fn rejected_plays_map_to_status_codes() {
        let (app, _) = test_app().await;

        let (status, body) = send(
            &app,
            post("/play", json!({ "player": ALICE, "wager": "1", "seed": "x" }), None),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("outside bounds"));

        let (status, _) = send(
            &app,
            post("/play", json!({ "player": ALICE, "wager": ONE, "seed": "x" }), None),
        )
        .await;
        assert_eq!(status, StatusCode::PAYMENT_REQUIRED);

        fund_alice(&app).await;
        let (status, _) = send(&app, post("/admin/pause", json!({}), Some("dev-key"))).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = send(
            &app,
            post("/play", json!({ "player": ALICE, "wager": ONE, "seed": "x" }), None),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn approval_needs_the_api_key() {
        let (app, _) = test_app().await;
        let (status, _) = send(
            &app,
            post(
                "/admin/mint",
                json!({ "to": ALICE, "amount": "50000000000000000000" }),
                Some("dev-key"),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        for bearer in [None, Some("wrong")] {
            let (status, body) = send(
                &app,
                post(
                    "/ledger/approve",
                    json!({ "owner": ALICE, "amount": "50000000000000000000" }),
                    bearer,
                ),
            )
            .await;
            assert_eq!(status, StatusCode::UNAUTHORIZED);
            assert_eq!(body["error"], "unauthorized");
        }

        let (status, _) = send(
            &app,
            post("/play", json!({ "player": ALICE, "wager": ONE, "seed": "x" }), None),
        )
        .await;
        assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
        let (_, balance) = send(&app, get_req(&format!("/ledger/balance/{ALICE}"))).await;
        assert_eq!(balance["balance"], "50000000000000000000");
    }

    #[tokio::test]
    async fn settled_play_survives_a_broken_audit_log() {
        let (app, state) = test_app().await;
        fund_alice(&app).await;
        state.db.close().await;

        let (status, body) = send(
            &app,
            post("/play", json!({ "player": ALICE, "wager": ONE, "seed": "offline" }), None),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["nonce"], 1);
        let (_, stats) = send(&app, get_req("/stats")).await;
        assert_eq!(stats["total_spins"], 1);
    }

    #[tokio::test]
    async fn restart_replays_the_settlement_log() {
        let (app, state) = test_app().await;
        fund_alice(&app).await;
        for seed in ["one", "two"] {
            let (status, _) = send(
                &app,
                post("/play", json!({ "player": ALICE, "wager": ONE, "seed": seed }), None),
            )
            .await;
            assert_eq!(status, StatusCode::OK);
        }
        let (_, before) = send(&app, get_req(&format!("/players/{ALICE}/stats"))).await;

        let params = store::get_params(&state.db).await.unwrap();
        assert_eq!(params.sequence, 2);
        let config = ServerConfig::from_lookup(|_| None).unwrap();
        let restarted = Arc::new(build_state(state.db.clone(), &config, params).await.unwrap());
        let app = router(restarted.clone());

        let (_, after) = send(&app, get_req(&format!("/players/{ALICE}/stats"))).await;
        assert_eq!(after, before);
        assert_eq!(after["spins"], 2);
        let (_, length) = send(&app, get_req(&format!("/players/{ALICE}/history"))).await;
        assert_eq!(length["length"], 2);
        let (_, stats) = send(&app, get_req("/stats")).await;
        assert_eq!(stats["total_spins"], 2);

        let machine = restarted.machine.lock().unwrap();
        assert_eq!(machine.player_nonce(&ALICE.parse().unwrap()), 2);
        assert_eq!(machine.entropy().sequence(), 2);
    }

    #[tokio::test]
    async fn admin_routes_need_the_api_key() {
        let (app, _) = test_app().await;
        let (status, _) = send(&app, post("/admin/pause", json!({}), Some("wrong"))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, body) = send(
            &app,
            post(
                "/admin/game-config",
                json!({ "min_wager": "1", "max_wager": "10", "house_edge_bps": 6000 }),
                Some("dev-key"),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("house edge"));

        let (status, _) = send(
            &app,
            post(
                "/admin/symbols/2",
                json!({ "name": "Grape", "weight": 10, "payout_multiplier": 40000 }),
                Some("dev-key"),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (_, symbols) = send(&app, get_req("/symbols")).await;
        assert_eq!(symbols[2]["name"], "Grape");

        let (status, body) = send(
            &app,
            post("/admin/withdraw", json!({ "amount": "0" }), Some("dev-key")),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["withdrawn"], "10000000000000000000000");
        let (_, config) = send(&app, get_req("/config")).await;
        assert_eq!(config["reserve"], "0");
    }
}
