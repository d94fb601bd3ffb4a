use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use relaygate_agents::AgentRegistry;
use relaygate_auth::AuthInterceptor;
use relaygate_conversation::ConversationService;
use relaygate_core::config::RelaygateConfig;
use relaygate_dedupe::DedupeCache;
use relaygate_ledger::Store;
use relaygate_packs::{PackRegistry, ToolRouter};

use crate::binding::BindingResolver;

const DEDUPE_CAPACITY: usize = 4096;
const DEDUPE_TTL: Duration = Duration::from_secs(600);

/// Central shared state, composing every subsystem's handle — handed to
/// every Axum handler as `Arc<AppState>`.
pub struct AppState {
    pub config: RelaygateConfig,
    pub store: Arc<Store>,
    pub auth: Arc<AuthInterceptor>,
    pub agents: Arc<AgentRegistry>,
    pub packs: Arc<PackRegistry>,
    pub tool_router: Arc<ToolRouter>,
    pub conversation: Arc<ConversationService>,
    pub bindings: Arc<BindingResolver>,
}

impl AppState {
    pub fn new(config: RelaygateConfig) -> anyhow::Result<Self> {
        let store = Arc::new(Store::open(&config.database.path)?);
        let dedupe = DedupeCache::new(DEDUPE_CAPACITY, DEDUPE_TTL);
        let auth = Arc::new(AuthInterceptor::new(
            store.clone(),
            dedupe,
            config.auth.jwt_secret.clone(),
            config.registration.auto_register_unknown_fingerprints,
        ));
        let agents = Arc::new(AgentRegistry::new());
        let packs = Arc::new(PackRegistry::new());
        let tool_router = Arc::new(ToolRouter::new(packs.clone()));
        let conversation = Arc::new(ConversationService::new(store.clone(), agents.clone(), tool_router.clone()));
        let bindings = Arc::new(BindingResolver::new(store.clone(), agents.clone()));

        Ok(Self {
            config,
            store,
            auth,
            agents,
            packs,
            tool_router,
            conversation,
            bindings,
        })
    }
}

/// Assembles the full Axum router: agent/pack control streams, the client
/// RPC stream, and the HTTP bridge surface, per §5.8.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(crate::http::health::health_handler))
        .route("/health/ready", get(crate::http::health::ready_handler))
        .route("/agent/ws", get(crate::ws::agent::agent_ws_handler))
        .route("/pack/ws", get(crate::ws::pack::pack_ws_handler))
        .route("/ws", get(crate::ws::client::client_ws_handler))
        .route("/api/send", post(crate::http::bridge::send_handler))
        .route(
            "/api/bindings",
            get(crate::http::bridge::get_binding_handler)
                .post(crate::http::bridge::create_binding_handler)
                .delete(crate::http::bridge::delete_binding_handler),
        )
        .route("/api/agents", get(crate::http::bridge::list_agents_handler))
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
