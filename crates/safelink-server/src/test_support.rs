//! In-memory wiring of the whole server for unit tests.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use chrono::Utc;
use ed25519_dalek::SigningKey;
use rand::rngs::OsRng;

use safelink_shared::session::create_session_token;
use safelink_shared::{Principal, Role};
use safelink_store::MemoryStore;

use crate::api::{build_router, AppState};
use crate::auth::SessionVerifier;
use crate::fanout::FanOutCoordinator;
use crate::notify::Dispatcher;
use crate::realtime::RoomBroadcaster;
use crate::service::EmergencyService;

pub struct TestApp {
    pub store: Arc<MemoryStore>,
    pub broadcaster: Arc<RoomBroadcaster>,
    pub service: Arc<EmergencyService>,
    pub state: AppState,
    issuer: SigningKey,
}

impl TestApp {
    /// No notification channel is configured, so every dispatch fails fast.
    pub fn new() -> Self {
        Self::with_dispatcher(Dispatcher::new())
    }

    pub fn with_dispatcher(dispatcher: Dispatcher) -> Self {
        let store = Arc::new(MemoryStore::new());
        let broadcaster = Arc::new(RoomBroadcaster::new(64));
        let fanout = Arc::new(FanOutCoordinator::new(
            store.clone(),
            Arc::new(dispatcher),
            4,
            Duration::from_secs(1),
        ));
        let service = Arc::new(EmergencyService::new(
            store.clone(),
            store.clone(),
            store.clone(),
            broadcaster.clone(),
            fanout,
        ));

        let issuer = SigningKey::generate(&mut OsRng);
        let state = AppState {
            service: service.clone(),
            verifier: Arc::new(SessionVerifier::new(issuer.verifying_key().to_bytes())),
            broadcaster: broadcaster.clone(),
        };

        Self {
            store,
            broadcaster,
            service,
            state,
            issuer,
        }
    }

    pub fn router(&self) -> Router {
        build_router(self.state.clone())
    }

    /// A hex bearer token for `user` valid for the next hour.
    pub fn token(&self, user: &str, role: Role) -> String {
        let principal = Principal::new(user, role);
        create_session_token(&principal, Utc::now() + chrono::Duration::hours(1), &self.issuer)
            .encode()
    }
}
