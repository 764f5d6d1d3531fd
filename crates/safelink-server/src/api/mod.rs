use std::any::Any as PanicPayload;
use std::sync::Arc;

use axum::{
    http::Method,
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use safelink_shared::constants::MAX_ADDRESS_LEN;
use safelink_shared::{
    GeoPoint, Location, NearbyQuery, Principal, SafelinkError, UserId, ValidationErrors,
    Validator,
};

use crate::auth::SessionVerifier;
use crate::error::ServerError;
use crate::realtime::{ws::ws_handler, Broadcaster};
use crate::service::EmergencyService;

mod contacts;
mod emergency;
mod reports;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<EmergencyService>,
    pub verifier: Arc<SessionVerifier>,
    pub broadcaster: Arc<dyn Broadcaster>,
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/emergency/trigger", post(emergency::trigger))
        .route("/emergency/location", post(emergency::append_location))
        .route("/emergency/resolve", post(emergency::resolve))
        .route("/emergency/cancel", post(emergency::cancel))
        .route("/emergency/false-alarm", post(emergency::false_alarm))
        .route("/emergency/history", get(emergency::history))
        .route("/emergency/active", get(emergency::active))
        .route("/emergency/nearby", get(emergency::nearby))
        .route("/emergency/{id}", get(emergency::get_alert))
        .route("/emergency/{id}/locations", get(emergency::locations))
        .route("/contacts", get(contacts::list).post(contacts::add))
        .route("/contacts/{id}", delete(contacts::remove))
        .route("/reports", get(reports::list).post(reports::create))
        .route("/reports/nearby", get(reports::nearby))
        .route("/reports/{id}", get(reports::get_report))
        .route("/reports/{id}/status", put(reports::update_status))
        .route("/ws", get(ws_handler))
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// A panicking handler answers 500 in the usual error envelope.
fn panic_response(panic: Box<dyn PanicPayload + Send + 'static>) -> Response {
    let detail = panic
        .downcast_ref::<String>()
        .cloned()
        .or_else(|| panic.downcast_ref::<&str>().map(|s| s.to_string()))
        .unwrap_or_else(|| "unknown panic".to_string());
    ServerError::Internal(format!("handler panicked: {detail}")).into_response()
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting HTTP API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ---------------------------------------------------------------------------
// Shared request pieces
// ---------------------------------------------------------------------------

/// `{ "items": [...] }`
#[derive(Serialize)]
struct Items<T> {
    items: Vec<T>,
}

/// Coordinates as clients send them. Each field is checked on its own, so a
/// missing latitude is reported next to an out-of-range longitude.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LocationBody {
    latitude: Option<f64>,
    longitude: Option<f64>,
    accuracy: Option<f64>,
    altitude: Option<f64>,
    address: Option<String>,
}

impl LocationBody {
    fn parse(self, v: &mut Validator) -> Option<Location> {
        let latitude = required(v, "latitude", self.latitude);
        let longitude = required(v, "longitude", self.longitude);
        if let Some(lat) = latitude {
            v.latitude("latitude", lat);
        }
        if let Some(lng) = longitude {
            v.longitude("longitude", lng);
        }
        v.non_negative("accuracy", self.accuracy)
            .finite("altitude", self.altitude)
            .max_chars("address", self.address.as_deref(), MAX_ADDRESS_LEN);

        Some(Location {
            latitude: latitude?,
            longitude: longitude?,
            accuracy: self.accuracy,
            altitude: self.altitude,
            address: self.address,
        })
    }
}

/// `?lat&lng&radius&limit`
#[derive(Debug, Deserialize)]
struct NearbyParams {
    lat: Option<f64>,
    lng: Option<f64>,
    radius: Option<f64>,
    limit: Option<usize>,
}

impl NearbyParams {
    fn query(self) -> Result<NearbyQuery, ValidationErrors> {
        let mut v = Validator::new();
        let lat = required(&mut v, "lat", self.lat);
        let lng = required(&mut v, "lng", self.lng);
        if let Some(lat) = lat {
            v.latitude("lat", lat);
        }
        if let Some(lng) = lng {
            v.longitude("lng", lng);
        }
        if let Some(radius) = self.radius {
            v.check(
                radius.is_finite() && radius > 0.0,
                "radius",
                "must be a positive number of meters",
            );
        }
        let (Some(latitude), Some(longitude)) = (lat, lng) else {
            return Err(v.into_errors());
        };
        v.finish()?;
        NearbyQuery::new(GeoPoint { latitude, longitude }, self.radius, self.limit)
    }
}

fn required<T>(v: &mut Validator, field: &str, value: Option<T>) -> Option<T> {
    if value.is_none() {
        v.missing(field);
    }
    value
}

/// Bodies may name the acting user; when they do it must be the caller.
fn ensure_caller(principal: &Principal, claimed: Option<&UserId>, field: &str) -> Result<(), ServerError> {
    match claimed {
        Some(id) if !principal.is(id) => Err(SafelinkError::forbidden(format!(
            "{field} does not match the authenticated user"
        ))
        .into()),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use super::*;
    use crate::test_support::TestApp;

    #[tokio::test]
    async fn health_needs_no_token() {
        let app = TestApp::new();
        let response = app
            .router()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn protected_routes_reject_bad_tokens() {
        let app = TestApp::new();

        let missing = app
            .router()
            .oneshot(Request::get("/emergency/history").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);

        let garbage = app
            .router()
            .oneshot(
                Request::get("/contacts")
                    .header("authorization", "Bearer not-hex")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(garbage.status(), StatusCode::UNAUTHORIZED);

        let ws = app
            .router()
            .oneshot(Request::get("/ws?token=00ff").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(ws.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn location_body_reports_missing_and_out_of_range_together() {
        let body = LocationBody {
            latitude: None,
            longitude: Some(200.0),
            accuracy: Some(-1.0),
            ..LocationBody::default()
        };
        let mut v = Validator::new();
        assert!(body.parse(&mut v).is_none());
        let errors = v.into_errors();
        assert_eq!(errors.len(), 3);
        assert!(errors.has_field("latitude"));
        assert!(errors.has_field("longitude"));
        assert!(errors.has_field("accuracy"));

        let body = LocationBody {
            latitude: Some(10.0),
            longitude: Some(200.0),
            accuracy: Some(-1.0),
            ..LocationBody::default()
        };
        let mut v = Validator::new();
        assert!(body.parse(&mut v).is_some());
        let errors = v.into_errors();
        assert_eq!(errors.len(), 2);
        assert!(errors.has_field("longitude"));
        assert!(errors.has_field("accuracy"));
    }

    #[test]
    fn nearby_params_require_both_coordinates() {
        let params = NearbyParams {
            lat: Some(6.5),
            lng: None,
            radius: None,
            limit: None,
        };
        assert!(params.query().unwrap_err().has_field("lng"));

        let params = NearbyParams {
            lat: Some(6.5),
            lng: Some(3.4),
            radius: Some(-5.0),
            limit: Some(500),
        };
        assert!(params.query().unwrap_err().has_field("radius"));

        let params = NearbyParams {
            lat: None,
            lng: Some(300.0),
            radius: Some(0.0),
            limit: None,
        };
        let errors = params.query().unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(errors.has_field("lat"));
        assert!(errors.has_field("lng"));
        assert!(errors.has_field("radius"));
    }
}
