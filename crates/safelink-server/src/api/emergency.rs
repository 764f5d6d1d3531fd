use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use safelink_shared::constants::MAX_ALERT_MESSAGE_LEN;
use safelink_shared::{
    Alert, AlertCategory, AlertId, AlertStatus, LocationSample, Nearby, NewAlert, Page, Paginated,
    Principal, UserId, Validator,
};

use super::{ensure_caller, required, AppState, Items, LocationBody, NearbyParams};
use crate::auth::Authenticated;
use crate::error::ServerError;
use crate::service::MAX_ACTIVE_ALERTS;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerRequest {
    owner_id: Option<UserId>,
    category: Option<String>,
    #[serde(flatten)]
    location: LocationBody,
    message: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerResponse {
    alert_id: AlertId,
    status: AlertStatus,
    triggered_at: DateTime<Utc>,
}

pub async fn trigger(
    Authenticated(principal): Authenticated,
    State(state): State<AppState>,
    body: Result<Json<TriggerRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<TriggerResponse>), ServerError> {
    let Json(body) = body?;
    ensure_caller(&principal, body.owner_id.as_ref(), "ownerId")?;

    let mut v = Validator::new();
    let category = match required(&mut v, "category", body.category) {
        Some(raw) => match raw.parse::<AlertCategory>() {
            Ok(category) => Some(category),
            Err(errors) => {
                v.merge(errors);
                None
            }
        },
        None => None,
    };
    let location = body.location.parse(&mut v);
    v.max_chars("message", body.message.as_deref(), MAX_ALERT_MESSAGE_LEN);

    let (Some(category), Some(location)) = (category, location) else {
        return Err(v.into_errors().into());
    };
    v.finish()?;

    let new = NewAlert {
        owner_id: principal.user_id,
        category,
        location,
        message: body.message,
    };
    let alert = state.service.trigger(new).await?;
    Ok((
        StatusCode::CREATED,
        Json(TriggerResponse {
            alert_id: alert.id,
            status: alert.status,
            triggered_at: alert.triggered_at,
        }),
    ))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationRequest {
    alert_id: Option<AlertId>,
    #[serde(flatten)]
    location: LocationBody,
}

pub async fn append_location(
    Authenticated(principal): Authenticated,
    State(state): State<AppState>,
    body: Result<Json<LocationRequest>, JsonRejection>,
) -> Result<Json<Value>, ServerError> {
    let Json(body) = body?;

    let mut v = Validator::new();
    let alert_id = required(&mut v, "alertId", body.alert_id);
    let location = body.location.parse(&mut v);
    let (Some(alert_id), Some(location)) = (alert_id, location) else {
        return Err(v.into_errors().into());
    };
    v.finish()?;

    state
        .service
        .append_location(&principal, alert_id, location)
        .await?;
    Ok(Json(json!({ "ok": true })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionRequest {
    alert_id: Option<AlertId>,
    actor_id: Option<UserId>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionResponse {
    alert_id: AlertId,
    status: AlertStatus,
    resolved_at: Option<DateTime<Utc>>,
}

async fn close(
    principal: Principal,
    state: AppState,
    body: Result<Json<TransitionRequest>, JsonRejection>,
    target: AlertStatus,
) -> Result<Json<TransitionResponse>, ServerError> {
    let Json(body) = body?;
    ensure_caller(&principal, body.actor_id.as_ref(), "actorId")?;

    let mut v = Validator::new();
    let Some(alert_id) = required(&mut v, "alertId", body.alert_id) else {
        return Err(v.into_errors().into());
    };

    let alert = state.service.transition(&principal, alert_id, target).await?;
    Ok(Json(TransitionResponse {
        alert_id: alert.id,
        status: alert.status,
        resolved_at: alert.resolved_at,
    }))
}

pub async fn resolve(
    Authenticated(principal): Authenticated,
    State(state): State<AppState>,
    body: Result<Json<TransitionRequest>, JsonRejection>,
) -> Result<Json<TransitionResponse>, ServerError> {
    close(principal, state, body, AlertStatus::Resolved).await
}

pub async fn cancel(
    Authenticated(principal): Authenticated,
    State(state): State<AppState>,
    body: Result<Json<TransitionRequest>, JsonRejection>,
) -> Result<Json<TransitionResponse>, ServerError> {
    close(principal, state, body, AlertStatus::Cancelled).await
}

pub async fn false_alarm(
    Authenticated(principal): Authenticated,
    State(state): State<AppState>,
    body: Result<Json<TransitionRequest>, JsonRejection>,
) -> Result<Json<TransitionResponse>, ServerError> {
    close(principal, state, body, AlertStatus::FalseAlarm).await
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertDetail {
    alert: Alert,
    latest_location: Option<LocationSample>,
}

pub async fn get_alert(
    Authenticated(principal): Authenticated,
    State(state): State<AppState>,
    id: Result<Path<AlertId>, PathRejection>,
) -> Result<Json<AlertDetail>, ServerError> {
    let Path(id) = id?;
    let (alert, latest_location) = state.service.get(&principal, id).await?;
    Ok(Json(AlertDetail {
        alert,
        latest_location,
    }))
}

pub async fn locations(
    Authenticated(principal): Authenticated,
    State(state): State<AppState>,
    id: Result<Path<AlertId>, PathRejection>,
) -> Result<Json<Items<LocationSample>>, ServerError> {
    let Path(id) = id?;
    let items = state.service.locations(&principal, id).await?;
    Ok(Json(Items { items }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryQuery {
    owner_id: Option<UserId>,
    page: Option<u32>,
    limit: Option<u32>,
}

pub async fn history(
    Authenticated(principal): Authenticated,
    State(state): State<AppState>,
    query: Result<Query<HistoryQuery>, QueryRejection>,
) -> Result<Json<Paginated<Alert>>, ServerError> {
    let Query(query) = query?;
    let page = Page::new(query.page, query.limit)?;
    let history = state
        .service
        .history(&principal, query.owner_id, page)
        .await?;
    Ok(Json(history))
}

#[derive(Debug, Deserialize)]
pub struct ActiveQuery {
    limit: Option<usize>,
}

pub async fn active(
    Authenticated(principal): Authenticated,
    State(state): State<AppState>,
    query: Result<Query<ActiveQuery>, QueryRejection>,
) -> Result<Json<Items<Alert>>, ServerError> {
    let Query(query) = query?;
    let items = state
        .service
        .list_active(&principal, query.limit.unwrap_or(MAX_ACTIVE_ALERTS))
        .await?;
    Ok(Json(Items { items }))
}

pub async fn nearby(
    Authenticated(principal): Authenticated,
    State(state): State<AppState>,
    params: Result<Query<NearbyParams>, QueryRejection>,
) -> Result<Json<Items<Nearby<Alert>>>, ServerError> {
    let Query(params) = params?;
    let query = params.query()?;
    let items = state.service.nearby_alerts(&principal, &query).await?;
    Ok(Json(Items { items }))
}
