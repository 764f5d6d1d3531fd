use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use safelink_shared::constants::{
    MAX_REPORT_DESCRIPTION_LEN, MAX_REPORT_TITLE_LEN, MIN_REPORT_DESCRIPTION_LEN,
    MIN_REPORT_TITLE_LEN,
};
use safelink_shared::{
    Nearby, NewReport, Page, Paginated, Report, ReportCategory, ReportId, ReportStatus,
    ValidationErrors, Validator,
};

use super::{required, AppState, Items, LocationBody, NearbyParams};
use crate::auth::Authenticated;
use crate::error::ServerError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateReportRequest {
    category: Option<String>,
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    #[serde(flatten)]
    location: LocationBody,
    #[serde(default)]
    media_urls: Vec<String>,
    #[serde(default)]
    anonymous: bool,
}

pub async fn create(
    Authenticated(principal): Authenticated,
    State(state): State<AppState>,
    body: Result<Json<CreateReportRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Report>), ServerError> {
    let Json(body) = body?;

    let mut v = Validator::new();
    let category = match required(&mut v, "category", body.category) {
        Some(raw) => match raw.parse::<ReportCategory>() {
            Ok(category) => Some(category),
            Err(e) => {
                v.push("category", e);
                None
            }
        },
        None => None,
    };
    let location = body.location.parse(&mut v);
    v.chars_between("title", &body.title, MIN_REPORT_TITLE_LEN, MAX_REPORT_TITLE_LEN)
        .chars_between(
            "description",
            &body.description,
            MIN_REPORT_DESCRIPTION_LEN,
            MAX_REPORT_DESCRIPTION_LEN,
        );

    let (Some(category), Some(location)) = (category, location) else {
        return Err(v.into_errors().into());
    };
    v.finish()?;

    let new = NewReport {
        reporter_id: principal.user_id,
        category,
        title: body.title,
        description: body.description,
        location,
        media_urls: body.media_urls,
        anonymous: body.anonymous,
    };
    let report = state.service.create_report(new).await?;
    Ok((StatusCode::CREATED, Json(report)))
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    page: Option<u32>,
    limit: Option<u32>,
    status: Option<String>,
}

fn parse_status(raw: &str) -> Result<ReportStatus, ValidationErrors> {
    raw.parse()
        .map_err(|e: String| ValidationErrors::single("status", e))
}

pub async fn list(
    Authenticated(principal): Authenticated,
    State(state): State<AppState>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Result<Json<Paginated<Report>>, ServerError> {
    let Query(query) = query?;
    let page = Page::new(query.page, query.limit)?;
    let status = query.status.as_deref().map(parse_status).transpose()?;

    let reports = state.service.list_reports(&principal, status, page).await?;
    Ok(Json(reports))
}

pub async fn nearby(
    Authenticated(_principal): Authenticated,
    State(state): State<AppState>,
    params: Result<Query<NearbyParams>, QueryRejection>,
) -> Result<Json<Items<Nearby<Report>>>, ServerError> {
    let Query(params) = params?;
    let query = params.query()?;
    let items = state.service.nearby_reports(&query).await?;
    Ok(Json(Items { items }))
}

pub async fn get_report(
    Authenticated(principal): Authenticated,
    State(state): State<AppState>,
    id: Result<Path<ReportId>, PathRejection>,
) -> Result<Json<Report>, ServerError> {
    let Path(id) = id?;
    Ok(Json(state.service.get_report(&principal, id).await?))
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdate {
    status: Option<String>,
}

pub async fn update_status(
    Authenticated(principal): Authenticated,
    State(state): State<AppState>,
    id: Result<Path<ReportId>, PathRejection>,
    body: Result<Json<StatusUpdate>, JsonRejection>,
) -> Result<Json<Report>, ServerError> {
    let Path(id) = id?;
    let Json(body) = body?;

    let mut v = Validator::new();
    let Some(raw) = required(&mut v, "status", body.status) else {
        return Err(v.into_errors().into());
    };
    let status = parse_status(&raw)?;

    let report = state
        .service
        .update_report_status(&principal, id, status)
        .await?;
    Ok(Json(report))
}
