use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;

use safelink_shared::{ContactId, NewContact, TrustedContact};

use super::{AppState, Items};
use crate::auth::Authenticated;
use crate::error::ServerError;

pub async fn list(
    Authenticated(principal): Authenticated,
    State(state): State<AppState>,
) -> Result<Json<Items<TrustedContact>>, ServerError> {
    let items = state.service.contacts(&principal).await?;
    Ok(Json(Items { items }))
}

pub async fn add(
    Authenticated(principal): Authenticated,
    State(state): State<AppState>,
    body: Result<Json<NewContact>, JsonRejection>,
) -> Result<(StatusCode, Json<TrustedContact>), ServerError> {
    let Json(new) = body?;
    let contact = state.service.add_contact(&principal, new).await?;
    Ok((StatusCode::CREATED, Json(contact)))
}

pub async fn remove(
    Authenticated(principal): Authenticated,
    State(state): State<AppState>,
    id: Result<Path<ContactId>, PathRejection>,
) -> Result<StatusCode, ServerError> {
    let Path(id) = id?;
    state.service.remove_contact(&principal, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::Request;
    use safelink_shared::Role;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::test_support::TestApp;

    fn post(uri: &str, token: &str, body: Value) -> Request<Body> {
        Request::post(uri)
            .header("authorization", format!("Bearer {token}"))
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn contacts_are_scoped_to_the_caller() {
        let app = TestApp::new();
        let u1 = app.token("u1", Role::User);
        let u2 = app.token("u2", Role::User);

        let response = app
            .router()
            .oneshot(post(
                "/contacts",
                &u1,
                json!({ "name": "Mum", "phoneNumber": "+234 801 234 5678", "isPrimary": true }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let mum = json_body(response).await;
        assert_eq!(mum["userId"], "u1");
        assert_eq!(mum["isPrimary"], true);

        let response = app
            .router()
            .oneshot(post("/contacts", &u1, json!({ "name": "Brother" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let response = app
            .router()
            .oneshot(
                Request::get("/contacts")
                    .header("authorization", format!("Bearer {u1}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let listed = json_body(response).await;
        let items = listed["items"].as_array().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0]["name"], "Mum");

        let id = mum["id"].as_str().unwrap();
        let delete = |token: &str| {
            Request::delete(format!("/contacts/{id}"))
                .header("authorization", format!("Bearer {token}"))
                .body(Body::empty())
                .unwrap()
        };

        let response = app.router().oneshot(delete(&u2)).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app.router().oneshot(delete(&u1)).await.unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn invalid_phone_numbers_are_rejected() {
        let app = TestApp::new();
        let u1 = app.token("u1", Role::User);

        let response = app
            .router()
            .oneshot(post(
                "/contacts",
                &u1,
                json!({ "name": "", "phoneNumber": "12ab" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["error"]["details"].as_array().unwrap().len(), 2);
    }
}
