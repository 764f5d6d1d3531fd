//! The `/ws` subscription channel.
//!
//! The caller is authenticated before the upgrade. Each connection joins
//! `user:{id}` and, for responders and admins, `responders`; clients add and
//! drop `alert:{id}` rooms with `watch` / `unwatch` frames.

use std::collections::HashMap;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use safelink_shared::{AlertId, Principal, Room};

use super::Broadcaster;
use crate::api::AppState;
use crate::auth::Authenticated;

/// Frames queued for one socket before the forwarders start waiting.
const OUTBOUND_BUFFER: usize = 64;

/// Frames a client may send.
#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
enum ClientFrame {
    #[serde(rename_all = "camelCase")]
    Watch { alert_id: AlertId },
    #[serde(rename_all = "camelCase")]
    Unwatch { alert_id: AlertId },
}

pub async fn ws_handler(
    Authenticated(principal): Authenticated,
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, principal, state))
}

async fn handle_socket(socket: WebSocket, principal: Principal, state: AppState) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::channel::<String>(OUTBOUND_BUFFER);

    let writer = tokio::spawn(async move {
        while let Some(text) = rx.recv().await {
            if sink.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    let mut session = Session::open(principal, state, tx);
    info!(user = %session.principal.user_id, "Subscriber connected");

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => session.handle_frame(text.as_str()).await,
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                debug!(user = %session.principal.user_id, error = %e, "Socket read failed");
                break;
            }
        }
    }

    info!(user = %session.principal.user_id, "Subscriber disconnected");
    drop(session);
    writer.abort();
}

/// Room membership of one connection. Each joined room has a forwarder task
/// that serializes its events onto the outbound queue.
struct Session {
    principal: Principal,
    state: AppState,
    outbound: mpsc::Sender<String>,
    rooms: HashMap<Room, JoinHandle<()>>,
}

impl Session {
    fn open(principal: Principal, state: AppState, outbound: mpsc::Sender<String>) -> Self {
        let mut session = Self {
            principal,
            state,
            outbound,
            rooms: HashMap::new(),
        };
        session.join(Room::User(session.principal.user_id.clone()));
        if session.principal.is_responder() {
            session.join(Room::Responders);
        }
        session
    }

    fn join(&mut self, room: Room) {
        if self.rooms.contains_key(&room) {
            return;
        }

        // subscribe before spawning so nothing published after join is missed
        let mut events = self.state.broadcaster.subscribe(room.clone());
        let outbound = self.outbound.clone();
        let forwarder = tokio::spawn(async move {
            while let Some(event) = events.next().await {
                let text = match serde_json::to_string(&*event) {
                    Ok(text) => text,
                    Err(e) => {
                        warn!(event = event.name(), error = %e, "Could not encode event");
                        continue;
                    }
                };
                if outbound.send(text).await.is_err() {
                    break;
                }
            }
        });

        debug!(user = %self.principal.user_id, %room, "Joined room");
        self.rooms.insert(room, forwarder);
    }

    fn leave(&mut self, room: &Room) -> bool {
        match self.rooms.remove(room) {
            Some(forwarder) => {
                forwarder.abort();
                debug!(user = %self.principal.user_id, %room, "Left room");
                true
            }
            None => false,
        }
    }

    async fn handle_frame(&mut self, text: &str) {
        let reply = match serde_json::from_str::<ClientFrame>(text) {
            Ok(ClientFrame::Watch { alert_id }) => {
                match self.state.service.visible_alert(&self.principal, alert_id).await {
                    Ok(_) => {
                        self.join(Room::Alert(alert_id));
                        json!({ "ok": true, "action": "watch", "alertId": alert_id })
                    }
                    Err(e) => json!({ "error": e.to_string() }),
                }
            }
            Ok(ClientFrame::Unwatch { alert_id }) => {
                let left = self.leave(&Room::Alert(alert_id));
                json!({ "ok": left, "action": "unwatch", "alertId": alert_id })
            }
            Err(e) => json!({ "error": format!("unsupported frame: {e}") }),
        };

        let _ = self.outbound.send(reply.to_string()).await;
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        for (_, forwarder) in self.rooms.drain() {
            forwarder.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use safelink_shared::{
        AlertCategory, AlertStatus, Location, NewAlert, RealtimeEvent, Role, UserId,
    };

    use super::*;
    use crate::test_support::TestApp;

    async fn next_frame(rx: &mut mpsc::Receiver<String>) -> serde_json::Value {
        let text = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("frame within a second")
            .expect("outbound open");
        serde_json::from_str(&text).unwrap()
    }

    fn session(app: &TestApp, user: &str, role: Role) -> (Session, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(16);
        (Session::open(Principal::new(user, role), app.state.clone(), tx), rx)
    }

    async fn trigger(app: &TestApp, owner: &str) -> AlertId {
        app.service
            .trigger(NewAlert {
                owner_id: UserId::from(owner),
                category: AlertCategory::Security,
                location: Location::at(6.5244, 3.3792),
                message: None,
            })
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn rooms_follow_role() {
        let app = TestApp::new();
        let (user, _) = session(&app, "u1", Role::User);
        let (responder, _) = session(&app, "r1", Role::Responder);

        assert!(user.rooms.contains_key(&Room::User(UserId::from("u1"))));
        assert!(!user.rooms.contains_key(&Room::Responders));
        assert!(responder.rooms.contains_key(&Room::Responders));
    }

    #[tokio::test]
    async fn watchers_receive_location_events() {
        let app = TestApp::new();
        let id = trigger(&app, "u1").await;
        let (mut responder, mut rx) = session(&app, "r1", Role::Responder);

        responder
            .handle_frame(&format!(r#"{{"action":"watch","alertId":"{id}"}}"#))
            .await;
        let ack = next_frame(&mut rx).await;
        assert_eq!(ack["ok"], true);

        app.service
            .append_location(&Principal::new("u1", Role::User), id, Location::at(6.525, 3.38))
            .await
            .unwrap();

        let event = next_frame(&mut rx).await;
        assert_eq!(event["event"], "alert.location");
        assert_eq!(event["data"]["alertId"], id.to_string());
    }

    #[tokio::test]
    async fn strangers_cannot_watch() {
        let app = TestApp::new();
        let id = trigger(&app, "u1").await;
        let (mut stranger, mut rx) = session(&app, "u2", Role::User);

        stranger
            .handle_frame(&format!(r#"{{"action":"watch","alertId":"{id}"}}"#))
            .await;
        assert!(next_frame(&mut rx).await["error"].is_string());
        assert!(!stranger.rooms.contains_key(&Room::Alert(id)));
    }

    #[tokio::test]
    async fn unknown_frames_get_an_error_reply() {
        let app = TestApp::new();
        let (mut user, mut rx) = session(&app, "u1", Role::User);

        user.handle_frame(r#"{"action":"dance"}"#).await;
        assert!(next_frame(&mut rx).await["error"].is_string());

        user.handle_frame("not json").await;
        assert!(next_frame(&mut rx).await["error"].is_string());
    }

    #[tokio::test]
    async fn dropping_a_session_releases_its_rooms() {
        let app = TestApp::new();
        let room = Room::User(UserId::from("u1"));
        let (user, _rx) = session(&app, "u1", Role::User);
        assert_eq!(app.broadcaster.subscriber_count(&room), 1);

        drop(user);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(app.broadcaster.subscriber_count(&room), 0);
        assert_eq!(app.broadcaster.room_count(), 0);
    }

    #[tokio::test]
    async fn unwatch_stops_delivery() {
        let app = TestApp::new();
        let id = trigger(&app, "u1").await;
        let (mut responder, mut rx) = session(&app, "r1", Role::Responder);

        responder
            .handle_frame(&format!(r#"{{"action":"watch","alertId":"{id}"}}"#))
            .await;
        next_frame(&mut rx).await;
        responder
            .handle_frame(&format!(r#"{{"action":"unwatch","alertId":"{id}"}}"#))
            .await;
        assert_eq!(next_frame(&mut rx).await["ok"], true);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(app.broadcaster.subscriber_count(&Room::Alert(id)), 0);
        assert_eq!(app.broadcaster.room_count(), 2);
        app.broadcaster.publish(
            &Room::Alert(id),
            RealtimeEvent::AlertResolved {
                alert_id: id,
                status: AlertStatus::Resolved,
                resolved_at: None,
            },
        );
        assert!(
            tokio::time::timeout(Duration::from_millis(100), rx.recv())
                .await
                .is_err()
        );
    }
}
