mod common;

use std::time::Duration;

use serde_json::Value;

use common::TestServer;

#[tokio::test]
async fn lobby_events_are_streamed() {
    let server = TestServer::new().await;
    let code = server.create_room("host").await;
    let mut events = server.events(&code).await;

    server.register(&code, "p1", "Alice").await;
    let data = events.wait_for("newPlayer").await;
    let player: Value = serde_json::from_str(&data).unwrap();
    assert_eq!(player["name"], "Alice");

    server.register(&code, "p2", "Bob").await;
    server.ready(&code, "p1").await;
    let data = events.wait_for("playerReady").await;
    let ready: Value = serde_json::from_str(&data).unwrap();
    assert_eq!(ready["player_id"], "p1");
    assert_eq!(ready["ready"], true);
}

#[tokio::test]
async fn all_ready_starts_countdown() {
    let server = TestServer::new().await;
    let code = server.create_room("host").await;
    server.register(&code, "p1", "Alice").await;
    let mut events = server.events(&code).await;

    server.ready(&code, "p1").await;
    let seen = events.collect_until("roundStart").await;
    let data_of = |name: &str| {
        seen.iter()
            .find(|(e, _)| e == name)
            .map(|(_, d)| d.clone())
            .unwrap_or_else(|| panic!("no {name} event"))
    };
    assert_eq!(data_of("sceneChange"), "combat");
    assert_eq!(data_of("countdown"), r#"{"count":1}"#);

    let snapshot: Value = serde_json::from_str(&data_of("roundStart")).unwrap();
    assert_eq!(snapshot["scene"], "combat");
    assert_eq!(snapshot["targets"].as_array().unwrap().len(), 3);
    assert_eq!(snapshot["time_left"], 2);
}

#[tokio::test]
async fn every_subscriber_receives_events() {
    let server = TestServer::new().await;
    let code = server.create_room("host").await;
    let mut a = server.events(&code).await;
    let mut b = server.events(&code).await;

    server.register(&code, "p1", "Alice").await;
    assert!(a.wait_for("newPlayer").await.contains("Alice"));
    assert!(b.wait_for("newPlayer").await.contains("Alice"));
}

#[tokio::test]
async fn streams_are_isolated_per_room() {
    let server = TestServer::new().await;
    let room_a = server.create_room("host").await;
    let room_b = server.create_room("host").await;
    let mut events_b = server.events(&room_b).await;

    server.register(&room_a, "p1", "Alice").await;
    assert!(
        events_b.next_event(Duration::from_millis(300)).await.is_none(),
        "room B must not see room A's events"
    );
}

#[tokio::test]
async fn deleting_room_ends_stream() {
    let server = TestServer::new().await;
    let code = server.create_room("host").await;
    let mut events = server.events(&code).await;

    assert!(server.state.rooms.delete(&code));
    assert!(events.next_event(Duration::from_secs(2)).await.is_none());
}

#[tokio::test]
async fn disconnected_subscriber_is_released() {
    let server = TestServer::new().await;
    let code = server.create_room("host").await;
    let room = server.state.rooms.get(&code).unwrap();

    let events = server.events(&code).await;
    assert_eq!(room.broadcaster.subscriber_count(), 1);
    drop(events);

    // The server notices on its next write.
    for _ in 0..100 {
        room.broadcaster
            .broadcast_oob(clicktrainer_core::net::messages::StreamEvent::Timer, "0");
        if room.broadcaster.subscriber_count() == 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("subscription was not released");
}
