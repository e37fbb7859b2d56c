mod common;

use std::time::Duration;

use serde_json::Value;

use common::TestServer;

fn target_ids(snapshot: &Value) -> Vec<u64> {
    snapshot["targets"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["id"].as_u64().unwrap())
        .collect()
}

async fn finished_player_stats(server: &TestServer, player_id: &str) -> Value {
    for _ in 0..100 {
        let body: Value = server
            .client()
            .get(server.url(&format!("/api/stats/players/{player_id}")))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        if body["games_played"] == 1 {
            return body;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("stats for {player_id} were never finalized");
}

/// Two players, one full round over HTTP, then the stats it produced.
#[tokio::test]
async fn full_round_then_stats_then_play_again() {
    let server = TestServer::new().await;
    let code = server.create_room("alice").await;
    server.register(&code, "alice", "Alice").await;
    server.register(&code, "bob", "Bob").await;
    let mut events = server.events(&code).await;

    assert_eq!(server.ready(&code, "alice").await.status(), 200);
    assert_eq!(server.snapshot(&code, "alice").await["scene"], "lobby");
    assert_eq!(server.ready(&code, "bob").await.status(), 200);

    let start: Value = serde_json::from_str(&events.wait_for("roundStart").await).unwrap();
    let targets = target_ids(&start);
    assert_eq!(targets.len(), 3);

    // Bob takes two bullseyes, Alice one graze.
    let hit = server.click(&code, "bob", targets[0], 4).await;
    assert_eq!(hit["outcome"], "scored");
    assert_eq!(hit["player"]["score"], 4);
    server.click(&code, "bob", targets[1], 4).await;
    server.click(&code, "alice", targets[2], 1).await;

    // Second click on a dead target changes nothing.
    let dup = server.click(&code, "alice", targets[0], 4).await;
    assert_eq!(dup["outcome"], "already_dead");

    // Out-of-range points are ignored.
    let snapshot = server.snapshot(&code, "alice").await;
    let live = target_ids(&snapshot);
    if let Some(&id) = live.first() {
        let bad = server.click(&code, "alice", id, 9).await;
        assert_eq!(bad["outcome"], "rejected");
    }

    let recap: Value = serde_json::from_str(&events.wait_for("recap").await).unwrap();
    let rankings = recap["rankings"].as_array().unwrap();
    assert_eq!(rankings[0]["id"], "bob");
    assert_eq!(rankings[0]["score"], 8);
    assert_eq!(rankings[1]["id"], "alice");
    assert_eq!(rankings[1]["score"], 1);

    let snapshot = server.snapshot(&code, "alice").await;
    assert_eq!(snapshot["scene"], "recap");
    assert_eq!(snapshot["time_left"], 0);
    assert_eq!(snapshot["rankings"][0]["id"], "bob");

    // Clicks after the round are rejected.
    let late = server.click(&code, "bob", 99, 4).await;
    assert_eq!(late["outcome"], "rejected");

    // Stats land shortly after the recap.
    let bob = finished_player_stats(&server, "bob").await;
    assert_eq!(bob["games_played"], 1);
    assert_eq!(bob["win_count"], 1);
    assert_eq!(bob["win_streak"], 1);
    assert_eq!(bob["best_game"], 8);
    let earned: Vec<&str> = bob["earned"]
        .as_array()
        .unwrap()
        .iter()
        .map(|b| b["id"].as_str().unwrap())
        .collect();
    assert!(earned.contains(&"perfectionist"), "earned: {earned:?}");

    let board: Value = server
        .client()
        .get(server.url("/api/stats/leaderboard/score"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(board[0]["player_id"], "bob");
    assert_eq!(board[0]["rank"], 1);
    assert_eq!(board[1]["player_id"], "alice");
    assert_eq!(board[1]["rank"], 2);

    let bullseyes: Value = server
        .client()
        .get(server.url("/api/stats/leaderboard/bullseyes"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(bullseyes.as_array().unwrap().len(), 1);
    assert_eq!(bullseyes[0]["player_id"], "bob");

    // Back to the lobby with everything reset.
    let resp = server
        .client()
        .post(server.url(&format!("/api/rooms/{code}/play-again")))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let lobby: Value = serde_json::from_str(&events.wait_for("lobby").await).unwrap();
    assert_eq!(lobby["scene"], "lobby");
    assert_eq!(lobby["time_left"], 0);
    assert!(lobby["targets"].as_array().unwrap().is_empty());
    for p in lobby["players"].as_array().unwrap() {
        assert_eq!(p["score"], 0);
        assert_eq!(p["ready"], false);
    }
}

#[tokio::test]
async fn late_joiner_gets_scoreboard() {
    let server = TestServer::new().await;
    let code = server.create_room("alice").await;
    server.register(&code, "alice", "Alice").await;
    let mut events = server.events(&code).await;

    server.ready(&code, "alice").await;
    events.wait_for("roundStart").await;

    server.register(&code, "carol", "Carol").await;
    let board: Value = serde_json::from_str(&events.wait_for("scoreboard").await).unwrap();
    let names: Vec<&str> = board
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, ["Alice", "Carol"]);
}

#[tokio::test]
async fn stats_disabled_still_plays() {
    let mut config = clicktrainer_server::config::ServerConfig::default();
    config.game.round_duration_secs = 1;
    config.game.countdown_secs = 1;
    config.stats.enabled = false;
    let server = TestServer::from_config(config).await;

    let code = server.create_room("alice").await;
    server.register(&code, "alice", "Alice").await;
    let mut events = server.events(&code).await;
    server.ready(&code, "alice").await;

    let recap: Value = serde_json::from_str(&events.wait_for("recap").await).unwrap();
    assert_eq!(recap["rankings"][0]["id"], "alice");

    let resp = server
        .client()
        .get(server.url("/api/stats/players/alice"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}
