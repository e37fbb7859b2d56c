//! Per-room game state machine.
//!
//! Scene, time left and the current persisted game id live under one lock.
//! Player and target data live in their own stores; when both locks are
//! needed the game lock is taken first.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use clicktrainer_core::net::messages::GameData;
use clicktrainer_core::player::Player;
use clicktrainer_core::room::{GameConfig, Scene};
use clicktrainer_core::target::Target;

use crate::events::EventBus;
use crate::player_store::PlayerStore;
use crate::target_store::TargetStore;

#[derive(Debug, Default)]
struct GameState {
    scene: Scene,
    time_left: u32,
    current_game_id: String,
    /// Set from the start of Combat until the round task has published
    /// its recap.
    round_running: bool,
}

pub struct Game {
    state: Mutex<GameState>,
    players: Arc<PlayerStore>,
    targets: Arc<TargetStore>,
    events: EventBus,
    config: GameConfig,
}

impl Game {
    pub fn new(players: Arc<PlayerStore>, targets: Arc<TargetStore>, config: GameConfig) -> Self {
        Self {
            state: Mutex::new(GameState::default()),
            players,
            targets,
            events: EventBus::new(),
            config,
        }
    }

    fn lock(&self) -> MutexGuard<'_, GameState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn players(&self) -> &PlayerStore {
        &self.players
    }

    pub fn targets(&self) -> &TargetStore {
        &self.targets
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    pub fn scene(&self) -> Scene {
        self.lock().scene
    }

    /// Move to `scene` if the state machine allows it and emit a scene
    /// change. Re-entering the current scene is allowed and still emits.
    pub fn set_scene(&self, scene: Scene) -> bool {
        {
            let mut state = self.lock();
            if !state.scene.can_transition_to(scene) {
                tracing::debug!(from = %state.scene, to = %scene, "Rejected scene transition");
                return false;
            }
            state.scene = scene;
        }
        self.events.publish(scene);
        true
    }

    /// Lobby -> Combat, only while every present player is ready. Exactly
    /// one caller wins when several readies land together.
    pub fn try_begin_combat(&self) -> bool {
        {
            let mut state = self.lock();
            if state.scene != Scene::Lobby || !self.players.all_ready() {
                return false;
            }
            state.scene = Scene::Combat;
            state.round_running = true;
        }
        self.events.publish(Scene::Combat);
        true
    }

    /// The round task is done with this round; play-again may proceed.
    pub fn finish_round(&self) {
        self.lock().round_running = false;
    }

    pub fn time_left(&self) -> u32 {
        self.lock().time_left
    }

    pub fn set_time_left(&self, secs: u32) {
        self.lock().time_left = secs;
    }

    /// Persisted game session id, empty when none is open.
    pub fn current_game_id(&self) -> String {
        self.lock().current_game_id.clone()
    }

    pub fn set_current_game_id(&self, id: impl Into<String>) {
        self.lock().current_game_id = id.into();
    }

    /// Clear the field, spawn the initial targets and reset the clock. The
    /// scene is left alone.
    pub fn start_round(&self) -> Vec<Target> {
        self.targets.clear();
        let spawned = (0..self.config.initial_targets)
            .map(|_| self.targets.add())
            .collect();
        self.set_time_left(self.config.round_secs());
        spawned
    }

    /// Enter Recap and return players ranked by score, highest first. Equal
    /// scores keep registration order.
    pub fn end_round(&self) -> Vec<Player> {
        {
            let mut state = self.lock();
            state.scene = Scene::Recap;
            state.time_left = 0;
        }
        self.events.publish(Scene::Recap);
        self.rankings()
    }

    /// Clear targets, reset every player and return to the lobby.
    pub fn reset_to_lobby(&self) {
        self.reset_locked(&mut self.lock());
        self.events.publish(Scene::Lobby);
    }

    /// [`reset_to_lobby`](Self::reset_to_lobby), but only from a finished
    /// Recap. Returns false if the scene is not Recap or the round task has
    /// not published its recap yet.
    pub fn try_reset_to_lobby(&self) -> bool {
        {
            let mut state = self.lock();
            if state.scene != Scene::Recap || state.round_running {
                return false;
            }
            self.reset_locked(&mut state);
        }
        self.events.publish(Scene::Lobby);
        true
    }

    fn reset_locked(&self, state: &mut GameState) {
        self.targets.clear();
        self.players.reset_all();
        state.scene = Scene::Lobby;
        state.time_left = 0;
        state.current_game_id.clear();
    }

    pub fn rankings(&self) -> Vec<Player> {
        let mut players = self.players.get_list();
        players.sort_by(|a, b| b.score.cmp(&a.score));
        players
    }

    /// Consistent view of the room for `player_id`.
    pub fn get(&self, player_id: &str) -> GameData {
        self.view(Some(player_id))
    }

    /// Consistent view of the room for spectators.
    pub fn snapshot(&self) -> GameData {
        self.view(None)
    }

    fn view(&self, player_id: Option<&str>) -> GameData {
        let state = self.lock();
        let player = player_id.and_then(|id| self.players.get(id));
        let players = self.players.get_list();
        let targets = self.targets.get_list();
        let rankings = if state.scene == Scene::Recap {
            let mut ranked = players.clone();
            ranked.sort_by(|a, b| b.score.cmp(&a.score));
            ranked
        } else {
            Vec::new()
        };
        GameData {
            scene: state.scene,
            player,
            players,
            targets,
            time_left: state.time_left,
            rankings,
            room_code: String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn game() -> Game {
        Game::new(
            Arc::new(PlayerStore::new()),
            Arc::new(TargetStore::new()),
            GameConfig {
                round_duration: Duration::from_secs(30),
                initial_targets: 4,
                ..GameConfig::default()
            },
        )
    }

    #[test]
    fn starts_in_lobby() {
        let g = game();
        assert_eq!(g.scene(), Scene::Lobby);
        assert_eq!(g.time_left(), 0);
        assert!(g.current_game_id().is_empty());
    }

    #[test]
    fn start_round_spawns_and_sets_clock() {
        let g = game();
        g.set_scene(Scene::Combat);
        let spawned = g.start_round();
        assert_eq!(spawned.len(), 4);
        assert_eq!(g.targets().get_list().len(), 4);
        assert_eq!(g.time_left(), 30);
        assert_eq!(g.scene(), Scene::Combat, "start_round leaves the scene alone");
        assert_eq!(spawned[0].id, 1);
    }

    #[test]
    fn start_round_restarts_target_ids() {
        let g = game();
        g.start_round();
        g.targets().add();
        let again = g.start_round();
        assert_eq!(again.iter().map(|t| t.id).collect::<Vec<_>>(), [1, 2, 3, 4]);
    }

    #[test]
    fn end_round_ranks_by_score() {
        let g = game();
        g.players().add("A", "Alice");
        g.players().add("B", "Bob");
        g.players().update_score("A", 50);
        g.players().update_score("B", 100);
        g.set_scene(Scene::Combat);

        let ranked = g.end_round();
        assert_eq!(g.scene(), Scene::Recap);
        let names: Vec<&str> = ranked.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["Bob", "Alice"]);
    }

    #[test]
    fn ties_keep_registration_order() {
        let g = game();
        for id in ["x", "y", "z"] {
            g.players().add(id, id);
            g.players().update_score(id, 10);
        }
        g.players().update_score("z", 1);
        let ids: Vec<String> = g.end_round().into_iter().map(|p| p.id).collect();
        assert_eq!(ids, ["z", "x", "y"]);
    }

    #[test]
    fn reset_to_lobby_is_idempotent() {
        let g = game();
        g.players().add("a", "Alice");
        g.players().set_ready("a", true);
        g.players().update_score("a", 9);
        g.set_scene(Scene::Combat);
        g.start_round();
        g.set_current_game_id("game-1");
        g.end_round();

        g.reset_to_lobby();
        let once = g.get("a");
        g.reset_to_lobby();
        let twice = g.get("a");

        assert_eq!(once, twice);
        assert_eq!(twice.scene, Scene::Lobby);
        assert_eq!(twice.time_left, 0);
        assert!(twice.targets.is_empty());
        assert_eq!(twice.players.len(), 1);
        assert_eq!(twice.players[0].score, 0);
        assert!(!twice.players[0].ready);
        assert!(g.current_game_id().is_empty());
    }

    #[test]
    fn invalid_transitions_rejected() {
        let g = game();
        assert!(!g.set_scene(Scene::Recap));
        assert_eq!(g.scene(), Scene::Lobby);
        assert!(g.set_scene(Scene::Lobby), "re-entering is allowed");
        assert!(g.set_scene(Scene::Combat));
        assert!(!g.set_scene(Scene::Lobby));
    }

    #[test]
    fn begin_combat_requires_everyone_ready() {
        let g = game();
        assert!(!g.try_begin_combat(), "empty room never starts");
        g.players().add("a", "Alice");
        g.players().add("b", "Bob");
        g.players().set_ready("a", true);
        assert!(!g.try_begin_combat());
        g.players().set_ready("b", true);
        assert!(g.try_begin_combat());
        assert_eq!(g.scene(), Scene::Combat);
        assert!(!g.try_begin_combat(), "only one winner");
    }

    #[test]
    fn lobby_reset_waits_for_finished_round() {
        let g = game();
        g.players().add("a", "Alice");
        assert!(!g.try_reset_to_lobby(), "not from the lobby");

        g.players().set_ready("a", true);
        assert!(g.try_begin_combat());
        g.players().update_score("a", 7);
        g.end_round();
        assert!(!g.try_reset_to_lobby(), "recap not published yet");
        assert_eq!(g.scene(), Scene::Recap);
        assert_eq!(g.players().get("a").unwrap().score, 7);

        g.finish_round();
        assert!(g.try_reset_to_lobby());
        assert_eq!(g.scene(), Scene::Lobby);
        assert_eq!(g.players().get("a").unwrap().score, 0);
        assert!(!g.try_reset_to_lobby());
    }

    #[tokio::test]
    async fn scene_changes_reach_the_bus() {
        let g = game();
        let mut rx = g.events().subscribe();
        g.set_scene(Scene::Combat);
        g.end_round();
        g.reset_to_lobby();
        assert_eq!(rx.recv().await.unwrap(), Scene::Combat);
        assert_eq!(rx.recv().await.unwrap(), Scene::Recap);
        assert_eq!(rx.recv().await.unwrap(), Scene::Lobby);
    }

    #[test]
    fn snapshot_includes_requesting_player() {
        let g = game();
        g.players().add("a", "Alice");
        g.players().add("b", "Bob");
        let view = g.get("b");
        assert_eq!(view.player.unwrap().name, "Bob");
        assert_eq!(view.players.len(), 2);
        assert!(view.rankings.is_empty());
        assert!(g.get("nobody").player.is_none());
        assert!(g.snapshot().player.is_none());
    }

    #[test]
    fn separate_games_are_isolated() {
        let a = game();
        let b = game();
        a.players().add("p", "Pat");
        a.players().update_score("p", 10);
        a.start_round();
        a.set_scene(Scene::Combat);

        let view = b.snapshot();
        assert!(view.players.is_empty());
        assert!(view.targets.is_empty());
        assert_eq!(view.scene, Scene::Lobby);
        assert_eq!(view.time_left, 0);
    }
}
