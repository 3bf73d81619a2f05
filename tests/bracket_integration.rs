//! Integration tests driving whole tournaments through the scheduler, the
//! session registry, and the event hub together.

use chip_engine::{
    BracketError, BracketFormat, BracketScheduler, BracketStatus, ChannelKey, DrawPolicy,
    EngineEvent, EventHub, MatchStatus, Seeding, SessionError, SessionRegistry, TournamentConfig,
    game::GameError,
};
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};
use uuid::Uuid;

fn engine() -> (Arc<EventHub>, Arc<SessionRegistry>, Arc<BracketScheduler>) {
    let hub = Arc::new(EventHub::new());
    let registry = Arc::new(SessionRegistry::new(Arc::clone(&hub)));
    let scheduler = BracketScheduler::spawn(Arc::clone(&registry), Arc::clone(&hub));
    (hub, registry, scheduler)
}

fn single_round_rps() -> TournamentConfig {
    TournamentConfig::new(json!({"rounds_to_win": 1}))
}

/// Play every in-progress match so that its first-slot player wins, looping
/// until the bracket finishes or the timeout fires.
async fn drive_first_slot_wins(
    registry: &SessionRegistry,
    scheduler: &BracketScheduler,
    bracket_id: chip_engine::BracketId,
) -> chip_engine::Bracket {
    let mut driven: HashSet<chip_engine::SessionId> = HashSet::new();
    timeout(Duration::from_secs(5), async {
        loop {
            let bracket = scheduler.get_bracket(bracket_id).await.unwrap();
            if bracket.status == BracketStatus::Completed {
                return bracket;
            }
            for round in &bracket.rounds {
                for m in &round.matches {
                    if m.status == MatchStatus::InProgress
                        && let Some(session_id) = m.session_id
                        && let Some((a, b)) = m.players()
                        && driven.insert(session_id)
                    {
                        registry
                            .apply_move(session_id, a, &"rock".to_string())
                            .await
                            .unwrap();
                        registry
                            .apply_move(session_id, b, &"scissors".to_string())
                            .await
                            .unwrap();
                    }
                }
            }
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("bracket did not complete in time")
}

#[tokio::test]
async fn five_participant_bracket_runs_to_completion() {
    let (hub, registry, scheduler) = engine();
    let roster: Vec<String> = (1..=5).map(|i| format!("seed{i}")).collect();
    let bracket_id = scheduler
        .create_bracket(
            roster,
            "rps",
            BracketFormat::SingleElimination,
            Seeding::InOrder,
            single_round_rps(),
        )
        .await
        .unwrap();

    let (tx, mut rx) = mpsc::channel(32);
    hub.subscribe(ChannelKey::Bracket(bracket_id), Uuid::new_v4(), tx).await;

    scheduler.start_bracket(bracket_id).await.unwrap();
    let bracket = drive_first_slot_wins(&registry, &scheduler, bracket_id).await;

    // Three rounds of 4, 2, 1 matches; seeds 1-3 advanced on byes, and with
    // first-slot wins the top seed takes every played match.
    assert_eq!(bracket.round_count(), 3);
    assert_eq!(bracket.rounds[0].matches.len(), 4);
    assert_eq!(bracket.rounds[1].matches.len(), 2);
    assert_eq!(bracket.rounds[2].matches.len(), 1);
    assert_eq!(bracket.champion, Some("seed1".to_string()));
    assert!(bracket.completed_at.is_some());
    for round in &bracket.rounds {
        for m in &round.matches {
            assert_eq!(m.status, MatchStatus::Completed);
            assert!(m.winner.is_some());
        }
    }
    // Byes complete without sessions; only 4 matches actually played.
    let played = bracket
        .rounds
        .iter()
        .flat_map(|r| &r.matches)
        .filter(|m| m.session_id.is_some())
        .count();
    assert_eq!(played, 4);
    assert_eq!(registry.session_count().await, 4);

    // Each round announced once, then the completion event.
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    let rounds_announced: Vec<u32> = events
        .iter()
        .filter_map(|e| match e {
            EngineEvent::BracketRoundAdvanced { round_number, .. } => Some(*round_number),
            _ => None,
        })
        .collect();
    assert_eq!(rounds_announced, vec![1, 2, 3]);
    assert!(matches!(
        events.last(),
        Some(EngineEvent::BracketCompleted { champion, .. }) if champion == "seed1"
    ));
}

#[tokio::test]
async fn power_of_two_bracket_has_no_byes() {
    let (_hub, registry, scheduler) = engine();
    let roster: Vec<String> = (1..=4).map(|i| format!("seed{i}")).collect();
    let bracket_id = scheduler
        .create_bracket(
            roster,
            "rps",
            BracketFormat::SingleElimination,
            Seeding::InOrder,
            single_round_rps(),
        )
        .await
        .unwrap();
    scheduler.start_bracket(bracket_id).await.unwrap();
    let bracket = drive_first_slot_wins(&registry, &scheduler, bracket_id).await;

    assert_eq!(bracket.champion, Some("seed1".to_string()));
    let played = bracket
        .rounds
        .iter()
        .flat_map(|r| &r.matches)
        .filter(|m| m.session_id.is_some())
        .count();
    assert_eq!(played, 3);
}

#[tokio::test]
async fn random_seeding_keeps_the_roster_intact() {
    let (_hub, _registry, scheduler) = engine();
    let roster: Vec<String> = (1..=8).map(|i| format!("p{i}")).collect();
    let bracket_id = scheduler
        .create_bracket(
            roster.clone(),
            "rps",
            BracketFormat::SingleElimination,
            Seeding::Random,
            single_round_rps(),
        )
        .await
        .unwrap();

    let bracket = scheduler.get_bracket(bracket_id).await.unwrap();
    let seeded: HashSet<String> = bracket.rounds[0]
        .matches
        .iter()
        .flat_map(|m| m.slots.iter().filter_map(|s| s.player().cloned()))
        .collect();
    assert_eq!(seeded, roster.into_iter().collect::<HashSet<_>>());
}

#[tokio::test]
async fn duplicate_completion_delivery_advances_once() {
    let (_hub, _registry, scheduler) = engine();
    let bracket_id = scheduler
        .create_bracket(
            vec!["ann".to_string(), "ben".to_string()],
            "rps",
            BracketFormat::SingleElimination,
            Seeding::InOrder,
            single_round_rps(),
        )
        .await
        .unwrap();
    scheduler.start_bracket(bracket_id).await.unwrap();

    let bracket = scheduler.get_bracket(bracket_id).await.unwrap();
    let session_id = bracket.rounds[0].matches[0].session_id.unwrap();

    scheduler
        .advance_on_completion(session_id, Some("ben".to_string()))
        .await
        .unwrap();
    // Redelivery with a contradictory winner must be ignored.
    scheduler
        .advance_on_completion(session_id, Some("ann".to_string()))
        .await
        .unwrap();

    let bracket = scheduler.get_bracket(bracket_id).await.unwrap();
    assert_eq!(bracket.status, BracketStatus::Completed);
    assert_eq!(bracket.champion, Some("ben".to_string()));
    assert_eq!(bracket.rounds[0].matches[0].winner, Some("ben".to_string()));
}

#[tokio::test]
async fn completions_for_unknown_sessions_are_ignored() {
    let (_hub, _registry, scheduler) = engine();
    scheduler
        .advance_on_completion(Uuid::new_v4(), Some("nobody".to_string()))
        .await
        .unwrap();
    assert_eq!(scheduler.bracket_count().await, 0);
}

#[tokio::test]
async fn cancelled_bracket_schedules_no_further_sessions() {
    let (_hub, registry, scheduler) = engine();
    let roster: Vec<String> = (1..=4).map(|i| format!("seed{i}")).collect();
    let bracket_id = scheduler
        .create_bracket(
            roster,
            "rps",
            BracketFormat::SingleElimination,
            Seeding::InOrder,
            single_round_rps(),
        )
        .await
        .unwrap();
    scheduler.start_bracket(bracket_id).await.unwrap();
    assert_eq!(registry.session_count().await, 2);

    scheduler.cancel_bracket(bracket_id).await.unwrap();

    // An in-flight session finishing after cancellation is consumed but no
    // final is scheduled.
    let bracket = scheduler.get_bracket(bracket_id).await.unwrap();
    let m = &bracket.rounds[0].matches[0];
    let session_id = m.session_id.unwrap();
    let (a, b) = m.players().unwrap();
    let (a, b) = (a.clone(), b.clone());
    registry.apply_move(session_id, &a, &"rock".to_string()).await.unwrap();
    registry
        .apply_move(session_id, &b, &"scissors".to_string())
        .await
        .unwrap();
    sleep(Duration::from_millis(100)).await;

    let bracket = scheduler.get_bracket(bracket_id).await.unwrap();
    assert_eq!(bracket.status, BracketStatus::Cancelled);
    assert_eq!(bracket.champion, None);
    assert!(bracket.rounds[1].matches[0].session_id.is_none());
    assert_eq!(registry.session_count().await, 2);
}

#[tokio::test]
async fn drawn_match_replays_with_a_fresh_session() {
    let (_hub, _registry, scheduler) = engine();
    let bracket_id = scheduler
        .create_bracket(
            vec!["ann".to_string(), "ben".to_string()],
            "rps",
            BracketFormat::SingleElimination,
            Seeding::InOrder,
            single_round_rps(),
        )
        .await
        .unwrap();
    scheduler.start_bracket(bracket_id).await.unwrap();

    let bracket = scheduler.get_bracket(bracket_id).await.unwrap();
    let first_session = bracket.rounds[0].matches[0].session_id.unwrap();

    scheduler.advance_on_completion(first_session, None).await.unwrap();

    let bracket = scheduler.get_bracket(bracket_id).await.unwrap();
    let m = &bracket.rounds[0].matches[0];
    assert_eq!(m.status, MatchStatus::InProgress);
    assert_eq!(m.draw_replays, 1);
    let replay_session = m.session_id.unwrap();
    assert_ne!(replay_session, first_session);
    assert_eq!(bracket.status, BracketStatus::InProgress);

    scheduler
        .advance_on_completion(replay_session, Some("ann".to_string()))
        .await
        .unwrap();
    let bracket = scheduler.get_bracket(bracket_id).await.unwrap();
    assert_eq!(bracket.champion, Some("ann".to_string()));
}

#[tokio::test]
async fn exhausted_replay_budget_falls_back_to_a_coin_flip() {
    let (_hub, _registry, scheduler) = engine();
    let mut config = single_round_rps();
    config.max_draw_replays = 0;
    let bracket_id = scheduler
        .create_bracket(
            vec!["ann".to_string(), "ben".to_string()],
            "rps",
            BracketFormat::SingleElimination,
            Seeding::InOrder,
            config,
        )
        .await
        .unwrap();
    scheduler.start_bracket(bracket_id).await.unwrap();

    let bracket = scheduler.get_bracket(bracket_id).await.unwrap();
    let session_id = bracket.rounds[0].matches[0].session_id.unwrap();
    scheduler.advance_on_completion(session_id, None).await.unwrap();

    let bracket = scheduler.get_bracket(bracket_id).await.unwrap();
    assert_eq!(bracket.status, BracketStatus::Completed);
    let champion = bracket.champion.unwrap();
    assert!(champion == "ann" || champion == "ben");
}

#[tokio::test]
async fn coin_flip_policy_settles_draws_immediately() {
    let (_hub, _registry, scheduler) = engine();
    let config = single_round_rps().with_draw_policy(DrawPolicy::CoinFlip);
    let bracket_id = scheduler
        .create_bracket(
            vec!["ann".to_string(), "ben".to_string()],
            "rps",
            BracketFormat::SingleElimination,
            Seeding::InOrder,
            config,
        )
        .await
        .unwrap();
    scheduler.start_bracket(bracket_id).await.unwrap();

    let bracket = scheduler.get_bracket(bracket_id).await.unwrap();
    let session_id = bracket.rounds[0].matches[0].session_id.unwrap();
    scheduler.advance_on_completion(session_id, None).await.unwrap();

    let bracket = scheduler.get_bracket(bracket_id).await.unwrap();
    assert_eq!(bracket.status, BracketStatus::Completed);
    assert_eq!(bracket.rounds[0].matches[0].draw_replays, 0);
    assert!(bracket.champion.is_some());
}

#[tokio::test]
async fn invalid_game_config_is_rejected_at_creation() {
    let (_hub, registry, scheduler) = engine();

    // rounds_to_win 0 must fail here, not later inside start_bracket where
    // byes would already be resolved and the bracket left half-started.
    let err = scheduler
        .create_bracket(
            (1..=5).map(|i| format!("seed{i}")).collect(),
            "rps",
            BracketFormat::SingleElimination,
            Seeding::InOrder,
            TournamentConfig::new(json!({"rounds_to_win": 0})),
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        BracketError::Session(SessionError::Game(GameError::InvalidConfig(_)))
    ));
    assert_eq!(scheduler.bracket_count().await, 0);
    assert_eq!(registry.session_count().await, 0);

    let err = scheduler
        .create_bracket(
            vec!["ann".to_string(), "ben".to_string()],
            "rps",
            BracketFormat::SingleElimination,
            Seeding::InOrder,
            TournamentConfig::new(json!({"best_of": 3})),
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        BracketError::Session(SessionError::Game(GameError::InvalidConfig(_)))
    ));
    assert_eq!(scheduler.bracket_count().await, 0);
}

#[tokio::test]
async fn duplicate_roster_entries_are_rejected_at_creation() {
    let (_hub, _registry, scheduler) = engine();

    let err = scheduler
        .create_bracket(
            vec!["ann".to_string(), "ben".to_string(), "ann".to_string()],
            "rps",
            BracketFormat::SingleElimination,
            Seeding::InOrder,
            single_round_rps(),
        )
        .await
        .unwrap_err();
    assert_eq!(err, BracketError::DuplicateParticipant("ann".to_string()));
    assert_eq!(scheduler.bracket_count().await, 0);
}

#[tokio::test]
async fn forfeits_advance_the_bracket_like_losses() {
    let (_hub, registry, scheduler) = engine();
    let bracket_id = scheduler
        .create_bracket(
            vec!["ann".to_string(), "ben".to_string()],
            "rps",
            BracketFormat::SingleElimination,
            Seeding::InOrder,
            single_round_rps(),
        )
        .await
        .unwrap();
    scheduler.start_bracket(bracket_id).await.unwrap();

    let bracket = scheduler.get_bracket(bracket_id).await.unwrap();
    let session_id = bracket.rounds[0].matches[0].session_id.unwrap();
    registry.forfeit(session_id, &"ann".to_string()).await.unwrap();

    let bracket = timeout(Duration::from_secs(5), async {
        loop {
            let bracket = scheduler.get_bracket(bracket_id).await.unwrap();
            if bracket.status == BracketStatus::Completed {
                return bracket;
            }
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("bracket did not complete in time");
    assert_eq!(bracket.champion, Some("ben".to_string()));
}

#[tokio::test]
async fn lifecycle_misuse_is_rejected() {
    let (_hub, _registry, scheduler) = engine();

    let err = scheduler
        .create_bracket(
            vec!["solo".to_string()],
            "rps",
            BracketFormat::SingleElimination,
            Seeding::InOrder,
            single_round_rps(),
        )
        .await
        .unwrap_err();
    assert_eq!(err, BracketError::TooFewParticipants(1));

    let err = scheduler
        .create_bracket(
            vec!["ann".to_string(), "ben".to_string()],
            "chess",
            BracketFormat::SingleElimination,
            Seeding::InOrder,
            single_round_rps(),
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        BracketError::Session(SessionError::Game(GameError::UnknownGameType(_)))
    ));

    let missing = Uuid::new_v4();
    assert_eq!(
        scheduler.get_bracket(missing).await.unwrap_err(),
        BracketError::BracketNotFound(missing)
    );

    let bracket_id = scheduler
        .create_bracket(
            vec!["ann".to_string(), "ben".to_string()],
            "rps",
            BracketFormat::SingleElimination,
            Seeding::InOrder,
            single_round_rps(),
        )
        .await
        .unwrap();
    scheduler.start_bracket(bracket_id).await.unwrap();
    assert_eq!(
        scheduler.start_bracket(bracket_id).await.unwrap_err(),
        BracketError::BracketAlreadyStarted(bracket_id)
    );

    scheduler.cancel_bracket(bracket_id).await.unwrap();
    assert_eq!(
        scheduler.cancel_bracket(bracket_id).await.unwrap_err(),
        BracketError::BracketAlreadyFinished(bracket_id)
    );
    assert_eq!(
        scheduler.start_bracket(bracket_id).await.unwrap_err(),
        BracketError::BracketNotReady(bracket_id)
    );
}
