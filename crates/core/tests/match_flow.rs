mod common;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rally::{MatchEvent, Phase, RallyConfig, SessionEvent, SyncRole};

use common::{Table, player_id};

fn started_table(seed: u64) -> Table {
    let mut table = Table::new(RallyConfig::default(), 2, seed);
    table.join_all();
    table.clients[0].role_mut().request_start_match();
    table.run_for(0.1);
    assert_eq!(table.server.role().arbiter().phase(), Phase::InMatch);
    table
}

fn assert_mirrors_converged(table: &Table) {
    let authoritative = table.server.role().arbiter().state();
    for client in &table.clients {
        assert_eq!(client.role().match_state(), authoritative);
    }
}

#[test]
fn test_full_match_over_network() {
    let mut table = started_table(21);
    assert_mirrors_converged(&table);

    let mut rng = StdRng::seed_from_u64(21);
    let winner = loop {
        let scorer = if rng.gen_bool(0.5) {
            player_id(0)
        } else {
            player_id(1)
        };
        let outcome = table.server.role_mut().record_point(scorer).unwrap();
        table.run_for(0.05);
        assert_mirrors_converged(&table);
        if let Some(winner) = outcome {
            break winner;
        }
    };

    let state = table.server.role().arbiter().state().clone();
    assert_eq!(state.phase, Phase::PostMatch);
    assert_eq!(state.winner(&RallyConfig::default().matchplay), Some(winner));
    assert!(state.score_a.max(state.score_b) >= 11);
    assert!(state.score_a.abs_diff(state.score_b) >= 2);

    table.run_for(5.5);
    assert_eq!(table.server.role().arbiter().phase(), Phase::Practice);
    assert_mirrors_converged(&table);
}

#[test]
fn test_only_current_server_is_granted() {
    let mut table = started_table(22);
    let server = table.server.role().arbiter().state().current_server.unwrap();
    let server_index = if server == player_id(0) { 0 } else { 1 };
    let receiver_index = 1 - server_index;

    assert!(table.clients[server_index].role().can_serve(server));
    table.clients[server_index].role_mut().request_serve();
    table.clients[receiver_index].role_mut().request_serve();
    table.run_for(0.1);

    assert!(table.client_events[server_index].iter().any(|e| matches!(
        e,
        SessionEvent::Match(MatchEvent::ServeGranted { .. })
    )));
    assert!(table.client_events[receiver_index].iter().any(|e| matches!(
        e,
        SessionEvent::Match(MatchEvent::ServeDenied { reason, .. }) if !reason.is_empty()
    )));
}

#[test]
fn test_rotation_reaches_replicas() {
    let mut table = started_table(23);
    let first = table.server.role().arbiter().state().current_server;

    table.server.role_mut().record_point(player_id(0)).unwrap();
    table.run_for(0.1);
    for client in &table.clients {
        assert_eq!(client.role().match_state().current_server, first);
    }

    table.server.role_mut().record_point(player_id(1)).unwrap();
    table.run_for(0.1);
    for (client, events) in table.clients.iter().zip(&table.client_events) {
        assert_ne!(client.role().match_state().current_server, first);
        assert!(events.iter().any(|e| matches!(
            e,
            SessionEvent::Match(MatchEvent::ServeRotated { total_points: 2, .. })
        )));
    }
}

#[test]
fn test_lifecycle_requests_from_replicas() {
    let mut table = started_table(24);

    table.clients[1].role_mut().request_pause();
    table.run_for(0.1);
    assert_eq!(table.server.role().arbiter().phase(), Phase::Paused);

    table.clients[1].role_mut().request_pause();
    table.run_for(0.1);
    assert!(table.clients[1].role().stats().requests_denied >= 1);

    table.clients[0].role_mut().request_resume();
    table.run_for(0.1);
    assert_eq!(table.server.role().arbiter().phase(), Phase::InMatch);

    table.clients[0].role_mut().request_end_match(Some(player_id(0)));
    table.run_for(0.1);
    assert_eq!(table.server.role().arbiter().phase(), Phase::Practice);
    assert_mirrors_converged(&table);
}

#[test]
fn test_leaving_player_forfeits_the_match() {
    let mut table = started_table(25);
    table.clients[1].role_mut().leave();
    table.run_for(0.1);

    let state = table.server.role().arbiter().state();
    assert_eq!(state.phase, Phase::PostMatch);
    assert!(table.server_events.iter().any(|e| matches!(
        e,
        SessionEvent::Match(MatchEvent::MatchWon { winner, .. }) if *winner == player_id(0)
    )));
}
