use glam::Vec3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use rally::{
    Authority, BallState, EntityId, MatchEvent, MatchState, ObjectId, PeerId, Phase, Replica,
    Session, SessionEvent, SimulatedEndpoint, SimulatedNetwork, SyncEvent, SyncStats,
    net::SimulatorStats,
};

use crate::config::ServerConfig;

const SERVER_PEER: PeerId = 1;
const FIRST_CLIENT_PEER: PeerId = 10;
const BALL: ObjectId = 0;
const TABLE_HALF_LENGTH: f32 = 1.37;
const SERVE_HEIGHT: f32 = 1.0;
const OUT_OF_PLAY_X: f32 = 3.0;
const SERVE_DELAY_S: f64 = 0.5;
const SERVE_TIMEOUT_S: f64 = 2.0;
/// Gives every Join time to land before the first client asks to start.
const MATCH_REQUEST_DELAY_S: f64 = 0.5;

pub struct Report {
    pub matches_completed: u32,
    pub final_state: MatchState,
    pub authority_stats: SyncStats,
    pub replica_stats: Vec<(PeerId, SyncStats)>,
    pub network: SimulatorStats,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Rally {
    /// Ball held by the server until `until`.
    Holding { until: f64 },
    /// Permission requested at `since`, waiting for the answer.
    AwaitingServe { since: f64 },
    InFlight,
}

struct Client {
    peer: PeerId,
    player: EntityId,
    session: Session<Replica, SimulatedEndpoint>,
}

struct Scenario {
    network: SimulatedNetwork,
    server: Session<Authority, SimulatedEndpoint>,
    clients: Vec<Client>,
    rng: StdRng,
    rally: Rally,
    holder: EntityId,
    match_request_at: Option<f64>,
    matches_completed: u32,
    now: f64,
}

pub fn run(config: &ServerConfig) -> Report {
    let mut scenario = Scenario::new(config);
    let dt = 1.0 / config.rally.sync.tick_rate_hz;
    let steps = (config.seconds * f64::from(config.rally.sync.tick_rate_hz)).ceil() as u64;

    for client in &mut scenario.clients {
        client.session.role_mut().join();
    }

    for _ in 0..steps {
        scenario.step(dt);
    }

    let authority_stats = *scenario.server.stats();
    let replica_stats = scenario
        .clients
        .iter()
        .map(|c| (c.peer, *c.session.stats()))
        .collect();
    let final_state = scenario.server.role().arbiter().state().clone();

    scenario.server.end();
    for client in &mut scenario.clients {
        client.session.end();
    }

    Report {
        matches_completed: scenario.matches_completed,
        final_state,
        authority_stats,
        replica_stats,
        network: scenario.network.stats(),
    }
}

impl Scenario {
    fn new(config: &ServerConfig) -> Self {
        let network = SimulatedNetwork::new(config.seed);
        network.set_conditions(SERVER_PEER, config.link.clone());

        let mut authority = Authority::with_seed(config.rally.clone(), config.seed);
        let first_player = 1;
        let mut ball = BallState::at(serve_position(0));
        ball.attach(first_player);
        authority.spawn_ball(BALL, ball);
        let server = Session::new(authority, network.endpoint(SERVER_PEER));

        let clients = (0..config.replicas)
            .map(|i| {
                let peer = FIRST_CLIENT_PEER + i as PeerId;
                let player = i as EntityId + 1;
                network.set_conditions(peer, config.link.clone());
                let replica = Replica::new(config.rally.clone(), SERVER_PEER, Some(player));
                Client {
                    peer,
                    player,
                    session: Session::new(replica, network.endpoint(peer)),
                }
            })
            .collect();

        Self {
            network,
            server,
            clients,
            rng: StdRng::seed_from_u64(config.seed.wrapping_add(1)),
            rally: Rally::Holding {
                until: SERVE_DELAY_S,
            },
            holder: first_player,
            match_request_at: Some(MATCH_REQUEST_DELAY_S),
            matches_completed: 0,
            now: 0.0,
        }
    }

    fn request_match_if_due(&mut self) {
        let Some(at) = self.match_request_at else {
            return;
        };
        if self.now < at {
            return;
        }
        self.match_request_at = None;
        let phase = self.server.role().arbiter().phase();
        let Some(client) = self.clients.first_mut() else {
            log::warn!("no replicas, running practice only");
            return;
        };
        match phase {
            Phase::Practice => client.session.role_mut().request_prepare_match(),
            Phase::PreMatch => client.session.role_mut().request_start_match(),
            _ => {}
        }
    }

    fn step(&mut self, dt: f32) {
        self.now += f64::from(dt);
        self.request_match_if_due();
        self.network.advance_to(self.now);
        self.server.tick(self.now, dt);
        for event in self.server.drain_events() {
            self.on_server_event(event);
        }

        self.network.advance_to(self.now);
        let mut granted = false;
        for client in &mut self.clients {
            client.session.tick(self.now, dt);
            for event in client.session.drain_events() {
                match event {
                    SessionEvent::Match(MatchEvent::ServeGranted { player_id })
                        if player_id == client.player =>
                    {
                        granted = true;
                    }
                    SessionEvent::Match(MatchEvent::ServeDenied { player_id, reason }) => {
                        log::info!(
                            "replica {}: serve denied for {}: {}",
                            client.peer,
                            player_id,
                            reason
                        );
                    }
                    SessionEvent::Sync(SyncEvent::RequestDenied { reason }) => {
                        log::info!("replica {}: request denied: {}", client.peer, reason);
                        if client.peer == FIRST_CLIENT_PEER && self.match_request_at.is_none() {
                            self.match_request_at = Some(self.now + 1.0);
                        }
                    }
                    SessionEvent::Sync(SyncEvent::Frozen { object_id }) => {
                        log::debug!("replica {}: object {} frozen", client.peer, object_id);
                    }
                    _ => {}
                }
            }
        }

        self.advance_rally(granted);
    }

    fn on_server_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Match(MatchEvent::MatchStarted { server, .. }) => {
                self.reset_ball(server);
            }
            SessionEvent::Match(MatchEvent::MatchWon { winner, score_a, score_b }) => {
                self.matches_completed += 1;
                log::info!(
                    "match {} won by {} ({}-{})",
                    self.matches_completed,
                    winner,
                    score_a,
                    score_b
                );
            }
            SessionEvent::Match(MatchEvent::PhaseChanged { from, to }) => {
                log::info!("phase {:?} -> {:?}", from, to);
                match to {
                    Phase::Practice => {
                        self.match_request_at = Some(self.now + MATCH_REQUEST_DELAY_S);
                    }
                    Phase::PreMatch => self.match_request_at = Some(self.now),
                    _ => {}
                }
            }
            SessionEvent::Sync(SyncEvent::UpdateRejected { from, violation, .. }) => {
                log::warn!("submission from peer {} rejected: {}", from, violation);
            }
            _ => {}
        }
    }

    fn advance_rally(&mut self, granted: bool) {
        match self.rally {
            Rally::Holding { until } if self.now >= until => {
                let holder = self.holder;
                if let Some(client) = self.client_for(holder) {
                    client.session.role_mut().request_serve();
                }
                self.rally = Rally::AwaitingServe { since: self.now };
            }
            Rally::AwaitingServe { since } => {
                if granted {
                    self.strike_serve();
                    self.rally = Rally::InFlight;
                } else if self.now - since > SERVE_TIMEOUT_S {
                    log::debug!("no serve answer for {}, retrying", self.holder);
                    self.rally = Rally::Holding { until: self.now };
                }
            }
            Rally::InFlight => {
                let landed = self.server.role().ball(BALL).is_some_and(|b| {
                    !b.is_attached() && (b.position.y < 0.0 || b.position.x.abs() > OUT_OF_PLAY_X)
                });
                if landed {
                    self.finish_rally();
                }
            }
            Rally::Holding { .. } => {}
        }
    }

    /// The serving replica proposes the released ball; the authority
    /// validates and adopts it.
    fn strike_serve(&mut self) {
        let holder = self.holder;
        let side = self.side_of(holder);
        let direction = if side == 0 { 1.0 } else { -1.0 };
        let speed = self.rng.gen_range(4.0..7.0);
        let topspin = self.rng.gen_range(10.0..60.0);

        let mut ball = BallState::at(serve_position(side));
        ball.linear_velocity = Vec3::new(direction * speed, 1.5, 0.0);
        ball.spin.add_spin(Vec3::Z * -direction, topspin, &Default::default());

        let now = self.now;
        if let Some(client) = self.client_for(holder) {
            client.session.role_mut().submit_state(BALL, &ball, now);
        }
    }

    fn finish_rally(&mut self) {
        let phase = self.server.role().arbiter().phase();
        if phase == Phase::InMatch {
            let state = self.server.role().arbiter().state();
            let pick_a = self.rng.gen_bool(0.5);
            let scorer = if pick_a { state.player_a } else { state.player_b };
            if let Some(scorer) = scorer {
                if let Err(err) = self.server.role_mut().record_point(scorer) {
                    log::warn!("point for {} refused: {}", scorer, err);
                }
            }
        }

        let next = match self.server.role().arbiter().state().current_server {
            Some(server) if self.server.role().arbiter().phase() == Phase::InMatch => server,
            _ => self.holder,
        };
        self.reset_ball(next);
    }

    fn reset_ball(&mut self, holder: EntityId) {
        self.holder = holder;
        let side = self.side_of(holder);
        let authority = self.server.role_mut();
        if let Some(ball) = authority.ball_mut(BALL) {
            *ball = BallState::at(serve_position(side));
            ball.attach(holder);
        }
        self.rally = Rally::Holding {
            until: self.now + SERVE_DELAY_S,
        };
    }

    fn side_of(&self, player: EntityId) -> usize {
        if player % 2 == 1 { 0 } else { 1 }
    }

    fn client_for(&mut self, player: EntityId) -> Option<&mut Client> {
        self.clients.iter_mut().find(|c| c.player == player)
    }
}

fn serve_position(side: usize) -> Vec3 {
    let x = if side == 0 {
        -TABLE_HALF_LENGTH
    } else {
        TABLE_HALF_LENGTH
    };
    Vec3::new(x, SERVE_HEIGHT, 0.0)
}
