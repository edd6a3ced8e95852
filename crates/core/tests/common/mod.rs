#![allow(dead_code)]

use rally::{
    Authority, EntityId, LinkConditions, PeerId, RallyConfig, Replica, Session, SessionEvent,
    SimulatedEndpoint, SimulatedNetwork,
};

pub const SERVER_PEER: PeerId = 1;
pub const DT: f32 = 1.0 / 60.0;

pub fn client_peer(index: usize) -> PeerId {
    10 + index as PeerId
}

pub fn player_id(index: usize) -> EntityId {
    index as EntityId + 1
}

/// One authority and a set of replicas on a simulated network, stepped in
/// lockstep at 60 Hz.
pub struct Table {
    pub network: SimulatedNetwork,
    pub server: Session<Authority, SimulatedEndpoint>,
    pub clients: Vec<Session<Replica, SimulatedEndpoint>>,
    pub client_events: Vec<Vec<SessionEvent>>,
    pub server_events: Vec<SessionEvent>,
    pub now: f64,
}

impl Table {
    pub fn new(config: RallyConfig, replicas: usize, seed: u64) -> Self {
        let network = SimulatedNetwork::new(seed);
        let mut authority = Authority::with_seed(config.clone(), seed);
        authority.set_simulate(false);
        let server = Session::new(authority, network.endpoint(SERVER_PEER));
        let clients = (0..replicas)
            .map(|i| {
                let replica = Replica::new(config.clone(), SERVER_PEER, Some(player_id(i)));
                Session::new(replica, network.endpoint(client_peer(i)))
            })
            .collect();

        Self {
            network,
            server,
            clients,
            client_events: vec![Vec::new(); replicas],
            server_events: Vec::new(),
            now: 0.0,
        }
    }

    pub fn impair_all(&self, conditions: LinkConditions) {
        self.network.set_conditions(SERVER_PEER, conditions.clone());
        for i in 0..self.clients.len() {
            self.network.set_conditions(client_peer(i), conditions.clone());
        }
    }

    pub fn join_all(&mut self) {
        for client in &mut self.clients {
            client.role_mut().join();
        }
        self.run_for(0.1);
    }

    pub fn step(&mut self) {
        self.now += f64::from(DT);
        self.network.advance_to(self.now);
        self.server.tick(self.now, DT);
        self.server_events.extend(self.server.drain_events());
        self.network.advance_to(self.now);
        for (client, events) in self.clients.iter_mut().zip(&mut self.client_events) {
            client.tick(self.now, DT);
            events.extend(client.drain_events());
        }
    }

    pub fn run_for(&mut self, seconds: f64) {
        let end = self.now + seconds;
        while self.now < end {
            self.step();
        }
    }
}
