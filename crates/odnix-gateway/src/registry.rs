//! Connection Registry
//!
//! Tracks live connections, enforces the connection limit and keeps
//! per-connection counters. Holds statistics only, never key material.

use odnix_protocol::{SessionId, SessionState, SessionStats};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use crate::errors::{GatewayError, GatewayResult};

/// Gateway-local connection identifier
pub type ConnectionId = u64;

/// Registry shared between the accept loop and connection tasks
pub type SharedRegistry = Arc<RwLock<ConnectionRegistry>>;

/// Manages all live connections
pub struct ConnectionRegistry {
    /// Connections indexed by id
    connections: HashMap<ConnectionId, ConnectionEntry>,
    /// Maximum number of connections
    max_connections: usize,
    /// Next id to hand out
    next_id: ConnectionId,
    /// Total connections accepted (lifetime counter)
    total_accepted: u64,
    /// Total connections turned away at the limit
    total_rejected: u64,
}

/// A registered connection with metadata
#[derive(Debug, Clone)]
pub struct ConnectionEntry {
    /// Connection id
    pub id: ConnectionId,
    /// Remote address
    pub remote_addr: SocketAddr,
    /// Latest session snapshot
    pub session: Option<SessionStats>,
    /// Frames dropped as undecodable
    pub malformed_frames: u32,
    /// Accept time
    pub connected_at: Instant,
}

impl ConnectionEntry {
    fn new(id: ConnectionId, remote_addr: SocketAddr) -> Self {
        Self {
            id,
            remote_addr,
            session: None,
            malformed_frames: 0,
            connected_at: Instant::now(),
        }
    }

    /// Get connection age
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }

    /// Session id once a session snapshot exists
    pub fn session_id(&self) -> Option<SessionId> {
        self.session.as_ref().map(|s| s.id)
    }

    /// Whether the session finished its handshake
    pub fn is_established(&self) -> bool {
        matches!(
            self.session.as_ref().map(|s| s.state),
            Some(SessionState::Established)
        )
    }
}

impl ConnectionRegistry {
    /// Create a new registry
    pub fn new(max_connections: usize) -> Self {
        Self {
            connections: HashMap::with_capacity(max_connections.min(1024)),
            max_connections,
            next_id: 1,
            total_accepted: 0,
            total_rejected: 0,
        }
    }

    /// Create a registry behind a shared lock
    pub fn shared(max_connections: usize) -> SharedRegistry {
        Arc::new(RwLock::new(Self::new(max_connections)))
    }

    /// Register a new connection
    pub fn register(&mut self, remote_addr: SocketAddr) -> GatewayResult<ConnectionId> {
        if self.connections.len() >= self.max_connections {
            self.total_rejected += 1;
            return Err(GatewayError::ConnectionLimitReached {
                max: self.max_connections,
            });
        }

        let id = self.next_id;
        self.next_id += 1;
        self.connections.insert(id, ConnectionEntry::new(id, remote_addr));
        self.total_accepted += 1;
        Ok(id)
    }

    /// Store the latest session snapshot
    pub fn update_session(&mut self, id: ConnectionId, stats: SessionStats) {
        if let Some(entry) = self.connections.get_mut(&id) {
            entry.session = Some(stats);
        }
    }

    /// Count an undecodable frame, returning the new total
    pub fn record_malformed(&mut self, id: ConnectionId) -> u32 {
        match self.connections.get_mut(&id) {
            Some(entry) => {
                entry.malformed_frames += 1;
                entry.malformed_frames
            }
            None => 0,
        }
    }

    /// Remove a connection
    pub fn remove(&mut self, id: ConnectionId) -> Option<ConnectionEntry> {
        self.connections.remove(&id)
    }

    /// Get a connection entry
    pub fn get(&self, id: ConnectionId) -> Option<&ConnectionEntry> {
        self.connections.get(&id)
    }

    /// Number of live connections
    pub fn active_count(&self) -> usize {
        self.connections.len()
    }

    /// Number of live connections with an established session
    pub fn established_count(&self) -> usize {
        self.connections
            .values()
            .filter(|entry| entry.is_established())
            .count()
    }

    /// Total connections accepted
    pub fn total_accepted(&self) -> u64 {
        self.total_accepted
    }

    /// Total connections rejected at the limit
    pub fn total_rejected(&self) -> u64 {
        self.total_rejected
    }

    /// Maximum concurrent connections
    pub fn max_connections(&self) -> usize {
        self.max_connections
    }

    /// Snapshot of all entries
    pub fn entries(&self) -> Vec<ConnectionEntry> {
        self.connections.values().cloned().collect()
    }
}
