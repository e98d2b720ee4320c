//! Per-IP limit on concurrent SSH connections
//!
//! Every SSH connection may hold a staging file and a registry entry for up
//! to the transfer timeout, so a single address is capped at a fixed number
//! of simultaneous connections. A limit of 0 means unlimited.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{Arc, Mutex};

/// Tracks active SSH connections per IP address
#[derive(Debug)]
pub struct ConnectionTracker {
    connections: Arc<Mutex<HashMap<IpAddr, usize>>>,
    max_per_ip: usize,
}

impl ConnectionTracker {
    /// Create a tracker allowing `max_per_ip` connections per address
    #[must_use]
    pub fn new(max_per_ip: usize) -> Self {
        Self {
            connections: Arc::new(Mutex::new(HashMap::new())),
            max_per_ip,
        }
    }

    /// Try to acquire a connection slot for the given IP
    ///
    /// Returns `None` if the IP has reached its limit. The slot is released
    /// when the returned guard is dropped.
    pub fn try_acquire(&self, ip: IpAddr) -> Option<ConnectionGuard> {
        let mut connections = self.connections.lock().expect("connection tracker lock");
        let count = connections.entry(ip).or_insert(0);

        if self.max_per_ip > 0 && *count >= self.max_per_ip {
            return None;
        }

        *count += 1;
        Some(ConnectionGuard {
            ip,
            connections: self.connections.clone(),
        })
    }

    /// Current number of connections from `ip`
    pub fn count(&self, ip: IpAddr) -> usize {
        self.connections
            .lock()
            .expect("connection tracker lock")
            .get(&ip)
            .copied()
            .unwrap_or(0)
    }
}

/// RAII guard that releases a connection slot when dropped
#[derive(Debug)]
#[must_use]
pub struct ConnectionGuard {
    ip: IpAddr,
    connections: Arc<Mutex<HashMap<IpAddr, usize>>>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        let mut connections = self.connections.lock().expect("connection tracker lock");
        if let Some(count) = connections.get_mut(&self.ip) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                connections.remove(&self.ip);
            }
        }
    }
}
