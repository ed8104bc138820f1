use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use std::sync::Mutex;
use std::time::{Duration, Instant};

pub const MAX_CONNECTIONS_PER_IP: u32 = 5;
pub const MAX_ATTEMPTS_PER_WINDOW: usize = 10;
pub const RATE_WINDOW: Duration = Duration::from_secs(60);
pub const MAX_FAILURES_BEFORE_BAN: u32 = 5;

#[derive(Debug, Default)]
struct AdmissionState {
    /// Concurrent connections per IP.
    connections: HashMap<IpAddr, u32>,
    /// Connection attempts inside the sliding window.
    attempts: HashMap<IpAddr, Vec<Instant>>,
    /// Handshake failures; crossing the threshold auto-bans.
    failures: HashMap<IpAddr, u32>,
    banned: HashSet<IpAddr>,
}

/// Per-IP gate consulted at TCP accept time: ban list, sliding-window rate
/// limit, and a concurrent-connection cap.
///
/// Shared between the accept loop and session tasks; the mutex is held only
/// across map updates, never across I/O.
#[derive(Debug, Default)]
pub struct Admission {
    state: Mutex<AdmissionState>,
}

impl Admission {
    pub fn new() -> Self {
        Self::default()
    }

    /// Not banned, under the rate limit, and under the concurrency cap.
    /// Records the attempt against the rate window.
    pub fn can_connect(&self, ip: IpAddr) -> bool {
        !self.is_banned(ip) && self.check_rate_limit(ip) && self.under_connection_cap(ip)
    }

    pub fn is_banned(&self, ip: IpAddr) -> bool {
        self.state.lock().unwrap().banned.contains(&ip)
    }

    /// True if the IP is under its attempt budget for the window; a passing
    /// check records the attempt.
    pub fn check_rate_limit(&self, ip: IpAddr) -> bool {
        let now = Instant::now();
        let mut state = self.state.lock().unwrap();
        let times = state.attempts.entry(ip).or_default();
        times.retain(|&t| now.duration_since(t) <= RATE_WINDOW);
        if times.len() >= MAX_ATTEMPTS_PER_WINDOW {
            return false;
        }
        times.push(now);
        true
    }

    fn under_connection_cap(&self, ip: IpAddr) -> bool {
        let state = self.state.lock().unwrap();
        state.connections.get(&ip).copied().unwrap_or(0) < MAX_CONNECTIONS_PER_IP
    }

    pub fn add_connection(&self, ip: IpAddr) {
        let mut state = self.state.lock().unwrap();
        *state.connections.entry(ip).or_insert(0) += 1;
    }

    pub fn remove_connection(&self, ip: IpAddr) {
        let mut state = self.state.lock().unwrap();
        if let Some(count) = state.connections.get_mut(&ip) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                state.connections.remove(&ip);
            }
        }
    }

    /// Records a handshake failure; the threshold triggers an auto-ban.
    pub fn record_failure(&self, ip: IpAddr) {
        let mut state = self.state.lock().unwrap();
        let failures = state.failures.entry(ip).or_insert(0);
        *failures += 1;
        if *failures >= MAX_FAILURES_BEFORE_BAN {
            let failures = *failures;
            state.banned.insert(ip);
            log::warn!("Auto-banned IP {ip} after {failures} failures");
        }
    }

    pub fn ban(&self, ip: IpAddr) {
        self.state.lock().unwrap().banned.insert(ip);
    }

    pub fn unban(&self, ip: IpAddr) {
        let mut state = self.state.lock().unwrap();
        state.banned.remove(&ip);
        state.failures.remove(&ip);
        log::info!("Unbanned IP {ip}");
    }

    pub fn connection_count(&self, ip: IpAddr) -> u32 {
        self.state
            .lock()
            .unwrap()
            .connections
            .get(&ip)
            .copied()
            .unwrap_or(0)
    }

    pub fn ban_count(&self) -> usize {
        self.state.lock().unwrap().banned.len()
    }

    pub fn failure_count(&self, ip: IpAddr) -> u32 {
        self.state
            .lock()
            .unwrap()
            .failures
            .get(&ip)
            .copied()
            .unwrap_or(0)
    }
}
