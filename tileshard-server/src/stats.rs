use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use serde::Serialize;
use tileshard_net::BandwidthSnapshot;

const TICK_WINDOW: usize = 100;

/// Per-phase timings for one tick, in milliseconds.
#[derive(Clone, Copy, Debug, Default)]
pub struct PhaseTimings {
    pub action_ms: f64,
    pub spatial_ms: f64,
    pub visibility_ms: f64,
    pub departure_ms: f64,
    pub broadcast_ms: f64,
}

#[derive(Debug, Default)]
struct TickWindowState {
    history: VecDeque<f64>,
    total_ms: f64,
    max_ms: f64,
    last_ms: f64,
}

/// Counters written by the tick thread and session tasks, read by the
/// dashboard and the console.
///
/// Scalar fields are relaxed atomics; a snapshot may mix values from
/// adjacent ticks, which is fine for a dashboard. The tick histogram sits
/// under a mutex touched only by `record_tick` and `snapshot`.
#[derive(Debug, Default)]
pub struct StatsSink {
    tick: Mutex<TickWindowState>,
    tick_overruns: AtomicU64,
    dirty_players: AtomicU64,
    real_clients: AtomicU64,
    fake_clients: AtomicU64,
    total_players: AtomicU64,
    visibility_tracked: AtomicU64,
    // f64 bits.
    action_ms: AtomicU64,
    spatial_ms: AtomicU64,
    visibility_ms: AtomicU64,
    departure_ms: AtomicU64,
    broadcast_ms: AtomicU64,
}

/// One JSON-serialisable view of the sink for `GET /stats`.
#[derive(Clone, Copy, Debug, Serialize)]
pub struct StatsSnapshot {
    pub tick_avg_ms: f64,
    pub tick_max_ms: f64,
    pub tick_last_ms: f64,
    pub tps: f64,
    pub tick_overruns: u64,
    pub dirty_players: u64,
    pub action_ms: f64,
    pub spatial_ms: f64,
    pub visibility_ms: f64,
    pub departure_ms: f64,
    pub broadcast_ms: f64,
    pub real_clients: u64,
    pub fake_clients: u64,
    pub total_players: u64,
    pub visibility_tracked: u64,
    pub bytes_out_per_sec: u64,
    pub bytes_out_avg: u64,
    pub bytes_out_total: u64,
    pub bytes_in_total: u64,
    pub packets_out_per_sec: u64,
}

impl StatsSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rolling window over the last [`TICK_WINDOW`] ticks.
    pub fn record_tick(&self, tick_ms: f64) {
        let mut tick = self.tick.lock().unwrap();
        tick.last_ms = tick_ms;
        tick.total_ms += tick_ms;
        if tick_ms > tick.max_ms {
            tick.max_ms = tick_ms;
        }
        tick.history.push_back(tick_ms);
        if tick.history.len() > TICK_WINDOW {
            let expired = tick.history.pop_front().unwrap();
            tick.total_ms -= expired;
        }
    }

    pub fn record_overrun(&self) {
        self.tick_overruns.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_phase_timings(&self, timings: PhaseTimings) {
        self.action_ms
            .store(timings.action_ms.to_bits(), Ordering::Relaxed);
        self.spatial_ms
            .store(timings.spatial_ms.to_bits(), Ordering::Relaxed);
        self.visibility_ms
            .store(timings.visibility_ms.to_bits(), Ordering::Relaxed);
        self.departure_ms
            .store(timings.departure_ms.to_bits(), Ordering::Relaxed);
        self.broadcast_ms
            .store(timings.broadcast_ms.to_bits(), Ordering::Relaxed);
    }

    pub fn set_dirty_players(&self, count: usize) {
        self.dirty_players.store(count as u64, Ordering::Relaxed);
    }

    pub fn set_connection_counts(&self, real: usize, fake: usize, players: usize) {
        self.real_clients.store(real as u64, Ordering::Relaxed);
        self.fake_clients.store(fake as u64, Ordering::Relaxed);
        self.total_players.store(players as u64, Ordering::Relaxed);
    }

    pub fn set_visibility_tracked(&self, count: usize) {
        self.visibility_tracked.store(count as u64, Ordering::Relaxed);
    }

    /// Resets the rolling max. Called periodically so spikes age out.
    pub fn reset_max(&self) {
        self.tick.lock().unwrap().max_ms = 0.0;
    }

    pub fn snapshot(&self, bandwidth: BandwidthSnapshot) -> StatsSnapshot {
        let (avg_ms, max_ms, last_ms) = {
            let tick = self.tick.lock().unwrap();
            let avg = if tick.history.is_empty() {
                0.0
            } else {
                tick.total_ms / tick.history.len() as f64
            };
            (avg, tick.max_ms, tick.last_ms)
        };
        let tps = if avg_ms > 0.0 { 1000.0 / avg_ms.max(50.0) } else { 20.0 };

        StatsSnapshot {
            tick_avg_ms: avg_ms,
            tick_max_ms: max_ms,
            tick_last_ms: last_ms,
            tps,
            tick_overruns: self.tick_overruns.load(Ordering::Relaxed),
            dirty_players: self.dirty_players.load(Ordering::Relaxed),
            action_ms: f64::from_bits(self.action_ms.load(Ordering::Relaxed)),
            spatial_ms: f64::from_bits(self.spatial_ms.load(Ordering::Relaxed)),
            visibility_ms: f64::from_bits(self.visibility_ms.load(Ordering::Relaxed)),
            departure_ms: f64::from_bits(self.departure_ms.load(Ordering::Relaxed)),
            broadcast_ms: f64::from_bits(self.broadcast_ms.load(Ordering::Relaxed)),
            real_clients: self.real_clients.load(Ordering::Relaxed),
            fake_clients: self.fake_clients.load(Ordering::Relaxed),
            total_players: self.total_players.load(Ordering::Relaxed),
            visibility_tracked: self.visibility_tracked.load(Ordering::Relaxed),
            bytes_out_per_sec: bandwidth.bytes_out_per_sec,
            bytes_out_avg: bandwidth.bytes_out_avg,
            bytes_out_total: bandwidth.bytes_out_total,
            bytes_in_total: bandwidth.bytes_in_total,
            packets_out_per_sec: bandwidth.packets_out_per_sec,
        }
    }

    pub fn snapshot_json(&self, bandwidth: BandwidthSnapshot) -> String {
        // StatsSnapshot is all numbers; serialisation cannot fail.
        serde_json::to_string(&self.snapshot(bandwidth)).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rolling_window_caps_at_100_samples() {
        let sink = StatsSink::new();
        for _ in 0..150 {
            sink.record_tick(10.0);
        }
        sink.record_tick(60.0);

        let snapshot = sink.snapshot(BandwidthSnapshot::default());
        // 99 tens and one sixty.
        assert!((snapshot.tick_avg_ms - 10.5).abs() < 1e-9);
        assert_eq!(snapshot.tick_last_ms, 60.0);
        assert_eq!(snapshot.tick_max_ms, 60.0);
    }

    #[test]
    fn tps_is_capped_at_the_tick_rate() {
        let sink = StatsSink::new();
        sink.record_tick(1.0);
        let snapshot = sink.snapshot(BandwidthSnapshot::default());
        // A 1 ms tick still runs on the 50 ms cadence.
        assert!((snapshot.tps - 20.0).abs() < 1e-9);
    }

    #[test]
    fn snapshot_serialises_to_json() {
        let sink = StatsSink::new();
        sink.record_tick(5.0);
        sink.set_dirty_players(3);
        let json = sink.snapshot_json(BandwidthSnapshot::default());
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["dirty_players"], 3);
        assert_eq!(value["tick_last_ms"], 5.0);
    }
}
