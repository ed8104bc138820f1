use std::sync::atomic::{AtomicU64, Ordering};

/// Byte and packet counters shared between the network workers and the tick
/// thread.
///
/// Everything here is a relaxed atomic: the counters are independent
/// scalars, no non-atomic data is guarded by them, and a dashboard mixing
/// values from adjacent seconds is acceptable.
#[derive(Debug, Default)]
pub struct BandwidthMonitor {
    total_bytes_out: AtomicU64,
    total_bytes_in: AtomicU64,
    bytes_this_second: AtomicU64,
    packets_this_second: AtomicU64,
    bytes_per_second_out: AtomicU64,
    packets_per_second: AtomicU64,
    /// Exponentially smoothed bytes/s, stored as f64 bits.
    avg_bytes_per_second: AtomicU64,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct BandwidthSnapshot {
    pub bytes_out_per_sec: u64,
    pub bytes_out_avg: u64,
    pub bytes_out_total: u64,
    pub bytes_in_total: u64,
    pub packets_out_per_sec: u64,
}

impl BandwidthMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called by session writers at the moment bytes leave the userspace
    /// buffer.
    pub fn record_outgoing(&self, bytes: usize) {
        self.total_bytes_out
            .fetch_add(bytes as u64, Ordering::Relaxed);
        self.bytes_this_second
            .fetch_add(bytes as u64, Ordering::Relaxed);
        self.packets_this_second.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_incoming(&self, bytes: usize) {
        self.total_bytes_in
            .fetch_add(bytes as u64, Ordering::Relaxed);
    }

    /// Called once per second from the tick thread to roll the per-second
    /// rates and the smoothed average.
    pub fn roll_second(&self) {
        let bytes = self.bytes_this_second.swap(0, Ordering::Relaxed);
        let packets = self.packets_this_second.swap(0, Ordering::Relaxed);
        self.bytes_per_second_out.store(bytes, Ordering::Relaxed);
        self.packets_per_second.store(packets, Ordering::Relaxed);

        let current_avg = f64::from_bits(self.avg_bytes_per_second.load(Ordering::Relaxed));
        let new_avg = if current_avg == 0.0 {
            bytes as f64
        } else {
            current_avg * 0.8 + bytes as f64 * 0.2
        };
        self.avg_bytes_per_second
            .store(new_avg.to_bits(), Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> BandwidthSnapshot {
        BandwidthSnapshot {
            bytes_out_per_sec: self.bytes_per_second_out.load(Ordering::Relaxed),
            bytes_out_avg: f64::from_bits(self.avg_bytes_per_second.load(Ordering::Relaxed))
                as u64,
            bytes_out_total: self.total_bytes_out.load(Ordering::Relaxed),
            bytes_in_total: self.total_bytes_in.load(Ordering::Relaxed),
            packets_out_per_sec: self.packets_per_second.load(Ordering::Relaxed),
        }
    }

    pub fn format_stats(&self) -> String {
        let snapshot = self.snapshot();
        format!(
            "out: {}/s (avg {}/s, {} pkt/s), total out {}, total in {}",
            format_bytes(snapshot.bytes_out_per_sec),
            format_bytes(snapshot.bytes_out_avg),
            snapshot.packets_out_per_sec,
            format_bytes(snapshot.bytes_out_total),
            format_bytes(snapshot.bytes_in_total),
        )
    }
}

pub(crate) fn format_bytes(bytes: u64) -> String {
    const KIB: f64 = 1024.0;
    const MIB: f64 = 1024.0 * 1024.0;
    const GIB: f64 = 1024.0 * 1024.0 * 1024.0;
    let bytes_f = bytes as f64;
    if bytes_f < KIB {
        format!("{bytes} B")
    } else if bytes_f < MIB {
        format!("{:.2} KB", bytes_f / KIB)
    } else if bytes_f < GIB {
        format!("{:.2} MB", bytes_f / MIB)
    } else {
        format!("{:.2} GB", bytes_f / GIB)
    }
}
