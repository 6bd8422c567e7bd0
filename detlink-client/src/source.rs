//! The detector's measurement source: a thin seam so a production build can
//! plug in a real sensor reading without touching protocol or session code
//! (§4.E).

use crate::payload::ChannelSnapshot;

/// Produces the next per-channel snapshot on demand. Implementations decide
/// how many channels exist and what each one reports.
pub trait MeasurementSource {
    fn next_snapshot(&mut self) -> Vec<ChannelSnapshot>;
}

/// Synthetic generator used by the shipped binary in place of a real sensor.
/// Not representative of any physical detector; exists so the client state
/// machine has something to upload.
pub struct DemoSource {
    channel_count: u8,
    tick: u32,
}

impl DemoSource {
    pub fn new(channel_count: u8) -> DemoSource {
        DemoSource { channel_count, tick: 0 }
    }

    fn synthesize(&self, channel_id: u8) -> ChannelSnapshot {
        let phase = self.tick.wrapping_add(channel_id as u32);
        ChannelSnapshot {
            channel_id,
            vehicle_class_counts: [
                (phase % 7) as u8,
                (phase % 5) as u8,
                (phase % 3) as u8,
            ],
            time_occupancy: (phase % 1000) as u16,
            speed: 30 + (phase % 40) as u8,
            length: 30 + (phase % 50) as u16,
            headway: 10 + (phase % 20) as u8,
            gap: 5 + (phase % 15) as u8,
            stop_count: (phase % 4) as u8,
            stop_duration: (phase % 600) as u16,
            occupancy_sample_count: (phase % 100) as u8,
            occupancy_pattern: (phase % 256) as u8,
        }
    }
}

impl MeasurementSource for DemoSource {
    fn next_snapshot(&mut self) -> Vec<ChannelSnapshot> {
        self.tick = self.tick.wrapping_add(1);
        (0..self.channel_count).map(|id| self.synthesize(id)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demo_source_produces_one_snapshot_per_channel() {
        let mut source = DemoSource::new(4);
        let snapshots = source.next_snapshot();
        assert_eq!(snapshots.len(), 4);
        let ids: Vec<u8> = snapshots.iter().map(|s| s.channel_id).collect();
        assert_eq!(ids, vec![0, 1, 2, 3]);
    }

    #[test]
    fn demo_source_advances_between_calls() {
        let mut source = DemoSource::new(1);
        let first = source.next_snapshot();
        let second = source.next_snapshot();
        assert_ne!(first, second);
    }
}
