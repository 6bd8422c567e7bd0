//! Wire layout of the per-channel detector snapshots a real sensor (or the
//! demo generator) produces (§4.E payload layouts).
//!
//! These records are opaque `content` bytes as far as the framing layer is
//! concerned; this module is the thin, documented contract both sides agree
//! on for the two object kinds the core dispatch table actually acts on.

use byteorder::{LittleEndian, WriteBytesExt};

/// `uint32 seconds | uint16 milliseconds`, little-endian, 6 bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRecord {
    pub seconds: u32,
    pub millis: u16,
}

impl TimeRecord {
    pub const WIRE_SIZE: usize = 6;

    pub fn now() -> TimeRecord {
        let elapsed = std::time::SystemTime::now()
            .duration_since(std::time::SystemTime::UNIX_EPOCH)
            .expect("system clock is before the unix epoch");
        TimeRecord {
            seconds: elapsed.as_secs() as u32,
            millis: elapsed.subsec_millis() as u16,
        }
    }

    fn write(&self, out: &mut Vec<u8>) {
        out.write_u32::<LittleEndian>(self.seconds).unwrap();
        out.write_u16::<LittleEndian>(self.millis).unwrap();
    }
}

/// One channel's instantaneous measurement, packed to exactly 20 bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChannelSnapshot {
    pub channel_id: u8,
    pub vehicle_class_counts: [u8; 3],
    /// Time occupancy in 0.1% units.
    pub time_occupancy: u16,
    /// Speed in km/h.
    pub speed: u8,
    /// Length in 0.1 m units.
    pub length: u16,
    /// Headway in 0.1 s units.
    pub headway: u8,
    /// Gap in 0.1 s units.
    pub gap: u8,
    pub stop_count: u8,
    /// Stop duration in 0.1 s units.
    pub stop_duration: u16,
    pub occupancy_sample_count: u8,
    pub occupancy_pattern: u8,
}

impl ChannelSnapshot {
    pub const WIRE_SIZE: usize = 20;

    fn write(&self, out: &mut Vec<u8>) {
        out.push(self.channel_id);
        out.extend_from_slice(&self.vehicle_class_counts);
        out.write_u16::<LittleEndian>(self.time_occupancy).unwrap();
        out.push(self.speed);
        out.write_u16::<LittleEndian>(self.length).unwrap();
        out.push(self.headway);
        out.push(self.gap);
        out.push(self.stop_count);
        out.write_u16::<LittleEndian>(self.stop_duration).unwrap();
        out.push(self.occupancy_sample_count);
        out.push(self.occupancy_pattern);
        out.extend_from_slice(&[0u8; 4]);
    }
}

/// Encodes an `UPLOAD`/`TrafficRealtime` content: a time stamp followed by
/// one [`ChannelSnapshot`] per channel.
pub fn encode_realtime(timestamp: TimeRecord, channels: &[ChannelSnapshot]) -> Vec<u8> {
    let mut out = Vec::with_capacity(TimeRecord::WIRE_SIZE + channels.len() * ChannelSnapshot::WIRE_SIZE);
    timestamp.write(&mut out);
    for channel in channels {
        channel.write(&mut out);
    }
    out
}

/// Encodes an `UPLOAD`/`TrafficStats` content. Reuses the same 20-byte
/// per-channel layout as the realtime record: the spec describes the
/// statistics record as carrying "the analogous aggregate fields," and the
/// fields line up one-for-one (counts become period totals, speed becomes
/// average speed, and so on), so a separate struct would only duplicate this
/// one verbatim.
pub fn encode_stats(timestamp: TimeRecord, channels: &[ChannelSnapshot]) -> Vec<u8> {
    encode_realtime(timestamp, channels)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn realtime_content_size_matches_time_plus_channel_records() {
        let channels = vec![ChannelSnapshot::default(); 3];
        let content = encode_realtime(TimeRecord { seconds: 1, millis: 2 }, &channels);
        assert_eq!(content.len(), TimeRecord::WIRE_SIZE + 3 * ChannelSnapshot::WIRE_SIZE);
    }

    #[test]
    fn channel_snapshot_serializes_to_exactly_twenty_bytes() {
        let mut out = Vec::new();
        ChannelSnapshot::default().write(&mut out);
        assert_eq!(out.len(), ChannelSnapshot::WIRE_SIZE);
    }
}
