//! Device identifiers: a 7-byte (admin code, device type, serial) tuple.

use bitflags::bitflags;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};

/// 24-bit administrative-region code. Always masked to `0xFFFFFF`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AdminCode(u32);

impl AdminCode {
    pub const MASK: u32 = 0x00ff_ffff;

    #[inline]
    pub fn new(value: u32) -> Self {
        AdminCode(value & Self::MASK)
    }

    #[inline]
    pub fn value(self) -> u32 {
        self.0
    }
}

impl From<u32> for AdminCode {
    #[inline]
    fn from(value: u32) -> Self {
        AdminCode::new(value)
    }
}

bitflags! {
    /// Device-type bitmask (§3). Exactly one bit is set in normal use, but the
    /// field is a mask on the wire, not an enum, so multiple bits must round-trip.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
    pub struct DeviceType: u16 {
        const SIGNAL_CONTROLLER = 0x01;
        const COIL              = 0x02;
        const MAGNETIC          = 0x04;
        const ULTRASONIC        = 0x08;
        const VIDEO             = 0x10;
        const MICROWAVE         = 0x20;
        const RADAR             = 0x40;
        const RFID              = 0x80;
    }
}

/// A 7-byte device identifier: 3-byte LE admin code, 2-byte LE device-type
/// bitmask, 2-byte LE serial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct DeviceId {
    pub admin_code: AdminCode,
    pub device_type: DeviceType,
    pub serial: u16,
}

impl Default for AdminCode {
    #[inline]
    fn default() -> Self {
        AdminCode(0)
    }
}

impl DeviceId {
    pub const WIRE_SIZE: usize = 7;

    #[inline]
    pub fn new(admin_code: impl Into<AdminCode>, device_type: DeviceType, serial: u16) -> Self {
        DeviceId {
            admin_code: admin_code.into(),
            device_type,
            serial,
        }
    }

    /// All-zero identifier: the sentinel value used before a slot learns its
    /// peer's identity (§3, Client Session invariant).
    #[inline]
    pub fn zero() -> Self {
        DeviceId::default()
    }

    #[inline]
    pub fn is_zero(&self) -> bool {
        self.admin_code.value() == 0 && self.device_type.bits() == 0 && self.serial == 0
    }

    pub(crate) fn write<W: Write>(&self, mut w: W) -> io::Result<()> {
        let admin = self.admin_code.value().to_le_bytes();
        w.write_all(&admin[..3])?;
        w.write_u16::<LittleEndian>(self.device_type.bits())?;
        w.write_u16::<LittleEndian>(self.serial)?;
        Ok(())
    }

    pub(crate) fn read<R: Read>(mut r: R) -> io::Result<DeviceId> {
        let mut admin_bytes = [0u8; 4];
        r.read_exact(&mut admin_bytes[..3])?;
        let admin_code = AdminCode::new(u32::from_le_bytes(admin_bytes));
        let type_bits = r.read_u16::<LittleEndian>()?;
        let device_type = DeviceType::from_bits_truncate(type_bits);
        let serial = r.read_u16::<LittleEndian>()?;

        Ok(DeviceId {
            admin_code,
            device_type,
            serial,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_code_masks_to_24_bits() {
        assert_eq!(AdminCode::new(0xff12_3456).value(), 0x12_3456);
    }

    #[test]
    fn device_id_round_trips_through_wire_bytes() {
        let id = DeviceId::new(0x123456u32, DeviceType::RADAR, 0x0007);

        let mut buf = Vec::new();
        id.write(&mut buf).unwrap();
        assert_eq!(buf.len(), DeviceId::WIRE_SIZE);

        let decoded = DeviceId::read(&buf[..]).unwrap();
        assert_eq!(decoded, id);
    }

    #[test]
    fn device_type_is_a_mask_not_an_enum() {
        let both = DeviceType::COIL | DeviceType::MAGNETIC;
        assert!(both.contains(DeviceType::COIL));
        assert!(both.contains(DeviceType::MAGNETIC));
        assert!(!both.contains(DeviceType::RADAR));
    }

    #[test]
    fn zero_identifier_is_the_unlearned_sentinel() {
        assert!(DeviceId::zero().is_zero());
        assert!(!DeviceId::new(1u32, DeviceType::COIL, 0).is_zero());
    }
}
