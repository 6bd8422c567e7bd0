//! Operation codes and object identifiers carried in a data table (§6).

use crate::error::DecodeError;
use std::convert::TryFrom;

/// The single-byte operation code distinguishing requests, responses and
/// notifications on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Operation {
    QueryRequest = 0x80,
    SetRequest = 0x81,
    Upload = 0x82,
    QueryResponse = 0x83,
    SetResponse = 0x84,
    UploadResponse = 0x85,
    ErrorResponse = 0x86,
}

impl Operation {
    #[inline]
    pub fn code(self) -> u8 {
        self as u8
    }

    /// True for operations the other side is expected to act on, as opposed
    /// to a reply or notification.
    #[inline]
    pub fn is_request(self) -> bool {
        matches!(
            self,
            Operation::QueryRequest | Operation::SetRequest | Operation::Upload
        )
    }
}

impl TryFrom<u8> for Operation {
    type Error = DecodeError;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        match byte {
            0x80 => Ok(Operation::QueryRequest),
            0x81 => Ok(Operation::SetRequest),
            0x82 => Ok(Operation::Upload),
            0x83 => Ok(Operation::QueryResponse),
            0x84 => Ok(Operation::SetResponse),
            0x85 => Ok(Operation::UploadResponse),
            0x86 => Ok(Operation::ErrorResponse),
            _ => Err(DecodeError::Operation),
        }
    }
}

/// Two-byte object identifier naming what a data table's content describes.
/// The `0x0400..=0x07ff` band decodes to [`ObjectId::Reserved`] rather than an
/// error: an unknown object in that range is ignored, not rejected (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectId {
    Communication,
    DeviceTime,
    DetectorConfig,
    DetectorStatus,
    TrafficRealtime,
    TrafficStats,
    Reserved(u16),
}

impl ObjectId {
    pub const COMMUNICATION: u16 = 0x0101;
    pub const DEVICE_TIME: u16 = 0x0201;
    pub const DETECTOR_CONFIG: u16 = 0x0204;
    pub const DETECTOR_STATUS: u16 = 0x0205;
    pub const TRAFFIC_REALTIME: u16 = 0x0301;
    pub const TRAFFIC_STATS: u16 = 0x0302;

    const RESERVED_RANGE: std::ops::RangeInclusive<u16> = 0x0400..=0x07ff;

    #[inline]
    pub fn code(self) -> u16 {
        match self {
            ObjectId::Communication => Self::COMMUNICATION,
            ObjectId::DeviceTime => Self::DEVICE_TIME,
            ObjectId::DetectorConfig => Self::DETECTOR_CONFIG,
            ObjectId::DetectorStatus => Self::DETECTOR_STATUS,
            ObjectId::TrafficRealtime => Self::TRAFFIC_REALTIME,
            ObjectId::TrafficStats => Self::TRAFFIC_STATS,
            ObjectId::Reserved(code) => code,
        }
    }

    #[inline]
    pub fn from_code(code: u16) -> Result<ObjectId, DecodeError> {
        match code {
            Self::COMMUNICATION => Ok(ObjectId::Communication),
            Self::DEVICE_TIME => Ok(ObjectId::DeviceTime),
            Self::DETECTOR_CONFIG => Ok(ObjectId::DetectorConfig),
            Self::DETECTOR_STATUS => Ok(ObjectId::DetectorStatus),
            Self::TRAFFIC_REALTIME => Ok(ObjectId::TrafficRealtime),
            Self::TRAFFIC_STATS => Ok(ObjectId::TrafficStats),
            code if Self::RESERVED_RANGE.contains(&code) => Ok(ObjectId::Reserved(code)),
            _ => Err(DecodeError::Object),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operation_round_trips_through_its_code() {
        for op in [
            Operation::QueryRequest,
            Operation::SetRequest,
            Operation::Upload,
            Operation::QueryResponse,
            Operation::SetResponse,
            Operation::UploadResponse,
            Operation::ErrorResponse,
        ] {
            assert_eq!(Operation::try_from(op.code()).unwrap(), op);
        }
    }

    #[test]
    fn unrecognized_operation_byte_is_rejected() {
        assert_eq!(Operation::try_from(0xff), Err(DecodeError::Operation));
    }

    #[test]
    fn request_operations_are_flagged_as_such() {
        assert!(Operation::QueryRequest.is_request());
        assert!(Operation::Upload.is_request());
        assert!(!Operation::QueryResponse.is_request());
        assert!(!Operation::ErrorResponse.is_request());
    }

    #[test]
    fn reserved_band_decodes_instead_of_erroring() {
        assert_eq!(ObjectId::from_code(0x0400), Ok(ObjectId::Reserved(0x0400)));
        assert_eq!(ObjectId::from_code(0x07ff), Ok(ObjectId::Reserved(0x07ff)));
    }

    #[test]
    fn object_outside_known_and_reserved_ranges_is_an_error() {
        assert_eq!(ObjectId::from_code(0x0800), Err(DecodeError::Object));
    }

    #[test]
    fn known_object_codes_match_the_wire_values() {
        assert_eq!(ObjectId::Communication.code(), 0x0101);
        assert_eq!(ObjectId::DetectorStatus.code(), 0x0205);
        assert_eq!(ObjectId::TrafficStats.code(), 0x0302);
    }
}
