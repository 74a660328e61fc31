//! Domain types shared by the message catalog.
//!
//! Identity newtypes, the server error-code set, the small enums and flag
//! sets that appear inside message bodies, and the composite records
//! (room and room-group entries, endpoints) that replies carry.

use std::fmt;
use std::net::{IpAddr, Ipv6Addr, SocketAddr};

use serde::{Deserialize, Serialize};

use crate::{Buf, BufMut, CodecError, FixedBytes, FixedString, WireType};

/// Player names are stored in 24 bytes.
pub const PLAYER_NAME_LEN: usize = 24;
/// Room group names are stored in 24 bytes.
pub const ROOM_GROUP_NAME_LEN: usize = 24;
/// Room passwords are stored in 16 bytes.
pub const PASSWORD_LEN: usize = 16;
/// External (platform) identifiers are stored in 64 bytes.
pub const EXTERNAL_ID_LEN: usize = 64;

pub type PlayerName = FixedString<PLAYER_NAME_LEN>;
pub type RoomGroupName = FixedString<ROOM_GROUP_NAME_LEN>;
pub type Password = FixedString<PASSWORD_LEN>;
pub type ExternalId = FixedBytes<EXTERNAL_ID_LEN>;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

macro_rules! wire_newtype {
    ($(#[$meta:meta])* $name:ident($inner:ty), $prefix:literal) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, Default, PartialEq, Eq, Hash,
            Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub $inner);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }

        impl WireType for $name {
            const SIZE: usize = <$inner as WireType>::SIZE;

            fn write_to(
                &self,
                buf: &mut impl BufMut,
            ) -> Result<(), CodecError> {
                self.0.write_to(buf)
            }

            fn read_from(buf: &mut impl Buf) -> Result<Self, CodecError> {
                Ok(Self(<$inner>::read_from(buf)?))
            }
        }
    };
}

wire_newtype!(
    /// Server-issued token identifying an authenticated connection.
    ///
    /// Zero until authentication completes; echoed on every request
    /// and notice afterwards.
    SessionKey(u32),
    "S-"
);

wire_newtype!(
    /// Server-assigned identifier of a room.
    RoomId(u32),
    "R-"
);

wire_newtype!(
    /// Discriminator the server appends to a player name (`name#tag`).
    PlayerTag(u16),
    "#"
);

// ---------------------------------------------------------------------------
// ErrorCode
// ---------------------------------------------------------------------------

/// Result code carried in every reply header.
///
/// Unknown codes are preserved as [`ErrorCode::Other`] so that the raw
/// value can always be surfaced to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    Ok,
    ServerError,
    ApiVersionMismatch,
    RequestParameterWrong,
    RoomNotFound,
    RoomPasswordWrong,
    RoomFull,
    RoomPermissionDenied,
    RoomGroupFull,
    ClientAlreadyHostingRoom,
    Other(u8),
}

impl ErrorCode {
    /// Returns `true` for [`ErrorCode::Ok`].
    pub fn is_ok(self) -> bool {
        self == Self::Ok
    }

    /// The raw wire value.
    pub fn raw(self) -> u8 {
        u8::from(self)
    }
}

impl From<u8> for ErrorCode {
    fn from(value: u8) -> Self {
        match value {
            0 => Self::Ok,
            1 => Self::ServerError,
            2 => Self::ApiVersionMismatch,
            3 => Self::RequestParameterWrong,
            4 => Self::RoomNotFound,
            5 => Self::RoomPasswordWrong,
            6 => Self::RoomFull,
            7 => Self::RoomPermissionDenied,
            8 => Self::RoomGroupFull,
            9 => Self::ClientAlreadyHostingRoom,
            other => Self::Other(other),
        }
    }
}

impl From<ErrorCode> for u8 {
    fn from(code: ErrorCode) -> Self {
        match code {
            ErrorCode::Ok => 0,
            ErrorCode::ServerError => 1,
            ErrorCode::ApiVersionMismatch => 2,
            ErrorCode::RequestParameterWrong => 3,
            ErrorCode::RoomNotFound => 4,
            ErrorCode::RoomPasswordWrong => 5,
            ErrorCode::RoomFull => 6,
            ErrorCode::RoomPermissionDenied => 7,
            ErrorCode::RoomGroupFull => 8,
            ErrorCode::ClientAlreadyHostingRoom => 9,
            ErrorCode::Other(raw) => raw,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Other(raw) => write!(f, "Other({raw})"),
            named => write!(f, "{named:?}"),
        }
    }
}

impl WireType for ErrorCode {
    const SIZE: usize = 1;

    fn write_to(&self, buf: &mut impl BufMut) -> Result<(), CodecError> {
        u8::from(*self).write_to(buf)
    }

    fn read_from(buf: &mut impl Buf) -> Result<Self, CodecError> {
        Ok(Self::from(u8::read_from(buf)?))
    }
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

crate::wire_enum! {
    /// How joining players reach the host.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub enum SignalingMethod: u8 {
        /// Joiners connect to the host's public endpoint.
        #[default]
        Direct = 0,
        /// Joiners resolve the host through an opaque external id.
        ExternalId = 1,
    }
}

crate::wire_enum! {
    /// Room status as reported by, and to, the server.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub enum RoomStatus: u8 {
        #[default]
        Open = 0,
        Close = 1,
        Remove = 2,
    }
}

crate::wire_enum! {
    /// Ordering of room list results.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub enum SortKind: u8 {
        #[default]
        NameAscending = 0,
        NameDescending = 1,
        CreateDateAscending = 2,
        CreateDateDescending = 3,
    }
}

crate::wire_enum! {
    /// Transport protocol for connection tests and port mappings.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub enum TransportProtocol: u8 {
        #[default]
        Tcp = 0,
        Udp = 1,
    }
}

impl fmt::Display for TransportProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp => write!(f, "TCP"),
            Self::Udp => write!(f, "UDP"),
        }
    }
}

// ---------------------------------------------------------------------------
// Flag sets
// ---------------------------------------------------------------------------

macro_rules! wire_flags {
    (
        $(#[$meta:meta])*
        $name:ident { $( $(#[$fmeta:meta])* const $flag:ident = $bit:expr; )* }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
        pub struct $name(u8);

        impl $name {
            $( $(#[$fmeta])* pub const $flag: Self = Self($bit); )*

            /// No flags set.
            pub const fn empty() -> Self {
                Self(0)
            }

            /// Builds a set from raw bits.
            pub const fn from_bits(bits: u8) -> Self {
                Self(bits)
            }

            /// The raw bits.
            pub const fn bits(self) -> u8 {
                self.0
            }

            /// Returns `true` if every bit of `other` is set.
            pub const fn contains(self, other: Self) -> bool {
                self.0 & other.0 == other.0
            }

            /// Sets the bits of `other`.
            pub fn insert(&mut self, other: Self) {
                self.0 |= other.0;
            }

            /// Clears the bits of `other`.
            pub fn remove(&mut self, other: Self) {
                self.0 &= !other.0;
            }

            /// Sets or clears the bits of `other`.
            pub fn set(&mut self, other: Self, value: bool) {
                if value {
                    self.insert(other);
                } else {
                    self.remove(other);
                }
            }
        }

        impl std::ops::BitOr for $name {
            type Output = Self;

            fn bitor(self, rhs: Self) -> Self {
                Self(self.0 | rhs.0)
            }
        }

        impl WireType for $name {
            const SIZE: usize = 1;

            fn write_to(
                &self,
                buf: &mut impl BufMut,
            ) -> Result<(), CodecError> {
                self.0.write_to(buf)
            }

            fn read_from(buf: &mut impl Buf) -> Result<Self, CodecError> {
                Ok(Self(u8::read_from(buf)?))
            }
        }
    };
}

wire_flags! {
    /// Visibility and availability of a room.
    RoomSettingFlags {
        /// No password required.
        const PUBLIC = 0x01;
        /// Accepting new players.
        const OPEN = 0x02;
    }
}

wire_flags! {
    /// Which fields a room search matches against, and which rooms qualify.
    SearchTargetFlags {
        const PLAYER_NAME = 0x01;
        const PLAYER_TAG = 0x02;
        const NOT_FULL = 0x04;
        const OPEN = 0x08;
        const PUBLIC = 0x10;
    }
}

// ---------------------------------------------------------------------------
// Composite records
// ---------------------------------------------------------------------------

crate::wire_struct! {
    /// One entry of the room group list.
    #[derive(Debug, Clone, Default, PartialEq, Eq)]
    pub struct RoomGroupInfo {
        pub name: RoomGroupName,
    }
}

crate::wire_struct! {
    /// A room as listed by the server.
    #[derive(Debug, Clone, Default, PartialEq, Eq)]
    pub struct RoomInfo {
        pub room_id: RoomId,
        pub host_name: PlayerName,
        pub host_tag: PlayerTag,
        pub setting_flags: RoomSettingFlags,
        pub max_player_count: u8,
        pub current_player_count: u8,
        pub status: RoomStatus,
    }
}

crate::wire_struct! {
    /// An IP endpoint. IPv4 addresses are stored IPv4-mapped.
    #[derive(Debug, Clone, Default, PartialEq, Eq)]
    pub struct WireEndpoint {
        pub address: FixedBytes<16>,
        pub port: u16,
    }
}

impl From<SocketAddr> for WireEndpoint {
    fn from(addr: SocketAddr) -> Self {
        let v6 = match addr.ip() {
            IpAddr::V4(v4) => v4.to_ipv6_mapped(),
            IpAddr::V6(v6) => v6,
        };
        Self {
            address: FixedBytes(v6.octets()),
            port: addr.port(),
        }
    }
}

impl From<&WireEndpoint> for SocketAddr {
    fn from(endpoint: &WireEndpoint) -> Self {
        let v6 = Ipv6Addr::from(endpoint.address.0);
        let ip = match v6.to_ipv4_mapped() {
            Some(v4) => IpAddr::V4(v4),
            None => IpAddr::V6(v6),
        };
        SocketAddr::new(ip, endpoint.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{decode, encode};

    #[test]
    fn test_room_id_serializes_as_plain_number() {
        let json = serde_json::to_string(&RoomId(42)).unwrap();
        assert_eq!(json, "42");
    }

    #[test]
    fn test_id_display() {
        assert_eq!(RoomId(7).to_string(), "R-7");
        assert_eq!(PlayerTag(12).to_string(), "#12");
        assert_eq!(SessionKey(3).to_string(), "S-3");
    }

    #[test]
    fn test_error_code_raw_values_round_trip() {
        for raw in 0u8..=255 {
            assert_eq!(ErrorCode::from(raw).raw(), raw);
        }
        assert_eq!(ErrorCode::from(6), ErrorCode::RoomFull);
        assert_eq!(ErrorCode::from(200), ErrorCode::Other(200));
        assert!(ErrorCode::Ok.is_ok());
        assert!(!ErrorCode::RoomFull.is_ok());
    }

    #[test]
    fn test_error_code_display() {
        assert_eq!(ErrorCode::RoomNotFound.to_string(), "RoomNotFound");
        assert_eq!(ErrorCode::Other(77).to_string(), "Other(77)");
    }

    #[test]
    fn test_flags_insert_remove_contains() {
        let mut flags = RoomSettingFlags::PUBLIC | RoomSettingFlags::OPEN;
        assert!(flags.contains(RoomSettingFlags::OPEN));
        flags.remove(RoomSettingFlags::OPEN);
        assert!(!flags.contains(RoomSettingFlags::OPEN));
        assert!(flags.contains(RoomSettingFlags::PUBLIC));
        flags.set(RoomSettingFlags::OPEN, true);
        assert_eq!(flags.bits(), 0x03);
    }

    #[test]
    fn test_room_info_size_and_round_trip() {
        assert_eq!(RoomInfo::SIZE, 4 + 24 + 2 + 1 + 1 + 1 + 1);
        let info = RoomInfo {
            room_id: RoomId(99),
            host_name: PlayerName::from("host"),
            host_tag: PlayerTag(1234),
            setting_flags: RoomSettingFlags::OPEN,
            max_player_count: 8,
            current_player_count: 3,
            status: RoomStatus::Close,
        };
        let back: RoomInfo = decode(&encode(&info).unwrap()).unwrap();
        assert_eq!(back, info);
    }

    #[test]
    fn test_endpoint_ipv4_is_mapped() {
        let addr: SocketAddr = "192.168.1.20:53000".parse().unwrap();
        let endpoint = WireEndpoint::from(addr);
        assert_eq!(&endpoint.address.0[10..12], &[0xFF, 0xFF]);
        assert_eq!(SocketAddr::from(&endpoint), addr);
    }

    #[test]
    fn test_endpoint_ipv6_round_trip() {
        let addr: SocketAddr = "[2001:db8::1]:54000".parse().unwrap();
        let back: WireEndpoint =
            decode(&encode(&WireEndpoint::from(addr)).unwrap()).unwrap();
        assert_eq!(SocketAddr::from(&back), addr);
    }

    #[test]
    fn test_signaling_method_rejects_unknown() {
        assert!(matches!(
            decode::<SignalingMethod>(&[5]),
            Err(CodecError::InvalidEnumValue { .. })
        ));
    }
}
