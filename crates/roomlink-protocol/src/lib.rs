//! Wire protocol for Roomlink.
//!
//! This crate defines the bytes that the client and the match-making
//! server exchange:
//!
//! - **Codec** ([`WireType`], [`encode`], [`decode`]): a fixed-layout
//!   binary format where every type has a size known at compile time.
//! - **Types** ([`RoomId`], [`ErrorCode`], [`RoomInfo`], ...): the
//!   identifiers, enums and records that appear inside messages.
//! - **Messages** ([`Outbound`], [`Request`], [`Reply`], [`Notice`]): the
//!   closed catalog of request/reply/notice bodies and their headers.
//! - **Errors** ([`CodecError`]): what can go wrong while encoding or
//!   decoding.
//!
//! # Architecture
//!
//! ```text
//! Codec (bytes ↔ values) → Messages (typed bodies) → Transport (framing)
//! ```
//!
//! Nothing here performs I/O.

mod codec;
mod error;
mod messages;
mod types;

pub use bytes::{Buf, BufMut, BytesMut};
pub use codec::{
    decode, encode, encode_into, encoded_size, ensure_remaining, FieldSpec,
    FixedBytes, FixedString, FixedVec, WireType,
};
pub use error::CodecError;
pub use messages::{
    AuthenticationReply, AuthenticationRequest, ConnectionTestReply,
    ConnectionTestRequest, CreateRoomReply, CreateRoomRequest,
    JoinRoomReply, JoinRoomRequest, KeepAliveNotice, ListRoomGroupReply,
    ListRoomGroupRequest, ListRoomReply, ListRoomRequest, Message,
    MessageType, Notice, Outbound, Reply, ReplyHeader, Request,
    RequestHeader, UpdateRoomStatusNotice, ROOM_GROUP_CAPACITY,
    ROOM_LIST_PAGE_CAPACITY, SEARCH_NAME_LEN,
};
pub use types::{
    ErrorCode, ExternalId, Password, PlayerName, PlayerTag, RoomGroupInfo,
    RoomGroupName, RoomId, RoomInfo, RoomSettingFlags, RoomStatus,
    SearchTargetFlags, SessionKey, SignalingMethod, SortKind,
    TransportProtocol, WireEndpoint, EXTERNAL_ID_LEN, PASSWORD_LEN,
    PLAYER_NAME_LEN, ROOM_GROUP_NAME_LEN,
};
