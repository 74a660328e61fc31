//! # Roomlink
//!
//! Client for a match-making server: authenticate, browse and join rooms,
//! or host one and make it reachable through the home router.
//!
//! A [`ProtocolClient`] owns one TCP session. It keeps the session alive in
//! the background, serializes concurrent calls so each request gets its own
//! reply, and mirrors the state of the room it hosts.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use roomlink::prelude::*;
//!
//! # async fn run() -> Result<(), ClientError> {
//! let client = ProtocolClient::new(ClientConfig::default())?;
//! client.connect("match.example.com", 4000, "alice").await?;
//!
//! let list = client.get_room_list(&RoomListQuery::new(0, 0, 20)).await?;
//! if let Some(room) = list.rooms.first() {
//!     let joined = client.join_room(0, room.room_id, "").await?;
//!     println!("{:?}", joined.signaling);
//! }
//! # Ok(())
//! # }
//! ```

mod client;
mod config;
mod error;
mod hosting;
mod keepalive;
mod rooms;
mod session;
mod validate;

pub use client::ProtocolClient;
pub use config::{ClientConfig, ConfigError, DYNAMIC_PORTS};
pub use error::{ClientError, ErrorKind};
pub use hosting::HostingRoomState;
pub use rooms::{HostedRoom, JoinedRoom, RoomList, RoomListQuery, RoomSignaling};

pub use roomlink_nat as nat;
pub use roomlink_protocol as protocol;

pub mod prelude {
    pub use crate::{
        ClientConfig, ClientError, ErrorKind, HostedRoom, HostingRoomState,
        JoinedRoom, ProtocolClient, RoomList, RoomListQuery, RoomSignaling,
    };
    pub use roomlink_protocol::{
        ErrorCode, PlayerTag, RoomGroupInfo, RoomId, RoomInfo,
        RoomSettingFlags, RoomStatus, SortKind, TransportProtocol,
    };
}
