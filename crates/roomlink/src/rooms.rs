//! Request parameters and results of room operations.

use std::net::SocketAddr;

use roomlink_protocol::{
    ListRoomReply, PlayerTag, RoomId, RoomInfo, SearchTargetFlags, SortKind,
};

/// Parameters of a room list query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoomListQuery {
    pub group_index: u8,
    /// First matching room to return.
    pub start_index: u16,
    /// How many rooms to return, at least 1.
    pub count: u16,
    pub sort_kind: SortKind,
    pub search_target_flags: SearchTargetFlags,
    /// Match `search_name` against the whole name instead of a prefix.
    pub search_full_name: bool,
    pub search_name: String,
    pub search_tag: PlayerTag,
}

impl RoomListQuery {
    pub fn new(group_index: u8, start_index: u16, count: u16) -> Self {
        Self {
            group_index,
            start_index,
            count,
            ..Default::default()
        }
    }
}

/// A reassembled room list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoomList {
    /// Rooms in the group.
    pub total_room_count: u16,
    /// Rooms matching the search.
    pub matched_room_count: u16,
    /// The requested window, in server order.
    pub rooms: Vec<RoomInfo>,
}

/// Collects the pages of one list reply into the server-declared window.
///
/// Each page is written at its `page_start_index`; a later page covering
/// the same slots overwrites an earlier one.
pub(crate) struct RoomListAssembler {
    total_room_count: u16,
    matched_room_count: u16,
    slots: Vec<Option<RoomInfo>>,
}

impl RoomListAssembler {
    pub(crate) fn new(first: &ListRoomReply) -> Self {
        Self {
            total_room_count: first.total_room_count,
            matched_room_count: first.matched_room_count,
            slots: vec![None; usize::from(first.reply_room_count)],
        }
    }

    /// Number of pages the server will send for this reply.
    pub(crate) fn page_count(&self, capacity: usize) -> usize {
        self.slots.len().div_ceil(capacity)
    }

    pub(crate) fn absorb(&mut self, page: ListRoomReply) {
        let start = usize::from(page.page_start_index);
        if start >= self.slots.len() && !self.slots.is_empty() {
            tracing::warn!(
                page_start = start,
                reply_room_count = self.slots.len(),
                "room list page outside the declared window; dropped"
            );
            return;
        }
        for (offset, room) in page.entries.into_vec().into_iter().enumerate() {
            // Slots past the declared count are page padding.
            if let Some(slot) = self.slots.get_mut(start + offset) {
                *slot = Some(room);
            }
        }
    }

    pub(crate) fn finish(self) -> RoomList {
        let declared = self.slots.len();
        let rooms: Vec<RoomInfo> = self.slots.into_iter().flatten().collect();
        if rooms.len() != declared {
            tracing::warn!(
                declared,
                received = rooms.len(),
                "room list has unfilled slots"
            );
        }
        RoomList {
            total_room_count: self.total_room_count,
            matched_room_count: self.matched_room_count,
            rooms,
        }
    }
}

/// How to reach the host of a joined room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomSignaling {
    /// Connect directly to this address.
    Endpoint(SocketAddr),
    /// Opaque identifier for an external signaling service, with trailing
    /// zero padding removed.
    ExternalId(Vec<u8>),
}

/// Result of a successful join.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinedRoom {
    pub room_id: RoomId,
    pub signaling: RoomSignaling,
}

/// Result of hosting a room with NAT traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostedRoom {
    pub room_id: RoomId,
    /// Local port the game must listen on.
    pub private_port: u16,
    /// Port announced to the server and reachable from outside.
    pub public_port: u16,
}
