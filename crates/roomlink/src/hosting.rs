//! Local mirror of the room this client hosts.

use roomlink_protocol::{RoomId, RoomSettingFlags, RoomStatus};

/// What the client knows about the room it hosts.
///
/// Created when the server accepts a room, updated by the client's own
/// status notices, and discarded on remove or disconnect. The server never
/// confirms notices, so this is the client's view only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostingRoomState {
    pub room_id: RoomId,
    pub group_index: u8,
    pub setting_flags: RoomSettingFlags,
    pub max_player_count: u8,
    pub current_player_count: u8,
}

impl HostingRoomState {
    /// A freshly created room: open, with the host as its only player.
    /// Rooms without a password are public.
    pub(crate) fn created(
        room_id: RoomId,
        group_index: u8,
        max_player_count: u8,
        has_password: bool,
    ) -> Self {
        let mut setting_flags = RoomSettingFlags::OPEN;
        setting_flags.set(RoomSettingFlags::PUBLIC, !has_password);
        Self {
            room_id,
            group_index,
            setting_flags,
            max_player_count,
            current_player_count: 1,
        }
    }

    /// Applies a status notice. Returns `false` when the room is gone.
    pub(crate) fn apply(
        &mut self,
        status: RoomStatus,
        current_player_count: Option<u8>,
    ) -> bool {
        if let Some(count) = current_player_count {
            self.current_player_count = count;
        }
        match status {
            RoomStatus::Open => {
                self.setting_flags.insert(RoomSettingFlags::OPEN);
                true
            }
            RoomStatus::Close => {
                self.setting_flags.remove(RoomSettingFlags::OPEN);
                true
            }
            RoomStatus::Remove => false,
        }
    }

    pub fn is_open(&self) -> bool {
        self.setting_flags.contains(RoomSettingFlags::OPEN)
    }

    pub fn is_public(&self) -> bool {
        self.setting_flags.contains(RoomSettingFlags::PUBLIC)
    }
}
