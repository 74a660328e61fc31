//! Input checks run before any I/O.

use roomlink_protocol::{
    FixedString, Password, PlayerName, PLAYER_NAME_LEN, SEARCH_NAME_LEN,
};

use crate::config::DYNAMIC_PORTS;
use crate::ClientError;

pub(crate) fn player_name(name: &str) -> Result<PlayerName, ClientError> {
    if name.is_empty() {
        return Err(ClientError::invalid("player name must not be empty"));
    }
    if name.len() > PLAYER_NAME_LEN {
        return Err(ClientError::invalid(format!(
            "player name is {} bytes, at most {PLAYER_NAME_LEN} allowed",
            name.len()
        )));
    }
    Ok(PlayerName::try_new(name)?)
}

pub(crate) fn server_port(port: u16) -> Result<(), ClientError> {
    if port == 0 {
        return Err(ClientError::invalid("server port must not be 0"));
    }
    Ok(())
}

pub(crate) fn room_port(port: u16) -> Result<(), ClientError> {
    if !DYNAMIC_PORTS.contains(&port) {
        return Err(ClientError::invalid(format!(
            "port {port} is outside {}..={}",
            DYNAMIC_PORTS.start(),
            DYNAMIC_PORTS.end()
        )));
    }
    Ok(())
}

pub(crate) fn password(password: &str) -> Result<Password, ClientError> {
    Ok(Password::try_new(password)?)
}

pub(crate) fn max_player_count(count: u8) -> Result<(), ClientError> {
    if count < 2 {
        return Err(ClientError::invalid(format!(
            "max player count must be at least 2, got {count}"
        )));
    }
    Ok(())
}

pub(crate) fn search_name(
    name: &str,
) -> Result<FixedString<SEARCH_NAME_LEN>, ClientError> {
    Ok(FixedString::try_new(name)?)
}
