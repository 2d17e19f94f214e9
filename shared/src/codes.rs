//! Disconnect status codes in the reserved 4000 range.

/// Reason reported to a client when the server closes its connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum DisconnectCode {
    /// Normal teardown, nothing went wrong on the wire.
    Normal = 4000,
    /// The last frame could not be decoded at all.
    BadMessage = 4001,
    /// The frame decoded but was invalid for the session's current state.
    BadPacket = 4002,
    /// The client speaks an older protocol version than the server.
    ClientOutOfDate = 4003,
    /// The client speaks a newer protocol version than the server.
    ServerOutOfDate = 4004,
    /// Token verification failed during the handshake.
    BadAuth = 4005,
}

impl DisconnectCode {
    pub fn code(self) -> u16 {
        self as u16
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_stay_in_reserved_range() {
        let all = [
            DisconnectCode::Normal,
            DisconnectCode::BadMessage,
            DisconnectCode::BadPacket,
            DisconnectCode::ClientOutOfDate,
            DisconnectCode::ServerOutOfDate,
            DisconnectCode::BadAuth,
        ];
        for code in all {
            assert!((4000..5000).contains(&code.code()));
        }
    }
}
