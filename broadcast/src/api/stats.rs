/// The counters the transport reports through the stats listener
#[derive(PartialEq, Eq, Debug, Clone, Copy, Hash)]
pub enum StatType {
    /// The current `RtmpState` of the connection, encoded with `RtmpState::as_stat_value()`
    RtmpState,

    /// Total number of bytes sent since the current stream session started
    RtmpDataSent,
}

/// Connection states reported for the transport's RTMP connection
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum RtmpState {
    Invalid,
    Idle,
    Initialize,
    Handshake,
    Connect,
    CreateStream,
    Publish,
    SendVideo,
    Shutdown,
    Error,
}

impl RtmpState {
    /// Decodes the raw value delivered with a `StatType::RtmpState` stat.  Unknown values map to
    /// `Invalid`.
    pub fn from_stat_value(value: u64) -> RtmpState {
        match value {
            0 => RtmpState::Idle,
            1 => RtmpState::Initialize,
            2 => RtmpState::Handshake,
            3 => RtmpState::Connect,
            4 => RtmpState::CreateStream,
            5 => RtmpState::Publish,
            6 => RtmpState::SendVideo,
            7 => RtmpState::Shutdown,
            8 => RtmpState::Error,
            _ => RtmpState::Invalid,
        }
    }

    pub fn as_stat_value(self) -> u64 {
        match self {
            RtmpState::Idle => 0,
            RtmpState::Initialize => 1,
            RtmpState::Handshake => 2,
            RtmpState::Connect => 3,
            RtmpState::CreateStream => 4,
            RtmpState::Publish => 5,
            RtmpState::SendVideo => 6,
            RtmpState::Shutdown => 7,
            RtmpState::Error => 8,
            RtmpState::Invalid => u64::max_value(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::RtmpState;

    #[test]
    fn known_states_survive_stat_encoding() {
        for state in &[RtmpState::Idle, RtmpState::Connect, RtmpState::SendVideo, RtmpState::Error] {
            assert_eq!(RtmpState::from_stat_value(state.as_stat_value()), *state);
        }
    }

    #[test]
    fn unknown_stat_value_is_invalid_state() {
        assert_eq!(RtmpState::from_stat_value(42), RtmpState::Invalid);
    }
}
