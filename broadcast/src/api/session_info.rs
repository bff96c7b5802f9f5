/// Token proving the user authorized this application to broadcast on their behalf
#[derive(PartialEq, Eq, Debug, Clone, Default)]
pub struct AuthToken {
    pub data: String,
}

impl AuthToken {
    pub fn new(data: impl Into<String>) -> AuthToken {
        AuthToken { data: data.into() }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Channel details returned by a successful login
#[derive(PartialEq, Eq, Debug, Clone, Default)]
pub struct ChannelInfo {
    pub name: String,
    pub display_name: String,
    pub channel_url: String,
}
