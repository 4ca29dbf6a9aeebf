//! Meeting URLs handed to the voice client

use crate::error::{Error, Result};
use reqwest::Url;

/// Everything needed to join a meeting
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MeetingData {
    pub meeting_id: String,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl MeetingData {
    pub fn new(meeting_id: impl Into<String>) -> Self {
        Self {
            meeting_id: meeting_id.into(),
            ..Self::default()
        }
    }

    pub fn with_username(mut self, username: Option<String>) -> Self {
        self.username = username.filter(|u| !u.is_empty());
        self
    }

    pub fn with_password(mut self, password: Option<String>) -> Self {
        self.password = password.filter(|p| !p.is_empty());
        self
    }
}

/// Build `<scheme>://[user[:password]@]<id>[:port]`
///
/// Credentials are percent-encoded. A password without a username is
/// dropped since the URL has nowhere to put it.
pub fn generate_url(scheme: &str, data: &MeetingData) -> Result<String> {
    let invalid = || Error::InvalidMeetingId(data.meeting_id.clone());

    let mut url = Url::parse(&format!("{}://{}", scheme, data.meeting_id)).map_err(|_| invalid())?;
    if url.host_str().map_or(true, str::is_empty) {
        return Err(invalid());
    }

    if let Some(username) = &data.username {
        url.set_username(username).map_err(|_| invalid())?;
        if let Some(password) = &data.password {
            url.set_password(Some(password.as_str())).map_err(|_| invalid())?;
        }
    }
    if let Some(port) = data.port {
        url.set_port(Some(port)).map_err(|_| invalid())?;
    }

    Ok(url.to_string())
}
