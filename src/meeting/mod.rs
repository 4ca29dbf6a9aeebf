//! Meeting module
//!
//! Hosting a meeting publishes a local voice server as an onion service;
//! joining launches the voice client against an onion address.

pub mod launcher;
pub mod server;

pub use launcher::{HostedMeeting, LaunchCommand, MeetingLauncher};
pub use server::{ProcessVoiceServer, VoiceServer};
