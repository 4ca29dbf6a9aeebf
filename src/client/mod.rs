//! Voice client module
//!
//! Locating the client binary, building meeting URLs and supervising the
//! running client process.

pub mod binary;
pub mod process;
pub mod url;

pub use binary::{Binary, BinaryResolver};
pub use process::{ClientExit, RunningClient};
pub use url::{generate_url, MeetingData};
