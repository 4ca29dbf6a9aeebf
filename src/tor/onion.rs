//! Onion service addresses and handles

use std::fmt;

/// Length of a v3 service ID (base32 of pubkey, checksum, version)
pub const V3_ID_LEN: usize = 56;

const ONION_SUFFIX: &str = ".onion";

/// Key type requested from Tor for new services
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyType {
    Ed25519V3,
}

impl KeyType {
    /// Key blob for `ADD_ONION` asking Tor to generate a fresh key
    pub fn new_key_spec(self) -> &'static str {
        match self {
            KeyType::Ed25519V3 => "NEW:ED25519-V3",
        }
    }
}

/// An onion service created through `ADD_ONION`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HiddenService {
    /// Full address, `<id>.onion`
    pub onion_address: String,
    /// Virtual port clients connect to
    pub public_port: u16,
    pub destination_host: String,
    pub destination_port: u16,
    pub key_type: KeyType,
}

impl HiddenService {
    /// The service ID without the `.onion` suffix
    pub fn service_id(&self) -> &str {
        service_id(&self.onion_address)
    }
}

impl fmt::Display for HiddenService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} -> {}:{}",
            self.onion_address, self.public_port, self.destination_host, self.destination_port
        )
    }
}

/// Strip a trailing `.onion`, if present
pub fn service_id(address: &str) -> &str {
    address.strip_suffix(ONION_SUFFIX).unwrap_or(address)
}

/// Normalize user input: trim whitespace and lowercase
pub fn normalize_address(address: &str) -> String {
    address.trim().to_ascii_lowercase()
}

/// Check an address is a well-formed v3 onion address
///
/// Expects 56 base32 characters (`a-z`, `2-7`) followed by `.onion`.
/// Input is normalized first, so case and surrounding whitespace are ignored.
pub fn is_valid_onion_address(address: &str) -> bool {
    let address = normalize_address(address);
    let Some(id) = address.strip_suffix(ONION_SUFFIX) else {
        return false;
    };

    id.len() == V3_ID_LEN
        && id
            .bytes()
            .all(|b| b.is_ascii_lowercase() || (b'2'..=b'7').contains(&b))
}
