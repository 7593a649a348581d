use crate::{Error, Result};
use nostr::PublicKey;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Millisecond wall clock. Injectable so expiry can be tested.
pub type Clock = Arc<dyn Fn() -> u64 + Send + Sync>;

pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

pub fn system_clock() -> Clock {
    Arc::new(now_millis)
}

/// 64 lowercase hex characters.
pub fn is_hex(s: &str) -> bool {
    s.len() == 64 && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

pub fn pubkey_from_hex(hex_str: &str) -> Result<PublicKey> {
    let bytes = hex::decode(hex_str)?;
    if bytes.len() != 32 {
        return Err(Error::InvalidHex("Invalid pubkey length".to_string()));
    }
    PublicKey::from_slice(&bytes).map_err(|e| Error::InvalidHex(e.to_string()))
}

/// `name@domain` to the NIP-05 well-known lookup URL.
pub fn nip05_to_url(identifier: &str) -> Option<String> {
    let (name, domain) = identifier.split_once('@')?;
    Some(format!(
        "https://{}/.well-known/nostr.json?name={}",
        domain, name
    ))
}

pub fn nip05_to_website(identifier: &str) -> Option<String> {
    let (_, domain) = identifier.split_once('@')?;
    Some(format!("https://{}", domain))
}

pub fn truncate_npub(npub: &str) -> String {
    let chars: Vec<char> = npub.chars().collect();
    if chars.len() <= 16 {
        return npub.to_string();
    }
    let head: String = chars[..8].iter().collect();
    let tail: String = chars[chars.len() - 8..].iter().collect();
    format!("{}:{}", head, tail)
}

/// Truncates by `char`, so multi-byte emoji are never split.
pub fn truncate_profile_info(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        return s.to_string();
    }
    let truncated: String = s.chars().take(max_len).collect();
    format!("{}...", truncated)
}
