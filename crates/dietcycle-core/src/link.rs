//! Signed feedback links.
//!
//! Reminder emails point at the feedback form for one cycle. The link carries
//! an HMAC-SHA256 token so the form can confirm the cycle id was issued by us.
//! Format: `dc_fb_<cycle_id>_<hmac_hex>`

use std::fmt;

use hmac::{Hmac, Mac};
use sha2::Sha256;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

const TOKEN_PREFIX: &str = "dc_fb_";

/// Errors from verifying a feedback-link token.
#[derive(Debug, thiserror::Error)]
pub enum LinkTokenError {
    #[error("invalid link token format: {0}")]
    InvalidFormat(String),

    #[error("invalid cycle ID in link token: {0}")]
    InvalidCycleId(String),

    #[error("link token HMAC verification failed")]
    HmacMismatch,
}

/// Signs and verifies feedback-link tokens.
#[derive(Clone)]
pub struct LinkSigner {
    secret: Vec<u8>,
}

impl fmt::Debug for LinkSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinkSigner").finish_non_exhaustive()
    }
}

impl LinkSigner {
    pub fn new(secret: Vec<u8>) -> Self {
        Self { secret }
    }

    /// Token for the feedback form of `cycle_id`.
    pub fn sign(&self, cycle_id: Uuid) -> String {
        let mac = compute_hmac(&self.secret, message(cycle_id).as_bytes());
        format!("{TOKEN_PREFIX}{cycle_id}_{}", hex::encode(mac))
    }

    /// Check a token and return the cycle it was issued for.
    pub fn verify(&self, token: &str) -> Result<Uuid, LinkTokenError> {
        let rest = token.strip_prefix(TOKEN_PREFIX).ok_or_else(|| {
            LinkTokenError::InvalidFormat(format!("token must start with '{TOKEN_PREFIX}'"))
        })?;

        // A hyphenated UUID is 36 characters.
        if rest.len() < 36 || !rest.is_char_boundary(36) {
            return Err(LinkTokenError::InvalidFormat(
                "token too short to contain a cycle ID".to_owned(),
            ));
        }
        let (id_str, after_id) = rest.split_at(36);
        let cycle_id =
            Uuid::parse_str(id_str).map_err(|e| LinkTokenError::InvalidCycleId(e.to_string()))?;

        let hmac_hex = after_id.strip_prefix('_').ok_or_else(|| {
            LinkTokenError::InvalidFormat("expected underscore after cycle ID".to_owned())
        })?;
        let provided = hex::decode(hmac_hex)
            .map_err(|e| LinkTokenError::InvalidFormat(format!("invalid hex in hmac: {e}")))?;

        let mut mac =
            HmacSha256::new_from_slice(&self.secret).expect("HMAC can take key of any size");
        mac.update(message(cycle_id).as_bytes());
        mac.verify_slice(&provided)
            .map_err(|_| LinkTokenError::HmacMismatch)?;

        Ok(cycle_id)
    }

    /// Full URL of the feedback form for a cycle.
    pub fn feedback_url(&self, frontend_url: &str, cycle_id: Uuid) -> String {
        format!(
            "{}/main-page/feedback-form/{cycle_id}?token={}",
            frontend_url.trim_end_matches('/'),
            self.sign(cycle_id)
        )
    }
}

fn message(cycle_id: Uuid) -> String {
    format!("feedback:{cycle_id}")
}

fn compute_hmac(key: &[u8], message: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(message);
    mac.finalize().into_bytes().to_vec()
}
