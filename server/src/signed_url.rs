//! Time-bounded preview URL issuance
//!
//! Grants short-lived, read-only access to one document blob. The
//! signature covers the blob URL and the expiry timestamp; anything
//! holding the shared key can verify. URLs are signed on demand per
//! request and never cached beyond their validity window.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

#[derive(Clone)]
pub struct UrlSigner {
    key: Vec<u8>,
    ttl_secs: i64,
}

impl UrlSigner {
    pub fn new(key: impl Into<Vec<u8>>, ttl: std::time::Duration) -> Self {
        Self {
            key: key.into(),
            ttl_secs: ttl.as_secs() as i64,
        }
    }

    /// Issue a read URL valid for the configured window.
    pub fn issue(&self, blob_url: &str) -> String {
        self.issue_at(blob_url, Utc::now())
    }

    fn issue_at(&self, blob_url: &str, now: DateTime<Utc>) -> String {
        let exp = now.timestamp() + self.ttl_secs;
        let sig = self.signature(blob_url, exp);
        let sep = if blob_url.contains('?') { '&' } else { '?' };
        format!("{blob_url}{sep}exp={exp}&sig={sig}")
    }

    /// Check that an issued URL is untampered and unexpired.
    pub fn verify(&self, url: &str, now: DateTime<Utc>) -> bool {
        self.verify_inner(url, now).is_some()
    }

    fn verify_inner(&self, url: &str, now: DateTime<Utc>) -> Option<()> {
        let idx = url.find("?exp=").or_else(|| url.find("&exp="))?;
        let base = &url[..idx];
        let tail = &url[idx + "?exp=".len()..];
        let (exp_str, sig_hex) = tail.split_once("&sig=")?;
        let exp: i64 = exp_str.parse().ok()?;
        if now.timestamp() > exp {
            return None;
        }

        let sig = hex::decode(sig_hex).ok()?;
        let mut mac = self.mac();
        mac.update(base.as_bytes());
        mac.update(b"\n");
        mac.update(exp_str.as_bytes());
        mac.verify_slice(&sig).ok()
    }

    fn signature(&self, blob_url: &str, exp: i64) -> String {
        let mut mac = self.mac();
        mac.update(blob_url.as_bytes());
        mac.update(b"\n");
        mac.update(exp.to_string().as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    fn mac(&self) -> HmacSha256 {
        HmacSha256::new_from_slice(&self.key).expect("HMAC accepts keys of any length")
    }
}
