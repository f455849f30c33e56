//! HMAC-SHA256 signing for time-bounded, read-only object URLs.
//!
//! A signed URL has the form `{base_url}/{key}?expires={unix}&signature={mac}`
//! where `mac = HMAC(secret, "{key}\n{expires}")`, base64url without padding.

use crate::services::error::{GalleryError, GalleryResult};
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use url::Url;

type HmacSha256 = Hmac<Sha256>;

#[derive(Clone)]
pub struct UrlSigner {
    secret: Vec<u8>,
    base_url: Url,
}

impl std::fmt::Debug for UrlSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UrlSigner")
            .field("base_url", &self.base_url.as_str())
            .finish_non_exhaustive()
    }
}

impl UrlSigner {
    pub fn new(secret: impl Into<Vec<u8>>, base_url: &str) -> GalleryResult<Self> {
        let secret = secret.into();
        if secret.is_empty() {
            return Err(GalleryError::SigningUnavailable);
        }
        let base_url = Url::parse(base_url).map_err(|_| GalleryError::SigningUnavailable)?;
        if base_url.cannot_be_a_base() {
            return Err(GalleryError::SigningUnavailable);
        }
        Ok(Self { secret, base_url })
    }

    fn mac(&self, key: &str, expires: i64) -> GalleryResult<HmacSha256> {
        let mut mac =
            HmacSha256::new_from_slice(&self.secret).map_err(|_| GalleryError::SigningUnavailable)?;
        mac.update(key.as_bytes());
        mac.update(b"\n");
        mac.update(expires.to_string().as_bytes());
        Ok(mac)
    }

    pub fn signature(&self, key: &str, expires: i64) -> GalleryResult<String> {
        let digest = self.mac(key, expires)?.finalize().into_bytes();
        Ok(URL_SAFE_NO_PAD.encode(digest))
    }

    /// Build a URL granting read access to `key` until `expires_at`.
    pub fn presign(&self, key: &str, expires_at: DateTime<Utc>) -> GalleryResult<String> {
        let expires = expires_at.timestamp();
        let signature = self.signature(key, expires)?;

        let mut url = self.base_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| GalleryError::SigningUnavailable)?;
            segments.pop_if_empty().extend(key.split('/'));
        }
        url.query_pairs_mut()
            .append_pair("expires", &expires.to_string())
            .append_pair("signature", &signature);
        Ok(url.into())
    }

    /// Check a presented signature for `key`. Expiry is checked first.
    pub fn verify(
        &self,
        key: &str,
        expires: i64,
        signature: &str,
        now: DateTime<Utc>,
    ) -> GalleryResult<()> {
        if now.timestamp() > expires {
            return Err(GalleryError::SignatureExpired);
        }
        let presented = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| GalleryError::InvalidSignature)?;
        self.mac(key, expires)?
            .verify_slice(&presented)
            .map_err(|_| GalleryError::InvalidSignature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn signer() -> UrlSigner {
        UrlSigner::new(b"super-secret".to_vec(), "http://localhost:3000/objects").unwrap()
    }

    #[test]
    fn presigned_url_embeds_expiry_and_signature() {
        let expires_at = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
        let url = signer().presign("photos/cat 1.png", expires_at).unwrap();
        assert!(url.starts_with("http://localhost:3000/objects/photos/cat%201.png?expires="));
        assert!(url.contains(&format!("expires={}", expires_at.timestamp())));
        assert!(url.contains("&signature="));
    }

    #[test]
    fn verifies_own_signature() {
        let s = signer();
        let now = Utc::now();
        let expires = (now + Duration::minutes(10)).timestamp();
        let sig = s.signature("a.png", expires).unwrap();
        assert!(s.verify("a.png", expires, &sig, now).is_ok());
    }

    #[test]
    fn rejects_signature_for_other_key() {
        let s = signer();
        let now = Utc::now();
        let expires = (now + Duration::minutes(10)).timestamp();
        let sig = s.signature("a.png", expires).unwrap();
        assert!(matches!(
            s.verify("b.png", expires, &sig, now),
            Err(GalleryError::InvalidSignature)
        ));
        assert!(matches!(
            s.verify("a.png", expires, "not-base64!!", now),
            Err(GalleryError::InvalidSignature)
        ));
    }

    #[test]
    fn rejects_expired_url() {
        let s = signer();
        let now = Utc::now();
        let expires = (now - Duration::seconds(1)).timestamp();
        let sig = s.signature("a.png", expires).unwrap();
        assert!(matches!(
            s.verify("a.png", expires, &sig, now),
            Err(GalleryError::SignatureExpired)
        ));
    }

    #[test]
    fn empty_secret_is_refused() {
        assert!(UrlSigner::new(Vec::new(), "http://localhost/objects").is_err());
    }
}
