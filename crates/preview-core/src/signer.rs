use base64::Engine;
use hmac::{Hmac, Mac};
use sha1::Sha1;

type HmacSha1 = Hmac<Sha1>;

/// Time-limited HMAC signer for asset URLs (spec §6 "URL signing",
/// grounded in `original_source/api/signature.go`).
///
/// `signature = base64(HMAC-SHA1(key, path + "\n" + expires))`. This is a
/// small, self-contained collaborator: the dispatcher/uploader logic needs
/// *something* implementing the contract to exercise in tests, so it lives
/// in `preview-core` even though the HTTP layer that ultimately calls it
/// stays external.
pub struct UrlSigner {
    key: String,
    ttl_secs: i64,
}

impl UrlSigner {
    pub fn new(key: impl Into<String>, ttl_secs: i64) -> Self {
        Self {
            key: key.into(),
            ttl_secs,
        }
    }

    /// Append `signature` and `expires` query parameters to `url`, with
    /// `expires` set to `now_nanos + ttl`. Returns the signed URL and the
    /// expiry timestamp (nanoseconds), matching the Go signature's second
    /// return value.
    pub fn sign(&self, url: &str, now_nanos: i64) -> (String, i64) {
        let expires = now_nanos + self.ttl_secs * 1_000_000_000;
        let (path, existing_query) = split_path_and_query(url);
        let signature = self.compute_signature(path, expires);

        let mut query = existing_query.to_string();
        if !query.is_empty() {
            query.push('&');
        }
        query.push_str(&format!(
            "signature={}&expires={}",
            urlencoding::encode(&signature),
            expires
        ));

        (format!("{path}?{query}"), expires)
    }

    /// Recompute the signature over `path` and the `expires` query
    /// parameter present in `url` and compare against the `signature`
    /// parameter.
    pub fn is_valid(&self, url: &str) -> bool {
        let (path, query) = split_path_and_query(url);
        let params = parse_query(query);
        let (Some(expires), Some(signature)) = (params.get("expires"), params.get("signature"))
        else {
            return false;
        };
        &self.compute_signature(path, expires.parse().unwrap_or(0)) == signature
    }

    fn compute_signature(&self, path: &str, expires: i64) -> String {
        let message = format!("{path}\n{expires}");
        #[allow(clippy::expect_used)]
        let mut mac = HmacSha1::new_from_slice(self.key.as_bytes())
            .expect("HMAC accepts keys of any length");
        mac.update(message.as_bytes());
        base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes())
    }
}

fn split_path_and_query(url: &str) -> (&str, &str) {
    url.split_once('?').unwrap_or((url, ""))
}

fn parse_query(query: &str) -> std::collections::HashMap<&str, String> {
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .map(|(k, v)| (k, urlencoding::decode(v).map_or_else(|_| v.to_string(), |decoded| decoded.into_owned())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signed_url_is_valid() {
        let signer = UrlSigner::new("secret", 300);
        let (signed, _expires) = signer.sign("/asset/abc/small/0", 0);
        assert!(signer.is_valid(&signed));
    }

    #[test]
    fn tampered_signature_is_invalid() {
        let signer = UrlSigner::new("secret", 300);
        let (signed, _) = signer.sign("/asset/abc/small/0", 0);
        let tampered = signed.replace("signature=", "signature=x");
        assert!(!signer.is_valid(&tampered));
    }

    #[test]
    fn different_keys_disagree() {
        let a = UrlSigner::new("key-a", 300);
        let b = UrlSigner::new("key-b", 300);
        let (signed, _) = a.sign("/asset/abc/small/0", 0);
        assert!(!b.is_valid(&signed));
    }
}
