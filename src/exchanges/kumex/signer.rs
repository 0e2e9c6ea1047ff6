use crate::core::kernel::{hmac_sha256_base64, request_path, SignatureResult, Signer};
use secrecy::{ExposeSecret, Secret};
use std::collections::HashMap;

pub const HEADER_SIGN: &str = "KC-API-SIGN";
pub const HEADER_TIMESTAMP: &str = "KC-API-TIMESTAMP";
pub const HEADER_KEY: &str = "KC-API-KEY";
pub const HEADER_PASSPHRASE: &str = "KC-API-PASSPHRASE";

/// Request signer for the KuMex REST API
///
/// The prehash string is `timestamp + method + path[?query] + body` and the
/// signature is its base64 HMAC-SHA256. The passphrase travels in plaintext
/// alongside the signature, as the venue's v1 key scheme expects.
pub struct KumexSigner {
    api_key: Secret<String>,
    secret_key: Secret<String>,
    passphrase: Secret<String>,
}

impl KumexSigner {
    pub fn new(api_key: String, secret_key: String, passphrase: String) -> Self {
        Self {
            api_key: Secret::new(api_key),
            secret_key: Secret::new(secret_key),
            passphrase: Secret::new(passphrase),
        }
    }

    /// Canonical string to sign
    pub fn prehash(
        timestamp: u64,
        method: &str,
        endpoint: &str,
        query_string: &str,
        body: &[u8],
    ) -> Vec<u8> {
        let mut payload = format!(
            "{}{}{}",
            timestamp,
            method,
            request_path(endpoint, query_string)
        )
        .into_bytes();
        payload.extend_from_slice(body);
        payload
    }
}

impl Signer for KumexSigner {
    fn sign_request(
        &self,
        method: &str,
        endpoint: &str,
        query_string: &str,
        body: &[u8],
        timestamp: u64,
    ) -> SignatureResult {
        let payload = Self::prehash(timestamp, method, endpoint, query_string, body);
        let signature = hmac_sha256_base64(self.secret_key.expose_secret().as_bytes(), &payload)?;

        let mut headers = HashMap::new();
        headers.insert(HEADER_SIGN.to_string(), signature);
        headers.insert(HEADER_TIMESTAMP.to_string(), timestamp.to_string());
        headers.insert(HEADER_KEY.to_string(), self.api_key.expose_secret().clone());
        headers.insert(
            HEADER_PASSPHRASE.to_string(),
            self.passphrase.expose_secret().clone(),
        );

        Ok(headers)
    }
}
