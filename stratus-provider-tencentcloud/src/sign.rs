//! TC3-HMAC-SHA256 request signing
//!
//! Every API call is a `POST /` with a JSON body. Only `content-type` and
//! `host` are signed.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

pub const ALGORITHM: &str = "TC3-HMAC-SHA256";
pub const CONTENT_TYPE: &str = "application/json; charset=utf-8";
const SIGNED_HEADERS: &str = "content-type;host";

type HmacSha256 = Hmac<Sha256>;

/// Secret key pair plus an optional temporary session token
#[derive(Clone)]
pub struct Credential {
    pub secret_id: String,
    pub secret_key: String,
    pub token: Option<String>,
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("secret_id", &self.secret_id)
            .field("secret_key", &"***")
            .field("token", &self.token.as_ref().map(|_| "***"))
            .finish()
    }
}

fn sha256_hex(data: &str) -> String {
    hex::encode(Sha256::digest(data.as_bytes()))
}

fn hmac_sha256(key: &[u8], message: &str) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts keys of any length");
    mac.update(message.as_bytes());
    mac.finalize().into_bytes().to_vec()
}

/// `{date}/{service}/tc3_request`
pub fn credential_scope(service: &str, at: DateTime<Utc>) -> String {
    format!("{}/{}/tc3_request", at.format("%Y-%m-%d"), service)
}

fn canonical_request(host: &str, payload: &str) -> String {
    format!(
        "POST\n/\n\ncontent-type:{}\nhost:{}\n\n{}\n{}",
        CONTENT_TYPE,
        host,
        SIGNED_HEADERS,
        sha256_hex(payload)
    )
}

fn string_to_sign(service: &str, host: &str, payload: &str, at: DateTime<Utc>) -> String {
    format!(
        "{}\n{}\n{}\n{}",
        ALGORITHM,
        at.timestamp(),
        credential_scope(service, at),
        sha256_hex(&canonical_request(host, payload))
    )
}

/// Value of the `Authorization` header for one request
pub fn authorization(
    credential: &Credential,
    service: &str,
    host: &str,
    payload: &str,
    at: DateTime<Utc>,
) -> String {
    let date = at.format("%Y-%m-%d").to_string();
    let secret_date = hmac_sha256(format!("TC3{}", credential.secret_key).as_bytes(), &date);
    let secret_service = hmac_sha256(&secret_date, service);
    let secret_signing = hmac_sha256(&secret_service, "tc3_request");
    let signature = hex::encode(hmac_sha256(
        &secret_signing,
        &string_to_sign(service, host, payload, at),
    ));

    format!(
        "{} Credential={}/{}, SignedHeaders={}, Signature={}",
        ALGORITHM,
        credential.secret_id,
        credential_scope(service, at),
        SIGNED_HEADERS,
        signature
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn credential() -> Credential {
        Credential {
            secret_id: "AKIDexample".to_string(),
            secret_key: "secret".to_string(),
            token: None,
        }
    }

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2019, 2, 25, 8, 44, 39).unwrap()
    }

    #[test]
    fn credential_scope_uses_utc_date() {
        assert_eq!(credential_scope("cvm", at()), "2019-02-25/cvm/tc3_request");
    }

    #[test]
    fn canonical_request_layout() {
        let request = canonical_request("cvm.tencentcloudapi.com", "{}");
        let lines: Vec<&str> = request.split('\n').collect();
        assert_eq!(lines[0], "POST");
        assert_eq!(lines[1], "/");
        assert_eq!(lines[2], "");
        assert_eq!(lines[3], "content-type:application/json; charset=utf-8");
        assert_eq!(lines[4], "host:cvm.tencentcloudapi.com");
        assert_eq!(lines[5], "");
        assert_eq!(lines[6], "content-type;host");
        assert_eq!(lines[7], sha256_hex("{}"));
    }

    #[test]
    fn string_to_sign_carries_timestamp_and_scope() {
        let s = string_to_sign("cvm", "cvm.tencentcloudapi.com", "{}", at());
        let lines: Vec<&str> = s.split('\n').collect();
        assert_eq!(lines[0], "TC3-HMAC-SHA256");
        assert_eq!(lines[1], "1551084279");
        assert_eq!(lines[2], "2019-02-25/cvm/tc3_request");
        assert_eq!(lines[3].len(), 64);
    }

    #[test]
    fn authorization_is_deterministic() {
        let payload = r#"{"Limit":1,"Offset":0}"#;
        let a = authorization(&credential(), "cvm", "cvm.tencentcloudapi.com", payload, at());
        let b = authorization(&credential(), "cvm", "cvm.tencentcloudapi.com", payload, at());
        assert_eq!(a, b);
        assert!(a.starts_with(
            "TC3-HMAC-SHA256 Credential=AKIDexample/2019-02-25/cvm/tc3_request, SignedHeaders=content-type;host, Signature="
        ));

        let signature = a.rsplit("Signature=").next().unwrap();
        assert_eq!(signature.len(), 64);
        assert!(signature.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn signature_depends_on_payload_and_key() {
        let base = authorization(&credential(), "cvm", "cvm.tencentcloudapi.com", "{}", at());
        let other_payload =
            authorization(&credential(), "cvm", "cvm.tencentcloudapi.com", "{\"Limit\":1}", at());
        let mut other_key = credential();
        other_key.secret_key = "another".to_string();
        let other_key = authorization(&other_key, "cvm", "cvm.tencentcloudapi.com", "{}", at());

        assert_ne!(base, other_payload);
        assert_ne!(base, other_key);
    }

    #[test]
    fn debug_hides_secrets() {
        let mut credential = credential();
        credential.token = Some("session".to_string());
        let debug = format!("{:?}", credential);
        assert!(!debug.contains("secret\""));
        assert!(!debug.contains("session"));
        assert!(debug.contains("AKIDexample"));
    }
}
