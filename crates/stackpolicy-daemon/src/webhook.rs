//! Pulumi Cloud webhook payloads and signature verification.

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use stackpolicy_core::{Result, StackIdentity};

pub const SIGNATURE_HEADER: &str = "Pulumi-Webhook-Signature";

type HmacSha256 = Hmac<Sha256>;

/// Hex HMAC-SHA256 of `body` under `secret`.
pub fn sign(secret: &str, body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("infallible: HMAC accepts keys of any length");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Constant-time check of a hex signature. Malformed hex never verifies.
pub fn verify_signature(secret: &str, body: &[u8], signature: &str) -> bool {
    let Ok(expected) = hex::decode(signature.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookOrganization {
    #[serde(rename = "githubLogin", default)]
    pub github_login: String,
}

/// The fields of a webhook delivery this daemon acts on; everything else in
/// the payload is ignored.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookEvent {
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub organization: WebhookOrganization,
    #[serde(default)]
    pub project_name: String,
    #[serde(default)]
    pub stack_name: String,
}

impl WebhookEvent {
    pub fn is_stack_created(&self) -> bool {
        self.kind == "stack" && self.action == "created"
    }

    pub fn identity(&self) -> Result<StackIdentity> {
        StackIdentity::new(
            &self.organization.github_login,
            &self.project_name,
            &self.stack_name,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_round_trip_and_tamper() {
        let body = br#"{"kind":"stack","action":"created"}"#;
        let sig = sign("s3cret", body);
        assert_eq!(sig.len(), 64);
        assert!(verify_signature("s3cret", body, &sig));
        assert!(!verify_signature("other", body, &sig));
        assert!(!verify_signature("s3cret", b"{}", &sig));
        assert!(!verify_signature("s3cret", body, "not-hex"));
    }

    #[test]
    fn parses_stack_created_payload() {
        let raw = r#"{
            "user": {"name": "Ada", "githubLogin": "ada"},
            "organization": {"name": "Acme", "githubLogin": "acme"},
            "projectName": "widgets",
            "stackName": "feature-x",
            "kind": "stack",
            "action": "created"
        }"#;
        let event: WebhookEvent = serde_json::from_str(raw).unwrap();
        assert!(event.is_stack_created());
        assert_eq!(event.identity().unwrap().to_string(), "acme/widgets/feature-x");
    }

    #[test]
    fn other_events_are_not_creations() {
        let event: WebhookEvent =
            serde_json::from_str(r#"{"kind":"stack","action":"deleted"}"#).unwrap();
        assert!(!event.is_stack_created());
        assert!(event.identity().is_err());
    }
}
