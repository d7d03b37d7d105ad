use dpg_common::Secret;
use log::*;

/// Outbound request timeout, in seconds, used when `DPG_HTTP_TIMEOUT` is not set.
pub const DEFAULT_HTTP_TIMEOUT: u64 = 10;
pub const DEFAULT_PAYAPP_API_URL: &str = "https://api.payapp.kr/oapi/apiLoad.html";
pub const DEFAULT_PAYAPP_ACK: &str = "SUCCESS";
pub const DEFAULT_SIGNATURE_HEADER: &str = "X-Signature";

#[derive(Debug, Clone)]
pub struct PayAppConfig {
    pub user_id: String,
    pub api_url: String,
    /// The literal body PayApp expects in response to a feedback call.
    pub ack: String,
    /// `linkkey`/`linkval` pair that PayApp echoes in every feedback call. When either is missing, feedback
    /// verification is disabled.
    pub link_key: Option<Secret<String>>,
    pub link_val: Option<Secret<String>>,
}

impl Default for PayAppConfig {
    fn default() -> Self {
        Self {
            user_id: String::default(),
            api_url: DEFAULT_PAYAPP_API_URL.to_string(),
            ack: DEFAULT_PAYAPP_ACK.to_string(),
            link_key: None,
            link_val: None,
        }
    }
}

impl PayAppConfig {
    pub fn new_from_env_or_default() -> Self {
        let user_id = std::env::var("DPG_PAYAPP_USER_ID").unwrap_or_else(|_| {
            warn!("🪛️ DPG_PAYAPP_USER_ID not set. PayApp checkouts will be rejected until it is configured.");
            String::default()
        });
        let api_url = std::env::var("DPG_PAYAPP_API_URL").unwrap_or_else(|_| {
            info!("🪛️ DPG_PAYAPP_API_URL not set, using {DEFAULT_PAYAPP_API_URL}");
            DEFAULT_PAYAPP_API_URL.to_string()
        });
        let ack = std::env::var("DPG_PAYAPP_ACK").unwrap_or_else(|_| DEFAULT_PAYAPP_ACK.to_string());
        let link_key = non_empty_secret("DPG_PAYAPP_LINK_KEY");
        let link_val = non_empty_secret("DPG_PAYAPP_LINK_VAL");
        Self { user_id, api_url, ack, link_key, link_val }
    }

    pub fn verification_enabled(&self) -> bool {
        self.link_key.is_some() && self.link_val.is_some()
    }
}

/// Configuration for the JSON provider that signs its callbacks with HMAC-SHA256. The provider is disabled unless
/// both a merchant id and an API URL are configured.
#[derive(Debug, Clone)]
pub struct SignedJsonConfig {
    pub merchant_id: String,
    pub api_url: String,
    pub secret: Option<Secret<String>>,
    pub signature_header: String,
}

impl Default for SignedJsonConfig {
    fn default() -> Self {
        Self {
            merchant_id: String::default(),
            api_url: String::default(),
            secret: None,
            signature_header: DEFAULT_SIGNATURE_HEADER.to_string(),
        }
    }
}

impl SignedJsonConfig {
    pub fn new_from_env_or_default() -> Self {
        let merchant_id = std::env::var("DPG_SIGNED_JSON_MERCHANT_ID").unwrap_or_default();
        let api_url = std::env::var("DPG_SIGNED_JSON_API_URL").unwrap_or_default();
        let secret = non_empty_secret("DPG_SIGNED_JSON_SECRET");
        let signature_header = std::env::var("DPG_SIGNED_JSON_SIGNATURE_HEADER").unwrap_or_else(|_| {
            debug!("🪛️ DPG_SIGNED_JSON_SIGNATURE_HEADER not set, using {DEFAULT_SIGNATURE_HEADER}");
            DEFAULT_SIGNATURE_HEADER.to_string()
        });
        Self { merchant_id, api_url, secret, signature_header }
    }

    pub fn is_enabled(&self) -> bool {
        !self.merchant_id.trim().is_empty() && !self.api_url.trim().is_empty()
    }

    pub fn verification_enabled(&self) -> bool {
        self.secret.is_some()
    }
}

fn non_empty_secret(var: &str) -> Option<Secret<String>> {
    match std::env::var(var) {
        Ok(s) if !s.trim().is_empty() => Some(Secret::new(s)),
        _ => None,
    }
}
