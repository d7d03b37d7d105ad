use hmac::{Hmac, Mac};
use log::*;
use once_cell::sync::Lazy;
use regex::Regex;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

static MOBILE_NUMBER: Lazy<Option<Regex>> = Lazy::new(|| match Regex::new(r"^01[0-9]-?[0-9]{3,4}-?[0-9]{4}$") {
    Ok(re) => Some(re),
    Err(e) => {
        error!("💳️ Phone number pattern did not compile. {e}");
        None
    },
});

/// Strips control characters, collapses surrounding whitespace and cuts the name to at most `max_chars` characters.
/// Counting is per `char`, so multi-byte names are never split mid-character.
pub fn truncate_display_name(name: &str, max_chars: usize) -> String {
    let cleaned = name.chars().filter(|c| !c.is_control()).collect::<String>();
    let trimmed = cleaned.trim();
    let result = trimmed.chars().take(max_chars).collect::<String>();
    if result.chars().count() < trimmed.chars().count() {
        trace!("💳️ Display name truncated to {max_chars} characters: '{result}'");
    }
    result.trim_end().to_string()
}

/// Removes dashes and whitespace from a phone or business number.
pub fn normalize_digits(s: &str) -> String {
    s.chars().filter(|c| !(c.is_whitespace() || *c == '-')).collect()
}

/// Korean mobile number check: `01x` prefix, then 3 or 4 digits, then 4 digits, with optional dashes.
pub fn is_valid_mobile_number(phone: &str) -> bool {
    MOBILE_NUMBER.as_ref().is_some_and(|re| re.is_match(phone.trim()))
}

/// Business registration numbers are ten digits, usually written `xxx-xx-xxxxx`.
pub fn is_valid_business_number(number: &str) -> bool {
    let digits = normalize_digits(number);
    digits.len() == 10 && digits.chars().all(|c| c.is_ascii_digit())
}

/// Base64-encoded HMAC-SHA256 of `data`.
pub fn calculate_hmac(secret: &str, data: &[u8]) -> String {
    // HMAC accepts keys of any length, so this cannot fail
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(m) => m,
        Err(_) => return String::default(),
    };
    mac.update(data);
    base64::encode(mac.finalize().into_bytes())
}

/// Recomputes the HMAC over the exact raw body and checks it against the provided signature. The comparison is left
/// to [`Mac::verify_slice`], which runs in constant time. Hex-encoded signatures are accepted as well as base64 ones.
pub fn verify_hmac_signature(secret: &str, data: &[u8], signature: &str) -> bool {
    let signature = signature.trim();
    let signature = signature.strip_prefix("sha256=").unwrap_or(signature);
    let decoded = match hex::decode(signature) {
        Ok(raw) => raw,
        Err(_) => match base64::decode(signature) {
            Ok(raw) => raw,
            Err(_) => {
                trace!("💳️ Signature is neither hex nor base64");
                return false;
            },
        },
    };
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(m) => m,
        Err(_) => return false,
    };
    mac.update(data);
    mac.verify_slice(&decoded).is_ok()
}

/// Equality check for shared tokens whose running time does not depend on where the inputs differ.
pub fn tokens_match(expected: &str, supplied: &str) -> bool {
    constant_time_eq::constant_time_eq(expected.as_bytes(), supplied.as_bytes())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn display_names() {
        let _ = env_logger::try_init();
        assert_eq!(truncate_display_name("Seoul traffic dataset 2024 edition", 20), "Seoul traffic datase");
        assert_eq!(truncate_display_name("서울시 교통량 데이터셋 (2024년 1월~12월 전체)", 20), "서울시 교통량 데이터셋 (2024년");
        assert_eq!(truncate_display_name("  bad\u{0007}\nname\t ", 100), "badname");
        assert_eq!(truncate_display_name("ends in space here", 14), "ends in space");
    }

    #[test]
    fn phone_numbers() {
        assert!(is_valid_mobile_number("010-1234-5678"));
        assert!(is_valid_mobile_number("01012345678"));
        assert!(is_valid_mobile_number("011-123-4567"));
        assert!(!is_valid_mobile_number("02-1234-5678"));
        assert!(!is_valid_mobile_number("010-12-5678"));
        assert!(!is_valid_mobile_number(""));
        assert_eq!(normalize_digits("010-1234 5678"), "01012345678");
    }

    #[test]
    fn business_numbers() {
        assert!(is_valid_business_number("123-45-67890"));
        assert!(is_valid_business_number("1234567890"));
        assert!(!is_valid_business_number("123-45-6789"));
        assert!(!is_valid_business_number("123-45-6789a"));
    }

    #[test]
    fn hmac_signatures() {
        let _ = env_logger::try_init();
        let body = br#"{"eventId":"evt_1","status":"paid"}"#;
        let sig = calculate_hmac("topsecret", body);
        assert!(verify_hmac_signature("topsecret", body, &sig));
        assert!(verify_hmac_signature("topsecret", body, &format!("sha256={sig}")));
        assert!(!verify_hmac_signature("othersecret", body, &sig));
        assert!(!verify_hmac_signature("topsecret", br#"{"eventId":"evt_1","status":"paid "}"#, &sig));
        assert!(!verify_hmac_signature("topsecret", body, ""));
        let hex_sig = hex::encode_upper(base64::decode(&sig).unwrap());
        assert!(verify_hmac_signature("topsecret", body, &hex_sig));
        assert!(verify_hmac_signature("topsecret", body, &hex_sig.to_lowercase()));
        assert!(!verify_hmac_signature("topsecret", body, "not a signature!"));
        // A truncated MAC is not accepted
        assert!(!verify_hmac_signature("topsecret", body, &hex_sig[..32]));
    }

    #[test]
    fn shared_tokens() {
        assert!(tokens_match("abc", "abc"));
        assert!(!tokens_match("abc", "abd"));
        assert!(!tokens_match("abc", "abcd"));
        assert!(!tokens_match("abc", ""));
    }
}
