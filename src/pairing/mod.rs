use std::time::Duration;

use serde_json::Value;
use tokio::time::sleep;

use crate::api::{ApiError, InstanceApi};

/// Upper bound on pairing rounds before the final unconditional attempt.
pub const PAIR_MAX_ROUNDS: usize = 10;

/// Candidate key names checked by the extractor, in priority order.
const PAIRING_CODE_KEYS: [&str; 5] = ["PairingCode", "pairingCode", "pairing_code", "code", "Code"];

/// Recursion bound for the extractor; natural payloads nest one or two
/// levels under `data`.
const MAX_EXTRACT_DEPTH: usize = 10;

/// Strips every non-digit character from a raw phone input.
pub fn normalize_digits(raw: &str) -> String {
    raw.chars().filter(char::is_ascii_digit).collect()
}

/// Builds the alternate candidate by toggling the mobile prefix digit after
/// the two-digit area code.
///
/// `"4199999999"` gains a `9` and `"41999999999"` loses one; this covers the
/// gateway's ambiguity between legacy 8-digit and current 9-digit mobile
/// numbers. Callers validate a minimum length of 10 digits first.
pub fn alternate_phone(phone: &str) -> String {
    if phone.len() < 2 {
        return phone.to_owned();
    }

    let (area, rest) = phone.split_at(2);
    if rest.starts_with('9') && rest.len() == 9 {
        format!("{area}{}", &rest[1..])
    } else {
        format!("{area}9{rest}")
    }
}

/// Deep-searches an arbitrarily shaped payload for a pairing code.
///
/// Checks the known key variants at each level and recurses into a nested
/// `data` object. Non-object input yields an empty string.
pub fn extract_pairing_code(payload: &Value) -> String {
    extract_at_depth(payload, 0)
}

fn extract_at_depth(payload: &Value, depth: usize) -> String {
    if depth >= MAX_EXTRACT_DEPTH {
        return String::new();
    }

    let Value::Object(fields) = payload else {
        return String::new();
    };

    for key in PAIRING_CODE_KEYS {
        if let Some(code) = fields.get(key).and_then(Value::as_str)
            && !code.is_empty()
        {
            return code.to_owned();
        }
    }

    match fields.get("data") {
        Some(nested) => extract_at_depth(nested, depth + 1),
        None => String::new(),
    }
}

/// Requests a pairing code, retrying over the primary and alternate phone
/// candidates until one attempt yields a non-empty code.
///
/// Per-attempt failures count as "no code" and the loop moves on. After the
/// rounds are exhausted a single unconditional attempt with the primary
/// candidate is made and its outcome is returned as-is, errors included.
pub async fn request_pairing(
    api: &dyn InstanceApi,
    token: &str,
    phone: &str,
    retry_delay: Duration,
) -> Result<Value, ApiError> {
    let candidates = [phone.to_owned(), alternate_phone(phone)];

    for round in 0..PAIR_MAX_ROUNDS {
        for number in &candidates {
            match api.pair_phone(token, number).await {
                Ok(payload) => {
                    if !extract_pairing_code(&payload).is_empty() {
                        return Ok(payload);
                    }
                }
                Err(error) => {
                    tracing::warn!(round = round + 1, number = %number, error = %error, "pair attempt failed");
                }
            }
        }

        if round < PAIR_MAX_ROUNDS - 1 {
            sleep(retry_delay).await;
        }
    }

    tracing::warn!("pairing rounds exhausted, issuing final attempt");
    api.pair_phone(token, phone).await
}

#[cfg(test)]
mod tests {
    use serde_json::{Value, json};

    use super::{alternate_phone, extract_pairing_code, normalize_digits};

    #[test]
    fn normalize_strips_non_digits() {
        assert_eq!(normalize_digits("+55 (41) 99999-9999"), "5541999999999");
        assert_eq!(normalize_digits("41999999999"), "41999999999");
        assert_eq!(normalize_digits(""), "");
    }

    #[test]
    fn alternate_toggles_the_mobile_prefix() {
        assert_eq!(alternate_phone("4199999999"), "41999999999");
        assert_eq!(alternate_phone("41999999999"), "4199999999");
    }

    #[test]
    fn alternate_round_trips_for_both_lengths() {
        for phone in ["4199999999", "41999999999", "1188887777", "11988887777"] {
            assert_eq!(alternate_phone(&alternate_phone(phone)), phone);
        }
    }

    #[test]
    fn extractor_checks_key_variants_at_top_level() {
        assert_eq!(extract_pairing_code(&json!({ "PairingCode": "123" })), "123");
        assert_eq!(extract_pairing_code(&json!({ "pairing_code": "321" })), "321");
    }

    #[test]
    fn extractor_recurses_into_data() {
        assert_eq!(extract_pairing_code(&json!({ "data": { "code": "456" } })), "456");
        assert_eq!(
            extract_pairing_code(&json!({ "data": { "data": { "Code": "789" } } })),
            "789"
        );
    }

    #[test]
    fn extractor_handles_missing_and_non_object_input() {
        assert_eq!(extract_pairing_code(&json!({})), "");
        assert_eq!(extract_pairing_code(&Value::Null), "");
        assert_eq!(extract_pairing_code(&json!("123")), "");
        assert_eq!(extract_pairing_code(&json!({ "PairingCode": "" })), "");
        assert_eq!(extract_pairing_code(&json!({ "data": "not-an-object" })), "");
    }

    #[test]
    fn extractor_prefers_earlier_key_variants() {
        let payload = json!({ "code": "low", "PairingCode": "high" });
        assert_eq!(extract_pairing_code(&payload), "high");
    }

    #[test]
    fn extractor_stops_at_the_depth_bound() {
        let mut payload = json!({ "PairingCode": "buried" });
        for _ in 0..12 {
            payload = json!({ "data": payload });
        }
        assert_eq!(extract_pairing_code(&payload), "");
    }
}
