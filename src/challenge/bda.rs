use super::crypt::{ self, EncryptedPayload };
use super::fingerprint::{
    enhanced_fingerprint,
    prepare_f,
    prepare_fe,
    ChallengeSite,
    Fingerprint,
    KeyValue,
};
use super::murmur::x64hash128;
use crate::error::{ ChatError, ChatResult };
use base64::{ engine::general_purpose::STANDARD, Engine };
use chrono::Utc;
use rand::Rng;
use serde_json::{ json, Value };

/// Key material rotates every six hours.
pub const TIME_BUCKET_SECS: i64 = 21_600;

const JS_ENGINE_DESCRIPTOR: &str = r#"{"HL":4,"DT":"","NWD":"false","DOTO":1,"DMTO":1}"#;

pub fn time_bucket(unix_secs: i64) -> i64 {
    unix_secs - unix_secs.rem_euclid(TIME_BUCKET_SECS)
}

/// `user_agent` followed by the bucket start, as decimal.
pub fn key_material(user_agent: &str, unix_secs: i64) -> String {
    format!("{}{}", user_agent, time_bucket(unix_secs))
}

fn random_hex32() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill(&mut bytes[..]);
    hex::encode(bytes)
}

/// Plaintext browser-data record, in field order.
pub fn browser_data(
    fingerprint: &Fingerprint,
    user_agent: &str,
    site: &ChallengeSite,
    unix_secs: i64
) -> Vec<KeyValue> {
    let fe = prepare_fe(fingerprint);
    let ife_hash = x64hash128(&fe.join(", "), 38);

    vec![
        KeyValue::new("api_type", "js"),
        KeyValue::new("p", 1),
        KeyValue::new("f", x64hash128(&prepare_f(fingerprint), 31)),
        KeyValue::new("n", STANDARD.encode(unix_secs.to_string())),
        KeyValue::new("wh", format!("{}|{}", random_hex32(), random_hex32())),
        KeyValue::new("enhanced_fp", json!(enhanced_fingerprint(fingerprint, user_agent, site))),
        KeyValue::new("fe", json!(fe)),
        KeyValue::new("ife_hash", ife_hash),
        KeyValue::new("cs", 1),
        KeyValue::new("jsbd", JS_ENGINE_DESCRIPTOR)
    ]
}

/// Encrypted, base64-wrapped `bda` form value for a fresh fingerprint.
pub fn build_bda(user_agent: &str, site: &ChallengeSite) -> ChatResult<String> {
    build_bda_at(&Fingerprint::random(), user_agent, site, Utc::now().timestamp())
}

pub fn build_bda_at(
    fingerprint: &Fingerprint,
    user_agent: &str,
    site: &ChallengeSite,
    unix_secs: i64
) -> ChatResult<String> {
    let record = browser_data(fingerprint, user_agent, site, unix_secs);
    let plaintext = serde_json::to_string(&record)?;
    let encrypted = crypt::encrypt(&plaintext, &key_material(user_agent, unix_secs));
    Ok(STANDARD.encode(encrypted.to_json()?))
}

/// Reverses [`build_bda_at`] for a known user agent and time.
pub fn open_bda(bda: &str, user_agent: &str, unix_secs: i64) -> ChatResult<Vec<KeyValue>> {
    let wrapped = STANDARD
        .decode(bda)
        .map_err(|e| ChatError::Crypto(format!("bda is not base64: {}", e)))?;
    let wrapped = String::from_utf8(wrapped).map_err(|e| ChatError::Crypto(e.to_string()))?;
    let payload = EncryptedPayload::from_json(&wrapped)?;
    let plaintext = crypt::decrypt(&payload, &key_material(user_agent, unix_secs))?;
    Ok(serde_json::from_str(&plaintext)?)
}

pub fn field<'a>(record: &'a [KeyValue], key: &str) -> Option<&'a Value> {
    record
        .iter()
        .find(|entry| entry.key == key)
        .map(|entry| &entry.value)
}
