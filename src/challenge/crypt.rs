use crate::error::{ ChatError, ChatResult };
use aes::cipher::{ block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit };
use base64::{ engine::general_purpose::STANDARD, Engine };
use md5::{ Digest, Md5 };
use rand::Rng;
use serde::{ Deserialize, Serialize };

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

const SALT_LEN: usize = 8;

/// Wire shape of an encrypted challenge payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedPayload {
    /// base64 ciphertext
    pub ct: String,
    /// hex IV
    pub iv: String,
    /// hex of the ASCII salt
    pub s: String,
}

impl EncryptedPayload {
    pub fn to_json(&self) -> ChatResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(raw: &str) -> ChatResult<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn salt(&self) -> ChatResult<String> {
        let bytes = hex::decode(&self.s).map_err(|e| ChatError::Crypto(format!("bad salt: {}", e)))?;
        String::from_utf8(bytes).map_err(|e| ChatError::Crypto(format!("bad salt: {}", e)))
    }
}

pub fn random_salt() -> String {
    let mut rng = rand::thread_rng();
    (0..SALT_LEN)
        .map(|_| rng.gen_range(b'a'..=b'z') as char)
        .collect()
}

/// Three rounds of `md5(previous ‖ key ‖ salt)`; the first 32 bytes are the
/// AES key, the last 16 the IV.
pub fn derive_key_iv(key_material: &str, salt: &str) -> ([u8; 32], [u8; 16]) {
    let mut salted = Vec::with_capacity(48);
    let mut previous: Vec<u8> = Vec::new();
    for _ in 0..3 {
        let mut hasher = Md5::new();
        hasher.update(&previous);
        hasher.update(key_material.as_bytes());
        hasher.update(salt.as_bytes());
        previous = hasher.finalize().to_vec();
        salted.extend_from_slice(&previous);
    }

    let mut key = [0u8; 32];
    let mut iv = [0u8; 16];
    key.copy_from_slice(&salted[..32]);
    iv.copy_from_slice(&salted[32..48]);
    (key, iv)
}

pub fn encrypt(plaintext: &str, key_material: &str) -> EncryptedPayload {
    encrypt_with_salt(plaintext, key_material, &random_salt())
}

pub fn encrypt_with_salt(plaintext: &str, key_material: &str, salt: &str) -> EncryptedPayload {
    let (key, iv) = derive_key_iv(key_material, salt);
    let ciphertext = Aes256CbcEnc::new(&key.into(), &iv.into())
        .encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());

    EncryptedPayload {
        ct: STANDARD.encode(ciphertext),
        iv: hex::encode(iv),
        s: hex::encode(salt.as_bytes()),
    }
}

pub fn decrypt(payload: &EncryptedPayload, key_material: &str) -> ChatResult<String> {
    let salt = payload.salt()?;
    let (key, iv) = derive_key_iv(key_material, &salt);
    if hex::encode(iv) != payload.iv.to_lowercase() {
        return Err(ChatError::Crypto("IV does not match the derived key material".to_string()));
    }

    let ciphertext = STANDARD
        .decode(&payload.ct)
        .map_err(|e| ChatError::Crypto(format!("bad ciphertext encoding: {}", e)))?;
    let plaintext = Aes256CbcDec::new(&key.into(), &iv.into())
        .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext)
        .map_err(|_| ChatError::Crypto("bad padding".to_string()))?;

    String::from_utf8(plaintext).map_err(|e| ChatError::Crypto(format!("plaintext is not UTF-8: {}", e)))
}
