//! Named conversations remembered between runs.
//!
//! The file is plain JSON, or an AES-256-GCM envelope when a key is configured:
//! ```json
//! { "nonce": "<base64>", "ciphertext": "<base64>", "version": 1 }
//! ```

use crate::config::{ EngineConfig, ModelKind };
use crate::conversation::ConversationEngine;
use crate::error::{ ChatError, ChatResult };
use aes_gcm::{ aead::{ Aead, KeyInit }, Aes256Gcm, Nonce };
use base64::{ engine::general_purpose::STANDARD as BASE64, Engine };
use log::debug;
use rand::RngCore;
use serde::{ Deserialize, Serialize };
use sha2::{ Digest, Sha256 };
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{ Path, PathBuf };

const NONCE_SIZE: usize = 12;
const ENVELOPE_VERSION: u8 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredConversation {
    pub conversation_id: String,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub model: Option<ModelKind>,
}

impl StoredConversation {
    /// `None` until the conversation has a server identifier.
    pub fn from_engine(engine: &ConversationEngine) -> Option<Self> {
        Some(Self {
            conversation_id: engine.conversation_id()?.to_string(),
            parent_id: engine.parent_id().map(str::to_string),
            model: engine.model(),
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct EncryptedData {
    nonce: String,
    ciphertext: String,
    version: u8,
}

pub struct SessionStore {
    path: PathBuf,
    key: Option<[u8; 32]>,
    conversations: BTreeMap<String, StoredConversation>,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>, passphrase: Option<&str>) -> Self {
        Self {
            path: path.into(),
            key: passphrase.map(derive_key),
            conversations: BTreeMap::new(),
        }
    }

    /// `None` when no data file is configured.
    pub async fn from_config(config: &EngineConfig) -> ChatResult<Option<Self>> {
        let Some(path) = config.data_path.as_deref() else {
            return Ok(None);
        };
        let mut store = Self::new(path, config.data_key.as_deref());
        store.load().await?;
        Ok(Some(store))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replaces the in-memory map with the file's contents. A missing file
    /// reads as empty.
    pub async fn load(&mut self) -> ChatResult<()> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No session data at {}, starting empty", self.path.display());
                self.conversations.clear();
                return Ok(());
            }
            Err(e) => {
                return Err(e.into());
            }
        };

        let plaintext = match &self.key {
            Some(key) => decrypt(key, &serde_json::from_slice(&bytes)?)?,
            None => bytes,
        };
        self.conversations = serde_json::from_slice(&plaintext)?;
        debug!("Loaded {} stored conversation(s)", self.conversations.len());
        Ok(())
    }

    pub async fn save(&self) -> ChatResult<()> {
        let plaintext = serde_json::to_vec_pretty(&self.conversations)?;
        let bytes = match &self.key {
            Some(key) => serde_json::to_vec(&encrypt(key, &plaintext)?)?,
            None => plaintext,
        };
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.path, bytes).await?;
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&StoredConversation> {
        self.conversations.get(name)
    }

    pub fn put(&mut self, name: impl Into<String>, conversation: StoredConversation) {
        self.conversations.insert(name.into(), conversation);
    }

    pub fn remove(&mut self, name: &str) -> Option<StoredConversation> {
        self.conversations.remove(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.conversations.keys().map(String::as_str)
    }
}

fn derive_key(passphrase: &str) -> [u8; 32] {
    Sha256::digest(passphrase.as_bytes()).into()
}

fn encrypt(key: &[u8; 32], plaintext: &[u8]) -> ChatResult<EncryptedData> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|e| ChatError::Crypto(e.to_string()))?;

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| ChatError::Crypto(format!("Encryption failed: {}", e)))?;

    Ok(EncryptedData {
        nonce: BASE64.encode(nonce_bytes),
        ciphertext: BASE64.encode(ciphertext),
        version: ENVELOPE_VERSION,
    })
}

fn decrypt(key: &[u8; 32], encrypted: &EncryptedData) -> ChatResult<Vec<u8>> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|e| ChatError::Crypto(e.to_string()))?;

    let nonce_bytes = BASE64
        .decode(&encrypted.nonce)
        .map_err(|e| ChatError::Crypto(format!("Invalid nonce encoding: {}", e)))?;
    if nonce_bytes.len() != NONCE_SIZE {
        return Err(ChatError::Crypto(format!("Nonce must be {} bytes", NONCE_SIZE)));
    }
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = BASE64
        .decode(&encrypted.ciphertext)
        .map_err(|e| ChatError::Crypto(format!("Invalid ciphertext encoding: {}", e)))?;

    cipher
        .decrypt(nonce, ciphertext.as_ref())
        .map_err(|e| ChatError::Crypto(format!("Decryption failed: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> StoredConversation {
        StoredConversation {
            conversation_id: "c-1".to_string(),
            parent_id: Some("m-7".to_string()),
            model: Some(ModelKind::Gpt4),
        }
    }

    #[test]
    fn wrong_key_fails() {
        let encrypted = encrypt(&derive_key("right"), b"secret").unwrap();
        assert_eq!(encrypted.version, ENVELOPE_VERSION);
        assert!(matches!(decrypt(&derive_key("wrong"), &encrypted), Err(ChatError::Crypto(_))));
        assert_eq!(decrypt(&derive_key("right"), &encrypted).unwrap(), b"secret");
    }

    #[tokio::test]
    async fn missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = SessionStore::new(dir.path().join("absent.json"), None);
        store.load().await.unwrap();
        assert_eq!(store.names().count(), 0);
    }

    #[tokio::test]
    async fn plain_store_persists_as_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("sessions.json");

        let mut store = SessionStore::new(&path, None);
        store.put("work", sample());
        store.save().await.unwrap();

        let raw: serde_json::Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(raw["work"]["conversation_id"], "c-1");
        assert_eq!(raw["work"]["model"], "gpt-4");

        let mut reloaded = SessionStore::new(&path, None);
        reloaded.load().await.unwrap();
        assert_eq!(reloaded.get("work"), Some(&sample()));
    }

    #[tokio::test]
    async fn encrypted_store_needs_the_same_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sessions.enc");

        let mut store = SessionStore::new(&path, Some("hunter2"));
        store.put("work", sample());
        store.save().await.unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(!text.contains("c-1"));

        let mut reloaded = SessionStore::new(&path, Some("hunter2"));
        reloaded.load().await.unwrap();
        assert_eq!(reloaded.get("work"), Some(&sample()));

        let mut wrong = SessionStore::new(&path, Some("letmein"));
        assert!(matches!(wrong.load().await, Err(ChatError::Crypto(_))));
    }

    #[tokio::test]
    async fn remove_forgets_name() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = SessionStore::new(dir.path().join("s.json"), None);
        store.put("a", sample());
        assert!(store.remove("a").is_some());
        assert!(store.get("a").is_none());
    }
}
