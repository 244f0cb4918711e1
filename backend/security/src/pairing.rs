//! Sender pairing: per-channel allowlists plus short-lived pairing codes.
//!
//! Each channel has two owner-only JSON files under the pairing directory:
//! `<channel>-allowFrom.json` (approved senders, `*` admits everyone) and
//! `<channel>-pairing.json` (pending requests). Every read-modify-write runs
//! under a per-channel lock and lands via temp file + rename.

use chrono::{DateTime, Duration, Utc};
use clawgate_config::{PairingConfig, MAX_PAIRING_TTL_MINUTES};
use clawgate_core::GateError;
use rand::Rng;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// Uppercase letters and digits without `0 O 1 I`.
pub const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Allowlist entry that admits every sender on a channel.
pub const WILDCARD: &str = "*";

const MAX_MINT_ATTEMPTS: usize = 500;
const STORE_VERSION: u32 = 1;
const MAX_CHANNEL_LEN: usize = 64;
const MAX_SENDER_LEN: usize = 256;

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairingRequest {
    /// Sender id.
    pub id: String,
    pub code: String,
    pub created_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

#[derive(Debug, Serialize, Deserialize)]
struct PairingFile {
    version: u32,
    #[serde(default)]
    requests: Vec<PairingRequest>,
}

impl Default for PairingFile {
    fn default() -> Self {
        Self { version: STORE_VERSION, requests: Vec::new() }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AllowFromFile {
    version: u32,
    #[serde(default)]
    allow_from: Vec<String>,
}

impl Default for AllowFromFile {
    fn default() -> Self {
        Self { version: STORE_VERSION, allow_from: Vec::new() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairingUpsert {
    pub code: String,
    /// False when an existing pending request was refreshed.
    pub created: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PairingApproval {
    pub sender_id: String,
    pub meta: Option<Value>,
}

#[derive(Debug, Clone)]
pub struct PairingOptions {
    pub ttl: Duration,
    pub max_pending: usize,
    pub code_length: usize,
}

impl Default for PairingOptions {
    fn default() -> Self {
        Self::from_config(&PairingConfig::default())
    }
}

impl PairingOptions {
    pub fn from_config(config: &PairingConfig) -> Self {
        Self {
            ttl: ttl_from_minutes(config.ttl_minutes),
            max_pending: config.max_pending.max(1),
            code_length: config.code_length.max(4),
        }
    }
}

/// Clamped into `1..=MAX_PAIRING_TTL_MINUTES`, so the conversion cannot
/// overflow.
fn ttl_from_minutes(minutes: u64) -> Duration {
    let minutes = minutes.clamp(1, MAX_PAIRING_TTL_MINUTES);
    i64::try_from(minutes)
        .ok()
        .and_then(Duration::try_minutes)
        .unwrap_or_else(|| Duration::hours(1))
}

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

pub fn normalize_channel_id(channel: &str) -> Result<String, GateError> {
    let normalized = channel.trim().to_ascii_lowercase();
    let valid = !normalized.is_empty()
        && normalized.len() <= MAX_CHANNEL_LEN
        && normalized
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-');
    if !valid {
        return Err(GateError::InvalidIdentifier(format!("channel id {channel:?}")));
    }
    Ok(normalized)
}

pub fn normalize_sender_id(sender: &str) -> Result<String, GateError> {
    let normalized = sender.trim();
    if normalized.is_empty()
        || normalized.len() > MAX_SENDER_LEN
        || normalized.chars().any(char::is_control)
    {
        return Err(GateError::InvalidIdentifier(format!("sender id {sender:?}")));
    }
    Ok(normalized.to_string())
}

fn normalize_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

fn generate_code(length: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| char::from(CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())]))
        .collect()
}

/// Draw a code not already held by a pending request.
fn mint_unique_code(pending: &[PairingRequest], length: usize) -> Result<String, GateError> {
    for _ in 0..MAX_MINT_ATTEMPTS {
        let candidate = generate_code(length);
        if pending.iter().all(|r| r.code != candidate) {
            return Ok(candidate);
        }
    }
    Err(GateError::PairingCapacityExceeded(format!(
        "no unique pairing code after {MAX_MINT_ATTEMPTS} attempts"
    )))
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

pub struct PairingRegistry {
    dir: PathBuf,
    options: PairingOptions,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl PairingRegistry {
    pub fn new(dir: impl Into<PathBuf>, options: PairingOptions) -> Self {
        Self { dir: dir.into(), options, locks: Mutex::new(HashMap::new()) }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn channel_lock(&self, channel: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.locks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(channel.to_string())
            .or_default()
            .clone()
    }

    fn pairing_path(&self, channel: &str) -> PathBuf {
        self.dir.join(format!("{channel}-pairing.json"))
    }

    fn allow_from_path(&self, channel: &str) -> PathBuf {
        self.dir.join(format!("{channel}-allowFrom.json"))
    }

    /// Whether `sender` may reach the pipeline on `channel`.
    pub async fn is_allowed(&self, channel: &str, sender: &str) -> Result<bool, GateError> {
        let channel = normalize_channel_id(channel)?;
        let sender = normalize_sender_id(sender)?;
        let allow: AllowFromFile = read_json(&self.allow_from_path(&channel)).await?;
        Ok(allow.allow_from.iter().any(|e| e == WILDCARD || *e == sender))
    }

    /// Register first contact from an unknown sender, or refresh an
    /// existing pending request and return its code.
    pub async fn upsert_pairing_request(
        &self,
        channel: &str,
        sender: &str,
        meta: Option<Value>,
    ) -> Result<PairingUpsert, GateError> {
        self.upsert_at(channel, sender, meta, Utc::now()).await
    }

    async fn upsert_at(
        &self,
        channel: &str,
        sender: &str,
        meta: Option<Value>,
        now: DateTime<Utc>,
    ) -> Result<PairingUpsert, GateError> {
        let channel = normalize_channel_id(channel)?;
        let sender = normalize_sender_id(sender)?;
        let lock = self.channel_lock(&channel);
        let _held = lock.lock().await;

        let path = self.pairing_path(&channel);
        let mut store: PairingFile = read_json(&path).await?;
        self.prune_expired(&mut store, now);

        if let Some(existing) = store.requests.iter_mut().find(|r| r.id == sender) {
            existing.last_seen_at = now;
            if meta.is_some() {
                existing.meta = meta;
            }
            let code = existing.code.clone();
            write_json(&self.dir, &path, &store).await?;
            debug!(channel = %channel, "[Pairing] Refreshed pending request");
            return Ok(PairingUpsert { code, created: false });
        }

        let code = mint_unique_code(&store.requests, self.options.code_length)?;
        store.requests.push(PairingRequest {
            id: sender,
            code: code.clone(),
            created_at: now,
            last_seen_at: now,
            meta,
        });
        while store.requests.len() > self.options.max_pending {
            let oldest = store
                .requests
                .iter()
                .enumerate()
                .min_by_key(|(_, r)| r.last_seen_at)
                .map(|(i, _)| i)
                .unwrap_or(0);
            let evicted = store.requests.remove(oldest);
            info!(channel = %channel, sender = %evicted.id, "[Pairing] Evicted oldest pending request");
        }
        write_json(&self.dir, &path, &store).await?;
        info!(channel = %channel, "[Pairing] New pairing request");
        Ok(PairingUpsert { code, created: true })
    }

    /// Consume a pending code and allowlist its sender. Case-insensitive
    /// and single-use; unknown or expired codes yield `None`.
    pub async fn approve_pairing_code(
        &self,
        channel: &str,
        code: &str,
    ) -> Result<Option<PairingApproval>, GateError> {
        self.approve_at(channel, code, Utc::now()).await
    }

    /// As [`PairingRegistry::approve_pairing_code`], but a code that cannot
    /// be redeemed is an error: `PairingExpired` when it belonged to a
    /// request past its TTL, `PairingCodeInvalid` otherwise.
    pub async fn redeem_pairing_code(
        &self,
        channel: &str,
        code: &str,
    ) -> Result<PairingApproval, GateError> {
        self.redeem_at(channel, code, Utc::now()).await
    }

    async fn approve_at(
        &self,
        channel: &str,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<PairingApproval>, GateError> {
        match self.redeem_at(channel, code, now).await {
            Ok(approval) => Ok(Some(approval)),
            Err(GateError::PairingExpired | GateError::PairingCodeInvalid) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn redeem_at(
        &self,
        channel: &str,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<PairingApproval, GateError> {
        let channel = normalize_channel_id(channel)?;
        let code = normalize_code(code);
        let lock = self.channel_lock(&channel);
        let _held = lock.lock().await;

        let path = self.pairing_path(&channel);
        let mut store: PairingFile = read_json(&path).await?;
        let had_code = store.requests.iter().any(|r| r.code == code);
        let pruned = self.prune_expired(&mut store, now);

        let Some(pos) = store.requests.iter().position(|r| r.code == code) else {
            if pruned {
                write_json(&self.dir, &path, &store).await?;
            }
            if had_code {
                warn!(channel = %channel, "[Pairing] Expired pairing code");
                return Err(GateError::PairingExpired);
            }
            warn!(channel = %channel, "[Pairing] Unknown pairing code");
            return Err(GateError::PairingCodeInvalid);
        };
        let request = store.requests.remove(pos);

        // Allowlist first: a crash in between leaves a stale code, never a
        // consumed code without access.
        let allow_path = self.allow_from_path(&channel);
        let mut allow: AllowFromFile = read_json(&allow_path).await?;
        if !allow.allow_from.contains(&request.id) {
            allow.allow_from.push(request.id.clone());
            write_json(&self.dir, &allow_path, &allow).await?;
        }
        write_json(&self.dir, &path, &store).await?;

        info!(channel = %channel, sender = %request.id, "[Pairing] Sender approved");
        Ok(PairingApproval { sender_id: request.id, meta: request.meta })
    }

    /// Live pending requests, oldest first.
    pub async fn list_pairing_requests(
        &self,
        channel: &str,
    ) -> Result<Vec<PairingRequest>, GateError> {
        let channel = normalize_channel_id(channel)?;
        let lock = self.channel_lock(&channel);
        let _held = lock.lock().await;

        let path = self.pairing_path(&channel);
        let mut store: PairingFile = read_json(&path).await?;
        if self.prune_expired(&mut store, Utc::now()) {
            write_json(&self.dir, &path, &store).await?;
        }
        store.requests.sort_by_key(|r| r.created_at);
        Ok(store.requests)
    }

    pub async fn read_allow_from(&self, channel: &str) -> Result<Vec<String>, GateError> {
        let channel = normalize_channel_id(channel)?;
        let allow: AllowFromFile = read_json(&self.allow_from_path(&channel)).await?;
        Ok(allow.allow_from)
    }

    /// Returns false if `entry` was already present.
    pub async fn add_allow_from(&self, channel: &str, entry: &str) -> Result<bool, GateError> {
        let channel = normalize_channel_id(channel)?;
        let entry = normalize_sender_id(entry)?;
        let lock = self.channel_lock(&channel);
        let _held = lock.lock().await;

        let path = self.allow_from_path(&channel);
        let mut allow: AllowFromFile = read_json(&path).await?;
        if allow.allow_from.contains(&entry) {
            return Ok(false);
        }
        allow.allow_from.push(entry);
        write_json(&self.dir, &path, &allow).await?;
        Ok(true)
    }

    /// Revoke an allowlist entry. Returns false if it was not present.
    pub async fn remove_allow_from(&self, channel: &str, entry: &str) -> Result<bool, GateError> {
        let channel = normalize_channel_id(channel)?;
        let entry = normalize_sender_id(entry)?;
        let lock = self.channel_lock(&channel);
        let _held = lock.lock().await;

        let path = self.allow_from_path(&channel);
        let mut allow: AllowFromFile = read_json(&path).await?;
        let before = allow.allow_from.len();
        allow.allow_from.retain(|e| *e != entry);
        if allow.allow_from.len() == before {
            return Ok(false);
        }
        write_json(&self.dir, &path, &allow).await?;
        info!(channel = %channel, entry = %entry, "[Pairing] Allowlist entry revoked");
        Ok(true)
    }

    /// Channels that have any pairing or allowlist state on disk.
    pub async fn channels(&self) -> Result<Vec<String>, GateError> {
        let mut channels = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(channels),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            let channel = name
                .strip_suffix("-pairing.json")
                .or_else(|| name.strip_suffix("-allowFrom.json"));
            if let Some(channel) = channel {
                if !channels.iter().any(|c| c == channel) {
                    channels.push(channel.to_string());
                }
            }
        }
        channels.sort();
        Ok(channels)
    }

    /// Drop requests older than the TTL. Returns whether anything changed.
    fn prune_expired(&self, store: &mut PairingFile, now: DateTime<Utc>) -> bool {
        let before = store.requests.len();
        let ttl = self.options.ttl;
        store.requests.retain(|r| now - r.created_at < ttl);
        before != store.requests.len()
    }
}

// ---------------------------------------------------------------------------
// File I/O
// ---------------------------------------------------------------------------

async fn read_json<T: DeserializeOwned + Default>(path: &Path) -> Result<T, GateError> {
    match tokio::fs::read_to_string(path).await {
        Ok(raw) if raw.trim().is_empty() => Ok(T::default()),
        Ok(raw) => serde_json::from_str(&raw).map_err(|e| {
            GateError::Other(anyhow::anyhow!("Corrupt pairing store {}: {e}", path.display()))
        }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(T::default()),
        Err(e) => Err(e.into()),
    }
}

async fn ensure_private_dir(dir: &Path) -> Result<(), GateError> {
    tokio::fs::create_dir_all(dir).await?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o700)).await?;
    }
    Ok(())
}

async fn write_json<T: Serialize>(dir: &Path, path: &Path, value: &T) -> Result<(), GateError> {
    ensure_private_dir(dir).await?;
    let body = serde_json::to_string_pretty(value)
        .map_err(|e| GateError::Other(anyhow::anyhow!("Failed to encode pairing store: {e}")))?;

    let tmp = path.with_extension(format!("{}.tmp", uuid::Uuid::new_v4().simple()));
    let mut opts = tokio::fs::OpenOptions::new();
    opts.write(true).create_new(true);
    #[cfg(unix)]
    {
        opts.mode(0o600);
    }
    let mut file = opts.open(&tmp).await?;
    file.write_all(body.as_bytes()).await?;
    file.write_all(b"\n").await?;
    file.sync_all().await?;
    drop(file);

    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry(dir: &Path) -> PairingRegistry {
        PairingRegistry::new(dir.join("credentials"), PairingOptions::default())
    }

    #[tokio::test]
    async fn test_unknown_sender_pairs_with_lowercase_code() {
        let tmp = tempfile::tempdir().unwrap();
        let reg = registry(tmp.path());

        assert!(!reg.is_allowed("telegram", "+15551230000").await.unwrap());
        let upsert = reg.upsert_pairing_request("telegram", "+15551230000", None).await.unwrap();
        assert!(upsert.created);
        assert_eq!(upsert.code.len(), 8);
        assert!(upsert.code.bytes().all(|b| CODE_ALPHABET.contains(&b)));

        let approval = reg
            .approve_pairing_code("telegram", &upsert.code.to_lowercase())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(approval.sender_id, "+15551230000");
        assert!(reg.is_allowed("telegram", "+15551230000").await.unwrap());
        assert!(reg.list_pairing_requests("telegram").await.unwrap().is_empty());
    }

    #[test]
    fn test_ttl_conversion_is_bounded() {
        let huge = PairingConfig { ttl_minutes: u64::MAX, ..PairingConfig::default() };
        let opts = PairingOptions::from_config(&huge);
        assert_eq!(opts.ttl, Duration::minutes(MAX_PAIRING_TTL_MINUTES as i64));
        assert!(opts.ttl > Duration::zero());

        let zero = PairingConfig { ttl_minutes: 0, ..PairingConfig::default() };
        assert_eq!(PairingOptions::from_config(&zero).ttl, Duration::minutes(1));
        assert_eq!(PairingOptions::default().ttl, Duration::minutes(60));
    }

    #[tokio::test]
    async fn test_code_is_single_use() {
        let tmp = tempfile::tempdir().unwrap();
        let reg = registry(tmp.path());
        let upsert = reg.upsert_pairing_request("slack", "U123", None).await.unwrap();
        assert!(reg.approve_pairing_code("slack", &upsert.code).await.unwrap().is_some());
        assert!(reg.approve_pairing_code("slack", &upsert.code).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_repeat_contact_reuses_code() {
        let tmp = tempfile::tempdir().unwrap();
        let reg = registry(tmp.path());
        let first = reg.upsert_pairing_request("telegram", "alice", None).await.unwrap();
        let second = reg
            .upsert_pairing_request("telegram", "alice", Some(serde_json::json!({"name": "Alice"})))
            .await
            .unwrap();
        assert!(first.created);
        assert!(!second.created);
        assert_eq!(first.code, second.code);

        let pending = reg.list_pairing_requests("telegram").await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].meta.as_ref().unwrap()["name"], "Alice");
    }

    #[tokio::test]
    async fn test_overflow_evicts_least_recently_seen() {
        let tmp = tempfile::tempdir().unwrap();
        let reg = registry(tmp.path());
        let t0 = Utc::now();
        for (i, sender) in ["a", "b", "c"].iter().enumerate() {
            reg.upsert_at("discord", sender, None, t0 + Duration::seconds(i as i64))
                .await
                .unwrap();
        }
        // Refresh "a" so "b" becomes the least recently seen.
        reg.upsert_at("discord", "a", None, t0 + Duration::seconds(10)).await.unwrap();
        reg.upsert_at("discord", "d", None, t0 + Duration::seconds(11)).await.unwrap();

        let ids: Vec<_> = reg
            .list_pairing_requests("discord")
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids.len(), 3);
        assert!(!ids.contains(&"b".to_string()));
        assert!(ids.contains(&"a".to_string()));
        assert!(ids.contains(&"d".to_string()));
    }

    #[tokio::test]
    async fn test_expired_code_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let reg = registry(tmp.path());
        let then = Utc::now() - Duration::minutes(61);
        let upsert = reg.upsert_at("telegram", "bob", None, then).await.unwrap();

        let approval = reg.approve_at("telegram", &upsert.code, Utc::now()).await.unwrap();
        assert!(approval.is_none());
        assert!(!reg.is_allowed("telegram", "bob").await.unwrap());

        // A fresh contact after expiry gets a new request.
        let again = reg.upsert_pairing_request("telegram", "bob", None).await.unwrap();
        assert!(again.created);
    }

    #[tokio::test]
    async fn test_redeem_distinguishes_expired_from_unknown() {
        let tmp = tempfile::tempdir().unwrap();
        let reg = registry(tmp.path());
        let then = Utc::now() - Duration::minutes(61);
        let stale = reg.upsert_at("slack", "carol", None, then).await.unwrap();

        let err = reg.redeem_at("slack", &stale.code, Utc::now()).await.unwrap_err();
        assert!(matches!(err, GateError::PairingExpired));
        // The expired request was pruned, so the same code is now unknown.
        let err = reg.redeem_pairing_code("slack", &stale.code).await.unwrap_err();
        assert!(matches!(err, GateError::PairingCodeInvalid));

        let fresh = reg.upsert_pairing_request("slack", "dave", None).await.unwrap();
        let approval = reg.redeem_pairing_code("slack", &fresh.code).await.unwrap();
        assert_eq!(approval.sender_id, "dave");
    }

    #[tokio::test]
    async fn test_wildcard_and_revocation() {
        let tmp = tempfile::tempdir().unwrap();
        let reg = registry(tmp.path());
        assert!(reg.add_allow_from("webchat", "*").await.unwrap());
        assert!(!reg.add_allow_from("webchat", "*").await.unwrap());
        assert!(reg.is_allowed("webchat", "anyone").await.unwrap());

        assert!(reg.remove_allow_from("webchat", "*").await.unwrap());
        assert!(!reg.remove_allow_from("webchat", "*").await.unwrap());
        assert!(!reg.is_allowed("webchat", "anyone").await.unwrap());
    }

    #[tokio::test]
    async fn test_channel_ids_are_normalized() {
        let tmp = tempfile::tempdir().unwrap();
        let reg = registry(tmp.path());
        reg.add_allow_from("  Telegram ", "carol").await.unwrap();
        assert!(reg.is_allowed("telegram", " carol ").await.unwrap());
        assert_eq!(reg.channels().await.unwrap(), vec!["telegram".to_string()]);

        assert!(matches!(
            reg.is_allowed("../etc", "x").await,
            Err(GateError::InvalidIdentifier(_))
        ));
        assert!(matches!(
            reg.upsert_pairing_request("telegram", "   ", None).await,
            Err(GateError::InvalidIdentifier(_))
        ));
    }

    #[tokio::test]
    async fn test_store_files_layout() {
        let tmp = tempfile::tempdir().unwrap();
        let reg = registry(tmp.path());
        let upsert = reg.upsert_pairing_request("telegram", "dave", None).await.unwrap();
        reg.approve_pairing_code("telegram", &upsert.code).await.unwrap();

        let raw = std::fs::read_to_string(reg.dir().join("telegram-allowFrom.json")).unwrap();
        let allow: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(allow["version"], 1);
        assert_eq!(allow["allowFrom"][0], "dave");

        let raw = std::fs::read_to_string(reg.dir().join("telegram-pairing.json")).unwrap();
        let pairing: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(pairing["requests"].as_array().unwrap().len(), 0);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(reg.dir().join("telegram-allowFrom.json"))
                .unwrap()
                .permissions()
                .mode();
            assert_eq!(mode & 0o777, 0o600);
            let mode = std::fs::metadata(reg.dir()).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o700);
        }
    }

    #[tokio::test]
    async fn test_concurrent_contacts_keep_every_request() {
        let tmp = tempfile::tempdir().unwrap();
        let reg = Arc::new(PairingRegistry::new(
            tmp.path().join("credentials"),
            PairingOptions { max_pending: 10, ..PairingOptions::default() },
        ));
        let mut handles = Vec::new();
        for i in 0..8 {
            let reg = reg.clone();
            handles.push(tokio::spawn(async move {
                reg.upsert_pairing_request("telegram", &format!("user{i}"), None).await.unwrap()
            }));
        }
        let mut codes = Vec::new();
        for h in handles {
            codes.push(h.await.unwrap().code);
        }
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), 8);
        assert_eq!(reg.list_pairing_requests("telegram").await.unwrap().len(), 8);
    }

    #[test]
    fn test_mint_gives_up_when_exhausted() {
        let now = Utc::now();
        // Length-1 codes over a 32-symbol alphabet, all taken.
        let taken: Vec<_> = CODE_ALPHABET
            .iter()
            .map(|b| PairingRequest {
                id: format!("s{b}"),
                code: char::from(*b).to_string(),
                created_at: now,
                last_seen_at: now,
                meta: None,
            })
            .collect();
        assert!(matches!(
            mint_unique_code(&taken, 1),
            Err(GateError::PairingCapacityExceeded(_))
        ));
    }
}
