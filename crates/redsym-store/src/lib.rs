#![forbid(unsafe_code)]

//! The in-memory data engine: a single-threaded state machine mapping keys to
//! typed values with per-key expiry. All stored values are strings. Time is
//! threaded as `now_ms` by the caller; every touch of a key first evicts it if
//! its deadline passed, so no background sweep is needed.

use std::collections::{HashMap, HashSet, VecDeque};

use redsym_core::RedisError;
pub use redsym_core::cmd::SetMode;

/// The inner value held by a key.
#[derive(Debug, Clone, PartialEq)]
pub enum TypedValue {
    Str(String),
    List(VecDeque<String>),
    Hash(HashMap<String, String>),
    Set(HashSet<String>),
    /// Member -> score. Ordered iteration is produced on demand, ties break
    /// by member lexicographic order.
    ZSet(HashMap<String, f64>),
}

#[derive(Debug, Clone, PartialEq)]
struct Entry {
    value: TypedValue,
    expires_at_ms: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyType {
    Str,
    List,
    Hash,
    Set,
    ZSet,
}

impl KeyType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Str => "string",
            Self::List => "list",
            Self::Hash => "hash",
            Self::Set => "set",
            Self::ZSet => "zset",
        }
    }
}

/// Remaining time to live of a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ttl {
    KeyMissing,
    NoExpiry,
    RemainingMs(i64),
}

impl Ttl {
    /// The wire encoding: `-2` missing, `-1` no expiry, otherwise seconds.
    #[must_use]
    pub fn as_seconds(self) -> i64 {
        match self {
            Self::KeyMissing => -2,
            Self::NoExpiry => -1,
            Self::RemainingMs(ms) => ms / 1000,
        }
    }

    #[must_use]
    pub fn as_millis(self) -> i64 {
        match self {
            Self::KeyMissing => -2,
            Self::NoExpiry => -1,
            Self::RemainingMs(ms) => ms,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SetOptions {
    pub mode: SetMode,
    pub return_previous: bool,
    pub expire_in_ms: Option<u64>,
    pub keep_ttl: bool,
}

/// Result of a SET: either the did-store indicator or, with the GET option,
/// the previous value.
#[derive(Debug, Clone, PartialEq)]
pub enum SetOutcome {
    Stored(bool),
    Previous(Option<String>),
}

#[derive(Debug, Default)]
pub struct Store {
    entries: HashMap<String, Entry>,
}

impl Store {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn flushall(&mut self) {
        self.entries.clear();
    }

    fn drop_if_expired(&mut self, key: &str, now_ms: u64) {
        if let Some(entry) = self.entries.get(key)
            && let Some(deadline) = entry.expires_at_ms
            && deadline <= now_ms
        {
            self.entries.remove(key);
        }
    }

    /// Drops the key when its container emptied. No container type is ever
    /// stored empty (empty = absent).
    fn drop_if_hollow(&mut self, key: &str) {
        let hollow = match self.entries.get(key).map(|entry| &entry.value) {
            Some(TypedValue::List(items)) => items.is_empty(),
            Some(TypedValue::Hash(map)) => map.is_empty(),
            Some(TypedValue::Set(members)) => members.is_empty(),
            Some(TypedValue::ZSet(scores)) => scores.is_empty(),
            _ => false,
        };
        if hollow {
            self.entries.remove(key);
        }
    }

    // ── Key operations ──────────────────────────────────────────────────

    pub fn exists(&mut self, keys: &[&str], now_ms: u64) -> u64 {
        let mut count = 0_u64;
        for key in keys {
            self.drop_if_expired(key, now_ms);
            if self.entries.contains_key(*key) {
                count += 1;
            }
        }
        count
    }

    pub fn del(&mut self, keys: &[&str], now_ms: u64) -> u64 {
        let mut removed = 0_u64;
        for key in keys {
            self.drop_if_expired(key, now_ms);
            if self.entries.remove(*key).is_some() {
                removed += 1;
            }
        }
        removed
    }

    pub fn key_type(&mut self, key: &str, now_ms: u64) -> Option<KeyType> {
        self.drop_if_expired(key, now_ms);
        self.entries.get(key).map(|entry| match &entry.value {
            TypedValue::Str(_) => KeyType::Str,
            TypedValue::List(_) => KeyType::List,
            TypedValue::Hash(_) => KeyType::Hash,
            TypedValue::Set(_) => KeyType::Set,
            TypedValue::ZSet(_) => KeyType::ZSet,
        })
    }

    /// Live keys matching the glob pattern, sorted.
    pub fn keys_matching(&mut self, pattern: Option<&str>, now_ms: u64) -> Vec<String> {
        self.evict_expired(now_ms);
        let mut result: Vec<String> = self
            .entries
            .keys()
            .filter(|key| pattern.is_none_or(|pat| glob_match(pat.as_bytes(), key.as_bytes())))
            .cloned()
            .collect();
        result.sort();
        result
    }

    /// One cursor step. The cursor is an opaque string: empty or `"0"` starts
    /// a scan, anything else is the last key already served. Keys created
    /// after the first call may or may not be seen; keys alive for the whole
    /// scan are served exactly once because iteration is in sorted order.
    pub fn scan(
        &mut self,
        cursor: &str,
        pattern: Option<&str>,
        count: Option<usize>,
        now_ms: u64,
    ) -> (String, Vec<String>) {
        self.evict_expired(now_ms);
        let mut live: Vec<&String> = self.entries.keys().collect();
        live.sort();
        let after = if cursor.is_empty() || cursor == "0" {
            None
        } else {
            Some(cursor)
        };
        let step = count.unwrap_or(10).max(1);
        let mut batch: Vec<String> = Vec::new();
        let mut last_visited: Option<&String> = None;
        for key in live {
            if after.is_some_and(|bound| key.as_str() <= bound) {
                continue;
            }
            if batch.len() == step {
                break;
            }
            last_visited = Some(key);
            if pattern.is_none_or(|pat| glob_match(pat.as_bytes(), key.as_bytes())) {
                batch.push(key.clone());
            }
        }
        // Visiting fewer than `step` keys means the ordered walk is done.
        let next = match last_visited {
            Some(key) if batch.len() == step => key.clone(),
            _ => "0".to_string(),
        };
        (next, batch)
    }

    fn evict_expired(&mut self, now_ms: u64) {
        let stale: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.expires_at_ms.is_some_and(|at| at <= now_ms))
            .map(|(key, _)| key.clone())
            .collect();
        for key in stale {
            self.entries.remove(&key);
        }
    }

    /// Sets a relative deadline. A non-positive TTL deletes the key; setting
    /// a TTL on an absent key reports failure, not an error.
    pub fn pexpire(&mut self, key: &str, milliseconds: i64, now_ms: u64) -> bool {
        self.drop_if_expired(key, now_ms);
        if !self.entries.contains_key(key) {
            return false;
        }
        if milliseconds <= 0 {
            self.entries.remove(key);
            return true;
        }
        let deadline = now_ms.saturating_add(u64::try_from(milliseconds).unwrap_or(u64::MAX));
        if let Some(entry) = self.entries.get_mut(key) {
            entry.expires_at_ms = Some(deadline);
        }
        true
    }

    pub fn expire(&mut self, key: &str, seconds: i64, now_ms: u64) -> bool {
        let ms = seconds.saturating_mul(1000);
        self.pexpire(key, ms, now_ms)
    }

    /// Sets an absolute deadline in epoch milliseconds.
    pub fn pexpire_at(&mut self, key: &str, when_ms: i64, now_ms: u64) -> bool {
        self.drop_if_expired(key, now_ms);
        if !self.entries.contains_key(key) {
            return false;
        }
        if when_ms <= i64::try_from(now_ms).unwrap_or(i64::MAX) {
            self.entries.remove(key);
            return true;
        }
        let deadline = u64::try_from(when_ms).unwrap_or(u64::MAX);
        if let Some(entry) = self.entries.get_mut(key) {
            entry.expires_at_ms = Some(deadline);
        }
        true
    }

    pub fn expire_at(&mut self, key: &str, when_s: i64, now_ms: u64) -> bool {
        self.pexpire_at(key, when_s.saturating_mul(1000), now_ms)
    }

    pub fn persist(&mut self, key: &str, now_ms: u64) -> bool {
        self.drop_if_expired(key, now_ms);
        if let Some(entry) = self.entries.get_mut(key)
            && entry.expires_at_ms.is_some()
        {
            entry.expires_at_ms = None;
            return true;
        }
        false
    }

    pub fn pttl(&mut self, key: &str, now_ms: u64) -> Ttl {
        self.drop_if_expired(key, now_ms);
        let Some(entry) = self.entries.get(key) else {
            return Ttl::KeyMissing;
        };
        match entry.expires_at_ms {
            None => Ttl::NoExpiry,
            Some(deadline) => {
                let remain = deadline.saturating_sub(now_ms);
                Ttl::RemainingMs(i64::try_from(remain).unwrap_or(i64::MAX))
            }
        }
    }

    // ── String operations ───────────────────────────────────────────────

    pub fn get(&mut self, key: &str, now_ms: u64) -> Result<Option<String>, RedisError> {
        self.drop_if_expired(key, now_ms);
        match self.entries.get(key) {
            Some(entry) => match &entry.value {
                TypedValue::Str(v) => Ok(Some(v.clone())),
                _ => Err(RedisError::TypeMismatch),
            },
            None => Ok(None),
        }
    }

    pub fn set(
        &mut self,
        key: &str,
        value: String,
        opts: &SetOptions,
        now_ms: u64,
    ) -> Result<SetOutcome, RedisError> {
        self.drop_if_expired(key, now_ms);
        let (previous, prev_deadline) = match self.entries.get(key) {
            Some(entry) => match &entry.value {
                TypedValue::Str(v) => (Some(v.clone()), entry.expires_at_ms),
                _ => return Err(RedisError::TypeMismatch),
            },
            None => (None, None),
        };
        let store = match opts.mode {
            SetMode::Always => true,
            SetMode::IfExists => previous.is_some(),
            SetMode::IfMissing => previous.is_none(),
        };
        if store {
            let expires_at_ms = if opts.keep_ttl {
                prev_deadline
            } else {
                opts.expire_in_ms.map(|ttl| now_ms.saturating_add(ttl))
            };
            self.entries.insert(
                key.to_string(),
                Entry {
                    value: TypedValue::Str(value),
                    expires_at_ms,
                },
            );
        }
        if opts.return_previous {
            Ok(SetOutcome::Previous(previous))
        } else {
            Ok(SetOutcome::Stored(store))
        }
    }

    pub fn incrby(&mut self, key: &str, delta: i64, now_ms: u64) -> Result<i64, RedisError> {
        self.drop_if_expired(key, now_ms);
        let (current, expires_at_ms) = match self.entries.get(key) {
            Some(entry) => match &entry.value {
                TypedValue::Str(v) => (
                    v.trim().parse::<i64>().map_err(|_| RedisError::NotInteger)?,
                    entry.expires_at_ms,
                ),
                _ => return Err(RedisError::TypeMismatch),
            },
            None => (0_i64, None),
        };
        let next = current.checked_add(delta).ok_or(RedisError::NotInteger)?;
        self.entries.insert(
            key.to_string(),
            Entry {
                value: TypedValue::Str(next.to_string()),
                expires_at_ms,
            },
        );
        Ok(next)
    }

    pub fn incrbyfloat(&mut self, key: &str, delta: f64, now_ms: u64) -> Result<f64, RedisError> {
        self.drop_if_expired(key, now_ms);
        let (current, expires_at_ms) = match self.entries.get(key) {
            Some(entry) => match &entry.value {
                TypedValue::Str(v) => (
                    v.trim().parse::<f64>().map_err(|_| RedisError::NotFloat)?,
                    entry.expires_at_ms,
                ),
                _ => return Err(RedisError::TypeMismatch),
            },
            None => (0.0_f64, None),
        };
        let next = current + delta;
        if !next.is_finite() {
            return Err(RedisError::NotFloat);
        }
        self.entries.insert(
            key.to_string(),
            Entry {
                value: TypedValue::Str(redsym_core::value::fmt_float(next)),
                expires_at_ms,
            },
        );
        Ok(next)
    }

    // ── List operations ─────────────────────────────────────────────────

    fn list_mut(&mut self, key: &str, now_ms: u64) -> Result<&mut VecDeque<String>, RedisError> {
        self.drop_if_expired(key, now_ms);
        let entry = self.entries.entry(key.to_string()).or_insert(Entry {
            value: TypedValue::List(VecDeque::new()),
            expires_at_ms: None,
        });
        match &mut entry.value {
            TypedValue::List(items) => Ok(items),
            _ => Err(RedisError::TypeMismatch),
        }
    }

    fn list_ref(&mut self, key: &str, now_ms: u64) -> Result<Option<&VecDeque<String>>, RedisError> {
        self.drop_if_expired(key, now_ms);
        match self.entries.get(key) {
            Some(entry) => match &entry.value {
                TypedValue::List(items) => Ok(Some(items)),
                _ => Err(RedisError::TypeMismatch),
            },
            None => Ok(None),
        }
    }

    pub fn lpush(&mut self, key: &str, values: &[String], now_ms: u64) -> Result<usize, RedisError> {
        let items = self.list_mut(key, now_ms)?;
        for value in values {
            items.push_front(value.clone());
        }
        let len = items.len();
        self.drop_if_hollow(key);
        Ok(len)
    }

    pub fn rpush(&mut self, key: &str, values: &[String], now_ms: u64) -> Result<usize, RedisError> {
        let items = self.list_mut(key, now_ms)?;
        for value in values {
            items.push_back(value.clone());
        }
        let len = items.len();
        self.drop_if_hollow(key);
        Ok(len)
    }

    pub fn lpop(&mut self, key: &str, now_ms: u64) -> Result<Option<String>, RedisError> {
        let items = self.list_mut(key, now_ms)?;
        let res = items.pop_front();
        self.drop_if_hollow(key);
        Ok(res)
    }

    pub fn rpop(&mut self, key: &str, now_ms: u64) -> Result<Option<String>, RedisError> {
        let items = self.list_mut(key, now_ms)?;
        let res = items.pop_back();
        self.drop_if_hollow(key);
        Ok(res)
    }

    pub fn lpop_count(
        &mut self,
        key: &str,
        count: usize,
        now_ms: u64,
    ) -> Result<Vec<String>, RedisError> {
        let items = self.list_mut(key, now_ms)?;
        let take = count.min(items.len());
        let res: Vec<String> = items.drain(..take).collect();
        self.drop_if_hollow(key);
        Ok(res)
    }

    pub fn rpop_count(
        &mut self,
        key: &str,
        count: usize,
        now_ms: u64,
    ) -> Result<Vec<String>, RedisError> {
        let items = self.list_mut(key, now_ms)?;
        let mut res = Vec::new();
        for _ in 0..count {
            match items.pop_back() {
                Some(item) => res.push(item),
                None => break,
            }
        }
        self.drop_if_hollow(key);
        Ok(res)
    }

    pub fn llen(&mut self, key: &str, now_ms: u64) -> Result<usize, RedisError> {
        Ok(self.list_ref(key, now_ms)?.map_or(0, VecDeque::len))
    }

    pub fn lrange(
        &mut self,
        key: &str,
        start: i64,
        stop: i64,
        now_ms: u64,
    ) -> Result<Vec<String>, RedisError> {
        let Some(items) = self.list_ref(key, now_ms)? else {
            return Ok(Vec::new());
        };
        let len = items.len() as i64;
        let (lo, hi) = clamp_range(start, stop, len);
        Ok(items
            .iter()
            .skip(lo)
            .take(hi.saturating_sub(lo))
            .cloned()
            .collect())
    }

    pub fn lindex(&mut self, key: &str, index: i64, now_ms: u64) -> Result<Option<String>, RedisError> {
        let Some(items) = self.list_ref(key, now_ms)? else {
            return Ok(None);
        };
        let len = items.len() as i64;
        let ix = if index < 0 { len + index } else { index };
        if ix < 0 || ix >= len {
            return Ok(None);
        }
        Ok(items.get(ix as usize).cloned())
    }

    // ── Hash operations ─────────────────────────────────────────────────

    fn hash_mut(&mut self, key: &str, now_ms: u64) -> Result<&mut HashMap<String, String>, RedisError> {
        self.drop_if_expired(key, now_ms);
        let entry = self.entries.entry(key.to_string()).or_insert(Entry {
            value: TypedValue::Hash(HashMap::new()),
            expires_at_ms: None,
        });
        match &mut entry.value {
            TypedValue::Hash(map) => Ok(map),
            _ => Err(RedisError::TypeMismatch),
        }
    }

    fn hash_ref(&mut self, key: &str, now_ms: u64) -> Result<Option<&HashMap<String, String>>, RedisError> {
        self.drop_if_expired(key, now_ms);
        match self.entries.get(key) {
            Some(entry) => match &entry.value {
                TypedValue::Hash(map) => Ok(Some(map)),
                _ => Err(RedisError::TypeMismatch),
            },
            None => Ok(None),
        }
    }

    pub fn hset(
        &mut self,
        key: &str,
        pairs: &[(String, String)],
        now_ms: u64,
    ) -> Result<u64, RedisError> {
        let map = self.hash_mut(key, now_ms)?;
        let mut added = 0_u64;
        for (field, value) in pairs {
            if map.insert(field.clone(), value.clone()).is_none() {
                added += 1;
            }
        }
        self.drop_if_hollow(key);
        Ok(added)
    }

    pub fn hget(&mut self, key: &str, field: &str, now_ms: u64) -> Result<Option<String>, RedisError> {
        Ok(self.hash_ref(key, now_ms)?.and_then(|map| map.get(field).cloned()))
    }

    pub fn hdel(&mut self, key: &str, fields: &[&str], now_ms: u64) -> Result<u64, RedisError> {
        let map = self.hash_mut(key, now_ms)?;
        let mut removed = 0_u64;
        for field in fields {
            if map.remove(*field).is_some() {
                removed += 1;
            }
        }
        self.drop_if_hollow(key);
        Ok(removed)
    }

    pub fn hgetall(&mut self, key: &str, now_ms: u64) -> Result<Vec<(String, String)>, RedisError> {
        let Some(map) = self.hash_ref(key, now_ms)? else {
            return Ok(Vec::new());
        };
        let mut pairs: Vec<(String, String)> =
            map.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        pairs.sort();
        Ok(pairs)
    }

    pub fn hkeys(&mut self, key: &str, now_ms: u64) -> Result<Vec<String>, RedisError> {
        let Some(map) = self.hash_ref(key, now_ms)? else {
            return Ok(Vec::new());
        };
        let mut fields: Vec<String> = map.keys().cloned().collect();
        fields.sort();
        Ok(fields)
    }

    /// Values in sorted order, matching the order every backend reports.
    pub fn hvals(&mut self, key: &str, now_ms: u64) -> Result<Vec<String>, RedisError> {
        let Some(map) = self.hash_ref(key, now_ms)? else {
            return Ok(Vec::new());
        };
        let mut values: Vec<String> = map.values().cloned().collect();
        values.sort();
        Ok(values)
    }

    pub fn hmget(
        &mut self,
        key: &str,
        fields: &[&str],
        now_ms: u64,
    ) -> Result<Vec<Option<String>>, RedisError> {
        let map = self.hash_ref(key, now_ms)?;
        Ok(fields
            .iter()
            .map(|field| map.and_then(|m| m.get(*field).cloned()))
            .collect())
    }

    pub fn hincrby(
        &mut self,
        key: &str,
        field: &str,
        delta: f64,
        now_ms: u64,
    ) -> Result<f64, RedisError> {
        let map = self.hash_mut(key, now_ms)?;
        let current = match map.get(field) {
            Some(v) => v.trim().parse::<f64>().map_err(|_| RedisError::NotFloat)?,
            None => 0.0,
        };
        let next = current + delta;
        if !next.is_finite() {
            return Err(RedisError::NotFloat);
        }
        map.insert(field.to_string(), redsym_core::value::fmt_float(next));
        Ok(next)
    }

    // ── Set operations ──────────────────────────────────────────────────

    fn set_mut(&mut self, key: &str, now_ms: u64) -> Result<&mut HashSet<String>, RedisError> {
        self.drop_if_expired(key, now_ms);
        let entry = self.entries.entry(key.to_string()).or_insert(Entry {
            value: TypedValue::Set(HashSet::new()),
            expires_at_ms: None,
        });
        match &mut entry.value {
            TypedValue::Set(members) => Ok(members),
            _ => Err(RedisError::TypeMismatch),
        }
    }

    fn set_ref(&mut self, key: &str, now_ms: u64) -> Result<Option<&HashSet<String>>, RedisError> {
        self.drop_if_expired(key, now_ms);
        match self.entries.get(key) {
            Some(entry) => match &entry.value {
                TypedValue::Set(members) => Ok(Some(members)),
                _ => Err(RedisError::TypeMismatch),
            },
            None => Ok(None),
        }
    }

    pub fn sadd(&mut self, key: &str, values: &[String], now_ms: u64) -> Result<u64, RedisError> {
        let members = self.set_mut(key, now_ms)?;
        let mut added = 0_u64;
        for value in values {
            if members.insert(value.clone()) {
                added += 1;
            }
        }
        self.drop_if_hollow(key);
        Ok(added)
    }

    pub fn srem(&mut self, key: &str, values: &[&str], now_ms: u64) -> Result<u64, RedisError> {
        let members = self.set_mut(key, now_ms)?;
        let mut removed = 0_u64;
        for value in values {
            if members.remove(*value) {
                removed += 1;
            }
        }
        self.drop_if_hollow(key);
        Ok(removed)
    }

    pub fn sismember(&mut self, key: &str, value: &str, now_ms: u64) -> Result<bool, RedisError> {
        Ok(self
            .set_ref(key, now_ms)?
            .is_some_and(|members| members.contains(value)))
    }

    pub fn scard(&mut self, key: &str, now_ms: u64) -> Result<usize, RedisError> {
        Ok(self.set_ref(key, now_ms)?.map_or(0, HashSet::len))
    }

    /// Members in sorted order (the engine has no insertion order to offer).
    pub fn smembers(&mut self, key: &str, now_ms: u64) -> Result<Vec<String>, RedisError> {
        let Some(members) = self.set_ref(key, now_ms)? else {
            return Ok(Vec::new());
        };
        let mut res: Vec<String> = members.iter().cloned().collect();
        res.sort();
        Ok(res)
    }

    // ── Sorted-set operations ───────────────────────────────────────────

    fn zset_mut(&mut self, key: &str, now_ms: u64) -> Result<&mut HashMap<String, f64>, RedisError> {
        self.drop_if_expired(key, now_ms);
        let entry = self.entries.entry(key.to_string()).or_insert(Entry {
            value: TypedValue::ZSet(HashMap::new()),
            expires_at_ms: None,
        });
        match &mut entry.value {
            TypedValue::ZSet(scores) => Ok(scores),
            _ => Err(RedisError::TypeMismatch),
        }
    }

    fn zset_ref(&mut self, key: &str, now_ms: u64) -> Result<Option<&HashMap<String, f64>>, RedisError> {
        self.drop_if_expired(key, now_ms);
        match self.entries.get(key) {
            Some(entry) => match &entry.value {
                TypedValue::ZSet(scores) => Ok(Some(scores)),
                _ => Err(RedisError::TypeMismatch),
            },
            None => Ok(None),
        }
    }

    pub fn zadd(
        &mut self,
        key: &str,
        entries: &[(String, f64)],
        now_ms: u64,
    ) -> Result<u64, RedisError> {
        let scores = self.zset_mut(key, now_ms)?;
        let mut added = 0_u64;
        for (member, score) in entries {
            if scores.insert(member.clone(), *score).is_none() {
                added += 1;
            }
        }
        self.drop_if_hollow(key);
        Ok(added)
    }

    pub fn zrem(&mut self, key: &str, members: &[&str], now_ms: u64) -> Result<u64, RedisError> {
        let scores = self.zset_mut(key, now_ms)?;
        let mut removed = 0_u64;
        for member in members {
            if scores.remove(*member).is_some() {
                removed += 1;
            }
        }
        self.drop_if_hollow(key);
        Ok(removed)
    }

    pub fn zscore(&mut self, key: &str, member: &str, now_ms: u64) -> Result<Option<f64>, RedisError> {
        Ok(self.zset_ref(key, now_ms)?.and_then(|scores| scores.get(member).copied()))
    }

    pub fn zcard(&mut self, key: &str, now_ms: u64) -> Result<usize, RedisError> {
        Ok(self.zset_ref(key, now_ms)?.map_or(0, HashMap::len))
    }

    pub fn zrange(
        &mut self,
        key: &str,
        start: i64,
        stop: i64,
        now_ms: u64,
    ) -> Result<Vec<String>, RedisError> {
        let Some(scores) = self.zset_ref(key, now_ms)? else {
            return Ok(Vec::new());
        };
        let order = sorted_members(scores);
        let len = order.len() as i64;
        let (lo, hi) = clamp_range(start, stop, len);
        Ok(order
            .into_iter()
            .skip(lo)
            .take(hi.saturating_sub(lo))
            .collect())
    }

    pub fn zpop_min(
        &mut self,
        key: &str,
        count: usize,
        now_ms: u64,
    ) -> Result<Vec<(String, f64)>, RedisError> {
        self.zpop(key, count, now_ms, false)
    }

    pub fn zpop_max(
        &mut self,
        key: &str,
        count: usize,
        now_ms: u64,
    ) -> Result<Vec<(String, f64)>, RedisError> {
        self.zpop(key, count, now_ms, true)
    }

    fn zpop(
        &mut self,
        key: &str,
        count: usize,
        now_ms: u64,
        from_max: bool,
    ) -> Result<Vec<(String, f64)>, RedisError> {
        let scores = self.zset_mut(key, now_ms)?;
        let mut order = sorted_members(scores);
        if from_max {
            order.reverse();
        }
        let mut res = Vec::new();
        for member in order.into_iter().take(count) {
            if let Some(score) = scores.remove(&member) {
                res.push((member, score));
            }
        }
        self.drop_if_hollow(key);
        Ok(res)
    }
}

/// Members sorted by `(score, member)`, the tie order every range and pop
/// operation observes.
fn sorted_members(scores: &HashMap<String, f64>) -> Vec<String> {
    let mut order: Vec<&String> = scores.keys().collect();
    order.sort_by(|a, b| {
        scores[*a]
            .partial_cmp(&scores[*b])
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.cmp(b))
    });
    order.into_iter().cloned().collect()
}

/// Resolves a Redis start/stop pair (stop inclusive, negatives from the end)
/// into a half-open `[lo, hi)` index window.
fn clamp_range(start: i64, stop: i64, len: i64) -> (usize, usize) {
    let lo = if start < 0 { (len + start).max(0) } else { start };
    let hi = if stop < 0 { len + stop } else { stop.min(len - 1) };
    if lo >= len || hi < lo {
        return (0, 0);
    }
    (lo as usize, (hi + 1) as usize)
}

/// Redis-style glob: `*`, `?`, `[...]` classes with `^`/`!` negation and
/// ranges, `\` escapes.
#[must_use]
pub fn glob_match(pattern: &[u8], text: &[u8]) -> bool {
    match_at(pattern, text)
}

fn match_at(pattern: &[u8], text: &[u8]) -> bool {
    let mut p = 0;
    let mut t = 0;
    while p < pattern.len() {
        match pattern[p] {
            b'*' => {
                while p + 1 < pattern.len() && pattern[p + 1] == b'*' {
                    p += 1;
                }
                if p + 1 == pattern.len() {
                    return true;
                }
                for skip in t..=text.len() {
                    if match_at(&pattern[p + 1..], &text[skip..]) {
                        return true;
                    }
                }
                return false;
            }
            b'?' => {
                if t >= text.len() {
                    return false;
                }
                t += 1;
                p += 1;
            }
            b'[' => {
                let Some((matched, next_p)) = match_class(&pattern[p..], text.get(t).copied())
                else {
                    return false;
                };
                if !matched {
                    return false;
                }
                t += 1;
                p += next_p;
            }
            b'\\' if p + 1 < pattern.len() => {
                if t >= text.len() || text[t] != pattern[p + 1] {
                    return false;
                }
                t += 1;
                p += 2;
            }
            ch => {
                if t >= text.len() || text[t] != ch {
                    return false;
                }
                t += 1;
                p += 1;
            }
        }
    }
    t == text.len()
}

/// Matches one `[...]` class against an optional character. Returns the match
/// result and the pattern length consumed, or `None` on a malformed class.
fn match_class(pattern: &[u8], ch: Option<u8>) -> Option<(bool, usize)> {
    let ch = ch?;
    let mut i = 1;
    let negate = pattern.get(i).is_some_and(|c| *c == b'^' || *c == b'!');
    if negate {
        i += 1;
    }
    let mut matched = false;
    let mut first = true;
    while i < pattern.len() && (pattern[i] != b']' || first) {
        first = false;
        if pattern[i] == b'\\' && i + 1 < pattern.len() {
            if pattern[i + 1] == ch {
                matched = true;
            }
            i += 2;
        } else if i + 2 < pattern.len() && pattern[i + 1] == b'-' && pattern[i + 2] != b']' {
            let (lo, hi) = (pattern[i].min(pattern[i + 2]), pattern[i].max(pattern[i + 2]));
            if (lo..=hi).contains(&ch) {
                matched = true;
            }
            i += 3;
        } else {
            if pattern[i] == ch {
                matched = true;
            }
            i += 1;
        }
    }
    if i >= pattern.len() {
        return None;
    }
    let result = if negate { !matched } else { matched };
    Some((result, i + 1))
}

#[cfg(test)]
mod tests {
    use super::{SetMode, SetOptions, SetOutcome, Store, Ttl, glob_match};
    use redsym_core::RedisError;

    fn plain() -> SetOptions {
        SetOptions::default()
    }

    #[test]
    fn set_get_and_del() {
        let mut store = Store::new();
        store.set("k", "v".to_string(), &plain(), 100).unwrap();
        assert_eq!(store.get("k", 100).unwrap(), Some("v".to_string()));
        assert_eq!(store.del(&["k"], 100), 1);
        assert_eq!(store.get("k", 100).unwrap(), None);
    }

    #[test]
    fn set_modes_gate_the_write() {
        let mut store = Store::new();
        let nx = SetOptions {
            mode: SetMode::IfMissing,
            ..SetOptions::default()
        };
        let xx = SetOptions {
            mode: SetMode::IfExists,
            ..SetOptions::default()
        };
        assert_eq!(
            store.set("k", "a".to_string(), &xx, 0).unwrap(),
            SetOutcome::Stored(false)
        );
        assert_eq!(
            store.set("k", "a".to_string(), &nx, 0).unwrap(),
            SetOutcome::Stored(true)
        );
        assert_eq!(
            store.set("k", "b".to_string(), &nx, 0).unwrap(),
            SetOutcome::Stored(false)
        );
        assert_eq!(store.get("k", 0).unwrap(), Some("a".to_string()));
    }

    #[test]
    fn set_get_option_returns_previous() {
        let mut store = Store::new();
        let get = SetOptions {
            return_previous: true,
            ..SetOptions::default()
        };
        assert_eq!(
            store.set("k", "a".to_string(), &get, 0).unwrap(),
            SetOutcome::Previous(None)
        );
        assert_eq!(
            store.set("k", "b".to_string(), &get, 0).unwrap(),
            SetOutcome::Previous(Some("a".to_string()))
        );
    }

    #[test]
    fn keep_ttl_preserves_the_deadline() {
        let mut store = Store::new();
        let with_ttl = SetOptions {
            expire_in_ms: Some(5_000),
            ..SetOptions::default()
        };
        let keep = SetOptions {
            keep_ttl: true,
            ..SetOptions::default()
        };
        store.set("k", "a".to_string(), &with_ttl, 1_000).unwrap();
        store.set("k", "b".to_string(), &keep, 2_000).unwrap();
        assert_eq!(store.pttl("k", 2_000), Ttl::RemainingMs(4_000));
        store.set("k", "c".to_string(), &plain(), 2_000).unwrap();
        assert_eq!(store.pttl("k", 2_000), Ttl::NoExpiry);
    }

    #[test]
    fn incrby_rejects_non_integers() {
        let mut store = Store::new();
        assert_eq!(store.incrby("n", 3, 0).unwrap(), 3);
        assert_eq!(store.incrby("n", -1, 0).unwrap(), 2);
        store.set("s", "abc".to_string(), &plain(), 0).unwrap();
        assert_eq!(store.incrby("s", 1, 0), Err(RedisError::NotInteger));
        store.set("f", "2.5".to_string(), &plain(), 0).unwrap();
        assert_eq!(store.incrby("f", 1, 0), Err(RedisError::NotInteger));
        assert_eq!(store.incrbyfloat("f", 0.5, 0).unwrap(), 3.0);
        assert_eq!(store.get("f", 0).unwrap(), Some("3".to_string()));
    }

    #[test]
    fn wrong_type_access_is_rejected() {
        let mut store = Store::new();
        store.set("k", "v".to_string(), &plain(), 0).unwrap();
        assert_eq!(
            store.lpush("k", &["x".to_string()], 0),
            Err(RedisError::TypeMismatch)
        );
        assert_eq!(store.hget("k", "f", 0), Err(RedisError::TypeMismatch));
        store.rpush("l", &["x".to_string()], 0).unwrap();
        assert_eq!(store.get("l", 0), Err(RedisError::TypeMismatch));
    }

    #[test]
    fn pop_on_missing_key_is_none_and_leaves_no_key() {
        let mut store = Store::new();
        assert_eq!(store.lpop("missing", 0).unwrap(), None);
        assert_eq!(store.rpop("missing", 0).unwrap(), None);
        assert_eq!(store.exists(&["missing"], 0), 0);
    }

    #[test]
    fn emptied_containers_disappear() {
        let mut store = Store::new();
        store.rpush("l", &["a".to_string()], 0).unwrap();
        assert_eq!(store.lpop("l", 0).unwrap(), Some("a".to_string()));
        assert_eq!(store.exists(&["l"], 0), 0);

        store
            .hset("h", &[("f".to_string(), "v".to_string())], 0)
            .unwrap();
        assert_eq!(store.hdel("h", &["f"], 0).unwrap(), 1);
        assert_eq!(store.exists(&["h"], 0), 0);

        store.sadd("s", &["m".to_string()], 0).unwrap();
        assert_eq!(store.srem("s", &["m"], 0).unwrap(), 1);
        assert_eq!(store.exists(&["s"], 0), 0);

        store.zadd("z", &[("m".to_string(), 1.0)], 0).unwrap();
        assert_eq!(store.zpop_min("z", 1, 0).unwrap().len(), 1);
        assert_eq!(store.exists(&["z"], 0), 0);
    }

    #[test]
    fn lrange_honors_negative_indices() {
        let mut store = Store::new();
        let values: Vec<String> = ["a", "b", "c", "d"].iter().map(|s| s.to_string()).collect();
        store.rpush("l", &values, 0).unwrap();
        assert_eq!(store.lrange("l", 0, -1, 0).unwrap(), values);
        assert_eq!(
            store.lrange("l", -2, -1, 0).unwrap(),
            vec!["c".to_string(), "d".to_string()]
        );
        assert_eq!(store.lrange("l", 2, 1, 0).unwrap(), Vec::<String>::new());
        assert_eq!(store.lrange("l", 9, 12, 0).unwrap(), Vec::<String>::new());
    }

    #[test]
    fn lindex_resolves_from_both_ends() {
        let mut store = Store::new();
        let values: Vec<String> = ["a", "b", "c"].iter().map(|s| s.to_string()).collect();
        store.rpush("l", &values, 0).unwrap();
        assert_eq!(store.lindex("l", 0, 0).unwrap(), Some("a".to_string()));
        assert_eq!(store.lindex("l", -1, 0).unwrap(), Some("c".to_string()));
        assert_eq!(store.lindex("l", 5, 0).unwrap(), None);
        assert_eq!(store.lindex("l", -5, 0).unwrap(), None);
    }

    #[test]
    fn zset_orders_ties_by_member() {
        let mut store = Store::new();
        store
            .zadd(
                "z",
                &[
                    ("b".to_string(), 1.0),
                    ("a".to_string(), 1.0),
                    ("c".to_string(), 0.5),
                ],
                0,
            )
            .unwrap();
        assert_eq!(
            store.zrange("z", 0, -1, 0).unwrap(),
            vec!["c".to_string(), "a".to_string(), "b".to_string()]
        );
        assert_eq!(
            store.zpop_min("z", 2, 0).unwrap(),
            vec![("c".to_string(), 0.5), ("a".to_string(), 1.0)]
        );
        assert_eq!(
            store.zpop_max("z", 1, 0).unwrap(),
            vec![("b".to_string(), 1.0)]
        );
    }

    #[test]
    fn expire_and_ttl_lifecycle() {
        let mut store = Store::new();
        store.set("k", "v".to_string(), &plain(), 1_000).unwrap();
        assert!(store.pexpire("k", 5_000, 1_000));
        assert_eq!(store.pttl("k", 1_000), Ttl::RemainingMs(5_000));
        assert!(store.persist("k", 1_000));
        assert_eq!(store.pttl("k", 1_000), Ttl::NoExpiry);
        assert!(store.pexpire("k", 500, 1_000));
        assert_eq!(store.pttl("k", 1_501), Ttl::KeyMissing);
        assert_eq!(store.exists(&["k"], 1_501), 0);
    }

    #[test]
    fn non_positive_expire_deletes_immediately() {
        for ms in [0_i64, -1, -500] {
            let mut store = Store::new();
            store.set("k", "v".to_string(), &plain(), 1_000).unwrap();
            assert!(store.pexpire("k", ms, 1_000));
            assert_eq!(store.get("k", 1_000).unwrap(), None);
        }
    }

    #[test]
    fn expire_on_missing_key_fails_without_error() {
        let mut store = Store::new();
        assert!(!store.pexpire("missing", 1_000, 0));
        assert!(!store.expire_at("missing", 10, 0));
        assert_eq!(store.pttl("missing", 0), Ttl::KeyMissing);
    }

    #[test]
    fn scan_walks_every_stable_key_once() {
        let mut store = Store::new();
        for i in 0..25 {
            store
                .set(&format!("key:{i:02}"), "v".to_string(), &plain(), 0)
                .unwrap();
        }
        let mut seen = Vec::new();
        let mut cursor = "0".to_string();
        loop {
            let (next, batch) = store.scan(&cursor, None, Some(7), 0);
            seen.extend(batch);
            if next == "0" {
                break;
            }
            cursor = next;
        }
        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), 25);
    }

    #[test]
    fn scan_filters_with_match_pattern() {
        let mut store = Store::new();
        store.set("a:1", "v".to_string(), &plain(), 0).unwrap();
        store.set("a:2", "v".to_string(), &plain(), 0).unwrap();
        store.set("b:1", "v".to_string(), &plain(), 0).unwrap();
        let (_, batch) = store.scan("0", Some("a:*"), Some(100), 0);
        assert_eq!(batch, vec!["a:1".to_string(), "a:2".to_string()]);
    }

    #[test]
    fn glob_patterns() {
        assert!(glob_match(b"*", b"anything"));
        assert!(glob_match(b"a?c", b"abc"));
        assert!(!glob_match(b"a?c", b"ac"));
        assert!(glob_match(b"user:*:name", b"user:42:name"));
        assert!(glob_match(b"[ab]x", b"ax"));
        assert!(!glob_match(b"[^ab]x", b"ax"));
        assert!(glob_match(b"[a-c]x", b"bx"));
        assert!(glob_match(b"a\\*b", b"a*b"));
        assert!(!glob_match(b"a\\*b", b"axb"));
    }
}
