//! # Memberships
//!
//! There are no accounts, so "which channels have I joined" and "which polls
//! have I voted on" belong to a client, not a user. Clients identify
//! themselves with an opaque `X-Client-Id` header.
//!
//! Both are id sets behind [`KvStore`] so the backing store can be swapped:
//! Redis sets in deployments, a map in tests and local runs. Every set
//! operation is a single command, so concurrent joins from one client agree
//! on which of them actually changed the set.
//!
//! ## Keys
//! - `fridge_joined_channels:<client>`: set of channel ids
//! - `fridge_voted_polls:<client>`: set of poll ids
//!
//! Voted flags are advisory. A vote is recorded whether or not the flag is
//! already set.
use std::{
    collections::{BTreeSet, HashMap},
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use redis::{
    AsyncCommands, Client,
    aio::{ConnectionManager, ConnectionManagerConfig},
};
use thiserror::Error;
use tokio::sync::Mutex;

use crate::models::{ChannelId, PollId};

pub const JOINED_CHANNELS_KEY: &str = "fridge_joined_channels";
pub const VOTED_POLLS_KEY: &str = "fridge_voted_polls";

const MAX_CLIENT_ID_LEN: usize = 128;

#[derive(Error, Debug)]
pub enum KvError {
    #[error("redis: {0}")]
    Redis(#[from] redis::RedisError),
}

/// Integer sets keyed by string. `add` and `remove` report whether the set
/// changed and must do so atomically.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn add(&self, key: &str, member: i64) -> Result<bool, KvError>;

    async fn remove(&self, key: &str, member: i64) -> Result<bool, KvError>;

    /// Ascending.
    async fn members(&self, key: &str) -> Result<Vec<i64>, KvError>;

    async fn contains(&self, key: &str, member: i64) -> Result<bool, KvError>;
}

pub struct RedisKv {
    connection: ConnectionManager,
}

impl RedisKv {
    pub async fn connect(redis_url: &str) -> Result<Self, KvError> {
        let config = ConnectionManagerConfig::new()
            .set_number_of_retries(1)
            .set_connection_timeout(Duration::from_millis(100));

        let client = Client::open(redis_url)?;
        let connection = client.get_connection_manager_with_config(config).await?;

        Ok(Self { connection })
    }
}

#[async_trait]
impl KvStore for RedisKv {
    async fn add(&self, key: &str, member: i64) -> Result<bool, KvError> {
        let mut connection = self.connection.clone();
        let added: i64 = connection.sadd(key, member).await?;

        Ok(added > 0)
    }

    async fn remove(&self, key: &str, member: i64) -> Result<bool, KvError> {
        let mut connection = self.connection.clone();
        let removed: i64 = connection.srem(key, member).await?;

        Ok(removed > 0)
    }

    async fn members(&self, key: &str) -> Result<Vec<i64>, KvError> {
        let mut connection = self.connection.clone();
        let mut members: Vec<i64> = connection.smembers(key).await?;
        members.sort_unstable();

        Ok(members)
    }

    async fn contains(&self, key: &str, member: i64) -> Result<bool, KvError> {
        let mut connection = self.connection.clone();

        Ok(connection.sismember(key, member).await?)
    }
}

/// Each operation runs under one lock, which gives the same atomicity as the
/// single Redis commands.
#[derive(Default)]
pub struct MemoryKv {
    sets: Mutex<HashMap<String, BTreeSet<i64>>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for MemoryKv {
    async fn add(&self, key: &str, member: i64) -> Result<bool, KvError> {
        let mut sets = self.sets.lock().await;

        Ok(sets.entry(key.to_string()).or_default().insert(member))
    }

    async fn remove(&self, key: &str, member: i64) -> Result<bool, KvError> {
        let mut sets = self.sets.lock().await;

        let Some(set) = sets.get_mut(key) else {
            return Ok(false);
        };
        let removed = set.remove(&member);

        // Redis drops empty sets
        if set.is_empty() {
            sets.remove(key);
        }

        Ok(removed)
    }

    async fn members(&self, key: &str) -> Result<Vec<i64>, KvError> {
        let sets = self.sets.lock().await;

        Ok(sets
            .get(key)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default())
    }

    async fn contains(&self, key: &str, member: i64) -> Result<bool, KvError> {
        let sets = self.sets.lock().await;

        Ok(sets.get(key).is_some_and(|set| set.contains(&member)))
    }
}

/// Accepts 1 to 128 characters of `[A-Za-z0-9_-]`.
pub fn valid_client_id(client_id: &str) -> bool {
    !client_id.is_empty()
        && client_id.len() <= MAX_CLIENT_ID_LEN
        && client_id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

/// One id set per client under a shared key prefix.
#[derive(Clone)]
struct IdSet {
    kv: Arc<dyn KvStore>,
    prefix: &'static str,
}

impl IdSet {
    fn key(&self, client_id: &str) -> String {
        format!("{}:{client_id}", self.prefix)
    }

    async fn list(&self, client_id: &str) -> Result<Vec<i64>, KvError> {
        self.kv.members(&self.key(client_id)).await
    }

    async fn insert(&self, client_id: &str, id: i64) -> Result<bool, KvError> {
        self.kv.add(&self.key(client_id), id).await
    }

    async fn remove(&self, client_id: &str, id: i64) -> Result<bool, KvError> {
        self.kv.remove(&self.key(client_id), id).await
    }

    async fn contains(&self, client_id: &str, id: i64) -> Result<bool, KvError> {
        self.kv.contains(&self.key(client_id), id).await
    }
}

#[derive(Clone)]
pub struct JoinedChannels {
    set: IdSet,
}

impl JoinedChannels {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self {
            set: IdSet {
                kv,
                prefix: JOINED_CHANNELS_KEY,
            },
        }
    }

    pub async fn list(&self, client_id: &str) -> Result<Vec<ChannelId>, KvError> {
        self.set.list(client_id).await
    }

    /// Returns `false` when the client had already joined.
    pub async fn join(&self, client_id: &str, channel_id: ChannelId) -> Result<bool, KvError> {
        self.set.insert(client_id, channel_id).await
    }

    /// Returns `false` when the client was not a member.
    pub async fn leave(&self, client_id: &str, channel_id: ChannelId) -> Result<bool, KvError> {
        self.set.remove(client_id, channel_id).await
    }
}

#[derive(Clone)]
pub struct VotedPolls {
    set: IdSet,
}

impl VotedPolls {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self {
            set: IdSet {
                kv,
                prefix: VOTED_POLLS_KEY,
            },
        }
    }

    pub async fn mark(&self, client_id: &str, poll_id: PollId) -> Result<(), KvError> {
        self.set.insert(client_id, poll_id).await.map(|_| ())
    }

    pub async fn has_voted(&self, client_id: &str, poll_id: PollId) -> Result<bool, KvError> {
        self.set.contains(client_id, poll_id).await
    }
}
