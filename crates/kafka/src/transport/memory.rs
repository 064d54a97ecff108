//! In-process broker with partitioned topics and consumer groups.
//!
//! Partitions of a topic are split round-robin over the members of a group
//! and recomputed whenever a member joins or leaves. A partition that moves
//! to a new owner is redelivered from the group's committed position, so
//! delivery is at-least-once, the same as against a real cluster.

use async_trait::async_trait;
use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, HashMap};
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::{mpsc, Mutex, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{
    ConsumedRecord, ConsumerChannels, ConsumerTransport, Delivery, Notification, ProducerTransport,
    TopicPartition,
};
use crate::error::TransportError;

pub const DEFAULT_PARTITIONS: i32 = 3;
const SIDE_CHANNEL_CAPACITY: usize = 64;

/// (group id, topic)
type GroupKey = (String, String);

struct StoredRecord {
    key: Vec<u8>,
    value: Vec<u8>,
    timestamp: Option<i64>,
}

struct Member {
    partitions: Vec<i32>,
    wake: Arc<Notify>,
    errors: mpsc::Sender<TransportError>,
    notifications: mpsc::Sender<Notification>,
}

#[derive(Default)]
struct Group {
    members: BTreeMap<u64, Member>,
    committed: HashMap<i32, i64>,
    /// Next offset to hand to the owning member, per partition.
    dispatched: HashMap<i32, i64>,
}

#[derive(Default)]
struct BrokerState {
    topics: HashMap<String, Vec<Vec<StoredRecord>>>,
    groups: HashMap<GroupKey, Group>,
    next_member_id: u64,
    fail_commits: bool,
}

impl BrokerState {
    fn ensure_topic(&mut self, topic: &str, partitions: i32) -> i32 {
        let log = self
            .topics
            .entry(topic.to_string())
            .or_insert_with(|| (0..partitions.max(1)).map(|_| Vec::new()).collect());
        log.len() as i32
    }

    fn next_for(&mut self, key: &GroupKey, member_id: u64) -> Option<ConsumedRecord> {
        let group = self.groups.get_mut(key)?;
        let member = group.members.get(&member_id)?;
        let log = self.topics.get(&key.1)?;

        for &partition in &member.partitions {
            let cursor = group.dispatched.entry(partition).or_insert(0);
            let stored = log
                .get(partition as usize)
                .and_then(|records| records.get(*cursor as usize));
            if let Some(stored) = stored {
                let record = ConsumedRecord {
                    topic: key.1.clone(),
                    partition,
                    offset: *cursor,
                    key: Some(stored.key.clone()),
                    value: Some(stored.value.clone()),
                    timestamp: stored.timestamp,
                };
                *cursor += 1;
                return Some(record);
            }
        }
        None
    }
}

fn partition_for(key: &[u8], partitions: i32) -> i32 {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    (hasher.finish() % partitions.max(1) as u64) as i32
}

fn now_millis() -> Option<i64> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .ok()
        .map(|d| d.as_millis() as i64)
}

/// Recompute the round-robin assignment and notify members of what changed.
fn notify(member: &Member, notification: Notification) {
    if let Err(e) = member.notifications.try_send(notification) {
        warn!("Dropping rebalance notification: {e}");
    }
}

fn rebalance(group: &mut Group, topic: &str, partitions: i32) {
    let ids: Vec<u64> = group.members.keys().copied().collect();
    let mut assignment: HashMap<u64, Vec<i32>> = HashMap::new();
    if !ids.is_empty() {
        for partition in 0..partitions {
            let owner = ids[partition as usize % ids.len()];
            assignment.entry(owner).or_default().push(partition);
        }
    }

    let tps = |ps: &[i32]| {
        ps.iter()
            .map(|p| TopicPartition::new(topic, *p))
            .collect::<Vec<_>>()
    };

    for (id, member) in group.members.iter_mut() {
        let assigned = assignment.remove(id).unwrap_or_default();
        let revoked: Vec<i32> = member
            .partitions
            .iter()
            .filter(|p| !assigned.contains(p))
            .copied()
            .collect();
        let gained: Vec<i32> = assigned
            .iter()
            .filter(|p| !member.partitions.contains(p))
            .copied()
            .collect();

        for partition in &gained {
            let committed = group.committed.get(partition).copied().unwrap_or(0);
            group.dispatched.insert(*partition, committed);
        }

        if !revoked.is_empty() {
            notify(member, Notification::Revoked(tps(&revoked)));
        }
        if !gained.is_empty() {
            notify(member, Notification::Assigned(tps(&gained)));
        }

        member.partitions = assigned;
        member.wake.notify_one();
    }
}

/// In-memory broker. Clones share the same topics and groups.
#[derive(Clone, Default)]
pub struct MemoryBroker {
    state: Arc<Mutex<BrokerState>>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create `topic` with `partitions` partitions. No-op if it exists.
    pub async fn create_topic(&self, topic: &str, partitions: i32) {
        self.state.lock().await.ensure_topic(topic, partitions);
    }

    /// Append a record to `topic`, creating it with [`DEFAULT_PARTITIONS`]
    /// partitions if needed. The partition is chosen by key hash.
    pub async fn publish(&self, topic: &str, key: &[u8], value: &[u8]) -> Delivery {
        let mut state = self.state.lock().await;
        let partitions = state.ensure_topic(topic, DEFAULT_PARTITIONS);
        let partition = partition_for(key, partitions);

        let mut offset = 0;
        if let Some(log) = state
            .topics
            .get_mut(topic)
            .and_then(|log| log.get_mut(partition as usize))
        {
            offset = log.len() as i64;
            log.push(StoredRecord {
                key: key.to_vec(),
                value: value.to_vec(),
                timestamp: now_millis(),
            });
        }

        for ((_, group_topic), group) in state.groups.iter() {
            if group_topic == topic {
                for member in group.members.values() {
                    member.wake.notify_one();
                }
            }
        }

        debug!("Published to {topic}[{partition}] at offset {offset}");
        Delivery { partition, offset }
    }

    /// Join `group_id` on `topic` and start delivering its partitions.
    pub async fn subscribe(
        &self,
        group_id: &str,
        topic: &str,
        capacity: usize,
    ) -> (MemoryConsumerTransport, ConsumerChannels) {
        let (message_tx, messages) = mpsc::channel(capacity.max(1));
        let (error_tx, errors) = mpsc::channel(SIDE_CHANNEL_CAPACITY);
        let (notification_tx, notifications) = mpsc::channel(SIDE_CHANNEL_CAPACITY);

        let key: GroupKey = (group_id.to_string(), topic.to_string());
        let wake = Arc::new(Notify::new());
        let shutdown = CancellationToken::new();

        let member_id = {
            let mut state = self.state.lock().await;
            let partitions = state.ensure_topic(topic, DEFAULT_PARTITIONS);
            let member_id = state.next_member_id;
            state.next_member_id += 1;

            let group = state.groups.entry(key.clone()).or_default();
            group.members.insert(
                member_id,
                Member {
                    partitions: Vec::new(),
                    wake: wake.clone(),
                    errors: error_tx,
                    notifications: notification_tx,
                },
            );
            rebalance(group, topic, partitions);
            member_id
        };
        info!("Member {member_id} joined group '{group_id}' on topic '{topic}'");

        tokio::spawn(pump(
            self.state.clone(),
            key.clone(),
            member_id,
            wake,
            shutdown.clone(),
            message_tx,
        ));

        let transport = MemoryConsumerTransport {
            state: self.state.clone(),
            key,
            member_id,
            shutdown,
        };
        let channels = ConsumerChannels {
            messages,
            errors,
            notifications,
        };
        (transport, channels)
    }

    /// Deliver a transport error to every member of `group_id`.
    pub async fn report_error(&self, group_id: &str, message: &str) {
        let state = self.state.lock().await;
        for ((group, _), members) in state.groups.iter() {
            if group == group_id {
                for member in members.members.values() {
                    if let Err(e) = member.errors.try_send(TransportError::from(message.to_string())) {
                        warn!("Dropping transport error for group '{group_id}': {e}");
                    }
                }
            }
        }
    }

    /// Make every subsequent commit fail until reset.
    pub async fn fail_commits(&self, fail: bool) {
        self.state.lock().await.fail_commits = fail;
    }

    /// Committed position of `group_id` for a partition of `topic`.
    pub async fn committed_offset(&self, group_id: &str, topic: &str, partition: i32) -> Option<i64> {
        let key: GroupKey = (group_id.to_string(), topic.to_string());
        let state = self.state.lock().await;
        state
            .groups
            .get(&key)
            .and_then(|group| group.committed.get(&partition).copied())
    }

    /// Number of records stored across all partitions of `topic`.
    pub async fn record_count(&self, topic: &str) -> usize {
        let state = self.state.lock().await;
        state
            .topics
            .get(topic)
            .map(|log| log.iter().map(Vec::len).sum())
            .unwrap_or(0)
    }

    pub fn producer(&self) -> MemoryProducerTransport {
        MemoryProducerTransport {
            broker: self.clone(),
            closed: AtomicBool::new(false),
        }
    }
}

async fn pump(
    state: Arc<Mutex<BrokerState>>,
    key: GroupKey,
    member_id: u64,
    wake: Arc<Notify>,
    shutdown: CancellationToken,
    messages: mpsc::Sender<ConsumedRecord>,
) {
    loop {
        let next = state.lock().await.next_for(&key, member_id);
        match next {
            Some(record) => {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    sent = messages.send(record) => {
                        if sent.is_err() {
                            break;
                        }
                    }
                }
            }
            None => {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = wake.notified() => {}
                }
            }
        }
    }
    debug!("Member {member_id} delivery task stopped");
}

pub struct MemoryProducerTransport {
    broker: MemoryBroker,
    closed: AtomicBool,
}

#[async_trait]
impl ProducerTransport for MemoryProducerTransport {
    async fn send_message(
        &self,
        topic: &str,
        key: &[u8],
        value: &[u8],
    ) -> Result<Delivery, TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err("producer is closed".into());
        }
        Ok(self.broker.publish(topic, key, value).await)
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

pub struct MemoryConsumerTransport {
    state: Arc<Mutex<BrokerState>>,
    key: GroupKey,
    member_id: u64,
    shutdown: CancellationToken,
}

#[async_trait]
impl ConsumerTransport for MemoryConsumerTransport {
    async fn mark_offset(&self, record: &ConsumedRecord) -> Result<(), TransportError> {
        let mut state = self.state.lock().await;
        if state.fail_commits {
            return Err("commit rejected by broker".into());
        }
        let group = state
            .groups
            .get_mut(&self.key)
            .filter(|group| group.members.contains_key(&self.member_id))
            .ok_or("consumer is no longer a member of the group")?;

        let committed = group.committed.entry(record.partition).or_insert(0);
        *committed = (*committed).max(record.offset + 1);
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.shutdown.cancel();

        let mut state = self.state.lock().await;
        let partitions = state.topics.get(&self.key.1).map_or(0, |log| log.len() as i32);
        if let Some(group) = state.groups.get_mut(&self.key) {
            if group.members.remove(&self.member_id).is_some() {
                rebalance(group, &self.key.1, partitions);
                info!(
                    "Member {} left group '{}' on topic '{}'",
                    self.member_id, self.key.0, self.key.1
                );
            }
        }
        Ok(())
    }
}
