use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use bytes::Bytes;
use chrono::Utc;
use proven_log_store::{EntryId, Error, GroupStart, StreamEntry};
use tokio::time::Instant;

type Fields = Vec<(String, Bytes)>;

#[derive(Debug, Default)]
pub struct State {
    hashes: HashMap<String, Hash>,
    streams: HashMap<String, Stream>,
}

#[derive(Debug)]
struct Hash {
    expires_at: Option<Instant>,
    fields: Fields,
}

#[derive(Debug, Default)]
struct Stream {
    entries: BTreeMap<EntryId, Fields>,
    groups: HashMap<String, Group>,
    last_id: EntryId,
}

#[derive(Debug)]
struct Group {
    last_delivered: EntryId,
    pending: BTreeMap<EntryId, Pending>,
}

#[derive(Debug)]
struct Pending {
    consumer: String,
    delivered_at: Instant,
    delivery_count: u32,
}

impl Pending {
    fn new(consumer: &str) -> Self {
        Self {
            consumer: consumer.to_string(),
            delivered_at: Instant::now(),
            delivery_count: 1,
        }
    }
}

impl Stream {
    fn next_id(&self) -> EntryId {
        let now = u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0);

        if now > self.last_id.millis {
            EntryId::new(now, 0)
        } else {
            self.last_id.successor()
        }
    }
}

impl State {
    pub fn append(&mut self, stream: &str, fields: Fields) -> EntryId {
        let stream = self.streams.entry(stream.to_string()).or_default();
        let id = stream.next_id();

        stream.entries.insert(id, fields);
        stream.last_id = id;

        id
    }

    pub fn create_group(
        &mut self,
        stream_key: &str,
        group: &str,
        start: GroupStart,
    ) -> Result<(), Error> {
        let stream = self
            .streams
            .get_mut(stream_key)
            .ok_or_else(|| Error::StreamNotFound(stream_key.to_string()))?;

        let last_delivered = match start {
            GroupStart::Beginning => EntryId::ZERO,
            GroupStart::Latest => stream.last_id,
        };

        stream
            .groups
            .entry(group.to_string())
            .or_insert_with(|| Group {
                last_delivered,
                pending: BTreeMap::new(),
            });

        Ok(())
    }

    pub fn read_group(
        &mut self,
        stream_key: &str,
        group_name: &str,
        consumer: &str,
        count: usize,
    ) -> Result<Vec<StreamEntry>, Error> {
        let (entries, group) = self.group_mut(stream_key, group_name)?;

        let delivered: Vec<StreamEntry> = entries
            .range(group.last_delivered.successor()..)
            .take(count)
            .map(|(id, fields)| StreamEntry {
                id: *id,
                fields: fields.clone(),
            })
            .collect();

        for entry in &delivered {
            group.pending.insert(entry.id, Pending::new(consumer));
        }
        if let Some(last) = delivered.last() {
            group.last_delivered = last.id;
        }

        Ok(delivered)
    }

    pub fn ack(&mut self, stream_key: &str, group_name: &str, id: EntryId) -> Result<bool, Error> {
        let (_, group) = self.group_mut(stream_key, group_name)?;

        Ok(group.pending.remove(&id).is_some())
    }

    pub fn claim_stale(
        &mut self,
        stream_key: &str,
        group_name: &str,
        consumer: &str,
        min_idle: Duration,
        count: usize,
    ) -> Result<Vec<StreamEntry>, Error> {
        let (entries, group) = self.group_mut(stream_key, group_name)?;
        let now = Instant::now();
        let mut claimed = Vec::new();

        for (id, pending) in &mut group.pending {
            if claimed.len() >= count {
                break;
            }
            if now.duration_since(pending.delivered_at) < min_idle {
                continue;
            }

            pending.consumer = consumer.to_string();
            pending.delivered_at = now;
            pending.delivery_count += 1;

            if let Some(fields) = entries.get(id) {
                claimed.push(StreamEntry {
                    id: *id,
                    fields: fields.clone(),
                });
            }
        }

        Ok(claimed)
    }

    pub fn range(
        &self,
        stream_key: &str,
        from: EntryId,
        to: EntryId,
        count: usize,
    ) -> Vec<StreamEntry> {
        if from > to {
            return Vec::new();
        }

        self.streams
            .get(stream_key)
            .map(|stream| {
                stream
                    .entries
                    .range(from..=to)
                    .take(count)
                    .map(|(id, fields)| StreamEntry {
                        id: *id,
                        fields: fields.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn hash_set(&mut self, key: &str, fields: Fields, ttl: Option<Duration>) {
        self.hashes.insert(
            key.to_string(),
            Hash {
                expires_at: ttl.map(|ttl| Instant::now() + ttl),
                fields,
            },
        );
    }

    pub fn hash_get_all(&mut self, key: &str) -> Fields {
        let expired = self
            .hashes
            .get(key)
            .and_then(|hash| hash.expires_at)
            .is_some_and(|expires_at| Instant::now() >= expires_at);

        if expired {
            self.hashes.remove(key);
            return Vec::new();
        }

        self.hashes
            .get(key)
            .map(|hash| hash.fields.clone())
            .unwrap_or_default()
    }

    pub fn stream_len(&self, stream_key: &str) -> usize {
        self.streams
            .get(stream_key)
            .map_or(0, |stream| stream.entries.len())
    }

    pub fn pending_ids(&self, stream_key: &str, group_name: &str) -> Vec<EntryId> {
        self.streams
            .get(stream_key)
            .and_then(|stream| stream.groups.get(group_name))
            .map(|group| group.pending.keys().copied().collect())
            .unwrap_or_default()
    }

    pub fn pending_consumer(
        &self,
        stream_key: &str,
        group_name: &str,
        id: EntryId,
    ) -> Option<String> {
        self.streams
            .get(stream_key)
            .and_then(|stream| stream.groups.get(group_name))
            .and_then(|group| group.pending.get(&id))
            .map(|pending| pending.consumer.clone())
    }

    pub fn delivery_count(
        &self,
        stream_key: &str,
        group_name: &str,
        id: EntryId,
    ) -> Option<u32> {
        self.streams
            .get(stream_key)
            .and_then(|stream| stream.groups.get(group_name))
            .and_then(|group| group.pending.get(&id))
            .map(|pending| pending.delivery_count)
    }

    fn group_mut(
        &mut self,
        stream_key: &str,
        group_name: &str,
    ) -> Result<(&BTreeMap<EntryId, Fields>, &mut Group), Error> {
        let Stream { entries, groups, .. } = self
            .streams
            .get_mut(stream_key)
            .ok_or_else(|| Error::StreamNotFound(stream_key.to_string()))?;

        let group = groups
            .get_mut(group_name)
            .ok_or_else(|| Error::GroupNotFound {
                stream: stream_key.to_string(),
                group: group_name.to_string(),
            })?;

        Ok((entries, group))
    }
}
