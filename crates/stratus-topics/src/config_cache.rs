//! Advisory cache for topic configuration.
//!
//! Grabbing a topic config from the broker is expensive and configs change
//! infrequently, so successful reads are kept for a short while. Entries
//! expire from write time; mutation paths never invalidate explicitly, they
//! write through by inserting the fresh config under the same key. Missing
//! topics are not cached.

use std::time::Duration;

use moka::sync::Cache;

use stratus_common::TopicProperties;

pub struct TopicConfigCache {
    cache: Cache<String, TopicProperties>,
}

impl TopicConfigCache {
    pub fn new(max_capacity: u64, ttl: Duration) -> Self {
        Self {
            cache: Cache::builder()
                .max_capacity(max_capacity)
                .time_to_live(ttl)
                .build(),
        }
    }

    /// Best-effort read; `None` on miss or after expiry.
    pub fn get(&self, topic: &str) -> Option<TopicProperties> {
        self.cache.get(topic)
    }

    /// Last-writer-wins insert.
    pub fn insert(&self, topic: &str, props: TopicProperties) {
        self.cache.insert(topic.to_string(), props);
    }
}
