//! Consumers, consumer groups, and the group's N:M consumer/plugin links.

use super::common::{foreign_eq, tags_equal, EqualOpts, ForeignRef, SemanticEq, Timestamps};
use crate::entity::Entity;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Consumer {
    pub id: String,
    pub username: Option<String>,
    pub custom_id: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(flatten)]
    pub timestamps: Timestamps,
}

impl Entity for Consumer {
    fn kind(&self) -> &'static str {
        "consumer"
    }
    fn id(&self) -> &str {
        &self.id
    }
    fn endpoint_key(&self) -> Option<&str> {
        self.username.as_deref().or(self.custom_id.as_deref())
    }
    fn tags(&self) -> &[String] {
        &self.tags
    }
}

impl SemanticEq for Consumer {
    fn equal_with_opts(&self, other: &Self, opts: &EqualOpts) -> bool {
        (opts.ignore_id || self.id == other.id)
            && self.username == other.username
            && self.custom_id == other.custom_id
            && tags_equal(&self.tags, &other.tags)
            && (opts.ignore_timestamps || self.timestamps == other.timestamps)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ConsumerGroup {
    pub id: String,
    pub name: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(flatten)]
    pub timestamps: Timestamps,
}

impl Entity for ConsumerGroup {
    fn kind(&self) -> &'static str {
        "consumer_group"
    }
    fn id(&self) -> &str {
        &self.id
    }
    fn endpoint_key(&self) -> Option<&str> {
        self.name.as_deref()
    }
    fn tags(&self) -> &[String] {
        &self.tags
    }
}

impl SemanticEq for ConsumerGroup {
    fn equal_with_opts(&self, other: &Self, opts: &EqualOpts) -> bool {
        (opts.ignore_id || self.id == other.id)
            && self.name == other.name
            && tags_equal(&self.tags, &other.tags)
            && (opts.ignore_timestamps || self.timestamps == other.timestamps)
    }
}

/// `(consumer_group_id, consumer_id)` unique N:M link; also indexable by
/// the consumer's username/custom_id.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ConsumerGroupConsumer {
    pub id: String,
    pub consumer_group: ForeignRef,
    pub consumer: ForeignRef,
}

impl Entity for ConsumerGroupConsumer {
    fn kind(&self) -> &'static str {
        "consumer_group_consumer"
    }
    fn id(&self) -> &str {
        &self.id
    }
}

/// A consumer-group-scoped plugin override (distinct from a plugin whose
/// `consumer_group` field is set — this is the group's own plugin list as
/// returned by `GET /consumer_groups/{name}`).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ConsumerGroupPlugin {
    pub id: String,
    pub name: String,
    pub consumer_group: ForeignRef,
    #[serde(default)]
    pub config: serde_json::Map<String, serde_json::Value>,
}

impl Entity for ConsumerGroupPlugin {
    fn kind(&self) -> &'static str {
        "consumer_group_plugin"
    }
    fn id(&self) -> &str {
        &self.id
    }
}

impl SemanticEq for ConsumerGroupPlugin {
    fn equal_with_opts(&self, other: &Self, opts: &EqualOpts) -> bool {
        (opts.ignore_id || self.id == other.id)
            && self.name == other.name
            && foreign_eq(&Some(self.consumer_group.clone()), &Some(other.consumer_group.clone()), opts)
            && self.config == other.config
    }
}

impl SemanticEq for ConsumerGroupConsumer {
    fn equal_with_opts(&self, other: &Self, opts: &EqualOpts) -> bool {
        (opts.ignore_id || self.id == other.id)
            && foreign_eq(&Some(self.consumer_group.clone()), &Some(other.consumer_group.clone()), opts)
            && foreign_eq(&Some(self.consumer.clone()), &Some(other.consumer.clone()), opts)
    }
}
