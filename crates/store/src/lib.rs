//! Durable persistence for topics, knowledge items, related-topic edges,
//! user-query feedback, and learning sessions.

mod error;
mod schema;
mod store;

pub use error::StoreError;
pub use schema::{
    DatabaseStats, KnowledgeItem, LearningSession, NewKnowledge, NewTopic, RelatedTopicEdge,
    Topic, TopicSource, TopicStatus, UserQueryRecord,
};
pub use store::{CacheStats, KnowledgeStore};

#[cfg(test)]
mod tests;
