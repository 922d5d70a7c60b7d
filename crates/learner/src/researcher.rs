use anyhow::Result;
use async_trait::async_trait;

use thor_retrieve::{Candidate, Retriever};

/// The worker-facing face of retrieval.  The production implementation is
/// [`Retriever`]; tests substitute scripted researchers.
#[async_trait]
pub trait TopicResearcher: Send + Sync {
    async fn research(&self, topic: &str) -> Result<Vec<Candidate>>;
}

#[async_trait]
impl TopicResearcher for Retriever {
    async fn research(&self, topic: &str) -> Result<Vec<Candidate>> {
        Ok(self.search(topic).await)
    }
}
