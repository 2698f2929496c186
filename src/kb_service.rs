use std::collections::HashMap;

use anyhow::Result;
use aws_sdk_bedrockagentruntime::types::{
    KnowledgeBaseQuery, KnowledgeBaseRetrievalConfiguration, KnowledgeBaseVectorSearchConfiguration,
};

use crate::config::KbConfigs;

/// A knowledge-base hit reduced to what the chat loop needs.
#[derive(Clone, Debug, PartialEq)]
pub struct RetrievedDoc {
    pub text: String,
    pub location: String,
    pub score: f64,
}

/// Vector-search retrieval against a Bedrock knowledge base. Without a
/// selected knowledge base every query yields no documents.
#[derive(Debug)]
pub struct KbService {
    client: aws_sdk_bedrockagentruntime::Client,
    kb_id: Option<String>,
    number_of_results: i32,
}

impl KbService {
    pub fn new(
        client: &aws_sdk_bedrockagentruntime::Client,
        kb_configs: &KbConfigs,
        kb_id: Option<String>,
    ) -> Self {
        Self {
            client: client.to_owned(),
            kb_id,
            number_of_results: kb_configs.vector_search_configuration.number_of_results,
        }
    }

    pub async fn get_relevant_docs(&self, prompt: &str) -> Result<Vec<RetrievedDoc>> {
        let kb_id = match &self.kb_id {
            Some(kb_id) => kb_id,
            None => return Ok(vec![]),
        };

        let query = KnowledgeBaseQuery::builder().text(prompt).build();
        let vector_search = KnowledgeBaseVectorSearchConfiguration::builder()
            .number_of_results(self.number_of_results)
            .build();
        let retrieval_configuration = KnowledgeBaseRetrievalConfiguration::builder()
            .vector_search_configuration(vector_search)
            .build();

        let response = self
            .client
            .retrieve()
            .knowledge_base_id(kb_id)
            .retrieval_query(query)
            .retrieval_configuration(retrieval_configuration)
            .send()
            .await?;

        let docs = response
            .retrieval_results()
            .iter()
            .map(|result| RetrievedDoc {
                text: result
                    .content()
                    .map(|content| content.text().to_owned())
                    .unwrap_or_default(),
                location: result
                    .location()
                    .and_then(|location| location.s3_location())
                    .and_then(|s3| s3.uri())
                    .unwrap_or("unknown location")
                    .to_owned(),
                score: result.score().unwrap_or(0.0),
            })
            .collect();
        Ok(docs)
    }
}

/// Context string handed to the model: `Document N: <text>` per hit.
pub fn docs_to_context(docs: &[RetrievedDoc]) -> String {
    docs.iter()
        .enumerate()
        .map(|(index, doc)| format!("Document {}: {}", index + 1, doc.text))
        .collect::<Vec<String>>()
        .join("\n\n")
}

/// Knowledge base display name to id, from a region's listing (bounded at 10).
pub async fn list_knowledge_bases(
    client: &aws_sdk_bedrockagent::Client,
) -> Result<HashMap<String, String>> {
    let response = client.list_knowledge_bases().max_results(10).send().await?;
    let kbs = response
        .knowledge_base_summaries()
        .iter()
        .map(|summary| (summary.name().to_owned(), summary.knowledge_base_id().to_owned()))
        .collect();
    Ok(kbs)
}
