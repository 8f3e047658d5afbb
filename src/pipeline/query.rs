//! Query flow: authorize, retrieve, answer, log.

use std::sync::Arc;

use crate::completion::CompletionError;
use crate::embedding::EmbeddingError;
use crate::index::Passage;
use crate::pipeline::PipelineService;
use crate::pipeline::types::{QueryError, QueryOutcome, QueryRequest};
use crate::store::{DocumentStatus, MessageContext, MessageKind, NewMessage};

impl PipelineService {
    /// Answer a question against one document, grounded strictly in retrieved passages.
    ///
    /// The question is logged before the completion call and the answer after it, so a
    /// reader of the conversation always sees the question even when generation fails.
    /// Zero retrieved passages short-circuit with `NoRelevantContent` and the completion
    /// provider is never contacted.
    pub async fn answer_query(&self, request: QueryRequest) -> Result<QueryOutcome, QueryError> {
        let document = self
            .documents
            .get(&request.document_id)
            .await
            .map_err(crate::collab::CollabError::from)?
            .filter(|document| document.status == DocumentStatus::Ready)
            .ok_or(QueryError::DocumentNotFound)?;

        self.collab
            .authorize(&request.context, request.user_id.as_deref())
            .await?;

        self.log_message(
            &request.context,
            request.user_id.clone(),
            MessageKind::Question,
            &request.query,
        )
        .await;

        let passages = self.retrieve(&document.namespace, &request.query).await?;
        if passages.is_empty() {
            tracing::debug!(document = %document.id, "No relevant passages found");
            return Err(QueryError::NoRelevantContent);
        }

        let model = request
            .model
            .unwrap_or_else(|| self.settings.completion_model.clone());
        let prompt = build_prompt(&request.query, &passages);

        let retry = self.settings.retry;
        let answer = retry
            .run(
                || {
                    let completion = Arc::clone(&self.completion);
                    let prompt = prompt.clone();
                    let model = model.clone();
                    async move { completion.complete(&prompt, &model).await }
                },
                CompletionError::is_transient,
            )
            .await?;

        self.log_message(&request.context, None, MessageKind::Answer, &answer)
            .await;
        self.metrics.record_query();

        Ok(QueryOutcome {
            answer,
            passages,
            model,
        })
    }

    async fn retrieve(&self, namespace: &str, query: &str) -> Result<Vec<Passage>, QueryError> {
        let retry = self.settings.retry;
        let vectors = retry
            .run(
                || {
                    let embedding = Arc::clone(&self.embedding);
                    let query = query.to_string();
                    async move { embedding.embed(vec![query]).await }
                },
                EmbeddingError::is_transient,
            )
            .await?;

        let vector = vectors
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::Generation("provider returned no vector".into()))?;

        Ok(self
            .index
            .search(namespace, vector, self.settings.search_top_k)
            .await?)
    }

    /// Best-effort conversation log append; failures are logged and swallowed.
    async fn log_message(
        &self,
        context: &MessageContext,
        user_id: Option<String>,
        kind: MessageKind,
        content: &str,
    ) {
        if *context == MessageContext::None {
            return;
        }
        let message = NewMessage {
            context: context.clone(),
            user_id,
            kind,
            content: content.to_string(),
        };
        if let Err(error) = self.collab.append_message(message).await {
            tracing::warn!(error = %error, "Failed to record conversation message");
        }
    }
}

fn build_prompt(query: &str, passages: &[Passage]) -> String {
    let mut prompt = String::from(
        "Answer the question using only the context below. \
         If the context does not contain the answer, say that the document does not cover it.\n\nContext:\n",
    );
    for (position, passage) in passages.iter().enumerate() {
        prompt.push_str(&format!("[{}] {}\n", position + 1, passage.text));
    }
    prompt.push_str(&format!("\nQuestion: {query}\nAnswer:"));
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    fn passage(text: &str, score: f32) -> Passage {
        Passage {
            text: text.to_string(),
            score,
        }
    }

    #[test]
    fn prompt_contains_passages_and_question() {
        let prompt = build_prompt(
            "what is the warranty period?",
            &[passage("The warranty lasts two years.", 0.9), passage("Coverage excludes water damage.", 0.7)],
        );

        assert!(prompt.contains("[1] The warranty lasts two years."));
        assert!(prompt.contains("[2] Coverage excludes water damage."));
        assert!(prompt.contains("Question: what is the warranty period?"));
        assert!(prompt.ends_with("Answer:"));
    }

    #[test]
    fn prompt_forbids_outside_knowledge() {
        let prompt = build_prompt("q", &[passage("p", 1.0)]);
        assert!(prompt.contains("using only the context"));
    }
}
