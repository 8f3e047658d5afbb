//! End-to-end coverage for the ingestion and query pipelines against mocked providers.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use docuspace::collab::CollabService;
use docuspace::completion::ChatCompletionClient;
use docuspace::embedding::HashEmbeddingClient;
use docuspace::index::VectorIndexClient;
use docuspace::metrics::PipelineMetrics;
use docuspace::pipeline::{PipelineService, PipelineSettings, QueryError, QueryRequest};
use docuspace::retry::RetryPolicy;
use docuspace::store::{
    self, ChatStore, DocumentStatus, DocumentStore, MessageContext, MessageKind, MessageStore,
    SpaceStore,
};
use httpmock::{Method::GET, Method::POST, Method::PUT, MockServer};
use serde_json::json;
use sqlx::SqlitePool;
use tempfile::TempDir;

const DIMENSION: usize = 8;

struct Stack {
    pipeline: PipelineService,
    collab: CollabService,
    documents: DocumentStore,
    _data_dir: TempDir,
}

async fn build_stack(server: &MockServer) -> Stack {
    let data_dir = tempfile::tempdir().unwrap();
    let pool = connect(&data_dir).await;

    let documents = DocumentStore::new(pool.clone());
    let collab = CollabService::new(
        documents.clone(),
        SpaceStore::new(pool.clone()),
        ChatStore::new(pool.clone()),
        MessageStore::new(pool),
    );

    let index = Arc::new(
        VectorIndexClient::new(
            &server.base_url(),
            None,
            "documents",
            DIMENSION as u64,
            Duration::from_secs(5),
        )
        .unwrap(),
    );
    let completion = Arc::new(
        ChatCompletionClient::new(&server.base_url(), None, Duration::from_secs(5)).unwrap(),
    );

    let settings = PipelineSettings {
        chunk_size: 10,
        chunk_overlap: 0,
        search_top_k: 4,
        embedding_concurrency: 2,
        completion_model: "test-model".into(),
        retry: RetryPolicy {
            max_attempts: 2,
            base_delay: Duration::ZERO,
        },
    };
    let pipeline = PipelineService::new(
        Arc::new(HashEmbeddingClient::new(DIMENSION)),
        completion,
        index,
        documents.clone(),
        collab.clone(),
        Arc::new(PipelineMetrics::new()),
        settings,
    );

    Stack {
        pipeline,
        collab,
        documents,
        _data_dir: data_dir,
    }
}

async fn connect(dir: &TempDir) -> SqlitePool {
    let pool = store::connect(&dir.path().join("test.db")).await.unwrap();
    store::init_schema(&pool).await.unwrap();
    pool
}

/// Build a syntactically complete single-page PDF containing `text`.
fn minimal_pdf(text: &str) -> Vec<u8> {
    let content = format!("BT /F1 12 Tf 72 720 Td ({text}) Tj ET");
    let objects = [
        "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
        "<< /Type /Pages /Kids [3 0 R] /Count 1 >>".to_string(),
        "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R \
         /Resources << /Font << /F1 5 0 R >> >> >>"
            .to_string(),
        format!("<< /Length {} >>\nstream\n{content}\nendstream", content.len()),
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>".to_string(),
    ];

    let mut pdf = String::from("%PDF-1.4\n");
    let mut offsets = Vec::new();
    for (position, body) in objects.iter().enumerate() {
        offsets.push(pdf.len());
        pdf.push_str(&format!("{} 0 obj\n{body}\nendobj\n", position + 1));
    }
    let xref_offset = pdf.len();
    pdf.push_str(&format!("xref\n0 {}\n", objects.len() + 1));
    pdf.push_str("0000000000 65535 f \n");
    for offset in offsets {
        pdf.push_str(&format!("{offset:010} 00000 n \n"));
    }
    pdf.push_str(&format!(
        "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{xref_offset}\n%%EOF\n",
        objects.len() + 1
    ));
    pdf.into_bytes()
}

fn write_pdf(dir: &TempDir, name: &str, text: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, minimal_pdf(text)).unwrap();
    path
}

/// Mock an index that already exists and accepts upserts.
async fn mock_index_ready(server: &MockServer) -> (httpmock::Mock<'_>, httpmock::Mock<'_>) {
    let exists = server
        .mock_async(|when, then| {
            when.method(GET).path("/collections/documents");
            then.status(200).json_body(json!({ "result": {} }));
        })
        .await;
    let upsert = server
        .mock_async(|when, then| {
            when.method(PUT).path("/collections/documents/points");
            then.status(200)
                .json_body(json!({ "result": { "status": "acknowledged" } }));
        })
        .await;
    (exists, upsert)
}

async fn mock_search<'a>(server: &'a MockServer, passages: &[(&str, f32)]) -> httpmock::Mock<'a> {
    let points: Vec<_> = passages
        .iter()
        .enumerate()
        .map(|(position, (text, score))| {
            json!({
                "id": format!("p-{position}"),
                "score": score,
                "payload": { "text": text, "namespace": "ns" }
            })
        })
        .collect();
    server
        .mock_async(move |when, then| {
            when.method(POST).path("/collections/documents/points/query");
            then.status(200)
                .json_body(json!({ "result": { "points": points } }));
        })
        .await
}

async fn mock_completion<'a>(server: &'a MockServer, answer: &str) -> httpmock::Mock<'a> {
    let body = json!({
        "choices": [{ "message": { "role": "assistant", "content": answer } }]
    });
    server
        .mock_async(move |when, then| {
            when.method(POST).path("/chat/completions");
            then.status(200).json_body(body);
        })
        .await
}

#[tokio::test]
async fn ingest_then_query_round_trip() {
    let server = MockServer::start_async().await;
    let (_exists, upsert) = mock_index_ready(&server).await;
    let _search = mock_search(&server, &[("one two", 0.91), ("four five", 0.55)]).await;
    let completion = mock_completion(&server, "the text counts to five").await;
    let stack = build_stack(&server).await;

    // "one two three four five" at chunk size 10 yields three whitespace-aligned chunks
    let pdf = write_pdf(&stack._data_dir, "counts.pdf", "one two three four five");
    let document = stack.pipeline.ingest_document(pdf, "counts.pdf").await.unwrap();

    assert_eq!(document.status, DocumentStatus::Ready);
    assert_eq!(document.chunk_count, 3);
    assert_eq!(document.title, "counts");
    upsert.assert();

    let outcome = stack
        .pipeline
        .answer_query(QueryRequest {
            document_id: document.id,
            query: "how far does it count?".into(),
            model: None,
            context: MessageContext::None,
            user_id: None,
        })
        .await
        .unwrap();

    completion.assert();
    assert_eq!(outcome.answer, "the text counts to five");
    assert_eq!(outcome.model, "test-model");
    assert_eq!(outcome.passages.len(), 2);
    assert!(outcome.passages[0].score > outcome.passages[1].score);

    let snapshot = stack.pipeline.metrics().snapshot();
    assert_eq!(snapshot.documents_indexed, 1);
    assert_eq!(snapshot.chunks_indexed, 3);
    assert_eq!(snapshot.queries_answered, 1);
}

#[tokio::test]
async fn failed_upsert_never_marks_ready() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/collections/documents");
            then.status(200).json_body(json!({ "result": {} }));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(PUT).path("/collections/documents/points");
            then.status(500).body("index exploded");
        })
        .await;
    let stack = build_stack(&server).await;

    let pdf = write_pdf(&stack._data_dir, "doomed.pdf", "one two three four five");
    let error = stack.pipeline.ingest_document(pdf, "doomed.pdf").await.unwrap_err();
    assert_eq!(error.kind(), "index_failed");

    let documents = stack.documents.list().await.unwrap();
    assert_eq!(documents.len(), 1);
    assert_eq!(documents[0].status, DocumentStatus::Failed);
    assert_eq!(documents[0].chunk_count, 0);
}

#[tokio::test]
async fn zero_passages_skip_the_completion_provider() {
    let server = MockServer::start_async().await;
    let (_exists, _upsert) = mock_index_ready(&server).await;
    let _search = mock_search(&server, &[]).await;
    let completion = mock_completion(&server, "never used").await;
    let stack = build_stack(&server).await;

    let pdf = write_pdf(&stack._data_dir, "doc.pdf", "one two three four five");
    let document = stack.pipeline.ingest_document(pdf, "doc.pdf").await.unwrap();

    let space = stack
        .collab
        .create_space("readers", "", &document.id, "alice")
        .await
        .unwrap();

    let error = stack
        .pipeline
        .answer_query(QueryRequest {
            document_id: document.id,
            query: "anything here?".into(),
            model: None,
            context: MessageContext::Space(space.id.clone()),
            user_id: Some("alice".into()),
        })
        .await
        .unwrap_err();

    assert!(matches!(error, QueryError::NoRelevantContent));
    completion.assert_hits(0);

    // the question was still logged before retrieval decided there was no answer
    let log = stack.collab.space_messages(&space.id, "alice").await.unwrap();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].kind, MessageKind::Question);
}

#[tokio::test]
async fn denied_callers_reach_no_provider() {
    let server = MockServer::start_async().await;
    let (_exists, _upsert) = mock_index_ready(&server).await;
    let search = mock_search(&server, &[("one two", 0.9)]).await;
    let completion = mock_completion(&server, "never used").await;
    let stack = build_stack(&server).await;

    let pdf = write_pdf(&stack._data_dir, "doc.pdf", "one two three four five");
    let document = stack.pipeline.ingest_document(pdf, "doc.pdf").await.unwrap();
    let space = stack
        .collab
        .create_space("private", "", &document.id, "alice")
        .await
        .unwrap();

    let error = stack
        .pipeline
        .answer_query(QueryRequest {
            document_id: document.id,
            query: "let me in".into(),
            model: None,
            context: MessageContext::Space(space.id.clone()),
            user_id: Some("mallory".into()),
        })
        .await
        .unwrap_err();

    assert!(matches!(
        error,
        QueryError::Access(docuspace::collab::CollabError::AccessDenied)
    ));
    search.assert_hits(0);
    completion.assert_hits(0);

    let log = stack.collab.space_messages(&space.id, "alice").await.unwrap();
    assert!(log.is_empty());
}

#[tokio::test]
async fn space_history_alternates_questions_and_answers_in_order() {
    let server = MockServer::start_async().await;
    let (_exists, _upsert) = mock_index_ready(&server).await;
    let _search = mock_search(&server, &[("one two", 0.9)]).await;
    let _completion = mock_completion(&server, "an answer").await;
    let stack = build_stack(&server).await;

    let pdf = write_pdf(&stack._data_dir, "doc.pdf", "one two three four five");
    let document = stack.pipeline.ingest_document(pdf, "doc.pdf").await.unwrap();
    let space = stack
        .collab
        .create_space("group", "", &document.id, "alice")
        .await
        .unwrap();
    stack.collab.join_space(&space.access_token, "bob").await.unwrap();

    for (turn, user) in ["alice", "bob", "alice"].iter().enumerate() {
        stack
            .pipeline
            .answer_query(QueryRequest {
                document_id: document.id.clone(),
                query: format!("question {turn}"),
                model: None,
                context: MessageContext::Space(space.id.clone()),
                user_id: Some((*user).into()),
            })
            .await
            .unwrap();
    }

    let log = stack.collab.space_messages(&space.id, "bob").await.unwrap();
    assert_eq!(log.len(), 6);
    for (position, message) in log.iter().enumerate() {
        let expected = if position % 2 == 0 {
            MessageKind::Question
        } else {
            MessageKind::Answer
        };
        assert_eq!(message.kind, expected);
    }
    assert_eq!(log[0].content, "question 0");
    assert_eq!(log[4].content, "question 2");
    assert_eq!(log[2].user_id.as_deref(), Some("bob"));
    assert!(log[1].user_id.is_none());
}

#[tokio::test]
async fn pending_documents_are_not_queryable() {
    let server = MockServer::start_async().await;
    let completion = mock_completion(&server, "never used").await;
    let stack = build_stack(&server).await;

    stack
        .documents
        .insert_pending("doc-1", "draft", "draft.pdf", "ns-1")
        .await
        .unwrap();

    let error = stack
        .pipeline
        .answer_query(QueryRequest {
            document_id: "doc-1".into(),
            query: "ready yet?".into(),
            model: None,
            context: MessageContext::None,
            user_id: None,
        })
        .await
        .unwrap_err();

    assert!(matches!(error, QueryError::DocumentNotFound));
    completion.assert_hits(0);
}

#[tokio::test]
async fn chat_queries_bump_recency_and_log_history() {
    let server = MockServer::start_async().await;
    let (_exists, _upsert) = mock_index_ready(&server).await;
    let _search = mock_search(&server, &[("one two", 0.9)]).await;
    let _completion = mock_completion(&server, "an answer").await;
    let stack = build_stack(&server).await;

    let pdf = write_pdf(&stack._data_dir, "doc.pdf", "one two three four five");
    let document = stack.pipeline.ingest_document(pdf, "doc.pdf").await.unwrap();
    let chat = stack
        .collab
        .create_chat("alice", Some(&document.id), Some("my chat"), "test-model")
        .await
        .unwrap();

    stack
        .pipeline
        .answer_query(QueryRequest {
            document_id: document.id,
            query: "what does it say?".into(),
            model: None,
            context: MessageContext::Chat(chat.id.clone()),
            user_id: Some("alice".into()),
        })
        .await
        .unwrap();

    let (updated, messages) = stack.collab.get_chat(&chat.id, "alice").await.unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].kind, MessageKind::Question);
    assert_eq!(messages[1].kind, MessageKind::Answer);
    assert!(updated.last_message_at >= chat.last_message_at);
}
