//! End-to-end orchestration of the natural-language -> PromQL -> Prometheus
//! flow.
//!
//! One invocation of [`QueryPipeline::execute`] mints a conversation
//! identifier up front, runs generate -> parse -> validate -> split ->
//! execute, and stores exactly one interaction record on the terminal
//! outcome - success or failure - before the caller sees a response. A
//! failed store write never changes the pipeline outcome; it is logged and
//! swallowed.

use std::sync::Arc;

use serde_json::{json, Value};
use thiserror::Error;

use crate::conversation_store::{ConversationRecord, ConversationStore, StoreError};
use crate::llm_client::{LLMError, SpecGenerator};
use crate::prometheus_client::{MetricsExecutor, PrometheusError};
use crate::spec_validation::{ParsedSpec, SpecError, SplitSpec, ValidationMode};

#[derive(Error, Debug)]
pub enum PipelineError {
    /// The text-completion call failed. Not retried; surfaced as a generic
    /// server error.
    #[error("query generation failed: {0}")]
    UpstreamFailure(#[from] LLMError),

    /// Generator output is not parseable as JSON.
    #[error("generated spec is not valid JSON: {0}")]
    MalformedSpec(String),

    /// Parsed spec is missing required fields; carries the full list.
    #[error("generated spec is missing required fields: {}", .0.join(", "))]
    IncompleteSpec(Vec<String>),

    /// The Prometheus connector call failed (network, timeout, or
    /// non-success status).
    #[error("prometheus connector unavailable: {0}")]
    ExecutorUnavailable(#[from] PrometheusError),

    /// A store read failed. Write failures never surface here.
    #[error("conversation store failure: {0}")]
    StorageFailure(#[from] StoreError),
}

impl From<SpecError> for PipelineError {
    fn from(err: SpecError) -> Self {
        match err {
            SpecError::Malformed(detail) => PipelineError::MalformedSpec(detail),
            SpecError::MissingFields(fields) => PipelineError::IncompleteSpec(fields),
        }
    }
}

impl PipelineError {
    /// The single translation point from pipeline failures to HTTP status
    /// codes. Nothing below the HTTP boundary selects a status.
    pub fn status_code(&self) -> u16 {
        match self {
            PipelineError::UpstreamFailure(_) => 500,
            PipelineError::MalformedSpec(_) | PipelineError::IncompleteSpec(_) => 400,
            PipelineError::ExecutorUnavailable(_) => 502,
            PipelineError::StorageFailure(_) => 500,
        }
    }

    /// Structured diagnostics for the response body: the parser error or
    /// the complete missing-field list.
    pub fn details(&self) -> Value {
        match self {
            PipelineError::MalformedSpec(detail) => json!({ "parser_error": detail }),
            PipelineError::IncompleteSpec(fields) => json!({ "missing_fields": fields }),
            _ => Value::Null,
        }
    }
}

/// Outcome of the generate-only flow.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedQuery {
    pub query_prompt: String,
    pub explanation: String,
}

/// Outcome of the combined generate-and-execute flow.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionOutcome {
    pub conversation_id: String,
    pub generated_payload: Value,
    pub chart_config: Value,
    pub prometheus_data: Value,
    pub message: String,
}

pub struct QueryPipeline {
    generator: Arc<dyn SpecGenerator>,
    executor: Arc<dyn MetricsExecutor>,
    store: Arc<dyn ConversationStore>,
    mode: ValidationMode,
}

impl QueryPipeline {
    pub fn new(
        generator: Arc<dyn SpecGenerator>,
        executor: Arc<dyn MetricsExecutor>,
        store: Arc<dyn ConversationStore>,
        mode: ValidationMode,
    ) -> Self {
        Self {
            generator,
            executor,
            store,
            mode,
        }
    }

    /// Generate-only flow: one completion call, no identifier, no storage.
    pub async fn generate(&self, natural_language: &str) -> Result<GeneratedQuery, PipelineError> {
        let query_prompt = self.generator.generate(natural_language).await?;
        Ok(GeneratedQuery {
            query_prompt,
            explanation: format!("Generated PromQL for request: {}", natural_language),
        })
    }

    /// Explain-only flow: one completion call, no identifier, no storage.
    pub async fn explain(&self, promql: &str) -> Result<String, PipelineError> {
        Ok(self.generator.explain(promql).await?)
    }

    /// The full flow. The conversation identifier is minted before any
    /// external call, and a record is written exactly once on every path
    /// out of this function.
    pub async fn execute(&self, natural_language: &str) -> Result<ExecutionOutcome, PipelineError> {
        let conversation_id = self.store.generate_conversation_id();
        let mut record =
            ConversationRecord::new(conversation_id.clone(), natural_language.to_string());

        let raw = match self.generator.generate(natural_language).await {
            Ok(raw) => raw,
            Err(err) => {
                record.success = 500;
                self.store_record(&record).await;
                return Err(PipelineError::UpstreamFailure(err));
            }
        };

        let parsed = match ParsedSpec::parse(&raw) {
            Ok(parsed) => parsed,
            Err(err) => {
                record.success = 400;
                self.store_record(&record).await;
                return Err(err.into());
            }
        };

        let split: SplitSpec = match parsed.clone().validate(&self.mode) {
            Ok(validated) => validated.split(),
            Err(err) => {
                // Capture whatever was parsed before reporting the failure.
                let captured = parsed.split();
                record.generated_payload = Value::Object(captured.execution);
                record.chart_config = captured.chart_config;
                record.success = 400;
                self.store_record(&record).await;
                return Err(err.into());
            }
        };

        record.generated_payload = Value::Object(split.execution.clone());
        record.chart_config = split.chart_config.clone();

        let prometheus_data = match self
            .executor
            .fetch_prometheus_data(split.execution, Some(conversation_id.clone()))
            .await
        {
            Ok(data) => data,
            Err(err) => {
                record.success = 502;
                self.store_record(&record).await;
                return Err(PipelineError::ExecutorUnavailable(err));
            }
        };

        record.prometheus_data = prometheus_data;
        record.success = 200;
        self.store_record(&record).await;

        Ok(ExecutionOutcome {
            conversation_id,
            generated_payload: record.generated_payload,
            chart_config: record.chart_config,
            prometheus_data: record.prometheus_data,
            message: format!("Executed PromQL for request: {}", natural_language),
        })
    }

    /// Lookup by identifier. Read failures escalate; retrieval has no other
    /// way to satisfy its contract.
    pub async fn get_conversation(
        &self,
        conversation_id: &str,
    ) -> Result<Option<ConversationRecord>, PipelineError> {
        Ok(self.store.get_conversation(conversation_id).await?)
    }

    pub async fn store_healthy(&self) -> bool {
        self.store.healthy().await
    }

    // Write failures are logged, never escalated: the pipeline outcome is
    // independent of whether the audit record persisted.
    async fn store_record(&self, record: &ConversationRecord) {
        match self.store.store_conversation(record).await {
            Ok(()) => log::info!("stored conversation {}", record.conversation_id),
            Err(err) => log::error!(
                "failed to store conversation {}: {}",
                record.conversation_id,
                err
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm_client::MockSpecGenerator;
    use crate::prometheus_client::MockMetricsExecutor;
    use std::sync::Mutex;

    const FULL_SPEC: &str = r#"{
        "query": "histogram_quantile(0.95, rate(http_request_duration_seconds_bucket[5m]))",
        "start": 1700000000,
        "end": 1700003600,
        "step": "60s",
        "chartConfig": {"chartType": "lineChart", "chartLibrary": "recharts"}
    }"#;

    /// In-memory store double that records every write so the
    /// write-exactly-once contract is assertable.
    struct RecordingStore {
        records: Mutex<Vec<ConversationRecord>>,
        fail_writes: bool,
    }

    impl RecordingStore {
        fn new() -> Self {
            Self {
                records: Mutex::new(Vec::new()),
                fail_writes: false,
            }
        }

        fn failing() -> Self {
            Self {
                records: Mutex::new(Vec::new()),
                fail_writes: true,
            }
        }

        fn stored(&self) -> Vec<ConversationRecord> {
            self.records.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl ConversationStore for RecordingStore {
        fn generate_conversation_id(&self) -> String {
            "test-conversation-id".to_string()
        }

        async fn store_conversation(&self, record: &ConversationRecord) -> Result<(), StoreError> {
            if self.fail_writes {
                return Err(StoreError::Write("write refused".to_string()));
            }
            self.records.lock().unwrap().push(record.clone());
            Ok(())
        }

        async fn get_conversation(
            &self,
            conversation_id: &str,
        ) -> Result<Option<ConversationRecord>, StoreError> {
            Ok(self
                .records
                .lock()
                .unwrap()
                .iter()
                .find(|record| record.conversation_id == conversation_id)
                .cloned())
        }
    }

    fn generator_returning(raw: &str) -> Arc<MockSpecGenerator> {
        let raw = raw.to_string();
        let mut generator = MockSpecGenerator::new();
        generator
            .expect_generate()
            .returning(move |_| Ok(raw.clone()));
        Arc::new(generator)
    }

    fn executor_returning(data: Value) -> Arc<MockMetricsExecutor> {
        let mut executor = MockMetricsExecutor::new();
        executor
            .expect_fetch_prometheus_data()
            .returning(move |_, _| Ok(data.clone()));
        Arc::new(executor)
    }

    fn pipeline_with(
        generator: Arc<MockSpecGenerator>,
        executor: Arc<MockMetricsExecutor>,
        store: Arc<RecordingStore>,
    ) -> QueryPipeline {
        QueryPipeline::new(generator, executor, store, ValidationMode::with_chart_config())
    }

    #[tokio::test]
    async fn successful_execution_stores_one_record_without_chart_config() {
        let store = Arc::new(RecordingStore::new());
        let pipeline = pipeline_with(
            generator_returning(FULL_SPEC),
            executor_returning(json!({"status": "success", "data": {"resultType": "matrix"}})),
            store.clone(),
        );

        let outcome = pipeline
            .execute("95th percentile latency for checkout service in last 1h")
            .await
            .unwrap();

        assert_eq!(outcome.conversation_id, "test-conversation-id");
        assert_eq!(
            outcome.generated_payload["query"],
            "histogram_quantile(0.95, rate(http_request_duration_seconds_bucket[5m]))"
        );
        assert_eq!(outcome.chart_config["chartType"], "lineChart");
        assert_eq!(outcome.prometheus_data["status"], "success");

        let stored = store.stored();
        assert_eq!(stored.len(), 1, "exactly one record per invocation");
        let record = &stored[0];
        assert_eq!(record.success, 200);
        assert_eq!(
            record.natural_language_query,
            "95th percentile latency for checkout service in last 1h"
        );
        // Presentation payload never rides along in the execution payload.
        assert!(record.generated_payload.get("chartConfig").is_none());
        assert_eq!(record.chart_config["chartLibrary"], "recharts");

        // And the record is retrievable by the returned identifier.
        let fetched = pipeline
            .get_conversation(&outcome.conversation_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fetched.success, 200);
    }

    #[tokio::test]
    async fn conversation_id_is_injected_into_the_executor_call() {
        let store = Arc::new(RecordingStore::new());
        let mut executor = MockMetricsExecutor::new();
        executor
            .expect_fetch_prometheus_data()
            .withf(|payload, conversation_id| {
                !payload.contains_key("chartConfig")
                    && conversation_id.as_deref() == Some("test-conversation-id")
            })
            .returning(|_, _| Ok(json!({"status": "success"})));

        let pipeline = pipeline_with(
            generator_returning(FULL_SPEC),
            Arc::new(executor),
            store,
        );

        pipeline.execute("cpu usage last hour").await.unwrap();
    }

    #[tokio::test]
    async fn unparseable_generator_output_is_a_400_with_empty_payloads() {
        let store = Arc::new(RecordingStore::new());
        let pipeline = pipeline_with(
            generator_returning("here is your query: up"),
            executor_returning(json!({})),
            store.clone(),
        );

        let err = pipeline.execute("cpu usage").await.unwrap_err();
        assert!(matches!(err, PipelineError::MalformedSpec(_)));
        assert_eq!(err.status_code(), 400);

        let stored = store.stored();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].success, 400);
        assert_eq!(stored[0].generated_payload, json!({}));
        assert_eq!(stored[0].prometheus_data, json!({}));
    }

    #[tokio::test]
    async fn incomplete_spec_names_every_missing_field() {
        let store = Arc::new(RecordingStore::new());
        let pipeline = pipeline_with(
            generator_returning(r#"{"query": "up", "chartConfig": {}}"#),
            executor_returning(json!({})),
            store.clone(),
        );

        let err = pipeline.execute("cpu usage").await.unwrap_err();
        match &err {
            PipelineError::IncompleteSpec(fields) => {
                assert_eq!(fields, &["start", "end", "step"]);
            }
            other => panic!("expected IncompleteSpec, got {:?}", other),
        }
        assert_eq!(err.status_code(), 400);

        // The record captures whatever was parsed.
        let stored = store.stored();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].success, 400);
        assert_eq!(stored[0].generated_payload, json!({"query": "up"}));
        assert_eq!(stored[0].chart_config, json!({}));
    }

    #[tokio::test]
    async fn generator_failure_is_a_500_and_still_stored() {
        let store = Arc::new(RecordingStore::new());
        let mut generator = MockSpecGenerator::new();
        generator
            .expect_generate()
            .returning(|_| Err(LLMError::Network("connection refused".to_string())));

        let pipeline = pipeline_with(Arc::new(generator), executor_returning(json!({})), store.clone());

        let err = pipeline.execute("cpu usage").await.unwrap_err();
        assert!(matches!(err, PipelineError::UpstreamFailure(_)));
        assert_eq!(err.status_code(), 500);

        let stored = store.stored();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].success, 500);
        assert_eq!(stored[0].generated_payload, json!({}));
    }

    #[tokio::test]
    async fn executor_failure_is_a_502_with_payloads_captured() {
        let store = Arc::new(RecordingStore::new());
        let mut executor = MockMetricsExecutor::new();
        executor.expect_fetch_prometheus_data().returning(|_, _| {
            Err(PrometheusError::Unavailable("connector returned 503".to_string()))
        });

        let pipeline = pipeline_with(generator_returning(FULL_SPEC), Arc::new(executor), store.clone());

        let err = pipeline.execute("cpu usage").await.unwrap_err();
        assert!(matches!(err, PipelineError::ExecutorUnavailable(_)));
        assert_eq!(err.status_code(), 502);

        let stored = store.stored();
        assert_eq!(stored.len(), 1);
        let record = &stored[0];
        assert_eq!(record.success, 502);
        // Execution and presentation payloads captured, result data empty.
        assert_eq!(record.generated_payload["step"], "60s");
        assert_eq!(record.chart_config["chartType"], "lineChart");
        assert_eq!(record.prometheus_data, json!({}));
    }

    #[tokio::test]
    async fn store_write_failure_does_not_flip_a_success() {
        let store = Arc::new(RecordingStore::failing());
        let pipeline = pipeline_with(
            generator_returning(FULL_SPEC),
            executor_returning(json!({"status": "success"})),
            store,
        );

        let outcome = pipeline.execute("cpu usage").await.unwrap();
        assert_eq!(outcome.prometheus_data["status"], "success");
    }

    #[tokio::test]
    async fn execution_only_mode_accepts_a_spec_without_chart_config() {
        let store = Arc::new(RecordingStore::new());
        let pipeline = QueryPipeline::new(
            generator_returning(r#"{"query": "up", "start": 1, "end": 2, "step": "60s"}"#),
            executor_returning(json!({"status": "success"})),
            store.clone(),
            ValidationMode::execution_only(),
        );

        let outcome = pipeline.execute("is everything up").await.unwrap();
        // Lenient split substitutes an empty chart config.
        assert_eq!(outcome.chart_config, json!({}));
        assert_eq!(store.stored()[0].success, 200);
    }

    #[tokio::test]
    async fn numeric_string_time_bounds_are_normalized_before_execution() {
        let store = Arc::new(RecordingStore::new());
        let mut executor = MockMetricsExecutor::new();
        executor
            .expect_fetch_prometheus_data()
            .withf(|payload, _| payload["start"] == json!(1700000000_i64))
            .returning(|_, _| Ok(json!({"status": "success"})));

        let pipeline = QueryPipeline::new(
            generator_returning(
                r#"{"query": "up", "start": "1700000000", "end": "1700003600", "step": "60s"}"#,
            ),
            Arc::new(executor),
            store,
            ValidationMode::execution_only(),
        );

        pipeline.execute("is everything up").await.unwrap();
    }

    #[tokio::test]
    async fn generate_flow_has_no_identifier_and_stores_nothing() {
        let store = Arc::new(RecordingStore::new());
        let pipeline = pipeline_with(
            generator_returning(FULL_SPEC),
            executor_returning(json!({})),
            store.clone(),
        );

        let generated = pipeline.generate("cpu usage last hour").await.unwrap();
        assert_eq!(generated.query_prompt, FULL_SPEC.trim());
        assert_eq!(
            generated.explanation,
            "Generated PromQL for request: cpu usage last hour"
        );
        assert!(store.stored().is_empty());
    }

    #[tokio::test]
    async fn explain_flow_passes_the_generator_text_through() {
        let store = Arc::new(RecordingStore::new());
        let mut generator = MockSpecGenerator::new();
        generator
            .expect_explain()
            .returning(|_| Ok("It averages request rates over five minutes.".to_string()));

        let pipeline = pipeline_with(Arc::new(generator), executor_returning(json!({})), store.clone());

        let explanation = pipeline.explain("rate(http_requests_total[5m])").await.unwrap();
        assert_eq!(explanation, "It averages request rates over five minutes.");
        assert!(store.stored().is_empty());
    }

    #[tokio::test]
    async fn get_conversation_returns_none_for_unknown_identifiers() {
        let store = Arc::new(RecordingStore::new());
        let pipeline = pipeline_with(
            generator_returning(FULL_SPEC),
            executor_returning(json!({})),
            store,
        );

        let result = pipeline.get_conversation("never-stored").await.unwrap();
        assert!(result.is_none());
    }
}
