//! Extraction through a secondary model.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::{debug, instrument};

use super::json_recovery::recover_object;
use super::{ExtractionError, ValueExtractor};
use crate::domain::models::{ExtractedFields, ExtractionConfig, ExtractionMethod, Task};
use crate::domain::ports::{CompletionClient, CompletionRequest};
use crate::services::retry::RetryPolicy;

/// Asks a secondary model to read the answer and return the final values as JSON.
pub struct AssistedExtractor {
    client: Arc<dyn CompletionClient>,
    retry: RetryPolicy,
    max_tokens: u32,
}

impl AssistedExtractor {
    pub fn new(client: Arc<dyn CompletionClient>, retry: RetryPolicy, max_tokens: u32) -> Self {
        Self {
            client,
            retry,
            max_tokens,
        }
    }

    pub fn from_config(client: Arc<dyn CompletionClient>, config: &ExtractionConfig) -> Self {
        Self::new(
            client,
            RetryPolicy::linear(config.max_attempts, config.retry_delay_ms),
            config.max_tokens,
        )
    }

    /// Build the instruction prompt for one answer.
    ///
    /// Every numeric ground-truth field is listed with its expected value so
    /// the model can disambiguate between per-group and total counts.
    pub fn build_prompt(task: &Task, raw_text: &str) -> String {
        let mut fields = String::new();
        for (name, expected) in &task.ground_truth {
            let _ = writeln!(fields, "- \"{name}\": (expected type: number, ground truth hint: {expected})");
        }

        format!(
            "You extract final numerical answers from responses to biostatistics questions.\n\
             \n\
             QUESTION:\n{question}\n\
             \n\
             FIELDS (ground-truth names with hints):\n{fields}\
             \n\
             RESPONSE:\n{raw_text}\n\
             \n\
             RULES:\n\
             1. Use the final answer the response commits to: boxed, bold or concluding values.\n\
             2. sample_size, subjects, total_subjects and total_sample_size mean the TOTAL across all groups.\n\
             3. subjects_per_arm, subjects_per_group and n_per_group mean the PER-GROUP count.\n\
             4. events and events_needed mean the number of events required.\n\
             5. Report power as a decimal, 0.80 rather than 80%.\n\
             6. per_cell and subjects_per_cell mean the count in each cell of a factorial design.\n\
             7. If the response only shows code and never states a number, use null.\n\
             8. If the response gives a range, use its primary or recommended value.\n\
             9. If a field is not addressed, use null.\n\
             \n\
             Reply with ONLY a JSON object mapping each field name to a number or null, \
             for example {{\"sample_size\": 185, \"events\": 222, \"power\": 0.80}}.\n\
             \n\
             JSON:",
            question = task.question,
        )
    }

    /// Map a recovered object onto the task's numeric fields.
    ///
    /// Numbers given as strings are accepted. Anything else becomes `None`.
    pub fn fields_from_object(task: &Task, object: &Map<String, Value>) -> ExtractedFields {
        let mut fields = ExtractedFields::new(task.id.clone(), ExtractionMethod::Assisted);
        for name in task.ground_truth.keys() {
            let value = object.get(name).and_then(|value| match value {
                Value::Number(n) => n.as_f64(),
                Value::String(s) => s.trim().trim_end_matches('%').replace(',', "").parse().ok(),
                _ => None,
            });
            fields.values.insert(name.clone(), value);
        }
        fields
    }
}

#[async_trait]
impl ValueExtractor for AssistedExtractor {
    fn method(&self) -> ExtractionMethod {
        ExtractionMethod::Assisted
    }

    #[instrument(skip(self, task, raw_text), fields(task_id = %task.id, model = self.client.model()))]
    async fn extract(&self, task: &Task, raw_text: &str) -> Result<ExtractedFields, ExtractionError> {
        let prompt = Self::build_prompt(task, raw_text);
        let label = format!("extract {}", task.id);

        let object = self
            .retry
            .execute(&label, |_| {
                let request = CompletionRequest::new(prompt.clone(), self.max_tokens);
                async move {
                    let reply = self.client.complete(request).await?;
                    recover_object(&reply).ok_or_else(|| {
                        ExtractionError::Unparseable(reply.chars().take(200).collect())
                    })
                }
            })
            .await
            .map_err(|exhausted| exhausted.last_error)?;

        debug!(keys = object.len(), "extraction reply parsed");
        Ok(Self::fields_from_object(task, &object))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::{ProviderError, Sleeper};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    struct ScriptedClient {
        replies: Mutex<Vec<Result<String, ProviderError>>>,
        calls: AtomicU32,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedClient {
        fn new(replies: Vec<Result<String, ProviderError>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into_iter().rev().collect()),
                calls: AtomicU32::new(0),
                prompts: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl CompletionClient for ScriptedClient {
        fn model(&self) -> &str {
            "scripted"
        }

        async fn complete(&self, request: CompletionRequest) -> Result<String, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.prompts.lock().unwrap().push(request.prompt);
            self.replies
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Err(ProviderError::Network("script exhausted".into())))
        }
    }

    struct NoSleep;

    #[async_trait]
    impl Sleeper for NoSleep {
        async fn sleep(&self, _duration: Duration) {}
    }

    fn task() -> Task {
        serde_json::from_value(serde_json::json!({
            "id": "t2-anova-003",
            "tier": 2,
            "question": "How many subjects per group for a 3-arm ANOVA with f = 0.25?",
            "ground_truth": {"subjects_per_group": 53, "power": 0.8, "note": "text"},
        }))
        .unwrap()
    }

    fn extractor(client: Arc<ScriptedClient>) -> AssistedExtractor {
        AssistedExtractor::new(client, RetryPolicy::linear(3, 5_000).with_sleeper(Arc::new(NoSleep)), 500)
    }

    #[test]
    fn test_prompt_lists_numeric_fields_with_hints() {
        let prompt = AssistedExtractor::build_prompt(&task(), "We need 53 per group.");
        assert!(prompt.contains("- \"subjects_per_group\": (expected type: number, ground truth hint: 53)"));
        assert!(prompt.contains("- \"power\": (expected type: number, ground truth hint: 0.8)"));
        assert!(!prompt.contains("\"note\""));
        assert!(prompt.contains("We need 53 per group."));
        assert!(prompt.trim_end().ends_with("JSON:"));
    }

    #[test]
    fn test_fields_from_object_coerces_strings() {
        let object = serde_json::json!({"subjects_per_group": "1,053", "power": "80%"});
        let fields = AssistedExtractor::fields_from_object(&task(), object.as_object().unwrap());
        assert_eq!(fields.get("subjects_per_group"), Some(1053.0));
        assert_eq!(fields.get("power"), Some(80.0));
    }

    #[tokio::test]
    async fn test_extract_with_prose_wrapped_reply() {
        let client = ScriptedClient::new(vec![Ok(
            "Sure, here you go:\n{\"subjects_per_group\": 53, \"power\": null}".to_string(),
        )]);
        let fields = extractor(Arc::clone(&client)).extract(&task(), "text").await.unwrap();

        assert_eq!(fields.method, ExtractionMethod::Assisted);
        assert_eq!(fields.get("subjects_per_group"), Some(53.0));
        assert_eq!(fields.values.get("power"), Some(&None));
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unparseable_reply_retried() {
        let client = ScriptedClient::new(vec![
            Ok("I cannot tell.".to_string()),
            Ok("{\"subjects_per_group\": 53}".to_string()),
        ]);
        let fields = extractor(Arc::clone(&client)).extract(&task(), "text").await.unwrap();
        assert_eq!(fields.get("subjects_per_group"), Some(53.0));
        assert_eq!(client.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let client = ScriptedClient::new(vec![
            Err(ProviderError::Overloaded { status: 529, message: "busy".into() }),
            Err(ProviderError::Overloaded { status: 529, message: "busy".into() }),
            Err(ProviderError::Overloaded { status: 529, message: "busy".into() }),
        ]);
        let err = extractor(Arc::clone(&client)).extract(&task(), "text").await.unwrap_err();
        assert!(matches!(err, ExtractionError::Provider(ProviderError::Overloaded { .. })));
        assert_eq!(client.calls.load(Ordering::SeqCst), 3);
    }
}
