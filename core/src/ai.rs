//! The text generation collaborator and parsing of its replies.

use std::sync::{Arc, LazyLock, OnceLock};

use async_trait::async_trait;
use regex::Regex;
use serde::de::DeserializeOwned;

use crate::error::PipelineError;

/// Anything that turns a prompt into free-form text.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, PipelineError>;
}

type GeneratorFactory =
    Box<dyn Fn() -> Result<Arc<dyn TextGenerator>, PipelineError> + Send + Sync>;

/// A generator built on first use and shared afterwards.
///
/// A failed construction is not cached, so a later request retries it (for
/// example once an API key has been configured).
pub struct GeneratorHandle {
    factory: GeneratorFactory,
    instance: OnceLock<Arc<dyn TextGenerator>>,
}

impl GeneratorHandle {
    pub fn lazy<F>(factory: F) -> Self
    where
        F: Fn() -> Result<Arc<dyn TextGenerator>, PipelineError> + Send + Sync + 'static,
    {
        Self {
            factory: Box::new(factory),
            instance: OnceLock::new(),
        }
    }

    /// Wrap an already constructed generator.
    pub fn ready(generator: Arc<dyn TextGenerator>) -> Self {
        let instance = OnceLock::new();
        let _ = instance.set(Arc::clone(&generator));
        Self {
            factory: Box::new(move || Ok(Arc::clone(&generator))),
            instance,
        }
    }

    pub fn get(&self) -> Result<Arc<dyn TextGenerator>, PipelineError> {
        if let Some(generator) = self.instance.get() {
            return Ok(Arc::clone(generator));
        }
        let built = (self.factory)()?;
        tracing::debug!("text generator constructed");
        Ok(Arc::clone(self.instance.get_or_init(|| built)))
    }
}

static FENCED_JSON: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```json\s*(.*?)\s*```").expect("valid regex"));

static BRACED_SPAN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\{.*\}").expect("valid regex"));

/// Locate the JSON payload in model output: a ```json fenced block, else the
/// span from the first `{` to the last `}`, else the text unchanged.
#[must_use]
pub fn extract_json(text: &str) -> &str {
    if let Some(inner) = FENCED_JSON.captures(text).and_then(|c| c.get(1)) {
        return inner.as_str();
    }
    if let Some(span) = BRACED_SPAN.find(text) {
        return span.as_str();
    }
    text
}

/// Extract and deserialize the JSON payload of a model reply.
pub fn parse_json_response<T: DeserializeOwned>(text: &str) -> Result<T, PipelineError> {
    serde_json::from_str(extract_json(text)).map_err(|e| {
        tracing::warn!(error = %e, "model reply is not the expected JSON");
        PipelineError::ResponseParse(e.to_string())
    })
}


#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde::Deserialize;
    use serde_json::Value;

    use super::testing::ScriptedGenerator;
    use super::*;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Sample {
        plan_name: String,
        meals: Vec<i64>,
    }

    #[test]
    fn test_fenced_block_is_preferred() {
        let text = "Here you go:\n```json\n  {\"a\": 1}\n```\nand {\"b\": 2}";
        assert_eq!(extract_json(text), "{\"a\": 1}");
    }

    #[test]
    fn test_braced_span_is_greedy() {
        let text = "Sure! {\"a\": {\"b\": 1}} trailing } text";
        assert_eq!(extract_json(text), "{\"a\": {\"b\": 1}} trailing }");
    }

    #[test]
    fn test_raw_text_when_nothing_matches() {
        assert_eq!(extract_json("[1, 2]"), "[1, 2]");
    }

    #[test]
    fn test_fenced_round_trip_equals_direct() {
        let raw = r#"{"plan_name": "Green Week", "meals": [1, 2, 3]}"#;
        let fenced = format!("Plan below.\n```json\n{raw}\n```\nEnjoy!");
        let direct: Sample = serde_json::from_str(raw).unwrap();
        let parsed: Sample = parse_json_response(&fenced).unwrap();
        assert_eq!(direct, parsed);
    }

    #[test]
    fn test_prose_around_bare_json() {
        let parsed: Value = parse_json_response("The answer is {\"age\": 30}. Thanks").unwrap();
        assert_eq!(parsed["age"], 30);
    }

    #[test]
    fn test_no_json_is_parse_error() {
        let err = parse_json_response::<Value>("I cannot help with that.").unwrap_err();
        assert!(matches!(err, PipelineError::ResponseParse(_)));
    }

    #[test]
    fn test_wrong_shape_is_parse_error() {
        let err = parse_json_response::<Sample>("{\"plan_name\": 5}").unwrap_err();
        assert!(matches!(err, PipelineError::ResponseParse(_)));
    }

    #[test]
    fn test_handle_constructs_once() {
        let built = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&built);
        let handle = GeneratorHandle::lazy(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            let generator: Arc<dyn TextGenerator> = ScriptedGenerator::new(vec![]);
            Ok(generator)
        });
        assert_eq!(built.load(Ordering::SeqCst), 0);
        let a = handle.get().unwrap();
        let b = handle.get().unwrap();
        assert_eq!(built.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_handle_does_not_cache_failure() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&attempts);
        let handle = GeneratorHandle::lazy(move || {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(PipelineError::ServiceConfiguration(
                    "GEMINI_API_KEY is not set".into(),
                ));
            }
            let generator: Arc<dyn TextGenerator> = ScriptedGenerator::new(vec![]);
            Ok(generator)
        });
        assert!(matches!(
            handle.get(),
            Err(PipelineError::ServiceConfiguration(_))
        ));
        assert!(handle.get().is_ok());
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_scripted_generator_replays() {
        let generator = ScriptedGenerator::new(vec![Ok("one".into())]);
        let handle = GeneratorHandle::ready(generator.clone());
        let g = handle.get().unwrap();
        assert_eq!(g.generate("p1").await.unwrap(), "one");
        assert!(g.generate("p2").await.is_err());
        assert_eq!(generator.call_count(), 2);
        assert_eq!(generator.prompts.lock().unwrap().as_slice(), ["p1", "p2"]);
    }
}
