//! LLM gateway — retries, backoff, pacing, and JSON discipline.
//!
//! All model traffic flows through one gateway instance so the pacing
//! clock and the retry policy are applied process-wide.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::GatewayConfig;
use crate::error::LlmError;
use crate::llm::json_repair::parse_with_repair;
use crate::llm::{CompletionClient, CompletionRequest};
use crate::prompts::RenderedPrompt;

/// Backoff base delay for the first retry.
const BACKOFF_BASE: Duration = Duration::from_secs(1);

/// Backoff ceiling.
const BACKOFF_CAP: Duration = Duration::from_secs(60);

/// Jitter applied to each backoff delay (fraction of the delay).
const BACKOFF_JITTER: f64 = 0.25;

/// What kind of call is being paced. Classification and extraction carry
/// separate minimum inter-call delays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Classification,
    Extraction,
}

impl CallKind {
    fn label(&self) -> &'static str {
        match self {
            Self::Classification => "classification",
            Self::Extraction => "extraction",
        }
    }
}

/// A successful gateway call: the parsed JSON object plus retry telemetry.
#[derive(Debug, Clone)]
pub struct GatewayOutcome {
    pub value: Value,
    pub retry_count: u32,
}

/// Gateway over an abstract [`CompletionClient`].
pub struct LlmGateway {
    client: Arc<dyn CompletionClient>,
    config: GatewayConfig,
    /// Reserved start time of the most recent call. Pacing is
    /// per-gateway-instance, not per caller.
    pacing: Mutex<Option<Instant>>,
}

impl LlmGateway {
    pub fn new(client: Arc<dyn CompletionClient>, config: GatewayConfig) -> Self {
        Self {
            client,
            config,
            pacing: Mutex::new(None),
        }
    }

    /// Model identifier of the underlying client.
    pub fn model_name(&self) -> &str {
        self.client.model_name()
    }

    /// Run a completion expecting a JSON object matching the prompt's
    /// declared schema.
    ///
    /// Retries `RateLimited`/`Transient` errors with exponential backoff
    /// (base 1s, factor 2, ±25% jitter, 60s cap, up to
    /// `config.max_retries`). Malformed output gets a local repair pass
    /// and then one "return only JSON" follow-up call before surfacing
    /// `MalformedResponse`. `ContentFiltered` and `BadRequest` are never
    /// retried.
    pub async fn complete_json(
        &self,
        prompt: &RenderedPrompt,
        kind: CallKind,
    ) -> Result<GatewayOutcome, LlmError> {
        self.pace(kind).await;

        let started = Instant::now();
        let mut retries = 0u32;
        let result = loop {
            match self.attempt(prompt).await {
                Ok(value) => break Ok(value),
                Err(e) if e.is_retryable() && retries < self.config.max_retries => {
                    let delay = backoff_delay(retries);
                    warn!(
                        template = prompt.template_name,
                        error_kind = e.kind(),
                        retry = retries + 1,
                        delay_ms = delay.as_millis() as u64,
                        "LLM call failed, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    retries += 1;
                }
                Err(e) => break Err(e),
            }
        };

        let duration_ms = started.elapsed().as_millis() as u64;
        match &result {
            Ok(_) => info!(
                template = prompt.template_name,
                call_kind = kind.label(),
                duration_ms,
                retry_count = retries,
                "LLM call succeeded"
            ),
            Err(e) => warn!(
                template = prompt.template_name,
                call_kind = kind.label(),
                duration_ms,
                retry_count = retries,
                error_kind = e.kind(),
                "LLM call failed"
            ),
        }

        result.map(|value| GatewayOutcome {
            value,
            retry_count: retries,
        })
    }

    /// One completion attempt, including the two-stage repair pass.
    async fn attempt(&self, prompt: &RenderedPrompt) -> Result<Value, LlmError> {
        let request = CompletionRequest::new(
            format!(
                "{}\n\nRespond with ONLY a JSON object of this shape: {}",
                prompt.system, prompt.schema
            ),
            prompt.user.clone(),
        );
        let response = self.call_with_timeout(request).await?;

        let first_error = match parse_with_repair(&response.content) {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };
        debug!(
            template = prompt.template_name,
            error = %first_error,
            "Local JSON repair failed, spending a follow-up call"
        );

        let repair_request = CompletionRequest::new(
            format!(
                "Return ONLY a valid JSON object of this shape: {}. \
                 No prose, no code fences.",
                prompt.schema
            ),
            format!(
                "Rewrite the following output as that JSON object:\n{}",
                response.content
            ),
        );
        let repaired = self.call_with_timeout(repair_request).await?;
        parse_with_repair(&repaired.content).map_err(|second_error| {
            LlmError::MalformedResponse(format!("{first_error}; follow-up: {second_error}"))
        })
    }

    async fn call_with_timeout(
        &self,
        request: CompletionRequest,
    ) -> Result<crate::llm::CompletionResponse, LlmError> {
        tokio::time::timeout(self.config.timeout, self.client.complete(request))
            .await
            .map_err(|_| {
                LlmError::Transient(format!("call timed out after {:?}", self.config.timeout))
            })?
    }

    /// Reserve the next call slot, sleeping until the minimum inter-call
    /// delay for `kind` has elapsed since the previous call.
    async fn pace(&self, kind: CallKind) {
        let min_delay = match kind {
            CallKind::Classification => self.config.min_delay_classification,
            CallKind::Extraction => self.config.min_delay_extraction,
        };

        let wait = {
            let mut last = self.pacing.lock().await;
            let now = Instant::now();
            let start_at = match *last {
                Some(previous) => (previous + min_delay).max(now),
                None => now,
            };
            *last = Some(start_at);
            start_at.saturating_duration_since(now)
        };

        if !wait.is_zero() {
            debug!(
                call_kind = kind.label(),
                wait_ms = wait.as_millis() as u64,
                "Pacing LLM call"
            );
            tokio::time::sleep(wait).await;
        }
    }
}

/// Exponential backoff with jitter: `base * 2^retry`, capped, ±25%.
fn backoff_delay(retry: u32) -> Duration {
    let exponential = BACKOFF_BASE
        .checked_mul(2u32.saturating_pow(retry))
        .unwrap_or(BACKOFF_CAP)
        .min(BACKOFF_CAP);
    let jitter = rand::thread_rng().gen_range(-BACKOFF_JITTER..=BACKOFF_JITTER);
    exponential.mul_f64(1.0 + jitter).min(BACKOFF_CAP)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use async_trait::async_trait;

    use super::*;
    use crate::llm::CompletionResponse;

    /// Mock client that plays back a scripted sequence of outcomes.
    struct ScriptedClient {
        script: StdMutex<Vec<Result<String, LlmError>>>,
        calls: StdMutex<Vec<CompletionRequest>>,
    }

    impl ScriptedClient {
        fn new(script: Vec<Result<String, LlmError>>) -> Self {
            Self {
                script: StdMutex::new(script),
                calls: StdMutex::new(Vec::new()),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl CompletionClient for ScriptedClient {
        fn model_name(&self) -> &str {
            "scripted"
        }

        async fn complete(
            &self,
            request: CompletionRequest,
        ) -> Result<CompletionResponse, LlmError> {
            self.calls.lock().unwrap().push(request);
            let mut script = self.script.lock().unwrap();
            if script.is_empty() {
                return Err(LlmError::Unexpected("script exhausted".into()));
            }
            script.remove(0).map(|content| CompletionResponse { content })
        }
    }

    fn prompt() -> RenderedPrompt {
        RenderedPrompt {
            template_name: "classifier_with_explanation",
            system: "classify".into(),
            user: "Subject: hi".into(),
            schema: r#"{"category": "..."}"#,
        }
    }

    fn fast_config() -> GatewayConfig {
        GatewayConfig {
            min_delay_classification: Duration::from_millis(0),
            min_delay_extraction: Duration::from_millis(0),
            max_retries: 3,
            timeout: Duration::from_secs(60),
        }
    }

    fn gateway(script: Vec<Result<String, LlmError>>) -> (LlmGateway, Arc<ScriptedClient>) {
        let client = Arc::new(ScriptedClient::new(script));
        (
            LlmGateway::new(client.clone(), fast_config()),
            client,
        )
    }

    #[tokio::test]
    async fn success_passes_through() {
        let (gateway, client) =
            gateway(vec![Ok(r#"{"category": "fyi", "confidence": 0.9}"#.into())]);
        let outcome = gateway
            .complete_json(&prompt(), CallKind::Classification)
            .await
            .unwrap();
        assert_eq!(outcome.value["category"], "fyi");
        assert_eq!(outcome.retry_count, 0);
        assert_eq!(client.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_retried_then_succeeds() {
        let (gateway, client) = gateway(vec![
            Err(LlmError::RateLimited { retry_after: None }),
            Err(LlmError::RateLimited { retry_after: None }),
            Ok(r#"{"category": "fyi"}"#.into()),
        ]);
        let outcome = gateway
            .complete_json(&prompt(), CallKind::Classification)
            .await
            .unwrap();
        assert_eq!(outcome.retry_count, 2);
        assert_eq!(client.call_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_exhausts_retries() {
        let (gateway, client) = gateway(vec![
            Err(LlmError::Transient("boom".into())),
            Err(LlmError::Transient("boom".into())),
            Err(LlmError::Transient("boom".into())),
            Err(LlmError::Transient("boom".into())),
        ]);
        let err = gateway
            .complete_json(&prompt(), CallKind::Classification)
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::Transient(_)));
        // Initial call + max_retries
        assert_eq!(client.call_count(), 4);
    }

    #[tokio::test]
    async fn content_filtered_not_retried() {
        let (gateway, client) = gateway(vec![Err(LlmError::ContentFiltered)]);
        let err = gateway
            .complete_json(&prompt(), CallKind::Classification)
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::ContentFiltered));
        assert_eq!(client.call_count(), 1);
    }

    #[tokio::test]
    async fn bad_request_not_retried() {
        let (gateway, client) = gateway(vec![Err(LlmError::BadRequest("nope".into()))]);
        let err = gateway
            .complete_json(&prompt(), CallKind::Classification)
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::BadRequest(_)));
        assert_eq!(client.call_count(), 1);
    }

    #[tokio::test]
    async fn malformed_output_repaired_by_follow_up_call() {
        let (gateway, client) = gateway(vec![
            Ok("I think it's probably fine, no JSON for you".into()),
            Ok(r#"{"category": "fyi"}"#.into()),
        ]);
        let outcome = gateway
            .complete_json(&prompt(), CallKind::Classification)
            .await
            .unwrap();
        assert_eq!(outcome.value["category"], "fyi");
        assert_eq!(client.call_count(), 2);

        // The follow-up call demands bare JSON
        let calls = client.calls.lock().unwrap();
        assert!(calls[1].system.contains("ONLY a valid JSON object"));
    }

    #[tokio::test]
    async fn malformed_twice_surfaces_malformed_response() {
        let (gateway, client) = gateway(vec![
            Ok("no json here".into()),
            Ok("still no json".into()),
        ]);
        let err = gateway
            .complete_json(&prompt(), CallKind::Classification)
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::MalformedResponse(_)));
        assert_eq!(client.call_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn pacing_spaces_consecutive_calls() {
        let client = Arc::new(ScriptedClient::new(vec![
            Ok(r#"{"a": 1}"#.into()),
            Ok(r#"{"a": 2}"#.into()),
        ]));
        let config = GatewayConfig {
            min_delay_classification: Duration::from_millis(1500),
            ..fast_config()
        };
        let gateway = LlmGateway::new(client.clone(), config);

        let started = Instant::now();
        gateway
            .complete_json(&prompt(), CallKind::Classification)
            .await
            .unwrap();
        gateway
            .complete_json(&prompt(), CallKind::Classification)
            .await
            .unwrap();

        assert!(started.elapsed() >= Duration::from_millis(1500));
        assert_eq!(client.call_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn per_call_timeout_surfaces_transient() {
        struct HangingClient;

        #[async_trait]
        impl CompletionClient for HangingClient {
            fn model_name(&self) -> &str {
                "hanging"
            }

            async fn complete(
                &self,
                _request: CompletionRequest,
            ) -> Result<CompletionResponse, LlmError> {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                unreachable!("sleep outlives every timeout")
            }
        }

        let config = GatewayConfig {
            timeout: Duration::from_secs(1),
            max_retries: 0,
            ..fast_config()
        };
        let gateway = LlmGateway::new(Arc::new(HangingClient), config);
        let err = gateway
            .complete_json(&prompt(), CallKind::Classification)
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::Transient(_)));
    }

    #[test]
    fn backoff_doubles_with_jitter_bounds() {
        for retry in 0u32..6 {
            let expected = Duration::from_secs(1u64 << retry).min(BACKOFF_CAP);
            for _ in 0..20 {
                let delay = backoff_delay(retry);
                assert!(delay >= expected.mul_f64(0.75));
                assert!(delay <= expected.mul_f64(1.25).min(BACKOFF_CAP));
            }
        }
    }
}
