//! Language model gateway.
//!
//! Wraps an [`LlmProvider`] with the transport policy the pipeline relies on:
//! a per-attempt timeout and bounded exponential backoff for transient
//! failures. Content-level retries (compiler repair) live in the pipeline.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use super::client::{ChatClient, GenerationRequest, LlmProvider, Message, Usage};
use crate::error::LlmError;

/// Default endpoint of a local llama.cpp server.
pub const DEFAULT_API_BASE: &str = "http://localhost:8080/v1";

/// llama.cpp accepts any bearer token.
pub const DEFAULT_API_KEY: &str = "sk-no-key-required";

/// Model name the llama.cpp server is started with.
pub const DEFAULT_MODEL: &str = "LLama_CPP";

/// Connection settings and transport retry policy for the gateway.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Base URL of the OpenAI-compatible endpoint.
    pub api_base: String,
    /// Bearer token, if the endpoint needs one.
    pub api_key: Option<String>,
    /// Model identifier sent with every request.
    pub model: String,
    /// Timeout for a single request attempt.
    pub request_timeout: Duration,
    /// Total attempts per query, including the first.
    pub max_attempts: u32,
    /// Base delay for exponential backoff between attempts.
    pub base_retry_delay: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            api_key: Some(DEFAULT_API_KEY.to_string()),
            model: DEFAULT_MODEL.to_string(),
            request_timeout: Duration::from_secs(300),
            max_attempts: 3,
            base_retry_delay: Duration::from_millis(1000),
        }
    }
}

impl GatewayConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the endpoint base URL.
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    /// Sets the API key.
    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key;
        self
    }

    /// Sets the model identifier.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Sets the per-attempt timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the total attempts per query (at least 1).
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Sets the base backoff delay.
    pub fn with_base_retry_delay(mut self, delay: Duration) -> Self {
        self.base_retry_delay = delay;
        self
    }
}

/// The two-message conversation every gateway call carries.
#[derive(Debug, Clone, PartialEq)]
pub struct Conversation {
    system: Message,
    user: Message,
}

impl Conversation {
    /// Build a conversation from the shared context and one question.
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: Message::system(system),
            user: Message::user(user),
        }
    }

    pub fn system(&self) -> &str {
        &self.system.content
    }

    pub fn user(&self) -> &str {
        &self.user.content
    }

    /// Messages in wire order: system first, then user.
    pub fn to_messages(&self) -> Vec<Message> {
        vec![self.system.clone(), self.user.clone()]
    }
}

/// A raw completion returned by the gateway.
#[derive(Debug, Clone)]
pub struct Completion {
    pub text: String,
    pub usage: Usage,
    /// Attempts spent obtaining this completion.
    pub attempts: u32,
}

/// Gateway to a language model with timeout and transient-failure retry.
#[derive(Clone)]
pub struct Gateway {
    provider: Arc<dyn LlmProvider>,
    config: GatewayConfig,
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Gateway {
    /// Creates a gateway over an arbitrary provider.
    pub fn new(provider: Arc<dyn LlmProvider>, config: GatewayConfig) -> Self {
        Self { provider, config }
    }

    /// Creates a gateway backed by an HTTP [`ChatClient`] built from `config`.
    pub fn from_config(config: GatewayConfig) -> Result<Self, LlmError> {
        // reqwest's own timeout is a backstop; the per-attempt timeout below is authoritative.
        let client = ChatClient::new(
            config.api_base.clone(),
            config.api_key.clone(),
            config.request_timeout + Duration::from_secs(5),
        )?;
        Ok(Self::new(Arc::new(client), config))
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Sends one conversation and returns the first completion.
    ///
    /// Transient failures (network, 429, 5xx, timeout) are retried with
    /// exponential backoff up to `max_attempts`; anything else fails at once.
    pub async fn query(
        &self,
        conversation: &Conversation,
        temperature: f64,
        max_tokens: Option<u32>,
    ) -> Result<Completion, LlmError> {
        let max_attempts = self.config.max_attempts.max(1);
        let mut last_error = None;

        for attempt in 0..max_attempts {
            if attempt > 0 {
                let delay = self.config.base_retry_delay * (1u32 << (attempt - 1).min(16));
                debug!(
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    "Retrying LLM request after transient failure"
                );
                tokio::time::sleep(delay).await;
            }

            match self.attempt(conversation, temperature, max_tokens).await {
                Ok((text, usage)) => {
                    return Ok(Completion {
                        text,
                        usage,
                        attempts: attempt + 1,
                    })
                }
                Err(err) if err.is_transient() => {
                    warn!(
                        attempt = attempt + 1,
                        max_attempts,
                        error = %err,
                        "Transient LLM error, will retry"
                    );
                    last_error = Some(err);
                }
                Err(err) => return Err(err),
            }
        }

        Err(LlmError::RetriesExhausted {
            attempts: max_attempts,
            last: Box::new(last_error.unwrap_or_else(|| {
                LlmError::RequestFailed("no attempt recorded".to_string())
            })),
        })
    }

    async fn attempt(
        &self,
        conversation: &Conversation,
        temperature: f64,
        max_tokens: Option<u32>,
    ) -> Result<(String, Usage), LlmError> {
        let mut request = GenerationRequest::new(&self.config.model, conversation.to_messages())
            .with_temperature(temperature);
        if let Some(max_tokens) = max_tokens {
            request = request.with_max_tokens(max_tokens);
        }

        let response =
            match tokio::time::timeout(self.config.request_timeout, self.provider.generate(request))
                .await
            {
                Ok(result) => result?,
                Err(_) => return Err(LlmError::Timeout(self.config.request_timeout)),
            };

        let text = response
            .first_content()
            .ok_or(LlmError::EmptyResponse)?
            .to_string();
        Ok((text, response.usage))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::client::{Choice, GenerationResponse, Role};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Provider that replays scripted results and records requests.
    struct ScriptedProvider {
        results: Mutex<VecDeque<Result<String, LlmError>>>,
        requests: Mutex<Vec<GenerationRequest>>,
    }

    impl ScriptedProvider {
        fn new(results: Vec<Result<String, LlmError>>) -> Self {
            Self {
                results: Mutex::new(results.into()),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> usize {
            self.requests.lock().expect("lock").len()
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        async fn generate(
            &self,
            request: GenerationRequest,
        ) -> Result<GenerationResponse, LlmError> {
            self.requests.lock().expect("lock").push(request);
            let next = self
                .results
                .lock()
                .expect("lock")
                .pop_front()
                .unwrap_or(Err(LlmError::EmptyResponse));
            next.map(|content| GenerationResponse {
                model: "mock".to_string(),
                choices: vec![Choice {
                    index: 0,
                    message: Message::assistant(content),
                    finish_reason: "stop".to_string(),
                }],
                usage: Usage {
                    prompt_tokens: 3,
                    completion_tokens: 2,
                    total_tokens: 5,
                },
            })
        }
    }

    /// Provider that never answers within the test timeout.
    struct SlowProvider;

    #[async_trait]
    impl LlmProvider for SlowProvider {
        async fn generate(
            &self,
            _request: GenerationRequest,
        ) -> Result<GenerationResponse, LlmError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Err(LlmError::EmptyResponse)
        }
    }

    fn fast_config() -> GatewayConfig {
        GatewayConfig::default()
            .with_max_attempts(3)
            .with_base_retry_delay(Duration::from_millis(0))
    }

    #[tokio::test]
    async fn test_query_sends_system_then_user() {
        let provider = Arc::new(ScriptedProvider::new(vec![Ok("hello".to_string())]));
        let gateway = Gateway::new(provider.clone(), fast_config());
        let conversation = Conversation::new("ctx", "question");

        let completion = gateway
            .query(&conversation, 0.4, Some(128))
            .await
            .expect("query");
        assert_eq!(completion.text, "hello");
        assert_eq!(completion.attempts, 1);
        assert_eq!(completion.usage.total_tokens, 5);

        let requests = provider.requests.lock().expect("lock");
        let request = &requests[0];
        assert_eq!(request.model, DEFAULT_MODEL);
        assert_eq!(request.temperature, Some(0.4));
        assert_eq!(request.max_tokens, Some(128));
        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.messages[0].role, Role::System);
        assert_eq!(request.messages[0].content, "ctx");
        assert_eq!(request.messages[1].role, Role::User);
        assert_eq!(request.messages[1].content, "question");
    }

    #[tokio::test]
    async fn test_transient_errors_are_retried() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Err(LlmError::RateLimited("busy".to_string())),
            Err(LlmError::ApiError {
                code: 502,
                message: "bad gateway".to_string(),
            }),
            Ok("done".to_string()),
        ]));
        let gateway = Gateway::new(provider.clone(), fast_config());

        let completion = gateway
            .query(&Conversation::new("ctx", "q"), 0.0, None)
            .await
            .expect("third attempt succeeds");
        assert_eq!(completion.text, "done");
        assert_eq!(completion.attempts, 3);
        assert_eq!(provider.calls(), 3);
    }

    #[tokio::test]
    async fn test_retries_exhausted() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Err(LlmError::RequestFailed("connection reset".to_string())),
            Err(LlmError::RequestFailed("connection reset".to_string())),
            Err(LlmError::RequestFailed("connection reset".to_string())),
            Ok("too late".to_string()),
        ]));
        let gateway = Gateway::new(provider.clone(), fast_config());

        let err = gateway
            .query(&Conversation::new("ctx", "q"), 0.0, None)
            .await
            .expect_err("budget exhausted");
        assert!(matches!(err, LlmError::RetriesExhausted { attempts: 3, .. }));
        assert_eq!(provider.calls(), 3);
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_exhausts_retries() {
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .and_then(|l| l.local_addr())
            .expect("free port")
            .port();
        let client = ChatClient::new(
            format!("http://127.0.0.1:{}/v1", port),
            None,
            Duration::from_secs(5),
        )
        .expect("client");
        let gateway = Gateway::new(Arc::new(client), fast_config());

        let err = gateway
            .query(&Conversation::new("ctx", "q"), 0.0, None)
            .await
            .expect_err("nothing listens on the port");
        match err {
            LlmError::RetriesExhausted { attempts, last } => {
                assert_eq!(attempts, 3);
                assert!(matches!(*last, LlmError::Connection(_)));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_non_transient_error_fails_immediately() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Err(LlmError::ApiError {
                code: 401,
                message: "unauthorized".to_string(),
            }),
            Ok("unused".to_string()),
        ]));
        let gateway = Gateway::new(provider.clone(), fast_config());

        let err = gateway
            .query(&Conversation::new("ctx", "q"), 0.0, None)
            .await
            .expect_err("401 is fatal");
        assert!(matches!(err, LlmError::ApiError { code: 401, .. }));
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn test_timeout_is_retried_then_reported() {
        let config = fast_config()
            .with_max_attempts(2)
            .with_request_timeout(Duration::from_millis(20));
        let gateway = Gateway::new(Arc::new(SlowProvider), config);

        let err = gateway
            .query(&Conversation::new("ctx", "q"), 0.0, None)
            .await
            .expect_err("times out");
        match err {
            LlmError::RetriesExhausted { attempts, last } => {
                assert_eq!(attempts, 2);
                assert!(matches!(*last, LlmError::Timeout(_)));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_config_builder() {
        let config = GatewayConfig::new()
            .with_api_base("http://10.0.0.2:9000/v1")
            .with_api_key(None)
            .with_model("mixtral")
            .with_max_attempts(0);
        assert_eq!(config.api_base, "http://10.0.0.2:9000/v1");
        assert!(config.api_key.is_none());
        assert_eq!(config.model, "mixtral");
        assert_eq!(config.max_attempts, 1);
    }
}
