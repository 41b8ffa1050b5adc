use reqwest::Client;
use std::error::Error;
use std::fmt;
use tracing::debug;

use super::endpoints::{
    GenerateContentRequest, GenerateContentResponse, DEFAULT_GEMINI_MODEL, GEMINI_API_BASE,
};
use super::retry::{fetch_with_retry, RetryPolicy, Sleeper, TokioSleeper};

#[derive(Debug)]
pub enum ApiConnectionError {
    MissingApiKey(String),
    NetworkError(reqwest::Error),
    SerializationError(serde_json::Error),
    ApiError {
        status: reqwest::StatusCode,
        error_body: String,
    },
    EmptyCandidate,
    InvalidRetryPolicy(String),
    RetriesExhausted {
        attempts: u32,
        last_error: Box<ApiConnectionError>,
    },
}

impl fmt::Display for ApiConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiConnectionError::MissingApiKey(hint) => write!(f, "No API key available: {}", hint),
            ApiConnectionError::NetworkError(err) => write!(f, "Network error: {}", err),
            ApiConnectionError::SerializationError(err) => {
                write!(f, "Serialization error: {}", err)
            }
            ApiConnectionError::ApiError { status, error_body } => {
                write!(f, "API error {}: {}", status, error_body)
            }
            ApiConnectionError::EmptyCandidate => {
                write!(f, "API response contained no candidate text")
            }
            ApiConnectionError::InvalidRetryPolicy(reason) => {
                write!(f, "Invalid retry policy: {}", reason)
            }
            ApiConnectionError::RetriesExhausted { attempts, .. } => {
                let noun = if *attempts == 1 { "attempt" } else { "attempts" };
                write!(f, "Request failed after {} {}", attempts, noun)
            }
        }
    }
}

impl Error for ApiConnectionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ApiConnectionError::NetworkError(err) => Some(err),
            ApiConnectionError::SerializationError(err) => Some(err),
            ApiConnectionError::RetriesExhausted { last_error, .. } => Some(last_error.as_ref()),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ApiConnectionError {
    fn from(err: reqwest::Error) -> Self {
        // The URL can carry credentials; keep it out of logs and error chains.
        ApiConnectionError::NetworkError(err.without_url())
    }
}

impl From<serde_json::Error> for ApiConnectionError {
    fn from(err: serde_json::Error) -> Self {
        ApiConnectionError::SerializationError(err)
    }
}

/// Client for the `generateContent` endpoint. Every call goes through
/// [`fetch_with_retry`] with the client's policy.
#[derive(Debug, Clone)]
pub struct GeminiClient<S = TokioSleeper> {
    http: Client,
    base_url: String,
    model: String,
    api_key: String,
    retry: RetryPolicy,
    sleeper: S,
}

impl GeminiClient<TokioSleeper> {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url: GEMINI_API_BASE.to_string(),
            model: DEFAULT_GEMINI_MODEL.to_string(),
            api_key: api_key.into(),
            retry: RetryPolicy::default(),
            sleeper: TokioSleeper,
        }
    }
}

impl<S: Sleeper> GeminiClient<S> {
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_sleeper<T: Sleeper>(self, sleeper: T) -> GeminiClient<T> {
        GeminiClient {
            http: self.http,
            base_url: self.base_url,
            model: self.model,
            api_key: self.api_key,
            retry: self.retry,
            sleeper,
        }
    }

    pub fn endpoint_url(&self) -> String {
        format!("{}/v1beta/models/{}:generateContent", self.base_url, self.model)
    }

    pub async fn generate_content(
        &self,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse, ApiConnectionError> {
        let url = self.endpoint_url();
        let url = url.as_str();
        fetch_with_retry(&self.retry, &self.sleeper, move |attempt| async move {
            self.send_once(url, request, attempt).await
        })
        .await
    }

    async fn send_once(
        &self,
        url: &str,
        request: &GenerateContentRequest,
        attempt: u32,
    ) -> Result<GenerateContentResponse, ApiConnectionError> {
        debug!(attempt, model = %self.model, "sending generateContent request");
        let response = self
            .http
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await?;

        if response.status().is_success() {
            Ok(response.json::<GenerateContentResponse>().await?)
        } else {
            let status = response.status();
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body".to_string());
            Err(ApiConnectionError::ApiError { status, error_body })
        }
    }
}
