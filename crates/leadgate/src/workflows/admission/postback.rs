use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use tracing::{debug, warn};

use crate::config::PostbackConfig;
use crate::retry::{retry_with_backoff, RetryPolicy};

/// Result of notifying the downstream partner. Failures are data, not errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostbackOutcome {
    Delivered { status: u16, attempts: u32 },
    /// No endpoint is configured, so no postback is required.
    NotRequired,
    Failed { detail: String, attempts: u32 },
}

impl PostbackOutcome {
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            PostbackOutcome::Delivered { .. } | PostbackOutcome::NotRequired
        )
    }
}

/// Outbound acceptance notification hook.
#[async_trait]
pub trait PostbackGateway: Send + Sync {
    async fn forward(&self, click_id: &str) -> PostbackOutcome;
}

#[derive(Debug, thiserror::Error)]
pub enum PostbackSetupError {
    #[error("postback endpoint '{endpoint}' is not a valid URL: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },
    #[error("unable to build postback HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

#[derive(Debug)]
enum AttemptError {
    Status(StatusCode),
    Transport(reqwest::Error),
}

impl AttemptError {
    /// Server errors, timeouts and transport failures are retried; 4xx never are.
    fn is_retryable(&self) -> bool {
        match self {
            AttemptError::Status(status) => status.is_server_error(),
            AttemptError::Transport(_) => true,
        }
    }

    fn describe(&self) -> String {
        match self {
            AttemptError::Status(status) => format!("postback returned HTTP {}", status.as_u16()),
            AttemptError::Transport(err) if err.is_timeout() => "postback timed out".to_string(),
            AttemptError::Transport(err) => format!("postback transport error: {err}"),
        }
    }
}

/// GET-style postback carrying the click id as the `clickid` query parameter.
#[derive(Debug, Clone)]
pub struct HttpPostbackForwarder {
    http: reqwest::Client,
    endpoint: Option<Url>,
    policy: RetryPolicy,
}

impl HttpPostbackForwarder {
    pub fn new(config: &PostbackConfig) -> Result<Self, PostbackSetupError> {
        let endpoint = config
            .endpoint
            .as_deref()
            .map(|raw| {
                Url::parse(raw).map_err(|err| PostbackSetupError::InvalidEndpoint {
                    endpoint: raw.to_string(),
                    reason: err.to_string(),
                })
            })
            .transpose()?;
        let http = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            http,
            endpoint,
            policy: RetryPolicy::new(config.max_attempts, config.initial_backoff),
        })
    }

    fn url_for(endpoint: &Url, click_id: &str) -> Url {
        let mut url = endpoint.clone();
        let retained: Vec<(String, String)> = endpoint
            .query_pairs()
            .filter(|(key, _)| key != "clickid")
            .map(|(key, value)| (key.into_owned(), value.into_owned()))
            .collect();
        url.query_pairs_mut()
            .clear()
            .extend_pairs(retained)
            .append_pair("clickid", click_id);
        url
    }

    async fn attempt(&self, url: Url) -> Result<u16, AttemptError> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(AttemptError::Transport)?;
        let status = response.status();
        if status.is_success() {
            Ok(status.as_u16())
        } else {
            Err(AttemptError::Status(status))
        }
    }
}

#[async_trait]
impl PostbackGateway for HttpPostbackForwarder {
    async fn forward(&self, click_id: &str) -> PostbackOutcome {
        let Some(endpoint) = &self.endpoint else {
            return PostbackOutcome::NotRequired;
        };
        let url = Self::url_for(endpoint, click_id);

        let outcome = retry_with_backoff(
            &self.policy,
            |attempt| {
                debug!(attempt, click_id, "sending postback");
                self.attempt(url.clone())
            },
            AttemptError::is_retryable,
        )
        .await;

        match outcome.result {
            Ok(status) => PostbackOutcome::Delivered {
                status,
                attempts: outcome.attempts,
            },
            Err(error) => {
                let detail = error.describe();
                warn!(click_id, attempts = outcome.attempts, %detail, "postback failed");
                PostbackOutcome::Failed {
                    detail,
                    attempts: outcome.attempts,
                }
            }
        }
    }
}
