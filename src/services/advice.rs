//! Hint provider behind the "ask advice" power-up.
//!
//! Advice is best effort: every failure maps to a short friendly string and
//! never reaches the game loop as an error.

use futures::future::{self, BoxFuture};

/// Reply when no advice backend is configured.
pub const ADVICE_UNAVAILABLE: &str = "AI friend unavailable.";
/// Reply when the model produced nothing useful.
pub const ADVICE_UNINSPIRED: &str = "AI friend uninspired!";
/// Reply when the prompt was blocked by the provider.
pub const ADVICE_BLOCKED: &str = "AI friend blocked!";
/// Reply when the provider answered with an unexpected shape.
pub const ADVICE_ODD_REPLY: &str = "AI friend odd reply.";
/// Reply when the provider could not be reached.
pub const ADVICE_CONNECTION_FAILED: &str = "AI connection fuzzy!";

/// Produces a short hint for a question without giving the answer away.
pub trait AdviceService: Send + Sync {
    /// Hint for `question` given its `options`; never fails.
    fn advise(&self, question: &str, options: &[String]) -> BoxFuture<'static, String>;
}

/// Advice service used when no API key is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableAdvisor;

impl AdviceService for UnavailableAdvisor {
    fn advise(&self, _question: &str, _options: &[String]) -> BoxFuture<'static, String> {
        Box::pin(future::ready(ADVICE_UNAVAILABLE.to_string()))
    }
}

/// Prompt sent to the language model.
pub fn build_prompt(question: &str, options: &[String]) -> String {
    format!(
        "Trivia Hint: Q:\"{question}\" Opts:{options:?}. Fun, subtle hint (1-2 sent.), not direct answer."
    )
}

/// Clean up model text, rejecting refusals and empty replies.
pub fn tidy_advice(raw: &str) -> String {
    let advice = raw.trim().replace("**", "");
    if advice.is_empty() || advice.contains("unable") || advice.contains("cannot") {
        ADVICE_UNINSPIRED.to_string()
    } else {
        advice
    }
}

#[cfg(feature = "gemini-advice")]
pub use self::gemini::{AdviceError, GeminiAdvisor};

#[cfg(feature = "gemini-advice")]
mod gemini {
    use std::{sync::Arc, time::Duration};

    use futures::future::BoxFuture;
    use reqwest::{Client, StatusCode};
    use serde::{Deserialize, Serialize};
    use thiserror::Error;
    use tracing::warn;

    use super::{
        ADVICE_BLOCKED, ADVICE_CONNECTION_FAILED, ADVICE_ODD_REPLY, AdviceService, build_prompt,
        tidy_advice,
    };

    const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";
    const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
    const SAFETY_CATEGORIES: [&str; 4] = [
        "HARM_CATEGORY_HARASSMENT",
        "HARM_CATEGORY_HATE_SPEECH",
        "HARM_CATEGORY_SEXUALLY_EXPLICIT",
        "HARM_CATEGORY_DANGEROUS_CONTENT",
    ];

    /// Failures while talking to the Gemini API.
    #[derive(Debug, Error)]
    pub enum AdviceError {
        /// Building the HTTP client failed.
        #[error("failed to build advice client")]
        ClientBuilder {
            /// Underlying client error.
            #[source]
            source: reqwest::Error,
        },
        /// The request could not be sent.
        #[error("failed to send advice request")]
        RequestSend {
            /// Underlying transport error.
            #[source]
            source: reqwest::Error,
        },
        /// The API answered with a non-success status.
        #[error("unexpected advice response status {status}")]
        RequestStatus {
            /// Status returned by the API.
            status: StatusCode,
        },
        /// The response body was not the expected JSON.
        #[error("failed to decode advice response")]
        DecodeResponse {
            /// Underlying decode error.
            #[source]
            source: reqwest::Error,
        },
    }

    #[derive(Serialize)]
    #[serde(rename_all = "camelCase")]
    struct GenerateRequest<'a> {
        contents: [Content<'a>; 1],
        generation_config: GenerationConfig,
        safety_settings: Vec<SafetySetting>,
    }

    #[derive(Serialize)]
    struct Content<'a> {
        parts: [Part<'a>; 1],
    }

    #[derive(Serialize)]
    struct Part<'a> {
        text: &'a str,
    }

    #[derive(Serialize)]
    #[serde(rename_all = "camelCase")]
    struct GenerationConfig {
        candidate_count: u8,
        max_output_tokens: u16,
        temperature: f32,
    }

    #[derive(Serialize)]
    struct SafetySetting {
        category: &'static str,
        threshold: &'static str,
    }

    #[derive(Debug, Default, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub(super) struct GenerateResponse {
        #[serde(default)]
        candidates: Vec<Candidate>,
        prompt_feedback: Option<PromptFeedback>,
    }

    #[derive(Debug, Deserialize)]
    struct Candidate {
        content: Option<CandidateContent>,
    }

    #[derive(Debug, Deserialize)]
    struct CandidateContent {
        #[serde(default)]
        parts: Vec<ResponsePart>,
    }

    #[derive(Debug, Deserialize)]
    struct ResponsePart {
        text: Option<String>,
    }

    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct PromptFeedback {
        block_reason: Option<String>,
    }

    impl GenerateResponse {
        fn text(&self) -> Option<String> {
            let text: String = self
                .candidates
                .first()?
                .content
                .as_ref()?
                .parts
                .iter()
                .filter_map(|part| part.text.as_deref())
                .collect();
            Some(text)
        }

        /// Map the raw response onto the hint shown to the player.
        pub(super) fn into_advice(self) -> String {
            if let Some(text) = self.text() {
                return tidy_advice(&text);
            }
            let blocked = self
                .prompt_feedback
                .as_ref()
                .and_then(|feedback| feedback.block_reason.as_ref())
                .is_some();
            if blocked {
                ADVICE_BLOCKED.to_string()
            } else {
                ADVICE_ODD_REPLY.to_string()
            }
        }
    }

    /// Advice service backed by Google's Gemini `generateContent` endpoint.
    #[derive(Clone)]
    pub struct GeminiAdvisor {
        client: Client,
        endpoint: Arc<str>,
        api_key: Arc<str>,
    }

    impl GeminiAdvisor {
        /// Build a client for `model` authenticated with `api_key`.
        pub fn new(model: &str, api_key: String) -> Result<Self, AdviceError> {
            let client = Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .map_err(|source| AdviceError::ClientBuilder { source })?;

            Ok(Self {
                client,
                endpoint: Arc::from(format!("{API_BASE}/{model}:generateContent")),
                api_key: Arc::from(api_key),
            })
        }

        async fn generate(&self, prompt: &str) -> Result<GenerateResponse, AdviceError> {
            let body = GenerateRequest {
                contents: [Content {
                    parts: [Part { text: prompt }],
                }],
                generation_config: GenerationConfig {
                    candidate_count: 1,
                    max_output_tokens: 150,
                    temperature: 0.8,
                },
                safety_settings: SAFETY_CATEGORIES
                    .into_iter()
                    .map(|category| SafetySetting {
                        category,
                        threshold: "BLOCK_NONE",
                    })
                    .collect(),
            };

            let response = self
                .client
                .post(self.endpoint.as_ref())
                .header("x-goog-api-key", self.api_key.as_ref())
                .json(&body)
                .send()
                .await
                .map_err(|source| AdviceError::RequestSend { source })?;

            if !response.status().is_success() {
                return Err(AdviceError::RequestStatus {
                    status: response.status(),
                });
            }

            response
                .json::<GenerateResponse>()
                .await
                .map_err(|source| AdviceError::DecodeResponse { source })
        }
    }

    impl AdviceService for GeminiAdvisor {
        fn advise(&self, question: &str, options: &[String]) -> BoxFuture<'static, String> {
            let advisor = self.clone();
            let prompt = build_prompt(question, options);
            Box::pin(async move {
                match advisor.generate(&prompt).await {
                    Ok(response) => response.into_advice(),
                    Err(err) => {
                        warn!(error = %err, "advice request failed");
                        ADVICE_CONNECTION_FAILED.to_string()
                    }
                }
            })
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use crate::services::advice::ADVICE_UNINSPIRED;

        fn parse(json: &str) -> GenerateResponse {
            serde_json::from_str(json).unwrap()
        }

        #[test]
        fn candidate_text_is_cleaned() {
            let response = parse(
                r#"{"candidates":[{"content":{"parts":[{"text":"  Think **red** planets. "}]}}]}"#,
            );
            assert_eq!(response.into_advice(), "Think red planets.");
        }

        #[test]
        fn refusals_are_uninspired() {
            let response = parse(
                r#"{"candidates":[{"content":{"parts":[{"text":"I cannot help with that."}]}}]}"#,
            );
            assert_eq!(response.into_advice(), ADVICE_UNINSPIRED);
        }

        #[test]
        fn blocked_prompt_is_reported() {
            let response = parse(r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#);
            assert_eq!(response.into_advice(), ADVICE_BLOCKED);
        }

        #[test]
        fn unexpected_shape_is_odd() {
            assert_eq!(parse("{}").into_advice(), ADVICE_ODD_REPLY);
        }
    }
}
