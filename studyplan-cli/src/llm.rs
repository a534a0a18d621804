//! HTTP completion client. Implements the core `Completer` and the ingest
//! `ImageReader` by bridging the async request into the caller's thread.

use anyhow::{anyhow, bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use studyplan_core::{Completer, CompletionPurpose};
use studyplan_ingest::{image_media_type, ImageReader, READ_IMAGE_PROMPT};
use tracing::debug;

use crate::auth::AuthState;
use crate::config::{LlmSection, StageTemperatures};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Anthropic,
    OpenAI,
}

impl Provider {
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" | "openai-compatible" | "groq" => Ok(Provider::OpenAI),
            "anthropic" | "claude" => Ok(Provider::Anthropic),
            other => bail!("unknown llm provider {other:?} (expected openai or anthropic)"),
        }
    }

    pub fn default_base_url(self) -> &'static str {
        match self {
            Provider::Anthropic => "https://api.anthropic.com",
            Provider::OpenAI => "https://api.openai.com",
        }
    }

    fn endpoint(self, base_url: &str) -> String {
        let base = base_url.trim_end_matches('/');
        match self {
            Provider::Anthropic => format!("{base}/v1/messages"),
            Provider::OpenAI => format!("{base}/v1/chat/completions"),
        }
    }
}

/// One image attached to a prompt.
#[derive(Debug, Clone)]
struct ImageData {
    media_type: &'static str,
    base64: String,
}

/// Provider-neutral request: text, an optional image, and the sampling
/// temperature for this call.
struct Prompt<'a> {
    text: &'a str,
    image: Option<&'a ImageData>,
    temperature: f32,
}

#[derive(Serialize)]
#[serde(untagged)]
enum MsgContent<'a, P> {
    Text(&'a str),
    Parts(Vec<P>),
}

#[derive(Serialize)]
struct Msg<'a, P> {
    role: &'a str,
    content: MsgContent<'a, P>,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AnthropicPart<'a> {
    Image { source: AnthropicImage<'a> },
    Text { text: &'a str },
}

#[derive(Serialize)]
struct AnthropicImage<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    media_type: &'static str,
    data: &'a str,
}

#[derive(Serialize)]
struct AnthropicReq<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    messages: Vec<Msg<'a, AnthropicPart<'a>>>,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum OpenAiPart<'a> {
    Text { text: &'a str },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Serialize)]
struct OpenAiReq<'a> {
    model: &'a str,
    messages: Vec<Msg<'a, OpenAiPart<'a>>>,
    temperature: f32,
    max_tokens: u32,
}

fn anthropic_request<'a>(model: &'a str, max_tokens: u32, prompt: &Prompt<'a>) -> AnthropicReq<'a> {
    let content = match prompt.image {
        None => MsgContent::Text(prompt.text),
        Some(img) => MsgContent::Parts(vec![
            AnthropicPart::Image {
                source: AnthropicImage {
                    kind: "base64",
                    media_type: img.media_type,
                    data: &img.base64,
                },
            },
            AnthropicPart::Text { text: prompt.text },
        ]),
    };
    AnthropicReq {
        model,
        max_tokens,
        temperature: prompt.temperature,
        messages: vec![Msg { role: "user", content }],
    }
}

fn openai_request<'a>(model: &'a str, max_tokens: u32, prompt: &Prompt<'a>) -> OpenAiReq<'a> {
    let content = match prompt.image {
        None => MsgContent::Text(prompt.text),
        Some(img) => MsgContent::Parts(vec![
            OpenAiPart::Text { text: prompt.text },
            OpenAiPart::ImageUrl {
                image_url: ImageUrl {
                    url: format!("data:{};base64,{}", img.media_type, img.base64),
                },
            },
        ]),
    };
    OpenAiReq {
        model,
        messages: vec![Msg { role: "user", content }],
        temperature: prompt.temperature,
        max_tokens,
    }
}

#[derive(Debug, Clone)]
pub struct LlmCompleter {
    provider: Provider,
    model: String,
    base_url: String,
    temperatures: StageTemperatures,
    max_tokens: u32,
    key: String,
    client: reqwest::Client,
}

impl LlmCompleter {
    pub fn from_config(section: &LlmSection, auth: &AuthState) -> Result<Self> {
        let provider = Provider::parse(&section.provider)?;
        let key = match provider {
            Provider::Anthropic => auth.anthropic_key().ok_or_else(|| {
                anyhow!("missing Anthropic key; run: studyplan auth paste-anthropic-token (or set ANTHROPIC_API_KEY)")
            })?,
            Provider::OpenAI => auth.openai_key().ok_or_else(|| {
                anyhow!("missing API key; run: studyplan auth paste-openai-api-key (or set OPENAI_API_KEY)")
            })?,
        };
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(section.timeout_secs))
            .build()
            .context("build http client")?;

        Ok(Self {
            provider,
            model: section.model.clone(),
            base_url: section
                .base_url
                .clone()
                .unwrap_or_else(|| provider.default_base_url().to_string()),
            temperatures: section.temperature,
            max_tokens: section.max_tokens,
            key,
            client,
        })
    }

    /// Same endpoint and credentials, different model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    fn chat_complete(&self, prompt: &Prompt<'_>) -> Result<String> {
        // Already inside #[tokio::main]: a nested block_on would panic.
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            tokio::task::block_in_place(|| handle.block_on(self.complete_async(prompt)))
        } else {
            let rt = tokio::runtime::Runtime::new().context("create tokio runtime")?;
            rt.block_on(self.complete_async(prompt))
        }
    }

    async fn complete_async(&self, prompt: &Prompt<'_>) -> Result<String> {
        debug!(
            provider = ?self.provider,
            model = %self.model,
            chars = prompt.text.len(),
            image = prompt.image.is_some(),
            temperature = prompt.temperature,
            "completion request"
        );
        match self.provider {
            Provider::Anthropic => self.anthropic_complete(prompt).await,
            Provider::OpenAI => self.openai_complete(prompt).await,
        }
    }

    async fn anthropic_complete(&self, prompt: &Prompt<'_>) -> Result<String> {
        #[derive(Deserialize)]
        struct Resp {
            content: Vec<ContentBlock>,
        }

        #[derive(Deserialize)]
        struct ContentBlock {
            #[serde(rename = "type")]
            t: String,
            text: Option<String>,
        }

        let body = anthropic_request(&self.model, self.max_tokens, prompt);

        let mut headers = HeaderMap::new();
        // Console API keys use x-api-key; setup tokens are bearer tokens.
        if self.key.starts_with("sk-ant-api") {
            headers.insert("x-api-key", HeaderValue::from_str(&self.key)?);
        } else {
            headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {}", self.key))?);
        }
        headers.insert("anthropic-version", HeaderValue::from_static("2023-06-01"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let resp = self
            .client
            .post(self.provider.endpoint(&self.base_url))
            .headers(headers)
            .json(&body)
            .send()
            .await
            .context("anthropic request")?;

        let status = resp.status();
        if !status.is_success() {
            let txt = resp.text().await.unwrap_or_default();
            bail!("anthropic error: {status} {txt}");
        }

        let out: Resp = resp.json().await.context("parse anthropic response")?;
        let mut s = String::new();
        for b in out.content {
            if b.t == "text" {
                if let Some(t) = b.text {
                    s.push_str(&t);
                }
            }
        }
        Ok(s.trim().to_string())
    }

    async fn openai_complete(&self, prompt: &Prompt<'_>) -> Result<String> {
        #[derive(Deserialize)]
        struct Resp {
            choices: Vec<Choice>,
        }

        #[derive(Deserialize)]
        struct Choice {
            message: MsgOut,
        }

        #[derive(Deserialize)]
        struct MsgOut {
            content: Option<String>,
        }

        let body = openai_request(&self.model, self.max_tokens, prompt);

        let resp = self
            .client
            .post(self.provider.endpoint(&self.base_url))
            .header(AUTHORIZATION, format!("Bearer {}", self.key))
            .json(&body)
            .send()
            .await
            .context("openai request")?;

        let status = resp.status();
        if !status.is_success() {
            let txt = resp.text().await.unwrap_or_default();
            bail!("openai error: {status} {txt}");
        }

        let out: Resp = resp.json().await.context("parse openai response")?;
        let content = out
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .unwrap_or_default();

        Ok(content.trim().to_string())
    }
}

impl Completer for LlmCompleter {
    fn complete(&self, prompt: &str) -> Result<String> {
        self.complete_for(CompletionPurpose::Schedule, prompt)
    }

    fn complete_for(&self, purpose: CompletionPurpose, prompt: &str) -> Result<String> {
        self.chat_complete(&Prompt {
            text: prompt,
            image: None,
            temperature: self.temperatures.for_purpose(purpose),
        })
    }
}

impl ImageReader for LlmCompleter {
    fn read_image(&self, path: &Path) -> Result<String> {
        let media_type =
            image_media_type(path).ok_or_else(|| anyhow!("not a supported image: {}", path.display()))?;
        let bytes = fs::read(path).with_context(|| format!("read {}", path.display()))?;
        let image = ImageData {
            media_type,
            base64: BASE64.encode(bytes),
        };
        self.chat_complete(&Prompt {
            text: READ_IMAGE_PROMPT,
            image: Some(&image),
            temperature: self.temperatures.for_purpose(CompletionPurpose::Extract),
        })
    }
}
