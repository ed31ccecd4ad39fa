use crate::config::{Config, GenerationSettings, API_KEY_VAR, OPENAI_API_KEY_VAR};
use crate::error::{AppError, Result};
use crate::types::ExtractionResult;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use reqwest::blocking::{Client, Response};
use serde_json::{json, Value};
use std::fs;
use std::path::Path;

const PDF_MIME: &str = "application/pdf";

const SAFETY_CATEGORIES: &[&str] = &[
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
];

/// Anything that can turn (model, document, prompt) into response text.
pub trait InferenceBackend {
    fn generate(&self, model: &str, document: &[u8], prompt: &str) -> Result<String>;
}

/// Hosted API family serving a model id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Gemini,
    OpenAi,
}

impl Provider {
    /// Splits a configured model id into its provider and the id sent on the wire.
    ///
    /// `openai:` and `gemini:` prefixes select explicitly. Otherwise `gpt-*`,
    /// `chatgpt-*` and o-series ids (`o1`, `o4-mini`, ...) go to OpenAI and
    /// everything else to Gemini.
    pub fn route(model: &str) -> (Provider, &str) {
        if let Some(rest) = model.strip_prefix("openai:") {
            return (Provider::OpenAi, rest);
        }
        if let Some(rest) = model.strip_prefix("gemini:") {
            return (Provider::Gemini, rest);
        }
        let o_series = model.starts_with('o') && model[1..].starts_with(|c: char| c.is_ascii_digit());
        if model.starts_with("gpt-") || model.starts_with("chatgpt-") || o_series {
            (Provider::OpenAi, model)
        } else {
            (Provider::Gemini, model)
        }
    }

    pub fn key_var(self) -> &'static str {
        match self {
            Provider::Gemini => API_KEY_VAR,
            Provider::OpenAi => OPENAI_API_KEY_VAR,
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Provider::Gemini => write!(f, "gemini"),
            Provider::OpenAi => write!(f, "openai"),
        }
    }
}

/// Providers needed by `models`, in first-use order.
pub fn providers_for(models: &[String]) -> Vec<Provider> {
    let mut out = Vec::new();
    for m in models {
        let (p, _) = Provider::route(m);
        if !out.contains(&p) {
            out.push(p);
        }
    }
    out
}

fn ensure_success(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().unwrap_or_default();
    Err(AppError::Api {
        status: status.as_u16(),
        body: if body.is_empty() {
            "Invalid key or model?".to_string()
        } else {
            body
        },
    })
}

/// Google Generative Language `generateContent` client.
pub struct GeminiClient {
    client: Client,
    api_key: String,
    api_base: String,
    generation: GenerationSettings,
}

impl GeminiClient {
    pub fn new(config: &Config, api_key: String) -> Result<Self> {
        let client = Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self {
            client,
            api_key,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            generation: config.generation.clone(),
        })
    }

    fn request_body(&self, document: &[u8], prompt: &str) -> Value {
        let safety: Vec<Value> = SAFETY_CATEGORIES
            .iter()
            .map(|c| json!({"category": c, "threshold": "BLOCK_NONE"}))
            .collect();
        json!({
            "contents": [{
                "role": "user",
                "parts": [
                    {"inline_data": {"mime_type": PDF_MIME, "data": BASE64.encode(document)}},
                    {"text": prompt}
                ]
            }],
            "generationConfig": {
                "temperature": self.generation.temperature,
                "maxOutputTokens": self.generation.max_output_tokens,
                "responseMimeType": "application/json"
            },
            "safetySettings": safety
        })
    }
}

impl InferenceBackend for GeminiClient {
    fn generate(&self, model: &str, document: &[u8], prompt: &str) -> Result<String> {
        let url = format!("{}/models/{}:generateContent", self.api_base, model);
        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&self.request_body(document, prompt))
            .send()?;
        let body: Value = ensure_success(response)?.json()?;
        response_text(&body)
    }
}

/// Concatenated text parts of the first candidate.
fn response_text(body: &Value) -> Result<String> {
    if let Some(reason) = body
        .get("promptFeedback")
        .and_then(|f| f.get("blockReason"))
        .and_then(|r| r.as_str())
    {
        return Err(AppError::Blocked(reason.to_string()));
    }
    let candidate = body
        .get("candidates")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .ok_or_else(|| AppError::Blocked("no candidates in response".to_string()))?;
    let empty_parts: Vec<Value> = vec![];
    let parts = candidate
        .get("content")
        .and_then(|c| c.get("parts"))
        .and_then(|p| p.as_array())
        .unwrap_or(&empty_parts);
    let text: String = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
        .collect();
    if text.is_empty() {
        let reason = candidate
            .get("finishReason")
            .and_then(|r| r.as_str())
            .unwrap_or("empty response");
        return Err(AppError::Blocked(reason.to_string()));
    }
    Ok(text)
}

/// OpenAI `chat/completions` client. The PDF goes inline as a file content part.
pub struct OpenAiClient {
    client: Client,
    api_key: String,
    api_base: String,
    generation: GenerationSettings,
}

impl OpenAiClient {
    pub fn new(config: &Config, api_key: String) -> Result<Self> {
        let client = Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self {
            client,
            api_key,
            api_base: config.openai_api_base.trim_end_matches('/').to_string(),
            generation: config.generation.clone(),
        })
    }

    fn request_body(&self, model: &str, document: &[u8], prompt: &str) -> Value {
        let data_url = format!("data:{};base64,{}", PDF_MIME, BASE64.encode(document));
        json!({
            "model": model,
            "temperature": self.generation.temperature,
            "max_tokens": self.generation.max_output_tokens,
            "response_format": {"type": "json_object"},
            "messages": [{
                "role": "user",
                "content": [
                    {"type": "file", "file": {"filename": "invoice.pdf", "file_data": data_url}},
                    {"type": "text", "text": prompt}
                ]
            }]
        })
    }
}

impl InferenceBackend for OpenAiClient {
    fn generate(&self, model: &str, document: &[u8], prompt: &str) -> Result<String> {
        let url = format!("{}/chat/completions", self.api_base);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&self.request_body(model, document, prompt))
            .send()?;
        let body: Value = ensure_success(response)?.json()?;
        completion_text(&body)
    }
}

/// Message content of the first choice.
fn completion_text(body: &Value) -> Result<String> {
    let choice = body
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .ok_or_else(|| AppError::Blocked("no choices in response".to_string()))?;
    let message = choice.get("message");
    if let Some(refusal) = message.and_then(|m| m.get("refusal")).and_then(|r| r.as_str()) {
        return Err(AppError::Blocked(refusal.to_string()));
    }
    let text = message
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .unwrap_or_default();
    if text.is_empty() {
        let reason = choice
            .get("finish_reason")
            .and_then(|r| r.as_str())
            .unwrap_or("empty response");
        return Err(AppError::Blocked(reason.to_string()));
    }
    Ok(text.to_string())
}

/// Dispatches each model id to the backend of its provider.
#[derive(Default)]
pub struct ProviderRouter {
    backends: Vec<(Provider, Box<dyn InferenceBackend>)>,
}

impl ProviderRouter {
    /// Builds one client per provider the configured models need.
    /// `key_for` resolves a credential variable; its error aborts construction.
    pub fn from_config<F>(config: &Config, key_for: F) -> Result<Self>
    where
        F: Fn(&'static str) -> Result<String>,
    {
        let mut router = Self::default();
        for provider in providers_for(&config.models) {
            let key = key_for(provider.key_var())?;
            let backend: Box<dyn InferenceBackend> = match provider {
                Provider::Gemini => Box::new(GeminiClient::new(config, key)?),
                Provider::OpenAi => Box::new(OpenAiClient::new(config, key)?),
            };
            router = router.with_backend(provider, backend);
        }
        Ok(router)
    }

    pub fn with_backend(mut self, provider: Provider, backend: Box<dyn InferenceBackend>) -> Self {
        self.backends.retain(|(p, _)| *p != provider);
        self.backends.push((provider, backend));
        self
    }
}

impl InferenceBackend for ProviderRouter {
    fn generate(&self, model: &str, document: &[u8], prompt: &str) -> Result<String> {
        let (provider, wire_model) = Provider::route(model);
        let backend = self
            .backends
            .iter()
            .find(|(p, _)| *p == provider)
            .map(|(_, b)| b)
            .ok_or_else(|| AppError::Config(format!("no {} client configured for '{}'", provider, model)))?;
        tracing::debug!("routing {} to {} as {}", model, provider, wire_model);
        backend.generate(wire_model, document, prompt)
    }
}

/// Parses a model reply that should contain a JSON object, tolerating prose around it.
///
/// Tries the first complete JSON value starting at each `{` in turn, so trailing
/// notes (even ones with braces) are ignored. Text without any `{` is parsed whole.
pub fn parse_model_response(text: &str) -> Result<Value> {
    let parse_error = |e: serde_json::Error| AppError::Parse {
        message: e.to_string(),
        raw: text.to_string(),
    };
    let mut first_error = None;
    for (start, _) in text.match_indices('{') {
        let mut stream = serde_json::Deserializer::from_str(&text[start..]).into_iter::<Value>();
        match stream.next() {
            Some(Ok(value)) => return Ok(value),
            Some(Err(e)) => {
                first_error.get_or_insert(e);
            }
            None => {}
        }
    }
    match first_error {
        Some(e) => Err(parse_error(e)),
        None => serde_json::from_str(text.trim()).map_err(parse_error),
    }
}

/// Runs one extraction. Every failure becomes an error record.
pub fn extract_document(backend: &dyn InferenceBackend, path: &Path, model: &str, prompt: &str) -> ExtractionResult {
    let bytes = match fs::read(path) {
        Ok(b) => b,
        Err(e) => {
            let message = if e.kind() == std::io::ErrorKind::NotFound {
                "File not found.".to_string()
            } else {
                format!("Could not read file: {}", e)
            };
            return ExtractionResult::failed(message, None);
        }
    };

    let text = match backend.generate(model, &bytes, prompt) {
        Ok(t) => t,
        Err(e) => return ExtractionResult::failed(e.to_string(), None),
    };
    tracing::debug!("{} answered with {} chars", model, text.len());

    match parse_model_response(&text) {
        Ok(v) => ExtractionResult::Parsed(v),
        Err(e) => {
            let raw = e.raw_response().map(str::to_string);
            ExtractionResult::failed(e.to_string(), raw)
        }
    }
}
