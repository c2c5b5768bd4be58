use super::{ChatRequest, LlmError, StreamChunk};
use crate::control::StopToken;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub base_url: String,
}

#[derive(Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(rename = "systemInstruction", skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
}

#[derive(Serialize, Deserialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Serialize, Deserialize)]
struct Part {
    text: String,
}

#[derive(Deserialize)]
struct StreamResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<Content>,
    #[serde(rename = "finishReason")]
    finish_reason: Option<String>,
}

fn build_request(request: &ChatRequest) -> GenerateRequest {
    // The system message travels in its own field, not in the contents list.
    let system_instruction = request
        .messages
        .iter()
        .find(|m| m.role == "system")
        .map(|m| Content {
            role: None,
            parts: vec![Part {
                text: m.content.clone(),
            }],
        });

    let contents = request
        .messages
        .iter()
        .filter(|m| m.role != "system")
        .map(|m| Content {
            role: Some(if m.role == "assistant" {
                "model".to_string()
            } else {
                "user".to_string()
            }),
            parts: vec![Part {
                text: m.content.clone(),
            }],
        })
        .collect();

    GenerateRequest {
        contents,
        system_instruction,
    }
}

/// Parse one SSE data payload. Returns the text delta (if any) and whether
/// the candidate carried a finish reason.
fn parse_data(data: &str) -> (Option<String>, bool) {
    let Ok(parsed) = serde_json::from_str::<StreamResponse>(data) else {
        return (None, false);
    };
    let Some(candidate) = parsed.candidates.into_iter().next() else {
        return (None, false);
    };
    let text = candidate
        .content
        .map(|c| {
            c.parts
                .into_iter()
                .map(|p| p.text)
                .collect::<String>()
        })
        .filter(|t| !t.is_empty());
    (text, candidate.finish_reason.is_some())
}

/// Streaming generate call. Fragments are handed to `on_chunk` as they
/// arrive; a final chunk with `done = true` marks the end of the stream.
/// The stop token is honored between network chunks: the call returns early
/// with whatever was received and no done chunk is emitted.
pub async fn chat_stream(
    config: &GeminiConfig,
    request: &ChatRequest,
    stop: &StopToken,
    on_chunk: impl Fn(StreamChunk) + Send,
) -> Result<String, LlmError> {
    let client = Client::new();
    let body = build_request(request);

    let resp = client
        .post(format!(
            "{}/v1beta/models/{}:streamGenerateContent?alt=sse",
            config.base_url, request.model
        ))
        .header("Content-Type", "application/json")
        .header("x-goog-api-key", &config.api_key)
        .json(&body)
        .send()
        .await?;

    if !resp.status().is_success() {
        let status = resp.status().as_u16();
        let text = resp.text().await.unwrap_or_default();
        return Err(LlmError::Api {
            status,
            message: text,
        });
    }

    let mut full_content = String::new();
    let mut stream = resp.bytes_stream();
    let mut buffer = String::new();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if stop.is_stopped() {
            return Ok(full_content);
        }
        buffer.push_str(&String::from_utf8_lossy(&chunk));

        while let Some(pos) = buffer.find('\n') {
            let line = buffer[..pos].trim().to_string();
            buffer = buffer[pos + 1..].to_string();

            if let Some(data) = line.strip_prefix("data: ") {
                let (text, finished) = parse_data(data);
                if let Some(text) = text {
                    full_content.push_str(&text);
                    on_chunk(StreamChunk {
                        delta: text,
                        done: false,
                    });
                }
                if finished {
                    on_chunk(StreamChunk {
                        delta: String::new(),
                        done: true,
                    });
                    return Ok(full_content);
                }
            }
        }
    }

    on_chunk(StreamChunk {
        delta: String::new(),
        done: true,
    });
    Ok(full_content)
}
