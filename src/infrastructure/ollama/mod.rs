//! Ollama text generation client (native `/api/generate` API)

mod connection;

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::{self, Stream, StreamExt};
use serde::{Deserialize, Serialize};

use crate::application::ports::outbound::{
    ConnectionStatus, GenerateRequest, GenerateResponse, LlmError, TextGenPort, TokenChunk,
    TokenStream,
};
use crate::domain::value_objects::{ConnectionParams, GenerationParams};

pub use connection::OllamaConnection;

/// Client for the Ollama server
#[derive(Clone)]
pub struct OllamaClient {
    connection: Arc<OllamaConnection>,
    model: String,
}

impl OllamaClient {
    pub fn new(base_url: &str, model: &str, params: ConnectionParams) -> Self {
        Self {
            connection: Arc::new(OllamaConnection::new(base_url, params)),
            model: model.to_string(),
        }
    }

    fn request_body(
        &self,
        request: &GenerateRequest,
        stream: bool,
    ) -> Result<serde_json::Value, LlmError> {
        serde_json::to_value(OllamaGenerateRequest {
            model: &self.model,
            prompt: &request.prompt,
            system: request.system.as_deref(),
            stream,
            options: &request.options,
            format: request.json_format.then_some("json"),
        })
        .map_err(|e| LlmError::InvalidResponse(e.to_string()))
    }

    async fn post_generate(
        &self,
        operation_name: &str,
        body: serde_json::Value,
    ) -> Result<reqwest::Response, LlmError> {
        let url = self.connection.url("/api/generate");
        self.connection
            .execute(operation_name, |client| {
                let request = client.post(url.clone()).json(&body);
                async move {
                    let response = request
                        .send()
                        .await
                        .map_err(|e| LlmError::RequestFailed(e.to_string()))?;

                    if !response.status().is_success() {
                        let status = response.status();
                        let error_text = response
                            .text()
                            .await
                            .unwrap_or_else(|_| "Unknown error".to_string());
                        return Err(LlmError::RequestFailed(format!("{}: {}", status, error_text)));
                    }
                    Ok(response)
                }
            })
            .await
    }
}

#[derive(Debug, Serialize)]
struct OllamaGenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    stream: bool,
    options: &'a GenerationParams,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct OllamaGenerateResponse {
    #[serde(default)]
    model: String,
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[async_trait]
impl TextGenPort for OllamaClient {
    async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse, LlmError> {
        let body = self.request_body(&request, false)?;
        let response = self.post_generate("generate", body).await?;

        let api_response: OllamaGenerateResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        if let Some(error) = api_response.error {
            return Err(LlmError::InvalidResponse(error));
        }

        Ok(GenerateResponse {
            text: api_response.response,
            model: api_response.model,
        })
    }

    async fn generate_stream(&self, request: GenerateRequest) -> Result<TokenStream, LlmError> {
        let body = self.request_body(&request, true)?;
        let response = self.post_generate("generate_stream", body).await?;
        Ok(decode_ndjson(response.bytes_stream()))
    }

    async fn unload_model(&self) -> Result<(), LlmError> {
        let body = serde_json::json!({
            "model": self.model,
            "prompt": "",
            "keep_alive": 0,
            "stream": false,
        });
        self.post_generate("unload_model", body).await?;
        tracing::info!("Unloaded model {} from memory", self.model);
        Ok(())
    }

    async fn health_check(&self) -> bool {
        self.connection.health_check().await
    }

    async fn status(&self) -> ConnectionStatus {
        self.connection.status().await
    }
}

/// Decode a newline-delimited JSON body into token chunks
///
/// The stream ends after the chunk marked `done`, after an error, or when the
/// body ends.
fn decode_ndjson<S, B, E>(body: S) -> TokenStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let state = (body.boxed(), Vec::<u8>::new(), false);

    stream::unfold(state, |(mut body, mut buffer, finished)| async move {
        if finished {
            return None;
        }
        loop {
            if let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = buffer.drain(..=pos).collect();
                let line = String::from_utf8_lossy(&line);
                if line.trim().is_empty() {
                    continue;
                }
                let item = parse_line(line.trim());
                let done = !matches!(item, Ok(TokenChunk { done: false, .. }));
                return Some((item, (body, buffer, done)));
            }

            match body.next().await {
                Some(Ok(bytes)) => buffer.extend_from_slice(bytes.as_ref()),
                Some(Err(e)) => {
                    let error = LlmError::StreamInterrupted(e.to_string());
                    return Some((Err(error), (body, buffer, true)));
                }
                None => {
                    let rest = String::from_utf8_lossy(&buffer).trim().to_string();
                    if rest.is_empty() {
                        return None;
                    }
                    buffer.clear();
                    return Some((parse_line(&rest), (body, buffer, true)));
                }
            }
        }
    })
    .boxed()
}

fn parse_line(line: &str) -> Result<TokenChunk, LlmError> {
    let chunk: OllamaGenerateResponse =
        serde_json::from_str(line).map_err(|e| LlmError::InvalidResponse(e.to_string()))?;
    if let Some(error) = chunk.error {
        return Err(LlmError::StreamInterrupted(error));
    }
    Ok(TokenChunk {
        text: chunk.response,
        done: chunk.done,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use axum::{routing::get, routing::post, Json, Router};
    use tokio::net::TcpListener;

    fn params() -> ConnectionParams {
        ConnectionParams {
            timeout_secs: 5,
            max_retries: 2,
            retry_delay_secs: 0.01,
            backoff_factor: 1.5,
        }
    }

    /// Fake Ollama that records request bodies
    async fn spawn_ollama(bodies: Arc<Mutex<Vec<serde_json::Value>>>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let router = Router::new()
            .route(
                "/api/version",
                get(|| async { Json(serde_json::json!({"version": "0.5.7"})) }),
            )
            .route(
                "/api/generate",
                post(move |Json(body): Json<serde_json::Value>| {
                    let bodies = bodies.clone();
                    async move {
                        let streaming = body["stream"] == true;
                        bodies.lock().unwrap().push(body);
                        if streaming {
                            concat!(
                                "{\"model\":\"m\",\"response\":\"Жили-были \",\"done\":false}\n",
                                "{\"model\":\"m\",\"response\":\"дед и баба.\",\"done\":false}\n",
                                "{\"model\":\"m\",\"response\":\"\",\"done\":true}\n",
                            )
                            .to_string()
                        } else {
                            serde_json::json!({"model": "m", "response": "Привет", "done": true})
                                .to_string()
                        }
                    }
                }),
            );
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_generate_sends_options_and_reads_response() {
        let bodies = Arc::new(Mutex::new(Vec::new()));
        let url = spawn_ollama(bodies.clone()).await;
        let client = OllamaClient::new(&url, "gemma2:latest", params());

        let request = GenerateRequest::new("Скажи привет", GenerationParams::default())
            .with_system("Ты рассказчик")
            .json();
        let response = client.generate(request).await.unwrap();

        assert_eq!(response.text, "Привет");
        let body = bodies.lock().unwrap()[0].clone();
        assert_eq!(body["model"], "gemma2:latest");
        assert_eq!(body["system"], "Ты рассказчик");
        assert_eq!(body["stream"], false);
        assert_eq!(body["format"], "json");
        assert_eq!(body["options"]["num_ctx"], 4096);
    }

    #[tokio::test]
    async fn test_generate_stream_yields_chunks() {
        let bodies = Arc::new(Mutex::new(Vec::new()));
        let url = spawn_ollama(bodies.clone()).await;
        let client = OllamaClient::new(&url, "gemma2:latest", params());

        let stream = client
            .generate_stream(GenerateRequest::new("Сказка", GenerationParams::default()))
            .await
            .unwrap();
        let chunks: Vec<TokenChunk> = stream.map(|c| c.unwrap()).collect().await;

        let text: String = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(text, "Жили-были дед и баба.");
        assert!(chunks.last().unwrap().done);
        assert!(bodies.lock().unwrap()[0].get("format").is_none());
    }

    #[tokio::test]
    async fn test_unload_sends_keep_alive_zero() {
        let bodies = Arc::new(Mutex::new(Vec::new()));
        let url = spawn_ollama(bodies.clone()).await;
        let client = OllamaClient::new(&url, "gemma2:latest", params());

        client.unload_model().await.unwrap();

        let body = bodies.lock().unwrap()[0].clone();
        assert_eq!(body["keep_alive"], 0);
        assert_eq!(body["prompt"], "");
    }

    #[tokio::test]
    async fn test_decode_ndjson_across_fragment_boundaries() {
        let parts: Vec<Result<Vec<u8>, std::io::Error>> = vec![
            Ok(b"{\"response\":\"He".to_vec()),
            Ok(b"llo\",\"done\":false}\n\n{\"resp".to_vec()),
            Ok(b"onse\":\" world\",\"done\":true}".to_vec()),
        ];
        let chunks: Vec<_> = decode_ndjson(stream::iter(parts)).collect().await;

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].as_ref().unwrap().text, "Hello");
        assert_eq!(chunks[1].as_ref().unwrap().text, " world");
        assert!(chunks[1].as_ref().unwrap().done);
    }

    #[tokio::test]
    async fn test_decode_ndjson_stops_after_error() {
        let parts: Vec<Result<Vec<u8>, std::io::Error>> = vec![
            Ok(b"{\"response\":\"a\",\"done\":false}\n".to_vec()),
            Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset")),
            Ok(b"{\"response\":\"b\",\"done\":false}\n".to_vec()),
        ];
        let chunks: Vec<_> = decode_ndjson(stream::iter(parts)).collect().await;

        assert_eq!(chunks.len(), 2);
        assert!(matches!(chunks[1], Err(LlmError::StreamInterrupted(_))));
    }

    #[tokio::test]
    async fn test_error_line_ends_stream() {
        let parts: Vec<Result<Vec<u8>, std::io::Error>> =
            vec![Ok(b"{\"error\":\"model not found\"}\n".to_vec())];
        let chunks: Vec<_> = decode_ndjson(stream::iter(parts)).collect().await;

        assert_eq!(chunks.len(), 1);
        assert!(matches!(&chunks[0], Err(LlmError::StreamInterrupted(m)) if m == "model not found"));
    }
}
