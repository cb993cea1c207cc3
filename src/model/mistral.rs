use std::io::{BufRead, BufReader};
use std::ops::ControlFlow;
use std::sync::OnceLock;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use log::{debug, info};
use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::json;

use super::TextGenerator;
use crate::config::AppConfig;

// A blocking client for the mistral.rs server's streaming completions API.
pub struct MistralServerModel {
    server_url: String,
    model_name: String,
    temperature: f32,
    top_p: f32,
    // Built on first use so it is only ever created from a blocking thread.
    client: OnceLock<Client>,
}

#[derive(Debug, Deserialize)]
struct CompletionChunk {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, PartialEq)]
enum SseLine {
    Skip,
    Done,
    Piece { text: String, finished: bool },
}

impl MistralServerModel {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            server_url: config.server_url.trim_end_matches('/').to_string(),
            model_name: config.model_name.clone(),
            temperature: config.temperature,
            top_p: config.top_p,
            client: OnceLock::new(),
        }
    }

    fn client(&self) -> Result<&Client> {
        if let Some(client) = self.client.get() {
            return Ok(client);
        }
        // Generations can legitimately stream for minutes, so only the connect is bounded.
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(None::<Duration>)
            .build()
            .context("failed to build HTTP client")?;
        let _ = self.client.set(client);
        self.client
            .get()
            .ok_or_else(|| anyhow!("HTTP client unavailable"))
    }
}

impl TextGenerator for MistralServerModel {
    fn generate(
        &self,
        prompt: &str,
        max_tokens: usize,
        emit: &mut dyn FnMut(String) -> ControlFlow<()>,
    ) -> Result<()> {
        let url = format!("{}/v1/completions", self.server_url);
        let payload = json!({
            "model": self.model_name,
            "prompt": prompt,
            "temperature": self.temperature,
            "top_p": self.top_p,
            "max_tokens": max_tokens,
            "stream": true
        });

        info!("Sending streaming request to mistral.rs server with max_tokens: {}", max_tokens);
        debug!("Payload: {}", payload);

        let response = self
            .client()?
            .post(&url)
            .json(&payload)
            .send()
            .with_context(|| format!("request to {} failed", url))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().unwrap_or_default();
            return Err(anyhow!("API request failed ({}): {}", status, error_text));
        }

        let reader = BufReader::new(response);
        for line in reader.lines() {
            let line = line.context("stream from mistral.rs server broke off")?;
            match parse_sse_line(&line)? {
                SseLine::Skip => continue,
                SseLine::Done => break,
                SseLine::Piece { text, finished } => {
                    if !text.is_empty() && emit(text).is_break() {
                        debug!("Consumer asked to stop, dropping upstream stream");
                        break;
                    }
                    if finished {
                        break;
                    }
                }
            }
        }

        Ok(())
    }
}

fn parse_sse_line(line: &str) -> Result<SseLine> {
    let Some(data) = line.strip_prefix("data:") else {
        return Ok(SseLine::Skip);
    };
    let data = data.trim();
    if data.is_empty() {
        return Ok(SseLine::Skip);
    }
    if data == "[DONE]" {
        return Ok(SseLine::Done);
    }

    let chunk: CompletionChunk =
        serde_json::from_str(data).with_context(|| format!("malformed stream chunk: {}", data))?;
    let Some(choice) = chunk.choices.into_iter().next() else {
        return Ok(SseLine::Skip);
    };
    Ok(SseLine::Piece {
        text: choice.text.unwrap_or_default(),
        finished: choice.finish_reason.is_some(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ignores_comments_and_blank_lines() {
        assert_eq!(parse_sse_line("").unwrap(), SseLine::Skip);
        assert_eq!(parse_sse_line(": keep-alive").unwrap(), SseLine::Skip);
        assert_eq!(parse_sse_line("event: message").unwrap(), SseLine::Skip);
        assert_eq!(parse_sse_line("data:   ").unwrap(), SseLine::Skip);
    }

    #[test]
    fn recognises_done_marker() {
        assert_eq!(parse_sse_line("data: [DONE]").unwrap(), SseLine::Done);
    }

    #[test]
    fn extracts_text_and_finish_reason() {
        let line = r#"data: {"id":"cmpl-1","choices":[{"index":0,"text":"Hel","finish_reason":null}]}"#;
        assert_eq!(
            parse_sse_line(line).unwrap(),
            SseLine::Piece { text: "Hel".to_string(), finished: false }
        );

        let line = r#"data: {"choices":[{"text":"!","finish_reason":"length"}]}"#;
        assert_eq!(
            parse_sse_line(line).unwrap(),
            SseLine::Piece { text: "!".to_string(), finished: true }
        );
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(parse_sse_line("data: {not json").is_err());
    }

    #[test]
    fn trims_trailing_slash_from_server_url() {
        let config = AppConfig {
            server_url: "http://localhost:8081/".to_string(),
            ..AppConfig::default()
        };
        assert_eq!(MistralServerModel::new(&config).server_url, "http://localhost:8081");
    }
}
