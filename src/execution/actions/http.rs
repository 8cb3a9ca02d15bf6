//! HTTP request action.
//!
//! Sends one HTTP request and reports the response as structured output:
//! `status`, `body` (parsed JSON when possible, raw string otherwise),
//! `headers`, `content_type` and `duration_ms`. A non-2xx status is NOT an
//! action failure; assertions decide what counts as success.

use std::time::Instant;

use async_trait::async_trait;
use log::debug;
use reqwest::Method;
use serde_json::{json, Value};

use super::{ActionError, ActionHandler};
use crate::flow::{HttpConfig, OutputData};

pub struct HttpHandler {
    client: reqwest::Client,
}

impl HttpHandler {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ActionHandler for HttpHandler {
    async fn execute(&self, config: Value) -> Result<OutputData, ActionError> {
        let config: HttpConfig = serde_json::from_value(config)
            .map_err(|e| ActionError::invalid(format!("http_request: {}", e)))?;

        let method: Method = config
            .method
            .to_uppercase()
            .parse()
            .map_err(|_| ActionError::invalid(format!("unknown HTTP method '{}'", config.method)))?;

        debug!("HTTP {} {}", method, config.url);

        let mut request = self.client.request(method, &config.url);
        for (name, value) in &config.headers {
            request = request.header(name, value);
        }
        if let Some(body) = &config.body {
            request = request.json(body);
        }

        let started = Instant::now();
        let response = request.send().await?;
        let status = response.status().as_u16();

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        let mut headers = OutputData::new();
        for (name, value) in response.headers() {
            if let Ok(value) = value.to_str() {
                headers.insert(name.to_string(), json!(value));
            }
        }

        let text = response.text().await?;
        let duration_ms = started.elapsed().as_millis() as u64;

        // JSON bodies become navigable structures; anything else stays a string
        let body: Value = serde_json::from_str(&text).unwrap_or(Value::String(text));

        debug!("HTTP response: status={} ({} ms)", status, duration_ms);

        let mut output = OutputData::new();
        output.insert("status".to_string(), json!(status));
        output.insert("body".to_string(), body);
        output.insert("headers".to_string(), Value::Object(headers));
        output.insert("content_type".to_string(), json!(content_type));
        output.insert("duration_ms".to_string(), json!(duration_ms));
        Ok(output)
    }
}
