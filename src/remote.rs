//! Client for a key server exposed through `serve`.
use reqwest::blocking::Client;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::json;
use crate::operation::{Operation, OperationResult};

/// Remote key server reached over HTTP.
#[derive(Debug)]
pub struct RemoteKeyServer {
    host: String,
    secret: Option<String>,
    client: Client,
}

impl RemoteKeyServer {
    /// Create a client and check that `host` answers the ping.
    pub fn new(host: impl Into<String>, secret: Option<String>) -> Result<Self> {
        let host = host.into().trim_end_matches('/').to_string();

        let client = Client::builder()
            .user_agent(concat!("rsfairplay/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Other(format!("Failed to build HTTP client: {}", e)))?;

        let response = client
            .get(format!("{}/", host))
            .send()
            .map_err(|e| Error::Other(format!("Failed to contact server: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::Other(format!(
                "Server did not respond successfully: {}",
                response.status()
            )));
        }

        match response.headers().get("Server").and_then(|v| v.to_str().ok()) {
            Some(server) if server.to_lowercase().contains("rsfairplay serve v") => {
                debug!("Remote key server: {}", server);
            }
            other => warn!(
                "Remote API does not identify as rsfairplay serve ({})",
                other.unwrap_or("no Server header")
            ),
        }

        Ok(Self {
            host,
            secret,
            client,
        })
    }

    /// Post a raw request document and return the response document.
    pub fn send(&self, request: &Value) -> Result<Value> {
        let mut builder = self.client.post(format!("{}/fps", self.host)).json(request);
        if let Some(secret) = &self.secret {
            builder = builder.header("X-Secret-Key", secret);
        }

        let response = builder
            .send()
            .map_err(|e| Error::Other(format!("Failed to send request: {}", e)))?;
        let status = response.status();
        let body: Value = response
            .json()
            .map_err(|e| Error::Other(format!("Invalid response: {}", e)))?;

        if !status.is_success() {
            let message = body
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("no message");
            return Err(Error::Other(format!(
                "Key server rejected the request ({}): {}",
                status, message
            )));
        }
        Ok(body)
    }

    /// Run a batch of operations on the remote server.
    pub fn process_operations(&self, operations: &[Operation]) -> Result<Vec<OperationResult>> {
        let response = self.send(&json::build_request(operations))?;
        let results = json::parse_response(&response)?;
        if results.len() != operations.len() {
            return Err(Error::Other(format!(
                "Key server returned {} results for {} operations",
                results.len(),
                operations.len()
            )));
        }
        Ok(results)
    }
}
