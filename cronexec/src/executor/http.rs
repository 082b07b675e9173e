use async_trait::async_trait;
use reqwest::{Client, Method};

use crate::job::Job;

use super::{ExecutionError, Executor};

/// Issues an HTTP request to the URL held in [`Job::command`].
///
/// A response status outside `200..300` is a failure whose output is the response body.
#[derive(Debug, Clone, Default)]
pub struct HttpExecutor {
    client: Client,
}

impl HttpExecutor {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Executor for HttpExecutor {
    async fn execute(&self, job: &Job) -> Result<String, ExecutionError> {
        let method = Method::from_bytes(job.http_method().as_bytes())
            .map_err(|err| ExecutionError::failed(format!("invalid HTTP method: {err}")))?;

        let mut request = self.client.request(method, &job.command);
        for (key, value) in &job.headers {
            request = request.header(key, value);
        }
        if let Some(body) = job.body.as_ref().filter(|body| !body.is_empty()) {
            request = request.body(body.clone());
        }

        let response = request
            .send()
            .await
            .map_err(|err| ExecutionError::failed(format!("request failed: {err}")))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| ExecutionError::failed(format!("failed to read response: {err}")))?;

        if status.is_success() {
            Ok(body)
        } else {
            Err(ExecutionError::Failed {
                message: format!("unexpected response status {status}"),
                output: body,
            })
        }
    }
}
