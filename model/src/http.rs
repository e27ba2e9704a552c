use std::time::Duration;

use anyhow::{Context, Result};
use log::debug;
use reqwest::{Client, Response};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use super::{PolicyRef, PolicyService, SampleRequest, ServiceError, ServiceOptions, TrainingBatch, TrainingExample};

/// JSON-over-HTTP client for the remote inference and training service.
///
/// `POST {service_url}/v1/sample` returns a single completion for a prompt under a model id.
/// `POST {service_url}/v1/train` applies one gradient step and returns the id of the new weights.
pub struct HttpPolicyService {
    client: Client,
    service_url: String,
    learning_rate: f32,
}

#[derive(Serialize)]
struct SampleBody<'a> {
    model_id: &'a str,
    prompt: &'a str,
    max_tokens: usize,
    temperature: f32,
    seed: u64,
}

#[derive(Deserialize)]
struct SampleResponse {
    completion: String,
}

#[derive(Serialize)]
struct TrainBody<'a> {
    model_id: &'a str,
    run_name: &'a str,
    iteration: usize,
    learning_rate: f32,
    examples: &'a [TrainingExample],
}

#[derive(Deserialize)]
struct TrainResponse {
    model_id: String,
}

impl HttpPolicyService {
    pub fn new(options: &ServiceOptions) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(options.request_timeout_ms))
            .build()
            .context("Failed to build http client")?;

        Ok(Self {
            client,
            service_url: options.service_url.trim_end_matches('/').to_string(),
            learning_rate: options.learning_rate,
        })
    }

    async fn post<B: Serialize, R: DeserializeOwned>(&self, path: &str, body: &B) -> Result<R, ServiceError> {
        let url = format!("{}{}", self.service_url, path);
        debug!("POST {}", url);

        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        decode(response).await
    }
}

async fn decode<R: DeserializeOwned>(response: Response) -> Result<R, ServiceError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ServiceError::Status {
            status: status.as_u16(),
            body,
        });
    }

    let bytes = response.bytes().await.map_err(map_reqwest_error)?;
    serde_json::from_slice(&bytes).map_err(|err| ServiceError::Decode(err.to_string()))
}

fn map_reqwest_error(err: reqwest::Error) -> ServiceError {
    if err.is_timeout() {
        ServiceError::Timeout
    } else if err.is_decode() {
        ServiceError::Decode(err.to_string())
    } else {
        ServiceError::Transport(err.to_string())
    }
}

impl PolicyService for HttpPolicyService {
    async fn sample(&self, policy: &PolicyRef, request: &SampleRequest) -> Result<String, ServiceError> {
        let body = SampleBody {
            model_id: policy.model_id(),
            prompt: &request.prompt,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            seed: request.seed,
        };

        let response: SampleResponse = self.post("/v1/sample", &body).await?;
        Ok(response.completion)
    }

    async fn train(&self, batch: &TrainingBatch) -> Result<PolicyRef, ServiceError> {
        let body = TrainBody {
            model_id: batch.policy.model_id(),
            run_name: batch.policy.run_name(),
            iteration: batch.iteration,
            learning_rate: self.learning_rate,
            examples: &batch.examples,
        };

        let response: TrainResponse = self.post("/v1/train", &body).await?;

        Ok(PolicyRef::new(
            batch.policy.run_name().to_string(),
            batch.policy.version() + 1,
            response.model_id,
        ))
    }
}
