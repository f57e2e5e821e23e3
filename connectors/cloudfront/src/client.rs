//! [`PolicyApi`] over the JSON REST surface.
//!
//! | Call | Method | Path | Version header |
//! |---|---|---|---|
//! | create | `POST` | `/origin-request-policy` | returns `ETag` |
//! | get | `GET` | `/origin-request-policy/{id}` | returns `ETag` |
//! | update | `PUT` | `/origin-request-policy/{id}` | sends `If-Match`, returns `ETag` |
//! | delete | `DELETE` | `/origin-request-policy/{id}` | sends `If-Match` |
//!
//! Error responses carry `{"Error": {"Code": ..., "Message": ...}}`.

use async_trait::async_trait;
use orp_core::api::{ApiError, PolicyApi};
use orp_core::remote::{PolicyEnvelope, RemotePolicy, RemotePolicyConfig};
use orp_core::types::{ETag, PolicyId};
use reqwest::header::{ETAG, IF_MATCH, RETRY_AFTER};
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};
use url::Url;

use crate::config::CloudFrontConfig;
use crate::error::{CloudFrontError, CloudFrontResult};

const RESOURCE: &str = "origin-request-policy";

/// Response body wrapping a stored policy.
#[derive(Debug, Serialize, Deserialize)]
pub struct PolicyBody {
    #[serde(rename = "OriginRequestPolicy")]
    pub policy: RemotePolicy,
}

/// Request body for create and update.
#[derive(Debug, Serialize)]
struct ConfigBody<'a> {
    #[serde(rename = "OriginRequestPolicyConfig")]
    config: &'a RemotePolicyConfig,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(rename = "Error")]
    error: ErrorDetail,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ErrorDetail {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// HTTP client for the origin request policy API.
#[derive(Debug, Clone)]
pub struct HttpPolicyApi {
    client: Client,
    base: Url,
}

impl HttpPolicyApi {
    /// Build a client from validated configuration.
    ///
    /// # Errors
    /// `CloudFrontError::Config` for an invalid configuration, or
    /// `CloudFrontError::Http` if the HTTP client cannot be built.
    pub fn new(config: &CloudFrontConfig) -> CloudFrontResult<Self> {
        config.validate()?;
        let client = Client::builder()
            .connect_timeout(config.connect_timeout())
            .timeout(config.request_timeout())
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self {
            client,
            base: config.base_url()?,
        })
    }

    /// The API root this client talks to.
    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base
    }

    fn url(&self, id: Option<&PolicyId>) -> CloudFrontResult<Url> {
        let mut url = self.base.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|()| {
                CloudFrontError::Config(format!("{} cannot be a base URL", self.base))
            })?;
            segments.pop_if_empty().push(RESOURCE);
            if let Some(id) = id {
                segments.push(id.as_str());
            }
        }
        Ok(url)
    }

    async fn send(request: RequestBuilder) -> CloudFrontResult<Response> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<u64>().ok());
        let text = response.text().await.unwrap_or_default();
        let detail = serde_json::from_str::<ErrorBody>(&text)
            .map(|body| body.error)
            .unwrap_or_default();
        let message = detail.message.unwrap_or_else(|| {
            if text.is_empty() {
                status.canonical_reason().unwrap_or("unknown error").to_string()
            } else {
                text
            }
        });

        let err = CloudFrontError::Api {
            status: status.as_u16(),
            code: detail.code,
            message,
            retry_after,
        };
        if err.is_retryable() {
            warn!(error = %err, "retryable API error");
        } else {
            debug!(error = %err, "API error");
        }
        Err(err)
    }

    fn etag(response: &Response) -> CloudFrontResult<ETag> {
        response
            .headers()
            .get(ETAG)
            .and_then(|value| value.to_str().ok())
            .map(ETag::new)
            .ok_or_else(|| CloudFrontError::MissingETag {
                status: response.status().as_u16(),
            })
    }

    async fn read_envelope(response: Response) -> CloudFrontResult<PolicyEnvelope> {
        let etag = Self::etag(&response)?;
        let status = response.status().as_u16();
        let bytes = response.bytes().await?;
        let body: PolicyBody =
            serde_json::from_slice(&bytes).map_err(|e| CloudFrontError::Decode {
                status,
                message: e.to_string(),
            })?;
        Ok(PolicyEnvelope {
            policy: body.policy,
            etag,
        })
    }

    /// Create a policy.
    ///
    /// # Errors
    /// Any [`CloudFrontError`].
    #[instrument(skip(self, config), fields(name = %config.name))]
    pub async fn create(&self, config: &RemotePolicyConfig) -> CloudFrontResult<PolicyEnvelope> {
        let body = ConfigBody { config };
        let response = Self::send(self.client.post(self.url(None)?).json(&body)).await?;
        let envelope = Self::read_envelope(response).await?;
        debug!(policy_id = %envelope.policy.id, etag = %envelope.etag, "created");
        Ok(envelope)
    }

    /// Fetch a policy.
    ///
    /// # Errors
    /// Any [`CloudFrontError`].
    #[instrument(skip(self), fields(policy_id = %id))]
    pub async fn get(&self, id: &PolicyId) -> CloudFrontResult<PolicyEnvelope> {
        let response = Self::send(self.client.get(self.url(Some(id))?)).await?;
        Self::read_envelope(response).await
    }

    /// Replace a policy's configuration.
    ///
    /// # Errors
    /// Any [`CloudFrontError`].
    #[instrument(skip(self, config), fields(policy_id = %id, if_match = %etag))]
    pub async fn update(
        &self,
        id: &PolicyId,
        etag: &ETag,
        config: &RemotePolicyConfig,
    ) -> CloudFrontResult<PolicyEnvelope> {
        let body = ConfigBody { config };
        let request = self
            .client
            .put(self.url(Some(id))?)
            .header(IF_MATCH, etag.as_str())
            .json(&body);
        let response = Self::send(request).await?;
        Self::read_envelope(response).await
    }

    /// Delete a policy.
    ///
    /// # Errors
    /// Any [`CloudFrontError`].
    #[instrument(skip(self), fields(policy_id = %id, if_match = %etag))]
    pub async fn delete(&self, id: &PolicyId, etag: &ETag) -> CloudFrontResult<()> {
        let request = self
            .client
            .delete(self.url(Some(id))?)
            .header(IF_MATCH, etag.as_str());
        Self::send(request).await?;
        Ok(())
    }
}

#[async_trait]
impl PolicyApi for HttpPolicyApi {
    async fn create_policy(
        &self,
        config: &RemotePolicyConfig,
    ) -> Result<(PolicyId, ETag), ApiError> {
        let envelope = self.create(config).await?;
        Ok((envelope.policy.id, envelope.etag))
    }

    async fn get_policy(&self, id: &PolicyId) -> Result<PolicyEnvelope, ApiError> {
        Ok(self.get(id).await?)
    }

    async fn update_policy(
        &self,
        id: &PolicyId,
        etag: &ETag,
        config: &RemotePolicyConfig,
    ) -> Result<ETag, ApiError> {
        Ok(self.update(id, etag, config).await?.etag)
    }

    async fn delete_policy(&self, id: &PolicyId, etag: &ETag) -> Result<(), ApiError> {
        Ok(self.delete(id, etag).await?)
    }
}
