//! HTTP implementation of [`MetadataSource`].

use async_trait::async_trait;
use rolegate_authz::{
    AuthzResult, MetadataCategory, MetadataSource, PermissionMeta, ResourceMeta, RoleMeta,
};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use url::Url;

use crate::ClientResult;
use crate::config::ClientConfig;
use crate::error::ClientError;

/// List payload accepted from the backend: a bare array or `{ "data": [..] }`.
#[derive(Deserialize)]
#[serde(untagged)]
enum ListBody<T> {
    Bare(Vec<T>),
    Wrapped { data: Vec<T> },
}

impl<T> ListBody<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            Self::Bare(items) | Self::Wrapped { data: items } => items,
        }
    }
}

/// Fetches console metadata from the backend REST API.
///
/// The subject credential, when present, is sent as a bearer token.
#[derive(Debug, Clone)]
pub struct RestMetadataSource {
    http: reqwest::Client,
    config: ClientConfig,
}

impl RestMetadataSource {
    /// Creates a source from a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::InvalidUrl` if the configuration is invalid,
    /// or `ClientError::Network` if the HTTP client cannot be built.
    pub fn new(config: ClientConfig) -> ClientResult<Self> {
        config
            .validate()
            .map_err(|e| ClientError::InvalidUrl(e.to_string()))?;

        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ClientError::Network(format!("failed to create HTTP client: {e}")))?;

        Ok(Self { http, config })
    }

    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn endpoint(&self, path: &str) -> ClientResult<Url> {
        let raw = format!("{}{}", self.config.base_url.trim_end_matches('/'), path);
        Url::parse(&raw).map_err(|e| ClientError::InvalidUrl(format!("{raw}: {e}")))
    }

    fn path_for(&self, category: MetadataCategory) -> &str {
        match category {
            MetadataCategory::Resources => &self.config.resources_path,
            MetadataCategory::Permissions => &self.config.permissions_path,
            MetadataCategory::Roles => &self.config.roles_path,
        }
    }

    /// Fetch one metadata list.
    ///
    /// # Errors
    ///
    /// Returns a `ClientError` on transport failure, non-2xx status, or a
    /// body that is not a JSON list of `T`.
    pub async fn fetch_list<T: DeserializeOwned>(
        &self,
        category: MetadataCategory,
        credential: Option<&str>,
    ) -> ClientResult<Vec<T>> {
        let url = self.endpoint(self.path_for(category))?;

        let mut request = self
            .http
            .get(url.as_str())
            .header("Accept", "application/json");
        if let Some(token) = credential {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| {
            tracing::warn!(category = %category, url = %url, error = %e, "Metadata request failed");
            ClientError::from(e)
        })?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(category = %category, url = %url, status = status.as_u16(), "Metadata request rejected");
            return Err(ClientError::Http(status.as_u16()));
        }

        let body = response.text().await?;
        let items = serde_json::from_str::<ListBody<T>>(&body)
            .map_err(|e| ClientError::Parse(format!("{category} from {url}: {e}")))?
            .into_vec();

        tracing::debug!(category = %category, count = items.len(), "Metadata fetched");
        Ok(items)
    }
}

#[async_trait]
impl MetadataSource for RestMetadataSource {
    async fn fetch_resources(&self, credential: Option<&str>) -> AuthzResult<Vec<ResourceMeta>> {
        self.fetch_list(MetadataCategory::Resources, credential)
            .await
            .map_err(|e| e.into_authz(MetadataCategory::Resources))
    }

    async fn fetch_permissions(
        &self,
        credential: Option<&str>,
    ) -> AuthzResult<Vec<PermissionMeta>> {
        self.fetch_list(MetadataCategory::Permissions, credential)
            .await
            .map_err(|e| e.into_authz(MetadataCategory::Permissions))
    }

    async fn fetch_roles(&self, credential: Option<&str>) -> AuthzResult<Vec<RoleMeta>> {
        self.fetch_list(MetadataCategory::Roles, credential)
            .await
            .map_err(|e| e.into_authz(MetadataCategory::Roles))
    }
}
