use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::{
    extract::{Path as UrlPath, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::config::document;
use crate::config::error::ConfigError;
use crate::config::local::SECTION_EXTENSION;
use crate::config::registry::{section_key, validate_name};
use crate::remote::protocol::{RemoteSectionCollection, RemoteSectionParam};

/// Shared state of the authority handlers.
#[derive(Clone)]
pub struct AuthorityState {
    inner: Arc<AuthorityInner>,
}

struct AuthorityInner {
    directory: PathBuf,
    public_url: String,
}

impl AuthorityState {
    /// Serve documents from `directory`; download URLs are built on `public_url`.
    pub fn new(directory: impl Into<PathBuf>, public_url: &str) -> Self {
        Self {
            inner: Arc::new(AuthorityInner {
                directory: directory.into(),
                public_url: public_url.trim_end_matches('/').to_string(),
            }),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.inner.directory
    }

    pub fn download_url(&self, section: &str) -> String {
        format!("{}/sections/{section}", self.inner.public_url)
    }

    /// Case-insensitive lookup of `<section>.config`.
    async fn find_document(&self, section: &str) -> Result<Option<PathBuf>, AuthorityError> {
        let wanted = section_key(&format!("{section}.{SECTION_EXTENSION}"));
        let directory = self.directory();
        let mut entries = tokio::fs::read_dir(directory)
            .await
            .map_err(|e| ConfigError::io(directory, e))?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| ConfigError::io(directory, e))?
        {
            let matches = entry
                .file_name()
                .to_str()
                .is_some_and(|name| section_key(name) == wanted);
            if matches {
                return Ok(Some(entry.path()));
            }
        }
        Ok(None)
    }
}

#[derive(Debug, Error)]
pub enum AuthorityError {
    #[error("section '{0}' not found")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl IntoResponse for AuthorityError {
    fn into_response(self) -> Response {
        let status = match &self {
            AuthorityError::NotFound(_) => StatusCode::NOT_FOUND,
            AuthorityError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AuthorityError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(error = %self, "Authority request failed");
        }
        (status, self.to_string()).into_response()
    }
}

/// `POST /sections/poll`
pub async fn poll(
    State(state): State<AuthorityState>,
    Json(request): Json<RemoteSectionCollection>,
) -> Result<Json<RemoteSectionCollection>, AuthorityError> {
    let mut newer = Vec::new();

    for held in &request.sections {
        if validate_name(&held.section_name).is_err() {
            tracing::warn!(section = %held.section_name, "Ignoring invalid section name in poll");
            continue;
        }
        let Some(path) = state.find_document(&held.section_name).await? else {
            continue;
        };

        let text = match tokio::fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to read section document");
                continue;
            }
        };
        let version = match document::read_version(&text) {
            Ok(version) => version,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Section document has no valid version");
                continue;
            }
        };

        if version.major != held.major_version || version.minor > held.minor_version {
            newer.push(RemoteSectionParam {
                section_name: held.section_name.clone(),
                major_version: version.major,
                minor_version: version.minor,
                download_url: Some(state.download_url(&held.section_name)),
            });
        }
    }

    tracing::info!(
        machine = %request.machine_name,
        application = %request.application_name,
        held = request.sections.len(),
        newer = newer.len(),
        "Poll answered"
    );
    Ok(Json(
        RemoteSectionCollection::new(request.machine_name, request.application_name).with_sections(newer),
    ))
}

/// `GET /sections/{name}`
pub async fn download(
    State(state): State<AuthorityState>,
    UrlPath(name): UrlPath<String>,
) -> Result<Response, AuthorityError> {
    validate_name(&name).map_err(|e| AuthorityError::BadRequest(e.to_string()))?;

    let path = state
        .find_document(&name)
        .await?
        .ok_or_else(|| AuthorityError::NotFound(name.clone()))?;
    let text = tokio::fs::read_to_string(&path)
        .await
        .map_err(|e| ConfigError::io(&path, e))?;

    tracing::debug!(section = %name, bytes = text.len(), "Section served");
    Ok(([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], text).into_response())
}
