//! Supabase-backed remote store: PostgREST for the comments table and the
//! storage API for the photo bucket.

use std::env;

use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;

use super::{CommentPatch, NewComment, RemoteComment, RemoteError, RemoteResult, RemoteStore};
use crate::util::is_http_url;

const ENV_URL: &str = "SUPABASE_URL";
const ENV_ANON_KEY: &str = "SUPABASE_ANON_KEY";
const ENV_TABLE: &str = "CORKBOARD_COMMENTS_TABLE";
const ENV_BUCKET: &str = "CORKBOARD_PHOTO_BUCKET";

const DEFAULT_TABLE: &str = "comments";
const DEFAULT_BUCKET: &str = "comment-photos";

/// Error codes reported when a targeted column does not exist: `PGRST204`
/// comes from the PostgREST schema cache, `42703` from Postgres itself.
const MISSING_COLUMN_CODES: &[&str] = &["PGRST204", "42703"];

/// Supabase connection configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteConfig {
    /// Project base URL, without a trailing slash.
    pub url: String,
    /// Anon key used for both `apikey` and bearer auth headers.
    pub anon_key: String,
    /// Comments table name.
    pub table: String,
    /// Photo bucket name.
    pub bucket: String,
}

impl RemoteConfig {
    /// Load Supabase configuration from environment variables.
    ///
    /// Returns `Ok(None)` when no Supabase variables are set.
    /// Returns an error when only a partial configuration is provided.
    pub fn from_env() -> RemoteResult<Option<Self>> {
        parse_config(|key| env::var(key).ok())
    }

    /// PostgREST endpoint for the comments table.
    #[must_use]
    pub fn rest_endpoint(&self) -> String {
        format!("{}/rest/v1/{}", self.url, self.table)
    }

    /// Storage endpoint for an object key in the photo bucket.
    #[must_use]
    pub fn storage_object_url(&self, object_key: &str) -> String {
        format!(
            "{}/storage/v1/object/{}/{}",
            self.url, self.bucket, object_key
        )
    }

    /// Public URL the bucket serves an object key under.
    #[must_use]
    pub fn public_photo_url(&self, object_key: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{}",
            self.url, self.bucket, object_key
        )
    }
}

/// Remote store talking to a Supabase project.
#[derive(Clone)]
pub struct SupabaseStore {
    config: RemoteConfig,
    client: Client,
}

impl SupabaseStore {
    pub fn new(config: RemoteConfig) -> RemoteResult<Self> {
        Ok(Self {
            config,
            client: Client::builder().build()?,
        })
    }

    #[must_use]
    pub const fn config(&self) -> &RemoteConfig {
        &self.config
    }

    fn authed(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.config.anon_key)
            .header("Authorization", format!("Bearer {}", self.config.anon_key))
    }

    async fn rest_rows(&self, request: RequestBuilder) -> RemoteResult<Vec<RemoteComment>> {
        let response = self.authed(request).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(rest_error(status, &body));
        }
        Ok(response.json::<Vec<RemoteComment>>().await?)
    }
}

impl RemoteStore for SupabaseStore {
    async fn select_comments(&self) -> RemoteResult<Vec<RemoteComment>> {
        let request = self
            .client
            .get(self.config.rest_endpoint())
            .query(&[("select", "*"), ("order", "created_at.desc")]);
        self.rest_rows(request).await
    }

    async fn insert_comment(&self, new: &NewComment) -> RemoteResult<RemoteComment> {
        let request = self
            .client
            .post(self.config.rest_endpoint())
            .header("Prefer", "return=representation")
            .json(new);
        let mut rows = self.rest_rows(request).await?;
        if rows.is_empty() {
            return Err(RemoteError::InvalidPayload(
                "Insert did not return the stored row".to_string(),
            ));
        }
        Ok(rows.swap_remove(0))
    }

    async fn update_comment(&self, id: &str, patch: &CommentPatch) -> RemoteResult<u64> {
        let request = self
            .client
            .patch(self.config.rest_endpoint())
            .query(&[("id", format!("eq.{id}"))])
            .header("Prefer", "return=representation")
            .json(patch);
        let response = self.authed(request).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(patch_error(status, &body, &patch.column_names()));
        }
        let rows = response.json::<Vec<RemoteComment>>().await?;
        Ok(rows.len() as u64)
    }

    async fn delete_comment(&self, id: &str) -> RemoteResult<u64> {
        let request = self
            .client
            .delete(self.config.rest_endpoint())
            .query(&[("id", format!("eq.{id}"))])
            .header("Prefer", "return=representation");
        let rows = self.rest_rows(request).await?;
        Ok(rows.len() as u64)
    }

    async fn comment_exists(&self, id: &str) -> RemoteResult<bool> {
        let request = self
            .client
            .get(self.config.rest_endpoint())
            .query(&[
                ("select", "id".to_string()),
                ("id", format!("eq.{id}")),
                ("limit", "1".to_string()),
            ]);
        let rows = self.rest_rows(request).await?;
        Ok(!rows.is_empty())
    }

    async fn upload_photo(
        &self,
        key: &str,
        bytes: &[u8],
        content_type: Option<&str>,
    ) -> RemoteResult<String> {
        let key = normalize_object_key(key)?;
        let mut request = self
            .client
            .post(self.config.storage_object_url(&key))
            .body(bytes.to_vec());

        if let Some(content_type) = normalize_content_type(content_type) {
            request = request.header("Content-Type", content_type);
        }

        let response = self.authed(request).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(rest_error(status, &body));
        }

        Ok(self.config.public_photo_url(&key))
    }

    async fn remove_photo(&self, key: &str) -> RemoteResult<()> {
        let key = normalize_object_key(key)?;
        let request = self.client.delete(self.config.storage_object_url(&key));

        let response = self.authed(request).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(rest_error(status, &body));
        }

        Ok(())
    }

    fn photo_key(&self, url: &str) -> Option<String> {
        let prefix = self.config.public_photo_url("");
        let key = url.strip_prefix(&prefix)?.trim_matches('/');
        if key.is_empty() {
            return None;
        }
        Some(key.to_string())
    }
}

fn parse_config(lookup: impl Fn(&str) -> Option<String>) -> RemoteResult<Option<RemoteConfig>> {
    let url = lookup(ENV_URL).map(|value| value.trim().to_string());
    let anon_key = lookup(ENV_ANON_KEY).map(|value| value.trim().to_string());
    let table = lookup(ENV_TABLE).map(|value| value.trim().to_string());
    let bucket = lookup(ENV_BUCKET).map(|value| value.trim().to_string());

    let any_present = url.is_some() || anon_key.is_some() || table.is_some() || bucket.is_some();
    if !any_present {
        return Ok(None);
    }

    let mut missing = Vec::new();
    if url.as_ref().map_or(true, String::is_empty) {
        missing.push(ENV_URL);
    }
    if anon_key.as_ref().map_or(true, String::is_empty) {
        missing.push(ENV_ANON_KEY);
    }

    if !missing.is_empty() {
        return Err(RemoteError::InvalidConfiguration(format!(
            "Supabase configuration is incomplete. Missing: {}",
            missing.join(", ")
        )));
    }

    Ok(Some(RemoteConfig {
        url: normalize_base_url(&url.unwrap_or_default())?,
        anon_key: anon_key.unwrap_or_default(),
        table: table
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_TABLE.to_string()),
        bucket: bucket
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_BUCKET.to_string()),
    }))
}

fn normalize_base_url(url: &str) -> RemoteResult<String> {
    let trimmed = url.trim().trim_end_matches('/');
    if !is_http_url(trimmed) {
        return Err(RemoteError::InvalidConfiguration(format!(
            "{ENV_URL} must include http:// or https://"
        )));
    }
    Ok(trimmed.to_string())
}

fn normalize_object_key(object_key: &str) -> RemoteResult<String> {
    let object_key = object_key.trim().trim_matches('/').to_string();
    if object_key.is_empty() {
        return Err(RemoteError::InvalidPayload(
            "Photo object key cannot be empty".to_string(),
        ));
    }
    Ok(object_key)
}

fn normalize_content_type(content_type: Option<&str>) -> Option<String> {
    content_type
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
}

#[derive(Debug, Deserialize)]
struct RestErrorBody {
    code: Option<String>,
    message: Option<String>,
    msg: Option<String>,
    error: Option<String>,
    hint: Option<String>,
}

fn parse_error_body(status: StatusCode, body: &str) -> (Option<String>, String) {
    if let Ok(payload) = serde_json::from_str::<RestErrorBody>(body) {
        let code = payload.code.or(payload.error);
        if let Some(message) = payload.message.or(payload.msg).or(payload.hint) {
            return (code, message.trim().to_string());
        }
        if code.is_some() {
            return (code, format!("HTTP {}", status.as_u16()));
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        (None, format!("HTTP {}", status.as_u16()))
    } else {
        (None, trimmed.to_string())
    }
}

fn rest_error(status: StatusCode, body: &str) -> RemoteError {
    let (code, message) = parse_error_body(status, body);
    RemoteError::Api {
        status: status.as_u16(),
        code,
        message,
    }
}

/// Map a PATCH rejection, surfacing a missing moderation column as its own
/// variant so callers can fall back to the local override store.
fn patch_error(status: StatusCode, body: &str, columns: &[&'static str]) -> RemoteError {
    let (code, message) = parse_error_body(status, body);
    let column_missing = code
        .as_deref()
        .is_some_and(|code| MISSING_COLUMN_CODES.contains(&code));
    if column_missing {
        if let Some(column) = columns.first() {
            return RemoteError::MissingColumn {
                column: (*column).to_string(),
            };
        }
    }

    RemoteError::Api {
        status: status.as_u16(),
        code,
        message,
    }
}
