//! Thin REST client: URL templating, body encoding, and response normalisation.

use std::time::Duration;

use reqwest::{
    header::{CONTENT_DISPOSITION, CONTENT_TYPE},
    multipart::{Form, Part},
    Client, Method,
};
use serde_json::{Map, Value};
use shared::error::ApiError;
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::config::{Settings, SettingsError};

const DEFAULT_DOWNLOAD_NAME: &str = "download";

#[derive(Debug, Error)]
pub enum RestError {
    #[error("invalid url '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("url '{0}' cannot carry path segments")]
    CannotBeABase(String),
    #[error("missing path parameter '{0}'")]
    MissingPathParam(String),
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Settings(#[from] SettingsError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    Json,
    Multipart,
    None,
}

#[derive(Debug, Clone)]
pub struct FilePart {
    pub field: String,
    pub filename: String,
    pub mime_type: Option<String>,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct RestRequest {
    pub method: Method,
    /// Path template relative to the API base, or an absolute URL.
    pub path: String,
    pub content_type: ContentType,
    pub path_params: Map<String, Value>,
    pub query: Map<String, Value>,
    pub body: Option<Value>,
    pub files: Vec<FilePart>,
    pub bearer_token: Option<String>,
    pub timeout: Option<Duration>,
}

impl RestRequest {
    pub fn new(method: Method, path: impl Into<String>, content_type: ContentType) -> Self {
        Self {
            method,
            path: path.into(),
            content_type,
            path_params: Map::new(),
            query: Map::new(),
            body: None,
            files: Vec::new(),
            bearer_token: None,
            timeout: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Attachment {
    pub filename: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResponseData {
    Json(Value),
    Text(String),
    Attachment(Attachment),
    Empty,
}

/// Normalised `{ data, status }` pair handed to handlers.
#[derive(Debug, Clone, PartialEq)]
pub struct RestResponse {
    pub data: ResponseData,
    pub status: u16,
}

impl RestResponse {
    pub fn json(&self) -> Option<&Value> {
        match &self.data {
            ResponseData::Json(value) => Some(value),
            _ => None,
        }
    }

    pub fn field(&self, key: &str) -> Option<&Value> {
        self.json().and_then(|value| value.get(key))
    }

    /// The body as a JSON value suitable for storing; text bodies become
    /// strings, empty bodies and attachments become `null`.
    pub fn to_value(&self) -> Value {
        match &self.data {
            ResponseData::Json(value) => value.clone(),
            ResponseData::Text(text) => Value::String(text.clone()),
            ResponseData::Attachment(_) | ResponseData::Empty => Value::Null,
        }
    }

    pub fn attachment(&self) -> Option<&Attachment> {
        match &self.data {
            ResponseData::Attachment(attachment) => Some(attachment),
            _ => None,
        }
    }

    pub fn api_error(&self) -> Option<ApiError> {
        self.json().and_then(ApiError::from_body)
    }
}

#[derive(Clone)]
pub struct RestClient {
    http: Client,
    base_url: String,
    default_timeout: Option<Duration>,
}

impl RestClient {
    pub fn new(settings: &Settings) -> Result<Self, RestError> {
        Ok(Self {
            http: Client::new(),
            base_url: settings.api_base_url()?,
            default_timeout: settings.request_timeout(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn execute(&self, request: RestRequest) -> Result<RestResponse, RestError> {
        let url = build_url(
            &self.base_url,
            &request.path,
            &request.path_params,
            &request.query,
        )?;
        debug!(method = %request.method, %url, "rest: sending request");

        let mut builder = self.http.request(request.method.clone(), url);
        if let Some(timeout) = request.timeout.or(self.default_timeout) {
            builder = builder.timeout(timeout);
        }
        if let Some(token) = &request.bearer_token {
            builder = builder.bearer_auth(token);
        }
        builder = match request.content_type {
            ContentType::Json => match &request.body {
                Some(body) => builder.json(body),
                None => builder,
            },
            ContentType::Multipart => {
                builder.multipart(multipart_form(request.body.as_ref(), request.files)?)
            }
            ContentType::None => builder,
        };

        let response = builder.send().await?;
        normalize_response(response).await
    }
}

/// Resolves a path template against `base`.
///
/// `{name}` placeholders are filled from `path_params` and encoded as path
/// segments; query values follow JSON rules (arrays repeat the key, `null`
/// is skipped).
pub fn build_url(
    base: &str,
    template: &str,
    path_params: &Map<String, Value>,
    query: &Map<String, Value>,
) -> Result<Url, RestError> {
    let (root, path) = if template.starts_with("http://") || template.starts_with("https://") {
        split_absolute(template)
    } else {
        (base, template)
    };

    let mut url = Url::parse(root).map_err(|source| RestError::InvalidUrl {
        url: root.to_string(),
        source,
    })?;
    {
        let mut segments = url
            .path_segments_mut()
            .map_err(|_| RestError::CannotBeABase(root.to_string()))?;
        segments.pop_if_empty();
        for segment in path.split('/').filter(|segment| !segment.is_empty()) {
            segments.push(&substitute_segment(segment, path_params)?);
        }
    }

    let mut pairs = Vec::new();
    for (key, value) in query {
        match value {
            Value::Array(items) => {
                for item in items {
                    if let Some(text) = query_text(item) {
                        pairs.push((key.as_str(), text));
                    }
                }
            }
            other => {
                if let Some(text) = query_text(other) {
                    pairs.push((key.as_str(), text));
                }
            }
        }
    }
    if !pairs.is_empty() {
        url.query_pairs_mut().extend_pairs(pairs);
    }

    Ok(url)
}

fn split_absolute(template: &str) -> (&str, &str) {
    let authority_start = template.find("://").map(|idx| idx + 3).unwrap_or(0);
    match template[authority_start..].find('/') {
        Some(offset) => template.split_at(authority_start + offset),
        None => (template, ""),
    }
}

fn substitute_segment(segment: &str, params: &Map<String, Value>) -> Result<String, RestError> {
    let mut out = String::with_capacity(segment.len());
    let mut rest = segment;
    while let Some(open) = rest.find('{') {
        let Some(close) = rest[open..].find('}') else {
            break;
        };
        out.push_str(&rest[..open]);
        let name = &rest[open + 1..open + close];
        let value = params
            .get(name)
            .and_then(query_text)
            .ok_or_else(|| RestError::MissingPathParam(name.to_string()))?;
        out.push_str(&value);
        rest = &rest[open + close + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

fn query_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(text.clone()),
        Value::Bool(_) | Value::Number(_) => Some(value.to_string()),
        Value::Array(_) | Value::Object(_) => Some(value.to_string()),
    }
}

fn multipart_form(body: Option<&Value>, files: Vec<FilePart>) -> Result<Form, RestError> {
    let mut form = Form::new();
    if let Some(Value::Object(fields)) = body {
        for (key, value) in fields {
            if let Some(text) = query_text(value) {
                form = form.text(key.clone(), text);
            }
        }
    }
    for file in files {
        let mut part = Part::bytes(file.bytes).file_name(file.filename);
        if let Some(mime_type) = &file.mime_type {
            part = part.mime_str(mime_type)?;
        }
        form = form.part(file.field, part);
    }
    Ok(form)
}

async fn normalize_response(response: reqwest::Response) -> Result<RestResponse, RestError> {
    let status = response.status().as_u16();
    let disposition = response
        .headers()
        .get(CONTENT_DISPOSITION)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);

    if let Some(disposition) =
        disposition.filter(|value| value.to_ascii_lowercase().contains("attachment"))
    {
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let bytes = response.bytes().await?.to_vec();
        return Ok(RestResponse {
            data: ResponseData::Attachment(Attachment {
                filename: attachment_filename(&disposition),
                content_type,
                bytes,
            }),
            status,
        });
    }

    let text = response.text().await?;
    Ok(RestResponse {
        data: parse_body(text),
        status,
    })
}

fn parse_body(text: String) -> ResponseData {
    if text.trim().is_empty() {
        return ResponseData::Empty;
    }
    match serde_json::from_str::<Value>(&text) {
        Ok(value) => ResponseData::Json(value),
        Err(_) => ResponseData::Text(text),
    }
}

pub fn attachment_filename(disposition: &str) -> String {
    disposition
        .split(';')
        .map(str::trim)
        .find_map(|part| {
            let (key, value) = part.split_once('=')?;
            key.trim()
                .eq_ignore_ascii_case("filename")
                .then(|| value.trim().trim_matches('"').to_string())
        })
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| DEFAULT_DOWNLOAD_NAME.to_string())
}

#[cfg(test)]
#[path = "tests/transport_tests.rs"]
mod tests;
