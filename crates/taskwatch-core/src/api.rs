//! HTTP seam for the processing API.
//!
//! Three endpoints are used:
//! - `POST {base}/api/process` with one multipart `files` field per file
//! - `GET {base}/api/status/{task_id}`
//! - `GET {result_url}` as handed out by the submit response
//!
//! Annotated images are plain downloads from `{base}/{file_name}`.

use std::path::Path;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::task::{TaskId, TaskStatus};
use crate::{Config, CoreError};

/// One entry of the submit response.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SubmittedTask {
    pub task_id: TaskId,
    pub status: TaskStatus,
    #[serde(default)]
    pub url_result: String,
}

#[derive(Debug, Clone, Deserialize)]
struct StatusBody {
    status: TaskStatus,
}

/// Raw body of the result endpoint.
///
/// `result` is an object once the task succeeded and an empty string (or
/// failure message) otherwise, so it is kept as an untyped value here.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ResultEnvelope {
    pub status: String,
    #[serde(default)]
    pub result: serde_json::Value,
}

/// The `result` object of a successful task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionPayload {
    #[serde(default)]
    pub bbox: serde_json::Value,
    pub file_name: String,
}

/// A file ready to be uploaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub mime: Option<String>,
}

impl UploadFile {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        let file_name = file_name.into();
        let mime = guess_mime(&file_name).map(str::to_string);
        Self {
            file_name,
            bytes,
            mime,
        }
    }

    /// Read a file from disk.
    pub async fn from_path(path: &Path) -> Result<Self, CoreError> {
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self::new(file_name, bytes))
    }

    fn into_part(self) -> Result<Part, CoreError> {
        let part = Part::bytes(self.bytes).file_name(self.file_name);
        match self.mime {
            Some(mime) => Ok(part.mime_str(&mime)?),
            None => Ok(part),
        }
    }
}

fn guess_mime(file_name: &str) -> Option<&'static str> {
    let ext = file_name.rsplit_once('.')?.1.to_ascii_lowercase();
    match ext.as_str() {
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "gif" => Some("image/gif"),
        "bmp" => Some("image/bmp"),
        "webp" => Some("image/webp"),
        "tif" | "tiff" => Some("image/tiff"),
        _ => None,
    }
}

/// Operations the poller needs from the remote API.
#[async_trait]
pub trait TaskApi: Send + Sync {
    /// Upload files and return one submitted task per file.
    async fn submit(&self, files: &[UploadFile]) -> Result<Vec<SubmittedTask>, CoreError>;

    /// Fetch the current status of a task.
    async fn status(&self, task_id: &TaskId) -> Result<TaskStatus, CoreError>;

    /// Fetch a task's result body from its result URL.
    async fn result(&self, result_url: &str) -> Result<ResultEnvelope, CoreError>;

    /// Fetch the raw bytes behind `url`, e.g. an annotated image.
    async fn download(&self, url: &str) -> Result<Vec<u8>, CoreError>;
}

/// [`TaskApi`] over HTTP with a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpTaskApi {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTaskApi {
    pub fn new(config: &Config) -> Result<Self, CoreError> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self::with_client(client, &config.base_url))
    }

    pub fn with_client(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, CoreError> {
        let resp = self.client.get(url).send().await?;
        decode_response(url, resp).await
    }
}

/// `{base}/api/status/{task_id}` with the id escaped as a single path segment.
fn status_url(base_url: &str, task_id: &TaskId) -> Result<reqwest::Url, CoreError> {
    let invalid = || CoreError::Config(format!("invalid base URL {base_url:?}"));
    let mut url = reqwest::Url::parse(base_url).map_err(|_| invalid())?;
    url.path_segments_mut()
        .map_err(|_| invalid())?
        .pop_if_empty()
        .extend(["api", "status", task_id.as_str()]);
    Ok(url)
}

async fn decode_response<T: DeserializeOwned>(
    url: &str,
    resp: reqwest::Response,
) -> Result<T, CoreError> {
    let status = resp.status();
    if !status.is_success() {
        return Err(CoreError::Status {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }
    let body = resp.bytes().await?;
    Ok(serde_json::from_slice(&body)?)
}

#[async_trait]
impl TaskApi for HttpTaskApi {
    async fn submit(&self, files: &[UploadFile]) -> Result<Vec<SubmittedTask>, CoreError> {
        let url = format!("{}/api/process", self.base_url);
        let mut form = Form::new();
        for file in files {
            form = form.part("files", file.clone().into_part()?);
        }
        let resp = self.client.post(&url).multipart(form).send().await?;
        decode_response(&url, resp).await
    }

    async fn status(&self, task_id: &TaskId) -> Result<TaskStatus, CoreError> {
        let url = status_url(&self.base_url, task_id)?;
        let body: StatusBody = self.get_json(url.as_str()).await?;
        Ok(body.status)
    }

    async fn result(&self, result_url: &str) -> Result<ResultEnvelope, CoreError> {
        self.get_json(result_url).await
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, CoreError> {
        let resp = self.client.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(CoreError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(resp.bytes().await?.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mime_is_guessed_from_extension() {
        assert_eq!(UploadFile::new("a.JPG", vec![]).mime.as_deref(), Some("image/jpeg"));
        assert_eq!(UploadFile::new("b.png", vec![]).mime.as_deref(), Some("image/png"));
        assert_eq!(UploadFile::new("notes.txt", vec![]).mime, None);
        assert_eq!(UploadFile::new("noext", vec![]).mime, None);
    }

    #[test]
    fn status_url_escapes_the_task_id() {
        let url = status_url("http://localhost:8000", &"a/b?c".into()).unwrap();
        assert_eq!(url.as_str(), "http://localhost:8000/api/status/a%2Fb%3Fc");

        let url = status_url("http://host/prefix", &"abc".into()).unwrap();
        assert_eq!(url.as_str(), "http://host/prefix/api/status/abc");
    }

    #[test]
    fn submitted_task_tolerates_missing_result_url() {
        let parsed: Vec<SubmittedTask> =
            serde_json::from_str(r#"[{"task_id":"x","status":"ERROR"}]"#).unwrap();
        assert_eq!(parsed[0].url_result, "");
        assert_eq!(parsed[0].status, TaskStatus::Other("ERROR".into()));
    }

    #[test]
    fn result_envelope_accepts_string_result() {
        let env: ResultEnvelope =
            serde_json::from_str(r#"{"task_id":"x","status":"PENDING","result":""}"#).unwrap();
        assert_eq!(env.status, "PENDING");
        assert_eq!(env.result, serde_json::Value::String(String::new()));
    }

    #[tokio::test]
    async fn upload_file_reads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cat.jpeg");
        std::fs::write(&path, b"\xff\xd8data").unwrap();

        let file = UploadFile::from_path(&path).await.unwrap();
        assert_eq!(file.file_name, "cat.jpeg");
        assert_eq!(file.bytes, b"\xff\xd8data");
        assert_eq!(file.mime.as_deref(), Some("image/jpeg"));
    }

    #[tokio::test]
    async fn upload_file_missing_path_is_io_error() {
        let err = UploadFile::from_path(Path::new("/definitely/not/here.png"))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Io(_)));
    }
}
