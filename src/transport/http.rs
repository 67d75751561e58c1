//! HTTP client for the recognition backend.
//!
//! One `ureq::Agent` serves both the `/face` submission and the report
//! endpoints. Requests are never retried here; the capture loop's next tick is
//! the retry.

use anyhow::{anyhow, Context, Result};
use std::io::Read;
use std::time::Duration;
use url::Url;

use super::multipart::MultipartFile;
use crate::recognition::{RecognitionClient, RecognitionOutcome, RecognitionResponse, SubmitError};
use crate::reports::{ReportError, ReportKind, ReportSource};

const FACE_ENDPOINT: &str = "face";
const UPLOAD_FIELD: &str = "imagem";
const UPLOAD_FILE_NAME: &str = "captura.jpeg";
const MAX_RESPONSE_BYTES: u64 = 1024 * 1024;
const MAX_REPORT_BYTES: u64 = 64 * 1024 * 1024;

pub struct HttpBackend {
    base: Url,
    agent: ureq::Agent,
}

impl HttpBackend {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let mut base = Url::parse(base_url).context("parse backend url")?;
        match base.scheme() {
            "http" | "https" => {}
            other => {
                return Err(anyhow!(
                    "unsupported backend scheme '{}'; expected http(s)",
                    other
                ))
            }
        }
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Ok(Self { base, agent })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base
            .join(path)
            .with_context(|| format!("build backend url for '{}'", path))
    }
}

impl RecognitionClient for HttpBackend {
    fn recognize(&self, jpeg: &[u8]) -> Result<RecognitionOutcome, SubmitError> {
        let url = self
            .endpoint(FACE_ENDPOINT)
            .map_err(|e| SubmitError::Network(e.to_string()))?;
        let form = MultipartFile::new(UPLOAD_FIELD, UPLOAD_FILE_NAME, "image/jpeg", jpeg);
        let result = self
            .agent
            .post(url.as_str())
            .set("Content-Type", &form.content_type())
            .send_bytes(form.body());

        let (status, response) = match result {
            Ok(response) => (response.status(), response),
            Err(ureq::Error::Status(code, response)) => (code, response),
            Err(ureq::Error::Transport(transport)) => {
                return Err(SubmitError::Network(transport.to_string()))
            }
        };
        let mut body = String::new();
        response
            .into_reader()
            .take(MAX_RESPONSE_BYTES)
            .read_to_string(&mut body)
            .map_err(|e| SubmitError::Network(e.to_string()))?;
        RecognitionResponse::parse(status, &body)
    }
}

impl ReportSource for HttpBackend {
    fn fetch_report(&self, kind: ReportKind) -> Result<Vec<u8>, ReportError> {
        let url = self
            .endpoint(&kind.endpoint())
            .map_err(|e| ReportError::Network(e.to_string()))?;
        let response = match self.agent.get(url.as_str()).call() {
            Ok(response) => response,
            Err(ureq::Error::Status(code, _)) => return Err(ReportError::Status(code)),
            Err(ureq::Error::Transport(transport)) => {
                return Err(ReportError::Network(transport.to_string()))
            }
        };
        let mut bytes = Vec::new();
        response
            .into_reader()
            .take(MAX_REPORT_BYTES)
            .read_to_end(&mut bytes)
            .map_err(|e| ReportError::Network(e.to_string()))?;
        Ok(bytes)
    }
}
