use async_trait::async_trait;
use chrono::Utc;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use sha1::{Digest, Sha1};
use std::time::Duration;

use crate::config::MediaConfig;
use crate::error::AppError;
use crate::infrastructure::media::MediaStore;

const API_BASE: &str = "https://api.cloudinary.com/v1_1";

#[derive(Debug, Deserialize)]
struct UploadResponse {
    secure_url: String,
}

#[derive(Debug, Deserialize)]
struct DestroyResponse {
    result: String,
}

#[derive(Clone)]
pub struct CloudinaryClient {
    http: reqwest::Client,
    cloud_name: String,
    api_key: String,
    api_secret: String,
}

impl CloudinaryClient {
    pub fn new(config: &MediaConfig) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::Media(format!("Failed to build media client: {}", e)))?;

        Ok(Self {
            http,
            cloud_name: config.cloud_name.clone(),
            api_key: config.api_key.clone(),
            api_secret: config.api_secret.clone(),
        })
    }

    fn endpoint(&self, action: &str) -> String {
        format!("{}/{}/image/{}", API_BASE, self.cloud_name, action)
    }

    /// 除 file/api_key 外的参数按 key 排序拼接，尾部加 api_secret，取 SHA-1 十六进制
    fn sign(&self, params: &[(&str, &str)]) -> String {
        let mut pairs: Vec<String> = params
            .iter()
            .filter(|(_, v)| !v.is_empty())
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        pairs.sort();

        let mut hasher = Sha1::new();
        hasher.update(pairs.join("&").as_bytes());
        hasher.update(self.api_secret.as_bytes());
        hex::encode(hasher.finalize())
    }
}

/// 从 Cloudinary 下发的 URL 里还原 public_id：
/// 取 `upload/<version>/` 之后的路径段，去掉文件扩展名
fn extract_public_id(url: &str) -> Option<String> {
    let mut parts: Vec<&str> = url.split('/').collect();
    let file_with_ext = parts.pop()?;

    let upload_idx = parts.iter().position(|p| *p == "upload")?;
    let after_upload = &parts[(upload_idx + 2).min(parts.len())..];

    let file_name = match file_with_ext.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => file_with_ext,
    };

    let mut segments: Vec<&str> = after_upload.to_vec();
    segments.push(file_name);
    Some(segments.join("/"))
}

#[async_trait]
impl MediaStore for CloudinaryClient {
    async fn upload(
        &self,
        bytes: Vec<u8>,
        folder: &str,
        name_hint: Option<String>,
    ) -> Result<String, AppError> {
        let timestamp = Utc::now().timestamp().to_string();

        let mut params: Vec<(&str, &str)> = vec![("folder", folder), ("timestamp", &timestamp)];
        if let Some(name) = name_hint.as_deref() {
            params.push(("filename_override", name));
        }
        let signature = self.sign(&params);

        let file_name = name_hint.clone().unwrap_or_else(|| "upload".to_string());
        let mut form = Form::new()
            .part("file", Part::bytes(bytes).file_name(file_name))
            .text("api_key", self.api_key.clone())
            .text("timestamp", timestamp)
            .text("signature", signature)
            .text("folder", folder.to_string());
        if let Some(name) = name_hint {
            form = form.text("filename_override", name);
        }

        let response = self
            .http
            .post(self.endpoint("upload"))
            .multipart(form)
            .send()
            .await
            .map_err(|e| AppError::Media(format!("Upload request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Media(format!(
                "Upload rejected with status {}: {}",
                status, body
            )));
        }

        let body: UploadResponse = response
            .json()
            .await
            .map_err(|e| AppError::Media(format!("Invalid upload response: {}", e)))?;

        Ok(body.secure_url)
    }

    async fn release(&self, url: &str) -> Result<(), AppError> {
        let public_id = extract_public_id(url)
            .ok_or_else(|| AppError::Media(format!("Cannot extract public id from `{}`", url)))?;

        let timestamp = Utc::now().timestamp().to_string();
        let params: Vec<(&str, &str)> =
            vec![("public_id", &public_id), ("timestamp", &timestamp)];
        let signature = self.sign(&params);

        let form = Form::new()
            .text("public_id", public_id)
            .text("api_key", self.api_key.clone())
            .text("timestamp", timestamp)
            .text("signature", signature);

        let response = self
            .http
            .post(self.endpoint("destroy"))
            .multipart(form)
            .send()
            .await
            .map_err(|e| AppError::Media(format!("Destroy request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(AppError::Media(format!(
                "Destroy rejected with status {}",
                status
            )));
        }

        let body: DestroyResponse = response
            .json()
            .await
            .map_err(|e| AppError::Media(format!("Invalid destroy response: {}", e)))?;

        if body.result != "ok" {
            return Err(AppError::Media(format!(
                "Destroy returned `{}` for `{}`",
                body.result, url
            )));
        }

        Ok(())
    }
}
