//! Multipart form intake shared by the endpoints that accept files.

use crate::app_config;
use crate::error::{ServiceError, ServiceResult};
use crate::rate_limit::check_upload_rate_limit;
use crate::risk::{EvidenceFile, RiskEngine};
use crate::storage::{upload_all, ObjectStorage, PendingFile, StoredFile};
use actix_multipart::{Field, Multipart};
use actix_web::{web, Either};
use futures::{StreamExt, TryStreamExt};
use serde::de::DeserializeOwned;
use std::collections::HashMap;

/// Text fields and files of one multipart request.
#[derive(Debug, Default)]
pub struct UploadForm {
    pub fields: HashMap<String, String>,
    pub files: Vec<PendingFile>,
}

impl UploadForm {
    /// Deserializes the text fields. Fields named in `numeric` are sent as
    /// numbers so integer ids survive the trip through a form.
    pub fn parse<T: DeserializeOwned>(&self, numeric: &[&str]) -> ServiceResult<T> {
        let object: serde_json::Map<String, serde_json::Value> = self
            .fields
            .iter()
            .map(|(name, value)| {
                let value = match value.trim().parse::<i64>() {
                    Ok(n) if numeric.contains(&name.as_str()) => serde_json::Value::from(n),
                    _ => serde_json::Value::String(value.clone()),
                };
                (name.clone(), value)
            })
            .collect();

        serde_json::from_value(serde_json::Value::Object(object))
            .map_err(|e| ServiceError::invalid("body", &e.to_string()))
    }
}

async fn read_field(field: &mut Field, limit: usize) -> ServiceResult<Vec<u8>> {
    let mut buf: Vec<u8> = Vec::new();
    while let Some(chunk) = field.next().await {
        let bytes = chunk.map_err(|e| {
            log::error!("read_field: multipart read error: {}", e);
            ServiceError::invalid("body", "Error interpreting user input.")
        })?;
        if buf.len() + bytes.len() > limit {
            return Err(ServiceError::invalid(
                "file",
                &format!(
                    "File too large. Maximum is {} MB",
                    app_config::limits().max_upload_size_mb
                ),
            ));
        }
        buf.extend_from_slice(&bytes);
    }
    Ok(buf)
}

/// Reads every part. Parts carrying a file name are files and must be of an
/// accepted type and size; the rest are text fields.
pub async fn read_form(mut payload: Multipart) -> ServiceResult<UploadForm> {
    let limits = app_config::limits();
    let max_bytes = limits.max_upload_bytes();
    let mut form = UploadForm::default();

    while let Some(mut field) = payload.try_next().await.map_err(|e| {
        log::debug!("read_form: bad multipart payload: {}", e);
        ServiceError::invalid("body", "Malformed multipart body")
    })? {
        let disposition = field.content_disposition();
        let name = disposition.get_name().unwrap_or_default().to_owned();
        let filename = disposition.get_filename().map(str::to_owned);

        match filename {
            Some(filename) => {
                let content_type = field
                    .content_type()
                    .map(|m| m.essence_str().to_owned())
                    .unwrap_or_default();
                if !limits.is_allowed_mime(&content_type) {
                    return Err(ServiceError::invalid(
                        "file",
                        &format!("File type '{}' is not allowed", content_type),
                    ));
                }

                let data = read_field(&mut field, max_bytes).await?;
                if data.is_empty() {
                    continue;
                }
                form.files.push(PendingFile {
                    original_name: filename,
                    content_type,
                    data,
                });
            }
            None => {
                let data = read_field(&mut field, max_bytes).await?;
                let value = String::from_utf8(data)
                    .map_err(|_| ServiceError::invalid(&name, "Field is not valid text"))?;
                form.fields.insert(name, value);
            }
        }
    }

    Ok(form)
}

/// Rate-limits the uploader, then stores every file under `prefix`.
pub async fn store_files(
    storage: &dyn ObjectStorage,
    user_id: i32,
    prefix: &str,
    files: Vec<PendingFile>,
) -> ServiceResult<Vec<StoredFile>> {
    if files.is_empty() {
        return Ok(Vec::new());
    }
    check_upload_rate_limit(user_id)?;
    Ok(upload_all(storage, prefix, files).await?)
}

/// The record incoming evidence belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EvidenceTarget {
    /// A risk about to be reported.
    NewRisk,
    Risk(i32),
    /// A plan about to be created on this risk.
    NewPlan { risk_id: i32 },
    Plan(i32),
}

impl EvidenceTarget {
    fn prefix(&self) -> &'static str {
        match self {
            EvidenceTarget::NewRisk | EvidenceTarget::Risk(_) => "risks",
            EvidenceTarget::NewPlan { .. } | EvidenceTarget::Plan(_) => "action-plans",
        }
    }
}

/// Stores evidence for `target` once it is known to exist, so a request
/// for a missing record leaves nothing behind in storage.
pub async fn attach_evidence(
    engine: &RiskEngine,
    storage: &dyn ObjectStorage,
    user_id: i32,
    target: EvidenceTarget,
    files: Vec<PendingFile>,
) -> ServiceResult<Vec<EvidenceFile>> {
    if files.is_empty() {
        return Ok(Vec::new());
    }
    match target {
        EvidenceTarget::NewRisk => (),
        EvidenceTarget::Risk(id) | EvidenceTarget::NewPlan { risk_id: id } => {
            engine.require_risk(id).await?
        }
        EvidenceTarget::Plan(id) => engine.require_action_plan(id).await?,
    }
    let stored = store_files(storage, user_id, target.prefix(), files).await?;
    Ok(stored.into_iter().map(EvidenceFile::from).collect())
}

/// Accepts either a JSON body or a multipart form with files.
pub type JsonOrForm<T> = Either<web::Json<T>, Multipart>;

/// Unpacks a [`JsonOrForm`] body into the payload and the pending files.
pub async fn json_or_form<T: DeserializeOwned>(
    body: JsonOrForm<T>,
    numeric: &[&str],
) -> ServiceResult<(T, Vec<PendingFile>)> {
    match body {
        Either::Left(json) => Ok((json.into_inner(), Vec::new())),
        Either::Right(payload) => {
            let form = read_form(payload).await?;
            let input = form.parse(numeric)?;
            Ok((input, form.files))
        }
    }
}
