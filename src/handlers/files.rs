use actix_files::NamedFile;
use actix_multipart::form::{tempfile::TempFile, MultipartForm};
use actix_web::http::header::{ContentDisposition, DispositionParam, DispositionType};
use actix_web::{web, HttpResponse};
use chrono::Utc;
use sea_orm::*;

use crate::models::uploaded_file::{self, FileKind};
use crate::services::upload_store::UploadStore;
use crate::utils::config::Config;
use crate::utils::errors::ApiError;
use crate::utils::validators::{allowed_extension, secure_filename};

#[derive(Debug, MultipartForm)]
pub struct FileUploadForm {
    pub file: Option<TempFile>,
}

/// POST /upload (multipart, field `file`)
/// Store an image or GPX file under a timestamped name and record it
pub async fn upload_file(
    db: web::Data<DatabaseConnection>,
    config: web::Data<Config>,
    MultipartForm(form): MultipartForm<FileUploadForm>,
) -> Result<HttpResponse, ApiError> {
    let file = form.file.ok_or_else(|| ApiError::bad_request("No file part"))?;
    let original_name = file
        .file_name
        .clone()
        .filter(|name| !name.is_empty())
        .ok_or_else(|| ApiError::bad_request("No selected file"))?;
    let extension = allowed_extension(&original_name)
        .ok_or_else(|| ApiError::bad_request("File type not allowed"))?;

    let stored_name = format!(
        "{}_{}",
        Utc::now().format("%Y%m%d%H%M%S%6f"),
        secure_filename(&original_name)
    );

    let store = UploadStore::new(&config.upload_dir);
    store
        .copy_from(file.file.path(), &stored_name)
        .await
        .map_err(|e| {
            log::error!("Failed to store upload {}: {}", stored_name, e);
            ApiError::internal(format!("Failed to store file: {}", e))
        })?;

    let record = uploaded_file::ActiveModel {
        filename: Set(stored_name.clone()),
        filetype: Set(FileKind::from_extension(&extension)),
        uploaded_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(db.get_ref())
    .await;

    match record {
        Ok(record) => {
            log::info!("📁 Stored {} as {}", original_name, record.filename);
            Ok(HttpResponse::Created().json(record))
        }
        Err(e) => {
            if let Err(cleanup_err) = store.remove_if_exists(&stored_name).await {
                log::warn!("Failed to clean up {}: {}", stored_name, cleanup_err);
            }
            Err(ApiError::database(e))
        }
    }
}

/// GET /download/:filename
pub async fn download_file(
    config: web::Data<Config>,
    path: web::Path<String>,
) -> Result<NamedFile, ApiError> {
    let filename = secure_filename(&path.into_inner());
    let store = UploadStore::new(&config.upload_dir);

    if filename.is_empty() || !store.exists(&filename) {
        return Err(ApiError::not_found("File not found"));
    }

    let file = NamedFile::open_async(store.path_for(&filename))
        .await
        .map_err(|e| {
            log::error!("Failed to open {}: {}", filename, e);
            ApiError::internal("Failed to serve file")
        })?;

    Ok(file.set_content_disposition(ContentDisposition {
        disposition: DispositionType::Attachment,
        parameters: vec![DispositionParam::Filename(filename)],
    }))
}
