//! Source-archive endpoints: upload, listing, content, active flag.

use axum::Json;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use serde::Deserialize;

use beacon_domain::Error;
use beacon_domain::entities::{Page, SourceCodeFile, SourceCodeVersion};
use beacon_domain::ports::{ArchiveUpload, FileContent, FileFilter, UploadOutcome, VersionFilter};

use crate::error::ApiError;
use crate::response::ApiResponse;
use crate::state::AppState;

/// `POST /source-code-version/upload` — multipart archive + metadata fields
pub async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<ApiResponse<UploadOutcome>>), ApiError> {
    let mut request = ArchiveUpload {
        project_id: None,
        version: None,
        build_id: None,
        branch_name: None,
        commit_message: None,
        uploaded_by: None,
        description: None,
        set_as_active: false,
        archive_name: "source.zip".to_owned(),
        bytes: Vec::new(),
    };

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| Error::bad_request(format!("multipart unreadable: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_owned();
        match name.as_str() {
            "file" => {
                if let Some(file_name) = field.file_name() {
                    request.archive_name = file_name.to_owned();
                }
                request.bytes = field
                    .bytes()
                    .await
                    .map_err(|e| Error::bad_request(format!("file field unreadable: {e}")))?
                    .to_vec();
            }
            _ => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| Error::bad_request(format!("field {name} unreadable: {e}")))?;
                let value = (!value.is_empty()).then_some(value);
                match name.as_str() {
                    "projectId" => request.project_id = value,
                    "version" => request.version = value,
                    "buildId" => request.build_id = value,
                    "branchName" => request.branch_name = value,
                    "commitMessage" => request.commit_message = value,
                    "uploadedBy" => request.uploaded_by = value,
                    "description" => request.description = value,
                    "setAsActive" => request.set_as_active = value.as_deref() == Some("true"),
                    _ => {}
                }
            }
        }
    }

    let outcome = state.archive.upload(request).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::with_message("archive uploaded", outcome)),
    ))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionParams {
    project_id: String,
    version: Option<String>,
    page: Option<u32>,
    page_size: Option<u32>,
}

/// `GET /source-code-version/versions`
pub async fn versions(
    State(state): State<AppState>,
    Query(params): Query<VersionParams>,
) -> Result<Json<ApiResponse<Page<SourceCodeVersion>>>, ApiError> {
    let page = state
        .source_code
        .query_versions(&VersionFilter {
            project_id: params.project_id,
            version: params.version,
            page: params.page,
            page_size: params.page_size,
        })
        .await?;
    Ok(Json(ApiResponse::ok(page)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileParams {
    version_id: Option<i64>,
    project_id: Option<String>,
    version: Option<String>,
    file_name: Option<String>,
    page: Option<u32>,
    page_size: Option<u32>,
}

/// `GET /source-code-version/files`
pub async fn files(
    State(state): State<AppState>,
    Query(params): Query<FileParams>,
) -> Result<Json<ApiResponse<Page<SourceCodeFile>>>, ApiError> {
    let page = state
        .source_code
        .query_files(&FileFilter {
            version_id: params.version_id,
            project_id: params.project_id,
            version: params.version,
            file_name: params.file_name,
            page: params.page,
            page_size: params.page_size,
        })
        .await?;
    Ok(Json(ApiResponse::ok(page)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentParams {
    file_path: String,
}

/// `GET /source-code-version/file-content/{projectId}/{version}?filePath=`
pub async fn file_content(
    State(state): State<AppState>,
    Path((project_id, version)): Path<(String, String)>,
    Query(params): Query<ContentParams>,
) -> Result<Json<ApiResponse<FileContent>>, ApiError> {
    let version_row = state
        .source_code
        .find_version_by_name(&project_id, &version)
        .await?
        .ok_or_else(|| Error::not_found(format!("version {version} of {project_id}")))?;
    let content = state
        .archive
        .file_content(version_row.id, &params.file_path)
        .await?;
    Ok(Json(ApiResponse::ok(content)))
}

/// `POST /source-code-version/set-active/{projectId}/{versionId}`
pub async fn set_active(
    State(state): State<AppState>,
    Path((project_id, version_id)): Path<(String, i64)>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    state.source_code.set_active(&project_id, version_id).await?;
    Ok(Json(ApiResponse::message("active version updated")))
}

/// `DELETE /source-code-version/{projectId}/{version}`
pub async fn delete(
    State(state): State<AppState>,
    Path((project_id, version)): Path<(String, String)>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    state.archive.delete(&project_id, &version).await?;
    Ok(Json(ApiResponse::message("version deleted")))
}
