//! Request routing for the share server.
//!
//! Three routes plus a static-asset fallback, mirroring the share's URL
//! surface: `/` (index page), `/files` (listing), `/file/{id}` (download).
//! A method guard turns anything but GET and HEAD into a 501 before routing
//! happens.

use std::path::{Component, Path as FsPath, PathBuf};
use std::sync::Arc;

use axum::extract::{Path, Request, State};
use axum::http::{header, HeaderMap, HeaderValue, Method, Uri};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use crate::catalog::{FileCatalog, SharedFile};
use crate::error::ShareError;
use crate::ByteSource;
use crate::range::{parse_range_header, resolve_ranges, RangeParse};
use crate::response::FileResponse;

/// State shared by every handler: the catalog and the asset root.
pub struct ShareState {
    pub catalog: FileCatalog,
    pub assets: PathBuf,
}

pub fn router(state: Arc<ShareState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/files", get(list_files))
        .route("/file/{id}", get(download))
        .fallback(asset)
        .layer(middleware::from_fn(require_get_or_head))
        .with_state(state)
}

async fn require_get_or_head(req: Request, next: Next) -> Response {
    tracing::info!(method = %req.method(), path = %req.uri().path(), "fetch request");
    if req.method() == Method::GET || req.method() == Method::HEAD {
        next.run(req).await
    } else {
        ShareError::MethodNotAllowed.into_response()
    }
}

async fn index(State(state): State<Arc<ShareState>>) -> Response {
    serve_asset(&state, "index.html").await
}

#[derive(Serialize)]
struct FileListing {
    files: Vec<SharedFile>,
}

async fn list_files(State(state): State<Arc<ShareState>>) -> Json<FileListing> {
    Json(FileListing {
        files: state.catalog.list().to_vec(),
    })
}

/// The download path; the only place the range engine runs.
async fn download(
    State(state): State<Arc<ShareState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, ShareError> {
    // non-numeric ids fall out of bounds, same as the catalog miss below
    let id: usize = id.parse().map_err(|_| ShareError::NotFound)?;
    let file = state.catalog.get(id).ok_or_else(|| {
        tracing::warn!(id, "requested file index out of bounds");
        ShareError::NotFound
    })?;

    let source = state.catalog.open(file).await?;
    let size = source.byte_size();

    let parsed = match headers.get(header::RANGE).and_then(|v| v.to_str().ok()) {
        Some(raw) => parse_range_header(raw, size),
        None => RangeParse::Ignored,
    };
    let outcome = resolve_ranges(parsed, size);

    tracing::info!(name = %file.name, ?outcome, "sending file");
    Ok(FileResponse::new(outcome, file, source).into_response())
}

async fn asset(State(state): State<Arc<ShareState>>, uri: Uri) -> Response {
    serve_asset(&state, uri.path().trim_start_matches('/')).await
}

async fn serve_asset(state: &ShareState, rel: &str) -> Response {
    let Some(path) = resolve_asset_path(&state.assets, rel) else {
        return ShareError::NotFound.into_response();
    };
    match tokio::fs::read(&path).await {
        Ok(bytes) => {
            let media_type = mime_guess::from_path(&path).first_or_octet_stream();
            let content_type = HeaderValue::from_str(media_type.essence_str())
                .expect("guessed media types are ASCII");
            ([(header::CONTENT_TYPE, content_type)], bytes).into_response()
        }
        Err(e) => {
            tracing::warn!(asset = rel, error = %e, "asset lookup failed");
            ShareError::NotFound.into_response()
        }
    }
}

/// Joins `rel` onto the asset root, refusing anything that would step
/// outside it.
fn resolve_asset_path(base: &FsPath, rel: &str) -> Option<PathBuf> {
    let mut out = base.to_path_buf();
    for comp in FsPath::new(rel).components() {
        match comp {
            Component::Normal(c) => out.push(c),
            Component::CurDir => {}
            _ => return None,
        }
    }
    Some(out)
}
