use axum::{
    extract::{DefaultBodyLimit, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tower_http::cors::CorsLayer;

use anyhow::{Context, Result};
use base64::prelude::*;
use livery_template::{
    worker::{self, TemplateJob},
    TemplateConfig, TemplateDocument,
};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the web server
    Serve {
        #[arg(short, long, default_value = "3000")]
        port: u16,
    },
    /// Generate a template from exported UV and map JSON files
    Generate {
        /// UV source JSON
        source: PathBuf,
        /// Template map JSON
        map: PathBuf,
        /// Generation options JSON
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Overrides the size from the options
        #[arg(short, long)]
        size: Option<f64>,
        /// Output directory
        #[arg(short, long, default_value = ".")]
        out: PathBuf,
    },
}

#[derive(Default)]
struct AppState {
    last: Option<TemplateDocument>,
}

type SharedState = Arc<Mutex<AppState>>;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Status {
    status: String,
    has_template: bool,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

async fn get_status(State(state): State<SharedState>) -> Result<Json<Status>, StatusCode> {
    let state = state.lock().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(Json(Status {
        status: "ok".to_string(),
        has_template: state.last.is_some(),
    }))
}

async fn create_template(State(state): State<SharedState>, Json(job): Json<TemplateJob>) -> Response {
    match worker::submit(job).await {
        Ok(doc) => {
            log::info!("template {} ready, {} targets", doc.file_name, doc.target_count);
            let body = Json(&doc).into_response();
            match state.lock() {
                Ok(mut state) => state.last = Some(doc),
                Err(_) => log::error!("state lock poisoned, template not kept"),
            }
            body
        }
        Err(e) => {
            log::warn!("template generation failed: {e}");
            (StatusCode::BAD_REQUEST, Json(ErrorBody { error: e.to_string() })).into_response()
        }
    }
}

async fn download_template(State(state): State<SharedState>) -> Result<Response, StatusCode> {
    let state = state.lock().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    let doc = state.last.as_ref().ok_or(StatusCode::NOT_FOUND)?;
    let disposition = format!("attachment; filename=\"{}\"", doc.file_name);
    Ok((
        [
            (header::CONTENT_TYPE, "image/vnd.adobe.photoshop".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        doc.bytes.clone(),
    )
        .into_response())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

fn generate(source: &Path, map: &Path, config: Option<&Path>, size: Option<f64>, out: &Path) -> Result<()> {
    let mut config: TemplateConfig = match config {
        Some(path) => read_json(path)?,
        None => TemplateConfig::default(),
    };
    if let Some(size) = size {
        config = config.with_size(size);
    }
    let job = TemplateJob {
        source: Some(read_json(source)?),
        map: Some(read_json(map)?),
        config,
    };
    let doc = job.run()?;

    std::fs::create_dir_all(out)?;
    let psd_path = out.join(&doc.file_name);
    std::fs::write(&psd_path, &doc.bytes).with_context(|| format!("writing {}", psd_path.display()))?;

    let stem = doc.file_name.trim_end_matches(".psd");
    let preview_path = out.join(format!("{stem}_preview.png"));
    let png = doc
        .preview_data_url
        .split_once(',')
        .map(|(_, data)| BASE64_STANDARD.decode(data))
        .context("malformed preview")??;
    std::fs::write(&preview_path, png).with_context(|| format!("writing {}", preview_path.display()))?;

    println!("Template: {}", psd_path.display());
    println!("Preview: {}", preview_path.display());
    println!("Size: {}px, {} layers, {} targets", doc.size, doc.layer_count, doc.target_count);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Generate { source, map, config, size, out }) => {
            generate(&source, &map, config.as_deref(), size, &out)
        }
        Some(Commands::Serve { port }) => serve(port).await,
        None => serve(3000).await,
    }
}

async fn serve(port: u16) -> Result<()> {
    let state: SharedState = Arc::new(Mutex::new(AppState::default()));

    let app = Router::new()
        .route("/api/status", get(get_status))
        .route("/api/template", post(create_template))
        .route("/api/template/download", get(download_template))
        .layer(DefaultBodyLimit::max(50 * 1024 * 1024)) // 50MB
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    log::info!("listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
