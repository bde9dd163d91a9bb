use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::{Query, RawQuery, State};
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use clap::Parser;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::command::{Command, Outcome};
use crate::loader::{SchemaBase, SchemaLoader, locate_schema_dir, parse_base};
use crate::render::{export_file_name, render_svg};
use crate::search::{SearchResult, search};
use crate::sidebar::Sidebar;
use crate::state::{AppState, LoadFailure, Selection, ViewSettings};
use crate::url_state::UrlState;

const INDEX_HTML: &str = include_str!("../assets/index.html");

/// Arguments for running the schemaview web server
#[derive(Debug, Clone, Parser)]
#[command(name = "schemaview serve", about = "Start the schemaview web view.")]
pub struct ServeArgs {
    /// Address to bind the HTTP server to.
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Port to listen on.
    #[arg(long, default_value_t = 5151)]
    pub port: u16,

    /// Directory holding the `*.schema.json` files.
    #[arg(long = "schema-dir", conflicts_with = "schema_url")]
    pub schema_dir: Option<PathBuf>,

    /// Base URL the `*.schema.json` files are fetched from.
    #[arg(long = "schema-url")]
    pub schema_url: Option<String>,

    /// Background color for rendered SVG views.
    #[arg(long = "background-color", default_value = "white")]
    pub background_color: String,
}

struct Session {
    app: AppState,
    sidebar: Sidebar,
    loaded: bool,
}

pub struct ServeState {
    loader: SchemaLoader,
    background: String,
    session: RwLock<Session>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct ViewPayload {
    schema: String,
    query: String,
    settings: ViewSettings,
    selection: Selection,
    svg: String,
    sidebar: String,
    export_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<LoadFailure>,
    #[serde(skip_serializing_if = "Option::is_none")]
    outcome: Option<Outcome>,
}

#[derive(Debug, Deserialize)]
struct SearchQuery {
    #[serde(default)]
    q: String,
}

impl ServeState {
    pub fn new(loader: SchemaLoader, background: impl Into<String>) -> Self {
        Self {
            loader,
            background: background.into(),
            session: RwLock::new(Session {
                app: AppState::placeholder(ViewSettings::default()),
                sidebar: Sidebar::new(),
                loaded: false,
            }),
        }
    }

    /// Loads `schema` unless it is already open. The fetch runs without
    /// holding the lock; the load ticket discards it if a newer load started
    /// in the meantime. `settings` only take effect once the load succeeds.
    async fn ensure_schema(&self, schema: &str, settings: ViewSettings) {
        let (ticket, previous) = {
            let mut session = self.session.write().await;
            if session.loaded && session.app.schema_name() == schema {
                session.app.load_error = None;
                return;
            }
            let previous = session.app.settings;
            session.app.settings = settings;
            (session.app.begin_load(schema), previous)
        };

        let result = self.loader.fetch(schema).await;

        let mut session = self.session.write().await;
        if !session.app.finish_load(ticket, result) {
            return;
        }
        if session.app.load_error.is_none() {
            session.loaded = true;
        } else {
            // settings describe the graph that is still displayed
            session.app.settings = previous;
        }
    }

    fn payload(&self, session: &mut Session, outcome: Option<Outcome>) -> Result<ViewPayload> {
        let svg = render_svg(&session.app, &self.background)?;
        let sidebar = session.sidebar.render(&session.app)?;
        let app = &session.app;
        Ok(ViewPayload {
            schema: app.schema_name().to_string(),
            query: app.url_state().to_query(),
            settings: app.settings,
            selection: app.selection.clone(),
            svg,
            sidebar,
            export_name: export_file_name(app.schema_name(), Utc::now()),
            error: app.load_error.clone(),
            outcome,
        })
    }
}

pub fn router(state: Arc<ServeState>) -> Router {
    Router::new()
        .route("/", get(get_index))
        .route("/api/view", get(get_view))
        .route("/api/command", post(post_command))
        .route("/api/search", get(get_search))
        .route("/api/export.svg", get(get_export))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
}

pub async fn run_serve(args: ServeArgs) -> Result<()> {
    let base = match (&args.schema_dir, &args.schema_url) {
        (Some(dir), _) => parse_base(&dir.to_string_lossy())?,
        (None, Some(url)) => parse_base(url)?,
        (None, None) => SchemaBase::Directory(locate_schema_dir()?),
    };
    tracing::info!(?base, "serving schemas");

    let state = Arc::new(ServeState::new(
        SchemaLoader::new(base),
        args.background_color.clone(),
    ));
    let app = router(state);

    let addr = format!("{}:{}", args.host, args.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind HTTP server to {addr}"))?;

    println!("schemaview listening on http://{addr}");
    println!("Press Ctrl+C to stop.");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("HTTP server error")?;

    Ok(())
}

async fn get_index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn get_view(
    State(state): State<Arc<ServeState>>,
    RawQuery(query): RawQuery,
) -> Result<Json<ViewPayload>, (StatusCode, String)> {
    let url = UrlState::parse(query.as_deref().unwrap_or_default());
    state.ensure_schema(&url.schema, url.settings).await;

    let mut session = state.session.write().await;
    session.app.apply_url_state(&url);
    let payload = state.payload(&mut session, None).map_err(internal_error)?;
    Ok(Json(payload))
}

async fn post_command(
    State(state): State<Arc<ServeState>>,
    Json(command): Json<Command>,
) -> Result<Json<ViewPayload>, (StatusCode, String)> {
    let mut session = state.session.write().await;
    let outcome = session.app.dispatch(command);
    let payload = state
        .payload(&mut session, Some(outcome))
        .map_err(internal_error)?;
    Ok(Json(payload))
}

async fn get_search(
    State(state): State<Arc<ServeState>>,
    Query(params): Query<SearchQuery>,
) -> Json<Vec<SearchResult>> {
    let session = state.session.read().await;
    Json(search(&session.app.model, &params.q))
}

async fn get_export(State(state): State<Arc<ServeState>>) -> Result<Response, (StatusCode, String)> {
    let session = state.session.read().await;
    let svg = render_svg(&session.app, &state.background).map_err(internal_error)?;
    let file_name = export_file_name(session.app.schema_name(), Utc::now());

    let disposition = HeaderValue::from_str(&format!("attachment; filename=\"{file_name}\""))
        .map_err(|err| internal_error(err.into()))?;
    Ok((
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("image/svg+xml")),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        svg,
    )
        .into_response())
}

fn internal_error(err: anyhow::Error) -> (StatusCode, String) {
    (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
}
