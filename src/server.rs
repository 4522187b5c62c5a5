//! Web server for the quakewatch dashboard.
//!
//! Provides the live earthquake map using:
//! - Axum for HTTP server
//! - SSE (Server-Sent Events) for refresh notifications
//! - Leaflet for the map, plain JS for the rest

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::State,
    http::{StatusCode, header},
    response::{
        Html, IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
    routing::get,
    Router,
};
use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

use crate::client::{FeedSource, KandilliClient};
use crate::export;
use crate::filters::FilterState;
use crate::models::EventRecord;
use crate::output::SummaryRecord;
use crate::schedule::{self, RefreshWindow, ScheduleHandle, Scheduler, SyncUpdate};
use crate::stats;
use crate::visual::{self, MarkerStyle};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
    pub filters: FilterState,
    pub api_base: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            host: "127.0.0.1".to_string(),
            filters: FilterState::default(),
            api_base: None,
        }
    }
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Endpoint of the running scheduler
    schedule: Arc<ScheduleHandle>,
    /// Server configuration
    config: ServerConfig,
}

/// Create the Axum router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/api/snapshot", get(snapshot_handler))
        .route("/stream", get(sse_handler))
        .route("/export.csv", get(export_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

/// Start the web server.
///
/// Spawns the refresh scheduler, serves until ctrl-c, then disposes it.
///
/// # Errors
///
/// Returns an error if the client cannot be built or the listener fails.
pub async fn run_server(config: ServerConfig) -> anyhow::Result<()> {
    let client = match config.api_base.as_ref() {
        Some(base) => KandilliClient::with_base_url(base.clone())?,
        None => KandilliClient::new()?,
    };
    let source: Arc<dyn FeedSource + Send + Sync> = Arc::new(client);

    let (scheduler, handle) = Scheduler::new(source, config.filters.clone());
    let driver = tokio::spawn(scheduler.run());

    let state = AppState {
        schedule: Arc::new(handle),
        config: config.clone(),
    };
    let app = create_router(state.clone());

    let addr = format!("{}:{}", config.host, config.port);
    tracing::info!("🌍 quakewatch dashboard starting at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    state.schedule.dispose();
    let _ = driver.await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", error);
        // Keep serving; the process can still be killed externally
        std::future::pending::<()>().await;
    }
}

/// Serializable view of the current snapshot, served to the dashboard.
#[derive(Serialize)]
struct SnapshotView {
    events: Vec<EventView>,
    window_starts: String,
    window_ends: String,
    total: u64,
    truncated: u64,
    dropped: usize,
    stats: Option<SummaryRecord>,
    filters: Vec<String>,
    fetched_at: String,
    next_refresh: String,
    refresh_period_secs: i64,
    selected_scale: f64,
}

/// One event plus its precomputed marker style.
#[derive(Serialize)]
struct EventView {
    #[serde(flatten)]
    record: EventRecord,
    style: MarkerStyle,
}

// ============================================================================
// Route Handlers
// ============================================================================

/// Main page handler - serves the HTML UI.
async fn index_handler() -> Html<&'static str> {
    Html(INDEX_HTML)
}

/// Current snapshot as JSON, or 503 before the first fetch lands.
async fn snapshot_handler(State(state): State<AppState>) -> Response {
    let Some(snapshot) = state.schedule.latest() else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            axum::Json(json!({ "error": "no snapshot yet" })),
        )
            .into_response();
    };

    let events: Vec<EventView> = snapshot
        .events
        .iter()
        .map(|event| EventView {
            record: EventRecord::from(event),
            style: MarkerStyle::new(event.mag, event.depth),
        })
        .collect();

    let window = RefreshWindow::at(Utc::now());
    let view = SnapshotView {
        events,
        window_starts: snapshot.metadata.date_starts.clone(),
        window_ends: snapshot.metadata.date_ends.clone(),
        total: snapshot.metadata.total,
        truncated: snapshot.metadata.truncated(snapshot.events.len()),
        dropped: snapshot.dropped,
        stats: stats::summarize(&snapshot.events)
            .as_ref()
            .map(SummaryRecord::from),
        filters: filter_chips(&state.config.filters),
        fetched_at: snapshot.fetched_at.to_rfc3339(),
        next_refresh: window.next.to_rfc3339(),
        refresh_period_secs: schedule::REFRESH_INTERVAL_SECS,
        selected_scale: visual::SELECTED_RADIUS_SCALE,
    };

    axum::Json(view).into_response()
}

/// SSE stream of refresh outcomes.
async fn sse_handler(
    State(state): State<AppState>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>> {
    let rx = state.schedule.subscribe();
    let stream = BroadcastStream::new(rx).filter_map(|result| match result {
        Ok(update) => sync_event(&update).map(Ok),
        Err(_) => None,
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// Map a scheduler update to an SSE event, if the UI cares about it.
fn sync_event(update: &SyncUpdate) -> Option<Event> {
    match update {
        SyncUpdate::Refreshed {
            snapshot,
            fresh,
            first_load,
            window,
        } => {
            let data = json!({
                "new_events": fresh.len(),
                "first_load": first_load,
                "total_events": snapshot.events.len(),
                "next_refresh": window.next.to_rfc3339(),
            });
            Some(Event::default().event("refresh").data(data.to_string()))
        }
        // Cached interval; the page already has this snapshot
        SyncUpdate::Skipped { .. } => None,
        SyncUpdate::Failed { error, window } => {
            let data = json!({
                "message": error,
                "next_refresh": window.next.to_rfc3339(),
            });
            Some(Event::default().event("feed-error").data(data.to_string()))
        }
    }
}

/// CSV download of the current snapshot, or 404 when there is nothing.
async fn export_handler(State(state): State<AppState>) -> Response {
    let Some(snapshot) = state.schedule.latest() else {
        return (StatusCode::NOT_FOUND, "nothing to export").into_response();
    };

    let csv = export::to_csv(&snapshot.events);
    if csv.is_empty() {
        return (StatusCode::NOT_FOUND, "nothing to export").into_response();
    }

    let filename = export::csv_filename(Utc::now().date_naive());
    let headers = [
        (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{filename}\""),
        ),
    ];
    (headers, csv).into_response()
}

/// Health check endpoint.
async fn health_handler() -> &'static str {
    "OK"
}

/// Human-readable descriptions of the active filters.
fn filter_chips(filters: &FilterState) -> Vec<String> {
    let mut chips = Vec::new();
    if filters.min_magnitude > 0.0 {
        chips.push(format!("M >= {}", filters.min_magnitude));
    }
    if let Some(max) = filters.max_magnitude {
        chips.push(format!("M <= {max}"));
    }
    if let Some(min) = filters.min_depth {
        chips.push(format!("depth >= {min} km"));
    }
    if let Some(max) = filters.max_depth {
        chips.push(format!("depth <= {max} km"));
    }
    if let Some((starts, ends)) = filters.date_window() {
        chips.push(format!(
            "{} to {}",
            starts.format("%Y-%m-%d %H:%M"),
            ends.format("%Y-%m-%d %H:%M")
        ));
    }
    chips
}

// ============================================================================
// HTML Template (embedded for single-binary deployment)
// ============================================================================

const INDEX_HTML: &str = r##"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>QuakeWatch — Turkish Earthquake Monitor</title>

    <!-- Modern Font -->
    <link rel="preconnect" href="https://fonts.googleapis.com">
    <link rel="preconnect" href="https://fonts.gstatic.com" crossorigin>
    <link href="https://fonts.googleapis.com/css2?family=Inter:wght@400;500;600;700&display=swap" rel="stylesheet">

    <!-- Leaflet -->
    <link rel="stylesheet" href="https://unpkg.com/leaflet@1.9.4/dist/leaflet.css" />
    <script src="https://unpkg.com/leaflet@1.9.4/dist/leaflet.js"></script>

    <style>
        :root {
            --font: 'Inter', -apple-system, BlinkMacSystemFont, sans-serif;

            --bg-primary: #09090b;
            --bg-secondary: #0f0f12;
            --bg-tertiary: #18181b;
            --bg-elevated: #1c1c1f;
            --bg-hover: #27272a;

            --text-primary: #fafafa;
            --text-secondary: #a1a1aa;
            --text-tertiary: #52525b;

            --border: #27272a;
            --border-hover: #3f3f46;

            --accent: #38bdf8;
            --accent-hover: #0ea5e9;
            --accent-soft: rgba(56, 189, 248, 0.1);

            --success: #10b981;
            --warning: #f59e0b;
            --danger: #ef4444;

            --shadow-md: 0 4px 6px -1px rgba(0,0,0,0.4);
            --shadow-lg: 0 10px 15px -3px rgba(0,0,0,0.5);

            --radius-sm: 6px;
            --radius-md: 10px;
            --radius-lg: 16px;
            --radius-full: 9999px;
        }

        * { margin: 0; padding: 0; box-sizing: border-box; }

        body {
            font-family: var(--font);
            background: var(--bg-primary);
            color: var(--text-primary);
            line-height: 1.6;
            min-height: 100vh;
            -webkit-font-smoothing: antialiased;
        }

        body::before {
            content: '';
            position: fixed;
            top: 0;
            left: 0;
            right: 0;
            height: 400px;
            background: radial-gradient(ellipse 80% 50% at 50% -20%, var(--accent-soft), transparent);
            pointer-events: none;
            z-index: -1;
        }

        /* ===== HEADER ===== */
        .header {
            position: sticky;
            top: 0;
            z-index: 1100;
            backdrop-filter: blur(12px);
            background: rgba(9, 9, 11, 0.8);
            border-bottom: 1px solid var(--border);
        }

        .header-inner {
            max-width: 1400px;
            margin: 0 auto;
            padding: 0.875rem 1.5rem;
            display: flex;
            justify-content: space-between;
            align-items: center;
        }

        .logo {
            display: flex;
            align-items: center;
            gap: 0.75rem;
            font-weight: 600;
            font-size: 1.125rem;
            color: var(--text-primary);
            text-decoration: none;
            letter-spacing: -0.02em;
        }

        .logo-icon { width: 32px; height: 32px; }
        .logo-icon svg { width: 100%; height: 100%; }

        .header-actions {
            display: flex;
            align-items: center;
            gap: 0.75rem;
        }

        .status-pill {
            display: flex;
            align-items: center;
            gap: 0.5rem;
            padding: 0.375rem 0.875rem;
            border-radius: var(--radius-full);
            font-size: 0.8125rem;
            font-weight: 500;
            background: var(--bg-tertiary);
            border: 1px solid var(--border);
            font-variant-numeric: tabular-nums;
        }

        .status-dot {
            width: 8px;
            height: 8px;
            border-radius: 50%;
            background: var(--success);
            animation: pulse 2s infinite;
        }

        @keyframes pulse {
            0%, 100% { opacity: 1; transform: scale(1); }
            50% { opacity: 0.5; transform: scale(0.9); }
        }

        .status-offline .status-dot {
            background: var(--danger);
            animation: none;
        }

        .btn {
            display: inline-flex;
            align-items: center;
            gap: 0.375rem;
            padding: 0.5rem 1rem;
            border-radius: var(--radius-md);
            font-size: 0.8125rem;
            font-weight: 500;
            border: none;
            cursor: pointer;
            text-decoration: none;
            transition: all 0.15s ease;
            font-family: var(--font);
        }

        .btn-primary {
            background: var(--accent);
            color: #06222e;
        }

        .btn-primary:hover {
            background: var(--accent-hover);
            transform: translateY(-1px);
            box-shadow: var(--shadow-md);
        }

        /* ===== LAYOUT ===== */
        .main {
            max-width: 1400px;
            margin: 0 auto;
            padding: 1.5rem;
        }

        .layout {
            display: grid;
            grid-template-columns: 2fr 1fr;
            gap: 1rem;
            margin-bottom: 1rem;
        }

        .panel {
            background: var(--bg-elevated);
            border: 1px solid var(--border);
            border-radius: var(--radius-lg);
            overflow: hidden;
        }

        .panel-title {
            font-size: 0.8125rem;
            font-weight: 600;
            text-transform: uppercase;
            letter-spacing: 0.05em;
            color: var(--text-secondary);
            padding: 0.875rem 1rem 0.5rem;
        }

        /* ===== MAP ===== */
        .map-panel { position: relative; }

        #map {
            height: 560px;
            width: 100%;
            background: var(--bg-secondary);
        }

        .legend {
            position: absolute;
            bottom: 12px;
            right: 12px;
            z-index: 1000;
            background: rgba(0, 0, 0, 0.7);
            padding: 8px 12px;
            border-radius: 4px;
            border: 1px solid rgba(0, 200, 255, 0.3);
            box-shadow: 0 0 10px rgba(0, 200, 255, 0.3);
            font-size: 0.6875rem;
            color: #fff;
        }

        .legend-title { font-weight: 600; margin-bottom: 6px; }

        .legend-row {
            display: flex;
            align-items: center;
            gap: 8px;
            margin-bottom: 4px;
        }

        .legend-dot { border-radius: 50%; flex-shrink: 0; }

        .legend-note { color: #7dd3fc; margin-top: 6px; }

        .quake-marker { background: transparent; border: none; }

        /* ===== SIDEBAR ===== */
        .side-panel {
            display: flex;
            flex-direction: column;
            gap: 1rem;
        }

        .stat-grid {
            display: grid;
            grid-template-columns: 1fr 1fr;
            gap: 0.5rem;
            padding: 0 1rem 0.75rem;
        }

        .stat-box {
            background: var(--bg-tertiary);
            border: 1px solid var(--border);
            border-radius: var(--radius-md);
            padding: 0.625rem 0.75rem;
        }

        .stat-label {
            font-size: 0.6875rem;
            color: var(--text-tertiary);
            text-transform: uppercase;
            letter-spacing: 0.04em;
        }

        .stat-value {
            font-size: 1.25rem;
            font-weight: 700;
            letter-spacing: -0.02em;
        }

        .stat-sub { font-size: 0.75rem; color: var(--text-secondary); }

        .band-list { padding: 0 1rem 1rem; }

        .band-row {
            display: flex;
            align-items: center;
            gap: 0.5rem;
            font-size: 0.8125rem;
            color: var(--text-secondary);
            padding: 0.2rem 0;
        }

        .band-dot { width: 10px; height: 10px; border-radius: 50%; }

        .band-count {
            margin-left: auto;
            font-weight: 600;
            color: var(--text-primary);
            font-variant-numeric: tabular-nums;
        }

        .extreme-row {
            padding: 0.375rem 1rem;
            font-size: 0.8125rem;
            color: var(--text-secondary);
            border-top: 1px solid var(--border);
        }

        .extreme-row b { color: var(--text-primary); }

        .chip-list {
            display: flex;
            flex-wrap: wrap;
            gap: 0.375rem;
            padding: 0 1rem 1rem;
        }

        .chip {
            padding: 0.125rem 0.625rem;
            border-radius: var(--radius-full);
            font-size: 0.75rem;
            background: var(--accent-soft);
            color: var(--accent);
            border: 1px solid rgba(56, 189, 248, 0.3);
        }

        .chip-none { color: var(--text-tertiary); font-size: 0.8125rem; }

        /* ===== TABLE ===== */
        .table-head {
            display: flex;
            justify-content: space-between;
            align-items: baseline;
            padding-right: 1rem;
        }

        .table-note { font-size: 0.75rem; color: var(--text-tertiary); }

        .event-table {
            max-height: 420px;
            overflow-y: auto;
        }

        table { width: 100%; border-collapse: collapse; font-size: 0.8125rem; }

        th {
            text-align: left;
            font-size: 0.6875rem;
            text-transform: uppercase;
            letter-spacing: 0.04em;
            color: var(--text-tertiary);
            padding: 0.5rem 1rem;
            border-bottom: 1px solid var(--border);
            position: sticky;
            top: 0;
            background: var(--bg-elevated);
        }

        td {
            padding: 0.5rem 1rem;
            border-bottom: 1px solid var(--border);
            color: var(--text-secondary);
        }

        tbody tr { cursor: pointer; transition: background 0.1s; }
        tbody tr:hover { background: var(--bg-hover); }
        tbody tr.selected { background: var(--accent-soft); }

        td.title-cell { color: var(--text-primary); font-weight: 500; }

        .mag-chip {
            display: inline-block;
            min-width: 2.5rem;
            text-align: center;
            padding: 0.125rem 0.375rem;
            border-radius: var(--radius-sm);
            font-weight: 700;
            color: #06222e;
        }

        /* ===== TOASTS ===== */
        #toasts {
            position: fixed;
            bottom: 1rem;
            right: 1rem;
            z-index: 1200;
            display: flex;
            flex-direction: column;
            gap: 0.5rem;
        }

        .toast {
            background: var(--bg-elevated);
            border: 1px solid var(--border-hover);
            border-left: 3px solid var(--success);
            border-radius: var(--radius-md);
            box-shadow: var(--shadow-lg);
            padding: 0.625rem 1rem;
            font-size: 0.8125rem;
            animation: toastSlide 0.3s ease-out;
        }

        .toast.error { border-left-color: var(--danger); }

        @keyframes toastSlide {
            from { opacity: 0; transform: translateX(16px); }
            to { opacity: 1; transform: translateX(0); }
        }

        /* ===== FOOTER ===== */
        .footer {
            border-top: 1px solid var(--border);
            padding: 1.5rem;
            text-align: center;
            font-size: 0.8125rem;
            color: var(--text-tertiary);
        }

        .footer a { color: var(--text-secondary); text-decoration: none; }
        .footer a:hover { color: var(--accent); }

        @media (max-width: 900px) {
            .layout { grid-template-columns: 1fr; }
            #map { height: 380px; }
        }
    </style>
</head>
<body>
    <header class="header">
        <div class="header-inner">
            <a href="/" class="logo">
                <div class="logo-icon">
                    <svg viewBox="0 0 32 32" fill="none" xmlns="http://www.w3.org/2000/svg">
                        <defs>
                            <linearGradient id="logoGradient" x1="0%" y1="0%" x2="100%" y2="100%">
                                <stop offset="0%" style="stop-color:#38bdf8"/>
                                <stop offset="100%" style="stop-color:#818cf8"/>
                            </linearGradient>
                        </defs>
                        <circle cx="16" cy="16" r="14" stroke="url(#logoGradient)" stroke-width="2" fill="none" opacity="0.3"/>
                        <circle cx="16" cy="16" r="9" stroke="url(#logoGradient)" stroke-width="2" fill="none" opacity="0.6"/>
                        <circle cx="16" cy="16" r="4" fill="url(#logoGradient)"/>
                        <path d="M4 16 L8 16 L10 12 L12 20 L14 14 L16 18 L18 15 L20 17 L22 13 L24 19 L26 16 L28 16"
                              stroke="url(#logoGradient)" stroke-width="1.5" stroke-linecap="round" stroke-linejoin="round" fill="none"/>
                    </svg>
                </div>
                <span>QuakeWatch</span>
            </a>

            <div class="header-actions">
                <div id="refresh-pill" class="status-pill">
                    <span class="status-dot"></span>
                    <span>next refresh <b id="countdown">--:--</b></span>
                </div>
                <a class="btn btn-primary" href="/export.csv" id="export-btn">⬇ Export CSV</a>
            </div>
        </div>
    </header>

    <main class="main">
        <div class="layout">
            <section class="panel map-panel">
                <div id="map"></div>
                <div class="legend">
                    <div class="legend-title">Earthquake Intensity</div>
                    <div class="legend-row"><div class="legend-dot" style="width:15px;height:15px;background:radial-gradient(circle, rgb(0,150,255) 0%, rgba(0,0,0,0) 70%)"></div><span>Magnitude &lt; 3</span></div>
                    <div class="legend-row"><div class="legend-dot" style="width:20px;height:20px;background:radial-gradient(circle, rgb(0,202,255) 0%, rgba(0,0,0,0) 70%)"></div><span>Magnitude 3-4</span></div>
                    <div class="legend-row"><div class="legend-dot" style="width:24px;height:24px;background:radial-gradient(circle, rgb(135,217,255) 0%, rgba(0,0,0,0) 70%)"></div><span>Magnitude 4-5</span></div>
                    <div class="legend-row"><div class="legend-dot" style="width:28px;height:28px;background:radial-gradient(circle, rgb(165,232,255) 0%, rgba(0,0,0,0) 70%)"></div><span>Magnitude &gt; 5</span></div>
                    <div class="legend-note">Intensity and size increase<br>with magnitude</div>
                    <div class="legend-note">Transparency varies with depth</div>
                </div>
            </section>

            <aside class="side-panel">
                <div class="panel">
                    <div class="panel-title">Statistics</div>
                    <div id="stats"><div class="chip-list"><span class="chip-none">Waiting for data…</span></div></div>
                </div>
                <div class="panel">
                    <div class="panel-title">Active Filters</div>
                    <div id="filters" class="chip-list"><span class="chip-none">None</span></div>
                </div>
            </aside>
        </div>

        <section class="panel">
            <div class="table-head">
                <div class="panel-title">Events</div>
                <span class="table-note" id="table-note"></span>
            </div>
            <div class="event-table">
                <table>
                    <thead>
                        <tr><th>Mag</th><th>Location</th><th>Time</th><th>Depth</th><th>Closest City</th></tr>
                    </thead>
                    <tbody id="event-rows"></tbody>
                </table>
            </div>
        </section>
    </main>

    <div id="toasts"></div>

    <footer class="footer">
        <p>Data from <a href="https://api.orhanaydogdu.com.tr/" target="_blank">Kandilli Observatory API</a> · QuakeWatch</p>
    </footer>

    <script>
        const TURKEY_CENTER = [39.0, 35.0];
        const TURKEY_ZOOM = 6;

        const state = {
            events: [],
            selectedId: null,
            selectedScale: 1.2,
            nextRefresh: null,
            markers: new Map(),
        };

        const map = L.map('map', { doubleClickZoom: false }).setView(TURKEY_CENTER, TURKEY_ZOOM);
        L.tileLayer('https://{s}.basemaps.cartocdn.com/dark_all/{z}/{x}/{y}{r}.png', {
            attribution: '&copy; OpenStreetMap contributors'
        }).addTo(map);
        const markerLayer = L.layerGroup().addTo(map);

        function markerIcon(ev, selected) {
            const s = ev.style;
            const size = s.radius * (selected ? state.selectedScale : 1);
            const html = '<div style="'
                + 'width:' + size + 'px;height:' + size + 'px;'
                + 'border-radius:50%;'
                + 'background:radial-gradient(circle, ' + s.color + ' 0%, rgba(0,0,0,0) 70%);'
                + 'opacity:' + s.opacity + ';'
                + 'border:' + s.border_width + 'px solid rgba(255,255,255,0.35);'
                + 'filter:drop-shadow(0 0 ' + s.glow_radius + 'px ' + s.color + ');'
                + '"></div>';
            return L.divIcon({
                html: html,
                className: 'quake-marker',
                iconSize: [size, size],
                iconAnchor: [size / 2, size / 2],
            });
        }

        function renderMarkers() {
            markerLayer.clearLayers();
            state.markers.clear();
            for (const ev of state.events) {
                const marker = L.marker([ev.latitude, ev.longitude], {
                    icon: markerIcon(ev, ev.id === state.selectedId),
                });
                marker.bindPopup(
                    '<b>' + ev.title + '</b><br>'
                    + 'M' + ev.magnitude.toFixed(1) + ' · ' + ev.depth_km.toFixed(1) + ' km deep<br>'
                    + ev.time + '<br>'
                    + ev.closest_city + ' (' + ev.closest_city_distance_km.toFixed(1) + ' km)'
                );
                marker.on('click', () => selectEvent(ev.id, false));
                marker.addTo(markerLayer);
                state.markers.set(ev.id, marker);
            }
        }

        function selectEvent(id, fly) {
            const prev = state.events.find(e => e.id === state.selectedId);
            state.selectedId = id;
            if (prev && state.markers.has(prev.id)) {
                state.markers.get(prev.id).setIcon(markerIcon(prev, false));
            }
            const ev = state.events.find(e => e.id === id);
            if (ev && state.markers.has(id)) {
                state.markers.get(id).setIcon(markerIcon(ev, true));
                if (fly) {
                    map.flyTo([ev.latitude, ev.longitude], 9, { duration: 1.5 });
                }
            }
            document.querySelectorAll('#event-rows tr').forEach(row => {
                row.classList.toggle('selected', row.dataset.id === id);
            });
        }

        function renderTable() {
            const tbody = document.getElementById('event-rows');
            tbody.innerHTML = '';
            for (const ev of state.events) {
                const tr = document.createElement('tr');
                tr.dataset.id = ev.id;

                const mag = document.createElement('td');
                const chip = document.createElement('span');
                chip.className = 'mag-chip';
                chip.style.background = ev.style.color;
                chip.textContent = ev.magnitude.toFixed(1);
                mag.appendChild(chip);

                const title = document.createElement('td');
                title.className = 'title-cell';
                title.textContent = ev.title;

                const time = document.createElement('td');
                time.textContent = ev.time;

                const depth = document.createElement('td');
                depth.textContent = ev.depth_km.toFixed(1) + ' km';

                const city = document.createElement('td');
                city.textContent = ev.closest_city + ' · ' + ev.closest_city_distance_km.toFixed(1) + ' km';

                tr.append(mag, title, time, depth, city);
                tr.onclick = () => selectEvent(ev.id, true);
                tbody.appendChild(tr);
            }
        }

        function renderStats(stats) {
            const el = document.getElementById('stats');
            if (!stats) {
                el.innerHTML = '<div class="chip-list"><span class="chip-none">No events in this window</span></div>';
                return;
            }
            const bands = [
                ['Minor (<3.0)', stats.bands.minor, 'rgb(0,150,255)'],
                ['Light (3.0-3.9)', stats.bands.light, 'rgb(0,202,255)'],
                ['Moderate (4.0-4.9)', stats.bands.moderate, 'rgb(135,217,255)'],
                ['Strong (5.0-5.9)', stats.bands.strong, 'rgb(165,232,255)'],
                ['Major (≥6.0)', stats.bands.major, 'rgb(195,247,255)'],
            ];
            let html = '<div class="stat-grid">'
                + '<div class="stat-box"><div class="stat-label">Events</div><div class="stat-value">' + stats.total + '</div></div>'
                + '<div class="stat-box"><div class="stat-label">Avg Magnitude</div><div class="stat-value">' + stats.average_magnitude.toFixed(1) + '</div></div>'
                + '<div class="stat-box"><div class="stat-label">Avg Depth</div><div class="stat-value">' + stats.average_depth_km.toFixed(1) + '<span class="stat-sub"> km</span></div></div>'
                + '<div class="stat-box"><div class="stat-label">Strongest</div><div class="stat-value">M' + stats.strongest.magnitude.toFixed(1) + '</div></div>'
                + '</div><div class="band-list">';
            for (const [label, count, color] of bands) {
                html += '<div class="band-row"><span class="band-dot" style="background:' + color + '"></span>'
                    + label + '<span class="band-count">' + count + '</span></div>';
            }
            html += '</div>';
            html += '<div class="extreme-row">Strongest: <b>' + stats.strongest.title + '</b></div>';
            html += '<div class="extreme-row">Most recent: <b>' + stats.most_recent.title + '</b> at ' + stats.most_recent.time + '</div>';
            el.innerHTML = html;
        }

        function renderFilters(chips) {
            const el = document.getElementById('filters');
            el.innerHTML = '';
            if (!chips.length) {
                el.innerHTML = '<span class="chip-none">None</span>';
                return;
            }
            for (const text of chips) {
                const span = document.createElement('span');
                span.className = 'chip';
                span.textContent = text;
                el.appendChild(span);
            }
        }

        function renderNote(view) {
            const note = document.getElementById('table-note');
            if (view.truncated > 0) {
                note.textContent = 'showing ' + view.events.length + ' of ' + view.total + ' reported events';
            } else {
                note.textContent = view.events.length + ' events · window ' + view.window_starts + ' to ' + view.window_ends;
            }
        }

        function showToast(text, kind) {
            const toast = document.createElement('div');
            toast.className = 'toast' + (kind === 'error' ? ' error' : '');
            toast.textContent = text;
            document.getElementById('toasts').appendChild(toast);
            setTimeout(() => toast.remove(), 5000);
        }

        async function loadSnapshot() {
            try {
                const res = await fetch('/api/snapshot');
                if (res.status === 503) {
                    setTimeout(loadSnapshot, 2000);
                    return;
                }
                if (!res.ok) throw new Error('snapshot request failed: ' + res.status);
                const view = await res.json();

                state.events = view.events;
                state.selectedScale = view.selected_scale;
                state.nextRefresh = Date.parse(view.next_refresh);

                renderMarkers();
                renderTable();
                renderStats(view.stats);
                renderFilters(view.filters);
                renderNote(view);
            } catch (err) {
                showToast('Failed to load earthquake data', 'error');
                console.error(err);
            }
        }

        // Countdown to the next 5-minute boundary
        setInterval(() => {
            const el = document.getElementById('countdown');
            if (!state.nextRefresh) return;
            const diff = state.nextRefresh - Date.now();
            if (diff <= 0) {
                el.textContent = 'syncing…';
                return;
            }
            const mins = Math.floor(diff / 60000);
            const secs = Math.floor((diff % 60000) / 1000);
            el.textContent = String(mins).padStart(2, '0') + ':' + String(secs).padStart(2, '0');
        }, 1000);

        const es = new EventSource('/stream');
        es.addEventListener('refresh', (e) => {
            const d = JSON.parse(e.data);
            state.nextRefresh = Date.parse(d.next_refresh);
            if (!d.first_load && d.new_events > 0) {
                showToast('Updated: ' + d.new_events + ' new events');
            }
            loadSnapshot();
        });
        es.addEventListener('feed-error', (e) => {
            const d = JSON.parse(e.data);
            state.nextRefresh = Date.parse(d.next_refresh);
            showToast('Refresh failed: ' + d.message, 'error');
        });
        es.onopen = () => document.getElementById('refresh-pill').classList.remove('status-offline');
        es.onerror = () => document.getElementById('refresh-pill').classList.add('status-offline');

        loadSnapshot();
    </script>
</body>
</html>
"##;
