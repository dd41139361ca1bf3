use crate::cache::ImageCache;
use crate::config::Config;
use crate::fetcher::HttpFetcher;
use crate::pipeline::{ImagePipeline, ImageRequest};
use crate::stats::ProxyStats;
use crate::transform::OutputFormat;
use crate::util::{ProxyError, Result};

use actix_web::http::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
    ACCESS_CONTROL_MAX_AGE, CACHE_CONTROL,
};
use actix_web::http::Method;
use actix_web::{middleware::Logger, web, App, HttpRequest, HttpResponse, HttpServer};
use log::{debug, error, info};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

struct AppState {
    pipeline: Arc<ImagePipeline>,
    cache: Arc<ImageCache>,
    stats: Arc<ProxyStats>,
    cache_ttl_seconds: u64,
}

/// query contract: `url` (required), `l` quality in [1,100] default 75,
/// `jpg`/`jpeg` select jpeg output, `bw` selects grayscale.
fn parse_image_request(query: &HashMap<String, String>) -> ImageRequest {
    let flag = |key: &str| query.get(key).map(|v| v == "1").unwrap_or(false);

    let quality = query
        .get("l")
        .and_then(|v| v.parse::<i64>().ok())
        .unwrap_or(75)
        .clamp(1, 100) as u8;

    let format = if flag("jpg") || flag("jpeg") {
        OutputFormat::Jpeg
    } else {
        OutputFormat::Webp
    };

    ImageRequest {
        target_url: query.get("url").cloned().unwrap_or_default(),
        quality,
        format,
        grayscale: flag("bw"),
    }
}

async fn serve_image(
    query: &HashMap<String, String>,
    state: &web::Data<AppState>,
) -> HttpResponse {
    let started = Instant::now();
    let request = parse_image_request(query);

    match state.pipeline.handle(&request).await {
        Ok(response) => {
            let mut builder = HttpResponse::Ok();
            builder
                .content_type(response.content_type.as_str())
                .insert_header((
                    CACHE_CONTROL,
                    format!("public, max-age={}", state.cache_ttl_seconds),
                ))
                .insert_header(("X-Cache-Status", response.cache_status.as_str()))
                .insert_header(("X-Quality", request.quality.to_string()))
                .insert_header((
                    "X-Response-Time",
                    format!("{}ms", started.elapsed().as_millis()),
                ))
                .insert_header((ACCESS_CONTROL_ALLOW_ORIGIN, "*"));

            if let (Some(original), Some(compressed), Some(saved)) = (
                response.original_size,
                response.compressed_size,
                response.bytes_saved,
            ) {
                builder
                    .insert_header(("X-Original-Size", original.to_string()))
                    .insert_header(("X-Compressed-Size", compressed.to_string()))
                    .insert_header(("X-Bytes-Saved", saved.to_string()));
            }

            builder.body(response.payload)
        }
        Err(e) => {
            error!("failed to serve {}: {}", request.target_url, e);
            HttpResponse::build(e.http_status())
                .insert_header((ACCESS_CONTROL_ALLOW_ORIGIN, "*"))
                .json(serde_json::json!({ "error": e.to_string() }))
        }
    }
}

async fn index(
    query: web::Query<HashMap<String, String>>,
    state: web::Data<AppState>,
) -> HttpResponse {
    if query.contains_key("url") {
        return serve_image(&query, &state).await;
    }

    HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(USAGE_PAGE)
}

async fn stats_page(state: web::Data<AppState>) -> HttpResponse {
    let snap = state.stats.snapshot();
    let saved_mb = snap.bytes_saved as f64 / (1024.0 * 1024.0);
    let hit_rate = if snap.requests > 0 {
        snap.cache_hits as f64 / snap.requests as f64 * 100.0
    } else {
        0.0
    };

    let body = format!(
        r#"<!DOCTYPE html>
<html>
<head>
  <meta charset="utf-8">
  <title>imgpress stats</title>
  <style>body {{ font-family: sans-serif; padding: 40px; }} td {{ padding: 6px 16px 6px 0; }}</style>
</head>
<body>
  <h1>imgpress stats</h1>
  <table>
    <tr><td>Total requests</td><td>{requests}</td></tr>
    <tr><td>Cache hits</td><td>{hits} ({hit_rate:.1}%)</td></tr>
    <tr><td>Cache misses</td><td>{misses}</td></tr>
    <tr><td>Data saved</td><td>{saved_mb:.2} MB</td></tr>
    <tr><td>Cached images</td><td>{entries}</td></tr>
    <tr><td>Server started</td><td>{started}</td></tr>
  </table>
</body>
</html>"#,
        requests = snap.requests,
        hits = snap.cache_hits,
        hit_rate = hit_rate,
        misses = snap.cache_misses,
        saved_mb = saved_mb,
        entries = state.cache.entry_count(),
        started = snap.start_time.to_rfc3339(),
    );

    HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(body)
}

async fn health() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

async fn reset(state: web::Data<AppState>) -> HttpResponse {
    state.pipeline.reset();
    info!("stats and cache reset");
    HttpResponse::Ok().body("stats and cache reset")
}

/// cors preflight for any path; everything else unmatched is a 404.
async fn fallback(req: HttpRequest) -> HttpResponse {
    if req.method() == Method::OPTIONS {
        return HttpResponse::NoContent()
            .insert_header((ACCESS_CONTROL_ALLOW_ORIGIN, "*"))
            .insert_header((ACCESS_CONTROL_ALLOW_METHODS, "GET, HEAD, OPTIONS"))
            .insert_header((ACCESS_CONTROL_ALLOW_HEADERS, "*"))
            .insert_header((ACCESS_CONTROL_MAX_AGE, "86400"))
            .finish();
    }
    HttpResponse::NotFound().body("not found")
}

const USAGE_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head>
  <meta charset="utf-8">
  <title>imgpress</title>
  <style>body { font-family: sans-serif; padding: 40px; } code { background: #f0f0f0; padding: 2px 6px; }</style>
</head>
<body>
  <h2>imgpress</h2>
  <p><strong>Usage:</strong> <code>?url=&lt;IMAGE_URL&gt;&amp;l=75&amp;jpg=0&amp;bw=0</code></p>
  <ul>
    <li><code>url</code> - image URL to compress (required)</li>
    <li><code>l</code> - quality 1-100 (default: 75)</li>
    <li><code>jpg</code> or <code>jpeg</code> - output JPEG instead of WebP</li>
    <li><code>bw</code> - convert to grayscale</li>
  </ul>
  <ul>
    <li><a href="/stats">stats</a></li>
    <li><a href="/health">health</a></li>
    <li><a href="/reset">reset</a></li>
  </ul>
</body>
</html>"#;

pub async fn run(config: Config) -> Result<()> {
    let fetcher = Arc::new(HttpFetcher::new(Duration::from_secs(
        config.fetch_timeout_seconds,
    )));
    let cache = Arc::new(ImageCache::new(Duration::from_secs(config.cache_ttl_seconds)));
    let stats = Arc::new(ProxyStats::new());
    let pipeline = Arc::new(ImagePipeline::new(fetcher, cache.clone(), stats.clone()));

    // background sweep; every get re-validates expiry on its own, the sweep
    // only reclaims memory early
    let sweep_cache = cache.clone();
    let sweep_every = Duration::from_secs(config.cache_sweep_seconds.max(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(sweep_every);
        ticker.tick().await; // the first tick completes immediately
        loop {
            ticker.tick().await;
            let purged = sweep_cache.purge_expired();
            if purged > 0 {
                debug!("sweep purged {} expired cache entries", purged);
            }
        }
    });

    let app_state = web::Data::new(AppState {
        pipeline,
        cache,
        stats,
        cache_ttl_seconds: config.cache_ttl_seconds,
    });

    let workers = num_cpus::get();
    info!(
        "imgpress starting on {} with {} workers",
        config.listen_addr, workers
    );

    HttpServer::new(move || {
        App::new()
            .app_data(app_state.clone())
            .wrap(Logger::default())
            .route("/", web::get().to(index))
            .route("/stats", web::get().to(stats_page))
            .route("/health", web::get().to(health))
            .route("/reset", web::get().to(reset))
            .default_service(web::to(fallback))
    })
    .workers(workers)
    .bind(&config.listen_addr)
    .map_err(|e| ProxyError::Internal(format!("failed to bind {}: {}", config.listen_addr, e)))?
    .run()
    .await
    .map_err(|e| ProxyError::Internal(e.to_string()))
}
