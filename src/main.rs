//! imgpress - an on-demand image transcoding proxy
//!
//! fetches remote images behind a synthesized referer, re-encodes them to
//! WebP or JPEG at a requested quality, caches the result in memory, and
//! serves it with compression bookkeeping for bandwidth-constrained clients.

mod cache;
mod config;
mod fetcher;
mod pipeline;
mod referer;
mod server;
mod stats;
mod transform;
mod util;

use config::Config;
use log::error;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    util::setup_logger();

    let config = Config::load();

    if let Err(e) = server::run(config).await {
        error!("server error: {}", e);
        return Err(std::io::Error::new(std::io::ErrorKind::Other, e.to_string()));
    }
    Ok(())
}
