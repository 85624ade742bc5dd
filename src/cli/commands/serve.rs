//! Serve command: run the control API.

use crate::config::Settings;
use crate::server;

pub async fn cmd_serve(settings: &Settings, bind: Option<&str>) -> anyhow::Result<()> {
    let bind = parse_bind_address(bind.unwrap_or(&settings.server.bind));
    server::serve(settings, &bind).await
}

/// Accept `PORT`, `HOST`, or `HOST:PORT` and normalize to `HOST:PORT`.
fn parse_bind_address(bind: &str) -> String {
    if bind.contains(':') {
        bind.to_string()
    } else if bind.chars().all(|c| c.is_ascii_digit()) {
        format!("127.0.0.1:{bind}")
    } else {
        format!("{bind}:3030")
    }
}
