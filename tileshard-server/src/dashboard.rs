use std::sync::Arc;

use tileshard_net::BandwidthMonitor;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;

use crate::stats::StatsSink;

/// Read-only debug dashboard on a side port: `GET /stats` returns the JSON
/// snapshot, `GET /` a page that polls it. One request per connection.
pub(crate) async fn run_dashboard(
    listener: TcpListener,
    stats: Arc<StatsSink>,
    bandwidth: Arc<BandwidthMonitor>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = shutdown.wait_for(|stop| *stop) => break,

            accepted = listener.accept() => {
                let (stream, _) = match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        log::warn!("dashboard accept failed: {e}");
                        continue;
                    }
                };
                let stats = Arc::clone(&stats);
                let bandwidth = Arc::clone(&bandwidth);
                tokio::spawn(async move {
                    if let Err(e) = handle_request(stream, &stats, &bandwidth).await {
                        log::debug!("dashboard request failed: {e}");
                    }
                });
            }
        }
    }
}

async fn handle_request(
    mut stream: TcpStream,
    stats: &StatsSink,
    bandwidth: &BandwidthMonitor,
) -> std::io::Result<()> {
    let mut buf = [0u8; 1024];
    let n = stream.read(&mut buf).await?;
    let request = String::from_utf8_lossy(&buf[..n]);
    let path = request
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .unwrap_or("/");

    let (status, content_type, body) = match path {
        "/stats" => (
            "200 OK",
            "application/json",
            stats.snapshot_json(bandwidth.snapshot()),
        ),
        "/" => ("200 OK", "text/html; charset=utf-8", DASHBOARD_HTML.to_owned()),
        _ => ("404 Not Found", "text/plain", "not found".to_owned()),
    };

    let response = format!(
        "HTTP/1.1 {status}\r\n\
         Content-Type: {content_type}\r\n\
         Content-Length: {}\r\n\
         Access-Control-Allow-Origin: *\r\n\
         Connection: close\r\n\
         \r\n\
         {body}",
        body.len(),
    );
    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await
}

const DASHBOARD_HTML: &str = r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>tileshard</title>
<style>
  body { font-family: monospace; background: #101418; color: #cdd6e0; margin: 2em; }
  h1 { font-size: 1.2em; }
  table { border-collapse: collapse; }
  td { padding: 2px 12px 2px 0; }
  td:first-child { color: #7f919f; }
</style>
</head>
<body>
<h1>tileshard</h1>
<table id="stats"></table>
<script>
async function refresh() {
  try {
    const res = await fetch('/stats');
    const data = await res.json();
    const rows = Object.entries(data)
      .map(([k, v]) => `<tr><td>${k}</td><td>${typeof v === 'number' ? +v.toFixed(3) : v}</td></tr>`)
      .join('');
    document.getElementById('stats').innerHTML = rows;
  } catch (e) {
    document.getElementById('stats').innerHTML = '<tr><td>offline</td></tr>';
  }
}
refresh();
setInterval(refresh, 1000);
</script>
</body>
</html>
"#;
