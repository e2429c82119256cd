use anyhow::Result;
use axum::extract::Request;
use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE};
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::{from_fn, Next};
use axum::response::{Html, Response};
use axum::routing::get;
use axum::Router;
use std::path::PathBuf;
use tower_http::services::ServeFile;

/// The only files the dashboard is allowed to fetch besides `index.html`.
pub const DASHBOARD_ASSETS: [&str; 3] = ["style.css", "main.js", "chart.js"];

const PLACEHOLDER_INDEX: &str = r#"<!doctype html>
<html lang="en">
  <head>
    <meta charset="utf-8" />
    <title>Plant Monitor</title>
  </head>
  <body style="font-family: system-ui; padding: 24px">
    <h1>Plant Monitor</h1>
    <p>Dashboard assets are not installed. Point <code>PLANT_MONITOR_STATIC_ROOT</code> at the directory holding <code>index.html</code>.</p>
    <p><a href="/moisture">/moisture</a> &middot; <a href="/history?type=seconds">/history</a> &middot; <a href="/status">/status</a></p>
  </body>
</html>
"#;

async fn file_not_found() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, "File not found")
}

/// Dashboard HTML is never cached so a redeploy shows up on the next refresh; scripts and styles
/// may be reused for a few minutes.
async fn dashboard_cache_control(req: Request, next: Next) -> Response {
    let mut response = next.run(req).await;
    if !response.status().is_success() || response.headers().contains_key(CACHE_CONTROL) {
        return response;
    }
    let html = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("text/html"));
    let value = if html { "no-store" } else { "public, max-age=300" };
    response
        .headers_mut()
        .insert(CACHE_CONTROL, HeaderValue::from_static(value));
    response
}

/// Routes for `/` and the whitelisted dashboard assets. Without a static root `/` serves a
/// placeholder page. Any other unmatched path is a plain-text 404.
pub fn service(static_root: Option<PathBuf>) -> Result<Router> {
    let router = match static_root {
        Some(root) => {
            if !root.is_dir() {
                anyhow::bail!("static root {} is not a directory", root.display());
            }
            DASHBOARD_ASSETS.iter().fold(
                Router::new().route_service("/", ServeFile::new(root.join("index.html"))),
                |router, asset| router.route_service(&format!("/{asset}"), ServeFile::new(root.join(asset))),
            )
        }
        None => Router::new().route("/", get(|| async { Html(PLACEHOLDER_INDEX) })),
    };
    Ok(router
        .layer(from_fn(dashboard_cache_control))
        .fallback(file_not_found))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use tempfile::TempDir;
    use tower::ServiceExt;

    async fn fetch(app: &Router, uri: &str) -> Response {
        app.clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn serves_index_and_whitelisted_assets() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("index.html"), "<html>plants</html>").unwrap();
        std::fs::write(dir.path().join("main.js"), "console.log('hi');").unwrap();
        std::fs::write(dir.path().join("secrets.txt"), "nope").unwrap();
        let app = service(Some(dir.path().to_path_buf())).unwrap();

        let resp = fetch(&app, "/main.js").await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers().get(CACHE_CONTROL).unwrap(), "public, max-age=300");

        let resp = fetch(&app, "/").await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers().get(CACHE_CONTROL).unwrap(), "no-store");

        let resp = fetch(&app, "/secrets.txt").await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"File not found");
    }

    #[tokio::test]
    async fn placeholder_only_answers_root() {
        let app = service(None).unwrap();

        let resp = fetch(&app, "/").await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert!(String::from_utf8_lossy(&body).contains("Plant Monitor"));

        let resp = fetch(&app, "/favicon.ico").await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"File not found");
    }

    #[test]
    fn missing_static_root_is_an_error() {
        assert!(service(Some(PathBuf::from("/definitely/not/here"))).is_err());
    }
}
