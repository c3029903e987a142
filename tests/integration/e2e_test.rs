//! End-to-end tests against a running server

use image::{DynamicImage, ImageOutputFormat, Rgba, RgbaImage};
use img_to_3d_serving::{api::routes::create_router, config::Settings, AppState};
use serde_json::Value;
use std::io::Cursor;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

const BOUNDARY: &str = "img3d-e2e-boundary";

struct Server {
    addr: SocketAddr,
    state: Arc<AppState>,
    outputs: TempDir,
    _model: TempDir,
}

async fn start_server() -> Server {
    let model = tempfile::tempdir().unwrap();
    std::fs::write(
        model.path().join("pipeline.json"),
        r#"{"name": "relief-e2e", "backend": {"kind": "relief", "grid_size": 20}}"#,
    )
    .unwrap();
    let outputs = tempfile::tempdir().unwrap();

    let mut settings = Settings::default();
    settings.model.dir = model.path().to_path_buf();
    settings.model.device = "cpu".to_string();
    settings.storage.output_dir = outputs.path().to_path_buf();

    let state = Arc::new(AppState::from_settings(settings));
    let app = create_router(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    Server {
        addr,
        state,
        outputs,
        _model: model,
    }
}

/// Opaque disc on a transparent background
fn disc_png(size: u32) -> Vec<u8> {
    let center = size as f32 / 2.0;
    let image = RgbaImage::from_fn(size, size, |x, y| {
        let dx = x as f32 + 0.5 - center;
        let dy = y as f32 + 0.5 - center;
        if (dx * dx + dy * dy).sqrt() < center * 0.8 {
            Rgba([220, 180, 90, 255])
        } else {
            Rgba([0, 0, 0, 0])
        }
    });
    let mut buf = Vec::new();
    DynamicImage::ImageRgba8(image)
        .write_to(&mut Cursor::new(&mut buf), ImageOutputFormat::Png)
        .unwrap();
    buf
}

fn multipart_body(filename: &str, data: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"image\"; filename=\"{}\"\r\nContent-Type: image/png\r\n\r\n",
            filename
        )
        .as_bytes(),
    );
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
    body
}

async fn post_image(
    client: &reqwest::Client,
    addr: SocketAddr,
    route: &str,
    data: &[u8],
) -> reqwest::Response {
    client
        .post(format!("http://{}{}", addr, route))
        .header(
            reqwest::header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(multipart_body("disc.png", data))
        .send()
        .await
        .unwrap()
}

/// Parse an untextured OBJ into (vertex count, faces)
fn parse_obj(text: &str) -> (usize, Vec<[usize; 3]>) {
    let mut vertices = 0;
    let mut faces = Vec::new();
    for line in text.lines() {
        let mut parts = line.split_whitespace();
        match parts.next() {
            Some("v") => {
                let coords: Vec<f32> = parts.map(|p| p.parse().unwrap()).collect();
                assert_eq!(coords.len(), 3);
                vertices += 1;
            }
            Some("f") => {
                let idx: Vec<usize> = parts.map(|p| p.parse().unwrap()).collect();
                faces.push([idx[0], idx[1], idx[2]]);
            }
            _ => {}
        }
    }
    (vertices, faces)
}

fn workspace_count(root: &Path) -> usize {
    std::fs::read_dir(root).map(|d| d.count()).unwrap_or(0)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_generate_over_http() {
    let server = start_server().await;
    let client = reqwest::Client::new();

    let health: Value = client
        .get(format!("http://{}/health", server.addr))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["ok"], true);
    assert_eq!(health["model_loaded"], false);

    let response = post_image(&client, server.addr, "/generate-obj", &disc_png(100)).await;
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let text = response.text().await.unwrap();

    let (vertices, faces) = parse_obj(&text);
    assert!(vertices > 0);
    assert!(!faces.is_empty());
    assert!(faces.iter().flatten().all(|i| *i >= 1 && *i <= vertices));

    assert_eq!(workspace_count(server.outputs.path()), 1);
    assert!(server.state.pipeline.is_loaded());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_share_one_pipeline() {
    let server = start_server().await;
    let client = reqwest::Client::new();
    let image = disc_png(64);

    let requests = (0..4).map(|_| post_image(&client, server.addr, "/generate-raw-obj", &image));
    let responses = futures::future::join_all(requests).await;

    for response in responses {
        assert_eq!(response.status(), reqwest::StatusCode::OK);
    }
    assert_eq!(server.state.serializer.completed(), 4);
    assert_eq!(server.state.pipeline.load_failures(), 0);
    assert_eq!(workspace_count(server.outputs.path()), 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_empty_upload_over_http() {
    let server = start_server().await;
    let client = reqwest::Client::new();

    let response = post_image(&client, server.addr, "/generate-raw-obj", b"").await;
    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);

    let json: Value = response.json().await.unwrap();
    assert_eq!(json["error"]["message"], "Empty upload");
    assert!(!server.state.pipeline.is_loaded());
    assert_eq!(workspace_count(server.outputs.path()), 0);
}
