//! Drive the cell server over real HTTP with the library's own cell client

use std::net::SocketAddr;
use std::sync::Arc;

use cellfs_daemon::http_server::{self, Config};
use cellfs_daemon::{CellTable, ServiceState};
use common::cell::retry;
use common::codec::BlockEncoded;
use common::fs::Commit;
use common::prelude::*;
use url::Url;

/// Serve `cells` on an ephemeral port, returning the server's base URL
async fn spawn_server(cells: CellTable) -> Url {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    let identity = Entity::generate().unwrap().public();
    let router = http_server::router(&Config::new(addr), ServiceState::new(cells, identity));
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    Url::parse(&format!("http://{}", addr)).unwrap()
}

fn cell_at(base: &Url, name: &str) -> HttpCell {
    HttpCell::new(base.join(&format!("/api/v0/cells/{}", name)).unwrap())
}

#[tokio::test]
async fn test_cas_over_http() {
    let ctx = Context::background();
    let base = spawn_server(CellTable::in_memory()).await;
    let cell = cell_at(&base, "root");

    assert!(matches!(cell.get(&ctx).await, Err(CellError::NotFound(_))));
    assert!(matches!(
        cell.cas(&ctx, b"", b"x").await,
        Err(CellError::NotFound(_))
    ));

    cell.create(&ctx).await.unwrap();
    assert_eq!(cell.get(&ctx).await.unwrap(), b"");

    assert!(cell.cas(&ctx, b"", b"first").await.unwrap());
    assert!(!cell.cas(&ctx, b"", b"second").await.unwrap());
    assert_eq!(cell.get(&ctx).await.unwrap(), b"first");

    // a loser learns the current value from the same round trip
    let outcome = cell.swap(&ctx, b"stale", b"third").await.unwrap();
    assert!(!outcome.changed);
    assert_eq!(outcome.current, b"first");
}

#[tokio::test]
async fn test_bad_name_is_rejected() {
    let ctx = Context::background();
    let base = spawn_server(CellTable::in_memory()).await;
    let cell = cell_at(&base, ".hidden");
    assert!(matches!(
        cell.create(&ctx).await,
        Err(CellError::Status { status: 400, .. })
    ));
}

#[tokio::test]
async fn test_concurrent_writers_all_land() {
    let ctx = Context::background();
    let base = spawn_server(CellTable::in_memory()).await;
    let cell = Arc::new(cell_at(&base, "counter"));
    cell.create(&ctx).await.unwrap();

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let cell = cell.clone();
        tasks.push(tokio::spawn(async move {
            let ctx = Context::background();
            retry::update(&ctx, cell.as_ref(), 64, |current| {
                let n: u64 = std::str::from_utf8(current)
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(0);
                Ok((n + 1).to_string().into_bytes())
            })
            .await
            .unwrap();
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }
    assert_eq!(cell.get(&ctx).await.unwrap(), b"8");
}

#[tokio::test]
async fn test_cells_survive_a_restart() {
    let ctx = Context::background();
    let temp = tempfile::TempDir::new().unwrap();

    let base = spawn_server(CellTable::open(temp.path()).await.unwrap()).await;
    let cell = cell_at(&base, "root");
    cell.create(&ctx).await.unwrap();
    assert!(cell.cas(&ctx, b"", b"durable").await.unwrap());

    let base = spawn_server(CellTable::open(temp.path()).await.unwrap()).await;
    assert_eq!(cell_at(&base, "root").get(&ctx).await.unwrap(), b"durable");
}

#[tokio::test]
async fn test_volume_over_an_encrypted_http_cell() {
    let ctx = Context::background();
    let base = spawn_server(CellTable::in_memory()).await;
    let raw = cell_at(&base, "volume");
    raw.create(&ctx).await.unwrap();

    let refs = RefStore::new(Arc::new(MemoryStore::new()), RefStoreConfig::default());
    let key = Secret::generate().unwrap();
    let volume = Volume::new(
        Arc::new(SymmetricCell::new(Arc::new(raw.clone()), key.clone())),
        refs.clone(),
    );

    let file = File::write(&ctx, &refs, b"over the wire").await.unwrap();
    volume.put(&ctx, "notes/a.txt", Object::File(file)).await.unwrap();

    // the server only ever sees ciphertext
    let stored = raw.get(&ctx).await.unwrap();
    assert!(!stored.is_empty());
    assert!(Commit::decode(&stored).is_err());

    // a second handle with the same key reads it back
    let other = Volume::new(
        Arc::new(SymmetricCell::new(Arc::new(raw), key)),
        refs.clone(),
    );
    let file: File = other.get(&ctx, "notes/a.txt").await.unwrap().try_into().unwrap();
    assert_eq!(file.read_all(&ctx, &refs).await.unwrap(), b"over the wire");
}

#[tokio::test]
async fn test_status_routes() {
    let base = spawn_server(CellTable::in_memory()).await;
    let client = reqwest::Client::new();

    for route in ["livez", "readyz", "identity", "version"] {
        let response = client
            .get(base.join(&format!("/_status/{}", route)).unwrap())
            .send()
            .await
            .unwrap();
        assert!(response.status().is_success(), "{} failed", route);
    }

    let response = client
        .get(base.join("/nowhere").unwrap())
        .header("accept", "application/json")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);
}
