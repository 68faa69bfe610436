//! Integration tests for shardstore
//!
//! Each test starts two storage nodes and a coordinator on ephemeral local
//! ports, sharing a temporary home directory.

use shardstore::config::{NodeAddr, StoreConfig};
use shardstore::protocol::{Command, Framing};
use shardstore::storage::BuiltinTar;
use shardstore::{Category, Coordinator, Status, StorageNode, StoreClient, StoreError, Wire};
use std::future::Future;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::{tempdir, TempDir};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

struct Cluster {
    home: TempDir,
    config: StoreConfig,
    coordinator: SocketAddr,
}

impl Cluster {
    async fn start(wire: Wire) -> Self {
        let home = tempdir().unwrap();
        let mut config = StoreConfig::new(home.path())
            .with_wire(wire)
            .with_archiver(Arc::new(BuiltinTar));

        for category in [Category::Document, Category::Text] {
            let addr = spawn_node(&config, category).await;
            config = config.with_node(category, NodeAddr::new("127.0.0.1", addr.port()));
        }

        let coordinator = Coordinator::open(&config).await.unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(coordinator.run(listener, std::future::pending()));

        Self {
            home,
            config,
            coordinator: addr,
        }
    }

    async fn client(&self) -> StoreClient {
        StoreClient::connect(self.coordinator, self.config.wire)
            .await
            .unwrap()
    }

    fn home(&self) -> &Path {
        self.home.path()
    }
}

async fn spawn_node(config: &StoreConfig, category: Category) -> SocketAddr {
    let node = StorageNode::open(config, category).await.unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(node.run(listener, std::future::pending()));
    addr
}

/// Fail instead of hanging when a reply never terminates
async fn within<F: Future>(what: &str, fut: F) -> F::Output {
    tokio::time::timeout(Duration::from_secs(10), fut)
        .await
        .unwrap_or_else(|_| panic!("{} did not finish", what))
}

fn tar_members(archive: &Path) -> Vec<(String, Vec<u8>)> {
    let mut ar = tar::Archive::new(std::fs::File::open(archive).unwrap());
    let mut members = Vec::new();
    for entry in ar.entries().unwrap() {
        let mut entry = entry.unwrap();
        if !entry.header().entry_type().is_file() {
            continue;
        }
        let name = entry.path().unwrap().display().to_string();
        let mut data = Vec::new();
        std::io::Read::read_to_end(&mut entry, &mut data).unwrap();
        members.push((name, data));
    }
    members.sort();
    members
}

#[tokio::test]
async fn test_round_trip_every_category_at_chunk_boundaries() {
    let cluster = Cluster::start(Wire::framed()).await;
    let scratch = tempdir().unwrap();
    let mut client = cluster.client().await;
    let chunk = cluster.config.wire.chunk_size;

    for (ext, segment) in [("c", "smain"), ("pdf", "spdf"), ("txt", "stext")] {
        for size in [0, 1, chunk - 1, chunk, chunk + 1] {
            let name = format!("f{}.{}", size, ext);
            let data: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();
            let local = scratch.path().join(&name);
            std::fs::write(&local, &data).unwrap();

            assert_eq!(client.upload(&local, "~/smain/rt").await.unwrap(), size as u64);
            let stored = cluster.home().join(segment).join("rt").join(&name);
            assert_eq!(std::fs::read(&stored).unwrap(), data, "stored {}", name);

            let back = scratch.path().join(format!("back-{}", name));
            let remote = format!("~/smain/rt/{}", name);
            assert_eq!(client.download(&remote, &back).await.unwrap(), size as u64);
            assert_eq!(std::fs::read(&back).unwrap(), data, "downloaded {}", name);
        }
    }
    client.quit().await.unwrap();
}

#[tokio::test]
async fn test_files_never_land_in_a_foreign_root() {
    let cluster = Cluster::start(Wire::framed()).await;
    let scratch = tempdir().unwrap();
    let mut client = cluster.client().await;

    for name in ["main.c", "paper.pdf", "notes.txt"] {
        let local = scratch.path().join(name);
        std::fs::write(&local, name).unwrap();
        client.upload(&local, "~/smain/mixed").await.unwrap();
    }

    for (category, expected) in [
        (Category::Source, "main.c"),
        (Category::Document, "paper.pdf"),
        (Category::Text, "notes.txt"),
    ] {
        let dir = cluster
            .config
            .namespace
            .root_of(category)
            .join("mixed");
        let names: Vec<String> = std::fs::read_dir(&dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec![expected.to_string()]);
    }
}

#[tokio::test]
async fn test_notes_scenario() {
    let cluster = Cluster::start(Wire::framed()).await;
    let scratch = tempdir().unwrap();
    let mut client = cluster.client().await;

    let local = scratch.path().join("notes.txt");
    std::fs::write(&local, "hello world!").unwrap();
    assert_eq!(client.upload(&local, "~/smain/work").await.unwrap(), 12);

    let stored = cluster.home().join("stext/work/notes.txt");
    assert_eq!(std::fs::read_to_string(&stored).unwrap(), "hello world!");

    let listing = client.display("~/smain/work").await.unwrap();
    assert_eq!(
        listing,
        vec![format!("{}/stext/work/notes.txt", cluster.home().display())]
    );

    let back = scratch.path().join("fetched.txt");
    assert_eq!(
        client.download("~/smain/work/notes.txt", &back).await.unwrap(),
        12
    );
    assert_eq!(std::fs::read_to_string(&back).unwrap(), "hello world!");

    client.remove("~/smain/work/notes.txt").await.unwrap();
    assert!(!stored.exists());

    let err = client
        .download("~/smain/work/notes.txt", &back)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Remote(Status::NotFound)));
}

#[tokio::test]
async fn test_listing_is_complete_and_flat() {
    let cluster = Cluster::start(Wire::framed()).await;
    let scratch = tempdir().unwrap();
    let mut client = cluster.client().await;

    for name in ["b.c", "a.c", "r.pdf", "x.txt", "w.txt"] {
        let local = scratch.path().join(name);
        std::fs::write(&local, name).unwrap();
        client.upload(&local, "~/smain/docs").await.unwrap();
    }
    let nested = scratch.path().join("deep.txt");
    std::fs::write(&nested, "deep").unwrap();
    client.upload(&nested, "~/smain/docs/sub").await.unwrap();

    // Stray files of the wrong type are not listed
    std::fs::write(cluster.home().join("smain/docs/stray.pdf"), "x").unwrap();
    std::fs::write(cluster.home().join("spdf/docs/stray.txt"), "x").unwrap();

    let h = cluster.home().display();
    let listing = client.display("~/smain/docs").await.unwrap();
    assert_eq!(
        listing,
        vec![
            format!("{h}/smain/docs/a.c"),
            format!("{h}/smain/docs/b.c"),
            format!("{h}/spdf/docs/r.pdf"),
            format!("{h}/stext/docs/w.txt"),
            format!("{h}/stext/docs/x.txt"),
        ]
    );

    assert!(client.display("~/smain/nowhere").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_archives_hold_exactly_the_category() {
    let cluster = Cluster::start(Wire::framed()).await;
    let scratch = tempdir().unwrap();
    let mut client = cluster.client().await;

    // No files yet: a valid, empty archive
    let empty = scratch.path().join("empty.tar");
    client.archive(".pdf", &empty).await.unwrap();
    assert!(tar_members(&empty).is_empty());

    let one = scratch.path().join("one.c");
    std::fs::write(&one, "int main;").unwrap();
    client.upload(&one, "~/smain").await.unwrap();
    let cfiles = scratch.path().join("cfiles.tar");
    client.archive(".c", &cfiles).await.unwrap();
    assert_eq!(
        tar_members(&cfiles),
        vec![("one.c".to_string(), b"int main;".to_vec())]
    );

    for (name, dir) in [("a.txt", "~/smain"), ("b.txt", "~/smain/x"), ("c.txt", "~/smain/x/y")] {
        let local = scratch.path().join(name);
        std::fs::write(&local, name).unwrap();
        client.upload(&local, dir).await.unwrap();
    }
    let other = scratch.path().join("skip.pdf");
    std::fs::write(&other, "%PDF").unwrap();
    client.upload(&other, "~/smain/x").await.unwrap();

    let text = scratch.path().join("text.tar");
    client.archive("txt", &text).await.unwrap();
    assert_eq!(
        tar_members(&text),
        vec![
            ("a.txt".to_string(), b"a.txt".to_vec()),
            ("x/b.txt".to_string(), b"b.txt".to_vec()),
            ("x/y/c.txt".to_string(), b"c.txt".to_vec()),
        ]
    );

    let err = client.archive(".zip", &text).await.unwrap_err();
    assert!(matches!(err, StoreError::Remote(Status::Unrecognized)));
}

#[tokio::test]
async fn test_removing_missing_file_keeps_session_alive() {
    let cluster = Cluster::start(Wire::framed()).await;
    let scratch = tempdir().unwrap();
    let mut client = cluster.client().await;

    for path in ["~/smain/ghost.c", "~/smain/ghost.pdf", "~/smain/ghost.txt"] {
        let err = client.remove(path).await.unwrap_err();
        assert!(
            matches!(err, StoreError::Remote(Status::NotFound)),
            "{} gave {:?}",
            path,
            err
        );
    }

    let local = scratch.path().join("alive.txt");
    std::fs::write(&local, "still here").unwrap();
    assert_eq!(client.upload(&local, "~/smain").await.unwrap(), 10);
}

#[tokio::test]
async fn test_sessions_are_served_concurrently() {
    let cluster = Cluster::start(Wire::framed()).await;
    let scratch = tempdir().unwrap();

    // An idle session must not hold up the others
    let _idle = TcpStream::connect(cluster.coordinator).await.unwrap();

    let mut tasks = Vec::new();
    for i in 0..8 {
        let mut client = cluster.client().await;
        let local = scratch.path().join(format!("c{}.txt", i));
        std::fs::write(&local, format!("client {}", i)).unwrap();
        tasks.push(tokio::spawn(async move {
            client.upload(&local, "~/smain/many").await.unwrap();
            client.quit().await.unwrap();
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let stored = std::fs::read_dir(cluster.home().join("stext/many"))
        .unwrap()
        .count();
    assert_eq!(stored, 8);
}

#[tokio::test]
async fn test_legacy_node_round_trip_with_half_close() {
    let home = tempdir().unwrap();
    let wire = Wire::new(Framing::Legacy, 1024);
    let config = StoreConfig::new(home.path())
        .with_wire(wire)
        .with_archiver(Arc::new(BuiltinTar));
    let node = spawn_node(&config, Category::Text).await;

    let path = home.path().join("stext/legacy/exact.txt");
    let data = vec![b'L'; wire.chunk_size * 3];

    let mut stream = TcpStream::connect(node).await.unwrap();
    let upload = Command::Upload {
        name: path.display().to_string(),
        destination: None,
    };
    let mut request = upload.to_line().into_bytes();
    request.extend_from_slice(&data);
    stream.write_all(&request).await.unwrap();
    stream.shutdown().await.unwrap();
    let mut reply = Vec::new();
    stream.read_to_end(&mut reply).await.unwrap();
    assert!(reply.is_empty());
    assert_eq!(std::fs::read(&path).unwrap(), data);

    let mut stream = TcpStream::connect(node).await.unwrap();
    let download = Command::Download {
        path: path.display().to_string(),
    };
    stream.write_all(download.to_line().as_bytes()).await.unwrap();
    let mut received = Vec::new();
    stream.read_to_end(&mut received).await.unwrap();
    assert_eq!(received, data);
}

#[tokio::test]
async fn test_legacy_round_trip_every_category_at_chunk_boundaries() {
    let cluster = Cluster::start(Wire::legacy()).await;
    let scratch = tempdir().unwrap();
    let mut client = cluster.client().await;
    let chunk = cluster.config.wire.chunk_size;

    for (ext, segment) in [("c", "smain"), ("pdf", "spdf"), ("txt", "stext")] {
        for size in [0, 1, chunk - 1, chunk, chunk + 1] {
            let name = format!("l{}.{}", size, ext);
            let data: Vec<u8> = (0..size).map(|i| (i % 241) as u8).collect();
            let local = scratch.path().join(&name);
            std::fs::write(&local, &data).unwrap();

            let sent = within("legacy upload", client.upload(&local, "~/smain/lg")).await;
            assert_eq!(sent.unwrap(), size as u64);
            let stored = cluster.home().join(segment).join("lg").join(&name);
            assert_eq!(std::fs::read(&stored).unwrap(), data, "stored {}", name);

            let back = scratch.path().join(format!("back-{}", name));
            let remote = format!("~/smain/lg/{}", name);
            let received = within("legacy download", client.download(&remote, &back)).await;
            assert_eq!(received.unwrap(), size as u64);
            assert_eq!(std::fs::read(&back).unwrap(), data, "downloaded {}", name);
        }
    }
    client.quit().await.unwrap();
}

#[tokio::test]
async fn test_legacy_display_lists_every_node() {
    let cluster = Cluster::start(Wire::legacy()).await;
    let scratch = tempdir().unwrap();
    let mut client = cluster.client().await;

    for name in ["c.txt", "b.pdf", "a.c"] {
        let local = scratch.path().join(name);
        std::fs::write(&local, name).unwrap();
        within("legacy upload", client.upload(&local, "~/smain/d"))
            .await
            .unwrap();
    }

    let h = cluster.home().display();
    let listing = within("legacy display", client.display("~/smain/d"))
        .await
        .unwrap();
    assert_eq!(
        listing,
        vec![
            format!("{h}/smain/d/a.c"),
            format!("{h}/spdf/d/b.pdf"),
            format!("{h}/stext/d/c.txt"),
        ]
    );
}

#[tokio::test]
async fn test_legacy_empty_file_download_terminates() {
    let cluster = Cluster::start(Wire::legacy()).await;
    let scratch = tempdir().unwrap();
    let mut client = cluster.client().await;

    std::fs::create_dir_all(cluster.home().join("stext/d")).unwrap();
    std::fs::write(cluster.home().join("stext/d/e.txt"), b"").unwrap();

    let back = scratch.path().join("e.txt");
    let received = within("empty download", client.download("~/smain/d/e.txt", &back)).await;
    assert_eq!(received.unwrap(), 0);
    assert_eq!(std::fs::read(&back).unwrap(), b"");
}

#[tokio::test]
async fn test_legacy_remove_sends_nothing_but_deletes() {
    let cluster = Cluster::start(Wire::legacy()).await;
    let scratch = tempdir().unwrap();
    let mut client = cluster.client().await;

    let local = scratch.path().join("gone.pdf");
    std::fs::write(&local, "%PDF").unwrap();
    within("legacy upload", client.upload(&local, "~/smain/rm"))
        .await
        .unwrap();
    let stored = cluster.home().join("spdf/rm/gone.pdf");
    assert!(stored.exists());

    within("legacy remove", client.remove("~/smain/rm/gone.pdf"))
        .await
        .unwrap();
    assert!(!stored.exists());

    // No reply either way, even for a missing file
    within("legacy remove", client.remove("~/smain/rm/never.txt"))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_legacy_failed_downloads_carry_error_text() {
    let cluster = Cluster::start(Wire::legacy()).await;
    let scratch = tempdir().unwrap();
    let mut client = cluster.client().await;
    let out = scratch.path().join("out");

    for remote in ["~/smain/none.c", "~/smain/none.txt", "~/smain/none.zip"] {
        within("legacy download", client.download(remote, &out))
            .await
            .unwrap();
        let text = std::fs::read_to_string(&out).unwrap();
        assert!(text.starts_with("Error: "), "{} gave {:?}", remote, text);
    }
}

#[tokio::test]
async fn test_legacy_archive_through_coordinator() {
    let cluster = Cluster::start(Wire::legacy()).await;
    let scratch = tempdir().unwrap();
    let mut client = cluster.client().await;

    for (name, dir) in [("a.txt", "~/smain"), ("b.txt", "~/smain/x")] {
        let local = scratch.path().join(name);
        std::fs::write(&local, name).unwrap();
        within("legacy upload", client.upload(&local, dir))
            .await
            .unwrap();
    }

    let text = scratch.path().join("text.tar");
    within("legacy archive", client.archive(".txt", &text))
        .await
        .unwrap();
    assert_eq!(
        tar_members(&text),
        vec![
            ("a.txt".to_string(), b"a.txt".to_vec()),
            ("x/b.txt".to_string(), b"b.txt".to_vec()),
        ]
    );
}
