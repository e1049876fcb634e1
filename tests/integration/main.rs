//! Integration tests for loadforge

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use tempfile::TempDir;

    fn loadforge() -> Command {
        let mut cmd = cargo_bin_cmd!("loadforge");
        cmd.env_remove("LOADFORGE_CONFIG");
        cmd
    }

    #[test]
    fn help_displays() {
        loadforge()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("custom k6 binary build service"));
    }

    #[test]
    fn version_displays() {
        loadforge()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("loadforge"));
    }

    #[test]
    fn subcommand_help_lists_flags() {
        loadforge()
            .args(["server", "--help"])
            .assert()
            .success()
            .stdout(predicate::str::contains("--cache-url"))
            .stdout(predicate::str::contains("--enable-cgo"));

        loadforge()
            .args(["store", "--help"])
            .assert()
            .success()
            .stdout(predicate::str::contains("--download-url"))
            .stdout(predicate::str::contains("--retention-days"));
    }

    #[test]
    fn unknown_flag_fails() {
        loadforge()
            .args(["store", "--no-such-flag"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("--no-such-flag"));
    }

    #[test]
    fn missing_config_file_fails() {
        let temp = TempDir::new().unwrap();
        loadforge()
            .args(["--config"])
            .arg(temp.path().join("absent.toml"))
            .arg("store")
            .assert()
            .failure()
            .stderr(predicate::str::contains("does not exist"));
    }

    #[test]
    fn invalid_config_file_fails() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(&path, "[store]\nport = \"nine thousand\"\n").unwrap();

        loadforge()
            .arg("--config")
            .arg(&path)
            .arg("store")
            .assert()
            .failure()
            .stderr(predicate::str::contains("invalid configuration"));
    }

    #[test]
    fn server_with_missing_catalog_fails() {
        let temp = TempDir::new().unwrap();
        loadforge()
            .args(["server", "--port", "0", "--catalog"])
            .arg(temp.path().join("catalog.json"))
            .arg("--store-dir")
            .arg(temp.path().join("store"))
            .assert()
            .failure()
            .stderr(predicate::str::contains("reading catalog"));
    }

    #[test]
    fn local_reports_unsatisfiable_constraint() {
        let temp = TempDir::new().unwrap();
        let catalog = temp.path().join("catalog.json");
        std::fs::write(
            &catalog,
            r#"{"k6": {"module": "go.k6.io/k6", "versions": ["v0.1.0", "v0.2.0"]}}"#,
        )
        .unwrap();

        loadforge()
            .args(["local", "--platform", "linux/amd64", "--k6", ">v0.2.0", "--catalog"])
            .arg(&catalog)
            .arg("--store-dir")
            .arg(temp.path().join("store"))
            .assert()
            .failure()
            .stderr(predicate::str::contains("cannot satisfy dependency k6"));
    }

    #[test]
    fn remote_against_unreachable_server_fails() {
        loadforge()
            .args([
                "remote",
                "--server",
                "http://127.0.0.1:1",
                "--platform",
                "linux/amd64",
            ])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Error:"));
    }

    #[test]
    fn remote_rejects_malformed_dependency() {
        loadforge()
            .args(["remote", "-d", ":v0.1.0"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("missing name"));
    }
}

#[cfg(unix)]
mod store_process_tests {
    use loadforge::store::{checksum, ObjectStore, RemoteObjectStore};
    use std::net::{TcpListener, TcpStream};
    use std::process::{Child, Command, Stdio};
    use std::time::{Duration, Instant};
    use tempfile::TempDir;

    fn free_port() -> u16 {
        TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port()
    }

    fn wait_until_listening(port: u16) {
        let deadline = Instant::now() + Duration::from_secs(10);
        while TcpStream::connect(("127.0.0.1", port)).is_err() {
            assert!(Instant::now() < deadline, "store server did not start");
            std::thread::sleep(Duration::from_millis(50));
        }
    }

    fn spawn_store(dir: &std::path::Path, port: u16) -> Child {
        Command::new(env!("CARGO_BIN_EXE_loadforge"))
            .env_remove("LOADFORGE_CONFIG")
            .args(["store", "--port", &port.to_string(), "--store-dir"])
            .arg(dir)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .unwrap()
    }

    #[tokio::test]
    async fn store_server_roundtrip_and_graceful_shutdown() {
        let temp = TempDir::new().unwrap();
        let port = free_port();
        let mut child = spawn_store(temp.path(), port);
        wait_until_listening(port);

        let client = RemoteObjectStore::new(&format!("http://127.0.0.1:{port}")).unwrap();
        let object = client.put("objectID", b"object content".to_vec()).await.unwrap();
        assert_eq!(object.checksum, checksum(b"object content"));
        assert_eq!(
            object.url,
            format!("http://localhost:{port}/store/objectID/download")
        );
        assert_eq!(client.download("objectID").await.unwrap(), b"object content");

        let status = Command::new("kill")
            .args(["-TERM", &child.id().to_string()])
            .status()
            .unwrap();
        assert!(status.success());

        let deadline = Instant::now() + Duration::from_secs(15);
        let exit = loop {
            if let Some(exit) = child.try_wait().unwrap() {
                break exit;
            }
            assert!(Instant::now() < deadline, "store server did not stop");
            std::thread::sleep(Duration::from_millis(50));
        };
        assert!(exit.success());
    }
}

mod end_to_end {
    use async_trait::async_trait;
    use loadforge::builder::Builder;
    use loadforge::cache::StoreCache;
    use loadforge::catalog::{Dependency, JsonCatalog, ResolvedSet};
    use loadforge::client::{download_artifact, BuildClient};
    use loadforge::error::{ForgeError, ForgeResult};
    use loadforge::platform::Platform;
    use loadforge::server::{build_api, serve, store_api, ServerLifecycle};
    use loadforge::service::BuildService;
    use loadforge::store::{checksum, FileObjectStore, ObjectStore, RemoteObjectStore};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::net::TcpListener;

    const REGISTRY: &str = r#"{
        "k6": {"module": "go.k6.io/k6", "versions": ["v0.1.0", "v0.2.0"]},
        "k6/x/ext": {"module": "github.com/org/ext", "versions": ["v0.1.0", "v0.2.0"]}
    }"#;

    #[derive(Default)]
    struct CountingBuilder {
        calls: AtomicUsize,
        /// Stamp each binary, as a toolchain embedding build metadata would
        stamp: Option<&'static str>,
    }

    impl CountingBuilder {
        fn stamped(stamp: &'static str) -> Self {
            Self {
                stamp: Some(stamp),
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl Builder for CountingBuilder {
        async fn build(&self, platform: &Platform, resolved: &ResolvedSet) -> ForgeResult<Vec<u8>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            let mut content = format!("k6 {} for {platform}", resolved.core.version);
            for ext in &resolved.extensions {
                content.push_str(&format!(" +{}@{}", ext.source_path, ext.version));
            }
            if let Some(stamp) = self.stamp {
                content.push_str(&format!(" built by {stamp}"));
            }
            Ok(content.into_bytes())
        }
    }

    struct Cluster {
        store_url: String,
        lifecycles: Vec<ServerLifecycle>,
        _temp: TempDir,
    }

    impl Cluster {
        async fn start() -> Self {
            let temp = TempDir::new().unwrap();
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let store_url = format!("http://{}", listener.local_addr().unwrap());
            let store = FileObjectStore::new(temp.path().join("store"), store_url.clone()).unwrap();

            let lifecycle = ServerLifecycle::new();
            tokio::spawn(serve(
                "store server",
                listener,
                store_api::router(Arc::new(store)),
                lifecycle.clone(),
                Duration::from_secs(5),
            ));

            Self {
                store_url,
                lifecycles: vec![lifecycle],
                _temp: temp,
            }
        }

        /// Start a build server backed by the shared store, returning its URL
        async fn build_server(&mut self, builder: Arc<CountingBuilder>) -> String {
            let objects: Arc<dyn ObjectStore> =
                Arc::new(RemoteObjectStore::new(&self.store_url).unwrap());
            let service = BuildService::new(
                Arc::new(JsonCatalog::from_json(REGISTRY).unwrap()),
                builder,
                Arc::new(StoreCache::new(Arc::clone(&objects))),
                objects,
            );

            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let url = format!("http://{}", listener.local_addr().unwrap());
            let lifecycle = ServerLifecycle::new();
            tokio::spawn(serve(
                "build server",
                listener,
                build_api::router(Arc::new(service)),
                lifecycle.clone(),
                Duration::from_secs(5),
            ));
            self.lifecycles.push(lifecycle);
            url
        }

        async fn stop(self) {
            for lifecycle in &self.lifecycles {
                lifecycle.shutdown();
                lifecycle.wait_stopped().await;
            }
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn build_download_and_verify() {
        let mut cluster = Cluster::start().await;
        let builder = Arc::new(CountingBuilder::default());
        let server = cluster.build_server(Arc::clone(&builder)).await;
        let client = BuildClient::new(&server).unwrap();

        let artifact = client
            .build(
                "linux/amd64",
                ">v0.1.0",
                &[Dependency::new("k6/x/ext", "v0.1.0")],
            )
            .await
            .unwrap();

        assert_eq!(artifact.dependencies.len(), 2);
        assert_eq!(artifact.dependencies[0].version, "v0.2.0");
        assert_eq!(artifact.dependencies[1].version, "v0.1.0");
        assert!(artifact.url.starts_with(&cluster.store_url));

        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("k6");
        download_artifact(&artifact, &dest).await.unwrap();
        let content = std::fs::read(&dest).unwrap();
        assert_eq!(checksum(&content), artifact.checksum);
        assert_eq!(
            String::from_utf8(content).unwrap(),
            "k6 v0.2.0 for linux/amd64 +github.com/org/ext@v0.1.0"
        );

        cluster.stop().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn build_servers_share_the_cache() {
        let mut cluster = Cluster::start().await;
        let first_builder = Arc::new(CountingBuilder::default());
        let second_builder = Arc::new(CountingBuilder::default());
        let first = BuildClient::new(&cluster.build_server(Arc::clone(&first_builder)).await).unwrap();
        let second = BuildClient::new(&cluster.build_server(Arc::clone(&second_builder)).await).unwrap();

        let a = first.build("linux/arm64", "v0.1.0", &[]).await.unwrap();
        let b = second.build("linux/arm64", "v0.1.0", &[]).await.unwrap();

        assert_eq!(a, b);
        assert_eq!(first_builder.calls.load(Ordering::SeqCst), 1);
        assert_eq!(second_builder.calls.load(Ordering::SeqCst), 0);

        cluster.stop().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn racing_build_servers_agree_on_one_binary() {
        let mut cluster = Cluster::start().await;
        let first = BuildClient::new(
            &cluster
                .build_server(Arc::new(CountingBuilder::stamped("first")))
                .await,
        )
        .unwrap();
        let second = BuildClient::new(
            &cluster
                .build_server(Arc::new(CountingBuilder::stamped("second")))
                .await,
        )
        .unwrap();

        let (a, b) = tokio::join!(
            first.build("linux/amd64", "v0.2.0", &[]),
            second.build("linux/amd64", "v0.2.0", &[]),
        );
        let (a, b) = (a.unwrap(), b.unwrap());
        assert_eq!(a, b);

        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("k6");
        download_artifact(&a, &dest).await.unwrap();
        assert_eq!(checksum(&std::fs::read(&dest).unwrap()), a.checksum);

        let again = second.build("linux/amd64", "v0.2.0", &[]).await.unwrap();
        assert_eq!(again, a);

        cluster.stop().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_requests_build_once() {
        let mut cluster = Cluster::start().await;
        let builder = Arc::new(CountingBuilder::default());
        let client = BuildClient::new(&cluster.build_server(Arc::clone(&builder)).await).unwrap();
        let deps = [Dependency::new("k6/x/ext", ">=v0.2.0")];

        let requests = (0..6).map(|_| client.build("darwin/arm64", "v0.2.0", &deps));
        let artifacts = futures_util::future::join_all(requests).await;

        let first = artifacts[0].as_ref().unwrap();
        assert!(artifacts.iter().all(|a| a.as_ref().unwrap() == first));
        assert_eq!(builder.calls.load(Ordering::SeqCst), 1);

        cluster.stop().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn errors_keep_their_kind_over_http() {
        let mut cluster = Cluster::start().await;
        let builder = Arc::new(CountingBuilder::default());
        let client = BuildClient::new(&cluster.build_server(Arc::clone(&builder)).await).unwrap();

        let err = client
            .build(
                "linux/amd64",
                "v0.1.0",
                &[Dependency::new("k6/x/ext", ">v0.2.0")],
            )
            .await
            .unwrap_err();
        assert!(
            matches!(err, ForgeError::CannotSatisfy { ref name, ref constraints }
                if name == "k6/x/ext" && constraints == ">v0.2.0")
        );

        let err = client.build("amiga/m68k", "v0.1.0", &[]).await.unwrap_err();
        assert!(matches!(err, ForgeError::BadRequest(_)));
        assert_eq!(builder.calls.load(Ordering::SeqCst), 0);

        cluster.stop().await;
    }
}
