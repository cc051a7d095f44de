//! Integration tests for Shelf
//!
//! Each test deploys one or more versions of a small site against a
//! scripted network and checks what ends up in the caches.

use async_trait::async_trait;
use shelf::cache::{CacheStorage, CachedResponse, DiskStorage, MemoryStorage};
use shelf::config::{Config, OptionalAssetPolicy};
use shelf::fetch::{FetchRequest, Fetcher};
use shelf::host::ClientHost;
use shelf::lifecycle::WorkerPhase;
use shelf::manifest::{ManifestRecord, ResourceManifest, RECORD_KEY};
use shelf::router::{InterceptedRequest, Passthrough, Scope};
use shelf::strategy::ResponseSource;
use shelf::task::BackgroundTask;
use shelf::worker::{ActivationOutcome, FetchOutcome};
use shelf::{AgentContext, ShelfError, ShelfResult, Worker};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use url::Url;

const BASE: &str = "https://arcade.example/play/";

/// Network keyed by path below BASE
#[derive(Default)]
struct Network {
    bodies: Mutex<HashMap<String, String>>,
    hits: Mutex<HashMap<String, usize>>,
    offline: Mutex<bool>,
}

impl Network {
    fn serve(&self, path: &str, body: &str) {
        self.bodies
            .lock()
            .unwrap()
            .insert(path.to_string(), body.to_string());
    }

    fn go_offline(&self) {
        *self.offline.lock().unwrap() = true;
    }

    fn hits(&self, path: &str) -> usize {
        self.hits.lock().unwrap().get(path).copied().unwrap_or(0)
    }
}

#[async_trait]
impl Fetcher for Network {
    async fn fetch(&self, request: &FetchRequest) -> ShelfResult<CachedResponse> {
        let path = request
            .url
            .path()
            .strip_prefix("/play/")
            .unwrap_or_default()
            .to_string();
        let path = if path.is_empty() { "/".to_string() } else { path };

        *self.hits.lock().unwrap().entry(path.clone()).or_default() += 1;
        if *self.offline.lock().unwrap() {
            return Err(ShelfError::fetch(request.url.as_str(), "offline"));
        }

        let body = self.bodies.lock().unwrap().get(&path).cloned();
        Ok(match body {
            Some(body) => CachedResponse::new(200, body),
            None => CachedResponse::new(404, "not found"),
        })
    }
}

#[derive(Default)]
struct Pages {
    claims: AtomicUsize,
}

#[async_trait]
impl ClientHost for Pages {
    async fn skip_waiting(&self) -> ShelfResult<()> {
        Ok(())
    }

    async fn claim_clients(&self) -> ShelfResult<()> {
        self.claims.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn manifest(entries: &[(&str, &str)], core: &[&str]) -> ResourceManifest {
    let resources = entries
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    ResourceManifest::new(resources, core.iter().copied()).unwrap()
}

fn key(path: &str) -> String {
    if path == "/" {
        BASE.to_string()
    } else {
        format!("{}{}", BASE, path)
    }
}

fn request(path: &str) -> InterceptedRequest {
    InterceptedRequest::get(Url::parse(&key(path)).unwrap())
}

fn quiet_config() -> Config {
    let mut config = Config::default();
    config.lifecycle.optional_assets = OptionalAssetPolicy::Disabled;
    config
}

struct Deployment {
    storage: Arc<dyn CacheStorage>,
    network: Arc<Network>,
    pages: Arc<Pages>,
}

impl Deployment {
    fn in_memory() -> Self {
        Self::on(Arc::new(MemoryStorage::new()))
    }

    fn on(storage: Arc<dyn CacheStorage>) -> Self {
        Self {
            storage,
            network: Arc::new(Network::default()),
            pages: Arc::new(Pages::default()),
        }
    }

    fn context(&self, manifest: ResourceManifest) -> AgentContext {
        AgentContext::new(Scope::new(BASE).unwrap(), manifest)
            .with_config(quiet_config())
            .with_storage(self.storage.clone())
            .with_fetcher(self.network.clone())
            .with_host(self.pages.clone())
    }

    async fn roll_out(&self, manifest: ResourceManifest) -> (Worker, ActivationOutcome) {
        self.roll_out_with(self.context(manifest)).await
    }

    async fn roll_out_with(&self, ctx: AgentContext) -> (Worker, ActivationOutcome) {
        let worker = Worker::new(ctx);
        worker.install().await.unwrap();
        let activation = worker.activate().await.unwrap();
        BackgroundTask::wait_all(activation.background).await;
        (worker, activation.outcome)
    }

    async fn live_keys(&self) -> Vec<String> {
        let mut keys = self
            .storage
            .open("shelf-app-cache")
            .await
            .unwrap()
            .keys()
            .await
            .unwrap();
        keys.sort();
        keys
    }

    async fn live_body(&self, path: &str) -> Option<String> {
        self.storage
            .open("shelf-app-cache")
            .await
            .unwrap()
            .get(&key(path))
            .await
            .unwrap()
            .map(|r| String::from_utf8_lossy(r.body()).into_owned())
    }
}

fn v1() -> ResourceManifest {
    manifest(&[("a.js", "h1"), ("b.png", "h2")], &["a.js"])
}

fn v2() -> ResourceManifest {
    manifest(&[("a.js", "h1"), ("c.png", "h3")], &["c.png"])
}

mod upgrade_tests {
    use super::*;

    #[tokio::test]
    async fn upgrade_keeps_unchanged_and_drops_removed() {
        let site = Deployment::in_memory();
        site.network.serve("a.js", "alpha");
        site.network.serve("b.png", "bravo");
        site.network.serve("c.png", "charlie");

        let (first, _) = site.roll_out(v1()).await;
        // b.png is not core; cache it by requesting it
        first.handle_fetch(&request("b.png")).await.unwrap();
        assert_eq!(site.live_keys().await, vec![key("a.js"), key("b.png")]);

        let (_, outcome) = site.roll_out(v2()).await;
        match outcome {
            ActivationOutcome::Migrated(report) => {
                assert_eq!(report.reused, vec!["a.js".to_string()]);
                assert_eq!(report.evicted, vec![key("b.png")]);
            }
            other => panic!("unexpected outcome {:?}", other),
        }

        assert_eq!(site.live_keys().await, vec![key("a.js"), key("c.png")]);
        assert!(!site.storage.has("shelf-temp-cache").await.unwrap());

        let stored = site
            .storage
            .open("shelf-app-manifest")
            .await
            .unwrap()
            .get(RECORD_KEY)
            .await
            .unwrap()
            .unwrap();
        let record = ManifestRecord::from_response(&stored).unwrap();
        assert_eq!(&record.resources, v2().resources());

        // a.js was only fetched by the first install
        assert_eq!(site.network.hits("a.js"), 1);
    }

    #[tokio::test]
    async fn redeploying_same_manifest_changes_nothing() {
        let site = Deployment::in_memory();
        site.network.serve("a.js", "alpha");
        site.network.serve("b.png", "bravo");

        let (first, _) = site.roll_out(v1()).await;
        first.handle_fetch(&request("b.png")).await.unwrap();
        let before = site.live_keys().await;
        assert_eq!(before, vec![key("a.js"), key("b.png")]);
        let (core_hits, other_hits) = (site.network.hits("a.js"), site.network.hits("b.png"));

        site.roll_out(v1()).await;

        assert_eq!(site.live_keys().await, before);
        assert_eq!(site.pages.claims.load(Ordering::SeqCst), 2);
        // Install always restages core; nothing else touches the network
        assert_eq!(site.network.hits("a.js"), core_hits + 1);
        assert_eq!(site.network.hits("b.png"), other_hits);
    }

    #[tokio::test]
    async fn version_scoped_upgrade_reuses_unchanged() {
        let site = Deployment::in_memory();
        site.network.serve("a.js", "alpha");
        site.network.serve("b.png", "bravo");
        site.network.serve("c.png", "charlie");

        let mut config = quiet_config();
        config.cache.version_scoped = true;
        let scoped = |manifest: ResourceManifest, version: &str| {
            site.context(manifest)
                .with_config(config.clone())
                .with_version(version)
        };

        let (first, _) = site.roll_out_with(scoped(v1(), "v1")).await;
        first.handle_fetch(&request("b.png")).await.unwrap();

        let (_, outcome) = site.roll_out_with(scoped(v2(), "v2")).await;
        match outcome {
            ActivationOutcome::Migrated(report) => {
                assert!(!report.clean_slate);
                assert_eq!(report.reused, vec!["a.js".to_string()]);
                assert!(report.reclaimed.contains(&"shelf-app-cache-v1".to_string()));
            }
            other => panic!("unexpected outcome {:?}", other),
        }

        let mut keys = site
            .storage
            .open("shelf-app-cache-v2")
            .await
            .unwrap()
            .keys()
            .await
            .unwrap();
        keys.sort();
        assert_eq!(keys, vec![key("a.js"), key("c.png")]);
        assert!(!site.storage.has("shelf-app-cache-v1").await.unwrap());
        assert_eq!(site.network.hits("a.js"), 1);
    }

    #[tokio::test]
    async fn changed_fingerprint_is_refetched() {
        let site = Deployment::in_memory();
        site.network.serve("a.js", "old");
        site.roll_out(v1()).await;

        site.network.serve("a.js", "new");
        site.roll_out(manifest(&[("a.js", "h9")], &["a.js"])).await;
        assert_eq!(site.live_body("a.js").await.as_deref(), Some("new"));
    }

    #[tokio::test]
    async fn first_install_equals_staging() {
        let site = Deployment::in_memory();
        site.network.serve("c.png", "charlie");

        // Leftovers from an agent that never wrote a record
        let live = site.storage.open("shelf-app-cache").await.unwrap();
        live.put(&key("a.js"), CachedResponse::new(200, "stale"))
            .await
            .unwrap();

        let (_, outcome) = site.roll_out(v2()).await;
        assert!(matches!(outcome, ActivationOutcome::Migrated(ref r) if r.clean_slate));
        assert_eq!(site.live_keys().await, vec![key("c.png")]);
    }

    #[tokio::test]
    async fn corrupt_record_rolls_back_to_empty_caches() {
        let site = Deployment::in_memory();
        site.network.serve("c.png", "charlie");
        site.storage
            .open("shelf-app-manifest")
            .await
            .unwrap()
            .put(RECORD_KEY, CachedResponse::new(200, "{]"))
            .await
            .unwrap();

        let (worker, outcome) = site.roll_out(v2()).await;
        assert!(matches!(outcome, ActivationOutcome::RolledBack { .. }));
        assert_eq!(worker.phase().await, WorkerPhase::Active);
        assert_eq!(site.pages.claims.load(Ordering::SeqCst), 0);

        for name in ["shelf-app-cache", "shelf-temp-cache", "shelf-app-manifest"] {
            assert!(!site.storage.has(name).await.unwrap(), "{} survived", name);
        }
    }

    #[tokio::test]
    async fn failed_install_leaves_previous_version_serving() {
        let site = Deployment::in_memory();
        site.network.serve("a.js", "alpha");
        let (old, _) = site.roll_out(v1()).await;

        // c.png is missing from the network, so v2 cannot install
        let new = Worker::new(site.context(v2()));
        assert!(new.install().await.is_err());
        assert_eq!(new.phase().await, WorkerPhase::Redundant);

        site.network.go_offline();
        match old.handle_fetch(&request("a.js")).await.unwrap() {
            FetchOutcome::Respond(served) => assert_eq!(served.source, ResponseSource::Cache),
            other => panic!("unexpected outcome {:?}", other),
        }
    }
}

mod serving_tests {
    use super::*;

    fn site_manifest() -> ResourceManifest {
        manifest(
            &[("/", "r1"), ("main.dart.js", "m1"), ("assets/ship.png", "s1")],
            &["/", "main.dart.js"],
        )
    }

    #[tokio::test]
    async fn offline_after_download() {
        let site = Deployment::in_memory();
        site.network.serve("/", "<html>");
        site.network.serve("main.dart.js", "main()");
        site.network.serve("assets/ship.png", "ship");

        let (worker, _) = site.roll_out(site_manifest()).await;
        let tasks = worker.handle_raw_message("downloadOffline").await.unwrap();
        BackgroundTask::wait_all(tasks).await;

        site.network.go_offline();
        for path in ["/", "main.dart.js", "assets/ship.png"] {
            match worker.handle_fetch(&request(path)).await.unwrap() {
                FetchOutcome::Respond(served) => {
                    assert_eq!(served.source, ResponseSource::Cache, "{}", path);
                    if let Some(task) = served.revalidation {
                        task.wait().await;
                    }
                }
                other => panic!("{} not served: {:?}", path, other),
            }
        }
    }

    #[tokio::test]
    async fn root_document_prefers_network() {
        let site = Deployment::in_memory();
        site.network.serve("/", "<html>v1");
        site.network.serve("main.dart.js", "main()");
        let (worker, _) = site.roll_out(site_manifest()).await;

        site.network.serve("/", "<html>v2");
        match worker.handle_fetch(&request("/")).await.unwrap() {
            FetchOutcome::Respond(served) => {
                assert_eq!(served.source, ResponseSource::Network);
                assert_eq!(served.response.body().as_ref(), b"<html>v2");
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(site.live_body("/").await.as_deref(), Some("<html>v2"));
    }

    #[tokio::test]
    async fn cache_bust_parameter_shares_entry() {
        let site = Deployment::in_memory();
        site.network.serve("/", "<html>");
        site.network.serve("main.dart.js", "main()");
        let (worker, _) = site.roll_out(site_manifest()).await;

        let busted_url = Url::parse(&format!("{}main.dart.js?v=42", BASE)).unwrap();
        let busted = InterceptedRequest::get(busted_url);
        match worker.handle_fetch(&busted).await.unwrap() {
            FetchOutcome::Respond(served) => assert_eq!(served.source, ResponseSource::Cache),
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[tokio::test]
    async fn other_requests_pass_through() {
        let site = Deployment::in_memory();
        site.network.serve("/", "<html>");
        site.network.serve("main.dart.js", "main()");
        let (worker, _) = site.roll_out(site_manifest()).await;

        let post = InterceptedRequest::new("POST", Url::parse(&key("main.dart.js")).unwrap());
        let foreign = InterceptedRequest::get(Url::parse("https://cdn.example/lib.js").unwrap());

        for (req, reason) in [
            (post, Passthrough::Method),
            (foreign, Passthrough::OutOfScope),
            (request("unlisted.js"), Passthrough::Unlisted),
        ] {
            match worker.handle_fetch(&req).await.unwrap() {
                FetchOutcome::Passthrough(got) => assert_eq!(got, reason),
                other => panic!("unexpected outcome {:?}", other),
            }
        }
    }
}

mod disk_tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn upgrade_survives_restart() {
        let dir = TempDir::new().unwrap();
        let network = {
            let site = Deployment::on(Arc::new(DiskStorage::new(dir.path()).await.unwrap()));
            site.network.serve("a.js", "alpha");
            site.network.serve("c.png", "charlie");
            site.roll_out(v1()).await;
            site.network
        };

        // Fresh storage handle over the same directory
        let site = Deployment {
            storage: Arc::new(DiskStorage::new(dir.path()).await.unwrap()),
            network,
            pages: Arc::new(Pages::default()),
        };
        let (_, outcome) = site.roll_out(v2()).await;
        assert!(matches!(outcome, ActivationOutcome::Migrated(ref r) if !r.clean_slate));

        assert_eq!(site.live_keys().await, vec![key("a.js"), key("c.png")]);
        assert_eq!(site.live_body("a.js").await.as_deref(), Some("alpha"));
        assert_eq!(site.network.hits("a.js"), 1);
    }
}
