//! End-to-end bootstrap against mock remotes, then the management API.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::broadcast;

use proxyd::assets::{AssetStatus, HttpFetcher};
use proxyd::config::{DaemonConfig, EnvironmentConfig};
use proxyd::http::{ApiState, ManagementServer, ServingSubsystem};
use proxyd::lifecycle::{bootstrap, BootstrapDeps, Bootstrapped};
use proxyd::migration::MigrationOutcome;
use proxyd::store::{AutoUpdateMode, Setting};

mod common;

const LEGACY: &str = r#"{
    "servers": [{"vmessInfo": {"ps": "tokyo", "add": "tokyo.example.com", "port": 443,
                               "id": "b831381d-6324-4d53-ad4f-8cda48b30811", "net": "tcp"}}],
    "setting": {"transparent": "close"}
}"#;

struct Fixture {
    _dir: tempfile::TempDir,
    backend: common::MockBackend,
    config: DaemonConfig,
    env: EnvironmentConfig,
}

async fn fixture() -> Fixture {
    let backend = common::start_mock_backend(vec![
        ("/repos/v2rayA/dist-geoip/tags", 200, br#"[{"name":"202401"}]"#.to_vec()),
        ("/gh/v2rayA/dist-geoip@202401/geoip.dat", 200, b"ip-data".to_vec()),
        (
            "/repos/v2rayA/dist-domain-list-community/tags",
            200,
            br#"[{"name":"20240102"}]"#.to_vec(),
        ),
        (
            "/gh/v2rayA/dist-domain-list-community@20240102/dlc.dat",
            200,
            b"site-data".to_vec(),
        ),
        ("/releases/latest", 200, br#"{"tag_name":"v99.0.0"}"#.to_vec()),
    ])
    .await;

    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("v2raya.json"), LEGACY).unwrap();
    let binary = dir.path().join("bin").join("v2ray");
    std::fs::create_dir_all(binary.parent().unwrap()).unwrap();
    std::fs::write(&binary, b"").unwrap();

    let mut config = DaemonConfig::default();
    config.assets.asset_dir = dir.path().join("share").display().to_string();
    config.assets.tag_api_base = backend.url("/repos");
    config.assets.mirror_base = backend.url("/gh");
    config.engine.binary_path = binary.display().to_string();
    config.engine.config_path = dir.path().join("core").join("config.json").display().to_string();
    config.updates.release_api_url = backend.url("/releases/latest");

    let db = dir.path().join("db");
    let env = EnvironmentConfig::parse_from([
        "proxyd",
        "--lite",
        "--address",
        "127.0.0.1:0",
        "--config",
        db.to_str().unwrap(),
    ]);

    Fixture {
        _dir: dir,
        backend,
        config,
        env,
    }
}

async fn boot(fixture: &Fixture) -> Bootstrapped {
    let fetcher = Arc::new(HttpFetcher::new(Duration::from_secs(5)).unwrap());
    let deps = BootstrapDeps {
        resolver: Arc::new(common::OnlineResolver),
        asset_fetcher: fetcher.clone(),
        update_fetcher: fetcher,
    };
    bootstrap(&fixture.env, &fixture.config, deps).await.unwrap()
}

#[tokio::test]
async fn test_fresh_install_is_fully_bootstrapped() {
    let fixture = fixture().await;
    let booted = boot(&fixture).await;

    match &booted.migration {
        MigrationOutcome::MigratedFromLegacy { source, upgrade } => {
            assert!(source.ends_with("v2raya.json"));
            assert_eq!(upgrade.as_ref().map(|r| r.servers_migrated), Some(1));
        }
        other => panic!("unexpected migration {:?}", other),
    }
    assert_eq!(booted.store.servers_v2().unwrap().len(), 1);

    assert!(std::path::Path::new(&fixture.config.engine.config_path).exists());

    assert_eq!(booted.assets.len(), 2);
    assert!(booted
        .assets
        .iter()
        .all(|r| matches!(r.status, AssetStatus::Installed { .. })));

    // the version check runs in the background right away
    tokio::time::timeout(Duration::from_secs(5), async {
        while !booted.updater.version_status().found_new {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("version check completes");
    assert_eq!(booted.updater.version_status().remote_version, "v99.0.0");
    assert!(fixture.backend.hits().contains(&"/releases/latest".to_string()));

    for task in booted.update_tasks {
        task.abort();
    }
}

#[tokio::test]
async fn test_management_api_serves_and_retimes() {
    let fixture = fixture().await;
    let booted = boot(&fixture).await;

    let state = ApiState {
        store: booted.store.clone(),
        updater: Arc::clone(&booted.updater),
    };
    let server = ManagementServer::bind(&fixture.env.address, state).await.unwrap();
    let addr = server.local_addr().unwrap();
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let serving = tokio::spawn(Box::new(server).run(shutdown_rx));

    let client = reqwest::Client::new();
    let base = format!("http://{}", addr);

    let health: serde_json::Value = client
        .get(format!("{}/api/health", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");

    let version: serde_json::Value = client
        .get(format!("{}/api/version", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(version["version"], env!("CARGO_PKG_VERSION"));

    let setting = Setting {
        subscription_auto_update_mode: AutoUpdateMode::AutoUpdateAtFixedIntervalHours,
        subscription_auto_update_interval_hour: 6,
        ..Default::default()
    };
    let response = client
        .put(format!("{}/api/settings", base))
        .json(&setting)
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());
    assert_eq!(booted.store.settings().unwrap(), setting);
    assert_eq!(
        booted.updater.subscription_timer().period(),
        Duration::from_secs(6 * 3600)
    );
    assert!(booted.updater.rule_list_timer().is_off());

    let stored: Setting = client
        .get(format!("{}/api/settings", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(stored, setting);

    let subscriptions: Vec<serde_json::Value> = client
        .get(format!("{}/api/subscriptions", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(subscriptions.is_empty());

    // a fixed interval of zero hours is refused and changes nothing
    let zero = Setting {
        subscription_auto_update_mode: AutoUpdateMode::AutoUpdateAtFixedIntervalHours,
        subscription_auto_update_interval_hour: 0,
        ..Default::default()
    };
    let response = client
        .put(format!("{}/api/settings", base))
        .json(&zero)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
    assert_eq!(booted.store.settings().unwrap(), setting);
    assert_eq!(
        booted.updater.subscription_timer().period(),
        Duration::from_secs(6 * 3600)
    );

    // a closed store is reported as unavailable
    booted.store.close().unwrap();
    let response = client
        .get(format!("{}/api/settings", base))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::SERVICE_UNAVAILABLE);

    shutdown_tx.send(()).unwrap();
    let served = tokio::time::timeout(Duration::from_secs(5), serving)
        .await
        .expect("server stops on shutdown")
        .unwrap();
    assert!(served.is_ok());

    for task in booted.update_tasks {
        task.abort();
    }
}
