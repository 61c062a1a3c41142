//! End-to-end site lifecycle through the public API, with docker replaced by
//! a scripted runner.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use devwp::config::DevwpConfig;
use devwp::exec::ScriptedRunner;
use devwp::store::{MultisiteType, Site, StoreHandle};
use devwp::{AppContext, DevwpApi, DevwpError};
use tempfile::TempDir;

fn setup(root: &Path) -> (Arc<ScriptedRunner>, DevwpApi) {
    let mut config = DevwpConfig::default();
    config.paths.webroot = Some(root.join("www"));
    config.paths.hosts_file = Some(root.join("hosts"));
    config.paths.sites_enabled = Some(root.join("sites-enabled"));
    config.paths.compose_dir = Some(root.join("compose"));
    config.database.ready_attempts = 1;
    fs::write(root.join("hosts"), "127.0.0.1 localhost\n::1 localhost\n").unwrap();

    let runner = Arc::new(ScriptedRunner::new());
    let ctx = AppContext::new(
        config,
        StoreHandle::open(&root.join("devwp.db")).unwrap(),
        runner.clone(),
        false,
    );
    (runner, DevwpApi::new(ctx))
}

fn hosts(root: &Path) -> String {
    fs::read_to_string(root.join("hosts")).unwrap()
}

fn caddy(root: &Path, domain: &str) -> PathBuf {
    root.join("sites-enabled").join(format!("{}.caddy", domain))
}

#[tokio::test]
async fn create_demo_site_end_to_end() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    let (runner, api) = setup(root);

    let outcome = api.create_site(Site::new("demo.test"), None).await.unwrap();
    assert!(outcome.installed);

    assert!(root.join("www/demo.test").is_dir());
    assert!(hosts(root).contains("# Start DevWP\n127.0.0.1 demo.test\n# End DevWP"));
    let config = fs::read_to_string(caddy(root, "demo.test")).unwrap();
    assert!(config.contains("root * /var/www/html/demo.test"));
    assert!(config.contains("tls internal"));

    let record = api.get_site("demo.test").await.unwrap().unwrap();
    assert!(record.multisite.is_none());
    assert!(!record.created_at.is_empty());
    assert!(runner.count("frankenphp reload") >= 1);

    let listed = api.list_sites().await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].url, "https://demo.test");
}

#[tokio::test]
async fn create_then_delete_leaves_no_trace() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    let (runner, api) = setup(root);
    let before = hosts(root);

    api.create_site(
        Site::new("multi.test")
            .with_aliases("www.multi.test")
            .with_multisite(MultisiteType::Subdomain),
        None,
    )
    .await
    .unwrap();
    let config = fs::read_to_string(caddy(root, "multi.test")).unwrap();
    assert!(config.contains("*.multi.test"));
    assert_eq!(runner.count("multisite-convert --subdomains"), 1);

    let outcome = api.delete_site("multi.test").await.unwrap();
    assert!(outcome.warnings.is_empty());
    assert_eq!(hosts(root), before);
    assert!(!caddy(root, "multi.test").exists());
    assert!(!root.join("www/multi.test").exists());
    assert!(api.get_site("multi.test").await.unwrap().is_none());
    assert_eq!(runner.count("DROP DATABASE IF EXISTS `multi_test`"), 1);
}

#[tokio::test]
async fn failed_creation_is_rolled_back() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    let (runner, api) = setup(root);
    runner.on("SELECT 1", 1, "", "ERROR 2002: Can't connect");
    let before = hosts(root);

    let err = api.create_site(Site::new("demo.test"), None).await.unwrap_err();
    assert!(matches!(err, DevwpError::Other(_)));
    assert!(err.to_string().contains("not ready"));

    assert_eq!(hosts(root), before);
    assert!(!caddy(root, "demo.test").exists());
    assert!(!root.join("www/demo.test").exists());
    assert!(api.get_site("demo.test").await.unwrap().is_none());
    assert_eq!(runner.count("CREATE DATABASE"), 0);
}

#[tokio::test]
async fn second_create_of_same_domain_fails() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    let (runner, api) = setup(root);

    api.create_site(Site::new("demo.test"), None).await.unwrap();
    let calls = runner.calls().len();

    let err = api.create_site(Site::new("demo.test"), None).await.unwrap_err();
    assert!(matches!(err, DevwpError::AlreadyExists { .. }));
    assert_eq!(runner.calls().len(), calls);
    assert_eq!(hosts(root).matches("demo.test").count(), 1);
}

#[tokio::test]
async fn similar_domains_keep_separate_databases() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    let (runner, api) = setup(root);

    api.create_site(Site::new("my-site.test"), None).await.unwrap();
    api.create_site(Site::new("my.site.test"), None).await.unwrap();
    assert_eq!(runner.count("--dbname=my__site_test"), 1);
    assert_eq!(runner.count("--dbname=my_site_test"), 1);

    api.delete_site("my.site.test").await.unwrap();
    assert_eq!(runner.count("DROP DATABASE IF EXISTS `my_site_test`"), 1);
    assert_eq!(runner.count("DROP DATABASE IF EXISTS `my__site_test`"), 0);
    assert!(root.join("www/my-site.test").is_dir());
    assert!(hosts(root).contains("127.0.0.1 my-site.test"));
}
