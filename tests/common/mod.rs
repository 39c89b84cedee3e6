//! Shared utilities for integration tests.

use std::sync::Arc;
use std::time::Duration;

use sitekit::{App, HttpServer, Shutdown, SiteConfig};
use tokio::net::TcpListener;

/// A site served on an ephemeral port.
pub struct TestSite {
    pub base_url: String,
    pub shutdown: Shutdown,
}

impl Drop for TestSite {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

/// Config with an in-memory database and both stores enabled.
pub fn memory_config() -> SiteConfig {
    let mut config = SiteConfig::default();
    config.database.dsn = Some("sqlite::memory:".to_string());
    config.listener.bind_address = "127.0.0.1:0".to_string();
    config
}

/// Build an app from `config`, let `setup` add routes and listeners, then
/// serve it in the background.
pub async fn start_site<F>(config: SiteConfig, setup: F) -> TestSite
where
    F: FnOnce(&mut App),
{
    let mut app = App::new(&config).expect("app builds");
    setup(&mut app);

    let listener = TcpListener::bind(&config.listener.bind_address).await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();

    let server = HttpServer::new(Arc::new(app), &config);
    let signal = shutdown.clone();
    tokio::spawn(async move {
        let _ = server.run(listener, signal).await;
    });
    tokio::time::sleep(Duration::from_millis(20)).await;

    TestSite {
        base_url: format!("http://{addr}"),
        shutdown,
    }
}

/// A client that reports redirects instead of following them.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap()
}
