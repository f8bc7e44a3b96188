// ABOUTME: Shared fixtures for integration tests
// ABOUTME: Temp config/project dirs and a simulated browser for the OAuth callback

#![allow(dead_code)]

use sheetkit::{
    accounts::AccountRegistry,
    local::LocalOverride,
    storage::{KvStore, Paths},
};
use std::collections::HashMap;
use std::thread::{self, JoinHandle};
use tempfile::TempDir;

pub struct Workspace {
    pub config: TempDir,
    pub project: TempDir,
    pub store: KvStore,
}

impl Workspace {
    pub fn new() -> Self {
        let config = TempDir::new().unwrap();
        let project = TempDir::new().unwrap();
        let paths = Paths::new(Some(config.path().to_path_buf())).unwrap();
        let store = KvStore::open(&paths).unwrap();
        Workspace {
            config,
            project,
            store,
        }
    }

    pub fn registry(&self) -> AccountRegistry<'_> {
        AccountRegistry::new(&self.store, LocalOverride::in_dir(self.project.path()))
    }
}

/// Plays the browser: reads the consent URL, then hits the redirect URI with
/// `callback_query` plus the state Google would echo back.
pub fn simulate_browser(consent_url: &str, callback_query: &str) -> JoinHandle<(u16, String)> {
    let url = url::Url::parse(consent_url).unwrap();
    let params: HashMap<String, String> = url.query_pairs().into_owned().collect();
    let callback = format!(
        "{}?{}&state={}",
        params["redirect_uri"], callback_query, params["state"]
    );

    thread::spawn(move || {
        let response = reqwest::blocking::get(&callback).unwrap();
        let status = response.status().as_u16();
        (status, response.text().unwrap())
    })
}
