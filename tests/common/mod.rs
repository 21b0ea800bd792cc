//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use gateway_admin::auth::{hash_password, Role};
use gateway_admin::config::{AccountConfig, AdminConfig};
use gateway_admin::http::AppState;
use gateway_admin::lifecycle::Shutdown;
use gateway_admin::release::{GatewayPush, GatewayTarget, PushBatch, PushOutcome};
use gateway_admin::AdminServer;

pub const ADMIN: (&str, &str) = ("root", "root-password");
pub const USER: (&str, &str) = ("dev", "dev-password");

/// In-process stand-in for the gateway fleet.
///
/// Each target replays its scripted outcomes in order and then keeps
/// repeating the last one; unscripted targets always apply.
#[derive(Default)]
pub struct ScriptedGateway {
    scripts: Mutex<HashMap<String, VecDeque<PushOutcome>>>,
    delay: Mutex<Duration>,
    pushes: Mutex<Vec<(String, PushBatch)>>,
}

impl ScriptedGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script(&self, target: &str, outcomes: Vec<PushOutcome>) {
        self.scripts
            .lock()
            .unwrap()
            .insert(target.to_string(), outcomes.into());
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    /// Every push received so far, in arrival order.
    pub fn pushes(&self) -> Vec<(String, PushBatch)> {
        self.pushes.lock().unwrap().clone()
    }
}

#[async_trait]
impl GatewayPush for ScriptedGateway {
    async fn push(&self, target: &GatewayTarget, batch: &PushBatch) -> PushOutcome {
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.pushes
            .lock()
            .unwrap()
            .push((target.name.clone(), batch.clone()));

        let mut scripts = self.scripts.lock().unwrap();
        match scripts.get_mut(&target.name) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
            Some(queue) => queue.front().cloned().unwrap_or(PushOutcome::Applied),
            None => PushOutcome::Applied,
        }
    }
}

pub fn target(name: &str) -> GatewayTarget {
    GatewayTarget {
        name: name.to_string(),
        url: format!("http://{name}.test:9000").parse().unwrap(),
    }
}

/// Two accounts, fast retries and the given gateway targets.
pub fn test_config(targets: &[&str]) -> AdminConfig {
    let mut config = AdminConfig::default();
    config.auth.jwt_secret = "integration-secret".to_string();
    config.auth.bcrypt_cost = 4;
    config.auth.accounts = vec![
        AccountConfig {
            username: ADMIN.0.to_string(),
            password_hash: hash_password(ADMIN.1, 4).unwrap(),
            role: Role::Admin,
        },
        AccountConfig {
            username: USER.0.to_string(),
            password_hash: hash_password(USER.1, 4).unwrap(),
            role: Role::User,
        },
    ];
    config.release.push_timeout_ms = 500;
    config.release.push_attempts = 3;
    config.release.backoff_base_ms = 1;
    config.release.backoff_max_ms = 5;
    config.release.targets = targets.iter().map(|t| target(t)).collect();
    config
}

pub struct TestAdmin {
    pub base: String,
    pub client: reqwest::Client,
    pub state: AppState,
    shutdown: Shutdown,
}

/// Start an admin server on an ephemeral port.
pub async fn spawn_admin(config: AdminConfig, gateway: Arc<ScriptedGateway>) -> TestAdmin {
    let server = AdminServer::with_pusher(config, gateway).unwrap();
    let state = server.state().clone();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let (_updates_tx, updates) = mpsc::unbounded_channel();
    tokio::spawn(server.run(listener, updates, shutdown.subscribe()));

    TestAdmin {
        base: format!("http://{addr}"),
        client: reqwest::Client::new(),
        state,
        shutdown,
    }
}

impl TestAdmin {
    pub fn request(&self, method: Method, path: &str, token: Option<&str>) -> RequestBuilder {
        let builder = self.client.request(method, format!("{}{}", self.base, path));
        match token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    pub async fn login(&self, (username, password): (&str, &str)) -> String {
        let res = self
            .request(Method::POST, "/login", None)
            .json(&json!({ "username": username, "password": password }))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let body: Value = res.json().await.unwrap();
        body["token"].as_str().unwrap().to_string()
    }

    pub async fn get(&self, path: &str, token: &str) -> Response {
        self.request(Method::GET, path, Some(token)).send().await.unwrap()
    }

    pub async fn post(&self, path: &str, token: &str, body: Value) -> Response {
        self.request(Method::POST, path, Some(token))
            .json(&body)
            .send()
            .await
            .unwrap()
    }

    pub async fn put(&self, path: &str, token: &str, body: Value) -> Response {
        self.request(Method::PUT, path, Some(token))
            .json(&body)
            .send()
            .await
            .unwrap()
    }

    pub async fn delete(&self, path: &str, token: &str) -> Response {
        self.request(Method::DELETE, path, Some(token))
            .send()
            .await
            .unwrap()
    }

    /// Create the cluster → listener → resource → method chain.
    pub async fn seed_topology(&self, token: &str) {
        for (path, body) in [
            ("/config/api/cluster", cluster_json("c1")),
            ("/config/api/listener", listener_json("l1", &["c1"])),
            ("/config/api/resource", resource_json("/users", "l1")),
            ("/config/api/resource/method", method_json("/users", "list", "c1")),
        ] {
            let res = self.post(path, token, body).await;
            assert_eq!(res.status(), StatusCode::CREATED, "{path}");
        }
    }

    pub fn stop(&self) {
        self.shutdown.trigger();
    }
}

pub fn cluster_json(id: &str) -> Value {
    json!({
        "id": id,
        "endpoints": [{ "address": "10.0.0.1:8080", "weight": 1 }],
        "lb_policy": "round_robin"
    })
}

pub fn listener_json(id: &str, clusters: &[&str]) -> Value {
    json!({
        "id": id,
        "address": "0.0.0.0",
        "port": 8080,
        "clusters": clusters
    })
}

pub fn resource_json(id: &str, listener: &str) -> Value {
    json!({ "id": id, "listener": listener, "description": "user directory" })
}

pub fn method_json(resource: &str, id: &str, cluster: &str) -> Value {
    json!({
        "resource": resource,
        "id": id,
        "verb": "GET",
        "target": { "type": "cluster", "cluster": cluster }
    })
}

pub async fn json_body(res: Response) -> Value {
    res.json().await.unwrap()
}
