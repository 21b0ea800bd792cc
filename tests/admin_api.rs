//! Admin API: sessions, role checks and draft CRUD over HTTP.

mod common;

use common::*;
use reqwest::{Method, StatusCode};
use serde_json::{json, Value};

#[tokio::test]
async fn test_healthz_needs_no_session() {
    let admin = spawn_admin(test_config(&[]), ScriptedGateway::new()).await;

    let res = admin.request(Method::GET, "/healthz", None).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert!(res.headers().contains_key("x-request-id"));

    let body = json_body(res).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["published_version"], 0);
}

#[tokio::test]
async fn test_requests_without_valid_session_are_rejected() {
    let admin = spawn_admin(test_config(&[]), ScriptedGateway::new()).await;

    let res = admin
        .request(Method::GET, "/config/api/cluster/list", None)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body = json_body(res).await;
    assert_eq!(body["error_code"], "UNAUTHENTICATED");
    assert_eq!(body["status"], 401);

    let res = admin.get("/config/api/cluster/list", "not-a-token").await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = admin
        .request(Method::PUT, "/config/api/publish", None)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = admin
        .request(Method::POST, "/login", None)
        .json(&json!({ "username": ADMIN.0, "password": "wrong" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    // Nothing reached the store.
    assert_eq!(admin.state.store.draft_revision(), 0);
}

#[tokio::test]
async fn test_create_then_detail_round_trips() {
    let admin = spawn_admin(test_config(&[]), ScriptedGateway::new()).await;
    let token = admin.login(ADMIN).await;

    for id in ["c2", "c1"] {
        let res = admin.post("/config/api/cluster", &token, cluster_json(id)).await;
        assert_eq!(res.status(), StatusCode::CREATED);
    }

    let res = admin.get("/config/api/cluster/detail?id=c1", &token).await;
    assert_eq!(res.status(), StatusCode::OK);
    let detail = json_body(res).await;
    assert_eq!(detail["id"], "c1");
    assert_eq!(detail["endpoints"], cluster_json("c1")["endpoints"]);
    assert_eq!(detail["lb_policy"], "round_robin");

    let list = json_body(admin.get("/config/api/cluster/list", &token).await).await;
    let ids: Vec<&str> = list
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["c1", "c2"]);

    // Drafts are invisible in the published tier until a release commits.
    let published = json_body(admin.get("/config/api/cluster/list?tier=published", &token).await).await;
    assert_eq!(published, json!([]));

    let res = admin.post("/config/api/cluster", &token, cluster_json("c1")).await;
    assert_eq!(res.status(), StatusCode::CONFLICT);
    assert_eq!(json_body(res).await["error_code"], "ALREADY_EXISTS");

    let res = admin.get("/config/api/cluster/detail?id=nope", &token).await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_invalid_entities_report_every_field() {
    let admin = spawn_admin(test_config(&[]), ScriptedGateway::new()).await;
    let token = admin.login(ADMIN).await;

    let res = admin
        .post(
            "/config/api/listener",
            &token,
            json!({ "id": "l1", "address": "0.0.0.0", "port": 0, "clusters": [] }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body = json_body(res).await;
    assert_eq!(body["error_code"], "VALIDATION_ERROR");
    let fields: Vec<&str> = body["details"]["fields"]
        .as_array()
        .unwrap()
        .iter()
        .map(|f| f["field"].as_str().unwrap())
        .collect();
    assert!(fields.contains(&"port"));
    assert!(fields.contains(&"clusters"));

    let res = admin
        .post("/config/api/cluster", &token, json!({ "id": "c1", "bogus": true }))
        .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = admin
        .request(Method::POST, "/config/api/cluster", Some(&token))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(res).await["error_code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_role_table_is_enforced() {
    let admin = spawn_admin(test_config(&[]), ScriptedGateway::new()).await;
    let root = admin.login(ADMIN).await;
    let dev = admin.login(USER).await;

    let res = admin.post("/config/api/cluster", &dev, cluster_json("c1")).await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    let body = json_body(res).await;
    assert_eq!(body["error_code"], "FORBIDDEN");
    assert_eq!(body["details"]["operation"], "create cluster");
    assert_eq!(body["details"]["required_role"], "admin");

    let res = admin.post("/config/api/cluster", &root, cluster_json("c1")).await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let res = admin
        .post("/config/api/listener", &root, listener_json("l1", &["c1"]))
        .await;
    assert_eq!(res.status(), StatusCode::CREATED);

    // Resources and methods belong to service teams.
    let res = admin
        .post("/config/api/resource", &dev, resource_json("/users", "l1"))
        .await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let res = admin
        .post("/config/api/resource/method", &dev, method_json("/users", "list", "c1"))
        .await;
    assert_eq!(res.status(), StatusCode::CREATED);

    let res = admin.delete("/config/api/listener?id=l1", &dev).await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    for path in [
        "/config/api/resource/publish",
        "/config/api/resource/method/publish",
        "/config/api/plugin_group/publish",
        "/config/api/publish",
    ] {
        let res = admin.put(path, &dev, json!({})).await;
        assert_eq!(res.status(), StatusCode::FORBIDDEN, "{path}");
    }
    let res = admin.get("/config/api/release/status", &dev).await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    // Reads are open to every role.
    let res = admin.get("/config/api/listener/list", &dev).await;
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_update_is_a_merge_patch() {
    let admin = spawn_admin(test_config(&[]), ScriptedGateway::new()).await;
    let token = admin.login(ADMIN).await;
    admin.post("/config/api/cluster", &token, cluster_json("c1")).await;

    let res = admin
        .put("/config/api/cluster?id=c1", &token, json!({ "lb_policy": "random" }))
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    let updated = json_body(res).await;
    assert_eq!(updated["lb_policy"], "random");
    assert_eq!(updated["endpoints"], cluster_json("c1")["endpoints"]);

    let res = admin
        .put("/config/api/cluster?id=c1", &token, json!({ "id": "c9" }))
        .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body = json_body(res).await;
    assert_eq!(body["details"]["fields"][0]["field"], "key");

    let res = admin
        .put("/config/api/cluster?id=c1", &token, json!({ "endpoints": [] }))
        .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = admin
        .put("/config/api/cluster?id=ghost", &token, json!({ "lb_policy": "random" }))
        .await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    // Missing key parameter.
    let res = admin
        .put("/config/api/cluster", &token, json!({ "lb_policy": "random" }))
        .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_methods_are_keyed_by_resource_and_id() {
    let admin = spawn_admin(test_config(&[]), ScriptedGateway::new()).await;
    let token = admin.login(ADMIN).await;
    admin.seed_topology(&token).await;

    let res = admin
        .get("/config/api/resource/method/detail?resource=/users&id=list", &token)
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    let method = json_body(res).await;
    assert_eq!(method["verb"], "GET");
    assert_eq!(method["target"]["cluster"], "c1");

    let res = admin
        .get("/config/api/resource/method/detail?id=list", &token)
        .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = admin
        .get("/config/api/resource/method/detail?resource=/orders&id=list", &token)
        .await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_delete_restricts_or_cascades() {
    let admin = spawn_admin(test_config(&[]), ScriptedGateway::new()).await;
    let token = admin.login(ADMIN).await;
    admin.seed_topology(&token).await;

    let res = admin.delete("/config/api/cluster?id=c1", &token).await;
    assert_eq!(res.status(), StatusCode::CONFLICT);
    let body = json_body(res).await;
    assert_eq!(body["error_code"], "REFERENTIAL_CONFLICT");
    assert_eq!(body["details"]["referrers"].as_array().unwrap().len(), 2);

    let res = admin.delete("/config/api/cluster?id=c1&cascade=true", &token).await;
    assert_eq!(res.status(), StatusCode::OK);
    let outcome = json_body(res).await;
    let removed = outcome["removed"].as_array().unwrap();
    assert!(removed.contains(&json!({ "kind": "cluster", "key": "c1" })));
    assert!(removed.contains(&json!({ "kind": "listener", "key": "l1" })));
    assert!(removed.contains(&json!({ "kind": "method", "key": "/users#list" })));

    for kind in ["cluster", "listener", "resource", "resource/method"] {
        let list = json_body(admin.get(&format!("/config/api/{kind}/list"), &token).await).await;
        assert_eq!(list, json!([]), "{kind}");
    }
}

#[tokio::test]
async fn test_base_info() {
    let admin = spawn_admin(test_config(&[]), ScriptedGateway::new()).await;
    let root = admin.login(ADMIN).await;
    let dev = admin.login(USER).await;

    let res = admin
        .put("/config/api/base", &root, json!({ "name": "edge", "description": "public edge" }))
        .await;
    assert_eq!(res.status(), StatusCode::OK);

    let base = json_body(admin.get("/config/api/base", &dev).await).await;
    assert_eq!(base["name"], "edge");

    let res = admin.put("/config/api/base", &dev, json!({ "name": "x" })).await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = admin.put("/config/api/base", &root, json!(["not", "an", "object"])).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_account_endpoints_and_logout() {
    let admin = spawn_admin(test_config(&[]), ScriptedGateway::new()).await;
    let dev = admin.login(USER).await;
    let root = admin.login(ADMIN).await;

    let info = json_body(admin.post("/user/getInfo", &dev, Value::Null).await).await;
    assert_eq!(info["username"], USER.0);
    assert_eq!(info["role"], "user");

    let role = json_body(admin.post("/user/getUserRole", &root, Value::Null).await).await;
    assert_eq!(role["role"], "admin");

    let check = json_body(admin.post("/user/checkIsAdmin", &dev, Value::Null).await).await;
    assert_eq!(check["is_admin"], false);
    let check = json_body(admin.post("/user/checkIsAdmin", &root, Value::Null).await).await;
    assert_eq!(check["is_admin"], true);

    let res = admin.post("/user/logout", &dev, Value::Null).await;
    assert_eq!(res.status(), StatusCode::OK);

    let res = admin.get("/config/api/cluster/list", &dev).await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(res).await["error_code"], "UNAUTHENTICATED");

    // Other sessions are unaffected.
    let res = admin.get("/config/api/cluster/list", &root).await;
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_register_creates_user_accounts() {
    let admin = spawn_admin(test_config(&[]), ScriptedGateway::new()).await;

    let res = admin
        .request(Method::POST, "/register", None)
        .json(&json!({ "username": "newcomer", "password": "newcomer-password" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let account = json_body(res).await;
    assert_eq!(account["username"], "newcomer");
    assert_eq!(account["role"], "user");
    assert!(account.get("password_hash").is_none());

    let token = admin.login(("newcomer", "newcomer-password")).await;
    let res = admin.get("/config/api/cluster/list", &token).await;
    assert_eq!(res.status(), StatusCode::OK);
    let res = admin.post("/config/api/cluster", &token, cluster_json("c1")).await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    // Existing names, including seeded ones, are taken.
    for username in ["newcomer", ADMIN.0] {
        let res = admin
            .request(Method::POST, "/register", None)
            .json(&json!({ "username": username, "password": "another-password" }))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::CONFLICT, "{username}");
        assert_eq!(json_body(res).await["error_code"], "ALREADY_EXISTS");
    }

    let res = admin
        .request(Method::POST, "/register", None)
        .json(&json!({ "username": "shorty", "password": "short" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(res).await["details"]["fields"][0]["field"], "password");
}

#[tokio::test]
async fn test_password_edit_checks_the_current_password() {
    let admin = spawn_admin(test_config(&[]), ScriptedGateway::new()).await;
    let dev = admin.login(USER).await;

    let res = admin
        .post(
            "/user/password/edit",
            &dev,
            json!({ "old_password": "not-my-password", "new_password": "rotated-password" }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(res).await["details"]["fields"][0]["field"], "old_password");

    let res = admin
        .post(
            "/user/password/edit",
            &dev,
            json!({ "old_password": USER.1, "new_password": "rotated-password" }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(json_body(res).await["updated"], true);

    let res = admin
        .request(Method::POST, "/login", None)
        .json(&json!({ "username": USER.0, "password": USER.1 }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    admin.login((USER.0, "rotated-password")).await;
}
