//! Draft and published tiers survive a restart.

mod common;

use std::fs;

use common::*;
use reqwest::StatusCode;
use serde_json::Value;

#[tokio::test]
async fn test_restart_recovers_draft_and_published_tiers() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(&["gw-a"]);
    config.store.data_dir = Some(dir.path().to_path_buf());

    {
        let admin = spawn_admin(config.clone(), ScriptedGateway::new()).await;
        let token = admin.login(ADMIN).await;
        admin.seed_topology(&token).await;

        let res = admin.put("/config/api/publish", &token, Value::Null).await;
        assert_eq!(res.status(), StatusCode::OK);

        // Unpublished edit after the release.
        let res = admin.post("/config/api/cluster", &token, cluster_json("c2")).await;
        assert_eq!(res.status(), StatusCode::CREATED);
        admin.stop();
    }

    assert!(dir.path().join("draft.json").exists());
    assert_eq!(
        fs::read_to_string(dir.path().join("published").join("CURRENT"))
            .unwrap()
            .trim(),
        "1"
    );

    // A version file written without moving CURRENT, as after a crash.
    fs::write(
        dir.path().join("published").join("v0000000002.json"),
        "{\"version\": 2}",
    )
    .unwrap();

    let admin = spawn_admin(config, ScriptedGateway::new()).await;
    let token = admin.login(ADMIN).await;

    let draft = json_body(admin.get("/config/api/cluster/list", &token).await).await;
    assert_eq!(draft.as_array().unwrap().len(), 2);

    let published = json_body(admin.get("/config/api/cluster/list?tier=published", &token).await).await;
    assert_eq!(published.as_array().unwrap().len(), 1);
    assert_eq!(admin.state.store.published().version, 1);

    let res = admin
        .get("/config/api/resource/method/detail?resource=/users&id=list&tier=published", &token)
        .await;
    assert_eq!(res.status(), StatusCode::OK);

    // The next release continues the version sequence.
    let res = admin.put("/config/api/publish", &token, Value::Null).await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(json_body(res).await["published_version"], 2);
}
