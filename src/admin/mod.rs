//! Administrative API surface.
//!
//! # Routes
//! ```text
//! POST /login                                   (no session)
//! POST /register                                (no session)
//! GET  /healthz                                 (no session)
//!
//! GET    /config/api/{kind}/list?tier=
//! GET    /config/api/{kind}/detail?<key>&tier=
//! POST   /config/api/{kind}                     create
//! PUT    /config/api/{kind}?<key>               merge-patch update
//! DELETE /config/api/{kind}?<key>&cascade=
//!        kind ∈ cluster | listener | resource | resource/method | plugin_group
//!
//! GET|PUT /config/api/base
//! PUT     /config/api/{resource,resource/method,plugin_group}/publish, /config/api/publish
//! DELETE  /config/api/release?release_id=
//! GET     /config/api/release/{status,history}
//! GET     /config/api/published/{history,version?version=}
//! POST    /user/{logout,password/edit,getInfo,getUserRole,checkIsAdmin}
//! ```
//!
//! Every route except `/login`, `/register` and `/healthz` runs behind the session layer;
//! handlers check the caller's role before touching the store.

pub mod account;
pub mod auth;
pub mod extract;
pub mod handlers;
pub mod release;

use axum::{
    middleware,
    routing::{delete, get, post, put},
    Router,
};

use self::account::{
    check_is_admin, edit_password, get_info, get_user_role, login, logout, register,
};
use self::auth::require_session;
use self::handlers::*;
use self::release::{
    cancel_release, publish_all, publish_methods, publish_plugin_groups, publish_resources,
    release_history, release_status,
};
use crate::http::server::AppState;
use crate::model::{Cluster, Listener, Method, PluginGroup, Resource};
use crate::store::Stored;

const API: &str = "/config/api";

pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .merge(entity_routes::<Cluster>("cluster"))
        .merge(entity_routes::<Listener>("listener"))
        .merge(entity_routes::<Resource>("resource"))
        .merge(entity_routes::<Method>("resource/method"))
        .merge(entity_routes::<PluginGroup>("plugin_group"))
        .route(&format!("{API}/base"), get(get_base).put(update_base))
        .route(&format!("{API}/resource/publish"), put(publish_resources))
        .route(&format!("{API}/resource/method/publish"), put(publish_methods))
        .route(&format!("{API}/plugin_group/publish"), put(publish_plugin_groups))
        .route(&format!("{API}/publish"), put(publish_all))
        .route(&format!("{API}/release"), delete(cancel_release))
        .route(&format!("{API}/release/status"), get(release_status))
        .route(&format!("{API}/release/history"), get(release_history))
        .route(&format!("{API}/published/history"), get(published_history))
        .route(&format!("{API}/published/version"), get(published_version))
        .route("/user/logout", post(logout))
        .route("/user/password/edit", post(edit_password))
        .route("/user/getInfo", post(get_info))
        .route("/user/getUserRole", post(get_user_role))
        .route("/user/checkIsAdmin", post(check_is_admin))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_session));

    Router::new()
        .route("/login", post(login))
        .route("/register", post(register))
        .route("/healthz", get(healthz))
        .merge(protected)
        .with_state(state)
}

/// List, detail and CRUD routes for one entity kind.
fn entity_routes<E: Stored>(path: &str) -> Router<AppState> {
    Router::new()
        .route(&format!("{API}/{path}/list"), get(list::<E>))
        .route(&format!("{API}/{path}/detail"), get(detail::<E>))
        .route(
            &format!("{API}/{path}"),
            post(create::<E>).put(update::<E>).delete(remove::<E>),
        )
}
