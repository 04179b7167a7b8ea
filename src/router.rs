use axum::{
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::AppState;

/// Build the application router with all routes
pub fn build(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(handlers::healthcheck))
        // Inventory
        .route(
            "/api/devices",
            get(handlers::devices::list_devices).post(handlers::devices::create_device),
        )
        .route(
            "/api/devices/:id",
            get(handlers::devices::get_device).patch(handlers::devices::rename_device),
        )
        .route(
            "/api/ip-addresses",
            get(handlers::devices::list_ip_addresses).post(handlers::devices::create_ip_address),
        )
        .route(
            "/api/ip-addresses/:id",
            get(handlers::devices::get_ip_address).patch(handlers::devices::update_ip_address),
        )
        // ASNs
        .route(
            "/api/asns",
            get(handlers::asns::list_asns).post(handlers::asns::create_asn),
        )
        .route("/api/asns/available", post(handlers::asns::create_available_asn))
        .route(
            "/api/asns/:id",
            get(handlers::asns::get_asn).delete(handlers::asns::delete_asn),
        )
        // Routing policy
        .route(
            "/api/route-policies",
            get(handlers::route_policies::list_route_policies)
                .post(handlers::route_policies::create_route_policy),
        )
        .route(
            "/api/route-policies/:id",
            get(handlers::route_policies::get_route_policy)
                .put(handlers::route_policies::update_route_policy)
                .delete(handlers::route_policies::delete_route_policy),
        )
        .route(
            "/api/prefix-lists",
            get(handlers::prefix_lists::list_prefix_lists).post(handlers::prefix_lists::create_prefix_list),
        )
        .route(
            "/api/prefix-lists/:id",
            get(handlers::prefix_lists::get_prefix_list)
                .put(handlers::prefix_lists::update_prefix_list)
                .delete(handlers::prefix_lists::delete_prefix_list),
        )
        .route(
            "/api/bgp-community-lists",
            get(handlers::community_lists::list_community_lists)
                .post(handlers::community_lists::create_community_list),
        )
        .route(
            "/api/bgp-community-lists/:id",
            get(handlers::community_lists::get_community_list)
                .put(handlers::community_lists::update_community_list)
                .delete(handlers::community_lists::delete_community_list),
        )
        // BGP
        .route(
            "/api/bgp-sessions",
            get(handlers::bgp_sessions::list_bgp_sessions).post(handlers::bgp_sessions::create_bgp_session),
        )
        .route(
            "/api/bgp-sessions/:id",
            get(handlers::bgp_sessions::get_bgp_session)
                .put(handlers::bgp_sessions::update_bgp_session)
                .delete(handlers::bgp_sessions::delete_bgp_session),
        )
        .route("/api/device-bgp-sessions", get(handlers::bgp_sessions::list_device_bgp_sessions))
        .route("/api/device-bgp-sessions/:id", get(handlers::bgp_sessions::get_device_bgp_session))
        .route(
            "/api/bgp-peer-groups",
            get(handlers::peer_groups::list_peer_groups).post(handlers::peer_groups::create_peer_group),
        )
        .route(
            "/api/bgp-peer-groups/:id",
            get(handlers::peer_groups::get_peer_group)
                .put(handlers::peer_groups::update_peer_group)
                .delete(handlers::peer_groups::delete_peer_group),
        )
        .route(
            "/api/bgp-globals",
            get(handlers::bgp_globals::list_bgp_globals).post(handlers::bgp_globals::create_bgp_global),
        )
        .route(
            "/api/bgp-globals/:id",
            get(handlers::bgp_globals::get_bgp_global)
                .put(handlers::bgp_globals::update_bgp_global)
                .delete(handlers::bgp_globals::delete_bgp_global),
        )
        // Layer 2 / VRF
        .route(
            "/api/vlans",
            get(handlers::vlans::list_vlans).post(handlers::vlans::create_vlan),
        )
        .route("/api/vlans/:id", delete(handlers::vlans::delete_vlan))
        .route(
            "/api/vrfs",
            get(handlers::vlans::list_vrfs).post(handlers::vlans::create_vrf),
        )
        .route("/api/vrfs/:id", delete(handlers::vlans::delete_vrf))
        // Management services
        .route(
            "/api/snmp",
            get(handlers::services::list_snmp).post(handlers::services::create_snmp),
        )
        .route(
            "/api/snmp/:id",
            get(handlers::services::get_snmp).delete(handlers::services::delete_snmp),
        )
        .route(
            "/api/snmp-communities",
            get(handlers::services::list_snmp_communities).post(handlers::services::create_snmp_community),
        )
        .route(
            "/api/snmp-communities/:id",
            delete(handlers::services::delete_snmp_community),
        )
        .route(
            "/api/syslog",
            get(handlers::services::list_syslog).post(handlers::services::create_syslog),
        )
        .route(
            "/api/syslog/:id",
            get(handlers::services::get_syslog).delete(handlers::services::delete_syslog),
        )
        .route(
            "/api/syslog-servers",
            get(handlers::services::list_syslog_servers).post(handlers::services::create_syslog_server),
        )
        .route(
            "/api/syslog-servers/:id",
            delete(handlers::services::delete_syslog_server),
        )
        .route(
            "/api/tacacs",
            get(handlers::services::list_tacacs).post(handlers::services::create_tacacs),
        )
        .route(
            "/api/tacacs/:id",
            get(handlers::services::get_tacacs).delete(handlers::services::delete_tacacs),
        )
        .route(
            "/api/tacacs-servers",
            get(handlers::services::list_tacacs_servers).post(handlers::services::create_tacacs_server),
        )
        .route(
            "/api/tacacs-servers/:id",
            delete(handlers::services::delete_tacacs_server),
        )
        // Interfaces
        .route(
            "/api/device-interfaces",
            get(handlers::interfaces::list_device_interfaces)
                .post(handlers::interfaces::create_device_interface),
        )
        .route(
            "/api/device-interfaces/:id",
            delete(handlers::interfaces::delete_device_interface),
        )
        .route(
            "/api/logical-interfaces",
            get(handlers::interfaces::list_logical_interfaces)
                .post(handlers::interfaces::create_logical_interface),
        )
        .route(
            "/api/logical-interfaces/:id",
            delete(handlers::interfaces::delete_logical_interface),
        )
        .route(
            "/api/links",
            get(handlers::interfaces::list_links).post(handlers::interfaces::create_link),
        )
        .route(
            "/api/links/:id",
            get(handlers::interfaces::get_link)
                .put(handlers::interfaces::update_link)
                .delete(handlers::interfaces::delete_link),
        )
        // Decommissioning
        .route("/api/cmdb/delete-all-objects", post(handlers::decommission::delete_all_objects))
        // Add state and middleware
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::config::Config;
    use crate::db::testutil;

    async fn app() -> Router {
        let state = Arc::new(AppState {
            store: testutil::store().await,
            config: Config {
                db_path: ":memory:".to_string(),
                db_max_connections: 1,
                listen_addr: "127.0.0.1:0".to_string(),
            },
        });
        build(state)
    }

    async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json");
        let request = match body {
            Some(body) => request.body(Body::from(body.to_string())).unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    #[tokio::test]
    async fn test_health() {
        let app = app().await;
        let (status, body) = call(&app, "GET", "/api/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["service"], "netcfg-cmdb");
    }

    #[tokio::test]
    async fn test_route_policy_lifecycle() {
        let app = app().await;
        let (status, _) = call(&app, "POST", "/api/devices", Some(json!({"name": "router-a"}))).await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) = call(
            &app,
            "POST",
            "/api/route-policies",
            Some(json!({"name": "RM-IN", "device": {"name": "router-a"}, "terms": []})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("at least one term"));

        let (status, policy) = call(
            &app,
            "POST",
            "/api/route-policies",
            Some(json!({
                "name": "RM-IN",
                "device": {"name": "router-a"},
                "terms": [{"sequence": 10}, {"sequence": 20}],
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let id = policy["id"].as_i64().unwrap();

        let (status, policy) = call(
            &app,
            "PUT",
            &format!("/api/route-policies/{}", id),
            Some(json!({
                "name": "RM-IN",
                "device": {"name": "router-a"},
                "terms": [{"sequence": 20}, {"sequence": 30}],
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let sequences: Vec<i64> = policy["terms"]
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["sequence"].as_i64().unwrap())
            .collect();
        assert_eq!(sequences, vec![20, 30]);

        let (status, listed) = call(&app, "GET", "/api/route-policies?device_name=router-a", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(listed.as_array().unwrap().len(), 1);

        let (status, _) = call(&app, "DELETE", &format!("/api/route-policies/{}", id), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = call(&app, "GET", &format!("/api/route-policies/{}", id), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_available_asn_route_is_not_an_id() {
        let app = app().await;
        let (status, asn) = call(
            &app,
            "POST",
            "/api/asns/available",
            Some(json!({"organization_name": "fabric", "min_asn": 65000, "max_asn": 65001})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(asn["number"], 65000);

        let range = |org: &str| json!({"organization_name": org, "min_asn": 65000, "max_asn": 65001});
        let (status, body) = call(&app, "POST", "/api/asns/available", Some(range("fabric"))).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "ASN with organization name fabric already exists");

        let (status, asn) = call(&app, "POST", "/api/asns/available", Some(range("fabric-2"))).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(asn["number"], 65001);

        let (status, body) = call(&app, "POST", "/api/asns/available", Some(range("fabric-3"))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "No ASN available within this range (65000-65001).");
    }

    #[tokio::test]
    async fn test_decommission_unknown_device() {
        let app = app().await;
        let (status, _) = call(
            &app,
            "POST",
            "/api/cmdb/delete-all-objects",
            Some(json!({"device_name": "ghost"})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_link_removed_with_interface() {
        let app = app().await;
        let (status, _) = call(&app, "POST", "/api/devices", Some(json!({"name": "router-a"}))).await;
        assert_eq!(status, StatusCode::CREATED);

        let mut ends = Vec::new();
        for name in ["et-0/0/0", "et-0/0/1"] {
            let body = json!({"name": name, "device": {"name": "router-a"}});
            let (status, iface) = call(&app, "POST", "/api/device-interfaces", Some(body)).await;
            assert_eq!(status, StatusCode::CREATED);
            ends.push(iface["id"].as_i64().unwrap());
        }

        let body = json!({"interface_a_id": ends[0], "interface_b_id": ends[1], "monitoring_state": "critical"});
        let (status, link) = call(&app, "POST", "/api/links", Some(body)).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(link["state"], "staging");
        assert_eq!(link["monitoring_state"], "critical");
        let uri = format!("/api/links/{}", link["id"]);

        let (status, _) = call(&app, "DELETE", &format!("/api/device-interfaces/{}", ends[1]), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = call(&app, "GET", &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
