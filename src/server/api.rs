// src/server/api.rs

//! The HTTP RPC surface: snapshots, summaries, forced rounds, plain-text
//! info endpoints, and the Prometheus exposition.

use crate::core::collect::CollectorHandle;
use crate::core::filter::Filter;
use crate::core::metrics::{Distribution, gather_metrics};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt::Write as _;

pub fn router(handle: CollectorHandle) -> Router {
    Router::new()
        .route("/summary", get(summary))
        .route("/force_update", post(force_update))
        .route("/snapshot", post(snapshot))
        .route("/refresh", post(refresh))
        .route("/nodes", get(list_nodes))
        .route("/nodes/{key}", get(node_info))
        .route("/nodes/{key}/backends", get(node_backends))
        .route("/groups/{id}", get(group_info))
        .route("/metrics", get(metrics))
        .with_state(handle)
}

async fn summary(State(handle): State<CollectorHandle>) -> String {
    let live = handle.live().read().await;

    let mut group_status: BTreeMap<String, usize> = BTreeMap::new();
    for group in live.groups().values() {
        *group_status.entry(group.status().to_string()).or_default() += 1;
    }

    let mut couple_status: BTreeMap<String, usize> = BTreeMap::new();
    for couple in live.couples().values() {
        *couple_status.entry(couple.status().to_string()).or_default() += 1;
    }

    let mut fs_status: BTreeMap<String, usize> = BTreeMap::new();
    let mut nr_backends = 0usize;
    let mut nr_filesystems = 0usize;
    for node in live.nodes().values() {
        nr_backends += node.backends().len();
        nr_filesystems += node.filesystems().len();
        for fs in node.filesystems().values() {
            *fs_status.entry(fs.status().to_string()).or_default() += 1;
        }
    }

    let mut out = String::new();
    let _ = writeln!(out, "Storage contains:");
    let _ = writeln!(out, "{} nodes", live.nodes().len());

    let _ = write!(out, "{nr_filesystems} filesystems\n  ( ");
    for (status, count) in &fs_status {
        let _ = write!(out, "{count} {status} ");
    }
    let _ = writeln!(out, ")\n{nr_backends} backends");

    let _ = write!(out, "{} groups\n  ( ", live.groups().len());
    for (status, count) in &group_status {
        let _ = write!(out, "{count} {status} ");
    }
    let _ = write!(out, ")\n{} couples\n  ( ", live.couples().len());
    for (status, count) in &couple_status {
        let _ = write!(out, "{count} {status} ");
    }
    let _ = writeln!(out, ")");
    let _ = writeln!(out, "{} namespaces", live.namespaces().len());

    let clock = handle.last_round_clock();
    let secs = |us: u64| us as f64 / 1e6;
    let _ = writeln!(out, "Round metrics:");
    let _ = writeln!(out, "  Total time: {:.3} s", secs(clock.total));
    let _ = writeln!(out, "  HTTP download time: {:.3} s", secs(clock.perform_download));
    let _ = writeln!(
        out,
        "  Remaining JSON parsing after HTTP download completed: {:.3} s",
        secs(clock.finish_monitor_stats)
    );
    let _ = writeln!(out, "  Metadata download: {:.3} s", secs(clock.metadata_download));
    let _ = writeln!(out, "  Storage update: {:.3} s", secs(clock.storage_update));
    let _ = writeln!(out, "  Storage merge: {:.3} s", secs(clock.merge_time));

    let mut stats_parse = Distribution::default();
    let mut update_fs = Distribution::default();
    for node in live.nodes().values() {
        stats_parse.add_sample(node.clock.stats_parse);
        update_fs.add_sample(node.clock.update_fs);
    }
    let _ = write!(
        out,
        "\nDistribution for node stats parsing:\n{}",
        stats_parse.render()
    );
    let _ = write!(out, "Distribution for node fs update:\n{}", update_fs.render());

    let mut metadata_parse = Distribution::default();
    for group in live.groups().values() {
        metadata_parse.add_sample(group.metadata_parse_duration());
    }
    let _ = write!(
        out,
        "Distribution for group metadata processing:\n{}",
        metadata_parse.render()
    );

    let mut couple_update = Distribution::default();
    for couple in live.couples().values() {
        couple_update.add_sample(couple.update_status_duration());
    }
    let _ = write!(
        out,
        "Distribution for couple update_status:\n{}",
        couple_update.render()
    );

    out
}

async fn force_update(State(handle): State<CollectorHandle>) -> impl IntoResponse {
    match handle.force_update().await {
        Ok(report) => (StatusCode::OK, report),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

async fn snapshot(
    State(handle): State<CollectorHandle>,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    let filter = match Filter::from_value(&body) {
        Ok(filter) => filter,
        Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    };

    let live = handle.live().read().await;
    Json(live.snapshot_json(&filter)).into_response()
}

async fn refresh(
    State(handle): State<CollectorHandle>,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    let filter = match Filter::from_value(&body) {
        Ok(filter) => filter,
        Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    };

    match handle.refresh(filter).await {
        Ok(report) => (StatusCode::OK, report).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

async fn list_nodes(State(handle): State<CollectorHandle>) -> String {
    let live = handle.live().read().await;
    let mut out = format!("There are {} nodes\n", live.nodes().len());
    for node in live.nodes().values() {
        let _ = writeln!(out, "  {}:{}:{}", node.host(), node.port(), node.family());
    }
    out
}

async fn node_info(
    State(handle): State<CollectorHandle>,
    Path(key): Path<String>,
) -> impl IntoResponse {
    let live = handle.live().read().await;
    match live.node(&key) {
        Some(node) => (StatusCode::OK, node.info_text()),
        None => (StatusCode::NOT_FOUND, format!("Node {key} does not exist")),
    }
}

async fn node_backends(
    State(handle): State<CollectorHandle>,
    Path(key): Path<String>,
) -> impl IntoResponse {
    let live = handle.live().read().await;
    match live.node(&key) {
        Some(node) => {
            let mut out = format!("Node has {} backends\n", node.backends().len());
            for backend in node.backends().values() {
                let _ = writeln!(out, "  {}", backend.key());
            }
            (StatusCode::OK, out)
        }
        None => (StatusCode::NOT_FOUND, format!("Node {key} does not exist")),
    }
}

async fn group_info(
    State(handle): State<CollectorHandle>,
    Path(id): Path<u64>,
) -> impl IntoResponse {
    let live = handle.live().read().await;
    match live.group(id) {
        Some(group) => (StatusCode::OK, group.info_text()),
        None => (StatusCode::NOT_FOUND, format!("Group {id} is not found")),
    }
}

async fn metrics() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4")],
        gather_metrics(),
    )
}
