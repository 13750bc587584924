use std::sync::Arc;

use actix_web::web::Bytes;
use actix_web::{delete, get, post, web, HttpResponse};
use log::{info, warn};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_stream::wrappers::WatchStream;
use tokio_stream::StreamExt;
use uuid::Uuid;

use crate::api::data::RequestData;
use crate::api::types::Response;
use crate::errors::FlowHistoryError;
use crate::models::change::ChangeSet;
use crate::models::revert::{QueueKey, RevertEvent, RevertQueue, RevertRun, RevertSession};

#[derive(Deserialize)]
pub struct RevertPayload {
    #[serde(rename = "workflowId")]
    pub workflow_id: String,

    #[serde(rename = "targetVersion")]
    pub target_version: i64,

    #[serde(rename = "sourceVersion")]
    pub source_version: i64,

    #[serde(rename = "disabledIds", default)]
    pub disabled_ids: Vec<String>,

    /// Version the operator last fetched. Required to start a revert.
    #[serde(rename = "lastVersionToken")]
    pub last_version_token: Option<i64>,
}

impl RevertPayload {
    async fn session(&self, data: &RequestData) -> Result<RevertSession, FlowHistoryError> {
        let mut session = RevertSession::load(
            data.workflow_api().as_ref(),
            &self.workflow_id,
            self.target_version,
            self.source_version,
        )
        .await?;

        session.disable(&self.disabled_ids);

        Ok(session)
    }
}

fn find_queue(data: &RequestData, path: web::Path<(String, i64, i64)>) -> Result<Arc<RevertQueue>, FlowHistoryError> {
    let (workflow_id, target_version, source_version) = path.into_inner();
    let key = QueueKey::new(&workflow_id, target_version, source_version);

    data.queue_registry()
        .get(&key)
        .ok_or_else(|| FlowHistoryError::NotFound(format!("no revert {} for workflow {}", key, workflow_id)))
}

#[post("/diff")]
pub async fn compute_diff(data: RequestData, payload: web::Json<RevertPayload>) -> Response {
    let session = payload.session(&data).await?;
    let change_set = ChangeSet {
        records: session.selection().records().to_vec(),
        warning: session.change_set().warning.clone(),
    };

    Ok(HttpResponse::Ok().json(json!({
        "key": session.key(),
        "changeSet": change_set,
        "warnings": session.dependency_warnings(),
    })))
}

#[post("")]
pub async fn start_revert(data: RequestData, payload: web::Json<RevertPayload>) -> Response {
    let last_version_token = payload.last_version_token.ok_or_else(|| {
        FlowHistoryError::BadRequest("lastVersionToken is required to start a revert".to_string())
    })?;
    let guard = data.concurrency_guard();
    let token = guard.token_for(&payload.workflow_id, last_version_token)?;
    let session = payload.session(&data).await?;

    match session.start(data.queue_registry(), data.workflow_api(), guard, token)? {
        Some(RevertRun {
            id,
            key,
            events,
            progress,
        }) => {
            let current = progress.borrow().clone();
            tokio::spawn(log_run_events(key.clone(), id, events));

            Ok(HttpResponse::Accepted().json(json!({
                "key": key,
                "runId": id,
                "progress": current,
            })))
        }
        // busy or nothing selected
        None => {
            let progress = data
                .queue_registry()
                .get(session.key())
                .map(|queue| queue.progress())
                .unwrap_or_default();

            Ok(HttpResponse::Ok().json(json!({
                "key": session.key(),
                "progress": progress,
            })))
        }
    }
}

#[get("/{workflowId}/{targetVersion}/{sourceVersion}")]
pub async fn get_revert_progress(data: RequestData, path: web::Path<(String, i64, i64)>) -> Response {
    let queue = find_queue(&data, path)?;

    Ok(HttpResponse::Ok().json(queue.progress()))
}

#[get("/{workflowId}/{targetVersion}/{sourceVersion}/events")]
pub async fn listen_revert_events(data: RequestData, path: web::Path<(String, i64, i64)>) -> Response {
    let queue = find_queue(&data, path)?;

    let stream = WatchStream::new(queue.subscribe()).map(|progress| -> Result<Bytes, FlowHistoryError> {
        let body = serde_json::to_string(&progress)?;

        Ok(Bytes::from(format!("event: progress\ndata: {}\n\n", body)))
    });

    Ok(HttpResponse::Ok()
        .content_type("text/event-stream")
        .insert_header(("Cache-Control", "no-cache"))
        .streaming(stream))
}

#[delete("/{workflowId}/{targetVersion}/{sourceVersion}")]
pub async fn abort_revert(data: RequestData, path: web::Path<(String, i64, i64)>) -> Response {
    let queue = find_queue(&data, path)?;
    let aborted = queue.abort();

    Ok(HttpResponse::Ok().json(json!({
        "aborted": aborted,
        "progress": queue.progress(),
    })))
}

/// Consumes the events of a run started over HTTP. Clients follow the run through the progress stream.
async fn log_run_events(key: QueueKey, run_id: Uuid, mut events: mpsc::UnboundedReceiver<RevertEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            RevertEvent::Start { total } => info!("Revert {} run {}: {} tasks queued", key, run_id, total),
            RevertEvent::Success { change, progress } => info!(
                "Revert {} run {}: {} reverted ({}%)",
                key,
                run_id,
                change.map(|c| c.display_name).unwrap_or_else(|| "new version".to_string()),
                progress
            ),
            RevertEvent::Error { error, .. } => warn!("Revert {} run {}: {}", key, run_id, error),
            RevertEvent::End { state } => info!("Revert {} run {} ended {}", key, run_id, state),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::version_api::{create_version, get_versions};
    use crate::app::App;
    use crate::models::revert::QueueState;
    use crate::resources::workflow_api::WorkflowApi;
    use actix_web::http::StatusCode;
    use actix_web::{body, test, App as ActixWebApp};
    use serde_json::Value;

    #[actix_web::test]
    async fn diff_lists_changes_and_dependency_warnings() {
        let app = web::Data::new(App::test().await);
        let service = test::init_service(
            ActixWebApp::new()
                .app_data(app.clone())
                .service(web::scope("/reverts").service(compute_diff)),
        )
        .await;

        let request = test::TestRequest::post()
            .uri("/reverts/diff")
            .set_json(json!({"workflowId": "wf-1", "targetVersion": 2, "sourceVersion": 1, "disabledIds": ["T2"]}))
            .to_request();
        let body: Value = test::call_and_read_body_json(&service, request).await;

        assert_eq!(body["key"]["targetVersion"], json!(2));

        let records = body["changeSet"]["records"].as_array().unwrap();
        let ids: Vec<&str> = records.iter().map(|r| r["id"].as_str().unwrap()).collect();
        assert_eq!(ids, vec!["G1", "T1", "T2"]);
        assert_eq!(records[2]["enabled"], json!(false));

        assert_eq!(body["warnings"][0]["changeId"], json!("G1"));
        assert_eq!(body["warnings"][0]["missingId"], json!("T2"));

        // inspecting a pair doesn't bind a queue
        assert!(app.queue_registry.is_empty());
    }

    #[actix_web::test]
    async fn start_runs_revert_to_completion() {
        let app = web::Data::new(App::test().await);
        let service = test::init_service(
            ActixWebApp::new().app_data(app.clone()).service(
                web::scope("/reverts")
                    .service(compute_diff)
                    .service(start_revert)
                    .service(listen_revert_events)
                    .service(get_revert_progress)
                    .service(abort_revert),
            ),
        )
        .await;
        let payload = json!({"workflowId": "wf-1", "targetVersion": 2, "sourceVersion": 1, "lastVersionToken": 2});

        // versions were never loaded
        let request = test::TestRequest::post().uri("/reverts").set_json(&payload).to_request();
        let response = test::call_service(&service, request).await;
        assert_eq!(response.status(), StatusCode::PRECONDITION_FAILED);

        app.concurrency_guard.observe("wf-1", 2);

        let request = test::TestRequest::post()
            .uri("/reverts")
            .set_json(json!({"workflowId": "wf-1", "targetVersion": 2, "sourceVersion": 1}))
            .to_request();
        let response = test::call_service(&service, request).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let request = test::TestRequest::post().uri("/reverts").set_json(&payload).to_request();
        let response = test::call_service(&service, request).await;
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        let queue = app.queue_registry.get(&QueueKey::new("wf-1", 2, 1)).unwrap();
        let mut progress = queue.subscribe();
        progress.wait_for(|progress| !progress.busy).await.unwrap();

        let request = test::TestRequest::get().uri("/reverts/wf-1/2/1").to_request();
        let body: Value = test::call_and_read_body_json(&service, request).await;
        assert_eq!(body["state"], json!("completed"));
        assert_eq!(body["progress"], json!(100));
        assert_eq!(queue.state(), QueueState::Completed);
        assert_eq!(app.concurrency_guard.token("wf-1").unwrap().version(), 3);

        let request = test::TestRequest::delete().uri("/reverts/wf-1/2/1").to_request();
        let body: Value = test::call_and_read_body_json(&service, request).await;
        assert_eq!(body["aborted"], json!(false));
    }

    #[actix_web::test]
    async fn stale_operator_cannot_revert_over_newer_version() {
        let app = web::Data::new(App::test().await);
        let service = test::init_service(
            ActixWebApp::new()
                .app_data(app.clone())
                .service(web::scope("/workflows").service(get_versions).service(create_version))
                .service(web::scope("/reverts").service(start_revert)),
        )
        .await;

        // operator A loads the history at version 2
        let request = test::TestRequest::get().uri("/workflows/wf-1/versions").to_request();
        let response = test::call_service(&service, request).await;
        assert_eq!(response.status(), StatusCode::OK);

        // operator B saves version 3 and somebody reloads the list
        let request = test::TestRequest::post()
            .uri("/workflows/wf-1/versions")
            .set_json(json!({"lastVersionToken": 2}))
            .to_request();
        let response = test::call_service(&service, request).await;
        assert_eq!(response.status(), StatusCode::CREATED);

        let request = test::TestRequest::get().uri("/workflows/wf-1/versions").to_request();
        test::call_service(&service, request).await;

        // operator A still works from version 2
        let request = test::TestRequest::post()
            .uri("/reverts")
            .set_json(json!({"workflowId": "wf-1", "targetVersion": 2, "sourceVersion": 1, "lastVersionToken": 2}))
            .to_request();
        let response = test::call_service(&service, request).await;
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let body: Value = test::read_body_json(response).await;
        assert_eq!(body["currentVersion"], json!(3));

        let versions = app.workflow_api.list_versions("wf-1").await.unwrap();
        assert_eq!(versions.len(), 3);
        assert!(app.queue_registry.get(&QueueKey::new("wf-1", 2, 1)).is_none());
    }

    #[actix_web::test]
    async fn progress_stream_emits_sse_frames() {
        let app = web::Data::new(App::test().await);
        let service = test::init_service(
            ActixWebApp::new()
                .app_data(app.clone())
                .service(web::scope("/reverts").service(listen_revert_events)),
        )
        .await;

        app.queue_registry.get_or_create(&QueueKey::new("wf-1", 2, 1));

        let request = test::TestRequest::get().uri("/reverts/wf-1/2/1/events").to_request();
        let response = test::call_service(&service, request).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get("content-type").unwrap().to_str().unwrap(),
            "text/event-stream"
        );

        let mut stream = Box::pin(response.into_body());
        let frame = std::future::poll_fn(|cx| body::MessageBody::poll_next(stream.as_mut(), cx))
            .await
            .expect("first frame")
            .expect("readable frame");
        let frame = std::str::from_utf8(&frame).unwrap();

        assert!(frame.starts_with("event: progress\ndata: "));
        assert!(frame.ends_with("\n\n"));

        let data: Value = serde_json::from_str(
            frame
                .trim_start_matches("event: progress\ndata: ")
                .trim_end(),
        )
        .unwrap();
        assert_eq!(data["state"], json!("idle"));
        assert_eq!(data["busy"], json!(false));
    }

    #[actix_web::test]
    async fn unknown_revert_is_not_found() {
        let app = web::Data::new(App::test().await);
        let service = test::init_service(
            ActixWebApp::new()
                .app_data(app)
                .service(web::scope("/reverts").service(get_revert_progress)),
        )
        .await;

        let request = test::TestRequest::get().uri("/reverts/wf-1/9/8").to_request();
        let response = test::call_service(&service, request).await;

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
