use actix_web::{get, post, web, HttpResponse};
use serde::Deserialize;

use crate::api::data::RequestData;
use crate::api::types::Response;

#[get("/{id}/versions")]
pub async fn get_versions(data: RequestData, id: web::Path<String>) -> Response {
    let workflow_id = id.into_inner();
    let versions = data.workflow_api().list_versions(&workflow_id).await?;

    // every later write of this workflow is checked against what was fetched here
    data.concurrency_guard().observe_versions(&workflow_id, &versions);

    Ok(HttpResponse::Ok().json(versions))
}

#[get("/{id}/versions/{version}")]
pub async fn get_version(data: RequestData, path: web::Path<(String, i64)>) -> Response {
    let (workflow_id, version) = path.into_inner();
    let snapshot = data.workflow_api().get_version(&workflow_id, version).await?;

    Ok(HttpResponse::Ok().json(snapshot))
}

#[derive(Deserialize)]
pub struct CreateVersionPayload {
    #[serde(rename = "lastVersionToken")]
    pub last_version_token: i64,
}

#[post("/{id}/versions")]
pub async fn create_version(
    data: RequestData,
    id: web::Path<String>,
    payload: web::Json<CreateVersionPayload>,
) -> Response {
    let workflow_id = id.into_inner();
    let guard = data.concurrency_guard();
    let token = guard.token_for(&workflow_id, payload.last_version_token)?;

    let snapshot = data
        .workflow_api()
        .create_version(&workflow_id, &token)
        .await
        .map_err(|e| {
            if e.is_version_conflict() {
                guard.invalidate(&workflow_id);
            }

            e
        })?;

    guard.advance(&workflow_id, snapshot.version);

    Ok(HttpResponse::Created().json(snapshot))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::App;
    use crate::models::version::VersionSnapshot;
    use actix_web::http::StatusCode;
    use actix_web::{test, App as ActixWebApp};
    use serde_json::json;

    #[actix_web::test]
    async fn listing_versions_arms_the_guard() {
        let app = web::Data::new(App::test().await);
        let service = test::init_service(
            ActixWebApp::new().app_data(app.clone()).service(
                web::scope("/workflows")
                    .service(get_versions)
                    .service(get_version)
                    .service(create_version),
            ),
        )
        .await;

        let request = test::TestRequest::post()
            .uri("/workflows/wf-1/versions")
            .set_json(json!({"lastVersionToken": 2}))
            .to_request();
        let response = test::call_service(&service, request).await;
        assert_eq!(response.status(), StatusCode::PRECONDITION_FAILED);

        let request = test::TestRequest::get().uri("/workflows/wf-1/versions").to_request();
        let versions: Vec<VersionSnapshot> = test::call_and_read_body_json(&service, request).await;
        assert_eq!(versions.len(), 2);
        assert_eq!(app.concurrency_guard.token("wf-1").unwrap().version(), 2);

        let request = test::TestRequest::post()
            .uri("/workflows/wf-1/versions")
            .set_json(json!({"lastVersionToken": 2}))
            .to_request();
        let created: VersionSnapshot = test::call_and_read_body_json(&service, request).await;
        assert_eq!(created.version, 3);
        assert_eq!(app.concurrency_guard.token("wf-1").unwrap().version(), 3);

        // a second save based on version 2 is stale now
        let request = test::TestRequest::post()
            .uri("/workflows/wf-1/versions")
            .set_json(json!({"lastVersionToken": 2}))
            .to_request();
        let response = test::call_service(&service, request).await;
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let request = test::TestRequest::get().uri("/workflows/wf-1/versions").to_request();
        let versions: Vec<VersionSnapshot> = test::call_and_read_body_json(&service, request).await;
        assert_eq!(versions.len(), 3);
    }

    #[actix_web::test]
    async fn unknown_version_is_not_found() {
        let app = web::Data::new(App::test().await);
        let service =
            test::init_service(ActixWebApp::new().app_data(app).service(web::scope("/workflows").service(get_version)))
                .await;

        let request = test::TestRequest::get().uri("/workflows/wf-1/versions/42").to_request();
        let response = test::call_service(&service, request).await;

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
