use std::future::{ready, Ready};
use std::sync::Arc;

use actix_web::dev::Payload;
use actix_web::{web, FromRequest, HttpRequest};

use crate::app::App;
use crate::errors::FlowHistoryError;
use crate::resources::concurrency_guard::ConcurrencyGuard;
use crate::resources::queue_registry::QueueRegistry;
use crate::resources::workflow_api::WorkflowApi;

/// Application resources required by the version and revert endpoints.
#[derive(Clone)]
pub struct RequestData {
    pub app: web::Data<App>,
}

impl RequestData {
    pub fn workflow_api(&self) -> Arc<dyn WorkflowApi> {
        self.app.workflow_api.clone()
    }

    pub fn queue_registry(&self) -> &QueueRegistry {
        &self.app.queue_registry
    }

    pub fn concurrency_guard(&self) -> Arc<ConcurrencyGuard> {
        self.app.concurrency_guard.clone()
    }
}

impl FromRequest for RequestData {
    type Error = FlowHistoryError;
    type Future = Ready<Result<RequestData, FlowHistoryError>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        match req.app_data::<web::Data<App>>() {
            Some(app) => ready(Ok(RequestData {
                app: web::Data::clone(app),
            })),
            None => ready(Err(FlowHistoryError::InternalServerError(
                "Could not get app data".to_string(),
            ))),
        }
    }
}
