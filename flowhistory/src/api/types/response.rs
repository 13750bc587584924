use actix_web::HttpResponse;

use crate::errors::FlowHistoryError;

pub type Response = Result<HttpResponse, FlowHistoryError>;
