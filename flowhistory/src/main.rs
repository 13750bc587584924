mod api;
mod app;
mod constants;
mod errors;
mod models;
mod resources;
mod tasks;
mod utils;

use actix_web::middleware::Logger;
use actix_web::{web, App as ActixWebApp, HttpServer};
use api::*;
use app::App;

use crate::utils::logger::log_fatal;

#[tokio::main]
async fn main() {
    let app = App::new().await.unwrap_or_else(|e| {
        log_fatal(format!("Could not initialize app: {}", e));

        std::process::exit(1);
    });
    let port = app.port();

    app.init().await;
    let app_web_data = web::Data::new(app);

    HttpServer::new(move || {
        ActixWebApp::new()
            .wrap(Logger::new("%a %r %s %b %{Referer}i %{User-Agent}i %T"))
            .wrap(app_web_data.cors())
            .app_data(app_web_data.clone())
            .service(
                web::scope("/workflows")
                    .service(get_versions)
                    .service(get_version)
                    .service(create_version),
            )
            .service(
                web::scope("/reverts")
                    .service(compute_diff)
                    .service(start_revert)
                    .service(listen_revert_events)
                    .service(get_revert_progress)
                    .service(abort_revert),
            )
    })
    .bind(("0.0.0.0", port))
    .unwrap_or_else(|e| panic!("Could not bind to port {}.\n{}", port, e))
    .run()
    .await
    .unwrap_or_else(|e| panic!("Could not run server on port {}.\n{}", port, e));
}
