use crate::config::BotConfig;
use crate::handlers::{sessions, start};
use actix_web::{HttpResponse, Responder, delete, get, post, web};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Deserialize)]
struct StartRequest {
    url: String,
}

#[derive(Serialize)]
struct StartResponse {
    id: Uuid,
}

#[post("/start")]
async fn start_session(
    body: web::Json<StartRequest>,
    config: web::Data<BotConfig>,
) -> impl Responder {
    let StartRequest { url } = body.into_inner();

    match start::start(url, config.get_ref().clone()).await {
        Ok(id) => HttpResponse::Accepted().json(StartResponse { id }),
        Err(e) => {
            tracing::warn!("Failed to start selection session: {:?}", e);
            HttpResponse::BadRequest().body(format!("Error: {}", e))
        }
    }
}

#[get("/all")]
async fn all_sessions() -> impl Responder {
    HttpResponse::Ok().json(sessions::all_sessions().await)
}

#[get("/{id}")]
async fn session(path: web::Path<Uuid>) -> impl Responder {
    match sessions::session(path.into_inner()).await {
        Some(status) => HttpResponse::Ok().json(status),
        None => HttpResponse::NotFound().body("Unknown session."),
    }
}

#[delete("/{id}")]
async fn stop_session(path: web::Path<Uuid>) -> impl Responder {
    if sessions::stop(path.into_inner()) {
        HttpResponse::Ok().body("Stopping session.")
    } else {
        HttpResponse::NotFound().body("No running session with that id.")
    }
}

pub fn init(cfg: &mut web::ServiceConfig) {
    cfg.service(start_session)
        .service(all_sessions)
        .service(session)
        .service(stop_session);
}
