use actix_web::{HttpResponse, Responder, get, web};

#[get("/ping")]
async fn ping() -> impl Responder {
    HttpResponse::Ok().body("pong")
}

pub fn init(cfg: &mut web::ServiceConfig) {
    cfg.service(ping);
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{App, test};

    #[actix_web::test]
    async fn test_ping() {
        let app = test::init_service(App::new().service(web::scope("/health").configure(init))).await;
        let req = test::TestRequest::get().uri("/health/ping").to_request();
        let body = test::call_and_read_body(&app, req).await;
        assert_eq!(body, "pong");
    }
}
