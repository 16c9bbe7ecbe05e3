use crate::models::candidate::SlotsResponse;
use crate::scraping::constants::{DATA_QUERY_PARAM, DATE_QUERY_PARAM, SLOTS_ENDPOINT_PATH};
use crate::selection::ports::SlotSource;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, COOKIE};
use tracing::debug;
use url::Url;

/// Calls the page's `GetAvailableSlotsByDate` endpoint directly, riding on
/// the browser session's cookies.
pub struct HttpSlotSource {
    client: reqwest::Client,
    endpoint: Url,
    data: String,
    cookie_header: Option<String>,
}

impl HttpSlotSource {
    /// Derives the endpoint and the opaque `data` token from the page url.
    pub fn for_page(page_url: &Url, cookie_header: Option<String>) -> Result<Self> {
        let data = page_url
            .query_pairs()
            .find(|(key, _)| key == DATA_QUERY_PARAM)
            .map(|(_, value)| value.into_owned())
            .with_context(|| format!("page url has no '{}' parameter", DATA_QUERY_PARAM))?;

        let endpoint = page_url
            .join(SLOTS_ENDPOINT_PATH)
            .context("cannot build slot endpoint url")?;

        Ok(HttpSlotSource {
            client: reqwest::Client::new(),
            endpoint,
            data,
            cookie_header,
        })
    }

    pub fn request_url(&self, date: &str) -> Url {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .clear()
            .append_pair(DATA_QUERY_PARAM, &self.data)
            .append_pair(DATE_QUERY_PARAM, date);
        url
    }
}

#[async_trait]
impl SlotSource for HttpSlotSource {
    async fn fetch_slots(&self, date: &str) -> Result<SlotsResponse> {
        let url = self.request_url(date);
        debug!("Fetching slots from {}", url);

        let mut request = self
            .client
            .post(url)
            .header(ACCEPT, "application/json")
            .header("X-Requested-With", "XMLHttpRequest");
        if let Some(cookies) = &self.cookie_header {
            request = request.header(COOKIE, cookies.as_str());
        }

        let response = request
            .send()
            .await
            .context("slot request failed")?
            .error_for_status()?
            .json::<SlotsResponse>()
            .await
            .context("slot response was not valid json")?;

        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::dev::ServerHandle;
    use actix_web::http::StatusCode;
    use actix_web::{App, HttpResponse, HttpServer, web};

    const PAGE: &str =
        "https://appointment.example.com/Global/Appointment/SlotSelection?data=abc%2B%2F123%3D%3D";

    #[test]
    fn test_request_url_carries_data_and_date() {
        let page = Url::parse(PAGE).unwrap();
        let source = HttpSlotSource::for_page(&page, None).unwrap();
        let url = source.request_url("2024-01-20");

        assert_eq!(url.path(), "/Global/appointment/GetAvailableSlotsByDate");
        assert_eq!(url.host_str(), Some("appointment.example.com"));

        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(
            pairs,
            vec![
                ("data".to_string(), "abc+/123==".to_string()),
                ("appointmentDate".to_string(), "2024-01-20".to_string()),
            ]
        );
    }

    #[test]
    fn test_page_without_data_is_rejected() {
        let page = Url::parse("https://appointment.example.com/Global/Appointment/SlotSelection").unwrap();
        let err = HttpSlotSource::for_page(&page, None).err().unwrap();
        assert!(err.to_string().contains("data"));
    }

    /// Serves `body` with `status` for every request and returns a page url
    /// on that server.
    fn serve(status: u16, body: &'static str) -> (Url, ServerHandle) {
        let server = HttpServer::new(move || {
            App::new().default_service(web::to(move || async move {
                HttpResponse::build(StatusCode::from_u16(status).unwrap())
                    .content_type("application/json")
                    .body(body)
            }))
        })
        .workers(1)
        .bind(("127.0.0.1", 0))
        .unwrap();

        let addr = server.addrs()[0];
        let server = server.run();
        let handle = server.handle();
        actix_web::rt::spawn(server);

        let page = Url::parse(&format!(
            "http://{}/Global/Appointment/SlotSelection?data=abc",
            addr
        ))
        .unwrap();
        (page, handle)
    }

    #[actix_web::test]
    async fn test_fetch_slots_reads_the_endpoint_answer() {
        let (page, server) = serve(
            200,
            r#"{"success":true,"data":[{"Id":"s1","Count":2,"StartTime":"4:00 PM"}]}"#,
        );
        let source = HttpSlotSource::for_page(&page, Some("session=1".to_string())).unwrap();

        let response = source.fetch_slots("01/20/2024").await.unwrap();
        assert!(response.success);
        assert_eq!(response.data.len(), 1);

        server.stop(true).await;
    }

    #[actix_web::test]
    async fn test_fetch_slots_fails_on_error_status() {
        let (page, server) = serve(500, "{}");
        let source = HttpSlotSource::for_page(&page, None).unwrap();

        let err = source.fetch_slots("01/20/2024").await.err().unwrap();
        assert!(err.to_string().contains("500"));

        server.stop(true).await;
    }

    #[actix_web::test]
    async fn test_fetch_slots_fails_on_invalid_json() {
        let (page, server) = serve(200, "<html>Service unavailable</html>");
        let source = HttpSlotSource::for_page(&page, None).unwrap();

        let err = source.fetch_slots("01/20/2024").await.err().unwrap();
        assert_eq!(err.to_string(), "slot response was not valid json");

        server.stop(true).await;
    }
}
