/*!
Mock PacketPilot collector

A `wiremock::MockServer` answering on the report path, with helpers for the
responses the reporter has to cope with: accepted reports with or without
commands, unreadable bodies and error statuses.
*/

use packetpilot_agent::reporting::REPORT_PATH;
use serde_json::{json, Value};
use std::net::SocketAddr;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub struct MockCollector {
    server: MockServer,
}

impl MockCollector {
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    /// Full report URL of this collector
    pub fn endpoint(&self) -> String {
        format!("{}{}", self.server.uri(), REPORT_PATH)
    }

    /// Socket address, for configs built from host and port
    pub fn address(&self) -> SocketAddr {
        *self.server.address()
    }

    /// Accept every report with `success: true` and the given commands
    pub async fn accept_with_commands(&self, commands: Vec<Value>) {
        self.respond(
            ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "message": "Report received",
                "commands": commands,
            })),
            None,
        )
        .await;
    }

    pub async fn accept(&self) {
        self.accept_with_commands(Vec::new()).await;
    }

    /// Accept every report with a body that is not JSON
    pub async fn accept_malformed(&self) {
        self.respond(ResponseTemplate::new(200).set_body_string("<html>ok</html>"), None)
            .await;
    }

    /// Answer `status`, expecting exactly `times` requests when given
    pub async fn fail_with(&self, status: u16, times: Option<u64>) {
        self.respond(ResponseTemplate::new(status), times).await;
    }

    /// Answer `status` for the first `failures` requests only. Mount a
    /// success response afterwards to recover.
    pub async fn fail_first(&self, status: u16, failures: u64) {
        Mock::given(method("POST"))
            .and(path(REPORT_PATH))
            .respond_with(ResponseTemplate::new(status))
            .up_to_n_times(failures)
            .with_priority(1)
            .mount(&self.server)
            .await;
    }

    async fn respond(&self, template: ResponseTemplate, times: Option<u64>) {
        let mock = Mock::given(method("POST"))
            .and(path(REPORT_PATH))
            .respond_with(template);
        let mock = match times {
            Some(n) => mock.expect(n),
            None => mock,
        };
        mock.mount(&self.server).await;
    }

    /// Bodies of every report received so far
    pub async fn reports(&self) -> Vec<Value> {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter_map(|request| serde_json::from_slice(&request.body).ok())
            .collect()
    }

    pub async fn request_count(&self) -> usize {
        self.server
            .received_requests()
            .await
            .map(|requests| requests.len())
            .unwrap_or(0)
    }

    /// Check every `expect` registered so far
    pub async fn verify(&self) {
        self.server.verify().await;
    }
}
