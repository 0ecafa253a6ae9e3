use collo_core::{DestinationId, OperatorId};
use reqwest::StatusCode;
use serde_json::json;

struct TestServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        // Same router as prod, bound to an ephemeral port.
        let app = collo_api::app::build_app(collo_api::app::services::build_services());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { base_url, handle }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

struct Operator {
    client: reqwest::Client,
    id: String,
}

impl Operator {
    fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            id: OperatorId::new().to_string(),
        }
    }

    fn get(&self, url: String) -> reqwest::RequestBuilder {
        self.client.get(url).header("x-operator-id", &self.id)
    }

    fn post(&self, url: String) -> reqwest::RequestBuilder {
        self.client.post(url).header("x-operator-id", &self.id)
    }

    fn put(&self, url: String) -> reqwest::RequestBuilder {
        self.client.put(url).header("x-operator-id", &self.id)
    }
}

async fn seed(server: &TestServer, op: &Operator, destination: DestinationId) {
    let res = op
        .put(server.url(&format!("/order-lines/{destination}")))
        .json(&json!([
            { "purchase_order_id": "PO1", "article_code": "SKU1", "ordered_quantity": 10, "ean": "8712345678906" },
            { "purchase_order_id": "PO1", "article_code": "SKU2", "ordered_quantity": 4 }
        ]))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

fn row(article: &str, quantity: u64, package: u32) -> serde_json::Value {
    json!({
        "article_code": article,
        "purchase_order_id": "PO1",
        "quantity": quantity,
        "package_number": package,
    })
}

#[tokio::test]
async fn health_needs_no_operator() {
    let server = TestServer::spawn().await;
    let res = reqwest::get(server.url("/health")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn missing_or_malformed_operator_is_rejected() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let url = server.url(&format!("/wip/{}", DestinationId::new()));

    let res = client.get(&url).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "invalid_operator");

    let res = client
        .get(&url)
        .header("x-operator-id", "not-a-uuid")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn malformed_destination_is_rejected() {
    let server = TestServer::spawn().await;
    let op = Operator::new();

    let res = op.get(server.url("/wip/not-a-uuid")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "invalid_destination");
}

#[tokio::test]
async fn write_then_fetch_round_trips() {
    let server = TestServer::spawn().await;
    let op = Operator::new();
    let destination = DestinationId::new();
    seed(&server, &op, destination).await;

    let res = op.get(server.url(&format!("/wip/{destination}"))).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let empty: serde_json::Value = res.json().await.unwrap();
    assert_eq!(empty["version"], 0);
    assert_eq!(empty["batch"], 1);

    let res = op
        .post(server.url(&format!("/wip/{destination}")))
        .json(&json!({
            "allocations": [row("SKU1", 3, 1), row("SKU2", 1, 2)],
            "confirmations": { "1": false, "2": false },
            "expected_version": 0,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let written: serde_json::Value = res.json().await.unwrap();
    assert_eq!(written["version"], 1);
    assert_eq!(written["updated_by"], op.id.as_str());

    let fetched: serde_json::Value = op
        .get(server.url(&format!("/wip/{destination}")))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(fetched["allocations"], written["allocations"]);
    assert_eq!(fetched["allocations"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn stale_expected_version_is_a_conflict() {
    let server = TestServer::spawn().await;
    let a = Operator::new();
    let b = Operator::new();
    let destination = DestinationId::new();
    seed(&server, &a, destination).await;

    let res = a
        .post(server.url(&format!("/wip/{destination}")))
        .json(&json!({ "allocations": [row("SKU1", 2, 1)], "expected_version": 0 }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = b
        .post(server.url(&format!("/wip/{destination}")))
        .json(&json!({ "allocations": [row("SKU1", 5, 1)], "expected_version": 0 }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "conflict");

    // Without a version the write is last-write-wins.
    let res = b
        .post(server.url(&format!("/wip/{destination}")))
        .json(&json!({ "allocations": [row("SKU1", 5, 1)] }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["version"], 2);
    assert_eq!(body["allocations"][0]["quantity"], 5);
}

#[tokio::test]
async fn batch_close_lifecycle() {
    let server = TestServer::spawn().await;
    let op = Operator::new();
    let destination = DestinationId::new();
    seed(&server, &op, destination).await;

    let res = op
        .post(server.url(&format!("/wip/{destination}")))
        .json(&json!({
            "allocations": [row("SKU1", 3, 1)],
            "confirmations": { "1": false },
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = op
        .post(server.url(&format!("/wip/{destination}/close")))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let res = op
        .post(server.url(&format!("/wip/{destination}")))
        .json(&json!({
            "allocations": [{
                "article_code": "SKU1",
                "purchase_order_id": "PO1",
                "quantity": 3,
                "package_number": 1,
                "confirmed": true,
            }],
            "confirmations": { "1": true },
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = op
        .post(server.url(&format!("/wip/{destination}/confirm-batch")))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["batch"], 2);

    let history: serde_json::Value = op
        .get(server.url(&format!("/historical-allocations/{destination}")))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(history.as_array().unwrap().len(), 1);

    let res = op
        .post(server.url(&format!("/wip/{destination}/close")))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = op
        .post(server.url(&format!("/wip/{destination}")))
        .json(&json!({ "allocations": [row("SKU2", 1, 1)] }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::LOCKED);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "destination_closed");
}

#[tokio::test]
async fn article_lookup_by_code_or_ean() {
    let server = TestServer::spawn().await;
    let op = Operator::new();
    let destination = DestinationId::new();
    seed(&server, &op, destination).await;

    let res = op
        .get(server.url(&format!("/article-lookup/{destination}/8712345678906")))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let line: serde_json::Value = res.json().await.unwrap();
    assert_eq!(line["article_code"], "SKU1");

    let res = op
        .get(server.url(&format!("/article-lookup/{destination}/UNKNOWN")))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let lines: serde_json::Value = op
        .get(server.url(&format!("/order-lines/{destination}")))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(lines.as_array().unwrap().len(), 2);
}
