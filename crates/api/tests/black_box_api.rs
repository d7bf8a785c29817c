use std::time::Duration;

use base64::Engine;
use chrono::{Duration as ChronoDuration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use propdesk_auth::{JwtClaims, Role};
use propdesk_core::{TenantId, UserId};
use propdesk_infra::config::AppConfig;
use propdesk_infra::jobs::JobExecutorHandle;
use reqwest::StatusCode;
use serde_json::{Value, json};

const JWT_SECRET: &str = "test-secret";

struct TestServer {
    base_url: String,
    client: reqwest::Client,
    handle: tokio::task::JoinHandle<()>,
    _workers: JobExecutorHandle,
}

impl TestServer {
    async fn spawn() -> Self {
        // Same wiring as prod, in-memory stores, ephemeral port.
        let config = AppConfig {
            jwt_secret: JWT_SECRET.to_string(),
            job_poll_interval: Duration::from_millis(10),
            ..AppConfig::default()
        };
        let app = propdesk_api::app::build_app(&config)
            .await
            .expect("failed to build app");
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let router = app.router;
        let handle = tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        Self {
            base_url,
            client: reqwest::Client::new(),
            handle,
            _workers: app.workers,
        }
    }

    async fn graphql(&self, token: &str, query: &str, variables: Value) -> Value {
        let res = self
            .client
            .post(format!("{}/graphql", self.base_url))
            .bearer_auth(token)
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        res.json().await.unwrap()
    }

    /// Run an operation that must succeed and return its `data`.
    async fn ok(&self, token: &str, query: &str, variables: Value) -> Value {
        let body = self.graphql(token, query, variables).await;
        assert!(body.get("errors").is_none(), "unexpected errors: {body}");
        body["data"].clone()
    }

    /// Run an operation that must fail and return its first error code.
    async fn error_code(&self, token: &str, query: &str, variables: Value) -> String {
        let body = self.graphql(token, query, variables).await;
        body["errors"][0]["extensions"]["code"]
            .as_str()
            .unwrap_or_else(|| panic!("expected an error code: {body}"))
            .to_string()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn mint_jwt(tenant_id: TenantId, roles: Vec<Role>) -> String {
    let now = Utc::now();
    let claims = JwtClaims {
        sub: UserId::new(),
        tenant_id,
        roles,
        issued_at: now - ChronoDuration::seconds(1),
        expires_at: now + ChronoDuration::minutes(10),
    };

    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .expect("failed to encode jwt")
}

fn admin_token() -> String {
    mint_jwt(TenantId::new(), vec![Role::ADMIN])
}

const CREATE_PROPERTY: &str = r#"
    mutation($input: CreatePropertyInput!) {
        createProperty(input: $input) { id name address unitCount }
    }"#;

const CREATE_DOCUMENT_TYPE: &str = r#"
    mutation($input: CreateDocumentTypeInput!) {
        createDocumentType(input: $input) { id name allowedContentTypes maxSizeBytes }
    }"#;

const UPLOAD_DOCUMENT: &str = r#"
    mutation($input: UploadDocumentInput!) {
        uploadDocument(input: $input) { id status sizeBytes url }
    }"#;

const DOCUMENT: &str = r#"
    query($id: UUID!) {
        document(id: $id) { id status storageKey url attempts failureReason }
    }"#;

async fn create_lease_type(srv: &TestServer, token: &str) -> String {
    let data = srv
        .ok(
            token,
            CREATE_DOCUMENT_TYPE,
            json!({ "input": { "name": "Lease", "allowedContentTypes": ["application/pdf"] } }),
        )
        .await;
    data["createDocumentType"]["id"].as_str().unwrap().to_string()
}

async fn upload_pdf(srv: &TestServer, token: &str, type_id: &str, property_id: Option<&str>) -> Value {
    let content = base64::engine::general_purpose::STANDARD.encode(b"%PDF-1.7 lease");
    let data = srv
        .ok(
            token,
            UPLOAD_DOCUMENT,
            json!({ "input": {
                "documentTypeId": type_id,
                "propertyId": property_id,
                "fileName": "lease.pdf",
                "contentType": "application/pdf",
                "contentBase64": content,
            }}),
        )
        .await;
    data["uploadDocument"].clone()
}

/// Uploads complete asynchronously; poll until the worker is done.
async fn document_eventually(srv: &TestServer, token: &str, id: &str, status: &str) -> Value {
    for _ in 0..100 {
        let data = srv.ok(token, DOCUMENT, json!({ "id": id })).await;
        if data["document"]["status"] == status {
            return data["document"].clone();
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    panic!("document {id} did not reach {status} within timeout");
}

#[tokio::test]
async fn auth_required_for_protected_endpoints() {
    let srv = TestServer::spawn().await;

    let res = srv
        .client
        .get(format!("{}/whoami", srv.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = srv
        .client
        .post(format!("{}/graphql", srv.base_url))
        .json(&json!({ "query": "{ me { userId } }" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = srv
        .client
        .get(format!("{}/health", srv.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn tenant_context_is_derived_from_token() {
    let srv = TestServer::spawn().await;
    let tenant_id = TenantId::new();
    let token = mint_jwt(tenant_id, vec![Role::MANAGER]);

    let res = srv
        .client
        .get(format!("{}/whoami", srv.base_url))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["tenant_id"].as_str().unwrap(), tenant_id.to_string());
    assert!(body["roles"].as_array().unwrap().iter().any(|r| r == "manager"));

    let data = srv
        .ok(&token, "{ me { tenantId permissions } tenant { id active } }", json!({}))
        .await;
    assert_eq!(data["me"]["tenantId"].as_str().unwrap(), tenant_id.to_string());
    assert_eq!(data["tenant"]["id"].as_str().unwrap(), tenant_id.to_string());
    assert_eq!(data["tenant"]["active"], true);
}

#[tokio::test]
async fn deactivated_tenant_is_locked_out() {
    let srv = TestServer::spawn().await;
    let token = admin_token();

    let data = srv
        .ok(
            &token,
            r#"mutation { updateTenant(input: { name: "Acme Homes", slug: "acme-homes", active: false }) { slug active } }"#,
            json!({}),
        )
        .await;
    assert_eq!(data["updateTenant"]["slug"], "acme-homes");
    assert_eq!(data["updateTenant"]["active"], false);

    let res = srv
        .client
        .post(format!("{}/graphql", srv.base_url))
        .bearer_auth(&token)
        .json(&json!({ "query": "{ me { userId } }" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn property_lifecycle_create_update_delete() {
    let srv = TestServer::spawn().await;
    let token = admin_token();

    let data = srv
        .ok(
            &token,
            CREATE_PROPERTY,
            json!({ "input": { "name": "Elm Court", "address": "12 Elm St", "unitCount": 8 } }),
        )
        .await;
    let id = data["createProperty"]["id"].as_str().unwrap().to_string();
    assert_eq!(data["createProperty"]["unitCount"], 8);

    let data = srv
        .ok(
            &token,
            r#"mutation($id: UUID!) { updateProperty(id: $id, input: { address: null, unitCount: 10 }) { address unitCount } }"#,
            json!({ "id": id }),
        )
        .await;
    assert_eq!(data["updateProperty"]["address"], Value::Null);
    assert_eq!(data["updateProperty"]["unitCount"], 10);

    let data = srv.ok(&token, "{ properties { id unitCount } }", json!({})).await;
    assert_eq!(data["properties"].as_array().unwrap().len(), 1);
    assert_eq!(data["properties"][0]["unitCount"], 10);

    let data = srv
        .ok(&token, "mutation($id: UUID!) { deleteProperty(id: $id) }", json!({ "id": id }))
        .await;
    assert_eq!(data["deleteProperty"], true);

    let data = srv
        .ok(&token, "query($id: UUID!) { property(id: $id) { id } }", json!({ "id": id }))
        .await;
    assert_eq!(data["property"], Value::Null);

    let code = srv
        .error_code(&token, "mutation($id: UUID!) { deleteProperty(id: $id) }", json!({ "id": id }))
        .await;
    assert_eq!(code, "NOT_FOUND");
}

#[tokio::test]
async fn errors_carry_stable_codes() {
    let srv = TestServer::spawn().await;
    let tenant_id = TenantId::new();
    let admin = mint_jwt(tenant_id, vec![Role::ADMIN]);
    let viewer = mint_jwt(tenant_id, vec![Role::VIEWER]);

    let code = srv
        .error_code(&admin, CREATE_PROPERTY, json!({ "input": { "name": "   " } }))
        .await;
    assert_eq!(code, "VALIDATION");

    let code = srv
        .error_code(&viewer, CREATE_PROPERTY, json!({ "input": { "name": "Elm Court" } }))
        .await;
    assert_eq!(code, "FORBIDDEN");

    create_lease_type(&srv, &admin).await;
    let code = srv
        .error_code(
            &admin,
            CREATE_DOCUMENT_TYPE,
            json!({ "input": { "name": "lease" } }),
        )
        .await;
    assert_eq!(code, "CONFLICT");
}

#[tokio::test]
async fn tenants_cannot_see_each_others_data() {
    let srv = TestServer::spawn().await;
    let token_a = admin_token();
    let token_b = admin_token();

    let data = srv
        .ok(&token_a, CREATE_PROPERTY, json!({ "input": { "name": "Elm Court" } }))
        .await;
    let property_id = data["createProperty"]["id"].as_str().unwrap().to_string();
    let type_id = create_lease_type(&srv, &token_a).await;

    let data = srv
        .ok(
            &token_b,
            "query($id: UUID!) { property(id: $id) { id } properties { id } documentTypes { id } }",
            json!({ "id": property_id }),
        )
        .await;
    assert_eq!(data["property"], Value::Null);
    assert!(data["properties"].as_array().unwrap().is_empty());
    assert!(data["documentTypes"].as_array().unwrap().is_empty());

    let code = srv
        .error_code(
            &token_b,
            UPLOAD_DOCUMENT,
            json!({ "input": {
                "documentTypeId": type_id,
                "fileName": "lease.pdf",
                "contentType": "application/pdf",
                "contentBase64": "JVBERg==",
            }}),
        )
        .await;
    assert_eq!(code, "NOT_FOUND");
}

#[tokio::test]
async fn upload_pipeline_stores_the_document() {
    let srv = TestServer::spawn().await;
    let token = admin_token();

    let data = srv
        .ok(&token, CREATE_PROPERTY, json!({ "input": { "name": "Elm Court" } }))
        .await;
    let property_id = data["createProperty"]["id"].as_str().unwrap().to_string();
    let type_id = create_lease_type(&srv, &token).await;

    let pending = upload_pdf(&srv, &token, &type_id, Some(&property_id)).await;
    assert_eq!(pending["status"], "PENDING");
    assert_eq!(pending["url"], Value::Null);
    let id = pending["id"].as_str().unwrap().to_string();

    let uploaded = document_eventually(&srv, &token, &id, "UPLOADED").await;
    assert!(uploaded["storageKey"].as_str().unwrap().ends_with("/lease.pdf"));
    assert!(uploaded["url"].as_str().is_some());
    assert_eq!(uploaded["attempts"], 1);

    let data = srv
        .ok(
            &token,
            "query($t: UUID, $p: UUID) { documents(documentTypeId: $t, propertyId: $p) { id status } }",
            json!({ "t": type_id, "p": property_id }),
        )
        .await;
    assert_eq!(data["documents"].as_array().unwrap().len(), 1);
    assert_eq!(data["documents"][0]["status"], "UPLOADED");

    let data = srv.ok(&token, "{ jobStats { completed pending } }", json!({})).await;
    assert_eq!(data["jobStats"]["completed"], 1);
    assert_eq!(data["jobStats"]["pending"], 0);

    // Referenced types and properties cannot go away.
    let code = srv
        .error_code(&token, "mutation($id: UUID!) { deleteDocumentType(id: $id) }", json!({ "id": type_id }))
        .await;
    assert_eq!(code, "CONFLICT");
    let code = srv
        .error_code(&token, "mutation($id: UUID!) { deleteProperty(id: $id) }", json!({ "id": property_id }))
        .await;
    assert_eq!(code, "CONFLICT");

    // Only failed uploads can be retried.
    let code = srv
        .error_code(
            &token,
            "mutation($id: UUID!) { retryDocumentUpload(id: $id) { id } }",
            json!({ "id": id }),
        )
        .await;
    assert_eq!(code, "CONFLICT");

    let data = srv
        .ok(&token, "mutation($id: UUID!) { deleteDocument(id: $id) }", json!({ "id": id }))
        .await;
    assert_eq!(data["deleteDocument"], true);
    let data = srv.ok(&token, DOCUMENT, json!({ "id": id })).await;
    assert_eq!(data["document"], Value::Null);

    let data = srv
        .ok(&token, "mutation($id: UUID!) { deleteDocumentType(id: $id) }", json!({ "id": type_id }))
        .await;
    assert_eq!(data["deleteDocumentType"], true);
}

#[tokio::test]
async fn repeated_reads_are_cache_hits_and_writes_refresh() {
    let srv = TestServer::spawn().await;
    let token = admin_token();
    let type_id = create_lease_type(&srv, &token).await;

    let query = "query($id: UUID!) { documentType(id: $id) { name maxSizeBytes } }";
    srv.ok(&token, query, json!({ "id": type_id })).await;
    let before = srv.ok(&token, "{ cacheStats { hits } }", json!({})).await;
    srv.ok(&token, query, json!({ "id": type_id })).await;
    let after = srv.ok(&token, "{ cacheStats { hits enabled } }", json!({})).await;
    assert_eq!(after["cacheStats"]["enabled"], true);
    assert!(after["cacheStats"]["hits"].as_u64().unwrap() > before["cacheStats"]["hits"].as_u64().unwrap());

    srv.ok(
        &token,
        r#"mutation($id: UUID!) { updateDocumentType(id: $id, input: { name: "Signed lease", maxSizeBytes: 2048 }) { id } }"#,
        json!({ "id": type_id }),
    )
    .await;
    let data = srv.ok(&token, query, json!({ "id": type_id })).await;
    assert_eq!(data["documentType"]["name"], "Signed lease");
    assert_eq!(data["documentType"]["maxSizeBytes"], 2048);
}
