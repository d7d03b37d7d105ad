use std::sync::Arc;

use actix_web::{
    body::MessageBody,
    dev::ServiceResponse,
    http::{header::ContentType, StatusCode},
    test,
    test::TestRequest,
};
use data_payment_engine::{events::EventProducers, helpers::DeliveryMinter, MemoryDatabase, SideEffectApi};
use dpg_common::Secret;
use gateway_tools::{helpers::calculate_hmac, GatewayHttpResponse, PayAppConfig, SignedJsonConfig};

use super::mocks::{MockProviderTransport, MockReceiptService};
use crate::{
    config::ServerConfig,
    server::{build_gateway_registry, ServerState, ADMIN_TOKEN_HEADER},
};

pub const ADMIN_TOKEN: &str = "admin-secret";
pub const LINK_KEY: &str = "link-key-1";
pub const LINK_VAL: &str = "link-val-1";
pub const SIGNING_SECRET: &str = "signed-secret";

pub type TestState = ServerState<MemoryDatabase, MockReceiptService, Arc<MockProviderTransport>>;

pub fn test_config() -> ServerConfig {
    ServerConfig {
        public_url: "https://pay.example.com".into(),
        delivery_base_url: "https://data.example.com".into(),
        admin_token: Some(Secret::new(ADMIN_TOKEN.to_string())),
        payapp: PayAppConfig {
            user_id: "merchant".into(),
            api_url: "https://payapp.test/oapi/apiLoad.html".into(),
            link_key: Some(Secret::new(LINK_KEY.to_string())),
            link_val: Some(Secret::new(LINK_VAL.to_string())),
            ..Default::default()
        },
        signed_json: SignedJsonConfig {
            merchant_id: "m-1".into(),
            api_url: "https://pg.test/v1/checkout".into(),
            secret: Some(Secret::new(SIGNING_SECRET.to_string())),
            ..Default::default()
        },
        ..Default::default()
    }
}

pub fn test_state(
    config: &ServerConfig,
    db: MemoryDatabase,
    issuer: MockReceiptService,
    transport: MockProviderTransport,
) -> TestState {
    let minter = DeliveryMinter::random("https://data.example.com");
    let side_effects = SideEffectApi::new(db.clone(), Arc::new(issuer), minter);
    let registry = build_gateway_registry(config);
    ServerState::new(config, db, side_effects, Arc::new(transport), registry, EventProducers::default())
}

pub async fn read_response<B: MessageBody>(res: ServiceResponse<B>) -> (StatusCode, String) {
    let status = res.status();
    let body = test::read_body(res).await;
    (status, String::from_utf8_lossy(&body).into_owned())
}

/// A PayApp feedback body carrying valid link credentials. `extra` is appended verbatim, and must start with `&`.
pub fn payapp_feedback(mul_no: &str, pay_state: &str, extra: &str) -> String {
    format!("mul_no={mul_no}&pay_state={pay_state}&linkkey={LINK_KEY}&linkval={LINK_VAL}{extra}")
}

pub fn payapp_callback(body: &str) -> TestRequest {
    TestRequest::post()
        .uri("/callback/payapp")
        .insert_header(ContentType::form_url_encoded())
        .set_payload(body.to_string())
}

pub fn sign(body: &str) -> String {
    calculate_hmac(SIGNING_SECRET, body.as_bytes())
}

/// A signed JSON callback. Pass `None` to leave out the signature header.
pub fn signed_callback(body: &str, signature: Option<String>) -> TestRequest {
    let req =
        TestRequest::post().uri("/callback/signed").insert_header(ContentType::json()).set_payload(body.to_string());
    match signature {
        Some(sig) => req.insert_header(("X-Signature", sig)),
        None => req,
    }
}

pub fn checkout_request(provider: &str, body: &str) -> TestRequest {
    TestRequest::post()
        .uri(&format!("/api/checkout/{provider}"))
        .insert_header(ContentType::json())
        .set_payload(body.to_string())
}

pub fn admin_get(path: &str) -> TestRequest {
    TestRequest::get().uri(path).insert_header((ADMIN_TOKEN_HEADER, ADMIN_TOKEN))
}

pub fn admin_post(path: &str) -> TestRequest {
    TestRequest::post().uri(path).insert_header((ADMIN_TOKEN_HEADER, ADMIN_TOKEN))
}

pub fn provider_reply(status: u16, body: &str) -> GatewayHttpResponse {
    GatewayHttpResponse { status, body: body.to_string() }
}

pub const PAYAPP_CHECKOUT: &str = r#"{"datasetId":"ds-traffic","displayName":"Traffic data","price":50000,
    "buyerContact":"010-1234-5678","userId":"alice","receiptType":"personal"}"#;

pub const SIGNED_CHECKOUT: &str = r#"{"datasetId":"ds-weather","displayName":"Weather data","price":12000,
    "buyerContact":"01098765432","userId":"bob"}"#;
