use actix_web::{http::StatusCode, test, App};
use data_payment_engine::{
    db_types::PaymentStatus,
    order_objects::OrderQueryFilter,
    MemoryDatabase,
    OrdersApi,
};
use dpg_common::Won;
use gateway_tools::{BodyEncoding, GatewayApiError};

use super::{
    helpers::*,
    mocks::{MockProviderTransport, MockReceiptService},
};
use crate::data_objects::CheckoutResponse;

async fn orders_for_provider(db: &MemoryDatabase, provider: &str) -> Vec<data_payment_engine::db_types::Order> {
    let api = OrdersApi::new(db.clone());
    api.search_orders(OrderQueryFilter::default().with_provider_id(provider)).await.unwrap().orders
}

#[actix_web::test]
async fn payapp_checkout_registers_order_after_session() {
    let _ = env_logger::try_init().ok();
    let db = MemoryDatabase::new();
    let mut transport = MockProviderTransport::new();
    transport
        .expect_send()
        .withf(|r| {
            r.url == "https://payapp.test/oapi/apiLoad.html"
                && r.encoding == BodyEncoding::Form
                && r.body.contains("feedbackurl=https%3A%2F%2Fpay.example.com%2Fcallback%2Fpayapp")
        })
        .times(1)
        .returning(|_| Ok(provider_reply(200, "state=1&mul_no=8100&payurl=https%3A%2F%2Fpayapp.kr%2F8100")));
    let config = test_config();
    let state = test_state(&config, db.clone(), MockReceiptService::new(), transport);
    let app = test::init_service(App::new().configure(|cfg| state.configure(cfg))).await;

    let res = test::call_service(&app, checkout_request("payapp", PAYAPP_CHECKOUT).to_request()).await;
    let (status, body) = read_response(res).await;
    assert_eq!(status, StatusCode::OK);
    let checkout = serde_json::from_str::<CheckoutResponse>(&body).unwrap();
    assert_eq!(checkout.provider_ref, "8100");
    assert_eq!(checkout.payment_handle, None);

    let orders = orders_for_provider(&db, "payapp").await;
    assert_eq!(orders.len(), 1);
    let order = &orders[0];
    assert_eq!(order.order_id, checkout.order_id);
    assert_eq!(order.provider_ref, "8100");
    assert_eq!(order.payment_status, PaymentStatus::Pending);
    assert_eq!(order.price, Won::from(50_000));
    assert_eq!(order.user_id.as_deref(), Some("alice"));
}

#[actix_web::test]
async fn invalid_checkouts_are_rejected_before_calling_the_provider() {
    let _ = env_logger::try_init().ok();
    let db = MemoryDatabase::new();
    let config = test_config();
    // The transport has no expectations, so any provider call fails the test
    let state = test_state(&config, db.clone(), MockReceiptService::new(), MockProviderTransport::new());
    let app = test::init_service(App::new().configure(|cfg| state.configure(cfg))).await;

    let bad_requests = [
        r#"{"datasetId":"ds-1","displayName":"Data","price":0,"buyerContact":"01012345678"}"#,
        r#"{"datasetId":"ds-1","displayName":"Data","price":1000,"buyerContact":"12-34"}"#,
        r#"{"datasetId":"","displayName":"Data","price":1000,"buyerContact":"01012345678"}"#,
        concat!(
            r#"{"datasetId":"ds-1","displayName":"Data","price":1000,"buyerContact":"01012345678","#,
            r#""receiptType":"business"}"#
        ),
        r#"{"datasetId":"ds-1","displayName":"Data","price":"a lot","buyerContact":"01012345678"}"#,
        "not json",
    ];
    for body in bad_requests {
        let res = test::call_service(&app, checkout_request("payapp", body).to_request()).await;
        let (status, msg) = read_response(res).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{body} was accepted: {msg}");
        assert!(msg.starts_with(r#"{"error":"#));
    }
    assert!(orders_for_provider(&db, "payapp").await.is_empty());
}

#[actix_web::test]
async fn checkout_with_unknown_provider() {
    let _ = env_logger::try_init().ok();
    let mut config = test_config();
    // Without a merchant id the signed JSON provider is not registered at all
    config.signed_json.merchant_id = String::default();
    let state = test_state(&config, MemoryDatabase::new(), MockReceiptService::new(), MockProviderTransport::new());
    let app = test::init_service(App::new().configure(|cfg| state.configure(cfg))).await;
    for provider in ["stripe", "signed"] {
        let res = test::call_service(&app, checkout_request(provider, SIGNED_CHECKOUT).to_request()).await;
        let (status, _) = read_response(res).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}

#[actix_web::test]
async fn signed_checkout_timeout_keeps_the_pending_order() {
    let _ = env_logger::try_init().ok();
    let db = MemoryDatabase::new();
    let mut transport = MockProviderTransport::new();
    transport.expect_send().times(1).returning(|_| Err(GatewayApiError::Timeout(10)));
    let config = test_config();
    let state = test_state(&config, db.clone(), MockReceiptService::new(), transport);
    let app = test::init_service(App::new().configure(|cfg| state.configure(cfg))).await;

    let res = test::call_service(&app, checkout_request("signed", SIGNED_CHECKOUT).to_request()).await;
    let (status, _) = read_response(res).await;
    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    // The provider may still have opened the session, and will call back with our order id
    let orders = orders_for_provider(&db, "signed").await;
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].payment_status, PaymentStatus::Pending);
    assert_eq!(orders[0].provider_ref, orders[0].order_id.to_string());
}

#[actix_web::test]
async fn payapp_checkout_failures_store_nothing() {
    let _ = env_logger::try_init().ok();
    let db = MemoryDatabase::new();
    let mut transport = MockProviderTransport::new();
    let mut replies = vec![
        Err(GatewayApiError::Timeout(10)),
        Ok(provider_reply(200, "state=0&errorMessage=invalid+phone")),
        Ok(provider_reply(503, "maintenance")),
    ]
    .into_iter();
    transport.expect_send().times(3).returning(move |_| replies.next().unwrap());
    let config = test_config();
    let state = test_state(&config, db.clone(), MockReceiptService::new(), transport);
    let app = test::init_service(App::new().configure(|cfg| state.configure(cfg))).await;

    for expected in [StatusCode::GATEWAY_TIMEOUT, StatusCode::BAD_REQUEST, StatusCode::BAD_GATEWAY] {
        let res = test::call_service(&app, checkout_request("payapp", PAYAPP_CHECKOUT).to_request()).await;
        let (status, _) = read_response(res).await;
        assert_eq!(status, expected);
    }
    assert!(orders_for_provider(&db, "payapp").await.is_empty());
}

#[actix_web::test]
async fn checkout_without_merchant_id_is_a_validation_error() {
    let _ = env_logger::try_init().ok();
    let db = MemoryDatabase::new();
    let mut config = test_config();
    config.payapp.user_id = String::default();
    // No provider call is expected
    let state = test_state(&config, db.clone(), MockReceiptService::new(), MockProviderTransport::new());
    let app = test::init_service(App::new().configure(|cfg| state.configure(cfg))).await;
    let res = test::call_service(&app, checkout_request("payapp", PAYAPP_CHECKOUT).to_request()).await;
    let (status, body) = read_response(res).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("DPG_PAYAPP_USER_ID"));
    assert!(orders_for_provider(&db, "payapp").await.is_empty());
}
