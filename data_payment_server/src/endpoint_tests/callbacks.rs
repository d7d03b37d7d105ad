use actix_web::{http::StatusCode, test, App};
use data_payment_engine::{
    db_types::{DeliveryStatus, EffectStatus, EffectType, PaymentStatus, ReceiptType},
    traits::ReceiptError,
    MemoryDatabase,
    OrdersApi,
};
use dpg_common::Won;

use super::{
    helpers::*,
    mocks::{MockProviderTransport, MockReceiptService},
};
use crate::data_objects::CheckoutResponse;

const PAYAPP_SESSION: &str = "state=1&mul_no=7001&payurl=https%3A%2F%2Fpayapp.kr%2F7001";

fn payapp_transport() -> MockProviderTransport {
    let mut transport = MockProviderTransport::new();
    transport.expect_send().times(1).returning(|_| Ok(provider_reply(200, PAYAPP_SESSION)));
    transport
}

fn signed_transport() -> MockProviderTransport {
    let mut transport = MockProviderTransport::new();
    transport
        .expect_send()
        .times(1)
        .returning(|_| Ok(provider_reply(200, r#"{"checkoutUrl":"https://pg.test/pay/1","sessionId":"s-1"}"#)));
    transport
}

#[actix_web::test]
async fn duplicate_payapp_success_issues_one_receipt() {
    let _ = env_logger::try_init().ok();
    let db = MemoryDatabase::new();
    let mut issuer = MockReceiptService::new();
    issuer
        .expect_issue_receipt()
        .withf(|r| r.receipt_type == ReceiptType::Personal && r.price == Won::from(50_000))
        .times(1)
        .returning(|_| Ok(()));
    let config = test_config();
    let state = test_state(&config, db.clone(), issuer, payapp_transport());
    let app = test::init_service(App::new().configure(|cfg| state.configure(cfg))).await;

    let res = test::call_service(&app, checkout_request("payapp", PAYAPP_CHECKOUT).to_request()).await;
    let (status, body) = read_response(res).await;
    assert_eq!(status, StatusCode::OK);
    let checkout = serde_json::from_str::<CheckoutResponse>(&body).unwrap();
    assert_eq!(checkout.provider_ref, "7001");
    assert_eq!(checkout.redirect_url.as_deref(), Some("https://payapp.kr/7001"));

    let feedback = payapp_feedback("7001", "4", "&price=50000&recvphone=01012345678&var1=ds-traffic&var2=personal");
    for _ in 0..2 {
        let res = test::call_service(&app, payapp_callback(&feedback).to_request()).await;
        let (status, body) = read_response(res).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "SUCCESS");
    }

    let api = OrdersApi::new(db);
    let order = api.order_by_id(&checkout.order_id).await.unwrap().expect("Order should exist");
    assert_eq!(order.payment_status, PaymentStatus::Completed);
    assert_eq!(order.delivery_status, DeliveryStatus::Delivered);
    assert!(order.delivery_url.as_deref().unwrap_or_default().starts_with("https://data.example.com"));
    assert!(order.completed_at.is_some());
    let events = api.events_for_order(&order.order_id).await.unwrap().unwrap();
    assert_eq!(events.len(), 1);
    let effects = api.effects_for_order(&order.order_id).await.unwrap();
    assert_eq!(effects.len(), 2);
    assert!(effects.iter().all(|e| e.status == EffectStatus::Done));
}

#[actix_web::test]
async fn payapp_success_for_unknown_payment_creates_order() {
    let _ = env_logger::try_init().ok();
    let db = MemoryDatabase::new();
    let config = test_config();
    // No receipt was requested, so the issuer must not be called
    let state = test_state(&config, db.clone(), MockReceiptService::new(), MockProviderTransport::new());
    let app = test::init_service(App::new().configure(|cfg| state.configure(cfg))).await;

    let feedback = payapp_feedback("9001", "4", "&price=30,000&recvphone=01055556666&var1=ds-air&goodname=Air+quality");
    let res = test::call_service(&app, payapp_callback(&feedback).to_request()).await;
    let (status, body) = read_response(res).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "SUCCESS");

    let api = OrdersApi::new(db);
    let order = api.order_by_provider_ref("payapp", "9001").await.unwrap().expect("Order should have been created");
    assert_eq!(order.payment_status, PaymentStatus::Completed);
    assert_eq!(order.delivery_status, DeliveryStatus::Delivered);
    assert_eq!(order.price, Won::from(30_000));
    assert_eq!(order.dataset_id, "ds-air");
    assert_eq!(order.display_name, "Air quality");
    assert_eq!(order.receipt_type, ReceiptType::None);
}

#[actix_web::test]
async fn payapp_success_without_order_details_is_only_recorded() {
    let _ = env_logger::try_init().ok();
    let db = MemoryDatabase::new();
    let config = test_config();
    let state = test_state(&config, db.clone(), MockReceiptService::new(), MockProviderTransport::new());
    let app = test::init_service(App::new().configure(|cfg| state.configure(cfg))).await;

    let res = test::call_service(&app, payapp_callback(&payapp_feedback("9002", "4", "")).to_request()).await;
    let (status, body) = read_response(res).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "SUCCESS");
    let api = OrdersApi::new(db);
    assert!(api.order_by_provider_ref("payapp", "9002").await.unwrap().is_none());
}

#[actix_web::test]
async fn unparseable_payapp_feedback_is_acknowledged() {
    let _ = env_logger::try_init().ok();
    let config = test_config();
    let state = test_state(&config, MemoryDatabase::new(), MockReceiptService::new(), MockProviderTransport::new());
    let app = test::init_service(App::new().configure(|cfg| state.configure(cfg))).await;
    for body in ["", "pay_state=4", "%%%garbage"] {
        let res = test::call_service(&app, payapp_callback(body).to_request()).await;
        let (status, ack) = read_response(res).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(ack, "SUCCESS");
    }
}

#[actix_web::test]
async fn payapp_feedback_with_wrong_link_values_is_rejected() {
    let _ = env_logger::try_init().ok();
    let db = MemoryDatabase::new();
    let config = test_config();
    let state = test_state(&config, db.clone(), MockReceiptService::new(), MockProviderTransport::new());
    let app = test::init_service(App::new().configure(|cfg| state.configure(cfg))).await;

    let forged = "mul_no=9003&pay_state=4&price=1000&var1=ds-air&linkkey=link-key-1&linkval=guess";
    let res = test::call_service(&app, payapp_callback(forged).to_request()).await;
    let (status, _) = read_response(res).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let api = OrdersApi::new(db);
    assert!(api.order_by_provider_ref("payapp", "9003").await.unwrap().is_none());
}

#[actix_web::test]
async fn tampered_signed_callback_is_rejected() {
    let _ = env_logger::try_init().ok();
    let db = MemoryDatabase::new();
    let config = test_config();
    let state = test_state(&config, db.clone(), MockReceiptService::new(), signed_transport());
    let app = test::init_service(App::new().configure(|cfg| state.configure(cfg))).await;

    let res = test::call_service(&app, checkout_request("signed", SIGNED_CHECKOUT).to_request()).await;
    let (status, body) = read_response(res).await;
    assert_eq!(status, StatusCode::OK);
    let checkout = serde_json::from_str::<CheckoutResponse>(&body).unwrap();
    assert_eq!(checkout.provider_ref, checkout.order_id.to_string());
    assert_eq!(checkout.payment_handle.as_deref(), Some("s-1"));

    let paid = format!(r#"{{"eventId":"evt-1","requestId":"{}","status":"PAID","amount":12000}}"#, checkout.order_id);
    let signature = sign(&paid);
    let tampered = paid.replace("12000", "1");
    for req in [signed_callback(&tampered, Some(signature)), signed_callback(&paid, None)] {
        let res = test::call_service(&app, req.to_request()).await;
        let (status, _) = read_response(res).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
    let api = OrdersApi::new(db);
    let order = api.order_by_id(&checkout.order_id).await.unwrap().unwrap();
    assert_eq!(order.payment_status, PaymentStatus::Pending);
    assert!(api.events_for_order(&order.order_id).await.unwrap().unwrap().is_empty());

    let res = test::call_service(&app, signed_callback(&paid, Some(sign(&paid))).to_request()).await;
    let (status, body) = read_response(res).await;
    assert_eq!(status, StatusCode::OK);
    let ack = serde_json::from_str::<serde_json::Value>(&body).unwrap();
    assert_eq!(ack["success"], true);
    assert_eq!(ack["eventKey"], "signed:evt-1");
    let order = api.order_by_id(&checkout.order_id).await.unwrap().unwrap();
    assert_eq!(order.payment_status, PaymentStatus::Completed);
    assert_eq!(order.delivery_status, DeliveryStatus::Delivered);
}

#[actix_web::test]
async fn signed_success_after_failure_is_a_conflict() {
    let _ = env_logger::try_init().ok();
    let db = MemoryDatabase::new();
    let config = test_config();
    let state = test_state(&config, db.clone(), MockReceiptService::new(), signed_transport());
    let app = test::init_service(App::new().configure(|cfg| state.configure(cfg))).await;

    let res = test::call_service(&app, checkout_request("signed", SIGNED_CHECKOUT).to_request()).await;
    let (_, body) = read_response(res).await;
    let checkout = serde_json::from_str::<CheckoutResponse>(&body).unwrap();
    let failed = format!(r#"{{"requestId":"{}","status":"CANCELLED"}}"#, checkout.order_id);
    let paid = format!(r#"{{"requestId":"{}","status":"PAID","amount":12000}}"#, checkout.order_id);
    for body in [failed, paid] {
        let res = test::call_service(&app, signed_callback(&body, Some(sign(&body))).to_request()).await;
        let (status, _) = read_response(res).await;
        assert_eq!(status, StatusCode::OK);
    }
    let api = OrdersApi::new(db);
    let order = api.order_by_id(&checkout.order_id).await.unwrap().unwrap();
    assert_eq!(order.payment_status, PaymentStatus::Failed);
    assert_eq!(order.delivery_status, DeliveryStatus::Pending);
    assert_eq!(api.events_for_order(&order.order_id).await.unwrap().unwrap().len(), 2);
}

#[actix_web::test]
async fn receipt_failure_does_not_block_delivery() {
    let _ = env_logger::try_init().ok();
    let db = MemoryDatabase::new();
    let mut issuer = MockReceiptService::new();
    issuer.expect_issue_receipt().times(1).returning(|_| Err(ReceiptError::Unavailable("PayApp is down".into())));
    let config = test_config();
    let state = test_state(&config, db.clone(), issuer, MockProviderTransport::new());
    let app = test::init_service(App::new().configure(|cfg| state.configure(cfg))).await;

    let feedback = payapp_feedback("9004", "4", "&price=8000&recvphone=01012345678&var1=ds-bus&var2=personal");
    let res = test::call_service(&app, payapp_callback(&feedback).to_request()).await;
    let (status, body) = read_response(res).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "SUCCESS");

    let api = OrdersApi::new(db);
    let order = api.order_by_provider_ref("payapp", "9004").await.unwrap().unwrap();
    assert_eq!(order.payment_status, PaymentStatus::Completed);
    assert_eq!(order.delivery_status, DeliveryStatus::Delivered);
    let effects = api.effects_for_order(&order.order_id).await.unwrap();
    let receipt = effects.iter().find(|e| e.effect_type == EffectType::Receipt).unwrap();
    assert_eq!(receipt.status, EffectStatus::Failed);
    assert_eq!(receipt.attempts, 1);
    assert!(receipt.last_error.as_deref().unwrap_or_default().contains("PayApp is down"));
}

#[actix_web::test]
async fn unknown_provider_is_not_found() {
    let _ = env_logger::try_init().ok();
    let config = test_config();
    let state = test_state(&config, MemoryDatabase::new(), MockReceiptService::new(), MockProviderTransport::new());
    let app = test::init_service(App::new().configure(|cfg| state.configure(cfg))).await;
    let req = test::TestRequest::post().uri("/callback/stripe").set_payload("{}").to_request();
    let (status, body) = read_response(test::call_service(&app, req).await).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, r#"{"error":"Unknown payment provider: stripe"}"#);
}

#[actix_web::test]
async fn callbacks_from_unlisted_peers_are_refused() {
    let _ = env_logger::try_init().ok();
    let mut config = test_config();
    config.callback_whitelist = Some(vec!["10.0.0.1".parse().unwrap()]);
    let state = test_state(&config, MemoryDatabase::new(), MockReceiptService::new(), MockProviderTransport::new());
    let app = test::init_service(App::new().configure(|cfg| state.configure(cfg))).await;

    let feedback = payapp_feedback("9005", "1", "");
    let req = payapp_callback(&feedback).peer_addr("10.0.0.2:40000".parse().unwrap()).to_request();
    let (status, _) = read_response(test::call_service(&app, req).await).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let req = payapp_callback(&feedback).peer_addr("10.0.0.1:40000".parse().unwrap()).to_request();
    let (status, body) = read_response(test::call_service(&app, req).await).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "SUCCESS");
}
