use actix_web::{http::StatusCode, test, test::TestRequest, App};
use data_payment_engine::{
    db_types::{NewOrder, Order, OrderId, ReceiptType},
    events::EventProducers,
    order_objects::{OrderResult, OrderStats},
    traits::ReceiptError,
    MemoryDatabase,
    OrderFlowApi,
};
use dpg_common::Won;

use super::{
    helpers::*,
    mocks::{MockProviderTransport, MockReceiptService},
};
use crate::server::ADMIN_TOKEN_HEADER;

async fn seed_orders(db: &MemoryDatabase) -> Vec<Order> {
    let flow = OrderFlowApi::new(db.clone(), EventProducers::default());
    let mut result = Vec::new();
    for (i, user) in ["alice", "alice", "bob"].into_iter().enumerate() {
        let order = NewOrder::new("payapp", format!("700{i}").as_str(), "ds-traffic", Won::from(10_000))
            .with_order_id(OrderId::from(format!("order-{i}")))
            .with_display_name("Traffic data")
            .with_buyer_contact("01012345678")
            .with_user_id(user);
        let (order, _) = flow.create_pending_order(order).await.unwrap();
        result.push(order);
    }
    result
}

#[actix_web::test]
async fn health_check() {
    let config = test_config();
    let state = test_state(&config, MemoryDatabase::new(), MockReceiptService::new(), MockProviderTransport::new());
    let app = test::init_service(App::new().configure(|cfg| state.configure(cfg))).await;
    let res = test::call_service(&app, TestRequest::get().uri("/health").to_request()).await;
    let (status, body) = read_response(res).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "👍️\n");
}

#[actix_web::test]
async fn fetch_orders() {
    let _ = env_logger::try_init().ok();
    let db = MemoryDatabase::new();
    let orders = seed_orders(&db).await;
    let config = test_config();
    let state = test_state(&config, db, MockReceiptService::new(), MockProviderTransport::new());
    let app = test::init_service(App::new().configure(|cfg| state.configure(cfg))).await;

    let res = test::call_service(&app, TestRequest::get().uri("/api/orders/id/order-2").to_request()).await;
    let (status, body) = read_response(res).await;
    assert_eq!(status, StatusCode::OK);
    let order = serde_json::from_str::<Order>(&body).unwrap();
    assert_eq!(order, orders[2]);

    let res = test::call_service(&app, TestRequest::get().uri("/api/orders/id/order-99").to_request()).await;
    let (status, body) = read_response(res).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body.contains("order-99"));

    let res = test::call_service(&app, TestRequest::get().uri("/api/orders/user/alice").to_request()).await;
    let (status, body) = read_response(res).await;
    assert_eq!(status, StatusCode::OK);
    let result = serde_json::from_str::<OrderResult>(&body).unwrap();
    assert_eq!(result.total_orders, 2);
    assert!(result.orders.iter().all(|o| o.user_id.as_deref() == Some("alice")));

    let res = test::call_service(&app, TestRequest::get().uri("/api/orders/user/carol").to_request()).await;
    let (status, body) = read_response(res).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(serde_json::from_str::<OrderResult>(&body).unwrap().total_orders, 0);
}

#[actix_web::test]
async fn admin_routes_require_the_admin_token() {
    let _ = env_logger::try_init().ok();
    let config = test_config();
    let state = test_state(&config, MemoryDatabase::new(), MockReceiptService::new(), MockProviderTransport::new());
    let app = test::init_service(App::new().configure(|cfg| state.configure(cfg))).await;

    let no_token = TestRequest::get().uri("/api/admin/stats");
    let wrong_token = TestRequest::get().uri("/api/admin/stats").insert_header((ADMIN_TOKEN_HEADER, "guess"));
    for req in [no_token, wrong_token] {
        let (status, _) = read_response(test::call_service(&app, req.to_request()).await).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }
    let (status, _) = read_response(test::call_service(&app, admin_get("/api/admin/stats").to_request()).await).await;
    assert_eq!(status, StatusCode::OK);

    // With no token configured, the admin routes are closed
    let mut config = test_config();
    config.admin_token = None;
    let state = test_state(&config, MemoryDatabase::new(), MockReceiptService::new(), MockProviderTransport::new());
    let app = test::init_service(App::new().configure(|cfg| state.configure(cfg))).await;
    let (status, _) = read_response(test::call_service(&app, admin_get("/api/admin/stats").to_request()).await).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[actix_web::test]
async fn admin_search_and_stats() {
    let _ = env_logger::try_init().ok();
    let db = MemoryDatabase::new();
    seed_orders(&db).await;
    let config = test_config();
    let state = test_state(&config, db.clone(), MockReceiptService::new(), MockProviderTransport::new());
    let app = test::init_service(App::new().configure(|cfg| state.configure(cfg))).await;

    // Settle one order through the callback endpoint
    let feedback = payapp_feedback("7001", "4", "");
    let (status, _) = read_response(test::call_service(&app, payapp_callback(&feedback).to_request()).await).await;
    assert_eq!(status, StatusCode::OK);

    let req = admin_get("/api/admin/orders?status=completed&provider=payapp").to_request();
    let (status, body) = read_response(test::call_service(&app, req).await).await;
    assert_eq!(status, StatusCode::OK);
    let result = serde_json::from_str::<OrderResult>(&body).unwrap();
    assert_eq!(result.total_orders, 1);
    assert_eq!(result.orders[0].order_id.as_str(), "order-1");

    let req = admin_get("/api/admin/orders?status=pending,failed&user=alice").to_request();
    let (_, body) = read_response(test::call_service(&app, req).await).await;
    assert_eq!(serde_json::from_str::<OrderResult>(&body).unwrap().total_orders, 1);

    let req = admin_get("/api/admin/orders?status=paid").to_request();
    let (status, _) = read_response(test::call_service(&app, req).await).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, body) = read_response(test::call_service(&app, admin_get("/api/admin/stats").to_request()).await).await;
    let stats = serde_json::from_str::<OrderStats>(&body).unwrap();
    assert_eq!(stats.total_orders, 3);
    assert_eq!(stats.completed_orders, 1);
    assert_eq!(stats.total_revenue, Won::from(10_000));
}

#[actix_web::test]
async fn admin_event_log() {
    let _ = env_logger::try_init().ok();
    let db = MemoryDatabase::new();
    seed_orders(&db).await;
    let config = test_config();
    let state = test_state(&config, db, MockReceiptService::new(), MockProviderTransport::new());
    let app = test::init_service(App::new().configure(|cfg| state.configure(cfg))).await;

    for pay_state in ["1", "4", "4"] {
        let feedback = payapp_feedback("7000", pay_state, "");
        let (status, _) = read_response(test::call_service(&app, payapp_callback(&feedback).to_request()).await).await;
        assert_eq!(status, StatusCode::OK);
    }

    let req = admin_get("/api/admin/events/order-0").to_request();
    let (status, body) = read_response(test::call_service(&app, req).await).await;
    assert_eq!(status, StatusCode::OK);
    let log = serde_json::from_str::<serde_json::Value>(&body).unwrap();
    assert_eq!(log["order"]["payment_status"], "completed");
    assert_eq!(log["order"]["delivery_status"], "delivered");
    let events = log["events"].as_array().unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0]["event_key"], "payapp:7000:pay_state_1");
    assert_eq!(events[1]["event_key"], "payapp:7000:pay_state_4");
    // No receipt was requested, so only the delivery effect exists
    let effects = log["effects"].as_array().unwrap();
    assert_eq!(effects.len(), 1);
    assert_eq!(effects[0]["effect_type"], "delivery");
    assert_eq!(effects[0]["status"], "done");

    let req = admin_get("/api/admin/events/order-99").to_request();
    let (status, _) = read_response(test::call_service(&app, req).await).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn admin_receipt_issuance() {
    let _ = env_logger::try_init().ok();
    let db = MemoryDatabase::new();
    let flow = OrderFlowApi::new(db.clone(), EventProducers::default());
    for (id, mul_no) in [("order-r1", "7101"), ("order-r2", "7102")] {
        let order = NewOrder::new("payapp", mul_no, "ds-traffic", Won::from(25_000))
            .with_order_id(OrderId::from(id.to_string()))
            .with_display_name("Traffic data")
            .with_buyer_contact("01012345678")
            .with_receipt(ReceiptType::Personal, None);
        flow.create_pending_order(order).await.unwrap();
    }
    // The receipt service is down when the payment arrives, and back when the operator retries
    let mut issuer = MockReceiptService::new();
    let mut calls = 0;
    issuer.expect_issue_receipt().withf(|r| r.id_info == "01012345678").times(2).returning(move |_| {
        calls += 1;
        match calls {
            1 => Err(ReceiptError::Unavailable("receipt service timed out".into())),
            _ => Ok(()),
        }
    });
    let config = test_config();
    let state = test_state(&config, db, issuer, MockProviderTransport::new());
    let app = test::init_service(App::new().configure(|cfg| state.configure(cfg))).await;

    let feedback = payapp_feedback("7101", "4", "");
    let (status, _) = read_response(test::call_service(&app, payapp_callback(&feedback).to_request()).await).await;
    assert_eq!(status, StatusCode::OK);

    let req = admin_post("/api/admin/orders/order-r1/receipt").to_request();
    let (status, body) = read_response(test::call_service(&app, req).await).await;
    assert_eq!(status, StatusCode::OK);
    let result = serde_json::from_str::<serde_json::Value>(&body).unwrap();
    assert_eq!(result["orderId"], "order-r1");
    assert_eq!(result["receipt"]["result"], "ran");
    assert_eq!(result["record"]["status"], "done");
    assert_eq!(result["record"]["attempts"], 2);

    // Asking again never issues a second receipt
    let req = admin_post("/api/admin/orders/order-r1/receipt").to_request();
    let (status, body) = read_response(test::call_service(&app, req).await).await;
    assert_eq!(status, StatusCode::OK);
    let result = serde_json::from_str::<serde_json::Value>(&body).unwrap();
    assert_eq!(result["receipt"]["result"], "skipped");

    // order-r2 has not been paid
    let req = admin_post("/api/admin/orders/order-r2/receipt").to_request();
    let (status, body) = read_response(test::call_service(&app, req).await).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body.contains("not paid"));

    let req = admin_post("/api/admin/orders/order-99/receipt").to_request();
    let (status, _) = read_response(test::call_service(&app, req).await).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let req = TestRequest::post().uri("/api/admin/orders/order-r1/receipt").to_request();
    let (status, _) = read_response(test::call_service(&app, req).await).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[actix_web::test]
async fn admin_receipt_failure_is_reported() {
    let _ = env_logger::try_init().ok();
    let db = MemoryDatabase::new();
    let flow = OrderFlowApi::new(db.clone(), EventProducers::default());
    let order = NewOrder::new("payapp", "7201", "ds-traffic", Won::from(25_000))
        .with_order_id(OrderId::from("order-f1".to_string()))
        .with_display_name("Traffic data")
        .with_buyer_contact("01012345678")
        .with_receipt(ReceiptType::Personal, None);
    flow.create_pending_order(order).await.unwrap();
    let mut issuer = MockReceiptService::new();
    issuer
        .expect_issue_receipt()
        .times(2)
        .returning(|_| Err(ReceiptError::Rejected("invalid identification number".into())));
    let config = test_config();
    let state = test_state(&config, db, issuer, MockProviderTransport::new());
    let app = test::init_service(App::new().configure(|cfg| state.configure(cfg))).await;

    let feedback = payapp_feedback("7201", "4", "");
    let (status, _) = read_response(test::call_service(&app, payapp_callback(&feedback).to_request()).await).await;
    assert_eq!(status, StatusCode::OK);
    let req = admin_post("/api/admin/orders/order-f1/receipt").to_request();
    let (status, body) = read_response(test::call_service(&app, req).await).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(body.contains("invalid identification number"));
}
