//! Request handler definitions
//!
//! Define each route and it handler here.
//! Handlers that are more than a line or two MUST go into a separate module (see [`crate::orchestrator`]). Keep this
//! module neat and tidy 🙏
//!
//! A note about performance:
//! Since each worker thread processes its requests sequentially, handlers which block the current thread will cause the
//! current worker to stop processing new requests. Any long, non-cpu-bound operation (e.g. I/O, database operations,
//! calls to a payment provider) must be expressed as futures or asynchronous functions.
use actix_web::{get, http::StatusCode, web, HttpRequest, HttpResponse, Responder};
use data_payment_engine::{
    db_types::OrderId,
    order_objects::OrderQueryFilter,
    traits::{OrderLedger, OrderManagement, ReceiptIssuer, ReconciliationStore},
    OrderFlowApi,
    OrdersApi,
    ReconciliationApi,
};
use log::*;

use crate::{
    config::ServerOptions,
    data_objects::{AdminOrderQuery, CheckoutRequest, OrderEventLog},
    errors::ServerError,
    helpers::{get_remote_ip, raw_callback},
    integrations::{AckResponse, GatewayRegistry, GatewayTransport},
    orchestrator::{create_checkout, handle_callback, issue_receipt_on_demand},
};

// Web-actix cannot handle generics in handlers, so it's implemented manually using the `route!` macro
#[macro_export]
macro_rules! route {
    ($name:ident => $method:ident $path:literal impl $($bounds:ty),+) => {
        paste::paste! { pub struct [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ >( $( core::marker::PhantomData<fn() -> [< T $bounds:camel> ] >,)+ );}
        paste::paste! { impl< $( [< T $bounds:camel> ],)+ > [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ > {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self($( core::marker::PhantomData::<fn() -> [< T $bounds:camel> ] >,)+)
            }
        }}
        paste::paste! { impl<$( [< T $bounds:camel >] , )+> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<$([<T $bounds:camel>],)+>
        where
            $([<T $bounds:camel>]: $bounds + 'static,)+
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::< $( [< T $bounds:camel >], )+>);
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };
}

// ----------------------------------------------   Health  ----------------------------------------------------
#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

//----------------------------------------------   Checkout  ----------------------------------------------------
route!(checkout => Post "/checkout/{provider_id}" impl OrderLedger, GatewayTransport);
/// Route handler for `POST /api/checkout/{provider_id}`.
///
/// Validates the request, registers a pending order and opens a payment session with the provider. The response
/// carries the new order id, the provider's reference and either a URL to redirect the buyer to, or a handle for the
/// provider's client-side widget.
///
/// Invalid input is a 400 and nothing is stored. If the provider does not answer in time, the response is a 504; for
/// providers that echo our order id, the pending order remains and will be settled by the provider's callback.
pub async fn checkout<B, T>(
    path: web::Path<String>,
    body: web::Json<CheckoutRequest>,
    api: web::Data<OrderFlowApi<B>>,
    registry: web::Data<GatewayRegistry>,
    transport: web::Data<T>,
    options: web::Data<ServerOptions>,
) -> Result<HttpResponse, ServerError>
where
    B: OrderLedger,
    T: GatewayTransport,
{
    let provider_id = path.into_inner();
    let intent = body.into_inner().into_intent();
    debug!("💻️ Checkout request for {} with {provider_id}", intent.dataset_id);
    let callback_url = options.callback_url(&provider_id);
    let result =
        create_checkout(api.as_ref(), registry.as_ref(), transport.as_ref(), &provider_id, intent, &callback_url)
            .await?;
    Ok(HttpResponse::Ok().json(result))
}

//----------------------------------------------   Callbacks  ----------------------------------------------------
route!(payment_callback => Post "/{provider_id}" impl ReconciliationStore, ReceiptIssuer);
/// Route handler for `POST /callback/{provider_id}`.
///
/// The body is read as raw bytes, since signatures are computed over the exact bytes the provider sent. The response
/// is whatever the provider expects as an acknowledgement, which is sent for replays and no-op events too.
pub async fn payment_callback<B, R>(
    req: HttpRequest,
    path: web::Path<String>,
    body: web::Bytes,
    api: web::Data<ReconciliationApi<B, R>>,
    registry: web::Data<GatewayRegistry>,
    options: web::Data<ServerOptions>,
) -> Result<HttpResponse, ServerError>
where
    B: ReconciliationStore,
    R: ReceiptIssuer,
{
    let provider_id = path.into_inner();
    let peer = get_remote_ip(&req, options.use_x_forwarded_for, options.use_forwarded);
    info!("💻️ Received {provider_id} callback ({} bytes) from {peer:?}", body.len());
    let raw = raw_callback(req.headers(), body);
    let ack = handle_callback(api.as_ref(), registry.as_ref(), &provider_id, raw).await?;
    Ok(ack_to_response(ack))
}

fn ack_to_response(ack: AckResponse) -> HttpResponse {
    let status = StatusCode::from_u16(ack.status).unwrap_or(StatusCode::OK);
    HttpResponse::build(status).content_type(ack.content_type).body(ack.body)
}

//----------------------------------------------   Orders  ----------------------------------------------------
route!(order_by_id => Get "/orders/id/{order_id}" impl OrderManagement);
pub async fn order_by_id<B: OrderManagement>(
    path: web::Path<OrderId>,
    api: web::Data<OrdersApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let order_id = path.into_inner();
    debug!("💻️ GET order_by_id({order_id})");
    let order = api.order_by_id(&order_id).await?;
    match order {
        Some(order) => Ok(HttpResponse::Ok().json(order)),
        None => Err(ServerError::NoRecordFound(format!("Order {order_id} does not exist"))),
    }
}

route!(orders_for_user => Get "/orders/user/{user_id}" impl OrderManagement);
pub async fn orders_for_user<B: OrderManagement>(
    path: web::Path<String>,
    api: web::Data<OrdersApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let user_id = path.into_inner();
    debug!("💻️ GET orders_for_user({user_id})");
    let orders = api.orders_for_user(&user_id).await?;
    Ok(HttpResponse::Ok().json(orders))
}

//----------------------------------------------   Admin  ----------------------------------------------------
route!(admin_orders => Get "/orders" impl OrderManagement);
/// Order search. Filters are passed in the query string, e.g. `?status=completed,failed&provider=payapp&limit=20`.
pub async fn admin_orders<B: OrderManagement>(
    query: web::Query<AdminOrderQuery>,
    api: web::Data<OrdersApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let filter = OrderQueryFilter::try_from(query.into_inner())?;
    debug!("💻️ GET admin orders: {filter:?}");
    let orders = api.search_orders(filter).await?;
    Ok(HttpResponse::Ok().json(orders))
}

route!(admin_stats => Get "/stats" impl OrderManagement);
pub async fn admin_stats<B: OrderManagement>(api: web::Data<OrdersApi<B>>) -> Result<HttpResponse, ServerError> {
    debug!("💻️ GET admin stats");
    let stats = api.order_stats().await?;
    Ok(HttpResponse::Ok().json(stats))
}

route!(admin_events => Get "/events/{order_id}" impl ReconciliationStore);
/// The order, every gateway event recorded for its reference, and the state of its side effects.
pub async fn admin_events<B: ReconciliationStore>(
    path: web::Path<OrderId>,
    api: web::Data<OrdersApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let order_id = path.into_inner();
    debug!("💻️ GET admin events({order_id})");
    let not_found = || ServerError::NoRecordFound(format!("Order {order_id} does not exist"));
    let order = api.order_by_id(&order_id).await?.ok_or_else(not_found)?;
    let events = api.events_for_order(&order_id).await?.ok_or_else(not_found)?;
    let effects = api.effects_for_order(&order_id).await?;
    Ok(HttpResponse::Ok().json(OrderEventLog { order, events, effects }))
}

route!(admin_issue_receipt => Post "/orders/{order_id}/receipt" impl ReconciliationStore, ReceiptIssuer);
/// Issues the cash receipt of a completed order on request. Repeated calls never issue a second receipt.
pub async fn admin_issue_receipt<B, R>(
    path: web::Path<OrderId>,
    orders: web::Data<OrdersApi<B>>,
    api: web::Data<ReconciliationApi<B, R>>,
) -> Result<HttpResponse, ServerError>
where
    B: ReconciliationStore,
    R: ReceiptIssuer,
{
    let order_id = path.into_inner();
    info!("💻️ POST admin receipt({order_id})");
    let result = issue_receipt_on_demand(orders.as_ref(), api.as_ref(), &order_id).await?;
    Ok(HttpResponse::Ok().json(result))
}
