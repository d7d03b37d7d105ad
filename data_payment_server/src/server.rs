use std::{net::IpAddr, sync::Arc, time::Duration};

use actix_web::{
    dev::{Server, Service},
    http::KeepAlive,
    middleware::Logger,
    web,
    web::ServiceConfig,
    App,
    HttpServer,
};
use data_payment_engine::{
    events::EventProducers,
    helpers::DeliveryMinter,
    traits::{ReceiptIssuer, ReconciliationStore},
    MemoryDatabase,
    OrderFlowApi,
    OrdersApi,
    ReconciliationApi,
    SideEffectApi,
    SqliteDatabase,
};
use dpg_common::Secret;
use futures::{future::ok, FutureExt};
use gateway_tools::{helpers::tokens_match, GatewayHttpClient, PayAppApi};
use log::*;

use crate::{
    audit::create_audit_event_handlers,
    config::{ServerConfig, ServerOptions, StoreKind},
    effect_retry_worker::start_effect_retry_worker,
    errors::ServerError,
    helpers::get_remote_ip,
    integrations::{GatewayRegistry, GatewayTransport, PayAppAdapter, PayAppReceiptIssuer, SignedJsonAdapter},
    routes::{
        health,
        AdminEventsRoute,
        AdminIssueReceiptRoute,
        AdminOrdersRoute,
        AdminStatsRoute,
        CheckoutRoute,
        OrderByIdRoute,
        OrdersForUserRoute,
        PaymentCallbackRoute,
    },
};

pub const ADMIN_TOKEN_HEADER: &str = "X-Admin-Token";
const DB_MAX_CONNECTIONS: u32 = 25;

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let http = GatewayHttpClient::new(config.http_timeout).map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let registry = build_gateway_registry(&config);
    let issuer = PayAppReceiptIssuer::new(PayAppApi::new(config.payapp.clone(), http.clone()));
    let handlers = create_audit_event_handlers();
    let producers = handlers.producers();
    handlers.start_handlers().await;
    match config.store {
        StoreKind::Sqlite => {
            let db = SqliteDatabase::new_with_url(&config.database_url, DB_MAX_CONNECTIONS)
                .await
                .map_err(|e| ServerError::InitializeError(e.to_string()))?;
            db.migrate().await.map_err(|e| ServerError::InitializeError(e.to_string()))?;
            serve(config, db, issuer, http, registry, producers).await
        },
        StoreKind::Memory => {
            warn!("🗃️ Using the in-memory store. Every order is lost when the server stops.");
            serve(config, MemoryDatabase::new(), issuer, http, registry, producers).await
        },
    }
}

async fn serve<B, R>(
    config: ServerConfig,
    db: B,
    issuer: R,
    http: GatewayHttpClient,
    registry: GatewayRegistry,
    producers: EventProducers,
) -> Result<(), ServerError>
where
    B: ReconciliationStore + Send + 'static,
    R: ReceiptIssuer + Send + Sync + 'static,
{
    let side_effects =
        SideEffectApi::new(db.clone(), Arc::new(issuer), delivery_minter(&config)).with_lease(config.effect_lease);
    let _worker = start_effect_retry_worker(side_effects.clone(), config.effect_retry_interval);
    let state = ServerState::new(&config, db, side_effects, http, registry, producers);
    let srv = create_server_instance(&config, state)?;
    srv.await.map_err(|e| ServerError::Unspecified(e.to_string()))
}

/// Registers an adapter for every provider that is configured. PayApp is always available, since it needs no
/// credentials to accept callbacks.
pub fn build_gateway_registry(config: &ServerConfig) -> GatewayRegistry {
    let mut registry = GatewayRegistry::new();
    registry.register(PayAppAdapter::new(config.payapp.clone()));
    if config.signed_json.is_enabled() {
        registry.register(SignedJsonAdapter::new(config.signed_json.clone()));
    } else {
        info!("💳️ The signed JSON provider is not configured and will not be available");
    }
    for id in registry.provider_ids() {
        if let Some(adapter) = registry.get(&id) {
            if !adapter.verification_enabled() {
                warn!(
                    "🔐️🚨️ Callback verification is DISABLED for {id}. Anyone who can reach /callback/{id} can mark \
                     orders as paid. Configure the provider's shared secret before going live."
                );
            }
        }
    }
    info!("💳️ Payment providers: {}", registry.provider_ids().join(", "));
    registry
}

fn delivery_minter(config: &ServerConfig) -> DeliveryMinter {
    match &config.delivery_secret {
        Some(secret) => DeliveryMinter::new(config.delivery_base_url.as_str(), secret.clone()),
        None => {
            warn!("🪛️ DPG_DELIVERY_SECRET is not set. Using a random key. Delivery links will not survive a restart.");
            DeliveryMinter::random(config.delivery_base_url.as_str())
        },
    }
}

/// Everything the request handlers share. Each server worker builds its API objects from a clone of this.
pub struct ServerState<B, R, T> {
    pub db: B,
    pub side_effects: SideEffectApi<B, R>,
    pub producers: EventProducers,
    pub transport: T,
    pub registry: GatewayRegistry,
    pub options: ServerOptions,
    pub admin_token: Option<Secret<String>>,
    pub callback_whitelist: Option<Vec<IpAddr>>,
}

impl<B: Clone, R, T: Clone> Clone for ServerState<B, R, T> {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            side_effects: self.side_effects.clone(),
            producers: self.producers.clone(),
            transport: self.transport.clone(),
            registry: self.registry.clone(),
            options: self.options.clone(),
            admin_token: self.admin_token.clone(),
            callback_whitelist: self.callback_whitelist.clone(),
        }
    }
}

impl<B, R, T> ServerState<B, R, T>
where
    B: ReconciliationStore + 'static,
    R: ReceiptIssuer + 'static,
    T: GatewayTransport + Clone + 'static,
{
    pub fn new(
        config: &ServerConfig,
        db: B,
        side_effects: SideEffectApi<B, R>,
        transport: T,
        registry: GatewayRegistry,
        producers: EventProducers,
    ) -> Self {
        Self {
            db,
            side_effects,
            producers,
            transport,
            registry,
            options: ServerOptions::from_config(config),
            admin_token: config.admin_token.clone(),
            callback_whitelist: config.callback_whitelist.clone(),
        }
    }

    /// Registers the application data and every route.
    pub fn configure(&self, cfg: &mut ServiceConfig) {
        let flow_api = OrderFlowApi::new(self.db.clone(), self.producers.clone());
        let orders_api = OrdersApi::new(self.db.clone());
        let reconciliation_api =
            ReconciliationApi::new(self.db.clone(), self.producers.clone(), self.side_effects.clone());

        let admin_token = self.admin_token.clone();
        let admin_scope = web::scope("/admin")
            .wrap_fn(move |req, srv| {
                let supplied = req.headers().get(ADMIN_TOKEN_HEADER).and_then(|v| v.to_str().ok());
                if admin_token_matches(admin_token.as_ref(), supplied) {
                    srv.call(req)
                } else {
                    warn!("🔐️ Denied admin request for {}", req.path());
                    let err = ServerError::Forbidden("A valid admin token is required".into());
                    ok(req.error_response(err)).boxed_local()
                }
            })
            .service(AdminOrdersRoute::<B>::new())
            .service(AdminStatsRoute::<B>::new())
            .service(AdminEventsRoute::<B>::new())
            .service(AdminIssueReceiptRoute::<B, R>::new());
        let api_scope = web::scope("/api")
            .service(admin_scope)
            .service(CheckoutRoute::<B, T>::new())
            .service(OrderByIdRoute::<B>::new())
            .service(OrdersForUserRoute::<B>::new());

        let use_x_forwarded_for = self.options.use_x_forwarded_for;
        let use_forwarded = self.options.use_forwarded;
        let whitelist = self.callback_whitelist.clone();
        let callback_scope = web::scope("/callback")
            .wrap_fn(move |req, srv| {
                // Collect the peer IP from X-Forwarded-For or Forwarded headers, _if_ the configuration allows it.
                // Otherwise, use the peer address of the connection.
                let peer_ip = get_remote_ip(req.request(), use_x_forwarded_for, use_forwarded);
                if peer_is_whitelisted(peer_ip, whitelist.as_deref()) {
                    srv.call(req)
                } else {
                    warn!("🔐️ Callback from {peer_ip:?} is not on the whitelist. Denying access.");
                    let err = ServerError::Forbidden("Callbacks are not accepted from this address".into());
                    ok(req.error_response(err)).boxed_local()
                }
            })
            .service(PaymentCallbackRoute::<B, R>::new());

        cfg.app_data(web::Data::new(flow_api))
            .app_data(web::Data::new(orders_api))
            .app_data(web::Data::new(reconciliation_api))
            .app_data(web::Data::new(self.registry.clone()))
            .app_data(web::Data::new(self.transport.clone()))
            .app_data(web::Data::new(self.options.clone()))
            .app_data(
                web::JsonConfig::default()
                    .error_handler(|err, _req| ServerError::InvalidRequestBody(err.to_string()).into()),
            )
            .service(health)
            .service(api_scope)
            .service(callback_scope);
    }
}

pub fn create_server_instance<B, R, T>(
    config: &ServerConfig,
    state: ServerState<B, R, T>,
) -> Result<Server, ServerError>
where
    B: ReconciliationStore + Send + 'static,
    R: ReceiptIssuer + Send + Sync + 'static,
    T: GatewayTransport + Clone + Send + 'static,
{
    let srv = HttpServer::new(move || {
        let state = state.clone();
        App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("dpg::access_log"))
            .configure(move |cfg| state.configure(cfg))
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((config.host.as_str(), config.port))?
    .run();
    Ok(srv)
}

/// Without a configured token, the admin routes are closed to everyone.
pub fn admin_token_matches(expected: Option<&Secret<String>>, supplied: Option<&str>) -> bool {
    match (expected, supplied) {
        (Some(expected), Some(supplied)) => tokens_match(expected.reveal(), supplied),
        _ => false,
    }
}

/// Without a whitelist, callbacks are accepted from any address.
pub fn peer_is_whitelisted(peer: Option<IpAddr>, whitelist: Option<&[IpAddr]>) -> bool {
    match (peer, whitelist) {
        (_, None) => true,
        (Some(ip), Some(list)) => list.contains(&ip),
        (None, Some(_)) => false,
    }
}
