use chrono::Duration;
use data_payment_engine::{
    traits::{EffectStore, OrderLedger, ReceiptIssuer},
    DispatchSummary,
    SideEffectApi,
};
use log::*;
use tokio::task::JoinHandle;

/// The maximum number of orders whose side effects are retried in one pass.
pub const EFFECT_RETRY_BATCH_SIZE: i64 = 50;

/// Starts the worker that re-drives failed or abandoned side effects (cash receipts and delivery URLs) of completed
/// orders. Do not await the returned JoinHandle, as it will run indefinitely.
///
/// The worker runs on the current thread's local task set, so it must be started from within the actix runtime.
pub fn start_effect_retry_worker<B, R>(api: SideEffectApi<B, R>, interval: Duration) -> JoinHandle<()>
where
    B: OrderLedger + EffectStore + 'static,
    R: ReceiptIssuer + 'static,
{
    let period = interval.to_std().unwrap_or(std::time::Duration::from_secs(60));
    actix_web::rt::spawn(async move {
        let mut timer = tokio::time::interval(period);
        info!("🕰️ Side effect retry worker started. Running every {}s", period.as_secs());
        loop {
            timer.tick().await;
            trace!("🕰️ Running side effect retry job");
            match api.retry_pending(EFFECT_RETRY_BATCH_SIZE).await {
                Ok(summaries) if summaries.is_empty() => {},
                Ok(summaries) => {
                    let failed = summaries.iter().filter(|s| s.has_failures()).count();
                    info!("🕰️ Retried side effects for {} orders. {failed} still failing", summaries.len());
                    debug!("🕰️ Retry results: {}", summary_list(&summaries));
                },
                Err(e) => {
                    error!("🕰️ Error running side effect retry job: {e}");
                },
            }
        }
    })
}

fn summary_list(summaries: &[DispatchSummary]) -> String {
    summaries
        .iter()
        .map(|s| format!("[{}] receipt: {:?} delivery: {:?}", s.order_id, s.receipt, s.delivery))
        .collect::<Vec<String>>()
        .join(", ")
}
