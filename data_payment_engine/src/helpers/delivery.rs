//! # Delivery URLs
//!
//! A completed order entitles the buyer to download its dataset. The download link is bound to the order by a keyed
//! token, so that a link for one order cannot be edited into a link for another:
//!
//! ```text
//!    {base_url}/download/{order_id}?token={hex(Blake2b<U32>(secret | order_id | ":" | dataset_id))}
//! ```
//!
//! Minting is deterministic. Minting the same order twice gives the same URL, which is what makes a retried delivery
//! effect harmless.
use std::fmt::Debug;

use blake2::{
    digest::{consts::U32, Digest},
    Blake2b,
};
use dpg_common::Secret;
use rand::{distributions::Alphanumeric, thread_rng, Rng};

use crate::db_types::Order;

type Blake2b256 = Blake2b<U32>;

const DOMAIN: &[u8] = b"DataPaymentGateway.delivery.v1";

#[derive(Clone)]
pub struct DeliveryMinter {
    base_url: String,
    secret: Secret<String>,
}

impl Debug for DeliveryMinter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "DeliveryMinter({})", self.base_url)
    }
}

impl DeliveryMinter {
    pub fn new<S: Into<String>>(base_url: S, secret: Secret<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { base_url, secret }
    }

    /// A minter with a throwaway secret. URLs minted by it stop validating once the process exits.
    pub fn random<S: Into<String>>(base_url: S) -> Self {
        let secret: String = thread_rng().sample_iter(&Alphanumeric).take(48).map(char::from).collect();
        Self::new(base_url, Secret::new(secret))
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_str()
    }

    pub fn token_for(&self, order: &Order) -> String {
        let mut hasher = Blake2b256::new();
        hasher.update(DOMAIN);
        hasher.update(self.secret.reveal().as_bytes());
        hasher.update(order.order_id.as_str().as_bytes());
        hasher.update(b":");
        hasher.update(order.dataset_id.as_bytes());
        hex::encode(hasher.finalize())
    }

    pub fn mint(&self, order: &Order) -> String {
        format!("{}/download/{}?token={}", self.base_url, order.order_id, self.token_for(order))
    }
}
