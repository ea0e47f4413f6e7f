//! Integration test support for ShopClub.
//!
//! # Running Tests
//!
//! ```bash
//! # In-memory checkout and webhook flows, plus the Stripe client against wiremock
//! cargo test -p shopclub-integration-tests
//!
//! # Postgres-backed repository tests (needs DATABASE_URL)
//! cargo test -p shopclub-integration-tests -- --ignored
//! ```
//!
//! # Test Categories
//!
//! - `checkout_flow` - `CheckoutService` end to end over [`MemoryStore`] and [`FakeGateway`]
//! - `webhook_reconciliation` - `WebhookReconciler` over [`MemoryStore`]
//! - `stripe_client` - `StripeClient` against a mock HTTP server
//! - `postgres_ledger` - `OrderRepository` and `AddressRepository` against `PostgreSQL`

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use secrecy::SecretString;
use tokio::sync::Mutex;

use shopclub_core::{
    CartLine, CartLineId, CheckoutError, Money, NewOrder, Order, OrderId, OrderItem, OrderItemId,
    OrderNumberGenerator, PaymentStatus, PostalAddressInput, Product, ProductId, RandomSource,
    ShippingDetails, ShippingDetailsInput, UserId, price_cart,
};
use shopclub_storefront::db::RepositoryError;
use shopclub_storefront::payments::{
    CreateIntent, GatewayError, IntentStatus, PaymentGateway, PaymentIntent, WebhookVerifier,
};
use shopclub_storefront::services::{
    CheckoutService, CheckoutStore, LedgerEntry, OrderLedger, WebhookReconciler,
};

/// Attempts at a fresh order number, as in the Postgres ledger.
const ORDER_NUMBER_ATTEMPTS: usize = 5;

/// Webhook signing secret used by the fixtures.
pub const WEBHOOK_SECRET: &str = "whsec_Zq8rT2vXk4mN7pL1sW9yB3cF6hJ0dG5a";

// =============================================================================
// In-memory store
// =============================================================================

#[derive(Default)]
struct MemoryState {
    products: BTreeMap<ProductId, Product>,
    /// `(user, product) -> (line id, quantity)`
    cart: BTreeMap<(UserId, ProductId), (CartLineId, u32)>,
    orders: Vec<Order>,
    next_id: i32,
}

impl MemoryState {
    const fn next_id(&mut self) -> i32 {
        self.next_id += 1;
        self.next_id
    }

    fn lines_for(&self, user_id: UserId) -> Vec<CartLine> {
        self.cart
            .iter()
            .filter(|((owner, _), _)| *owner == user_id)
            .filter_map(|((_, product_id), (line_id, quantity))| {
                self.products.get(product_id).map(|product| CartLine {
                    id: *line_id,
                    product: product.clone(),
                    quantity: *quantity,
                })
            })
            .collect()
    }
}

/// In-memory [`CheckoutStore`] and [`OrderLedger`].
///
/// One lock guards everything, so a commit is atomic with respect to every
/// other commit, the way row locks make it in Postgres.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a product to the catalog.
    pub async fn add_product(&self, name: &str, price_cents: i64, stock: u32) -> ProductId {
        let mut state = self.state.lock().await;
        let id = ProductId::new(state.next_id());
        state.products.insert(
            id,
            Product {
                id,
                name: name.to_owned(),
                slug: name.to_lowercase(),
                price: Money::from_minor_units(price_cents),
                stock,
                available: true,
            },
        );
        id
    }

    /// Put `quantity` of a product in a user's cart, replacing any line.
    pub async fn set_cart(&self, user_id: UserId, product_id: ProductId, quantity: u32) {
        let mut state = self.state.lock().await;
        let line_id = CartLineId::new(state.next_id());
        state
            .cart
            .insert((user_id, product_id), (line_id, quantity));
    }

    pub async fn set_stock(&self, product_id: ProductId, stock: u32) {
        if let Some(product) = self.state.lock().await.products.get_mut(&product_id) {
            product.stock = stock;
        }
    }

    pub async fn set_price(&self, product_id: ProductId, price_cents: i64) {
        if let Some(product) = self.state.lock().await.products.get_mut(&product_id) {
            product.price = Money::from_minor_units(price_cents);
        }
    }

    pub async fn stock(&self, product_id: ProductId) -> Option<u32> {
        self.state
            .lock()
            .await
            .products
            .get(&product_id)
            .map(|p| p.stock)
    }

    pub async fn cart_lines(&self, user_id: UserId) -> Vec<CartLine> {
        self.state.lock().await.lines_for(user_id)
    }

    pub async fn orders(&self) -> Vec<Order> {
        self.state.lock().await.orders.clone()
    }

    pub async fn order_by_intent(&self, intent_id: &str) -> Option<Order> {
        self.state
            .lock()
            .await
            .orders
            .iter()
            .find(|o| o.stripe_payment_intent.as_deref() == Some(intent_id))
            .cloned()
    }
}

impl CheckoutStore for MemoryStore {
    async fn load_cart(&self, user_id: UserId) -> Result<Vec<CartLine>, CheckoutError> {
        Ok(self.cart_lines(user_id).await)
    }

    async fn commit_order(
        &self,
        order: NewOrder,
        numbers: &OrderNumberGenerator,
        now: DateTime<Utc>,
    ) -> Result<Order, CheckoutError> {
        let mut state = self.state.lock().await;

        let priced = price_cart(&state.lines_for(order.user_id))?;
        if priced.total != order.cart.total {
            return Err(CheckoutError::CartChanged {
                expected: order.cart.total,
                actual: priced.total,
            });
        }

        if state
            .orders
            .iter()
            .any(|o| o.stripe_payment_intent.as_deref() == Some(&order.stripe_payment_intent))
        {
            return Err(CheckoutError::IntegrityViolation(
                "payment intent already exists".to_owned(),
            ));
        }

        let order_number = (0..ORDER_NUMBER_ATTEMPTS)
            .map(|_| numbers.next_number())
            .find(|n| state.orders.iter().all(|o| &o.order_number != n))
            .ok_or_else(|| {
                CheckoutError::IntegrityViolation("no free order number".to_owned())
            })?;

        let mut items = Vec::with_capacity(priced.lines.len());
        for line in &priced.lines {
            if let Some(product) = state.products.get_mut(&line.product_id) {
                product.stock -= line.quantity;
            }
            items.push(OrderItem {
                id: OrderItemId::new(state.next_id()),
                product_id: line.product_id,
                product_name: line.product_name.clone(),
                quantity: line.quantity,
                price: line.unit_price,
            });
        }
        state.cart.retain(|(owner, _), _| *owner != order.user_id);

        let committed = Order {
            id: OrderId::new(state.next_id()),
            user_id: order.user_id,
            order_number,
            details: order.details,
            total_amount: priced.total,
            payment_status: order.payment_status,
            stripe_payment_intent: Some(order.stripe_payment_intent),
            created_at: now,
            updated_at: now,
            paid_at: (order.payment_status == PaymentStatus::Paid).then_some(now),
            admin_notes: String::new(),
            items,
        };
        state.orders.push(committed.clone());
        Ok(committed)
    }
}

impl OrderLedger for MemoryStore {
    async fn find_by_payment_intent(
        &self,
        intent_id: &str,
    ) -> Result<Option<LedgerEntry>, RepositoryError> {
        Ok(self.order_by_intent(intent_id).await.map(|o| LedgerEntry {
            id: o.id,
            order_number: o.order_number,
            payment_status: o.payment_status,
        }))
    }

    async fn transition(
        &self,
        order_id: OrderId,
        from: PaymentStatus,
        to: PaymentStatus,
        paid_at: Option<DateTime<Utc>>,
    ) -> Result<bool, RepositoryError> {
        if !from.can_transition_to(to) {
            return Err(RepositoryError::Conflict(format!(
                "illegal payment status transition {from} -> {to}"
            )));
        }

        let mut state = self.state.lock().await;
        let Some(order) = state
            .orders
            .iter_mut()
            .find(|o| o.id == order_id && o.payment_status == from)
        else {
            return Ok(false);
        };

        order.payment_status = to;
        if paid_at.is_some() {
            order.paid_at = paid_at;
        }
        Ok(true)
    }
}

// =============================================================================
// Scripted gateway
// =============================================================================

#[derive(Default)]
struct GatewayState {
    intents: HashMap<String, PaymentIntent>,
    next_id: u32,
}

/// A [`PaymentGateway`] that keeps intents in memory.
///
/// Intents start as `requires_payment_method`; tests move them on with
/// [`FakeGateway::set_status`], standing in for the browser confirming.
#[derive(Clone, Default)]
pub struct FakeGateway {
    state: Arc<StdMutex<GatewayState>>,
    calls: Arc<AtomicUsize>,
    delay: Option<Duration>,
}

impl FakeGateway {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call sleeps this long before answering.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of gateway calls made so far.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn set_status(&self, intent_id: &str, status: IntentStatus) {
        if let Some(intent) = self.lock().intents.get_mut(intent_id) {
            intent.status = status;
        }
    }

    /// Register an intent directly, as if created elsewhere.
    pub fn insert(&self, intent: PaymentIntent) {
        self.lock().intents.insert(intent.id.clone(), intent);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, GatewayState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    async fn answer(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }
}

impl PaymentGateway for FakeGateway {
    async fn create_intent(&self, request: &CreateIntent) -> Result<PaymentIntent, GatewayError> {
        self.answer().await;

        let mut state = self.lock();
        state.next_id += 1;
        let id = format!("pi_test{}", state.next_id);
        let intent = PaymentIntent {
            client_secret: Some(format!("{id}_secret_test")),
            id: id.clone(),
            amount: request.amount_minor,
            currency: request.currency.clone(),
            status: IntentStatus::RequiresPaymentMethod,
            metadata: request.metadata.clone().into_iter().collect(),
        };
        state.intents.insert(id, intent.clone());
        Ok(intent)
    }

    async fn retrieve_intent(&self, intent_id: &str) -> Result<PaymentIntent, GatewayError> {
        self.answer().await;

        self.lock()
            .intents
            .get(intent_id)
            .cloned()
            .ok_or_else(|| GatewayError::Api {
                status: 404,
                message: format!("No such payment_intent: '{intent_id}'"),
            })
    }
}

// =============================================================================
// Deterministic randomness
// =============================================================================

/// Plays back scripted draws, then counts up from 1.
#[derive(Default)]
pub struct ScriptedRandom {
    script: StdMutex<VecDeque<u128>>,
    counter: AtomicU64,
}

impl ScriptedRandom {
    #[must_use]
    pub fn new(script: impl IntoIterator<Item = u128>) -> Self {
        Self {
            script: StdMutex::new(script.into_iter().collect()),
            counter: AtomicU64::new(0),
        }
    }
}

impl RandomSource for ScriptedRandom {
    fn next_u128(&self) -> u128 {
        let scripted = self
            .script
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .pop_front();
        scripted.unwrap_or_else(|| u128::from(self.counter.fetch_add(1, Ordering::SeqCst) + 1))
    }
}

// =============================================================================
// Fixtures
// =============================================================================

/// A valid checkout form for `email`.
///
/// # Panics
///
/// Never for a well-formed `email`.
#[must_use]
pub fn shipping_details(email: &str) -> ShippingDetails {
    ShippingDetailsInput {
        address: PostalAddressInput {
            full_name: "Ada Lovelace".to_owned(),
            phone: "555-0100".to_owned(),
            address_line_1: "12 Analytical Row".to_owned(),
            address_line_2: String::new(),
            city: "London".to_owned(),
            state: "Greater London".to_owned(),
            postal_code: "N1 9GU".to_owned(),
            country: "GB".to_owned(),
        },
        email: email.to_owned(),
        customer_notes: String::new(),
    }
    .validate()
    .expect("fixture details are valid")
}

/// Order number generator with the `ORD` prefix over `random`.
///
/// # Panics
///
/// Never; the prefix is valid.
#[must_use]
pub fn order_numbers(random: impl RandomSource + 'static) -> OrderNumberGenerator {
    OrderNumberGenerator::new("ORD", Arc::new(random)).expect("ORD is a valid prefix")
}

/// Checkout over the in-memory store and fake gateway, in USD.
#[must_use]
pub fn checkout(
    store: MemoryStore,
    gateway: FakeGateway,
    timeout: Duration,
) -> CheckoutService<MemoryStore, FakeGateway> {
    CheckoutService::new(
        store,
        gateway,
        order_numbers(ScriptedRandom::default()),
        "usd".to_owned(),
        timeout,
    )
}

/// Webhook verifier keyed with [`WEBHOOK_SECRET`] and a 300 s tolerance.
#[must_use]
pub fn webhook_verifier() -> WebhookVerifier {
    WebhookVerifier::new(
        SecretString::from(WEBHOOK_SECRET),
        Duration::from_secs(300),
    )
}

/// Reconciler over the in-memory store.
#[must_use]
pub fn reconciler(store: MemoryStore) -> WebhookReconciler<MemoryStore> {
    WebhookReconciler::new(store, webhook_verifier())
}

/// A gateway event body for `intent_id`.
#[must_use]
pub fn event_payload(event_type: &str, intent_id: &str) -> Vec<u8> {
    serde_json::json!({
        "id": "evt_test",
        "object": "event",
        "type": event_type,
        "data": { "object": { "id": intent_id, "object": "payment_intent" } }
    })
    .to_string()
    .into_bytes()
}
