//! Order ledger and address book against a real database.
//!
//! Each test gets a fresh database from `#[sqlx::test]`; run with
//! `DATABASE_URL` pointing at a Postgres server and `--ignored`.

use std::time::Duration;

use chrono::{TimeZone, Utc};
use sqlx::PgPool;

use shopclub_core::{
    CheckoutError, Email, Money, PaymentStatus, PostalAddress, ProductId, UserId,
};
use shopclub_integration_tests::{
    FakeGateway, ScriptedRandom, event_payload, order_numbers, shipping_details, webhook_verifier,
};
use shopclub_storefront::db::products::ProductSeed;
use shopclub_storefront::db::{
    AddressRepository, CartRepository, OrderRepository, PgStore, ProductRepository,
    RepositoryError, UserRepository,
};
use shopclub_storefront::payments::IntentStatus;
use shopclub_storefront::services::{CheckoutService, ReconcileOutcome, WebhookReconciler};

async fn user(pool: &PgPool, email: &str) -> UserId {
    UserRepository::new(pool)
        .find_or_create(&Email::parse(email).expect("valid email"))
        .await
        .expect("user created")
        .id
}

async fn product(pool: &PgPool, name: &str, price_cents: i64, stock: u32) -> ProductId {
    ProductRepository::new(pool)
        .upsert_by_slug(&ProductSeed {
            name: name.to_owned(),
            slug: name.to_lowercase(),
            description: String::new(),
            price: Money::from_minor_units(price_cents),
            stock,
        })
        .await
        .expect("product saved")
        .id
}

fn service(pool: &PgPool, gateway: &FakeGateway) -> CheckoutService<PgStore, FakeGateway> {
    CheckoutService::new(
        PgStore::new(pool.clone()),
        gateway.clone(),
        order_numbers(ScriptedRandom::default()),
        "usd".to_owned(),
        Duration::from_secs(2),
    )
}

async fn confirmed_intent(
    checkout: &CheckoutService<PgStore, FakeGateway>,
    gateway: &FakeGateway,
    user: UserId,
    email: &str,
) -> String {
    let created = checkout
        .create_payment_intent(user, &Email::parse(email).expect("valid email"))
        .await
        .expect("intent created");
    gateway.set_status(&created.intent_id, IntentStatus::Succeeded);
    created.intent_id
}

fn address(name: &str) -> PostalAddress {
    PostalAddress {
        full_name: name.to_owned(),
        ..shipping_details("ada@example.com").address
    }
}

#[sqlx::test(migrations = "../storefront/migrations")]
#[ignore = "Requires PostgreSQL (DATABASE_URL)"]
async fn test_checkout_commits_order_and_stock(pool: PgPool) {
    let ada = user(&pool, "ada@example.com").await;
    let widget = product(&pool, "Widget", 999, 5).await;
    CartRepository::new(&pool)
        .put(ada, widget, 3)
        .await
        .expect("cart line saved");

    let gateway = FakeGateway::new();
    let checkout = service(&pool, &gateway);
    let created = checkout
        .create_payment_intent(ada, &Email::parse("ada@example.com").expect("valid email"))
        .await
        .expect("intent created");
    gateway.set_status(&created.intent_id, IntentStatus::Succeeded);

    let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).single().expect("valid time");
    let order = checkout
        .place_order(ada, shipping_details("ada@example.com"), &created.intent_id, now)
        .await
        .expect("order placed");

    assert_eq!(order.total_amount, Money::from_minor_units(2997));
    assert_eq!(order.payment_status, PaymentStatus::Paid);
    assert!(order.paid_at.is_some());

    let stock = ProductRepository::new(&pool)
        .get_by_id(widget)
        .await
        .expect("query")
        .map(|p| p.stock);
    assert_eq!(stock, Some(2));
    assert_eq!(CartRepository::new(&pool).count(ada).await.expect("count"), 0);

    let orders = OrderRepository::new(&pool);
    let page = orders.list_for_user(ada, 1, 10).await.expect("history");
    assert_eq!(page.total, 1);
    assert_eq!(page.orders.first().map(|o| o.item_count), Some(3));

    let stored = orders
        .find_for_user(ada, &order.order_number)
        .await
        .expect("query")
        .expect("order visible to its owner");
    assert_eq!(stored.items.len(), 1);

    let grace = user(&pool, "grace@example.com").await;
    assert!(
        orders
            .find_for_user(grace, &order.order_number)
            .await
            .expect("query")
            .is_none()
    );
}

#[sqlx::test(migrations = "../storefront/migrations")]
#[ignore = "Requires PostgreSQL (DATABASE_URL)"]
async fn test_last_unit_sells_once_under_row_locks(pool: PgPool) {
    let ada = user(&pool, "ada@example.com").await;
    let grace = user(&pool, "grace@example.com").await;
    let gizmo = product(&pool, "Gizmo", 4999, 1).await;
    let carts = CartRepository::new(&pool);
    carts.put(ada, gizmo, 1).await.expect("cart line saved");
    carts.put(grace, gizmo, 1).await.expect("cart line saved");

    let gateway = FakeGateway::new();
    let checkout = service(&pool, &gateway);
    let ada_intent = confirmed_intent(&checkout, &gateway, ada, "ada@example.com").await;
    let grace_intent = confirmed_intent(&checkout, &gateway, grace, "grace@example.com").await;

    let now = Utc::now();
    let (a, b) = tokio::join!(
        checkout.place_order(ada, shipping_details("ada@example.com"), &ada_intent, now),
        checkout.place_order(grace, shipping_details("grace@example.com"), &grace_intent, now),
    );

    let outcomes = [a, b];
    assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(outcomes.iter().any(|r| matches!(
        r,
        Err(CheckoutError::StockConflict { available: 0, .. })
    )));

    let stock = ProductRepository::new(&pool)
        .get_by_id(gizmo)
        .await
        .expect("query")
        .map(|p| p.stock);
    assert_eq!(stock, Some(0));

    let orders: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM storefront.order")
        .fetch_one(&pool)
        .await
        .expect("count");
    assert_eq!(orders, 1);
    let items: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM storefront.order_item")
        .fetch_one(&pool)
        .await
        .expect("count");
    assert_eq!(items, 1);
}

#[sqlx::test(migrations = "../storefront/migrations")]
#[ignore = "Requires PostgreSQL (DATABASE_URL)"]
async fn test_webhook_pays_pending_order_once(pool: PgPool) {
    let ada = user(&pool, "ada@example.com").await;
    let widget = product(&pool, "Widget", 999, 5).await;
    CartRepository::new(&pool)
        .put(ada, widget, 1)
        .await
        .expect("cart line saved");

    let gateway = FakeGateway::new();
    let checkout = service(&pool, &gateway);
    let created = checkout
        .create_payment_intent(ada, &Email::parse("ada@example.com").expect("valid email"))
        .await
        .expect("intent created");
    gateway.set_status(&created.intent_id, IntentStatus::Processing);
    let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).single().expect("valid time");
    let order = checkout
        .place_order(ada, shipping_details("ada@example.com"), &created.intent_id, now)
        .await
        .expect("order placed");
    assert_eq!(order.payment_status, PaymentStatus::Pending);

    let reconciler = WebhookReconciler::new(PgStore::new(pool.clone()), webhook_verifier());
    let payload = event_payload("payment_intent.succeeded", &created.intent_id);
    let header = webhook_verifier()
        .signature_header(&payload, now.timestamp())
        .expect("header signs");

    let first = reconciler.handle(&payload, Some(&header), now).await.expect("applied");
    assert!(matches!(first, ReconcileOutcome::Transitioned { to: PaymentStatus::Paid, .. }));
    let second = reconciler.handle(&payload, Some(&header), now).await.expect("acknowledged");
    assert!(matches!(second, ReconcileOutcome::AlreadyApplied { .. }));

    let stored = OrderRepository::new(&pool)
        .find_by_number(&order.order_number)
        .await
        .expect("query")
        .expect("order exists");
    assert_eq!(stored.payment_status, PaymentStatus::Paid);
    assert_eq!(stored.paid_at, Some(now));
}

#[sqlx::test(migrations = "../storefront/migrations")]
#[ignore = "Requires PostgreSQL (DATABASE_URL)"]
async fn test_transition_rejects_illegal_and_stale_moves(pool: PgPool) {
    let ada = user(&pool, "ada@example.com").await;
    let widget = product(&pool, "Widget", 999, 5).await;
    CartRepository::new(&pool)
        .put(ada, widget, 1)
        .await
        .expect("cart line saved");

    let gateway = FakeGateway::new();
    let checkout = service(&pool, &gateway);
    let created = checkout
        .create_payment_intent(ada, &Email::parse("ada@example.com").expect("valid email"))
        .await
        .expect("intent created");
    gateway.set_status(&created.intent_id, IntentStatus::Succeeded);
    let order = checkout
        .place_order(ada, shipping_details("ada@example.com"), &created.intent_id, Utc::now())
        .await
        .expect("order placed");

    let orders = OrderRepository::new(&pool);
    let illegal = orders
        .transition(order.id, PaymentStatus::Paid, PaymentStatus::Pending, None)
        .await;
    assert!(matches!(illegal, Err(RepositoryError::Conflict(_))));

    let stale = orders
        .transition(order.id, PaymentStatus::Pending, PaymentStatus::Failed, None)
        .await
        .expect("query");
    assert!(!stale);

    let refunded = orders
        .transition(order.id, PaymentStatus::Paid, PaymentStatus::Refunded, None)
        .await
        .expect("query");
    assert!(refunded);
    let stored = orders
        .find_by_number(&order.order_number)
        .await
        .expect("query")
        .expect("order exists");
    assert_eq!(stored.payment_status, PaymentStatus::Refunded);
    assert_eq!(stored.paid_at, order.paid_at);
}

#[sqlx::test(migrations = "../storefront/migrations")]
#[ignore = "Requires PostgreSQL (DATABASE_URL)"]
async fn test_one_default_address_per_user(pool: PgPool) {
    let ada = user(&pool, "ada@example.com").await;
    let grace = user(&pool, "grace@example.com").await;
    let addresses = AddressRepository::new(&pool);

    let home = addresses.create(ada, &address("Home"), true).await.expect("saved");
    let work = addresses.create(ada, &address("Work"), true).await.expect("saved");

    let default = addresses.default_for(ada).await.expect("query").expect("has default");
    assert_eq!(default.id, work.id);
    assert_eq!(
        addresses.list(ada).await.expect("query").iter().filter(|a| a.is_default).count(),
        1
    );

    assert!(addresses.set_default(ada, home.id).await.expect("query"));
    let default = addresses.default_for(ada).await.expect("query").expect("has default");
    assert_eq!(default.id, home.id);

    assert!(!addresses.set_default(grace, home.id).await.expect("query"));
    assert!(!addresses.delete(grace, home.id).await.expect("query"));
    assert!(addresses.default_for(ada).await.expect("query").is_some());
}

#[sqlx::test(migrations = "../storefront/migrations")]
#[ignore = "Requires PostgreSQL (DATABASE_URL)"]
async fn test_racing_default_change_is_a_conflict(pool: PgPool) {
    let ada = user(&pool, "ada@example.com").await;
    let addresses = AddressRepository::new(&pool);
    let home = addresses.create(ada, &address("Home"), false).await.expect("saved");
    let work = addresses.create(ada, &address("Work"), false).await.expect("saved");

    let mut rival = pool.begin().await.expect("begin");
    sqlx::query("UPDATE storefront.shipping_address SET is_default = TRUE WHERE id = $1")
        .bind(home.id)
        .execute(&mut *rival)
        .await
        .expect("rival update");

    let (outcome, ()) = tokio::join!(addresses.set_default(ada, work.id), async {
        tokio::time::sleep(Duration::from_millis(200)).await;
        rival.commit().await.expect("rival commit");
    });

    assert!(matches!(outcome, Err(RepositoryError::Conflict(_))));
    let default = addresses.default_for(ada).await.expect("query").expect("has default");
    assert_eq!(default.id, home.id);
}
