//! Seed the database with a demo catalog and a demo user.
//!
//! Products are upserted by slug and the user by email, so running the
//! command twice leaves one copy of each (with stock and prices reset).

use shopclub_core::{Email, Money};
use shopclub_storefront::db::products::ProductSeed;
use shopclub_storefront::db::{ProductRepository, UserRepository};

use super::{CommandError, connect};

/// Email of the demo account.
const DEMO_EMAIL: &str = "demo@shopclub.test";

fn demo_catalog() -> Vec<ProductSeed> {
    [
        ("Widget", "widget", "A dependable everyday widget.", 999, 50),
        ("Gadget", "gadget", "Does what a gadget should.", 2450, 20),
        ("Gizmo", "gizmo", "Small, clever and in short supply.", 4999, 3),
        ("Doohickey", "doohickey", "Currently sold out.", 1500, 0),
    ]
    .into_iter()
    .map(|(name, slug, description, cents, stock)| ProductSeed {
        name: name.to_owned(),
        slug: slug.to_owned(),
        description: description.to_owned(),
        price: Money::from_minor_units(cents),
        stock,
    })
    .collect()
}

/// Seed products and the demo user.
///
/// # Errors
///
/// Returns an error if the database is unreachable or an upsert fails.
pub async fn run() -> Result<(), CommandError> {
    let pool = connect().await?;

    let products = ProductRepository::new(&pool);
    for seed in demo_catalog() {
        let product = products.upsert_by_slug(&seed).await?;
        tracing::info!(
            id = %product.id,
            slug = %product.slug,
            price = %product.price,
            stock = product.stock,
            "Seeded product"
        );
    }

    let email = Email::parse(DEMO_EMAIL)?;
    let user = UserRepository::new(&pool).find_or_create(&email).await?;
    tracing::info!(id = %user.id, email = %user.email, "Seeded demo user");

    tracing::info!("Seeding complete!");
    Ok(())
}
