//! Settlement and webhook handling against a real database.
//!
//! Checkouts are created directly through the repository, as if the
//! provider had already answered, so no network is needed.

use secrecy::SecretString;
use sqlx::PgPool;

use tradepost_core::{CheckoutId, CheckoutStatus, ProductId};
use tradepost_integration_tests::{
    WEBHOOK_SECRET, insert_product, offline_payments, register, sign_webhook, stock_of,
};
use tradepost_storefront::db::{CartRepository, CheckoutRepository, ProductRepository};
use tradepost_storefront::models::User;
use tradepost_storefront::payments::webhook::unix_now;
use tradepost_storefront::services::cart::CartService;
use tradepost_storefront::services::checkout::{
    CheckoutError, CheckoutService, EventOutcome, SettleOutcome,
};

const BASE_URL: &str = "http://localhost:3000";

/// Put `quantity` of a product in the cart and open a checkout for it.
async fn checkout_for(
    pool: &PgPool,
    user: &User,
    product: ProductId,
    quantity: &str,
    session_id: &str,
) -> CheckoutId {
    let carts = CartService::new(pool);
    let line = carts.add_item(user.id, product).await.unwrap();
    carts
        .set_quantity(user.id, line.goods_id, quantity)
        .await
        .unwrap();

    let lines = CartRepository::new(pool).lines(user.cart_id).await.unwrap();
    let checkouts = CheckoutRepository::new(pool);
    let id = checkouts
        .create_pending(user.id, user.cart_id, lines.lines(), lines.total())
        .await
        .unwrap();
    checkouts
        .attach_session(id, session_id, "https://pay.example/session")
        .await
        .unwrap();
    id
}

/// A checkout session event body for `session_id`.
fn session_event(event_id: &str, event_type: &str, session_id: &str, payment_status: &str) -> String {
    serde_json::json!({
        "id": event_id,
        "type": event_type,
        "data": { "object": { "id": session_id, "payment_status": payment_status }}
    })
    .to_string()
}

async fn status_of(pool: &PgPool, id: CheckoutId) -> CheckoutStatus {
    CheckoutRepository::new(pool)
        .get(id)
        .await
        .unwrap()
        .unwrap()
        .status
}

#[sqlx::test(migrations = "../storefront/migrations")]
#[ignore = "requires PostgreSQL"]
async fn test_settlement_decrements_stock_and_empties_cart(pool: PgPool) {
    let user = register(&pool, "shopper@example.com").await;
    let product = insert_product(&pool, "Canvas Tote", 2450, 10).await;
    let id = checkout_for(&pool, &user, product, "3", "cs_test_settle").await;

    let payments = offline_payments();
    let service = CheckoutService::new(&pool, &payments, BASE_URL);

    assert_eq!(
        service.settle("cs_test_settle").await.unwrap(),
        SettleOutcome::Settled(id)
    );
    assert_eq!(stock_of(&pool, product).await, 7);
    assert!(CartService::new(&pool).view(user.id).await.unwrap().lines.is_empty());
    assert_eq!(status_of(&pool, id).await, CheckoutStatus::Settled);

    // A second confirmation changes nothing.
    assert_eq!(
        service.settle("cs_test_settle").await.unwrap(),
        SettleOutcome::AlreadySettled(id)
    );
    assert_eq!(stock_of(&pool, product).await, 7);
}

#[sqlx::test(migrations = "../storefront/migrations")]
#[ignore = "requires PostgreSQL"]
async fn test_short_stock_rolls_back_whole_settlement(pool: PgPool) {
    let user = register(&pool, "shopper@example.com").await;
    let plenty = insert_product(&pool, "Enamel Mug", 1200, 20).await;
    let scarce = insert_product(&pool, "Waxed Weekender", 8900, 5).await;
    let carts = CartService::new(&pool);
    carts.add_item(user.id, plenty).await.unwrap();
    let id = checkout_for(&pool, &user, scarce, "3", "cs_test_short").await;

    // Stock drops after checkout began.
    ProductRepository::new(&pool).set_stock(scarce, 2).await.unwrap();

    let payments = offline_payments();
    let err = CheckoutService::new(&pool, &payments, BASE_URL)
        .settle("cs_test_short")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CheckoutError::InsufficientStock { available: 2, .. }
    ));

    assert_eq!(stock_of(&pool, plenty).await, 20);
    assert_eq!(stock_of(&pool, scarce).await, 2);
    assert_eq!(carts.view(user.id).await.unwrap().lines.len(), 2);
    assert_eq!(status_of(&pool, id).await, CheckoutStatus::AwaitingPayment);
}

#[sqlx::test(migrations = "../storefront/migrations")]
#[ignore = "requires PostgreSQL"]
async fn test_lines_added_after_checkout_stay_in_cart(pool: PgPool) {
    let user = register(&pool, "shopper@example.com").await;
    let tote = insert_product(&pool, "Canvas Tote", 2450, 10).await;
    let mug = insert_product(&pool, "Enamel Mug", 1200, 10).await;
    checkout_for(&pool, &user, tote, "1", "cs_test_later").await;
    CartService::new(&pool).add_item(user.id, mug).await.unwrap();

    let payments = offline_payments();
    CheckoutService::new(&pool, &payments, BASE_URL)
        .settle("cs_test_later")
        .await
        .unwrap();

    let view = CartService::new(&pool).view(user.id).await.unwrap();
    assert_eq!(view.lines.len(), 1);
    assert_eq!(view.lines[0].product_id, mug);
    assert_eq!(stock_of(&pool, mug).await, 10);
}

#[sqlx::test(migrations = "../storefront/migrations")]
#[ignore = "requires PostgreSQL"]
async fn test_units_added_after_checkout_stay_on_line(pool: PgPool) {
    let user = register(&pool, "shopper@example.com").await;
    let tote = insert_product(&pool, "Canvas Tote", 2450, 10).await;
    checkout_for(&pool, &user, tote, "2", "cs_test_raised").await;

    let carts = CartService::new(&pool);
    let goods_id = carts.view(user.id).await.unwrap().lines[0].goods_id;
    carts.set_quantity(user.id, goods_id, "5").await.unwrap();

    let payments = offline_payments();
    CheckoutService::new(&pool, &payments, BASE_URL)
        .settle("cs_test_raised")
        .await
        .unwrap();

    assert_eq!(stock_of(&pool, tote).await, 8);
    let view = carts.view(user.id).await.unwrap();
    assert_eq!(view.lines.len(), 1);
    assert_eq!(view.lines[0].goods_id, goods_id);
    assert_eq!(view.lines[0].quantity.get(), 3);
}

#[sqlx::test(migrations = "../storefront/migrations")]
#[ignore = "requires PostgreSQL"]
async fn test_cancel_abandons_and_keeps_cart(pool: PgPool) {
    let user = register(&pool, "shopper@example.com").await;
    let product = insert_product(&pool, "Canvas Tote", 2450, 10).await;
    let id = checkout_for(&pool, &user, product, "2", "cs_test_cancel").await;

    let payments = offline_payments();
    let service = CheckoutService::new(&pool, &payments, BASE_URL);
    service.abandon(user.id, "cs_test_cancel").await.unwrap();

    assert_eq!(status_of(&pool, id).await, CheckoutStatus::Abandoned);
    assert_eq!(CartService::new(&pool).view(user.id).await.unwrap().lines.len(), 1);
    assert_eq!(stock_of(&pool, product).await, 10);

    // An abandoned checkout cannot settle.
    assert!(matches!(
        service.settle("cs_test_cancel").await,
        Err(CheckoutError::InvalidTransition(_))
    ));
}

#[sqlx::test(migrations = "../storefront/migrations")]
#[ignore = "requires PostgreSQL"]
async fn test_webhook_settles_once(pool: PgPool) {
    let user = register(&pool, "shopper@example.com").await;
    let product = insert_product(&pool, "Canvas Tote", 2450, 10).await;
    let id = checkout_for(&pool, &user, product, "3", "cs_test_hook").await;

    let body = serde_json::json!({
        "id": "evt_test_completed",
        "type": "checkout.session.completed",
        "data": { "object": {
            "id": "cs_test_hook",
            "payment_status": "paid",
            "status": "complete",
            "client_reference_id": id.to_string(),
        }}
    })
    .to_string();
    let secret = SecretString::from(WEBHOOK_SECRET);
    let header = sign_webhook(&body, &secret, unix_now().unwrap());

    let payments = offline_payments();
    let service = CheckoutService::new(&pool, &payments, BASE_URL);

    assert_eq!(
        service.handle_event(&body, &header, &secret).await.unwrap(),
        EventOutcome::Settled(SettleOutcome::Settled(id))
    );
    assert_eq!(
        service.handle_event(&body, &header, &secret).await.unwrap(),
        EventOutcome::Duplicate
    );
    assert_eq!(stock_of(&pool, product).await, 7);
}

#[sqlx::test(migrations = "../storefront/migrations")]
#[ignore = "requires PostgreSQL"]
async fn test_webhook_with_bad_signature_changes_nothing(pool: PgPool) {
    let user = register(&pool, "shopper@example.com").await;
    let product = insert_product(&pool, "Canvas Tote", 2450, 10).await;
    let id = checkout_for(&pool, &user, product, "1", "cs_test_forged").await;

    let body = serde_json::json!({
        "id": "evt_test_forged",
        "type": "checkout.session.completed",
        "data": { "object": { "id": "cs_test_forged", "payment_status": "paid" }}
    })
    .to_string();
    let wrong = SecretString::from("whsec_some_other_endpoint_secret_9x");
    let header = sign_webhook(&body, &wrong, unix_now().unwrap());

    let payments = offline_payments();
    let result = CheckoutService::new(&pool, &payments, BASE_URL)
        .handle_event(&body, &header, &SecretString::from(WEBHOOK_SECRET))
        .await;

    assert!(matches!(result, Err(CheckoutError::Provider(_))));
    assert_eq!(status_of(&pool, id).await, CheckoutStatus::AwaitingPayment);
    assert_eq!(stock_of(&pool, product).await, 10);
}

#[sqlx::test(migrations = "../storefront/migrations")]
#[ignore = "requires PostgreSQL"]
async fn test_expired_session_webhook_abandons(pool: PgPool) {
    let user = register(&pool, "shopper@example.com").await;
    let product = insert_product(&pool, "Canvas Tote", 2450, 10).await;
    let id = checkout_for(&pool, &user, product, "1", "cs_test_expired").await;

    let body = serde_json::json!({
        "id": "evt_test_expired",
        "type": "checkout.session.expired",
        "data": { "object": { "id": "cs_test_expired", "payment_status": "unpaid" }}
    })
    .to_string();
    let secret = SecretString::from(WEBHOOK_SECRET);
    let header = sign_webhook(&body, &secret, unix_now().unwrap());

    let payments = offline_payments();
    assert_eq!(
        CheckoutService::new(&pool, &payments, BASE_URL)
            .handle_event(&body, &header, &secret)
            .await
            .unwrap(),
        EventOutcome::Abandoned
    );
    assert_eq!(status_of(&pool, id).await, CheckoutStatus::Abandoned);
}

#[sqlx::test(migrations = "../storefront/migrations")]
#[ignore = "requires PostgreSQL"]
async fn test_webhook_for_unknown_session_is_acknowledged(pool: PgPool) {
    let secret = SecretString::from(WEBHOOK_SECRET);
    let payments = offline_payments();
    let service = CheckoutService::new(&pool, &payments, BASE_URL);

    for body in [
        session_event("evt_test_stranger", "checkout.session.completed", "cs_not_ours", "paid"),
        session_event("evt_test_stranger_exp", "checkout.session.expired", "cs_not_ours", "unpaid"),
    ] {
        let header = sign_webhook(&body, &secret, unix_now().unwrap());
        assert_eq!(
            service.handle_event(&body, &header, &secret).await.unwrap(),
            EventOutcome::Ignored
        );
        // Recorded, so a redelivery is a no-op.
        assert_eq!(
            service.handle_event(&body, &header, &secret).await.unwrap(),
            EventOutcome::Duplicate
        );
    }
}

#[sqlx::test(migrations = "../storefront/migrations")]
#[ignore = "requires PostgreSQL"]
async fn test_payment_for_abandoned_checkout_is_acknowledged(pool: PgPool) {
    let user = register(&pool, "shopper@example.com").await;
    let product = insert_product(&pool, "Canvas Tote", 2450, 10).await;
    let id = checkout_for(&pool, &user, product, "2", "cs_test_late").await;

    let payments = offline_payments();
    let service = CheckoutService::new(&pool, &payments, BASE_URL);
    service.abandon(user.id, "cs_test_late").await.unwrap();

    let body = session_event("evt_test_late", "checkout.session.completed", "cs_test_late", "paid");
    let secret = SecretString::from(WEBHOOK_SECRET);
    let header = sign_webhook(&body, &secret, unix_now().unwrap());

    assert_eq!(
        service.handle_event(&body, &header, &secret).await.unwrap(),
        EventOutcome::Ignored
    );
    assert_eq!(
        service.handle_event(&body, &header, &secret).await.unwrap(),
        EventOutcome::Duplicate
    );
    assert_eq!(status_of(&pool, id).await, CheckoutStatus::Abandoned);
    assert_eq!(stock_of(&pool, product).await, 10);
    assert_eq!(CartService::new(&pool).view(user.id).await.unwrap().lines.len(), 1);
}
