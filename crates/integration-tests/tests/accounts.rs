//! Registration and the one-cart-per-user rule.

use sqlx::PgPool;

use tradepost_integration_tests::register;
use tradepost_storefront::services::auth::{AuthError, AuthService};

#[sqlx::test(migrations = "../storefront/migrations")]
#[ignore = "requires PostgreSQL"]
async fn test_duplicate_email_creates_nothing(pool: PgPool) {
    register(&pool, "shopper@example.com").await;

    let err = AuthService::new(&pool)
        .register("Shopper@Example.com", "Someone Else", "another good password")
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::UserAlreadyExists));

    let users: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM storefront.user")
        .fetch_one(&pool)
        .await
        .unwrap();
    let carts: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM storefront.cart")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!((users, carts), (1, 1));
}

#[sqlx::test(migrations = "../storefront/migrations")]
#[ignore = "requires PostgreSQL"]
async fn test_every_user_has_exactly_one_cart(pool: PgPool) {
    for email in ["a@example.com", "b@example.com", "c@example.com"] {
        let user = register(&pool, email).await;
        let owner: i32 = sqlx::query_scalar("SELECT user_id FROM storefront.cart WHERE id = $1")
            .bind(user.cart_id)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(owner, user.id.as_i32());
    }

    let without_one: i64 = sqlx::query_scalar(
        r"
        SELECT COUNT(*) FROM storefront.user u
        WHERE (SELECT COUNT(*) FROM storefront.cart c WHERE c.user_id = u.id) <> 1
        ",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(without_one, 0);
}

#[sqlx::test(migrations = "../storefront/migrations")]
#[ignore = "requires PostgreSQL"]
async fn test_login_messages_do_not_reveal_accounts(pool: PgPool) {
    register(&pool, "known@example.com").await;
    let auth = AuthService::new(&pool);

    let wrong_password = auth
        .authenticate("known@example.com", "not the password")
        .await
        .unwrap_err();
    let unknown_email = auth
        .authenticate("nobody@example.com", "not the password")
        .await
        .unwrap_err();
    assert_eq!(wrong_password.to_string(), unknown_email.to_string());

    let user = auth
        .authenticate("known@example.com", "correct horse battery")
        .await
        .unwrap();
    assert_eq!(user.email.as_str(), "known@example.com");
}
