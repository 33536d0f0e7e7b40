use sqlx::PgPool;
use uuid::Uuid;

pub async fn seed_demo_user(pool: &PgPool) -> anyhow::Result<()> {
    // Check if data already exists
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
        .fetch_one(pool)
        .await?;

    if count > 0 {
        tracing::info!("User directory already has data, skipping seed");
        return Ok(());
    }

    tracing::info!("Creating demo user...");

    let user_id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO users (id, email, first_name)
        VALUES ($1, $2, $3)
        "#,
    )
    .bind(user_id)
    .bind("demo@example.com")
    .bind("Demo")
    .execute(pool)
    .await?;

    tracing::info!(%user_id, "Demo user created");
    Ok(())
}
