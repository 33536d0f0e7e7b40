use sqlx::PgPool;

pub async fn create_pool(database_url: &str) -> anyhow::Result<PgPool> {
    // SQLx with native-tls uses TLS automatically when DATABASE_URL carries
    // sslmode=require. For production, make sure it does.
    let pool = PgPool::connect(database_url).await?;

    if !database_url.contains("sslmode=require")
        && !database_url.contains("localhost")
        && !database_url.contains("127.0.0.1")
    {
        tracing::warn!("Connecting to remote database without explicit sslmode. Consider adding sslmode=require");
    }

    Ok(pool)
}

pub async fn run_migrations(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}
