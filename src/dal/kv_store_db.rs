use serde_json::Value;
use sqlx::{postgres::PgQueryResult, types::Json, PgPool};

pub async fn get_value(pool: &PgPool, key: &str) -> Result<Option<Value>, sqlx::Error> {
    let row: Option<(Json<Value>,)> = sqlx::query_as(
        r#"
        select
            value
        from
            kv_store
        where
            key = $1
        "#,
    )
    .bind(key)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|(Json(value),)| value))
}

pub async fn set_value(pool: &PgPool, key: &str, value: &Value) -> Result<PgQueryResult, sqlx::Error> {
    sqlx::query(
        r#"
        insert into kv_store
            (key, value)
        values
            ($1, $2)
        on conflict(key) do update set
            value = $2,
            updated_at = now()
        "#,
    )
    .bind(key)
    .bind(Json(value))
    .execute(pool)
    .await
}
