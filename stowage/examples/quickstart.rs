//! Cache-aside lookups over a SQLite table, with cursor pagination.
//!
//! ```sh
//! RUST_LOG=info,stowage::sql=info cargo run -p stowage --example quickstart
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use stowage::prelude::*;
use stowage::stowage_data::{build_page, Order};

#[derive(Debug, Clone, Default, Serialize, Deserialize, FromRow)]
struct Article {
    id: i64,
    title: String,
    author: Option<String>,
}

impl Entity for Article {
    fn table_name() -> &'static str {
        "articles"
    }

    fn columns() -> &'static [Column] {
        const COLUMNS: &[Column] = &[
            Column::new("id", ColumnType::BigInt).primary_key(),
            Column::new("title", ColumnType::Text),
            Column::new("author", ColumnType::Text).nullable(),
        ];
        COLUMNS
    }

    fn values(&self) -> Vec<Value> {
        vec![self.id.into(), self.title.clone().into(), self.author.clone().into()]
    }
}

async fn article(
    ctx: &Context,
    cache: &MemoryCache,
    repo: &SqlxRepository,
    id: i64,
) -> Result<Article, Box<dyn std::error::Error>> {
    let key = format!("article:{id}");
    match cache.get::<Article>(ctx, &key).await {
        Ok(hit) => return Ok(hit),
        Err(err) if is_not_found(&err) => {}
        Err(err) => return Err(err.into()),
    }

    let mut record = Article {
        id,
        ..Article::default()
    };
    repo.find_by_pk(ctx, &mut record).await?;
    cache.set_default(ctx, &key, &record).await?;
    Ok(record)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let mut config = StowageConfig::load("dev")?;
    if !config.contains_key("stowage.database.url") {
        config.set("stowage.database.url", stowage::ConfigValue::String(":memory:".into()));
        config.set("stowage.database.pool_max", stowage::ConfigValue::Integer(1));
    }

    let ctx = Context::background().with_timeout(Duration::from_secs(10));
    let cache = MemoryCache::new(config.section()?);
    let repo = SqlxRepository::connect(&config.section::<DatabaseConfig>()?).await?;
    repo.migrate(&ctx, &[Article::schema()]).await?;

    let articles: Vec<Article> = (1..=7)
        .map(|id| Article {
            id,
            title: format!("Post #{id}"),
            author: (id % 2 == 0).then(|| "tracy".to_string()),
        })
        .collect();
    repo.upsert(&ctx, &articles).await?;

    let first = article(&ctx, &cache, &repo, 3).await?;
    let again = article(&ctx, &cache, &repo, 3).await?;
    println!("loaded {:?}, cached copy {:?}", first.title, again.title);

    let limit = 3;
    let mut after: i64 = 0;
    let mut is_first_page = true;
    loop {
        let rows: Vec<Article> = repo
            .list(
                &ctx,
                &[
                    Criteria::filter(Condition::gt("id", after)),
                    Criteria::order_by("id", Order::Asc),
                    Criteria::limit(limit as u64 + 1),
                ],
            )
            .await?;
        let (cursor, page) = build_page(rows, is_first_page, limit, |a| a.id);
        println!(
            "page {:?}: {:?}",
            page.iter().map(|a| a.id).collect::<Vec<_>>(),
            cursor
        );
        let Some(token) = cursor.next_token() else { break };
        let (_, value) = stowage::stowage_data::decode_token(&token)?;
        after = value.parse()?;
        is_first_page = false;
    }

    cache.close().await?;
    repo.close().await;
    Ok(())
}
