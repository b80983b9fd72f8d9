//! Tag assignments.
//!
//! Several tags may point at the same nickname; they are joined in
//! assignment order when read back as a lookup table.

use crate::error::Result;
use rollcall_core::Identifier;
use sqlx::{Pool, Sqlite};
use std::collections::HashMap;

/// Assign `tag` to a nickname. Assigning the same pair twice is a no-op.
pub async fn assign_tag(pool: &Pool<Sqlite>, tag: &str, nickname: &Identifier) -> Result<()> {
    let tag = tag.trim();
    if tag.is_empty() {
        return Ok(());
    }

    sqlx::query("INSERT OR IGNORE INTO tags (tag, nickname) VALUES (?, ?)")
        .bind(tag)
        .bind(nickname.as_str())
        .execute(pool)
        .await?;

    Ok(())
}

/// Lowercased nickname → comma-joined tags.
pub async fn load_tag_mapping(pool: &Pool<Sqlite>) -> Result<HashMap<String, String>> {
    let rows = sqlx::query_as::<_, (String, String)>("SELECT nickname, tag FROM tags ORDER BY seq")
        .fetch_all(pool)
        .await?;

    let mut grouped: HashMap<String, Vec<String>> = HashMap::new();
    for (nickname, tag) in rows {
        let key = nickname.trim().to_lowercase();
        if key.is_empty() {
            continue;
        }
        let tags = grouped.entry(key).or_default();
        if !tags.contains(&tag) {
            tags.push(tag);
        }
    }

    Ok(grouped
        .into_iter()
        .map(|(nick, tags)| (nick, tags.join(", ")))
        .collect())
}
