//! Timeline paging.
//!
//! Pages over post ids sorted newest first, six at a time, using post ids
//! as `before`/`after` cursors, and expands each id into a feed item.

use serde::Serialize;
use serde_json::{Map, Value, json};

use crate::config::SiteConfig;
use crate::front_matter::{MappingTable, key_for_property, project};
use crate::post::{Post, PostStore, StoreError};

/// Posts per page.
pub const PAGE_SIZE: usize = 6;

/// One page of ids with the cursors that reach its neighbours.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub ids: Vec<String>,
    /// Cursor for newer posts; absent on the first page.
    pub before: Option<String>,
    /// Cursor for older posts; absent on the last page.
    pub after: Option<String>,
}

/// Select the window of `ids` (sorted newest first) around the cursors.
///
/// `before` ends the window just ahead of the cursor, `after` starts it just
/// past; `after` wins when both are given. Cursors need not be present in
/// `ids`: they page from where they would sort.
pub fn page(ids: &[String], before: Option<&str>, after: Option<&str>) -> Page {
    if ids.is_empty() {
        return Page {
            ids: Vec::new(),
            before: None,
            after: None,
        };
    }

    let span = PAGE_SIZE as isize - 1;
    let mut start: isize = 0;
    let mut end: isize = span;

    if let Some(cursor) = before {
        // Ids strictly newer than the cursor.
        let position = ids.partition_point(|id| id.as_str() > cursor) as isize;
        end = position - 1;
        start = end - span;
    }

    if let Some(cursor) = after {
        // Ids at or newer than the cursor.
        let position = ids.partition_point(|id| id.as_str() >= cursor) as isize;
        start = position;
        end = start + span;
    }

    let last = ids.len() as isize - 1;
    let start = start.clamp(0, last) as usize;
    let end = end.clamp(0, last) as usize;

    Page {
        ids: ids[start..=end].to_vec(),
        before: (start > 0).then(|| ids[start].clone()),
        after: (end < ids.len() - 1).then(|| ids[end].clone()),
    }
}

/// Timeline paging cursors.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Paging {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub before: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after: Option<String>,
}

/// `q=timeline` response body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Timeline {
    pub items: Vec<Value>,
    pub paging: Paging,
}

/// Mapping table a stored post was written with.
///
/// Type and categories are recovered from the front-matter keys the `all`
/// layer fills from `type` and `category`.
pub fn mappings_for(site: &SiteConfig, post: &Post) -> MappingTable {
    let all = &site.front_matter.all;

    let post_type = key_for_property(all, "type")
        .and_then(|key| post.front_matter.get(key))
        .and_then(Value::as_str);

    let categories: Vec<&str> = key_for_property(all, "category")
        .and_then(|key| post.front_matter.get(key))
        .map(|value| match value {
            Value::Array(items) => items.iter().filter_map(Value::as_str).collect(),
            Value::String(s) => vec![s.as_str()],
            _ => Vec::new(),
        })
        .unwrap_or_default();

    site.mappings(post_type, &categories)
}

/// Feed item for a post: mapped fields plus `type`, `content` and `uid`.
pub fn item(site: &SiteConfig, post: &Post) -> Value {
    let mut item: Map<String, Value> = project(&mappings_for(site, post), &post.front_matter);
    item.insert("type".into(), json!("entry"));
    item.insert("content".into(), json!({ "text": post.content }));
    item.insert("uid".into(), json!(post.id));
    Value::Object(item)
}

/// Build one timeline page from the store.
pub async fn timeline(
    store: &dyn PostStore,
    site: &SiteConfig,
    before: Option<&str>,
    after: Option<&str>,
) -> Result<Timeline, StoreError> {
    let ids = store.list().await?;
    let page = page(&ids, before, after);

    let mut items = Vec::with_capacity(page.ids.len());
    for id in &page.ids {
        let post = store.read(id).await?;
        items.push(item(site, &post));
    }

    Ok(Timeline {
        items,
        paging: Paging {
            before: page.before,
            after: page.after,
        },
    })
}
