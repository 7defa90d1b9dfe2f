//! Request-facing operations.
//!
//! These functions sit between a web layer (router, templates, MIME
//! guessing; not part of this crate) and [`BrowseService`]. They take
//! string query parameters through [`RequestContext`], validate them before
//! touching any cache, and return render-ready values.
//!
//! | Operation | Parameters |
//! |-----------|------------|
//! | [`browse`] | `path` (optional, root when empty) |
//! | [`load_index`] | `path` |
//! | [`read_bytes`] | `file`, `base`, `end`, `k` |

use crate::error::{BrowseError, Result};
use crate::listing::Listing;
use crate::service::BrowseService;
use bytes::Bytes;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use tracing::warn;
use url::form_urlencoded;

/// Source of string query parameters.
pub trait RequestContext {
    /// Value of parameter `name`, if present.
    fn param(&self, name: &str) -> Option<&str>;
}

/// Destination for raw response bytes.
pub trait ResponseSink {
    /// Deliver `body`. `mime_hint` is the entry key (for example `jpg` or
    /// `json`) from which the web layer derives a content type.
    fn send(&mut self, body: Bytes, mime_hint: &str);
}

/// Map-backed [`RequestContext`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams(HashMap<String, String>);

impl QueryParams {
    /// Parse an `application/x-www-form-urlencoded` query string.
    pub fn parse(query: &str) -> Self {
        Self(
            form_urlencoded::parse(query.trim_start_matches('?').as_bytes())
                .into_owned()
                .collect(),
        )
    }

    /// Add or replace a parameter.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for QueryParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl RequestContext for QueryParams {
    fn param(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }
}

/// [`ResponseSink`] that keeps the last response in memory.
#[derive(Debug, Clone, Default)]
pub struct BufferedResponse {
    /// Response body
    pub body: Bytes,
    /// MIME hint passed with the body
    pub mime_hint: String,
}

impl ResponseSink for BufferedResponse {
    fn send(&mut self, body: Bytes, mime_hint: &str) {
        self.body = body;
        self.mime_hint = mime_hint.to_string();
    }
}

/// Link parameters for reading one entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryLink {
    /// Archive path relative to the data root
    pub file: String,
    /// Entry key
    pub key: String,
    /// Start offset, unpadded lowercase hex
    pub base: String,
    /// End offset, unpadded lowercase hex
    pub end: String,
}

impl EntryLink {
    /// Query string accepted by [`read_bytes`].
    pub fn query_string(&self) -> String {
        form_urlencoded::Serializer::new(String::new())
            .append_pair("file", &self.file)
            .append_pair("k", &self.key)
            .append_pair("base", &self.base)
            .append_pair("end", &self.end)
            .finish()
    }
}

/// Display text for an entry whose offsets overflow. Such entries get no
/// link.
pub const UNRESOLVED_CELL: &str = "(invalid offset)";

/// One rendered index row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedRow {
    /// Column name to display text (`id`, `idx`, and one per entry key)
    pub fields: BTreeMap<String, String>,
    /// Entry key to read link
    pub links: BTreeMap<String, EntryLink>,
}

/// Render-ready view of one index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndexView {
    /// Archive path relative to the data root
    pub archive_path: String,
    /// Sorted column names, taken from the first row
    pub columns: Vec<String>,
    /// Rows in index order
    pub rows: Vec<RenderedRow>,
}

impl IndexView {
    /// Whether there is nothing to show ("no items found").
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// List the directory named by the optional `path` parameter.
pub fn browse(service: &BrowseService, ctx: &impl RequestContext) -> Result<Listing> {
    service.list(ctx.param("path").unwrap_or_default())
}

/// Parent of a relative directory, `None` for the root.
pub fn parent_path(path: &str) -> Option<&str> {
    let path = path.trim_end_matches('/');
    if path.is_empty() {
        return None;
    }
    Some(path.rfind('/').map_or("", |i| &path[..i]))
}

/// Load and render the index named by the `path` parameter.
///
/// A malformed index is not a failure here: it renders as an empty view.
pub fn load_index(service: &BrowseService, ctx: &impl RequestContext) -> Result<IndexView> {
    let path = ctx
        .param("path")
        .ok_or_else(|| BrowseError::BadArgument("missing parameter 'path'".to_string()))?;

    let listing = match service.load_index(path) {
        Ok(listing) => listing,
        Err(e @ BrowseError::MalformedIndex { .. }) => {
            warn!("{}", e);
            return Ok(IndexView {
                archive_path: service.archive_path_for(path)?,
                ..IndexView::default()
            });
        }
        Err(e) => return Err(e),
    };

    let rows: Vec<RenderedRow> = listing
        .rows
        .iter()
        .map(|resolved| {
            let mut fields = BTreeMap::new();
            let mut links = BTreeMap::new();
            fields.insert("id".to_string(), resolved.row.row_id.clone());
            fields.insert("idx".to_string(), resolved.row.row_ordinal.to_string());
            for (key, range) in &resolved.ranges {
                let Some(range) = range else {
                    fields.insert(key.clone(), UNRESOLVED_CELL.to_string());
                    continue;
                };
                fields.insert(key.clone(), range.to_string());
                links.insert(
                    key.clone(),
                    EntryLink {
                        file: listing.archive_path.clone(),
                        key: key.clone(),
                        base: format!("{:x}", range.start),
                        end: format!("{:x}", range.end),
                    },
                );
            }
            RenderedRow { fields, links }
        })
        .collect();

    let columns = rows
        .first()
        .map(|row| row.fields.keys().cloned().collect())
        .unwrap_or_default();

    Ok(IndexView {
        archive_path: listing.archive_path,
        columns,
        rows,
    })
}

fn parse_hex(name: &str, value: &str) -> Result<u64> {
    let digits = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .unwrap_or(value);
    u64::from_str_radix(digits, 16)
        .map_err(|e| BrowseError::BadArgument(format!("parameter '{name}' is not hex ({value}): {e}")))
}

/// Read the byte range described by `file`, `base`, `end` and `k` into
/// `sink`.
///
/// All four parameters are checked before any cache is touched.
pub fn read_bytes(
    service: &BrowseService,
    ctx: &impl RequestContext,
    sink: &mut impl ResponseSink,
) -> Result<()> {
    let [file, base, end, key] = ["file", "base", "end", "k"].map(|name| ctx.param(name));
    let (Some(file), Some(base), Some(end), Some(key)) = (file, base, end, key) else {
        let missing: Vec<&str> = ["file", "base", "end", "k"]
            .into_iter()
            .filter(|name| ctx.param(name).is_none())
            .collect();
        return Err(BrowseError::BadArgument(format!(
            "missing parameter(s): {}",
            missing.join(", ")
        )));
    };

    let start = parse_hex("base", base)?;
    let end = parse_hex("end", end)?;
    let body = service.read(file, start, end)?;
    sink.send(body, key);
    Ok(())
}
