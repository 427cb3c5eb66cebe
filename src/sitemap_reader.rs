// Discover catalog entities by walking a sitemap index and each listed sub-sitemap.

use crate::config::UpdateConfig;
use crate::discovery::{dedup_entities, Discovery, DiscoveryError, DiscoveryResult};
use crate::models::Entity;
use crate::network::HttpClient;
use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use std::io::Cursor;
use std::sync::Arc;
use xml::reader::{EventReader, XmlEvent};

lazy_static! {
    static ref ENTITY_SLUG: Regex =
        Regex::new(r"/medicament/([^/]+)/?$").expect("valid slug pattern");
}

/// Where sitemap documents come from.
#[async_trait]
pub trait SitemapSource: Send + Sync {
    /// Body of a 2xx response for `url`; anything else is an error.
    async fn fetch_sitemap(&self, url: &str) -> Result<String, DiscoveryError>;
}

pub struct SitemapReader {
    http: Arc<HttpClient>,
    index_url: String,
    sitemap_filter: String,
}

impl SitemapReader {
    pub fn new(http: Arc<HttpClient>, config: &UpdateConfig) -> Self {
        Self {
            http,
            index_url: config.sitemap_index_url.clone(),
            sitemap_filter: config.sitemap_filter.clone(),
        }
    }
}

#[async_trait]
impl SitemapSource for SitemapReader {
    async fn fetch_sitemap(&self, url: &str) -> Result<String, DiscoveryError> {
        let result = self
            .http
            .fetch(url)
            .await
            .map_err(|source| DiscoveryError::Transport {
                url: url.to_string(),
                source,
            })?;

        if !result.is_success() {
            return Err(DiscoveryError::Status {
                url: url.to_string(),
                status: result.status_code,
            });
        }
        Ok(result.content)
    }
}

#[async_trait]
impl Discovery for SitemapReader {
    async fn discover(&self) -> Result<DiscoveryResult, DiscoveryError> {
        collect_entities(self, &self.index_url, &self.sitemap_filter).await
    }

    fn name(&self) -> &str {
        &self.index_url
    }
}

/// Read the index at `index_url`, then every sub-sitemap whose location contains `filter`.
///
/// Every sub-sitemap must succeed; a partial universe would look like mass absence.
pub async fn collect_entities<S>(source: &S, index_url: &str, filter: &str) -> Result<DiscoveryResult, DiscoveryError>
where
    S: SitemapSource + ?Sized,
{
    tracing::info!("Reading sitemap index {}", index_url);
    let index_xml = source.fetch_sitemap(index_url).await?;
    let sitemap_urls = parse_sitemap_index(&index_xml, filter).map_err(|message| DiscoveryError::Parse {
        url: index_url.to_string(),
        message,
    })?;
    tracing::info!("Sitemap index lists {} matching sitemap(s)", sitemap_urls.len());

    let mut all_entries = Vec::new();
    for sitemap_url in &sitemap_urls {
        let xml = source.fetch_sitemap(sitemap_url).await?;
        let entries = parse_url_set(&xml).map_err(|message| DiscoveryError::Parse {
            url: sitemap_url.clone(),
            message,
        })?;
        tracing::debug!("Parsed {}: {} entities", sitemap_url, entries.len());
        all_entries.extend(entries);
    }

    let raw_count = all_entries.len();
    let entities = dedup_entities(all_entries);
    if entities.len() < raw_count {
        tracing::debug!("Collapsed {} duplicate sitemap entries", raw_count - entities.len());
    }

    Ok(DiscoveryResult {
        entities,
        sitemap_count: sitemap_urls.len(),
    })
}

/// Extract the sub-sitemap locations whose URL contains `filter`.
pub fn parse_sitemap_index(xml: &str, filter: &str) -> Result<Vec<String>, String> {
    Ok(read_entries(xml, "sitemapindex", "sitemap")?
        .into_iter()
        .filter_map(|entry| entry.loc)
        .filter(|loc| loc.contains(filter))
        .collect())
}

/// Extract entities from a `<urlset>` document, skipping URLs that carry no entity slug.
///
/// `<lastmod>` is kept exactly as published (trimmed); it is only ever compared as text.
pub fn parse_url_set(xml: &str) -> Result<Vec<Entity>, String> {
    Ok(read_entries(xml, "urlset", "url")?
        .into_iter()
        .filter_map(|entry| {
            let url = entry.loc?;
            let slug = slug_from_url(&url)?;
            Some(Entity::new(slug, url, entry.lastmod))
        })
        .collect())
}

/// Raw child text of one `<url>` or `<sitemap>` element.
#[derive(Debug, Default)]
struct SitemapEntry {
    loc: Option<String>,
    lastmod: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Loc,
    LastMod,
}

/// Walk the document and collect `<item>` entries directly under `<root>`.
///
/// Element names are matched on their local part, so namespace prefixes are
/// accepted. A document whose root element never closes is rejected: the
/// reader would otherwise hand back a silently shortened list.
fn read_entries(xml: &str, root: &str, item: &str) -> Result<Vec<SitemapEntry>, String> {
    let mut entries = Vec::new();
    let mut depth = 0usize;
    let mut current: Option<SitemapEntry> = None;
    let mut field: Option<Field> = None;
    let mut text = String::new();
    let mut root_closed = false;

    for event in EventReader::new(Cursor::new(xml.as_bytes())) {
        match event.map_err(|e| e.to_string())? {
            XmlEvent::StartElement { name, .. } => {
                let local = name.local_name.as_str();
                match depth {
                    0 if local != root => {
                        return Err(format!("expected <{}> document, found <{}>", root, local));
                    }
                    1 if local == item => current = Some(SitemapEntry::default()),
                    2 if current.is_some() => {
                        field = match local {
                            "loc" => Some(Field::Loc),
                            "lastmod" => Some(Field::LastMod),
                            _ => None,
                        };
                        text.clear();
                    }
                    _ => {}
                }
                depth += 1;
            }
            XmlEvent::Characters(data) | XmlEvent::CData(data) => {
                if field.is_some() {
                    text.push_str(&data);
                }
            }
            XmlEvent::EndElement { .. } => {
                depth = depth.saturating_sub(1);
                match depth {
                    0 => root_closed = true,
                    1 => {
                        if let Some(entry) = current.take() {
                            entries.push(entry);
                        }
                    }
                    2 => {
                        if let (Some(f), Some(entry)) = (field.take(), current.as_mut()) {
                            let value = Some(text.trim().to_string()).filter(|v| !v.is_empty());
                            match f {
                                Field::Loc => entry.loc = value,
                                Field::LastMod => entry.lastmod = value,
                            }
                        }
                    }
                    _ => {}
                }
            }
            XmlEvent::EndDocument => break,
            _ => {}
        }
    }

    if !root_closed {
        return Err(format!("document has no closing </{}> (truncated or wrong type)", root));
    }
    Ok(entries)
}

/// `https://medicament.ma/medicament/doliprane-500mg/` -> `doliprane-500mg`
pub fn slug_from_url(url: &str) -> Option<String> {
    ENTITY_SLUG
        .captures(url)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
}
