// src/ingest/feed.rs
//! RSS 2.0 and Atom documents into [`FeedArticle`]s.

use chrono::{DateTime, Utc};
use quick_xml::de::from_str;
use quick_xml::events::Event;
use quick_xml::Reader;
use serde::Deserialize;
use time::format_description::well_known::{Rfc2822, Rfc3339};
use time::OffsetDateTime;

use crate::ingest::normalize_text;
use crate::ingest::types::{FeedArticle, FetchError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedFeed {
    pub title: Option<String>,
    pub articles: Vec<FeedArticle>,
}

// --- RSS 2.0 ---

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    title: Option<String>,
    #[serde(rename = "item", default)]
    items: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    guid: Option<TextNode>,
    description: Option<String>,
    author: Option<String>,
    #[serde(rename = "dc:creator")]
    creator: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
}

// --- Atom ---

#[derive(Debug, Deserialize)]
struct AtomFeed {
    title: Option<TextNode>,
    #[serde(rename = "entry", default)]
    entries: Vec<AtomEntry>,
}

#[derive(Debug, Deserialize)]
struct AtomEntry {
    id: Option<String>,
    title: Option<TextNode>,
    #[serde(rename = "link", default)]
    links: Vec<AtomLink>,
    summary: Option<TextNode>,
    content: Option<TextNode>,
    author: Option<AtomAuthor>,
    published: Option<String>,
    updated: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AtomLink {
    #[serde(rename = "@href")]
    href: Option<String>,
    #[serde(rename = "@rel")]
    rel: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AtomAuthor {
    name: Option<String>,
}

/// Element whose attributes we ignore (`<guid isPermaLink>`, `<title type>`).
#[derive(Debug, Deserialize)]
struct TextNode {
    #[serde(rename = "$text", default)]
    value: String,
}

pub fn parse_feed(xml: &str, feed_url: &str) -> Result<ParsedFeed, FetchError> {
    let xml = scrub_html_entities_for_xml(xml);
    match root_element(&xml).as_deref() {
        Some("rss") => {
            let rss: Rss = from_str(&xml).map_err(|e| FetchError::Malformed(e.to_string()))?;
            Ok(from_rss(rss, feed_url))
        }
        Some("feed") => {
            let feed: AtomFeed =
                from_str(&xml).map_err(|e| FetchError::Malformed(e.to_string()))?;
            Ok(from_atom(feed, feed_url))
        }
        Some(other) => Err(FetchError::Malformed(format!(
            "unsupported root element <{other}>"
        ))),
        None => Err(FetchError::Malformed("no root element".to_string())),
    }
}

fn root_element(xml: &str) -> Option<String> {
    let mut reader = Reader::from_str(xml);
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                return Some(String::from_utf8_lossy(e.local_name().as_ref()).into_owned());
            }
            Ok(Event::Eof) | Err(_) => return None,
            _ => {}
        }
    }
}

fn from_rss(rss: Rss, feed_url: &str) -> ParsedFeed {
    let feed_title = clean_opt(rss.channel.title);
    let articles = rss
        .channel
        .items
        .into_iter()
        .map(|it| {
            let published = clean_opt(it.pub_date);
            FeedArticle {
                guid: it.guid.map(|g| g.value.trim().to_string()),
                title: clean_opt(it.title).unwrap_or_default(),
                link: it.link.map(|l| l.trim().to_string()).unwrap_or_default(),
                description: it.description.as_deref().map(normalize_text).unwrap_or_default(),
                author: clean_opt(it.creator.or(it.author)),
                published_at: published.as_deref().and_then(parse_date),
                published,
                feed_title: feed_title.clone().unwrap_or_default(),
                feed_url: feed_url.to_string(),
            }
        })
        .collect();
    ParsedFeed {
        title: feed_title,
        articles,
    }
}

fn from_atom(feed: AtomFeed, feed_url: &str) -> ParsedFeed {
    let feed_title = clean_opt(feed.title.map(|t| t.value));
    let articles = feed
        .entries
        .into_iter()
        .map(|e| {
            let link = e
                .links
                .iter()
                .find(|l| l.rel.as_deref().map_or(true, |r| r == "alternate"))
                .or_else(|| e.links.first())
                .and_then(|l| l.href.clone())
                .unwrap_or_default();
            let text = e.summary.or(e.content).map(|t| t.value).unwrap_or_default();
            let published = clean_opt(e.published.or(e.updated));
            FeedArticle {
                guid: e.id.map(|s| s.trim().to_string()),
                title: clean_opt(e.title.map(|t| t.value)).unwrap_or_default(),
                link: link.trim().to_string(),
                description: normalize_text(&text),
                author: clean_opt(e.author.and_then(|a| a.name)),
                published_at: published.as_deref().and_then(parse_date),
                published,
                feed_title: feed_title.clone().unwrap_or_default(),
                feed_url: feed_url.to_string(),
            }
        })
        .collect();
    ParsedFeed {
        title: feed_title,
        articles,
    }
}

fn clean_opt(s: Option<String>) -> Option<String> {
    s.map(|v| normalize_text(&v)).filter(|v| !v.is_empty())
}

/// RFC 2822 (RSS) or RFC 3339 (Atom).
pub fn parse_date(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    let odt = OffsetDateTime::parse(s, &Rfc2822)
        .or_else(|_| OffsetDateTime::parse(s, &Rfc3339))
        .ok()?;
    DateTime::from_timestamp(odt.unix_timestamp(), odt.nanosecond())
}

/// HTML entities that are not valid XML but common in feeds.
fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", "&#160;")
        .replace("&ndash;", "&#8211;")
        .replace("&mdash;", "&#8212;")
        .replace("&ldquo;", "&#8220;")
        .replace("&rdquo;", "&#8221;")
        .replace("&lsquo;", "&#8216;")
        .replace("&rsquo;", "&#8217;")
        .replace("&hellip;", "&#8230;")
}
