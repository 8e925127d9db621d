// src/normalize/rss.rs
use super::{BodyLines, Rendered};
use crate::ingest::types::FeedArticle;

/// Longer summaries are left out of the message entirely.
pub const SUMMARY_MAX_CHARS: usize = 200;

fn published(article: &FeedArticle) -> String {
    match (article.published_at, article.published.as_deref()) {
        (Some(ts), _) => ts.format("%Y-%m-%d %H:%M UTC").to_string(),
        (None, Some(raw)) => raw.to_string(),
        (None, None) => String::new(),
    }
}

fn feed_name(article: &FeedArticle) -> &str {
    if article.feed_title.trim().is_empty() {
        "unknown feed"
    } else {
        article.feed_title.trim()
    }
}

fn article_title(article: &FeedArticle) -> &str {
    if article.title.trim().is_empty() {
        "(untitled)"
    } else {
        article.title.trim()
    }
}

fn push_article(body: &mut BodyLines, article: &FeedArticle) {
    body.push("Author", article.author.as_deref().unwrap_or_default());
    body.push("Link", &article.link);
    body.push("Published", &published(article));
    let summary = article.description.trim();
    if !summary.is_empty() && summary.chars().count() <= SUMMARY_MAX_CHARS {
        body.raw(String::new());
        body.raw(format!("Summary: {summary}"));
    }
}

fn article_meta(out: &mut Rendered, article: &FeedArticle) {
    out.meta("provider", "RSS");
    out.meta("feed", feed_name(article));
    out.meta("feed_url", article.feed_url.as_str());
    out.meta("link", article.link.as_str());
    out.meta("entry_id", article.entry_id());
}

pub(crate) fn render_entry(article: &FeedArticle) -> Rendered {
    let mut body = BodyLines::default();
    body.push("Feed", feed_name(article));
    body.push("Title", article_title(article));
    push_article(&mut body, article);

    let mut out = Rendered {
        title: format!("[{}] {}", feed_name(article), article_title(article)),
        body: body.finish(),
        ..Default::default()
    };
    article_meta(&mut out, article);
    out
}

/// One summary for a batch: the count plus the first article.
pub(crate) fn render_batch(articles: &[FeedArticle]) -> Rendered {
    let Some(first) = articles.first() else {
        let mut out = Rendered {
            title: "RSS update: no new articles".to_string(),
            ..Default::default()
        };
        out.meta("provider", "RSS");
        return out;
    };
    if articles.len() == 1 {
        return render_entry(first);
    }

    let mut body = BodyLines::default();
    body.push("Feed", feed_name(first));
    body.push("New articles", &articles.len().to_string());
    body.push("Latest", article_title(first));
    push_article(&mut body, first);

    let mut out = Rendered {
        title: format!("[{}] {} new articles", feed_name(first), articles.len()),
        body: body.finish(),
        ..Default::default()
    };
    article_meta(&mut out, first);
    out.meta("article_count", articles.len().to_string());
    out
}
