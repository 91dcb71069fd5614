use super::{MetadataSource, SearchFuture, leading_year, query_words};
use crate::CandidateRecord;
use crate::rate_limit::{LookupError, check_response_status};
use std::collections::BTreeMap;
use std::time::Duration;

/// arXiv export API (Atom feed).
pub struct Arxiv;

impl MetadataSource for Arxiv {
    fn name(&self) -> &str {
        "arXiv"
    }

    fn search_by_title<'a>(
        &'a self,
        title: &'a str,
        limit: usize,
        client: &'a reqwest::Client,
        timeout: Duration,
    ) -> SearchFuture<'a> {
        Box::pin(async move {
            let query = query_words(title, 12);
            let url = format!(
                "https://export.arxiv.org/api/query?search_query=ti:%22{}%22&start=0&max_results={}",
                urlencoding::encode(&query),
                limit
            );

            let resp = client.get(&url).timeout(timeout).send().await?;
            check_response_status(&resp)?;

            let body = resp.text().await?;
            parse_arxiv_response(&body, limit)
        })
    }
}

#[derive(Default)]
struct EntryFields {
    id: String,
    title: String,
    authors: Vec<String>,
    published: String,
    link: String,
}

impl EntryFields {
    fn into_candidate(self) -> Option<CandidateRecord> {
        let title = crate::normalize::collapse_whitespace(&self.title);
        if title.is_empty() {
            return None;
        }
        let source_id = self
            .id
            .trim()
            .rsplit("/abs/")
            .next()
            .unwrap_or_default()
            .to_string();
        let mut extra = BTreeMap::new();
        let url = if self.link.is_empty() {
            self.id.trim().to_string()
        } else {
            self.link
        };
        if !url.is_empty() {
            extra.insert("url".to_string(), url);
        }
        Some(CandidateRecord {
            title,
            authors: self.authors,
            year: leading_year(self.published.trim()),
            source_id,
            source: "arXiv".to_string(),
            extra,
        })
    }
}

/// Parse an arXiv Atom feed into candidate records.
pub(crate) fn parse_arxiv_response(
    xml: &str,
    limit: usize,
) -> Result<Vec<CandidateRecord>, LookupError> {
    use quick_xml::Reader;
    use quick_xml::events::Event;

    let mut reader = Reader::from_str(xml);

    #[derive(PartialEq)]
    enum Field {
        None,
        Id,
        Title,
        Published,
        Name,
    }

    let mut in_entry = false;
    let mut in_author = false;
    let mut field = Field::None;
    let mut current = EntryFields::default();
    let mut current_name = String::new();
    let mut candidates = Vec::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match e.local_name().as_ref() {
                b"entry" => {
                    in_entry = true;
                    current = EntryFields::default();
                }
                b"id" if in_entry && !in_author => field = Field::Id,
                b"title" if in_entry => field = Field::Title,
                b"published" if in_entry => field = Field::Published,
                b"author" if in_entry => {
                    in_author = true;
                    current_name.clear();
                }
                b"name" if in_author => field = Field::Name,
                _ => {}
            },
            Ok(Event::Empty(ref e)) => {
                if e.local_name().as_ref() == b"link" && in_entry {
                    let mut href = String::new();
                    let mut is_alternate = false;
                    for attr in e.attributes().flatten() {
                        match attr.key.as_ref() {
                            b"href" => href = String::from_utf8_lossy(&attr.value).to_string(),
                            b"rel" => is_alternate = attr.value.as_ref() == b"alternate",
                            _ => {}
                        }
                    }
                    if is_alternate && current.link.is_empty() {
                        current.link = href;
                    }
                }
            }
            Ok(Event::Text(ref e)) => {
                let text = e.unescape().unwrap_or_default();
                match field {
                    Field::Id => current.id.push_str(&text),
                    Field::Title => current.title.push_str(&text),
                    Field::Published => current.published.push_str(&text),
                    Field::Name => current_name.push_str(&text),
                    Field::None => {}
                }
            }
            Ok(Event::End(ref e)) => match e.local_name().as_ref() {
                b"entry" => {
                    in_entry = false;
                    if let Some(c) = std::mem::take(&mut current).into_candidate() {
                        candidates.push(c);
                        if candidates.len() >= limit {
                            break;
                        }
                    }
                }
                b"author" => {
                    let name = current_name.trim();
                    if !name.is_empty() {
                        current.authors.push(name.to_string());
                    }
                    in_author = false;
                }
                b"id" | b"title" | b"published" | b"name" => field = Field::None,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(LookupError::Malformed(format!("XML parse error: {}", e))),
            _ => {}
        }
        buf.clear();
    }

    Ok(candidates)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>ArXiv Query: search_query=ti:"attention"</title>
  <id>http://arxiv.org/api/query</id>
  <entry>
    <id>http://arxiv.org/abs/1706.03762v7</id>
    <published>2017-06-12T17:57:34Z</published>
    <title>Attention Is All
      You Need</title>
    <author><name>Ashish Vaswani</name></author>
    <author><name>Noam Shazeer</name></author>
    <link href="http://arxiv.org/abs/1706.03762v7" rel="alternate" type="text/html"/>
    <link title="pdf" href="http://arxiv.org/pdf/1706.03762v7" rel="related" type="application/pdf"/>
  </entry>
  <entry>
    <id>http://arxiv.org/abs/2001.00001v1</id>
    <published>2020-01-01T00:00:00Z</published>
    <title>Second Paper</title>
    <author><name>Jane Roe</name></author>
  </entry>
</feed>"#;

    #[test]
    fn parses_entries() {
        let candidates = parse_arxiv_response(FEED, 5).unwrap();
        assert_eq!(candidates.len(), 2);
        let first = &candidates[0];
        assert_eq!(first.title, "Attention Is All You Need");
        assert_eq!(first.authors, vec!["Ashish Vaswani", "Noam Shazeer"]);
        assert_eq!(first.year, Some(2017));
        assert_eq!(first.source_id, "1706.03762v7");
        assert_eq!(first.extra["url"], "http://arxiv.org/abs/1706.03762v7");
        assert_eq!(
            candidates[1].extra["url"],
            "http://arxiv.org/abs/2001.00001v1"
        );
    }

    #[test]
    fn feed_title_is_not_a_candidate() {
        let candidates = parse_arxiv_response(FEED, 5).unwrap();
        assert!(candidates.iter().all(|c| !c.title.starts_with("ArXiv Query")));
    }

    #[test]
    fn respects_limit() {
        assert_eq!(parse_arxiv_response(FEED, 1).unwrap().len(), 1);
    }

    #[test]
    fn empty_feed() {
        let xml = r#"<feed xmlns="http://www.w3.org/2005/Atom"><title>q</title></feed>"#;
        assert!(parse_arxiv_response(xml, 5).unwrap().is_empty());
    }
}
