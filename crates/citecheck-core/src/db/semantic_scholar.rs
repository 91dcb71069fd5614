use super::{MetadataSource, SearchFuture, query_words};
use crate::CandidateRecord;
use crate::rate_limit::{LookupError, check_response_status};
use std::collections::BTreeMap;
use std::time::Duration;

/// Semantic Scholar Graph API paper search.
pub struct SemanticScholar {
    pub api_key: Option<String>,
}

impl MetadataSource for SemanticScholar {
    fn name(&self) -> &str {
        "Semantic Scholar"
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
                "https://api.semanticscholar.org/graph/v1/paper/search?query={}&limit={}&fields=title,authors,year,url,externalIds,venue",
                urlencoding::encode(&query),
                limit
            );

            let mut req = client
                .get(&url)
                .header("User-Agent", format!("citecheck/{}", env!("CARGO_PKG_VERSION")))
                .timeout(timeout);

            if let Some(ref key) = self.api_key {
                req = req.header("x-api-key", key);
            }

            let resp = req.send().await?;
            check_response_status(&resp)?;

            let data: serde_json::Value = resp.json().await?;
            parse_s2_response(&data, limit)
        })
    }
}

pub(crate) fn parse_s2_response(
    data: &serde_json::Value,
    limit: usize,
) -> Result<Vec<CandidateRecord>, LookupError> {
    // No matches come back as {"total": 0} without a data array
    let Some(results) = data["data"].as_array() else {
        if data.get("total").is_some() {
            return Ok(Vec::new());
        }
        return Err(LookupError::Malformed("missing data array".into()));
    };

    let candidates = results
        .iter()
        .take(limit)
        .filter_map(|item| {
            let found_title = item["title"].as_str().filter(|t| !t.trim().is_empty())?;
            let authors: Vec<String> = item["authors"]
                .as_array()
                .map(|arr| {
                    arr.iter()
                        .filter_map(|a| a["name"].as_str().map(String::from))
                        .collect()
                })
                .unwrap_or_default();

            let mut extra = BTreeMap::new();
            if let Some(url) = item["url"].as_str() {
                extra.insert("url".to_string(), url.to_string());
            }
            if let Some(doi) = item["externalIds"]["DOI"].as_str() {
                extra.insert("doi".to_string(), doi.to_string());
            }
            if let Some(venue) = item["venue"].as_str().filter(|v| !v.is_empty()) {
                extra.insert("venue".to_string(), venue.to_string());
            }

            Some(CandidateRecord {
                title: found_title.trim().to_string(),
                authors,
                year: item["year"].as_i64().map(|y| y as i32),
                source_id: item["paperId"].as_str().unwrap_or_default().to_string(),
                source: "Semantic Scholar".to_string(),
                extra,
            })
        })
        .collect();
    Ok(candidates)
}
