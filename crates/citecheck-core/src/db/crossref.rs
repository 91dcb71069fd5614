use super::{MetadataSource, SearchFuture, query_words};
use crate::CandidateRecord;
use crate::rate_limit::{LookupError, check_response_status};
use std::collections::BTreeMap;
use std::time::Duration;

/// CrossRef REST API (`/works?query.title=`).
pub struct CrossRef {
    /// Joins CrossRef's "polite pool" when set.
    pub mailto: Option<String>,
}

impl MetadataSource for CrossRef {
    fn name(&self) -> &str {
        "CrossRef"
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
            let mut url = format!(
                "https://api.crossref.org/works?query.title={}&rows={}&select=DOI,title,author,issued,container-title,URL",
                urlencoding::encode(&query),
                limit
            );

            let user_agent = if let Some(ref email) = self.mailto {
                url.push_str(&format!("&mailto={}", urlencoding::encode(email)));
                format!("citecheck/{} (mailto:{})", env!("CARGO_PKG_VERSION"), email)
            } else {
                format!("citecheck/{}", env!("CARGO_PKG_VERSION"))
            };

            let resp = client
                .get(&url)
                .header("User-Agent", user_agent)
                .timeout(timeout)
                .send()
                .await?;
            check_response_status(&resp)?;

            let data: serde_json::Value = resp.json().await?;
            parse_crossref_response(&data, limit)
        })
    }
}

/// Convert a CrossRef `/works` response into candidate records.
pub(crate) fn parse_crossref_response(
    data: &serde_json::Value,
    limit: usize,
) -> Result<Vec<CandidateRecord>, LookupError> {
    let items = data["message"]["items"]
        .as_array()
        .ok_or_else(|| LookupError::Malformed("missing message.items".into()))?;

    let mut candidates = Vec::new();
    for item in items.iter().take(limit) {
        let Some(found_title) = item["title"]
            .as_array()
            .and_then(|a| a.first())
            .and_then(|v| v.as_str())
            .filter(|t| !t.trim().is_empty())
        else {
            continue;
        };

        let authors: Vec<String> = item["author"]
            .as_array()
            .map(|arr| {
                arr.iter()
                    .filter_map(|a| {
                        let given = a["given"].as_str().unwrap_or("");
                        let family = a["family"].as_str().or_else(|| a["name"].as_str())?;
                        Some(format!("{} {}", given, family).trim().to_string())
                    })
                    .collect()
            })
            .unwrap_or_default();

        let year = item["issued"]["date-parts"]
            .get(0)
            .and_then(|p| p.get(0))
            .and_then(|y| y.as_i64())
            .map(|y| y as i32);

        let doi = item["DOI"].as_str().unwrap_or_default();
        let mut extra = BTreeMap::new();
        if !doi.is_empty() {
            extra.insert("doi".to_string(), doi.to_string());
            extra.insert("url".to_string(), format!("https://doi.org/{}", doi));
        }
        if let Some(venue) = item["container-title"]
            .as_array()
            .and_then(|a| a.first())
            .and_then(|v| v.as_str())
        {
            extra.insert("venue".to_string(), venue.to_string());
        }

        candidates.push(CandidateRecord {
            title: found_title.trim().to_string(),
            authors,
            year,
            source_id: doi.to_string(),
            source: "CrossRef".to_string(),
            extra,
        });
    }
    Ok(candidates)
}
