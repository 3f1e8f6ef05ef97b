// src/web/providers.rs
use crate::core::types::{Candidate, SourceKind};
use crate::error::ProviderError;
use crate::web::{HttpFetcher, LookupProvider, LookupQuery};
use async_trait::async_trait;
use reqwest::Url;
use serde_json::Value;

const WIKIPEDIA_SUMMARY_CONFIDENCE: f64 = 0.58;
const WIKIPEDIA_SEARCH_CONFIDENCE: f64 = 0.55;
const DUCKDUCKGO_ABSTRACT_CONFIDENCE: f64 = 0.50;
const DUCKDUCKGO_TOPIC_CONFIDENCE: f64 = 0.48;
const WIKTIONARY_CONFIDENCE: f64 = 0.45;
const BING_CONFIDENCE: f64 = 0.58;
const BING_SNIPPET_CHARS: usize = 180;
const MAX_TITLE_CHARS: usize = 120;

fn domain_of(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    Some(host.trim_start_matches("www.").to_string())
}

/// Text up to the first period.
fn first_clause(text: &str) -> &str {
    text.split('.').next().unwrap_or("").trim()
}

fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

fn web_candidate(text: &str, kind: SourceKind, confidence: f64, origin: Option<&String>) -> Option<Candidate> {
    let candidate = Candidate::new(text, kind, confidence)?;
    Some(match origin {
        Some(domain) => candidate.with_origin(domain.clone()),
        None => candidate,
    })
}

fn search_text(query: &LookupQuery) -> String {
    match query.primary_keyword() {
        Some(keyword) => format!("{} {}", query.acronym, keyword),
        None => query.acronym.clone(),
    }
}

/// `[query, [titles], [descriptions], [links]]`
fn opensearch_titles(value: &Value) -> Result<Vec<(String, String)>, ProviderError> {
    let array = value.as_array().ok_or_else(|| ProviderError::Malformed("opensearch: not an array".into()))?;
    let titles = array
        .get(1)
        .and_then(Value::as_array)
        .ok_or_else(|| ProviderError::Malformed("opensearch: missing titles".into()))?;
    let descriptions = array.get(2).and_then(Value::as_array);
    Ok(titles
        .iter()
        .enumerate()
        .filter_map(|(i, t)| {
            let title = t.as_str()?.trim().to_string();
            let desc = descriptions
                .and_then(|d| d.get(i))
                .and_then(Value::as_str)
                .unwrap_or("")
                .trim()
                .to_string();
            Some((title, desc))
        })
        .collect())
}

/// A title that is just the acronym again says nothing about its meaning.
fn is_echo(title: &str, acronym: &str) -> bool {
    title.eq_ignore_ascii_case(acronym)
}

pub struct WikipediaProvider {
    fetcher: HttpFetcher,
    api_url: String,
    rest_url: String,
    domain: Option<String>,
}

impl WikipediaProvider {
    pub fn new(fetcher: HttpFetcher, api_url: &str, rest_url: &str) -> Self {
        Self {
            fetcher,
            api_url: api_url.to_string(),
            rest_url: rest_url.trim_end_matches('/').to_string(),
            domain: domain_of(api_url),
        }
    }

    /// Page summary for the bare acronym. A redirect to a longer title is
    /// the best evidence; otherwise the first clause of the extract.
    async fn summary(&self, acronym: &str) -> Result<Vec<Candidate>, ProviderError> {
        let mut url = Url::parse(&self.rest_url).map_err(|e| ProviderError::Network(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| ProviderError::Network(format!("not a base URL: {}", self.rest_url)))?
            .pop_if_empty()
            .extend(["page", "summary", acronym]);
        let value = match self.fetcher.get_json(url.as_str(), &[], &[]).await {
            Ok(value) => value,
            Err(ProviderError::Status(404)) => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let page = value.as_object().ok_or_else(|| ProviderError::Malformed("summary: not an object".into()))?;
        if page.get("type").and_then(Value::as_str) == Some("disambiguation") {
            return Ok(Vec::new());
        }
        let title = page.get("title").and_then(Value::as_str).unwrap_or("").trim();
        let text = if !title.is_empty() && !is_echo(title, acronym) {
            title
        } else {
            let extract = page
                .get("extract")
                .or_else(|| page.get("description"))
                .and_then(Value::as_str)
                .unwrap_or("");
            first_clause(extract)
        };
        Ok(web_candidate(text, SourceKind::Wikipedia, WIKIPEDIA_SUMMARY_CONFIDENCE, self.domain.as_ref())
            .into_iter()
            .collect())
    }

    async fn opensearch(&self, query: &LookupQuery) -> Result<Vec<Candidate>, ProviderError> {
        let params = [
            ("action", "opensearch".to_string()),
            ("limit", "6".to_string()),
            ("namespace", "0".to_string()),
            ("format", "json".to_string()),
            ("search", search_text(query)),
        ];
        let value = self.fetcher.get_json(&self.api_url, &params, &[]).await?;
        Ok(opensearch_titles(&value)?
            .into_iter()
            .filter(|(title, _)| title.chars().count() <= MAX_TITLE_CHARS && !is_echo(title, &query.acronym))
            .filter_map(|(title, desc)| {
                let text = if desc.is_empty() { title } else { desc };
                web_candidate(&text, SourceKind::Wikipedia, WIKIPEDIA_SEARCH_CONFIDENCE, self.domain.as_ref())
            })
            .collect())
    }
}

#[async_trait]
impl LookupProvider for WikipediaProvider {
    fn name(&self) -> &'static str {
        "wikipedia"
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Wikipedia
    }

    async fn attempt_lookup(&self, query: &LookupQuery) -> Result<Vec<Candidate>, ProviderError> {
        let (summary, search) = tokio::join!(self.summary(&query.acronym), self.opensearch(query));
        match (summary, search) {
            (Err(e), Err(_)) => Err(e),
            (summary, search) => {
                let mut out = summary.unwrap_or_default();
                out.extend(search.unwrap_or_default());
                Ok(out)
            }
        }
    }
}

pub struct DuckDuckGoProvider {
    fetcher: HttpFetcher,
    url: String,
}

impl DuckDuckGoProvider {
    pub fn new(fetcher: HttpFetcher, url: &str) -> Self {
        Self { fetcher, url: url.to_string() }
    }

    fn collect_topics<'a>(topics: &'a [Value], out: &mut Vec<&'a str>) {
        for topic in topics {
            if let Some(text) = topic.get("Text").and_then(Value::as_str) {
                out.push(text);
            }
            if let Some(nested) = topic.get("Topics").and_then(Value::as_array) {
                Self::collect_topics(nested, out);
            }
        }
    }
}

#[async_trait]
impl LookupProvider for DuckDuckGoProvider {
    fn name(&self) -> &'static str {
        "duckduckgo"
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Duckduckgo
    }

    async fn attempt_lookup(&self, query: &LookupQuery) -> Result<Vec<Candidate>, ProviderError> {
        let params = [
            ("q", format!("{} stands for", query.acronym)),
            ("format", "json".to_string()),
            ("no_html", "1".to_string()),
            ("skip_disambig", "1".to_string()),
        ];
        let value = self.fetcher.get_json(&self.url, &params, &[]).await?;
        let answer = value.as_object().ok_or_else(|| ProviderError::Malformed("instant answer: not an object".into()))?;
        let domain = domain_of(&self.url);

        let mut out = Vec::new();
        let abstract_text = first_clause(answer.get("AbstractText").and_then(Value::as_str).unwrap_or(""));
        if abstract_text.chars().count() > 3 {
            out.extend(web_candidate(
                abstract_text,
                SourceKind::Duckduckgo,
                DUCKDUCKGO_ABSTRACT_CONFIDENCE,
                domain.as_ref(),
            ));
        }

        let mut topics = Vec::new();
        if let Some(related) = answer.get("RelatedTopics").and_then(Value::as_array) {
            Self::collect_topics(related, &mut topics);
        }
        let needle = query.acronym.to_uppercase();
        for text in topics {
            let clause = first_clause(text);
            if clause.to_uppercase().contains(&needle) {
                out.extend(web_candidate(clause, SourceKind::Duckduckgo, DUCKDUCKGO_TOPIC_CONFIDENCE, domain.as_ref()));
            }
        }
        Ok(out)
    }
}

pub struct WiktionaryProvider {
    fetcher: HttpFetcher,
    url: String,
}

impl WiktionaryProvider {
    pub fn new(fetcher: HttpFetcher, url: &str) -> Self {
        Self { fetcher, url: url.to_string() }
    }
}

#[async_trait]
impl LookupProvider for WiktionaryProvider {
    fn name(&self) -> &'static str {
        "wiktionary"
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Wiktionary
    }

    async fn attempt_lookup(&self, query: &LookupQuery) -> Result<Vec<Candidate>, ProviderError> {
        let params = [
            ("action", "opensearch".to_string()),
            ("format", "json".to_string()),
            ("limit", "5".to_string()),
            ("search", search_text(query)),
        ];
        let value = self.fetcher.get_json(&self.url, &params, &[]).await?;
        let domain = domain_of(&self.url);
        Ok(opensearch_titles(&value)?
            .into_iter()
            .filter(|(title, _)| title.chars().count() <= MAX_TITLE_CHARS && !is_echo(title, &query.acronym))
            .filter_map(|(title, _)| web_candidate(&title, SourceKind::Wiktionary, WIKTIONARY_CONFIDENCE, domain.as_ref()))
            .collect())
    }
}

/// Bing Web Search. Needs a subscription key; without one it is skipped.
pub struct BingProvider {
    fetcher: HttpFetcher,
    url: String,
    key: Option<String>,
    count: usize,
}

impl BingProvider {
    pub fn new(fetcher: HttpFetcher, url: &str, key: Option<String>, count: usize) -> Self {
        Self {
            fetcher,
            url: url.to_string(),
            key: key.filter(|k| !k.trim().is_empty()),
            count: count.max(1),
        }
    }
}

#[async_trait]
impl LookupProvider for BingProvider {
    fn name(&self) -> &'static str {
        "bing"
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Bing
    }

    fn is_available(&self) -> bool {
        self.key.is_some()
    }

    async fn attempt_lookup(&self, query: &LookupQuery) -> Result<Vec<Candidate>, ProviderError> {
        let Some(key) = self.key.as_deref() else {
            return Ok(Vec::new());
        };
        let q = format!("{} acronym meaning {}", query.acronym, query.keywords.join(" "));
        let params = [
            ("q", q.trim().to_string()),
            ("mkt", "en-GB".to_string()),
            ("count", self.count.to_string()),
        ];
        let value = self
            .fetcher
            .get_json(&self.url, &params, &[("Ocp-Apim-Subscription-Key", key)])
            .await?;
        if !value.is_object() {
            return Err(ProviderError::Malformed("search: not an object".into()));
        }

        let pages = value
            .get("webPages")
            .and_then(|p| p.get("value"))
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();
        Ok(pages
            .iter()
            .filter_map(|item| {
                let name = item.get("name").and_then(Value::as_str).unwrap_or("");
                let snippet = item.get("snippet").and_then(Value::as_str).unwrap_or("");
                let text = if snippet.trim().is_empty() { name } else { snippet };
                if text.trim().chars().count() <= 3 {
                    return None;
                }
                let domain = item.get("url").and_then(Value::as_str).and_then(domain_of);
                web_candidate(truncate_chars(text, BING_SNIPPET_CHARS), SourceKind::Bing, BING_CONFIDENCE, domain.as_ref())
            })
            .take(self.count)
            .collect())
    }
}
