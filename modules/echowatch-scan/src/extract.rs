//! Extraction engine — pure, deterministic text mining.
//!
//! Two sub-extractors over one response text: citations (three capture tiers
//! in strict priority order, URL-deduped across tiers) and brand mentions
//! (literal gazetteer matching). No I/O, no randomness: identical input and
//! gazetteer produce byte-for-byte identical output.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use echowatch_common::{Citation, CitationKind, Extraction, Mention, Org};

/// Hard cap on citations per run.
pub const MAX_CITATIONS: usize = 20;

/// Gazetteer entries shorter than this never match.
const MIN_ENTRY_CHARS: usize = 3;

// Tier 1: markdown links, the only tier that carries a title.
static MARKDOWN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\]]+)\]\((https?://[^\s)]+)\)").unwrap());

// Tier 2: numbered reference lines, "[3] https://..." or "3. https://...".
static NUMBERED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*(?:\[\d+\]|\d+\.)\s+(https?://\S+)").unwrap());

// Tier 3: anything URL-shaped that earlier tiers didn't claim.
static BARE_URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"https?://[^\s<>]+"#).unwrap());

// ---------------------------------------------------------------------------
// Gazetteer
// ---------------------------------------------------------------------------

/// Brands every tenant is compared against, independent of their own
/// competitor configuration.
pub const INDUSTRY_BRANDS: &[&str] = &[
    "HubSpot",
    "Salesforce",
    "Zoho",
    "Pipedrive",
    "Mailchimp",
    "Marketo",
    "Intercom",
    "Zendesk",
    "Freshworks",
    "Monday.com",
    "Asana",
    "Notion",
    "Klaviyo",
    "Semrush",
    "Ahrefs",
    "Shopify",
];

/// The literal-match vocabulary for one tenant: their brand names plus the
/// static industry list. Entry order is stable (tenant brands first), which
/// makes mention output order and scoring tie-breaks deterministic.
#[derive(Debug, Clone)]
pub struct Gazetteer {
    entries: Vec<String>,
    org_keys: HashSet<String>,
}

impl Gazetteer {
    pub fn new(org_brand_names: &[String], industry: &[&str]) -> Self {
        let org_keys: HashSet<String> = org_brand_names
            .iter()
            .map(|n| normalize(n))
            .filter(|n| !n.is_empty())
            .collect();

        let mut entries = Vec::new();
        let mut seen = HashSet::new();
        for name in org_brand_names
            .iter()
            .map(|s| s.as_str())
            .chain(industry.iter().copied())
        {
            let key = normalize(name);
            if key.is_empty() || !seen.insert(key) {
                continue;
            }
            entries.push(name.trim().to_string());
        }

        Self { entries, org_keys }
    }

    pub fn for_org(org: &Org) -> Self {
        Self::new(&org.brand_names, INDUSTRY_BRANDS)
    }

    /// Whether a normalized key belongs to the tenant's own brand set.
    pub fn is_org_brand(&self, normalized: &str) -> bool {
        self.org_keys.contains(normalized)
    }
}

fn normalize(name: &str) -> String {
    name.trim().to_lowercase()
}

// ---------------------------------------------------------------------------
// Extraction
// ---------------------------------------------------------------------------

/// Run both sub-extractors. Empty text yields an empty result, not an error.
pub fn extract(text: &str, gazetteer: &Gazetteer) -> Extraction {
    if text.is_empty() {
        return Extraction::default();
    }

    let citations = extract_citations(text);
    let (brand_mentions, competitor_mentions) = extract_mentions(text, gazetteer);

    Extraction {
        citations,
        brand_mentions,
        competitor_mentions,
    }
}

/// Citation extraction in strict priority order. The same URL captured by
/// more than one tier is recorded once, by the highest-priority (earliest)
/// tier, so a markdown capture keeps its title over a bare duplicate.
pub fn extract_citations(text: &str) -> Vec<Citation> {
    let mut citations = Vec::new();
    let mut seen = HashSet::new();

    for caps in MARKDOWN_RE.captures_iter(text) {
        let url = caps[2].to_string();
        if seen.insert(url.clone()) {
            citations.push(Citation {
                kind: CitationKind::Url,
                domain: domain_of(&url),
                value: url,
                title: Some(caps[1].to_string()),
            });
        }
    }

    for caps in NUMBERED_RE.captures_iter(text) {
        let url = caps[1].to_string();
        if seen.insert(url.clone()) {
            citations.push(Citation {
                kind: CitationKind::Reference,
                domain: domain_of(&url),
                value: url,
                title: None,
            });
        }
    }

    for m in BARE_URL_RE.find_iter(text) {
        let url = strip_trailing_punctuation(m.as_str());
        if url.is_empty() {
            continue;
        }
        let url = url.to_string();
        if seen.insert(url.clone()) {
            citations.push(Citation {
                kind: CitationKind::Url,
                domain: domain_of(&url),
                value: url,
                title: None,
            });
        }
    }

    citations.truncate(MAX_CITATIONS);
    citations
}

/// Host of the URL with a leading `www.` stripped, when it parses at all.
fn domain_of(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    Some(host.strip_prefix("www.").unwrap_or(host).to_string())
}

/// Sentence punctuation glued onto a bare URL is not part of it.
fn strip_trailing_punctuation(url: &str) -> &str {
    url.trim_end_matches(['.', ',', ';', ':', '!', '?', ')', ']', '>', '"', '\''])
}

/// Case-insensitive whole-word gazetteer matching. Returns (org-brand hits,
/// competitor hits), each in gazetteer order; entries matching zero times are
/// omitted entirely.
///
/// URLs are masked out first: "hubspot" inside `https://hubspot.com` is a
/// citation, not a mention.
fn extract_mentions(text: &str, gazetteer: &Gazetteer) -> (Vec<Mention>, Vec<Mention>) {
    let masked = mask_urls(text);
    let lowered = masked.to_lowercase();
    let total_chars = lowered.chars().count();
    if total_chars == 0 {
        return (Vec::new(), Vec::new());
    }

    let mut brands = Vec::new();
    let mut competitors = Vec::new();

    for entry in &gazetteer.entries {
        let needle = normalize(entry);
        if needle.chars().count() < MIN_ENTRY_CHARS {
            continue;
        }

        let mut count = 0u32;
        let mut first_offset: Option<usize> = None;
        for (idx, matched) in lowered.match_indices(&needle) {
            if !is_word_boundary(&lowered, idx, idx + matched.len()) {
                continue;
            }
            count += 1;
            if first_offset.is_none() {
                first_offset = Some(idx);
            }
        }

        let Some(first_offset) = first_offset else {
            continue;
        };

        let first_pos_ratio = lowered[..first_offset].chars().count() as f64 / total_chars as f64;
        let mention = Mention {
            name: entry.clone(),
            normalized: needle.clone(),
            count,
            first_pos_ratio,
        };

        if gazetteer.is_org_brand(&needle) {
            brands.push(mention);
        } else {
            competitors.push(mention);
        }
    }

    (brands, competitors)
}

/// Replace every URL with spaces of the same byte length. URLs are ASCII, so
/// char offsets elsewhere in the text are unchanged and first_pos_ratio stays
/// comparable.
fn mask_urls(text: &str) -> String {
    BARE_URL_RE
        .replace_all(text, |caps: &regex::Captures<'_>| {
            " ".repeat(caps[0].len())
        })
        .into_owned()
}

/// Both neighbors of a match must be non-alphanumeric: "Hub" never matches
/// inside "GitHub".
fn is_word_boundary(text: &str, start: usize, end: usize) -> bool {
    let before_ok = text[..start]
        .chars()
        .next_back()
        .map_or(true, |c| !c.is_alphanumeric());
    let after_ok = text[end..]
        .chars()
        .next()
        .map_or(true, |c| !c.is_alphanumeric());
    before_ok && after_ok
}
