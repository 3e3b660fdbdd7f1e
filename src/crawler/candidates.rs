//! Candidate URL derivation
//!
//! Turns a free-text query into a short ordered list of pages worth
//! crawling. This is a pure function of the query string: no network access,
//! same input, same output.
//!
//! Order of preference:
//! 1. Encyclopedia article for the slugified query
//! 2. Business directory listing (venue keywords + known place + a name)
//! 3. Review site search (venue keywords)
//! 4. Directory search scoped to a known place, then that place's portals
//! 5. Generic web search as a catch-all

use urlencoding::encode;

/// Never crawl more candidates than this for one query
pub const MAX_CANDIDATES: usize = 5;

const ENCYCLOPEDIA_BASE: &str = "https://en.wikipedia.org/wiki/";
const DIRECTORY_BIZ_BASE: &str = "https://www.yelp.com/biz/";
const REVIEW_SEARCH_BASE: &str = "https://www.tripadvisor.com/Search?q=";
const DIRECTORY_SEARCH_BASE: &str = "https://www.yellowpages.com/search";
const WEB_SEARCH_BASE: &str = "https://duckduckgo.com/html/?q=";

const VENUE_KEYWORDS: &[&str] = &[
    "restaurant", "restaurants", "cafe", "bar", "food", "business", "diner", "dining", "pizza",
    "coffee",
];

/// Words that carry no business name
const FILLER_WORDS: &[&str] = &[
    "in", "at", "near", "the", "of", "a", "an", "best", "good", "deep", "research", "il",
];

struct KnownPlace {
    token: &'static str,
    geo: &'static str,
    portals: &'static [&'static str],
}

const KNOWN_PLACES: &[KnownPlace] = &[
    KnownPlace {
        token: "dekalb",
        geo: "DeKalb, IL",
        portals: &["https://www.cityofdekalb.com", "https://www.niu.edu/dining"],
    },
    KnownPlace {
        token: "chicago",
        geo: "Chicago, IL",
        portals: &["https://www.chicago.gov", "https://www.choosechicago.com"],
    },
    KnownPlace {
        token: "illinois",
        geo: "Illinois",
        portals: &["https://www.illinois.gov"],
    },
];

/// Derive up to [`MAX_CANDIDATES`] distinct URLs to crawl for `query`
pub fn derive_candidates(query: &str) -> Vec<String> {
    let words: Vec<&str> = query.split_whitespace().collect();
    if words.is_empty() {
        return Vec::new();
    }

    let tokens: Vec<String> = words.iter().map(|w| normalize_token(w)).collect();
    let phrase = words.join(" ");

    let has_venue = tokens.iter().any(|t| VENUE_KEYWORDS.contains(&t.as_str()));
    let place = KNOWN_PLACES
        .iter()
        .find(|p| tokens.iter().any(|t| t == p.token));

    let mut urls = vec![encyclopedia_url(&words)];

    if has_venue {
        if let Some(place) = place {
            let name = business_name(&tokens);
            if !name.is_empty() {
                urls.push(format!("{}{}-{}", DIRECTORY_BIZ_BASE, name.join("-"), place.token));
            }
        }
        urls.push(format!("{}{}", REVIEW_SEARCH_BASE, encode(&phrase)));
    }

    if let Some(place) = place {
        urls.push(format!(
            "{}?search_terms={}&geo_location_terms={}",
            DIRECTORY_SEARCH_BASE,
            encode(&phrase),
            encode(place.geo)
        ));
        urls.extend(place.portals.iter().map(|p| p.to_string()));
    }

    urls.push(format!("{}{}", WEB_SEARCH_BASE, encode(&phrase)));

    dedupe_capped(urls, MAX_CANDIDATES)
}

/// `restaurant in dekalb` -> `Restaurant_in_dekalb`
fn encyclopedia_url(words: &[&str]) -> String {
    let slug = words
        .iter()
        .enumerate()
        .map(|(i, w)| {
            let word = if i == 0 { capitalize(w) } else { w.to_string() };
            encode(&word).into_owned()
        })
        .collect::<Vec<_>>()
        .join("_");
    format!("{}{}", ENCYCLOPEDIA_BASE, slug)
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Lowercase, `joe's` -> `joes`, keep letters, digits and dashes
fn normalize_token(word: &str) -> String {
    word.to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '-')
        .collect()
}

/// Tokens left once venue words, places and filler are removed
fn business_name(tokens: &[String]) -> Vec<&str> {
    tokens
        .iter()
        .map(String::as_str)
        .filter(|t| !t.is_empty())
        .filter(|t| !VENUE_KEYWORDS.contains(t))
        .filter(|t| !FILLER_WORDS.contains(t))
        .filter(|t| !KNOWN_PLACES.iter().any(|p| p.token == *t))
        .collect()
}

fn dedupe_capped(urls: Vec<String>, cap: usize) -> Vec<String> {
    let mut unique: Vec<String> = Vec::with_capacity(cap);
    for url in urls {
        if unique.len() == cap {
            break;
        }
        if !unique.contains(&url) {
            unique.push(url);
        }
    }
    unique
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_restaurant_query_mixes_encyclopedia_and_directories() {
        let urls = derive_candidates("restaurant in dekalb");
        assert!(urls.len() <= MAX_CANDIDATES);
        assert_eq!(urls[0], "https://en.wikipedia.org/wiki/Restaurant_in_dekalb");
        assert!(urls.iter().any(|u| u.contains("tripadvisor.com") || u.contains("yellowpages.com")));

        for (i, url) in urls.iter().enumerate() {
            assert!(!urls[i + 1..].contains(url), "duplicate candidate {}", url);
        }
    }

    #[test]
    fn test_derivation_is_deterministic() {
        assert_eq!(
            derive_candidates("restaurant in dekalb"),
            derive_candidates("restaurant in dekalb")
        );
    }

    #[test]
    fn test_named_business_gets_directory_listing() {
        let urls = derive_candidates("Joe's Pizza restaurant chicago");
        assert!(urls.contains(&"https://www.yelp.com/biz/joes-chicago".to_string()));
        assert!(urls.len() <= MAX_CANDIDATES);
    }

    #[test]
    fn test_plain_topic_falls_back_to_web_search() {
        let urls = derive_candidates("rust programming language");
        assert_eq!(
            urls,
            vec![
                "https://en.wikipedia.org/wiki/Rust_programming_language".to_string(),
                "https://duckduckgo.com/html/?q=rust%20programming%20language".to_string(),
            ]
        );
    }

    #[test]
    fn test_place_without_venue_uses_portals() {
        let urls = derive_candidates("history of chicago");
        assert!(urls.iter().any(|u| u.starts_with(DIRECTORY_SEARCH_BASE)));
        assert!(urls.contains(&"https://www.chicago.gov".to_string()));
    }

    #[test]
    fn test_empty_query_has_no_candidates() {
        assert!(derive_candidates("   ").is_empty());
    }

    #[test]
    fn test_dedupe_capped_preserves_order() {
        let urls = vec!["a", "b", "a", "c", "d", "e", "f"]
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(dedupe_capped(urls, 5), vec!["a", "b", "c", "d", "e"]);
    }
}
