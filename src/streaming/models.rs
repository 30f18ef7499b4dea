use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Subscription,
    Rent,
    Buy,
    Free,
}

impl SourceType {
    /// Map an upstream source type. Unknown kinds count as subscriptions.
    pub fn from_upstream(kind: Option<&str>) -> Self {
        match kind.map(|k| k.trim().to_ascii_lowercase()).as_deref() {
            Some("rent") => Self::Rent,
            Some("buy") => Self::Buy,
            Some("free" | "ads") => Self::Free,
            _ => Self::Subscription,
        }
    }
}

/// Whether a bundle came from the live collaborator or was simulated locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    Live,
    Simulated,
}

pub struct KnownService {
    pub id: &'static str,
    pub name: &'static str,
    pub color: &'static str,
    pub kind: SourceType,
    pub priority: u8,
}

pub const KNOWN_SERVICES: &[KnownService] = &[
    KnownService { id: "netflix", name: "Netflix", color: "#E50914", kind: SourceType::Subscription, priority: 10 },
    KnownService { id: "amazon-prime", name: "Amazon Prime Video", color: "#00A8E1", kind: SourceType::Subscription, priority: 9 },
    KnownService { id: "disney-plus", name: "Disney+", color: "#113CCF", kind: SourceType::Subscription, priority: 8 },
    KnownService { id: "hulu", name: "Hulu", color: "#1CE783", kind: SourceType::Subscription, priority: 7 },
    KnownService { id: "apple-tv-plus", name: "Apple TV+", color: "#000000", kind: SourceType::Subscription, priority: 6 },
    KnownService { id: "hbo-max", name: "HBO Max", color: "#B82FD1", kind: SourceType::Subscription, priority: 8 },
    KnownService { id: "paramount-plus", name: "Paramount+", color: "#0068FF", kind: SourceType::Subscription, priority: 5 },
    KnownService { id: "amazon-video", name: "Amazon Video", color: "#FF9900", kind: SourceType::Rent, priority: 10 },
    KnownService { id: "apple-itunes", name: "Apple iTunes", color: "#000000", kind: SourceType::Rent, priority: 9 },
    KnownService { id: "google-play", name: "Google Play Movies", color: "#4285F4", kind: SourceType::Rent, priority: 8 },
    KnownService { id: "vudu", name: "Vudu", color: "#3399FF", kind: SourceType::Rent, priority: 7 },
    KnownService { id: "tubi", name: "Tubi", color: "#FA541C", kind: SourceType::Free, priority: 10 },
    KnownService { id: "crackle", name: "Crackle", color: "#F6A623", kind: SourceType::Free, priority: 8 },
    KnownService { id: "pluto-tv", name: "Pluto TV", color: "#00D4AA", kind: SourceType::Free, priority: 6 },
];

const UNKNOWN_SERVICE_COLOR: &str = "#666666";

pub fn known_service(id: &str) -> Option<&'static KnownService> {
    KNOWN_SERVICES.iter().find(|s| s.id == id)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub name: String,
    pub color: String,
    pub kind: SourceType,
    pub priority: u8,
}

impl From<&KnownService> for ServiceInfo {
    fn from(s: &KnownService) -> Self {
        Self {
            name: s.name.to_owned(),
            color: s.color.to_owned(),
            kind: s.kind,
            priority: s.priority,
        }
    }
}

impl ServiceInfo {
    /// Match an upstream source name against the known services, falling back
    /// to a generic entry carrying the upstream name.
    pub fn resolve(source_name: &str, kind: SourceType) -> Self {
        let needle = source_name.trim().to_lowercase();
        KNOWN_SERVICES
            .iter()
            .find(|s| {
                s.name.to_lowercase().contains(&needle) || needle.contains(&s.id.replace('-', " "))
            })
            .map(ServiceInfo::from)
            .unwrap_or_else(|| Self {
                name: source_name.trim().to_owned(),
                color: UNKNOWN_SERVICE_COLOR.to_owned(),
                kind,
                priority: 1,
            })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamingOption {
    pub service: ServiceInfo,
    pub kind: SourceType,
    #[serde(default)]
    pub price: Option<f64>,
    pub url: String,
}

impl StreamingOption {
    /// `$3.99`-style price for rentals and purchases.
    pub fn rent_price(&self) -> Option<String> {
        self.price.map(|p| format!("${p:.2}"))
    }
}

static PRICE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+\.?\d*").unwrap());

/// Extract a price from an upstream value that may be a number or a string like `"$3.99"`.
pub fn parse_price(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => PRICE.find(s).and_then(|m| m.as_str().parse().ok()),
        _ => None,
    }
}

/// Search deep link for `title` on the named service, or a web search when
/// the service is not recognized.
pub fn search_url(service_name: &str, title: &str) -> String {
    let title = title.trim();
    if title.is_empty() {
        return "#".to_owned();
    }
    let q = urlencoding::encode(title);
    let service = service_name.to_lowercase();
    let links: [(&str, String); 10] = [
        ("netflix", format!("https://www.netflix.com/search?q={q}")),
        ("amazon", format!("https://www.amazon.com/s?k={q}&i=prime-instant-video")),
        ("disney", format!("https://www.disneyplus.com/search?q={q}")),
        ("hulu", format!("https://www.hulu.com/search?q={q}")),
        ("apple", format!("https://tv.apple.com/search?term={q}")),
        ("google", format!("https://play.google.com/store/search?q={q}&c=movies")),
        ("vudu", format!("https://www.vudu.com/content/search?q={q}")),
        ("tubi", format!("https://tubitv.com/search/{q}")),
        ("crackle", format!("https://www.crackle.com/search?q={q}")),
        ("pluto", format!("https://pluto.tv/search?query={q}")),
    ];
    links
        .into_iter()
        .find(|(key, _)| service.contains(key))
        .map(|(_, url)| url)
        .unwrap_or_else(|| format!("https://www.google.com/search?q=\"{q}\"+watch+online"))
}

/// Where a movie can be watched, grouped into three buckets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamingBundle {
    pub subscriptions: Vec<StreamingOption>,
    /// Rentals and purchases.
    pub rentals: Vec<StreamingOption>,
    pub free: Vec<StreamingOption>,
    pub source: DataSource,
    pub fetched_at: DateTime<Utc>,
}

impl StreamingBundle {
    pub fn empty(source: DataSource) -> Self {
        Self {
            subscriptions: Vec::new(),
            rentals: Vec::new(),
            free: Vec::new(),
            source,
            fetched_at: Utc::now(),
        }
    }

    /// File an option into its bucket by kind.
    pub fn push(&mut self, option: StreamingOption) {
        match option.kind {
            SourceType::Subscription => self.subscriptions.push(option),
            SourceType::Rent | SourceType::Buy => self.rentals.push(option),
            SourceType::Free => self.free.push(option),
        }
    }

    pub fn has_data(&self) -> bool {
        !(self.subscriptions.is_empty() && self.rentals.is_empty() && self.free.is_empty())
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len() + self.rentals.len() + self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        !self.has_data()
    }

    pub fn is_simulated(&self) -> bool {
        self.source == DataSource::Simulated
    }

    /// Older than `ttl` as of `now`.
    pub fn is_stale(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        chrono::Duration::from_std(ttl).is_ok_and(|ttl| now - self.fetched_at > ttl)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn source_type_mapping() {
        assert_eq!(SourceType::from_upstream(Some("sub")), SourceType::Subscription);
        assert_eq!(SourceType::from_upstream(Some("ADS")), SourceType::Free);
        assert_eq!(SourceType::from_upstream(Some("buy")), SourceType::Buy);
        assert_eq!(SourceType::from_upstream(Some("tvod")), SourceType::Subscription);
        assert_eq!(SourceType::from_upstream(None), SourceType::Subscription);
    }

    #[test]
    fn prices() {
        assert_eq!(parse_price(&json!(3.99)), Some(3.99));
        assert_eq!(parse_price(&json!("$14.99")), Some(14.99));
        assert_eq!(parse_price(&json!("free")), None);
        assert_eq!(parse_price(&json!(null)), None);
    }

    #[test]
    fn resolves_known_and_unknown_services() {
        let netflix = ServiceInfo::resolve("Netflix", SourceType::Subscription);
        assert_eq!(netflix.color, "#E50914");

        let prime = ServiceInfo::resolve("Amazon Prime", SourceType::Subscription);
        assert_eq!(prime.name, "Amazon Prime Video");

        let other = ServiceInfo::resolve("Kanopy", SourceType::Free);
        assert_eq!(other.name, "Kanopy");
        assert_eq!(other.priority, 1);
        assert_eq!(other.kind, SourceType::Free);
    }

    #[test]
    fn search_links() {
        assert_eq!(
            search_url("Tubi", "The Thing"),
            "https://tubitv.com/search/The%20Thing"
        );
        assert!(search_url("Kanopy", "Heat").starts_with("https://www.google.com/search"));
        assert_eq!(search_url("Netflix", "  "), "#");
    }

    #[test]
    fn bucketing_and_staleness() {
        let mut bundle = StreamingBundle::empty(DataSource::Live);
        assert!(!bundle.has_data());
        bundle.push(StreamingOption {
            service: ServiceInfo::resolve("Vudu", SourceType::Buy),
            kind: SourceType::Buy,
            price: Some(9.99),
            url: "#".to_owned(),
        });
        assert_eq!(bundle.rentals.len(), 1);
        assert_eq!(bundle.rentals[0].rent_price().as_deref(), Some("$9.99"));

        let ttl = Duration::from_secs(15 * 60);
        let later = bundle.fetched_at + chrono::Duration::minutes(16);
        assert!(!bundle.is_stale(ttl, bundle.fetched_at));
        assert!(bundle.is_stale(ttl, later));
    }
}
