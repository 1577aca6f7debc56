use once_cell::sync::Lazy;
use regex::Regex;

use crate::compute::{clamp_channel, PasswordSpec, Rgb};
use crate::models::ToolId;

pub const BASE_CURRENCY: &str = "IDR";

pub const CURRENCY_ALIASES: &[(&str, &str)] = &[
  ("dolar", "USD"),
  ("dollar", "USD"),
  ("usd", "USD"),
  ("as", "USD"),
  ("us", "USD"),
  ("rupiah", "IDR"),
  ("idr", "IDR"),
  ("indo", "IDR"),
  ("rp", "IDR"),
  ("euro", "EUR"),
  ("eur", "EUR"),
  ("eropa", "EUR"),
  ("yen", "JPY"),
  ("jpy", "JPY"),
  ("jepang", "JPY"),
  ("ringgit", "MYR"),
  ("myr", "MYR"),
  ("malaysia", "MYR"),
  ("singapura", "SGD"),
  ("sgd", "SGD"),
  ("sing", "SGD"),
  ("pound", "GBP"),
  ("gbp", "GBP"),
  ("sterling", "GBP"),
  ("inggris", "GBP"),
  ("won", "KRW"),
  ("krw", "KRW"),
  ("korea", "KRW"),
  ("yuan", "CNY"),
  ("cny", "CNY"),
  ("china", "CNY"),
  ("rmb", "CNY"),
  ("riyal", "SAR"),
  ("sar", "SAR"),
  ("arab", "SAR"),
];

const COMMON_CODES: &[&str] = &[
  "USD", "IDR", "EUR", "GBP", "JPY", "AUD", "SGD", "MYR", "CNY", "KRW", "SAR", "THB", "VND", "HKD", "CAD",
];

/// Alias or code to ISO code; unknown tokens pass through upper-cased.
pub fn resolve_currency(token: &str) -> String {
  let lower = token.to_lowercase();
  CURRENCY_ALIASES
    .iter()
    .find(|(alias, _)| *alias == lower)
    .map(|(_, code)| code.to_string())
    .unwrap_or_else(|| token.to_uppercase())
}

/// `.` is a thousands separator and `,` the decimal point; anything
/// unparseable is treated as 1.
pub fn parse_amount(raw: Option<&str>) -> f64 {
  raw
    .map(|s| s.replace('.', "").replacen(',', ".", 1))
    .and_then(|s| s.parse::<f64>().ok())
    .filter(|v| v.is_finite())
    .unwrap_or(1.0)
}

static WEATHER: Lazy<Regex> =
  Lazy::new(|| Regex::new(r"(?i)(?:cuaca|weather)\s+(?:di|in|at)\s+([a-zA-Z\s]+)").expect("valid weather regex"));

static CURRENCY: Lazy<Regex> = Lazy::new(|| {
  let tokens = CURRENCY_ALIASES
    .iter()
    .map(|(alias, _)| *alias)
    .chain(COMMON_CODES.iter().copied())
    .collect::<Vec<_>>()
    .join("|");
  let pattern = format!(
    r"(?i)(?:(\d+(?:[.,]\d+)?)\s*)?\b({tokens})\b(?:\s*(?:ke|to|in|=|->|\s)\s*\b({tokens})\b)?"
  );
  Regex::new(&pattern).expect("valid currency regex")
});

static URL: Lazy<Regex> = Lazy::new(|| Regex::new(r"https?://\S+").expect("valid url regex"));

static UNIT: Lazy<Regex> = Lazy::new(|| {
  Regex::new(r"(?i)(\d+(?:\.\d+)?)\s*([a-zA-Z]+)\s*(?:ke|to|in|=)\s*([a-zA-Z]+)").expect("valid unit regex")
});

static ANALYSIS_KEYWORD: Lazy<Regex> =
  Lazy::new(|| Regex::new(r"(?i)analisis|statistik|data").expect("valid analysis regex"));

static NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"-?\d+(?:\.\d+)?").expect("valid number regex"));

static HEX_COLOR: Lazy<Regex> =
  Lazy::new(|| Regex::new(r"(?i)#([0-9a-f]{3}|[0-9a-f]{6})\b").expect("valid hex regex"));

static RGB_COLOR: Lazy<Regex> = Lazy::new(|| {
  Regex::new(r"(?i)rgb\(\s*(\d+)\s*,\s*(\d+)\s*,\s*(\d+)\s*\)").expect("valid rgb regex")
});

static EMAIL_TOKEN: Lazy<Regex> = Lazy::new(|| {
  Regex::new(r"[a-zA-Z0-9._-]+@[a-zA-Z0-9._-]+\.[a-zA-Z0-9_-]+").expect("valid email token regex")
});

static PASSWORD_KEYWORD: Lazy<Regex> =
  Lazy::new(|| Regex::new(r"(?i)password|sandi|pass|kunci").expect("valid password regex"));

static PASSWORD_LENGTH: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(\d+)\b").expect("valid length regex"));

static SYMBOL_KEYWORD: Lazy<Regex> =
  Lazy::new(|| Regex::new(r"(?i)simbol|unik|spesial|tanda|karakter").expect("valid symbol regex"));

static SOCIAL_HANDLE: Lazy<Regex> = Lazy::new(|| {
  Regex::new(r"(?i)(?:cari|lihat|cek|apa|akun)\s*(?:ig|instagram|sosmed)\s+(?:nya|dari|untuk)?\s*@?(.+)")
    .expect("valid social handle regex")
});

static DIAGRAM: Lazy<Regex> = Lazy::new(|| {
  Regex::new(
    r"(?i)(buat|gambarkan|susun|bikin|tampilkan|contoh|berikan)\s+(diagram|flowchart|alur|skema|struktur|grafik|mindmap)",
  )
  .expect("valid diagram regex")
});

#[derive(Clone, Debug, PartialEq)]
pub struct CurrencyQuery {
  pub amount: f64,
  pub from: String,
  pub to: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct UnitQuery {
  pub value: f64,
  pub from: String,
  pub to: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColorQuery {
  Hex,
  Rgb(Rgb),
}

#[derive(Clone, Debug, PartialEq)]
pub enum SearchQuery {
  /// Free-form search over the whole message.
  General(String),
  /// Social-handle lookup rewritten toward a platform-scoped query.
  Handle { name: String, query: String },
}

impl SearchQuery {
  pub fn query(&self) -> &str {
    match self {
      SearchQuery::General(q) => q,
      SearchQuery::Handle { query, .. } => query,
    }
  }
}

/// Arguments an extractor pulled out of the latest user message.
#[derive(Clone, Debug, PartialEq)]
pub enum ToolArgs {
  Weather { city: String },
  Currency(CurrencyQuery),
  Scrape { url: String },
  Units(UnitQuery),
  Numbers(Vec<f64>),
  Color { literal: String, query: ColorQuery },
  Email { address: String },
  Password(PasswordSpec),
  Search(SearchQuery),
  Diagram,
}

/// Dispatches to the extractor for `tool`. Tools that never read the message
/// (`time`, `calculator`) always yield `None`.
pub fn try_extract(tool: ToolId, message: &str) -> Option<ToolArgs> {
  match tool {
    ToolId::Time | ToolId::Calculator => None,
    ToolId::Weather => extract_city(message).map(|city| ToolArgs::Weather { city }),
    ToolId::Currency => extract_currency(message).map(ToolArgs::Currency),
    ToolId::Scraper => extract_url(message).map(|url| ToolArgs::Scrape { url }),
    ToolId::Units => extract_units(message).map(ToolArgs::Units),
    ToolId::DataAnalysis => extract_numbers(message).map(ToolArgs::Numbers),
    ToolId::Colors => extract_color(message).map(|(literal, query)| ToolArgs::Color { literal, query }),
    ToolId::EmailValidator => extract_email(message).map(|address| ToolArgs::Email { address }),
    ToolId::PasswordGen => extract_password(message).map(ToolArgs::Password),
    ToolId::WebSearch => Some(ToolArgs::Search(extract_search(message))),
    ToolId::Flowchart => Some(ToolArgs::Diagram),
  }
}

pub fn extract_city(message: &str) -> Option<String> {
  let city = WEATHER.captures(message)?.get(1)?.as_str().trim();
  (!city.is_empty()).then(|| city.to_string())
}

pub fn extract_currency(message: &str) -> Option<CurrencyQuery> {
  let caps = CURRENCY.captures(message)?;
  let from = caps.get(2)?.as_str();
  let to = caps
    .get(3)
    .map(|m| resolve_currency(m.as_str()))
    .unwrap_or_else(|| BASE_CURRENCY.to_string());
  Some(CurrencyQuery {
    amount: parse_amount(caps.get(1).map(|m| m.as_str())),
    from: resolve_currency(from),
    to,
  })
}

pub fn extract_url(message: &str) -> Option<String> {
  URL.find(message).map(|m| m.as_str().to_string())
}

pub fn extract_units(message: &str) -> Option<UnitQuery> {
  let caps = UNIT.captures(message)?;
  Some(UnitQuery {
    value: caps.get(1)?.as_str().parse().ok()?,
    from: caps.get(2)?.as_str().to_string(),
    to: caps.get(3)?.as_str().to_string(),
  })
}

/// Every signed number in the message, gated on an analysis keyword and at
/// least three values.
pub fn extract_numbers(message: &str) -> Option<Vec<f64>> {
  if !ANALYSIS_KEYWORD.is_match(message) {
    return None;
  }
  let values: Vec<f64> = NUMBER
    .find_iter(message)
    .filter_map(|m| m.as_str().parse().ok())
    .collect();
  (values.len() >= crate::compute::MIN_STATISTICS_SAMPLES).then_some(values)
}

pub fn extract_color(message: &str) -> Option<(String, ColorQuery)> {
  if let Some(m) = HEX_COLOR.find(message) {
    return Some((m.as_str().to_string(), ColorQuery::Hex));
  }
  let caps = RGB_COLOR.captures(message)?;
  let rgb = Rgb(
    clamp_channel(caps.get(1)?.as_str()),
    clamp_channel(caps.get(2)?.as_str()),
    clamp_channel(caps.get(3)?.as_str()),
  );
  Some((caps.get(0)?.as_str().to_string(), ColorQuery::Rgb(rgb)))
}

pub fn extract_email(message: &str) -> Option<String> {
  if !(message.contains("valid") || message.contains("cek")) {
    return None;
  }
  EMAIL_TOKEN.find(message).map(|m| m.as_str().to_string())
}

pub fn extract_password(message: &str) -> Option<PasswordSpec> {
  if !PASSWORD_KEYWORD.is_match(message) {
    return None;
  }
  let requested_length = PASSWORD_LENGTH
    .captures(message)
    .and_then(|c| c.get(1))
    .map(|m| m.as_str().parse::<u64>().unwrap_or(u64::MAX));
  Some(PasswordSpec {
    requested_length,
    symbols: SYMBOL_KEYWORD.is_match(message),
  })
}

pub fn extract_search(message: &str) -> SearchQuery {
  let Some(caps) = SOCIAL_HANDLE.captures(message) else {
    return SearchQuery::General(message.to_string());
  };
  let name = caps
    .get(1)
    .map(|m| m.as_str())
    .unwrap_or_default()
    .replace('?', "")
    .trim()
    .trim_start_matches('@')
    .to_string();
  let lower = name.to_lowercase();
  let query = if lower.contains("aet") && !lower.contains("pcr") {
    format!("instagram.com/{name} aet pcr riau profile")
  } else {
    format!("instagram.com/{name} official profile")
  };
  SearchQuery::Handle { name, query }
}

pub fn wants_diagram(message: &str) -> bool {
  DIAGRAM.is_match(message)
}
