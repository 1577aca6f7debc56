use once_cell::sync::Lazy;
use rand::Rng;
use regex::Regex;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Family {
  Length,
  Mass,
}

/// Symbol, family, metres-or-kilograms per unit.
const LINEAR_UNITS: &[(&str, Family, f64)] = &[
  ("m", Family::Length, 1.0),
  ("km", Family::Length, 1000.0),
  ("cm", Family::Length, 0.01),
  ("mm", Family::Length, 0.001),
  ("mi", Family::Length, 1609.34),
  ("ft", Family::Length, 0.3048),
  ("in", Family::Length, 0.0254),
  ("kg", Family::Mass, 1.0),
  ("g", Family::Mass, 0.001),
  ("mg", Family::Mass, 0.000001),
  ("lb", Family::Mass, 0.453592),
  ("oz", Family::Mass, 0.0283495),
];

fn linear_unit(symbol: &str) -> Option<(Family, f64)> {
  LINEAR_UNITS
    .iter()
    .find(|(s, _, _)| *s == symbol)
    .map(|(_, family, factor)| (*family, *factor))
}

fn to_celsius(value: f64, unit: &str) -> Option<f64> {
  match unit {
    "c" => Some(value),
    "f" => Some((value - 32.0) * 5.0 / 9.0),
    "k" => Some(value - 273.15),
    _ => None,
  }
}

fn from_celsius(value: f64, unit: &str) -> Option<f64> {
  match unit {
    "c" => Some(value),
    "f" => Some(value * 9.0 / 5.0 + 32.0),
    "k" => Some(value + 273.15),
    _ => None,
  }
}

/// Numeric conversion; `None` for unknown or cross-family pairs.
pub fn convert_value(value: f64, from: &str, to: &str) -> Option<f64> {
  let from = from.to_lowercase();
  let to = to.to_lowercase();

  if let Some(celsius) = to_celsius(value, &from) {
    return from_celsius(celsius, &to);
  }

  let (from_family, from_factor) = linear_unit(&from)?;
  let (to_family, to_factor) = linear_unit(&to)?;
  if from_family != to_family {
    return None;
  }
  Some(value * from_factor / to_factor)
}

/// Formatted conversion: temperatures with two decimals, linear units with up
/// to four (trailing zeros trimmed).
pub fn convert_unit(value: f64, from: &str, to: &str) -> Option<String> {
  let result = convert_value(value, from, to)?;
  if to_celsius(0.0, &from.to_lowercase()).is_some() {
    return Some(format!("{result:.2}"));
  }
  let fixed = format!("{result:.4}");
  Some(fixed.trim_end_matches('0').trim_end_matches('.').to_string())
}

#[derive(Clone, Debug, PartialEq)]
pub struct Statistics {
  pub values: Vec<f64>,
  pub sum: f64,
  pub mean: f64,
  pub median: f64,
  pub min: f64,
  pub max: f64,
}

pub const MIN_STATISTICS_SAMPLES: usize = 3;
const PREVIEW_VALUES: usize = 5;

pub fn describe(values: &[f64]) -> Option<Statistics> {
  if values.len() < MIN_STATISTICS_SAMPLES {
    return None;
  }

  let sum: f64 = values.iter().sum();
  let mean = sum / values.len() as f64;
  let min = values.iter().copied().fold(f64::INFINITY, f64::min);
  let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);

  let mut sorted = values.to_vec();
  sorted.sort_by(|a, b| a.total_cmp(b));
  let mid = sorted.len() / 2;
  let median = if sorted.len() % 2 == 0 {
    (sorted[mid - 1] + sorted[mid]) / 2.0
  } else {
    sorted[mid]
  };

  Some(Statistics {
    values: values.to_vec(),
    sum,
    mean,
    median,
    min,
    max,
  })
}

impl Statistics {
  pub fn render(&self) -> String {
    let preview = self
      .values
      .iter()
      .take(PREVIEW_VALUES)
      .map(|v| v.to_string())
      .collect::<Vec<_>>()
      .join(", ");

    format!(
      "[ANALISIS DATA]\n\
       - Data: [{preview}...] ({count} items)\n\
       - Total: {sum}\n\
       - Rata-rata (Mean): {mean:.2}\n\
       - Median: {median}\n\
       - Min: {min} | Max: {max}\n\
       - INSTRUKSI:\n\
       \x20 - Jelaskan insight dari statistik di atas.\n\
       \x20 - Analisis hanya jika user memberikan data angka yang jelas (daftar/kolom).\n\
       \x20 - Jika angka bercampur teks (tahun/NIM), minta user kirim data dalam format list/baris.",
      count = self.values.len(),
      sum = self.sum,
      mean = self.mean,
      median = self.median,
      min = self.min,
      max = self.max,
    )
  }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rgb(pub u8, pub u8, pub u8);

/// Accepts 3 or 6 hex digits, with or without `#`.
pub fn hex_to_rgb(hex: &str) -> Option<Rgb> {
  let digits = hex.trim_start_matches('#');
  if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
    return None;
  }
  let full = match digits.len() {
    3 => digits.chars().flat_map(|c| [c, c]).collect::<String>(),
    6 => digits.to_string(),
    _ => return None,
  };
  let channel = |i: usize| u8::from_str_radix(&full[i..i + 2], 16).ok();
  Some(Rgb(channel(0)?, channel(2)?, channel(4)?))
}

pub fn rgb_to_hex(rgb: Rgb) -> String {
  format!("#{:02x}{:02x}{:02x}", rgb.0, rgb.1, rgb.2)
}

/// Saturates a parsed channel into the 0-255 domain.
pub fn clamp_channel(raw: &str) -> u8 {
  raw.parse::<u64>().map(|v| v.min(255) as u8).unwrap_or(u8::MAX)
}

pub fn describe_hex(literal: &str) -> Option<String> {
  let Rgb(r, g, b) = hex_to_rgb(literal)?;
  Some(format!("[INFO WARNA] Kode {literal} adalah RGB({r}, {g}, {b})."))
}

pub fn describe_rgb(rgb: Rgb) -> String {
  let Rgb(r, g, b) = rgb;
  format!("[INFO WARNA] Kode RGB({r},{g},{b}) adalah Hex {}.", rgb_to_hex(rgb))
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EmailCheck {
  pub email: String,
  pub valid: bool,
  pub domain: String,
}

static EMAIL_SYNTAX: Lazy<Regex> =
  Lazy::new(|| Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").expect("valid email regex"));

/// Syntax only; says nothing about deliverability.
pub fn check_email(email: &str) -> EmailCheck {
  let valid = EMAIL_SYNTAX.is_match(email);
  let domain = email
    .split('@')
    .nth(1)
    .filter(|d| !d.is_empty())
    .unwrap_or("-")
    .to_string();
  EmailCheck {
    email: email.to_string(),
    valid,
    domain,
  }
}

impl EmailCheck {
  pub fn render(&self) -> String {
    let (verdict, analysis) = if self.valid {
      ("YA ✅", "Struktur email terlihat benar.")
    } else {
      ("TIDAK ❌", "Struktur email salah, cek tanda @ atau domain.")
    };
    format!(
      "[VALIDASI EMAIL]\n\
       - Email: {}\n\
       - Format Valid: {verdict}\n\
       - Domain: {}\n\
       - Analisis: {analysis}\n\
       - Ini hanya cek format (regex), bukan verifikasi email aktif/terdaftar.",
      self.email, self.domain
    )
  }
}

pub const PASSWORD_MIN: usize = 4;
pub const PASSWORD_MAX: usize = 64;
pub const PASSWORD_DEFAULT: usize = 12;
pub const ALPHANUMERIC: &str = "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
pub const SYMBOLS: &str = "!@#$%^&*()_+~`|}{[]:;?><,./-=";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PasswordSpec {
  pub requested_length: Option<u64>,
  pub symbols: bool,
}

impl PasswordSpec {
  pub fn length(&self) -> usize {
    self
      .requested_length
      .map(|n| n.clamp(PASSWORD_MIN as u64, PASSWORD_MAX as u64) as usize)
      .unwrap_or(PASSWORD_DEFAULT)
  }

  pub fn charset(&self) -> String {
    if self.symbols {
      format!("{ALPHANUMERIC}{SYMBOLS}")
    } else {
      ALPHANUMERIC.to_string()
    }
  }
}

/// Uniform draw per character from the active charset. Uses whatever RNG the
/// caller hands in; this is a convenience generator, not a key-derivation
/// primitive.
pub fn generate_password<R: Rng + ?Sized>(spec: &PasswordSpec, rng: &mut R) -> String {
  let charset: Vec<char> = spec.charset().chars().collect();
  (0..spec.length())
    .map(|_| charset[rng.gen_range(0..charset.len())])
    .collect()
}

pub fn render_password(spec: &PasswordSpec, password: &str) -> String {
  let complexity = if spec.symbols {
    "Tinggi (Huruf + Angka + Simbol)"
  } else {
    "Standar (Huruf + Angka)"
  };
  format!(
    "[PASSWORD GENERATOR]\n\
     - Password: {password}\n\
     - Panjang: {} karakter\n\
     - Kompleksitas: {complexity}\n\
     - INSTRUKSI: Berikan password ini kepada user.",
    spec.length()
  )
}
