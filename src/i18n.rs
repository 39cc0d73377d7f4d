//! Built-in message catalog for delivery notifications and badges.
//!
//! Covers only the strings this crate renders itself. Lookups fall back to
//! English, then to the key.

use std::fmt;
use std::str::FromStr;

/// Supported UI locales.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Locale {
    /// English.
    #[default]
    En,
    /// Bahasa Indonesia.
    Id,
}

impl Locale {
    /// Locale tag (`en`, `id`).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::En => "en",
            Self::Id => "id",
        }
    }

    /// Parse a locale tag, falling back to English for anything unknown.
    ///
    /// Region suffixes are ignored (`id-ID` is Indonesian).
    pub fn parse_or_default(tag: &str) -> Self {
        tag.parse().unwrap_or_else(|_| {
            log::debug!("Unknown locale {:?}, using en", tag);
            Self::En
        })
    }
}

impl FromStr for Locale {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lang = s
            .split(['-', '_'])
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();
        match lang.as_str() {
            "en" => Ok(Self::En),
            "id" | "in" => Ok(Self::Id),
            _ => anyhow::bail!("unsupported locale: {s}"),
        }
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn english(key: &str) -> Option<&'static str> {
    Some(match key {
        "reminder.failedNotification" => "Reminder delivery failed for {patientName}",
        "reminder.viewDetails" => "View details",
        "reminder.status.pending" => "Pending",
        "reminder.status.scheduled" => "Scheduled",
        "reminder.status.queued" => "Queued",
        "reminder.status.sending" => "Sending...",
        "reminder.status.sent" => "Sent",
        "reminder.status.delivered" => "Delivered",
        "reminder.status.read" => "Read",
        "reminder.status.failed" => "Failed",
        "reminder.status.expired" => "Expired",
        "reminder.status.cancelled" => "Cancelled",
        "reminder.status.retry" => "Retry",
        "reminder.status.retrying" => "Retrying ({count}/{max})",
        "delivery.connection.connected" => "Live updates on",
        "delivery.connection.connecting" => "Connecting...",
        "delivery.connection.disconnected" => "Live updates off",
        _ => return None,
    })
}

fn indonesian(key: &str) -> Option<&'static str> {
    Some(match key {
        "reminder.failedNotification" => "Pengiriman pengingat gagal untuk {patientName}",
        "reminder.viewDetails" => "Lihat detail",
        "reminder.status.pending" => "Tertunda",
        "reminder.status.scheduled" => "Dijadwalkan",
        "reminder.status.queued" => "Dalam Antrian",
        "reminder.status.sending" => "Mengirim...",
        "reminder.status.sent" => "Terkirim",
        "reminder.status.delivered" => "Diterima",
        "reminder.status.read" => "Dibaca",
        "reminder.status.failed" => "Gagal",
        "reminder.status.expired" => "Kedaluwarsa",
        "reminder.status.cancelled" => "Dibatalkan",
        "reminder.status.retry" => "Coba Lagi",
        "reminder.status.retrying" => "Mengirim ulang ({count}/{max})",
        "delivery.connection.connected" => "Pembaruan langsung aktif",
        "delivery.connection.connecting" => "Menghubungkan...",
        "delivery.connection.disconnected" => "Pembaruan langsung nonaktif",
        _ => return None,
    })
}

/// Looks up catalog strings for one locale.
#[derive(Debug, Clone, Copy, Default)]
pub struct Translator {
    locale: Locale,
}

impl Translator {
    /// Translator for `locale`.
    pub fn new(locale: Locale) -> Self {
        Self { locale }
    }

    /// Active locale.
    pub fn locale(&self) -> Locale {
        self.locale
    }

    /// Translate `key`, substituting `{name}` placeholders from `values`.
    ///
    /// Unknown keys are returned as-is. Placeholders without a value are
    /// left in place.
    pub fn translate(&self, key: &str, values: &[(&str, &str)]) -> String {
        let template = match self.locale {
            Locale::En => english(key),
            Locale::Id => indonesian(key).or_else(|| english(key)),
        };
        let Some(template) = template else {
            log::trace!("[i18n] Missing key {}", key);
            return key.to_string();
        };

        values
            .iter()
            .fold(template.to_string(), |text, (name, value)| {
                text.replace(&format!("{{{name}}}"), value)
            })
    }
}
