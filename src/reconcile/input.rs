//! Credential inputs
//!
//! Turns declared password/certificate attributes into the credential sent to
//! the directory. Errors name the attribute at fault.

use crate::error::{Error, Result};
use crate::models::{KeyCredential, PasswordCredential};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use uuid::Uuid;

/// Longest password the directory accepts
pub const MAX_PASSWORD_LENGTH: usize = 863;

const PEM_HEADER: &str = "-----BEGIN CERTIFICATE-----";
const PEM_FOOTER: &str = "-----END CERTIFICATE-----";

#[derive(Debug, Clone, Default)]
pub struct PasswordInput {
    pub key_id: Option<String>,
    pub display_name: Option<String>,
    pub value: String,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub end_date_relative: Option<String>,
}

/// How a certificate value is supplied
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum CertificateEncoding {
    #[default]
    Pem,
    Base64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum CertificateType {
    #[default]
    #[value(name = "AsymmetricX509Cert")]
    AsymmetricX509Cert,
    #[value(name = "Symmetric")]
    Symmetric,
}

impl CertificateType {
    pub fn as_str(self) -> &'static str {
        match self {
            CertificateType::AsymmetricX509Cert => "AsymmetricX509Cert",
            CertificateType::Symmetric => "Symmetric",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CertificateInput {
    pub key_id: Option<String>,
    pub display_name: Option<String>,
    pub value: String,
    pub encoding: CertificateEncoding,
    pub key_type: CertificateType,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub end_date_relative: Option<String>,
}

impl PasswordInput {
    pub fn build(&self) -> Result<PasswordCredential> {
        self.build_at(Utc::now())
    }

    /// Build the credential with `now` as the default start date.
    pub fn build_at(&self, now: DateTime<Utc>) -> Result<PasswordCredential> {
        let length = self.value.chars().count();
        if length == 0 || length > MAX_PASSWORD_LENGTH {
            return Err(Error::invalid_input(
                "value",
                format!("must be between 1 and {MAX_PASSWORD_LENGTH} characters, got {length}"),
            ));
        }

        let (start, end) = validity(
            self.start_date.as_deref(),
            self.end_date.as_deref(),
            self.end_date_relative.as_deref(),
            now,
        )?;

        Ok(PasswordCredential {
            key_id: Some(key_id(self.key_id.as_deref())?),
            display_name: self.display_name.clone(),
            secret_text: Some(self.value.clone()),
            start_date_time: Some(format_date(start)),
            end_date_time: Some(format_date(end)),
            ..Default::default()
        })
    }
}

impl CertificateInput {
    pub fn build(&self) -> Result<KeyCredential> {
        self.build_at(Utc::now())
    }

    pub fn build_at(&self, now: DateTime<Utc>) -> Result<KeyCredential> {
        let key = match self.encoding {
            CertificateEncoding::Pem => strip_pem(&self.value)?,
            CertificateEncoding::Base64 => self.value.split_whitespace().collect(),
        };
        if key.is_empty() {
            return Err(Error::invalid_input("value", "certificate is empty"));
        }
        STANDARD
            .decode(&key)
            .map_err(|e| Error::invalid_input("value", format!("not valid base64: {e}")))?;

        let (start, end) = validity(
            self.start_date.as_deref(),
            self.end_date.as_deref(),
            self.end_date_relative.as_deref(),
            now,
        )?;

        Ok(KeyCredential {
            key_id: Some(key_id(self.key_id.as_deref())?),
            display_name: self.display_name.clone(),
            key_type: Some(self.key_type.as_str().to_string()),
            usage: Some("Verify".to_string()),
            key: Some(key),
            start_date_time: Some(format_date(start)),
            end_date_time: Some(format_date(end)),
            ..Default::default()
        })
    }
}

fn key_id(supplied: Option<&str>) -> Result<String> {
    match supplied {
        Some(id) => Uuid::parse_str(id)
            .map(|u| u.to_string())
            .map_err(|e| Error::invalid_input("key_id", format!("{id:?} is not a UUID: {e}"))),
        None => Ok(Uuid::new_v4().to_string()),
    }
}

fn validity(
    start_date: Option<&str>,
    end_date: Option<&str>,
    end_date_relative: Option<&str>,
    now: DateTime<Utc>,
) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
    let start = match start_date {
        Some(s) => parse_date("start_date", s)?,
        None => now,
    };

    let end = match (end_date, end_date_relative) {
        (Some(_), Some(_)) => {
            return Err(Error::invalid_input(
                "end_date",
                "only one of end_date or end_date_relative can be set",
            ))
        }
        (None, None) => {
            return Err(Error::invalid_input(
                "end_date",
                "one of end_date or end_date_relative must be set",
            ))
        }
        (Some(end), None) => parse_date("end_date", end)?,
        (None, Some(relative)) => {
            let offset = parse_duration(relative)
                .map_err(|e| Error::invalid_input("end_date_relative", e))?;
            start
                .checked_add_signed(offset)
                .ok_or_else(|| Error::invalid_input("end_date_relative", "end date out of range"))?
        }
    };

    if end <= start {
        return Err(Error::invalid_input("end_date", "must be after the start date"));
    }
    Ok((start, end))
}

fn parse_date(attribute: &str, value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| Error::invalid_input(attribute, format!("{value:?} is not an RFC3339 date: {e}")))
}

fn format_date(date: DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Parse durations the way Go's `time.ParseDuration` reads them: decimal
/// numbers, each followed by a unit (`ns`, `us`, `ms`, `s`, `m`, `h`), e.g.
/// `240h`, `1h30m`, `1.5h` or `300ms`. Signs are rejected and the total must
/// be positive.
pub fn parse_duration(value: &str) -> std::result::Result<Duration, String> {
    let invalid = || format!("{value:?} is not a duration like \"240h\", \"1h30m\" or \"1.5h\"");

    let mut rest = value.trim();
    if rest.is_empty() {
        return Err(invalid());
    }

    let mut nanos = 0f64;
    while !rest.is_empty() {
        let split = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        let (number, tail) = rest.split_at(split);
        if !number.bytes().any(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        let amount: f64 = number.parse().map_err(|_| invalid())?;

        let split = tail
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(tail.len());
        let (unit, tail) = tail.split_at(split);
        let scale = match unit {
            "ns" => 1.0,
            "us" | "\u{b5}s" | "\u{3bc}s" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60e9,
            "h" => 3600e9,
            _ => return Err(invalid()),
        };

        nanos += amount * scale;
        rest = tail;
    }

    if nanos < 1.0 || nanos >= i64::MAX as f64 {
        return Err(invalid());
    }
    Ok(Duration::nanoseconds(nanos.round() as i64))
}

fn strip_pem(value: &str) -> Result<String> {
    let trimmed = value.trim();
    let body = trimmed
        .strip_prefix(PEM_HEADER)
        .and_then(|rest| rest.strip_suffix(PEM_FOOTER))
        .ok_or_else(|| Error::invalid_input("value", "expected a PEM encoded certificate"))?;
    Ok(body.split_whitespace().collect())
}
