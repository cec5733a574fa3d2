//! Subject name and Subject Alternative Name validation.
//!
//! Subjects in this PKI are a single Common Name. The requested CN is parsed as an
//! RFC 4514 attribute value (`CN=<value>`), so anything that would break
//! distinguished-name syntax (an unescaped `,` for example) is rejected before any key
//! material is generated.

use tracing::debug;

use crate::error::{PkiError, PkiResult};
use crate::extensions::GeneralName;

/// X.520 upper bound for commonName.
pub const MAX_COMMON_NAME_LEN: usize = 64;
const MAX_DNS_NAME_LEN: usize = 253;

/// A validated, unescaped Common Name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommonName(String);

impl CommonName {
    pub fn parse(input: &str) -> PkiResult<Self> {
        match parse_attribute_value(input) {
            Some(value)
                if !value.is_empty() && value.chars().count() <= MAX_COMMON_NAME_LEN =>
            {
                Ok(CommonName(value))
            }
            _ => {
                debug!("Rejected common name: {:?}", input);
                Err(PkiError::invalid_subject(input))
            }
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Build the SAN list for a leaf: `{cn} ∪ extra`, deduplicated in first-seen order.
pub fn subject_alt_names(
    common_name: &CommonName,
    extra: &[String],
) -> PkiResult<Vec<GeneralName>> {
    let mut names: Vec<GeneralName> = Vec::with_capacity(extra.len() + 1);
    let requested =
        std::iter::once(common_name.as_str()).chain(extra.iter().map(String::as_str));
    for raw in requested {
        let name = match GeneralName::classify(raw) {
            GeneralName::Dns(dns) => GeneralName::Dns(validate_dns_name(&dns)?),
            other => other,
        };
        if !names.contains(&name) {
            names.push(name);
        }
    }
    Ok(names)
}

fn validate_dns_name(name: &str) -> PkiResult<String> {
    let valid = !name.is_empty()
        && name.len() <= MAX_DNS_NAME_LEN
        && name.bytes().all(|b| b.is_ascii_graphic());
    if valid {
        Ok(name.to_string())
    } else {
        debug!("Rejected DNS name: {:?}", name);
        Err(PkiError::invalid_subject(name))
    }
}

/// Parse an RFC 4514 attribute value, returning the unescaped string.
fn parse_attribute_value(input: &str) -> Option<String> {
    let trimmed = input.trim_start_matches(' ');
    if trimmed.starts_with('#') {
        // hex-encoded BER values are not accepted for a CN
        return None;
    }
    if let Some(quoted) = trimmed.trim_end_matches(' ').strip_prefix('"') {
        let inner = quoted.strip_suffix('"')?;
        return unescape(inner, true);
    }
    unescape(trimmed, false)
}

/// Inside quotes the separators are literal; `\` escapes work in both forms.
fn unescape(input: &str, quoted: bool) -> Option<String> {
    let bytes = input.as_bytes();
    let mut out: Vec<u8> = Vec::with_capacity(bytes.len());
    // bytes before this index came from escapes and survive trimming
    let mut keep = 0;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => {
                let (decoded, consumed) = decode_escape(&bytes[i + 1..])?;
                out.push(decoded);
                i += 1 + consumed;
                keep = out.len();
            }
            b'"' => return None,
            b',' | b'+' | b';' | b'<' | b'>' if !quoted => return None,
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    if !quoted {
        while out.len() > keep && out.last() == Some(&b' ') {
            out.pop();
        }
    }
    String::from_utf8(out).ok()
}

/// Escape an attribute value for an RFC 4514 string: the separators, a leading `#`
/// or space, a trailing space, and NUL.
pub fn escape_attribute_value(value: &str) -> String {
    let last = value.chars().count().saturating_sub(1);
    let mut out = String::with_capacity(value.len());
    for (i, c) in value.chars().enumerate() {
        match c {
            ',' | '+' | '"' | '\\' | '<' | '>' | ';' => {
                out.push('\\');
                out.push(c);
            }
            '#' if i == 0 => out.push_str("\\#"),
            ' ' if i == 0 || i == last => out.push_str("\\ "),
            '\0' => out.push_str("\\00"),
            _ => out.push(c),
        }
    }
    out
}

/// Decode the bytes following a backslash: a special character or a hex pair.
fn decode_escape(rest: &[u8]) -> Option<(u8, usize)> {
    let first = *rest.first()?;
    if matches!(
        first,
        b',' | b'+' | b'"' | b'\\' | b'<' | b'>' | b';' | b'=' | b'#' | b' '
    ) {
        return Some((first, 1));
    }
    let pair = rest.get(..2)?;
    let hex = std::str::from_utf8(pair).ok()?;
    let value = u8::from_str_radix(hex, 16).ok()?;
    Some((value, 2))
}
