//! Content type parsing and the allow-list.

use std::fmt;

/// Major types a revision may declare.
pub const ALLOWED_MAJOR_TYPES: &[&str] = &["text", "image", "audio", "video", "application"];

/// Charsets accepted for `text/*`.
pub const ALLOWED_TEXT_CHARSETS: &[&str] = &["utf-8", "ascii"];

/// A parsed `major/minor;key=value` content type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContentType {
    pub major: String,
    pub minor: String,
    pub params: Vec<(String, String)>,
}

impl ContentType {
    /// Parse a content type. Type, subtype and parameter keys are lowercased.
    pub fn parse(value: &str) -> Result<Self, String> {
        let mut parts = value.split(';');
        let essence = parts.next().unwrap_or_default().trim();
        let (major, minor) = essence
            .split_once('/')
            .ok_or_else(|| format!("{value:?} has no subtype"))?;
        let (major, minor) = (major.trim(), minor.trim());
        if major.is_empty() || minor.is_empty() {
            return Err(format!("{value:?} has an empty type or subtype"));
        }

        let mut params = Vec::new();
        for param in parts {
            let param = param.trim();
            if param.is_empty() {
                continue;
            }
            let (key, val) = param
                .split_once('=')
                .ok_or_else(|| format!("malformed parameter {param:?}"))?;
            params.push((
                key.trim().to_ascii_lowercase(),
                val.trim().trim_matches('"').to_string(),
            ));
        }

        Ok(Self {
            major: major.to_ascii_lowercase(),
            minor: minor.to_ascii_lowercase(),
            params,
        })
    }

    /// Value of a parameter, by lowercase key.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// The declared charset, lowercased.
    pub fn charset(&self) -> Option<String> {
        self.param("charset").map(str::to_ascii_lowercase)
    }

    pub fn is_text(&self) -> bool {
        self.major == "text"
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.major, self.minor)?;
        for (k, v) in &self.params {
            write!(f, ";{k}={v}")?;
        }
        Ok(())
    }
}

/// Check a content type against the allow-list.
pub fn validate_contenttype(value: &str) -> Result<ContentType, String> {
    let ct = ContentType::parse(value)?;
    if !ALLOWED_MAJOR_TYPES.contains(&ct.major.as_str()) {
        return Err(format!("major type {:?} is not allowed", ct.major));
    }
    if ct.is_text() {
        match ct.charset() {
            None => return Err(format!("{value:?} needs a charset")),
            Some(cs) if !ALLOWED_TEXT_CHARSETS.contains(&cs.as_str()) => {
                return Err(format!("charset {cs:?} is not allowed"))
            }
            Some(_) => {}
        }
    }
    Ok(ct)
}
