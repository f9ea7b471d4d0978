use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

const VERSION_MARKER: &str = "[@version=";
const UI_VERSION_MARKER: &str = " and @uiVersion=";
const KEY_MARKER: &str = "@key=";
const ORDINAL_MARKER: &str = "@ordinal=";
const NULL_VERSION: &str = "null";

/// Model and UI version pair identifying one revision of a form.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FormVersion {
    pub model_version: Option<i64>,
    pub ui_version: Option<i64>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyError {
    #[error("submission key `{0}` has no `[@version=` marker")]
    MissingVersionMarker(String),
    #[error("submission key `{key}` has an unterminated bracket")]
    Unterminated { key: String },
    #[error("submission key `{key}` has a malformed segment `{segment}`")]
    MalformedSegment { key: String, segment: String },
}

/// One decoded segment of a [`SubmissionKey`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionKeyPart {
    pub element_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ordinal: Option<i64>,
    /// Present only on the leading form segment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<FormVersion>,
}

impl SubmissionKeyPart {
    pub fn form(form_id: impl Into<String>, version: FormVersion) -> Self {
        Self {
            element_name: form_id.into(),
            auri: None,
            ordinal: None,
            version: Some(version),
        }
    }

    pub fn element(name: impl Into<String>) -> Self {
        Self {
            element_name: name.into(),
            auri: None,
            ordinal: None,
            version: None,
        }
    }

    pub fn with_auri(mut self, auri: impl Into<String>) -> Self {
        self.auri = Some(auri.into());
        self
    }

    pub fn with_ordinal(mut self, ordinal: i64) -> Self {
        self.ordinal = Some(ordinal);
        self
    }

    fn encode(&self, out: &mut String) {
        out.push_str(&self.element_name);
        if let Some(version) = &self.version {
            out.push_str(VERSION_MARKER);
            out.push_str(&render_version(version.model_version));
            out.push_str(UI_VERSION_MARKER);
            out.push_str(&render_version(version.ui_version));
            out.push(']');
        } else if let Some(auri) = &self.auri {
            out.push_str("[@key=");
            out.push_str(auri);
            out.push(']');
        } else if let Some(ordinal) = self.ordinal {
            out.push_str("[@ordinal=");
            out.push_str(&ordinal.to_string());
            out.push(']');
        }
    }
}

/// Reversible text address of a submission, a nested instance, or a value within one.
///
/// `formId[@version=V and @uiVersion=U]/top[@key=K]/group:field[@ordinal=N]/...`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubmissionKey(String);

impl SubmissionKey {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn from_parts(parts: &[SubmissionKeyPart]) -> Self {
        let mut out = String::new();
        for (index, part) in parts.iter().enumerate() {
            if index > 0 {
                out.push('/');
            }
            part.encode(&mut out);
        }
        Self(out)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Appends `/segment` to this key.
    pub fn child(&self, segment: &str) -> Self {
        Self(format!("{}/{segment}", self.0))
    }

    /// Appends `[@ordinal=n]` to the last segment.
    pub fn with_ordinal(&self, ordinal: i64) -> Self {
        Self(format!("{}[@ordinal={ordinal}]", self.0))
    }

    pub fn parts(&self) -> Result<Vec<SubmissionKeyPart>, KeyError> {
        let raw = self.0.as_str();
        let marker = raw
            .rfind(VERSION_MARKER)
            .ok_or_else(|| KeyError::MissingVersionMarker(raw.to_string()))?;
        let close = raw[marker..]
            .find(']')
            .map(|offset| marker + offset)
            .ok_or_else(|| KeyError::Unterminated {
                key: raw.to_string(),
            })?;

        let mut segments = vec![&raw[..=close]];
        let rest = &raw[close + 1..];
        if !rest.is_empty() {
            let rest = rest.strip_prefix('/').ok_or_else(|| malformed(raw, rest))?;
            let slash = rest.find('/');
            let bracket = rest.find('[');
            let remainder = match bracket {
                Some(open) if slash.is_none_or(|slash| open < slash) => {
                    match rest[open..].find("]/") {
                        Some(offset) => {
                            segments.push(&rest[..=open + offset]);
                            Some(&rest[open + offset + 2..])
                        }
                        None if rest.ends_with(']') => {
                            segments.push(rest);
                            None
                        }
                        None => {
                            return Err(KeyError::Unterminated {
                                key: raw.to_string(),
                            });
                        }
                    }
                }
                _ => match slash {
                    Some(slash) => {
                        segments.push(&rest[..slash]);
                        Some(&rest[slash + 1..])
                    }
                    None => {
                        segments.push(rest);
                        None
                    }
                },
            };
            if let Some(remainder) = remainder {
                segments.extend(remainder.split('/'));
            }
        }

        segments
            .into_iter()
            .enumerate()
            .map(|(index, segment)| parse_segment(raw, segment, index == 0))
            .collect()
    }
}

impl fmt::Display for SubmissionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn parse_segment(key: &str, segment: &str, leading: bool) -> Result<SubmissionKeyPart, KeyError> {
    let (name, condition) = if leading {
        // The form id may itself contain brackets; only the last version marker counts.
        let open = segment
            .rfind(VERSION_MARKER)
            .ok_or_else(|| KeyError::MissingVersionMarker(key.to_string()))?;
        (&segment[..open], Some(&segment[open..]))
    } else {
        match segment.find('[') {
            Some(open) => (&segment[..open], Some(&segment[open..])),
            None => (segment, None),
        }
    };
    if name.is_empty() || (!leading && name.contains(']')) {
        return Err(malformed(key, segment));
    }
    let mut part = SubmissionKeyPart::element(name);
    let Some(condition) = condition else {
        return Ok(part);
    };
    let inner = condition
        .strip_prefix("[@")
        .and_then(|inner| inner.strip_suffix(']'))
        .map(|inner| format!("@{inner}"))
        .ok_or_else(|| malformed(key, segment))?;

    if leading {
        let versions = inner
            .strip_prefix("@version=")
            .ok_or_else(|| malformed(key, segment))?;
        let (model, ui) = versions
            .split_once(UI_VERSION_MARKER)
            .ok_or_else(|| malformed(key, segment))?;
        part.version = Some(FormVersion {
            model_version: parse_version(key, segment, model)?,
            ui_version: parse_version(key, segment, ui)?,
        });
    } else if let Some(auri) = inner.strip_prefix(KEY_MARKER) {
        let auri = unquote(auri);
        if auri.is_empty() {
            return Err(malformed(key, segment));
        }
        part.auri = Some(auri.to_string());
    } else if let Some(ordinal) = inner.strip_prefix(ORDINAL_MARKER) {
        let ordinal = unquote(ordinal)
            .parse::<i64>()
            .map_err(|_| malformed(key, segment))?;
        part.ordinal = Some(ordinal);
    } else {
        return Err(malformed(key, segment));
    }
    Ok(part)
}

fn parse_version(key: &str, segment: &str, raw: &str) -> Result<Option<i64>, KeyError> {
    let raw = unquote(raw.trim());
    if raw == NULL_VERSION {
        return Ok(None);
    }
    raw.parse::<i64>()
        .map(Some)
        .map_err(|_| malformed(key, segment))
}

fn render_version(version: Option<i64>) -> String {
    version.map_or_else(|| NULL_VERSION.to_string(), |value| value.to_string())
}

fn unquote(raw: &str) -> &str {
    raw.strip_prefix('"')
        .and_then(|inner| inner.strip_suffix('"'))
        .unwrap_or(raw)
}

fn malformed(key: &str, segment: &str) -> KeyError {
    KeyError::MalformedSegment {
        key: key.to_string(),
        segment: segment.to_string(),
    }
}
