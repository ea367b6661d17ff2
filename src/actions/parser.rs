// src/actions/parser.rs

//! Textual action parser
//!
//! A single left-to-right pass over the bytes of the action line. The first
//! whitespace-delimited token is the kind; an optional bare token that
//! follows it (before any attribute) is the positional hash; everything else
//! is `key=value` with values optionally quoted by `'` or `"`. Inside quotes a
//! backslash escapes a backslash or the active quote character and is kept
//! literally before anything else.

use std::collections::BTreeMap;

use super::{Action, ActionError, ActionKind, AttrValue, add_attr};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Key,
    Unquoted,
    Quoted(u8),
    Whitespace,
}

/// Raw result of tokenizing an action line, before kind-specific rules
#[derive(Debug, Default)]
struct RawAction {
    kind: String,
    hash: Option<String>,
    attrs: BTreeMap<String, AttrValue>,
}

fn is_ws(b: u8) -> bool {
    b == b' ' || b == b'\t'
}

fn malformed(line: &str, position: usize, reason: &str) -> ActionError {
    ActionError::Malformed {
        action: line.to_string(),
        position,
        reason: reason.to_string(),
    }
}

fn utf8(line: &str, bytes: Vec<u8>) -> Result<String, ActionError> {
    String::from_utf8(bytes).map_err(|e| ActionError::invalid(line, e.to_string()))
}

impl RawAction {
    /// Store a completed value, routing `hash=` to the hash slot
    fn finish_value(&mut self, line: &str, key: &str, value: String) -> Result<(), ActionError> {
        if key == "hash" {
            if let Some(existing) = &self.hash
                && *existing != value
            {
                return Err(ActionError::invalid(
                    line,
                    "hash attribute not identical to positional hash",
                ));
            }
            self.hash = Some(value);
        } else {
            add_attr(&mut self.attrs, key, value);
        }
        Ok(())
    }
}

fn tokenize(line: &str) -> Result<RawAction, ActionError> {
    let bytes = line.as_bytes();
    let len = bytes.len();

    let Some(type_end) = bytes.iter().position(|&b| is_ws(b)) else {
        return Err(malformed(line, len, "no attributes"));
    };

    let mut raw = RawAction {
        kind: line[..type_end].to_string(),
        ..Default::default()
    };

    let mut state = State::Whitespace;
    let mut key_start = type_end;
    let mut key = String::new();
    let mut value_start = type_end;
    let mut quoted: Vec<u8> = Vec::new();
    let mut i = type_end;

    while i < len {
        let b = bytes[i];
        match state {
            State::Key => {
                if is_ws(b) {
                    if !raw.attrs.is_empty() || raw.hash.is_some() {
                        return Err(malformed(line, i, "whitespace in key"));
                    }
                    raw.hash = Some(line[key_start..i].to_string());
                    state = State::Whitespace;
                } else if b == b'=' {
                    key = line[key_start..i].to_string();
                    if key == "data" {
                        return Err(ActionError::invalid(line, "invalid key: 'data'"));
                    }
                    i += 1;
                    if i == len {
                        return Err(malformed(line, i, "missing value"));
                    }
                    let next = bytes[i];
                    if next == b'\'' || next == b'"' {
                        state = State::Quoted(next);
                        quoted.clear();
                    } else if is_ws(next) {
                        return Err(malformed(line, i, "missing value"));
                    } else {
                        state = State::Unquoted;
                        value_start = i;
                    }
                } else if b == b'\'' || b == b'"' {
                    return Err(malformed(line, i, "quote in key"));
                }
            }
            State::Quoted(q) => {
                if b == b'\\' {
                    if i == len - 1 {
                        // Dangling escape: the value can never be closed.
                        i = len;
                        break;
                    }
                    i += 1;
                    let escaped = bytes[i];
                    if escaped != b'\\' && escaped != q {
                        quoted.push(b'\\');
                    }
                    quoted.push(escaped);
                } else if b == q {
                    let value = utf8(line, std::mem::take(&mut quoted))?;
                    raw.finish_value(line, &key, value)?;
                    state = State::Whitespace;
                } else {
                    quoted.push(b);
                }
            }
            State::Unquoted => {
                if is_ws(b) {
                    let value = line[value_start..i].to_string();
                    raw.finish_value(line, &key, value)?;
                    state = State::Whitespace;
                }
            }
            State::Whitespace => {
                if !is_ws(b) {
                    if b == b'=' {
                        return Err(malformed(line, i, "missing key"));
                    }
                    state = State::Key;
                    key_start = i;
                }
            }
        }
        i += 1;
    }

    match state {
        State::Quoted(_) => Err(malformed(line, i, "unfinished quoted value")),
        State::Key => Err(malformed(line, i, "missing value")),
        State::Unquoted => {
            let value = line[value_start..].to_string();
            raw.finish_value(line, &key, value)?;
            Ok(raw)
        }
        State::Whitespace => Ok(raw),
    }
}

/// Parse one action from its textual form
///
/// Fails with [`ActionError::Malformed`] on syntax errors,
/// [`ActionError::UnknownAction`] for kinds outside [`ActionKind`], and
/// [`ActionError::Invalid`] when the kind's key attribute is missing.
pub fn parse_action(line: &str) -> Result<Action, ActionError> {
    let raw = tokenize(line)?;

    let kind: ActionKind = raw.kind.parse().map_err(|_| ActionError::UnknownAction {
        action: line.to_string(),
        kind: raw.kind.clone(),
    })?;

    let action = Action::new(kind, raw.hash, raw.attrs)?;

    let key_attr = kind.key_attr();
    if !action.has_attr(key_attr) {
        return Err(ActionError::invalid(
            line,
            format!("required attribute '{}' was not provided.", key_attr),
        ));
    }

    Ok(action)
}
