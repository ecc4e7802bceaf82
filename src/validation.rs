//! Structural validation of OpenSSH `authorized_keys` text.
//!
//! Each non-blank, non-comment line must be
//! `[options] keytype base64-body [comment]`. The whole payload is rejected
//! if any single line is malformed.

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use tracing::debug;

use crate::error::{AkdError, Result};

/// Key types accepted in the key-type column
pub const KEY_TYPES: &[&str] = &[
    "ssh-rsa",
    "ssh-dss",
    "ssh-ed25519",
    "ecdsa-sha2-nistp256",
    "ecdsa-sha2-nistp384",
    "ecdsa-sha2-nistp521",
    "sk-ecdsa-sha2-nistp256@openssh.com",
    "sk-ssh-ed25519@openssh.com",
    "ssh-rsa-cert-v01@openssh.com",
    "ssh-dss-cert-v01@openssh.com",
    "ssh-ed25519-cert-v01@openssh.com",
    "ecdsa-sha2-nistp256-cert-v01@openssh.com",
    "ecdsa-sha2-nistp384-cert-v01@openssh.com",
    "ecdsa-sha2-nistp521-cert-v01@openssh.com",
    "sk-ecdsa-sha2-nistp256-cert-v01@openssh.com",
    "sk-ssh-ed25519-cert-v01@openssh.com",
];

/// Options that take no value
const FLAG_OPTIONS: &[&str] = &[
    "agent-forwarding",
    "cert-authority",
    "no-agent-forwarding",
    "no-port-forwarding",
    "no-pty",
    "no-user-rc",
    "no-x11-forwarding",
    "port-forwarding",
    "pty",
    "no-touch-required",
    "verify-required",
    "restrict",
    "user-rc",
    "x11-forwarding",
];

/// Options that require a quoted value
const VALUE_OPTIONS: &[&str] = &[
    "command",
    "environment",
    "expiry-time",
    "from",
    "permitlisten",
    "permitopen",
    "principals",
    "tunnel",
];

/// Why a single line is not a valid authorization entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineError {
    UnterminatedQuote,
    EmptyOption,
    UnknownOption(String),
    UnexpectedOptionValue(String),
    MissingOptionValue(String),
    MissingKeyType,
    UnknownKeyType(String),
    MissingKeyBody,
    InvalidKeyBody(String),
}

impl std::fmt::Display for LineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LineError::UnterminatedQuote => write!(f, "Unterminated quote in options"),
            LineError::EmptyOption => write!(f, "Empty option in option list"),
            LineError::UnknownOption(name) => write!(f, "Unknown option: {}", name),
            LineError::UnexpectedOptionValue(name) => {
                write!(f, "Option {} does not take a value", name)
            }
            LineError::MissingOptionValue(name) => {
                write!(f, "Option {} requires a quoted value", name)
            }
            LineError::MissingKeyType => write!(f, "Missing key type"),
            LineError::UnknownKeyType(kind) => write!(f, "Unknown key type: {}", kind),
            LineError::MissingKeyBody => write!(f, "Missing key data"),
            LineError::InvalidKeyBody(reason) => write!(f, "Invalid key data: {}", reason),
        }
    }
}

/// One parsed authorization entry, borrowed from the input line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyEntry<'a> {
    pub options: Option<&'a str>,
    pub key_type: &'a str,
    pub body: &'a str,
    pub comment: Option<&'a str>,
}

/// Parse a single line. Blank and `#` comment lines yield `Ok(None)`.
pub fn parse_line(line: &str) -> std::result::Result<Option<KeyEntry<'_>>, LineError> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let (first, rest) = split_token(line)?;
    let (options, key_type, rest) = if KEY_TYPES.contains(&first) {
        (None, first, rest)
    } else if rest.is_empty() {
        // A lone word is a bad key type, not an options list
        return Err(LineError::UnknownKeyType(first.to_string()));
    } else {
        check_options(first)?;
        let (key_type, rest) = split_token(rest)?;
        if key_type.is_empty() {
            return Err(LineError::MissingKeyType);
        }
        if !KEY_TYPES.contains(&key_type) {
            return Err(LineError::UnknownKeyType(key_type.to_string()));
        }
        (Some(first), key_type, rest)
    };

    let (body, comment) = match rest.split_once(char::is_whitespace) {
        Some((body, comment)) => (body, Some(comment.trim_start())),
        None => (rest, None),
    };
    if body.is_empty() {
        return Err(LineError::MissingKeyBody);
    }
    match BASE64.decode(body) {
        Ok(bytes) if !bytes.is_empty() => {}
        Ok(_) => return Err(LineError::MissingKeyBody),
        Err(e) => return Err(LineError::InvalidKeyBody(e.to_string())),
    }

    Ok(Some(KeyEntry {
        options,
        key_type,
        body,
        comment: comment.filter(|c| !c.is_empty()),
    }))
}

/// Validate a whole payload and return the number of key entries.
///
/// Fails closed: the first malformed line rejects everything.
pub fn validate_authorized_keys(data: &[u8]) -> Result<usize> {
    let text = std::str::from_utf8(data).map_err(|e| {
        let line = data[..e.valid_up_to()].iter().filter(|&&b| b == b'\n').count() + 1;
        AkdError::KeyFormatInvalid {
            line,
            reason: "Not valid UTF-8".to_string(),
        }
    })?;

    let mut entries = 0;
    for (index, line) in text.lines().enumerate() {
        match parse_line(line) {
            Ok(Some(_)) => entries += 1,
            Ok(None) => {}
            Err(e) => {
                return Err(AkdError::KeyFormatInvalid {
                    line: index + 1,
                    reason: e.to_string(),
                });
            }
        }
    }

    debug!("Validated {} authorized_keys entries", entries);
    Ok(entries)
}

/// Split off the first whitespace-delimited token, honouring double quotes.
fn split_token(line: &str) -> std::result::Result<(&str, &str), LineError> {
    let mut in_quote = false;
    let mut escaped = false;
    for (i, c) in line.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' if in_quote => escaped = true,
            '"' => in_quote = !in_quote,
            c if c.is_whitespace() && !in_quote => {
                return Ok((&line[..i], line[i..].trim_start()));
            }
            _ => {}
        }
    }
    if in_quote {
        return Err(LineError::UnterminatedQuote);
    }
    Ok((line, ""))
}

/// Check a comma-separated option list
fn check_options(options: &str) -> std::result::Result<(), LineError> {
    let mut start = 0;
    let mut in_quote = false;
    let mut escaped = false;
    for (i, c) in options.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' if in_quote => escaped = true,
            '"' => in_quote = !in_quote,
            ',' if !in_quote => {
                check_option(&options[start..i])?;
                start = i + 1;
            }
            _ => {}
        }
    }
    if in_quote {
        return Err(LineError::UnterminatedQuote);
    }
    check_option(&options[start..])
}

fn check_option(option: &str) -> std::result::Result<(), LineError> {
    if option.is_empty() {
        return Err(LineError::EmptyOption);
    }

    let (name, value) = match option.split_once('=') {
        Some((name, value)) => (name, Some(value)),
        None => (option, None),
    };
    let lower = name.to_ascii_lowercase();

    if FLAG_OPTIONS.contains(&lower.as_str()) {
        return match value {
            None => Ok(()),
            Some(_) => Err(LineError::UnexpectedOptionValue(name.to_string())),
        };
    }

    if VALUE_OPTIONS.contains(&lower.as_str()) {
        return match value {
            Some(v) if v.len() >= 2 && v.starts_with('"') && v.ends_with('"') => Ok(()),
            _ => Err(LineError::MissingOptionValue(name.to_string())),
        };
    }

    Err(LineError::UnknownOption(name.to_string()))
}
