//! Destination file name extraction from `Content-Disposition`.

use percent_encoding::percent_decode_str;

use resumable_core::error::AppError;
use resumable_core::result::AppResult;

/// Extract the `filename` parameter of a Content-Disposition value.
///
/// Accepts quoted (`filename="a b.pdf"`), bare token (`filename=a.pdf`)
/// and RFC 5987 extended (`filename*=UTF-8''a%20b.pdf`) forms. The extended
/// form wins when both are present. The name becomes a path component under
/// the destination root, so separators and dot segments are rejected.
pub fn parse_file_name(header: &str) -> AppResult<String> {
    let mut plain = None;
    let mut extended = None;

    let mut parts = split_params(header).into_iter();
    let disposition = parts.next().unwrap_or_default();
    if disposition.is_empty() || disposition.contains('=') {
        return Err(AppError::missing_file_name(format!(
            "Content-Disposition '{header}' has no disposition type"
        )));
    }

    for part in parts {
        let Some((key, value)) = part.split_once('=') else {
            continue;
        };
        let key = key.trim();
        let value = value.trim();
        if key.eq_ignore_ascii_case("filename") {
            plain = Some(unquote(value));
        } else if key.eq_ignore_ascii_case("filename*") {
            extended = decode_extended(value);
        }
    }

    let name = extended.or(plain).ok_or_else(|| {
        AppError::missing_file_name(format!(
            "Content-Disposition '{header}' carries no filename parameter"
        ))
    })?;

    validate(&name)?;
    Ok(name)
}

/// Split on `;` outside quoted strings.
fn split_params(header: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut escaped = false;

    for c in header.chars() {
        match c {
            _ if escaped => {
                current.push(c);
                escaped = false;
            }
            '\\' if in_quotes => {
                current.push(c);
                escaped = true;
            }
            '"' => {
                current.push(c);
                in_quotes = !in_quotes;
            }
            ';' if !in_quotes => {
                parts.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(c),
        }
    }
    parts.push(current.trim().to_string());
    parts
}

fn unquote(value: &str) -> String {
    let Some(inner) = value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
    else {
        return value.to_string();
    };

    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Decode `charset'language'percent-encoded` (RFC 5987). Only UTF-8 and
/// US-ASCII charsets are understood.
fn decode_extended(value: &str) -> Option<String> {
    let mut pieces = value.splitn(3, '\'');
    let charset = pieces.next()?;
    let _language = pieces.next()?;
    let encoded = pieces.next()?;

    if !charset.eq_ignore_ascii_case("utf-8") && !charset.eq_ignore_ascii_case("us-ascii") {
        return None;
    }

    percent_decode_str(encoded)
        .decode_utf8()
        .ok()
        .map(|name| name.into_owned())
}

fn validate(name: &str) -> AppResult<()> {
    if name.is_empty() || name == "." || name == ".." {
        return Err(AppError::missing_file_name(format!(
            "File name '{name}' is not usable"
        )));
    }
    if name.contains(['/', '\\', '\0']) {
        return Err(AppError::missing_file_name(format!(
            "File name '{name}' contains path separators"
        )));
    }
    Ok(())
}
