//! Textual form of a [`PartitionPolicy`] inside a table comment.
//!
//! ```text
//! [rk:<pattern>:<step>:<lead>:<retention>]      e.g. [rk:p{n}:1000:2:3]
//! [rk:<pattern>:<step>:<lead>:<retention>:f]    e.g. [rk:p{%Y%m%d}:1d@days:7:30:f]
//! ```
//!
//! The marker may be surrounded by free text. The trailing `f` turns on
//! `force_drop`.

use super::{BoundaryStep, NamingPattern, PartitionPolicy, PolicyError};

/// Prefix identifying a policy inside a table comment.
pub const MARKER: &str = "[rk:";

const FORCE_DROP_FLAG: &str = "f";

pub fn encode(policy: &PartitionPolicy) -> String {
    format!(
        "{MARKER}{}:{}:{}:{}{}]",
        policy.naming_pattern(),
        policy.boundary_step(),
        policy.lead_count(),
        policy.retention_count(),
        if policy.force_drop() {
            format!(":{FORCE_DROP_FLAG}")
        } else {
            String::new()
        }
    )
}

/// Policy carried by `text`, or `None` when there is none or it is invalid.
pub fn decode(text: &str) -> Option<PartitionPolicy> {
    match decode_strict(text) {
        Ok(policy) => Some(policy),
        Err(PolicyError::MissingMarker) => None,
        Err(e) => {
            tracing::debug!(error = %e, comment = text, "Ignoring invalid partitioning policy");
            None
        }
    }
}

/// Like [`decode`] but reports why `text` carries no usable policy.
pub fn decode_strict(text: &str) -> Result<PartitionPolicy, PolicyError> {
    let (_, body, _) = locate(text)?;

    let fields: Vec<&str> = body.split(':').collect();
    let (pattern, step, lead, retention, force_drop) = match fields.as_slice() {
        [pattern, step, lead, retention] => (*pattern, *step, *lead, *retention, false),
        [pattern, step, lead, retention, FORCE_DROP_FLAG] => {
            (*pattern, *step, *lead, *retention, true)
        }
        [_, _, _, _, flag] => {
            return Err(PolicyError::Malformed(format!(
                "unknown flag '{flag}', expected '{FORCE_DROP_FLAG}'"
            )));
        }
        other => {
            return Err(PolicyError::Malformed(format!(
                "expected 4 or 5 ':'-separated fields, found {}",
                other.len()
            )));
        }
    };

    PartitionPolicy::new(
        NamingPattern::parse(pattern)?,
        step.parse::<BoundaryStep>()?,
        parse_count("lead count", lead)?,
        parse_count("retention count", retention)?,
        force_drop,
    )
}

/// `comment` with its policy replaced by `policy`, or with `policy`
/// appended when it carries none. Surrounding text is preserved.
pub fn replace_in_comment(comment: &str, policy: &PartitionPolicy) -> String {
    let encoded = encode(policy);
    match locate(comment) {
        Ok((start, _, end)) => format!("{}{encoded}{}", &comment[..start], &comment[end..]),
        Err(_) if comment.trim().is_empty() => encoded,
        Err(_) => format!("{} {encoded}", comment.trim_end()),
    }
}

/// Byte range of the marker block in `text` and the body between the
/// marker and the closing bracket.
fn locate(text: &str) -> Result<(usize, &str, usize), PolicyError> {
    let start = text.find(MARKER).ok_or(PolicyError::MissingMarker)?;
    let body_start = start + MARKER.len();
    let close = text[body_start..]
        .find(']')
        .ok_or_else(|| PolicyError::Malformed("missing closing ']'".to_string()))?;
    let body_end = body_start + close;
    Ok((start, &text[body_start..body_end], body_end + 1))
}

fn parse_count(field: &'static str, value: &str) -> Result<u32, PolicyError> {
    value.parse::<u32>().map_err(|_| PolicyError::InvalidNumber {
        field,
        value: value.to_string(),
    })
}
