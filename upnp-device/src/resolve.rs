//! Relative-reference resolution against a device's base location.

use url::Url;

use crate::error::ResolveError;

/// Resolve `reference` to an absolute URL.
///
/// A scheme-qualified reference is returned unchanged, byte for byte. Anything
/// else joins against `urlbase` (normalized to end with `/`) when one is
/// present, otherwise against `location`, with standard relative-join
/// semantics. Note that joining re-serializes the URL, so scheme-default
/// ports (`http://host:80/`) come back without the port.
///
/// # Errors
///
/// Returns `ResolveError::InvalidBase` if the chosen base is not a valid
/// absolute URL, and `ResolveError::Join` if the reference cannot be joined
/// against it.
pub fn resolve(
    reference: &str,
    urlbase: Option<&str>,
    location: &str,
) -> Result<String, ResolveError> {
    if Url::parse(reference).is_ok() {
        return Ok(reference.to_string());
    }

    let base = match urlbase {
        Some(base) if !base.is_empty() => {
            if base.ends_with('/') {
                base.to_string()
            } else {
                format!("{base}/")
            }
        }
        _ => location.to_string(),
    };

    let base_url = Url::parse(&base).map_err(|_| ResolveError::InvalidBase(base.clone()))?;
    let joined = base_url.join(reference).map_err(|_| ResolveError::Join {
        reference: reference.to_string(),
        base,
    })?;

    Ok(joined.to_string())
}

/// Resolve `reference` against the scheme+host of `location` only, ignoring
/// the location's path. Icon URLs resolve this way.
pub(crate) fn resolve_against_origin(
    reference: &str,
    location: &str,
) -> Result<String, ResolveError> {
    if Url::parse(reference).is_ok() {
        return Ok(reference.to_string());
    }

    let mut origin =
        Url::parse(location).map_err(|_| ResolveError::InvalidBase(location.to_string()))?;
    origin.set_path("/");
    origin.set_query(None);
    origin.set_fragment(None);

    let joined = origin.join(reference).map_err(|_| ResolveError::Join {
        reference: reference.to_string(),
        base: location.to_string(),
    })?;

    Ok(joined.to_string())
}
