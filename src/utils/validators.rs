use anyhow::{anyhow, Result};

pub const ALLOWED_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "gif", "gpx"];

/// Lower-cased extension of `filename` if it is one we accept for upload.
pub fn allowed_extension(filename: &str) -> Option<String> {
    let (_, ext) = filename.rsplit_once('.')?;
    let ext = ext.to_ascii_lowercase();
    ALLOWED_EXTENSIONS.contains(&ext.as_str()).then_some(ext)
}

/// Reduce a client-supplied file name to a flat, ASCII-only name that is safe
/// to join onto the upload directory. May return an empty string.
pub fn secure_filename(filename: &str) -> String {
    let flattened: String = filename
        .chars()
        .filter(char::is_ascii)
        .map(|c| if c == '/' || c == '\\' { ' ' } else { c })
        .collect();

    let joined = flattened.split_whitespace().collect::<Vec<_>>().join("_");

    joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        .collect::<String>()
        .trim_matches(|c| c == '.' || c == '_')
        .to_string()
}

/// Parse an optional 1-based page number; absent means the first page.
pub fn parse_page(raw: Option<&str>) -> Result<u64> {
    let Some(raw) = raw else {
        return Ok(1);
    };

    match raw.trim().parse::<i64>() {
        Ok(page) if page >= 1 => Ok(page as u64),
        _ => Err(anyhow!(
            "Invalid 'page' parameter, must be a positive integer"
        )),
    }
}

/// Row offset of a 1-based `page`, or `None` when it lies past anything the
/// database can address. Such a page is simply empty.
pub fn page_offset(page: u64, per_page: u64) -> Option<u64> {
    page.checked_sub(1)?
        .checked_mul(per_page)
        .filter(|offset| i64::try_from(*offset).is_ok())
}

/// Names of the fields whose value is absent or empty, in the given order.
pub fn missing_fields<'a>(fields: &[(&'a str, bool)]) -> Vec<&'a str> {
    fields
        .iter()
        .filter(|(_, present)| !present)
        .map(|(name, _)| *name)
        .collect()
}
