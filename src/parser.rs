//! Pure extraction functions over the fetched homepage HTML and ondemand JS.
//!
//! Everything the animation engine needs comes out of two documents: the
//! site-verification meta tag and one SVG loading-animation frame from the
//! homepage, plus the integer indices scattered through the ondemand chunk
//! as `(e[N], 16)` radix conversions.

use base64::{Engine as _, engine::general_purpose::STANDARD};
use regex::Regex;

use crate::error::Error;

/// Frames are chosen by `key_bytes[5] % 4`.
const FRAME_SELECTOR_INDEX: usize = 5;
const FRAME_COUNT: u8 = 4;

fn pattern(re: &str) -> Result<Regex, Error> {
    Regex::new(re).map_err(|err| Error::Parse(format!("pattern compile: {err}")))
}

/// Finds the `twitter-site-verification` meta tag and returns its content.
///
/// Attribute order is not guaranteed, so both `name`-first and
/// `content`-first forms are tried.
pub fn extract_verification_key(html: &str) -> Result<String, Error> {
    let name_first = pattern(
        r#"<meta[^>]*\bname=["']twitter-site-verification["'][^>]*\bcontent=["']([^"']*)["']"#,
    )?;
    if let Some(cap) = name_first.captures(html) {
        return Ok(cap[1].to_owned());
    }

    let content_first = pattern(
        r#"<meta[^>]*\bcontent=["']([^"']*)["'][^>]*\bname=["']twitter-site-verification["']"#,
    )?;
    if let Some(cap) = content_first.captures(html) {
        return Ok(cap[1].to_owned());
    }

    Err(Error::Parse(
        "twitter-site-verification meta tag not found".into(),
    ))
}

/// Decodes the verification key into ordered byte material.
pub fn decode_verification_key(key: &str) -> Result<Vec<u8>, Error> {
    let key_bytes = STANDARD.decode(key)?;
    if key_bytes.is_empty() {
        return Err(Error::Parse("verification key decoded to nothing".into()));
    }
    Ok(key_bytes)
}

/// Extracts the integer indices from the ondemand JS.
///
/// Matches of `(\w[N], 16)` in appearance order: the first is the row
/// index, the rest select key bytes for the frame-time product.
pub fn extract_indices(ondemand_js: &str) -> Result<(usize, Vec<usize>), Error> {
    let index_pattern = pattern(r"\(\w\[(\d{1,2})\],\s*16\)")?;

    let indices = index_pattern
        .captures_iter(ondemand_js)
        .filter_map(|cap| cap[1].parse::<usize>().ok())
        .collect::<Vec<_>>();

    match indices.split_first() {
        Some((&row_index, key_bytes_indices)) => Ok((row_index, key_bytes_indices.to_vec())),
        None => Err(Error::Parse("no indices found in ondemand file".into())),
    }
}

/// Extracts the numeric rows of the selected SVG animation frame.
///
/// The frame id is `loading-x-anim-{key_bytes[5] % 4}`. Within it, the
/// first `<path>` whose `d` attribute is longer than 9 characters and
/// contains a `C` carries the curve data; everything after the initial move
/// command (`d[9..]`) splits on `C` into one integer row per segment.
pub fn extract_frame_rows(html: &str, key_bytes: &[u8]) -> Result<Vec<Vec<i32>>, Error> {
    let selector_byte = key_bytes.get(FRAME_SELECTOR_INDEX).ok_or_else(|| {
        Error::Extraction(format!(
            "key bytes too short for frame selection ({} < {})",
            key_bytes.len(),
            FRAME_SELECTOR_INDEX + 1
        ))
    })?;
    let frame_index = selector_byte % FRAME_COUNT;
    let frame_id = format!("loading-x-anim-{frame_index}");

    let frame_pattern = pattern(&format!(r#"(?s)id=['"]{frame_id}['"][^>]*>(.*?)</g>"#))?;
    let frame_content = frame_pattern
        .captures(html)
        .map(|cap| cap.get(1).map_or("", |m| m.as_str()).to_owned())
        .ok_or_else(|| Error::Parse(format!("frame {frame_id} not found in homepage")))?;

    let path_pattern = pattern(r#"<path[^>]*\sd=['"]([^'"]*?)['"][^>]*>"#)?;
    let path_data = path_pattern
        .captures_iter(&frame_content)
        .map(|cap| cap[1].to_owned())
        .find(|d| d.len() > 9 && d.contains('C'))
        .ok_or_else(|| Error::Parse(format!("no curve path found in frame {frame_id}")))?;

    let rows = parse_path_rows(&path_data)?;
    if rows.is_empty() {
        return Err(Error::Extraction(format!(
            "frame {frame_id} contained no numeric rows"
        )));
    }
    Ok(rows)
}

/// Splits curve data into integer rows, one per `C` segment. Non-digit runs
/// become separators, so signs and decimals never survive.
fn parse_path_rows(path_data: &str) -> Result<Vec<Vec<i32>>, Error> {
    let separator = pattern(r"[^\d]+")?;
    let curve_data = path_data.get(9..).unwrap_or("");

    Ok(curve_data
        .split('C')
        .map(|segment| {
            separator
                .replace_all(segment, " ")
                .split_whitespace()
                .filter_map(|token| token.parse::<i32>().ok())
                .collect::<Vec<_>>()
        })
        .filter(|row| !row.is_empty())
        .collect())
}
