use std::sync::OnceLock;

use regex::Regex;
use url::Url;

/// Name used when sanitizing leaves nothing usable
pub const FALLBACK_NAME: &str = "downloaded_file";

/// Maximum filename length, counted in codepoints to stay portable
const MAX_NAME_LEN: usize = 250;

/// Characters that are invalid on at least one common filesystem
fn invalid_chars() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"[\\/:*?"<>|]"#).unwrap())
}

fn underscore_runs() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"_+").unwrap())
}

/// Normalize a raw, possibly percent-encoded, possibly hostile string
/// into a filesystem-safe filename.
///
/// Total function: any input yields a usable name, falling back to
/// [`FALLBACK_NAME`] when nothing survives the cleaning.
pub fn sanitize(raw: &str) -> String {
    // Best-effort percent-decoding: invalid sequences are replaced, not fatal
    let decoded = urlencoding::decode_binary(raw.as_bytes());
    let decoded = String::from_utf8_lossy(&decoded).into_owned();

    // Some sources double-encode spaces, leaving a literal "%20" after decoding
    let decoded = decoded.replace("%20", " ");

    let cleaned = invalid_chars().replace_all(&decoded, "_");
    let cleaned = underscore_runs().replace_all(&cleaned, "_");
    let cleaned = cleaned.trim_matches(|c| matches!(c, '.' | '_' | ' '));

    let cleaned: String = cleaned.chars().take(MAX_NAME_LEN).collect();
    // Truncation may expose a new trailing separator
    let cleaned = cleaned.trim_end_matches(|c| matches!(c, '.' | '_' | ' '));

    if cleaned.is_empty() {
        FALLBACK_NAME.to_string()
    } else {
        cleaned.to_string()
    }
}

/// Derive a filename from a URL.
///
/// Returns `None` for anything that is not http(s).
/// A URL without a usable path segment gets a name synthesized from its host.
pub fn name_from_url(raw: &str) -> Option<String> {
    let url = Url::parse(raw).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }

    let last_segment = url
        .path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
        .map(str::to_owned);

    let raw_name = last_segment.unwrap_or_else(|| {
        let host = url.host_str().unwrap_or("remote").replace('.', "_");
        format!("{host}_file")
    });

    Some(sanitize(&raw_name))
}
