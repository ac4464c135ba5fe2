//! Session property wire encoding.
//!
//! Session properties travel as single strings built from quoted, escaped
//! substrings. A value holds one or more quoted groups (quote character `'`
//! or `"`); adjacent groups concatenate into a list, and anything between
//! groups is separator noise:
//!
//! ```text
//! "val1","val2","val3"   ->  [val1, val2, val3]
//! 'val1''val2''val3'     ->  [val1, val2, val3]
//! "val1" "val2" "val3"   ->  [val1, val2, val3]
//! ```
//!
//! Sets and maps are layered on the list codec: a set is a sorted list, a map
//! is a flattened alternating key,value list.
//!
//! # Example
//!
//! ```
//! use fluxion_client::properties;
//!
//! let encoded = properties::list_to_string([Some("a"), Some("b")]).unwrap();
//! assert_eq!(encoded, r#""a","b""#);
//! assert_eq!(properties::string_to_list(&encoded), vec!["a", "b"]);
//! ```

use std::collections::{HashMap, HashSet};

use crate::error::{ClientError, Result};

/// Fixed session property keys assigned by the server.
pub mod keys {
    /// Authenticated principal of the session.
    pub const PRINCIPAL: &str = "$Principal";
    /// Client SDK type tag.
    pub const CLIENT_TYPE: &str = "$ClientType";
    /// ISO 3166 country code.
    pub const COUNTRY: &str = "$Country";
    /// ISO 639 language code.
    pub const LANGUAGE: &str = "$Language";
    /// Geolocation latitude.
    pub const LATITUDE: &str = "$Latitude";
    /// Geolocation longitude.
    pub const LONGITUDE: &str = "$Longitude";
    /// Security roles granted to the session.
    pub const ROLES: &str = "$Roles";
    /// Server-assigned session identifier.
    pub const SESSION_ID: &str = "$SessionId";
    /// Name of the server the session connected to.
    pub const SERVER_NAME: &str = "$ServerName";
    /// Client internet address.
    pub const CLIENT_IP: &str = "$ClientIP";
    /// Session start time.
    pub const START_TIME: &str = "$StartTime";
}

/// Sentinel produced when a coordinate value fails to parse.
const NOT_A_NUMBER: &str = "NaN";

/// Split a property value into its quoted substrings.
///
/// Quote characters are stripped; escape sequences inside a group are kept
/// verbatim for a later [`unescape`]. A backslash escapes the character after
/// it, so an escaped quote does not terminate the group. Characters outside
/// any group are separators and are discarded, as is an unterminated trailing
/// group. An empty input yields an empty vector.
pub fn split(value: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut chars = value.chars();

    'outer: while let Some(c) = chars.next() {
        if c != '"' && c != '\'' {
            continue;
        }
        let quote = c;
        let mut token = String::new();
        while let Some(c) = chars.next() {
            if c == '\\' {
                token.push(c);
                if let Some(escaped) = chars.next() {
                    token.push(escaped);
                }
            } else if c == quote {
                tokens.push(token);
                continue 'outer;
            } else {
                token.push(c);
            }
        }
        // Unterminated group: discard.
        break;
    }
    tokens
}

/// Wrap a string in double quotes.
pub fn quote(value: &str) -> String {
    format!("\"{value}\"")
}

/// Escape backslash and both quote characters with a leading backslash.
pub fn escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '"' | '\'') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Reverse [`escape`]: a backslash yields the character after it.
pub fn unescape(value: &str) -> String {
    let mut unescaped = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some(escaped) => unescaped.push(escaped),
                None => unescaped.push(c),
            }
        } else {
            unescaped.push(c);
        }
    }
    unescaped
}

/// Decode a property value into a list of strings.
pub fn string_to_list(value: &str) -> Vec<String> {
    split(value).iter().map(|token| unescape(token)).collect()
}

fn encode_list<S: AsRef<str>>(values: &[S]) -> String {
    values
        .iter()
        .map(|v| quote(&escape(v.as_ref())))
        .collect::<Vec<_>>()
        .join(",")
}

/// Encode a list of optional strings into a property value.
///
/// Fails with [`ClientError::NullPropertyElement`] before any encoding
/// happens if any element is absent.
pub fn list_to_string<'a, I>(values: I) -> Result<String>
where
    I: IntoIterator<Item = Option<&'a str>>,
{
    let mut present = Vec::new();
    for value in values {
        match value {
            Some(v) => present.push(v),
            None => return Err(ClientError::NullPropertyElement),
        }
    }
    Ok(encode_list(&present))
}

/// Decode a property value into a set of strings.
pub fn string_to_set(value: &str) -> HashSet<String> {
    string_to_list(value).into_iter().collect()
}

/// Encode a set into its canonical property value.
///
/// Members are sorted first, so two sets with the same members always encode
/// identically. The empty set encodes as the empty string.
pub fn set_to_string(values: &HashSet<String>) -> String {
    let mut sorted: Vec<&str> = values.iter().map(String::as_str).collect();
    sorted.sort_unstable();
    encode_list(&sorted)
}

/// Decode a property value into a map.
///
/// The value is a flattened alternating key,value list; consecutive elements
/// pair up. Duplicate keys keep the last value; a trailing unpaired element
/// is dropped.
pub fn string_to_map(value: &str) -> HashMap<String, String> {
    let items = string_to_list(value);
    let mut map = HashMap::with_capacity(items.len() / 2);
    let mut iter = items.into_iter();
    while let (Some(key), Some(val)) = (iter.next(), iter.next()) {
        map.insert(key, val);
    }
    map
}

/// Encode a map as a flattened alternating key,value list.
///
/// Keys are walked in sorted order so equal maps encode identically.
pub fn map_to_string(map: &HashMap<String, String>) -> String {
    let mut keys: Vec<&str> = map.keys().map(String::as_str).collect();
    keys.sort_unstable();
    let mut flat = Vec::with_capacity(keys.len() * 2);
    for key in keys {
        flat.push(key);
        flat.push(map[key].as_str());
    }
    encode_list(&flat)
}

/// Parse a coordinate and re-render it in canonical form.
///
/// Returns the literal `"NaN"` when the input does not parse as a float.
pub fn parse_coordinate(value: &str) -> String {
    match value.trim().parse::<f64>() {
        Ok(parsed) => parsed.to_string(),
        Err(_) => NOT_A_NUMBER.to_string(),
    }
}

fn transform_roles(value: &str) -> Result<String> {
    let roles = string_to_set(value);
    if roles.is_empty() && !value.is_empty() {
        return Err(ClientError::Protocol(format!(
            "Malformed roles value: {value}"
        )));
    }
    Ok(set_to_string(&roles))
}

fn transform(key: &str, value: &str) -> Result<String> {
    match key {
        keys::COUNTRY => Ok(value.to_uppercase()),
        keys::LANGUAGE => Ok(value.to_lowercase()),
        keys::LATITUDE | keys::LONGITUDE => Ok(parse_coordinate(value)),
        keys::ROLES => transform_roles(value),
        _ => Ok(value.to_string()),
    }
}

/// Canonicalize a property map by applying each key's transform.
///
/// A transform failure drops only that key from the result; the rest of the
/// batch still succeeds.
pub fn canonicalize_properties(properties: &HashMap<String, String>) -> HashMap<String, String> {
    let mut canonical = HashMap::with_capacity(properties.len());
    for (key, value) in properties {
        match transform(key, value) {
            Ok(transformed) => {
                canonical.insert(key.clone(), transformed);
            }
            Err(err) => {
                tracing::debug!("Dropping property {}: {}", key, err);
            }
        }
    }
    canonical
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_double_quoted() {
        assert_eq!(
            split(r#""val1","val2","val3""#),
            vec!["val1", "val2", "val3"]
        );
    }

    #[test]
    fn test_split_single_quoted_adjacent() {
        assert_eq!(split("'val1''val2''val3'"), vec!["val1", "val2", "val3"]);
    }

    #[test]
    fn test_split_space_separated() {
        assert_eq!(split(r#""val1" "val2" "val3""#), vec!["val1", "val2", "val3"]);
    }

    #[test]
    fn test_split_mixed_quote_characters() {
        assert_eq!(split(r#""a",'b'"#), vec!["a", "b"]);
    }

    #[test]
    fn test_split_escaped_quote_does_not_terminate() {
        assert_eq!(split(r#""va\"l1""#), vec![r#"va\"l1"#]);
    }

    #[test]
    fn test_split_separator_noise_ignored() {
        assert_eq!(split(r#"xx"a"yy"b"zz"#), vec!["a", "b"]);
    }

    #[test]
    fn test_split_empty_input() {
        assert!(split("").is_empty());
    }

    #[test]
    fn test_split_unterminated_group_dropped() {
        assert_eq!(split(r#""a","b"#), vec!["a"]);
    }

    #[test]
    fn test_escape_unescape_round_trip() {
        for original in [
            "plain",
            r#"with "double" quotes"#,
            "with 'single' quotes",
            r"back\slash",
            r#"all \ " ' of them"#,
            "",
        ] {
            assert_eq!(unescape(&escape(original)), original);
        }
    }

    #[test]
    fn test_list_round_trip() {
        let values = vec!["a", r#"b"b"#, "c'c", r"d\d"];
        let encoded = list_to_string(values.iter().map(|v| Some(*v))).unwrap();
        assert_eq!(string_to_list(&encoded), values);
    }

    #[test]
    fn test_list_to_string_rejects_absent_element() {
        let result = list_to_string([Some("a"), None, Some("c")]);
        assert!(matches!(result, Err(ClientError::NullPropertyElement)));
    }

    #[test]
    fn test_set_canonical_order() {
        let ab: HashSet<String> = ["a".to_string(), "b".to_string()].into();
        let ba: HashSet<String> = ["b".to_string(), "a".to_string()].into();
        assert_eq!(set_to_string(&ab), set_to_string(&ba));
        assert_eq!(set_to_string(&ab), r#""a","b""#);
    }

    #[test]
    fn test_empty_set_is_empty_string() {
        assert_eq!(set_to_string(&HashSet::new()), "");
        assert!(string_to_set("").is_empty());
    }

    #[test]
    fn test_map_round_trip() {
        let map: HashMap<String, String> = [
            ("one".to_string(), "1".to_string()),
            ("two".to_string(), "2".to_string()),
        ]
        .into();
        assert_eq!(string_to_map(&map_to_string(&map)), map);
    }

    #[test]
    fn test_map_duplicate_key_last_wins() {
        let decoded = string_to_map(r#""k","first","k","second""#);
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded["k"], "second");
    }

    #[test]
    fn test_map_encode_is_deterministic() {
        let map: HashMap<String, String> = [
            ("b".to_string(), "2".to_string()),
            ("a".to_string(), "1".to_string()),
        ]
        .into();
        assert_eq!(map_to_string(&map), r#""a","1","b","2""#);
    }

    #[test]
    fn test_parse_coordinate() {
        assert_eq!(parse_coordinate("91.5"), "91.5");
        assert_eq!(parse_coordinate("  -7.25  "), "-7.25");
        assert_eq!(parse_coordinate("not-a-number"), "NaN");
    }

    #[test]
    fn test_canonicalize_country_and_language() {
        let props: HashMap<String, String> = [
            (keys::COUNTRY.to_string(), "gb".to_string()),
            (keys::LANGUAGE.to_string(), "EN".to_string()),
        ]
        .into();
        let canonical = canonicalize_properties(&props);
        assert_eq!(canonical[keys::COUNTRY], "GB");
        assert_eq!(canonical[keys::LANGUAGE], "en");
    }

    #[test]
    fn test_canonicalize_coordinates() {
        let props: HashMap<String, String> = [
            (keys::LATITUDE.to_string(), "51.5".to_string()),
            (keys::LONGITUDE.to_string(), "junk".to_string()),
        ]
        .into();
        let canonical = canonicalize_properties(&props);
        assert_eq!(canonical[keys::LATITUDE], "51.5");
        assert_eq!(canonical[keys::LONGITUDE], "NaN");
    }

    #[test]
    fn test_canonicalize_roles_sorted() {
        let props: HashMap<String, String> =
            [(keys::ROLES.to_string(), r#""OPERATOR","ADMIN""#.to_string())].into();
        let canonical = canonicalize_properties(&props);
        assert_eq!(canonical[keys::ROLES], r#""ADMIN","OPERATOR""#);
    }

    #[test]
    fn test_canonicalize_drops_only_failing_key() {
        let props: HashMap<String, String> = [
            (keys::ROLES.to_string(), "unquoted-garbage".to_string()),
            ("custom".to_string(), "kept".to_string()),
        ]
        .into();
        let canonical = canonicalize_properties(&props);
        assert!(!canonical.contains_key(keys::ROLES));
        assert_eq!(canonical["custom"], "kept");
    }

    #[test]
    fn test_unknown_keys_pass_through() {
        let props: HashMap<String, String> =
            [("Department".to_string(), "Ops".to_string())].into();
        let canonical = canonicalize_properties(&props);
        assert_eq!(canonical["Department"], "Ops");
    }
}
