//! The raw-JSON splicing protocol peers use to exchange entity arrays
//! without a decode/encode round-trip.
//!
//! A peer's `return-as-2-json-objects=yes` response body is two JSON
//! arrays — entities, then failures — separated by an 8-byte delimiter
//! that cannot appear inside valid JSON text. The aggregator never
//! parses the entities array; it strips the outer brackets and joins
//! raw bytes.

/// Separates the entities array from the failures array in a framed
/// response body. Chosen so it can never appear inside a JSON document.
pub const BODY_CONNECTOR: &[u8] = b"\n\n\xff\xff\xff\xff\n\n";

/// Splits a framed response body into its raw entities and failures
/// halves. Returns `None` if the delimiter is absent (a malformed or
/// unframed body).
pub fn split_framed_body(body: &[u8]) -> Option<(&[u8], &[u8])> {
    let position = find_subslice(body, BODY_CONNECTOR)?;
    let (entities, rest) = body.split_at(position);
    Some((entities, &rest[BODY_CONNECTOR.len()..]))
}

/// Joins a raw entities array and a raw failures array into one framed
/// body, the inverse of [`split_framed_body`].
pub fn join_framed_body(entities: &[u8], failures: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(entities.len() + BODY_CONNECTOR.len() + failures.len());
    body.extend_from_slice(entities);
    body.extend_from_slice(BODY_CONNECTOR);
    body.extend_from_slice(failures);
    body
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Strips the outer `[` `]` from a raw JSON array's bytes, trimming
/// surrounding whitespace first. Returns the inner content unchanged
/// (possibly empty) if `raw` is a well-formed array; falls back to
/// returning `raw` as-is otherwise so a malformed peer body degrades to
/// an empty contribution rather than panicking.
pub fn strip_array_brackets(raw: &[u8]) -> &[u8] {
    let trimmed = trim_ascii_whitespace(raw);
    match (trimmed.first(), trimmed.last()) {
        (Some(b'['), Some(b']')) if trimmed.len() >= 2 => &trimmed[1..trimmed.len() - 1],
        _ => b"",
    }
}

fn trim_ascii_whitespace(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|b| !b.is_ascii_whitespace()).unwrap_or(bytes.len());
    let end = bytes
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map(|p| p + 1)
        .unwrap_or(start);
    &bytes[start..end]
}

/// Merges raw entity arrays from multiple sources into one JSON array's
/// bytes, `[` `]` included, by stripping each source's outer brackets
/// and joining the trimmed contents with `,\n\n`. Empty contributions
/// are skipped so two peers never produce a spurious leading comma.
pub fn splice_entity_arrays<'a, I>(arrays: I) -> Vec<u8>
where
    I: IntoIterator<Item = &'a [u8]>,
{
    let mut merged = Vec::new();
    merged.push(b'[');
    let mut first = true;
    for raw in arrays {
        let inner = trim_ascii_whitespace(strip_array_brackets(raw));
        if inner.is_empty() {
            continue;
        }
        if !first {
            merged.extend_from_slice(b",\n\n");
        }
        merged.extend_from_slice(inner);
        first = false;
    }
    merged.push(b']');
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_and_join_round_trip() {
        let entities = br#"[{"pid":1}]"#;
        let failures = br#"[]"#;
        let framed = join_framed_body(entities, failures);
        let (split_entities, split_failures) = split_framed_body(&framed).unwrap();
        assert_eq!(split_entities, entities);
        assert_eq!(split_failures, failures);
    }

    #[test]
    fn split_framed_body_rejects_a_body_missing_the_delimiter() {
        assert!(split_framed_body(b"[{\"pid\":1}][]").is_none());
    }

    #[test]
    fn splice_entity_arrays_matches_the_fan_out_merge_scenario() {
        // Two peers return [{"pid":1}] and [{"pid":2}].
        let a: &[u8] = br#"[{"pid":1}]"#;
        let b: &[u8] = br#"[{"pid":2}]"#;
        let merged = splice_entity_arrays([a, b]);
        assert_eq!(merged, b"[{\"pid\":1},\n\n{\"pid\":2}]".to_vec());
    }

    #[test]
    fn splice_entity_arrays_skips_empty_contributions() {
        let a: &[u8] = b"[]";
        let b: &[u8] = br#"[{"pid":2}]"#;
        let merged = splice_entity_arrays([a, b]);
        assert_eq!(merged, br#"[{"pid":2}]"#);
    }

    #[test]
    fn splice_entity_arrays_handles_all_empty() {
        let merged = splice_entity_arrays([b"[]".as_slice(), b"[]".as_slice()]);
        assert_eq!(merged, b"[]");
    }

    #[test]
    fn round_trip_preserves_the_entity_set_across_framing_styles() {
        // Splitting a framed body and rejoining its entities half by the
        // merge protocol produces the same entity set as the peer's own
        // default `{"entities":[...]}` body would contain.
        let framed = join_framed_body(br#"[{"pid":7}]"#, br#"[]"#);
        let (entities, _failures) = split_framed_body(&framed).unwrap();
        let merged = splice_entity_arrays([entities]);
        let parsed: serde_json::Value = serde_json::from_slice(&merged).unwrap();
        assert_eq!(parsed, serde_json::json!([{"pid": 7}]));
    }
}
