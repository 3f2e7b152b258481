//! Parsing for systemd-style unit names into catalog tags.

/// A unit name split into its `before-at` and optional `after-at` parts,
/// with any fixed prefix already stripped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedUnit {
    pub before_at: String,
    pub after_at: Option<String>,
}

/// Parses `unit` against `(prefix-)?<before-at>(@<after-at>)?.service`,
/// returning `None` if it doesn't end in `.service`.
pub fn parse_unit_name(unit: &str, prefix: &str) -> Option<ParsedUnit> {
    let stem = unit.strip_suffix(".service")?;
    let (name_part, after_at) = match stem.split_once('@') {
        Some((before, after)) => (before, Some(after.to_string())),
        None => (stem, None),
    };
    let before_at = name_part.strip_prefix(prefix).unwrap_or(name_part).to_string();
    Some(ParsedUnit { before_at, after_at })
}

/// Builds the tag list for a parsed unit: `["appscale", before_at, ...]`,
/// with `after_at` (if present) split on `_` and each part prefixed with
/// `_`.
pub fn tags_for(parsed: &ParsedUnit) -> Vec<String> {
    let mut tags = vec!["appscale".to_string(), parsed.before_at.clone()];
    if let Some(after_at) = &parsed.after_at {
        tags.extend(after_at.split('_').map(|part| format!("_{part}")));
    }
    tags
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_unit_with_instance() {
        let parsed = parse_unit_name("appscale-haproxy@app.service", "appscale-").unwrap();
        assert_eq!(parsed.before_at, "haproxy");
        assert_eq!(parsed.after_at.as_deref(), Some("app"));
        assert_eq!(tags_for(&parsed), vec!["appscale", "haproxy", "_app"]);
    }

    #[test]
    fn parses_unit_with_multi_part_instance() {
        let parsed = parse_unit_name(
            "appscale-instance-run@testapp_mod1_v1_1570022208920-20000.service",
            "appscale-",
        )
        .unwrap();
        assert_eq!(parsed.before_at, "instance-run");
        assert_eq!(
            tags_for(&parsed),
            vec![
                "appscale",
                "instance-run",
                "_testapp",
                "_mod1",
                "_v1",
                "_1570022208920-20000",
            ]
        );
    }

    #[test]
    fn parses_unit_without_instance() {
        let parsed = parse_unit_name("appscale-cassandra.service", "appscale-").unwrap();
        assert_eq!(parsed.before_at, "cassandra");
        assert!(parsed.after_at.is_none());
        assert_eq!(tags_for(&parsed), vec!["appscale", "cassandra"]);
    }

    #[test]
    fn rejects_non_service_units() {
        assert!(parse_unit_name("appscale-cassandra.socket", "appscale-").is_none());
    }
}
