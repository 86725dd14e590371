//! Destination-facing sanitizers for repository names and descriptions

/// Map a source repository name to a destination-legal identifier.
///
/// Spaces become hyphens, then everything outside `[A-Za-z0-9_-]` is
/// dropped. Total and idempotent.
pub fn sanitize_repo_name(name: &str) -> String {
    name.chars()
        .map(|c| if c == ' ' { '-' } else { c })
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect()
}

/// Strip non-printable content from a free-text repository description.
///
/// `None` maps to the empty string. Only printable ASCII (0x20-0x7E) is
/// retained, which excludes line feeds and carriage returns.
pub fn sanitize_description(description: Option<&str>) -> String {
    match description {
        Some(text) => text.chars().filter(|c| matches!(c, ' '..='~')).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck_macros::quickcheck;

    #[test]
    fn test_sanitize_repo_name_spaces_become_hyphens() {
        assert_eq!(sanitize_repo_name("My Repo 2.0!"), "My-Repo-20");
        assert_eq!(sanitize_repo_name("a b c"), "a-b-c");
    }

    #[test]
    fn test_sanitize_repo_name_keeps_legal_characters() {
        assert_eq!(sanitize_repo_name("already-legal_name123"), "already-legal_name123");
    }

    #[test]
    fn test_sanitize_repo_name_strips_unicode_and_punctuation() {
        assert_eq!(sanitize_repo_name("projekt-ż★ółty/v2"), "projekt-tyv2");
        assert_eq!(sanitize_repo_name("!!!"), "");
    }

    #[quickcheck]
    fn prop_sanitize_repo_name_idempotent(name: String) -> bool {
        let once = sanitize_repo_name(&name);
        sanitize_repo_name(&once) == once
    }

    #[quickcheck]
    fn prop_sanitize_repo_name_output_alphabet(name: String) -> bool {
        sanitize_repo_name(&name)
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    }

    #[test]
    fn test_sanitize_description_none_is_empty() {
        assert_eq!(sanitize_description(None), "");
    }

    #[test]
    fn test_sanitize_description_strips_line_breaks() {
        let cleaned = sanitize_description(Some("line1\nline2\r"));
        assert!(!cleaned.contains('\n'));
        assert!(!cleaned.contains('\r'));
        assert_eq!(cleaned, "line1line2");
    }

    #[test]
    fn test_sanitize_description_keeps_printable_ascii() {
        assert_eq!(
            sanitize_description(Some("A tool (v2) — with dash\tand tab")),
            "A tool (v2)  with dashand tab"
        );
    }

    #[quickcheck]
    fn prop_sanitize_description_printable_only(text: String) -> bool {
        sanitize_description(Some(&text))
            .chars()
            .all(|c| (' '..='~').contains(&c))
    }
}
