//! Supported language set for onboarding and language changes.

/// Language name → ISO code, matched case-insensitively against user input.
pub static SUPPORTED_LANGUAGES: &[(&str, &str)] = &[
    ("english", "en"),
    ("hindi", "hi"),
    ("bengali", "bn"),
    ("telugu", "te"),
    ("marathi", "mr"),
    ("tamil", "ta"),
    ("gujarati", "gu"),
    ("kannada", "kn"),
    ("malayalam", "ml"),
    ("oriya", "or"),
    ("punjabi", "pa"),
    ("assamese", "as"),
    ("kashmiri", "ks"),
    ("sanskrit", "sa"),
    ("sindhi", "sd"),
    ("urdu", "ur"),
];

/// Resolve a user-typed language name to its code.
pub fn code_for(name: &str) -> Option<&'static str> {
    let needle = name.trim().to_lowercase();
    SUPPORTED_LANGUAGES
        .iter()
        .find(|(n, _)| *n == needle)
        .map(|(_, code)| *code)
}

/// Comma-separated list of supported language names, capitalized for display.
pub fn language_menu() -> String {
    SUPPORTED_LANGUAGES
        .iter()
        .map(|(name, _)| {
            let mut chars = name.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_case_insensitively() {
        assert_eq!(code_for("Hindi"), Some("hi"));
        assert_eq!(code_for("ENGLISH"), Some("en"));
        assert_eq!(code_for("  tamil "), Some("ta"));
    }

    #[test]
    fn rejects_unknown_languages() {
        assert_eq!(code_for("klingon"), None);
        assert_eq!(code_for(""), None);
    }

    #[test]
    fn menu_lists_all_languages() {
        let menu = language_menu();
        assert!(menu.starts_with("English, Hindi"));
        assert_eq!(menu.matches(", ").count(), SUPPORTED_LANGUAGES.len() - 1);
    }
}
