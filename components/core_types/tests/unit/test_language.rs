//! Unit tests for language modes, function kinds and parse restrictions

use core_types::{FunctionKind, LanguageMode, ParseRestriction};

#[test]
fn test_default_language_mode_is_sloppy() {
    assert_eq!(LanguageMode::default(), LanguageMode::Sloppy);
    assert!(!LanguageMode::default().is_strict());
}

#[test]
fn test_strict_is_absorbing() {
    for mode in [LanguageMode::Sloppy, LanguageMode::Strict] {
        assert_eq!(LanguageMode::Strict.join(mode), LanguageMode::Strict);
        assert_eq!(mode.join(LanguageMode::Strict), LanguageMode::Strict);
    }
}

#[test]
fn test_module_bodies_are_resumable() {
    assert!(FunctionKind::Module.is_resumable());
    assert!(!FunctionKind::ClassConstructor.is_resumable());
}

#[test]
fn test_default_parse_restriction() {
    assert_eq!(
        ParseRestriction::default(),
        ParseRestriction::NoParseRestriction
    );
}
