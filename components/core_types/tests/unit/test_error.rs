//! Unit tests for CompileError and its conversion into JsError

use core_types::{CompileError, ErrorKind, JsError, SourcePosition};

#[cfg(test)]
mod compile_error_kind_tests {
    use super::*;

    #[test]
    fn test_parse_error_is_syntax_error() {
        assert_eq!(CompileError::parse("bad").kind(), ErrorKind::SyntaxError);
    }

    #[test]
    fn test_analysis_error_is_syntax_error() {
        let error = CompileError::Analysis("duplicate binding".to_string());
        assert_eq!(error.kind(), ErrorKind::SyntaxError);
    }

    #[test]
    fn test_stack_overflow_is_distinct_range_error() {
        assert_eq!(CompileError::StackOverflow.kind(), ErrorKind::RangeError);
        assert_ne!(
            CompileError::StackOverflow.kind(),
            CompileError::parse("x").kind()
        );
    }

    #[test]
    fn test_code_gen_from_strings_is_eval_error() {
        assert_eq!(
            CompileError::CodeGenFromStringsDisallowed.kind(),
            ErrorKind::EvalError
        );
    }

    #[test]
    fn test_osr_pairing_is_internal_error() {
        let error = CompileError::OsrPairing("bytecode offset on legacy frame".to_string());
        assert_eq!(error.kind(), ErrorKind::InternalError);
        assert!(error.to_string().contains("bytecode offset on legacy frame"));
    }
}

#[cfg(test)]
mod js_error_conversion_tests {
    use super::*;

    #[test]
    fn test_conversion_carries_message() {
        let error: JsError = CompileError::parse("Unexpected end of input").into();
        assert_eq!(error.kind, ErrorKind::SyntaxError);
        assert_eq!(error.message, "Unexpected end of input");
        assert!(error.source_position.is_none());
    }

    #[test]
    fn test_conversion_carries_parse_position() {
        let error: JsError = CompileError::Parse {
            message: "Unexpected token )".to_string(),
            position: Some(SourcePosition {
                line: 2,
                column: 1,
                offset: 21,
            }),
        }
        .into();
        let position = error.source_position.expect("position should survive");
        assert_eq!(position.offset, 21);
    }

    #[test]
    fn test_conversion_drops_position_for_other_errors() {
        let error: JsError = CompileError::CodeGenFromStringsDisallowed.into();
        assert!(error.source_position.is_none());
        assert_eq!(error.to_string(), format!("EvalError: {}", error.message));
    }

    #[test]
    fn test_js_error_is_std_error() {
        fn assert_error<E: std::error::Error>(_: &E) {}
        assert_error(&JsError::new(ErrorKind::InternalError, "x"));
    }
}
