use std::borrow::Cow;
use std::fmt::{self, Display, Formatter};

use miette::{SourceOffset, SourceSpan};

use crate::range::Range;
use crate::source::{SourceId, SourceText};

/// Identifier codes of every diagnostic the Ember compiler reports.
pub mod codes {
    // lexical
    pub const UNRECOGNIZED_ESCAPE: &str = "EM1009";
    pub const NEWLINE_IN_CONSTANT: &str = "EM1010";
    pub const UNTERMINATED_COMMENT: &str = "EM1035";
    pub const UNEXPECTED_CHARACTER: &str = "EM1056";

    // syntax
    pub const IDENTIFIER_EXPECTED: &str = "EM1001";
    pub const SEMICOLON_EXPECTED: &str = "EM1002";
    pub const SYNTAX_ERROR: &str = "EM1003";
    pub const INTEGRAL_CONSTANT_TOO_LARGE: &str = "EM1021";
    pub const NAMESPACE_MEMBER_EXPECTED: &str = "EM1022";
    pub const CLOSE_PAREN_EXPECTED: &str = "EM1026";
    pub const CLOSE_BRACE_EXPECTED: &str = "EM1513";
    pub const OPEN_BRACE_EXPECTED: &str = "EM1514";
    pub const INVALID_MEMBER_TOKEN: &str = "EM1519";
    pub const INVALID_EXPRESSION_TERM: &str = "EM1525";
    pub const USING_AFTER_DECLARATION: &str = "EM1529";
    pub const UNSUPPORTED_STATEMENT: &str = "EM8002";
    pub const EXPRESSION_TOO_COMPLEX: &str = "EM8078";

    // semantic errors
    pub const DUPLICATE_PARAMETER: &str = "EM0100";
    pub const DUPLICATE_TYPE: &str = "EM0101";
    pub const DUPLICATE_MEMBER: &str = "EM0102";
    pub const NAME_NOT_FOUND: &str = "EM0103";
    pub const AMBIGUOUS_REFERENCE: &str = "EM0104";
    pub const INVALID_MODIFIER: &str = "EM0106";
    pub const MULTIPLE_PROTECTION_MODIFIERS: &str = "EM0107";
    pub const STATIC_ABSTRACT_MEMBER: &str = "EM0112";
    pub const MEMBER_NOT_FOUND: &str = "EM0117";
    pub const TYPE_USED_AS_VALUE: &str = "EM0119";
    pub const OBJECT_REFERENCE_REQUIRED: &str = "EM0120";
    pub const RETURN_VALUE_EXPECTED: &str = "EM0126";
    pub const RETURN_VALUE_IN_VOID: &str = "EM0127";
    pub const CONSTANT_EXPECTED: &str = "EM0133";
    pub const CIRCULAR_BASE: &str = "EM0146";
    pub const METHOD_NAME_EXPECTED: &str = "EM0149";
    pub const NOT_ALL_PATHS_RETURN: &str = "EM0161";
    pub const INVALID_STATEMENT_EXPRESSION: &str = "EM0201";
    pub const UNARY_OPERATOR_MISMATCH: &str = "EM0023";
    pub const BINARY_OPERATOR_MISMATCH: &str = "EM0019";
    pub const IMPLICIT_CONVERSION: &str = "EM0029";
    pub const NAMESPACE_MEMBER_NOT_FOUND: &str = "EM0234";
    pub const TYPE_NOT_FOUND: &str = "EM0246";
    pub const ABSTRACT_WITH_BODY: &str = "EM0500";
    pub const MISSING_BODY: &str = "EM0501";
    pub const SEALED_BASE: &str = "EM0509";
    pub const ABSTRACT_IN_CONCRETE_TYPE: &str = "EM0513";
    pub const INTERFACE_FIELD: &str = "EM0525";
    pub const INTERFACE_CONSTRUCTOR: &str = "EM0526";
    pub const NOT_AN_INTERFACE: &str = "EM0527";
    pub const MEMBER_NAMED_AFTER_TYPE: &str = "EM0542";
    pub const METHOD_GROUP_AS_VALUE: &str = "EM0428";
    pub const ABSTRACT_SEALED_TYPE: &str = "EM0418";
    pub const INSTANCE_MEMBER_IN_STATIC_CLASS: &str = "EM0708";
    pub const STATIC_BASE: &str = "EM0709";
    pub const INVALID_ENUM_BASE: &str = "EM1008";
    pub const DUPLICATE_MODIFIER: &str = "EM1004";
    pub const NO_OVERLOAD_FOR_ARITY: &str = "EM1501";
    pub const ARGUMENT_CONVERSION: &str = "EM1503";
    pub const PRIVATE_NAMESPACE_MEMBER: &str = "EM1527";
    pub const VOID_NOT_ALLOWED: &str = "EM1547";
    pub const NON_INVOCABLE_MEMBER: &str = "EM1955";
    pub const CROSS_MODULE_CALL: &str = "EM8001";
    pub const AUTO_PROPERTY_WITHOUT_GETTER: &str = "EM8051";

    // warnings
    pub const DUPLICATE_USING: &str = "EM0105";
    pub const UNREACHABLE_CODE: &str = "EM0162";
    pub const IMPORTED_TYPE_CONFLICT: &str = "EM0436";
    pub const PROTECTED_IN_SEALED: &str = "EM0628";

    // info
    pub const UNNECESSARY_USING: &str = "EM8019";
}

#[derive(PartialEq, PartialOrd, Eq, Ord, Debug, Clone, Copy, Hash)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl Display for Severity {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

#[derive(PartialEq, Eq, Debug, Clone, Hash)]
pub struct Location {
    pub source: SourceId,
    pub range: Range,
}

#[derive(PartialEq, Eq, Debug, Clone, Hash)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: Cow<'static, str>,
    pub message: String,
    pub location: Option<Location>,
    /// Set when a warning was escalated to an error by configuration.
    pub warning_as_error: bool,
}

impl Diagnostic {
    pub fn new(severity: Severity, code: impl Into<Cow<'static, str>>, message: impl Into<String>) -> Self {
        Self {
            severity,
            code: code.into(),
            message: message.into(),
            location: None,
            warning_as_error: false,
        }
    }

    pub fn error(code: impl Into<Cow<'static, str>>, message: impl Into<String>) -> Self {
        Self::new(Severity::Error, code, message)
    }

    pub fn warning(code: impl Into<Cow<'static, str>>, message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, code, message)
    }

    pub fn info(code: impl Into<Cow<'static, str>>, message: impl Into<String>) -> Self {
        Self::new(Severity::Info, code, message)
    }

    pub fn at(mut self, source: SourceId, range: Range) -> Self {
        self.location = Some(Location { source, range });
        self
    }

    #[inline(always)]
    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    /// Turns a warning into an error; other severities are returned unchanged.
    pub fn escalate(mut self) -> Self {
        if self.severity == Severity::Warning {
            self.severity = Severity::Error;
            self.warning_as_error = true;
        }
        self
    }

    /// Attaches the text of the source the diagnostic points into.
    pub fn to_report(&self, sources: &[SourceText]) -> DiagnosticReport {
        let source = self
            .location
            .as_ref()
            .and_then(|location| sources.get(location.source.index()).map(|source| (location, source)));

        match source {
            Some((location, source)) => DiagnosticReport {
                diagnostic: self.clone(),
                source_name: source.name.clone(),
                source_code: source.text.clone(),
                location: Some(source_span(&source.text, &location.range)),
            },
            None => DiagnosticReport {
                diagnostic: self.clone(),
                source_name: String::new(),
                source_code: String::new(),
                location: None,
            },
        }
    }
}

impl Display for Diagnostic {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

fn source_span(source_code: &str, range: &Range) -> SourceSpan {
    let start = SourceOffset::from_location(source_code, range.start.line as usize, range.start.column);
    let end = SourceOffset::from_location(source_code, range.end.line as usize, range.end.column);

    SourceSpan::new(start, std::cmp::max(end.offset().saturating_sub(start.offset()), 1))
}

/// A [`Diagnostic`] paired with its source text, renderable with miette.
#[derive(Debug, thiserror::Error)]
#[error("{diagnostic}")]
pub struct DiagnosticReport {
    pub diagnostic: Diagnostic,
    pub source_name: String,
    pub source_code: String,
    pub location: Option<SourceSpan>,
}

impl miette::Diagnostic for DiagnosticReport {
    fn code<'a>(&'a self) -> Option<Box<dyn Display + 'a>> {
        Some(Box::new(&self.diagnostic.code))
    }

    fn severity(&self) -> Option<miette::Severity> {
        Some(match self.diagnostic.severity {
            Severity::Info => miette::Severity::Advice,
            Severity::Warning => miette::Severity::Warning,
            Severity::Error => miette::Severity::Error,
        })
    }

    fn help<'a>(&'a self) -> Option<Box<dyn Display + 'a>> {
        if self.diagnostic.warning_as_error {
            Some(Box::new("this warning is treated as an error"))
        } else {
            None
        }
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = miette::LabeledSpan> + '_>> {
        let location = self.location?;
        Some(Box::new(std::iter::once(miette::LabeledSpan::new_with_span(
            Some(self.source_name.clone()),
            location,
        ))))
    }

    fn source_code(&self) -> Option<&dyn miette::SourceCode> {
        self.location.map(|_| &self.source_code as &dyn miette::SourceCode)
    }
}
