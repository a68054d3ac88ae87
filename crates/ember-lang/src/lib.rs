//! `ember-lang` is the compiler service for Ember, a small C#-flavoured
//! declaration language: lexer, error-recovering parser, binder, lowering to
//! a module IR, the binary module format and an interpreter for loaded code.
//!
//! ## Examples
//!
//! ```rs
//! use ember_lang::{Compilation, Runtime, RuntimeOptions, SourceText, Value};
//!
//! let source = SourceText::new("greeter.emb", "class Greeter { public static string Hello() => \"hi\"; }");
//! let compilation = Compilation::create("greeter", vec![source], vec![]);
//! assert!(!compilation.has_errors());
//!
//! let image = compilation.emit().unwrap();
//! let module = ember_lang::decode(&image).unwrap();
//! let runtime = Runtime::new(&module, RuntimeOptions::default());
//!
//! assert_eq!(runtime.call(0, 0, vec![]).unwrap(), Value::from("hi"));
//! ```
pub mod ast;
pub mod binary;
mod compilation;
pub mod diagnostic;
pub mod ir;
pub mod lexer;
mod range;
mod runtime;
mod semantic;
mod source;
mod value;

use itertools::Itertools;
use lexer::Lexer;

pub use ast::SyntaxTree;
pub use ast::parser::{MAX_EXPRESSION_DEPTH, Parser as AstParser};
pub use binary::{DecodeError, decode, encode};
pub use compilation::{Compilation, EmitError, MetadataReference};
pub use diagnostic::{Diagnostic, DiagnosticReport, Location, Severity, codes};
pub use ir::{Accessibility, MemberDef, MemberKind, Module, ParamDef, TypeDef, TypeKind};
pub use lexer::token::{Token, TokenKind};
pub use range::{Position, Range};
pub use runtime::{Runtime, RuntimeError, RuntimeOptions};
pub use semantic::{Analysis, analyze};
pub use source::{SourceId, SourceText};
pub use value::Value;

pub type IdentName = smol_str::SmolStr;

/// Parses one source unit. Lexical and syntax errors are returned as
/// diagnostics of the tree, ordered by position.
pub fn parse(code: &str, source_id: SourceId) -> SyntaxTree {
    let (tokens, lexer_errors) = Lexer::new().tokenize(code, source_id);
    let (root, parse_errors) = AstParser::new(tokens).parse();

    let diagnostics = lexer_errors
        .iter()
        .map(|e| e.to_diagnostic(source_id))
        .chain(parse_errors.iter().map(|e| e.to_diagnostic()))
        .sorted_by(|a, b| {
            let start = |d: &Diagnostic| d.location.as_ref().map(|l| l.range.start.clone());
            start(a).cmp(&start(b))
        })
        .collect();

    SyntaxTree {
        source_id,
        root,
        diagnostics,
    }
}
