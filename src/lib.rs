// mkvsynth-eval: tree-walking evaluator for the mkvsynth video-pipeline
// scripting language.
//
// The lexer/parser and the filter-graph runtime are external
// collaborators; this crate owns the AST/value model, the
// environment, and the evaluator that walks it.

extern crate enumflags2;
extern crate lazy_static;
extern crate regex;
extern crate ron;
extern crate serde;

pub mod ast;
pub mod builtins;
pub mod config;
pub mod env;
pub mod error;
pub mod escape;
pub mod eval;
