//! SAIQL Compiler - Semantic Analysis, Optimization, Code Generation
//!
//! Orchestrates the three middle-end phases over a parsed AST:
//!
//! ```text
//! AST → Semantic Analysis → Optimization → Code Generation → SQL
//! ```
//!
//! The compiler owns the AST for the duration of `compile` (the optimizer
//! mutates it) and hands it back inside the [`CompilationResult`].

pub mod codegen;
pub mod dialect;
pub mod optimizer;
pub mod semantic;
pub mod symbols;

pub use codegen::CodeGenerator;
pub use dialect::{CaseSensitivity, DialectConfig, ParamStyle};
pub use optimizer::{OptimizationReport, Optimizer};
pub use semantic::{is_valid_identifier, Analysis, SemanticAnalyzer};
pub use symbols::{Symbol, SymbolKind, SymbolTable};

use crate::parser::ast::AstNode;
use saiql_core::{CompileError, Dialect, Legend, OptimizationLevel};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::debug;

/// Result of a full compilation. Immutable once produced.
#[derive(Debug, Clone)]
pub struct CompilationResult {
    pub sql: String,
    pub optimized_ast: AstNode,
    pub symbols: HashMap<String, Symbol>,
    pub report: OptimizationReport,
    /// Node-count based cost estimate.
    pub estimated_cost: u64,
    pub compile_time: Duration,
    pub dialect: Dialect,
    pub warnings: Vec<String>,
}

/// Three-phase SAIQL compiler.
pub struct Compiler {
    dialect: Dialect,
    level: OptimizationLevel,
    legend: Legend,
}

impl Compiler {
    pub fn new(dialect: Dialect, level: OptimizationLevel, legend: Legend) -> Self {
        Self {
            dialect,
            level,
            legend,
        }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Compile a parsed AST to SQL. Takes ownership of the AST; the
    /// optimizer is its sole mutator between parse and codegen.
    pub fn compile(&self, mut ast: AstNode) -> Result<CompilationResult, CompileError> {
        let start = Instant::now();

        // Phase 1: semantic analysis
        let legend = (!self.legend.is_empty()).then_some(&self.legend);
        let analysis = SemanticAnalyzer::new(legend).analyze(&ast);
        if !analysis.is_ok() {
            return Err(CompileError::SemanticAnalysis {
                errors: analysis.errors,
            });
        }

        // Phase 2: optimization
        let report = Optimizer::new(self.level).optimize(&mut ast);
        debug!(
            level = self.level.as_str(),
            applied = report.applied.len(),
            "optimization complete"
        );

        // Phase 3: code generation
        let sql = CodeGenerator::new(self.dialect).generate(&ast)?;

        Ok(CompilationResult {
            sql,
            estimated_cost: report.optimized_node_count,
            symbols: analysis.symbols.all_symbols(),
            report,
            optimized_ast: ast,
            compile_time: start.elapsed(),
            dialect: self.dialect,
            warnings: analysis.warnings,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;
    use crate::parser::Parser;

    fn compile(query: &str) -> Result<CompilationResult, CompileError> {
        let legend = Legend::core();
        let tokens = Lexer::new(legend.clone())
            .tokenize(query)
            .expect("should lex");
        let ast = Parser::parse(tokens).expect("should parse");
        Compiler::new(Dialect::Sqlite, OptimizationLevel::Standard, legend).compile(ast)
    }

    #[test]
    fn test_full_compile_of_select() {
        let result = compile("*3[users]::name,email>>oQ").expect("should compile");
        assert_eq!(result.sql, r#"SELECT "name", "email" FROM "users";"#);
        assert_eq!(result.dialect, Dialect::Sqlite);
        assert!(result.estimated_cost > 0);
        assert!(result.symbols.contains_key("users"));
        assert!(result
            .report
            .applied
            .iter()
            .any(|a| a == "selection_pushdown"));
    }

    #[test]
    fn test_unknown_function_fails_semantic_analysis() {
        // `**` lexes as a function symbol via the fixed operator table but
        // is not in the legend.
        let err = compile("**[users]::name>>oQ").unwrap_err();
        match err {
            CompileError::SemanticAnalysis { errors } => {
                assert!(errors.iter().any(|e| e.contains("unknown function")));
            }
            other => panic!("expected semantic failure, got {:?}", other),
        }
    }

    #[test]
    fn test_join_gets_algorithm_hint_at_standard_level() {
        let result = compile("=J[users+orders]::>>oQ").expect("should compile");
        assert!(result
            .report
            .applied
            .iter()
            .any(|a| a.starts_with("join_optimization")));
        match result.optimized_ast.as_query().and_then(|q| q.operation.as_deref()) {
            Some(AstNode::Join(join)) => {
                assert!(join.meta.recommended_algorithm.is_some());
            }
            other => panic!("expected join operation, got {:?}", other),
        }
    }
}
