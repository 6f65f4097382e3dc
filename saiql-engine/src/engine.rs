//! Engine - pipeline orchestration
//!
//! One `execute` call runs the whole pipeline: session resolution, the
//! pre-prompt firewall, a cache probe, lex → parse → safety → compile,
//! adapter dispatch, and the post-output firewall. Every phase either
//! fully succeeds or produces a typed failure tagged with the phase
//! name; raw errors never escape the `execute` boundary.

use crate::adapter::StorageAdapter;
use crate::cache::{CacheStats, Fingerprint, QueryCache};
use crate::firewall::SemanticFirewall;
use crate::safety::SafetyPolicy;
use crate::session::{SessionManager, SessionState};
use saiql_core::{
    EngineConfig, ErrorCode, ExecutionContext, GuardAction, Legend, QueryPhase, QueryResult, Row,
    SaiqlError, SessionId, TraceId,
};
use saiql_dsl::compiler::Compiler;
use saiql_dsl::lexer::Lexer;
use saiql_dsl::parser::Parser;
use saiql_txn::TransactionManager;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Engine counters.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EngineStats {
    pub queries_executed: u64,
    pub successful_queries: u64,
    pub failed_queries: u64,
    pub cache_hits: u64,
    pub total_execution_time: Duration,
    pub uptime: Duration,
}

impl EngineStats {
    pub fn success_rate(&self) -> f64 {
        if self.queries_executed == 0 {
            0.0
        } else {
            self.successful_queries as f64 / self.queries_executed as f64
        }
    }
}

#[derive(Default)]
struct Counters {
    queries_executed: u64,
    successful_queries: u64,
    failed_queries: u64,
    cache_hits: u64,
    total_execution_time: Duration,
}

/// The SAIQL engine. Caller-constructed; there is no hidden global.
pub struct Engine {
    config: EngineConfig,
    lexer: Lexer,
    compiler: Compiler,
    safety: SafetyPolicy,
    firewall: SemanticFirewall,
    sessions: SessionManager,
    cache: QueryCache,
    transactions: Arc<TransactionManager>,
    adapter: Box<dyn StorageAdapter>,
    counters: Mutex<Counters>,
    started_at: Instant,
}

impl Engine {
    /// Build an engine over a storage adapter. Loads the legend and
    /// firewall rules per the configuration; a configured-but-broken
    /// rules file leaves the firewall fail-closed.
    pub fn new(config: EngineConfig, adapter: Box<dyn StorageAdapter>) -> Result<Self, SaiqlError> {
        let legend = match &config.legend_path {
            Some(path) => Legend::from_path(path)?,
            None => Legend::core(),
        };
        let firewall = match &config.firewall_rules_path {
            Some(path) => SemanticFirewall::from_path(path),
            None => SemanticFirewall::builtin(),
        };

        let compiler = Compiler::new(
            config.compilation.target_dialect,
            config.compilation.optimization_level,
            legend.clone(),
        );
        let transactions =
            TransactionManager::new(config.lock_timeout, config.deadlock_interval);

        info!(
            dialect = %config.compilation.target_dialect,
            optimization = config.compilation.optimization_level.as_str(),
            symbols = legend.len(),
            "engine initialized"
        );

        Ok(Self {
            cache: QueryCache::new(config.cache_size),
            lexer: Lexer::new(legend),
            compiler,
            safety: SafetyPolicy::development(),
            firewall,
            sessions: SessionManager::new(),
            transactions,
            adapter,
            counters: Mutex::new(Counters::default()),
            started_at: Instant::now(),
            config,
        })
    }

    /// Replace the safety policy (builder style).
    pub fn with_safety_policy(mut self, policy: SafetyPolicy) -> Self {
        self.safety = policy;
        self
    }

    fn counters(&self) -> MutexGuard<'_, Counters> {
        self.counters.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Execute a SAIQL query.
    pub fn execute(&self, query: &str, ctx: &ExecutionContext) -> QueryResult {
        let started = Instant::now();
        let session_id = self.sessions.ensure(ctx.session_id, ctx.user_id.clone());
        let trace_id = TraceId::new_v4();

        let mut result = QueryResult::pending(query, session_id, trace_id);
        result.target_dialect = Some(self.compiler.dialect());
        self.counters().queries_executed += 1;
        self.sessions.set_state(session_id, SessionState::Active);

        info!(trace = %trace_id, session = %session_id, "query execution started");

        // Input normalization: trim and cap length before anything else.
        let query_text = query.trim();
        if query_text.is_empty() {
            result.fail("preparation", "query must be non-empty", ErrorCode::SyntaxError.as_str());
            return self.finish(result, started);
        }
        if query_text.len() > self.config.max_query_len {
            result.fail(
                "preparation",
                format!(
                    "query length {} exceeds limit {}",
                    query_text.len(),
                    self.config.max_query_len
                ),
                ErrorCode::SyntaxError.as_str(),
            );
            return self.finish(result, started);
        }

        // Pre-prompt firewall. BLOCK means no execution at all.
        let decision = self.firewall.pre_prompt_guard(query_text);
        if decision.action == GuardAction::Block {
            warn!(trace = %trace_id, reasons = ?decision.reasons, "firewall blocked query");
            result.firewall_decision = Some(GuardAction::Block);
            let message = if self.config.hide_error_details {
                "query blocked by security policy".to_string()
            } else {
                format!("firewall blocked query: {}", decision.reasons.join(", "))
            };
            result.fail("security_guard", message, ErrorCode::SecurityError.as_str());
            return self.finish(result, started);
        }

        // Cache probe.
        let fingerprint = self.fingerprint(query_text, ctx);
        let use_cache = self.config.compilation.enable_caching;
        if use_cache {
            if let Some(mut hit) = self.cache.get(&fingerprint, session_id, trace_id) {
                hit.execution_time = started.elapsed();
                let mut counters = self.counters();
                counters.cache_hits += 1;
                counters.successful_queries += 1;
                counters.total_execution_time += hit.execution_time;
                drop(counters);
                self.sessions
                    .record_query(session_id, SessionState::Completed, hit.execution_time);
                info!(trace = %trace_id, "query served from cache");
                return hit;
            }
        }

        // Lex → parse → safety → compile → adapter.
        self.run_pipeline(query_text, ctx, &mut result);

        // Post-output firewall on the result payload.
        if result.success && !result.data.is_empty() {
            Self::mark_phase(&mut result, QueryPhase::ResultProcessing);
            self.guard_output(&mut result);
        }

        // Cache successful results under their fingerprint.
        if use_cache && result.success {
            let mut cached = result.clone();
            cached.execution_time = started.elapsed();
            self.cache.put(&fingerprint, cached);
        }

        self.finish(result, started)
    }

    /// Execute multiple queries in order under one session. Stops at the
    /// first failure when the context sets `fail_fast`.
    pub fn execute_batch(&self, queries: &[&str], ctx: &ExecutionContext) -> Vec<QueryResult> {
        let mut batch_ctx = ctx.clone();
        let mut results = Vec::with_capacity(queries.len());

        for query in queries {
            let result = self.execute(query, &batch_ctx);
            // Later queries share the session created by the first.
            batch_ctx.session_id = Some(result.session_id);
            let failed = !result.success;
            results.push(result);
            if failed && batch_ctx.fail_fast {
                break;
            }
        }
        results
    }

    /// Record a phase transition on the result for observability.
    fn mark_phase(result: &mut QueryResult, phase: QueryPhase) {
        let phases = result
            .metadata
            .entry("phases".to_string())
            .or_insert_with(|| serde_json::Value::Array(Vec::new()));
        if let serde_json::Value::Array(list) = phases {
            list.push(serde_json::Value::String(phase.as_str().to_string()));
        }
    }

    fn run_pipeline(&self, query_text: &str, ctx: &ExecutionContext, result: &mut QueryResult) {
        // Phase 1: lexical analysis
        Self::mark_phase(result, QueryPhase::Preparation);
        let lex_started = Instant::now();
        let tokens = match self.lexer.tokenize(query_text) {
            Ok(tokens) => tokens,
            Err(e) => {
                result.lexing_time = lex_started.elapsed();
                result.fail("lexical_analysis", e.to_string(), ErrorCode::SyntaxError.as_str());
                return;
            }
        };
        result.lexing_time = lex_started.elapsed();

        // Phase 2: parsing
        let parse_started = Instant::now();
        let ast = match Parser::parse(tokens) {
            Ok(ast) => ast,
            Err(e) => {
                result.parsing_time = parse_started.elapsed();
                result.fail("parsing", e.to_string(), ErrorCode::SyntaxError.as_str());
                return;
            }
        };
        result.parsing_time = parse_started.elapsed();

        // Phase 2.5: safety policy
        Self::mark_phase(result, QueryPhase::SymbolResolution);
        if let Err(e) = self.safety.validate_query(&ast) {
            let message = if self.config.hide_error_details {
                "query rejected by safety policy".to_string()
            } else {
                e.to_string()
            };
            result.fail("safety_check", message, ErrorCode::SafetyViolation.as_str());
            return;
        }

        // Phase 3: compilation
        Self::mark_phase(result, QueryPhase::TypeValidation);
        let compilation = match self.compiler.compile(ast) {
            Ok(compilation) => compilation,
            Err(e) => {
                result.fail("compilation", e.to_string(), ErrorCode::CompilationError.as_str());
                return;
            }
        };
        result.compilation_time = compilation.compile_time;
        result.sql_generated = compilation.sql.clone();
        result.optimizations_applied = compilation.report.applied.clone();
        result.complexity_score = compilation.estimated_cost;
        result.warnings = compilation.warnings.clone();

        // Phase 4: adapter dispatch
        Self::mark_phase(result, QueryPhase::MemoryAllocation);
        Self::mark_phase(result, QueryPhase::Execution);
        match self.adapter.execute(&compilation.sql, None) {
            Ok(adapter_result) => {
                result.database_time = adapter_result.execution_time;
                result.rows_affected = adapter_result.rows_affected;
                result.data = adapter_result.rows;
                result.success = true;

                // Query budget from the execution context; the adapter
                // boundary is where it is enforceable.
                if result.database_time > ctx.timeout {
                    result.fail(
                        "execution",
                        format!(
                            "query budget of {:?} exceeded ({:?} in the adapter)",
                            ctx.timeout, result.database_time
                        ),
                        ErrorCode::Timeout.as_str(),
                    );
                }
            }
            Err(e) => {
                result.metadata.insert(
                    "storage_detail".to_string(),
                    serde_json::Value::String(e.to_string()),
                );
                result.fail(
                    "database_execution",
                    format!("database execution failed: {}", e),
                    ErrorCode::StorageError.as_str(),
                );
            }
        }
    }

    /// Run the post-output guard over the serialized payload, applying
    /// redactions or discarding blocked data.
    fn guard_output(&self, result: &mut QueryResult) {
        let payload = match serde_json::to_string(&result.data) {
            Ok(payload) => payload,
            Err(e) => {
                result.fail(
                    "result_processing",
                    format!("failed to serialize result payload: {}", e),
                    ErrorCode::RuntimeError.as_str(),
                );
                return;
            }
        };

        let decision = self.firewall.post_output_guard(&payload);
        match decision.action {
            GuardAction::Allow => {}
            GuardAction::Redact => {
                result.firewall_decision = Some(GuardAction::Redact);
                result.redactions = decision.reasons.clone();
                match decision
                    .modified_text
                    .as_deref()
                    .map(serde_json::from_str::<Vec<Row>>)
                {
                    Some(Ok(rows)) => result.data = rows,
                    _ => {
                        // Redaction broke the payload shape; drop the data
                        // rather than leak.
                        result.data.clear();
                        result.error_message =
                            Some("output redacted due to security policy".to_string());
                    }
                }
            }
            GuardAction::Block => {
                warn!(trace = %result.trace_id, reasons = ?decision.reasons, "firewall blocked output");
                result.firewall_decision = Some(GuardAction::Block);
                result.data.clear();
            }
        }
    }

    fn fingerprint(&self, query_text: &str, ctx: &ExecutionContext) -> Fingerprint {
        let backend_identity = format!(
            "{}:{}",
            self.config.database.backend, self.config.database.path
        );
        Fingerprint::compute(
            query_text,
            self.config.compilation.target_dialect,
            self.config.compilation.optimization_level,
            &backend_identity,
            ctx.user_id.as_deref(),
        )
    }

    fn finish(&self, mut result: QueryResult, started: Instant) -> QueryResult {
        Self::mark_phase(&mut result, QueryPhase::Cleanup);
        result.execution_time = started.elapsed();

        let mut counters = self.counters();
        if result.success {
            counters.successful_queries += 1;
        } else {
            counters.failed_queries += 1;
        }
        counters.total_execution_time += result.execution_time;
        drop(counters);

        let session_state = if result.success {
            SessionState::Completed
        } else {
            SessionState::Error
        };
        self.sessions
            .record_query(result.session_id, session_state, result.execution_time);
        info!(
            trace = %result.trace_id,
            success = result.success,
            phase = result.error_phase.as_deref().unwrap_or("complete"),
            "query execution finished"
        );
        result
    }

    // === Introspection and maintenance ===

    pub fn stats(&self) -> EngineStats {
        let counters = self.counters();
        EngineStats {
            queries_executed: counters.queries_executed,
            successful_queries: counters.successful_queries,
            failed_queries: counters.failed_queries,
            cache_hits: counters.cache_hits,
            total_execution_time: counters.total_execution_time,
            uptime: self.started_at.elapsed(),
        }
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.count()
    }

    pub fn session(&self, id: SessionId) -> Option<crate::session::Session> {
        self.sessions.get(id)
    }

    /// The transaction manager for programmatic transaction control.
    pub fn transactions(&self) -> &Arc<TransactionManager> {
        &self.transactions
    }

    pub fn adapter_statistics(
        &self,
    ) -> std::collections::HashMap<String, serde_json::Value> {
        self.adapter.statistics()
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
        info!("query cache cleared");
    }

    /// Reap sessions idle past the configured timeout.
    pub fn reap_sessions(&self) -> usize {
        self.sessions.reap_expired(self.config.session_timeout)
    }

    /// Abort transactions older than the configured budget.
    pub fn reap_transactions(&self) -> usize {
        self.transactions.reap_expired(self.config.transaction_timeout)
    }

    /// Graceful shutdown: stop background threads, drop caches, close
    /// the adapter.
    pub fn shutdown(&self) {
        info!("engine shutting down");
        self.transactions.shutdown();
        self.cache.clear();
        self.sessions.reap_expired(Duration::ZERO);
        self.adapter.close();
        info!("engine shutdown complete");
    }
}
