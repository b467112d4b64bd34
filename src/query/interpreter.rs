//! The interpreter drives the whole pipeline: strip, cache lookup,
//! compile on miss, then pull the root cursor into a result stream.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tracing::debug;

use crate::config::Config;
use crate::error::{QueryError, Result};
use crate::query::cache::{CachedPlan, PlanCache};
use crate::query::context::ExecutionContext;
use crate::query::frame::Frame;
use crate::query::parser;
use crate::query::plan::{plan_query, LogicalOperator, PlannerInputs};
use crate::query::semantic::SymbolGenerator;
use crate::query::stream::ResultStream;
use crate::query::stripped::StrippedQuery;
use crate::query::symbol::SymbolTable;
use crate::query::typed_value::TypedValue;
use crate::storage::GraphAccessor;

// The grammar tables behind the parser are shared process-wide, so
// parsing is serialized; the plan cache amortizes the lock away.
static PARSER_LOCK: Mutex<()> = Mutex::new(());

pub struct Interpreter {
    config: Config,
    plan_cache: PlanCache,
}

impl Interpreter {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            plan_cache: PlanCache::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn plan_cache(&self) -> &PlanCache {
        &self.plan_cache
    }

    /// Executes one query against the given transaction accessor.
    ///
    /// On success the transaction stays open for the caller to commit.
    /// On error the transaction is aborted, unless it is explicit, in
    /// which case it is only marked failed and subsequent statements
    /// keep failing until the owner rolls it back.
    pub fn interpret<S: ResultStream>(
        &self,
        query: &str,
        accessor: &GraphAccessor,
        stream: &mut S,
        params: &HashMap<String, TypedValue>,
        in_explicit_transaction: bool,
    ) -> Result<()> {
        self.interpret_cancellable(
            query,
            accessor,
            stream,
            params,
            in_explicit_transaction,
            Arc::new(AtomicBool::new(false)),
        )
    }

    /// Like [`interpret`], with an externally owned abort flag checked
    /// between pulls. A timeout watcher sets the same flag.
    ///
    /// [`interpret`]: Interpreter::interpret
    pub fn interpret_cancellable<S: ResultStream>(
        &self,
        query: &str,
        accessor: &GraphAccessor,
        stream: &mut S,
        params: &HashMap<String, TypedValue>,
        in_explicit_transaction: bool,
        should_abort: Arc<AtomicBool>,
    ) -> Result<()> {
        let result = self.interpret_inner(
            query,
            accessor,
            stream,
            params,
            in_explicit_transaction,
            should_abort,
        );
        if result.is_err() {
            if in_explicit_transaction {
                accessor.mark_failed();
            } else {
                accessor.abort();
            }
        }
        result
    }

    fn interpret_inner<S: ResultStream>(
        &self,
        query: &str,
        accessor: &GraphAccessor,
        stream: &mut S,
        params: &HashMap<String, TypedValue>,
        in_explicit_transaction: bool,
        should_abort: Arc<AtomicBool>,
    ) -> Result<()> {
        if accessor.is_failed() {
            return Err(QueryError::runtime(
                "current transaction is marked failed; roll it back first",
            ));
        }

        let parsing_timer = Instant::now();
        let stripped = StrippedQuery::new(query)?;

        let mut parameters = stripped.literals().clone();
        for name in stripped.parameters() {
            match params.get(name) {
                Some(value) => {
                    parameters.insert(name.clone(), value.clone());
                }
                None => return Err(QueryError::UnprovidedParameter(name.clone())),
            }
        }
        let parsing_time = parsing_timer.elapsed();

        let planning_timer = Instant::now();
        let cached = if self.config.query_plan_cache {
            self.plan_cache
                .lookup(stripped.hash(), self.config.query_plan_cache_ttl)
        } else {
            None
        };
        let cached = match cached {
            Some(entry) => {
                debug!(hash = stripped.hash(), "plan cache hit");
                entry
            }
            None => {
                debug!(hash = stripped.hash(), "plan cache miss, compiling");
                let mut ast = {
                    let _parser_guard = PARSER_LOCK.lock();
                    parser::parse(stripped.query())?
                };
                let mut symbol_table = SymbolTable::new();
                SymbolGenerator::new(&mut symbol_table).visit_query(&mut ast)?;
                let (plan, cost) = plan_query(
                    &ast,
                    &mut symbol_table,
                    PlannerInputs {
                        accessor,
                        config: &self.config,
                    },
                )?;
                let entry = Arc::new(CachedPlan::new(plan, cost, symbol_table));
                if self.config.query_plan_cache {
                    self.plan_cache.insert(stripped.hash(), entry)
                } else {
                    entry
                }
            }
        };
        let planning_time = planning_timer.elapsed();

        let mut ctx = ExecutionContext::new(accessor, cached.symbol_table());
        ctx.parameters = parameters;
        ctx.in_explicit_transaction = in_explicit_transaction;
        ctx.should_abort = should_abort;

        let execution_timer = Instant::now();
        self.execute_plan(&cached, &mut ctx, stream, &stripped)?;
        let execution_time = execution_timer.elapsed();

        // A fresh index means previously cached plans may no longer be
        // the best ones.
        if ctx.is_index_created.get() {
            self.plan_cache.invalidate_all();
        }

        let mut summary = BTreeMap::new();
        summary.insert(
            "parsing_time".to_owned(),
            TypedValue::Double(parsing_time.as_secs_f64()),
        );
        summary.insert(
            "planning_time".to_owned(),
            TypedValue::Double(planning_time.as_secs_f64()),
        );
        summary.insert(
            "plan_execution_time".to_owned(),
            TypedValue::Double(execution_time.as_secs_f64()),
        );
        summary.insert(
            "cost_estimate".to_owned(),
            TypedValue::Double(cached.cost()),
        );
        summary.insert(
            "type".to_owned(),
            TypedValue::String(classify(cached.plan()).to_owned()),
        );
        stream.summary(summary);
        Ok(())
    }

    fn execute_plan<S: ResultStream>(
        &self,
        cached: &CachedPlan,
        ctx: &mut ExecutionContext<'_>,
        stream: &mut S,
        stripped: &StrippedQuery,
    ) -> Result<()> {
        let plan = cached.plan();
        let symbol_table = cached.symbol_table();
        let mut frame = Frame::new(symbol_table.max_position());
        let output_symbols = plan.output_symbols(symbol_table);

        if !output_symbols.is_empty() {
            // A projection is present, so stream the results out. The
            // header prefers the original source text of an unaliased
            // projection over the symbol name.
            let header: Vec<String> = output_symbols
                .iter()
                .map(|symbol| {
                    symbol
                        .token_position
                        .and_then(|position| stripped.named_expressions().get(&position))
                        .cloned()
                        .unwrap_or_else(|| symbol.name.clone())
                })
                .collect();
            stream.header(header);
            let mut cursor = plan.make_cursor();
            while cursor.pull(&mut frame, ctx)? {
                ctx.check_abort()?;
                let values = output_symbols
                    .iter()
                    .map(|symbol| frame[symbol].clone())
                    .collect();
                stream.result(values);
            }
            return Ok(());
        }

        if is_sink_plan(plan) {
            stream.header(Vec::new());
            let mut cursor = plan.make_cursor();
            while cursor.pull(&mut frame, ctx)? {
                ctx.check_abort()?;
            }
            return Ok(());
        }
        Err(QueryError::runtime("unknown top level operator"))
    }
}

/// Plans without output symbols that are still valid roots: pure
/// mutations drained for their side effects.
fn is_sink_plan(plan: &LogicalOperator) -> bool {
    matches!(
        plan,
        LogicalOperator::CreateNode { .. }
            | LogicalOperator::CreateExpand { .. }
            | LogicalOperator::SetProperty { .. }
            | LogicalOperator::SetProperties { .. }
            | LogicalOperator::SetLabels { .. }
            | LogicalOperator::RemoveProperty { .. }
            | LogicalOperator::RemoveLabels { .. }
            | LogicalOperator::Delete { .. }
            | LogicalOperator::Merge { .. }
            | LogicalOperator::CreateIndex { .. }
    )
}

/// Classifies a plan by its operator mix. The tag's backward
/// compatibility is unspecified; clients should not rely on it beyond
/// read/write discrimination.
fn classify(plan: &LogicalOperator) -> &'static str {
    fn walk(op: &LogicalOperator, reads: &mut bool, writes: &mut bool, schema: &mut bool) {
        use LogicalOperator::*;
        match op {
            Once => {}
            CreateIndex { .. } => *schema = true,
            ScanAll { input, .. }
            | ScanAllByLabel { input, .. }
            | ScanAllByLabelPropertyValue { input, .. }
            | ScanAllByLabelPropertyRange { input, .. }
            | Expand { input, .. }
            | ExpandVariable { input, .. } => {
                *reads = true;
                walk(input, reads, writes, schema);
            }
            CreateNode { input, .. }
            | CreateExpand { input, .. }
            | SetProperty { input, .. }
            | SetProperties { input, .. }
            | SetLabels { input, .. }
            | RemoveProperty { input, .. }
            | RemoveLabels { input, .. }
            | Delete { input, .. } => {
                *writes = true;
                walk(input, reads, writes, schema);
            }
            Merge {
                input,
                merge_match,
                merge_create,
            } => {
                *writes = true;
                walk(merge_match, reads, writes, schema);
                walk(merge_create, reads, writes, schema);
                walk(input, reads, writes, schema);
            }
            Optional {
                input, optional, ..
            } => {
                walk(optional, reads, writes, schema);
                walk(input, reads, writes, schema);
            }
            Cartesian { left, right, .. } => {
                walk(left, reads, writes, schema);
                walk(right, reads, writes, schema);
            }
            ConstructNamedPath { input, .. }
            | Filter { input, .. }
            | ExpandUniquenessFilter { input, .. }
            | Produce { input, .. }
            | Aggregate { input, .. }
            | Skip { input, .. }
            | Limit { input, .. }
            | OrderBy { input, .. }
            | Distinct { input, .. }
            | Unwind { input, .. }
            | Accumulate { input, .. }
            | Explain { input, .. } => walk(input, reads, writes, schema),
        }
    }
    let (mut reads, mut writes, mut schema) = (false, false, false);
    walk(plan, &mut reads, &mut writes, &mut schema);
    if schema {
        "schema"
    } else if reads && writes {
        "rw"
    } else if writes {
        "w"
    } else {
        "r"
    }
}
