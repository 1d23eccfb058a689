//! anyql runs SQL-like queries over whatever data sources a `SchemaProvider` exposes.
//!
//! A query goes through lexing and parsing, binding and type inference, the rewrite passes and
//! code generation, which produces an immutable `Artifact`. Artifacts are cached by the query text
//! and the provider identity. Executing an artifact streams rows from the sources and
//! materializes a `Table`.

pub mod artifact;
pub mod ast;
pub mod ast_to_ir;
pub mod builtin;
pub mod cache;
pub mod codegen;
pub mod coercion;
pub mod config;
pub mod error;
mod formatting;
pub mod group;
pub mod ir;
pub mod join;
pub mod lexer;
pub mod memory;
pub mod method;
mod optimize_ast;
mod optimize_ir;
pub mod parser;
pub mod project;
pub mod rewrite;
pub mod runtime;
pub mod schema;
pub mod source_info;
pub mod sql_type;
pub mod sql_value;
pub mod stream;
pub mod symbol;
pub mod table;
pub mod table_traits;
pub mod token;

extern crate pest;
#[macro_use]
extern crate pest_derive;

use std::sync::Arc;

use tracing::{debug, info_span, warn};

pub use artifact::Artifact;
pub use config::EngineConfig;
pub use error::{Error, ErrorKind, Result};
pub use runtime::ExecutionOptions;
pub use stream::CancellationToken;
pub use table::Table;

use crate::ast_to_ir::TableMemo;
use crate::cache::LruCache;
use crate::method::MethodLibrary;
use crate::schema::SchemaProvider;

/// Compiles and runs queries against one provider. Holds the artifact cache and the table
/// metadata memo, both shared by every compilation through this engine.
pub struct Engine {
    provider: Arc<dyn SchemaProvider>,
    config: EngineConfig,
    cache: LruCache<String, Arc<Artifact>>,
    memo: TableMemo,
    core: MethodLibrary,
}

impl Engine {
    pub fn new(provider: Arc<dyn SchemaProvider>, config: EngineConfig) -> Self {
        Engine {
            cache: LruCache::new(config.cache_capacity, config.cache_ttl),
            provider,
            config,
            memo: TableMemo::new(),
            core: builtin::core_library(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn compile(&self, text: &str) -> Result<Arc<Artifact>> {
        self.compile_with(text, &CancellationToken::new())
    }

    /// Compile `text`, or return the artifact already cached for it. Failed compilations are not
    /// cached.
    pub fn compile_with(&self, text: &str, cancellation: &CancellationToken) -> Result<Arc<Artifact>> {
        let signature = cache::signature(text, &self.provider.identity());
        self.cache
            .get_or_compute(&signature, || self.compile_uncached(text, &signature, cancellation))
    }

    fn compile_uncached(
        &self,
        text: &str,
        signature: &str,
        cancellation: &CancellationToken,
    ) -> Result<Arc<Artifact>> {
        let _span = info_span!("compile", signature).entered();
        let check = || match cancellation.is_cancelled() {
            true => Err(Error::Cancelled),
            false => Ok(()),
        };
        check()?;
        let script = parser::parse_query_text(text)?;
        check()?;
        let mut passes = vec![];
        let mut sink = |line: &str| passes.push(line.to_string());
        let bound = rewrite::RewritePipeline::new(
            self.provider.as_ref(),
            &self.core,
            &self.memo,
            self.config.pushdown,
        )
        .with_diagnostics(&mut sink)
        .run(script)?;
        debug!(passes = passes.len(), "rewrote query");
        let artifact = codegen::generate(&bound, signature, &self.config, cancellation)?;
        if let Some(dir) = &self.config.store_artifacts {
            match artifact.store_to_disk(dir) {
                Ok(path) => debug!(path = %path.display(), "stored artifact"),
                Err(e) => warn!(error = %e, "could not store artifact"),
            }
        }
        Ok(Arc::new(artifact))
    }

    pub fn execute(&self, artifact: &Artifact, options: &ExecutionOptions) -> Result<Table> {
        let _span = info_span!("execute", signature = %artifact.signature).entered();
        Ok(runtime::execute(
            artifact,
            self.provider.as_ref(),
            &self.config,
            options,
        )?)
    }

    /// Compile (or reuse) and execute `text`.
    pub fn run(&self, text: &str, options: &ExecutionOptions) -> Result<Table> {
        let artifact = self.compile_with(text, &options.cancellation)?;
        self.execute(&artifact, options)
    }

    pub fn cached_artifacts(&self) -> usize {
        self.cache.len()
    }

    /// Drop every cached artifact and all memoized table metadata.
    pub fn clear_caches(&self) {
        self.cache.clear();
        self.memo.clear();
    }
}
