//! Starlark script converter.
//!
//! A script defines `main(ctx)` returning a list of dicts. Every dict becomes
//! one YAML pipeline document named by its `name` key.

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use ::starlark::environment::{Globals, LibraryExtension, Module};
use ::starlark::eval::Evaluator;
use ::starlark::syntax::{AstModule, Dialect};
use ::starlark::values::structs::AllocStruct;
use ::starlark::values::{Heap, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, warn};
use woodconf_config::StarlarkConfig;
use woodconf_config::service::DEFAULT_STARLARK_MAX_CONCURRENT;
use woodconf_core::{Converter, Environment, Error, File, Result};

const SCRIPT_NAME: &str = "config.star";
const ENTRYPOINT: &str = "main";
const NAME_KEY: &str = "name";

/// Script execution options.
#[derive(Debug, Clone)]
pub struct StarlarkOptions {
    /// Maximum run time of one script; `None` waits indefinitely.
    pub timeout: Option<Duration>,
    /// Scripts executing at once. A script that timed out keeps its slot
    /// until its worker thread returns.
    pub max_concurrent: usize,
}

impl Default for StarlarkOptions {
    fn default() -> Self {
        Self {
            timeout: None,
            max_concurrent: DEFAULT_STARLARK_MAX_CONCURRENT,
        }
    }
}

/// Converts `.star` files into pipeline documents.
#[derive(Debug, Clone)]
pub struct StarlarkConverter {
    options: StarlarkOptions,
    permits: Arc<Semaphore>,
}

impl StarlarkConverter {
    pub fn new(options: StarlarkOptions) -> Self {
        let permits = Arc::new(Semaphore::new(options.max_concurrent.max(1)));
        Self { options, permits }
    }

    pub fn from_config(config: &StarlarkConfig) -> Self {
        Self::new(StarlarkOptions {
            timeout: config.timeout,
            max_concurrent: config.max_concurrent,
        })
    }

    /// Execution slots not held by a running script.
    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }
}

impl Default for StarlarkConverter {
    fn default() -> Self {
        Self::new(StarlarkOptions::default())
    }
}

#[async_trait]
impl Converter for StarlarkConverter {
    fn name(&self) -> &'static str {
        "starlark"
    }

    fn compatible(&self, file: &File) -> bool {
        file.extension() == Some("star")
    }

    async fn convert(&self, file: &File, env: &Environment) -> Result<Vec<File>> {
        if file.data.is_empty() {
            return Err(Error::NoContent);
        }

        let task = run(
            self.permits.clone(),
            file.data.clone(),
            ScriptContext::from_env(env),
        );

        let value = match self.options.timeout {
            Some(limit) => match tokio::time::timeout(limit, task).await {
                Ok(result) => result?,
                Err(_) => {
                    // The worker cannot be interrupted; it keeps its permit
                    // until it finishes on its own.
                    warn!(file = %file.name, ?limit, "Script execution timed out");
                    return Err(Error::Execution(format!(
                        "{}: execution exceeded {:?}",
                        file.name, limit
                    )));
                }
            },
            None => task.await?,
        };

        let files = into_documents(value)?;
        debug!(file = %file.name, documents = files.len(), "Executed script");
        Ok(files)
    }
}

async fn run(
    permits: Arc<Semaphore>,
    source: String,
    context: ScriptContext,
) -> Result<JsonValue> {
    let permit = permits.acquire_owned().await.map_err(execution)?;
    tokio::task::spawn_blocking(move || {
        let _permit = permit;
        execute(source, &context)
    })
    .await
    .map_err(execution)?
}

/// The parts of the environment a script may see.
///
/// Built field by field so the credential never reaches the script.
#[derive(Debug, Clone)]
struct ScriptContext {
    repo_name: String,
    repo_full_name: String,
    repo_owner: String,
    repo_branch: String,
    event: String,
    title: String,
    commit: String,
    r#ref: String,
    branch: String,
    message: String,
    sender: String,
}

impl ScriptContext {
    fn from_env(env: &Environment) -> Self {
        Self {
            repo_name: env.repo.name.clone(),
            repo_full_name: env.repo.full_name.clone(),
            repo_owner: env.repo.owner.clone(),
            repo_branch: env.repo.branch.clone(),
            event: env.pipeline.event.clone(),
            title: env.pipeline.title.clone(),
            commit: env.pipeline.commit.clone(),
            r#ref: env.pipeline.r#ref.clone(),
            branch: env.pipeline.branch.clone(),
            message: env.pipeline.message.clone(),
            sender: env.pipeline.sender.clone(),
        }
    }

    fn alloc<'v>(&self, heap: &'v Heap) -> Value<'v> {
        let repo = heap.alloc(AllocStruct([
            ("name", self.repo_name.as_str()),
            ("full_name", self.repo_full_name.as_str()),
            ("fullName", self.repo_full_name.as_str()),
            ("owner", self.repo_owner.as_str()),
            ("branch", self.repo_branch.as_str()),
        ]));
        let build = heap.alloc(AllocStruct([
            ("event", self.event.as_str()),
            ("title", self.title.as_str()),
            ("commit", self.commit.as_str()),
            ("ref", self.r#ref.as_str()),
            ("branch", self.branch.as_str()),
            ("message", self.message.as_str()),
            ("sender", self.sender.as_str()),
        ]));
        heap.alloc(AllocStruct([("repo", repo), ("build", build)]))
    }
}

fn execute(source: String, context: &ScriptContext) -> Result<JsonValue> {
    let ast = AstModule::parse(SCRIPT_NAME, source, &Dialect::Extended).map_err(execution)?;
    let globals = Globals::extended_by(&[
        LibraryExtension::StructType,
        LibraryExtension::Json,
        LibraryExtension::Print,
        LibraryExtension::Map,
        LibraryExtension::Filter,
    ]);

    let module = Module::new();
    let mut eval = Evaluator::new(&module);
    eval.eval_module(ast, &globals).map_err(execution)?;

    let main = module
        .get(ENTRYPOINT)
        .ok_or_else(|| Error::NoEntrypoint(ENTRYPOINT.to_string()))?;
    let ctx = context.alloc(module.heap());
    let value = eval.eval_function(main, &[ctx], &[]).map_err(execution)?;

    value.to_json_value().map_err(execution)
}

fn execution(err: impl std::fmt::Display) -> Error {
    Error::Execution(err.to_string())
}

fn into_documents(value: JsonValue) -> Result<Vec<File>> {
    let JsonValue::Array(items) = null_to_empty(value) else {
        return Err(Error::Execution(format!(
            "{} must return a list of dicts",
            ENTRYPOINT
        )));
    };

    let mut files = Vec::with_capacity(items.len());
    for item in items {
        let mut document = match item {
            JsonValue::Object(document) => document,
            other => {
                return Err(Error::Execution(format!(
                    "{} must return a list of dicts, found {}",
                    ENTRYPOINT, other
                )));
            }
        };

        let name = match document.shift_remove(NAME_KEY) {
            Some(JsonValue::String(name)) if !name.is_empty() => name,
            _ => return Err(Error::MissingName(NAME_KEY.to_string())),
        };

        let data = serde_yaml::to_string(&document).map_err(execution)?;
        files.push(File::new(name, data));
    }

    Ok(files)
}

// Every `None`, at any depth, is emitted as `[]`.
fn null_to_empty(value: JsonValue) -> JsonValue {
    match value {
        JsonValue::Null => JsonValue::Array(Vec::new()),
        JsonValue::Array(items) => {
            JsonValue::Array(items.into_iter().map(null_to_empty).collect())
        }
        JsonValue::Object(map) => JsonValue::Object(
            map.into_iter()
                .map(|(key, value)| (key, null_to_empty(value)))
                .collect(),
        ),
        other => other,
    }
}
