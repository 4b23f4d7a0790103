//! Two-phase configuration resolution.
//!
//! The build pass runs when an execution is claimed: it walks the frozen
//! configuration, replaces plain expressions with their values, and leaves
//! every secret-bearing expression as literal `{{ }}` text, recording its
//! path. The snapshot is what gets persisted, so secret material never
//! touches the store.
//!
//! The runtime pass runs just before dispatch: it prefetches the named
//! secrets and resolves only the deferred paths. Its output is handed to the
//! executor and dropped; it is never written back.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde_json::{Map, Value};
use sirocco_core::NodeId;
use sirocco_credential::SecretProvider;
use sirocco_execution::Execution;
use sirocco_expression::{
    Environment, Expr, ExpressionError, Template, TemplatePart, ValuePath, calls_function,
    evaluate_source, parse_expression,
};
use sirocco_store::Store;
use sirocco_workflow::{Node, Workflow};

use crate::error::EngineError;

/// The function whose expressions the build pass defers.
pub const SECRETS_FUNCTION: &str = "secrets";

/// Output of the build pass.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedConfiguration {
    /// Configuration with every non-deferred expression replaced. Safe to
    /// persist: deferred fields still hold their literal expression text.
    pub snapshot: Value,
    /// Paths whose fields still carry a secret-bearing expression.
    pub deferred: Vec<ValuePath>,
}

/// Resolves node configurations against the execution chain and, at
/// dispatch time, the secret provider.
///
/// Cheap to clone; clones share the store and provider.
pub struct ConfigResolver<S> {
    store: Arc<S>,
    secrets: Arc<dyn SecretProvider>,
}

impl<S> Clone for ConfigResolver<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            secrets: Arc::clone(&self.secrets),
        }
    }
}

impl<S> ConfigResolver<S> {
    /// Creates a resolver over `store`, fetching secrets from `secrets`.
    pub fn new(store: Arc<S>, secrets: Arc<dyn SecretProvider>) -> Self {
        Self { store, secrets }
    }
}

impl<S: Store> ConfigResolver<S> {
    /// Build pass: resolves the execution's frozen configuration, deferring
    /// secret-bearing expressions.
    ///
    /// Paths listed in the node's `disallow_expression` are left untouched,
    /// subtrees included. A field that is exactly one expression takes the
    /// expression's native value; mixed text stays a string.
    pub async fn build(
        &self,
        workflow: &Workflow,
        node: &Node,
        execution: &Execution,
    ) -> Result<ResolvedConfiguration, EngineError> {
        let env = ChainEnvironment::load(self.store.as_ref(), workflow, execution).await?;
        let disallowed: Vec<ValuePath> = node
            .disallow_expression
            .iter()
            .map(|path| ValuePath::parse(path))
            .collect();

        let mut snapshot = execution.configuration.clone();
        let mut deferred = Vec::new();
        let mut path = ValuePath::root();
        resolve_value(&mut snapshot, &env, &disallowed, &mut path, &mut deferred)?;

        tracing::debug!(
            execution = %execution.id,
            node = %node.id,
            deferred = deferred.len(),
            "configuration built"
        );
        Ok(ResolvedConfiguration { snapshot, deferred })
    }

    /// Runtime pass: resolves the snapshot's deferred paths with secrets
    /// bound. The returned value is for dispatch only and must not be
    /// persisted.
    ///
    /// With nothing deferred this is a clone of the snapshot and the
    /// provider is never consulted.
    pub async fn runtime(
        &self,
        workflow: &Workflow,
        execution: &Execution,
        resolved: &ResolvedConfiguration,
    ) -> Result<Value, EngineError> {
        if resolved.deferred.is_empty() {
            return Ok(resolved.snapshot.clone());
        }

        let chain = ChainEnvironment::load(self.store.as_ref(), workflow, execution).await?;
        let mut secrets = HashMap::new();
        for name in secret_names(&resolved.snapshot, &resolved.deferred)? {
            let fields = self.secrets.load(workflow.organization_id, &name).await?;
            let mut object = Map::new();
            for (field, secret) in &fields {
                let value = secret.expose_secret(|s| Value::String(s.to_owned()));
                object.insert(field.clone(), value);
            }
            secrets.insert(name, Value::Object(object));
        }
        let env = RuntimeEnvironment { chain, secrets };

        let mut configuration = resolved.snapshot.clone();
        for path in &resolved.deferred {
            let Some(slot) = path.lookup_mut(&mut configuration) else {
                continue;
            };
            let Value::String(text) = slot else {
                continue;
            };
            *slot = finish_text(text, &env, path)?;
        }
        Ok(configuration)
    }
}

/// Expression environment over one execution's chain: the input event, the
/// root event, upstream payloads by producer node, and the parent
/// execution's configuration.
///
/// Materialized up front so evaluation itself stays synchronous.
struct ChainEnvironment<'w> {
    workflow: &'w Workflow,
    input_node: NodeId,
    input: Value,
    root_node: NodeId,
    root: Value,
    config: Option<Value>,
    chain: HashMap<NodeId, Value>,
}

impl<'w> ChainEnvironment<'w> {
    async fn load<S: Store>(
        store: &S,
        workflow: &'w Workflow,
        execution: &Execution,
    ) -> Result<Self, EngineError> {
        let input = store.event(execution.event_id).await?;
        let root = store.event(execution.root_event_id).await?;
        let config = match execution.parent_execution_id {
            Some(parent) => Some(store.execution(parent).await?.configuration),
            None => None,
        };

        // Walk previous-execution links backwards. Each predecessor produced
        // the event its successor consumed, so the payload a node
        // contributed is its successor's input. First write wins when a node
        // ran more than once in the chain.
        let mut chain = HashMap::new();
        let mut visited = HashSet::new();
        let mut current = execution.clone();
        let mut consumed = input.clone();
        while let Some(prev_id) = current.previous_execution_id {
            if !visited.insert(prev_id) {
                break;
            }
            let prev = store.execution(prev_id).await?;
            chain
                .entry(prev.node_id)
                .or_insert_with(|| consumed.payload.clone());
            consumed = store.event(prev.event_id).await?;
            current = prev;
        }

        Ok(Self {
            workflow,
            input_node: input.node_id,
            input: input.payload,
            root_node: root.node_id,
            root: root.payload,
            config,
            chain,
        })
    }
}

impl Environment for ChainEnvironment<'_> {
    fn message_root(&self) -> Result<Value, ExpressionError> {
        Ok(self.input.clone())
    }

    fn message_property(&self, name: &str) -> Result<Value, ExpressionError> {
        let node = self
            .workflow
            .node_by_name(name)
            .map_err(|err| ExpressionError::environment(err.to_string()))?;
        if node.id == self.input_node {
            return Ok(self.input.clone());
        }
        if node.id == self.root_node {
            return Ok(self.root.clone());
        }
        self.chain.get(&node.id).cloned().ok_or_else(|| {
            ExpressionError::environment(format!(
                "node '{name}' has not contributed to this execution chain"
            ))
        })
    }

    fn config_scope(&self) -> Result<Value, ExpressionError> {
        self.config.clone().ok_or_else(|| {
            ExpressionError::environment("config is only available inside a blueprint expansion")
        })
    }

    fn call(&self, function: &str, _args: &[Value]) -> Result<Value, ExpressionError> {
        Err(ExpressionError::UnknownFunction(function.to_owned()))
    }
}

/// The chain environment plus prefetched secrets, for the runtime pass.
struct RuntimeEnvironment<'w> {
    chain: ChainEnvironment<'w>,
    secrets: HashMap<String, Value>,
}

impl Environment for RuntimeEnvironment<'_> {
    fn message_root(&self) -> Result<Value, ExpressionError> {
        self.chain.message_root()
    }

    fn message_property(&self, name: &str) -> Result<Value, ExpressionError> {
        self.chain.message_property(name)
    }

    fn config_scope(&self) -> Result<Value, ExpressionError> {
        self.chain.config_scope()
    }

    fn call(&self, function: &str, args: &[Value]) -> Result<Value, ExpressionError> {
        if function != SECRETS_FUNCTION {
            return self.chain.call(function, args);
        }
        let name = match args {
            [Value::String(name)] => name,
            _ => {
                return Err(ExpressionError::environment(
                    "secrets() takes a single string literal name",
                ));
            }
        };
        self.secrets.get(name).cloned().ok_or_else(|| {
            ExpressionError::environment(format!("secret '{name}' was not prefetched"))
        })
    }
}

fn resolve_value<E: Environment>(
    value: &mut Value,
    env: &E,
    disallowed: &[ValuePath],
    path: &mut ValuePath,
    deferred: &mut Vec<ValuePath>,
) -> Result<(), EngineError> {
    if disallowed.contains(path) {
        return Ok(());
    }
    match value {
        Value::Object(map) => {
            for (key, child) in map.iter_mut() {
                path.push_key(key.clone());
                resolve_value(child, env, disallowed, path, deferred)?;
                path.pop();
            }
        }
        Value::Array(items) => {
            for (index, child) in items.iter_mut().enumerate() {
                path.push_index(index);
                resolve_value(child, env, disallowed, path, deferred)?;
                path.pop();
            }
        }
        Value::String(text) => {
            if let Some(replacement) = resolve_text(text, env, path, deferred)? {
                *value = replacement;
            }
        }
        _ => {}
    }
    Ok(())
}

/// Resolves one string field. `None` means the field is untouched: either
/// it holds no expressions, or it is a single deferred expression.
fn resolve_text<E: Environment>(
    text: &str,
    env: &E,
    path: &ValuePath,
    deferred: &mut Vec<ValuePath>,
) -> Result<Option<Value>, EngineError> {
    let template =
        Template::parse(text).map_err(|source| EngineError::resolution(path.to_string(), source))?;
    if !template.has_expressions() {
        return Ok(None);
    }

    if let Some(source) = template.as_single_expression() {
        if calls_function(source, SECRETS_FUNCTION) {
            deferred.push(path.clone());
            return Ok(None);
        }
        let value = evaluate_source(source, env)
            .map_err(|source| EngineError::resolution(path.to_string(), source))?;
        return Ok(Some(value));
    }

    // Mixed text: plain expressions are stringified in place; a deferred one
    // is written back as literal placeholder text for the runtime pass.
    let mut out = String::new();
    let mut any_deferred = false;
    for part in template.parts() {
        match part {
            TemplatePart::Static(text) => out.push_str(text),
            TemplatePart::Expression { source, .. } => {
                if calls_function(source, SECRETS_FUNCTION) {
                    out.push_str("{{ ");
                    out.push_str(source);
                    out.push_str(" }}");
                    any_deferred = true;
                } else {
                    let value = evaluate_source(source, env)
                        .map_err(|source| EngineError::resolution(path.to_string(), source))?;
                    out.push_str(&stringify(&value));
                }
            }
        }
    }
    if any_deferred {
        deferred.push(path.clone());
    }
    Ok(Some(Value::String(out)))
}

/// Resolves one deferred field completely. Used by the runtime pass, where
/// nothing defers.
fn finish_text<E: Environment>(
    text: &str,
    env: &E,
    path: &ValuePath,
) -> Result<Value, EngineError> {
    let template =
        Template::parse(text).map_err(|source| EngineError::resolution(path.to_string(), source))?;
    if let Some(source) = template.as_single_expression() {
        return evaluate_source(source, env)
            .map_err(|source| EngineError::resolution(path.to_string(), source));
    }
    let mut out = String::new();
    for part in template.parts() {
        match part {
            TemplatePart::Static(text) => out.push_str(text),
            TemplatePart::Expression { source, .. } => {
                let value = evaluate_source(source, env)
                    .map_err(|source| EngineError::resolution(path.to_string(), source))?;
                out.push_str(&stringify(&value));
            }
        }
    }
    Ok(Value::String(out))
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Collects the secret names referenced by the deferred paths. Names must
/// be string literals so they can be prefetched before evaluation.
fn secret_names(snapshot: &Value, deferred: &[ValuePath]) -> Result<Vec<String>, EngineError> {
    let mut names = Vec::new();
    for path in deferred {
        let Some(Value::String(text)) = path.lookup(snapshot) else {
            continue;
        };
        let template = Template::parse(text)
            .map_err(|source| EngineError::resolution(path.to_string(), source))?;
        for source in template.expressions() {
            let expr = parse_expression(source)
                .map_err(|source| EngineError::resolution(path.to_string(), source))?;
            collect_secret_names(&expr, path, &mut names)?;
        }
    }
    names.sort();
    names.dedup();
    Ok(names)
}

fn collect_secret_names(
    expr: &Expr,
    path: &ValuePath,
    names: &mut Vec<String>,
) -> Result<(), EngineError> {
    match expr {
        Expr::Root | Expr::Identifier(_) | Expr::Literal(_) => Ok(()),
        Expr::Property { target, .. } => collect_secret_names(target, path, names),
        Expr::Index { target, index } => {
            collect_secret_names(target, path, names)?;
            collect_secret_names(index, path, names)
        }
        Expr::Call { function, args } => {
            if function == SECRETS_FUNCTION {
                match args.as_slice() {
                    [Expr::Literal(Value::String(name))] => names.push(name.clone()),
                    _ => {
                        return Err(EngineError::resolution(
                            path.to_string(),
                            ExpressionError::environment(
                                "secrets() takes a single string literal name",
                            ),
                        ));
                    }
                }
            }
            for arg in args {
                collect_secret_names(arg, path, names)?;
            }
            Ok(())
        }
    }
}
