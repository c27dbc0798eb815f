//! The prioritized plugin chain.
//!
//! Plugins run in ascending `priority`, equal priorities in declaration
//! order. A band of equal-priority plugins may run concurrently when the
//! chain allows it and no band member declares payload mutation; band
//! results merge by taking the first violation in band order.

use crate::conditions::RequestAttributes;
use crate::config::{ChainConfig, PluginMode, PluginSpec};
use crate::context::{GlobalContext, PluginContext};
use crate::error::PluginError;
use crate::hooks::HookType;
use crate::result::{PluginElicitation, PluginResult, PluginViolation};
use crate::Plugin;
use dashmap::DashMap;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// A plugin bound into the chain with its spec and private state.
struct RegisteredPlugin {
    spec: PluginSpec,
    plugin: Arc<dyn Plugin>,
    state: Arc<DashMap<String, Value>>,
}

/// Where to resume a chain after an elicitation round-trip: the chain
/// index of the plugin to re-run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResumePoint(usize);

/// Terminal outcome of running one hook's chain.
#[derive(Debug)]
pub enum ChainOutcome<T> {
    /// All applicable plugins passed; `T` is the (possibly modified) payload
    Continue(T),
    /// A plugin blocked the request
    Blocked(PluginViolation),
    /// A plugin suspended the request pending client input. Re-run with
    /// [`PluginManager::resume`] once the response is in the context.
    Elicit {
        /// Chain position to re-run from
        resume: ResumePoint,
        /// What to ask the client
        request: PluginElicitation,
    },
}

/// The immutable plugin table, built once at startup.
pub struct PluginManager {
    plugins: Vec<RegisteredPlugin>,
    parallel_bands: bool,
    default_timeout: Duration,
}

impl PluginManager {
    /// An empty manager (plugins disabled).
    pub fn empty() -> Self {
        Self {
            plugins: Vec::new(),
            parallel_bands: false,
            default_timeout: Duration::from_secs(30),
        }
    }

    /// Build the chain from a definition. `resolver` turns each spec into
    /// a live plugin: native lookups or external transport adapters.
    ///
    /// # Errors
    ///
    /// Returns `PluginError::Config` when the definition is invalid or the
    /// resolver cannot satisfy a spec.
    pub fn build(
        config: ChainConfig,
        default_timeout: Duration,
        resolver: &dyn Fn(&PluginSpec) -> Result<Arc<dyn Plugin>, PluginError>,
    ) -> Result<Self, PluginError> {
        config.validate()?;
        let parallel_bands = config.parallel_execution_within_band;
        let mut plugins = Vec::with_capacity(config.plugins.len());
        for spec in config.plugins {
            if spec.mode == PluginMode::Disabled {
                debug!(plugin = %spec.name, "plugin disabled, skipping registration");
                continue;
            }
            let plugin = resolver(&spec)?;
            plugins.push(RegisteredPlugin {
                spec,
                plugin,
                state: Arc::new(DashMap::new()),
            });
        }
        // stable sort preserves declaration order within a priority
        plugins.sort_by_key(|p| p.spec.priority);
        Ok(Self {
            plugins,
            parallel_bands,
            default_timeout,
        })
    }

    /// Number of registered (non-disabled) plugins
    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    /// Whether the chain is empty
    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Run the chain for one hook from the beginning.
    ///
    /// # Errors
    ///
    /// Returns `PluginError` when a plugin in `enforce` mode fails or
    /// times out; other modes log and continue per their rules.
    pub async fn run<T>(
        &self,
        hook: HookType,
        ctx: &mut GlobalContext,
        attrs: &RequestAttributes<'_>,
        payload: T,
    ) -> Result<ChainOutcome<T>, PluginError>
    where
        T: Serialize + DeserializeOwned + Clone + Send + Sync,
    {
        self.run_from(hook, ctx, attrs, payload, 0).await
    }

    /// Resume the chain at the plugin that requested an elicitation. The
    /// caller must have pushed the client's response into
    /// `ctx.elicitation_responses` first.
    ///
    /// # Errors
    ///
    /// Same as [`PluginManager::run`].
    pub async fn resume<T>(
        &self,
        hook: HookType,
        ctx: &mut GlobalContext,
        attrs: &RequestAttributes<'_>,
        payload: T,
        resume: ResumePoint,
    ) -> Result<ChainOutcome<T>, PluginError>
    where
        T: Serialize + DeserializeOwned + Clone + Send + Sync,
    {
        self.run_from(hook, ctx, attrs, payload, resume.0).await
    }

    async fn run_from<T>(
        &self,
        hook: HookType,
        ctx: &mut GlobalContext,
        attrs: &RequestAttributes<'_>,
        mut payload: T,
        start: usize,
    ) -> Result<ChainOutcome<T>, PluginError>
    where
        T: Serialize + DeserializeOwned + Clone + Send + Sync,
    {
        let applicable: Vec<usize> = self
            .plugins
            .iter()
            .enumerate()
            .filter(|(_, p)| p.spec.hooks.contains(&hook))
            .filter(|(_, p)| p.spec.conditions.matches(ctx, attrs))
            .map(|(i, _)| i)
            .collect();

        let mut cursor = 0;
        while cursor < applicable.len() {
            let index = applicable[cursor];
            if index < start {
                cursor += 1;
                continue;
            }

            // collect a parallel band: consecutive applicable plugins of
            // equal priority, none of which mutates the payload
            let band_end = if self.parallel_bands {
                let priority = self.plugins[index].spec.priority;
                let mut end = cursor;
                while end < applicable.len()
                    && self.plugins[applicable[end]].spec.priority == priority
                    && !self.plugins[applicable[end]].spec.mutates_payload
                {
                    end += 1;
                }
                end
            } else {
                cursor
            };

            if band_end > cursor + 1 {
                let band = &applicable[cursor..band_end];
                match self.run_band(hook, ctx, band, &payload).await? {
                    BandVerdict::Pass => {}
                    BandVerdict::Blocked(violation) => {
                        return Ok(ChainOutcome::Blocked(violation));
                    }
                    BandVerdict::Elicit { index, request } => {
                        return Ok(ChainOutcome::Elicit {
                            resume: ResumePoint(index),
                            request,
                        });
                    }
                }
                cursor = band_end;
                continue;
            }

            match self.run_one(hook, ctx, index, &payload).await? {
                StepVerdict::Pass(None) => {}
                StepVerdict::Pass(Some(modified)) => payload = modified,
                StepVerdict::Blocked(violation) => {
                    return Ok(ChainOutcome::Blocked(violation));
                }
                StepVerdict::Elicit(request) => {
                    return Ok(ChainOutcome::Elicit {
                        resume: ResumePoint(index),
                        request,
                    });
                }
            }
            cursor += 1;
        }

        Ok(ChainOutcome::Continue(payload))
    }

    /// Run one plugin; apply mode rules to errors and violations.
    async fn run_one<T>(
        &self,
        hook: HookType,
        ctx: &mut GlobalContext,
        index: usize,
        payload: &T,
    ) -> Result<StepVerdict<T>, PluginError>
    where
        T: Serialize + DeserializeOwned + Clone + Send,
    {
        let registered = &self.plugins[index];
        let raw = serde_json::to_value(payload)?;
        let result = self.invoke_with_deadline(hook, ctx, registered, raw).await;

        let mode = registered.spec.mode;
        let result = match result {
            Ok(result) => result,
            Err(PluginError::NotImplemented { plugin, hook }) => {
                debug!(%plugin, %hook, "external plugin lacks hook tool, continuing");
                return Ok(StepVerdict::Pass(None));
            }
            Err(error) => {
                return match mode {
                    PluginMode::Enforce => Err(error),
                    PluginMode::EnforceIgnoreError | PluginMode::Permissive => {
                        warn!(plugin = %registered.spec.name, %error, "plugin error ignored by mode");
                        Ok(StepVerdict::Pass(None))
                    }
                    PluginMode::Disabled => Ok(StepVerdict::Pass(None)),
                };
            }
        };

        for (key, value) in result.metadata {
            ctx.metadata.insert(key, value);
        }

        if result.continue_processing {
            let modified = match result.modified_payload {
                Some(raw) => match serde_json::from_value(raw) {
                    Ok(value) => Some(value),
                    Err(error) => match mode {
                        PluginMode::Enforce => return Err(PluginError::Payload(error)),
                        _ => {
                            warn!(
                                plugin = %registered.spec.name,
                                %error,
                                "discarding undecodable modified payload"
                            );
                            None
                        }
                    },
                },
                None => None,
            };
            return Ok(StepVerdict::Pass(modified));
        }

        if let Some(request) = result.elicitation_request {
            return Ok(StepVerdict::Elicit(request));
        }

        let mut violation = result.violation.unwrap_or_else(|| {
            PluginViolation::new("aborted", "plugin aborted the chain", "CHAIN_ABORTED")
        });
        violation.plugin_name = registered.spec.name.clone();

        match mode {
            PluginMode::Permissive => {
                warn!(
                    plugin = %registered.spec.name,
                    code = %violation.code,
                    reason = %violation.reason,
                    "permissive mode: violation logged, request continues"
                );
                Ok(StepVerdict::Pass(None))
            }
            _ => Ok(StepVerdict::Blocked(violation)),
        }
    }

    /// Run a parallel band; first violation in band order wins.
    async fn run_band<T>(
        &self,
        hook: HookType,
        ctx: &mut GlobalContext,
        band: &[usize],
        payload: &T,
    ) -> Result<BandVerdict, PluginError>
    where
        T: Serialize + Send + Sync,
    {
        let raw = serde_json::to_value(payload)?;
        let ctx_ref: &GlobalContext = ctx;
        let futures: Vec<_> = band
            .iter()
            .map(|&index| {
                let registered = &self.plugins[index];
                let raw = raw.clone();
                async move {
                    (
                        index,
                        self.invoke_with_deadline(hook, ctx_ref, registered, raw).await,
                    )
                }
            })
            .collect();
        let results = futures::future::join_all(futures).await;

        let mut verdict = BandVerdict::Pass;
        let mut collected_metadata = Vec::new();
        for (index, result) in results {
            let registered = &self.plugins[index];
            let mode = registered.spec.mode;
            let result = match result {
                Ok(result) => result,
                Err(PluginError::NotImplemented { .. }) => continue,
                Err(error) => match mode {
                    PluginMode::Enforce => return Err(error),
                    _ => {
                        warn!(plugin = %registered.spec.name, %error, "plugin error ignored by mode");
                        continue;
                    }
                },
            };
            collected_metadata.extend(result.metadata);
            if result.continue_processing {
                continue;
            }
            if matches!(verdict, BandVerdict::Pass) {
                if let Some(request) = result.elicitation_request {
                    verdict = BandVerdict::Elicit { index, request };
                    continue;
                }
                let mut violation = result.violation.unwrap_or_else(|| {
                    PluginViolation::new("aborted", "plugin aborted the chain", "CHAIN_ABORTED")
                });
                violation.plugin_name = registered.spec.name.clone();
                if mode == PluginMode::Permissive {
                    warn!(plugin = %registered.spec.name, code = %violation.code, "permissive violation in band");
                } else {
                    verdict = BandVerdict::Blocked(violation);
                }
            }
        }
        for (key, value) in collected_metadata {
            ctx.metadata.insert(key, value);
        }
        Ok(verdict)
    }

    async fn invoke_with_deadline(
        &self,
        hook: HookType,
        ctx: &GlobalContext,
        registered: &RegisteredPlugin,
        payload: Value,
    ) -> Result<PluginResult<Value>, PluginError> {
        let timeout = registered
            .spec
            .timeout_seconds
            .map_or(self.default_timeout, Duration::from_secs);
        let plugin_ctx = PluginContext {
            global: ctx,
            state: registered.state.clone(),
            config: &registered.spec.config,
        };
        match tokio::time::timeout(timeout, registered.plugin.invoke(hook, payload, &plugin_ctx))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(PluginError::Timeout {
                plugin: registered.spec.name.clone(),
                timeout_ms: timeout.as_millis() as u64,
            }),
        }
    }
}

enum StepVerdict<T> {
    Pass(Option<T>),
    Blocked(PluginViolation),
    Elicit(PluginElicitation),
}

enum BandVerdict {
    Pass,
    Blocked(PluginViolation),
    Elicit {
        index: usize,
        request: PluginElicitation,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::ToolCallPayload;
    use async_trait::async_trait;
    use mcpgateway_registry::EntityId;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Test plugin scripted by closures over invocation counters.
    struct Scripted {
        name: String,
        behavior: Box<dyn Fn(u64, Value) -> Result<PluginResult<Value>, PluginError> + Send + Sync>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Plugin for Scripted {
        fn name(&self) -> &str {
            &self.name
        }

        async fn invoke(
            &self,
            _hook: HookType,
            payload: Value,
            _ctx: &PluginContext<'_>,
        ) -> Result<PluginResult<Value>, PluginError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) as u64;
            (self.behavior)(call, payload)
        }
    }

    fn spec(name: &str, priority: i32, mode: PluginMode) -> PluginSpec {
        PluginSpec {
            name: name.into(),
            hooks: vec![HookType::ToolPreInvoke],
            mode,
            priority,
            conditions: Default::default(),
            config: Value::Null,
            mutates_payload: true,
            timeout_seconds: None,
            external: None,
        }
    }

    fn manager(entries: Vec<(PluginSpec, Arc<dyn Plugin>)>) -> PluginManager {
        let lookup: std::collections::HashMap<String, Arc<dyn Plugin>> = entries
            .iter()
            .map(|(s, p)| (s.name.clone(), p.clone()))
            .collect();
        let config = ChainConfig {
            plugins: entries.into_iter().map(|(s, _)| s).collect(),
            parallel_execution_within_band: false,
        };
        PluginManager::build(config, Duration::from_secs(5), &|spec| {
            Ok(lookup[&spec.name].clone())
        })
        .unwrap()
    }

    fn payload(text: &str) -> ToolCallPayload {
        let mut arguments = std::collections::HashMap::new();
        arguments.insert("text".to_string(), Value::String(text.to_string()));
        ToolCallPayload {
            name: "echo".into(),
            arguments,
        }
    }

    fn ctx() -> GlobalContext {
        GlobalContext::new("req-1", "alice", EntityId::generate())
    }

    fn pass_plugin(name: &str) -> Arc<dyn Plugin> {
        Arc::new(Scripted {
            name: name.into(),
            behavior: Box::new(|_, _| Ok(PluginResult::pass())),
            calls: AtomicUsize::new(0),
        })
    }

    #[tokio::test]
    async fn priority_order_with_declaration_tiebreak() {
        let order = Arc::new(parking_lot_order::Order::default());

        let make = |name: &str, order: Arc<parking_lot_order::Order>| -> Arc<dyn Plugin> {
            let label = name.to_string();
            Arc::new(Scripted {
                name: name.into(),
                behavior: Box::new(move |_, _| {
                    order.push(label.clone());
                    Ok(PluginResult::pass())
                }),
                calls: AtomicUsize::new(0),
            })
        };

        let mgr = manager(vec![
            (spec("late", 20, PluginMode::Enforce), make("late", order.clone())),
            (spec("tie-b", 10, PluginMode::Enforce), make("tie-b", order.clone())),
            (spec("tie-a", 10, PluginMode::Enforce), make("tie-a", order.clone())),
            (spec("first", 1, PluginMode::Enforce), make("first", order.clone())),
        ]);

        let mut ctx = ctx();
        let outcome = mgr
            .run(
                HookType::ToolPreInvoke,
                &mut ctx,
                &RequestAttributes::default(),
                payload("ok"),
            )
            .await
            .unwrap();
        assert!(matches!(outcome, ChainOutcome::Continue(_)));
        // declaration order breaks the tie: tie-b was declared before tie-a
        assert_eq!(order.snapshot(), vec!["first", "tie-b", "tie-a", "late"]);
    }

    mod parking_lot_order {
        #[derive(Default)]
        pub struct Order(parking_lot::Mutex<Vec<String>>);
        impl Order {
            pub fn push(&self, s: String) {
                self.0.lock().push(s);
            }
            pub fn snapshot(&self) -> Vec<String> {
                self.0.lock().clone()
            }
        }
    }

    #[tokio::test]
    async fn enforce_blocks_on_violation_and_short_circuits() {
        let never_reached = Arc::new(Scripted {
            name: "after".into(),
            behavior: Box::new(|_, _| panic!("must not run after a block")),
            calls: AtomicUsize::new(0),
        });
        let pii: Arc<dyn Plugin> = Arc::new(Scripted {
            name: "PIIFilterPlugin".into(),
            behavior: Box::new(|_, payload| {
                let text = payload["arguments"]["text"].as_str().unwrap_or_default();
                if text.contains("123-45-6789") {
                    Ok(PluginResult::block(PluginViolation::new(
                        "PII detected",
                        "SSN found in arguments",
                        "CONTENT_BLOCKED",
                    )))
                } else {
                    Ok(PluginResult::pass())
                }
            }),
            calls: AtomicUsize::new(0),
        });

        let mgr = manager(vec![
            (spec("PIIFilterPlugin", 10, PluginMode::Enforce), pii),
            (spec("after", 20, PluginMode::Enforce), never_reached),
        ]);

        let mut ctx = ctx();
        let outcome = mgr
            .run(
                HookType::ToolPreInvoke,
                &mut ctx,
                &RequestAttributes::default(),
                payload("SSN is 123-45-6789"),
            )
            .await
            .unwrap();
        match outcome {
            ChainOutcome::Blocked(violation) => {
                assert_eq!(violation.code, "CONTENT_BLOCKED");
                assert_eq!(violation.plugin_name, "PIIFilterPlugin");
            }
            other => panic!("expected block, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn permissive_logs_violation_and_continues() {
        let blocker: Arc<dyn Plugin> = Arc::new(Scripted {
            name: "softy".into(),
            behavior: Box::new(|_, _| {
                Ok(PluginResult::block(PluginViolation::new(
                    "nope",
                    "would block",
                    "SOFT_BLOCK",
                )))
            }),
            calls: AtomicUsize::new(0),
        });
        let mgr = manager(vec![(spec("softy", 5, PluginMode::Permissive), blocker)]);

        let mut ctx = ctx();
        let outcome = mgr
            .run(
                HookType::ToolPreInvoke,
                &mut ctx,
                &RequestAttributes::default(),
                payload("anything"),
            )
            .await
            .unwrap();
        assert!(matches!(outcome, ChainOutcome::Continue(_)));
    }

    #[tokio::test]
    async fn enforce_ignore_error_skips_errors_but_honors_violations() {
        let erroring: Arc<dyn Plugin> = Arc::new(Scripted {
            name: "flaky".into(),
            behavior: Box::new(|_, _| Err(PluginError::execution("flaky", "boom"))),
            calls: AtomicUsize::new(0),
        });
        let blocking: Arc<dyn Plugin> = Arc::new(Scripted {
            name: "strict".into(),
            behavior: Box::new(|_, _| {
                Ok(PluginResult::block(PluginViolation::new(
                    "blocked",
                    "explicit violation still blocks",
                    "BLOCKED",
                )))
            }),
            calls: AtomicUsize::new(0),
        });

        let mgr = manager(vec![
            (spec("flaky", 1, PluginMode::EnforceIgnoreError), erroring),
            (spec("strict", 2, PluginMode::EnforceIgnoreError), blocking),
        ]);

        let mut ctx = ctx();
        let outcome = mgr
            .run(
                HookType::ToolPreInvoke,
                &mut ctx,
                &RequestAttributes::default(),
                payload("x"),
            )
            .await
            .unwrap();
        assert!(matches!(outcome, ChainOutcome::Blocked(_)));
    }

    #[tokio::test]
    async fn payload_chaining_feeds_next_plugin() {
        let redactor: Arc<dyn Plugin> = Arc::new(Scripted {
            name: "redactor".into(),
            behavior: Box::new(|_, mut payload| {
                payload["arguments"]["text"] = Value::String("[redacted]".into());
                Ok(PluginResult::modify(payload))
            }),
            calls: AtomicUsize::new(0),
        });
        let asserter: Arc<dyn Plugin> = Arc::new(Scripted {
            name: "asserter".into(),
            behavior: Box::new(|_, payload| {
                assert_eq!(payload["arguments"]["text"], "[redacted]");
                Ok(PluginResult::pass())
            }),
            calls: AtomicUsize::new(0),
        });

        let mgr = manager(vec![
            (spec("redactor", 1, PluginMode::Enforce), redactor),
            (spec("asserter", 2, PluginMode::Enforce), asserter),
        ]);

        let mut ctx = ctx();
        let outcome = mgr
            .run(
                HookType::ToolPreInvoke,
                &mut ctx,
                &RequestAttributes::default(),
                payload("secret"),
            )
            .await
            .unwrap();
        match outcome {
            ChainOutcome::Continue(p) => {
                assert_eq!(p.arguments["text"], "[redacted]");
            }
            other => panic!("expected continue, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn elicitation_suspends_and_resume_reruns_same_plugin() {
        let confirming: Arc<dyn Plugin> = Arc::new(Scripted {
            name: "confirm-delete".into(),
            behavior: Box::new(|call, _| {
                if call == 0 {
                    Ok(PluginResult::elicit(PluginElicitation {
                        message: "Confirm deletion of /tmp/x".into(),
                        schema: serde_json::json!({
                            "type": "object",
                            "properties": {"confirm_deletion": {"type": "boolean"}},
                            "required": ["confirm_deletion"]
                        }),
                        timeout_seconds: Some(60),
                    }))
                } else {
                    Ok(PluginResult::pass())
                }
            }),
            calls: AtomicUsize::new(0),
        });

        let mgr = manager(vec![(
            spec("confirm-delete", 10, PluginMode::Enforce),
            confirming,
        )]);

        let mut ctx = ctx();
        let outcome = mgr
            .run(
                HookType::ToolPreInvoke,
                &mut ctx,
                &RequestAttributes::default(),
                payload("delete"),
            )
            .await
            .unwrap();
        let resume = match outcome {
            ChainOutcome::Elicit { resume, request } => {
                assert_eq!(request.message, "Confirm deletion of /tmp/x");
                resume
            }
            other => panic!("expected elicit, got {other:?}"),
        };

        ctx.elicitation_responses
            .push(mcpgateway_protocol::types::ElicitResult {
                action: mcpgateway_protocol::types::ElicitationAction::Accept,
                data: Some(serde_json::json!({"confirm_deletion": true})),
            });

        let outcome = mgr
            .resume(
                HookType::ToolPreInvoke,
                &mut ctx,
                &RequestAttributes::default(),
                payload("delete"),
                resume,
            )
            .await
            .unwrap();
        assert!(matches!(outcome, ChainOutcome::Continue(_)));
    }

    #[tokio::test]
    async fn timeout_is_a_plugin_error() {
        let slow: Arc<dyn Plugin> = Arc::new(SlowPlugin);
        let mut spec = spec("slow", 1, PluginMode::Enforce);
        spec.timeout_seconds = Some(0); // immediate deadline
        let mgr = manager(vec![(spec, slow)]);

        let mut ctx = ctx();
        let err = mgr
            .run(
                HookType::ToolPreInvoke,
                &mut ctx,
                &RequestAttributes::default(),
                payload("x"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, PluginError::Timeout { .. }));
    }

    struct SlowPlugin;

    #[async_trait]
    impl Plugin for SlowPlugin {
        fn name(&self) -> &str {
            "slow"
        }

        async fn invoke(
            &self,
            _hook: HookType,
            _payload: Value,
            _ctx: &PluginContext<'_>,
        ) -> Result<PluginResult<Value>, PluginError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(PluginResult::pass())
        }
    }

    #[tokio::test]
    async fn conditions_gate_execution() {
        let counted = Arc::new(Scripted {
            name: "scoped".into(),
            behavior: Box::new(|_, _| Ok(PluginResult::pass())),
            calls: AtomicUsize::new(0),
        });
        let calls_handle = counted.clone();

        let mut scoped_spec = spec("scoped", 1, PluginMode::Enforce);
        scoped_spec.conditions.tools = vec!["delete_file".into()];
        let lookup: Arc<dyn Plugin> = counted;
        let mgr = manager(vec![(scoped_spec, lookup)]);

        let mut ctx = ctx();
        mgr.run(
            HookType::ToolPreInvoke,
            &mut ctx,
            &RequestAttributes {
                tool: Some("read_file"),
                ..Default::default()
            },
            payload("x"),
        )
        .await
        .unwrap();
        assert_eq!(calls_handle.calls.load(Ordering::SeqCst), 0);

        mgr.run(
            HookType::ToolPreInvoke,
            &mut ctx,
            &RequestAttributes {
                tool: Some("delete_file"),
                ..Default::default()
            },
            payload("x"),
        )
        .await
        .unwrap();
        assert_eq!(calls_handle.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unused_hook_runs_nothing() {
        let mgr = manager(vec![(
            spec("pre-only", 1, PluginMode::Enforce),
            pass_plugin("pre-only"),
        )]);
        let mut ctx = ctx();
        let outcome = mgr
            .run(
                HookType::ResourcePreFetch,
                &mut ctx,
                &RequestAttributes::default(),
                crate::hooks::ResourcePayload {
                    uri: "mem://x".into(),
                },
            )
            .await
            .unwrap();
        assert!(matches!(outcome, ChainOutcome::Continue(_)));
    }
}
