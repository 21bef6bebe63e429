//! 評価エンジン
//!
//! スタックを段（wave）ごとにプロバイダーへ適用します。同じ段のリソースは
//! 並行して作成し、属性トークンは作成済みリソースの属性で解決します。
//! リトライは行いません。失敗した段を最後まで実行したあと、残りの操作はすべて
//! スキップし、失敗したリソースを `blocked_by` として報告します。

use crate::deployment::Deployment;
use crate::error::Result;
use crate::stack::Stack;
use crate::token::{self, AttrRef};
use futures_util::future::join_all;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use webstack_cloud::{
    Action, ActionType, ApplyResult, CloudError, CloudProvider, Plan, ProviderState,
    ResourceConfig, ResourceState, ResourceStatus,
};

#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// 検証待ちリソースを再読込する間隔
    pub validation_poll_interval: Duration,
    /// 検証待ちを打ち切るまでの時間（打ち切ったリソースは pending として報告）
    pub validation_timeout: Duration,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            validation_poll_interval: Duration::from_secs(10),
            validation_timeout: Duration::from_secs(30 * 60),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operation {
    Create,
    Update,
    Await,
}

/// 1つの操作の結果
struct Outcome {
    key: String,
    action_id: String,
    result: std::result::Result<ResourceState, CloudError>,
}

pub struct Engine<P: CloudProvider> {
    provider: P,
    options: EngineOptions,
}

impl<P: CloudProvider> Engine<P> {
    pub fn new(provider: P, options: EngineOptions) -> Self {
        Self { provider, options }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// 宣言とプロバイダーのステートの差分
    pub async fn plan(&self, stack: &Stack) -> Result<Plan> {
        let state = self.provider.get_state().await?;
        let mut actions = Vec::new();

        for wave in stack.waves()? {
            for key in wave {
                let Some(resource) = stack.get(&key) else {
                    continue;
                };
                actions.push(plan_action(resource, state.get(&key)));
            }
        }

        // 宣言から消えたリソースは新しいものから削除する
        let mut orphans: Vec<(&String, &ResourceState)> = state
            .iter()
            .filter(|(key, _)| !stack.contains(key))
            .collect();
        orphans.sort_by(|a, b| b.1.created_at.cmp(&a.1.created_at));
        for (_, resource) in orphans {
            actions.push(Action::new(
                ActionType::Delete,
                &resource.resource_type,
                &resource.id,
                "宣言から削除されたリソース",
            ));
        }

        let plan = Plan::new(actions);
        info!(summary = %plan.summary(), "Planned changes");
        Ok(plan)
    }

    /// 計画を適用
    pub async fn apply(&self, stack: &Stack, plan: &Plan) -> Result<ApplyResult> {
        let started = Instant::now();
        let mut result = ApplyResult::new();
        let state = self.provider.get_state().await?;

        let mut resolved: HashMap<String, ResourceState> = state
            .iter()
            .map(|(key, s)| (key.clone(), s.clone()))
            .collect();
        // 利用できないリソース → 原因となったリソース
        let mut unavailable: HashMap<String, String> = HashMap::new();
        let mut aborted_by: Option<String> = None;

        for wave in stack.waves()? {
            if let Some(failed) = &aborted_by {
                for key in &wave {
                    result.add_skipped(action_id_for(plan, key), failed.clone());
                }
                continue;
            }

            let mut tasks = Vec::new();
            for key in wave {
                let Some(resource) = stack.get(&key) else {
                    continue;
                };
                let action_id = action_id_for(plan, &key);

                if let Some(root) = resource
                    .depends_on
                    .iter()
                    .find_map(|dep| unavailable.get(dep))
                    .cloned()
                {
                    debug!(resource = %key, blocked_by = %root, "Skipping resource");
                    result.add_skipped(action_id, root.clone());
                    unavailable.insert(key, root);
                    continue;
                }

                let action_type = plan
                    .action_for(&key)
                    .map(|a| a.action_type)
                    .unwrap_or(ActionType::Create);

                let operation = match action_type {
                    ActionType::NoOp | ActionType::Delete => match resolved.get(&key) {
                        Some(s) if s.status.is_ready() => {
                            result.add_success(action_id, "変更なし".to_string());
                            continue;
                        }
                        Some(s) if s.status == ResourceStatus::PendingValidation => {
                            Operation::Await
                        }
                        Some(_) => Operation::Update,
                        None => Operation::Create,
                    },
                    ActionType::Create => Operation::Create,
                    ActionType::Update => Operation::Update,
                };

                let config = match resolve_declaration(resource, &resolved) {
                    Ok(config) => config,
                    Err(reference) => {
                        warn!(resource = %key, reference = %reference, "Unresolved reference");
                        result.add_failure(
                            action_id,
                            CloudError::UnresolvedReference {
                                resource: key.clone(),
                                reference: reference.token(),
                            }
                            .to_string(),
                        );
                        aborted_by.get_or_insert(key);
                        continue;
                    }
                };

                tasks.push(self.run(operation, key, action_id, config));
            }

            for outcome in join_all(tasks).await {
                match outcome.result {
                    Ok(state) if state.status.is_ready() => {
                        info!(resource = %outcome.key, "Resource available");
                        result.add_success(outcome.action_id, format!("{} ({})", outcome.key, state.id));
                        resolved.insert(outcome.key, state);
                    }
                    Ok(state) => {
                        warn!(resource = %outcome.key, status = %state.status, "Resource is not available yet");
                        result.add_pending(
                            outcome.action_id,
                            format!("{} は {} のままです", outcome.key, state.status),
                        );
                        unavailable.insert(outcome.key.clone(), outcome.key);
                    }
                    Err(e) => {
                        warn!(resource = %outcome.key, error = %e, "Resource failed");
                        result.add_failure(outcome.action_id, e.to_string());
                        aborted_by.get_or_insert(outcome.key);
                    }
                }
            }
        }

        for action in plan.actions_by_type(ActionType::Delete) {
            let key = action.resource_key();
            if let Some(failed) = &aborted_by {
                result.add_skipped(action.id.clone(), failed.clone());
                continue;
            }
            match self.provider.destroy(&key).await {
                Ok(()) => result.add_success(action.id.clone(), format!("{} を削除しました", key)),
                Err(e) => {
                    result.add_failure(action.id.clone(), e.to_string());
                    aborted_by = Some(key);
                }
            }
        }

        result.duration_ms = started.elapsed().as_millis() as u64;
        info!(
            succeeded = result.succeeded.len(),
            failed = result.failed.len(),
            pending = result.pending.len(),
            skipped = result.skipped.len(),
            duration_ms = result.duration_ms,
            "Apply finished"
        );
        Ok(result)
    }

    /// スタックを依存の逆順に削除
    ///
    /// 最初の失敗で残りをスキップします。
    pub async fn destroy(&self, stack: &Stack) -> Result<ApplyResult> {
        let started = Instant::now();
        let mut result = ApplyResult::new();
        let state = self.provider.get_state().await?;

        let mut waves: Vec<Vec<String>> = Vec::new();
        let orphans: Vec<String> = state
            .iter()
            .map(|(key, _)| key.clone())
            .filter(|key| !stack.contains(key))
            .collect();
        if !orphans.is_empty() {
            waves.push(orphans);
        }
        let mut declared = stack.waves()?;
        declared.reverse();
        waves.extend(declared);

        let mut aborted_by: Option<String> = None;
        for wave in waves {
            let present: Vec<String> = wave.into_iter().filter(|k| state.get(k).is_some()).collect();
            if let Some(failed) = &aborted_by {
                for key in present {
                    result.add_skipped(format!("{}-{}", ActionType::Delete, key), failed.clone());
                }
                continue;
            }

            let tasks = present.into_iter().map(|key| async move {
                let outcome = self.provider.destroy(&key).await;
                (key, outcome)
            });
            for (key, outcome) in join_all(tasks).await {
                let action_id = format!("{}-{}", ActionType::Delete, key);
                match outcome {
                    Ok(()) => {
                        info!(resource = %key, "Resource destroyed");
                        result.add_success(action_id, format!("{} を削除しました", key));
                    }
                    Err(e) => {
                        warn!(resource = %key, error = %e, "Destroy failed");
                        result.add_failure(action_id, e.to_string());
                        aborted_by.get_or_insert(key);
                    }
                }
            }
        }

        result.duration_ms = started.elapsed().as_millis() as u64;
        Ok(result)
    }

    /// 現在のステートで出力値を解決
    pub async fn resolve_outputs(&self, deployment: &Deployment) -> Result<BTreeMap<String, String>> {
        let state = self.provider.get_state().await?;
        Ok(deployment.resolve_outputs(|r| lookup_attribute(&state, r)))
    }

    async fn run(
        &self,
        operation: Operation,
        key: String,
        action_id: String,
        config: ResourceConfig,
    ) -> Outcome {
        debug!(resource = %key, operation = ?operation, "Applying resource");
        let result = match operation {
            Operation::Create => self.provider.create(&config).await,
            Operation::Update => self.provider.update(&config).await,
            Operation::Await => self.provider.refresh(&key).await,
        };
        let result = match result {
            Ok(state) if state.status == ResourceStatus::PendingValidation => {
                self.await_validation(&key, state).await
            }
            Ok(state) if state.status == ResourceStatus::Error => Err(CloudError::ApiError(
                format!("{} がエラー状態です", key),
            )),
            other => other,
        };
        Outcome {
            key,
            action_id,
            result,
        }
    }

    async fn await_validation(
        &self,
        key: &str,
        mut state: ResourceState,
    ) -> std::result::Result<ResourceState, CloudError> {
        let deadline = Instant::now() + self.options.validation_timeout;
        info!(resource = %key, "Waiting for validation");
        while state.status == ResourceStatus::PendingValidation {
            if Instant::now() >= deadline {
                return Ok(state);
            }
            tokio::time::sleep(self.options.validation_poll_interval).await;
            state = self.provider.refresh(key).await?;
        }
        Ok(state)
    }
}

fn plan_action(resource: &ResourceConfig, current: Option<&ResourceState>) -> Action {
    let (action_type, description) = match current {
        None => (ActionType::Create, "新規作成"),
        Some(s) if s.status == ResourceStatus::Error => (ActionType::Update, "エラー状態から再適用"),
        Some(s) if s.fingerprint != resource.fingerprint => (ActionType::Update, "宣言が変更されました"),
        Some(_) => (ActionType::NoOp, "変更なし"),
    };
    let mut action = Action::new(action_type, &resource.resource_type, &resource.id, description);
    if let Some(fingerprint) = &resource.fingerprint {
        action = action.with_detail("fingerprint", serde_json::json!(fingerprint));
    }
    if !resource.depends_on.is_empty() {
        action = action.with_detail("depends_on", serde_json::json!(resource.depends_on));
    }
    action
}

fn action_id_for(plan: &Plan, key: &str) -> String {
    plan.action_for(key)
        .map(|a| a.id.clone())
        .unwrap_or_else(|| format!("{}-{}", ActionType::Create, key))
}

fn lookup_attribute(state: &ProviderState, reference: &AttrRef) -> Option<String> {
    state
        .get(&reference.key())
        .and_then(|s| s.attribute_string(&reference.attribute))
}

/// 宣言中のトークンを作成済みリソースの属性で置換
fn resolve_declaration(
    resource: &ResourceConfig,
    resolved: &HashMap<String, ResourceState>,
) -> std::result::Result<ResourceConfig, AttrRef> {
    let lookup = |r: &AttrRef| {
        resolved
            .get(&r.key())
            .filter(|s| s.status.is_ready())
            .and_then(|s| s.attribute_string(&r.attribute))
    };
    let config = token::resolve_value(&resource.config, &lookup)?;
    Ok(ResourceConfig {
        config,
        ..resource.clone()
    })
}
