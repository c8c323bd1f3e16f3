//! スケジュールルールのターゲット選択
//!
//! ルール名・ターゲット名・依存サービスの条件で、更新対象のルールとターゲットを絞り込む。

use shipflow_cloud::{
    Result as CloudResult, RoleResolver, RuleTarget, RuleUpdate, TaskDefinitionHandle,
};
use shipflow_core::{ScheduledRule, ScheduledTaskTarget};

/// 更新対象の絞り込み条件 (未設定の条件は全件一致)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScheduleFilter {
    pub rule: Option<String>,
    pub target: Option<String>,
    pub depend_service: Option<String>,
}

impl ScheduleFilter {
    /// 指定ルール (とターゲット) の明示的な更新
    pub fn rule(rule: impl Into<String>, target: Option<String>) -> Self {
        Self {
            rule: Some(rule.into()),
            target,
            depend_service: None,
        }
    }

    /// サービスのデプロイに連動する更新
    pub fn depend_service(service: impl Into<String>) -> Self {
        Self {
            depend_service: Some(service.into()),
            ..Default::default()
        }
    }

    /// ターゲットを明示した場合だけイメージを再ビルドする
    pub fn rebuilds_images(&self) -> bool {
        self.target.is_some()
    }

    fn accepts_rule(&self, rule: &ScheduledRule) -> bool {
        self.rule.as_deref().is_none_or(|name| rule.name == name)
    }

    fn accepts_target(&self, target: &ScheduledTaskTarget) -> bool {
        self.depend_service
            .as_deref()
            .is_none_or(|service| target.depends_on(service))
            && self.target.as_deref().is_none_or(|name| target.name == name)
    }
}

/// 条件に一致したルールとターゲット
#[derive(Debug)]
pub struct MatchedRule<'m> {
    pub rule: &'m ScheduledRule,
    pub targets: Vec<&'m ScheduledTaskTarget>,
}

/// 条件に一致するターゲットを持つルールを定義順に返す
pub fn select_targets<'m>(rules: &'m [ScheduledRule], filter: &ScheduleFilter) -> Vec<MatchedRule<'m>> {
    rules
        .iter()
        .filter(|rule| filter.accepts_rule(rule))
        .filter_map(|rule| {
            let targets: Vec<_> = rule
                .targets
                .iter()
                .filter(|target| filter.accepts_target(target))
                .collect();
            if targets.is_empty() {
                tracing::debug!(rule = %rule.name, "No matching targets, skipping rule");
                return None;
            }
            Some(MatchedRule { rule, targets })
        })
        .collect()
}

/// ターゲット定義と登録済みタスク定義からルールターゲットを組み立てる
///
/// ロール名は ARN に解決する。イベント実行ロールの指定がなければ `default_events_role`。
pub async fn resolve_rule_target(
    target: &ScheduledTaskTarget,
    task_definition: TaskDefinitionHandle,
    roles: &dyn RoleResolver,
    default_events_role: &str,
) -> CloudResult<RuleTarget> {
    let events_role = target
        .cloudwatch_event_iam_role
        .as_deref()
        .unwrap_or(default_events_role);
    let cloudwatch_event_iam_role_arn = roles.role_arn(events_role).await?;

    let task_role_arn = match &target.task_role {
        Some(role) => Some(roles.role_arn(role).await?),
        None => None,
    };

    Ok(RuleTarget {
        id: target.name.clone(),
        task_definition,
        desired_count: target.desired_count,
        container_overrides: target.container_overrides.clone().unwrap_or_default(),
        cloudwatch_event_iam_role_arn,
        task_role_arn,
        launch_type: target.launch_type,
        network_configuration: target.network_configuration.clone(),
    })
}

/// ルール全体の更新内容 (ターゲットは置き換え)
pub fn rule_update(rule: &ScheduledRule, targets: Vec<RuleTarget>) -> RuleUpdate {
    RuleUpdate {
        rule: rule.name.clone(),
        expression: rule.expression.clone(),
        enabled: rule.enabled,
        description: rule.description.clone(),
        targets,
    }
}
