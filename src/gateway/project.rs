//! Project facts
//!
//! Fetches the project-management data a session's slides are built from.
//! The project record itself is required; everything else is best effort.

use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::client::{GatewayClient, ServiceKind};
use super::error::{GatewayError, GatewayResult};
use crate::core::types::{ProjectId, Theme};

/// Opaque project data, fetched once per session
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectFacts {
    pub project_id: ProjectId,
    /// Result of `get_project`
    pub project: Value,
    /// Optional datasets keyed by name (`space`, `users`, `issues`, ...)
    pub extras: BTreeMap<String, Value>,
}

impl ProjectFacts {
    pub fn new(project_id: ProjectId, project: Value) -> Self {
        Self {
            project_id,
            project,
            extras: BTreeMap::new(),
        }
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extras.insert(key.into(), value);
        self
    }

    /// Select the datasets relevant to a theme
    pub fn for_theme(&self, theme: Theme) -> Value {
        let (keys, focus): (&[&str], Option<&str>) = match theme {
            Theme::ProjectOverview => (&["space", "users"] as &[_], None),
            Theme::ProjectProgress => (&["issues", "issueCount"] as &[_], None),
            Theme::IssueManagement => (&["issues", "issueTypes", "priorities"] as &[_], None),
            Theme::RiskAnalysis => (&["issues", "priorities"] as &[_], None),
            Theme::TeamCollaboration => (&["users", "issues"] as &[_], None),
            Theme::DocumentManagement => (&["space", "users"] as &[_], Some("documents")),
            Theme::CodebaseActivity => (&["space", "users"] as &[_], Some("codebase")),
            Theme::Notifications => (&["space", "users"] as &[_], Some("notifications")),
            Theme::PredictiveAnalysis => (&["issues", "issueCount", "priorities"] as &[_], Some("prediction")),
            Theme::SummaryPlan => (&["space", "users", "issues", "issueCount"] as &[_], Some("summary")),
        };

        let mut data = Map::new();
        data.insert("project".to_string(), self.project.clone());
        for key in keys {
            if let Some(value) = self.extras.get(*key) {
                data.insert((*key).to_string(), value.clone());
            }
        }
        if let Some(focus) = focus {
            data.insert("focus".to_string(), Value::String(focus.to_string()));
        }
        Value::Object(data)
    }
}

/// Typed front for the project data service
#[derive(Clone)]
pub struct ProjectDataClient {
    gateway: GatewayClient,
}

impl ProjectDataClient {
    pub fn new(gateway: GatewayClient) -> Self {
        Self { gateway }
    }

    /// Fetch the project and its supporting datasets.
    ///
    /// Fails only when the project record cannot be fetched; optional
    /// datasets that fail are logged and left out.
    pub async fn fetch_facts(
        &self,
        project_id: &ProjectId,
        cancel: &CancellationToken,
    ) -> GatewayResult<ProjectFacts> {
        let id = project_id.as_str();
        let project = self
            .call("get_project", json!({ "projectIdOrKey": id }), cancel)
            .await?;

        let optional = [
            ("space", "get_space", json!({})),
            ("users", "get_users", json!({})),
            ("issues", "get_issues", json!({ "projectId": [id], "count": 100 })),
            ("issueCount", "count_issues", json!({ "projectId": [id] })),
            ("issueTypes", "get_issue_types", json!({ "projectIdOrKey": id })),
            ("priorities", "get_priorities", json!({})),
        ];

        let results = futures::future::join_all(optional.into_iter().map(|(key, tool, args)| async move {
            (key, tool, self.call(tool, args, cancel).await)
        }))
        .await;

        let mut facts = ProjectFacts::new(project_id.clone(), project);
        for (key, tool, result) in results {
            match result {
                Ok(value) => {
                    facts.extras.insert(key.to_string(), value);
                }
                Err(e @ GatewayError::Cancelled { .. }) => return Err(e),
                Err(e) => warn!(project = %id, tool, "optional project data unavailable: {}", e),
            }
        }

        debug!(project = %id, datasets = facts.extras.len(), "project facts fetched");
        Ok(facts)
    }

    async fn call(&self, tool: &str, args: Value, cancel: &CancellationToken) -> GatewayResult<Value> {
        self.gateway.call(ServiceKind::ProjectData, tool, args, cancel).await
    }
}
