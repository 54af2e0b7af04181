//! Domain vocabulary shared across the crate

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use super::error::PresenterError;

/// Maximum number of themes accepted in one generation request
pub const MAX_THEMES: usize = 10;

/// A slide theme, one slide is produced per requested theme
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Theme {
    ProjectOverview,
    ProjectProgress,
    IssueManagement,
    RiskAnalysis,
    TeamCollaboration,
    DocumentManagement,
    CodebaseActivity,
    Notifications,
    PredictiveAnalysis,
    SummaryPlan,
}

impl Theme {
    /// Every known theme in catalog order
    pub const ALL: [Theme; 10] = [
        Theme::ProjectOverview,
        Theme::ProjectProgress,
        Theme::IssueManagement,
        Theme::RiskAnalysis,
        Theme::TeamCollaboration,
        Theme::DocumentManagement,
        Theme::CodebaseActivity,
        Theme::Notifications,
        Theme::PredictiveAnalysis,
        Theme::SummaryPlan,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Theme::ProjectOverview => "project_overview",
            Theme::ProjectProgress => "project_progress",
            Theme::IssueManagement => "issue_management",
            Theme::RiskAnalysis => "risk_analysis",
            Theme::TeamCollaboration => "team_collaboration",
            Theme::DocumentManagement => "document_management",
            Theme::CodebaseActivity => "codebase_activity",
            Theme::Notifications => "notifications",
            Theme::PredictiveAnalysis => "predictive_analysis",
            Theme::SummaryPlan => "summary_plan",
        }
    }

    /// Title used when the generated markdown carries none, and for placeholders
    pub fn default_title(&self, language: Language) -> &'static str {
        match language {
            Language::Ja => match self {
                Theme::ProjectOverview => "プロジェクト概要",
                Theme::ProjectProgress => "プロジェクト進捗",
                Theme::IssueManagement => "課題管理",
                Theme::RiskAnalysis => "リスク分析",
                Theme::TeamCollaboration => "チーム協力",
                Theme::DocumentManagement => "ドキュメント管理",
                Theme::CodebaseActivity => "コードベース活動",
                Theme::Notifications => "通知管理",
                Theme::PredictiveAnalysis => "予測分析",
                Theme::SummaryPlan => "総括と計画",
            },
            Language::En => match self {
                Theme::ProjectOverview => "Project Overview",
                Theme::ProjectProgress => "Project Progress",
                Theme::IssueManagement => "Issue Management",
                Theme::RiskAnalysis => "Risk Analysis",
                Theme::TeamCollaboration => "Team Collaboration",
                Theme::DocumentManagement => "Document Management",
                Theme::CodebaseActivity => "Codebase Activity",
                Theme::Notifications => "Notifications",
                Theme::PredictiveAnalysis => "Predictive Analysis",
                Theme::SummaryPlan => "Summary & Plan",
            },
        }
    }

    /// What the slide for this theme should cover
    pub fn instruction(&self, language: Language) -> &'static str {
        match language {
            Language::Ja => match self {
                Theme::ProjectOverview => "プロジェクトの概要スライドを作成してください。名称、目的、期間、体制を含めること。",
                Theme::ProjectProgress => "進捗状況のスライドを作成してください。完了率、マイルストーン、現状を含めること。",
                Theme::IssueManagement => "課題管理のスライドを作成してください。未解決課題、優先度の分布、進行中タスクを含めること。",
                Theme::RiskAnalysis => "リスク分析のスライドを作成してください。潜在リスク、遅延要因、対策を含めること。",
                Theme::TeamCollaboration => "チーム協力のスライドを作成してください。メンバー、役割分担、コミュニケーションを含めること。",
                Theme::DocumentManagement => "文書管理のスライドを作成してください。文書数、更新頻度、知識共有を含めること。",
                Theme::CodebaseActivity => "開発活動のスライドを作成してください。コミット、開発者の活動量、リリース頻度を含めること。",
                Theme::Notifications => "コミュニケーション状況のスライドを作成してください。通知数、応答率、重要通知の処理を含めること。",
                Theme::PredictiveAnalysis => "予測分析のスライドを作成してください。完了予測、リスク発生確率、必要リソースを含めること。",
                Theme::SummaryPlan => "総括と計画のスライドを作成してください。主要成果、KPI、残課題、次期計画を含めること。",
            },
            Language::En => match self {
                Theme::ProjectOverview => "Create a project overview slide covering name, purpose, timeline and team.",
                Theme::ProjectProgress => "Create a progress slide covering completion rate, milestones and current state.",
                Theme::IssueManagement => "Create an issue management slide covering open issues, priority distribution and work in progress.",
                Theme::RiskAnalysis => "Create a risk analysis slide covering potential risks, delay factors and mitigations.",
                Theme::TeamCollaboration => "Create a team collaboration slide covering members, role assignments and communication.",
                Theme::DocumentManagement => "Create a document management slide covering document count, update frequency and knowledge sharing.",
                Theme::CodebaseActivity => "Create a development activity slide covering commits, developer activity and release cadence.",
                Theme::Notifications => "Create a communication slide covering notification volume, response rate and handling of important notices.",
                Theme::PredictiveAnalysis => "Create a predictive analysis slide covering forecast completion, risk likelihood and resource needs.",
                Theme::SummaryPlan => "Create a summary slide covering key achievements, KPIs, remaining issues and next steps.",
            },
        }
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Theme {
    type Err = PresenterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Theme::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| PresenterError::invalid_field("themes", format!("unknown theme: {}", s)))
    }
}

/// Presentation language
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Ja,
    En,
}

impl Language {
    pub fn code(&self) -> &'static str {
        match self {
            Language::Ja => "ja",
            Language::En => "en",
        }
    }

    /// Body of a placeholder slide when a theme could not be generated
    pub fn unavailable_note(&self) -> &'static str {
        match self {
            Language::Ja => "このテーマのコンテンツは現在利用できません。",
            Language::En => "Content for this theme is currently unavailable.",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Language {
    type Err = PresenterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ja" => Ok(Language::Ja),
            "en" => Ok(Language::En),
            other => Err(PresenterError::invalid_field(
                "language",
                format!("unsupported language: {} (expected ja or en)", other),
            )),
        }
    }
}

/// Project identifier; clients send it either as a JSON string or a number
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct ProjectId(String);

impl ProjectId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for ProjectId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for ProjectId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Str(String),
            Int(i64),
            Float(f64),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Str(s) => Ok(ProjectId(s)),
            Raw::Int(n) => Ok(ProjectId(n.to_string())),
            Raw::Float(f) if f.fract() == 0.0 => Ok(ProjectId(format!("{}", f as i64))),
            Raw::Float(f) => Err(serde::de::Error::custom(format!(
                "project id must be an integer, got {}",
                f
            ))),
        }
    }
}
