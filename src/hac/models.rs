//! Result models for console operations, plus the wire shapes they are decoded from.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::html;

/// An authenticated console session. Replaced wholesale, never patched in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub session_id: String,
    pub csrf_token: String,
    /// `ROUTE=value` as captured at login.
    pub route_cookie: Option<String>,
    pub is_authenticated: bool,
}

impl SessionInfo {
    /// A session is usable only with both a session id and a CSRF token.
    pub fn is_usable(&self) -> bool {
        !self.session_id.is_empty() && !self.csrf_token.is_empty()
    }
}

/// Outcome of a Groovy script run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroovyScriptResult {
    pub output_text: String,
    pub execution_result: String,
    pub stacktrace_text: Option<String>,
    pub commit_mode: bool,
    pub execution_time_ms: Option<i64>,
}

impl GroovyScriptResult {
    /// Success is an empty stack trace; the HTTP status alone says nothing.
    pub fn success(&self) -> bool {
        self.stacktrace_text
            .as_deref()
            .is_none_or(|trace| trace.trim().is_empty())
    }
}

/// Outcome of a FlexibleSearch query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlexibleSearchResult {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
    pub result_count: i64,
    pub execution_time_ms: Option<i64>,
    pub exception: Option<String>,
}

impl FlexibleSearchResult {
    pub fn success(&self) -> bool {
        self.exception.is_none()
    }
}

/// Strictness of an Impex import.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationMode {
    #[default]
    ImportStrict,
    ImportRelaxed,
    Strict,
    Relaxed,
}

impl ValidationMode {
    /// Value of the `validationEnum` form field.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ImportStrict => "IMPORT_STRICT",
            Self::ImportRelaxed => "IMPORT_RELAXED",
            Self::Strict => "STRICT",
            Self::Relaxed => "RELAXED",
        }
    }
}

impl fmt::Display for ValidationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ValidationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "import_strict" | "strict_import" => Ok(Self::ImportStrict),
            "import_relaxed" | "relaxed_import" => Ok(Self::ImportRelaxed),
            "strict" => Ok(Self::Strict),
            "relaxed" => Ok(Self::Relaxed),
            other => Err(format!(
                "Unknown validation mode '{other}' (expected import_strict, import_relaxed, strict or relaxed)"
            )),
        }
    }
}

/// Outcome of an Impex import.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImpexResult {
    pub success: bool,
    pub output: String,
    /// Server-reported problems; set whenever `success` is false.
    pub error: Option<String>,
    pub validation_errors: Vec<String>,
}

impl ImpexResult {
    pub(crate) fn from_output(success: bool, output: String) -> Self {
        let validation_errors = if success {
            Vec::new()
        } else {
            output
                .lines()
                .map(str::trim)
                .filter(|line| line.to_lowercase().contains("error"))
                .map(str::to_string)
                .collect()
        };
        Self {
            success,
            error: (!success).then(|| output.clone()),
            output,
            validation_errors,
        }
    }
}

/// One configurable parameter of a project data extension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateParameter {
    pub name: String,
    pub label: String,
    /// Available values and whether each is selected.
    pub values: BTreeMap<String, bool>,
    pub legacy: bool,
    pub multi_select: bool,
    pub default: Option<String>,
}

impl UpdateParameter {
    pub fn selected_value(&self) -> Option<&str> {
        self.values
            .iter()
            .find(|(_, selected)| **selected)
            .map(|(value, _)| value.as_str())
    }

    pub fn available_values(&self) -> Vec<&str> {
        self.values.keys().map(String::as_str).collect()
    }
}

/// A project data extension listed on the update page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectData {
    pub name: String,
    pub description: Option<String>,
    pub parameters: Vec<UpdateParameter>,
}

impl ProjectData {
    pub fn has_parameters(&self) -> bool {
        !self.parameters.is_empty()
    }
}

/// Snapshot of the system update page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateData {
    pub is_initializing: bool,
    pub project_datas: Vec<ProjectData>,
}

impl UpdateData {
    pub fn extensions_with_parameters(&self) -> Vec<&ProjectData> {
        self.project_datas.iter().filter(|pd| pd.has_parameters()).collect()
    }

    pub fn get_extension(&self, name: &str) -> Option<&ProjectData> {
        self.project_datas.iter().find(|pd| pd.name == name)
    }

    /// The project's patches extension.
    ///
    /// Among names containing "patches", prefer ones with parameters, and among those
    /// ones that are more than the bare word "patches". Without parameters anywhere,
    /// prefer `<prefix>patches` names, then any candidate.
    pub fn get_patches_extension(&self) -> Option<&ProjectData> {
        let candidates: Vec<&ProjectData> = self
            .project_datas
            .iter()
            .filter(|pd| pd.name.to_lowercase().contains("patches"))
            .collect();
        let is_bare = |pd: &&ProjectData| pd.name.eq_ignore_ascii_case("patches");

        let with_params: Vec<&ProjectData> =
            candidates.iter().copied().filter(|pd| pd.has_parameters()).collect();
        if !with_params.is_empty() {
            return with_params
                .iter()
                .copied()
                .find(|pd| !is_bare(pd))
                .or_else(|| with_params.first().copied());
        }

        candidates
            .iter()
            .copied()
            .find(|pd| pd.name.to_lowercase().ends_with("patches") && !is_bare(pd))
            .or_else(|| candidates.first().copied())
    }
}

/// A pending system patch, keyed by category in the pending-patches response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingPatch {
    pub hash: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

pub type PendingPatches = BTreeMap<String, Vec<PendingPatch>>;

/// Options for a system update run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateRequest {
    pub drop_tables: bool,
    /// Clears the HMC configuration.
    pub clear_hmc: bool,
    pub create_essential_data: bool,
    pub create_project_data: bool,
    pub localize_types: bool,
    /// Explicit patch selections, e.g. `Patch_MVP -> yes`.
    pub patches: BTreeMap<String, String>,
    /// Full parameter map; explicit `patches` are layered on top.
    pub all_parameters: BTreeMap<String, Vec<String>>,
    /// Fetch and include the server's required pending patches.
    pub include_pending_patches: bool,
}

impl Default for UpdateRequest {
    fn default() -> Self {
        Self {
            drop_tables: false,
            clear_hmc: false,
            create_essential_data: false,
            create_project_data: false,
            localize_types: false,
            patches: BTreeMap::new(),
            all_parameters: BTreeMap::new(),
            include_pending_patches: true,
        }
    }
}

impl UpdateRequest {
    pub fn with_patch(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.patches.insert(name.into(), value.into());
        self
    }

    /// JSON body for the execute endpoint. `pending` holds category -> required patch hashes.
    pub fn payload(&self, pending: &BTreeMap<String, Vec<String>>) -> Value {
        let mut all_parameters = self.all_parameters.clone();
        for (name, value) in &self.patches {
            all_parameters.insert(name.clone(), vec![value.clone()]);
        }

        let mut as_string_map = serde_json::Map::new();
        as_string_map.insert("initmethod".into(), serde_json::json!(["update"]));
        for (name, values) in &all_parameters {
            as_string_map.insert(name.clone(), serde_json::json!(values));
        }

        serde_json::json!({
            "dropTables": self.drop_tables,
            "clearHMC": self.clear_hmc,
            "createEssentialData": self.create_essential_data,
            "createProjectData": self.create_project_data,
            "localizeTypes": self.localize_types,
            "initMethod": Value::Null,
            "allParameters": all_parameters,
            "patches": pending,
            "parametersAsStringMap": as_string_map,
        })
    }
}

/// Required patch hashes per category.
pub fn required_patch_hashes(pending: &PendingPatches) -> BTreeMap<String, Vec<String>> {
    pending
        .iter()
        .filter_map(|(category, patches)| {
            let hashes: Vec<String> = patches
                .iter()
                .filter(|p| p.required)
                .map(|p| p.hash.clone())
                .collect();
            (!hashes.is_empty()).then(|| (category.clone(), hashes))
        })
        .collect()
}

/// Outcome of a system update run. The log is kept as raw HTML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateResult {
    pub success: bool,
    pub log_html: String,
}

impl UpdateResult {
    pub fn log_text(&self) -> String {
        html::html_to_text(&self.log_html)
    }

    pub fn is_finished(&self) -> bool {
        self.log_html.to_lowercase().contains("finished")
    }
}

/// Snapshot of the update log, polled while an update runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateLog {
    pub log_html: String,
}

impl UpdateLog {
    pub fn log_text(&self) -> String {
        html::html_to_text(&self.log_html)
    }

    pub fn is_complete(&self) -> bool {
        let text = self.log_text().to_lowercase();
        [
            "update finished",
            "initialization finished",
            "completed successfully",
            "update completed",
        ]
        .iter()
        .any(|marker| text.contains(marker))
    }

    pub fn has_errors(&self) -> bool {
        let text = self.log_text().to_lowercase();
        ["error", "exception", "failed"].iter().any(|marker| text.contains(marker))
    }
}

// Wire shapes. Missing fields default the same way the console UI treats them.

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ScriptResponse {
    #[serde(default)]
    output_text: Option<String>,
    #[serde(default)]
    execution_result: Option<Value>,
    #[serde(default)]
    stacktrace_text: Option<String>,
    #[serde(default)]
    execution_time: Option<i64>,
}

impl ScriptResponse {
    pub(crate) fn into_result(self, commit_mode: bool) -> GroovyScriptResult {
        GroovyScriptResult {
            output_text: self.output_text.unwrap_or_default(),
            execution_result: self.execution_result.map(value_to_text).unwrap_or_default(),
            stacktrace_text: self.stacktrace_text,
            commit_mode,
            execution_time_ms: self.execution_time,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct QueryResponse {
    #[serde(default)]
    headers: Option<Vec<Value>>,
    #[serde(default)]
    result_list: Option<Vec<Vec<Value>>>,
    #[serde(default)]
    result_count: Option<i64>,
    #[serde(default)]
    execution_time: Option<i64>,
    #[serde(default)]
    exception: Option<Value>,
}

impl From<QueryResponse> for FlexibleSearchResult {
    fn from(raw: QueryResponse) -> Self {
        Self {
            headers: raw.headers.unwrap_or_default().into_iter().map(value_to_text).collect(),
            rows: raw
                .result_list
                .unwrap_or_default()
                .into_iter()
                .map(|row| row.into_iter().map(value_to_text).collect())
                .collect(),
            result_count: raw.result_count.unwrap_or(0),
            execution_time_ms: raw.execution_time,
            exception: raw.exception.and_then(exception_text),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct UpdateDataResponse {
    #[serde(default)]
    is_initializing: bool,
    #[serde(default)]
    project_datas: Vec<ProjectDataResponse>,
}

#[derive(Debug, Deserialize)]
struct ProjectDataResponse {
    #[serde(default)]
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    parameter: Option<Vec<ParameterResponse>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ParameterResponse {
    #[serde(default)]
    name: String,
    #[serde(default)]
    label: Option<String>,
    #[serde(default)]
    values: Option<BTreeMap<String, bool>>,
    #[serde(default)]
    legacy: bool,
    #[serde(default)]
    multi_select: bool,
    #[serde(default)]
    default: Option<Value>,
}

impl From<UpdateDataResponse> for UpdateData {
    fn from(raw: UpdateDataResponse) -> Self {
        Self {
            is_initializing: raw.is_initializing,
            project_datas: raw
                .project_datas
                .into_iter()
                .map(|pd| ProjectData {
                    name: pd.name,
                    description: pd.description,
                    parameters: pd
                        .parameter
                        .unwrap_or_default()
                        .into_iter()
                        .map(|p| UpdateParameter {
                            label: p.label.unwrap_or_else(|| p.name.clone()),
                            name: p.name,
                            values: p.values.unwrap_or_default(),
                            legacy: p.legacy,
                            multi_select: p.multi_select,
                            default: p.default.filter(|v| !v.is_null()).map(value_to_text),
                        })
                        .collect(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ExecuteUpdateResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    log: Option<String>,
}

impl From<ExecuteUpdateResponse> for UpdateResult {
    fn from(raw: ExecuteUpdateResponse) -> Self {
        Self {
            success: raw.success,
            log_html: raw.log.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct UpdateLogResponse {
    #[serde(default)]
    log: Option<String>,
}

impl From<UpdateLogResponse> for UpdateLog {
    fn from(raw: UpdateLogResponse) -> Self {
        Self {
            log_html: raw.log.unwrap_or_default(),
        }
    }
}

/// Cell/scalar rendering: strings as-is, null as empty, everything else as JSON.
fn value_to_text(value: Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s,
        other => other.to_string(),
    }
}

fn exception_text(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::Object(ref map) => Some(
            map.get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| value.to_string()),
        ),
        other => Some(value_to_text(other)),
    }
}
