//! Browser-style client for the SAP Commerce Administration Console (HAC).

pub mod auth;
pub mod client;
pub mod cookies;
pub mod html;
pub mod models;
pub mod session;
pub mod update;

/// Console root: serves the login form when anonymous.
pub const ROOT_PATH: &str = "/hac/";
pub const LOGIN_CHECK_PATH: &str = "/hac/j_spring_security_check";
pub const SCRIPT_EXECUTE_PATH: &str = "/hac/console/scripting/execute";
pub const FLEXSEARCH_EXECUTE_PATH: &str = "/hac/console/flexsearch/execute";
pub const IMPEX_IMPORT_PATH: &str = "/hac/console/impex/import";
/// Must be visited before the update data endpoint; the server fills patch metadata there.
pub const UPDATE_PAGE_PATH: &str = "/hac/platform/update";
pub const UPDATE_DATA_PATH: &str = "/hac/platform/init/data/";
pub const PENDING_PATCHES_PATH: &str = "/hac/platform/init/pendingPatches";
pub const UPDATE_EXECUTE_PATH: &str = "/hac/platform/init/execute";
pub const UPDATE_LOG_PATH: &str = "/hac/initlog/log";

/// Class of the container holding Impex import output.
pub const IMPEX_RESULT_CLASS: &str = "impex-result";
