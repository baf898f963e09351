//! System update workflow: update data, pending patches, execution and log polling.

use std::collections::BTreeMap;

use chrono::Utc;

use super::auth::{self, BodyKind};
use super::client::{HacClient, decode};
use super::models::{
    ExecuteUpdateResponse, PendingPatches, UpdateData, UpdateDataResponse, UpdateLog, UpdateLogResponse,
    UpdateRequest, UpdateResult, required_patch_hashes,
};
use super::{PENDING_PATCHES_PATH, UPDATE_DATA_PATH, UPDATE_EXECUTE_PATH, UPDATE_LOG_PATH, UPDATE_PAGE_PATH};
use crate::error::HacResult;

impl HacClient {
    /// Extensions and their update parameters.
    ///
    /// The update page is loaded first: the console only fills in patch metadata for
    /// the data endpoint once the page has been rendered in the session.
    pub async fn get_update_data(&self) -> HacResult<UpdateData> {
        const OP: &str = "Failed to fetch update data";
        let session = self.session.ensure_session().await?;

        let page = self
            .get(UPDATE_PAGE_PATH)
            .headers(auth::session_headers(&session, BodyKind::None, false));
        let page = self.send(OP, &session, page).await?;
        if !page.status.is_success() {
            tracing::debug!(status = %page.status, "Update page did not load cleanly");
        }

        // The page load may have rotated the token.
        let session = self.session.ensure_session().await?;
        let headers = auth::with_referer(
            auth::session_headers(&session, BodyKind::None, true),
            &self.url(UPDATE_PAGE_PATH),
        );
        let request = self.get(UPDATE_DATA_PATH).headers(headers);
        let response = self.send_ok(OP, &session, request).await?;
        let raw: UpdateDataResponse = decode(OP, &response)?;

        let data = UpdateData::from(raw);
        tracing::debug!(
            extensions = data.project_datas.len(),
            initializing = data.is_initializing,
            "Update data loaded"
        );
        self.session.touch().await;
        Ok(data)
    }

    /// Pending patches by category.
    pub async fn get_pending_patches(&self) -> HacResult<PendingPatches> {
        const OP: &str = "Failed to fetch pending patches";
        let session = self.session.ensure_session().await?;

        let request = self
            .get(PENDING_PATCHES_PATH)
            .headers(auth::session_headers(&session, BodyKind::None, true));
        let response = self.send_ok(OP, &session, request).await?;
        let patches: PendingPatches = decode(OP, &response)?;

        self.session.touch().await;
        Ok(patches)
    }

    /// Run a system update.
    ///
    /// Unless disabled on the request, the required pending patches are fetched and
    /// included. A rejected session aborts the update; any other failure to fetch them
    /// is logged and the update goes ahead without.
    pub async fn execute_update(&self, request: &UpdateRequest) -> HacResult<UpdateResult> {
        const OP: &str = "Failed to execute update";
        self.session.ensure_session().await?;

        let pending = if request.include_pending_patches {
            match self.get_pending_patches().await {
                Ok(patches) => required_patch_hashes(&patches),
                Err(e) if e.is_authentication() => return Err(e),
                Err(e) => {
                    tracing::warn!(error = %e, "Could not fetch pending patches, continuing without them");
                    BTreeMap::new()
                }
            }
        } else {
            BTreeMap::new()
        };

        let payload = request.payload(&pending);
        let session = self.session.ensure_session().await?;
        tracing::info!(
            patches = request.patches.len(),
            required_patches = pending.values().map(Vec::len).sum::<usize>(),
            drop_tables = request.drop_tables,
            "Executing system update"
        );
        let http_request = self
            .post(UPDATE_EXECUTE_PATH)
            .headers(auth::session_headers(&session, BodyKind::Json, true))
            .json(&payload);
        let response = self.send_ok(OP, &session, http_request).await?;
        let raw: ExecuteUpdateResponse = decode(OP, &response)?;

        let result = UpdateResult::from(raw);
        if !result.success {
            tracing::warn!("System update reported failure");
        }
        self.session.touch().await;
        Ok(result)
    }

    /// Current update log snapshot. Poll until [`UpdateLog::is_complete`].
    pub async fn get_update_log(&self) -> HacResult<UpdateLog> {
        const OP: &str = "Failed to fetch update log";
        let session = self.session.ensure_session().await?;

        let request = self
            .get(UPDATE_LOG_PATH)
            .query(&[("_", Utc::now().timestamp_millis())])
            .headers(auth::session_headers(&session, BodyKind::None, true));
        let response = self.send_ok(OP, &session, request).await?;
        let raw: UpdateLogResponse = decode(OP, &response)?;

        self.session.touch().await;
        Ok(raw.into())
    }
}
