//! Session annotations for the BrowserStack device cloud.
//!
//! The provider reads executor commands smuggled through the script endpoint
//! as `browserstack_executor: {json}`. Both helpers go through
//! [`SessionTransport::execute_script`](crate::transport::SessionTransport::execute_script).

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::error::Result;
use crate::session::SessionHandle;

const EXECUTOR_PREFIX: &str = "browserstack_executor: ";

/// Final verdict reported to the provider dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Passed,
    Failed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Passed => "passed",
            SessionStatus::Failed => "failed",
        }
    }
}

/// The script text for one executor command.
pub fn executor_script(action: &str, arguments: Value) -> String {
    let command = json!({ "action": action, "arguments": arguments });
    format!("{EXECUTOR_PREFIX}{command}")
}

async fn execute(session: &SessionHandle, action: &str, arguments: Value) -> Result<()> {
    let script = executor_script(action, arguments);
    debug!(session_id = %session.id(), action, "sending executor command");
    session
        .transport()
        .execute_script(&script, Value::Array(Vec::new()))
        .await?;
    Ok(())
}

pub async fn set_session_name(session: &SessionHandle, name: &str) -> Result<()> {
    execute(session, "setSessionName", json!({ "name": name })).await?;
    info!(session_id = %session.id(), name, "session name set");
    Ok(())
}

/// Mark the remote session passed or failed. `reason` shows on the dashboard.
pub async fn set_session_status(
    session: &SessionHandle,
    status: SessionStatus,
    reason: &str,
) -> Result<()> {
    execute(
        session,
        "setSessionStatus",
        json!({ "status": status.as_str(), "reason": reason }),
    )
    .await?;
    info!(session_id = %session.id(), status = status.as_str(), "session status set");
    Ok(())
}
