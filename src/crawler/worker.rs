//! Worker pipeline: fetch one URL, hand its content to the policy
//!
//! A worker owns exactly one claimed record. Whatever happens, it ends
//! by recording a terminal status on that record; failures are reported
//! through the policy's error hook and never propagate out of the task.

use crate::crawler::extractor::LinkExtractor;
use crate::crawler::spider::SpiderShared;
use crate::frontier::{WorkRecord, WorkStatus};
use crate::policy::ErrorSeverity;
use std::sync::Arc;
use url::Url;

enum WorkerError {
    /// Network-level or HTTP-status failure; the site may simply be down
    Transient(String),
    /// The policy itself rejected the content
    Severe(String),
}

/// Processes one claimed record to a terminal status.
pub(crate) async fn process(shared: Arc<SpiderShared>, work: WorkRecord) {
    tracing::debug!("processing {}", work);
    match fetch_and_process(&shared, &work).await {
        Ok(final_url) => {
            mark(&shared, &work, WorkStatus::Success);
            if let Some(final_url) = final_url {
                // Record where the redirect landed so the target is not
                // crawled again under its own name.
                match shared
                    .frontier
                    .add(&final_url, Some(&work), WorkStatus::Success)
                {
                    Ok(true) => tracing::debug!("recorded redirect target {}", final_url),
                    Ok(false) => {}
                    Err(e) => shared.policy.url_error(
                        &work.url,
                        &format!("failed to record redirect target: {}", e),
                        ErrorSeverity::Info,
                    ),
                }
            }
        }
        Err(WorkerError::Transient(message)) => {
            shared
                .policy
                .url_error(&work.url, &message, ErrorSeverity::Info);
            mark(&shared, &work, WorkStatus::Error);
        }
        Err(WorkerError::Severe(message)) => {
            shared
                .policy
                .url_error(&work.url, &message, ErrorSeverity::Severe);
            mark(&shared, &work, WorkStatus::Error);
        }
    }
}

/// Fetches the record's URL and routes the body to the policy.
///
/// HTML bodies go through the link extractor hook; everything else is
/// delivered as raw bytes. Returns the final URL when the fetch was
/// redirected somewhere else.
async fn fetch_and_process(
    shared: &Arc<SpiderShared>,
    work: &WorkRecord,
) -> Result<Option<Url>, WorkerError> {
    let response = shared
        .client
        .get(work.url.clone())
        .send()
        .await
        .map_err(|e| WorkerError::Transient(format!("request failed: {}", e)))?
        .error_for_status()
        .map_err(|e| WorkerError::Transient(format!("bad response: {}", e)))?;

    let final_url = response.url().clone();
    let redirected = final_url != work.url;
    if redirected {
        tracing::debug!("{} redirected to {}", work.url, final_url);
    }

    if is_html(&response) {
        let body = response
            .text()
            .await
            .map_err(|e| WorkerError::Transient(format!("failed to read body: {}", e)))?;
        let mut page = LinkExtractor::new(shared, work, final_url.clone(), body);
        shared
            .policy
            .url_process_html(&final_url, &mut page)
            .map_err(|e| WorkerError::Severe(format!("html processing failed: {:#}", e)))?;
    } else {
        let body = response
            .bytes()
            .await
            .map_err(|e| WorkerError::Transient(format!("failed to read body: {}", e)))?;
        shared
            .policy
            .url_process_data(&work.url, &body)
            .map_err(|e| WorkerError::Severe(format!("data processing failed: {:#}", e)))?;
    }

    Ok(redirected.then_some(final_url))
}

fn is_html(response: &reqwest::Response) -> bool {
    response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_ascii_lowercase().starts_with("text/html"))
        .unwrap_or(false)
}

/// Records a terminal status. A failure here is reported but not fatal;
/// the record is simply left behind in its claimed state.
fn mark(shared: &Arc<SpiderShared>, work: &WorkRecord, status: WorkStatus) {
    if let Err(e) = shared.frontier.update_status(work.id, status) {
        shared.policy.url_error(
            &work.url,
            &format!("failed to record status {}: {}", status, e),
            ErrorSeverity::Warning,
        );
    }
}
