//! Per-target work: render, score, route. Strictly sequential within one
//! target.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, instrument, warn};

use crate::domain::{AuditResult, ScanError, ViolationRecord};
use crate::remediation::RemediationRouter;
use crate::renderer::{PageRenderer, RenderError};
use crate::scoring;

pub struct TargetPipeline {
    renderer: Arc<dyn PageRenderer>,
    router: Arc<RemediationRouter>,
    render_timeout: Duration,
}

impl TargetPipeline {
    pub fn new(
        renderer: Arc<dyn PageRenderer>,
        router: Arc<RemediationRouter>,
        render_timeout: Duration,
    ) -> Self {
        Self {
            renderer,
            router,
            render_timeout,
        }
    }

    /// Audit one URL. Render failures are captured in `scan_error`, never
    /// returned as errors.
    #[instrument(skip(self))]
    pub async fn audit(&self, url: &str) -> AuditResult {
        let started = Instant::now();
        let elapsed = || started.elapsed().as_millis() as u64;

        let rendered = tokio::time::timeout(self.render_timeout, self.renderer.render(url)).await;
        let page = match rendered {
            Ok(Ok(page)) => page,
            Ok(Err(RenderError::Timeout)) | Err(_) => {
                return AuditResult::failed(url, ScanError::RenderTimeout, elapsed());
            }
            Ok(Err(RenderError::Failed(reason))) => {
                return AuditResult::failed(url, ScanError::RenderError(reason), elapsed());
            }
        };
        debug!(findings = page.raw_findings.len(), "page rendered");

        let mut violations = Vec::with_capacity(page.raw_findings.len());
        for (index, finding) in page.raw_findings.iter().enumerate() {
            if let Err(e) = scoring::validate(finding) {
                warn!(index, error = %e, "finding scored at lowest confidence");
            }
            let score = scoring::score(finding);
            let mut record = ViolationRecord::from_finding(url, index, finding, score);
            record.remediation = Some(self.router.route(&record).await);
            violations.push(record);
        }

        AuditResult::scanned(url, violations, elapsed())
    }
}
