use std::time::Duration;

use tokio::time::sleep;
use tracing::debug;

use crate::browser::RenderSession;
use crate::sections::SectionSet;
use crate::{HandbookError, Result};

/// Proof that exactly one section is render-visible.
///
/// Only [`VisibilityController::isolate`] creates it; the capture engine consumes it.
#[derive(Debug, PartialEq, Eq)]
pub struct IsolatedSection {
    index: usize,
    total: usize,
}

impl IsolatedSection {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn total(&self) -> usize {
        self.total
    }
}

#[derive(Debug, Clone)]
pub struct VisibilityController {
    settle_delay: Duration,
}

impl VisibilityController {
    pub fn new(settle_delay: Duration) -> Self {
        Self { settle_delay }
    }

    /// Show section `index`, hide the rest, then let layout settle.
    pub async fn isolate(
        &self,
        session: &mut RenderSession,
        sections: &SectionSet,
        index: usize,
    ) -> Result<IsolatedSection> {
        if index >= sections.len() {
            return Err(HandbookError::capture(format!(
                "section {index} is out of range ({} sections)",
                sections.len()
            )));
        }

        let report = session
            .driver()?
            .show_only_section(sections.selectors(), index)
            .await?;

        if report.total != sections.len() {
            return Err(HandbookError::capture(format!(
                "section count changed from {} to {} while capturing",
                sections.len(),
                report.total
            )));
        }
        if report.visible != [index] {
            return Err(HandbookError::capture(format!(
                "expected only section {index} visible, page reports {:?}",
                report.visible
            )));
        }

        if !self.settle_delay.is_zero() {
            sleep(self.settle_delay).await;
        }
        debug!(section = index, "section isolated");

        Ok(IsolatedSection {
            index,
            total: report.total,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::{BrowserOptions, MemoryDocument, MemoryLauncher, SessionManager};
    use crate::sections::{locate, SectionSelectors};
    use std::sync::Arc;
    use url::Url;

    async fn located(document: MemoryDocument) -> (RenderSession, SectionSet) {
        let sessions = SessionManager::new(
            BrowserOptions::default(),
            Arc::new(MemoryLauncher::new(document)),
        );
        let mut session = sessions.acquire().await.unwrap();
        session
            .driver()
            .unwrap()
            .goto(&Url::parse("http://handbook.test/?print=true").unwrap())
            .await
            .unwrap();
        let set = locate(&mut session, &SectionSelectors::default())
            .await
            .unwrap();
        (session, set)
    }

    #[tokio::test]
    async fn isolate_hides_every_other_section() {
        let (mut session, set) = located(MemoryDocument::with_sections(["A", "B", "C"])).await;
        let controller = VisibilityController::new(Duration::ZERO);

        let token = controller.isolate(&mut session, &set, 1).await.unwrap();
        assert_eq!(token.index(), 1);
        assert_eq!(token.total(), 3);

        let html = session.driver().unwrap().html().await.unwrap();
        assert_eq!(html.matches("handbook-pdf-hidden").count(), 2);
        session.release().await;
    }

    #[tokio::test]
    async fn isolation_that_does_not_take_effect_is_a_capture_error() {
        let (mut session, set) =
            located(MemoryDocument::with_sections(["A", "B"]).broken_isolation()).await;
        let controller = VisibilityController::new(Duration::ZERO);

        let err = controller.isolate(&mut session, &set, 0).await.unwrap_err();
        assert!(matches!(err, HandbookError::Capture(_)), "{err}");
        session.release().await;
    }

    #[tokio::test]
    async fn out_of_range_index_is_rejected() {
        let (mut session, set) = located(MemoryDocument::with_sections(["A"])).await;
        let controller = VisibilityController::new(Duration::ZERO);

        assert!(controller.isolate(&mut session, &set, 5).await.is_err());
        session.release().await;
    }
}
