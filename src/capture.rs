use std::time::Duration;

use tokio::time::timeout;
use tracing::debug;

use crate::browser::{PrintOptions, RenderSession};
use crate::visibility::IsolatedSection;
use crate::{HandbookError, Result, Viewport};

/// One printed section. Never written to disk on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageFragment {
    pub index: usize,
    pub bytes: Vec<u8>,
}

/// Prints the isolated section to a single fixed-size PDF page.
#[derive(Debug, Clone)]
pub struct CaptureEngine {
    page: Viewport,
    timeout: Duration,
}

impl CaptureEngine {
    pub fn new(page: Viewport, timeout: Duration) -> Self {
        Self { page, timeout }
    }

    /// Paper equals the viewport (CSS px / 96 = inches), no margins, backgrounds on, page 1 only.
    pub fn print_options(&self) -> PrintOptions {
        PrintOptions {
            paper_width_in: self.page.width_inches(),
            paper_height_in: self.page.height_inches(),
            print_background: true,
            margin_in: 0.0,
            page_ranges: "1".to_string(),
        }
    }

    pub async fn capture(
        &self,
        session: &mut RenderSession,
        isolated: IsolatedSection,
    ) -> Result<PageFragment> {
        let options = self.print_options();
        let print = session.driver()?.print_pdf(&options);
        let bytes = match timeout(self.timeout, print).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(HandbookError::timeout(format!(
                    "printing section {} took longer than {:?}",
                    isolated.index(),
                    self.timeout
                )))
            }
        };

        if !bytes.starts_with(b"%PDF-") {
            return Err(HandbookError::capture(format!(
                "section {} printed {} bytes that are not a PDF",
                isolated.index(),
                bytes.len()
            )));
        }
        debug!(section = isolated.index(), bytes = bytes.len(), "section captured");

        Ok(PageFragment {
            index: isolated.index(),
            bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::{BrowserOptions, MemoryDocument, MemoryLauncher, SessionManager};
    use crate::sections::{locate, SectionSelectors};
    use crate::visibility::VisibilityController;
    use std::sync::Arc;
    use url::Url;

    async fn isolate_first(document: MemoryDocument) -> (RenderSession, IsolatedSection) {
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
        let token = VisibilityController::new(Duration::ZERO)
            .isolate(&mut session, &set, 0)
            .await
            .unwrap();
        (session, token)
    }

    #[test]
    fn print_options_use_viewport_inches() {
        let engine = CaptureEngine::new(Viewport::default(), Duration::from_secs(1));
        let options = engine.print_options();
        assert!((options.paper_width_in - 794.0 / 96.0).abs() < 1e-9);
        assert!((options.paper_height_in - 1123.0 / 96.0).abs() < 1e-9);
        assert!(options.print_background);
        assert_eq!(options.margin_in, 0.0);
        assert_eq!(options.page_ranges, "1");
    }

    #[tokio::test]
    async fn capture_returns_a_pdf_fragment() {
        let (mut session, token) = isolate_first(MemoryDocument::with_sections(["Welcome"])).await;
        let engine = CaptureEngine::new(Viewport::default(), Duration::from_secs(5));

        let fragment = engine.capture(&mut session, token).await.unwrap();
        assert_eq!(fragment.index, 0);
        assert!(fragment.bytes.starts_with(b"%PDF-"));
        session.release().await;
    }

    #[tokio::test]
    async fn engine_fault_is_a_capture_error() {
        let (mut session, token) =
            isolate_first(MemoryDocument::with_sections(["Welcome"]).fail_capture_at(0)).await;
        let engine = CaptureEngine::new(Viewport::default(), Duration::from_secs(5));

        let err = engine.capture(&mut session, token).await.unwrap_err();
        assert!(matches!(err, HandbookError::Capture(_)), "{err}");
        session.release().await;
    }

    #[tokio::test]
    async fn hung_print_times_out() {
        let (mut session, token) =
            isolate_first(MemoryDocument::with_sections(["Welcome"]).hang_capture_at(0)).await;
        let engine = CaptureEngine::new(Viewport::default(), Duration::from_millis(50));

        let err = engine.capture(&mut session, token).await.unwrap_err();
        assert!(matches!(err, HandbookError::Timeout(_)), "{err}");
        session.release().await;
    }
}
