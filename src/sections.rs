//! Section discovery: the ordered elements that each become one PDF page.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::browser::RenderSession;
use crate::config::SectionSettings;
use crate::{HandbookError, Result};

/// `<container> <item>` descendant selector pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionSelectors {
    pub container: String,
    pub item: String,
}

impl Default for SectionSelectors {
    fn default() -> Self {
        SectionSettings::default().into()
    }
}

impl From<SectionSettings> for SectionSelectors {
    fn from(settings: SectionSettings) -> Self {
        Self::new(settings.container, settings.item)
    }
}

impl SectionSelectors {
    pub fn new(container: impl Into<String>, item: impl Into<String>) -> Self {
        Self {
            container: container.into(),
            item: item.into(),
        }
    }

    /// Combined CSS selector.
    pub fn css(&self) -> String {
        format!("{} {}", self.container.trim(), self.item.trim())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionHandle {
    /// Position in DOM order; the output page number minus one.
    pub index: usize,
    pub element_id: Option<String>,
    pub label: Option<String>,
}

/// Sections of one loaded document, in DOM order. Never empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SectionSet {
    selectors: SectionSelectors,
    sections: Vec<SectionHandle>,
}

impl SectionSet {
    pub fn selectors(&self) -> &SectionSelectors {
        &self.selectors
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&SectionHandle> {
        self.sections.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SectionHandle> {
        self.sections.iter()
    }
}

/// Enumerate the sections of the loaded page.
pub async fn locate(session: &mut RenderSession, selectors: &SectionSelectors) -> Result<SectionSet> {
    let mut probes = session.driver()?.query_sections(selectors).await?;
    probes.sort_by_key(|probe| probe.index);

    if probes.is_empty() {
        return Err(HandbookError::NoSectionsFound {
            selector: selectors.css(),
        });
    }

    let sections: Vec<SectionHandle> = probes
        .into_iter()
        .enumerate()
        .map(|(index, probe)| SectionHandle {
            index,
            element_id: probe.id,
            label: probe.label,
        })
        .collect();
    debug!(count = sections.len(), selector = %selectors.css(), "sections located");

    Ok(SectionSet {
        selectors: selectors.clone(),
        sections,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::{BrowserOptions, MemoryDocument, MemoryLauncher, SessionManager};
    use std::sync::Arc;
    use url::Url;

    async fn loaded(document: MemoryDocument) -> RenderSession {
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
        session
    }

    #[test]
    fn css_joins_container_and_item() {
        assert_eq!(
            SectionSelectors::default().css(),
            "#handbook-pages .type-handbook-page"
        );
        assert_eq!(SectionSelectors::new(" main ", " article").css(), "main article");
    }

    #[tokio::test]
    async fn locate_keeps_dom_order() {
        let mut session = loaded(MemoryDocument::with_sections(["Intro", "Leave", "Pay"])).await;

        let set = locate(&mut session, &SectionSelectors::default()).await.unwrap();
        let labels: Vec<_> = set.iter().filter_map(|s| s.label.clone()).collect();
        assert_eq!(labels, ["Intro", "Leave", "Pay"]);
        assert_eq!(set.get(2).map(|s| s.index), Some(2));
        session.release().await;
    }

    #[tokio::test]
    async fn empty_page_is_no_sections_found() {
        let mut session = loaded(MemoryDocument::with_sections(Vec::<String>::new())).await;

        let err = locate(&mut session, &SectionSelectors::default())
            .await
            .unwrap_err();
        assert!(matches!(err, HandbookError::NoSectionsFound { .. }));
        session.release().await;
    }
}
