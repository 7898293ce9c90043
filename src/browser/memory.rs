//! In-memory engine: a scripted handbook document that prints real PDFs.
//!
//! Used by the test suites and by anyone embedding the pipeline without a
//! local Chrome. Each launch counts toward [`MemoryLauncher::launches`], each
//! close toward [`MemoryLauncher::closes`].

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, Stream};
use url::Url;

use crate::capture::PageFragment;
use crate::merge::merge;
use crate::sections::SectionSelectors;
use crate::viewport::POINTS_PER_INCH;
use crate::{HandbookError, Result};

use super::driver::{
    AssetProbe, BrowserLauncher, ConsoleEntry, NavigationOutcome, NetworkEntry, PageDriver,
    PrintOptions, SectionProbe, VisibilityReport,
};
use super::session::BrowserOptions;

/// Behaviour of the fake handbook page.
#[derive(Debug, Clone)]
pub struct MemoryDocument {
    sections: Vec<String>,
    status: u16,
    hang_navigation: bool,
    assets_ready_after: u32,
    assets_never_ready: bool,
    in_flight_polls: u32,
    fail_capture_at: Option<usize>,
    hang_capture_at: Option<usize>,
    overflow_at: Option<usize>,
    broken_isolation: bool,
}

impl Default for MemoryDocument {
    fn default() -> Self {
        Self::with_sections(["Handbook"])
    }
}

impl MemoryDocument {
    /// A page whose sections carry these headings, in order.
    pub fn with_sections<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            sections: labels.into_iter().map(Into::into).collect(),
            status: 200,
            hang_navigation: false,
            assets_ready_after: 0,
            assets_never_ready: false,
            in_flight_polls: 0,
            fail_capture_at: None,
            hang_capture_at: None,
            overflow_at: None,
            broken_isolation: false,
        }
    }

    pub fn status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    /// Navigation never completes.
    pub fn hang_navigation(mut self) -> Self {
        self.hang_navigation = true;
        self
    }

    /// Asset probes report pending work this many times before completing.
    pub fn assets_ready_after(mut self, probes: u32) -> Self {
        self.assets_ready_after = probes;
        self
    }

    pub fn assets_never_ready(mut self) -> Self {
        self.assets_never_ready = true;
        self
    }

    /// Network reports in-flight requests for this many polls.
    pub fn in_flight_for(mut self, polls: u32) -> Self {
        self.in_flight_polls = polls;
        self
    }

    pub fn fail_capture_at(mut self, index: usize) -> Self {
        self.fail_capture_at = Some(index);
        self
    }

    /// Printing this section never returns.
    pub fn hang_capture_at(mut self, index: usize) -> Self {
        self.hang_capture_at = Some(index);
        self
    }

    /// This section spills onto a second printed page.
    pub fn overflow_at(mut self, index: usize) -> Self {
        self.overflow_at = Some(index);
        self
    }

    /// Hiding has no effect: every section stays visible.
    pub fn broken_isolation(mut self) -> Self {
        self.broken_isolation = true;
        self
    }

    pub fn section_count(&self) -> usize {
        self.sections.len()
    }
}

#[derive(Debug, Default)]
struct Counters {
    launches: AtomicUsize,
    closes: AtomicUsize,
    live: AtomicUsize,
    peak: AtomicUsize,
}

#[derive(Debug, Clone)]
enum LaunchBehaviour {
    Succeed,
    Fail(String),
    Hang,
}

#[derive(Debug, Clone)]
pub struct MemoryLauncher {
    document: MemoryDocument,
    behaviour: LaunchBehaviour,
    launch_delay: Option<Duration>,
    counters: Arc<Counters>,
}

impl Default for MemoryLauncher {
    fn default() -> Self {
        Self::new(MemoryDocument::default())
    }
}

impl MemoryLauncher {
    pub fn new(document: MemoryDocument) -> Self {
        Self {
            document,
            behaviour: LaunchBehaviour::Succeed,
            launch_delay: None,
            counters: Arc::new(Counters::default()),
        }
    }

    /// Every launch fails with `message`.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            behaviour: LaunchBehaviour::Fail(message.into()),
            ..Self::default()
        }
    }

    /// Every launch blocks forever.
    pub fn hanging() -> Self {
        Self {
            behaviour: LaunchBehaviour::Hang,
            ..Self::default()
        }
    }

    pub fn with_launch_delay(mut self, delay: Duration) -> Self {
        self.launch_delay = Some(delay);
        self
    }

    pub fn launches(&self) -> usize {
        self.counters.launches.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.counters.closes.load(Ordering::SeqCst)
    }

    /// Highest number of engines open at the same time.
    pub fn peak_concurrency(&self) -> usize {
        self.counters.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BrowserLauncher for MemoryLauncher {
    async fn launch(&self, _options: &BrowserOptions) -> Result<Box<dyn PageDriver>> {
        if let Some(delay) = self.launch_delay {
            tokio::time::sleep(delay).await;
        }
        match &self.behaviour {
            LaunchBehaviour::Succeed => {}
            LaunchBehaviour::Fail(message) => return Err(HandbookError::launch(message.clone())),
            LaunchBehaviour::Hang => futures::future::pending::<()>().await,
        }

        self.counters.launches.fetch_add(1, Ordering::SeqCst);
        let live = self.counters.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters.peak.fetch_max(live, Ordering::SeqCst);

        Ok(Box::new(MemoryDriver {
            document: self.document.clone(),
            counters: self.counters.clone(),
            navigated: None,
            visible: None,
            probes: 0,
            in_flight_polls: self.document.in_flight_polls,
            console: Vec::new(),
            network: Vec::new(),
            closed: false,
        }))
    }
}

struct MemoryDriver {
    document: MemoryDocument,
    counters: Arc<Counters>,
    navigated: Option<Url>,
    visible: Option<usize>,
    probes: u32,
    in_flight_polls: u32,
    console: Vec<ConsoleEntry>,
    network: Vec<NetworkEntry>,
    closed: bool,
}

impl MemoryDriver {
    fn sections(&self) -> &[String] {
        if self.navigated.is_some() {
            &self.document.sections
        } else {
            &[]
        }
    }
}

#[async_trait]
impl PageDriver for MemoryDriver {
    async fn goto(&mut self, url: &Url) -> Result<NavigationOutcome> {
        self.network.push(NetworkEntry {
            request_id: format!("req-{}", self.network.len() + 1),
            method: "GET".to_string(),
            url: url.to_string(),
            resource_type: Some("Document".to_string()),
            status: (!self.document.hang_navigation).then_some(self.document.status),
            error: None,
        });
        if self.document.hang_navigation {
            futures::future::pending::<()>().await;
        }

        self.navigated = Some(url.clone());
        self.console.push(ConsoleEntry {
            level: "log".to_string(),
            text: format!("handbook loaded with {} sections", self.document.sections.len()),
        });
        Ok(NavigationOutcome {
            status: Some(self.document.status),
            final_url: Some(url.to_string()),
        })
    }

    fn in_flight_requests(&mut self) -> usize {
        if self.in_flight_polls > 0 {
            self.in_flight_polls -= 1;
            1
        } else {
            0
        }
    }

    async fn probe_assets(&mut self) -> Result<AssetProbe> {
        self.probes += 1;
        let done = !self.document.assets_never_ready && self.probes > self.document.assets_ready_after;
        Ok(AssetProbe {
            ready_state: "complete".to_string(),
            fonts_loaded: done,
            images_pending: if done { 0 } else { 1 },
            stylesheets_pending: 0,
        })
    }

    async fn query_sections(&mut self, _selectors: &SectionSelectors) -> Result<Vec<SectionProbe>> {
        Ok(self
            .sections()
            .iter()
            .enumerate()
            .map(|(index, label)| SectionProbe {
                index,
                tag: "section".to_string(),
                id: Some(format!("section-{}", index + 1)),
                label: Some(label.clone()),
            })
            .collect())
    }

    async fn show_only_section(
        &mut self,
        _selectors: &SectionSelectors,
        index: usize,
    ) -> Result<VisibilityReport> {
        let total = self.sections().len();
        let visible = if self.document.broken_isolation {
            (0..total).collect()
        } else if index < total {
            vec![index]
        } else {
            Vec::new()
        };
        self.visible = (index < total).then_some(index);
        Ok(VisibilityReport { total, visible })
    }

    async fn print_pdf(&mut self, options: &PrintOptions) -> Result<Vec<u8>> {
        if self.visible.is_some() && self.visible == self.document.hang_capture_at {
            futures::future::pending::<()>().await;
        }
        if self.visible.is_some() && self.visible == self.document.fail_capture_at {
            return Err(HandbookError::capture("printToPDF failed: target crashed"));
        }
        let text = match self.visible {
            Some(index) => self.document.sections[index].clone(),
            None => self.document.sections.join(" / "),
        };
        let (width, height) = (
            options.paper_width_in * POINTS_PER_INCH,
            options.paper_height_in * POINTS_PER_INCH,
        );
        if self.visible.is_some() && self.visible == self.document.overflow_at {
            let pages = [
                PageFragment {
                    index: 0,
                    bytes: render_text_page(&text, width, height)?,
                },
                PageFragment {
                    index: 1,
                    bytes: render_text_page(&format!("{text} (continued)"), width, height)?,
                },
            ];
            return Ok(merge(&pages)?.bytes);
        }
        render_text_page(&text, width, height)
    }

    async fn screenshot(&mut self) -> Result<Vec<u8>> {
        let mut png = b"\x89PNG\r\n\x1a\n".to_vec();
        png.extend_from_slice(self.visible.unwrap_or_default().to_string().as_bytes());
        Ok(png)
    }

    async fn html(&mut self) -> Result<String> {
        let body: String = self
            .sections()
            .iter()
            .enumerate()
            .map(|(index, label)| {
                let hidden = match self.visible {
                    Some(visible) if visible != index => " handbook-pdf-hidden",
                    _ => "",
                };
                format!(
                    "<section id=\"section-{}\" class=\"type-handbook-page{hidden}\"><h2>{label}</h2></section>",
                    index + 1
                )
            })
            .collect();
        Ok(format!(
            "<html><body><div id=\"handbook-pages\">{body}</div></body></html>"
        ))
    }

    fn take_console(&mut self) -> Vec<ConsoleEntry> {
        std::mem::take(&mut self.console)
    }

    fn take_network(&mut self) -> Vec<NetworkEntry> {
        std::mem::take(&mut self.network)
    }

    async fn close(&mut self) -> Result<()> {
        if !self.closed {
            self.closed = true;
            self.counters.closes.fetch_add(1, Ordering::SeqCst);
            self.counters.live.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

impl Drop for MemoryDriver {
    fn drop(&mut self) {
        if !self.closed {
            self.counters.live.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

/// A one-page PDF of `width_pt` x `height_pt` showing `text` in Helvetica.
pub fn render_text_page(text: &str, width_pt: f64, height_pt: f64) -> Result<Vec<u8>> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let font_id = doc.add_object(Dictionary::from_iter([
        ("Type", Object::Name(b"Font".to_vec())),
        ("Subtype", Object::Name(b"Type1".to_vec())),
        ("BaseFont", Object::Name(b"Helvetica".to_vec())),
    ]));
    let resources_id = doc.add_object(Dictionary::from_iter([(
        "Font",
        Object::Dictionary(Dictionary::from_iter([("F1", Object::Reference(font_id))])),
    )]));

    let content = Content {
        operations: vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 24.into()]),
            Operation::new("Td", vec![48.into(), Object::Real((height_pt - 72.0) as f32)]),
            Operation::new("Tj", vec![Object::string_literal(text)]),
            Operation::new("ET", vec![]),
        ],
    };
    let encoded = content
        .encode()
        .map_err(|err| HandbookError::capture(format!("could not encode page content: {err}")))?;
    let content_id = doc.add_object(Stream::new(Dictionary::new(), encoded));

    let page_id = doc.add_object(Dictionary::from_iter([
        ("Type", Object::Name(b"Page".to_vec())),
        ("Parent", Object::Reference(pages_id)),
        ("Contents", Object::Reference(content_id)),
        ("Resources", Object::Reference(resources_id)),
        (
            "MediaBox",
            Object::Array(vec![
                0.into(),
                0.into(),
                Object::Real(width_pt as f32),
                Object::Real(height_pt as f32),
            ]),
        ),
    ]));
    doc.objects.insert(
        pages_id,
        Object::Dictionary(Dictionary::from_iter([
            ("Type", Object::Name(b"Pages".to_vec())),
            ("Kids", Object::Array(vec![Object::Reference(page_id)])),
            ("Count", Object::Integer(1)),
        ])),
    );
    let catalog_id = doc.add_object(Dictionary::from_iter([
        ("Type", Object::Name(b"Catalog".to_vec())),
        ("Pages", Object::Reference(pages_id)),
    ]));
    doc.trailer.set("Root", Object::Reference(catalog_id));

    let mut output = Vec::new();
    doc.save_to(&mut output)
        .map_err(|err| HandbookError::capture(format!("could not serialize page: {err}")))?;
    Ok(output)
}
