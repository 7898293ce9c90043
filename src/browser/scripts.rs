//! In-page scripts evaluated through the engine.
//!
//! Every script is a single expression returning a JSON-serializable value
//! (or a promise of one). Selectors are embedded as JSON string literals.

use crate::sections::SectionSelectors;

/// Class toggled on sections that must not be printed.
pub const HIDDEN_CLASS: &str = "handbook-pdf-hidden";

/// Id of the `<style>` element carrying the hidden-class rule.
pub const STYLE_ELEMENT_ID: &str = "handbook-pdf-style";

/// Marks a section whose inline `display` was forced on, so the next isolation can undo it.
pub const FORCED_ATTRIBUTE: &str = "data-handbook-pdf-forced";

/// Reports document, font, image and stylesheet loading state.
///
/// Lazy images are switched to eager loading so they count toward `imagesPending`
/// instead of never starting.
pub const ASSET_PROBE: &str = r#"
(() => {
  const images = Array.from(document.images || []);
  for (const img of images) {
    if (img.loading === 'lazy') {
      img.loading = 'eager';
    }
  }
  const imagesPending = images.filter((img) => !img.complete).length;
  const links = Array.from(document.querySelectorAll('link[rel~="stylesheet"]'));
  const stylesheetsPending = links.filter((link) => {
    if (link.disabled) {
      return false;
    }
    try {
      return !link.sheet;
    } catch (_err) {
      return false;
    }
  }).length;
  const fontsLoaded = !document.fonts || document.fonts.status === 'loaded';
  return {
    readyState: document.readyState,
    fontsLoaded,
    imagesPending,
    stylesheetsPending
  };
})()
"#;

fn literal(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}

/// Lists sections in DOM order with an optional heading label.
pub fn query_sections(selectors: &SectionSelectors) -> String {
    format!(
        r#"
(() => {{
  const nodes = Array.from(document.querySelectorAll({css}));
  return nodes.map((node, index) => {{
    const heading = node.querySelector('h1, h2, h3, h4, h5, h6');
    const label = heading && heading.textContent ? heading.textContent.trim() : '';
    return {{
      index,
      tag: node.tagName.toLowerCase(),
      id: node.id || null,
      label: label || null
    }};
  }});
}})()
"#,
        css = literal(&selectors.css())
    )
}

/// Hides every section except `index`, then reports which sections actually render.
///
/// Only the target is forced to `display: block`, and only when the site's own stylesheet
/// still hides it (inactive pages collapsed by a tab or carousel widget). A site that hides
/// the target by other means (`visibility`, zero size, an ancestor) is not overridden and
/// fails isolation as a capture error.
pub fn show_only_section(selectors: &SectionSelectors, index: usize) -> String {
    format!(
        r#"
(() => {{
  const hidden = {hidden};
  if (!document.getElementById({style_id})) {{
    const style = document.createElement('style');
    style.id = {style_id};
    style.textContent = '.' + hidden + ' {{ display: none !important; }}';
    (document.head || document.documentElement).appendChild(style);
  }}
  const nodes = Array.from(document.querySelectorAll({css}));
  const forced = {forced};
  nodes.forEach((node, i) => {{
    if (node.hasAttribute(forced)) {{
      node.style.removeProperty('display');
      node.removeAttribute(forced);
    }}
    node.classList.toggle(hidden, i !== {index});
  }});
  const target = nodes[{index}];
  if (target && window.getComputedStyle(target).display === 'none') {{
    target.style.setProperty('display', 'block', 'important');
    target.setAttribute(forced, '');
  }}
  const visible = [];
  nodes.forEach((node, i) => {{
    if (window.getComputedStyle(node).display !== 'none') {{
      visible.push(i);
    }}
  }});
  return {{ total: nodes.length, visible }};
}})()
"#,
        hidden = literal(HIDDEN_CLASS),
        style_id = literal(STYLE_ELEMENT_ID),
        forced = literal(FORCED_ATTRIBUTE),
        css = literal(&selectors.css()),
        index = index
    )
}
