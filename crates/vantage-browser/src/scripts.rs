//! In-page scripts evaluated during capture.
//!
//! Every script is a single expression whose value (or resolved promise
//! value) is returned by value to Rust.

/// Return fixed and sticky elements to static positioning so they appear
/// once in a full-page screenshot, then scroll back to the top.
pub const NORMALIZE_LAYOUT: &str = r"(() => {
    document.querySelectorAll('*').forEach((el) => {
        const style = window.getComputedStyle(el);
        if (style.position === 'fixed' || style.position === 'sticky') {
            el.style.position = 'static';
        }
    });
    window.scrollTo(0, 0);
    return true;
})()";

/// Visible page text.
pub const PAGE_TEXT: &str = "document.body ? document.body.innerText : ''";

/// Number of resource entries loaded so far; stable across polls once the
/// network has gone quiet.
pub const RESOURCE_COUNT: &str = "performance.getEntriesByType('resource').length";

/// Descriptors of animated or transitioned elements, capped at 20.
pub const ANIMATION_HINTS: &str = r"(() => {
    return Array.from(document.querySelectorAll('*'))
        .filter((el) => {
            const style = window.getComputedStyle(el);
            const transition = style.getPropertyValue('transition-property');
            return style.getPropertyValue('animation-name') !== 'none'
                || (transition !== 'all' && transition !== '');
        })
        .map((el) => {
            const id = el.id ? `#${el.id}` : '';
            const classes = typeof el.className === 'string'
                ? el.className.split(' ').filter((c) => c).map((c) => `.${c}`).join('')
                : '';
            return `${el.tagName.toLowerCase()}${id}${classes}`;
        })
        .slice(0, 20);
})()";

/// Cheap DOM accessibility heuristics.
pub const ACCESSIBILITY_HEURISTICS: &str = r#"(() => {
    const unlabeledWithoutId = Array.from(document.querySelectorAll('input:not([id]), textarea:not([id])'))
        .filter((el) => !el.closest('label')).length;
    const unlabeledWithId = Array.from(document.querySelectorAll('input[id], textarea[id]'))
        .filter((el) => !document.querySelector(`label[for="${CSS.escape(el.id)}"]`)).length;
    return {
        imagesMissingAlt: document.querySelectorAll('img:not([alt])').length,
        inputsMissingLabels: unlabeledWithoutId + unlabeledWithId,
        hasSemanticElements: !!document.querySelector('main, nav, header, footer, article, section, aside'),
        hasAriaAttributes: !!document.querySelector('[role], [aria-label], [aria-labelledby], [aria-describedby]'),
    };
})()"#;

/// Whether the rule engine is already present on the page.
pub const AXE_PRESENT: &str = "typeof window.axe !== 'undefined'";

/// Scroll the page in fixed steps to trigger lazy-loaded content.
///
/// Resolves once the scrolled distance reaches the document height or
/// `max_scrolls` steps have run.
pub fn scroll_pass(step_px: u32, interval_ms: u64, max_scrolls: u32) -> String {
    format!(
        r"new Promise((resolve) => {{
    let total = 0;
    let scrolls = 0;
    const timer = setInterval(() => {{
        const height = document.body ? document.body.scrollHeight : 0;
        window.scrollBy(0, {step_px});
        total += {step_px};
        scrolls += 1;
        if (total >= height || scrolls >= {max_scrolls}) {{
            clearInterval(timer);
            resolve(scrolls);
        }}
    }}, {interval_ms});
}})"
    )
}

/// Run the rule engine with the given tags and partition the results.
///
/// Passes keep the first node's markup, incomplete results keep every
/// node's markup and failure summary, inapplicable rules keep id and help.
pub fn axe_run(tags: &[&str]) -> String {
    let tags = tags
        .iter()
        .map(|tag| format!("'{tag}'"))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        r"axe.run(document, {{ runOnly: {{ type: 'tag', values: [{tags}] }} }}).then((results) => ({{
    violations: results.violations || [],
    passes: (results.passes || []).map((p) => ({{
        id: p.id,
        help: p.help,
        html: (p.nodes && p.nodes.length > 0 && p.nodes[0].html) ? p.nodes[0].html : null,
    }})),
    incomplete: (results.incomplete || []).map((p) => ({{
        id: p.id,
        help: p.help,
        nodes: (p.nodes || []).map((n) => ({{ html: n.html, failureSummary: n.failureSummary }})),
    }})),
    inapplicable: (results.inapplicable || []).map((p) => ({{ id: p.id, help: p.help }})),
}}))"
    )
}
