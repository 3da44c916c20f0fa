//! Page-side lookup scripts for the filter engine.
//!
//! Each template is a named function with declared inputs, rendered to a
//! self-contained IIFE. Inputs are embedded as JSON literals, never by raw
//! string concatenation, so option values containing quotes or CJK text
//! round-trip intact.
//!
//! Rect-returning templates yield `{x, y, width, height}` or `null`; the
//! fallback template yields `{ok, reason?}`.

use serde_json::Value;

use super::engine::UiConfig;

// ============================================================================
// Candidate Bounds
// ============================================================================

/// Minimum panel width; narrower vocabulary matches are stray labels.
pub const PANEL_MIN_WIDTH: f64 = 60.0;

/// Minimum panel height.
pub const PANEL_MIN_HEIGHT: f64 = 30.0;

/// Plausible option control width range.
pub const OPTION_WIDTH_RANGE: (f64, f64) = (12.0, 260.0);

/// Plausible option control height range.
pub const OPTION_HEIGHT_RANGE: (f64, f64) = (10.0, 96.0);

/// Interactive-looking descendants scanned for option text.
const OPTION_CANDIDATE_SELECTOR: &str = "button, [role='button'], div, span, li, a";

/// Embeds a string as a JS literal.
fn js_str(value: &str) -> String {
    Value::String(value.to_string()).to_string()
}

/// Embeds a string list as a JS array literal.
fn js_str_array(values: &[String]) -> String {
    Value::from(values.to_vec()).to_string()
}

// ============================================================================
// Templates
// ============================================================================

/// Rect of the visible filter trigger, or `null`.
#[must_use]
pub fn trigger_rect(config: &UiConfig) -> String {
    let trigger = js_str(&config.trigger_selector);
    format!(
        r#"(() => {{
    const btn = document.querySelector({trigger});
    if (!(btn instanceof HTMLElement) || btn.offsetParent === null) {{
        return null;
    }}
    const r = btn.getBoundingClientRect();
    return {{ x: r.x, y: r.y, width: r.width, height: r.height }};
}})()"#
    )
}

/// Rect of the visible filter panel, or `null`.
///
/// A candidate counts as the panel only when its text contains at least
/// one known option value and its box clears the minimum panel size.
#[must_use]
pub fn panel_rect(config: &UiConfig) -> String {
    let trigger = js_str(&config.trigger_selector);
    let panels = js_str(&config.panel_selectors.join(","));
    let vocabulary = js_str_array(&config.vocabulary);
    format!(
        r#"(() => {{
    const optionValues = {vocabulary};
    const normalize = (text) => (text || "").replace(/\s+/g, " ").trim();
    const root = document.querySelector({trigger});
    if (!(root instanceof HTMLElement) || root.offsetParent === null) {{
        return null;
    }}
    const nodes = root.querySelectorAll({panels});
    for (const node of nodes) {{
        if (!(node instanceof HTMLElement) || node.offsetParent === null) {{
            continue;
        }}
        const text = normalize(node.innerText || node.textContent);
        if (!text) {{
            continue;
        }}
        if (!optionValues.some((option) => text.includes(option))) {{
            continue;
        }}
        const r = node.getBoundingClientRect();
        if (r.width < {PANEL_MIN_WIDTH} || r.height < {PANEL_MIN_HEIGHT}) {{
            continue;
        }}
        return {{ x: r.x, y: r.y, width: r.width, height: r.height }};
    }}
    return null;
}})()"#
    )
}

/// Rect of the option whose exact trimmed text equals `value`, or `null`.
///
/// Containers whose text is inherited entirely from a same-text child are
/// skipped; the child is the clickable control. Implausibly sized matches
/// are whole-panel false positives and are skipped too.
#[must_use]
pub fn option_rect(config: &UiConfig, value: &str) -> String {
    let trigger = js_str(&config.trigger_selector);
    let panels = js_str(&config.panel_selectors.join(","));
    let target = js_str(value);
    let (w_min, w_max) = OPTION_WIDTH_RANGE;
    let (h_min, h_max) = OPTION_HEIGHT_RANGE;
    format!(
        r#"(() => {{
    const targetText = {target};
    const normalize = (text) => (text || "").replace(/\s+/g, " ").trim();
    const root = document.querySelector({trigger});
    if (!(root instanceof HTMLElement) || root.offsetParent === null) {{
        return null;
    }}
    const panel = root.querySelector({panels});
    if (!(panel instanceof HTMLElement) || panel.offsetParent === null) {{
        return null;
    }}
    const nodes = panel.querySelectorAll("{OPTION_CANDIDATE_SELECTOR}");
    for (const el of nodes) {{
        if (!(el instanceof HTMLElement) || el.offsetParent === null) {{
            continue;
        }}
        const text = normalize(el.textContent);
        if (text !== targetText) {{
            continue;
        }}
        const r = el.getBoundingClientRect();
        if (r.width < {w_min} || r.height < {h_min} || r.width > {w_max} || r.height > {h_max}) {{
            continue;
        }}
        let hasSameTextChild = false;
        for (const child of el.children) {{
            if (normalize(child.textContent) === targetText) {{
                hasSameTextChild = true;
                break;
            }}
        }}
        if (hasSameTextChild) {{
            continue;
        }}
        return {{ x: r.x, y: r.y, width: r.width, height: r.height }};
    }}
    return null;
}})()"#
    )
}

/// Synthetic-event fallback: opens the panel with `mouseenter/mouseover/
/// mousemove` on the trigger and script-clicks the matched option.
///
/// Some layout variants respond to synthetic DOM events even when the
/// pointer-hover path does not. Resolves to `{ok: true}` or
/// `{ok: false, reason}`; evaluate with promise awaiting enabled.
#[must_use]
pub fn synthetic_apply(config: &UiConfig, value: &str) -> String {
    let trigger = js_str(&config.trigger_selector);
    let panels = js_str_array(&config.fallback_panel_selectors);
    let vocabulary = js_str_array(&config.vocabulary);
    let target = js_str(value);
    format!(
        r#"(async () => {{
    const targetText = {target};
    const optionValues = {vocabulary};
    const filterBtn = document.querySelector({trigger});
    if (!filterBtn) {{
        return {{ ok: false, reason: "trigger_not_found" }};
    }}

    const sleep = (ms) => new Promise((resolve) => setTimeout(resolve, ms));
    const normalize = (text) => (text || "").replace(/\s+/g, " ").trim();

    const openPanel = () => {{
        filterBtn.dispatchEvent(new MouseEvent("mouseenter", {{ bubbles: true }}));
        filterBtn.dispatchEvent(new MouseEvent("mouseover", {{ bubbles: true }}));
        filterBtn.dispatchEvent(new MouseEvent("mousemove", {{ bubbles: true }}));
    }};

    const findVisiblePanel = () => {{
        const nodes = document.querySelectorAll({panels}.join(","));
        for (const node of nodes) {{
            if (!(node instanceof HTMLElement) || node.offsetParent === null) {{
                continue;
            }}
            const text = normalize(node.innerText || node.textContent);
            if (!optionValues.some((option) => text.includes(option))) {{
                continue;
            }}
            return node;
        }}
        return null;
    }};

    openPanel();
    let panel = null;
    for (let i = 0; i < 20; i++) {{
        panel = findVisiblePanel();
        if (panel) {{
            break;
        }}
        if (i === 6 || i === 12) {{
            openPanel();
        }}
        await sleep(120);
    }}
    if (!panel) {{
        return {{ ok: false, reason: "panel_not_found" }};
    }}

    const findOption = () => {{
        const candidates = panel.querySelectorAll("{OPTION_CANDIDATE_SELECTOR}");
        for (const el of candidates) {{
            if (!(el instanceof HTMLElement) || el.offsetParent === null) {{
                continue;
            }}
            if (normalize(el.textContent) !== targetText) {{
                continue;
            }}
            let hasSameTextChild = false;
            for (const child of el.children) {{
                if (normalize(child.textContent) === targetText) {{
                    hasSameTextChild = true;
                    break;
                }}
            }}
            if (hasSameTextChild) {{
                continue;
            }}
            return el;
        }}
        return null;
    }};

    let optionEl = null;
    for (let i = 0; i < 12; i++) {{
        optionEl = findOption();
        if (optionEl) {{
            break;
        }}
        await sleep(80);
    }}
    if (!optionEl) {{
        return {{ ok: false, reason: "option_not_found" }};
    }}

    optionEl.click();
    return {{ ok: true }};
}})()"#
    )
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trigger_rect_names_configured_selector() {
        let script = trigger_rect(&UiConfig::default());
        assert!(script.contains(r#""div.filter, [class*='filter']""#));
        assert!(script.contains("getBoundingClientRect"));
    }

    #[test]
    fn test_panel_rect_carries_vocabulary_and_min_size() {
        let script = panel_rect(&UiConfig::default());
        assert!(script.contains("最新"));
        assert!(script.contains("不限"));
        assert!(script.contains("r.width < 60"));
        assert!(script.contains("r.height < 30"));
    }

    #[test]
    fn test_option_rect_escapes_value_and_bounds_size() {
        let config = UiConfig::default();
        let script = option_rect(&config, "最多点赞");
        assert!(script.contains(r#"const targetText = "最多点赞";"#));
        assert!(script.contains("r.width > 260"));
        assert!(script.contains("r.height > 96"));
        assert!(script.contains("hasSameTextChild"));

        // Values with JS-hostile characters stay inside the literal.
        let hostile = option_rect(&config, "a\"b\\c");
        assert!(hostile.contains(r#""a\"b\\c""#));
    }

    #[test]
    fn test_synthetic_apply_dispatches_hover_events_and_tags_reasons() {
        let script = synthetic_apply(&UiConfig::default(), "最新");
        for event in ["mouseenter", "mouseover", "mousemove"] {
            assert!(script.contains(event), "missing {event}");
        }
        assert!(script.contains(r#""trigger_not_found""#));
        assert!(script.contains(r#""panel_not_found""#));
        assert!(script.contains(r#""option_not_found""#));
        assert!(script.contains("optionEl.click()"));
    }

    #[test]
    fn test_custom_config_flows_into_templates() {
        let config = UiConfig {
            trigger_selector: "nav .combo".to_string(),
            ..UiConfig::default()
        };
        assert!(trigger_rect(&config).contains(r#""nav .combo""#));
        assert!(panel_rect(&config).contains(r#""nav .combo""#));
    }
}
