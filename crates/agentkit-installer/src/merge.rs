use anyhow::{anyhow, Context, Result};
use serde_json::{Map, Value};

const MARKER_NAMESPACE: &str = "agentkit";

/// Deep-merges `overlay` into `base`.
///
/// Objects merge key-wise and recursively. Any other overlay value, arrays included,
/// replaces the base value outright. Keys come out sorted because `serde_json::Map`
/// is ordered.
pub fn merge_json(base: &Value, overlay: &Value) -> Value {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => Value::Object(merge_objects(base, overlay)),
        _ => overlay.clone(),
    }
}

fn merge_objects(base: &Map<String, Value>, overlay: &Map<String, Value>) -> Map<String, Value> {
    let mut merged = base.clone();
    for (key, overlay_value) in overlay {
        let next = match merged.get(key) {
            Some(base_value @ Value::Object(_)) if overlay_value.is_object() => {
                merge_json(base_value, overlay_value)
            }
            _ => overlay_value.clone(),
        };
        merged.insert(key.clone(), next);
    }
    merged
}

/// Merges `overlay` into a JSON document on disk and renders it back.
///
/// A missing or blank document counts as `{}`. A document whose root is not an
/// object is rejected rather than silently replaced.
pub fn merge_json_document(existing: Option<&[u8]>, overlay: &Value) -> Result<Vec<u8>> {
    let base = match existing {
        Some(raw) if !raw.iter().all(u8::is_ascii_whitespace) => {
            serde_json::from_slice::<Value>(raw).context("failed to parse existing JSON document")?
        }
        _ => Value::Object(Map::new()),
    };
    if !base.is_object() {
        return Err(anyhow!("existing JSON document root is not an object"));
    }

    let merged = merge_json(&base, overlay);
    let mut rendered =
        serde_json::to_vec_pretty(&merged).context("failed to render merged JSON document")?;
    rendered.push(b'\n');
    Ok(rendered)
}

/// Opening and closing sentinels for `section_id`.
pub fn section_markers(section_id: &str) -> (String, String) {
    (
        format!("<!-- {MARKER_NAMESPACE}:{section_id} -->"),
        format!("<!-- /{MARKER_NAMESPACE}:{section_id} -->"),
    )
}

struct SectionSpan {
    open_start: usize,
    open_end: usize,
    close_start: usize,
    close_end: usize,
}

/// Pairs each close marker with the nearest open marker before it, so a stray open
/// marker earlier in the document never swallows a later block.
fn locate_section(document: &str, open: &str, close: &str) -> Option<SectionSpan> {
    let mut search_from = 0;
    loop {
        let close_start = search_from + document[search_from..].find(close)?;
        let close_end = close_start + close.len();
        if let Some(open_start) = document[..close_start].rfind(open) {
            return Some(SectionSpan {
                open_start,
                open_end: open_start + open.len(),
                close_start,
                close_end,
            });
        }
        search_from = close_end;
    }
}

/// Places `content` between the markers for `section_id`.
///
/// Text outside an existing marker pair is never touched. Empty `content` removes
/// the whole block. A lone or out-of-order marker counts as no section at all.
pub fn inject_marked_section(document: &str, section_id: &str, content: &str) -> String {
    let (open, close) = section_markers(section_id);
    let span = locate_section(document, &open, &close);

    match span {
        Some(span) if content.is_empty() => remove_block(document, &span),
        Some(span) => format!(
            "{}\n{}{}",
            &document[..span.open_end],
            with_trailing_newline(content),
            &document[span.close_start..]
        ),
        None if content.is_empty() => document.to_string(),
        None => {
            let block = format!("{open}\n{}{close}\n", with_trailing_newline(content));
            append_block(document, &block)
        }
    }
}

/// Appends `content` unless the document already carries it verbatim.
pub fn append_section(document: &str, content: &str) -> String {
    let trimmed = content.trim_end();
    if trimmed.is_empty() || document.contains(trimmed) {
        return document.to_string();
    }
    append_block(document, &with_trailing_newline(content))
}

fn remove_block(document: &str, span: &SectionSpan) -> String {
    let mut end = span.close_end;
    if document[end..].starts_with('\n') {
        end += 1;
    }
    let before = document[..span.open_start].trim_end_matches('\n');
    let after = document[end..].trim_start_matches('\n');

    match (before.is_empty(), after.is_empty()) {
        (true, true) => String::new(),
        (true, false) => after.to_string(),
        (false, true) => format!("{before}\n"),
        (false, false) => format!("{before}\n\n{after}"),
    }
}

fn append_block(document: &str, block: &str) -> String {
    if document.is_empty() {
        block.to_string()
    } else if document.ends_with("\n\n") {
        format!("{document}{block}")
    } else if document.ends_with('\n') {
        format!("{document}\n{block}")
    } else {
        format!("{document}\n\n{block}")
    }
}

fn with_trailing_newline(content: &str) -> String {
    if content.ends_with('\n') {
        content.to_string()
    } else {
        format!("{content}\n")
    }
}
