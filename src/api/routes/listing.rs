//! HTML listing of every stored metric

use std::fmt::Write;

use axum::{extract::State, response::Html};

use crate::api::{ApiResult, ApiState};

fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

/// GET /
pub async fn list_metrics(State(state): State<ApiState>) -> ApiResult<Html<String>> {
    let metrics = state.store.all().await?;

    let mut page = String::from("<!DOCTYPE html>\n<html><head><title>Metrics</title></head><body>\n<ul>\n");
    for metric in &metrics {
        // Writing into a String can not fail
        let _ = writeln!(
            page,
            "<li>{} ({}): {}</li>",
            escape(&metric.name),
            metric.kind(),
            metric.value
        );
    }
    page.push_str("</ul>\n</body></html>\n");

    Ok(Html(page))
}
