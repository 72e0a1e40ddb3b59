//! Endpoint listing all metrics as an HTML table.

use std::fmt::Write;

use axum::extract::State;
use axum::response::Html;

use crate::endpoints::common::ApiError;
use crate::service::ServiceState;

fn escape(input: &str) -> String {
    let mut output = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '<' => output.push_str("&lt;"),
            '>' => output.push_str("&gt;"),
            '&' => output.push_str("&amp;"),
            '"' => output.push_str("&quot;"),
            c => output.push(c),
        }
    }
    output
}

/// Handles `GET /`.
pub async fn handle(State(state): State<ServiceState>) -> Result<Html<String>, ApiError> {
    let metrics = state.repository().list().await?;

    let mut output = String::from("<table>");
    for metric in &metrics {
        // Writing to a `String` cannot fail.
        let _ = write!(
            output,
            "<tr><td>{}</td><td>{}</td></tr>",
            escape(&metric.id),
            metric.value
        );
    }
    output.push_str("</table>");

    Ok(Html(output))
}
