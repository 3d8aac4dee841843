//! Hand-rendered HTML pages over the same three snippet operations
//! the JSON API exposes.

use chrono::{DateTime, SecondsFormat, Utc};
use codebin_core::model::Snippet;

fn format_timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

fn page(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
         <title>{title}</title>\n</head>\n<body>\n{body}\n</body>\n</html>\n",
        title = escape_html(title),
    )
}

fn limits_line(snippet: &Snippet) -> String {
    let mut parts = Vec::new();
    if let Some(delete_at) = snippet.delete_at {
        parts.push(format!(
            "expires at {}",
            escape_html(&format_timestamp(delete_at))
        ));
    }
    if let Some(limit) = snippet.views_limit {
        parts.push(format!("{} views left", limit.saturating_sub(snippet.views)));
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!("<p class=\"limits\">{}</p>\n", parts.join(", "))
    }
}

pub fn snippet_page(snippet: &Snippet) -> String {
    let body = format!(
        "<h1>{header}</h1>\n<span id=\"load_date\">{created}</span>\n\
         <span id=\"views\">{views} views</span>\n{limits}\
         <pre id=\"code_snippet\"><code>{code}</code></pre>",
        header = escape_html(&snippet.header),
        created = escape_html(&format_timestamp(snippet.created_at)),
        views = snippet.views,
        limits = limits_line(snippet),
        code = escape_html(&snippet.code),
    );
    page(&snippet.header, &body)
}

pub fn listing_page(snippets: &[Snippet]) -> String {
    let mut body = String::from("<h1>Latest snippets</h1>\n<ul>\n");
    for snippet in snippets {
        body.push_str(&format!(
            "<li><a href=\"/code/{id}\">{header}</a> \
             <span>{created}</span></li>\n",
            id = escape_html(&snippet.id),
            header = escape_html(&snippet.header),
            created = escape_html(&format_timestamp(snippet.created_at)),
        ));
    }
    body.push_str("</ul>");
    page("Latest snippets", &body)
}

pub fn submit_page() -> String {
    let body = "<h1>New snippet</h1>\n\
<input id=\"header\" type=\"text\" placeholder=\"Title\">\n\
<textarea id=\"code_snippet\" rows=\"16\"></textarea>\n\
<input id=\"views_limit\" type=\"number\" min=\"0\" placeholder=\"Views limit\">\n\
<input id=\"minutes_limit\" type=\"number\" min=\"0\" placeholder=\"Minutes limit\">\n\
<button id=\"send_snippet\" type=\"submit\" onclick=\"send()\">Submit</button>\n\
<script>\n\
function send() {\n\
    let body = { code: document.getElementById(\"code_snippet\").value };\n\
    let header = document.getElementById(\"header\").value;\n\
    if (header) { body.header = header; }\n\
    let views = document.getElementById(\"views_limit\").value;\n\
    if (views) { body.viewsLimit = parseInt(views); }\n\
    let minutes = document.getElementById(\"minutes_limit\").value;\n\
    if (minutes) { body.minutesLimit = parseInt(minutes); }\n\
    fetch(\"/api/code/new\", {\n\
        method: \"POST\",\n\
        headers: { \"Content-Type\": \"application/json\" },\n\
        body: JSON.stringify(body)\n\
    }).then(r => r.text()).then(id => window.location = \"/code/\" + id);\n\
}\n\
</script>";
    page("New snippet", body)
}

pub fn not_found_page() -> String {
    page("Not found", "<h1>404</h1>\n<p>Snippet not found.</p>")
}
