//! HTML directory index for a prefix listing.

use crate::{handlers::headers::format_http_date, models::listing::ListingResult};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};

/// Characters left as-is in link targets.
const HREF_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'/')
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Render `listing` of `prefix` as a complete HTML page.
///
/// Links are relative to the directory page, so `prefix` is expected to be
/// empty (bucket root) or end in `/`.
pub fn render_listing(listing: &ListingResult, prefix: &str) -> String {
    let title = format!("Index of /{}", html_escape(prefix));

    let mut html = String::from("<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n");
    html.push_str(&format!("<title>{}</title>\n", title));
    html.push_str("</head>\n<body>\n");
    html.push_str(&format!("<h1>{}</h1>\n", title));
    html.push_str("<table>\n");
    html.push_str("<tr><th>Name</th><th>Size</th><th>Last modified</th></tr>\n");

    if !prefix.is_empty() {
        html.push_str("<tr><td><a href=\"../\">../</a></td><td>-</td><td>-</td></tr>\n");
    }

    for dir in &listing.delimited_prefixes {
        let name = relative_name(dir, prefix);
        html.push_str(&format!(
            "<tr><td><a href=\"{}\">{}</a></td><td>-</td><td>-</td></tr>\n",
            href(name),
            html_escape(name)
        ));
    }

    for object in &listing.objects {
        let name = relative_name(&object.key, prefix);
        html.push_str(&format!(
            "<tr><td><a href=\"{}\">{}</a></td><td>{}</td><td>{}</td></tr>\n",
            href(name),
            html_escape(name),
            object.size,
            format_http_date(object.uploaded)
        ));
    }

    html.push_str("</table>\n");
    if listing.truncated {
        html.push_str("<p>Results truncated: this directory has more entries than shown.</p>\n");
    }
    html.push_str("</body>\n</html>\n");
    html
}

fn relative_name<'a>(key: &'a str, prefix: &str) -> &'a str {
    key.strip_prefix(prefix).unwrap_or(key)
}

fn href(name: &str) -> String {
    utf8_percent_encode(name, HREF_ENCODE_SET).to_string()
}

fn html_escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}
