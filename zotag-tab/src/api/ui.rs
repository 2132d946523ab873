//! HTML rendering: query form, page wrapper, result tables

use axum::{extract::Query, response::Html};
use std::fmt::Write as _;

use crate::params::{split_tag_list, RawQuery};
use crate::table::LabeledTable;

const FORM_HTML: &str = include_str!("../../ui/form.html");

const PAGE_HEADER: &str = r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>Zotero tags query</title>
<style>
  body { font-family: sans-serif; padding: 2em; }
  table { border-collapse: collapse; margin: 2em auto; }
  th, td { padding: 0.5em; border-bottom: 1px solid #ddd; }
  td { text-align: right; }
  .chart { text-align: center; }
  .revise { text-align: center; margin-top: 2em; }
  .revise a { display: inline-block; padding: 0.8em 1.5em; background: #333; color: white; text-decoration: none; border-radius: 4px; }
  .revise small { display: block; color: #666; margin-top: 0.5em; }
</style>
</head>
<body>
"#;

const PAGE_FOOTER: &str = "</body>\n</html>\n";

/// GET /
///
/// Serves the query form, prefilled from any list fields in the query string
pub async fn serve_form(Query(raw): Query<RawQuery>) -> Html<String> {
    Html(render_form(&raw))
}

pub fn render_form(raw: &RawQuery) -> String {
    FORM_HTML
        .replace("{tags_x}", &form_value(raw.tags_x.as_deref()))
        .replace("{tags_y}", &form_value(raw.tags_y.as_deref()))
        .replace("{filter}", &form_value(raw.filter.as_deref()))
}

/// Normalized textarea content: one entry per line, HTML-escaped
fn form_value(value: Option<&str>) -> String {
    html_escape(&split_tag_list(value).join("\r\n"))
}

/// Wrap content in the result page, with a "Revise query" link when given
pub fn render_page(content: &str, revise_link: Option<&str>) -> String {
    let mut page = String::from(PAGE_HEADER);
    page.push_str(content);
    if let Some(link) = revise_link {
        let _ = write!(
            page,
            "\n<p class=\"revise\"><a href=\"{}\">Revise query</a>\
             <small>Reopen the form with the current tag lists preloaded</small></p>\n",
            html_escape(link)
        );
    }
    page.push_str(PAGE_FOOTER);
    page
}

/// Link back to the form carrying the request's tag lists
pub fn revise_link(raw: &RawQuery) -> String {
    let fields = [
        ("tags_x", raw.tags_x.as_deref()),
        ("tags_y", raw.tags_y.as_deref()),
        ("filter", raw.filter.as_deref()),
    ];
    let query: Vec<String> = fields
        .iter()
        .map(|(name, value)| {
            let joined = split_tag_list(*value).join("\r\n");
            format!("{}={}", name, urlencoding::encode(&joined))
        })
        .collect();
    format!("/?{}", query.join("&"))
}

/// HTML table; wrapped labels are shown on one line
pub fn render_table_html(table: &LabeledTable) -> String {
    let mut html = String::from("<table>\n<thead>\n<tr><th></th>");
    for column in &table.columns {
        let _ = write!(html, "<th>{}</th>", cell_label(column));
    }
    html.push_str("</tr>\n</thead>\n<tbody>\n");

    for (label, row) in table.index.iter().zip(&table.data) {
        let _ = write!(html, "<tr><th>{}</th>", cell_label(label));
        for value in row {
            let _ = write!(html, "<td>{}</td>", format_cell(*value));
        }
        html.push_str("</tr>\n");
    }

    html.push_str("</tbody>\n</table>\n");
    html
}

fn cell_label(label: &str) -> String {
    html_escape(&label.replace('\n', " "))
}

fn format_cell(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{}", value as i64)
    } else {
        format!("{:.6}", value)
            .trim_end_matches('0')
            .trim_end_matches('.')
            .to_string()
    }
}

pub fn html_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_form_prefill_is_escaped() {
        let raw = RawQuery {
            tags_x: Some("a\r\n<b>\r\n\r\n".to_string()),
            filter: Some("-z".to_string()),
            ..Default::default()
        };
        let html = render_form(&raw);
        assert!(html.contains(">a\r\n&lt;b&gt;</textarea>"));
        assert!(html.contains(">-z</textarea>"));
        assert!(!html.contains("{tags_y}"));
    }

    #[test]
    fn test_revise_link_encodes_lists() {
        let raw = RawQuery {
            tags_x: Some("a b\nc&d".to_string()),
            ..Default::default()
        };
        assert_eq!(
            revise_link(&raw),
            "/?tags_x=a%20b%0D%0Ac%26d&tags_y=&filter="
        );
    }

    #[test]
    fn test_render_page_with_revise_link() {
        let page = render_page("<p>body</p>", Some("/?tags_x=a&tags_y="));
        assert!(page.contains("<p>body</p>"));
        assert!(page.contains(r#"href="/?tags_x=a&amp;tags_y=""#));
        assert!(render_page("x", None).find("Revise query").is_none());
    }

    #[test]
    fn test_render_table_html() {
        let table = LabeledTable {
            index: vec!["long\nlabel".to_string()],
            columns: vec!["a".to_string(), "b<c".to_string()],
            data: vec![vec![3.0, 12.5]],
        };
        let html = render_table_html(&table);
        assert!(html.contains("<th>long label</th>"));
        assert!(html.contains("<th>b&lt;c</th>"));
        assert!(html.contains("<td>3</td><td>12.5</td>"));
    }
}
