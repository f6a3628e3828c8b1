//! Output escaping used by escaped writes

use std::sync::Arc;

/// Escaping function bound to `__e` in compiled templates
pub type Escaper = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// Escape HTML special characters
pub fn html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// The default escaper
pub fn html_escaper() -> Escaper {
    Arc::new(html)
}

/// Wrap a closure as an escaper
pub fn escaper<F>(f: F) -> Escaper
where
    F: Fn(&str) -> String + Send + Sync + 'static,
{
    Arc::new(f)
}
