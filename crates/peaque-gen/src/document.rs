//! HTML document shells.

/// Render a complete HTML document around a rendered `<head>` body.
///
/// `script_src` is the module that boots the client router; `css_href`
/// is the bundled stylesheet, omitted when empty.
pub fn render_document(head_body: &str, script_src: &str, css_href: &str) -> String {
    let mut head = String::from(head_body);
    if !css_href.is_empty() {
        head.push_str(&format!("<link rel=\"stylesheet\" href=\"{css_href}\">\n"));
    }
    format!(
        "<!DOCTYPE html>\n\
         <html>\n\
         <head>\n\
         {head}\
         </head>\n\
         <body>\n\
         <div id=\"peaque-root\"></div>\n\
         <script type=\"module\" src=\"{script_src}\"></script>\n\
         </body>\n\
         </html>\n"
    )
}

/// The dev-server SPA shell: default head, dev runtime, loader, styles.
pub fn spa_shell(head_body: &str) -> String {
    let mut head = String::from(head_body);
    head.push_str("<link rel=\"stylesheet\" href=\"/peaque.css\">\n");
    head.push_str("<script type=\"module\" src=\"/peaque-dev.js\"></script>\n");
    format!(
        "<!DOCTYPE html>\n\
         <html>\n\
         <head>\n\
         {head}\
         </head>\n\
         <body>\n\
         <div id=\"peaque-root\"></div>\n\
         <script type=\"module\" src=\"/peaque-loader.js\"></script>\n\
         </body>\n\
         </html>\n"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_contains_root_and_entry() {
        let html = render_document("<title>App</title>\n", "/assets-12345678/peaque.js", "");
        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains("<div id=\"peaque-root\"></div>"));
        assert!(html.contains("<script type=\"module\" src=\"/assets-12345678/peaque.js\"></script>"));
        assert!(!html.contains("stylesheet"));
    }

    #[test]
    fn document_links_css_when_present() {
        let html = render_document("", "/app.js", "/assets-12345678/peaque.css");
        assert!(html.contains("<link rel=\"stylesheet\" href=\"/assets-12345678/peaque.css\">"));
    }

    #[test]
    fn spa_shell_boots_the_dev_loader() {
        let html = spa_shell("<title>Dev</title>\n");
        assert!(html.contains("src=\"/peaque-loader.js\""));
        assert!(html.contains("src=\"/peaque-dev.js\""));
        assert!(html.contains("href=\"/peaque.css\""));
    }
}
