//! Minimal HTML index of loaded modules and their operations.

use std::fmt::Write as _;

use axum::extract::State;
use axum::response::Html;

use super::AppState;

pub async fn ui_handler(State(state): State<AppState>) -> Html<String> {
    let mut page = String::from(
        "<!doctype html>\n<html><head><meta charset=\"utf-8\"><title>Coman</title></head><body>\n<h1>Coman modules</h1>\n",
    );
    for module in state.core.modules() {
        let _ = write!(
            page,
            "<section><h2>{} <small>v{}</small></h2><p>{}</p><ul>\n",
            escape(module.name()),
            escape(module.version()),
            escape(module.description()),
        );
        for op in module.describe_console_operations() {
            let _ = writeln!(
                page,
                "<li><code>{} {}</code> {} <em>{}</em></li>",
                escape(&op.methods.join(",")),
                escape(&op.path),
                escape(&op.name),
                escape(&op.summary),
            );
        }
        page.push_str("</ul></section>\n");
    }
    page.push_str("<p><a href=\"/openapi.json\">OpenAPI document</a></p>\n</body></html>\n");
    Html(page)
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
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

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::config::Settings;
    use crate::module::{EndpointSpec, Handler, ModuleBase, ModuleDescriptor};
    use crate::network::Lifecycle;
    use crate::registry::Core;

    #[test]
    fn escape_replaces_markup() {
        assert_eq!(escape("<a & 'b'>"), "&lt;a &amp; &#39;b&#39;&gt;");
    }

    #[tokio::test]
    async fn index_lists_operations() {
        let mut base = ModuleBase::new(ModuleDescriptor::new("text", "Text <utilities>"));
        base.register(
            EndpointSpec::get("/uppercase", Handler::sync(|_| Ok(json!(null))))
                .name("uppercase")
                .summary("Uppercase"),
        );
        let mut core = Core::new(Settings::default());
        core.register(Arc::new(base)).unwrap();
        let core = Arc::new(core);
        let state = AppState {
            openapi: Arc::new(crate::openapi::build_openapi(&core)),
            lifecycle: Arc::new(Lifecycle::new(Arc::clone(&core), Vec::new())),
            core,
        };

        let Html(page) = ui_handler(State(state)).await;
        assert!(page.contains("Text &lt;utilities&gt;"));
        assert!(page.contains("<code>GET /v1/text/uppercase</code> uppercase"));
    }
}
