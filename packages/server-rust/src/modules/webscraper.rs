//! Page title fetcher.

use std::sync::Arc;
use std::time::Duration;

use coman_core::{BoundArguments, ParamType, ParameterSpec};
use scraper::{Html, Selector};
use serde_json::json;
use tracing::debug;

use crate::module::{EndpointSpec, Handler, HandlerError, HandlerResult, Module, ModuleBase, ModuleDescriptor};
use crate::registry::{Core, ModulePackage};

const FETCH_TIMEOUT: Duration = Duration::from_secs(10);
const NO_TITLE: &str = "(no title)";

struct Scraper {
    client: reqwest::Client,
}

impl Scraper {
    async fn title(&self, args: BoundArguments) -> HandlerResult {
        let url: String = args.parse("url")?;
        let target = reqwest::Url::parse(&url)
            .map_err(|e| HandlerError::Invalid(format!("invalid url '{url}': {e}")))?;
        let unavailable = |e: reqwest::Error| HandlerError::Unavailable(format!("fetching {url} failed: {e}"));

        let html = self
            .client
            .get(target)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(unavailable)?
            .text()
            .await
            .map_err(unavailable)?;
        debug!(%url, bytes = html.len(), "page fetched");
        Ok(json!({"url": url, "title": page_title(&html)}))
    }
}

/// Trimmed text of the first `<title>` element, or `(no title)`.
fn page_title(html: &str) -> String {
    let document = Html::parse_document(html);
    Selector::parse("title")
        .ok()
        .and_then(|selector| {
            document
                .select(&selector)
                .next()
                .map(|title| title.text().collect::<String>())
        })
        .map(|title| title.trim().to_string())
        .filter(|title| !title.is_empty())
        .unwrap_or_else(|| NO_TITLE.to_string())
}

/// # Errors
///
/// Returns an error if the HTTP client cannot be built.
pub fn build(_core: &Core) -> anyhow::Result<Arc<dyn Module>> {
    let scraper = Arc::new(Scraper {
        // Console calls run on a per-call runtime, so no connection may be
        // pooled across calls.
        client: reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .pool_max_idle_per_host(0)
            .build()?,
    });

    let mut base = ModuleBase::new(ModuleDescriptor::new("webscraper", "Fetch a page title"));
    base.register(
        EndpointSpec::get(
            "/title",
            Handler::from_async(move |args| {
                let scraper = Arc::clone(&scraper);
                async move { scraper.title(args).await }
            }),
        )
        .name("title")
        .summary("Fetch a page and return its title")
        .param(ParameterSpec::required("url", ParamType::String)),
    );
    Ok(Arc::new(base))
}

inventory::submit! {
    ModulePackage::new("webscraper", build)
}
