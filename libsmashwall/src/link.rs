use crate::month::MonthSpec;
use crate::resolution::ResolutionSpec;
use scraper::{Html, Selector};
use tracing::{event, instrument, Level};
use url::{ParseError, Url};

/// Listing page url for the given month.
/// E.g May 2015 => https://{host}/2015/04/desktop-wallpaper-calendars-may-2015/
pub fn build_listing_url(host: &str, month: &MonthSpec, year: u16) -> String {
    build_listing_url_with_scheme("https", host, month, year)
}

/// Pages are published under the month preceding the one they're for, so
/// January's page lives in December of the previous year.
pub fn build_listing_url_with_scheme(
    scheme: &str,
    host: &str,
    month: &MonthSpec,
    year: u16,
) -> String {
    let prev_month = (month.number() + 10) % 12 + 1;
    let path_year = if prev_month == 12 { year.saturating_sub(1) } else { year };
    format!(
        "{scheme}://{host}/{path_year}/{prev_month:02}/desktop-wallpaper-calendars-{name}-{year}/",
        name = month.name().to_lowercase()
    )
}

/// Gets the href of every anchor whose text is exactly the resolution,
/// in document order. Duplicates are kept.
pub fn get_resolution_links(html_string: &str, resolution: &ResolutionSpec) -> Vec<String> {
    let html_document = Html::parse_document(html_string);
    let anchor_tag_selector = Selector::parse("a").unwrap();
    html_document
        .select(&anchor_tag_selector)
        .filter(|element| element.text().collect::<String>() == resolution.as_str())
        .filter_map(|element| element.value().attr("href"))
        .map(|href| {
            tracing::debug!("Matched {} => {}", resolution, href);
            href.to_owned()
        })
        .collect()
}

#[instrument]
/// Get the full link to a file, given the listing page's url.
/// Links that can't be resolved are returned as found.
pub fn resolve_link(link: &str, page_url: &Url) -> String {
    match Url::parse(link) {
        Ok(url) => url.to_string(),
        Err(ParseError::RelativeUrlWithoutBase) => match page_url.join(link) {
            Ok(url) => url.to_string(),
            Err(e) => {
                event!(Level::ERROR, "Failed to get full link for {}", link);
                event!(Level::ERROR, "{}", e);
                link.to_string()
            }
        },
        Err(e) => {
            event!(Level::ERROR, "Failed to get full link for {}", link);
            event!(Level::ERROR, "{}", e);
            link.to_string()
        }
    }
}
