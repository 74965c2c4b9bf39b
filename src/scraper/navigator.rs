//! Site navigation on top of a [`PageFetcher`].
//!
//! Knows how to reach the monthly result search, how to follow a
//! [`Reference`], and what to wait for before each page type is readable.

use tracing::{debug, info};

use super::fetcher::{Locator, PageFetcher};
use crate::config::SiteConfig;
use crate::error::FetchError;
use crate::models::{DataType, Reference, Target};

const RESULTS_LINK: &str = "レース結果";
const PAST_SEARCH_LINK: &str = "過去レース結果検索";
const SEARCH_BUTTON: &str = "検索";
const YEAR_SELECT: &str = "#kaisaiY_list";
const MONTH_SELECT: &str = "#kaisaiM_list";

/// What a page must show before its HTML is taken
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageWait {
    /// Document loaded, nothing else
    Ready,
    /// At least one matching element
    Element(Locator),
    /// Row count stopped growing
    StableCount(Locator),
}

/// Wait recipe for a page type
pub fn page_wait(kind: DataType) -> PageWait {
    match kind {
        DataType::Month => PageWait::StableCount(Locator::css(".past_result_line_unit")),
        DataType::Match => PageWait::StableCount(Locator::css("th.race_num[scope='row']")),
        DataType::Race => PageWait::Element(Locator::css("div.block_header")),
        DataType::Horse => PageWait::StableCount(Locator::css("td.date")),
        DataType::Jockey
        | DataType::JockeySummary
        | DataType::Trainer
        | DataType::TrainerSummary => PageWait::StableCount(Locator::css("th.row")),
        DataType::OddsTan => PageWait::StableCount(Locator::css("tr th.horse")),
        DataType::Base | DataType::Failed | DataType::MatchList => PageWait::Ready,
    }
}

pub struct Navigator {
    begin_url: String,
    base_url: String,
}

impl Navigator {
    pub fn new(site: &SiteConfig) -> Self {
        Self {
            begin_url: site.begin_url.clone(),
            base_url: site.base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Absolute URL for a site path; absolute URLs pass through
    pub fn url_for(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    /// Block until a page of `kind` is readable
    pub async fn wait_for_page<F>(&self, fetcher: &mut F, kind: DataType) -> Result<(), FetchError>
    where
        F: PageFetcher + ?Sized,
    {
        fetcher.wait_for_ready().await?;
        match page_wait(kind) {
            PageWait::Ready => {}
            PageWait::Element(locator) => fetcher.wait_for_element(&locator).await?,
            PageWait::StableCount(locator) => {
                let count = fetcher.wait_for_stable_count(&locator).await?;
                debug!("{} page shows {} x {}", kind, count, locator);
            }
        }
        Ok(())
    }

    /// Open the monthly result list through the search form
    pub async fn open_month<F>(&self, fetcher: &mut F, year: i32, month: u32) -> Result<(), FetchError>
    where
        F: PageFetcher + ?Sized,
    {
        info!("Opening result search for {:04}-{:02}", year, month);
        fetcher.navigate(&self.begin_url).await?;
        fetcher.wait_for_ready().await?;

        fetcher.click(&Locator::link_text(RESULTS_LINK)).await?;
        fetcher.wait_for_ready().await?;
        fetcher.click(&Locator::link_text(PAST_SEARCH_LINK)).await?;

        let year_select = Locator::css(YEAR_SELECT);
        let month_select = Locator::css(MONTH_SELECT);
        fetcher.wait_for_element(&year_select).await?;
        fetcher.wait_for_element(&month_select).await?;
        fetcher
            .select_option(&year_select, &format!("{:04}", year))
            .await?;
        fetcher
            .select_option(&month_select, &format!("{:02}", month))
            .await?;

        fetcher.click(&Locator::link_text(SEARCH_BUTTON)).await?;
        self.wait_for_page(fetcher, DataType::Month).await
    }

    /// Follow a reference and wait for the target page
    pub async fn follow<F>(&self, fetcher: &mut F, reference: &Reference) -> Result<(), FetchError>
    where
        F: PageFetcher + ?Sized,
    {
        debug!("Following {}", reference);
        match &reference.target {
            Target::Link(path) => fetcher.navigate(&self.url_for(path)).await?,
            Target::Action(script) => fetcher.run_script(script).await?,
        }
        self.wait_for_page(fetcher, reference.category).await
    }

    /// Step back and wait for the page of `landing` type
    pub async fn back<F>(&self, fetcher: &mut F, landing: DataType) -> Result<(), FetchError>
    where
        F: PageFetcher + ?Sized,
    {
        fetcher.back().await?;
        self.wait_for_page(fetcher, landing).await
    }
}
