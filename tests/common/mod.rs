//! Scripted in-memory site for crawler tests.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use keiba_crawler::error::FetchError;
use keiba_crawler::scraper::{Locator, PageFetcher};

pub const BEGIN_PAGE: &str =
    r#"<html><body><ul><li><a href="/keiba/">レース結果</a></li></ul></body></html>"#;
pub const MENU_PAGE: &str =
    r#"<html><body><ul><li><a href="/JRADB/accessS.html">過去レース結果検索</a></li></ul></body></html>"#;
pub const SEARCH_PAGE: &str = r##"<html><body><form>
<select id="kaisaiY_list"><option value="2024">2024年</option></select>
<select id="kaisaiM_list"><option value="12">12月</option></select>
<a href="#">検索</a></form></body></html>"##;

pub fn fixture(name: &str) -> String {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures/jra")
        .join(name);
    std::fs::read_to_string(&path).unwrap_or_else(|e| panic!("{}: {}", path.display(), e))
}

/// Serves pages by substring match on the URL, locator or script that
/// opened them, and keeps a back stack like a browser tab.
pub struct FakeFetcher {
    routes: Vec<(&'static str, String)>,
    history: Vec<String>,
    visits: BTreeMap<&'static str, usize>,
    pub selections: Vec<(String, String)>,
}

impl FakeFetcher {
    /// Routes of the JRA fixture site. More specific needles come first.
    pub fn jra() -> Self {
        let routes = vec![
            ("faq/pop02", BEGIN_PAGE.to_string()),
            ("'過去レース結果検索'", SEARCH_PAGE.to_string()),
            ("'レース結果'", MENU_PAGE.to_string()),
            ("'検索'", fixture("month.html")),
            ("pw01srl", fixture("match.html")),
            ("CNAME=pw01sde", fixture("race.html")),
            ("CNAME=pw01dud", fixture("horse.html")),
            ("pw04kmk0", fixture("jockey.html")),
            ("pw04kmk1", fixture("jockey_summary.html")),
            ("pw05cmk0", fixture("trainer.html")),
            ("pw05cmk1", fixture("trainer_summary.html")),
            ("pw151ou", fixture("odds.html")),
        ];
        Self {
            routes,
            history: Vec::new(),
            visits: BTreeMap::new(),
            selections: Vec::new(),
        }
    }

    /// Replace the page served for a needle
    pub fn with_page(mut self, needle: &'static str, html: &str) -> Self {
        for route in &mut self.routes {
            if route.0 == needle {
                route.1 = html.to_string();
            }
        }
        self
    }

    pub fn visits(&self, needle: &str) -> usize {
        self.visits.get(needle).copied().unwrap_or(0)
    }

    pub fn total_visits(&self) -> usize {
        self.visits.values().sum()
    }

    pub fn depth(&self) -> usize {
        self.history.len()
    }

    fn open(&mut self, target: &str) -> Result<(), FetchError> {
        let (needle, html) = self
            .routes
            .iter()
            .find(|(needle, _)| target.contains(needle))
            .ok_or_else(|| FetchError::UnknownPage(target.to_string()))?;
        *self.visits.entry(*needle).or_default() += 1;
        self.history.push(html.clone());
        Ok(())
    }
}

#[async_trait]
impl PageFetcher for FakeFetcher {
    async fn navigate(&mut self, url: &str) -> Result<(), FetchError> {
        self.open(url)
    }

    async fn click(&mut self, locator: &Locator) -> Result<(), FetchError> {
        self.open(&locator.to_string())
    }

    async fn wait_for_element(&mut self, _locator: &Locator) -> Result<(), FetchError> {
        Ok(())
    }

    async fn wait_for_stable_count(&mut self, _locator: &Locator) -> Result<usize, FetchError> {
        Ok(1)
    }

    async fn wait_for_ready(&mut self) -> Result<(), FetchError> {
        Ok(())
    }

    async fn select_option(&mut self, locator: &Locator, value: &str) -> Result<(), FetchError> {
        self.selections.push((locator.to_string(), value.to_string()));
        Ok(())
    }

    async fn current_html(&mut self) -> Result<String, FetchError> {
        self.history.last().cloned().ok_or(FetchError::EmptyHistory)
    }

    async fn back(&mut self) -> Result<(), FetchError> {
        if self.history.len() <= 1 {
            return Err(FetchError::EmptyHistory);
        }
        self.history.pop();
        Ok(())
    }

    async fn switch_window(&mut self, index: usize) -> Result<(), FetchError> {
        if index == 0 {
            Ok(())
        } else {
            Err(FetchError::NoWindow(index))
        }
    }

    async fn run_script(&mut self, script: &str) -> Result<(), FetchError> {
        self.open(script)
    }
}
