//! Crawl orchestration: month → match → race → (horse | jockey | trainer) → odds.
//!
//! The ledger is consulted before every child page. Entities are stored
//! bottom-up, so a parent's ledger row only exists once all of its
//! children were handled; an interrupted month is crawled again on the
//! next run and skips what was already stored.

use std::collections::BTreeMap;

use anyhow::{bail, Context, Result};
use serde::Serialize;
use tracing::{info, warn};

use super::archive::HtmlArchive;
use super::fetcher::PageFetcher;
use super::navigator::Navigator;
use super::parsers::{
    parse_and_archive, HorseParser, JockeyParser, JockeySummaryParser, MatchParser, MonthParser,
    OddsParser, PageContext, PageParser, ParseResult, RaceParser, TrainerParser,
    TrainerSummaryParser,
};
use super::{year_month_range, YearMonth};
use crate::config::SiteConfig;
use crate::models::{merge_odds, DataType, Month, Reference, Summary};
use crate::storage::CrawlRepository;

/// Counters of one crawler's work
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CrawlStats {
    /// Pages read and parsed
    pub pages: usize,
    pub inserted: BTreeMap<DataType, usize>,
    /// References not followed, ledger hits and code-less references
    pub skipped: BTreeMap<DataType, usize>,
}

impl CrawlStats {
    pub fn inserted(&self, kind: DataType) -> usize {
        self.inserted.get(&kind).copied().unwrap_or(0)
    }

    pub fn skipped(&self, kind: DataType) -> usize {
        self.skipped.get(&kind).copied().unwrap_or(0)
    }

    fn record_insert(&mut self, kind: DataType) {
        *self.inserted.entry(kind).or_default() += 1;
    }

    fn record_skip(&mut self, kind: DataType) {
        *self.skipped.entry(kind).or_default() += 1;
    }
}

/// Sequential crawler over one browsing session
pub struct Crawler<'a, F: PageFetcher + ?Sized> {
    fetcher: &'a mut F,
    repo: &'a CrawlRepository,
    archive: &'a dyn HtmlArchive,
    navigator: Navigator,
    stats: CrawlStats,
}

impl<'a, F: PageFetcher + ?Sized> Crawler<'a, F> {
    pub fn new(
        fetcher: &'a mut F,
        repo: &'a CrawlRepository,
        archive: &'a dyn HtmlArchive,
        site: &SiteConfig,
    ) -> Self {
        Self {
            fetcher,
            repo,
            archive,
            navigator: Navigator::new(site),
            stats: CrawlStats::default(),
        }
    }

    pub fn stats(&self) -> &CrawlStats {
        &self.stats
    }

    pub fn into_stats(self) -> CrawlStats {
        self.stats
    }

    /// Crawl every month from `start` up to but excluding `end`
    pub async fn crawl_range(&mut self, start: YearMonth, end: YearMonth) -> Result<()> {
        for ym in year_month_range(start, end) {
            self.crawl_month(ym.year, ym.month).await?;
        }
        Ok(())
    }

    /// Crawl one month. A month already in the ledger is skipped whole.
    pub async fn crawl_month(&mut self, year: i32, month: u32) -> Result<()> {
        let code = Month::code_for(year, month);
        if let Some(record) = self.repo.check_code(&code, DataType::Month)? {
            info!(%code, visits = record.count, "Month already crawled, skipping");
            self.stats.record_skip(DataType::Month);
            return Ok(());
        }

        self.navigator
            .open_month(&mut *self.fetcher, year, month)
            .await
            .with_context(|| format!("Failed to open month {}", code))?;
        let mut result = self
            .parse_current::<MonthParser>(PageContext::new(code.as_str()))
            .await?;
        let entity = result
            .entity
            .take()
            .with_context(|| format!("Month page {} produced no entity", code))?;
        info!(
            %code,
            matches = result.references(DataType::Match).len(),
            "Crawling month"
        );

        for reference in result.references(DataType::Match) {
            let Some(match_code) = self.should_visit(reference)? else {
                continue;
            };
            self.follow(reference).await?;
            self.crawl_match(&match_code, reference)
                .await
                .with_context(|| format!("Failed to crawl match {}", match_code))?;
            self.back(DataType::Month).await?;
        }

        self.repo.insert_month(&entity)?;
        self.stats.record_insert(DataType::Month);
        info!(%code, "Stored month");
        Ok(())
    }

    /// Crawl the match page currently shown
    async fn crawl_match(&mut self, code: &str, reference: &Reference) -> Result<()> {
        let context = PageContext::new(code).with_name(reference.name.clone());
        let mut result = self.parse_current::<MatchParser>(context).await?;
        let entity = result
            .entity
            .take()
            .with_context(|| format!("Match page {} produced no entity", code))?;

        let odds = result.references(DataType::OddsTan);
        for (i, race_ref) in result.references(DataType::Race).iter().enumerate() {
            let Some(race_code) = self.should_visit(race_ref)? else {
                continue;
            };
            self.follow(race_ref).await?;
            self.crawl_race(&race_code, race_ref, code, odds.get(i))
                .await
                .with_context(|| format!("Failed to crawl race {}", race_code))?;
        }

        self.repo.insert_match(&entity)?;
        self.stats.record_insert(DataType::Match);
        info!(%code, name = %entity.name, "Stored match");
        Ok(())
    }

    /// Crawl the race page currently shown, its leaves and its odds.
    ///
    /// Returns with the match page shown again.
    async fn crawl_race(
        &mut self,
        code: &str,
        reference: &Reference,
        match_code: &str,
        odds_ref: Option<&Reference>,
    ) -> Result<()> {
        let context = PageContext::new(code)
            .with_name(reference.name.clone())
            .with_father(match_code);
        let mut result = self.parse_current::<RaceParser>(context).await?;
        let race = result
            .entity
            .take()
            .with_context(|| format!("Race page {} produced no entity", code))?;

        for kind in [DataType::Horse, DataType::Jockey, DataType::Trainer] {
            for leaf in result.references(kind) {
                let Some(leaf_code) = self.should_visit(leaf)? else {
                    continue;
                };
                self.follow(leaf).await?;
                self.crawl_leaf(&leaf_code, leaf)
                    .await
                    .with_context(|| format!("Failed to crawl {} {}", kind, leaf_code))?;
                self.back(DataType::Race).await?;
            }
        }
        self.back(DataType::Match).await?;

        let sheet = match odds_ref {
            Some(odds_ref) => {
                let odds_code = odds_ref.code.clone().unwrap_or_default();
                self.follow(odds_ref).await?;
                let context = PageContext::new(odds_code).with_father(code);
                let sheet = self.parse_current::<OddsParser>(context).await?.entity;
                self.back(DataType::Match).await?;
                sheet
            }
            None => {
                warn!(%code, "No odds reference for race");
                None
            }
        };

        let race = match &sheet {
            Some(sheet) => merge_odds(race, sheet),
            None => race,
        };
        self.repo.insert_race(&race, sheet.as_ref())?;
        self.stats.record_insert(DataType::Race);
        info!(%code, horses = race.number_of_horses, "Stored race");
        Ok(())
    }

    /// Crawl the horse, jockey or trainer page currently shown
    async fn crawl_leaf(&mut self, code: &str, reference: &Reference) -> Result<()> {
        let context = PageContext::new(code).with_name(reference.name.clone());
        match reference.category {
            DataType::Horse => {
                let horse = self
                    .parse_current::<HorseParser>(context)
                    .await?
                    .entity
                    .with_context(|| format!("Horse page {} produced no entity", code))?;
                self.repo.insert_horse(&horse)?;
            }
            DataType::Jockey => {
                let mut result = self.parse_current::<JockeyParser>(context).await?;
                let history = self
                    .read_history::<JockeySummaryParser>(
                        DataType::Jockey,
                        code,
                        result.references(DataType::JockeySummary),
                    )
                    .await?;
                let jockey = result
                    .entity
                    .take()
                    .with_context(|| format!("Jockey page {} produced no entity", code))?
                    .with_history(history);
                self.repo.insert_jockey(&jockey)?;
            }
            DataType::Trainer => {
                let mut result = self.parse_current::<TrainerParser>(context).await?;
                let history = self
                    .read_history::<TrainerSummaryParser>(
                        DataType::Trainer,
                        code,
                        result.references(DataType::TrainerSummary),
                    )
                    .await?;
                let trainer = result
                    .entity
                    .take()
                    .with_context(|| format!("Trainer page {} produced no entity", code))?
                    .with_history(history);
                self.repo.insert_trainer(&trainer)?;
            }
            other => bail!("No crawler for {} pages", other),
        }
        self.stats.record_insert(reference.category);
        info!(category = %reference.category, %code, "Stored");
        Ok(())
    }

    /// Visit the summary-history page linked from the person page shown,
    /// then return to the person page
    async fn read_history<P: PageParser>(
        &mut self,
        owner: DataType,
        owner_code: &str,
        links: &[Reference],
    ) -> Result<Vec<Summary>> {
        let link = links
            .first()
            .with_context(|| format!("No {} link on {} page {}", P::KIND, owner, owner_code))?;
        self.follow(link).await?;
        let context =
            PageContext::new(link.code.clone().unwrap_or_default()).with_father(owner_code);
        let history = self.parse_current::<P>(context).await?.history;
        self.back(owner).await?;
        Ok(history)
    }

    /// Ledger gate: the code to visit, or `None` when the reference is skipped
    fn should_visit(&mut self, reference: &Reference) -> Result<Option<String>> {
        let Some(code) = reference.ledger_code() else {
            warn!(%reference, "Reference without code, skipping");
            self.stats.record_skip(reference.category);
            return Ok(None);
        };
        if let Some(record) = self.repo.check_code(code, reference.category)? {
            info!(
                category = %reference.category,
                %code,
                visits = record.count,
                "Already stored, skipping"
            );
            self.stats.record_skip(reference.category);
            return Ok(None);
        }
        Ok(Some(code.to_string()))
    }

    async fn follow(&mut self, reference: &Reference) -> Result<()> {
        self.navigator
            .follow(&mut *self.fetcher, reference)
            .await
            .with_context(|| format!("Failed to open {}", reference))
    }

    async fn back(&mut self, landing: DataType) -> Result<()> {
        self.navigator
            .back(&mut *self.fetcher, landing)
            .await
            .with_context(|| format!("Failed to go back to {} page", landing))
    }

    async fn parse_current<P: PageParser>(
        &mut self,
        context: PageContext,
    ) -> Result<ParseResult<P::Entity>> {
        let html = self
            .fetcher
            .current_html()
            .await
            .with_context(|| format!("Failed to read {} page {}", P::KIND, context.code))?;
        self.stats.pages += 1;
        parse_and_archive::<P>(self.archive, &html, &context)
            .with_context(|| format!("Failed to parse {} page {}", P::KIND, context.code))
    }
}
