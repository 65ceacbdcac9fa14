use quiz_core::model::QuestionDraft;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use thiserror::Error;

/// Page size assumed when the source never reveals one.
pub const DEFAULT_PAGE_SIZE: u32 = 10;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ExtractorError {
    #[error("invalid selector {selector:?}: {reason}")]
    Selector {
        selector: &'static str,
        reason: String,
    },
    #[error(transparent)]
    Regex(#[from] regex::Error),
}

/// Total item count and page size of the remote question set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceShape {
    pub total: u32,
    pub page_size: u32,
}

impl SourceShape {
    #[must_use]
    pub fn total_pages(&self) -> u32 {
        if self.page_size == 0 {
            return 0;
        }
        self.total.div_ceil(self.page_size)
    }
}

impl Default for SourceShape {
    fn default() -> Self {
        Self {
            total: 0,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

/// Result of parsing one page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageExtract {
    /// Cards in document order. Unusable cards are already dropped.
    pub questions: Vec<QuestionDraft>,
    /// Total from the first `N/Total` marker on the page.
    pub total: Option<u32>,
    /// Number of question cards on the page, usable or not.
    pub page_size: Option<u32>,
}

impl PageExtract {
    /// Shape of the source when this page revealed both total and page size.
    #[must_use]
    pub fn shape(&self) -> Option<SourceShape> {
        match (self.total, self.page_size) {
            (Some(total), Some(page_size)) if total > 0 && page_size > 0 => {
                Some(SourceShape { total, page_size })
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CardSkip {
    NoMarker,
    NoTitle,
    NoOptions,
    AnswerFlags(usize),
}

/// Parses the card-per-question page layout.
#[derive(Debug)]
pub struct Extractor {
    card: Selector,
    marker: Selector,
    title: Selector,
    option_item: Selector,
    label: Selector,
    marker_re: Regex,
    title_prefix_re: Regex,
    letter_prefix_re: Regex,
}

fn selector(selector: &'static str) -> Result<Selector, ExtractorError> {
    Selector::parse(selector).map_err(|e| ExtractorError::Selector {
        selector,
        reason: e.to_string(),
    })
}

impl Extractor {
    /// # Errors
    ///
    /// Returns `ExtractorError` if a built-in selector or pattern fails to compile.
    pub fn new() -> Result<Self, ExtractorError> {
        Ok(Self {
            card: selector("div.card[data-num]")?,
            marker: selector("span.text-success")?,
            title: selector("div.card-body p.card-text")?,
            option_item: selector("div.list-group div.list-group-item")?,
            label: selector("label")?,
            marker_re: Regex::new(r"(\d+)/(\d+)")?,
            title_prefix_re: Regex::new(r"^\d+/\d+\s*")?,
            letter_prefix_re: Regex::new(r"^[A-D]\s*")?,
        })
    }

    #[must_use]
    pub fn extract(&self, markup: &str) -> PageExtract {
        let document = Html::parse_document(markup);

        let total = document
            .select(&self.marker)
            .next()
            .and_then(|span| self.parse_marker(&flat_text(span)))
            .map(|(_, total)| total);

        let cards: Vec<ElementRef<'_>> = document.select(&self.card).collect();
        let page_size = u32::try_from(cards.len()).ok().filter(|n| *n > 0);

        let mut questions = Vec::with_capacity(cards.len());
        for (position, card) in cards.into_iter().enumerate() {
            match self.extract_card(card) {
                Ok(draft) => questions.push(draft),
                Err(reason) => {
                    let data_num = card.value().attr("data-num").unwrap_or_default();
                    tracing::warn!(position, data_num, ?reason, "skipping question card");
                }
            }
        }

        tracing::debug!(cards = page_size.unwrap_or(0), usable = questions.len(), ?total, "extracted page");
        PageExtract {
            questions,
            total,
            page_size,
        }
    }

    fn parse_marker(&self, text: &str) -> Option<(u32, u32)> {
        let caps = self.marker_re.captures(text)?;
        let number = caps.get(1)?.as_str().parse().ok()?;
        let total = caps.get(2)?.as_str().parse().ok()?;
        Some((number, total))
    }

    fn extract_card(&self, card: ElementRef<'_>) -> Result<QuestionDraft, CardSkip> {
        let (number, _) = card
            .select(&self.marker)
            .next()
            .and_then(|span| self.parse_marker(&flat_text(span)))
            .ok_or(CardSkip::NoMarker)?;

        let title = card
            .select(&self.title)
            .next()
            .map(|p| self.title_prefix_re.replace(&flat_text(p), "").trim().to_owned())
            .filter(|t| !t.is_empty())
            .ok_or(CardSkip::NoTitle)?;

        let mut options = Vec::new();
        let mut flagged = Vec::new();
        for item in card.select(&self.option_item) {
            let Some(label) = item.select(&self.label).next() else {
                continue;
            };
            let text = self
                .letter_prefix_re
                .replace(&flat_text(label), "")
                .trim()
                .to_owned();
            if item.value().classes().any(|c| c == "bg-success") {
                flagged.push(text.clone());
            }
            options.push(text);
        }

        if options.is_empty() {
            return Err(CardSkip::NoOptions);
        }
        if flagged.len() != 1 {
            return Err(CardSkip::AnswerFlags(flagged.len()));
        }
        let answer = flagged.swap_remove(0);

        Ok(QuestionDraft {
            number,
            title,
            options,
            answer,
        })
    }
}

/// Text of an element with each fragment trimmed and glued together.
fn flat_text(element: ElementRef<'_>) -> String {
    element.text().map(str::trim).collect()
}
