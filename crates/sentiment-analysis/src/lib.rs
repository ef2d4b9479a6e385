use analysis_core::{adaptive, AnalysisError, AsxSymbol, NewsArticle, SentimentAnalyzer, SentimentReading};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;

const NEGATION_WORDS: &[&str] = &[
    "not", "no", "never", "don't", "doesn't", "didn't", "isn't", "aren't",
    "wasn't", "weren't", "won't", "wouldn't", "couldn't", "shouldn't", "hardly",
    "barely", "neither", "nor", "without",
];

const POSITIVE_WORDS: &[&str] = &[
    "bullish", "rally", "surge", "gain", "gains", "profit", "growth", "beat",
    "upgrade", "outperform", "strong", "positive", "rise", "rises", "increase",
    "success", "exceed", "momentum", "buy", "recommend", "optimistic", "record",
    "high", "advance",
    // Financial terms
    "dividend", "buyback", "repurchase", "accretive", "upside", "recovery",
    "rebound", "expansion", "robust", "accelerating", "overweight", "raised",
    "upgraded", "reiterated", "outpacing", "tailwind", "resilient",
];

const NEGATIVE_WORDS: &[&str] = &[
    "bearish", "decline", "loss", "losses", "fall", "falls", "plunge", "crash",
    "miss", "downgrade", "underperform", "weak", "negative", "drop", "decrease",
    "concern", "concerns", "risk", "fail", "disappoint", "slump", "sell",
    "warning", "pessimistic", "low", "retreat", "fear", "trouble",
    // Financial terms
    "dilution", "dilutive", "headwind", "lawsuit", "litigation", "investigation",
    "probe", "default", "defaults", "impairment", "restructuring", "layoff",
    "layoffs", "downside", "overvalued", "bubble", "underweight", "lowered",
    "suspended", "penalty", "fined", "scandal",
];

const NEGATION_WINDOW: usize = 3;
const TITLE_WEIGHT: f64 = 2.0;
const RECENCY_HALF_LIFE_HOURS: f64 = 24.0;
const PRIMARY_ENTITY_WEIGHT: f64 = 1.5;
const PERIPHERAL_ENTITY_WEIGHT: f64 = 0.5;
/// Raw weighted score that maps to tanh(1) ≈ 0.76.
const SCORE_SCALE: f64 = 3.0;
const MAX_CONFIDENCE: f64 = 0.95;

/// News event type with importance weight
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NewsEventType {
    Earnings,      // Results, guidance
    MergersAcq,    // M&A, takeovers
    Regulatory,    // ASIC, APRA, royal commissions
    AnalystAction, // Upgrades, downgrades, price targets
    Legal,         // Class actions, court
    Macro,         // RBA, cash rate, inflation
    General,
}

impl NewsEventType {
    pub fn importance_weight(&self) -> f64 {
        match self {
            NewsEventType::Earnings => 2.0,
            NewsEventType::MergersAcq => 2.5,
            NewsEventType::Regulatory => 2.0,
            NewsEventType::AnalystAction => 1.5,
            NewsEventType::Legal => 1.5,
            NewsEventType::Macro => 0.8,
            NewsEventType::General => 1.0,
        }
    }
}

/// Keyword forms: `word` matches a whole word, `stem*` any word starting
/// with the stem, and `two words` consecutive words.
fn has_keyword(words: &[&str], keyword: &str) -> bool {
    let parts: Vec<&str> = keyword.split(' ').collect();
    words.windows(parts.len()).any(|window| {
        window.iter().zip(&parts).all(|(word, part)| match part.strip_suffix('*') {
            Some(stem) => word.starts_with(stem),
            None => word == part,
        })
    })
}

pub fn classify_event(title: &str, description: Option<&str>) -> NewsEventType {
    let text = format!("{} {}", title, description.unwrap_or("")).to_lowercase();
    let words: Vec<&str> = text
        .split(|c: char| !(c.is_alphanumeric() || c == '-'))
        .filter(|w| !w.is_empty())
        .collect();
    let has = |keywords: &[&str]| keywords.iter().any(|k| has_keyword(&words, k));

    if has(&["earnings", "quarterly", "guidance", "half-year", "full-year", "profit result*", "eps"]) {
        NewsEventType::Earnings
    } else if has(&["acqui*", "merger*", "buyout*", "takeover*", "divest*", "spin-off"]) {
        NewsEventType::MergersAcq
    } else if has(&["asic", "apra", "accc", "austrac", "regulat*", "royal commission", "compliance"]) {
        NewsEventType::Regulatory
    } else if has(&["upgrade*", "downgrade*", "price target*", "analyst*", "rating", "ratings", "initiat*"]) {
        NewsEventType::AnalystAction
    } else if has(&["lawsuit*", "litigation", "class action*", "settlement*", "sued", "court", "courts"]) {
        NewsEventType::Legal
    } else if has(&["rba", "reserve bank", "cash rate*", "interest rate*", "inflation", "gdp", "unemployment"]) {
        NewsEventType::Macro
    } else {
        NewsEventType::General
    }
}

/// Lexicon sentiment engine for news headlines and Reddit posts.
pub struct SentimentAnalysisEngine {
    positive_words: HashSet<&'static str>,
    negative_words: HashSet<&'static str>,
    negation_words: HashSet<&'static str>,
}

impl SentimentAnalysisEngine {
    pub fn new() -> Self {
        Self {
            positive_words: POSITIVE_WORDS.iter().copied().collect(),
            negative_words: NEGATIVE_WORDS.iter().copied().collect(),
            negation_words: NEGATION_WORDS.iter().copied().collect(),
        }
    }

    /// Net lexicon hits in `text`; a negation within three tokens flips a hit.
    pub fn analyze_text(&self, text: &str) -> f64 {
        let text_lower = text.to_lowercase();
        let words: Vec<&str> = text_lower
            .split(|c: char| c.is_whitespace() || matches!(c, ',' | ';' | '.' | '!' | '?' | ':' | '(' | ')' | '"'))
            .filter(|w| !w.is_empty())
            .collect();

        let negation_positions: Vec<usize> = words
            .iter()
            .enumerate()
            .filter(|(_, w)| self.negation_words.contains(*w))
            .map(|(i, _)| i)
            .collect();

        let mut score: i32 = 0;
        for (i, word) in words.iter().enumerate() {
            let polarity = if self.positive_words.contains(word) {
                1
            } else if self.negative_words.contains(word) {
                -1
            } else {
                continue;
            };

            let negated = negation_positions
                .iter()
                .any(|&neg_pos| neg_pos < i && i - neg_pos <= NEGATION_WINDOW);

            score += if negated { -polarity } else { polarity };
        }

        score as f64
    }

    /// Title counts double; Reddit posts are discounted by their source weight.
    pub fn analyze_article(&self, article: &NewsArticle) -> f64 {
        let mut total = self.analyze_text(&article.title) * TITLE_WEIGHT;
        if let Some(desc) = &article.description {
            total += self.analyze_text(desc);
        }
        total * article.source.weight()
    }

    fn recency_weight(article: &NewsArticle, now: DateTime<Utc>) -> f64 {
        let age_hours = (now - article.published_utc).num_minutes() as f64 / 60.0;
        if age_hours <= 0.0 {
            1.0
        } else {
            0.5_f64.powf(age_hours / RECENCY_HALF_LIFE_HOURS)
        }
    }

    fn entity_weight(article: &NewsArticle, symbol: &AsxSymbol) -> f64 {
        let mentions = article
            .tickers
            .iter()
            .filter_map(|t| AsxSymbol::parse(t).ok())
            .any(|t| &t == symbol);

        if mentions {
            PRIMARY_ENTITY_WEIGHT
        } else {
            PERIPHERAL_ENTITY_WEIGHT
        }
    }

    /// Score `news` for `symbol` as of `now`.
    pub fn analyze_at(&self, symbol: &AsxSymbol, news: &[NewsArticle], now: DateTime<Utc>) -> SentimentReading {
        if news.is_empty() {
            return SentimentReading::default();
        }

        let article_scores: Vec<f64> = news.iter().map(|a| self.analyze_article(a)).collect();

        let mut total_score = 0.0;
        let mut total_weight = 0.0;
        let mut positive = 0usize;
        let mut negative = 0usize;
        let mut neutral = 0usize;

        for (article, &score) in news.iter().zip(&article_scores) {
            let event = classify_event(&article.title, article.description.as_deref());
            let weight = Self::recency_weight(article, now)
                * Self::entity_weight(article, symbol)
                * event.importance_weight();

            total_score += score * weight;
            total_weight += weight;

            if score > 0.0 {
                positive += 1;
            } else if score < 0.0 {
                negative += 1;
            } else {
                neutral += 1;
            }
        }

        let avg_sentiment = if total_weight > 0.0 { total_score / total_weight } else { 0.0 };
        let score = adaptive::clamp_signed_unit((avg_sentiment / SCORE_SCALE).tanh());

        // More articles and a clearer majority both raise confidence
        let count_confidence = (news.len() as f64 / 10.0).min(1.0);
        let consistency = positive.max(negative).max(neutral) as f64 / news.len() as f64;
        let confidence = (count_confidence * 0.4 + consistency * 0.4 + 0.1).min(MAX_CONFIDENCE);

        tracing::debug!(
            "{} sentiment {:.3} from {} items ({} +, {} -, {} =)",
            symbol,
            score,
            news.len(),
            positive,
            negative,
            neutral
        );

        SentimentReading {
            score,
            confidence,
            article_count: news.len(),
            positive,
            negative,
            neutral,
        }
    }
}

#[async_trait]
impl SentimentAnalyzer for SentimentAnalysisEngine {
    async fn analyze(&self, symbol: &AsxSymbol, news: &[NewsArticle]) -> Result<SentimentReading, AnalysisError> {
        Ok(self.analyze_at(symbol, news, Utc::now()))
    }
}

impl Default for SentimentAnalysisEngine {
    fn default() -> Self {
        Self::new()
    }
}
