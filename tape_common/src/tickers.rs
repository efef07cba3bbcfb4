//! Ticker symbols and helpers shared between server and client.
//!
//! - `Symbol`: validated 1–5 letter uppercase ticker, the key of everything tracked.
//! - `extract_symbols`: pulls candidate symbols out of a free-text query.
//! - `Ticker`: the list of well-known tickers, used as an optional allow-list and by
//!   the simulated oracle.
//! - `WatchlistParser`: reads symbols from a watchlist file.

use std::collections::HashSet;
use std::fmt;
use std::io::BufRead;
use std::str::FromStr;

use clap::ValueEnum;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

use crate::error::TapeError;

/// Maximum number of letters in a ticker symbol.
pub const MAX_SYMBOL_LEN: usize = 5;

static SYMBOL_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b[A-Z]{1,5}\b").expect("symbol token pattern is valid"));

/// Normalized ticker symbol: one to five ASCII uppercase letters.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Symbol(String);

impl Symbol {
    /// Parses `input`, trimming whitespace and normalizing to uppercase.
    pub fn parse(input: &str) -> Result<Self, TapeError> {
        let trimmed = input.trim();
        let invalid = |reason| TapeError::InvalidSymbol {
            input: input.to_string(),
            reason,
        };

        if trimmed.is_empty() {
            return Err(invalid("empty"));
        }
        if trimmed.chars().count() > MAX_SYMBOL_LEN {
            return Err(invalid("longer than 5 letters"));
        }
        if !trimmed.chars().all(|ch| ch.is_ascii_alphabetic()) {
            return Err(invalid("only ASCII letters are allowed"));
        }

        Ok(Self(trimmed.to_ascii_uppercase()))
    }

    /// The symbol text, always uppercase.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this symbol is on the well-known ticker list.
    pub fn is_known(&self) -> bool {
        Ticker::from_str(&self.0).is_ok()
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Symbol {
    type Err = TapeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Symbol {
    type Error = TapeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Symbol> for String {
    fn from(value: Symbol) -> Self {
        value.0
    }
}

impl From<&Ticker> for Symbol {
    fn from(ticker: &Ticker) -> Self {
        Symbol(ticker.to_string())
    }
}

/// Which extracted tokens are accepted as symbols.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum SymbolFilter {
    /// Every 1–5 letter uppercase token. Also catches incidental all-caps words.
    #[default]
    Any,
    /// Only tokens on the well-known ticker list.
    Known,
}

impl SymbolFilter {
    /// Whether `symbol` passes the filter.
    pub fn accepts(self, symbol: &Symbol) -> bool {
        match self {
            SymbolFilter::Any => true,
            SymbolFilter::Known => symbol.is_known(),
        }
    }
}

/// Scans a free-text query for ticker-like tokens.
///
/// Tokens are runs of 1–5 uppercase letters bounded by word boundaries. Results are
/// de-duplicated and keep first-seen order.
pub fn extract_symbols(text: &str, filter: SymbolFilter) -> Vec<Symbol> {
    let mut seen = HashSet::new();
    SYMBOL_TOKEN
        .find_iter(text)
        .filter_map(|m| Symbol::parse(m.as_str()).ok())
        .filter(|symbol| filter.accepts(symbol))
        .filter(|symbol| seen.insert(symbol.clone()))
        .collect()
}

/// Trait providing file parsing for watchlists.
pub trait WatchlistParser {
    /// Parses symbols from a buffered reader.
    ///
    /// Symbols may be separated by commas, whitespace or new lines. Blank entries are
    /// skipped, duplicates collapse to the first occurrence. Returns an error if any
    /// entry is not a valid symbol.
    fn parse_from_file<R: BufRead>(reader: R) -> Result<Vec<Symbol>, TapeError>;
}

impl WatchlistParser for Symbol {
    fn parse_from_file<R: BufRead>(reader: R) -> Result<Vec<Self>, TapeError> {
        let mut symbols = Vec::new();
        let mut seen = HashSet::new();

        for line_result in reader.lines() {
            let line = line_result.map_err(TapeError::Io)?;
            for entry in line.split(|ch: char| ch == ',' || ch.is_whitespace()) {
                if entry.is_empty() {
                    continue;
                }

                match entry.parse::<Self>() {
                    Ok(symbol) => {
                        if seen.insert(symbol.clone()) {
                            symbols.push(symbol);
                        }
                    }
                    Err(e) => return Err(TapeError::ParseWatchlist(e.to_string())),
                }
            }
        }
        Ok(symbols)
    }
}

/// Well-known ticker symbols.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, Display, EnumString, Hash, Eq, PartialEq)]
#[strum(ascii_case_insensitive)]
pub enum Ticker {
    AAPL,
    MSFT,
    GOOGL,
    AMZN,
    NVDA,
    META,
    TSLA,
    JPM,
    JNJ,
    V,
    PG,
    UNH,
    HD,
    DIS,
    PYPL,
    NFLX,
    ADBE,
    CRM,
    INTC,
    CSCO,
    PFE,
    ABT,
    TMO,
    ABBV,
    LLY,
    PEP,
    COST,
    TXN,
    AVGO,
    ACN,
    QCOM,
    DHR,
    MDT,
    NKE,
    UPS,
    RTX,
    HON,
    ORCL,
    LIN,
    AMGN,
    LOW,
    SBUX,
    SPGI,
    INTU,
    ISRG,
    T,
    BMY,
    DE,
    PLD,
    CI,
    CAT,
    GS,
    UNP,
    AMT,
    AXP,
    MS,
    BLK,
    GE,
    SYK,
    GILD,
    MMM,
    MO,
    LMT,
    FISV,
    ADI,
    BKNG,
    C,
    SO,
    NEE,
    ZTS,
    TGT,
    DUK,
    ICE,
    BDX,
    PNC,
    CMCSA,
    SCHW,
    MDLZ,
    TJX,
    USB,
    CL,
    EMR,
    APD,
    COF,
    FDX,
    AON,
    WM,
    ECL,
    ITW,
    VRTX,
    D,
    NSC,
    PGR,
    ETN,
    FIS,
    PSA,
    KLAC,
    MCD,
    ADP,
    APTV,
    AEP,
    MCO,
    SHW,
    DD,
    ROP,
    SLB,
    HUM,
    BSX,
    NOC,
    EW,
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use rstest::rstest;

    use super::*;

    fn sym(s: &str) -> Symbol {
        Symbol::parse(s).expect("valid symbol")
    }

    #[test]
    fn parses_and_normalizes_symbol() {
        assert_eq!(sym(" aapl ").as_str(), "AAPL");
    }

    #[rstest]
    #[case("")]
    #[case("   ")]
    #[case("TOOLONG")]
    #[case("BRK.B")]
    #[case("A1")]
    fn rejects_invalid_symbols(#[case] input: &str) {
        let err = Symbol::parse(input).expect_err("must fail");
        assert!(matches!(err, TapeError::InvalidSymbol { .. }));
    }

    #[test]
    fn symbol_serializes_as_plain_string() {
        let json = serde_json::to_string(&sym("MSFT")).unwrap();
        assert_eq!(json, r#""MSFT""#);
        let err = serde_json::from_str::<Symbol>(r#""NOT A SYMBOL""#);
        assert!(err.is_err());
    }

    #[test]
    fn extracts_uppercase_tokens_in_first_seen_order() {
        let found = extract_symbols("Compare AAPL vs MSFT, then AAPL again.", SymbolFilter::Any);
        assert_eq!(found, vec![sym("AAPL"), sym("MSFT")]);
    }

    #[rstest]
    #[case("what is aapl doing", &[])]
    #[case("NVDA's earnings", &["NVDA"])]
    #[case("AAPL123 is not a token", &[])]
    #[case("TOOLONG is six letters plus", &[])]
    #[case("Is TSLA up? I think so", &["TSLA", "I"])]
    fn extraction_follows_word_boundaries(#[case] text: &str, #[case] expected: &[&str]) {
        let found = extract_symbols(text, SymbolFilter::Any);
        let expected: Vec<Symbol> = expected.iter().map(|s| sym(s)).collect();
        assert_eq!(found, expected);
    }

    #[test]
    fn known_filter_drops_incidental_capitals() {
        let found = extract_symbols("PLEASE CHECK AAPL AND GE NOW", SymbolFilter::Known);
        assert_eq!(found, vec![sym("AAPL"), sym("GE")]);
    }

    #[test]
    fn known_list_lookup() {
        assert!(sym("aapl").is_known());
        assert!(!sym("ZZZZZ").is_known());
        assert_eq!(Symbol::from(&Ticker::NVDA), sym("NVDA"));
    }

    #[test]
    fn parses_watchlist_with_mixed_separators() {
        let input = "aapl, MSFT\n\nTSLA GOOGL\nmsft\n";
        let symbols = Symbol::parse_from_file(Cursor::new(input)).unwrap();
        assert_eq!(
            symbols,
            vec![sym("AAPL"), sym("MSFT"), sym("TSLA"), sym("GOOGL")]
        );
    }

    #[test]
    fn watchlist_rejects_bad_entry() {
        let err = Symbol::parse_from_file(Cursor::new("AAPL\n12345\n")).unwrap_err();
        assert!(matches!(err, TapeError::ParseWatchlist(_)));
    }
}
