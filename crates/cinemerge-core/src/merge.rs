use std::iter::Peekable;
use std::str::Chars;
use std::sync::LazyLock;

use chrono::{Datelike, NaiveDate};
use regex::Regex;
use serde_json::Value;

use crate::error::{Catalog, MergeError};
use crate::model::{MergedRecord, RawDetail, ResolvedPair};

static LEADING_YEAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(\d{4})").expect("year regex should compile"));

const ROTTEN_TOMATOES: &str = "Rotten Tomatoes";
const METACRITIC: &str = "Metacritic";

/// Combine the TMDB payload (`raw_a`) and the OMDb payload (`raw_b`) for one title.
///
/// Field coercion never fails: anything that does not parse becomes `None`.
pub fn merge(
    pair: &ResolvedPair,
    raw_a: RawDetail,
    raw_b: RawDetail,
) -> Result<MergedRecord, MergeError> {
    if !raw_a.is_object() {
        return Err(MergeError::Incomplete {
            catalog: Catalog::Tmdb,
            id: pair.internal_id.clone(),
        });
    }
    if !raw_b.is_object() {
        return Err(MergeError::Incomplete {
            catalog: Catalog::Omdb,
            id: pair.external_id.clone(),
        });
    }

    let title = raw_a
        .text("title")
        .or_else(|| raw_b.text("Title"))
        .map(str::to_string);

    let year = raw_a
        .text("release_date")
        .and_then(parse_year)
        .or_else(|| raw_b.text("Year").and_then(parse_year));

    let budget = raw_a.get("budget").and_then(coerce_number);
    let revenue = raw_a
        .get("revenue")
        .and_then(coerce_number)
        .or_else(|| raw_b.get("BoxOffice").and_then(coerce_number));
    let runtime = raw_a
        .get("runtime")
        .and_then(coerce_number)
        .or_else(|| raw_b.get("Runtime").and_then(coerce_number));

    let mut genres = raw_a.get("genres").map(genres_from_value).unwrap_or_default();
    if genres.is_empty() {
        genres = raw_b.text("Genre").map(parse_genre_list).unwrap_or_default();
    }

    let imdb_rating = raw_b.get("imdbRating").and_then(coerce_number);
    let rotten_rating = rating_from_source(&raw_b, ROTTEN_TOMATOES);
    let metacritic_rating = raw_b
        .get("Metascore")
        .and_then(coerce_number)
        .or_else(|| rating_from_source(&raw_b, METACRITIC));

    Ok(MergedRecord {
        id: pair.internal_id.clone(),
        external_id: pair.external_id.clone(),
        title,
        year,
        budget,
        revenue,
        runtime,
        genres,
        imdb_rating,
        rotten_rating,
        metacritic_rating,
        raw_a,
        raw_b,
    })
}

/// Numbers may arrive as JSON numbers or as display strings (`"9.3"`, `"91%"`,
/// `"82/100"`, `"142 min"`, `"$28,341,469"`).
pub fn coerce_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64().filter(|n| n.is_finite()),
        Value::String(text) => parse_decimal(text),
        _ => None,
    }
}

pub fn parse_decimal(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("n/a") {
        return None;
    }

    let unitless = strip_unit(trimmed);
    let cleaned: String = unitless
        .trim_start_matches('$')
        .chars()
        .filter(|ch| *ch != ',')
        .collect();
    cleaned
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
}

fn strip_unit(value: &str) -> &str {
    for suffix in ["%", "/100", "/10", "min"] {
        if let Some(rest) = value.strip_suffix(suffix) {
            return rest.trim_end();
        }
    }
    value
}

fn parse_year(raw: &str) -> Option<i32> {
    if let Ok(date) = NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d") {
        return Some(date.year());
    }
    LEADING_YEAR
        .captures(raw)
        .and_then(|caps| caps.get(1))
        .and_then(|year| year.as_str().parse().ok())
}

fn rating_from_source(raw: &RawDetail, source: &str) -> Option<f64> {
    raw.get("Ratings")?
        .as_array()?
        .iter()
        .find(|entry| entry.get("Source").and_then(Value::as_str) == Some(source))
        .and_then(|entry| entry.get("Value"))
        .and_then(coerce_number)
}

/// TMDB sends `[{"id": 18, "name": "Drama"}]`; flattened exports carry a display string.
fn genres_from_value(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(|item| match item {
                Value::Object(map) => map.get("name").and_then(Value::as_str),
                Value::String(name) => Some(name.as_str()),
                _ => None,
            })
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect(),
        Value::String(text) => parse_genre_list(text),
        _ => Vec::new(),
    }
}

/// Parse a genre display string into an ordered list of names.
///
/// Accepts a bracketed list of quoted names (`['Action', 'Drama']`, either quote
/// style, trailing comma allowed) or a bare comma list (`Action, Drama`). Any other
/// shape yields an empty list.
pub fn parse_genre_list(raw: &str) -> Vec<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("n/a") {
        return Vec::new();
    }

    let parsed = if trimmed.starts_with('[') {
        GenreParser::new(trimmed).list()
    } else {
        parse_bare_list(trimmed)
    };

    parsed
        .unwrap_or_default()
        .into_iter()
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .collect()
}

fn parse_bare_list(raw: &str) -> Option<Vec<String>> {
    let mut names = Vec::new();
    for part in raw.split(',') {
        let name = part.trim();
        if name.is_empty() || name.contains(['[', ']', '\'', '"']) {
            return None;
        }
        names.push(name.to_string());
    }
    Some(names)
}

struct GenreParser<'a> {
    chars: Peekable<Chars<'a>>,
}

impl<'a> GenreParser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            chars: input.chars().peekable(),
        }
    }

    // list := '[' (item (',' item)* ','?)? ']' EOF
    fn list(mut self) -> Option<Vec<String>> {
        self.expect('[')?;
        let mut items = Vec::new();
        loop {
            self.skip_whitespace();
            match self.chars.peek()? {
                ']' => {
                    self.chars.next();
                    break;
                }
                '\'' | '"' => {
                    items.push(self.quoted()?);
                    self.skip_whitespace();
                    match self.chars.next()? {
                        ',' => continue,
                        ']' => break,
                        _ => return None,
                    }
                }
                _ => return None,
            }
        }
        self.skip_whitespace();
        self.chars.peek().is_none().then_some(items)
    }

    fn quoted(&mut self) -> Option<String> {
        let quote = self.chars.next()?;
        let mut value = String::new();
        loop {
            match self.chars.next()? {
                '\\' => value.push(self.chars.next()?),
                ch if ch == quote => return Some(value),
                ch => value.push(ch),
            }
        }
    }

    fn expect(&mut self, expected: char) -> Option<()> {
        (self.chars.next()? == expected).then_some(())
    }

    fn skip_whitespace(&mut self) {
        while self.chars.next_if(|ch| ch.is_whitespace()).is_some() {}
    }
}
