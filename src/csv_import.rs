//! Bank CSV decoding.
//!
//! A file is matched against [`BankProfile::ALL`] in order using its header
//! line; the first profile whose signature columns all appear in the header
//! decides how every data row is read. Rows that cannot be read are skipped
//! and reported as [`RowWarning`]s, never failing the whole file.
use crate::domain::UNCATEGORIZED;
use crate::error::{LedgerError, LedgerResult};
use chrono::NaiveDate;
use rust_decimal::Decimal;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BankProfile {
    ArvestChecking,
    UsaaCreditCard,
    WellsFargoCard,
    UsaaChecking,
}

struct Columns {
    date: usize,
    description: usize,
    category: Option<usize>,
}

impl BankProfile {
    /// Detection priority. `UsaaCreditCard` and `UsaaChecking` share a
    /// signature, so the earlier entry always wins.
    pub const ALL: [BankProfile; 4] = [
        BankProfile::ArvestChecking,
        BankProfile::UsaaCreditCard,
        BankProfile::WellsFargoCard,
        BankProfile::UsaaChecking,
    ];

    pub fn name(self) -> &'static str {
        match self {
            BankProfile::ArvestChecking => "Arvest Bank Checking",
            BankProfile::UsaaCreditCard => "USAA Credit Card",
            BankProfile::WellsFargoCard => "Wells Fargo Card",
            BankProfile::UsaaChecking => "USAA Checking",
        }
    }

    pub fn header_signature(self) -> &'static str {
        match self {
            BankProfile::ArvestChecking => {
                "Account,Date,Pending?,Description,Category,Check,Credit,Debit"
            }
            BankProfile::UsaaCreditCard | BankProfile::UsaaChecking => {
                "Date,Description,Original Description,Category,Amount,Status"
            }
            BankProfile::WellsFargoCard => "Date,Amount,,,Description",
        }
    }

    /// Substring match of every signature column against the raw header.
    pub fn matches(self, header: &str) -> bool {
        self.header_signature()
            .split(',')
            .all(|col| header.contains(col))
    }

    fn columns(self) -> Columns {
        match self {
            BankProfile::ArvestChecking => Columns {
                date: 1,
                description: 3,
                category: Some(4),
            },
            BankProfile::UsaaCreditCard | BankProfile::UsaaChecking => Columns {
                date: 0,
                description: 1,
                category: Some(3),
            },
            BankProfile::WellsFargoCard => Columns {
                date: 0,
                description: 4,
                category: None,
            },
        }
    }

    /// Signed amount for a row: negative is money leaving the account.
    fn amount(self, row: &[String]) -> Option<Decimal> {
        let cell = |i: usize| row.get(i).map(String::as_str).unwrap_or("");
        match self {
            // Separate credit/debit columns; a blank or unreadable cell counts as zero.
            BankProfile::ArvestChecking => {
                let credit = parse_amount(cell(6)).unwrap_or(Decimal::ZERO);
                let debit = parse_amount(cell(7)).unwrap_or(Decimal::ZERO);
                Some(credit + debit)
            }
            // Card exports report charges as positive.
            BankProfile::UsaaCreditCard => parse_amount(cell(4)).map(|a| -a),
            BankProfile::WellsFargoCard => parse_amount(cell(1)).map(|a| -a),
            BankProfile::UsaaChecking => parse_amount(cell(4)),
        }
    }
}

pub fn detect_profile(header: &str) -> Option<BankProfile> {
    let found = BankProfile::ALL.into_iter().find(|p| p.matches(header));
    match found {
        Some(p) => tracing::debug!(profile = p.name(), "recognized CSV header"),
        None => tracing::debug!(header, "no CSV profile matched"),
    }
    found
}

/// One decoded data row, not yet tied to an account.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateRow {
    pub line: usize,
    pub date: NaiveDate,
    pub description: String,
    pub category: String,
    pub amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowWarning {
    pub line: usize,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct Decoded {
    pub profile: BankProfile,
    pub rows: Vec<CandidateRow>,
    pub warnings: Vec<RowWarning>,
}

/// Decodes a whole bank export. Fails only when the file has no data rows
/// or the header matches no profile.
pub fn decode(text: &str) -> LedgerResult<Decoded> {
    let mut lines = text
        .split('\n')
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| (i + 1, line));

    let Some((_, header)) = lines.next() else {
        return Err(LedgerError::EmptyCsv);
    };
    let data: Vec<(usize, &str)> = lines.collect();
    if data.is_empty() {
        return Err(LedgerError::EmptyCsv);
    }

    let profile = detect_profile(header).ok_or_else(|| LedgerError::UnrecognizedFormat {
        header: header.trim().to_string(),
    })?;

    let mut rows = Vec::new();
    let mut warnings = Vec::new();
    for (line_no, line) in data {
        match decode_row(profile, line) {
            Ok((date, description, category, amount)) => rows.push(CandidateRow {
                line: line_no,
                date,
                description,
                category,
                amount,
            }),
            Err(reason) => {
                tracing::warn!(line = line_no, %reason, "skipped CSV row");
                warnings.push(RowWarning {
                    line: line_no,
                    reason,
                });
            }
        }
    }

    Ok(Decoded {
        profile,
        rows,
        warnings,
    })
}

fn decode_row(
    profile: BankProfile,
    line: &str,
) -> Result<(NaiveDate, String, String, Decimal), String> {
    let cols = split_row(line);
    if cols.len() < 3 {
        return Err(format!("expected at least 3 columns, found {}", cols.len()));
    }

    let map = profile.columns();
    let raw_date = cols
        .get(map.date)
        .ok_or_else(|| format!("missing date column {}", map.date))?;
    let date =
        parse_bank_date(raw_date).ok_or_else(|| format!("unreadable date '{raw_date}'"))?;
    let description = cols
        .get(map.description)
        .ok_or_else(|| format!("missing description column {}", map.description))?
        .trim()
        .to_string();
    let amount = profile
        .amount(&cols)
        .ok_or_else(|| "amount is not a number".to_string())?;
    let category = map
        .category
        .and_then(|i| cols.get(i))
        .map(|c| c.trim())
        .filter(|c| !c.is_empty())
        .unwrap_or(UNCATEGORIZED)
        .to_string();

    Ok((date, description, category, amount))
}

/// Quote-aware comma split.
///
/// A `"` directly after a comma (or at line start) opens a quoted span; a `"`
/// directly before a comma, carriage return or end of line closes it. Only
/// the final column is trimmed.
pub fn split_row(line: &str) -> Vec<String> {
    let chars: Vec<char> = line.chars().collect();
    let mut columns = Vec::new();
    let mut current = String::new();
    let mut in_quote = false;

    for (i, &ch) in chars.iter().enumerate() {
        let prev = if i == 0 { None } else { Some(chars[i - 1]) };
        let next = chars.get(i + 1).copied();

        if ch == '"' && !in_quote && (prev.is_none() || prev == Some(',')) {
            in_quote = true;
            continue;
        }
        if ch == '"' && in_quote && matches!(next, None | Some(',') | Some('\r')) {
            in_quote = false;
            continue;
        }
        if ch == ',' && !in_quote {
            columns.push(std::mem::take(&mut current));
        } else {
            current.push(ch);
        }
    }
    columns.push(current.trim().to_string());
    columns
}

/// Accepts `1234.5`, `-12.00`, `+3`, `$1,234.56`. Blank is not a number.
fn parse_amount(raw: &str) -> Option<Decimal> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| *c != '$' && *c != ',')
        .collect();
    let cleaned = cleaned.strip_prefix('+').unwrap_or(&cleaned);
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<Decimal>().ok()
}

/// Normalizes the date formats banks export (`2024-01-10`, `01/10/2024`,
/// `1/10/24`, `20240110`, optionally followed by a time) to a calendar date.
pub fn parse_bank_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    let date_part = raw
        .split(|c: char| c.is_whitespace() || c == 'T')
        .next()
        .unwrap_or("");

    let sep = if date_part.contains('-') {
        '-'
    } else if date_part.contains('/') {
        '/'
    } else {
        if date_part.len() == 8 && date_part.chars().all(|c| c.is_ascii_digit()) {
            return NaiveDate::parse_from_str(date_part, "%Y%m%d").ok();
        }
        return None;
    };

    let parts: Vec<&str> = date_part.split(sep).collect();
    if parts.len() != 3 {
        return None;
    }
    let (a, b, c) = (parts[0], parts[1], parts[2]);

    if a.len() == 4 {
        let year = num(a)? as i32;
        return NaiveDate::from_ymd_opt(year, num(b)?, num(c)?);
    }

    let year = match c.len() {
        4 => num(c)? as i32,
        2 => {
            let yy = num(c)? as i32;
            if yy < 50 { 2000 + yy } else { 1900 + yy }
        }
        _ => return None,
    };
    NaiveDate::from_ymd_opt(year, num(a)?, num(b)?)
}

fn num(s: &str) -> Option<u32> {
    if s.is_empty() || !s.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}
