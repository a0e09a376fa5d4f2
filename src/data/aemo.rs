//! Reader for AEMO CSV tables.
//!
//! Two layouts are accepted:
//! - plain CSV whose first record is the header (what `nemosis`/`nemseer`
//!   leave in their caches)
//! - the MMS data model layout, where `I` records carry the header of the
//!   following `D` records and `C` records are comments
//!
//! MMS `I`/`D` records begin with four control fields
//! (`record type, report group, report name, version`) that are stripped.

use csv::{ReaderBuilder, StringRecord};
use std::io::Read;

use super::DataError;

const MMS_CONTROL_FIELDS: usize = 4;

/// One header plus the rows that follow it
#[derive(Debug, Clone)]
pub struct TableSection {
    /// Upper-cased column names
    headers: Vec<String>,
    rows: Vec<StringRecord>,
}

impl TableSection {
    fn find(&self, aliases: &[&str]) -> Option<usize> {
        aliases.iter().find_map(|alias| {
            self.headers
                .iter()
                .position(|h| h.eq_ignore_ascii_case(alias))
        })
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// A column request: the first alias found in a section is used
pub type ColumnAliases<'a> = &'a [&'a str];

#[derive(Debug, Clone, Default)]
pub struct AemoTable {
    sections: Vec<TableSection>,
}

impl AemoTable {
    pub fn parse<R: Read>(reader: R) -> Result<Self, DataError> {
        let mut rdr = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut sections: Vec<TableSection> = Vec::new();
        let mut mms: Option<bool> = None;

        for record in rdr.records() {
            let record = record?;
            let Some(first) = record.get(0) else { continue };
            let first = first.trim_start_matches('\u{feff}');

            let is_mms = *mms.get_or_insert(first == "C" || first == "I");
            if !is_mms {
                match sections.last_mut() {
                    None => sections.push(TableSection {
                        headers: record.iter().map(normalise_header).collect(),
                        rows: Vec::new(),
                    }),
                    Some(section) => {
                        if record.iter().all(|f| f.is_empty()) {
                            continue;
                        }
                        section.rows.push(record)
                    }
                }
                continue;
            }

            match first {
                "I" => sections.push(TableSection {
                    headers: record
                        .iter()
                        .skip(MMS_CONTROL_FIELDS)
                        .map(normalise_header)
                        .collect(),
                    rows: Vec::new(),
                }),
                "D" => {
                    if let Some(section) = sections.last_mut() {
                        section
                            .rows
                            .push(record.iter().skip(MMS_CONTROL_FIELDS).collect());
                    }
                }
                _ => {}
            }
        }

        Ok(Self { sections })
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DataError> {
        Self::parse(bytes)
    }

    pub fn sections(&self) -> &[TableSection] {
        &self.sections
    }

    pub fn row_count(&self) -> usize {
        self.sections.iter().map(TableSection::len).sum()
    }

    pub fn extend(&mut self, other: AemoTable) {
        self.sections.extend(other.sections);
    }

    /// Project rows onto `columns`.
    ///
    /// The first `required` column requests must exist in a section for its
    /// rows to be used; the rest are optional and yield `None` when absent.
    /// Fails only when no section carries the required columns.
    pub fn select(
        &self,
        table: &'static str,
        columns: &[ColumnAliases<'_>],
        required: usize,
    ) -> Result<Vec<Vec<Option<&str>>>, DataError> {
        let mut out = Vec::new();
        let mut matched = false;

        for section in &self.sections {
            let idx: Vec<Option<usize>> = columns.iter().map(|c| section.find(c)).collect();
            if idx[..required].iter().any(Option::is_none) {
                continue;
            }
            matched = true;

            for row in &section.rows {
                out.push(
                    idx.iter()
                        .map(|i| i.and_then(|i| row.get(i)).filter(|v| !v.is_empty()))
                        .collect(),
                );
            }
        }

        if !matched && !self.sections.is_empty() {
            let missing = columns[..required]
                .iter()
                .find(|c| self.sections.iter().all(|s| s.find(c).is_none()))
                .or(columns.first())
                .and_then(|c| c.first())
                .copied()
                .unwrap_or_default();
            return Err(DataError::MissingColumn {
                table,
                column: missing.to_string(),
            });
        }

        Ok(out)
    }
}

fn normalise_header(h: &str) -> String {
    h.trim().trim_start_matches('\u{feff}').to_uppercase()
}

/// Parse a numeric field, tolerating quotes and whitespace
pub fn parse_number(raw: &str) -> Option<f64> {
    raw.trim().trim_matches('"').parse::<f64>().ok()
}
