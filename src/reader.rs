use std::fs::File;
use std::io::{BufReader, Read};
use std::sync::LazyLock;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{NaiveDate, NaiveTime, TimeDelta};
use csv::ReaderBuilder;
use flate2::read::MultiGzDecoder;
use regex::Regex;
use tracing::{debug, info, warn};
use zip::ZipArchive;

use crate::error::CollectorError;
use crate::table::{Table, cell};

static ITEM_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<si>(.*?)</si>").unwrap());
static ROW_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<row\b[^>]*>(.*?)</row>").unwrap());
static CELL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<c\b([^>]*?)(?:/>|>(.*?)</c>)").unwrap());
static REF_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"\br="([A-Z]+)\d+""#).unwrap());
static TYPE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"\bt="([^"]*)""#).unwrap());
static STYLE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"\bs="(\d+)""#).unwrap());
static VALUE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<v>(.*?)</v>").unwrap());
static TEXT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<t(?:\s[^>]*)?>(.*?)</t>").unwrap());
static NUM_FMT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<numFmt\b([^>]*)>").unwrap());
static NUM_FMT_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\bnumFmtId="(\d+)""#).unwrap());
static FORMAT_CODE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\bformatCode="([^"]*)""#).unwrap());
static CELL_XFS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<cellXfs\b[^>]*>(.*?)</cellXfs>").unwrap());
static XF_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<xf\b([^>]*)>").unwrap());
static LITERAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""[^"]*"|\[[^\]]*\]|\\."#).unwrap());

/// Largest serial Excel accepts (9999-12-31).
const MAX_DATE_SERIAL: f64 = 2_958_465.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableFormat {
    Delimited { delimiter: u8, gzip: bool },
    Xlsx,
}

impl TableFormat {
    /// Picks a format from the file extension. `None` means "not a table".
    pub fn detect(path: &Utf8Path) -> Option<Self> {
        let name = path.file_name()?.to_ascii_lowercase();
        let (stem, gzip) = match name.strip_suffix(".gz") {
            Some(stem) => (stem, true),
            None => (name.as_str(), false),
        };
        let extension = stem.rsplit_once('.').map(|(_, ext)| ext)?;
        match extension {
            "csv" => Some(TableFormat::Delimited {
                delimiter: b',',
                gzip,
            }),
            "tsv" | "txt" | "tab" => Some(TableFormat::Delimited {
                delimiter: b'\t',
                gzip,
            }),
            "xlsx" if !gzip => Some(TableFormat::Xlsx),
            _ => None,
        }
    }
}

/// Rows loaded from one file plus the number of malformed rows left out.
#[derive(Debug, Clone, Default)]
pub struct LoadedTable {
    pub table: Table,
    pub skipped_rows: usize,
}

/// Reads a delimited or spreadsheet file as text, keeping only the columns for
/// which `keep` returns true. Malformed rows are skipped and counted.
pub fn read_table(
    path: &Utf8Path,
    keep: &dyn Fn(&str) -> bool,
) -> Result<LoadedTable, CollectorError> {
    match TableFormat::detect(path) {
        Some(TableFormat::Delimited { delimiter, gzip }) => {
            read_delimited(path, delimiter, gzip, keep)
        }
        Some(TableFormat::Xlsx) => read_xlsx(path, keep),
        None => Err(CollectorError::TableRead {
            path: path.to_path_buf(),
            message: "unsupported file type".to_string(),
        }),
    }
}

/// Reads every file in order and stacks the results. Files that cannot be read
/// at all are skipped with a warning; their rows never reach the output.
pub fn read_all<'a>(
    paths: impl IntoIterator<Item = &'a Utf8PathBuf>,
    keep: &dyn Fn(&str) -> bool,
) -> LoadedTable {
    let mut tables = Vec::new();
    let mut skipped_rows = 0;
    for path in paths {
        info!("reading {}", path.file_stem().unwrap_or(path.as_str()));
        match read_table(path, keep) {
            Ok(loaded) => {
                skipped_rows += loaded.skipped_rows;
                tables.push(loaded.table);
            }
            Err(err) => warn!("{err}"),
        }
    }
    LoadedTable {
        table: Table::concat(tables),
        skipped_rows,
    }
}

fn read_delimited(
    path: &Utf8Path,
    delimiter: u8,
    gzip: bool,
    keep: &dyn Fn(&str) -> bool,
) -> Result<LoadedTable, CollectorError> {
    let file = File::open(path.as_std_path()).map_err(|err| table_error(path, err))?;
    let input: Box<dyn Read> = if gzip {
        Box::new(MultiGzDecoder::new(BufReader::new(file)))
    } else {
        Box::new(BufReader::new(file))
    };
    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(true)
        .from_reader(input);

    let headers = reader
        .byte_headers()
        .map_err(|err| table_error(path, err))?
        .iter()
        .map(header_name)
        .collect::<Vec<_>>();
    let (columns, positions) = select_columns(&headers, keep);
    let mut table = Table::new(columns);
    let mut skipped_rows = 0;

    for (index, record) in reader.byte_records().enumerate() {
        let record = match record {
            Ok(record) => record,
            Err(err) if err.is_io_error() => return Err(table_error(path, err)),
            Err(err) => {
                skipped_rows += 1;
                let line = err.position().map(|pos| pos.line()).unwrap_or(index as u64 + 2);
                debug!(
                    "{}",
                    CollectorError::Parse {
                        path: path.to_path_buf(),
                        line,
                        message: err.to_string(),
                    }
                );
                continue;
            }
        };
        if record.len() > headers.len() {
            skipped_rows += 1;
            let line = record
                .position()
                .map(|pos| pos.line())
                .unwrap_or(index as u64 + 2);
            debug!(
                "{}",
                CollectorError::Parse {
                    path: path.to_path_buf(),
                    line,
                    message: format!(
                        "expected {} fields, found {}",
                        headers.len(),
                        record.len()
                    ),
                }
            );
            continue;
        }
        let row = positions
            .iter()
            .map(|&position| {
                record
                    .get(position)
                    .and_then(|raw| cell(&String::from_utf8_lossy(raw)))
            })
            .collect();
        table.push_row(row);
    }

    if skipped_rows > 0 {
        warn!("skipped {skipped_rows} malformed rows in {path}");
    }
    Ok(LoadedTable {
        table,
        skipped_rows,
    })
}

fn read_xlsx(path: &Utf8Path, keep: &dyn Fn(&str) -> bool) -> Result<LoadedTable, CollectorError> {
    let file = File::open(path.as_std_path()).map_err(|err| table_error(path, err))?;
    let mut archive = ZipArchive::new(file).map_err(|err| table_error(path, err))?;

    let shared_strings = match read_entry(&mut archive, "xl/sharedStrings.xml") {
        Some(xml) => parse_shared_strings(&xml),
        None => Vec::new(),
    };
    let date_styles = match read_entry(&mut archive, "xl/styles.xml") {
        Some(xml) => DateStyles::parse(&xml),
        None => DateStyles::default(),
    };
    let sheet_name = first_sheet_name(&archive).ok_or_else(|| CollectorError::TableRead {
        path: path.to_path_buf(),
        message: "workbook has no worksheets".to_string(),
    })?;
    let sheet = read_entry(&mut archive, &sheet_name).ok_or_else(|| CollectorError::TableRead {
        path: path.to_path_buf(),
        message: format!("unreadable worksheet {sheet_name}"),
    })?;

    let mut rows = parse_sheet_rows(&sheet, &shared_strings, &date_styles).into_iter();
    let headers = rows
        .next()
        .unwrap_or_default()
        .into_iter()
        .map(|value| value.unwrap_or_default())
        .collect::<Vec<_>>();
    let (columns, positions) = select_columns(&headers, keep);
    let mut table = Table::new(columns);
    let mut skipped_rows = 0;

    for (index, row) in rows.enumerate() {
        if row.len() > headers.len() && row[headers.len()..].iter().any(Option::is_some) {
            skipped_rows += 1;
            debug!(
                "{}",
                CollectorError::Parse {
                    path: path.to_path_buf(),
                    line: index as u64 + 2,
                    message: "cells beyond the header row".to_string(),
                }
            );
            continue;
        }
        if row.iter().all(Option::is_none) {
            continue;
        }
        table.push_row(
            positions
                .iter()
                .map(|&position| row.get(position).cloned().flatten())
                .collect(),
        );
    }

    Ok(LoadedTable {
        table,
        skipped_rows,
    })
}

fn select_columns(headers: &[String], keep: &dyn Fn(&str) -> bool) -> (Vec<String>, Vec<usize>) {
    headers
        .iter()
        .enumerate()
        .filter(|(_, name)| keep(name))
        .map(|(position, name)| (name.clone(), position))
        .unzip()
}

fn header_name(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw)
        .trim_start_matches('\u{feff}')
        .trim()
        .to_string()
}

fn table_error(path: &Utf8Path, err: impl std::fmt::Display) -> CollectorError {
    CollectorError::TableRead {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}

fn read_entry(archive: &mut ZipArchive<File>, name: &str) -> Option<String> {
    let mut entry = archive.by_name(name).ok()?;
    let mut content = Vec::new();
    entry.read_to_end(&mut content).ok()?;
    Some(String::from_utf8_lossy(&content).into_owned())
}

fn first_sheet_name(archive: &ZipArchive<File>) -> Option<String> {
    let mut sheets = archive
        .file_names()
        .filter(|name| name.starts_with("xl/worksheets/") && name.ends_with(".xml"))
        .map(str::to_string)
        .collect::<Vec<_>>();
    if let Some(first) = sheets.iter().find(|name| *name == "xl/worksheets/sheet1.xml") {
        return Some(first.clone());
    }
    sheets.sort();
    sheets.into_iter().next()
}

fn parse_shared_strings(xml: &str) -> Vec<String> {
    ITEM_RE
        .captures_iter(xml)
        .map(|caps| text_runs(&caps[1]))
        .collect()
}

/// Which cell styles (`s="N"`, an index into `cellXfs`) carry a date format.
#[derive(Debug, Clone, Default)]
struct DateStyles {
    dated: Vec<bool>,
}

impl DateStyles {
    fn parse(xml: &str) -> Self {
        let custom = NUM_FMT_RE
            .captures_iter(xml)
            .filter_map(|caps| {
                let attrs = &caps[1];
                let id = NUM_FMT_ID_RE.captures(attrs)?[1].parse::<u32>().ok()?;
                let code = FORMAT_CODE_RE.captures(attrs)?[1].to_string();
                Some((id, is_date_format(&unescape(&code))))
            })
            .collect::<Vec<_>>();

        let dated = CELL_XFS_RE
            .captures(xml)
            .map(|caps| {
                XF_RE
                    .captures_iter(&caps[1])
                    .map(|xf| {
                        NUM_FMT_ID_RE
                            .captures(&xf[1])
                            .and_then(|id| id[1].parse::<u32>().ok())
                            .is_some_and(|id| match custom.iter().find(|(known, _)| *known == id) {
                                Some((_, dated)) => *dated,
                                None => is_builtin_date_format(id),
                            })
                    })
                    .collect()
            })
            .unwrap_or_default();
        Self { dated }
    }

    fn is_date(&self, style: usize) -> bool {
        self.dated.get(style).copied().unwrap_or(false)
    }
}

/// Built-in number formats that show a calendar date.
fn is_builtin_date_format(id: u32) -> bool {
    matches!(id, 14..=17 | 22 | 27..=36 | 50..=58)
}

/// A custom format shows a date when a day or year token survives once quoted
/// text, bracketed sections and escaped characters are removed.
fn is_date_format(code: &str) -> bool {
    let tokens = LITERAL_RE.replace_all(code, "").to_ascii_lowercase();
    tokens.contains('y') || tokens.contains('d')
}

/// Days since 1899-12-30 to ISO text, with the time of day when it is not
/// midnight. Out-of-range serials yield `None`.
fn date_serial_to_text(raw: &str) -> Option<String> {
    let serial = raw.trim().parse::<f64>().ok()?;
    if !(0.0..=MAX_DATE_SERIAL).contains(&serial) {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_time(NaiveTime::MIN);
    let seconds = (serial * 86_400.0).round() as i64;
    let datetime = epoch.checked_add_signed(TimeDelta::try_seconds(seconds)?)?;
    let text = if datetime.time() == NaiveTime::MIN {
        datetime.format("%Y-%m-%d").to_string()
    } else {
        datetime.format("%Y-%m-%d %H:%M:%S").to_string()
    };
    Some(text)
}

fn parse_sheet_rows(
    xml: &str,
    shared_strings: &[String],
    date_styles: &DateStyles,
) -> Vec<Vec<Option<String>>> {
    let mut rows = Vec::new();
    for row_caps in ROW_RE.captures_iter(xml) {
        let mut row: Vec<Option<String>> = Vec::new();
        for cell_caps in CELL_RE.captures_iter(&row_caps[1]) {
            let attrs = &cell_caps[1];
            let body = cell_caps.get(2).map(|m| m.as_str()).unwrap_or("");
            let column = REF_RE
                .captures(attrs)
                .map(|caps| column_index(&caps[1]))
                .unwrap_or(row.len());
            let kind = TYPE_RE.captures(attrs).map(|caps| caps[1].to_string());
            let style = STYLE_RE
                .captures(attrs)
                .and_then(|caps| caps[1].parse::<usize>().ok());
            let raw = VALUE_RE.captures(body).map(|caps| unescape(&caps[1]));

            let value = match kind.as_deref() {
                Some("s") => raw
                    .and_then(|index| index.trim().parse::<usize>().ok())
                    .and_then(|index| shared_strings.get(index).cloned()),
                Some("inlineStr") => Some(text_runs(body)),
                None | Some("n") if style.is_some_and(|style| date_styles.is_date(style)) => {
                    raw.map(|raw| date_serial_to_text(&raw).unwrap_or(raw))
                }
                _ => raw,
            };

            if row.len() <= column {
                row.resize(column + 1, None);
            }
            row[column] = value.as_deref().and_then(cell);
        }
        rows.push(row);
    }
    rows
}

fn text_runs(xml: &str) -> String {
    TEXT_RE
        .captures_iter(xml)
        .map(|caps| unescape(&caps[1]))
        .collect()
}

/// Spreadsheet column letters to a zero-based index ("A" -> 0, "AA" -> 26).
fn column_index(letters: &str) -> usize {
    letters
        .bytes()
        .fold(0usize, |acc, b| acc * 26 + (b - b'A' + 1) as usize)
        - 1
}

fn unescape(value: &str) -> String {
    value
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
