use std::{
    cmp::Reverse,
    collections::BTreeMap,
    fmt,
    str::FromStr,
};

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use diesel::sqlite::SqliteConnection;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::db::reports::{ReportFields, ReportFilter, ReportTable};
use crate::error::{AppError, AppResult};
use crate::report_kind::{Column, ColumnType, ReportKind};
use crate::util;


pub const NEWS_PROVINCE_LABEL: &str = "Actualités";
pub const UNKNOWN_PROVINCE_LABEL: &str = "Non spécifié";


pub fn province_label(kind: ReportKind, province: &str) -> String {
    let province = province.trim();
    if !province.is_empty() {
        province.to_owned()
    }
    else if kind == ReportKind::News {
        NEWS_PROVINCE_LABEL.to_owned()
    }
    else {
        UNKNOWN_PROVINCE_LABEL.to_owned()
    }
}


/// Calendar month a report falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct YearMonth {
    pub year: i32,
    pub month: u32,
}

impl YearMonth {
    pub fn of(date: NaiveDate) -> Self {
        YearMonth { year: date.year(), month: date.month() }
    }

    pub fn first_day(self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year, self.month, 1)
    }

    /// "août 2025"
    pub fn label(self) -> String {
        self.first_day()
            .map(util::month_label)
            .unwrap_or_else(|| self.to_string())
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for YearMonth {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (year, month) = s.split_once('-').ok_or("Expected YYYY-MM")?;
        let ym = YearMonth {
            year: year.parse().map_err(|_| "Invalid year")?,
            month: month.parse().map_err(|_| "Invalid month")?,
        };

        match ym.first_day() {
            Some(_) => Ok(ym),
            None => Err("Invalid month"),
        }
    }
}

impl Serialize for YearMonth {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}


/// One report row detached from its table.
#[derive(Debug, Clone)]
pub struct ReportRecord {
    pub kind: ReportKind,
    pub province: String,
    pub date: NaiveDate,
    pub values: Map<String, Value>,
}

impl ReportRecord {
    pub fn from_row<T: ReportTable>(row: &T) -> AppResult<Self> {
        let values = match serde_json::to_value(row)? {
            Value::Object(map) => map,
            _ => return Err(AppError::Export(format!("{} row is not an object", T::KIND))),
        };

        Ok(ReportRecord {
            kind: T::KIND,
            province: province_label(T::KIND, row.fields().province()),
            date: row.fields().report_date(),
            values,
        })
    }

    pub fn month(&self) -> YearMonth {
        YearMonth::of(self.date)
    }

    /// Numeric value of a column, null and missing count as zero.
    pub fn number(&self, key: &str) -> f64 {
        self.values.get(key)
            .and_then(Value::as_f64)
            .unwrap_or(0.0)
    }

    pub fn text(&self, key: &str) -> String {
        match self.values.get(key) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        }
    }

    /// Cell text of a column as printed in exports.
    pub fn display(&self, column: &Column) -> String {
        match column.ty {
            ColumnType::Text | ColumnType::LongText => self.text(column.key),
            ColumnType::Number => match self.values.get(column.key) {
                Some(Value::Null) | None => String::new(),
                _ => util::format_number(self.number(column.key)),
            },
            ColumnType::Date => {
                let raw = self.text(column.key);
                raw.parse::<NaiveDate>()
                    .map(util::format_date)
                    .unwrap_or(raw)
            },
            ColumnType::DateTime => {
                let raw = self.text(column.key);
                raw.parse::<NaiveDateTime>()
                    .map(util::format_date_time)
                    .unwrap_or(raw)
            },
            ColumnType::Images => match self.values.get(column.key) {
                Some(Value::Array(images)) if !images.is_empty() => "Oui".to_owned(),
                _ => "Non".to_owned(),
            },
        }
    }
}


/// Loads every row of `kinds` as records.
pub fn load_records(conn: &mut SqliteConnection, kinds: &[ReportKind], filter: &ReportFilter)
    -> AppResult<Vec<ReportRecord>> {

    let mut records = Vec::new();

    for &kind in kinds {
        crate::with_report_table!(kind, T => {
            for row in T::list(conn, filter)? {
                records.push(ReportRecord::from_row(&row)?);
            }
        });
    }

    Ok(records)
}


#[derive(Debug, Clone, Serialize)]
pub struct ColumnSum {
    pub key: &'static str,
    pub label: &'static str,
    pub sum: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Totals {
    pub count: usize,
    pub sums: Vec<ColumnSum>,
}

impl Totals {
    pub fn sum(&self, key: &str) -> Option<f64> {
        self.sums.iter().find(|s| s.key == key).map(|s| s.sum)
    }
}

/// Row count and per-column sums over the records of `kind`.
pub fn totals<'a, I>(kind: ReportKind, records: I) -> Totals
where
    I: IntoIterator<Item = &'a ReportRecord>,
{
    let mut sums: Vec<ColumnSum> = kind.numeric_columns()
        .map(|c| ColumnSum { key: c.key, label: c.label, sum: 0.0 })
        .collect();
    let mut count = 0;

    for record in records.into_iter().filter(|r| r.kind == kind) {
        count += 1;
        for s in sums.iter_mut() {
            s.sum += record.number(s.key);
        }
    }

    Totals { count, sums }
}


#[derive(Debug)]
pub struct MonthGroup {
    pub month: YearMonth,
    pub records: Vec<ReportRecord>,
}

impl MonthGroup {
    /// Records split by kind in the canonical kind order; empty kinds are skipped.
    pub fn by_kind(&self) -> Vec<(ReportKind, Vec<&ReportRecord>)> {
        ReportKind::ALL.iter()
            .map(|&kind| (kind, self.records.iter().filter(|r| r.kind == kind).collect::<Vec<_>>()))
            .filter(|(_, records)| !records.is_empty())
            .collect()
    }
}

#[derive(Debug)]
pub struct ProvinceGroup {
    pub province: String,
    pub months: Vec<MonthGroup>,
}

/// Groups by province (ascending) then month (newest first).
pub fn group_records(records: Vec<ReportRecord>) -> Vec<ProvinceGroup> {
    let mut tree: BTreeMap<String, BTreeMap<Reverse<YearMonth>, Vec<ReportRecord>>> = BTreeMap::new();

    for record in records {
        tree.entry(record.province.clone())
            .or_default()
            .entry(Reverse(record.month()))
            .or_default()
            .push(record);
    }

    tree.into_iter()
        .map(|(province, months)| ProvinceGroup {
            province,
            months: months.into_iter()
                .map(|(Reverse(month), mut records)| {
                    records.sort_by(|a, b| b.date.cmp(&a.date));
                    MonthGroup { month, records }
                })
                .collect(),
        })
        .collect()
}

/// Per-province totals of a single kind, provinces ascending.
pub fn province_totals(kind: ReportKind, records: &[ReportRecord]) -> Vec<(String, Totals)> {
    let mut by_province: BTreeMap<&str, Vec<&ReportRecord>> = BTreeMap::new();
    for record in records.iter().filter(|r| r.kind == kind) {
        by_province.entry(record.province.as_str()).or_default().push(record);
    }

    by_province.into_iter()
        .map(|(province, records)| (province.to_owned(), totals(kind, records)))
        .collect()
}


#[cfg(test)]
pub(crate) mod tests {
    use serde_json::json;

    use super::*;

    pub fn record(kind: ReportKind, province: &str, date: &str, values: Value) -> ReportRecord {
        let date: NaiveDate = date.parse().unwrap();
        let mut values = match values {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        values.insert("province".into(), json!(province));
        values.insert("report_date".into(), json!(date.to_string()));

        ReportRecord {
            kind,
            province: province_label(kind, province),
            date,
            values,
        }
    }

    #[test]
    fn months_sort_by_calendar_not_by_label() {
        let groups = group_records(vec![
            record(ReportKind::Flood, "LAC", "2024-12-03", json!({})),
            record(ReportKind::Flood, "LAC", "2025-02-10", json!({})),
            record(ReportKind::Flood, "LAC", "2025-10-01", json!({})),
        ]);

        let months: Vec<_> = groups[0].months.iter().map(|m| m.month.to_string()).collect();
        assert_eq!(months, vec!["2025-10", "2025-02", "2024-12"]);
    }

    #[test]
    fn provinces_sort_ascending_with_fallback_labels() {
        let groups = group_records(vec![
            record(ReportKind::Flood, "SALAMAT", "2025-08-01", json!({})),
            record(ReportKind::News, "", "2025-08-01", json!({})),
            record(ReportKind::Cholera, "", "2025-08-01", json!({})),
            record(ReportKind::Flood, "BATHA", "2025-08-01", json!({})),
        ]);

        let provinces: Vec<_> = groups.iter().map(|g| g.province.as_str()).collect();
        assert_eq!(provinces, vec!["Actualités", "BATHA", "Non spécifié", "SALAMAT"]);
    }

    #[test]
    fn totals_equal_column_sums() {
        let records = vec![
            record(ReportKind::Flood, "LAC", "2025-08-01", json!({ "deaths": 2, "flooded_area": 1.5 })),
            record(ReportKind::Flood, "LAC", "2025-08-09", json!({ "deaths": 5, "flooded_area": 2.0 })),
            record(ReportKind::Flood, "LAC", "2025-08-20", json!({ "deaths": 0 })),
            record(ReportKind::Cholera, "LAC", "2025-08-20", json!({ "deaths": 100 })),
        ];

        let t = totals(ReportKind::Flood, &records);
        assert_eq!(t.count, 3);
        assert_eq!(t.sum("deaths"), Some(7.0));
        assert_eq!(t.sum("flooded_area"), Some(3.5));
        assert_eq!(t.sum("affected"), Some(0.0));
        assert_eq!(t.sum("cases"), None);
    }

    #[test]
    fn null_amounts_count_as_zero() {
        let records = vec![
            record(ReportKind::Aid, "LAC", "2025-08-01", json!({ "amount": null })),
            record(ReportKind::Aid, "LAC", "2025-08-02", json!({ "amount": 250.0 })),
        ];

        assert_eq!(totals(ReportKind::Aid, &records).sum("amount"), Some(250.0));
    }

    #[test]
    fn cells_render_for_export() {
        let r = record(ReportKind::Flood, "LAC", "2025-08-14", json!({
            "deaths": 3,
            "images": ["/static/images/inondations/a.png"],
            "created_at": "2025-08-14T09:30:00",
        }));
        let columns = ReportKind::Flood.columns();
        let cell = |key: &str| r.display(columns.iter().find(|c| c.key == key).unwrap());

        assert_eq!(cell("report_date"), "14/08/2025");
        assert_eq!(cell("deaths"), "3");
        assert_eq!(cell("images"), "Oui");
        assert_eq!(cell("created_at"), "14/08/2025 09:30");
    }

    #[test]
    fn year_month_parsing() {
        assert_eq!("2025-08".parse::<YearMonth>(), Ok(YearMonth { year: 2025, month: 8 }));
        assert!("2025-13".parse::<YearMonth>().is_err());
        assert!("august".parse::<YearMonth>().is_err());
        assert_eq!(YearMonth { year: 2025, month: 10 }.label(), "octobre 2025");
    }

    #[test]
    fn per_province_totals() {
        let records = vec![
            record(ReportKind::SocialAction, "KANEM", "2025-08-01", json!({ "participants_men": 4 })),
            record(ReportKind::SocialAction, "BATHA", "2025-08-01", json!({ "participants_men": 1 })),
            record(ReportKind::SocialAction, "KANEM", "2025-08-02", json!({ "participants_men": 6 })),
        ];

        let by_province = province_totals(ReportKind::SocialAction, &records);
        assert_eq!(by_province[0].0, "BATHA");
        assert_eq!(by_province[1].1.count, 2);
        assert_eq!(by_province[1].1.sum("participants_men"), Some(10.0));
    }
}
