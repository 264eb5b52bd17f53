use chrono::{Datelike, NaiveDate, NaiveDateTime};
use rand::{distributions, thread_rng, Rng};


const MONTH_NAMES: [&str; 12] = [
    "janvier", "février", "mars", "avril", "mai", "juin",
    "juillet", "août", "septembre", "octobre", "novembre", "décembre",
];


pub fn generate_rand_id(length: usize) -> String {
    thread_rng()
        .sample_iter(&distributions::Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}

/// "octobre 2025"
pub fn month_label(date: NaiveDate) -> String {
    format!("{} {}", MONTH_NAMES[date.month0() as usize], date.year())
}

pub fn format_date(date: NaiveDate) -> String {
    date.format("%d/%m/%Y").to_string()
}

pub fn format_date_time(time: NaiveDateTime) -> String {
    time.format("%d/%m/%Y %H:%M").to_string()
}

/// Whole numbers print without a fractional part.
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    }
    else {
        format!("{:.2}", value)
    }
}
