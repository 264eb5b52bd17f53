use std::{
    sync::{Arc, RwLock},
    time::{Duration, Instant},
};

use chrono::{Local, NaiveDate};
use diesel::Connection;
use log::{info, warn};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::aggregate::{self, ReportRecord};
use crate::config::Config;
use crate::db::{
    models::{Account, ImageList},
    reports::{ReportFields, ReportFilter, ReportTable},
    Db,
};
use crate::error::{AppError, AppResult};
use crate::image_store;
use crate::report_kind::{is_known_province, ReportKind};
use crate::task_scheduler::{Task, TaskSchedulerBuilder};


const CACHE_VALID_DURATION: u64 = 30; // seconds
const SUMMARY_LATEST: i64 = 6;
const STAGING_MAX_AGE: u64 = 24 * 60 * 60; // seconds


/// Body of a submission or edit: the row fields plus its images.
/// On submit `images` holds staged keys; on edit it may also hold the
/// public URLs of images to keep.
#[derive(Deserialize)]
#[serde(bound = "F: ReportFields")]
pub struct ReportInput<F> {
    #[serde(flatten)]
    pub fields: F,
    #[serde(default)]
    pub images: Vec<String>,
}


struct SummarySlot {
    data: Option<Value>,
    created_time: Instant,
    // Bumped by every invalidation; a summary built before a bump is dropped.
    generation: u64,
}

impl SummarySlot {
    fn is_valid(&self) -> bool {
        self.data.is_some()
            && self.created_time.elapsed() <= Duration::new(CACHE_VALID_DURATION, 0)
    }
}

/// Home page summary shared by the routes and the refresh job.
#[derive(Clone)]
pub struct SummaryCache {
    slot: Arc<RwLock<SummarySlot>>,
}

impl SummaryCache {
    pub fn new() -> Self {
        SummaryCache {
            slot: Arc::new(RwLock::new(SummarySlot {
                data: None,
                created_time: Instant::now(),
                generation: 0,
            })),
        }
    }

    pub fn get(&self, db: &Db) -> AppResult<Value> {
        if let Ok(slot) = self.slot.read() {
            if slot.is_valid() {
                if let Some(data) = &slot.data {
                    return Ok(data.clone());
                }
            }
        }

        let generation = self.generation();
        let data = make_summary(db)?;
        self.update(generation, data.clone());
        Ok(data)
    }

    fn generation(&self) -> u64 {
        self.slot.read().map(|slot| slot.generation).unwrap_or(0)
    }

    /// Stores a summary built while `generation` was current.
    fn update(&self, generation: u64, data: Value) {
        match self.slot.write() {
            Ok(mut slot) => {
                if slot.generation != generation {
                    return;
                }
                slot.data = Some(data);
                slot.created_time = Instant::now();
            },
            Err(err) => warn!("Summary cache poisoned: {}", err),
        }
    }

    pub fn invalidate(&self) {
        if let Ok(mut slot) = self.slot.write() {
            slot.data = None;
            slot.generation += 1;
        }
    }
}

impl Default for SummaryCache {
    fn default() -> Self {
        SummaryCache::new()
    }
}


pub fn init_report_sys(scheduler: &mut TaskSchedulerBuilder, db: &Db, config: &Config,
    cache: &SummaryCache) {

    let (t_db, t_cache) = (db.clone(), cache.clone());
    scheduler.add_task(Task::new("summary refresh", move || {
        let generation = t_cache.generation();
        match make_summary(&t_db) {
            Ok(data) => {
                t_cache.update(generation, data);
                Duration::new(CACHE_VALID_DURATION, 0)
            },
            Err(err) => {
                warn!("Fail to refresh summary: {}", err);
                Duration::new(5, 0)
            },
        }
    }, Duration::new(1, 0)));

    let t_config = config.clone();
    scheduler.add_task(Task::new("upload cleanup", move || {
        if let Err(err) = image_store::purge_stale_staging(&t_config, Duration::new(STAGING_MAX_AGE, 0)) {
            warn!("Fail to clean staged uploads: {}", err);
        }
        Duration::new(60 * 60, 0)
    }, Duration::new(5 * 60, 0)));
}

/// Per-kind row count and latest rows.
pub fn make_summary(db: &Db) -> AppResult<Value> {
    let mut conn = db.conn()?;
    let mut kinds = Vec::with_capacity(ReportKind::ALL.len());

    for &kind in ReportKind::ALL.iter() {
        let (count, latest) = crate::with_report_table!(kind, T => {
            let count = T::count(&mut conn)?;
            let latest = T::list(&mut conn, &ReportFilter {
                limit: Some(SUMMARY_LATEST),
                ..Default::default()
            })?;
            (count, serde_json::to_value(latest)?)
        });

        kinds.push(json!({
            "kind": kind,
            "label": kind.label(),
            "count": count,
            "latest": latest,
        }));
    }

    Ok(json!({ "kinds": kinds }))
}


/// Forces the province and signer a user is allowed to file under.
fn apply_identity<F: ReportFields>(kind: ReportKind, fields: &mut F, user: &Account,
    fallback_signer: Option<&str>) -> AppResult<()> {

    if user.is_admin() {
        let province = fields.province().trim().to_owned();
        if province.is_empty() {
            if kind.requires_province() {
                return Err(AppError::invalid("Province is required"));
            }
        }
        else if !is_known_province(&province) {
            return Err(AppError::invalid("Unknown province"));
        }
        fields.set_province(province);

        let signer = fields.signer().trim().to_owned();
        let signer = if signer.is_empty() {
            fallback_signer.unwrap_or(&user.display_name).to_owned()
        }
        else {
            signer
        };
        fields.set_signer(signer);
    }
    else {
        if user.province.is_empty() {
            return Err(AppError::invalid("Your account is not attached to a province"));
        }
        fields.set_province(user.province.clone());
        fields.set_signer(user.display_name.clone());
    }

    Ok(())
}

fn check_image_count(config: &Config, cnt: usize) -> AppResult<()> {
    if cnt > config.max_images {
        Err(AppError::Invalid(format!("At most {} images per report", config.max_images)))
    }
    else {
        Ok(())
    }
}

/// Validates a new report, publishes its staged images and stores the row.
/// Published images are removed again when the row can not be stored.
pub fn submit<T: ReportTable>(db: &Db, config: &Config, user: &Account,
    input: ReportInput<T::Fields>) -> AppResult<T> {

    let ReportInput { mut fields, images } = input;

    apply_identity(T::KIND, &mut fields, user, None)?;
    if let Some(err) = fields.verify_error() {
        return Err(AppError::invalid(err));
    }
    check_image_count(config, images.len())?;

    let mut conn = db.conn()?;

    let urls = image_store::promote(config, T::KIND, &images)?;
    let result = T::insert(&mut conn, &fields, &ImageList(urls.clone()), user.id,
        Local::now().naive_local());

    match result {
        Ok(row) => {
            info!("{} filed {} report {} with {} images", user.username, T::KIND, row.id(), urls.len());
            Ok(row)
        },
        Err(err) => {
            warn!("Fail to store {} report: {}", T::KIND, err);
            image_store::remove_public(config, &urls);
            Err(err.into())
        },
    }
}

pub fn parse_input<F: ReportFields>(body: Value) -> AppResult<ReportInput<F>> {
    serde_json::from_value(body).map_err(|err| AppError::invalid(err.to_string()))
}

// An edit without a date keeps the row in its month.
fn with_original_date(mut body: Value, date: NaiveDate) -> Value {
    if let Value::Object(map) = &mut body {
        map.entry("report_date").or_insert_with(|| json!(date));
    }
    body
}

/// Replaces the fields of a report. `images` in the body is the final image
/// list: public URLs already on the row are kept, anything else is a staged key.
/// Images dropped from the row are deleted once the row is updated.
pub fn edit<T: ReportTable>(db: &Db, config: &Config, user: &Account, id: i32,
    body: Value) -> AppResult<T> {

    let mut conn = db.conn()?;
    let original = T::find(&mut conn, id)?;

    if !user.is_admin() && original.created_by() != user.id {
        return Err(AppError::Forbidden);
    }

    let body = with_original_date(body, original.fields().report_date());
    let ReportInput { mut fields, images } = parse_input::<T::Fields>(body)?;

    apply_identity(T::KIND, &mut fields, user, Some(original.fields().signer()))?;
    if let Some(err) = fields.verify_error() {
        return Err(AppError::invalid(err));
    }
    check_image_count(config, images.len())?;

    let (kept, new_keys): (Vec<&String>, Vec<&String>) = images.iter()
        .partition(|img| original.images().contains(img));

    if let Some(url) = new_keys.iter().find(|k| k.starts_with('/')) {
        warn!("Image {} does not belong to {} report {}", url, T::KIND, id);
        return Err(AppError::invalid("Unknown image"));
    }

    let removed: Vec<String> = original.images().0.iter()
        .filter(|url| !kept.contains(url))
        .cloned()
        .collect();

    let new_keys: Vec<String> = new_keys.into_iter().cloned().collect();
    let new_urls = image_store::promote(config, T::KIND, &new_keys)?;

    // Keep the order the client sent.
    let mut promoted = new_urls.iter();
    let final_images: Vec<String> = images.iter()
        .map(|img| {
            if original.images().contains(img) {
                img.clone()
            }
            else {
                promoted.next().cloned().unwrap_or_default()
            }
        })
        .collect();

    match T::update(&mut conn, id, &fields, &ImageList(final_images)) {
        Ok(row) => {
            image_store::remove_public(config, &removed);
            info!("{} edited {} report {} (+{} -{} images)",
                user.username, T::KIND, id, new_urls.len(), removed.len());
            Ok(row)
        },
        Err(err) => {
            warn!("Fail to update {} report {}: {}", T::KIND, id, err);
            image_store::remove_public(config, &new_urls);
            Err(err.into())
        },
    }
}

pub fn delete<T: ReportTable>(db: &Db, config: &Config, id: i32) -> AppResult<()> {
    let mut conn = db.conn()?;
    let row = T::find(&mut conn, id)?;

    if T::delete(&mut conn, id)? == 0 {
        return Err(AppError::NotFound);
    }
    image_store::remove_public(config, &row.images().0);

    Ok(())
}

/// Empties every report table in one transaction, then deletes their images.
pub fn clear_all(db: &Db, config: &Config) -> AppResult<usize> {
    let mut conn = db.conn()?;

    let (cnt, images) = conn.transaction::<_, AppError, _>(|conn| {
        let mut cnt = 0;
        let mut images = Vec::new();

        for &kind in ReportKind::ALL.iter() {
            crate::with_report_table!(kind, T => {
                for row in T::list(conn, &ReportFilter::default())? {
                    images.extend(row.images().0.iter().cloned());
                }
                cnt += T::clear(conn)?;
            });
        }

        Ok((cnt, images))
    })?;

    image_store::remove_public(config, &images);

    Ok(cnt)
}

pub fn list<T: ReportTable>(db: &Db, filter: &ReportFilter) -> AppResult<Vec<T>> {
    let mut conn = db.conn()?;
    Ok(T::list(&mut conn, filter)?)
}

pub fn find<T: ReportTable>(db: &Db, id: i32) -> AppResult<T> {
    let mut conn = db.conn()?;
    Ok(T::find(&mut conn, id)?)
}

/// Per-province count and numeric sums of one kind.
pub fn province_totals(db: &Db, kind: ReportKind) -> AppResult<Value> {
    let mut conn = db.conn()?;
    let records: Vec<ReportRecord> = aggregate::load_records(&mut conn, &[kind], &ReportFilter::default())?;

    let provinces: Vec<Value> = aggregate::province_totals(kind, &records)
        .into_iter()
        .map(|(province, totals)| json!({
            "province": province,
            "totals": totals,
        }))
        .collect();

    Ok(json!({
        "kind": kind,
        "label": kind.label(),
        "provinces": provinces,
    }))
}


#[cfg(test)]
mod tests {
    use std::fs;

    use diesel::RunQueryDsl;

    use super::*;
    use crate::db::{accounts, models::{Flood, FloodFields, News, NewsFields}};
    use crate::image_store::tests::PNG_URI;

    fn setup() -> (tempfile::TempDir, Config, Db, Account) {
        let root = tempfile::tempdir().unwrap();
        let config = Config::for_tests(root.path());
        let db = Db::open(&config.database_url, 2).unwrap();
        crate::auth_sys::bootstrap_admin(&db, &config).unwrap();

        let admin = {
            let mut conn = db.conn().unwrap();
            accounts::find_by_identifier(&mut conn, "MASSAH").unwrap().unwrap()
        };

        (root, config, db, admin)
    }

    fn delegate(province: &str) -> Account {
        Account {
            id: 99,
            username: "ali".into(),
            email: "ali@portal.local".into(),
            display_name: "Ali Delegate".into(),
            province: province.into(),
            role: "delegate".into(),
            password_hash: String::new(),
            created_at: Local::now().naive_local(),
        }
    }

    fn flood_body(province: &str, images: Vec<String>) -> Value {
        json!({
            "province": province,
            "prefecture": "Bol",
            "city": "Bol",
            "report_date": "2025-08-14",
            "signer": "Someone Else",
            "images": images,
        })
    }

    fn flood_input(province: &str, images: Vec<String>) -> ReportInput<FloodFields> {
        parse_input(flood_body(province, images)).unwrap()
    }

    #[test]
    fn failed_insert_removes_published_images() {
        let (_root, config, db, admin) = setup();
        let key = image_store::stage_data_uri(&config, PNG_URI).unwrap();

        {
            let mut conn = db.conn().unwrap();
            diesel::sql_query("DROP TABLE floods").execute(&mut *conn).unwrap();
        }

        assert!(submit::<Flood>(&db, &config, &admin, flood_input("LAC", vec![key])).is_err());

        let public = config.image_public_dir().join("inondations");
        assert_eq!(fs::read_dir(public).unwrap().count(), 0);
    }

    #[test]
    fn identity_rules_per_role() {
        let (_root, _config, _db, admin) = setup();

        let mut fields = flood_input("SALAMAT", vec![]).fields;
        apply_identity(ReportKind::Flood, &mut fields, &delegate("LAC"), None).unwrap();
        assert_eq!(fields.province, "LAC");
        assert_eq!(fields.signer, "Ali Delegate");

        let mut fields = flood_input("SALAMAT", vec![]).fields;
        assert!(apply_identity(ReportKind::Flood, &mut fields, &delegate(""), None).is_err());

        let mut fields = flood_input(" SALAMAT ", vec![]).fields;
        apply_identity(ReportKind::Flood, &mut fields, &admin, None).unwrap();
        assert_eq!(fields.province, "SALAMAT");
        assert_eq!(fields.signer, "Someone Else");

        let mut news: NewsFields = serde_json::from_value(json!({ "title": "Avis" })).unwrap();
        apply_identity(ReportKind::News, &mut news, &admin, None).unwrap();
        assert_eq!(news.province, "");
        assert_eq!(news.signer, "MASSAH");
    }

    #[test]
    fn edits_keep_the_original_signer_when_none_is_given() {
        let (_root, config, db, admin) = setup();

        let row = submit::<News>(&db, &config, &admin, serde_json::from_value(json!({
            "title": "Avis", "signer": "Le Ministre",
        })).unwrap()).unwrap();

        let edited = edit::<News>(&db, &config, &admin, row.id, json!({
            "title": "Avis modifié",
        })).unwrap();

        assert_eq!(edited.fields.title, "Avis modifié");
        assert_eq!(edited.fields.signer, "Le Ministre");
    }

    #[test]
    fn cache_serves_until_invalidated() {
        let (_root, config, db, admin) = setup();
        let cache = SummaryCache::new();

        assert_eq!(cache.get(&db).unwrap()["kinds"][0]["count"], 0);
        submit::<Flood>(&db, &config, &admin, flood_input("LAC", vec![])).unwrap();
        assert_eq!(cache.get(&db).unwrap()["kinds"][0]["count"], 0);

        cache.invalidate();
        assert_eq!(cache.get(&db).unwrap()["kinds"][0]["count"], 1);
    }

    #[test]
    fn edits_without_a_date_stay_in_their_month() {
        let (_root, config, db, admin) = setup();

        let row = submit::<News>(&db, &config, &admin, parse_input(json!({
            "title": "Avis", "report_date": "2024-03-05",
        })).unwrap()).unwrap();

        let edited = edit::<News>(&db, &config, &admin, row.id, json!({
            "title": "Avis modifié",
        })).unwrap();
        assert_eq!(edited.fields.report_date, NaiveDate::from_ymd_opt(2024, 3, 5).unwrap());

        let moved = edit::<News>(&db, &config, &admin, row.id, json!({
            "title": "Avis modifié", "report_date": "2024-04-01",
        })).unwrap();
        assert_eq!(moved.fields.report_date, NaiveDate::from_ymd_opt(2024, 4, 1).unwrap());
    }

    #[test]
    fn failed_update_keeps_the_row_and_drops_new_images() {
        let (_root, config, db, admin) = setup();

        let key = image_store::stage_data_uri(&config, PNG_URI).unwrap();
        let row = submit::<Flood>(&db, &config, &admin, flood_input("LAC", vec![key])).unwrap();
        let kept = row.images.0[0].clone();

        {
            let mut conn = db.conn().unwrap();
            diesel::sql_query("CREATE TRIGGER floods_locked BEFORE UPDATE ON floods \
                BEGIN SELECT RAISE(ABORT, 'locked'); END;")
                .execute(&mut *conn)
                .unwrap();
        }

        let new_key = image_store::stage_data_uri(&config, PNG_URI).unwrap();
        let mut body = flood_body("LAC", vec![kept.clone(), new_key]);
        body["city"] = json!("Baga Sola");
        assert!(edit::<Flood>(&db, &config, &admin, row.id, body).is_err());

        let public = config.image_public_dir().join("inondations");
        assert_eq!(fs::read_dir(public).unwrap().count(), 1);
        assert!(image_store::url_to_path(&config, &kept).unwrap().exists());

        let stored = find::<Flood>(&db, row.id).unwrap();
        assert_eq!(stored.fields.city, "Bol");
        assert_eq!(stored.images.0, vec![kept]);
    }

    #[test]
    fn summaries_built_before_a_mutation_are_dropped() {
        let (_root, config, db, admin) = setup();
        let cache = SummaryCache::new();

        let generation = cache.generation();
        let stale = make_summary(&db).unwrap();

        submit::<Flood>(&db, &config, &admin, flood_input("LAC", vec![])).unwrap();
        cache.invalidate();
        cache.update(generation, stale);

        assert_eq!(cache.get(&db).unwrap()["kinds"][0]["count"], 1);
    }
}
