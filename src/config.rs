use std::{
    env,
    fmt::Display,
    path::PathBuf,
    str::FromStr,
};

use log::{info, warn, LevelFilter};


pub const DEFAULT_MINISTRY_NAME: &str =
    "Ministère de l'Action Sociale, de la Solidarité et des Affaires Humanitaires";


/// Admin account created at startup when the database has none.
#[derive(Clone)]
pub struct AdminBootstrap {
    pub username: String,
    pub password: String,
    pub email: String,
}

#[derive(Clone)]
pub struct Config {
    pub database_url: String,
    pub db_pool_size: u32,
    pub static_dir: PathBuf,
    pub upload_dir: PathBuf,
    pub upload_limit: usize,
    pub max_images: usize,
    pub session_ttl_hours: i64,
    pub password_cost: u32,
    pub admin: Option<AdminBootstrap>,
    pub pdf_font_path: Option<PathBuf>,
    pub pdf_logo_path: Option<PathBuf>,
    pub ministry_name: String,
    pub background_jobs: bool,
}

impl Config {
    pub fn load() -> Result<Self, String> {
        let admin = match (optional("ADMIN_ID"), optional("ADMIN_PWD")) {
            (Some(username), Some(password)) => {
                let email = optional("ADMIN_EMAIL")
                    .unwrap_or_else(|| format!("{}@portal.local", username.to_lowercase()));
                Some(AdminBootstrap { username, password, email })
            },
            (Some(_), None) | (None, Some(_)) => {
                warn!("ADMIN_ID and ADMIN_PWD must be set together, skipping admin bootstrap");
                None
            },
            (None, None) => None,
        };

        Ok(Config {
            database_url: try_load("DATABASE_URL", "portal.db")?,
            db_pool_size: try_load("DB_POOL_SIZE", "8")?,
            static_dir: try_load("STATIC_DIR", "static/")?,
            upload_dir: try_load("IMAGE_UPLOAD_DIR", "upload/images/")?,
            upload_limit: try_load("IMAGE_UPLOAD_LIMIT", &((8 * 1024 * 1024 / 3) * 4).to_string())?,
            max_images: try_load("MAX_IMAGES_PER_REPORT", "3")?,
            session_ttl_hours: try_load("SESSION_TTL_HOURS", "12")?,
            password_cost: try_load("PASSWORD_COST", &bcrypt::DEFAULT_COST.to_string())?,
            admin,
            pdf_font_path: optional("PDF_FONT_PATH").map(PathBuf::from),
            pdf_logo_path: optional("PDF_LOGO_PATH").map(PathBuf::from),
            ministry_name: optional("MINISTRY_NAME")
                .unwrap_or_else(|| DEFAULT_MINISTRY_NAME.to_owned()),
            background_jobs: try_load("BACKGROUND_JOBS", "true")?,
        })
    }

    /// Public directory holding promoted report images.
    pub fn image_public_dir(&self) -> PathBuf {
        self.static_dir.join(crate::image_store::IMAGE_PUBLIC_DIR)
    }

    #[cfg(test)]
    pub fn for_tests(root: &std::path::Path) -> Self {
        Config {
            database_url: root.join("portal.db").to_string_lossy().into_owned(),
            db_pool_size: 4,
            static_dir: root.join("static"),
            upload_dir: root.join("upload/images"),
            upload_limit: 64 * 1024,
            max_images: 3,
            session_ttl_hours: 1,
            password_cost: bcrypt::DEFAULT_COST.min(4),
            admin: Some(AdminBootstrap {
                username: "MASSAH".into(),
                password: "admin-secret".into(),
                email: "admin@portal.local".into(),
            }),
            pdf_font_path: None,
            pdf_logo_path: None,
            ministry_name: DEFAULT_MINISTRY_NAME.into(),
            background_jobs: false,
        }
    }
}


/// Read ahead of `Config::load` so the logger is up before anything else logs.
pub fn log_level() -> Result<LevelFilter, String> {
    try_load("LOG_LEVEL", "info")
}

fn optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn try_load<T: FromStr>(key: &str, default: &str) -> Result<T, String>
where
    T::Err: Display,
{
    let raw = optional(key).unwrap_or_else(|| {
        info!("{} not set, using default: {}", key, default);
        default.to_owned()
    });

    raw.parse().map_err(|err| {
        warn!("Invalid {} value: {}", key, err);
        format!("Environment misconfigured: {}={}", key, raw)
    })
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn try_load_falls_back_to_default() {
        let port: u16 = try_load("PORTAL_TEST_UNSET_PORT", "8000").unwrap();
        assert_eq!(port, 8000);
    }

    #[test]
    fn try_load_reports_malformed_value() {
        env::set_var("PORTAL_TEST_BAD_SIZE", "eight");
        let result: Result<u32, String> = try_load("PORTAL_TEST_BAD_SIZE", "8");
        env::remove_var("PORTAL_TEST_BAD_SIZE");

        assert!(result.unwrap_err().contains("PORTAL_TEST_BAD_SIZE"));
    }

    #[test]
    fn blank_values_count_as_unset() {
        env::set_var("PORTAL_TEST_BLANK", "   ");
        assert_eq!(optional("PORTAL_TEST_BLANK"), None);
        env::remove_var("PORTAL_TEST_BLANK");
    }
}
