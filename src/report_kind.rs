use std::{collections::HashMap, fmt};

use rocket::request::FromParam;
use serde::{Serialize, Serializer};


pub const PROVINCES: [&str; 23] = [
    "BATHA", "BAHR EL GAZEL", "BOURKOUMI", "CHARI BAGUIRMI", "GUERA", "HADJER LAMIS", "KANEM",
    "LAC", "LAGONE ORIENTAL", "LAGONE OCCIDENTAL", "MANDOUL", "MAYO KEBBI EST", "MAYO KEBBI OUEST",
    "MAYO KEBBI", "MOYEN CHARI", "NDJAMENA", "OUADDAI", "SALAMAT", "SIILA", "TANDJILE",
    "TIBESTI", "WADI FIRA", "ENNEDI",
];

pub fn is_known_province(name: &str) -> bool {
    PROVINCES.iter().any(|&p| p == name)
}


lazy_static! {
    static ref KIND_BY_SLUG: HashMap<&'static str, ReportKind> = {
        ReportKind::ALL.iter().map(|&kind| (kind.slug(), kind)).collect()
    };
}


#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ReportKind {
    Flood,
    Cholera,
    Aid,
    Humanitarian,
    SocialAction,
    News,
}

impl ReportKind {
    pub const ALL: [ReportKind; 6] = [
        ReportKind::Flood,
        ReportKind::Cholera,
        ReportKind::Aid,
        ReportKind::Humanitarian,
        ReportKind::SocialAction,
        ReportKind::News,
    ];

    pub fn from_slug(slug: &str) -> Option<Self> {
        KIND_BY_SLUG.get(slug).copied()
    }

    pub fn slug(self) -> &'static str {
        match self {
            ReportKind::Flood => "inondations",
            ReportKind::Cholera => "cholera",
            ReportKind::Aid => "aides",
            ReportKind::Humanitarian => "affaires-humanitaires",
            ReportKind::SocialAction => "action-sociale",
            ReportKind::News => "actualites",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ReportKind::Flood => "Inondations",
            ReportKind::Cholera => "Choléra",
            ReportKind::Aid => "Aides",
            ReportKind::Humanitarian => "Affaires Humanitaires",
            ReportKind::SocialAction => "Action Sociale",
            ReportKind::News => "Actualités",
        }
    }

    /// News items may be filed without a province.
    pub fn requires_province(self) -> bool {
        self != ReportKind::News
    }

    pub fn columns(self) -> &'static [Column] {
        match self {
            ReportKind::Flood => FLOOD_COLUMNS,
            ReportKind::Cholera => CHOLERA_COLUMNS,
            ReportKind::Aid => AID_COLUMNS,
            ReportKind::Humanitarian => HUMANITARIAN_COLUMNS,
            ReportKind::SocialAction => SOCIAL_ACTION_COLUMNS,
            ReportKind::News => NEWS_COLUMNS,
        }
    }

    pub fn numeric_columns(self) -> impl Iterator<Item = &'static Column> {
        self.columns().iter().filter(|c| c.ty == ColumnType::Number)
    }
}

impl fmt::Display for ReportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

impl Serialize for ReportKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.slug())
    }
}

impl<'a> FromParam<'a> for ReportKind {
    type Error = &'a str;

    fn from_param(param: &'a str) -> Result<Self, Self::Error> {
        ReportKind::from_slug(param).ok_or(param)
    }
}


#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Text,
    Number,
    Date,
    DateTime,
    Images,
    LongText,
}

#[derive(Debug)]
pub struct Column {
    pub key: &'static str,
    pub label: &'static str,
    pub ty: ColumnType,
}

const fn col(key: &'static str, label: &'static str, ty: ColumnType) -> Column {
    Column { key, label, ty }
}

use ColumnType::*;

const FLOOD_COLUMNS: &[Column] = &[
    col("id", "ID", Text),
    col("province", "Province", Text),
    col("prefecture", "Département", Text),
    col("sub_prefecture", "Sous-préfecture", Text),
    col("city", "Ville", Text),
    col("report_date", "Date", Date),
    col("affected", "Affectés", Number),
    col("households", "Ménages", Number),
    col("missing", "Disparus", Number),
    col("injured", "Blessés", Number),
    col("deaths", "Décès", Number),
    col("displaced", "Déplacés", Number),
    col("houses_destroyed", "Maisons détruites", Number),
    col("houses_damaged", "Maisons endommagées", Number),
    col("livestock_lost", "Bétail perdu", Number),
    col("livestock_dead", "Bétail mort", Number),
    col("flooded_area", "Superficie inondée (ha)", Number),
    col("description", "Description", LongText),
    col("signer", "Signataire", Text),
    col("images", "Images", Images),
    col("created_at", "Créé le", DateTime),
];

const CHOLERA_COLUMNS: &[Column] = &[
    col("id", "ID", Text),
    col("province", "Province", Text),
    col("prefecture", "Département", Text),
    col("sub_prefecture", "Sous-préfecture", Text),
    col("city", "Ville", Text),
    col("report_date", "Date", Date),
    col("cases", "Cas", Number),
    col("deaths", "Décès", Number),
    col("recovered", "Guéris", Number),
    col("hospitalized", "Hospitalisés", Number),
    col("vaccinated", "Vaccinés", Number),
    col("discharged", "Sorties", Number),
    col("patients_in_bed", "Patients au lit", Number),
    col("community_deaths", "Décès communautaires", Number),
    col("description", "Description", LongText),
    col("signer", "Signataire", Text),
    col("images", "Images", Images),
    col("created_at", "Créé le", DateTime),
];

const AID_COLUMNS: &[Column] = &[
    col("id", "ID", Text),
    col("province", "Province", Text),
    col("prefecture", "Département", Text),
    col("city", "Ville", Text),
    col("report_date", "Date", Date),
    col("aid_type", "Type d'aide", Text),
    col("organization", "Organisme", Text),
    col("beneficiary_count", "Bénéficiaires", Number),
    col("beneficiaries", "Type de bénéficiaires", Text),
    col("amount", "Montant", Number),
    col("description", "Description", LongText),
    col("signer", "Signataire", Text),
    col("images", "Images", Images),
    col("created_at", "Créé le", DateTime),
];

const HUMANITARIAN_COLUMNS: &[Column] = &[
    col("id", "ID", Text),
    col("province", "Province", Text),
    col("prefecture", "Département", Text),
    col("city", "Ville", Text),
    col("report_date", "Date Intervention", Date),
    col("aid_type", "Type d'aide", Text),
    col("beneficiaries_men", "Bénéficiaires Hommes", Number),
    col("beneficiaries_women", "Bénéficiaires Femmes", Number),
    col("beneficiary_type", "Type de Bénéficiaires", Text),
    col("organization_name", "Organisation", Text),
    col("project_name", "Nom du Projet", Text),
    col("work_type", "Type de Travail", Text),
    col("description", "Description", LongText),
    col("signer", "Signataire", Text),
    col("images", "Images", Images),
    col("created_at", "Créé le", DateTime),
];

const SOCIAL_ACTION_COLUMNS: &[Column] = &[
    col("id", "ID", Text),
    col("province", "Province", Text),
    col("prefecture", "Département", Text),
    col("sub_prefecture", "Sous-préfecture", Text),
    col("city", "Ville", Text),
    col("report_date", "Date Action", Date),
    col("action_type", "Type Action", Text),
    col("themes", "Thèmes Abordés", Text),
    col("participants_men", "Hommes", Number),
    col("participants_women", "Femmes", Number),
    col("description", "Description", LongText),
    col("signer", "Signataire", Text),
    col("images", "Images", Images),
    col("created_at", "Créé le", DateTime),
];

const NEWS_COLUMNS: &[Column] = &[
    col("id", "ID", Text),
    col("title", "Titre", Text),
    col("description", "Détails", LongText),
    col("images", "Images", Images),
    col("signer", "Signataire", Text),
    col("created_at", "Créé le", DateTime),
];
